//! Correlates local topic registrations with the channel's asynchronous
//! confirmations and notifications.
//!
//! The channel carries no request sequence numbers: the only identity a
//! confirmation or notification carries is `(credential, topic)`. Several
//! local callers may legitimately watch the same pair, so confirmations
//! settle pending entries in FIFO order and notifications fan out to every
//! matching active registration.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::channel::{StreamChannel, StreamError};
use super::protocol::StreamEvent;
use crate::models::Subscription;

/// A confirmed topic registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// Local subscription id. Removal goes by this id, never by
    /// `(key, topic)` — distinct subscriptions may watch the same topic.
    pub id: String,
    pub key: Option<String>,
    pub topic: String,
}

/// Lifecycle events consumed by the external scheduler.
#[derive(Debug)]
pub enum ListenerEvent {
    /// A registration was confirmed and now receives notifications.
    Added(Registration),
    /// A subscribe attempt was rejected by the remote channel.
    Error {
        registration: Registration,
        reason: String,
    },
    /// The topic advanced to `version`; one event per interested
    /// registration.
    Updated {
        registration: Registration,
        version: i64,
    },
    /// An error forwarded verbatim from the channel.
    Channel { message: String },
}

struct Pending {
    token: Uuid,
    registration: Registration,
    confirm: oneshot::Sender<Result<(), String>>,
}

#[derive(Default)]
struct State {
    pending: Vec<Pending>,
    active: Vec<Registration>,
}

/// Maintains the pending and active registration sets over a streaming
/// channel. The sets are mutated only by [`Listener::add`],
/// [`Listener::remove`] and [`Listener::handle_event`].
pub struct Listener {
    channel: Arc<dyn StreamChannel>,
    state: Mutex<State>,
    events: mpsc::UnboundedSender<ListenerEvent>,
}

impl Listener {
    /// Returns the listener and the receiving end of its lifecycle events.
    pub fn new(
        channel: Arc<dyn StreamChannel>,
    ) -> (Self, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                channel,
                state: Mutex::new(State::default()),
                events,
            },
            receiver,
        )
    }

    /// Registers interest in the subscription's topic. Resolves only once
    /// the remote channel acknowledged the subscribe request.
    pub async fn add(&self, subscription: &Subscription) -> Result<Registration, StreamError> {
        let registration = Registration {
            id: subscription.id.clone(),
            key: subscription.key.clone(),
            topic: subscription.topic().to_string(),
        };
        let token = Uuid::new_v4();
        let (confirm, confirmed) = oneshot::channel();
        self.lock().pending.push(Pending {
            token,
            registration: registration.clone(),
            confirm,
        });

        if let Err(e) = self
            .channel
            .subscribe(registration.key.clone(), vec![registration.topic.clone()])
            .await
        {
            self.lock().pending.retain(|pending| pending.token != token);
            return Err(e);
        }

        match confirmed.await {
            Ok(Ok(())) => Ok(registration),
            Ok(Err(reason)) => Err(StreamError::SubscribeRejected {
                topic: registration.topic,
                reason,
            }),
            Err(_) => Err(StreamError::Closed),
        }
    }

    /// Withdraws the active registration carrying the subscription's id.
    /// The remote unsubscribe must succeed before the registration is
    /// dropped; an unknown id is an error.
    pub async fn remove(&self, subscription: &Subscription) -> Result<Registration, StreamError> {
        let registration = self
            .lock()
            .active
            .iter()
            .find(|registration| registration.id == subscription.id)
            .cloned()
            .ok_or_else(|| StreamError::NotRegistered(subscription.id.clone()))?;

        self.channel
            .unsubscribe(registration.key.clone(), registration.topic.clone())
            .await?;

        let mut state = self.lock();
        if let Some(index) = state
            .active
            .iter()
            .position(|active| active.id == registration.id)
        {
            state.active.remove(index);
        }
        Ok(registration)
    }

    /// Snapshot of the active registrations.
    pub fn active(&self) -> Vec<Registration> {
        self.lock().active.clone()
    }

    /// Feeds one decoded channel event through the correlator.
    pub fn handle_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Connected { .. } | StreamEvent::Unknown => {}
            StreamEvent::SubscriptionsCreated {
                subscriptions,
                errors,
            } => {
                for confirmed in subscriptions {
                    for topic in &confirmed.topics {
                        self.settle(confirmed.api_key.as_deref(), topic, Ok(()));
                    }
                }
                for failure in errors {
                    self.settle(
                        failure.api_key.as_deref(),
                        &failure.topic,
                        Err(failure.error),
                    );
                }
            }
            StreamEvent::TopicUpdated {
                api_key,
                topic,
                version,
            } => {
                let matches: Vec<Registration> = self
                    .lock()
                    .active
                    .iter()
                    .filter(|registration| {
                        registration.key.as_deref() == api_key.as_deref()
                            && registration.topic == topic
                    })
                    .cloned()
                    .collect();
                for registration in matches {
                    self.emit(ListenerEvent::Updated {
                        registration,
                        version,
                    });
                }
            }
            StreamEvent::Error { message } => self.emit(ListenerEvent::Channel { message }),
        }
    }

    /// Settles the oldest pending entry matching `(key, topic)`. With
    /// several callers awaiting the same pair, one confirmation resolves
    /// exactly one of them, in registration order.
    fn settle(&self, key: Option<&str>, topic: &str, outcome: Result<(), String>) {
        let pending = {
            let mut state = self.lock();
            let Some(index) = state.pending.iter().position(|pending| {
                pending.registration.key.as_deref() == key && pending.registration.topic == topic
            }) else {
                tracing::debug!(topic, "confirmation with no matching pending registration");
                return;
            };
            let pending = state.pending.remove(index);
            if outcome.is_ok() {
                state.active.push(pending.registration.clone());
            }
            pending
        };

        match outcome {
            Ok(()) => {
                self.emit(ListenerEvent::Added(pending.registration.clone()));
                let _ = pending.confirm.send(Ok(()));
            }
            Err(reason) => {
                self.emit(ListenerEvent::Error {
                    registration: pending.registration.clone(),
                    reason: reason.clone(),
                });
                let _ = pending.confirm.send(Err(reason));
            }
        }
    }

    fn emit(&self, event: ListenerEvent) {
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::channel::MockChannel;
    use crate::stream::protocol::{ConfirmedSubscription, FailedSubscription};

    fn subscription(id: &str, key: Option<&str>, library: &str) -> Subscription {
        let mut subscription = Subscription::new(library);
        subscription.id = id.to_string();
        subscription.key = key.map(str::to_string);
        subscription
    }

    fn confirmation(key: Option<&str>, topics: &[&str]) -> StreamEvent {
        StreamEvent::SubscriptionsCreated {
            subscriptions: vec![ConfirmedSubscription {
                api_key: key.map(str::to_string),
                topics: topics.iter().map(|t| t.to_string()).collect(),
            }],
            errors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_add_resolves_on_confirmation() {
        let channel = Arc::new(MockChannel::new());
        let (listener, mut events) = Listener::new(channel.clone() as Arc<dyn StreamChannel>);
        let listener = Arc::new(listener);

        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.add(&subscription("s1", Some("k"), "/users/1")).await })
        };
        tokio::task::yield_now().await;

        listener.handle_event(confirmation(Some("k"), &["/users/1"]));
        let registration = task.await.unwrap().unwrap();
        assert_eq!(registration.id, "s1");
        assert_eq!(listener.active(), vec![registration.clone()]);
        assert_eq!(channel.subscribes().len(), 1);
        assert!(matches!(
            events.try_recv(),
            Ok(ListenerEvent::Added(added)) if added == registration
        ));
    }

    #[tokio::test]
    async fn test_confirmations_settle_pending_in_fifo_order() {
        let channel = Arc::new(MockChannel::new());
        let (listener, _events) = Listener::new(channel as Arc<dyn StreamChannel>);
        let listener = Arc::new(listener);

        // Two callers racing for the same (key, topic) pair.
        let first = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.add(&subscription("s1", Some("k"), "/users/1")).await })
        };
        tokio::task::yield_now().await;
        let second = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.add(&subscription("s2", Some("k"), "/users/1")).await })
        };
        tokio::task::yield_now().await;

        listener.handle_event(confirmation(Some("k"), &["/users/1"]));
        tokio::task::yield_now().await;

        // The earlier registration settles first; the later one stays
        // pending until its own confirmation arrives.
        assert!(first.is_finished());
        assert!(!second.is_finished());
        assert_eq!(first.await.unwrap().unwrap().id, "s1");

        listener.handle_event(confirmation(Some("k"), &["/users/1"]));
        assert_eq!(second.await.unwrap().unwrap().id, "s2");
        assert_eq!(listener.active().len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_settles_without_activating() {
        let channel = Arc::new(MockChannel::new());
        let (listener, mut events) = Listener::new(channel as Arc<dyn StreamChannel>);
        let listener = Arc::new(listener);

        let task = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.add(&subscription("s1", Some("k"), "/users/9")).await })
        };
        tokio::task::yield_now().await;

        listener.handle_event(StreamEvent::SubscriptionsCreated {
            subscriptions: Vec::new(),
            errors: vec![FailedSubscription {
                api_key: Some("k".to_string()),
                topic: "/users/9".to_string(),
                error: "Forbidden".to_string(),
            }],
        });

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(StreamError::SubscribeRejected { ref reason, .. }) if reason == "Forbidden"
        ));
        assert!(listener.active().is_empty());
        assert!(matches!(
            events.try_recv(),
            Ok(ListenerEvent::Error { ref reason, .. }) if reason == "Forbidden"
        ));
    }

    #[tokio::test]
    async fn test_topic_update_fans_out_to_every_match() {
        let channel = Arc::new(MockChannel::new());
        let (listener, mut events) = Listener::new(channel as Arc<dyn StreamChannel>);
        let listener = Arc::new(listener);

        for id in ["s1", "s2"] {
            let task_listener = listener.clone();
            let subscription = subscription(id, Some("k"), "/groups/5");
            tokio::spawn(async move { task_listener.add(&subscription).await });
            tokio::task::yield_now().await;
            listener.handle_event(confirmation(Some("k"), &["/groups/5"]));
            tokio::task::yield_now().await;
        }
        // Drain the two Added events.
        assert!(matches!(events.try_recv(), Ok(ListenerEvent::Added(_))));
        assert!(matches!(events.try_recv(), Ok(ListenerEvent::Added(_))));

        listener.handle_event(StreamEvent::TopicUpdated {
            api_key: Some("k".to_string()),
            topic: "/groups/5".to_string(),
            version: 42,
        });

        let mut notified = Vec::new();
        while let Ok(ListenerEvent::Updated {
            registration,
            version,
        }) = events.try_recv()
        {
            assert_eq!(version, 42);
            notified.push(registration.id);
        }
        notified.sort();
        assert_eq!(notified, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_update_for_other_credential_does_not_match() {
        let channel = Arc::new(MockChannel::new());
        let (listener, mut events) = Listener::new(channel as Arc<dyn StreamChannel>);
        let listener = Arc::new(listener);

        {
            let listener = listener.clone();
            let subscription = subscription("s1", Some("k"), "/users/1");
            tokio::spawn(async move { listener.add(&subscription).await });
        }
        tokio::task::yield_now().await;
        listener.handle_event(confirmation(Some("k"), &["/users/1"]));
        assert!(matches!(events.try_recv(), Ok(ListenerEvent::Added(_))));

        listener.handle_event(StreamEvent::TopicUpdated {
            api_key: None,
            topic: "/users/1".to_string(),
            version: 7,
        });
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_unknown_id_fails_without_channel_call() {
        let channel = Arc::new(MockChannel::new());
        let (listener, _events) = Listener::new(channel.clone() as Arc<dyn StreamChannel>);

        let result = listener.remove(&subscription("nope", None, "/users/1")).await;
        assert!(matches!(result, Err(StreamError::NotRegistered(_))));
        assert!(channel.unsubscribes().is_empty());
    }

    #[tokio::test]
    async fn test_remove_keeps_registration_when_unsubscribe_fails() {
        let channel = Arc::new(MockChannel::new());
        let (listener, _events) = Listener::new(channel.clone() as Arc<dyn StreamChannel>);
        let listener = Arc::new(listener);

        {
            let listener = listener.clone();
            let subscription = subscription("s1", None, "/users/1");
            tokio::spawn(async move { listener.add(&subscription).await });
        }
        tokio::task::yield_now().await;
        listener.handle_event(confirmation(None, &["/users/1"]));
        assert_eq!(listener.active().len(), 1);

        channel.fail_unsubscribe();
        let result = listener.remove(&subscription("s1", None, "/users/1")).await;
        assert!(matches!(result, Err(StreamError::WebSocket(_))));
        assert_eq!(listener.active().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_by_id_with_shared_topic() {
        let channel = Arc::new(MockChannel::new());
        let (listener, _events) = Listener::new(channel.clone() as Arc<dyn StreamChannel>);
        let listener = Arc::new(listener);

        for id in ["s1", "s2"] {
            let task_listener = listener.clone();
            let subscription = subscription(id, None, "/users/1");
            tokio::spawn(async move { task_listener.add(&subscription).await });
            tokio::task::yield_now().await;
            listener.handle_event(confirmation(None, &["/users/1"]));
            tokio::task::yield_now().await;
        }
        assert_eq!(listener.active().len(), 2);

        let removed = listener
            .remove(&subscription("s1", None, "/users/1"))
            .await
            .unwrap();
        assert_eq!(removed.id, "s1");
        // Only the addressed registration went away.
        assert_eq!(listener.active(), vec![Registration {
            id: "s2".to_string(),
            key: None,
            topic: "/users/1".to_string(),
        }]);
    }

    #[tokio::test]
    async fn test_channel_errors_are_forwarded() {
        let channel = Arc::new(MockChannel::new());
        let (listener, mut events) = Listener::new(channel as Arc<dyn StreamChannel>);

        listener.handle_event(StreamEvent::Error {
            message: "stream reset".to_string(),
        });
        assert!(matches!(
            events.try_recv(),
            Ok(ListenerEvent::Channel { ref message }) if message == "stream reset"
        ));
    }
}
