//! Listen for push notifications and synchronize on demand.
//!
//! Thin scheduler wiring: the listener decides nothing about when to run a
//! synchronizer, it only reports which registration a notification belongs
//! to. This command maps `updated` events back to stored subscriptions and
//! runs a full synchronization for each.

use std::sync::Arc;

use clap::Args;

use crate::config::{Config, ConfigError};
use crate::db::SubscriptionStore;
use crate::stream::{ws_url, Listener, ListenerEvent, StreamChannel, WsChannel};
use crate::sync::Synchronizer;

#[derive(Debug, Args)]
pub struct ListenCommand {}

impl ListenCommand {
    pub async fn run(
        &self,
        config: &Config,
        synchronizer: Arc<Synchronizer>,
        store: Arc<dyn SubscriptionStore>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if config.stream_url.is_empty() {
            return Err(ConfigError::NotConfigured.into());
        }

        let url = ws_url(&config.stream_url);
        let (channel, mut frames) = WsChannel::connect(&url).await?;
        let (listener, mut events) = Listener::new(channel as Arc<dyn StreamChannel>);
        let listener = Arc::new(listener);

        // Pump decoded frames into the correlator.
        {
            let listener = listener.clone();
            tokio::spawn(async move {
                while let Some(frame) = frames.recv().await {
                    listener.handle_event(frame);
                }
            });
        }

        for subscription in store.list().await? {
            match listener.add(&subscription).await {
                Ok(registration) => {
                    tracing::info!(topic = %registration.topic, "watching");
                }
                Err(e) => {
                    tracing::warn!(subscription = %subscription.id, error = %e, "failed to watch");
                }
            }
        }

        println!(
            "Listening for updates on {} topic(s). Ctrl-C to stop.",
            listener.active().len()
        );

        while let Some(event) = events.recv().await {
            match event {
                ListenerEvent::Updated {
                    registration,
                    version,
                } => {
                    tracing::info!(topic = %registration.topic, version, "topic updated");
                    match store.load(&registration.id).await? {
                        Some(mut subscription) => {
                            if let Err(e) =
                                synchronizer.synchronize(&mut subscription, false).await
                            {
                                tracing::error!(
                                    subscription = %subscription.id,
                                    error = %e,
                                    "synchronization failed"
                                );
                            }
                        }
                        None => {
                            tracing::warn!(id = %registration.id, "subscription disappeared");
                        }
                    }
                }
                ListenerEvent::Added(registration) => {
                    tracing::info!(topic = %registration.topic, "registration confirmed");
                }
                ListenerEvent::Error {
                    registration,
                    reason,
                } => {
                    tracing::warn!(topic = %registration.topic, %reason, "registration failed");
                }
                ListenerEvent::Channel { message } => {
                    tracing::warn!(%message, "stream error");
                }
            }
        }

        Ok(())
    }
}
