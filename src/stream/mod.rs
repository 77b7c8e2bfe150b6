//! Streaming notification channel and the registration correlator.
//!
//! The remote channel multiplexes many topics over one connection; topic
//! subscribe requests are acknowledged asynchronously and out of order.
//! The listener matches those acknowledgments and later update
//! notifications back to local registrations using only `(key, topic)`.

mod channel;
mod listener;
mod protocol;

pub use channel::{ws_url, MockChannel, StreamChannel, StreamError, WsChannel};
pub use listener::{Listener, ListenerEvent, Registration};
pub use protocol::{
    ClientMessage, ConfirmedSubscription, FailedSubscription, StreamEvent, SubscriptionRequest,
    TopicFilter,
};
