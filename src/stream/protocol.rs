//! Wire messages of the streaming channel.
//!
//! JSON text frames; field names use camelCase on the wire.

use serde::{Deserialize, Serialize};

/// A subscribe request for one or more topics under an optional credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub topics: Vec<String>,
}

/// Identifies one `(credential, topic)` pair for unsubscribe requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicFilter {
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub topic: String,
}

/// Messages sent by this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    #[serde(rename = "createSubscriptions")]
    CreateSubscriptions { subscriptions: Vec<SubscriptionRequest> },
    #[serde(rename = "deleteSubscriptions")]
    DeleteSubscriptions { subscriptions: Vec<TopicFilter> },
}

/// A subscription the server confirmed, echoing the credential and topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedSubscription {
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// A subscription attempt the server rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSubscription {
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
    pub topic: String,
    pub error: String,
}

/// Events delivered by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event")]
pub enum StreamEvent {
    #[serde(rename = "connected")]
    Connected {
        #[serde(default)]
        retry: Option<u64>,
    },
    #[serde(rename = "subscriptionsCreated")]
    SubscriptionsCreated {
        #[serde(default)]
        subscriptions: Vec<ConfirmedSubscription>,
        #[serde(default)]
        errors: Vec<FailedSubscription>,
    },
    #[serde(rename = "topicUpdated")]
    TopicUpdated {
        #[serde(rename = "apiKey", default)]
        api_key: Option<String>,
        topic: String,
        version: i64,
    },
    #[serde(rename = "error")]
    Error { message: String },
    /// Event kinds this client does not interpret.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl StreamEvent {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
