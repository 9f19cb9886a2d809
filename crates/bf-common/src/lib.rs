use serde::{Deserialize, Serialize};
use std::fmt;

pub mod logging;

pub type MessageId = i64;
pub type ContactId = i64;
pub type BrokerId = i64;
pub type MemberId = i64;

// ============================================================================
// Channel Types
// ============================================================================

/// Outbound message modality. Each channel has its own broker set and
/// dispatch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "SMS")]
    Sms,
    #[serde(rename = "KAKAO", alias = "CHAT")]
    Chat,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "SMS",
            Channel::Chat => "KAKAO",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status vocabulary shared with the reconciliation consumer.
/// Dispatch only ever produces `PENDING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Pending,
    Success,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    #[default]
    Active,
    Inactive,
}

// ============================================================================
// Core Domain Types
// ============================================================================

/// A message as seen by the dispatch engine. Only the identity and channel
/// are read here; status belongs to the delivery pipeline once dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub content: String,
    pub channel: Channel,
    #[serde(default = "pending_status")]
    pub status: MessageStatus,
}

fn pending_status() -> MessageStatus {
    MessageStatus::Pending
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub phone_number: String,
}

/// A third-party carrier that performs the actual delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broker {
    pub id: BrokerId,
    pub name: String,
    pub channel: Channel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerRateRule {
    pub member_id: MemberId,
    pub broker_id: BrokerId,
    pub channel: Channel,
    /// Share of the batch in percent (0..=100)
    pub rate: u32,
    #[serde(default)]
    pub status: RuleStatus,
}

impl BrokerRateRule {
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }
}

/// Channel payload supplied by the caller. The recipient number is filled
/// in per recipient when the envelope is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundPayload {
    pub from: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
    /// Attachment references (image keys)
    #[serde(default)]
    pub attachments: Vec<String>,
}

// ============================================================================
// Provisional Result Records
// ============================================================================

/// Placeholder delivery-status entry created at dispatch time and later
/// updated by the out-of-band delivery callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionalResultRecord {
    /// Sequential per-message id (chat channel only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    pub message_id: MessageId,
    pub contact_id: ContactId,
    /// Absent until a broker has been assigned
    pub broker_id: Option<BrokerId>,
    pub message_status: MessageStatus,
}

impl ProvisionalResultRecord {
    pub fn pending(message_id: MessageId, contact_id: ContactId, broker_id: BrokerId) -> Self {
        Self {
            result_id: None,
            message_id,
            contact_id,
            broker_id: Some(broker_id),
            message_status: MessageStatus::Pending,
        }
    }

    /// A pending record that has not been routed to a broker yet
    pub fn unassigned(result_id: String, message_id: MessageId, contact_id: ContactId) -> Self {
        Self {
            result_id: Some(result_id),
            message_id,
            contact_id,
            broker_id: None,
            message_status: MessageStatus::Pending,
        }
    }

    pub fn assign(mut self, broker_id: BrokerId) -> Self {
        self.broker_id = Some(broker_id);
        self
    }
}
