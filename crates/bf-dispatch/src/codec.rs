//! Per-recipient envelope handed to the delivery pipeline.

use bf_common::{Channel, Contact, Message, OutboundPayload, ProvisionalResultRecord};
use serde::Serialize;

use crate::Result;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Channel payload as the broker worker receives it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage<'a> {
    pub from: &'a str,
    pub to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<&'a str>,
    pub content: &'a str,
    pub attachments: &'a [String],
    pub message_type: Channel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEnvelope<'a> {
    pub message: OutboundMessage<'a>,
    pub message_result: &'a ProvisionalResultRecord,
}

impl<'a> DispatchEnvelope<'a> {
    pub fn new(
        message: &'a Message,
        payload: &'a OutboundPayload,
        recipient: &'a Contact,
        record: &'a ProvisionalResultRecord,
    ) -> Self {
        Self {
            message: OutboundMessage {
                from: &payload.from,
                to: &recipient.phone_number,
                subject: payload.subject.as_deref(),
                content: &payload.content,
                attachments: &payload.attachments,
                message_type: message.channel,
            },
            message_result: record,
        }
    }

    /// Transport message id, unique per (message, recipient)
    pub fn delivery_id(&self) -> String {
        format!("{}.{}", self.message_result.message_id, self.message_result.contact_id)
    }
}

/// Encoded envelope ready for the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEnvelope {
    pub delivery_id: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Turns an envelope into transport bytes. A failure is a `Serialization`
/// error and only skips the recipient concerned.
pub trait EnvelopeCodec: Send + Sync {
    fn encode(&self, envelope: &DispatchEnvelope<'_>) -> Result<EncodedEnvelope>;
}

/// UTF-8 JSON text
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl EnvelopeCodec for JsonCodec {
    fn encode(&self, envelope: &DispatchEnvelope<'_>) -> Result<EncodedEnvelope> {
        let body = serde_json::to_vec(envelope)?;
        Ok(EncodedEnvelope {
            delivery_id: envelope.delivery_id(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            body,
        })
    }
}
