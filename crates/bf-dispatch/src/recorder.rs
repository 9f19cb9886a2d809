//! Provisional result records and their keys in the short-lived store.
//!
//! SMS keeps one hash per (message, broker) slice. Chat stages the whole
//! batch in a scratch list and a shadow list, then moves each record into
//! the status hash once its broker is known.

use std::sync::Arc;
use std::time::Duration;

use bf_common::{Broker, Contact, MessageId, ProvisionalResultRecord};
use tracing::{debug, warn};

use crate::settings::DispatchSettings;
use crate::store::ResultStore;
use crate::Result;

/// `<messageId>.<BROKER>`
pub fn sms_result_key(message_id: MessageId, broker_name: &str) -> String {
    format!("{}.{}", message_id, broker_name.to_uppercase())
}

pub fn chat_scratch_key(message_id: MessageId) -> String {
    format!("message.tmp.{}", message_id)
}

pub fn chat_shadow_key(message_id: MessageId) -> String {
    format!("message.value.{}", message_id)
}

pub fn chat_status_key(message_id: MessageId) -> String {
    format!("message.status.{}", message_id)
}

#[derive(Debug, Clone, Copy)]
pub struct RecordTtls {
    pub sms_result: Duration,
    pub chat_scratch: Duration,
    pub chat_shadow: Duration,
}

impl From<&DispatchSettings> for RecordTtls {
    fn from(settings: &DispatchSettings) -> Self {
        Self {
            sms_result: settings.sms_result_ttl,
            chat_scratch: settings.chat_scratch_ttl,
            chat_shadow: settings.chat_shadow_ttl,
        }
    }
}

pub struct ResultRecorder {
    store: Arc<dyn ResultStore>,
    ttls: RecordTtls,
}

impl ResultRecorder {
    pub fn new(store: Arc<dyn ResultStore>, ttls: RecordTtls) -> Self {
        Self { store, ttls }
    }

    /// Write the PENDING records of one broker's slice as a single hash.
    ///
    /// Fields are the recipients' positions in the caller's list, so slices
    /// of the same message never collide.
    pub async fn record_sms_slice(
        &self,
        message_id: MessageId,
        broker: &Broker,
        start: usize,
        recipients: &[Contact],
    ) -> Result<Vec<ProvisionalResultRecord>> {
        let records: Vec<ProvisionalResultRecord> = recipients
            .iter()
            .map(|contact| ProvisionalResultRecord::pending(message_id, contact.id, broker.id))
            .collect();

        if records.is_empty() {
            return Ok(records);
        }

        let mut fields = Vec::with_capacity(records.len());
        for (offset, record) in records.iter().enumerate() {
            fields.push(((start + offset).to_string(), serde_json::to_string(record)?));
        }

        let key = sms_result_key(message_id, &broker.name);
        self.store
            .put_hash(&key, fields, Some(self.ttls.sms_result))
            .await?;

        debug!(key = %key, records = records.len(), "SMS result slice recorded");
        Ok(records)
    }

    /// Push the unassigned records of a chat batch to the scratch and shadow
    /// lists. Result ids run from 1 in recipient order.
    pub async fn stage_chat(
        &self,
        message_id: MessageId,
        recipients: &[Contact],
    ) -> Result<Vec<ProvisionalResultRecord>> {
        let staged: Vec<ProvisionalResultRecord> = recipients
            .iter()
            .enumerate()
            .map(|(i, contact)| ProvisionalResultRecord::unassigned((i + 1).to_string(), message_id, contact.id))
            .collect();

        if staged.is_empty() {
            return Ok(staged);
        }

        let values = staged
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<String>, _>>()?;

        self.store
            .push_list(&chat_scratch_key(message_id), values.clone(), Some(self.ttls.chat_scratch))
            .await?;
        self.store
            .push_list(&chat_shadow_key(message_id), values, Some(self.ttls.chat_shadow))
            .await?;

        debug!(message_id = message_id, records = staged.len(), "Chat batch staged");
        Ok(staged)
    }

    /// Take the next staged record, assign `broker`, and write it to the
    /// status hash.
    ///
    /// Falls back to `staged` when the scratch list no longer holds it.
    ///
    /// One status-hash write per recipient, issued before that recipient's
    /// publish. Batching these writes would mean publishing some recipients
    /// before their record exists, so keep them per recipient.
    pub async fn commit_chat(
        &self,
        message_id: MessageId,
        staged: &ProvisionalResultRecord,
        broker: &Broker,
    ) -> Result<ProvisionalResultRecord> {
        let popped = self.store.pop_list(&chat_scratch_key(message_id)).await?;
        // shadow copy drains in step with the scratch list
        self.store.pop_list(&chat_shadow_key(message_id)).await?;

        let record = match popped.as_deref().map(serde_json::from_str::<ProvisionalResultRecord>) {
            Some(Ok(record)) if record.result_id == staged.result_id && record.contact_id == staged.contact_id => {
                record
            }
            Some(_) => {
                warn!(
                    message_id = message_id,
                    contact_id = staged.contact_id,
                    "Scratch record does not match recipient, using local record"
                );
                staged.clone()
            }
            None => {
                warn!(
                    message_id = message_id,
                    contact_id = staged.contact_id,
                    "Scratch list expired or drained, using local record"
                );
                staged.clone()
            }
        };

        let record = record.assign(broker.id);
        let field = record
            .result_id
            .clone()
            .unwrap_or_else(|| staged.contact_id.to_string());

        self.store
            .put_hash(
                &chat_status_key(message_id),
                vec![(field, serde_json::to_string(&record)?)],
                None,
            )
            .await?;

        Ok(record)
    }
}
