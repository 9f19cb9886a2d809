//! End-to-End Dispatch Tests
//!
//! Drives the dispatcher through the in-memory store and sink:
//! Request → Rules/Brokers → Partition/Pool → Result store → Pipeline

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use bf_common::{
    Broker, BrokerRateRule, Channel, Contact, Message, MessageStatus, OutboundPayload,
    ProvisionalResultRecord, RuleStatus,
};
use bf_dispatch::codec::DispatchEnvelope;
use bf_dispatch::{
    DispatchError, DispatchRequest, DispatchSettings, Dispatcher, EncodedEnvelope, EnvelopeCodec,
    JsonCodec, MemoryPipelineSink, MemoryResultStore, PipelineSink, ResultStore, RoutingAddress,
    StaticDirectory,
};

const MEMBER: i64 = 1;

fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_member(MEMBER)
        .with_member(2)
        .with_broker(Broker { id: 1, name: "KT".to_string(), channel: Channel::Sms })
        .with_broker(Broker { id: 2, name: "LG".to_string(), channel: Channel::Sms })
        .with_broker(Broker { id: 3, name: "SKT".to_string(), channel: Channel::Sms })
        .with_broker(Broker { id: 5, name: "CJ".to_string(), channel: Channel::Chat })
        .with_broker(Broker { id: 6, name: "LG".to_string(), channel: Channel::Chat })
}

fn rule(broker_id: i64, channel: Channel, rate: u32) -> BrokerRateRule {
    BrokerRateRule { member_id: MEMBER, broker_id, channel, rate, status: RuleStatus::Active }
}

fn contacts(n: i64) -> Vec<Contact> {
    (1..=n)
        .map(|id| Contact { id, phone_number: format!("010000{:05}", id) })
        .collect()
}

fn request(message_id: i64, channel: Channel, recipients: Vec<Contact>) -> DispatchRequest {
    DispatchRequest {
        member_id: MEMBER,
        message: Message {
            id: message_id,
            content: "hello".to_string(),
            channel,
            status: MessageStatus::Pending,
        },
        payload: OutboundPayload {
            from: "0200000000".to_string(),
            subject: None,
            content: "hello".to_string(),
            attachments: Vec::new(),
        },
        recipients,
    }
}

struct Harness {
    dispatcher: Dispatcher,
    store: Arc<MemoryResultStore>,
    sink: Arc<MemoryPipelineSink>,
}

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("bf_dispatch=debug")
        .with_test_writer()
        .try_init();
}

fn harness(directory: StaticDirectory) -> Harness {
    init_test_logging();
    let directory = Arc::new(directory);
    let store = Arc::new(MemoryResultStore::new());
    let sink = Arc::new(MemoryPipelineSink::new());
    let dispatcher = Dispatcher::new(
        directory.clone(),
        directory,
        store.clone(),
        sink.clone(),
        DispatchSettings::default(),
    );
    Harness { dispatcher, store, sink }
}

fn decode(raw: &str) -> ProvisionalResultRecord {
    serde_json::from_str(raw).unwrap()
}

// ============================================================================
// SMS
// ============================================================================

mod sms_tests {
    use super::*;

    #[tokio::test]
    async fn test_exact_rates_slice_in_carrier_order() {
        let directory = directory()
            .with_rule(rule(1, Channel::Sms, 50))
            .with_rule(rule(2, Channel::Sms, 30))
            .with_rule(rule(3, Channel::Sms, 20));
        let h = harness(directory);

        h.dispatcher
            .dispatch(&request(100, Channel::Sms, contacts(10)))
            .await
            .unwrap();

        assert_eq!(h.sink.count_for("sms.send.kt"), 5);
        assert_eq!(h.sink.count_for("sms.send.lg"), 3);
        assert_eq!(h.sink.count_for("sms.send.skt"), 2);

        let kt = h.store.read_hash("100.KT").await.unwrap();
        let lg = h.store.read_hash("100.LG").await.unwrap();
        let skt = h.store.read_hash("100.SKT").await.unwrap();
        assert_eq!(kt.len(), 5);
        assert_eq!(lg.len(), 3);
        assert_eq!(skt.len(), 2);

        // consecutive runs, fields are positions in the caller's list
        assert_eq!(decode(&kt["0"]).contact_id, 1);
        assert_eq!(decode(&kt["4"]).contact_id, 5);
        assert_eq!(decode(&lg["5"]).contact_id, 6);
        assert_eq!(decode(&skt["9"]).contact_id, 10);
        assert_eq!(decode(&skt["9"]).broker_id, Some(3));

        let published: Vec<String> = h
            .sink
            .published()
            .iter()
            .map(|p| p.json().unwrap()["message"]["to"].as_str().unwrap().to_string())
            .collect();
        let expected: Vec<String> = contacts(10).into_iter().map(|c| c.phone_number).collect();
        assert_eq!(published, expected);
    }

    #[tokio::test]
    async fn test_every_recipient_gets_one_pending_record() {
        let h = harness(directory());

        h.dispatcher
            .dispatch(&request(101, Channel::Sms, contacts(11)))
            .await
            .unwrap();

        let mut records = Vec::new();
        for broker in ["KT", "LG", "SKT"] {
            let hash = h.store.read_hash(&format!("101.{}", broker)).await.unwrap();
            records.extend(hash.values().map(|raw| decode(raw)));
        }

        assert_eq!(records.len(), 11);
        let contacts: HashSet<i64> = records.iter().map(|r| r.contact_id).collect();
        assert_eq!(contacts.len(), 11);
        assert!(records.iter().all(|r| r.message_status == MessageStatus::Pending));
        assert!(records.iter().all(|r| r.broker_id.is_some()));
        assert_eq!(h.sink.published().len(), 11);
    }

    #[tokio::test]
    async fn test_equal_split_gives_remainder_to_one_carrier() {
        let h = harness(directory());

        h.dispatcher
            .dispatch_seeded(&request(102, Channel::Sms, contacts(10)), 42)
            .await
            .unwrap();

        let mut counts: Vec<usize> = ["sms.send.kt", "sms.send.lg", "sms.send.skt"]
            .iter()
            .map(|key| h.sink.count_for(key))
            .collect();
        counts.sort();
        // 33% of 10 floors to 3 per carrier, one carrier takes the extra unit
        assert_eq!(counts, vec![3, 3, 4]);
    }

    #[tokio::test]
    async fn test_result_hashes_expire() {
        let h = harness(directory());

        h.dispatcher
            .dispatch(&request(103, Channel::Sms, contacts(3)))
            .await
            .unwrap();

        for key in h.store.keys() {
            let ttl = h.store.ttl(&key).unwrap();
            assert!(ttl > std::time::Duration::from_secs(590));
        }
    }

    #[tokio::test]
    async fn test_empty_recipient_list_writes_nothing() {
        let h = harness(directory());

        h.dispatcher
            .dispatch(&request(104, Channel::Sms, Vec::new()))
            .await
            .unwrap();

        assert!(h.store.keys().is_empty());
        assert!(h.sink.published().is_empty());
    }

    #[tokio::test]
    async fn test_seeded_dispatch_is_reproducible() {
        let first = harness(directory());
        let second = harness(directory());
        let req = request(105, Channel::Sms, contacts(7));

        first.dispatcher.dispatch_seeded(&req, 7).await.unwrap();
        second.dispatcher.dispatch_seeded(&req, 7).await.unwrap();

        let keys = |sink: &MemoryPipelineSink| -> Vec<String> {
            sink.published().iter().map(|p| p.address.routing_key.clone()).collect()
        };
        assert_eq!(keys(&first.sink), keys(&second.sink));
    }

    #[tokio::test]
    async fn test_inconsistent_rules_fail_before_any_recipient() {
        let directory = directory()
            .with_rule(rule(1, Channel::Sms, 50))
            .with_rule(rule(2, Channel::Sms, 40));
        let h = harness(directory);

        let result = h.dispatcher.dispatch(&request(106, Channel::Sms, contacts(5))).await;

        assert!(matches!(result, Err(DispatchError::Config(_))));
        assert!(h.store.keys().is_empty());
        assert!(h.sink.published().is_empty());
    }
}

// ============================================================================
// Chat
// ============================================================================

mod chat_tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_records_move_to_status_hash() {
        let directory = directory()
            .with_rule(rule(5, Channel::Chat, 70))
            .with_rule(rule(6, Channel::Chat, 30));
        let h = harness(directory);

        h.dispatcher
            .dispatch_seeded(&request(200, Channel::Chat, contacts(20)), 11)
            .await
            .unwrap();

        let status = h.store.read_hash("message.status.200").await.unwrap();
        assert_eq!(status.len(), 20);
        for (result_id, raw) in &status {
            let record = decode(raw);
            assert_eq!(record.result_id.as_deref(), Some(result_id.as_str()));
            assert_eq!(record.contact_id.to_string(), *result_id);
            assert!(matches!(record.broker_id, Some(5) | Some(6)));
        }

        // scratch and shadow lists are fully drained
        assert!(!h.store.contains_key("message.tmp.200"));
        assert!(!h.store.contains_key("message.value.200"));
        assert_eq!(h.store.ttl("message.status.200"), None);

        let published = h.sink.published();
        assert_eq!(published.len(), 20);
        for envelope in &published {
            let json = envelope.json().unwrap();
            assert_eq!(envelope.address.exchange, "kakao.exchange.work");
            assert_eq!(json["message"]["messageType"], "KAKAO");
            let broker = json["messageResult"]["brokerId"].as_i64().unwrap();
            let expected = if broker == 5 { "kakao.send.cj" } else { "kakao.send.lg" };
            assert_eq!(envelope.address.routing_key, expected);
        }
    }

    #[tokio::test]
    async fn test_chat_without_rules_uses_every_broker() {
        let h = harness(directory());

        h.dispatcher
            .dispatch_seeded(&request(201, Channel::Chat, contacts(200)), 5)
            .await
            .unwrap();

        let cj = h.sink.count_for("kakao.send.cj");
        let lg = h.sink.count_for("kakao.send.lg");
        assert_eq!(cj + lg, 200);
        assert!(cj > 60 && lg > 60);
    }

    #[tokio::test]
    async fn test_chat_ignores_inactive_rules() {
        let mut inactive = rule(6, Channel::Chat, 100);
        inactive.status = RuleStatus::Inactive;
        let directory = directory().with_rule(rule(5, Channel::Chat, 100)).with_rule(inactive);
        let h = harness(directory);

        h.dispatcher
            .dispatch(&request(202, Channel::Chat, contacts(15)))
            .await
            .unwrap();

        assert_eq!(h.sink.count_for("kakao.send.cj"), 15);
    }

    #[tokio::test]
    async fn test_chat_zero_weight_is_config_error() {
        let directory = directory()
            .with_rule(rule(5, Channel::Chat, 0))
            .with_rule(rule(6, Channel::Chat, 0));
        let h = harness(directory);

        let result = h.dispatcher.dispatch(&request(203, Channel::Chat, contacts(3))).await;

        assert!(matches!(result, Err(DispatchError::Config(_))));
        assert!(h.store.keys().is_empty());
    }
}

// ============================================================================
// Ordering: a record is in the store before its envelope is published
// ============================================================================

struct StoreCheckingSink {
    store: Arc<MemoryResultStore>,
    inner: MemoryPipelineSink,
    missing: Mutex<Vec<String>>,
}

#[async_trait]
impl PipelineSink for StoreCheckingSink {
    async fn publish(&self, address: &RoutingAddress, envelope: EncodedEnvelope) -> bf_dispatch::Result<()> {
        let json: serde_json::Value = serde_json::from_slice(&envelope.body)?;
        let result = &json["messageResult"];
        let message_id = result["messageId"].as_i64().unwrap_or_default();
        let contact_id = result["contactId"].as_i64().unwrap_or_default();

        let stored: HashMap<String, String> = match result["resultId"].as_str() {
            Some(_) => self.store.read_hash(&format!("message.status.{}", message_id)).await?,
            None => {
                let broker = address.routing_key.rsplit('.').next().unwrap_or_default().to_uppercase();
                self.store.read_hash(&format!("{}.{}", message_id, broker)).await?
            }
        };

        let present = stored
            .values()
            .filter_map(|raw| serde_json::from_str::<ProvisionalResultRecord>(raw).ok())
            .any(|r| r.contact_id == contact_id && r.broker_id.is_some());
        if !present {
            self.missing.lock().push(envelope.delivery_id.clone());
        }

        self.inner.publish(address, envelope).await
    }
}

#[tokio::test]
async fn test_records_are_persisted_before_publish() {
    let directory = Arc::new(directory());
    let store = Arc::new(MemoryResultStore::new());
    let sink = Arc::new(StoreCheckingSink {
        store: store.clone(),
        inner: MemoryPipelineSink::new(),
        missing: Mutex::new(Vec::new()),
    });
    let dispatcher = Dispatcher::new(
        directory.clone(),
        directory,
        store,
        sink.clone(),
        DispatchSettings::default(),
    );

    dispatcher.dispatch(&request(300, Channel::Sms, contacts(9))).await.unwrap();
    dispatcher.dispatch(&request(301, Channel::Chat, contacts(9))).await.unwrap();

    assert_eq!(sink.inner.published().len(), 18);
    assert!(sink.missing.lock().is_empty(), "published before persisted: {:?}", sink.missing.lock());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatches_do_not_interfere() {
    let h = harness(directory());
    let dispatcher = Arc::new(h.dispatcher);

    let mut handles = Vec::new();
    for message_id in 400..408 {
        let dispatcher = dispatcher.clone();
        let channel = if message_id % 2 == 0 { Channel::Sms } else { Channel::Chat };
        let req = request(message_id, channel, contacts(25));
        handles.push(tokio::spawn(async move { dispatcher.dispatch(&req).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let published = h.sink.published();
    assert_eq!(published.len(), 8 * 25);

    for message_id in 400..408i64 {
        let delivered: HashSet<String> = published
            .iter()
            .filter(|p| p.envelope.delivery_id.starts_with(&format!("{}.", message_id)))
            .map(|p| p.envelope.delivery_id.clone())
            .collect();
        assert_eq!(delivered.len(), 25, "message {}", message_id);

        let records = if message_id % 2 == 0 {
            let mut total = 0;
            for broker in ["KT", "LG", "SKT"] {
                total += h.store.read_hash(&format!("{}.{}", message_id, broker)).await.unwrap().len();
            }
            total
        } else {
            h.store
                .read_hash(&format!("message.status.{}", message_id))
                .await
                .unwrap()
                .len()
        };
        assert_eq!(records, 25, "message {}", message_id);
    }
}

// ============================================================================
// Failures
// ============================================================================

/// Rejects one phone number, encodes everything else as JSON
struct PickyCodec {
    reject: String,
}

impl EnvelopeCodec for PickyCodec {
    fn encode(&self, envelope: &DispatchEnvelope<'_>) -> bf_dispatch::Result<EncodedEnvelope> {
        if envelope.message.to == self.reject {
            return Err(DispatchError::Serialization("unencodable payload".to_string()));
        }
        JsonCodec.encode(envelope)
    }
}

#[tokio::test]
async fn test_serialization_failure_skips_only_that_recipient() {
    let recipients = contacts(6);
    let reject = recipients[2].phone_number.clone();
    let h = harness(directory());
    let dispatcher = h.dispatcher.with_codec(Arc::new(PickyCodec { reject: reject.clone() }));

    dispatcher
        .dispatch(&request(500, Channel::Chat, recipients))
        .await
        .unwrap();

    let sent: Vec<String> = h
        .sink
        .published()
        .iter()
        .map(|p| p.json().unwrap()["message"]["to"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(sent.len(), 5);
    assert!(!sent.contains(&reject));

    // the record stays; no rollback
    let status = h.store.read_hash("message.status.500").await.unwrap();
    assert_eq!(status.len(), 6);
}

#[tokio::test]
async fn test_unknown_member_is_lookup_error() {
    let h = harness(directory());
    let mut req = request(600, Channel::Sms, contacts(3));
    req.member_id = 99;

    let result = h.dispatcher.dispatch(&req).await;

    let err = result.unwrap_err();
    assert!(matches!(err, DispatchError::Lookup(_)));
    assert!(err.is_precondition());
    assert!(h.store.keys().is_empty());
}

#[tokio::test]
async fn test_missing_broker_is_lookup_error() {
    let directory = StaticDirectory::new()
        .with_member(MEMBER)
        .with_broker(Broker { id: 1, name: "KT".to_string(), channel: Channel::Sms });
    let h = harness(directory);

    let result = h.dispatcher.dispatch(&request(601, Channel::Sms, contacts(3))).await;

    assert!(matches!(result, Err(DispatchError::Lookup(_))));
    assert!(h.sink.published().is_empty());
}

#[tokio::test]
async fn test_channel_specific_entry_rejects_other_channel() {
    let h = harness(directory());

    let result = h
        .dispatcher
        .dispatch_chat(&request(602, Channel::Sms, contacts(1)))
        .await;

    assert!(matches!(result, Err(DispatchError::Config(_))));
}

#[tokio::test]
async fn test_store_failure_aborts_call() {
    let h = harness(directory());
    h.store.set_available(false);

    let result = h.dispatcher.dispatch(&request(603, Channel::Sms, contacts(4))).await;

    assert!(matches!(result, Err(DispatchError::Store(_))));
    assert!(h.sink.published().is_empty());
}

#[tokio::test]
async fn test_publish_failure_aborts_without_rollback() {
    let directory = directory().with_rule(rule(1, Channel::Sms, 100));
    let h = harness(directory);
    h.sink.set_available(false);

    let result = h.dispatcher.dispatch(&request(604, Channel::Sms, contacts(4))).await;

    assert!(matches!(result, Err(DispatchError::Publish(_))));
    assert_eq!(h.store.read_hash("604.KT").await.unwrap().len(), 4);
    assert!(!h.dispatcher.is_healthy());
}

#[tokio::test]
async fn test_repeated_broker_in_settings_is_config_error() {
    let directory = Arc::new(directory());
    let store = Arc::new(MemoryResultStore::new());
    let sink = Arc::new(MemoryPipelineSink::new());
    let mut settings = DispatchSettings::default();
    settings.sms.brokers = vec!["KT".to_string(), "LG".to_string(), "KT".to_string()];
    let dispatcher = Dispatcher::new(directory.clone(), directory, store.clone(), sink.clone(), settings);

    // a single recipient would otherwise slip through as pure remainder
    for total in [1, 99] {
        let result = dispatcher
            .dispatch_seeded(&request(605, Channel::Sms, contacts(total)), 1)
            .await;
        assert!(matches!(result, Err(DispatchError::Config(_))), "total {}", total);
    }
    assert!(store.keys().is_empty());
    assert!(sink.published().is_empty());
}

/// Accepts nothing, reporting its own framing failure as an encoding error
struct FramingSink;

#[async_trait]
impl PipelineSink for FramingSink {
    async fn publish(&self, _address: &RoutingAddress, _envelope: EncodedEnvelope) -> bf_dispatch::Result<()> {
        Err(DispatchError::Serialization("frame exceeds broker limit".to_string()))
    }
}

#[tokio::test]
async fn test_sink_side_encoding_error_aborts_call() {
    let directory = Arc::new(directory());
    let store = Arc::new(MemoryResultStore::new());
    let dispatcher = Dispatcher::new(
        directory.clone(),
        directory,
        store.clone(),
        Arc::new(FramingSink),
        DispatchSettings::default(),
    );

    let result = dispatcher.dispatch(&request(606, Channel::Chat, contacts(3))).await;

    assert!(matches!(result, Err(DispatchError::Publish(_))));
    // stopped at the first recipient
    assert_eq!(store.read_hash("message.status.606").await.unwrap().len(), 1);
}
