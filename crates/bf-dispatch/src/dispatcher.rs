//! Dispatch orchestration.
//!
//! One call resolves the member's rules and the channel's brokers, assigns
//! every recipient to a broker, records its provisional result and then
//! publishes its envelope. Recipients are handled strictly in order.
//! Precondition failures surface before any recipient is touched; after
//! that nothing is retried or rolled back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bf_common::{Broker, BrokerRateRule, Channel, Contact, MemberId, Message, OutboundPayload, ProvisionalResultRecord};
use metrics::{counter, histogram};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::codec::{DispatchEnvelope, EnvelopeCodec};
use crate::directory::{BrokerDirectory, RuleSource};
use crate::partition::{partition, slice_recipients, RateTable};
use crate::pool::WeightedBrokerPool;
use crate::publisher::DispatchPublisher;
use crate::recorder::{RecordTtls, ResultRecorder};
use crate::settings::DispatchSettings;
use crate::sink::{PipelineSink, RoutingAddress};
use crate::store::ResultStore;
use crate::{DispatchError, Result};

/// One outbound message fanned out to its recipients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub member_id: MemberId,
    pub message: Message,
    pub payload: OutboundPayload,
    /// Delivery order is the order of this list
    #[serde(default)]
    pub recipients: Vec<Contact>,
}

/// State owned by a single dispatch call
struct DispatchContext {
    channel: Channel,
    rng: StdRng,
    published: usize,
    skipped: usize,
}

impl DispatchContext {
    fn new(channel: Channel, rng: StdRng) -> Self {
        Self {
            channel,
            rng,
            published: 0,
            skipped: 0,
        }
    }
}

pub struct Dispatcher {
    rules: Arc<dyn RuleSource>,
    brokers: Arc<dyn BrokerDirectory>,
    recorder: ResultRecorder,
    publisher: DispatchPublisher,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        rules: Arc<dyn RuleSource>,
        brokers: Arc<dyn BrokerDirectory>,
        store: Arc<dyn ResultStore>,
        sink: Arc<dyn PipelineSink>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            rules,
            brokers,
            recorder: ResultRecorder::new(store, RecordTtls::from(&settings)),
            publisher: DispatchPublisher::new(sink),
            settings,
        }
    }

    /// Replace the default JSON envelope codec
    pub fn with_codec(mut self, codec: Arc<dyn EnvelopeCodec>) -> Self {
        self.publisher.set_codec(codec);
        self
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn is_healthy(&self) -> bool {
        self.publisher.is_healthy()
    }

    /// Route by the message's channel. Returns the processing time.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<Duration> {
        self.run(request, StdRng::from_entropy()).await
    }

    /// Same as [`dispatch`](Self::dispatch) with a reproducible broker assignment
    pub async fn dispatch_seeded(&self, request: &DispatchRequest, seed: u64) -> Result<Duration> {
        self.run(request, StdRng::seed_from_u64(seed)).await
    }

    pub async fn dispatch_sms(&self, request: &DispatchRequest) -> Result<Duration> {
        expect_channel(request, Channel::Sms)?;
        self.run(request, StdRng::from_entropy()).await
    }

    pub async fn dispatch_chat(&self, request: &DispatchRequest) -> Result<Duration> {
        expect_channel(request, Channel::Chat)?;
        self.run(request, StdRng::from_entropy()).await
    }

    async fn run(&self, request: &DispatchRequest, rng: StdRng) -> Result<Duration> {
        let started = Instant::now();
        let channel = request.message.channel;
        let span = info_span!(
            "dispatch",
            message_id = request.message.id,
            member_id = request.member_id,
            channel = %channel,
            recipients = request.recipients.len()
        );

        async move {
            counter!("dispatch.calls_total", "channel" => channel.as_str()).increment(1);

            let mut ctx = DispatchContext::new(channel, rng);
            match channel {
                Channel::Sms => self.fan_out_sms(request, &mut ctx).await?,
                Channel::Chat => self.fan_out_chat(request, &mut ctx).await?,
            }

            let elapsed = started.elapsed();
            histogram!("dispatch.duration_ms", "channel" => channel.as_str())
                .record(elapsed.as_secs_f64() * 1000.0);
            info!(
                published = ctx.published,
                skipped = ctx.skipped,
                elapsed_ms = elapsed.as_millis() as u64,
                "Dispatch completed"
            );
            Ok(elapsed)
        }
        .instrument(span)
        .await
    }

    async fn fan_out_sms(&self, request: &DispatchRequest, ctx: &mut DispatchContext) -> Result<()> {
        let rules = self.rules.rules_for(request.member_id, Channel::Sms).await?;
        let brokers = self.resolve_brokers(Channel::Sms).await?;
        let table = RateTable::resolve(&brokers, &rules)?;
        let allocations = partition(request.recipients.len(), &table, &mut ctx.rng)?;

        for slice in slice_recipients(&request.recipients, &allocations) {
            if slice.recipients.is_empty() {
                continue;
            }
            debug!(broker = %slice.broker.name, count = slice.recipients.len(), "SMS slice assigned");

            let records = self
                .recorder
                .record_sms_slice(request.message.id, slice.broker, slice.start, slice.recipients)
                .await?;

            let address = self.settings.sms.address(&slice.broker.name);
            for (contact, record) in slice.recipients.iter().zip(&records) {
                self.publish_one(ctx, &address, request, contact, record).await?;
            }
        }
        Ok(())
    }

    async fn fan_out_chat(&self, request: &DispatchRequest, ctx: &mut DispatchContext) -> Result<()> {
        let rules = self.rules.rules_for(request.member_id, Channel::Chat).await?;
        let brokers = self.resolve_brokers(Channel::Chat).await?;
        let pool = chat_pool(&brokers, &rules)?;

        let staged = self
            .recorder
            .stage_chat(request.message.id, &request.recipients)
            .await?;

        for (contact, staged) in request.recipients.iter().zip(&staged) {
            let broker = pool.next_with(&mut ctx.rng);
            let record = self.recorder.commit_chat(request.message.id, staged, broker).await?;

            let address = self.settings.chat.address(&broker.name);
            self.publish_one(ctx, &address, request, contact, &record).await?;
        }
        Ok(())
    }

    /// The channel's fixed broker set, in configured order
    async fn resolve_brokers(&self, channel: Channel) -> Result<Vec<Broker>> {
        let names = &self.settings.channel(channel).brokers;
        if names.is_empty() {
            return Err(DispatchError::Config(format!("{} broker set is empty", channel)));
        }

        let mut brokers = Vec::with_capacity(names.len());
        for name in names {
            let broker = self
                .brokers
                .find_by_name(channel, name)
                .await?
                .ok_or_else(|| DispatchError::Lookup(format!("{} broker {} not found", channel, name)))?;
            if brokers.iter().any(|b: &Broker| b.id == broker.id) {
                return Err(DispatchError::Config(format!(
                    "{} broker {} is listed twice",
                    channel, broker.name
                )));
            }
            brokers.push(broker);
        }
        Ok(brokers)
    }

    async fn publish_one(
        &self,
        ctx: &mut DispatchContext,
        address: &RoutingAddress,
        request: &DispatchRequest,
        contact: &Contact,
        record: &ProvisionalResultRecord,
    ) -> Result<()> {
        let envelope = DispatchEnvelope::new(&request.message, &request.payload, contact, record);

        match self.publisher.publish(address, &envelope).await {
            Ok(()) => {
                ctx.published += 1;
                counter!("dispatch.recipients.published_total", "channel" => ctx.channel.as_str()).increment(1);
                Ok(())
            }
            Err(DispatchError::Serialization(reason)) => {
                ctx.skipped += 1;
                counter!("dispatch.recipients.skipped_total", "channel" => ctx.channel.as_str()).increment(1);
                warn!(contact_id = contact.id, error = %reason, "Envelope encoding failed, recipient skipped");
                Ok(())
            }
            Err(e) => {
                error!(contact_id = contact.id, routing_key = %address.routing_key, error = %e, "Publish failed");
                Err(e)
            }
        }
    }
}

fn expect_channel(request: &DispatchRequest, channel: Channel) -> Result<()> {
    if request.message.channel != channel {
        return Err(DispatchError::Config(format!(
            "message {} is a {} message, not {}",
            request.message.id, request.message.channel, channel
        )));
    }
    Ok(())
}

/// Weighted pool over the chat brokers. Without active rules every broker
/// gets the same weight.
fn chat_pool(brokers: &[Broker], rules: &[BrokerRateRule]) -> Result<WeightedBrokerPool<Broker>> {
    let active: Vec<&BrokerRateRule> = rules.iter().filter(|r| r.is_active()).collect();
    if active.is_empty() {
        return WeightedBrokerPool::uniform(brokers.iter().cloned());
    }

    let mut entries = Vec::with_capacity(active.len());
    for rule in active {
        let broker = brokers
            .iter()
            .find(|b| b.id == rule.broker_id)
            .ok_or_else(|| {
                DispatchError::Config(format!("rule references broker {} outside the chat broker set", rule.broker_id))
            })?;
        entries.push((broker.clone(), rule.rate));
    }
    WeightedBrokerPool::new(entries)
}
