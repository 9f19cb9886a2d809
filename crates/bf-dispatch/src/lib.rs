//! Broker fan-out dispatch engine
//!
//! Splits an outbound message's recipients across delivery brokers, writes a
//! provisional result record per recipient into a short-lived store, and
//! publishes one envelope per recipient to the delivery pipeline.
//!
//! - SMS: percentage split over the fixed carrier set ([`partition`])
//! - Chat: weighted random draw per recipient ([`pool`])
//!
//! Store and pipeline are trait seams ([`ResultStore`], [`PipelineSink`])
//! with in-memory implementations, plus Redis (`redis` feature) and AMQP
//! (`amqp` feature) backends.

pub mod codec;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod partition;
pub mod pool;
pub mod publisher;
pub mod recorder;
pub mod settings;
pub mod sink;
pub mod store;

pub use codec::{DispatchEnvelope, EncodedEnvelope, EnvelopeCodec, JsonCodec, CONTENT_TYPE_JSON};
pub use directory::{BrokerDirectory, RuleSource, StaticDirectory};
pub use dispatcher::{DispatchRequest, Dispatcher};
pub use error::DispatchError;
pub use partition::{partition, split_counts, Allocation, RateTable};
pub use pool::WeightedBrokerPool;
pub use publisher::DispatchPublisher;
pub use recorder::{RecordTtls, ResultRecorder};
pub use settings::{ChannelSettings, DispatchSettings};
pub use sink::{MemoryPipelineSink, PipelineSink, PublishedEnvelope, RoutingAddress};
pub use store::{MemoryResultStore, ResultStore};

#[cfg(feature = "redis")]
pub use store::RedisResultStore;

#[cfg(feature = "amqp")]
pub use sink::{AmqpPipelineSink, AmqpSinkConfig};

pub type Result<T> = std::result::Result<T, DispatchError>;
