//! Publish-only handoff to the downstream delivery pipeline.

use async_trait::async_trait;

use crate::codec::EncodedEnvelope;
use crate::Result;

pub mod memory;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use memory::{MemoryPipelineSink, PublishedEnvelope};

#[cfg(feature = "amqp")]
pub use amqp::{AmqpPipelineSink, AmqpSinkConfig};

/// Where an envelope is published for a given broker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingAddress {
    pub exchange: String,
    pub routing_key: String,
}

#[async_trait]
pub trait PipelineSink: Send + Sync {
    /// Publish one envelope. Errors are `Publish` errors.
    async fn publish(&self, address: &RoutingAddress, envelope: EncodedEnvelope) -> Result<()>;

    fn is_healthy(&self) -> bool {
        true
    }
}
