//! Encodes per-recipient envelopes and hands them to the pipeline sink.

use std::sync::Arc;

use tracing::debug;

use crate::codec::{DispatchEnvelope, EnvelopeCodec, JsonCodec};
use crate::sink::{PipelineSink, RoutingAddress};
use crate::{DispatchError, Result};

pub struct DispatchPublisher {
    sink: Arc<dyn PipelineSink>,
    codec: Arc<dyn EnvelopeCodec>,
}

impl DispatchPublisher {
    pub fn new(sink: Arc<dyn PipelineSink>) -> Self {
        Self::with_codec(sink, Arc::new(JsonCodec))
    }

    pub fn with_codec(sink: Arc<dyn PipelineSink>, codec: Arc<dyn EnvelopeCodec>) -> Self {
        Self { sink, codec }
    }

    pub fn set_codec(&mut self, codec: Arc<dyn EnvelopeCodec>) {
        self.codec = codec;
    }

    /// Encode then publish. Encoding failures come back as `Serialization`
    /// before anything reaches the sink.
    pub async fn publish(&self, address: &RoutingAddress, envelope: &DispatchEnvelope<'_>) -> Result<()> {
        let encoded = self.codec.encode(envelope)?;
        let delivery_id = encoded.delivery_id.clone();

        // only codec failures are per-recipient; anything from the sink aborts
        self.sink.publish(address, encoded).await.map_err(|e| match e {
            DispatchError::Serialization(reason) => DispatchError::Publish(reason),
            other => other,
        })?;

        debug!(
            delivery_id = %delivery_id,
            routing_key = %address.routing_key,
            "Envelope handed to pipeline"
        );
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        self.sink.is_healthy()
    }
}
