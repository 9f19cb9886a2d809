//! In-memory pipeline sink (for testing/development)

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{PipelineSink, RoutingAddress};
use crate::codec::EncodedEnvelope;
use crate::{DispatchError, Result};

#[derive(Debug, Clone)]
pub struct PublishedEnvelope {
    pub address: RoutingAddress,
    pub envelope: EncodedEnvelope,
}

impl PublishedEnvelope {
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.envelope.body)?)
    }
}

/// Records every publish in order
pub struct MemoryPipelineSink {
    published: Mutex<Vec<PublishedEnvelope>>,
    available: AtomicBool,
}

impl MemoryPipelineSink {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an unreachable pipeline
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedEnvelope> {
        self.published.lock().clone()
    }

    pub fn count_for(&self, routing_key: &str) -> usize {
        self.published
            .lock()
            .iter()
            .filter(|p| p.address.routing_key == routing_key)
            .count()
    }
}

impl Default for MemoryPipelineSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineSink for MemoryPipelineSink {
    async fn publish(&self, address: &RoutingAddress, envelope: EncodedEnvelope) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DispatchError::Publish("pipeline unavailable".to_string()));
        }

        self.published.lock().push(PublishedEnvelope {
            address: address.clone(),
            envelope,
        });
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
