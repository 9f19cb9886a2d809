//! Weighted random broker selection for the chat channel.
//!
//! Sampling is with replacement: each draw is independent, so over many
//! draws a broker is picked with frequency `weight / total_weight`.

use rand::Rng;

use crate::{DispatchError, Result};

#[derive(Debug, Clone)]
pub struct WeightedBrokerPool<T> {
    items: Vec<T>,
    /// Cumulative upper bound of each item over `[0, total)`
    upper_bounds: Vec<u64>,
    total: u64,
}

impl<T> WeightedBrokerPool<T> {
    /// Build a pool from (item, weight) pairs. Zero-weight items are never drawn.
    pub fn new<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (T, u32)>,
    {
        let mut items = Vec::new();
        let mut upper_bounds = Vec::new();
        let mut total: u64 = 0;

        for (item, weight) in entries {
            total += u64::from(weight);
            items.push(item);
            upper_bounds.push(total);
        }

        if total == 0 {
            return Err(DispatchError::Config(
                "weighted broker pool has zero total weight".to_string(),
            ));
        }

        Ok(Self {
            items,
            upper_bounds,
            total,
        })
    }

    /// Equal weight for every item
    pub fn uniform<I>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
    {
        Self::new(items.into_iter().map(|item| (item, 1)))
    }

    /// Draw one item using the thread-local random source
    pub fn next(&self) -> &T {
        self.next_with(&mut rand::thread_rng())
    }

    /// Draw one item using the given random source
    pub fn next_with<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        let draw = rng.gen_range(0..self.total);
        let idx = self.upper_bounds.partition_point(|&bound| bound <= draw);
        &self.items[idx]
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
