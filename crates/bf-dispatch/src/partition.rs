//! Percentage-based split of a recipient batch across the SMS carriers.
//!
//! Counts are `floor(rate * total / 100)` per broker. Whatever the flooring
//! loses goes, in one piece, to a single broker picked uniformly at random.
//! Recipients are then cut into consecutive runs in the fixed carrier order.

use std::collections::HashSet;

use bf_common::{Broker, BrokerRateRule};
use rand::Rng;

use crate::{DispatchError, Result};

/// Ordered (broker, rate) pairs for one dispatch call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTable {
    entries: Vec<(Broker, u32)>,
}

impl RateTable {
    /// Build the table for `brokers` (fixed carrier order) from a member's rules.
    ///
    /// Inactive rules are ignored. With no active rule every broker gets
    /// `100 / N`. Brokers without a rule get 0.
    pub fn resolve(brokers: &[Broker], rules: &[BrokerRateRule]) -> Result<Self> {
        if brokers.is_empty() {
            return Err(DispatchError::Config("broker set is empty".to_string()));
        }
        let mut ids = HashSet::new();
        if let Some(dup) = brokers.iter().find(|b| !ids.insert(b.id)) {
            return Err(DispatchError::Config(format!(
                "broker {} ({}) appears twice in the broker set",
                dup.id, dup.name
            )));
        }

        let active: Vec<&BrokerRateRule> = rules.iter().filter(|r| r.is_active()).collect();

        if active.is_empty() {
            let share = equal_share(brokers.len());
            return Ok(Self {
                entries: brokers.iter().map(|b| (b.clone(), share)).collect(),
            });
        }

        let mut seen = HashSet::new();
        let mut sum: u32 = 0;
        for rule in &active {
            if !brokers.iter().any(|b| b.id == rule.broker_id) {
                return Err(DispatchError::Config(format!(
                    "rule references broker {} outside the {} broker set",
                    rule.broker_id, rule.channel
                )));
            }
            if !seen.insert(rule.broker_id) {
                return Err(DispatchError::Config(format!(
                    "duplicate rule for broker {}",
                    rule.broker_id
                )));
            }
            if rule.rate > 100 {
                return Err(DispatchError::Config(format!(
                    "rate {} for broker {} exceeds 100",
                    rule.rate, rule.broker_id
                )));
            }
            sum += rule.rate;
        }
        if sum != 100 {
            return Err(DispatchError::Config(format!(
                "broker rates sum to {}, expected 100",
                sum
            )));
        }

        let entries = brokers
            .iter()
            .map(|broker| {
                let rate = active
                    .iter()
                    .find(|r| r.broker_id == broker.id)
                    .map(|r| r.rate)
                    .unwrap_or(0);
                (broker.clone(), rate)
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn rates(&self) -> Vec<u32> {
        self.entries.iter().map(|(_, rate)| *rate).collect()
    }

    pub fn brokers(&self) -> impl Iterator<Item = &Broker> {
        self.entries.iter().map(|(broker, _)| broker)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fallback weight when a member has no rules
pub fn equal_share(broker_count: usize) -> u32 {
    if broker_count == 0 {
        return 0;
    }
    (100 / broker_count) as u32
}

/// Split `total` into per-broker counts parallel to `rates`.
///
/// The result always sums to `total`.
pub fn split_counts<R: Rng + ?Sized>(total: usize, rates: &[u32], rng: &mut R) -> Result<Vec<usize>> {
    if rates.is_empty() {
        return Err(DispatchError::Config("no brokers to split across".to_string()));
    }
    if let Some(rate) = rates.iter().find(|&&r| r > 100) {
        return Err(DispatchError::Config(format!("rate {} exceeds 100", rate)));
    }

    let mut counts: Vec<usize> = rates
        .iter()
        .map(|&rate| (rate as u64 * total as u64 / 100) as usize)
        .collect();

    let assigned: usize = counts.iter().sum();
    if assigned > total {
        return Err(DispatchError::Config(format!(
            "rates {:?} allocate {} of {} recipients",
            rates, assigned, total
        )));
    }

    let remainder = total - assigned;
    if remainder > 0 {
        let lucky = rng.gen_range(0..counts.len());
        counts[lucky] += remainder;
    }

    Ok(counts)
}

/// Per-broker share of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub broker: Broker,
    pub count: usize,
}

pub fn partition<R: Rng + ?Sized>(total: usize, table: &RateTable, rng: &mut R) -> Result<Vec<Allocation>> {
    let counts = split_counts(total, &table.rates(), rng)?;
    Ok(table
        .brokers()
        .zip(counts)
        .map(|(broker, count)| Allocation {
            broker: broker.clone(),
            count,
        })
        .collect())
}

/// A consecutive run of recipients routed to one broker
#[derive(Debug, Clone, Copy)]
pub struct Slice<'a, T> {
    pub broker: &'a Broker,
    /// Position of the first recipient in the caller's list
    pub start: usize,
    pub recipients: &'a [T],
}

/// Cut `recipients` into runs in allocation order.
///
/// Allocations must sum to `recipients.len()`.
pub fn slice_recipients<'a, T>(recipients: &'a [T], allocations: &'a [Allocation]) -> Vec<Slice<'a, T>> {
    let mut start = 0;
    allocations
        .iter()
        .map(|allocation| {
            let end = (start + allocation.count).min(recipients.len());
            let slice = Slice {
                broker: &allocation.broker,
                start,
                recipients: &recipients[start..end],
            };
            start = end;
            slice
        })
        .collect()
}
