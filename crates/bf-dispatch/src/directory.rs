//! Read-only lookups consumed at dispatch time.
//!
//! The rule and broker stores live outside this crate. `StaticDirectory`
//! serves both lookups from an in-memory fixture (development, tests).

use std::path::Path;

use async_trait::async_trait;
use bf_common::{Broker, BrokerRateRule, Channel, MemberId};
use serde::{Deserialize, Serialize};

use crate::{DispatchError, Result};

/// Broker rate rules of a member
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Rules of `member_id` for one channel. An empty list means equal split.
    /// Unknown members are a `Lookup` error.
    async fn rules_for(&self, member_id: MemberId, channel: Channel) -> Result<Vec<BrokerRateRule>>;
}

#[async_trait]
pub trait BrokerDirectory: Send + Sync {
    /// Case-insensitive lookup by broker name
    async fn find_by_name(&self, channel: Channel, name: &str) -> Result<Option<Broker>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticDirectory {
    #[serde(default)]
    members: Vec<MemberId>,
    #[serde(default)]
    brokers: Vec<Broker>,
    #[serde(default)]
    rules: Vec<BrokerRateRule>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON fixture: `{"members": [..], "brokers": [..], "rules": [..]}`
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::Config(format!("cannot read directory {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            DispatchError::Config(format!("invalid directory {}: {}", path.display(), e))
        })
    }

    pub fn with_member(mut self, member_id: MemberId) -> Self {
        self.members.push(member_id);
        self
    }

    pub fn with_broker(mut self, broker: Broker) -> Self {
        self.brokers.push(broker);
        self
    }

    pub fn with_rule(mut self, rule: BrokerRateRule) -> Self {
        self.rules.push(rule);
        self
    }
}

#[async_trait]
impl RuleSource for StaticDirectory {
    async fn rules_for(&self, member_id: MemberId, channel: Channel) -> Result<Vec<BrokerRateRule>> {
        if !self.members.contains(&member_id) {
            return Err(DispatchError::Lookup(format!("member {} does not exist", member_id)));
        }

        Ok(self
            .rules
            .iter()
            .filter(|r| r.member_id == member_id && r.channel == channel)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BrokerDirectory for StaticDirectory {
    async fn find_by_name(&self, channel: Channel, name: &str) -> Result<Option<Broker>> {
        Ok(self
            .brokers
            .iter()
            .find(|b| b.channel == channel && b.name.eq_ignore_ascii_case(name))
            .cloned())
    }
}
