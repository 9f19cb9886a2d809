use std::time::Duration;

use bf_common::Channel;
use bf_config::AppConfig;

use crate::sink::RoutingAddress;

/// Routing and broker set of one channel
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub exchange: String,
    pub routing_prefix: String,
    /// Fixed broker order for this channel
    pub brokers: Vec<String>,
}

impl ChannelSettings {
    /// `<prefix>.send.<broker-name-lowercase>`
    pub fn routing_key(&self, broker_name: &str) -> String {
        format!("{}.send.{}", self.routing_prefix, broker_name.to_lowercase())
    }

    pub fn address(&self, broker_name: &str) -> RoutingAddress {
        RoutingAddress {
            exchange: self.exchange.clone(),
            routing_key: self.routing_key(broker_name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub sms: ChannelSettings,
    pub chat: ChannelSettings,
    pub sms_result_ttl: Duration,
    pub chat_scratch_ttl: Duration,
    pub chat_shadow_ttl: Duration,
}

impl DispatchSettings {
    pub fn channel(&self, channel: Channel) -> &ChannelSettings {
        match channel {
            Channel::Sms => &self.sms,
            Channel::Chat => &self.chat,
        }
    }

    /// Every exchange the dispatcher publishes to
    pub fn exchanges(&self) -> Vec<String> {
        let mut exchanges = vec![self.sms.exchange.clone()];
        if self.chat.exchange != self.sms.exchange {
            exchanges.push(self.chat.exchange.clone());
        }
        exchanges
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DispatchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            sms: ChannelSettings {
                exchange: config.sms.exchange.clone(),
                routing_prefix: config.sms.routing_prefix.clone(),
                brokers: config.sms.brokers.clone(),
            },
            chat: ChannelSettings {
                exchange: config.chat.exchange.clone(),
                routing_prefix: config.chat.routing_prefix.clone(),
                brokers: config.chat.brokers.clone(),
            },
            sms_result_ttl: Duration::from_secs(config.sms.result_ttl_secs),
            chat_scratch_ttl: Duration::from_secs(config.chat.scratch_ttl_secs),
            chat_shadow_ttl: Duration::from_secs(config.chat.shadow_ttl_secs),
        }
    }
}
