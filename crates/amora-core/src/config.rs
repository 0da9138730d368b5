use std::collections::HashMap;

use anyhow::{Context, anyhow, bail};

use amora_types::models::MessageType;

/// Read-only business settings the core consults.
pub trait ConfigProvider: Send + Sync {
    /// Rolling 30-day usage spend required for VIP.
    fn vip_spend_threshold(&self) -> i64;

    /// Credits charged to the sender for one message of this type.
    fn message_cost(&self, message_type: MessageType) -> i64;
}

/// Settings fixed at start-up.
#[derive(Debug, Clone)]
pub struct StaticConfig {
    pub vip_spend_threshold: i64,
    pub message_costs: HashMap<MessageType, i64>,
}

pub const DEFAULT_VIP_THRESHOLD: i64 = 1000;

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            vip_spend_threshold: DEFAULT_VIP_THRESHOLD,
            message_costs: HashMap::new(),
        }
    }
}

impl StaticConfig {
    /// Parse a cost table such as `image=5,video=10,gift=20`.
    pub fn parse_message_costs(raw: &str) -> anyhow::Result<HashMap<MessageType, i64>> {
        let mut costs = HashMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (kind, cost) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("expected type=cost, got '{}'", entry))?;
            let kind: MessageType = kind.trim().parse()?;
            let cost: i64 = cost
                .trim()
                .parse()
                .with_context(|| format!("invalid cost for {}: '{}'", kind, cost.trim()))?;
            if cost < 0 {
                bail!("negative cost for {}", kind);
            }
            costs.insert(kind, cost);
        }
        Ok(costs)
    }
}

impl ConfigProvider for StaticConfig {
    fn vip_spend_threshold(&self) -> i64 {
        self.vip_spend_threshold
    }

    fn message_cost(&self, message_type: MessageType) -> i64 {
        self.message_costs.get(&message_type).copied().unwrap_or(0)
    }
}
