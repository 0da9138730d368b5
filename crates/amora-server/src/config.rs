//! Server configuration loaded from environment variables.
//!
//! Everything except the JWT secret has a default suitable for local
//! development.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use amora_core::StaticConfig;
use amora_core::config::DEFAULT_VIP_THRESHOLD;
use amora_types::models::MessageType;

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "",
    "changeme",
    "change-me",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `AMORA_HOST` / `AMORA_PORT`
    /// Default: `0.0.0.0:3000`
    pub addr: SocketAddr,

    /// Env: `AMORA_DB_PATH`
    /// Default: `amora.db`
    pub db_path: PathBuf,

    /// HS256 key shared with the login service.
    /// Env: `AMORA_JWT_SECRET` (required)
    pub jwt_secret: String,

    /// Env: `AMORA_VIP_THRESHOLD`
    pub vip_threshold: i64,

    /// Env: `AMORA_MESSAGE_COSTS`, e.g. `image=5,video=10,gift=20`
    /// Default: every type free
    pub message_costs: HashMap<MessageType, i64>,

    /// Env: `AMORA_SWEEP_INTERVAL_SECS`
    /// Default: one hour
    pub sweep_interval_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = var("AMORA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = var("AMORA_PORT").unwrap_or_else(|| "3000".into());
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let jwt_secret = var("AMORA_JWT_SECRET").unwrap_or_default();
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("AMORA_JWT_SECRET must be set to a real secret");
        }

        let mut vip_threshold = DEFAULT_VIP_THRESHOLD;
        if let Some(val) = var("AMORA_VIP_THRESHOLD") {
            match val.parse::<i64>() {
                Ok(n) if n > 0 => vip_threshold = n,
                _ => tracing::warn!(value = %val, "Invalid AMORA_VIP_THRESHOLD, using default"),
            }
        }

        let mut sweep_interval_secs = 3600;
        if let Some(val) = var("AMORA_SWEEP_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => sweep_interval_secs = n,
                _ => tracing::warn!(value = %val, "Invalid AMORA_SWEEP_INTERVAL_SECS, using default"),
            }
        }

        let message_costs = match var("AMORA_MESSAGE_COSTS") {
            Some(raw) => StaticConfig::parse_message_costs(&raw)
                .context("invalid AMORA_MESSAGE_COSTS")?,
            None => HashMap::new(),
        };

        Ok(Self {
            addr,
            db_path: PathBuf::from(var("AMORA_DB_PATH").unwrap_or_else(|| "amora.db".into())),
            jwt_secret,
            vip_threshold,
            message_costs,
            sweep_interval_secs,
        })
    }

    /// The business settings handed to the core.
    pub fn business(&self) -> StaticConfig {
        StaticConfig {
            vip_spend_threshold: self.vip_threshold,
            message_costs: self.message_costs.clone(),
        }
    }
}
