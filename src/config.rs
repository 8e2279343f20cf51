//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub thrift: ThriftConfig,
    #[serde(default)]
    pub eligibility: EligibilityConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    #[serde(default = "default_node_id")]
    pub id: String,

    /// Data directory holding the ledger database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

/// Thrift cycle defaults applied when a member opens a cycle without
/// explicit terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThriftConfig {
    /// Default weekly contribution in minor currency units
    #[serde(default = "default_weekly_contribution")]
    pub weekly_contribution_default: i64,

    /// Default number of planned weeks per cycle
    #[serde(default = "default_planned_weeks")]
    pub planned_weeks_default: u32,

    /// Whether cancelling a thrift settles defaults and refunds the balance
    #[serde(default = "default_true")]
    pub refund_on_cancel: bool,
}

/// Referral thresholds for the bonus benefit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    #[serde(default = "default_min_total")]
    pub min_total_referrals: u32,

    #[serde(default = "default_min_recent")]
    pub min_recent_referrals: u32,

    #[serde(default = "default_min_active")]
    pub min_active_referrals: u32,

    /// Rolling window, in days, for the "recent" referral count
    #[serde(default = "default_recent_window")]
    pub recent_window_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret the provider signs request bodies with
    #[serde(default)]
    pub secret: String,

    /// Per-event processing deadline in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Whether the default sweep runs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between sweep passes, in seconds
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Retry attempts per thrift on transient store failures
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff between retries, in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

// Defaults
fn default_node_id() -> String { "thrift-1".to_string() }
fn default_data_dir() -> PathBuf { PathBuf::from("/var/lib/thriftd") }
fn default_http_port() -> u16 { 8080 }
fn default_weekly_contribution() -> i64 { 100_000 } // 1000.00 in minor units
fn default_planned_weeks() -> u32 { 52 }
fn default_min_total() -> u32 { 5 }
fn default_min_recent() -> u32 { 3 }
fn default_min_active() -> u32 { 2 }
fn default_recent_window() -> u32 { 40 }
fn default_deadline_ms() -> u64 { 10_000 }
fn default_sweep_interval() -> u64 { 86_400 }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_backoff() -> u64 { 500 }
fn default_true() -> bool { true }

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { http_port: default_http_port() }
    }
}

impl Default for ThriftConfig {
    fn default() -> Self {
        Self {
            weekly_contribution_default: default_weekly_contribution(),
            planned_weeks_default: default_planned_weeks(),
            refund_on_cancel: true,
        }
    }
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            min_total_referrals: default_min_total(),
            min_recent_referrals: default_min_recent(),
            min_active_referrals: default_min_active(),
            recent_window_days: default_recent_window(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweep_interval(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}
