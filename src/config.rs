//! Service configuration parsed from environment variables.
//!
//! Every key is optional. Missing or unparseable values fall back to the
//! defaults below, so a bare `cargo run` boots a seeded console on :3000.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SIM_LATENCY_MS: u64 = 600;
pub const DEFAULT_SIM_SUCCESS_RATE: f64 = 0.9;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DELIVERY_HISTORY_LIMIT: usize = 20;
pub const DEFAULT_WORKFLOW_RUN_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;
pub const DEFAULT_PLATFORM_DOMAIN: &str = "sites.example.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDelivery {
    Simulated,
    Http,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub sim_latency: Duration,
    pub sim_success_rate: f64,
    pub seed_mock_data: bool,
    pub require_actor: bool,
    pub webhook_delivery: WebhookDelivery,
    pub webhook_timeout: Duration,
    pub delivery_history_limit: usize,
    pub workflow_run_history_limit: usize,
    pub audit_capacity: usize,
    pub low_stock_threshold: i64,
    pub platform_domain: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            sim_latency: Duration::from_millis(DEFAULT_SIM_LATENCY_MS),
            sim_success_rate: DEFAULT_SIM_SUCCESS_RATE,
            seed_mock_data: true,
            require_actor: false,
            webhook_delivery: WebhookDelivery::Simulated,
            webhook_timeout: Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS),
            delivery_history_limit: DEFAULT_DELIVERY_HISTORY_LIMIT,
            workflow_run_history_limit: DEFAULT_WORKFLOW_RUN_HISTORY_LIMIT,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            platform_domain: DEFAULT_PLATFORM_DOMAIN.to_owned(),
        }
    }
}

impl AppConfig {
    /// Build config from environment variables.
    ///
    /// - `PORT`: listen port (default 3000)
    /// - `SIM_LATENCY_MS`: simulated external-call latency (default 600)
    /// - `SIM_SUCCESS_RATE`: simulated success probability, clamped to 0..=1;
    ///   non-finite values use the default
    /// - `SEED_MOCK_DATA`: seed stores with mock records (default true)
    /// - `REQUIRE_ACTOR`: reject requests without `x-member-id` (default false)
    /// - `WEBHOOK_DELIVERY`: `simulated` (default) or `http`
    /// - `WEBHOOK_TIMEOUT_SECS`, `DELIVERY_HISTORY_LIMIT`,
    ///   `WORKFLOW_RUN_HISTORY_LIMIT`, `AUDIT_CAPACITY`,
    ///   `LOW_STOCK_THRESHOLD`, `PLATFORM_DOMAIN`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. `from_env` is the
    /// process-environment case; tests pass a map.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).map(|v| v.trim().to_owned());
        let defaults = Self::default();

        let webhook_delivery = match parse("WEBHOOK_DELIVERY").as_deref() {
            Some(raw) if raw.eq_ignore_ascii_case("http") => WebhookDelivery::Http,
            _ => WebhookDelivery::Simulated,
        };

        Self {
            port: parse_or(parse("PORT"), defaults.port),
            sim_latency: Duration::from_millis(parse_or(parse("SIM_LATENCY_MS"), DEFAULT_SIM_LATENCY_MS)),
            sim_success_rate: parse("SIM_SUCCESS_RATE")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|r| r.is_finite())
                .unwrap_or(DEFAULT_SIM_SUCCESS_RATE)
                .clamp(0.0, 1.0),
            seed_mock_data: parse("SEED_MOCK_DATA")
                .as_deref()
                .and_then(parse_bool)
                .unwrap_or(defaults.seed_mock_data),
            require_actor: parse("REQUIRE_ACTOR")
                .as_deref()
                .and_then(parse_bool)
                .unwrap_or(defaults.require_actor),
            webhook_delivery,
            webhook_timeout: Duration::from_secs(parse_or(parse("WEBHOOK_TIMEOUT_SECS"), DEFAULT_WEBHOOK_TIMEOUT_SECS)),
            delivery_history_limit: parse_or(parse("DELIVERY_HISTORY_LIMIT"), defaults.delivery_history_limit),
            workflow_run_history_limit: parse_or(
                parse("WORKFLOW_RUN_HISTORY_LIMIT"),
                defaults.workflow_run_history_limit,
            ),
            audit_capacity: parse_or(parse("AUDIT_CAPACITY"), defaults.audit_capacity).max(1),
            low_stock_threshold: parse_or(parse("LOW_STOCK_THRESHOLD"), defaults.low_stock_threshold),
            platform_domain: parse("PLATFORM_DOMAIN")
                .filter(|v| !v.is_empty())
                .map_or(defaults.platform_domain, |v| v.trim_end_matches('.').to_ascii_lowercase()),
        }
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
