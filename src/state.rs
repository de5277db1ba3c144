//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! passed by reference to every service function. Each service context owns
//! one `Arc<RwLock<...>>` store; nothing is persisted, so a restart is a
//! clean workspace (plus seed data when enabled).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{AppConfig, WebhookDelivery};
use crate::services::api_key::ApiKeyStore;
use crate::services::audit::AuditLog;
use crate::services::builder::BuilderPage;
use crate::services::commerce::CommerceStore;
use crate::services::dispatch::{DispatchError, HttpDispatcher, SimulatedDispatcher, WebhookDispatcher};
use crate::services::domain::DomainStore;
use crate::services::help::HelpStore;
use crate::services::simulate::Simulator;
use crate::services::team::TeamStore;
use crate::services::webhook::WebhookStore;
use crate::services::workflow::WorkflowStore;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub simulator: Simulator,
    pub dispatcher: Arc<dyn WebhookDispatcher>,
    pub pages: Arc<RwLock<HashMap<Uuid, BuilderPage>>>,
    pub commerce: Arc<RwLock<CommerceStore>>,
    pub api_keys: Arc<RwLock<ApiKeyStore>>,
    pub webhooks: Arc<RwLock<WebhookStore>>,
    pub workflows: Arc<RwLock<WorkflowStore>>,
    pub team: Arc<RwLock<TeamStore>>,
    pub audit: Arc<RwLock<AuditLog>>,
    pub help: Arc<RwLock<HelpStore>>,
    pub domains: Arc<RwLock<DomainStore>>,
}

impl AppState {
    /// Build state from config, choosing the webhook backend it names.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP webhook client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, DispatchError> {
        let simulator = Simulator::new(config.sim_latency, config.sim_success_rate);
        let dispatcher: Arc<dyn WebhookDispatcher> = match config.webhook_delivery {
            WebhookDelivery::Simulated => Arc::new(SimulatedDispatcher::new(simulator)),
            WebhookDelivery::Http => Arc::new(HttpDispatcher::new(config.webhook_timeout)?),
        };
        Ok(Self::new(config, simulator, dispatcher))
    }

    #[must_use]
    pub fn new(config: AppConfig, simulator: Simulator, dispatcher: Arc<dyn WebhookDispatcher>) -> Self {
        let audit = AuditLog::new(config.audit_capacity);
        Self {
            config: Arc::new(config),
            simulator,
            dispatcher,
            pages: Arc::new(RwLock::new(HashMap::new())),
            commerce: Arc::new(RwLock::new(CommerceStore::new())),
            api_keys: Arc::new(RwLock::new(HashMap::new())),
            webhooks: Arc::new(RwLock::new(HashMap::new())),
            workflows: Arc::new(RwLock::new(HashMap::new())),
            team: Arc::new(RwLock::new(TeamStore::new())),
            audit: Arc::new(RwLock::new(audit)),
            help: Arc::new(RwLock::new(HelpStore::default())),
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            sim_latency: std::time::Duration::ZERO,
            sim_success_rate: 1.0,
            seed_mock_data: false,
            ..AppConfig::default()
        }
    }

    /// Unseeded state with zero latency where every simulated call succeeds.
    #[must_use]
    pub fn test_app_state() -> AppState {
        test_app_state_with_simulator(Simulator::instant())
    }

    /// Unseeded state whose simulator (and simulated webhook backend) is `simulator`.
    #[must_use]
    pub fn test_app_state_with_simulator(simulator: Simulator) -> AppState {
        AppState::new(test_config(), simulator, Arc::new(SimulatedDispatcher::new(simulator)))
    }

    /// Unseeded instant state with a custom webhook backend.
    #[must_use]
    pub fn test_app_state_with_dispatcher(dispatcher: Arc<dyn WebhookDispatcher>) -> AppState {
        AppState::new(test_config(), Simulator::instant(), dispatcher)
    }

    /// Instant state with the config tweaked by `edit`.
    #[must_use]
    pub fn test_app_state_with_config(edit: impl FnOnce(&mut AppConfig)) -> AppState {
        let mut config = test_config();
        edit(&mut config);
        let simulator = Simulator::instant();
        AppState::new(config, simulator, Arc::new(SimulatedDispatcher::new(simulator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_has_system_roles_only() {
        let state = test_helpers::test_app_state();
        let team = state.team.try_read().unwrap();
        assert_eq!(team.roles.len(), 4);
        assert!(team.members.is_empty());
    }

    #[test]
    fn from_config_picks_backend() {
        let simulated = AppState::from_config(AppConfig::default());
        assert!(simulated.is_ok());
        let http = AppState::from_config(AppConfig { webhook_delivery: WebhookDelivery::Http, ..AppConfig::default() });
        assert!(http.is_ok());
    }

    #[test]
    fn audit_capacity_follows_config() {
        let state = test_helpers::test_app_state_with_config(|c| c.audit_capacity = 3);
        let mut log = state.audit.try_write().unwrap();
        for _ in 0..5 {
            log.push(crate::services::audit::AuditEntry {
                id: Uuid::new_v4(),
                timestamp: 0,
                actor: "system".into(),
                actor_id: None,
                action: "x".into(),
                resource_type: "x".into(),
                resource_id: "x".into(),
                description: String::new(),
                severity: crate::services::audit::Severity::Info,
            });
        }
        assert_eq!(log.len(), 3);
    }
}
