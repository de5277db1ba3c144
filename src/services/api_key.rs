//! API key service — third-party credentials stored for integrations.
//!
//! DESIGN
//! ======
//! The raw secret is seen once, at creation. The store keeps a display mask
//! and a SHA-256 fingerprint, enough to show the key in a table and to
//! detect the same credential being registered twice. Connection tests go
//! through the simulator.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::state::AppState;
use crate::util::{now_ms, sha256_hex};

const MIN_SECRET_LEN: usize = 8;
const MASK_TAIL: usize = 4;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
    #[error("api key not found: {0}")]
    NotFound(Uuid),
    #[error("api key already registered as {0}")]
    Duplicate(Uuid),
    #[error("api key {0} is revoked")]
    Revoked(Uuid),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ErrorCode for ApiKeyError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_API_KEY_NOT_FOUND",
            Self::Duplicate(_) => "E_API_KEY_DUPLICATE",
            Self::Revoked(_) => "E_API_KEY_REVOKED",
            Self::Validation(_) => "E_VALIDATION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyStatus {
    Active,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    pub service: String,
    pub masked_key: String,
    #[serde(skip_serializing, default)]
    pub fingerprint: String,
    pub status: ApiKeyStatus,
    pub last_tested_at: Option<i64>,
    pub last_test_ok: Option<bool>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewApiKey {
    pub name: String,
    pub service: String,
    pub secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiKeyPatch {
    pub name: Option<String>,
    pub status: Option<ApiKeyStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub latency_ms: u64,
    pub message: String,
}

pub type ApiKeyStore = HashMap<Uuid, ApiKey>;

// =============================================================================
// HELPERS
// =============================================================================

/// Keep a short prefix and the last four characters, e.g. `sk_l••••9f2a`.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= MASK_TAIL * 2 {
        return "•".repeat(chars.len());
    }
    let head: String = chars[..MASK_TAIL].iter().collect();
    let tail: String = chars[chars.len() - MASK_TAIL..].iter().collect();
    format!("{head}••••{tail}")
}

fn required(field: &str, value: &str) -> Result<String, ApiKeyError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiKeyError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// # Errors
///
/// `Validation` for blank fields or a short secret, `Duplicate` when the
/// same secret is already stored.
pub async fn create_api_key(state: &AppState, input: NewApiKey) -> Result<ApiKey, ApiKeyError> {
    let name = required("name", &input.name)?;
    let service = required("service", &input.service)?.to_ascii_lowercase();
    let secret = input.secret.trim();
    if secret.chars().count() < MIN_SECRET_LEN {
        return Err(ApiKeyError::Validation(format!("secret must be at least {MIN_SECRET_LEN} characters")));
    }

    let fingerprint = sha256_hex(secret);
    let mut keys = state.api_keys.write().await;
    if let Some(existing) = keys.values().find(|k| k.fingerprint == fingerprint) {
        return Err(ApiKeyError::Duplicate(existing.id));
    }

    let key = ApiKey {
        id: Uuid::new_v4(),
        name,
        service,
        masked_key: mask_secret(secret),
        fingerprint,
        status: ApiKeyStatus::Active,
        last_tested_at: None,
        last_test_ok: None,
        created_at: now_ms(),
    };
    keys.insert(key.id, key.clone());
    info!(key_id = %key.id, service = %key.service, "api key stored");
    Ok(key)
}

/// All keys, newest first.
pub async fn list_api_keys(state: &AppState) -> Vec<ApiKey> {
    let keys = state.api_keys.read().await;
    let mut list: Vec<ApiKey> = keys.values().cloned().collect();
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.name.cmp(&b.name)));
    list
}

/// # Errors
///
/// `NotFound` if no key has this id.
pub async fn get_api_key(state: &AppState, key_id: Uuid) -> Result<ApiKey, ApiKeyError> {
    let keys = state.api_keys.read().await;
    keys.get(&key_id).cloned().ok_or(ApiKeyError::NotFound(key_id))
}

/// # Errors
///
/// `NotFound` or `Validation`.
pub async fn update_api_key(state: &AppState, key_id: Uuid, patch: ApiKeyPatch) -> Result<ApiKey, ApiKeyError> {
    let name = patch.name.as_deref().map(|v| required("name", v)).transpose()?;
    let mut keys = state.api_keys.write().await;
    let key = keys.get_mut(&key_id).ok_or(ApiKeyError::NotFound(key_id))?;
    if let Some(name) = name {
        key.name = name;
    }
    if let Some(status) = patch.status {
        key.status = status;
    }
    Ok(key.clone())
}

/// # Errors
///
/// `NotFound` if no key has this id.
pub async fn delete_api_key(state: &AppState, key_id: Uuid) -> Result<ApiKey, ApiKeyError> {
    let mut keys = state.api_keys.write().await;
    let key = keys.remove(&key_id).ok_or(ApiKeyError::NotFound(key_id))?;
    info!(%key_id, "api key deleted");
    Ok(key)
}

/// Simulate a connection check against the key's service and record the
/// result on the key.
///
/// # Errors
///
/// `NotFound`, or `Revoked` for revoked keys.
pub async fn test_api_key(state: &AppState, key_id: Uuid) -> Result<ConnectionTest, ApiKeyError> {
    let service = {
        let key = get_api_key(state, key_id).await?;
        if key.status == ApiKeyStatus::Revoked {
            return Err(ApiKeyError::Revoked(key_id));
        }
        key.service
    };

    let outcome = state.simulator.call().await;
    let mut keys = state.api_keys.write().await;
    let key = keys.get_mut(&key_id).ok_or(ApiKeyError::NotFound(key_id))?;
    key.last_tested_at = Some(now_ms());
    key.last_test_ok = Some(outcome.success);

    let message = if outcome.success {
        format!("connected to {service}")
    } else {
        warn!(%key_id, %service, "simulated connection test failed");
        format!("{service} rejected the credentials")
    };
    Ok(ConnectionTest { success: outcome.success, latency_ms: outcome.latency_ms, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::simulate::Simulator;
    use crate::state::test_helpers;

    fn new_key(secret: &str) -> NewApiKey {
        NewApiKey { name: "Payments".into(), service: "Stripe".into(), secret: secret.into() }
    }

    #[test]
    fn mask_keeps_head_and_tail() {
        assert_eq!(mask_secret("sk_live_abcdef123456"), "sk_l••••3456");
        assert_eq!(mask_secret("short"), "•••••");
    }

    #[tokio::test]
    async fn create_stores_mask_not_secret() {
        let state = test_helpers::test_app_state();
        let key = create_api_key(&state, new_key("sk_live_abcdef123456")).await.unwrap();
        assert_eq!(key.service, "stripe");
        assert_eq!(key.masked_key, "sk_l••••3456");
        assert_eq!(key.fingerprint, sha256_hex("sk_live_abcdef123456"));

        let json = serde_json::to_value(&key).unwrap();
        assert!(json.get("fingerprint").is_none());
        assert!(!json.to_string().contains("abcdef"));
    }

    #[tokio::test]
    async fn create_rejects_short_and_duplicate_secrets() {
        let state = test_helpers::test_app_state();
        assert!(matches!(create_api_key(&state, new_key("abc")).await, Err(ApiKeyError::Validation(_))));

        let first = create_api_key(&state, new_key("sk_live_abcdef123456")).await.unwrap();
        let err = create_api_key(&state, new_key(" sk_live_abcdef123456 ")).await.unwrap_err();
        assert!(matches!(err, ApiKeyError::Duplicate(id) if id == first.id));
    }

    #[tokio::test]
    async fn test_records_result() {
        let state = test_helpers::test_app_state();
        let key = create_api_key(&state, new_key("sk_live_abcdef123456")).await.unwrap();
        let result = test_api_key(&state, key.id).await.unwrap();
        assert!(result.success);
        let stored = get_api_key(&state, key.id).await.unwrap();
        assert_eq!(stored.last_test_ok, Some(true));
        assert!(stored.last_tested_at.is_some());
    }

    #[tokio::test]
    async fn failed_test_is_recorded_not_raised() {
        let state = test_helpers::test_app_state_with_simulator(Simulator::failing());
        let key = create_api_key(&state, new_key("sk_live_abcdef123456")).await.unwrap();
        let result = test_api_key(&state, key.id).await.unwrap();
        assert!(!result.success);
        assert_eq!(get_api_key(&state, key.id).await.unwrap().last_test_ok, Some(false));
    }

    #[tokio::test]
    async fn revoked_key_cannot_be_tested() {
        let state = test_helpers::test_app_state();
        let key = create_api_key(&state, new_key("sk_live_abcdef123456")).await.unwrap();
        let patch = ApiKeyPatch { status: Some(ApiKeyStatus::Revoked), ..ApiKeyPatch::default() };
        update_api_key(&state, key.id, patch).await.unwrap();
        assert!(matches!(test_api_key(&state, key.id).await, Err(ApiKeyError::Revoked(_))));
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let state = test_helpers::test_app_state();
        let key = create_api_key(&state, new_key("sk_live_abcdef123456")).await.unwrap();
        delete_api_key(&state, key.id).await.unwrap();
        assert!(list_api_keys(&state).await.is_empty());
        assert!(matches!(delete_api_key(&state, key.id).await, Err(ApiKeyError::NotFound(_))));
    }
}
