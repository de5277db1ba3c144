//! Domain service — platform subdomains, custom domains, simulated registrar.
//!
//! DESIGN
//! ======
//! Three kinds of domain share one record: a platform subdomain under
//! `PLATFORM_DOMAIN` (active on creation), a connected custom domain
//! (pending until DNS verification passes), and a domain bought through
//! the simulated registrar (active on purchase). Registrar, verification,
//! and certificate issuance all go through the simulator.
//!
//! At most one domain is primary. The primary cannot be deleted while
//! other domains remain; move primary first.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::state::AppState;
use crate::util::{now_ms, sha256_hex};

pub const PLATFORM_IP: &str = "76.76.21.21";
pub const MAX_PURCHASE_YEARS: u32 = 10;
const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const DNS_TTL: u32 = 3600;
const MS_PER_YEAR: i64 = 365 * 24 * 60 * 60 * 1000;

/// Registrar price list, cents per year.
pub const TLD_PRICES: &[(&str, i64)] = &[
    ("com", 1_299),
    ("net", 1_499),
    ("org", 1_199),
    ("io", 3_999),
    ("co", 2_599),
    ("shop", 399),
    ("store", 599),
    ("dev", 1_599),
];

#[must_use]
pub fn tld_price(tld: &str) -> Option<i64> {
    TLD_PRICES.iter().find(|(t, _)| *t == tld).map(|(_, price)| *price)
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("domain not found: {0}")]
    NotFound(Uuid),
    #[error("invalid domain name: {0}")]
    InvalidName(String),
    #[error("domain already added: {0}")]
    AlreadyExists(String),
    #[error("domain is not available: {0}")]
    Unavailable(String),
    #[error("unsupported TLD: {0}")]
    UnsupportedTld(String),
    #[error("domain is not active: {0}")]
    NotActive(String),
    #[error("primary domain cannot be deleted while other domains exist")]
    PrimaryInUse,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("registrar rejected the purchase of {0}")]
    PurchaseFailed(String),
    #[error("DNS records for {0} could not be verified")]
    VerificationFailed(String),
    #[error("certificate issuance failed for {0}")]
    SslFailed(String),
}

impl ErrorCode for DomainError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_DOMAIN_NOT_FOUND",
            Self::InvalidName(_) => "E_INVALID_DOMAIN",
            Self::AlreadyExists(_) => "E_DOMAIN_EXISTS",
            Self::Unavailable(_) => "E_DOMAIN_UNAVAILABLE",
            Self::UnsupportedTld(_) => "E_UNSUPPORTED_TLD",
            Self::NotActive(_) => "E_DOMAIN_NOT_ACTIVE",
            Self::PrimaryInUse => "E_PRIMARY_IN_USE",
            Self::Validation(_) => "E_VALIDATION",
            Self::PurchaseFailed(_) => "E_PURCHASE_FAILED",
            Self::VerificationFailed(_) => "E_VERIFICATION_FAILED",
            Self::SslFailed(_) => "E_SSL_FAILED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::PurchaseFailed(_) | Self::VerificationFailed(_) | Self::SslFailed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    Subdomain,
    Custom,
    Purchased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Pending,
    Active,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslStatus {
    None,
    Pending,
    Active,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub host: String,
    pub value: String,
    pub ttl: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    pub name: String,
    pub kind: DomainKind,
    pub status: DomainStatus,
    pub ssl: SslStatus,
    pub primary: bool,
    pub dns_records: Vec<DnsRecord>,
    pub expires_at: Option<i64>,
    pub auto_renew: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub name: String,
    pub tld: String,
    pub available: bool,
    pub price_cents: i64,
}

pub type DomainStore = HashMap<Uuid, Domain>;

// =============================================================================
// NAMES
// =============================================================================

/// Normalize and validate a fully-qualified domain name.
///
/// # Errors
///
/// `InvalidName` unless the name has at least two labels of 1-63
/// `[a-z0-9-]` characters, none starting or ending with `-`, and is at
/// most 253 characters.
pub fn validate_domain_name(raw: &str) -> Result<String, DomainError> {
    let name = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    let invalid = || DomainError::InvalidName(raw.trim().to_owned());
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(invalid());
    }
    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid());
    }
    let label_ok = |label: &&str| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    };
    if !labels.iter().all(label_ok) {
        return Err(invalid());
    }
    Ok(name)
}

fn tld_of(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Whether the simulated registry reports `name` as registered elsewhere.
/// Deterministic per name so repeated searches agree.
#[must_use]
pub fn registered_elsewhere(name: &str) -> bool {
    sha256_hex(name).starts_with('0')
}

fn required_records(platform_domain: &str) -> Vec<DnsRecord> {
    vec![
        DnsRecord { record_type: "A".into(), host: "@".into(), value: PLATFORM_IP.into(), ttl: DNS_TTL },
        DnsRecord { record_type: "CNAME".into(), host: "www".into(), value: platform_domain.to_owned(), ttl: DNS_TTL },
    ]
}

// =============================================================================
// QUERIES
// =============================================================================

/// Primary first, then by name.
pub async fn list_domains(state: &AppState) -> Vec<Domain> {
    let domains = state.domains.read().await;
    let mut list: Vec<Domain> = domains.values().cloned().collect();
    list.sort_by(|a, b| b.primary.cmp(&a.primary).then(a.name.cmp(&b.name)));
    list
}

/// # Errors
///
/// `NotFound` if no domain has this id.
pub async fn get_domain(state: &AppState, domain_id: Uuid) -> Result<Domain, DomainError> {
    let domains = state.domains.read().await;
    domains
        .get(&domain_id)
        .cloned()
        .ok_or(DomainError::NotFound(domain_id))
}

/// Price and availability across the registrar's TLDs. A query that
/// already names a supported TLD is checked alone.
///
/// # Errors
///
/// `InvalidName` if the query cannot form a valid domain name.
pub async fn search_availability(state: &AppState, query: &str) -> Result<Vec<Availability>, DomainError> {
    let query = query.trim().to_ascii_lowercase();
    let candidates: Vec<String> = match query.rsplit_once('.') {
        Some((_, tld)) if tld_price(tld).is_some() => vec![query.clone()],
        _ => {
            let base: String = query
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect();
            TLD_PRICES.iter().map(|(tld, _)| format!("{base}.{tld}")).collect()
        }
    };

    let domains = state.domains.read().await;
    candidates
        .into_iter()
        .map(|candidate| {
            let name = validate_domain_name(&candidate)?;
            let tld = tld_of(&name).to_owned();
            let price_cents = tld_price(&tld).ok_or_else(|| DomainError::UnsupportedTld(tld.clone()))?;
            let taken = domains.values().any(|d| d.name == name) || registered_elsewhere(&name);
            Ok(Availability { name, tld, available: !taken, price_cents })
        })
        .collect()
}

// =============================================================================
// LIFECYCLE
// =============================================================================

fn insert_domain(domains: &mut DomainStore, mut domain: Domain) -> Domain {
    // The first active domain becomes primary.
    if domain.status == DomainStatus::Active && !domains.values().any(|d| d.primary) {
        domain.primary = true;
    }
    domains.insert(domain.id, domain.clone());
    domain
}

/// Claim `<label>.<PLATFORM_DOMAIN>`. Platform subdomains are active with
/// a certificate from the start.
///
/// # Errors
///
/// `InvalidName` or `AlreadyExists`.
pub async fn claim_subdomain(state: &AppState, label: &str) -> Result<Domain, DomainError> {
    let name = validate_domain_name(&format!("{}.{}", label.trim(), state.config.platform_domain))?;
    let mut domains = state.domains.write().await;
    if domains.values().any(|d| d.name == name) {
        return Err(DomainError::AlreadyExists(name));
    }
    let domain = Domain {
        id: Uuid::new_v4(),
        name,
        kind: DomainKind::Subdomain,
        status: DomainStatus::Active,
        ssl: SslStatus::Active,
        primary: false,
        dns_records: Vec::new(),
        expires_at: None,
        auto_renew: false,
        created_at: now_ms(),
    };
    let domain = insert_domain(&mut domains, domain);
    info!(domain_id = %domain.id, name = %domain.name, "subdomain claimed");
    Ok(domain)
}

/// Buy `name` for `years` through the simulated registrar.
///
/// # Errors
///
/// `Validation` for years outside 1..=10, `InvalidName`,
/// `UnsupportedTld`, `AlreadyExists`, `Unavailable`, or `PurchaseFailed`.
pub async fn purchase_domain(state: &AppState, name: &str, years: u32) -> Result<Domain, DomainError> {
    if !(1..=MAX_PURCHASE_YEARS).contains(&years) {
        return Err(DomainError::Validation(format!("years must be between 1 and {MAX_PURCHASE_YEARS}")));
    }
    let name = validate_domain_name(name)?;
    let tld = tld_of(&name);
    if tld_price(tld).is_none() {
        return Err(DomainError::UnsupportedTld(tld.to_owned()));
    }
    {
        let domains = state.domains.read().await;
        if domains.values().any(|d| d.name == name) {
            return Err(DomainError::AlreadyExists(name));
        }
    }
    if registered_elsewhere(&name) {
        return Err(DomainError::Unavailable(name));
    }

    if !state.simulator.call().await.success {
        warn!(%name, "simulated registrar purchase failed");
        return Err(DomainError::PurchaseFailed(name));
    }

    let mut domains = state.domains.write().await;
    if domains.values().any(|d| d.name == name) {
        return Err(DomainError::AlreadyExists(name));
    }
    let now = now_ms();
    let dns_records = required_records(&state.config.platform_domain);
    let domain = Domain {
        id: Uuid::new_v4(),
        name,
        kind: DomainKind::Purchased,
        status: DomainStatus::Active,
        ssl: SslStatus::None,
        primary: false,
        dns_records,
        expires_at: Some(now + i64::from(years) * MS_PER_YEAR),
        auto_renew: true,
        created_at: now,
    };
    let domain = insert_domain(&mut domains, domain);
    info!(domain_id = %domain.id, name = %domain.name, years, "domain purchased");
    Ok(domain)
}

/// Attach a domain registered elsewhere. It stays pending until
/// `verify_domain` sees the returned DNS records.
///
/// # Errors
///
/// `InvalidName` or `AlreadyExists`.
pub async fn connect_domain(state: &AppState, name: &str) -> Result<Domain, DomainError> {
    let name = validate_domain_name(name)?;
    if name.ends_with(&format!(".{}", state.config.platform_domain)) {
        return Err(DomainError::Validation("platform subdomains are claimed, not connected".into()));
    }
    let mut domains = state.domains.write().await;
    if domains.values().any(|d| d.name == name) {
        return Err(DomainError::AlreadyExists(name));
    }
    let dns_records = required_records(&state.config.platform_domain);
    let domain = Domain {
        id: Uuid::new_v4(),
        name,
        kind: DomainKind::Custom,
        status: DomainStatus::Pending,
        ssl: SslStatus::None,
        primary: false,
        dns_records,
        expires_at: None,
        auto_renew: false,
        created_at: now_ms(),
    };
    let domain = insert_domain(&mut domains, domain);
    info!(domain_id = %domain.id, name = %domain.name, "domain connected");
    Ok(domain)
}

/// Check a pending or failed domain's DNS. Success activates it; failure
/// marks it failed and can be retried.
///
/// # Errors
///
/// `NotFound`, or `VerificationFailed`.
pub async fn verify_domain(state: &AppState, domain_id: Uuid) -> Result<Domain, DomainError> {
    let current = get_domain(state, domain_id).await?;
    if current.status == DomainStatus::Active {
        return Ok(current);
    }
    let success = state.simulator.call().await.success;

    let mut domains = state.domains.write().await;
    let domain = domains
        .get_mut(&domain_id)
        .ok_or(DomainError::NotFound(domain_id))?;
    if !success {
        domain.status = DomainStatus::Failed;
        warn!(%domain_id, name = %domain.name, "dns verification failed");
        return Err(DomainError::VerificationFailed(domain.name.clone()));
    }
    domain.status = DomainStatus::Active;
    let name = domain.name.clone();
    if !domains.values().any(|d| d.primary)
        && let Some(d) = domains.get_mut(&domain_id)
    {
        d.primary = true;
    }
    info!(%domain_id, %name, "domain verified");
    get_domain_locked(&domains, domain_id)
}

fn get_domain_locked(domains: &DomainStore, domain_id: Uuid) -> Result<Domain, DomainError> {
    domains.get(&domain_id).cloned().ok_or(DomainError::NotFound(domain_id))
}

/// Issue a certificate for an active domain.
///
/// # Errors
///
/// `NotFound`, `NotActive`, or `SslFailed`.
pub async fn setup_ssl(state: &AppState, domain_id: Uuid) -> Result<Domain, DomainError> {
    {
        let mut domains = state.domains.write().await;
        let domain = domains
            .get_mut(&domain_id)
            .ok_or(DomainError::NotFound(domain_id))?;
        if domain.status != DomainStatus::Active {
            return Err(DomainError::NotActive(domain.name.clone()));
        }
        if domain.ssl == SslStatus::Active {
            return Ok(domain.clone());
        }
        domain.ssl = SslStatus::Pending;
    }

    let success = state.simulator.call().await.success;
    let mut domains = state.domains.write().await;
    let domain = domains
        .get_mut(&domain_id)
        .ok_or(DomainError::NotFound(domain_id))?;
    if !success {
        domain.ssl = SslStatus::Failed;
        warn!(%domain_id, name = %domain.name, "certificate issuance failed");
        return Err(DomainError::SslFailed(domain.name.clone()));
    }
    domain.ssl = SslStatus::Active;
    info!(%domain_id, name = %domain.name, "certificate issued");
    Ok(domain.clone())
}

/// # Errors
///
/// `NotFound`, or `NotActive` for a domain that is not serving yet.
pub async fn set_primary(state: &AppState, domain_id: Uuid) -> Result<Domain, DomainError> {
    let mut domains = state.domains.write().await;
    let target = domains
        .get(&domain_id)
        .ok_or(DomainError::NotFound(domain_id))?;
    if target.status != DomainStatus::Active {
        return Err(DomainError::NotActive(target.name.clone()));
    }
    for domain in domains.values_mut() {
        domain.primary = domain.id == domain_id;
    }
    info!(%domain_id, "primary domain changed");
    get_domain_locked(&domains, domain_id)
}

/// # Errors
///
/// `NotFound`, or `Validation` for domains not bought through the
/// registrar.
pub async fn set_auto_renew(state: &AppState, domain_id: Uuid, auto_renew: bool) -> Result<Domain, DomainError> {
    let mut domains = state.domains.write().await;
    let domain = domains
        .get_mut(&domain_id)
        .ok_or(DomainError::NotFound(domain_id))?;
    if domain.kind != DomainKind::Purchased {
        return Err(DomainError::Validation("auto-renew applies to purchased domains only".into()));
    }
    domain.auto_renew = auto_renew;
    info!(%domain_id, auto_renew, "auto-renew changed");
    Ok(domain.clone())
}

/// # Errors
///
/// `NotFound`, or `PrimaryInUse` for the primary while others remain.
pub async fn delete_domain(state: &AppState, domain_id: Uuid) -> Result<Domain, DomainError> {
    let mut domains = state.domains.write().await;
    let domain = domains
        .get(&domain_id)
        .ok_or(DomainError::NotFound(domain_id))?;
    if domain.primary && domains.len() > 1 {
        return Err(DomainError::PrimaryInUse);
    }
    let domain = domains
        .remove(&domain_id)
        .ok_or(DomainError::NotFound(domain_id))?;
    info!(%domain_id, name = %domain.name, "domain removed");
    Ok(domain)
}

#[cfg(test)]
#[path = "domain_test.rs"]
mod tests;
