//! Team service — roles, permissions, member lifecycle.
//!
//! DESIGN
//! ======
//! Members move `invited -> active <-> suspended`. Roles are permission
//! sets; the four system roles are seeded into every store and cannot be
//! edited or deleted. The workspace must always keep one active Owner, so
//! removing, demoting, or suspending the last one is refused.
//!
//! Invitations go through the simulator with the store lock released, then
//! re-check email uniqueness before inserting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::state::AppState;
use crate::util::{is_valid_email, now_ms};

pub const OWNER_ROLE: &str = "Owner";
pub const ADMIN_ROLE: &str = "Admin";
pub const EDITOR_ROLE: &str = "Editor";
pub const VIEWER_ROLE: &str = "Viewer";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TeamError {
    #[error("member not found: {0}")]
    MemberNotFound(Uuid),
    #[error("role not found: {0}")]
    RoleNotFound(Uuid),
    #[error("email already on the team: {0}")]
    DuplicateEmail(String),
    #[error("role name already exists: {0}")]
    DuplicateRoleName(String),
    #[error("system role cannot be changed: {0}")]
    RoleImmutable(String),
    #[error("role {0} is assigned to {1} member(s)")]
    RoleInUse(String, usize),
    #[error("the workspace must keep at least one active owner")]
    LastOwner,
    #[error("invalid member state: {0}")]
    InvalidState(String),
    #[error("invitation email could not be sent")]
    InviteFailed,
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ErrorCode for TeamError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MemberNotFound(_) => "E_MEMBER_NOT_FOUND",
            Self::RoleNotFound(_) => "E_ROLE_NOT_FOUND",
            Self::DuplicateEmail(_) => "E_DUPLICATE_EMAIL",
            Self::DuplicateRoleName(_) => "E_DUPLICATE_ROLE",
            Self::RoleImmutable(_) => "E_ROLE_IMMUTABLE",
            Self::RoleInUse(..) => "E_ROLE_IN_USE",
            Self::LastOwner => "E_LAST_OWNER",
            Self::InvalidState(_) => "E_INVALID_STATE",
            Self::InviteFailed => "E_INVITE_FAILED",
            Self::Validation(_) => "E_VALIDATION",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::InviteFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "pages.edit")]
    PagesEdit,
    #[serde(rename = "pages.publish")]
    PagesPublish,
    #[serde(rename = "products.manage")]
    ProductsManage,
    #[serde(rename = "orders.manage")]
    OrdersManage,
    #[serde(rename = "integrations.manage")]
    IntegrationsManage,
    #[serde(rename = "team.manage")]
    TeamManage,
    #[serde(rename = "domains.manage")]
    DomainsManage,
    #[serde(rename = "audit.view")]
    AuditView,
    #[serde(rename = "support.manage")]
    SupportManage,
    #[serde(rename = "settings.manage")]
    SettingsManage,
}

impl Permission {
    pub const ALL: [Self; 10] = [
        Self::PagesEdit,
        Self::PagesPublish,
        Self::ProductsManage,
        Self::OrdersManage,
        Self::IntegrationsManage,
        Self::TeamManage,
        Self::DomainsManage,
        Self::AuditView,
        Self::SupportManage,
        Self::SettingsManage,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PagesEdit => "pages.edit",
            Self::PagesPublish => "pages.publish",
            Self::ProductsManage => "products.manage",
            Self::OrdersManage => "orders.manage",
            Self::IntegrationsManage => "integrations.manage",
            Self::TeamManage => "team.manage",
            Self::DomainsManage => "domains.manage",
            Self::AuditView => "audit.view",
            Self::SupportManage => "support.manage",
            Self::SettingsManage => "settings.manage",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub permissions: Vec<Permission>,
    pub system: bool,
    pub created_at: i64,
}

impl Role {
    #[must_use]
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Invited,
    Active,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role_id: Uuid,
    pub status: MemberStatus,
    pub invited_at: i64,
    pub joined_at: Option<i64>,
    pub last_active_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RolePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<Permission>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvite {
    pub name: String,
    pub email: String,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberPatch {
    pub name: Option<String>,
    pub role_id: Option<Uuid>,
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberQuery {
    pub role_id: Option<Uuid>,
    pub status: Option<MemberStatus>,
    /// Case-insensitive match on name or email.
    pub search: Option<String>,
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Debug, Clone)]
pub struct TeamStore {
    pub roles: HashMap<Uuid, Role>,
    pub members: HashMap<Uuid, TeamMember>,
}

impl Default for TeamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TeamStore {
    /// Empty team with the four system roles.
    #[must_use]
    pub fn new() -> Self {
        use Permission::{AuditView, OrdersManage, PagesEdit, PagesPublish, ProductsManage, SettingsManage, SupportManage};

        let admin: Vec<Permission> = Permission::ALL.into_iter().filter(|p| *p != SettingsManage).collect();
        let system = [
            (OWNER_ROLE, "Full access, including workspace settings", Permission::ALL.to_vec()),
            (ADMIN_ROLE, "Manage everything except workspace settings", admin),
            (
                EDITOR_ROLE,
                "Edit and publish pages, run the store and support desk",
                vec![PagesEdit, PagesPublish, ProductsManage, OrdersManage, SupportManage],
            ),
            (VIEWER_ROLE, "Read-only access", vec![AuditView]),
        ];

        let now = now_ms();
        let roles = system
            .into_iter()
            .map(|(name, description, permissions)| {
                let role = Role {
                    id: Uuid::new_v4(),
                    name: name.to_owned(),
                    description: description.to_owned(),
                    permissions,
                    system: true,
                    created_at: now,
                };
                (role.id, role)
            })
            .collect();
        Self { roles, members: HashMap::new() }
    }

    #[must_use]
    pub fn role_named(&self, name: &str) -> Option<&Role> {
        self.roles.values().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    fn owner_role_id(&self) -> Option<Uuid> {
        self.roles
            .values()
            .find(|r| r.system && r.name == OWNER_ROLE)
            .map(|r| r.id)
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.members
            .values()
            .any(|m| m.email == email && Some(m.id) != except)
    }

    fn is_last_active_owner(&self, member: &TeamMember) -> bool {
        let Some(owner) = self.owner_role_id() else {
            return false;
        };
        if member.role_id != owner || member.status != MemberStatus::Active {
            return false;
        }
        self.members
            .values()
            .filter(|m| m.role_id == owner && m.status == MemberStatus::Active)
            .count()
            <= 1
    }

    /// Permissions granted to a member through their role. Only active
    /// members hold any.
    #[must_use]
    pub fn permissions_of(&self, member_id: Uuid) -> Vec<Permission> {
        let Some(member) = self.members.get(&member_id) else {
            return Vec::new();
        };
        if member.status != MemberStatus::Active {
            return Vec::new();
        }
        let mut perms = self
            .roles
            .get(&member.role_id)
            .map(|r| r.permissions.clone())
            .unwrap_or_default();
        perms.sort();
        perms.dedup();
        perms
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn required(field: &str, value: &str) -> Result<String, TeamError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TeamError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}

fn normalize_permissions(mut permissions: Vec<Permission>) -> Vec<Permission> {
    permissions.sort();
    permissions.dedup();
    permissions
}

// =============================================================================
// ROLES
// =============================================================================

/// Roles with system roles first, then custom roles by name.
pub async fn list_roles(state: &AppState) -> Vec<Role> {
    let team = state.team.read().await;
    let mut roles: Vec<Role> = team.roles.values().cloned().collect();
    roles.sort_by(|a, b| b.system.cmp(&a.system).then(a.created_at.cmp(&b.created_at)).then(a.name.cmp(&b.name)));
    roles
}

/// # Errors
///
/// `RoleNotFound` if no role has this id.
pub async fn get_role(state: &AppState, role_id: Uuid) -> Result<Role, TeamError> {
    let team = state.team.read().await;
    team.roles.get(&role_id).cloned().ok_or(TeamError::RoleNotFound(role_id))
}

/// # Errors
///
/// `Validation` for a blank name, `DuplicateRoleName` if the name is taken.
pub async fn create_role(state: &AppState, input: NewRole) -> Result<Role, TeamError> {
    let name = required("name", &input.name)?;
    let mut team = state.team.write().await;
    if team.role_named(&name).is_some() {
        return Err(TeamError::DuplicateRoleName(name));
    }
    let role = Role {
        id: Uuid::new_v4(),
        name,
        description: input.description.trim().to_owned(),
        permissions: normalize_permissions(input.permissions),
        system: false,
        created_at: now_ms(),
    };
    team.roles.insert(role.id, role.clone());
    info!(role_id = %role.id, name = %role.name, "role created");
    Ok(role)
}

/// # Errors
///
/// `RoleNotFound`, `RoleImmutable` for system roles, `Validation`, or
/// `DuplicateRoleName`.
pub async fn update_role(state: &AppState, role_id: Uuid, patch: RolePatch) -> Result<Role, TeamError> {
    let name = patch.name.as_deref().map(|v| required("name", v)).transpose()?;
    let mut team = state.team.write().await;
    if let Some(name) = &name
        && team.role_named(name).is_some_and(|r| r.id != role_id)
    {
        return Err(TeamError::DuplicateRoleName(name.clone()));
    }
    let role = team.roles.get_mut(&role_id).ok_or(TeamError::RoleNotFound(role_id))?;
    if role.system {
        return Err(TeamError::RoleImmutable(role.name.clone()));
    }
    if let Some(name) = name {
        role.name = name;
    }
    if let Some(description) = patch.description {
        role.description = description.trim().to_owned();
    }
    if let Some(permissions) = patch.permissions {
        role.permissions = normalize_permissions(permissions);
    }
    info!(%role_id, name = %role.name, "role updated");
    Ok(role.clone())
}

/// # Errors
///
/// `RoleNotFound`, `RoleImmutable` for system roles, or `RoleInUse` while
/// any member holds it.
pub async fn delete_role(state: &AppState, role_id: Uuid) -> Result<Role, TeamError> {
    let mut team = state.team.write().await;
    let role = team.roles.get(&role_id).ok_or(TeamError::RoleNotFound(role_id))?;
    if role.system {
        return Err(TeamError::RoleImmutable(role.name.clone()));
    }
    let holders = team.members.values().filter(|m| m.role_id == role_id).count();
    if holders > 0 {
        return Err(TeamError::RoleInUse(role.name.clone(), holders));
    }
    let role = team.roles.remove(&role_id).ok_or(TeamError::RoleNotFound(role_id))?;
    info!(%role_id, "role deleted");
    Ok(role)
}

// =============================================================================
// MEMBERS
// =============================================================================

/// Members sorted by name.
pub async fn list_members(state: &AppState, query: &MemberQuery) -> Vec<TeamMember> {
    let needle = query.search.as_deref().map(str::to_lowercase);
    let team = state.team.read().await;
    let mut members: Vec<TeamMember> = team
        .members
        .values()
        .filter(|m| query.role_id.is_none_or(|r| m.role_id == r))
        .filter(|m| query.status.is_none_or(|s| m.status == s))
        .filter(|m| {
            needle
                .as_deref()
                .is_none_or(|n| m.name.to_lowercase().contains(n) || m.email.contains(n))
        })
        .cloned()
        .collect();
    members.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.id.cmp(&b.id)));
    members
}

/// # Errors
///
/// `MemberNotFound` if no member has this id.
pub async fn get_member(state: &AppState, member_id: Uuid) -> Result<TeamMember, TeamError> {
    let team = state.team.read().await;
    team.members
        .get(&member_id)
        .cloned()
        .ok_or(TeamError::MemberNotFound(member_id))
}

/// Invite someone by email. The simulated invitation must go out before
/// the member is recorded.
///
/// # Errors
///
/// `Validation`, `RoleNotFound`, `DuplicateEmail`, or `InviteFailed`.
pub async fn invite_member(state: &AppState, input: NewInvite) -> Result<TeamMember, TeamError> {
    let name = required("name", &input.name)?;
    let email = input.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(TeamError::Validation(format!("invalid email: {email}")));
    }
    {
        let team = state.team.read().await;
        if !team.roles.contains_key(&input.role_id) {
            return Err(TeamError::RoleNotFound(input.role_id));
        }
        if team.email_taken(&email, None) {
            return Err(TeamError::DuplicateEmail(email));
        }
    }

    if !state.simulator.call().await.success {
        warn!(%email, "invitation send failed");
        return Err(TeamError::InviteFailed);
    }

    let mut team = state.team.write().await;
    if team.email_taken(&email, None) {
        return Err(TeamError::DuplicateEmail(email));
    }
    let member = TeamMember {
        id: Uuid::new_v4(),
        name,
        email,
        role_id: input.role_id,
        status: MemberStatus::Invited,
        invited_at: now_ms(),
        joined_at: None,
        last_active_at: None,
    };
    team.members.insert(member.id, member.clone());
    info!(member_id = %member.id, email = %member.email, "member invited");
    Ok(member)
}

/// # Errors
///
/// `MemberNotFound`, `InvalidState` unless the member is still invited, or
/// `InviteFailed`.
pub async fn resend_invite(state: &AppState, member_id: Uuid) -> Result<TeamMember, TeamError> {
    let member = get_member(state, member_id).await?;
    if member.status != MemberStatus::Invited {
        return Err(TeamError::InvalidState("only pending invitations can be resent".into()));
    }
    if !state.simulator.call().await.success {
        warn!(%member_id, "invitation resend failed");
        return Err(TeamError::InviteFailed);
    }
    let mut team = state.team.write().await;
    let member = team
        .members
        .get_mut(&member_id)
        .ok_or(TeamError::MemberNotFound(member_id))?;
    member.invited_at = now_ms();
    info!(%member_id, "invitation resent");
    Ok(member.clone())
}

/// # Errors
///
/// `MemberNotFound`, or `InvalidState` unless the member is invited.
pub async fn accept_invite(state: &AppState, member_id: Uuid) -> Result<TeamMember, TeamError> {
    let mut team = state.team.write().await;
    let member = team
        .members
        .get_mut(&member_id)
        .ok_or(TeamError::MemberNotFound(member_id))?;
    if member.status != MemberStatus::Invited {
        return Err(TeamError::InvalidState("invitation already accepted".into()));
    }
    let now = now_ms();
    member.status = MemberStatus::Active;
    member.joined_at = Some(now);
    member.last_active_at = Some(now);
    info!(%member_id, "invitation accepted");
    Ok(member.clone())
}

/// # Errors
///
/// `MemberNotFound`, `RoleNotFound`, `Validation`, `InvalidState` for
/// status changes the lifecycle forbids, or `LastOwner`.
pub async fn update_member(state: &AppState, member_id: Uuid, patch: MemberPatch) -> Result<TeamMember, TeamError> {
    let name = patch.name.as_deref().map(|v| required("name", v)).transpose()?;
    let mut team = state.team.write().await;
    let current = team
        .members
        .get(&member_id)
        .ok_or(TeamError::MemberNotFound(member_id))?;

    if let Some(role_id) = patch.role_id
        && !team.roles.contains_key(&role_id)
    {
        return Err(TeamError::RoleNotFound(role_id));
    }
    if let Some(status) = patch.status {
        let allowed = match (current.status, status) {
            (from, to) if from == to => true,
            (MemberStatus::Active, MemberStatus::Suspended) | (MemberStatus::Suspended, MemberStatus::Active) => true,
            _ => false,
        };
        if !allowed {
            return Err(TeamError::InvalidState(format!("cannot move member from {:?} to {status:?}", current.status)));
        }
    }

    let demoted = patch.role_id.is_some_and(|r| r != current.role_id);
    let suspended = patch.status == Some(MemberStatus::Suspended) && current.status == MemberStatus::Active;
    if (demoted || suspended) && team.is_last_active_owner(current) {
        return Err(TeamError::LastOwner);
    }

    let member = team
        .members
        .get_mut(&member_id)
        .ok_or(TeamError::MemberNotFound(member_id))?;
    if let Some(name) = name {
        member.name = name;
    }
    if let Some(role_id) = patch.role_id {
        member.role_id = role_id;
    }
    if let Some(status) = patch.status {
        member.status = status;
    }
    info!(%member_id, "member updated");
    Ok(member.clone())
}

/// # Errors
///
/// `MemberNotFound`, or `LastOwner` for the last active Owner.
pub async fn remove_member(state: &AppState, member_id: Uuid) -> Result<TeamMember, TeamError> {
    let mut team = state.team.write().await;
    let member = team
        .members
        .get(&member_id)
        .ok_or(TeamError::MemberNotFound(member_id))?;
    if team.is_last_active_owner(member) {
        return Err(TeamError::LastOwner);
    }
    let member = team
        .members
        .remove(&member_id)
        .ok_or(TeamError::MemberNotFound(member_id))?;
    info!(%member_id, "member removed");
    Ok(member)
}

/// Stamp `last_active_at` for an authenticated actor.
pub async fn touch_member(state: &AppState, member_id: Uuid) {
    let mut team = state.team.write().await;
    if let Some(member) = team.members.get_mut(&member_id) {
        member.last_active_at = Some(now_ms());
    }
}

// =============================================================================
// PERMISSIONS
// =============================================================================

/// # Errors
///
/// `MemberNotFound` if no member has this id.
pub async fn member_permissions(state: &AppState, member_id: Uuid) -> Result<Vec<Permission>, TeamError> {
    let team = state.team.read().await;
    if !team.members.contains_key(&member_id) {
        return Err(TeamError::MemberNotFound(member_id));
    }
    Ok(team.permissions_of(member_id))
}

pub async fn has_permission(state: &AppState, member_id: Uuid, permission: Permission) -> bool {
    let team = state.team.read().await;
    team.permissions_of(member_id).contains(&permission)
}

#[cfg(test)]
#[path = "team_test.rs"]
mod tests;
