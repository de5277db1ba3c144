//! Team routes — roles, members, invitations.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::routes::actor::Actor;
use crate::routes::extract::{Json, Path, Query};
use crate::routes::{ApiError, ApiResult, audit, audit_with};
use crate::services::audit::Severity;
use crate::services::events::spawn_event;
use crate::services::team::{
    self, MemberPatch, MemberQuery, NewInvite, NewRole, Permission, Role, RolePatch, TeamError, TeamMember,
};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/roles", get(list_roles).post(create_role))
        .route("/api/roles/{id}", patch(update_role).delete(delete_role))
        .route("/api/members", get(list_members).post(invite_member))
        .route("/api/members/{id}", get(get_member).patch(update_member).delete(remove_member))
        .route("/api/members/{id}/resend", post(resend_invite))
        .route("/api/members/{id}/accept", post(accept_invite))
        .route("/api/members/{id}/permissions", get(member_permissions))
        .route("/api/me", get(me))
}

pub(crate) fn team_error_to_status(err: &TeamError) -> StatusCode {
    match err {
        TeamError::MemberNotFound(_) | TeamError::RoleNotFound(_) => StatusCode::NOT_FOUND,
        TeamError::DuplicateEmail(_)
        | TeamError::DuplicateRoleName(_)
        | TeamError::RoleImmutable(_)
        | TeamError::RoleInUse(..)
        | TeamError::LastOwner
        | TeamError::InvalidState(_) => StatusCode::CONFLICT,
        TeamError::InviteFailed => StatusCode::BAD_GATEWAY,
        TeamError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl From<TeamError> for ApiError {
    fn from(err: TeamError) -> Self {
        Self::from_service(team_error_to_status(&err), &err)
    }
}

#[derive(Serialize)]
pub struct Me {
    pub member: Option<TeamMember>,
    pub name: String,
    pub permissions: Vec<Permission>,
}

// =============================================================================
// ROLES
// =============================================================================

async fn list_roles(State(state): State<AppState>) -> Json<Vec<Role>> {
    Json(team::list_roles(&state).await)
}

async fn create_role(State(state): State<AppState>, actor: Actor, Json(body): Json<NewRole>) -> ApiResult<(StatusCode, Json<Role>)> {
    actor.require(Permission::TeamManage)?;
    let role = team::create_role(&state, body).await?;
    audit(&state, &actor, "role.created", "role", role.id, format!("Created role {}", role.name)).await;
    Ok((StatusCode::CREATED, Json(role)))
}

async fn update_role(
    State(state): State<AppState>,
    actor: Actor,
    Path(role_id): Path<Uuid>,
    Json(body): Json<RolePatch>,
) -> ApiResult<Json<Role>> {
    actor.require(Permission::TeamManage)?;
    let role = team::update_role(&state, role_id, body).await?;
    audit_with(&state, &actor, "role.updated", "role", role.id, format!("Updated role {}", role.name), Severity::Warning).await;
    Ok(Json(role))
}

async fn delete_role(State(state): State<AppState>, actor: Actor, Path(role_id): Path<Uuid>) -> ApiResult<StatusCode> {
    actor.require(Permission::TeamManage)?;
    let role = team::delete_role(&state, role_id).await?;
    audit_with(&state, &actor, "role.deleted", "role", role.id, format!("Deleted role {}", role.name), Severity::Warning).await;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// MEMBERS
// =============================================================================

/// `GET /api/members?role_id=&status=&search=`
async fn list_members(State(state): State<AppState>, Query(query): Query<MemberQuery>) -> Json<Vec<TeamMember>> {
    Json(team::list_members(&state, &query).await)
}

/// `POST /api/members` — sends an invitation.
async fn invite_member(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<NewInvite>,
) -> ApiResult<(StatusCode, Json<TeamMember>)> {
    actor.require(Permission::TeamManage)?;
    let member = team::invite_member(&state, body).await?;
    audit(&state, &actor, "member.invited", "member", member.id, format!("Invited {}", member.email)).await;
    spawn_event(
        &state,
        "member.invited",
        json!({ "member_id": member.id, "name": member.name, "email": member.email, "role_id": member.role_id }),
    );
    Ok((StatusCode::CREATED, Json(member)))
}

async fn get_member(State(state): State<AppState>, Path(member_id): Path<Uuid>) -> ApiResult<Json<TeamMember>> {
    Ok(Json(team::get_member(&state, member_id).await?))
}

async fn update_member(
    State(state): State<AppState>,
    actor: Actor,
    Path(member_id): Path<Uuid>,
    Json(body): Json<MemberPatch>,
) -> ApiResult<Json<TeamMember>> {
    actor.require(Permission::TeamManage)?;
    let sensitive = body.role_id.is_some() || body.status.is_some();
    let member = team::update_member(&state, member_id, body).await?;
    let severity = if sensitive { Severity::Warning } else { Severity::Info };
    audit_with(&state, &actor, "member.updated", "member", member.id, format!("Updated member {}", member.email), severity).await;
    Ok(Json(member))
}

async fn remove_member(State(state): State<AppState>, actor: Actor, Path(member_id): Path<Uuid>) -> ApiResult<StatusCode> {
    actor.require(Permission::TeamManage)?;
    let member = team::remove_member(&state, member_id).await?;
    audit_with(&state, &actor, "member.removed", "member", member.id, format!("Removed {}", member.email), Severity::Critical).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn resend_invite(State(state): State<AppState>, actor: Actor, Path(member_id): Path<Uuid>) -> ApiResult<Json<TeamMember>> {
    actor.require(Permission::TeamManage)?;
    let member = team::resend_invite(&state, member_id).await?;
    audit(&state, &actor, "member.invite_resent", "member", member.id, format!("Resent invitation to {}", member.email)).await;
    Ok(Json(member))
}

/// `POST /api/members/:id/accept` — the invitee acts for themselves, so no
/// actor header is consulted.
async fn accept_invite(State(state): State<AppState>, Path(member_id): Path<Uuid>) -> ApiResult<Json<TeamMember>> {
    let member = team::accept_invite(&state, member_id).await?;
    let invitee = Actor { member_id: Some(member.id), name: member.name.clone(), permissions: Vec::new() };
    audit(&state, &invitee, "member.joined", "member", member.id, format!("{} accepted the invitation", member.email)).await;
    Ok(Json(member))
}

async fn member_permissions(State(state): State<AppState>, Path(member_id): Path<Uuid>) -> ApiResult<Json<Vec<Permission>>> {
    Ok(Json(team::member_permissions(&state, member_id).await?))
}

/// `GET /api/me` — the resolved actor.
async fn me(State(state): State<AppState>, actor: Actor) -> ApiResult<Json<Me>> {
    let member = match actor.member_id {
        Some(id) => Some(team::get_member(&state, id).await?),
        None => None,
    };
    Ok(Json(Me { member, name: actor.name, permissions: actor.permissions }))
}

#[cfg(test)]
#[path = "team_test.rs"]
mod tests;
