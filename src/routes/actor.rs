//! Acting member extraction.
//!
//! There is no login. A request names its member with `x-member-id`; that
//! member must exist and be active, and its role's permissions gate the
//! route. Requests without the header act as `system` with every
//! permission unless `REQUIRE_ACTOR` is set.

use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::routes::ApiError;
use crate::services::audit::SYSTEM_ACTOR;
use crate::services::team::{self, MemberStatus, Permission};
use crate::state::AppState;

pub const ACTOR_HEADER: &str = "x-member-id";

/// Who is making the request, and what they may do.
#[derive(Debug, Clone)]
pub struct Actor {
    pub member_id: Option<Uuid>,
    pub name: String,
    pub permissions: Vec<Permission>,
}

impl Actor {
    #[must_use]
    pub fn system() -> Self {
        Self { member_id: None, name: SYSTEM_ACTOR.to_owned(), permissions: Permission::ALL.to_vec() }
    }

    #[must_use]
    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// # Errors
    ///
    /// `403 E_FORBIDDEN` when the actor lacks `permission`.
    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        if self.can(permission) {
            return Ok(());
        }
        Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "E_FORBIDDEN",
            format!("{} lacks {}", self.name, permission.as_str()),
        ))
    }
}

impl<S> axum::extract::FromRequestParts<S> for Actor
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let Some(raw) = parts.headers.get(ACTOR_HEADER) else {
            if app_state.config.require_actor {
                return Err(ApiError::new(StatusCode::UNAUTHORIZED, "E_ACTOR_REQUIRED", format!("{ACTOR_HEADER} header is required")));
            }
            return Ok(Self::system());
        };

        let member_id = raw
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "E_INVALID_ACTOR", format!("{ACTOR_HEADER} must be a UUID")))?;

        let actor = {
            let store = app_state.team.read().await;
            let member = store
                .members
                .get(&member_id)
                .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "E_UNKNOWN_ACTOR", format!("no member {member_id}")))?;
            if member.status != MemberStatus::Active {
                return Err(ApiError::new(StatusCode::FORBIDDEN, "E_ACTOR_INACTIVE", format!("{} is not an active member", member.name)));
            }
            Self { member_id: Some(member_id), name: member.name.clone(), permissions: store.permissions_of(member_id) }
        };
        team::touch_member(&app_state, member_id).await;
        Ok(actor)
    }
}
