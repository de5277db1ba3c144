use super::*;

use crate::services::simulate::Simulator;
use crate::state::{AppState, test_helpers};

async fn role_id(state: &AppState, name: &str) -> Uuid {
    state.team.read().await.role_named(name).unwrap().id
}

async fn active_member(state: &AppState, name: &str, email: &str, role: &str) -> TeamMember {
    let role_id = role_id(state, role).await;
    let invited = invite_member(state, NewInvite { name: name.into(), email: email.into(), role_id })
        .await
        .unwrap();
    accept_invite(state, invited.id).await.unwrap()
}

// =============================================================================
// ROLES
// =============================================================================

#[tokio::test]
async fn system_roles_are_seeded_and_immutable() {
    let state = test_helpers::test_app_state();
    let roles = list_roles(&state).await;
    let names: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
    for expected in [OWNER_ROLE, ADMIN_ROLE, EDITOR_ROLE, VIEWER_ROLE] {
        assert!(names.contains(&expected), "{expected}");
    }

    let owner = role_id(&state, OWNER_ROLE).await;
    let patch = RolePatch { name: Some("Boss".into()), ..RolePatch::default() };
    assert!(matches!(update_role(&state, owner, patch).await, Err(TeamError::RoleImmutable(_))));
    assert!(matches!(delete_role(&state, owner).await, Err(TeamError::RoleImmutable(_))));
}

#[tokio::test]
async fn owner_has_every_permission_viewer_cannot_edit() {
    let state = test_helpers::test_app_state();
    let team = state.team.read().await;
    let owner = team.role_named(OWNER_ROLE).unwrap();
    assert!(Permission::ALL.iter().all(|p| owner.grants(*p)));
    let viewer = team.role_named(VIEWER_ROLE).unwrap();
    assert!(!viewer.grants(Permission::PagesEdit));
    let admin = team.role_named(ADMIN_ROLE).unwrap();
    assert!(!admin.grants(Permission::SettingsManage));
    assert!(admin.grants(Permission::TeamManage));
}

#[tokio::test]
async fn custom_role_names_are_unique_case_insensitive() {
    let state = test_helpers::test_app_state();
    let role = create_role(
        &state,
        NewRole { name: "Support".into(), description: String::new(), permissions: vec![Permission::SupportManage, Permission::SupportManage] },
    )
    .await
    .unwrap();
    assert_eq!(role.permissions, [Permission::SupportManage]);
    assert!(!role.system);

    let dup = NewRole { name: "support".into(), description: String::new(), permissions: Vec::new() };
    assert!(matches!(create_role(&state, dup).await, Err(TeamError::DuplicateRoleName(_))));
    let clash = NewRole { name: "owner".into(), description: String::new(), permissions: Vec::new() };
    assert!(matches!(create_role(&state, clash).await, Err(TeamError::DuplicateRoleName(_))));
}

#[tokio::test]
async fn role_in_use_cannot_be_deleted() {
    let state = test_helpers::test_app_state();
    let role = create_role(&state, NewRole { name: "Support".into(), description: String::new(), permissions: Vec::new() })
        .await
        .unwrap();
    let member = active_member(&state, "Ana", "ana@example.com", "Support").await;
    assert!(matches!(delete_role(&state, role.id).await, Err(TeamError::RoleInUse(_, 1))));

    let editor = role_id(&state, EDITOR_ROLE).await;
    update_member(&state, member.id, MemberPatch { role_id: Some(editor), ..MemberPatch::default() })
        .await
        .unwrap();
    delete_role(&state, role.id).await.unwrap();
}

// =============================================================================
// MEMBERS
// =============================================================================

#[tokio::test]
async fn invite_then_accept() {
    let state = test_helpers::test_app_state();
    let editor = role_id(&state, EDITOR_ROLE).await;
    let invited = invite_member(&state, NewInvite { name: "Ana".into(), email: " Ana@Example.com ".into(), role_id: editor })
        .await
        .unwrap();
    assert_eq!(invited.email, "ana@example.com");
    assert_eq!(invited.status, MemberStatus::Invited);
    // Invited members hold no permissions yet.
    assert!(member_permissions(&state, invited.id).await.unwrap().is_empty());

    let active = accept_invite(&state, invited.id).await.unwrap();
    assert_eq!(active.status, MemberStatus::Active);
    assert!(active.joined_at.is_some());
    assert!(has_permission(&state, active.id, Permission::PagesEdit).await);
    assert!(!has_permission(&state, active.id, Permission::TeamManage).await);

    assert!(matches!(accept_invite(&state, invited.id).await, Err(TeamError::InvalidState(_))));
    assert!(matches!(resend_invite(&state, invited.id).await, Err(TeamError::InvalidState(_))));
}

#[tokio::test]
async fn invite_validates() {
    let state = test_helpers::test_app_state();
    let editor = role_id(&state, EDITOR_ROLE).await;
    let bad_email = NewInvite { name: "Ana".into(), email: "ana".into(), role_id: editor };
    assert!(matches!(invite_member(&state, bad_email).await, Err(TeamError::Validation(_))));

    let bad_role = NewInvite { name: "Ana".into(), email: "ana@example.com".into(), role_id: Uuid::new_v4() };
    assert!(matches!(invite_member(&state, bad_role).await, Err(TeamError::RoleNotFound(_))));

    active_member(&state, "Ana", "ana@example.com", EDITOR_ROLE).await;
    let dup = NewInvite { name: "Ana 2".into(), email: "ANA@example.com".into(), role_id: editor };
    assert!(matches!(invite_member(&state, dup).await, Err(TeamError::DuplicateEmail(_))));
}

#[tokio::test]
async fn failed_invitation_records_nothing() {
    let state = test_helpers::test_app_state_with_simulator(Simulator::failing());
    let editor = role_id(&state, EDITOR_ROLE).await;
    let err = invite_member(&state, NewInvite { name: "Ana".into(), email: "ana@example.com".into(), role_id: editor })
        .await
        .unwrap_err();
    assert!(matches!(err, TeamError::InviteFailed));
    assert!(err.retryable());
    assert!(list_members(&state, &MemberQuery::default()).await.is_empty());
}

#[tokio::test]
async fn last_active_owner_is_protected() {
    let state = test_helpers::test_app_state();
    let owner = active_member(&state, "Olga", "olga@example.com", OWNER_ROLE).await;
    let admin = role_id(&state, ADMIN_ROLE).await;

    assert!(matches!(remove_member(&state, owner.id).await, Err(TeamError::LastOwner)));
    let demote = MemberPatch { role_id: Some(admin), ..MemberPatch::default() };
    assert!(matches!(update_member(&state, owner.id, demote.clone()).await, Err(TeamError::LastOwner)));
    let suspend = MemberPatch { status: Some(MemberStatus::Suspended), ..MemberPatch::default() };
    assert!(matches!(update_member(&state, owner.id, suspend).await, Err(TeamError::LastOwner)));

    // A second active owner lifts the restriction.
    active_member(&state, "Omar", "omar@example.com", OWNER_ROLE).await;
    update_member(&state, owner.id, demote).await.unwrap();
}

#[tokio::test]
async fn suspend_and_reactivate() {
    let state = test_helpers::test_app_state();
    active_member(&state, "Olga", "olga@example.com", OWNER_ROLE).await;
    let ed = active_member(&state, "Eddie", "eddie@example.com", EDITOR_ROLE).await;

    let suspend = MemberPatch { status: Some(MemberStatus::Suspended), ..MemberPatch::default() };
    update_member(&state, ed.id, suspend).await.unwrap();
    assert!(!has_permission(&state, ed.id, Permission::PagesEdit).await);

    let back_to_invited = MemberPatch { status: Some(MemberStatus::Invited), ..MemberPatch::default() };
    assert!(matches!(update_member(&state, ed.id, back_to_invited).await, Err(TeamError::InvalidState(_))));

    let reactivate = MemberPatch { status: Some(MemberStatus::Active), ..MemberPatch::default() };
    update_member(&state, ed.id, reactivate).await.unwrap();
    assert!(has_permission(&state, ed.id, Permission::PagesEdit).await);
}

#[tokio::test]
async fn list_members_filters() {
    let state = test_helpers::test_app_state();
    active_member(&state, "Olga", "olga@example.com", OWNER_ROLE).await;
    active_member(&state, "Eddie", "eddie@example.com", EDITOR_ROLE).await;
    let editor = role_id(&state, EDITOR_ROLE).await;
    invite_member(&state, NewInvite { name: "Ines".into(), email: "ines@example.com".into(), role_id: editor })
        .await
        .unwrap();

    let all = list_members(&state, &MemberQuery::default()).await;
    let names: Vec<&str> = all.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["Eddie", "Ines", "Olga"]);

    let invited = list_members(&state, &MemberQuery { status: Some(MemberStatus::Invited), ..MemberQuery::default() }).await;
    assert_eq!(invited.len(), 1);
    let editors = list_members(&state, &MemberQuery { role_id: Some(editor), ..MemberQuery::default() }).await;
    assert_eq!(editors.len(), 2);
    let search = list_members(&state, &MemberQuery { search: Some("OLGA@".into()), ..MemberQuery::default() }).await;
    assert_eq!(search.len(), 1);
}

#[tokio::test]
async fn remove_non_owner() {
    let state = test_helpers::test_app_state();
    let ed = active_member(&state, "Eddie", "eddie@example.com", EDITOR_ROLE).await;
    remove_member(&state, ed.id).await.unwrap();
    assert!(matches!(get_member(&state, ed.id).await, Err(TeamError::MemberNotFound(_))));
}

#[test]
fn permission_serializes_dotted() {
    assert_eq!(serde_json::to_value(Permission::PagesEdit).unwrap(), serde_json::json!("pages.edit"));
    for p in Permission::ALL {
        assert_eq!(serde_json::to_value(p).unwrap(), serde_json::json!(p.as_str()));
    }
}
