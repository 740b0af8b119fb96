mod common;

use common::TestApp;
use membership_service::{
    models::{Capabilities, Permission},
    services::ErrorKind,
};

fn task_manager() -> Capabilities {
    Capabilities {
        manage_tasks: true,
        comment: true,
        ..Capabilities::default()
    }
}

#[tokio::test]
async fn test_role_creation_is_idempotent() {
    let app = TestApp::spawn();

    assert!(app.core.get_role_id(&task_manager()).await.unwrap().is_none());

    let first = app.core.create_role(&task_manager()).await.unwrap();
    let second = app.core.create_role(&task_manager()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        app.core.get_role_id(&task_manager()).await.unwrap(),
        Some(first)
    );

    let other = app.core.create_role(&Capabilities::member()).await.unwrap();
    assert_ne!(first, other);
}

#[tokio::test]
async fn test_owner_resolves_to_full_capabilities() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;
    let group = app
        .core
        .create_group(owner, "platform", Some("infra team".to_string()))
        .await
        .unwrap();
    assert_eq!(group.owner_id, owner);
    assert_eq!(group.description, "infra team");

    let role = app.core.resolve_role(owner, group.group_id).await.unwrap();
    assert_eq!(role, Capabilities::full());
    assert!(role.allows(Permission::Administer));
}

#[tokio::test]
async fn test_outsider_is_not_a_member() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;
    let outsider = app.seed_user().await;
    let group = app.core.create_group(owner, "platform", None).await.unwrap();

    let err = app
        .core
        .resolve_role(outsider, group.group_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAMember);
}

#[tokio::test]
async fn test_invited_admin_level_escalates() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;
    let joiner = app.seed_user().await;
    let group = app.core.create_group(owner, "platform", None).await.unwrap();

    let admin_only = Capabilities {
        admin: 1,
        ..Capabilities::default()
    };
    let invite = app
        .core
        .create_invite(owner, group.group_id, &admin_only, 1)
        .await
        .unwrap();
    app.core
        .redeem_invite(invite.invite_id, joiner)
        .await
        .unwrap();

    let role = app.core.resolve_role(joiner, group.group_id).await.unwrap();
    assert_eq!(role, Capabilities::full());
}

#[tokio::test]
async fn test_duplicate_group_name() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;
    app.core.create_group(owner, "platform", None).await.unwrap();

    let err = app
        .core
        .create_group(owner, "platform", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GroupNameTaken);
}

#[tokio::test]
async fn test_blank_group_name_is_rejected() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;

    let err = app
        .core
        .create_group(owner, "   ", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GroupNameInvalid);

    let group = app
        .core
        .create_group(owner, "  platform  ", None)
        .await
        .unwrap();
    assert_eq!(group.name, "platform");
}

#[tokio::test]
async fn test_find_group() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;
    let group = app.core.create_group(owner, "platform", None).await.unwrap();

    let found = app.core.find_group(group.group_id).await.unwrap();
    assert_eq!(found.name, "platform");
    assert_eq!(found.description, "");

    let missing = app
        .core
        .find_group(membership_service::models::GroupId::new())
        .await
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::GroupNotFound);
}

#[tokio::test]
async fn test_deleting_owner_removes_their_groups() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;
    let member = app.seed_user().await;
    let group = app.core.create_group(owner, "platform", None).await.unwrap();
    let invite = app
        .core
        .create_invite(owner, group.group_id, &Capabilities::member(), 1)
        .await
        .unwrap();
    app.core.redeem_invite(invite.invite_id, member).await.unwrap();

    app.core.delete_user(owner).await.unwrap();

    assert_eq!(
        app.core.find_group(group.group_id).await.unwrap_err().kind(),
        ErrorKind::GroupNotFound
    );
    assert_eq!(
        app.core
            .resolve_role(member, group.group_id)
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotAMember
    );
}
