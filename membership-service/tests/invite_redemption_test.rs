mod common;

use common::TestApp;
use futures::future::join_all;
use membership_service::{
    models::{Capabilities, GroupId, InviteId},
    services::{ErrorKind, InviteStore},
};

fn reviewer() -> Capabilities {
    Capabilities {
        review: true,
        comment: true,
        ..Capabilities::default()
    }
}

async fn group_with_invite(app: &TestApp, max_uses: i32) -> (GroupId, InviteId) {
    let owner = app.seed_user().await;
    let group = app
        .core
        .create_group(owner, &format!("group-{}", uuid::Uuid::new_v4()), None)
        .await
        .unwrap();
    let invite = app
        .core
        .create_invite(owner, group.group_id, &reviewer(), max_uses)
        .await
        .unwrap();
    (group.group_id, invite.invite_id)
}

async fn race(app: &TestApp, invite_id: InviteId, redeemers: usize) -> (usize, Vec<ErrorKind>) {
    let mut users = Vec::with_capacity(redeemers);
    for _ in 0..redeemers {
        users.push(app.seed_user().await);
    }

    let handles = users.into_iter().map(|user| {
        let core = app.core.clone();
        tokio::spawn(async move { core.redeem_invite(invite_id, user).await })
    });

    let mut admitted = 0;
    let mut failures = Vec::new();
    for joined in join_all(handles).await {
        match joined.expect("redeem task panicked") {
            Ok(_) => admitted += 1,
            Err(e) => failures.push(e.kind()),
        }
    }
    (admitted, failures)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_use_invite_admits_exactly_one() {
    let app = TestApp::spawn();
    let (_, invite_id) = group_with_invite(&app, 1).await;

    let (admitted, failures) = race(&app, invite_id, 16).await;

    assert_eq!(admitted, 1);
    assert_eq!(failures.len(), 15);
    assert!(failures.iter().all(|k| *k == ErrorKind::InviteExhausted));

    let invite = app.store.find_invite(invite_id).await.unwrap().unwrap();
    assert_eq!(invite.remaining_uses, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_multi_use_invite_never_over_admits() {
    let app = TestApp::spawn();
    let (_, invite_id) = group_with_invite(&app, 3).await;

    let (admitted, failures) = race(&app, invite_id, 10).await;

    assert_eq!(admitted, 3);
    assert!(failures.iter().all(|k| *k == ErrorKind::InviteExhausted));
    let invite = app.store.find_invite(invite_id).await.unwrap().unwrap();
    assert_eq!(invite.remaining_uses, 0);
}

#[tokio::test]
async fn test_redeemer_gets_invite_role() {
    let app = TestApp::spawn();
    let (group_id, invite_id) = group_with_invite(&app, 1).await;
    let user = app.seed_user().await;

    let membership = app.core.redeem_invite(invite_id, user).await.unwrap();
    assert_eq!(membership.group_id, group_id);
    assert!(!membership.is_admin);

    let role = app.core.resolve_role(user, group_id).await.unwrap();
    assert_eq!(role, reviewer());
}

#[tokio::test]
async fn test_second_redemption_by_member_keeps_the_use() {
    let app = TestApp::spawn();
    let (_, invite_id) = group_with_invite(&app, 2).await;
    let user = app.seed_user().await;

    app.core.redeem_invite(invite_id, user).await.unwrap();
    let err = app.core.redeem_invite(invite_id, user).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInGroup);

    let invite = app.store.find_invite(invite_id).await.unwrap().unwrap();
    assert_eq!(invite.remaining_uses, 1);
}

#[tokio::test]
async fn test_second_invite_into_same_group_keeps_its_use() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;
    let group = app.core.create_group(owner, "twice", None).await.unwrap();
    let first = app
        .core
        .create_invite(owner, group.group_id, &reviewer(), 1)
        .await
        .unwrap();
    let second = app
        .core
        .create_invite(owner, group.group_id, &Capabilities::member(), 1)
        .await
        .unwrap();
    let user = app.seed_user().await;

    app.core.redeem_invite(first.invite_id, user).await.unwrap();
    let err = app
        .core
        .redeem_invite(second.invite_id, user)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInGroup);

    let stored = app.store.find_invite(second.invite_id).await.unwrap().unwrap();
    assert_eq!(stored.remaining_uses, 1);

    // The membership from the first invite is untouched.
    let role = app.core.resolve_role(user, group.group_id).await.unwrap();
    assert_eq!(role, reviewer());
}

#[tokio::test]
async fn test_owner_cannot_redeem_into_own_group() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;
    let group = app.core.create_group(owner, "owners", None).await.unwrap();
    let invite = app
        .core
        .create_invite(owner, group.group_id, &reviewer(), 1)
        .await
        .unwrap();

    let err = app
        .core
        .redeem_invite(invite.invite_id, owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInGroup);
    assert!(app
        .core
        .invite_exists(invite.invite_id, group.group_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unknown_invite() {
    let app = TestApp::spawn();
    let user = app.seed_user().await;

    let err = app
        .core
        .redeem_invite(InviteId::new(), user)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InviteNotFound);
}

#[tokio::test]
async fn test_failed_commit_consumes_nothing() {
    let app = TestApp::spawn();
    let (group_id, invite_id) = group_with_invite(&app, 1).await;
    let user = app.seed_user().await;

    app.store.fail_commits(true);
    let err = app.core.redeem_invite(invite_id, user).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InternalError);

    let invite = app.store.find_invite(invite_id).await.unwrap().unwrap();
    assert_eq!(invite.remaining_uses, 1);
    assert_eq!(
        app.core.resolve_role(user, group_id).await.unwrap_err().kind(),
        ErrorKind::NotAMember
    );

    app.store.fail_commits(false);
    app.core.redeem_invite(invite_id, user).await.unwrap();
}

#[tokio::test]
async fn test_redemption_times_out_behind_a_held_transaction() {
    let app = TestApp::with_timeout(200);
    let (_, invite_id) = group_with_invite(&app, 1).await;
    let user = app.seed_user().await;

    let held = app.store.begin().await.unwrap();
    let err = app.core.redeem_invite(invite_id, user).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InternalError);
    drop(held);

    let invite = app.store.find_invite(invite_id).await.unwrap().unwrap();
    assert_eq!(invite.remaining_uses, 1);
    app.core.redeem_invite(invite_id, user).await.unwrap();
}

#[tokio::test]
async fn test_invite_limit_must_be_positive() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;
    let group = app.core.create_group(owner, "limits", None).await.unwrap();

    for max_uses in [0, -1] {
        let err = app
            .core
            .create_invite(owner, group.group_id, &reviewer(), max_uses)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadInviteLimit);
    }
}

#[tokio::test]
async fn test_invite_creation_requires_manage_members() {
    let app = TestApp::spawn();
    let (group_id, invite_id) = group_with_invite(&app, 5).await;

    let outsider = app.seed_user().await;
    let err = app
        .core
        .create_invite(outsider, group_id, &reviewer(), 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // A reviewer is a member but cannot manage members.
    let member = app.seed_user().await;
    app.core.redeem_invite(invite_id, member).await.unwrap();
    let err = app
        .core
        .create_invite(member, group_id, &reviewer(), 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_manager_cannot_grant_more_than_it_holds() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;
    let group = app.core.create_group(owner, "managers", None).await.unwrap();
    let manager_role = Capabilities {
        manage_members: true,
        comment: true,
        ..Capabilities::default()
    };
    let invite = app
        .core
        .create_invite(owner, group.group_id, &manager_role, 1)
        .await
        .unwrap();
    let manager = app.seed_user().await;
    app.core
        .redeem_invite(invite.invite_id, manager)
        .await
        .unwrap();

    assert!(app
        .core
        .create_invite(manager, group.group_id, &Capabilities::member(), 1)
        .await
        .is_ok());
    let err = app
        .core
        .create_invite(manager, group.group_id, &Capabilities::full(), 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_invite_for_missing_group() {
    let app = TestApp::spawn();
    let owner = app.seed_user().await;

    let err = app
        .core
        .create_invite(owner, GroupId::new(), &reviewer(), 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GroupNotFound);
}

#[tokio::test]
async fn test_invite_exists_tracks_group_and_uses() {
    let app = TestApp::spawn();
    let (group_id, invite_id) = group_with_invite(&app, 1).await;

    assert!(app.core.invite_exists(invite_id, group_id).await.unwrap());
    assert!(!app
        .core
        .invite_exists(invite_id, GroupId::new())
        .await
        .unwrap());

    let user = app.seed_user().await;
    app.core.redeem_invite(invite_id, user).await.unwrap();
    assert!(!app.core.invite_exists(invite_id, group_id).await.unwrap());
}
