//! In-process store backend.
//!
//! Every table lives behind one async lock. A redemption transaction holds that
//! lock from `begin` until it commits or drops, so transactions are serialised,
//! and it records an undo entry for each write so an uncommitted drop restores
//! the previous state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::StoreError;
use super::store::{
    GroupStore, HealthCheck, InviteStore, InviteTransaction, RoleStore, TokenStore, UserStore,
};
use crate::models::{
    Capabilities, Group, GroupId, Invite, InviteGrant, InviteId, Membership, OpaqueToken, Role,
    RoleId, User, UserId,
};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    /// Keyed by secret hash.
    tokens: HashMap<String, OpaqueToken>,
    roles: HashMap<RoleId, Capabilities>,
    groups: HashMap<GroupId, Group>,
    memberships: HashMap<(UserId, GroupId), Membership>,
    invites: HashMap<InviteId, Invite>,
}

#[derive(Default)]
struct Faults {
    token_writes: AtomicBool,
    commits: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every opaque token write fail until reset.
    pub fn fail_token_writes(&self, fail: bool) {
        self.faults.token_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every redemption commit fail until reset.
    pub fn fail_commits(&self, fail: bool) {
        self.faults.commits.store(fail, Ordering::SeqCst);
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Database(anyhow::anyhow!("injected {} failure", what))
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&user_id).cloned())
    }

    async fn exists(&self, user_id: UserId) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.users.contains_key(&user_id))
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }
        tables.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn delete(&self, user_id: UserId) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        tables.tokens.retain(|_, t| t.user_id != user_id);
        tables.groups.retain(|_, g| g.owner_id != user_id);

        let Tables {
            groups,
            memberships,
            invites,
            ..
        } = &mut *tables;
        memberships.retain(|(member, group), _| {
            *member != user_id && groups.contains_key(group)
        });
        invites.retain(|_, i| i.created_by != user_id && groups.contains_key(&i.group_id));
        Ok(true)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create(&self, record: &OpaqueToken) -> Result<(), StoreError> {
        if self.faults.token_writes.load(Ordering::SeqCst) {
            return Err(Self::injected("token write"));
        }
        let mut tables = self.tables.lock().await;
        if tables.tokens.contains_key(&record.secret_hash) {
            return Err(StoreError::Conflict(
                "opaque_tokens_secret_hash_key".to_string(),
            ));
        }
        tables
            .tokens
            .insert(record.secret_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<OpaqueToken>, StoreError> {
        Ok(self.tables.lock().await.tokens.get(secret_hash).cloned())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.tokens.len();
        tables
            .tokens
            .retain(|_, t| !(t.expires && t.expiry_utc < now));
        Ok((before - tables.tokens.len()) as u64)
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn find_role_id(&self, caps: &Capabilities) -> Result<Option<RoleId>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .roles
            .iter()
            .find(|(_, stored)| *stored == caps)
            .map(|(id, _)| *id))
    }

    async fn create_role(&self, caps: &Capabilities) -> Result<RoleId, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some((id, _)) = tables.roles.iter().find(|(_, stored)| *stored == caps) {
            return Ok(*id);
        }
        let role_id = RoleId::new();
        tables.roles.insert(role_id, *caps);
        Ok(role_id)
    }

    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.roles.get(&role_id).map(|caps| Role {
            role_id,
            capabilities: *caps,
        }))
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn create_group_with_owner(
        &self,
        group: &Group,
        owner: &Membership,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.groups.values().any(|g| g.name == group.name) {
            return Err(StoreError::Conflict("groups_name_key".to_string()));
        }
        tables.groups.insert(group.group_id, group.clone());
        tables
            .memberships
            .insert((owner.user_id, owner.group_id), owner.clone());
        Ok(())
    }

    async fn find_group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError> {
        Ok(self.tables.lock().await.groups.get(&group_id).cloned())
    }

    async fn find_membership(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<Membership>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.memberships.get(&(user_id, group_id)).cloned())
    }
}

#[async_trait]
impl InviteStore for MemoryStore {
    async fn create_invite(&self, invite: &Invite) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.invites.insert(invite.invite_id, invite.clone());
        Ok(())
    }

    async fn find_invite(&self, invite_id: InviteId) -> Result<Option<Invite>, StoreError> {
        Ok(self.tables.lock().await.invites.get(&invite_id).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn InviteTransaction>, StoreError> {
        let tables = self.tables.clone().lock_owned().await;
        Ok(Box::new(MemoryInviteTransaction {
            tables,
            undo: Vec::new(),
            fail_commit: self.faults.commits.load(Ordering::SeqCst),
        }))
    }

    async fn exists(&self, invite_id: InviteId, group_id: GroupId) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .invites
            .get(&invite_id)
            .is_some_and(|i| i.group_id == group_id && !i.is_exhausted()))
    }
}

enum Undo {
    Decrement(InviteId),
    Membership(UserId, GroupId),
}

struct MemoryInviteTransaction {
    tables: OwnedMutexGuard<Tables>,
    undo: Vec<Undo>,
    fail_commit: bool,
}

#[async_trait]
impl InviteTransaction for MemoryInviteTransaction {
    async fn decrement_and_fetch(&mut self, invite_id: InviteId) -> Result<InviteGrant, StoreError> {
        let invite = self
            .tables
            .invites
            .get_mut(&invite_id)
            .ok_or(StoreError::NotFound)?;
        if invite.remaining_uses <= 0 {
            return Err(StoreError::Exhausted);
        }
        invite.remaining_uses -= 1;
        let grant = InviteGrant {
            group_id: invite.group_id,
            role_id: invite.role_id,
        };
        self.undo.push(Undo::Decrement(invite_id));
        Ok(grant)
    }

    async fn insert_membership(&mut self, membership: &Membership) -> Result<(), StoreError> {
        let key = (membership.user_id, membership.group_id);
        if self.tables.memberships.contains_key(&key) {
            return Err(StoreError::Conflict("memberships_pkey".to_string()));
        }
        self.tables.memberships.insert(key, membership.clone());
        self.undo.push(Undo::Membership(key.0, key.1));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        if this.fail_commit {
            return Err(MemoryStore::injected("commit"));
        }
        this.undo.clear();
        Ok(())
    }
}

impl Drop for MemoryInviteTransaction {
    fn drop(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Decrement(invite_id) => {
                    if let Some(invite) = self.tables.invites.get_mut(&invite_id) {
                        invite.remaining_uses += 1;
                    }
                }
                Undo::Membership(user_id, group_id) => {
                    self.tables.memberships.remove(&(user_id, group_id));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(uses: i32) -> (MemoryStore, Invite) {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let role_id = store.create_role(&Capabilities::member()).await.unwrap();
        let invite = Invite::new(GroupId::new(), role_id, uses, owner);
        store.create_invite(&invite).await.unwrap();
        (store, invite)
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let (store, invite) = seeded(1).await;
        let user = UserId::new();

        {
            let mut tx = store.begin().await.unwrap();
            let grant = tx.decrement_and_fetch(invite.invite_id).await.unwrap();
            tx.insert_membership(&Membership::new(user, grant.group_id, grant.role_id))
                .await
                .unwrap();
        }

        let stored = store.find_invite(invite.invite_id).await.unwrap().unwrap();
        assert_eq!(stored.remaining_uses, 1);
        assert!(store
            .find_membership(user, invite.group_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_commit_keeps_writes() {
        let (store, invite) = seeded(2).await;
        let user = UserId::new();

        let mut tx = store.begin().await.unwrap();
        let grant = tx.decrement_and_fetch(invite.invite_id).await.unwrap();
        tx.insert_membership(&Membership::new(user, grant.group_id, grant.role_id))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stored = store.find_invite(invite.invite_id).await.unwrap().unwrap();
        assert_eq!(stored.remaining_uses, 1);
        assert!(store
            .find_membership(user, invite.group_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_decrement_distinguishes_missing_and_exhausted() {
        let (store, invite) = seeded(0).await;

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.decrement_and_fetch(invite.invite_id).await,
            Err(StoreError::Exhausted)
        ));
        assert!(matches!(
            tx.decrement_and_fetch(InviteId::new()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_create_role_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.create_role(&Capabilities::full()).await.unwrap();
        let second = store.create_role(&Capabilities::full()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(
            store.find_role_id(&Capabilities::full()).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_live_and_non_expiring() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = UserId::new();
        let expired = OpaqueToken::new(user, b"a", now, Some(now - chrono::Duration::seconds(1)));
        let live = OpaqueToken::new(user, b"b", now, Some(now + chrono::Duration::hours(1)));
        let forever = OpaqueToken::new(user, b"c", now, None);
        for record in [&expired, &live, &forever] {
            TokenStore::create(&store, record).await.unwrap();
        }

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert!(store
            .find_by_secret_hash(&expired.secret_hash)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_secret_hash(&forever.secret_hash)
            .await
            .unwrap()
            .is_some());
    }
}
