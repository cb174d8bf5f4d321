//! In-memory storage backend
//!
//! Transactions are serialized: `begin` takes an owned lock on the shared state
//! and works on a private copy, which `commit` writes back. A transaction that
//! is dropped without committing leaves the shared state untouched.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::store::{Database, RefreshTokenStore, StoreError, StoreTransaction, UserStore};
use crate::{NewUser, RefreshToken, User};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    /// Keyed by token value
    tokens: HashMap<String, RefreshToken>,
}

/// Process-local database for development and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed refresh tokens owned by `user_id`
    pub async fn refresh_tokens_for(&self, user_id: Uuid) -> Vec<RefreshToken> {
        let state = self.state.lock().await;
        state
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Insert or replace a token record directly, bypassing transactions
    pub async fn insert_refresh_token(&self, token: RefreshToken) {
        let mut state = self.state.lock().await;
        state.tokens.insert(token.token.clone(), token);
    }

    /// Replace a user record directly, bypassing transactions
    pub async fn put_user(&self, user: User) {
        let mut state = self.state.lock().await;
        state.users.insert(user.id, user);
    }

    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UserStore for MemoryTransaction {
    async fn exists_by_email(&mut self, email: &str) -> Result<bool, StoreError> {
        Ok(self.working.users.values().any(|u| u.email == email))
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn save_user(&mut self, user: NewUser) -> Result<User, StoreError> {
        if self.working.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = user.into_user(Uuid::new_v4());
        self.working.users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryTransaction {
    async fn save_token(&mut self, token: &RefreshToken) -> Result<(), StoreError> {
        if self.working.tokens.contains_key(&token.token) {
            return Err(StoreError::DuplicateToken);
        }
        self.working
            .tokens
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn find_by_token(&mut self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.working.tokens.get(token).cloned())
    }

    async fn delete_token(&mut self, token: &str) -> Result<(), StoreError> {
        self.working.tokens.remove(token);
        Ok(())
    }

    async fn delete_all_for(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        let before = self.working.tokens.len();
        self.working.tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - self.working.tokens.len()) as u64)
    }
}

impl StoreTransaction for MemoryTransaction {
    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), StoreError>> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Box::pin(async { Ok(()) })
    }
}
