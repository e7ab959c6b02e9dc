use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::user::models::EmailAddress;
use crate::domain::user::models::NewUser;
use crate::domain::user::models::PageRequest;
use crate::domain::user::models::User;
use crate::domain::user::models::UserId;
use crate::domain::user::models::UserPage;
use crate::domain::user::ports::UserRepository;
use crate::user::errors::UserError;

#[derive(Default)]
struct State {
    users: BTreeMap<i64, User>,
    last_id: i64,
}

impl State {
    fn live(&self) -> impl Iterator<Item = &User> {
        self.users.values().filter(|u| u.deleted_at.is_none())
    }

    fn email_taken(&self, email: &EmailAddress, except: Option<UserId>) -> bool {
        self.live()
            .any(|u| &u.email == email && Some(u.id) != except)
    }
}

/// Process-local user store with the same semantics as the Postgres one:
/// IDs ascend from 1, deletes are soft and email is unique among live
/// records. Backs the test suites.
#[derive(Default)]
pub struct InMemoryUserRepository {
    state: RwLock<State>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, UserError> {
        let mut state = self.state.write().await;
        if state.email_taken(&user.email, None) {
            return Err(UserError::EmailAlreadyExists(user.email.to_string()));
        }

        state.last_id += 1;
        let now = Utc::now();
        let created = User {
            id: UserId(state.last_id),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.users.insert(created.id.0, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&id.0)
            .filter(|u| u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_email(&self, email: &EmailAddress) -> Result<Option<User>, UserError> {
        let state = self.state.read().await;
        let found = state.live().find(|u| &u.email == email).cloned();
        Ok(found)
    }

    async fn list(&self, page: &PageRequest) -> Result<UserPage, UserError> {
        let state = self.state.read().await;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let users = state
            .live()
            .skip(offset)
            .take(page.per_page() as usize)
            .cloned()
            .collect();

        Ok(UserPage {
            users,
            total: state.live().count() as u64,
        })
    }

    async fn update(&self, user: User) -> Result<User, UserError> {
        let mut state = self.state.write().await;
        if state.email_taken(&user.email, Some(user.id)) {
            return Err(UserError::EmailAlreadyExists(user.email.to_string()));
        }

        let stored = state
            .users
            .get_mut(&user.id.0)
            .filter(|u| u.deleted_at.is_none())
            .ok_or_else(|| UserError::NotFound(user.id.to_string()))?;

        stored.email = user.email;
        stored.name = user.name;
        stored.password_hash = user.password_hash;
        stored.updated_at = Utc::now();

        Ok(stored.clone())
    }

    async fn delete(&self, id: &UserId) -> Result<(), UserError> {
        let mut state = self.state.write().await;
        let stored = state
            .users
            .get_mut(&id.0)
            .filter(|u| u.deleted_at.is_none())
            .ok_or_else(|| UserError::NotFound(id.to_string()))?;

        let now = Utc::now();
        stored.deleted_at = Some(now);
        stored.updated_at = now;

        Ok(())
    }
}
