// Shared fixtures for unit tests

use crate::core::context::RequestContext;
use crate::core::error::StoreError;
use crate::models::claims::Claims;
use crate::models::user::User;
use crate::services::directory::{DirectorySettings, UserDirectory};
use crate::services::email::{EmailMessage, EmailSender};
use crate::services::password::PasswordHasher;
use crate::services::user_service::UserService;
use crate::stores::user_store::{MemoryUserStore, UserStore};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const MOCK_PASSWORD: &str = "123456";

/// Mail collaborator that keeps every message it is handed
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails as if the relay were down
    pub fn failing() -> Self {
        let sender = Self::new();
        sender.failing.store(true, Ordering::SeqCst);
        sender
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Reset token from the most recent message
    pub fn last_token(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let text = &sent.last()?.text;
        let start = text.find("token=")? + "token=".len();
        Some(
            text[start..]
                .chars()
                .take_while(|c| c.is_ascii_hexdigit())
                .collect(),
        )
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, _ctx: &RequestContext, message: EmailMessage) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("mail relay unavailable");
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Memory store whose writes can be switched to fail like a broken journal
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryUserStore,
    fail_writes: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence(anyhow!("disk full")));
        }
        Ok(())
    }
}

impl UserStore for FaultyStore {
    fn get(&self, id: &str) -> Option<User> {
        self.inner.get(id)
    }

    fn find_by_username(&self, username: &str) -> Option<User> {
        self.inner.find_by_username(username)
    }

    fn insert(&self, user: User) -> Result<User, StoreError> {
        self.check()?;
        self.inner.insert(user)
    }

    fn update(&self, id: &str, apply: &mut dyn FnMut(&mut User)) -> Result<User, StoreError> {
        self.check()?;
        self.inner.update(id, apply)
    }

    fn rename(&self, id: &str, username: &str) -> Result<User, StoreError> {
        self.check()?;
        self.inner.rename(id, username)
    }

    fn delete(&self, id: &str) -> Result<User, StoreError> {
        self.check()?;
        self.inner.delete(id)
    }

    fn list(&self) -> Vec<User> {
        self.inner.list()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

pub fn settings() -> DirectorySettings {
    DirectorySettings {
        reset_token_ttl_secs: 3600,
        reset_url: "https://hammergen.net/resetpassword".to_string(),
        max_attempts_per_minute: 100,
    }
}

pub fn directory() -> (UserDirectory<MemoryUserStore>, Arc<RecordingEmailSender>) {
    directory_with(settings())
}

pub fn directory_with(
    settings: DirectorySettings,
) -> (UserDirectory<MemoryUserStore>, Arc<RecordingEmailSender>) {
    let mailer = Arc::new(RecordingEmailSender::new());
    let directory = UserDirectory::new(
        Arc::new(MemoryUserStore::new()),
        mailer.clone(),
        PasswordHasher::new(4).unwrap(),
        settings,
    );
    (directory, mailer)
}

/// user0 (admin), user1 and user2, all with `MOCK_PASSWORD`
pub async fn seed_users<S: UserStore + 'static>(directory: &UserDirectory<S>) -> Vec<User> {
    let ctx = RequestContext::new();
    let admin = directory
        .ensure_admin(&ctx, "user0@test.com", MOCK_PASSWORD)
        .await
        .unwrap();

    let mut users = vec![admin];
    for name in ["user1@test.com", "user2@test.com"] {
        users.push(
            directory
                .create(&ctx, &User::new(name, MOCK_PASSWORD))
                .await
                .unwrap(),
        );
    }
    users
}

pub fn admin_claims(users: &[User]) -> Claims {
    Claims::for_user(&users[0])
}
