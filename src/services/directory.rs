use crate::core::config::Config;
use crate::core::context::RequestContext;
use crate::core::error::{UserError, UserErrorKind};
use crate::models::claims::Claims;
use crate::models::user::User;
use crate::security::rate_limiter::RateLimiter;
use crate::services::email::{reset_password_message, EmailSender};
use crate::services::password::PasswordHasher;
use crate::services::user_service::UserService;
use crate::stores::reset_tokens::ResetTokenStore;
use crate::stores::user_store::UserStore;
use crate::utils::time::{current_timestamp, now_utc};
use crate::validation::user::{normalize_username, validate_password, validate_username};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Tunables of the directory that do not belong to a collaborator
#[derive(Debug, Clone)]
pub struct DirectorySettings {
    pub reset_token_ttl_secs: i64,
    /// Page the reset email links to; the token is appended as a query parameter
    pub reset_url: String,
    pub max_attempts_per_minute: u32,
}

impl DirectorySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            reset_token_ttl_secs: config.auth.reset_token_ttl_secs,
            reset_url: config.email.reset_url.clone(),
            max_attempts_per_minute: config.auth.max_attempts_per_minute,
        }
    }
}

/// `UserService` over a `UserStore`
pub struct UserDirectory<S: UserStore> {
    store: Arc<S>,
    mailer: Arc<dyn EmailSender>,
    hasher: PasswordHasher,
    resets: ResetTokenStore,
    throttle: RateLimiter<String>,
    settings: DirectorySettings,
}

impl<S: UserStore + 'static> UserDirectory<S> {
    pub fn new(
        store: Arc<S>,
        mailer: Arc<dyn EmailSender>,
        hasher: PasswordHasher,
        settings: DirectorySettings,
    ) -> Self {
        Self {
            store,
            mailer,
            hasher,
            resets: ResetTokenStore::new(),
            throttle: RateLimiter::new(settings.max_attempts_per_minute),
            settings,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn pending_resets(&self) -> usize {
        self.resets.len()
    }

    /// Create `username` if missing and make sure it is an admin
    pub async fn ensure_admin(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> Result<User, UserError> {
        let username = validate_username(username)?;

        let user = match self.store.find_by_username(&username) {
            Some(user) => user,
            None => match self.create(ctx, &User::new(username.clone(), password)).await {
                Ok(user) => user,
                // Lost a race with another bootstrap; the account is there now
                Err(e) if e.kind() == UserErrorKind::AlreadyExists => self
                    .store
                    .find_by_username(&username)
                    .ok_or_else(|| UserError::not_found(format!("no user named {}", username)))?,
                Err(e) => return Err(e),
            },
        };

        if user.admin {
            return Ok(user.without_password());
        }

        ctx.ensure_active()?;
        let updated = self.store.update(&user.id, &mut |u: &mut User| u.admin = true)?;
        info!(user_id = %updated.id, "Granted admin to bootstrap account");
        Ok(updated.without_password())
    }

    /// Claims of a stored account, for issuing access tokens after `authenticate`
    pub fn claims_for(&self, ctx: &RequestContext, id: &str) -> Result<Claims, UserError> {
        ctx.ensure_active()?;
        let user = self
            .store
            .get(id)
            .ok_or_else(|| UserError::not_found(format!("no user with id {}", id)))?;
        Ok(Claims::for_user(&user))
    }

    pub fn purge_expired_resets(&self) -> usize {
        self.resets.purge_expired(now_utc())
    }

    /// Forget throttle windows that have run out
    pub fn cleanup_throttle(&self) -> usize {
        self.throttle.cleanup_old_entries(current_timestamp())
    }

    fn lookup(&self, id: &str) -> Result<User, UserError> {
        self.store
            .get(id)
            .ok_or_else(|| UserError::not_found(format!("no user with id {}", id)))
    }

    fn throttled(&self, action: &str, username: &str) -> bool {
        let key = format!("{}:{}", action, username);
        !self.throttle.check_and_increment(key, current_timestamp())
    }

    /// Map shared account names to ids, deduplicating by first occurrence
    fn resolve_shared_accounts(
        &self,
        owner_id: &str,
        names: &[String],
    ) -> Result<(Vec<String>, Vec<String>), UserError> {
        let mut seen = HashSet::new();
        let mut resolved_names = Vec::new();
        let mut resolved_ids = Vec::new();

        for name in names {
            let name = normalize_username(name);
            if !seen.insert(name.clone()) {
                continue;
            }

            let shared = self.store.find_by_username(&name).ok_or_else(|| {
                UserError::invalid_arguments(format!("unknown shared account {}", name))
            })?;
            if shared.id == owner_id {
                return Err(UserError::invalid_arguments(
                    "an account cannot be shared with itself",
                ));
            }

            resolved_names.push(name);
            resolved_ids.push(shared.id);
        }

        Ok((resolved_names, resolved_ids))
    }
}

/// Run one operation inside its request span and log how it failed
async fn traced<T, F>(ctx: &RequestContext, operation: &'static str, fut: F) -> Result<T, UserError>
where
    F: Future<Output = Result<T, UserError>>,
{
    let span = ctx.span(operation);
    let result = fut.instrument(span.clone()).await;

    if let Err(e) = &result {
        span.in_scope(|| {
            if e.is_collaborator_failure() {
                error!(kind = %e.kind(), error = %format!("{:#}", e.cause()), "User operation failed");
            } else {
                debug!(kind = %e.kind(), error = %e.cause(), "User operation rejected");
            }
        });
    }

    result
}

#[async_trait]
impl<S: UserStore + 'static> UserService for UserDirectory<S> {
    async fn get(&self, ctx: &RequestContext, claims: &Claims, id: &str) -> Result<User, UserError> {
        traced(ctx, "get", async {
            ctx.ensure_active()?;
            if !claims.can_view(id) {
                return Err(UserError::unauthorized());
            }

            Ok(self.lookup(id)?.without_password())
        })
        .await
    }

    async fn exists(&self, ctx: &RequestContext, username: &str) -> Result<bool, UserError> {
        traced(ctx, "exists", async {
            ctx.ensure_active()?;
            let username = normalize_username(username);
            Ok(!username.is_empty() && self.store.find_by_username(&username).is_some())
        })
        .await
    }

    async fn create(&self, ctx: &RequestContext, user: &User) -> Result<User, UserError> {
        traced(ctx, "create", async {
            ctx.ensure_active()?;
            let username = validate_username(&user.username)?;
            validate_password(&user.password)?;

            // Skip the hashing cost for an obvious duplicate; the insert decides
            if self.store.find_by_username(&username).is_some() {
                return Err(UserError::already_exists(format!("username {} is taken", username)));
            }

            let password_hash = self.hasher.hash(ctx, &user.password).await?;

            let mut record = User::empty();
            record.id = Uuid::new_v4().to_string();
            record.username = username;
            record.password_hash = password_hash;
            record.created_on = now_utc();

            ctx.ensure_active()?;
            let created = self.store.insert(record)?;
            info!(user_id = %created.id, "User created");
            Ok(created.without_password())
        })
        .await
    }

    async fn update(&self, ctx: &RequestContext, claims: &Claims, user: &User) -> Result<User, UserError> {
        traced(ctx, "update", async {
            ctx.ensure_active()?;
            if !claims.can_modify(&user.id) {
                return Err(UserError::unauthorized());
            }

            let current = self.lookup(&user.id)?;
            let username = validate_username(&user.username)?;
            if username == current.username {
                return Ok(current.without_password());
            }

            ctx.ensure_active()?;
            let updated = self.store.rename(&user.id, &username)?;
            info!(user_id = %updated.id, "Username changed");
            Ok(updated.without_password())
        })
        .await
    }

    async fn update_credentials(
        &self,
        ctx: &RequestContext,
        claims: &Claims,
        current_password: &str,
        user: &User,
    ) -> Result<User, UserError> {
        traced(ctx, "update_credentials", async {
            ctx.ensure_active()?;
            if !claims.is_self(&user.id) {
                return Err(UserError::unauthorized());
            }

            validate_password(&user.password)?;
            let current = self.lookup(&user.id)?;
            if !self
                .hasher
                .verify(ctx, current_password, &current.password_hash)
                .await?
            {
                return Err(UserError::incorrect_password());
            }

            let password_hash = self.hasher.hash(ctx, &user.password).await?;

            ctx.ensure_active()?;
            let updated = self
                .store
                .update(&user.id, &mut |u: &mut User| u.password_hash = password_hash.clone())?;
            self.resets.revoke_user(&updated.id);
            info!(user_id = %updated.id, "Password changed");
            Ok(updated.without_password())
        })
        .await
    }

    async fn update_claims(&self, ctx: &RequestContext, claims: &Claims, user: &User) -> Result<User, UserError> {
        traced(ctx, "update_claims", async {
            ctx.ensure_active()?;
            if !claims.is_admin() {
                return Err(UserError::unauthorized());
            }

            self.lookup(&user.id)?;
            let (names, ids) = self.resolve_shared_accounts(&user.id, &user.shared_account_names)?;

            ctx.ensure_active()?;
            let updated = self.store.update(&user.id, &mut |u: &mut User| {
                u.admin = user.admin;
                u.shared_account_names = names.clone();
                u.shared_account_ids = ids.clone();
            })?;
            info!(
                user_id = %updated.id,
                admin = updated.admin,
                shared = updated.shared_account_ids.len(),
                "Claims updated"
            );
            Ok(updated.without_password())
        })
        .await
    }

    async fn delete(&self, ctx: &RequestContext, claims: &Claims, id: &str) -> Result<(), UserError> {
        traced(ctx, "delete", async {
            ctx.ensure_active()?;
            if !claims.can_modify(id) {
                return Err(UserError::unauthorized());
            }

            let removed = self.store.delete(id)?;
            let revoked = self.resets.revoke_user(&removed.id);
            info!(user_id = %removed.id, revoked_resets = revoked, "User deleted");
            Ok(())
        })
        .await
    }

    async fn list(&self, ctx: &RequestContext, claims: &Claims) -> Result<Vec<User>, UserError> {
        traced(ctx, "list", async {
            ctx.ensure_active()?;
            if !claims.is_admin() {
                return Err(UserError::unauthorized());
            }

            Ok(self.store.list().iter().map(User::without_password).collect())
        })
        .await
    }

    async fn authenticate(&self, ctx: &RequestContext, username: &str, password: &str) -> Result<User, UserError> {
        traced(ctx, "authenticate", async {
            ctx.ensure_active()?;
            let username = normalize_username(username);
            if self.throttled("authenticate", &username) {
                warn!("Too many authentication attempts");
                return Err(UserError::new(
                    UserErrorKind::Unauthorized,
                    anyhow!("too many authentication attempts"),
                ));
            }

            let Some(user) = self.store.find_by_username(&username) else {
                self.hasher.verify_dummy(ctx, password).await?;
                return Err(UserError::incorrect_password());
            };

            if !self.hasher.verify(ctx, password, &user.password_hash).await? {
                return Err(UserError::incorrect_password());
            }

            ctx.ensure_active()?;
            let now = now_utc();
            let updated = self.store.update(&user.id, &mut |u: &mut User| u.last_auth_on = now)?;
            info!(user_id = %updated.id, "User authenticated");
            Ok(updated.without_password())
        })
        .await
    }

    async fn send_reset_password(&self, ctx: &RequestContext, username: &str) -> Result<(), UserError> {
        traced(ctx, "send_reset_password", async {
            ctx.ensure_active()?;
            let username = normalize_username(username);
            if self.throttled("send_reset_password", &username) {
                warn!("Too many password reset requests");
                return Err(UserError::new(
                    UserErrorKind::Unauthorized,
                    anyhow!("too many password reset requests"),
                ));
            }

            let Some(user) = self.store.find_by_username(&username) else {
                debug!("Password reset requested for unknown username");
                return Ok(());
            };

            let token = self
                .resets
                .issue(&user.id, self.settings.reset_token_ttl_secs, now_utc());
            let message = reset_password_message(&user.username, &self.settings.reset_url, &token);

            if let Err(e) = self.mailer.send(ctx, message).await {
                self.resets.revoke(&token);
                return Err(UserError::send_email(e));
            }

            info!(user_id = %user.id, "Password reset email sent");
            Ok(())
        })
        .await
    }

    async fn reset_password(&self, ctx: &RequestContext, token: &str, new_password: &str) -> Result<(), UserError> {
        traced(ctx, "reset_password", async {
            ctx.ensure_active()?;
            validate_password(new_password)?;

            // Hash before redeeming so nothing between redemption and the
            // store write can be interrupted
            let password_hash = self.hasher.hash(ctx, new_password).await?;

            ctx.ensure_active()?;
            let user_id = self
                .resets
                .redeem(token, now_utc())
                .ok_or_else(|| UserError::invalid_arguments("invalid or expired reset token"))?;
            let updated = self
                .store
                .update(&user_id, &mut |u: &mut User| u.password_hash = password_hash.clone())?;
            info!(user_id = %updated.id, "Password reset");
            Ok(())
        })
        .await
    }
}
