use crate::core::context::RequestContext;
use crate::core::error::UserError;
use crate::models::claims::Claims;
use crate::models::user::User;
use async_trait::async_trait;

/// Single authority for accounts, authentication and password resets
///
/// Returned users never carry the plaintext password. Operations taking
/// `Claims` check authorization before looking anything up, so a refusal
/// says nothing about whether the target exists.
#[async_trait]
pub trait UserService: Send + Sync {
    /// Visible to the account itself, its shared-account delegates and admins
    async fn get(&self, ctx: &RequestContext, claims: &Claims, id: &str) -> Result<User, UserError>;

    /// Registration pre-check, no authorization required
    async fn exists(&self, ctx: &RequestContext, username: &str) -> Result<bool, UserError>;

    /// Register `user.username` with `user.password`
    async fn create(&self, ctx: &RequestContext, user: &User) -> Result<User, UserError>;

    /// Change the username of `user.id`; self or admin
    async fn update(&self, ctx: &RequestContext, claims: &Claims, user: &User) -> Result<User, UserError>;

    /// Replace the password with `user.password` after checking `current_password`; self only
    async fn update_credentials(
        &self,
        ctx: &RequestContext,
        claims: &Claims,
        current_password: &str,
        user: &User,
    ) -> Result<User, UserError>;

    /// Set `admin` and the shared accounts (by name) of `user.id`; admin only
    async fn update_claims(&self, ctx: &RequestContext, claims: &Claims, user: &User) -> Result<User, UserError>;

    /// Self or admin
    async fn delete(&self, ctx: &RequestContext, claims: &Claims, id: &str) -> Result<(), UserError>;

    /// Admin only, ordered by username
    async fn list(&self, ctx: &RequestContext, claims: &Claims) -> Result<Vec<User>, UserError>;

    async fn authenticate(&self, ctx: &RequestContext, username: &str, password: &str) -> Result<User, UserError>;

    /// Email a reset link; succeeds without sending for unknown usernames
    async fn send_reset_password(&self, ctx: &RequestContext, username: &str) -> Result<(), UserError>;

    async fn reset_password(&self, ctx: &RequestContext, token: &str, new_password: &str) -> Result<(), UserError>;
}
