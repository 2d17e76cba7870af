use crate::core::context::RequestContext;
use crate::core::error::UserError;
use anyhow::Context;

/// bcrypt hashing, run off the async workers
#[derive(Debug)]
pub struct PasswordHasher {
    cost: u32,
    /// Hash verified against for unknown usernames, so they cost the same
    /// as a wrong password from the very first attempt
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> anyhow::Result<Self> {
        let dummy_hash = bcrypt::hash("hammergen-dummy-password", cost)
            .context("Failed to prepare dummy password hash")?;

        Ok(Self { cost, dummy_hash })
    }

    pub async fn hash(&self, ctx: &RequestContext, password: &str) -> Result<Vec<u8>, UserError> {
        let password = password.to_string();
        let cost = self.cost;

        ctx.run(async move {
            let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
                .await
                .context("Password hashing task failed")
                .map_err(UserError::internal)?
                .context("Failed to hash password")
                .map_err(UserError::internal)?;
            Ok(hash.into_bytes())
        })
        .await
    }

    /// `Ok(false)` on mismatch; an unparseable stored hash is an internal error
    pub async fn verify(
        &self,
        ctx: &RequestContext,
        password: &str,
        hash: &[u8],
    ) -> Result<bool, UserError> {
        let hash = String::from_utf8(hash.to_vec())
            .context("Stored password hash is not UTF-8")
            .map_err(UserError::internal)?;
        let password = password.to_string();

        ctx.run(async move {
            tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
                .await
                .context("Password verification task failed")
                .map_err(UserError::internal)?
                .context("Failed to verify password")
                .map_err(UserError::internal)
        })
        .await
    }

    /// Spend the same work as a real verification, for unknown usernames
    pub async fn verify_dummy(&self, ctx: &RequestContext, password: &str) -> Result<(), UserError> {
        self.verify(ctx, password, self.dummy_hash.as_bytes()).await?;
        Ok(())
    }
}
