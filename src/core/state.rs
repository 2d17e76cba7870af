// Application state (AppState)

use crate::core::config::Config;
use crate::core::context::RequestContext;
use crate::core::error::UserError;
use crate::services::directory::{DirectorySettings, UserDirectory};
use crate::services::email::EmailSender;
use crate::services::password::PasswordHasher;
use crate::services::tokens::TokenService;
use crate::services::user_service::UserService;
use crate::stores::user_store::UserStore;
use anyhow::Result;
use std::sync::Arc;

/// Shared application state
///
/// All fields are wrapped in Arc for cheap cloning into background tasks.
pub struct AppState<S: UserStore> {
    /// Account storage
    pub store: Arc<S>,

    /// The user directory built over `store`
    pub directory: Arc<UserDirectory<S>>,

    /// Access token signing
    pub tokens: Arc<TokenService>,

    /// Configuration
    pub config: Arc<Config>,
}

impl<S: UserStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            directory: Arc::clone(&self.directory),
            tokens: Arc::clone(&self.tokens),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: UserStore + 'static> AppState<S> {
    pub fn new(config: Config, store: S, mailer: Arc<dyn EmailSender>) -> Result<Self> {
        let config = Arc::new(config);
        let store = Arc::new(store);

        let directory = Arc::new(UserDirectory::new(
            Arc::clone(&store),
            mailer,
            PasswordHasher::new(config.auth.bcrypt_cost)?,
            DirectorySettings::from_config(&config),
        ));

        let tokens = Arc::new(TokenService::new(
            &config.auth.jwt_secret,
            config.auth.access_token_ttl_secs,
        ));

        Ok(Self {
            store,
            directory,
            tokens,
            config,
        })
    }

    /// Authenticate and issue an access token for the account
    pub async fn login(
        &self,
        ctx: &RequestContext,
        username: &str,
        password: &str,
    ) -> Result<String, UserError> {
        let user = self.directory.authenticate(ctx, username, password).await?;
        let claims = self.directory.claims_for(ctx, &user.id)?;
        self.tokens.issue(&claims)
    }
}
