use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::config::BootstrapConfig;
use crate::core::context::RequestContext;
use crate::services::directory::UserDirectory;
use crate::stores::user_store::{MemoryUserStore, UserStore};
use crate::wal::wal::WalOperation;

// this runs at boot time
pub fn apply_wal_operations(store: &MemoryUserStore, operations: &[WalOperation]) {
    for op in operations {
        match op {
            WalOperation::PutUser(user) => store.put(user.deep_copy()),
            WalOperation::RemoveUser { id } => {
                store.remove(id);
            }
        }
    }
}

/// Make sure the configured admin account exists, if one is configured
pub async fn bootstrap_admin<S: UserStore + 'static>(
    directory: &UserDirectory<S>,
    config: &BootstrapConfig,
) -> Result<()> {
    let (username, password) = match (&config.admin_username, &config.admin_password) {
        (Some(username), Some(password)) => (username, password),
        (None, None) => return Ok(()),
        _ => {
            warn!("Bootstrap admin needs both admin_username and admin_password, skipping");
            return Ok(());
        }
    };

    let admin = directory
        .ensure_admin(&RequestContext::new(), username, password)
        .await
        .context("Failed to bootstrap admin account")?;

    info!(user_id = %admin.id, username = %admin.username, "Admin account ready");
    Ok(())
}
