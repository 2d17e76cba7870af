pub mod core {
    pub mod config;
    pub mod context;
    pub mod error;
    pub mod startup;
    pub mod state;
    pub mod tracing_init;
}

pub mod models {
    pub mod claims;
    pub mod user;
}

pub mod services {
    pub mod directory;
    pub mod email;
    pub mod password;
    pub mod tokens;
    pub mod user_service;
}

pub mod stores {
    pub mod reset_tokens;
    pub mod user_store;
    pub mod wal_store;
}

pub mod security {
    pub mod rate_limiter;
}

pub mod validation {
    pub mod user;
}

pub mod utils {
    pub mod time;
}

pub mod wal {
    pub mod wal;
}

#[cfg(test)]
mod testing;

pub use crate::core::context::RequestContext;
pub use crate::core::error::{UserError, UserErrorKind};
pub use crate::models::{claims::Claims, user::User};
pub use crate::services::directory::UserDirectory;
pub use crate::services::user_service::UserService;
