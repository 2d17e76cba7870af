use crate::models::user::User;
use serde::{Deserialize, Serialize};

/// Identity and permission scope of the caller
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Id of the authenticated account, empty for anonymous callers
    pub id: String,
    pub admin: bool,
    /// Ids of accounts the caller may act on behalf of
    #[serde(default)]
    pub shared_accounts: Vec<String>,
}

impl Claims {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            admin: user.admin,
            shared_accounts: user.shared_account_ids.clone(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_empty()
    }

    pub fn is_self(&self, id: &str) -> bool {
        !self.is_anonymous() && self.id == id
    }

    /// The admin flag only counts for an identified caller
    pub fn is_admin(&self) -> bool {
        !self.is_anonymous() && self.admin
    }

    /// Self, admin or shared-account delegate
    pub fn can_view(&self, id: &str) -> bool {
        if self.is_anonymous() {
            return false;
        }
        self.admin || self.is_self(id) || self.shared_accounts.iter().any(|shared| shared == id)
    }

    /// Self or admin
    pub fn can_modify(&self, id: &str) -> bool {
        self.is_admin() || self.is_self(id)
    }
}
