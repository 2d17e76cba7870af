use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A Hammergen account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Opaque unique identifier
    pub id: String,
    /// Email address, unique within the directory
    pub username: String,
    pub admin: bool,
    /// Accounts this user may act on behalf of, parallel to `shared_account_ids`
    #[serde(default)]
    pub shared_account_names: Vec<String>,
    #[serde(default)]
    pub shared_account_ids: Vec<String>,
    /// Plaintext password, only present on create/update payloads
    #[serde(skip)]
    pub password: String,
    /// bcrypt hash bytes
    #[serde(default, with = "hex::serde")]
    pub password_hash: Vec<u8>,
    pub created_on: DateTime<Utc>,
    pub last_auth_on: DateTime<Utc>,
}

impl User {
    /// Record with empty containers and epoch timestamps
    pub fn empty() -> Self {
        Self {
            id: String::new(),
            username: String::new(),
            admin: false,
            shared_account_names: Vec::new(),
            shared_account_ids: Vec::new(),
            password: String::new(),
            password_hash: Vec::new(),
            created_on: DateTime::<Utc>::UNIX_EPOCH,
            last_auth_on: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Payload for `create`
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::empty()
        }
    }

    /// Independent copy; absence propagates
    pub fn copy_of(user: Option<&User>) -> Option<User> {
        user.map(User::deep_copy)
    }

    /// Field-by-field copy owning fresh buffers for every string, list and hash
    pub fn deep_copy(&self) -> User {
        User {
            id: self.id.clone(),
            username: self.username.clone(),
            admin: self.admin,
            shared_account_names: self.shared_account_names.to_vec(),
            shared_account_ids: self.shared_account_ids.to_vec(),
            password: self.password.clone(),
            password_hash: self.password_hash.to_vec(),
            created_on: self.created_on.with_timezone(&Utc),
            last_auth_on: self.last_auth_on.with_timezone(&Utc),
        }
    }

    /// Copy safe to hand back to callers: the plaintext never leaves the directory
    pub fn without_password(&self) -> User {
        let mut user = self.deep_copy();
        user.password.clear();
        user
    }
}

impl Default for User {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("admin", &self.admin)
            .field("shared_account_names", &self.shared_account_names)
            .field("shared_account_ids", &self.shared_account_ids)
            .field("password", &"<redacted>")
            .field("password_hash", &"<redacted>")
            .field("created_on", &self.created_on)
            .field("last_auth_on", &self.last_auth_on)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> User {
        User {
            id: "600000000000000000000001".to_string(),
            username: "user1@test.com".to_string(),
            admin: true,
            shared_account_names: vec!["user2@test.com".to_string()],
            shared_account_ids: vec!["600000000000000000000002".to_string()],
            password: "123456".to_string(),
            password_hash: vec![1, 2, 3, 4],
            created_on: Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap(),
            last_auth_on: Utc.with_ymd_and_hms(2023, 6, 7, 8, 9, 10).unwrap(),
        }
    }

    #[test]
    fn test_copy_equals_source() {
        let user = sample();
        let copy = User::copy_of(Some(&user)).unwrap();
        assert_eq!(copy, user);
    }

    #[test]
    fn test_copy_shares_no_storage() {
        let user = sample();
        let mut copy = user.deep_copy();

        assert_ne!(copy.shared_account_ids.as_ptr(), user.shared_account_ids.as_ptr());
        assert_ne!(copy.password_hash.as_ptr(), user.password_hash.as_ptr());

        copy.shared_account_names[0].push_str("x");
        copy.shared_account_ids.push("another".to_string());
        copy.password_hash[0] = 99;

        assert_eq!(user.shared_account_names, vec!["user2@test.com".to_string()]);
        assert_eq!(user.shared_account_ids.len(), 1);
        assert_eq!(user.password_hash, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_of_none_is_none() {
        assert!(User::copy_of(None).is_none());
    }

    #[test]
    fn test_empty_user_has_empty_containers() {
        let user = User::empty();
        assert!(user.shared_account_names.is_empty());
        assert!(user.shared_account_ids.is_empty());
        assert!(user.password_hash.is_empty());
        assert_eq!(user.created_on, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_without_password_clears_plaintext() {
        let user = sample().without_password();
        assert!(user.password.is_empty());
        assert_eq!(user.password_hash, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_password_never_serialized() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(!json.contains("123456"));

        let back: User = serde_json::from_str(&json).unwrap();
        assert!(back.password.is_empty());
        assert_eq!(back.password_hash, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("123456"));
        assert!(rendered.contains("<redacted>"));
    }
}
