use crate::utils::time::{expires_at, is_expired};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;

/// A password reset waiting to be redeemed
#[derive(Clone, Debug)]
pub struct PendingReset {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Single-use, time-limited password reset tokens
///
/// Tokens live only in memory; a restart invalidates every pending reset.
/// Each account has at most one live token: `by_user` is updated through
/// its entry lock, which also covers the swap in `pending`.
pub struct ResetTokenStore {
    pending: DashMap<String, PendingReset>,
    by_user: DashMap<String, String>,
}

impl ResetTokenStore {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    /// Issue a fresh 256-bit token for `user_id`, revoking any earlier one
    pub fn issue(&self, user_id: &str, ttl_secs: i64, now: DateTime<Utc>) -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        let token = hex::encode(bytes);

        let reset = PendingReset {
            user_id: user_id.to_string(),
            expires_at: expires_at(now, ttl_secs),
        };

        // Lock order is always by_user then pending
        match self.by_user.entry(user_id.to_string()) {
            Entry::Occupied(mut slot) => {
                let previous = slot.insert(token.clone());
                self.pending.remove(&previous);
                self.pending.insert(token.clone(), reset);
            }
            Entry::Vacant(slot) => {
                self.pending.insert(token.clone(), reset);
                slot.insert(token.clone());
            }
        }
        token
    }

    /// Consume `token`, returning the account it was issued for
    ///
    /// Removal happens before the expiry check, so of any number of
    /// concurrent redemptions at most one can succeed.
    pub fn redeem(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        let (_, reset) = self.pending.remove(token)?;
        self.by_user.remove_if(&reset.user_id, |_, current| current == token);
        if is_expired(reset.expires_at, now) {
            return None;
        }
        Some(reset.user_id)
    }

    pub fn revoke(&self, token: &str) -> bool {
        match self.pending.remove(token) {
            Some((_, reset)) => {
                self.by_user.remove_if(&reset.user_id, |_, current| current == token);
                true
            }
            None => false,
        }
    }

    pub fn revoke_user(&self, user_id: &str) -> usize {
        match self.by_user.remove(user_id) {
            Some((_, token)) => usize::from(self.pending.remove(&token).is_some()),
            None => 0,
        }
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, reset| !is_expired(reset.expires_at, now));
        self.by_user.retain(|_, token| self.pending.contains_key(token.as_str()));
        before.saturating_sub(self.pending.len())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for ResetTokenStore {
    fn default() -> Self {
        Self::new()
    }
}
