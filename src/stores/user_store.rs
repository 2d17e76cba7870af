use crate::core::error::StoreError;
use crate::models::user::User;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Backing store for accounts
///
/// Usernames passed in are already normalized. Implementations guarantee
/// that at most one account holds a given username at any time, including
/// under concurrent `insert`/`rename` calls.
pub trait UserStore: Send + Sync {
    fn get(&self, id: &str) -> Option<User>;

    fn find_by_username(&self, username: &str) -> Option<User>;

    /// Fails `Duplicate` if the username is taken
    fn insert(&self, user: User) -> Result<User, StoreError>;

    /// Read-modify-write of one account. `apply` cannot change id or username.
    fn update(&self, id: &str, apply: &mut dyn FnMut(&mut User)) -> Result<User, StoreError>;

    /// Also rewrites the name wherever other accounts list `id` as shared
    fn rename(&self, id: &str, username: &str) -> Result<User, StoreError>;

    /// Also drops `id` from every other account's shared lists
    fn delete(&self, id: &str) -> Result<User, StoreError>;

    /// All accounts ordered by username
    fn list(&self) -> Vec<User>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store: accounts by id plus a username index
pub struct MemoryUserStore {
    users: DashMap<String, User>,
    usernames: DashMap<String, String>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            usernames: DashMap::new(),
        }
    }

    /// Upsert without uniqueness checks, for journal replay and rollback
    pub fn put(&self, user: User) {
        let previous = self.users.get(&user.id).map(|u| u.username.clone());
        if let Some(previous) = previous {
            if previous != user.username {
                self.usernames.remove_if(&previous, |_, owner| owner == &user.id);
            }
        }
        self.usernames.insert(user.username.clone(), user.id.clone());
        self.users.insert(user.id.clone(), user);
    }

    /// Remove without reporting absence, for journal replay and rollback
    pub fn remove(&self, id: &str) -> Option<User> {
        let (_, user) = self.users.remove(id)?;
        self.usernames.remove_if(&user.username, |_, owner| owner == id);
        Some(user)
    }

    /// Rename `id` and follow it in other accounts' shared lists
    ///
    /// Returns the renamed account and the prior state of every account
    /// whose shared list was rewritten.
    pub fn rename_with_references(
        &self,
        id: &str,
        username: &str,
    ) -> Result<(User, Vec<User>), StoreError> {
        let renamed = self.rename_account(id, username)?;
        let touched = self.rewrite_shared_references(id, Some(&renamed.username));
        Ok((renamed, touched))
    }

    /// Delete `id` and drop it from other accounts' shared lists
    ///
    /// Returns the removed account and the prior state of every account
    /// whose shared list was rewritten.
    pub fn delete_with_references(&self, id: &str) -> Result<(User, Vec<User>), StoreError> {
        let removed = self
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let touched = self.rewrite_shared_references(id, None);
        Ok((removed, touched))
    }

    fn rename_account(&self, id: &str, username: &str) -> Result<User, StoreError> {
        let current = self
            .users
            .get(id)
            .map(|entry| entry.username.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if current == username {
            return self.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()));
        }

        match self.usernames.entry(username.to_string()) {
            Entry::Occupied(_) => return Err(StoreError::Duplicate(username.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(id.to_string());
            }
        }

        let (previous, renamed) = match self.users.get_mut(id) {
            Some(mut entry) => {
                let previous = std::mem::replace(&mut entry.username, username.to_string());
                (previous, entry.deep_copy())
            }
            None => {
                // Deleted between the lookup and the claim
                self.usernames.remove_if(username, |_, owner| owner == id);
                return Err(StoreError::NotFound(id.to_string()));
            }
        };

        self.usernames.remove_if(&previous, |_, owner| owner == id);
        Ok(renamed)
    }

    /// Rename (`Some`) or drop (`None`) `id` in every shared list holding it
    fn rewrite_shared_references(&self, id: &str, username: Option<&str>) -> Vec<User> {
        let mut touched = Vec::new();

        for mut entry in self.users.iter_mut() {
            let holder = entry.value_mut();
            if !holder.shared_account_ids.iter().any(|shared| shared == id) {
                continue;
            }
            touched.push(holder.deep_copy());

            let pairs = holder
                .shared_account_ids
                .drain(..)
                .zip(holder.shared_account_names.drain(..))
                .collect::<Vec<_>>();
            for (shared_id, shared_name) in pairs {
                match (shared_id == id, username) {
                    (false, _) => {
                        holder.shared_account_ids.push(shared_id);
                        holder.shared_account_names.push(shared_name);
                    }
                    (true, Some(username)) => {
                        holder.shared_account_ids.push(shared_id);
                        holder.shared_account_names.push(username.to_string());
                    }
                    (true, None) => {}
                }
            }
        }

        touched
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStore for MemoryUserStore {
    fn get(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|entry| entry.value().deep_copy())
    }

    fn find_by_username(&self, username: &str) -> Option<User> {
        let id = self.usernames.get(username)?.value().clone();
        self.get(&id)
    }

    fn insert(&self, user: User) -> Result<User, StoreError> {
        // Claiming the index slot first makes the username check and the
        // insert one step for concurrent callers
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(user.username)),
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
                self.users.insert(user.id.clone(), user.deep_copy());
                Ok(user)
            }
        }
    }

    fn update(&self, id: &str, apply: &mut dyn FnMut(&mut User)) -> Result<User, StoreError> {
        let mut entry = self
            .users
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let user = entry.value_mut();
        let (user_id, username) = (user.id.clone(), user.username.clone());
        apply(user);
        user.id = user_id;
        user.username = username;

        Ok(user.deep_copy())
    }

    fn rename(&self, id: &str, username: &str) -> Result<User, StoreError> {
        self.rename_with_references(id, username)
            .map(|(renamed, _)| renamed)
    }

    fn delete(&self, id: &str) -> Result<User, StoreError> {
        self.delete_with_references(id)
            .map(|(removed, _)| removed)
    }

    fn list(&self) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .map(|entry| entry.value().deep_copy())
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    fn len(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn user(id: &str, username: &str) -> User {
        let mut user = User::new(username, "");
        user.id = id.to_string();
        user
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = MemoryUserStore::new();
        store.insert(user("u1", "a@test.com")).unwrap();

        assert_eq!(store.get("u1").unwrap().username, "a@test.com");
        assert_eq!(store.find_by_username("a@test.com").unwrap().id, "u1");
        assert!(store.get("missing").is_none());
        assert!(store.find_by_username("b@test.com").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_duplicate_username() {
        let store = MemoryUserStore::new();
        store.insert(user("u1", "a@test.com")).unwrap();

        let err = store.insert(user("u2", "a@test.com")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(name) if name == "a@test.com"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_insert_single_winner() {
        let store = Arc::new(MemoryUserStore::new());
        let mut handles = vec![];

        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.insert(user(&format!("u{}", i), "race@test.com")).is_ok()
            }));
        }

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_keeps_identity() {
        let store = MemoryUserStore::new();
        store.insert(user("u1", "a@test.com")).unwrap();

        let updated = store
            .update("u1", &mut |u: &mut User| {
                u.admin = true;
                u.id = "hijack".to_string();
                u.username = "other@test.com".to_string();
            })
            .unwrap();

        assert!(updated.admin);
        assert_eq!(updated.id, "u1");
        assert_eq!(updated.username, "a@test.com");
        assert!(store.get("u1").unwrap().admin);
    }

    #[test]
    fn test_update_missing() {
        let store = MemoryUserStore::new();
        let err = store.update("nope", &mut |_: &mut User| {}).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_rename_moves_index() {
        let store = MemoryUserStore::new();
        store.insert(user("u1", "a@test.com")).unwrap();

        let renamed = store.rename("u1", "b@test.com").unwrap();
        assert_eq!(renamed.username, "b@test.com");
        assert!(store.find_by_username("a@test.com").is_none());
        assert_eq!(store.find_by_username("b@test.com").unwrap().id, "u1");

        // Old name is free again
        store.insert(user("u2", "a@test.com")).unwrap();
    }

    #[test]
    fn test_rename_to_taken_name() {
        let store = MemoryUserStore::new();
        store.insert(user("u1", "a@test.com")).unwrap();
        store.insert(user("u2", "b@test.com")).unwrap();

        let err = store.rename("u1", "b@test.com").unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.get("u1").unwrap().username, "a@test.com");
    }

    #[test]
    fn test_rename_to_same_name_is_noop() {
        let store = MemoryUserStore::new();
        store.insert(user("u1", "a@test.com")).unwrap();
        assert_eq!(store.rename("u1", "a@test.com").unwrap().username, "a@test.com");
    }

    #[test]
    fn test_delete_frees_username() {
        let store = MemoryUserStore::new();
        store.insert(user("u1", "a@test.com")).unwrap();

        let removed = store.delete("u1").unwrap();
        assert_eq!(removed.id, "u1");
        assert!(store.is_empty());
        assert!(matches!(store.delete("u1"), Err(StoreError::NotFound(_))));

        store.insert(user("u2", "a@test.com")).unwrap();
    }

    fn sharing(id: &str, username: &str, shared: &[(&str, &str)]) -> User {
        let mut u = user(id, username);
        u.shared_account_ids = shared.iter().map(|(id, _)| id.to_string()).collect();
        u.shared_account_names = shared.iter().map(|(_, name)| name.to_string()).collect();
        u
    }

    #[test]
    fn test_delete_drops_shared_references() {
        let store = MemoryUserStore::new();
        store.insert(user("u2", "b@test.com")).unwrap();
        store.insert(user("u3", "c@test.com")).unwrap();
        store
            .insert(sharing("u1", "a@test.com", &[("u2", "b@test.com"), ("u3", "c@test.com")]))
            .unwrap();

        let (removed, touched) = store.delete_with_references("u2").unwrap();
        assert_eq!(removed.id, "u2");
        assert_eq!(touched.len(), 1);
        assert_eq!(touched[0].shared_account_ids, vec!["u2", "u3"]);

        let holder = store.get("u1").unwrap();
        assert_eq!(holder.shared_account_ids, vec!["u3"]);
        assert_eq!(holder.shared_account_names, vec!["c@test.com"]);
    }

    #[test]
    fn test_rename_follows_shared_references() {
        let store = MemoryUserStore::new();
        store.insert(user("u2", "b@test.com")).unwrap();
        store.insert(sharing("u1", "a@test.com", &[("u2", "b@test.com")])).unwrap();
        store.insert(user("u3", "c@test.com")).unwrap();

        let (renamed, touched) = store.rename_with_references("u2", "z@test.com").unwrap();
        assert_eq!(renamed.username, "z@test.com");
        assert_eq!(touched.len(), 1);
        assert_eq!(touched[0].id, "u1");

        let holder = store.get("u1").unwrap();
        assert_eq!(holder.shared_account_ids, vec!["u2"]);
        assert_eq!(holder.shared_account_names, vec!["z@test.com"]);
    }

    #[test]
    fn test_list_sorted_by_username() {
        let store = MemoryUserStore::new();
        store.insert(user("u1", "c@test.com")).unwrap();
        store.insert(user("u2", "a@test.com")).unwrap();
        store.insert(user("u3", "b@test.com")).unwrap();

        let names: Vec<String> = store.list().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["a@test.com", "b@test.com", "c@test.com"]);
    }

    #[test]
    fn test_put_replaces_username_index() {
        let store = MemoryUserStore::new();
        store.put(user("u1", "a@test.com"));
        store.put(user("u1", "b@test.com"));

        assert!(store.find_by_username("a@test.com").is_none());
        assert_eq!(store.find_by_username("b@test.com").unwrap().id, "u1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_returned_values_are_independent() {
        let store = MemoryUserStore::new();
        let mut u = user("u1", "a@test.com");
        u.shared_account_ids = vec!["x".to_string()];
        store.insert(u).unwrap();

        let mut fetched = store.get("u1").unwrap();
        fetched.shared_account_ids.clear();
        assert_eq!(store.get("u1").unwrap().shared_account_ids, vec!["x".to_string()]);
    }
}
