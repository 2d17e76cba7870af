use crate::core::error::StoreError;
use crate::core::startup::apply_wal_operations;
use crate::models::user::User;
use crate::stores::user_store::{MemoryUserStore, UserStore};
use crate::wal::wal::{Wal, WalOperation};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Durable store: the in-memory index journaled to a WAL
///
/// Writers are serialized so journal order always matches memory order.
/// A failed journal write rolls the memory change back.
pub struct WalUserStore {
    memory: MemoryUserStore,
    wal: Wal,
    write_lock: Mutex<()>,
}

impl WalUserStore {
    /// Open (or create) the journal at `path` and replay it
    pub fn open(path: PathBuf) -> Result<Self> {
        let wal = Wal::new(path).context("Failed to initialize WAL")?;
        let memory = MemoryUserStore::new();

        let operations = wal.replay().context("Failed to replay WAL")?;
        apply_wal_operations(&memory, &operations);

        tracing::info!(
            wal_path = %wal.path().display(),
            operations_replayed = operations.len(),
            users_loaded = memory.len(),
            "WAL replay completed"
        );

        Ok(Self {
            memory,
            wal,
            write_lock: Mutex::new(()),
        })
    }

    /// Rewrite the journal as one entry per live account
    pub fn compact(&self) -> Result<usize> {
        let _guard = self.lock_writes();
        let operations: Vec<WalOperation> = self
            .memory
            .list()
            .into_iter()
            .map(WalOperation::PutUser)
            .collect();

        self.wal.rewrite(&operations).context("Failed to compact WAL")?;
        Ok(operations.len())
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        // The guarded value is unit; a poisoned lock carries no broken state
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn journal(&self, op: &WalOperation) -> Result<(), StoreError> {
        self.wal.log_operation(op).map_err(StoreError::Persistence)
    }

    fn journal_all(&self, operations: &[WalOperation]) -> Result<(), StoreError> {
        self.wal.log_operations(operations).map_err(StoreError::Persistence)
    }

    /// `PutUser` entries for the post-change state of cascaded accounts
    fn current_states(&self, touched: &[User]) -> Vec<WalOperation> {
        touched
            .iter()
            .filter_map(|previous| self.memory.get(&previous.id))
            .map(WalOperation::PutUser)
            .collect()
    }

    fn restore(&self, touched: Vec<User>) {
        for previous in touched {
            self.memory.put(previous);
        }
    }
}

impl UserStore for WalUserStore {
    fn get(&self, id: &str) -> Option<User> {
        self.memory.get(id)
    }

    fn find_by_username(&self, username: &str) -> Option<User> {
        self.memory.find_by_username(username)
    }

    fn insert(&self, user: User) -> Result<User, StoreError> {
        let _guard = self.lock_writes();
        let inserted = self.memory.insert(user)?;

        if let Err(e) = self.journal(&WalOperation::PutUser(inserted.deep_copy())) {
            self.memory.remove(&inserted.id);
            return Err(e);
        }
        Ok(inserted)
    }

    fn update(&self, id: &str, apply: &mut dyn FnMut(&mut User)) -> Result<User, StoreError> {
        let _guard = self.lock_writes();
        let previous = self
            .memory
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let updated = self.memory.update(id, apply)?;

        if let Err(e) = self.journal(&WalOperation::PutUser(updated.deep_copy())) {
            self.memory.put(previous);
            return Err(e);
        }
        Ok(updated)
    }

    fn rename(&self, id: &str, username: &str) -> Result<User, StoreError> {
        let _guard = self.lock_writes();
        let previous = self
            .memory
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let (renamed, touched) = self.memory.rename_with_references(id, username)?;

        let mut operations = vec![WalOperation::PutUser(renamed.deep_copy())];
        operations.extend(self.current_states(&touched));

        if let Err(e) = self.journal_all(&operations) {
            self.memory.put(previous);
            self.restore(touched);
            return Err(e);
        }
        Ok(renamed)
    }

    fn delete(&self, id: &str) -> Result<User, StoreError> {
        let _guard = self.lock_writes();
        let (removed, touched) = self.memory.delete_with_references(id)?;

        let mut operations = vec![WalOperation::RemoveUser { id: id.to_string() }];
        operations.extend(self.current_states(&touched));

        if let Err(e) = self.journal_all(&operations) {
            self.memory.put(removed);
            self.restore(touched);
            return Err(e);
        }
        Ok(removed)
    }

    fn list(&self) -> Vec<User> {
        self.memory.list()
    }

    fn len(&self) -> usize {
        self.memory.len()
    }
}
