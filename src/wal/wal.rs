use crate::models::user::User;
use anyhow::{anyhow, bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// WAL operation types
#[derive(Debug, Clone, PartialEq)]
pub enum WalOperation {
    /// Full account state after a create or update
    PutUser(User),
    RemoveUser { id: String },
}

impl WalOperation {
    fn encode(&self) -> Result<String> {
        match self {
            WalOperation::PutUser(user) => {
                let json = serde_json::to_string(user).context("Failed to serialize user")?;
                Ok(format!("PUT_USER|{}", json))
            }
            WalOperation::RemoveUser { id } => Ok(format!("REMOVE_USER|{}", id)),
        }
    }

    fn decode(line: &str) -> Result<Self> {
        let (tag, payload) = line
            .split_once('|')
            .ok_or_else(|| anyhow!("Missing operation separator"))?;

        match tag {
            "PUT_USER" => {
                let user: User = serde_json::from_str(payload).context("Invalid PUT_USER payload")?;
                if user.id.is_empty() {
                    bail!("PUT_USER without id");
                }
                Ok(WalOperation::PutUser(user))
            }
            "REMOVE_USER" => {
                if payload.is_empty() || payload.contains('|') {
                    bail!("Invalid REMOVE_USER format");
                }
                Ok(WalOperation::RemoveUser {
                    id: payload.to_string(),
                })
            }
            _ => bail!("Unknown operation type"),
        }
    }
}

/// Append-only journal of account changes
pub struct Wal {
    file: Mutex<File>,
    path: PathBuf,
}

impl Wal {
    pub fn new(path: PathBuf) -> Result<Self> {
        let file = open_append(&path)?;

        Ok(Wal {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> Result<MutexGuard<'_, File>> {
        self.file.lock().map_err(|_| anyhow!("WAL lock poisoned"))
    }

    pub fn log_operation(&self, op: &WalOperation) -> Result<()> {
        self.log_operations(std::slice::from_ref(op))
    }

    /// Append `operations` with a single write, so a multi-record change
    /// lands in the journal as one unit
    pub fn log_operations(&self, operations: &[WalOperation]) -> Result<()> {
        let mut batch = String::new();
        for op in operations {
            batch.push_str(&op.encode()?);
            batch.push('\n');
        }

        let mut file = self.lock_file()?;
        file.write_all(batch.as_bytes()).context("Failed to write to WAL")?;
        file.flush().context("Failed to flush WAL")?;
        Ok(())
    }

    pub fn replay(&self) -> Result<Vec<WalOperation>> {
        let file = File::open(&self.path).context("Failed to open WAL for replay")?;
        let reader = BufReader::new(file);
        let mut operations = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.context("Failed to read line from WAL")?;
            let line = line.trim();

            // Skip empty lines
            if line.is_empty() {
                continue;
            }

            match WalOperation::decode(line) {
                Ok(op) => operations.push(op),
                Err(e) => {
                    tracing::warn!(
                        line_num = line_num + 1,
                        error = %e,
                        "Failed to parse WAL line, skipping"
                    );
                }
            }
        }

        Ok(operations)
    }

    /// Replace the journal with `operations`, atomically via rename
    pub fn rewrite(&self, operations: &[WalOperation]) -> Result<()> {
        let mut file = self.lock_file()?;
        let tmp_path = self.path.with_extension("compact");

        {
            let mut tmp = File::create(&tmp_path)
                .context(format!("Failed to create {}", tmp_path.display()))?;
            for op in operations {
                writeln!(tmp, "{}", op.encode()?).context("Failed to write compacted WAL")?;
            }
            tmp.sync_all().context("Failed to sync compacted WAL")?;
        }

        std::fs::rename(&tmp_path, &self.path).context("Failed to swap in compacted WAL")?;
        *file = open_append(&self.path)?;
        Ok(())
    }

}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(format!("Failed to open WAL file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn user(id: &str, username: &str) -> User {
        let mut user = User::new(username, "");
        user.id = id.to_string();
        user.password_hash = b"$2b$04$abcdefghijklmnopqrstuv".to_vec();
        user
    }

    #[test]
    fn test_wal_operation_encoding() {
        let op = WalOperation::RemoveUser { id: "u1".to_string() };
        assert_eq!(op.encode().unwrap(), "REMOVE_USER|u1");
        assert_eq!(WalOperation::decode("REMOVE_USER|u1").unwrap(), op);

        let op = WalOperation::PutUser(user("u1", "a|b@test.com"));
        let line = op.encode().unwrap();
        assert!(line.starts_with("PUT_USER|{"));
        assert_eq!(WalOperation::decode(&line).unwrap(), op);
    }

    #[test]
    fn test_password_hash_is_hex_in_journal() {
        let op = WalOperation::PutUser(user("u1", "a@test.com"));
        let line = op.encode().unwrap();
        assert!(line.contains(&hex::encode(b"$2b$04$abcdefghijklmnopqrstuv")));
    }

    #[test]
    fn test_wal_log_and_replay() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");

        let wal = Wal::new(wal_path).unwrap();

        wal.log_operation(&WalOperation::PutUser(user("u1", "a@test.com"))).unwrap();
        wal.log_operation(&WalOperation::PutUser(user("u2", "b@test.com"))).unwrap();
        wal.log_operation(&WalOperation::RemoveUser { id: "u1".to_string() }).unwrap();

        let operations = wal.replay().unwrap();
        assert_eq!(operations.len(), 3);

        match &operations[1] {
            WalOperation::PutUser(u) => assert_eq!(u.username, "b@test.com"),
            _ => panic!("Expected PutUser"),
        }

        match &operations[2] {
            WalOperation::RemoveUser { id } => assert_eq!(id, "u1"),
            _ => panic!("Expected RemoveUser"),
        }
    }

    #[test]
    fn test_wal_rewrite() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");
        let wal = Wal::new(wal_path.clone()).unwrap();

        for i in 0..5 {
            wal.log_operation(&WalOperation::PutUser(user("u1", &format!("v{}@test.com", i))))
                .unwrap();
        }

        wal.rewrite(&[WalOperation::PutUser(user("u1", "v4@test.com"))]).unwrap();
        assert_eq!(wal.replay().unwrap().len(), 1);

        // Appends keep working against the swapped file
        wal.log_operation(&WalOperation::RemoveUser { id: "u1".to_string() }).unwrap();
        assert_eq!(wal.replay().unwrap().len(), 2);
        assert!(!wal_path.with_extension("compact").exists());
    }

    #[test]
    fn test_wal_batch_append() {
        let temp_dir = TempDir::new().unwrap();
        let wal = Wal::new(temp_dir.path().join("test.wal")).unwrap();

        wal.log_operations(&[
            WalOperation::PutUser(user("u1", "a@test.com")),
            WalOperation::RemoveUser { id: "u2".to_string() },
        ])
        .unwrap();
        wal.log_operations(&[]).unwrap();

        let operations = wal.replay().unwrap();
        assert_eq!(operations.len(), 2);
        assert_eq!(operations[1], WalOperation::RemoveUser { id: "u2".to_string() });
    }

    #[test]
    fn test_wal_invalid_lines() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("test.wal");

        // Write invalid data directly to file
        fs::write(
            &wal_path,
            "INVALID_OP|data\nPUT_USER|{not json\nREMOVE_USER|\nREMOVE_USER|u7\n",
        )
        .unwrap();

        let wal = Wal::new(wal_path).unwrap();
        let operations = wal.replay().unwrap();

        // Should skip invalid lines and parse the valid one
        assert_eq!(operations, vec![WalOperation::RemoveUser { id: "u7".to_string() }]);
    }
}
