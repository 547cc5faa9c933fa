//! Authorized-keys writers
//!
//! `AuthorizedKeysWriter` is the reconciliation engine's only effectful
//! collaborator; swapping it out is how tests observe deployments without
//! touching the filesystem. The local implementation rewrites
//! `{home_root}/{user}/.ssh/authorized_keys` under an exclusive flock with
//! 0700/0600 permissions, handing ownership to the target user when
//! running as root.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::key_material;

/// Errors from updating an authorized_keys file.
#[derive(Error, Debug)]
pub enum WriterError {
    /// Filesystem operation failed.
    #[error("Failed to update {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// chown of the target path failed.
    #[error("Ownership change failed for {path}: {details}")]
    Ownership { path: String, details: String },

    /// The blocking writer task was cancelled or panicked.
    #[error("Writer task failed: {details}")]
    Task { details: String },
}

impl common::error::KeywardenError for WriterError {}

/// Idempotent sink for a user's authorized keys.
///
/// `write` must be a no-op when called twice with identical arguments.
/// `remove` matches entries on algorithm and key data, ignoring comments.
#[async_trait]
pub trait AuthorizedKeysWriter: Send + Sync {
    /// Install `keys` for `user`. With `delete_unlisted` the file is
    /// replaced by exactly `keys`; otherwise existing entries are kept and
    /// missing ones appended.
    async fn write(
        &self,
        user: &str,
        group: &str,
        keys: &[String],
        delete_unlisted: bool,
    ) -> Result<(), WriterError>;

    /// Remove every entry whose key material matches `key`.
    async fn remove(&self, user: &str, group: &str, key: &str) -> Result<(), WriterError>;
}

/// Writes authorized_keys files for accounts under a home root.
pub struct LocalAuthorizedKeysWriter {
    home_root: PathBuf,
}

impl LocalAuthorizedKeysWriter {
    pub fn new(home_root: impl Into<PathBuf>) -> Self {
        Self {
            home_root: home_root.into(),
        }
    }

    fn ssh_dir(&self, user: &str) -> PathBuf {
        self.home_root.join(user).join(".ssh")
    }
}

#[async_trait]
impl AuthorizedKeysWriter for LocalAuthorizedKeysWriter {
    async fn write(
        &self,
        user: &str,
        group: &str,
        keys: &[String],
        delete_unlisted: bool,
    ) -> Result<(), WriterError> {
        let ssh_dir = self.ssh_dir(user);
        let user = user.to_string();
        let group = group.to_string();
        let keys = keys.to_vec();

        tokio::task::spawn_blocking(move || {
            write_sync(&ssh_dir, &user, &group, &keys, delete_unlisted)
        })
        .await
        .map_err(|err| WriterError::Task {
            details: err.to_string(),
        })?
    }

    async fn remove(&self, user: &str, group: &str, key: &str) -> Result<(), WriterError> {
        let ssh_dir = self.ssh_dir(user);
        let user = user.to_string();
        let group = group.to_string();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || remove_sync(&ssh_dir, &user, &group, &key))
            .await
            .map_err(|err| WriterError::Task {
                details: err.to_string(),
            })?
    }
}

fn write_sync(
    ssh_dir: &Path,
    user: &str,
    group: &str,
    keys: &[String],
    delete_unlisted: bool,
) -> Result<(), WriterError> {
    ensure_ssh_dir(ssh_dir, user, group)?;
    let path = ssh_dir.join("authorized_keys");

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|source| io_error(&path, source))?;

    let _lock = FileLock::acquire(&file, &path);

    let mut existing = String::new();
    file.read_to_string(&mut existing)
        .map_err(|source| io_error(&path, source))?;

    let desired = merge_key_lines(&existing, keys, delete_unlisted);
    let mut content = desired.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }

    file.set_len(0).map_err(|source| io_error(&path, source))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|source| io_error(&path, source))?;
    file.write_all(content.as_bytes())
        .map_err(|source| io_error(&path, source))?;
    file.flush().map_err(|source| io_error(&path, source))?;

    set_mode(&path, 0o600)?;
    apply_ownership(&path, user, group)?;

    info!(
        "Installed {} authorized keys for user '{user}'",
        keys.len()
    );
    Ok(())
}

fn remove_sync(ssh_dir: &Path, user: &str, group: &str, key: &str) -> Result<(), WriterError> {
    let path = ssh_dir.join("authorized_keys");
    if !path.exists() {
        debug!("No authorized_keys file for user '{user}', nothing to remove");
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|source| io_error(&path, source))?;

    let _lock = FileLock::acquire(&file, &path);

    let mut existing = String::new();
    file.read_to_string(&mut existing)
        .map_err(|source| io_error(&path, source))?;

    let target = key_material(key);
    let retained: Vec<&str> = existing
        .lines()
        .filter(|line| !line.trim().is_empty() && key_material(line) != target)
        .collect();

    let mut content = retained.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }

    file.set_len(0).map_err(|source| io_error(&path, source))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|source| io_error(&path, source))?;
    file.write_all(content.as_bytes())
        .map_err(|source| io_error(&path, source))?;
    file.flush().map_err(|source| io_error(&path, source))?;

    set_mode(&path, 0o600)?;
    apply_ownership(&path, user, group)?;

    debug!("Removed matching keys for user '{user}'");
    Ok(())
}

/// Merge existing file content with the desired keys.
///
/// With `delete_unlisted` the result is exactly `keys`. Otherwise existing
/// entries are kept and a desired key is appended only when no existing
/// entry shares its key material.
fn merge_key_lines(existing: &str, keys: &[String], delete_unlisted: bool) -> Vec<String> {
    if delete_unlisted {
        return keys.to_vec();
    }

    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .collect();

    let present: Vec<String> = lines.iter().map(|line| key_material(line)).collect();
    for key in keys {
        if !present.contains(&key_material(key)) {
            lines.push(key.clone());
        }
    }
    lines
}

fn ensure_ssh_dir(ssh_dir: &Path, user: &str, group: &str) -> Result<(), WriterError> {
    if ssh_dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(ssh_dir).map_err(|source| io_error(ssh_dir, source))?;
    set_mode(ssh_dir, 0o700)?;
    apply_ownership(ssh_dir, user, group)?;
    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> Result<(), WriterError> {
    let mut permissions = fs::metadata(path)
        .map_err(|source| io_error(path, source))?
        .permissions();
    permissions.set_mode(mode);
    fs::set_permissions(path, permissions).map_err(|source| io_error(path, source))
}

fn apply_ownership(path: &Path, user: &str, group: &str) -> Result<(), WriterError> {
    // chown to another account requires root.
    if unsafe { libc::geteuid() } != 0 {
        debug!(
            "Not running as root, leaving ownership of {} unchanged",
            path.display()
        );
        return Ok(());
    }

    let output = Command::new("chown")
        .arg(format!("{user}:{group}"))
        .arg(path)
        .output()
        .map_err(|source| io_error(path, source))?;

    if !output.status.success() {
        return Err(WriterError::Ownership {
            path: path.display().to_string(),
            details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> WriterError {
    WriterError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Exclusive advisory lock held for the duration of one file update.
struct FileLock {
    fd: RawFd,
    locked: bool,
}

impl FileLock {
    fn acquire(file: &fs::File, path: &Path) -> Self {
        let fd = file.as_raw_fd();
        let locked = unsafe { libc::flock(fd, libc::LOCK_EX) } == 0;
        if !locked {
            warn!(
                "Could not lock {}, proceeding without lock: {}",
                path.display(),
                std::io::Error::last_os_error()
            );
        }
        Self { fd, locked }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self.locked {
            unsafe { libc::flock(self.fd, libc::LOCK_UN) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_keys(home: &TempDir, user: &str) -> Vec<String> {
        let path = home.path().join(user).join(".ssh").join("authorized_keys");
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[tokio::test]
    async fn write_creates_dir_and_file_with_tight_permissions() {
        let home = TempDir::new().unwrap();
        let writer = LocalAuthorizedKeysWriter::new(home.path());
        let keys = vec!["ssh-ed25519 AAAA alice@laptop".to_string()];

        writer.write("alice", "alice", &keys, false).await.unwrap();

        let ssh_dir = home.path().join("alice").join(".ssh");
        assert_eq!(mode_of(&ssh_dir), 0o700);
        assert_eq!(mode_of(&ssh_dir.join("authorized_keys")), 0o600);
        assert_eq!(read_keys(&home, "alice"), keys);
    }

    #[tokio::test]
    async fn repeated_writes_are_idempotent() {
        let home = TempDir::new().unwrap();
        let writer = LocalAuthorizedKeysWriter::new(home.path());
        let keys = vec![
            "ssh-ed25519 AAAA alice@laptop".to_string(),
            "ssh-rsa BBBB octocat@github".to_string(),
        ];

        writer.write("alice", "alice", &keys, false).await.unwrap();
        writer.write("alice", "alice", &keys, false).await.unwrap();

        assert_eq!(read_keys(&home, "alice"), keys);
    }

    #[tokio::test]
    async fn write_without_delete_keeps_existing_entries() {
        let home = TempDir::new().unwrap();
        let writer = LocalAuthorizedKeysWriter::new(home.path());

        let first = vec!["ssh-ed25519 AAAA preexisting".to_string()];
        writer.write("alice", "alice", &first, false).await.unwrap();

        let second = vec!["ssh-rsa BBBB new@github".to_string()];
        writer.write("alice", "alice", &second, false).await.unwrap();

        assert_eq!(
            read_keys(&home, "alice"),
            vec![
                "ssh-ed25519 AAAA preexisting".to_string(),
                "ssh-rsa BBBB new@github".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn write_with_delete_unlisted_replaces_file() {
        let home = TempDir::new().unwrap();
        let writer = LocalAuthorizedKeysWriter::new(home.path());

        let first = vec![
            "ssh-ed25519 AAAA stale".to_string(),
            "ssh-rsa BBBB keep@github".to_string(),
        ];
        writer.write("alice", "alice", &first, false).await.unwrap();

        let desired = vec!["ssh-rsa BBBB keep@github".to_string()];
        writer.write("alice", "alice", &desired, true).await.unwrap();

        assert_eq!(read_keys(&home, "alice"), desired);
    }

    #[tokio::test]
    async fn same_material_with_different_comment_is_not_duplicated() {
        let home = TempDir::new().unwrap();
        let writer = LocalAuthorizedKeysWriter::new(home.path());

        let first = vec!["ssh-ed25519 AAAA alice@old-laptop".to_string()];
        writer.write("alice", "alice", &first, false).await.unwrap();

        let second = vec!["ssh-ed25519 AAAA alice@new-laptop".to_string()];
        writer.write("alice", "alice", &second, false).await.unwrap();

        assert_eq!(read_keys(&home, "alice"), first);
    }

    #[tokio::test]
    async fn remove_matches_on_key_material() {
        let home = TempDir::new().unwrap();
        let writer = LocalAuthorizedKeysWriter::new(home.path());

        let keys = vec![
            "ssh-ed25519 AAAA managed@registry".to_string(),
            "ssh-rsa BBBB personal@laptop".to_string(),
        ];
        writer.write("alice", "alice", &keys, false).await.unwrap();

        writer
            .remove("alice", "alice", "ssh-ed25519 AAAA")
            .await
            .unwrap();

        assert_eq!(
            read_keys(&home, "alice"),
            vec!["ssh-rsa BBBB personal@laptop".to_string()]
        );
    }

    #[tokio::test]
    async fn remove_on_missing_file_is_a_noop() {
        let home = TempDir::new().unwrap();
        let writer = LocalAuthorizedKeysWriter::new(home.path());

        writer
            .remove("ghost", "ghost", "ssh-ed25519 AAAA")
            .await
            .unwrap();

        assert!(!home.path().join("ghost").exists());
    }

    #[test]
    fn merge_requires_material_match_not_full_line_match() {
        let existing = "ssh-ed25519 AAAA old-comment\n";
        let keys = vec![
            "ssh-ed25519 AAAA new-comment".to_string(),
            "ssh-rsa BBBB".to_string(),
        ];
        let merged = merge_key_lines(existing, &keys, false);
        assert_eq!(
            merged,
            vec![
                "ssh-ed25519 AAAA old-comment".to_string(),
                "ssh-rsa BBBB".to_string(),
            ]
        );
    }
}
