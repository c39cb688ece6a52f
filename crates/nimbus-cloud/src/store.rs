//! Persisted run state
//!
//! Manages `.nimbus/state.json`, which records the last known state of
//! every resource, and `.nimbus/lock.json`, which keeps two runs from
//! working on the same project at once.

use crate::error::{CloudError, Result};
use crate::report::{RunMode, RunReport};
use crate::state::ProvisionStatus;
use chrono::{DateTime, Utc};
use nimbus_core::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_SCRATCH: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Locks older than this are considered abandoned
const STALE_LOCK_HOURS: i64 = 1;

/// Recorded state of a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    pub resource_group: Option<String>,

    pub last_run: Option<LastRun>,

    /// Resources indexed by `kind/name`
    pub resources: BTreeMap<String, RecordedResource>,
}

impl Default for RecordedState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resource_group: None,
            last_run: None,
            resources: BTreeMap::new(),
        }
    }
}

/// Summary of the most recent run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastRun {
    pub mode: RunMode,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub duration_ms: u64,
}

/// Last known state of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub status: ProvisionStatus,
    pub remote_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the outcome of a run into the recorded state
    ///
    /// Deleted resources are dropped. Resources a run never touched
    /// (cancelled, blocked, or left present) keep their previous record.
    pub fn apply_report(&mut self, report: &RunReport) {
        let now = Utc::now();
        self.resource_group = Some(report.resource_group.clone());

        for entry in &report.entries {
            let key = entry.resource.to_string();
            let status = entry.status();

            if status.is_gone() {
                self.resources.remove(&key);
                continue;
            }

            match status {
                ProvisionStatus::Created | ProvisionStatus::Failed => {
                    let record = self
                        .resources
                        .entry(key)
                        .or_insert_with(|| RecordedResource {
                            kind: entry.resource.kind,
                            name: entry.resource.name.clone(),
                            status,
                            remote_id: None,
                            error: None,
                            created_at: now,
                            updated_at: now,
                        });
                    record.status = status;
                    if entry.state.remote_id.is_some() {
                        record.remote_id = entry.state.remote_id.clone();
                    }
                    record.error = entry.state.error.clone();
                    record.updated_at = now;
                }
                ProvisionStatus::Present => {
                    self.resources.entry(key).or_insert_with(|| RecordedResource {
                        kind: entry.resource.kind,
                        name: entry.resource.name.clone(),
                        status,
                        remote_id: None,
                        error: None,
                        created_at: now,
                        updated_at: now,
                    });
                }
                _ => {}
            }
        }

        self.last_run = Some(LastRun {
            mode: report.mode,
            finished_at: now,
            success: report.is_success(),
            duration_ms: report.duration_ms,
        });
        self.updated_at = now;
    }
}

/// State directory of one project: `state.json`, its backup and the lock
#[derive(Debug, Clone)]
pub struct StateManager {
    dir: PathBuf,
}

impl StateManager {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.dir
    }

    /// Recorded state, empty when no run was recorded yet
    pub async fn load(&self) -> Result<RecordedState> {
        let content = match fs::read_to_string(self.dir.join(STATE_FILE)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RecordedState::new()),
            Err(e) => return Err(e.into()),
        };

        let state: RecordedState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "{} was written by a newer nimbus (version {}, supported {})",
                STATE_FILE, state.version, STATE_VERSION
            )));
        }
        Ok(state)
    }

    /// Replace `state.json`, moving the previous file to the backup
    ///
    /// The new content is written to a scratch file first, so an
    /// interrupted save never leaves a truncated state file behind.
    pub async fn save(&self, state: &RecordedState) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let scratch = self.dir.join(STATE_SCRATCH);
        fs::write(&scratch, serde_json::to_vec_pretty(state)?).await?;

        let current = self.dir.join(STATE_FILE);
        match fs::rename(&current, self.dir.join(STATE_BACKUP)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::rename(&scratch, &current).await?;

        tracing::debug!(resources = state.resources.len(), "State recorded");
        Ok(())
    }

    /// Load, fold in a report and save
    pub async fn record(&self, report: &RunReport) -> Result<RecordedState> {
        let mut state = self.load().await?;
        state.apply_report(report);
        self.save(&state).await?;
        Ok(state)
    }

    /// Take the project lock
    ///
    /// The lock file is created with `create_new`, so of two runs racing
    /// for it exactly one wins. A stale lock is moved aside before it is
    /// removed; if it turns out to have been replaced by a live lock in the
    /// meantime, it is put back.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(LOCK_FILE);
        let body = serde_json::to_vec_pretty(&LockInfo::current())?;

        for _ in 0..LOCK_ATTEMPTS {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(&body).await?;
                    file.flush().await?;
                    tracing::debug!(path = %path.display(), "State lock taken");
                    return Ok(StateLock { path, held: true });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    match read_holder(&path).await? {
                        Holder::Gone => continue,
                        Holder::Live(info) => return Err(info.held_error()),
                        Holder::Unreadable => {
                            return Err(CloudError::LockError(format!(
                                "{} is held by another run",
                                path.display()
                            )));
                        }
                        Holder::Stale(info) => self.evict_stale(&path, info).await?,
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CloudError::LockError(format!(
            "{} kept changing while it was being acquired",
            path.display()
        )))
    }

    async fn evict_stale(&self, path: &Path, info: LockInfo) -> Result<()> {
        let aside = self
            .dir
            .join(format!("{}.stale-{}", LOCK_FILE, std::process::id()));
        match fs::rename(path, &aside).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        // Another run may have evicted the stale lock and taken a fresh one
        // between our read and the rename.
        if let Holder::Live(live) = read_holder(&aside).await? {
            let restored = fs::hard_link(&aside, path).await;
            fs::remove_file(&aside).await?;
            return match restored {
                Ok(()) => Err(live.held_error()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(live.held_error()),
                Err(e) => Err(e.into()),
            };
        }

        tracing::warn!(
            holder = %info.holder,
            pid = info.pid,
            since = %info.acquired_at,
            "Removing stale state lock"
        );
        fs::remove_file(&aside).await?;
        Ok(())
    }
}

/// Number of `create_new` attempts before giving up on a contended lock
const LOCK_ATTEMPTS: usize = 3;

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    fn is_stale(&self) -> bool {
        Utc::now().signed_duration_since(self.acquired_at).num_hours() >= STALE_LOCK_HOURS
    }

    fn held_error(&self) -> CloudError {
        CloudError::LockError(format!(
            "State is locked by {} (pid {}) since {}",
            self.holder, self.pid, self.acquired_at
        ))
    }
}

/// Who, if anyone, owns an existing lock file
enum Holder {
    /// Removed since `create_new` failed
    Gone,
    /// Empty or partially written: its owner is still writing it
    Unreadable,
    Live(LockInfo),
    Stale(LockInfo),
}

async fn read_holder(path: &Path) -> Result<Holder> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Holder::Gone),
        Err(e) => return Err(e.into()),
    };
    let info = match serde_json::from_str::<LockInfo>(&content) {
        Ok(info) => info,
        Err(_) => {
            // A crashed run can leave an empty file; age it by mtime
            let modified = fs::metadata(path).await?.modified()?;
            let info = LockInfo {
                holder: "unknown".to_string(),
                pid: 0,
                acquired_at: DateTime::<Utc>::from(modified),
            };
            if !info.is_stale() {
                return Ok(Holder::Unreadable);
            }
            info
        }
    };
    Ok(if info.is_stale() {
        Holder::Stale(info)
    } else {
        Holder::Live(info)
    })
}

/// Held project lock, removed on `release` or drop
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    held: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.held = false;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!("State lock released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if self.held {
            std::fs::remove_file(&self.path).ok();
        }
    }
}
