#![forbid(unsafe_code)]

//! Shared signal store: the cross-tab flag backing.
//!
//! The store holds the system-wide maintenance flag under a fixed
//! well-known key. It is the `localStorage` analog: it survives reload and
//! is shared between every tab (process) of the same deployment.
//!
//! # Design Invariants
//!
//! 1. **Fail open to Normal**: a read failure degrades to `false`, logged
//!    at warn, never escalated to the user, and never allowed to produce
//!    the admin surface.
//! 2. **Whole-value replace**: flags are written as complete new values,
//!    never read-modify-written. Last-write-wins is acceptable for a
//!    single boolean.
//! 3. **Atomic file writes**: the file backend uses the temp-file + rename
//!    pattern so a concurrent reader never sees a torn file.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Well-known key of the system-wide maintenance flag.
pub const MAINTENANCE_FLAG_KEY: &str = "allowance_aid_maintenance_mode";

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur reading or writing the shared store.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error during file operations.
    Io(std::io::Error),
    /// The flag file could not be encoded or decoded.
    Serialization(String),
    /// The flag file exists but is not in the expected format.
    Corruption(String),
    /// The backend cannot serve reads or writes at all.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            StoreError::Corruption(msg) => write!(f, "store corruption: {msg}"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Store Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait over the shared boolean-flag store.
///
/// Implementations must be thread-safe: the gate reads on its own loop
/// while the store watcher polls from a background thread.
pub trait SignalStore: Send + Sync {
    /// Human-readable backend name for logging.
    fn name(&self) -> &str;

    /// Read a flag. A missing key reads as `false` (first run).
    fn read_flag(&self, key: &str) -> StoreResult<bool>;

    /// Write a flag as a complete new value.
    fn write_flag(&self, key: &str, value: bool) -> StoreResult<()>;

    /// Read a flag, degrading to its safe default on failure.
    ///
    /// This is the read every reconciliation cycle uses: availability of
    /// the public product outranks the lockout feature, so a broken store
    /// means "no lockout", never "admin".
    fn read_flag_or_default(&self, key: &str) -> bool {
        match self.read_flag(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(backend = self.name(), key, error = %e, "flag read failed, defaulting to false");
                false
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory store for tests and single-tab use.
///
/// Flags are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    flags: RwLock<HashMap<String, bool>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalStore for MemoryStore {
    fn name(&self) -> &str {
        "MemoryStore"
    }

    fn read_flag(&self, key: &str) -> StoreResult<bool> {
        let guard = self
            .flags
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?;
        Ok(guard.get(key).copied().unwrap_or(false))
    }

    fn write_flag(&self, key: &str, value: bool) -> StoreResult<()> {
        let mut guard = self
            .flags
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))?;
        guard.insert(key.to_string(), value);
        Ok(())
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.flags.read().map(|g| g.len()).unwrap_or(0);
        f.debug_struct("MemoryStore").field("flags", &count).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Store
// ─────────────────────────────────────────────────────────────────────────────

/// On-disk file format for the flag store (JSON).
#[derive(Serialize, Deserialize)]
struct FlagFile {
    /// Format version for future migrations.
    format_version: u32,
    /// Map of flag key -> value.
    flags: HashMap<String, bool>,
}

impl FlagFile {
    const FORMAT_VERSION: u32 = 1;

    fn new() -> Self {
        Self {
            format_version: Self::FORMAT_VERSION,
            flags: HashMap::new(),
        }
    }
}

/// File-backed store shared between processes of the same deployment.
///
/// # Atomic Writes
///
/// Writes use a temporary file + rename:
/// 1. Write to `{path}.tmp`
/// 2. Flush
/// 3. Rename `{path}.tmp` -> `{path}`
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a file store at the given path.
    ///
    /// The file does not need to exist; every flag reads as `false` until
    /// the first write creates it.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone();
        tmp.set_extension("json.tmp");
        tmp
    }

    fn load(&self) -> StoreResult<FlagFile> {
        if !self.path.exists() {
            // First run - no flags yet.
            return Ok(FlagFile::new());
        }
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let flag_file: FlagFile = serde_json::from_reader(reader)
            .map_err(|e| StoreError::Serialization(format!("failed to parse flag file: {e}")))?;
        if flag_file.format_version != FlagFile::FORMAT_VERSION {
            return Err(StoreError::Corruption(format!(
                "flag file format version {} (expected {})",
                flag_file.format_version,
                FlagFile::FORMAT_VERSION
            )));
        }
        Ok(flag_file)
    }

    fn save(&self, flag_file: &FlagFile) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.temp_path();
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, flag_file)
                .map_err(|e| StoreError::Serialization(format!("failed to encode flag file: {e}")))?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl SignalStore for FileStore {
    fn name(&self) -> &str {
        "FileStore"
    }

    fn read_flag(&self, key: &str) -> StoreResult<bool> {
        let flag_file = self.load()?;
        Ok(flag_file.flags.get(key).copied().unwrap_or(false))
    }

    fn write_flag(&self, key: &str, value: bool) -> StoreResult<()> {
        // Load-then-save is not read-modify-write of a flag value: each
        // flag is replaced wholesale, and concurrent writers of the same
        // flag resolve last-write-wins.
        let mut flag_file = self.load().unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "flag file unreadable, rewriting");
            FlagFile::new()
        });
        flag_file.flags.insert(key.to_string(), value);
        self.save(&flag_file)
    }
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}
