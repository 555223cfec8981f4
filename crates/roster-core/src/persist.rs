//! Versioned two-blob persistence: a JSON roster mapping (optionally
//! LZ4-compressed) and an uncompressed JSON metadata blob that is always
//! decoded first. Backups are timestamped copies under `backups/`, pruned to
//! a retention count.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use contracts::{MetaData, Player};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

pub const PLAYERS_FILE: &str = "players.dat";
pub const META_FILE: &str = "data.meta";
const BACKUP_DIR: &str = "backups";

#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    Decompress(lz4_flex::block::DecompressError),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::Decompress(err) => write!(f, "decompress error: {err}"),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<std::io::Error> for PersistError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl From<lz4_flex::block::DecompressError> for PersistError {
    fn from(value: lz4_flex::block::DecompressError) -> Self {
        Self::Decompress(value)
    }
}

#[derive(Debug)]
pub struct DataStore {
    data_dir: PathBuf,
}

impl DataStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Creates the data directory and empty blobs for any missing file. A
    /// fresh install then follows the normal load path, whose failure policy
    /// already yields an empty roster.
    pub fn init_data_files(&self) -> Result<(), PersistError> {
        fs::create_dir_all(&self.data_dir)?;
        for name in [PLAYERS_FILE, META_FILE] {
            let path = self.data_dir.join(name);
            if !path.exists() {
                fs::write(&path, b"")?;
            }
        }
        Ok(())
    }

    /// Serializes the roster mapping and metadata. The roster blob is
    /// compressed when the metadata says so; the metadata blob never is.
    pub fn save(
        &self,
        roster: &BTreeMap<String, Player>,
        meta: &MetaData,
    ) -> Result<(), PersistError> {
        fs::create_dir_all(&self.data_dir)?;
        let mut data = serde_json::to_vec(roster)?;
        if meta.compressed {
            data = compress_prepend_size(&data);
        }
        let meta_bytes = serde_json::to_vec(meta)?;
        fs::write(self.data_dir.join(PLAYERS_FILE), data)?;
        fs::write(self.data_dir.join(META_FILE), meta_bytes)?;
        Ok(())
    }

    /// Decodes metadata first, then the roster blob accordingly. Every
    /// failure is recoverable; the caller's policy is to start empty.
    pub fn load(&self) -> Result<(MetaData, BTreeMap<String, Player>), PersistError> {
        let meta_bytes = fs::read(self.data_dir.join(META_FILE))?;
        let meta: MetaData = serde_json::from_slice(&meta_bytes)?;
        let mut data = fs::read(self.data_dir.join(PLAYERS_FILE))?;
        if meta.compressed {
            data = decompress_size_prepended(&data)?;
        }
        let roster: BTreeMap<String, Player> = serde_json::from_slice(&data)?;
        Ok((meta, roster))
    }

    /// Copies the current blobs into a timestamped backup directory.
    pub fn create_backup(&self, now: i64) -> Result<(), PersistError> {
        let backup_dir = self.data_dir.join(BACKUP_DIR).join(now.to_string());
        fs::create_dir_all(&backup_dir)?;
        for name in [PLAYERS_FILE, META_FILE] {
            let source = self.data_dir.join(name);
            if source.exists() {
                fs::copy(&source, backup_dir.join(name))?;
            }
        }
        Ok(())
    }

    /// Prunes the oldest backups beyond `retention`, oldest first by
    /// timestamp directory name.
    pub fn delete_backups(&self, retention: usize) -> Result<(), PersistError> {
        let backup_root = self.data_dir.join(BACKUP_DIR);
        if !backup_root.exists() {
            return Ok(());
        }
        let mut stamps = Vec::new();
        for entry in fs::read_dir(&backup_root)? {
            let entry = entry?;
            if let Some(stamp) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i64>().ok())
            {
                stamps.push(stamp);
            }
        }
        stamps.sort_unstable();
        while stamps.len() > retention {
            let oldest = stamps.remove(0);
            fs::remove_dir_all(backup_root.join(oldest.to_string()))?;
        }
        Ok(())
    }

    /// Newest backup timestamp on disk, used to decide whether the backup
    /// frequency has elapsed across restarts.
    pub fn latest_backup_stamp(&self) -> Option<i64> {
        let backup_root = self.data_dir.join(BACKUP_DIR);
        let entries = fs::read_dir(backup_root).ok()?;
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.parse::<i64>().ok())
            })
            .max()
    }

    pub fn backup_count(&self) -> usize {
        let backup_root = self.data_dir.join(BACKUP_DIR);
        fs::read_dir(backup_root)
            .map(|entries| entries.filter_map(Result::ok).count())
            .unwrap_or(0)
    }
}
