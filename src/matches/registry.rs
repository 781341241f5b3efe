//! Match registry implementation.

use crate::error::{Result, StoreError};
use crate::types::{Match, MatchId, MatchStatus, NewMatch};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Magic bytes for the registry file.
const REGISTRY_MAGIC: &[u8; 4] = b"MRI\0";

/// Current registry format version.
const REGISTRY_VERSION: u8 = 1;

/// Registry index stored on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RegistryIndex {
    /// All matches by ID.
    matches: BTreeMap<MatchId, Match>,

    /// Next match ID to assign.
    next_id: u64,
}

impl Default for RegistryIndex {
    fn default() -> Self {
        Self {
            matches: BTreeMap::new(),
            next_id: 1,
        }
    }
}

/// Authoritative set of matches.
pub struct MatchRegistry {
    /// Path to the registry file (None = in-memory only).
    path: Option<PathBuf>,

    /// In-memory index.
    index: RwLock<RegistryIndex>,
}

impl MatchRegistry {
    /// Create a registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            index: RwLock::new(RegistryIndex::default()),
        }
    }

    /// Create an empty registry persisted at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let registry = Self {
            path: Some(path.as_ref().to_path_buf()),
            index: RwLock::new(RegistryIndex::default()),
        };
        registry.save(&registry.index.read())?;
        Ok(registry)
    }

    /// Load a registry from `path`, starting empty if the file is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let index = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            RegistryIndex::default()
        };

        Ok(Self {
            path: Some(path),
            index: RwLock::new(index),
        })
    }

    /// Start a new match. Status is `live` unless `scheduled` was asked for.
    pub fn create_match(&self, request: NewMatch) -> Result<Match> {
        let team1 = required(&request.team1, "team1")?;
        let team2 = required(&request.team2, "team2")?;
        let venue = required(&request.venue, "venue")?;

        let status = match request.status {
            None => MatchStatus::Live,
            Some(MatchStatus::Completed) => {
                return Err(StoreError::validation(
                    "a match cannot be created as completed",
                ))
            }
            Some(status) => status,
        };

        let mut index = self.index.write();

        let match_id = MatchId(index.next_id);
        let created = Match {
            match_id,
            team1,
            team2,
            venue,
            status,
            created_at: Utc::now(),
        };

        index.next_id += 1;
        index.matches.insert(match_id, created.clone());

        if let Err(e) = self.save(&index) {
            index.matches.remove(&match_id);
            index.next_id -= 1;
            return Err(e);
        }

        info!(
            match_id = %match_id,
            team1 = %created.team1,
            team2 = %created.team2,
            status = %created.status,
            "match created"
        );

        Ok(created)
    }

    /// Get a match by ID.
    pub fn get_match(&self, match_id: MatchId) -> Result<Match> {
        self.index
            .read()
            .matches
            .get(&match_id)
            .cloned()
            .ok_or(StoreError::MatchNotFound(match_id))
    }

    /// All matches, most recently created first.
    pub fn list_matches(&self) -> Vec<Match> {
        self.index.read().matches.values().rev().cloned().collect()
    }

    /// Whether the match exists.
    pub fn contains(&self, match_id: MatchId) -> bool {
        self.index.read().matches.contains_key(&match_id)
    }

    /// Number of matches ever created.
    pub fn len(&self) -> usize {
        self.index.read().matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move a match forward in its lifecycle.
    pub fn update_status(&self, match_id: MatchId, status: MatchStatus) -> Result<Match> {
        let mut index = self.index.write();

        let current = index
            .matches
            .get(&match_id)
            .ok_or(StoreError::MatchNotFound(match_id))?
            .status;

        if !current.can_advance_to(status) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: status,
            });
        }
        if current == status {
            return Ok(index.matches[&match_id].clone());
        }

        if let Some(entry) = index.matches.get_mut(&match_id) {
            entry.status = status;
        }

        if let Err(e) = self.save(&index) {
            if let Some(entry) = index.matches.get_mut(&match_id) {
                entry.status = current;
            }
            return Err(e);
        }

        info!(match_id = %match_id, from = %current, to = %status, "match status changed");

        Ok(index.matches[&match_id].clone())
    }

    /// Persist the index. The caller holds the write lock.
    fn save(&self, index: &RegistryIndex) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let tmp_path = path.with_extension("bin.tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        // Write magic
        file.write_all(REGISTRY_MAGIC)?;

        // Write version
        file.write_all(&[REGISTRY_VERSION])?;

        // Serialize index with MessagePack
        let encoded = rmp_serde::to_vec_named(index)?;

        file.write_all(&(encoded.len() as u64).to_le_bytes())?;
        file.write_all(&encoded)?;

        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load registry index from file.
    fn load_from_file(path: &Path) -> Result<RegistryIndex> {
        let mut file = File::open(path)?;

        // Read magic
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != REGISTRY_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid registry magic".into()));
        }

        // Read version
        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != REGISTRY_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported registry version: {}",
                version[0]
            )));
        }

        // Read index
        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut encoded = vec![0u8; len];
        file.read_exact(&mut encoded)?;

        let index: RegistryIndex = rmp_serde::from_slice(&encoded)?;

        let max_id = index.matches.keys().next_back().map_or(0, |id| id.0);
        if index.next_id <= max_id {
            return Err(StoreError::Corruption(format!(
                "registry next_id {} not above highest match id {}",
                index.next_id, max_id
            )));
        }

        Ok(index)
    }
}

fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}
