//! v1 cross-boundary contracts for the roster kernel, persistence, and lookup
//! service boundary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION_V1: u32 = 1;

/// A game world (server) a player can call home.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct World {
    pub id: u32,
    pub name: String,
}

/// Where an encounter happened. Display names are derived and re-resolved
/// from [`LookupTables`] after load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub territory_type: u32,
    #[serde(default)]
    pub place_name: String,
    #[serde(default)]
    pub content_id: u32,
    #[serde(default)]
    pub content_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub id: u32,
    #[serde(default)]
    pub code: String,
}

/// One recorded observation of a player at a place and time. Identity is the
/// `created` stamp: a later observation within the same logical session keeps
/// the same `created` and only moves `updated`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Encounter {
    pub created: i64,
    pub updated: i64,
    pub location: Location,
    pub job: Job,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LodestoneStatus {
    Unverified,
    Verifying,
    Verified,
    Updating,
    Failed,
}

impl Default for LodestoneStatus {
    fn default() -> Self {
        Self::Unverified
    }
}

/// Identity-verification sub-record embedded in each player. Owned
/// exclusively by its player; lifecycle rules live in `roster-core::verify`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LodestoneRecord {
    pub id: Option<u64>,
    pub status: LodestoneStatus,
    pub last_updated: i64,
    pub last_failed: i64,
    pub failure_count: u32,
}

/// A tracked player: key, name/home-world history (current entry first),
/// encounter history ordered by occurrence, and the verification record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub key: String,
    pub names: Vec<String>,
    pub home_worlds: Vec<World>,
    #[serde(default)]
    pub free_company: String,
    pub encounters: Vec<Encounter>,
    #[serde(default)]
    pub lodestone: LodestoneRecord,
}

impl Player {
    pub fn new(name: impl Into<String>, home_world: World, encounter: Encounter) -> Self {
        let name = name.into();
        let key = Self::create_key(&name, home_world.id);
        Self {
            key,
            names: vec![name],
            home_worlds: vec![home_world],
            free_company: String::new(),
            encounters: vec![encounter],
            lodestone: LodestoneRecord::default(),
        }
    }

    /// Stable roster key derived from (name, home-world id). A name or world
    /// change yields a different key and forces a re-key, never a rename.
    pub fn create_key(name: &str, world_id: u32) -> String {
        let mut key = name.trim().to_uppercase().replace(' ', "_");
        key.push('_');
        key.push_str(&world_id.to_string());
        key
    }

    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }

    pub fn home_world(&self) -> Option<&World> {
        self.home_worlds.first()
    }

    pub fn home_world_id(&self) -> u32 {
        self.home_worlds.first().map(|world| world.id).unwrap_or(0)
    }

    pub fn is_new_name(&self, name: &str) -> bool {
        self.name() != name
    }

    pub fn is_new_home_world(&self, world_id: u32) -> bool {
        self.home_world_id() != world_id
    }

    /// Pushes the new current name onto the history and recomputes the key.
    pub fn update_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.is_new_name(&name) {
            self.names.insert(0, name);
            self.key = Self::create_key(self.name(), self.home_world_id());
        }
    }

    /// Pushes the new current home world onto the history and recomputes the
    /// key.
    pub fn update_home_world(&mut self, world: World) {
        if self.is_new_home_world(world.id) {
            self.home_worlds.insert(0, world);
            self.key = Self::create_key(self.name(), self.home_world_id());
        }
    }

    pub fn latest_encounter(&self) -> Option<&Encounter> {
        self.encounters.last()
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "key={} name={} world={} encounters={} status={:?}",
            self.key,
            self.name(),
            self.home_world().map(|w| w.name.as_str()).unwrap_or("?"),
            self.encounters.len(),
            self.lodestone.status
        )
    }
}

/// Persisted alongside the roster blob; decoded first so the loader knows how
/// to decode the roster blob.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetaData {
    pub schema_version: u32,
    pub compressed: bool,
}

impl Default for MetaData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1,
            compressed: true,
        }
    }
}

/// Kernel configuration. All intervals are epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterConfig {
    pub schema_version: u32,
    pub sync_to_lodestone: bool,
    pub lodestone_update_frequency: i64,
    pub lodestone_max_failure: u32,
    pub lodestone_failure_delay: i64,
    pub backup_frequency: i64,
    pub backup_retention: usize,
    pub compressed: bool,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1,
            sync_to_lodestone: true,
            lodestone_update_frequency: 86_400_000,
            lodestone_max_failure: 3,
            lodestone_failure_delay: 3_600_000,
            backup_frequency: 86_400_000,
            backup_retention: 7,
            compressed: true,
        }
    }
}

/// Outbound request to the external lookup service. Identifier requests carry
/// name + world; update requests carry the previously resolved id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LodestoneRequest {
    pub player_key: String,
    #[serde(default)]
    pub player_name: String,
    #[serde(default)]
    pub world_name: String,
    #[serde(default)]
    pub lodestone_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LodestoneIdResponse {
    pub player_key: String,
    pub lodestone_id: Option<u64>,
    pub status: LodestoneStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LodestoneUpdateResponse {
    pub player_key: String,
    pub player_name: String,
    pub home_world: World,
    pub status: LodestoneStatus,
}

/// Display-name lookup tables supplied by the host. Derived fields on loaded
/// records are re-resolved against the current tables, not trusted from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupTables {
    pub worlds: BTreeMap<u32, String>,
    pub places: BTreeMap<u32, String>,
    pub territory_content: BTreeMap<u32, u32>,
    pub contents: BTreeMap<u32, String>,
    pub jobs: BTreeMap<u32, String>,
}

impl LookupTables {
    pub fn world_name(&self, id: u32) -> String {
        self.worlds.get(&id).cloned().unwrap_or_default()
    }

    pub fn place_name(&self, territory_type: u32) -> String {
        self.places.get(&territory_type).cloned().unwrap_or_default()
    }

    pub fn content_id(&self, territory_type: u32) -> u32 {
        self.territory_content
            .get(&territory_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn content_name(&self, content_id: u32) -> String {
        self.contents.get(&content_id).cloned().unwrap_or_default()
    }

    pub fn job_code(&self, id: u32) -> String {
        self.jobs.get(&id).cloned().unwrap_or_default()
    }
}
