//! Keyed roster store. The authoritative roster and the per-cycle session
//! view are both instances of [`RosterStore`]; only the reconciliation engine
//! mutates the authoritative one.

use std::collections::BTreeMap;
use std::fmt;

use contracts::{Encounter, Player};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    DuplicateKey(String),
    UnknownKey(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey(key) => write!(f, "duplicate player key: {key}"),
            Self::UnknownKey(key) => write!(f, "unknown player key: {key}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Default)]
pub struct RosterStore {
    players: BTreeMap<String, Player>,
    view_order: Vec<String>,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_players(players: BTreeMap<String, Player>) -> Self {
        Self {
            players,
            view_order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_new_player(&self, key: &str) -> bool {
        !self.players.contains_key(key)
    }

    /// True when the latest stored encounter for `key` differs from the
    /// supplied one by identity (`created` stamp). Absent players and empty
    /// histories count as new.
    pub fn is_new_encounter(&self, key: &str, encounter: &Encounter) -> bool {
        self.players
            .get(key)
            .and_then(Player::latest_encounter)
            .map(|latest| latest.created != encounter.created)
            .unwrap_or(true)
    }

    pub fn add_player(&mut self, player: Player) -> Result<(), StoreError> {
        if self.players.contains_key(&player.key) {
            return Err(StoreError::DuplicateKey(player.key));
        }
        self.players.insert(player.key.clone(), player);
        Ok(())
    }

    pub fn add_encounter(&mut self, key: &str, encounter: Encounter) -> Result<(), StoreError> {
        let player = self
            .players
            .get_mut(key)
            .ok_or_else(|| StoreError::UnknownKey(key.to_string()))?;
        player.encounters.push(encounter);
        Ok(())
    }

    /// Overwrites the most recent encounter; appends when the history is
    /// empty so a supplied encounter is never dropped.
    pub fn update_encounter(&mut self, key: &str, encounter: Encounter) -> Result<(), StoreError> {
        let player = self
            .players
            .get_mut(key)
            .ok_or_else(|| StoreError::UnknownKey(key.to_string()))?;
        match player.encounters.last_mut() {
            Some(latest) => *latest = encounter,
            None => player.encounters.push(encounter),
        }
        Ok(())
    }

    /// Replaces mutable non-key fields of an existing record. Encounter
    /// history and the verification record stay owned by the store.
    pub fn update_player(&mut self, incoming: &Player) -> Result<(), StoreError> {
        let player = self
            .players
            .get_mut(&incoming.key)
            .ok_or_else(|| StoreError::UnknownKey(incoming.key.clone()))?;
        player.free_company = incoming.free_company.clone();
        if let (Some(stored), Some(observed)) =
            (player.home_worlds.first_mut(), incoming.home_world())
        {
            if stored.id == observed.id {
                stored.name = observed.name.clone();
            }
        }
        Ok(())
    }

    /// Idempotent: removing an absent key is not an error.
    pub fn delete_player(&mut self, key: &str) {
        self.players.remove(key);
        self.view_order.retain(|entry| entry != key);
    }

    /// Insert-or-combine for a re-keyed player. When the target key already
    /// exists the incoming unique encounters are appended (identity =
    /// `created`, existing wins ties), name/world histories are unioned, and
    /// a resolved identity is preferred over an unresolved one.
    pub fn merge_player(&mut self, incoming: Player) {
        let Some(existing) = self.players.get_mut(&incoming.key) else {
            self.players.insert(incoming.key.clone(), incoming);
            return;
        };
        for encounter in incoming.encounters {
            if !existing
                .encounters
                .iter()
                .any(|stored| stored.created == encounter.created)
            {
                existing.encounters.push(encounter);
            }
        }
        existing.encounters.sort_by_key(|encounter| encounter.created);
        for name in incoming.names {
            if !existing.names.contains(&name) {
                existing.names.push(name);
            }
        }
        for world in incoming.home_worlds {
            if !existing.home_worlds.iter().any(|stored| stored.id == world.id) {
                existing.home_worlds.push(world);
            }
        }
        if existing.lodestone.id.is_none() && incoming.lodestone.id.is_some() {
            existing.lodestone = incoming.lodestone;
        }
    }

    pub fn get_player(&self, key: &str) -> Option<&Player> {
        self.players.get(key)
    }

    pub fn get_player_mut(&mut self, key: &str) -> Option<&mut Player> {
        self.players.get_mut(key)
    }

    /// Rebuilds the session view order by display name. Has no effect on the
    /// authoritative key-ordered mapping.
    pub fn sort_by_name(&mut self) {
        let mut keys = self.players.keys().cloned().collect::<Vec<_>>();
        keys.sort_by(|left, right| {
            let left_name = self.players.get(left).map(Player::name).unwrap_or_default();
            let right_name = self.players.get(right).map(Player::name).unwrap_or_default();
            left_name.cmp(right_name).then_with(|| left.cmp(right))
        });
        self.view_order = keys;
    }

    /// Players in session-view order when [`Self::sort_by_name`] has run,
    /// otherwise in key order.
    pub fn players_in_view_order(&self) -> Vec<&Player> {
        if self.view_order.is_empty() {
            return self.players.values().collect();
        }
        self.view_order
            .iter()
            .filter_map(|key| self.players.get(key))
            .collect()
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.players.keys()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Player> {
        &self.players
    }

    pub fn into_map(self) -> BTreeMap<String, Player> {
        self.players
    }
}
