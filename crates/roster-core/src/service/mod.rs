//! Reconciliation engine: the single logical writer for the authoritative
//! roster. Each cycle drains queued deletes, then lookup responses, then
//! folds the freshly observed batch, and finally publishes a name-sorted
//! session view. No step of the cycle ever blocks on the lookup service.

use std::collections::VecDeque;
use std::path::PathBuf;

use contracts::{LookupTables, MetaData, Player, RosterConfig};
use tracing::{debug, info, warn};

use crate::lookup::LodestoneQueue;
use crate::persist::DataStore;
use crate::store::RosterStore;
use crate::verify;

#[derive(Debug)]
pub struct RosterService {
    config: RosterConfig,
    tables: LookupTables,
    store: DataStore,
    all: RosterStore,
    current: RosterStore,
    lookup: LodestoneQueue,
    delete_requests: VecDeque<String>,
    selected: Option<String>,
    last_backup: i64,
}

impl RosterService {
    /// Initializes the data files and loads the authoritative roster. Any
    /// load failure yields an empty roster; history is cumulative and will
    /// simply be rebuilt going forward.
    pub fn new(
        config: RosterConfig,
        tables: LookupTables,
        data_dir: impl Into<PathBuf>,
        now: i64,
    ) -> Self {
        let store = DataStore::new(data_dir);
        if let Err(err) = store.init_data_files() {
            info!(error = %err, "failed to initialize data files, continuing anyway");
        }
        let last_backup = store.latest_backup_stamp().unwrap_or(0);
        let mut service = Self {
            config,
            tables,
            store,
            all: RosterStore::new(),
            current: RosterStore::new(),
            lookup: LodestoneQueue::new(),
            delete_requests: VecDeque::new(),
            selected: None,
            last_backup,
        };
        service.load_roster(now);
        service
    }

    pub fn all(&self) -> &RosterStore {
        &self.all
    }

    /// The published session view, name-sorted, rebuilt each cycle.
    pub fn current(&self) -> &RosterStore {
        &self.current
    }

    pub fn config(&self) -> &RosterConfig {
        &self.config
    }

    /// Request/response bridge handed to the external lookup worker.
    pub fn lookup_mut(&mut self) -> &mut LodestoneQueue {
        &mut self.lookup
    }

    /// Queues a delete; applied at the start of the next cycle so deletion is
    /// safe to request from any context without racing the fold.
    pub fn delete_player(&mut self, key: impl Into<String>) {
        self.delete_requests.push_back(key.into());
    }

    pub fn clear_current(&mut self) {
        self.current = RosterStore::new();
    }

    pub fn select_player(&mut self, key: impl Into<String>) {
        self.selected = Some(key.into());
    }

    pub fn selected_player(&self) -> Option<&Player> {
        self.selected
            .as_deref()
            .and_then(|key| self.all.get_player(key))
    }

    /// Manual unfreeze of a record stuck past the failure threshold. The next
    /// cycle that sees the player re-submits verification from scratch.
    pub fn reset_lodestone(&mut self, key: &str) -> bool {
        match self.all.get_player_mut(key) {
            Some(player) => {
                verify::reset(&mut player.lodestone);
                true
            }
            None => false,
        }
    }

    /// One reconciliation cycle. Deletes land before responses, responses
    /// before the fold, so a key deleted this cycle cannot be resurrected by
    /// a stale response arriving in the same cycle.
    pub fn process_players(&mut self, incoming: Vec<Player>, now: i64) {
        self.process_delete_requests();
        self.process_verification_responses(now);
        self.process_update_responses(now);

        let mut current = RosterStore::new();
        for player in incoming {
            let key = player.key.clone();
            let Some(encounter) = player.latest_encounter().cloned() else {
                warn!(key = %key, "observed player without an encounter, skipped");
                continue;
            };
            if self.all.is_new_player(&key) {
                if let Err(err) = self.all.add_player(player) {
                    warn!(key = %key, error = %err, "failed to add observed player");
                    continue;
                }
            } else {
                let result = if self.all.is_new_encounter(&key, &encounter) {
                    self.all.add_encounter(&key, encounter)
                } else {
                    self.all.update_encounter(&key, encounter)
                };
                if let Err(err) = result {
                    warn!(key = %key, error = %err, "failed to record encounter");
                    continue;
                }
                if let Err(err) = self.all.update_player(&player) {
                    warn!(key = %key, error = %err, "failed to update observed player");
                }
            }

            let Some(merged) = self.all.get_player_mut(&key) else {
                continue;
            };
            verify::evaluate(merged, &self.config, now, &mut self.lookup);
            let snapshot = merged.clone();
            if let Err(err) = current.add_player(snapshot) {
                warn!(key = %key, error = %err, "failed to add player to session view");
            }
        }

        current.sort_by_name();
        self.current = current;
    }

    /// Serializes the roster and metadata, then runs the scheduled backup.
    /// Save failures are logged and retried on the next save, never fatal.
    pub fn save(&mut self, now: i64) {
        let meta = MetaData {
            schema_version: self.config.schema_version,
            compressed: self.config.compressed,
        };
        match self.store.save(self.all.as_map(), &meta) {
            Ok(()) => {
                debug!(players = self.all.len(), "roster saved");
                self.backup(false, now);
            }
            Err(err) => {
                warn!(error = %err, "failed to save player data, will try again soon");
            }
        }
    }

    /// Copies the persisted blobs aside and prunes old copies. Skipped unless
    /// forced or the configured backup frequency has elapsed.
    pub fn backup(&mut self, force: bool, now: i64) {
        if !force && now - self.last_backup <= self.config.backup_frequency {
            return;
        }
        if let Err(err) = self.store.create_backup(now) {
            warn!(error = %err, "failed to create backup");
            return;
        }
        if let Err(err) = self.store.delete_backups(self.config.backup_retention) {
            warn!(error = %err, "failed to prune backups");
        }
        self.last_backup = now;
        info!(stamp = now, "roster backup created");
    }

    fn process_delete_requests(&mut self) {
        while let Some(key) = self.delete_requests.pop_front() {
            self.all.delete_player(&key);
            if self.selected.as_deref() == Some(key.as_str()) {
                self.selected = None;
            }
        }
    }

    fn process_verification_responses(&mut self, now: i64) {
        for response in self.lookup.get_verification_responses() {
            match self.all.get_player_mut(&response.player_key) {
                Some(player) => {
                    verify::apply_id_response(
                        player,
                        response.lodestone_id,
                        response.status,
                        now,
                    );
                }
                None => {
                    debug!(key = %response.player_key, "id response for unknown key discarded");
                }
            }
        }
    }

    /// Applies refresh responses. A reported name or home-world change
    /// re-keys the player: the old key is removed and the updated record is
    /// merged under the new key so a colliding record is combined, never
    /// overwritten.
    fn process_update_responses(&mut self, now: i64) {
        for response in self.lookup.get_update_responses() {
            let Some(stored) = self.all.get_player(&response.player_key) else {
                debug!(key = %response.player_key, "update response for unknown key discarded");
                continue;
            };
            let mut player = stored.clone();
            let mut key = player.key.clone();
            if player.is_new_name(&response.player_name)
                || player.is_new_home_world(response.home_world.id)
            {
                self.all.delete_player(&key);
                player.update_name(response.player_name.clone());
                player.update_home_world(response.home_world.clone());
                key = player.key.clone();
                info!(old_key = %response.player_key, new_key = %key, "player re-keyed");
                self.all.merge_player(player);
            }
            if let Some(target) = self.all.get_player_mut(&key) {
                verify::apply_update_outcome(target, response.status, now);
            }
        }
    }

    fn load_roster(&mut self, now: i64) {
        let loaded = match self.store.load() {
            Ok((meta, players)) => {
                debug!(
                    schema_version = meta.schema_version,
                    players = players.len(),
                    "roster loaded"
                );
                RosterStore::from_players(players)
            }
            Err(err) => {
                info!(error = %err, "cannot load roster, starting fresh");
                RosterStore::new()
            }
        };
        self.all = loaded;
        self.resolve_display_fields();
        self.normalize_verification(now);
    }

    /// Derived display names are re-resolved from the current lookup tables,
    /// never trusted from disk.
    fn resolve_display_fields(&mut self) {
        for player in self.all.players_mut() {
            for world in &mut player.home_worlds {
                world.name = self.tables.world_name(world.id);
            }
            for encounter in &mut player.encounters {
                let location = &mut encounter.location;
                location.place_name = self.tables.place_name(location.territory_type);
                location.content_id = self.tables.content_id(location.territory_type);
                location.content_name = self.tables.content_name(location.content_id);
                encounter.job.code = self.tables.job_code(encounter.job.id);
            }
        }
    }

    /// Restart rule plus re-submission: in-flight states are rolled back,
    /// unverified records re-submit, verified ones refresh when stale, and
    /// failed ones retry only once the backoff window has elapsed.
    fn normalize_verification(&mut self, now: i64) {
        for player in self.all.players_mut() {
            verify::normalize_after_load(&mut player.lodestone);
            match player.lodestone.status {
                contracts::LodestoneStatus::Unverified => {
                    verify::submit_verification(player, &self.config, &mut self.lookup);
                }
                contracts::LodestoneStatus::Verified => {
                    verify::submit_update(player, &self.config, now, &mut self.lookup);
                }
                contracts::LodestoneStatus::Failed => {
                    if self.config.sync_to_lodestone
                        && verify::retry_allowed(&player.lodestone, &self.config, now)
                    {
                        player.lodestone.status = contracts::LodestoneStatus::Unverified;
                        verify::submit_verification(player, &self.config, &mut self.lookup);
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests;
