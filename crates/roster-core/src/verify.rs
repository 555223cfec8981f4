//! Identity-verification lifecycle:
//! `Unverified -> Verifying -> {Verified, Failed}`,
//! `Verified -> Updating -> {Verified, Failed}`, and `Failed -> Unverified`
//! once the backoff window has elapsed. A record that reaches the failure
//! threshold stays frozen in `Failed` until a manual reset.

use contracts::{
    LodestoneRecord, LodestoneRequest, LodestoneStatus, Player, RosterConfig,
};

use crate::lookup::LodestoneQueue;

/// Submits an identifier request when, and only when, the player is
/// `Unverified` and lookups are enabled. This is the single path that emits
/// identifier requests, so a `Verifying` record never has two in flight.
pub fn submit_verification(
    player: &mut Player,
    config: &RosterConfig,
    queue: &mut LodestoneQueue,
) {
    if !config.sync_to_lodestone {
        return;
    }
    if player.lodestone.status != LodestoneStatus::Unverified {
        return;
    }
    queue.add_id_request(LodestoneRequest {
        player_key: player.key.clone(),
        player_name: player.name().to_string(),
        world_name: player
            .home_world()
            .map(|world| world.name.clone())
            .unwrap_or_default(),
        lodestone_id: None,
    });
    player.lodestone.status = LodestoneStatus::Verifying;
}

/// Submits a refresh request when the player is `Verified`, lookups are
/// enabled, and the record is stale per the configured refresh interval.
pub fn submit_update(
    player: &mut Player,
    config: &RosterConfig,
    now: i64,
    queue: &mut LodestoneQueue,
) {
    if !config.sync_to_lodestone {
        return;
    }
    if player.lodestone.status != LodestoneStatus::Verified {
        return;
    }
    let Some(id) = player.lodestone.id else {
        return;
    };
    if now <= player.lodestone.last_updated + config.lodestone_update_frequency {
        return;
    }
    queue.add_update_request(LodestoneRequest {
        player_key: player.key.clone(),
        player_name: String::new(),
        world_name: String::new(),
        lodestone_id: Some(id),
    });
    player.lodestone.status = LodestoneStatus::Updating;
}

/// Per-cycle evaluation of a merged player: submit fresh verification,
/// refresh a stale verified identity, or retry a failed one once the backoff
/// window has elapsed. `Verifying` and `Updating` records are left alone.
pub fn evaluate(
    player: &mut Player,
    config: &RosterConfig,
    now: i64,
    queue: &mut LodestoneQueue,
) {
    match player.lodestone.status {
        LodestoneStatus::Unverified => submit_verification(player, config, queue),
        LodestoneStatus::Verified => submit_update(player, config, now, queue),
        LodestoneStatus::Failed => {
            if config.sync_to_lodestone && retry_allowed(&player.lodestone, config, now) {
                player.lodestone.status = LodestoneStatus::Unverified;
                submit_verification(player, config, queue);
            }
        }
        LodestoneStatus::Verifying | LodestoneStatus::Updating => {}
    }
}

/// A failed record may retry only below the failure threshold and only once
/// `failure_delay` has elapsed since the last failure. At or past the
/// threshold the record is frozen until [`reset`].
pub fn retry_allowed(record: &LodestoneRecord, config: &RosterConfig, now: i64) -> bool {
    record.failure_count < config.lodestone_max_failure
        && now >= record.last_failed + config.lodestone_failure_delay
}

/// Applies an identifier-resolution response and stamps `last_updated`.
pub fn apply_id_response(
    player: &mut Player,
    lodestone_id: Option<u64>,
    status: LodestoneStatus,
    now: i64,
) {
    player.lodestone.id = lodestone_id;
    player.lodestone.status = status;
    player.lodestone.last_updated = now;
    settle_failure_streak(&mut player.lodestone);
}

/// Applies a refresh outcome and stamps `last_updated`. Re-keying on a
/// name/world change is the engine's job; this only settles the record.
pub fn apply_update_outcome(player: &mut Player, status: LodestoneStatus, now: i64) {
    player.lodestone.status = status;
    player.lodestone.last_updated = now;
    settle_failure_streak(&mut player.lodestone);
}

/// A failed outcome stamps `last_failed` and grows the streak; anything else
/// clears both.
fn settle_failure_streak(record: &mut LodestoneRecord) {
    if record.status == LodestoneStatus::Failed {
        record.last_failed = record.last_updated;
        record.failure_count += 1;
    } else {
        record.last_failed = 0;
        record.failure_count = 0;
    }
}

/// Restart rule: an in-flight identifier request is assumed lost, an
/// in-flight refresh is assumed to leave the prior verified identity valid.
pub fn normalize_after_load(record: &mut LodestoneRecord) {
    match record.status {
        LodestoneStatus::Verifying => record.status = LodestoneStatus::Unverified,
        LodestoneStatus::Updating => record.status = LodestoneStatus::Verified,
        _ => {}
    }
}

/// Manual unfreeze: drops the resolved id and failure streak and returns the
/// record to `Unverified` so the next cycle re-submits from scratch.
pub fn reset(record: &mut LodestoneRecord) {
    *record = LodestoneRecord::default();
}
