use super::*;
use contracts::{
    Encounter, Job, Location, LodestoneIdResponse, LodestoneStatus, LodestoneUpdateResponse,
    World,
};
use tempfile::tempdir;

fn world(id: u32) -> World {
    let name = match id {
        63 => "Gridania",
        64 => "Limsa Lominsa",
        _ => "Unknown",
    };
    World {
        id,
        name: name.to_string(),
    }
}

fn encounter(created: i64) -> Encounter {
    Encounter {
        created,
        updated: created,
        location: Location {
            territory_type: 132,
            place_name: "New Gridania".to_string(),
            content_id: 0,
            content_name: String::new(),
        },
        job: Job {
            id: 24,
            code: "WHM".to_string(),
        },
    }
}

fn observed(name: &str, world_id: u32, created: i64) -> Player {
    Player::new(name, world(world_id), encounter(created))
}

fn service_in(dir: &std::path::Path) -> RosterService {
    RosterService::new(RosterConfig::default(), LookupTables::default(), dir, 0)
}

#[test]
fn first_observation_creates_record_and_submits_verification() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());

    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);

    let player = service.all().get_player("AIKO_63").expect("record created");
    assert_eq!(player.lodestone.status, LodestoneStatus::Verifying);
    let requests = service.lookup_mut().drain_id_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].player_key, "AIKO_63");
    assert_eq!(requests[0].world_name, "Gridania");
    assert_eq!(service.current().len(), 1);
}

#[test]
fn repeat_observation_appends_encounter_without_new_request() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);
    service.lookup_mut().drain_id_requests();

    service.process_players(vec![observed("Aiko", 63, 2_000)], 2_000);

    let player = service.all().get_player("AIKO_63").expect("record present");
    assert_eq!(player.encounters.len(), 2);
    assert_eq!(player.lodestone.status, LodestoneStatus::Verifying);
    assert!(service.lookup_mut().drain_id_requests().is_empty());
}

#[test]
fn same_session_observation_updates_latest_encounter_in_place() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);

    let mut repeat = observed("Aiko", 63, 1_000);
    repeat.encounters[0].updated = 1_500;
    service.process_players(vec![repeat], 1_500);

    let player = service.all().get_player("AIKO_63").expect("record present");
    assert_eq!(player.encounters.len(), 1);
    assert_eq!(player.encounters[0].updated, 1_500);
}

#[test]
fn identifier_response_verifies_and_clears_streak() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);

    service.lookup_mut().push_id_response(LodestoneIdResponse {
        player_key: "AIKO_63".to_string(),
        lodestone_id: Some(12345),
        status: LodestoneStatus::Verified,
    });
    service.process_players(vec![], 2_000);

    let player = service.all().get_player("AIKO_63").expect("record present");
    assert_eq!(player.lodestone.id, Some(12345));
    assert_eq!(player.lodestone.status, LodestoneStatus::Verified);
    assert_eq!(player.lodestone.last_updated, 2_000);
    assert_eq!(player.lodestone.failure_count, 0);
}

#[test]
fn three_failures_freeze_record_despite_elapsed_backoff() {
    let dir = tempdir().expect("tempdir");
    let config = RosterConfig {
        lodestone_max_failure: 3,
        lodestone_failure_delay: 10,
        ..RosterConfig::default()
    };
    let mut service =
        RosterService::new(config, LookupTables::default(), dir.path(), 0);

    let mut now = 1_000;
    service.process_players(vec![observed("Aiko", 63, 1_000)], now);
    for _ in 0..3 {
        service.lookup_mut().drain_id_requests();
        service.lookup_mut().push_id_response(LodestoneIdResponse {
            player_key: "AIKO_63".to_string(),
            lodestone_id: None,
            status: LodestoneStatus::Failed,
        });
        now += 1_000;
        service.process_players(vec![observed("Aiko", 63, now)], now);
    }

    let player = service.all().get_player("AIKO_63").expect("record present");
    assert_eq!(player.lodestone.failure_count, 3);
    assert_eq!(player.lodestone.status, LodestoneStatus::Failed);

    // far past any backoff window: still frozen, no new request
    service.process_players(vec![observed("Aiko", 63, now + 1)], now + 1_000_000);
    assert!(service.lookup_mut().drain_id_requests().is_empty());
    let player = service.all().get_player("AIKO_63").expect("record present");
    assert_eq!(player.lodestone.status, LodestoneStatus::Failed);
}

#[test]
fn home_world_change_rekeys_and_preserves_history() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);
    service.process_players(vec![observed("Aiko", 63, 2_000)], 2_000);

    service
        .lookup_mut()
        .push_update_response(LodestoneUpdateResponse {
            player_key: "AIKO_63".to_string(),
            player_name: "Aiko".to_string(),
            home_world: world(64),
            status: LodestoneStatus::Verified,
        });
    service.process_players(vec![], 3_000);

    assert!(service.all().get_player("AIKO_63").is_none());
    let moved = service.all().get_player("AIKO_64").expect("new key present");
    assert_eq!(moved.encounters.len(), 2);
    assert_eq!(moved.home_world_id(), 64);
    assert_eq!(moved.home_worlds.len(), 2);
    assert_eq!(moved.lodestone.status, LodestoneStatus::Verified);
    assert_eq!(moved.lodestone.last_updated, 3_000);
}

#[test]
fn rekey_collision_merges_instead_of_overwriting() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(
        vec![observed("Aiko", 63, 1_000), observed("Aiko", 64, 1_500)],
        1_500,
    );

    service
        .lookup_mut()
        .push_update_response(LodestoneUpdateResponse {
            player_key: "AIKO_63".to_string(),
            player_name: "Aiko".to_string(),
            home_world: world(64),
            status: LodestoneStatus::Verified,
        });
    service.process_players(vec![], 2_000);

    assert!(service.all().get_player("AIKO_63").is_none());
    let merged = service.all().get_player("AIKO_64").expect("merged record");
    let stamps = merged
        .encounters
        .iter()
        .map(|encounter| encounter.created)
        .collect::<Vec<_>>();
    assert_eq!(stamps, vec![1_000, 1_500]);
}

#[test]
fn deletes_drain_before_responses_in_the_same_cycle() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);

    service.delete_player("AIKO_63");
    service.lookup_mut().push_id_response(LodestoneIdResponse {
        player_key: "AIKO_63".to_string(),
        lodestone_id: Some(12345),
        status: LodestoneStatus::Verified,
    });
    service.process_players(vec![], 2_000);

    // the stale response cannot resurrect the deleted key
    assert!(service.all().get_player("AIKO_63").is_none());
    assert!(service.all().is_empty());
}

#[test]
fn delete_is_idempotent_across_one_cycle() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);
    service.delete_player("AIKO_63");
    service.delete_player("AIKO_63");
    service.delete_player("NEVER_SEEN_1");
    service.process_players(vec![], 2_000);
    assert!(service.all().is_empty());
}

#[test]
fn fold_is_best_effort_per_player() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());

    let mut empty = observed("Broken", 63, 1_000);
    empty.encounters.clear();
    service.process_players(
        vec![empty, observed("Aiko", 63, 1_000), observed("Zoe", 63, 1_000)],
        1_000,
    );

    assert_eq!(service.all().len(), 2);
    assert_eq!(service.current().len(), 2);
}

#[test]
fn current_view_is_rebuilt_and_name_sorted() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(
        vec![observed("Zoe", 63, 1_000), observed("Aiko", 63, 1_000)],
        1_000,
    );
    let names = service
        .current()
        .players_in_view_order()
        .iter()
        .map(|player| player.name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Aiko", "Zoe"]);

    // a later cycle with only one observed player shrinks the view, not All
    service.process_players(vec![observed("Zoe", 63, 2_000)], 2_000);
    assert_eq!(service.current().len(), 1);
    assert_eq!(service.all().len(), 2);

    service.clear_current();
    assert!(service.current().is_empty());
}

#[test]
fn selection_follows_deletion() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);
    service.select_player("AIKO_63");
    assert_eq!(service.selected_player().expect("selected").name(), "Aiko");

    service.delete_player("AIKO_63");
    service.process_players(vec![], 2_000);
    assert!(service.selected_player().is_none());
}

#[test]
fn save_then_restart_restores_roster_and_normalizes_states() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);
    // Aiko is mid-flight Verifying when the process stops
    service.save(1_000);
    drop(service);

    let mut tables = LookupTables::default();
    tables.worlds.insert(63, "Gridania".to_string());
    tables.places.insert(132, "New Gridania".to_string());
    tables.jobs.insert(24, "WHM".to_string());
    let mut restarted =
        RosterService::new(RosterConfig::default(), tables, dir.path(), 2_000);

    // Verifying rolled back to Unverified, then immediately re-submitted
    assert_eq!(restarted.lookup_mut().drain_id_requests().len(), 1);
    let player = restarted.all().get_player("AIKO_63").expect("restored");
    assert_eq!(player.lodestone.status, LodestoneStatus::Verifying);
    assert_eq!(player.encounters[0].location.place_name, "New Gridania");
    assert_eq!(player.encounters[0].job.code, "WHM");
}

#[test]
fn restart_rolls_updating_back_to_verified() {
    let dir = tempdir().expect("tempdir");
    let config = RosterConfig {
        lodestone_update_frequency: 1_000_000_000,
        ..RosterConfig::default()
    };
    let mut service =
        RosterService::new(config.clone(), LookupTables::default(), dir.path(), 0);
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);
    {
        let player = service.all.get_player_mut("AIKO_63").expect("present");
        player.lodestone.id = Some(12345);
        player.lodestone.status = LodestoneStatus::Updating;
        player.lodestone.last_updated = 1_000;
    }
    service.save(1_000);
    drop(service);

    let mut restarted =
        RosterService::new(config, LookupTables::default(), dir.path(), 2_000);
    let player = restarted.all().get_player("AIKO_63").expect("restored");
    assert_eq!(player.lodestone.status, LodestoneStatus::Verified);
    // refresh interval has not elapsed, so no update request goes out
    assert!(restarted.lookup_mut().drain_update_requests().is_empty());
}

#[test]
fn corrupt_data_files_start_an_empty_roster() {
    let dir = tempdir().expect("tempdir");
    let mut service = service_in(dir.path());
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);
    service.save(1_000);
    drop(service);

    std::fs::write(dir.path().join(crate::persist::PLAYERS_FILE), b"garbage")
        .expect("corrupt blob");
    let restarted = service_in(dir.path());
    assert!(restarted.all().is_empty());
}

#[test]
fn backup_respects_frequency_unless_forced() {
    let dir = tempdir().expect("tempdir");
    let config = RosterConfig {
        backup_frequency: 1_000,
        backup_retention: 5,
        ..RosterConfig::default()
    };
    let mut service =
        RosterService::new(config, LookupTables::default(), dir.path(), 0);
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);

    service.save(500);
    assert_eq!(service.store.backup_count(), 0);

    service.save(2_000);
    assert_eq!(service.store.backup_count(), 1);

    service.backup(true, 2_100);
    assert_eq!(service.store.backup_count(), 2);
}

#[test]
fn reset_unfreezes_a_thresholded_record() {
    let dir = tempdir().expect("tempdir");
    let config = RosterConfig {
        lodestone_max_failure: 1,
        lodestone_failure_delay: 0,
        ..RosterConfig::default()
    };
    let mut service =
        RosterService::new(config, LookupTables::default(), dir.path(), 0);
    service.process_players(vec![observed("Aiko", 63, 1_000)], 1_000);
    service.lookup_mut().drain_id_requests();
    service.lookup_mut().push_id_response(LodestoneIdResponse {
        player_key: "AIKO_63".to_string(),
        lodestone_id: None,
        status: LodestoneStatus::Failed,
    });
    service.process_players(vec![observed("Aiko", 63, 2_000)], 2_000);
    assert!(service.lookup_mut().drain_id_requests().is_empty());

    assert!(service.reset_lodestone("AIKO_63"));
    assert!(!service.reset_lodestone("NEVER_SEEN_1"));
    service.process_players(vec![observed("Aiko", 63, 3_000)], 3_000);
    assert_eq!(service.lookup_mut().drain_id_requests().len(), 1);
}
