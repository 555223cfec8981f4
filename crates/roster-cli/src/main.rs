use std::collections::BTreeMap;
use std::env;
use std::fs;

use chrono::Utc;
use contracts::{LookupTables, Player, RosterConfig};
use roster_core::RosterService;

fn print_usage() {
    println!("roster-cli <command>");
    println!("commands:");
    println!("  status");
    println!("  observe <players.json>");
    println!("  delete <key>");
    println!("  reset <key>");
    println!("  save");
    println!("  backup [--force]");
    println!("data directory comes from ROSTER_DATA_DIR (default: roster_data)");
}

fn data_dir() -> String {
    env::var("ROSTER_DATA_DIR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "roster_data".to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn load_service(now: i64) -> RosterService {
    RosterService::new(
        RosterConfig::default(),
        LookupTables::default(),
        data_dir(),
        now,
    )
}

fn read_observed(path: &str) -> Result<Vec<Player>, String> {
    let raw = fs::read_to_string(path).map_err(|err| format!("cannot read {path}: {err}"))?;
    serde_json::from_str::<Vec<Player>>(&raw).map_err(|err| format!("invalid {path}: {err}"))
}

fn print_status(service: &RosterService) {
    let mut by_status = BTreeMap::<String, usize>::new();
    for player in service.all().players() {
        *by_status
            .entry(format!("{:?}", player.lodestone.status))
            .or_default() += 1;
    }
    println!(
        "tracked={} session={} pending_requests={}",
        service.all().len(),
        service.current().len(),
        by_status
            .iter()
            .map(|(status, count)| format!("{status}={count}"))
            .collect::<Vec<_>>()
            .join(" ")
    );
}

fn run_observe(args: &[String]) -> Result<(), String> {
    let path = args.get(2).ok_or_else(|| "missing players.json".to_string())?;
    let players = read_observed(path)?;
    let now = now_millis();
    let mut service = load_service(now);
    let observed = players.len();
    service.process_players(players, now);
    service.save(now);
    println!(
        "observed={} tracked={} session={}",
        observed,
        service.all().len(),
        service.current().len()
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("status") => {
            let service = load_service(now_millis());
            print_status(&service);
        }
        Some("observe") => {
            if let Err(err) = run_observe(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("delete") => match args.get(2) {
            Some(key) => {
                let now = now_millis();
                let mut service = load_service(now);
                service.delete_player(key.clone());
                service.process_players(Vec::new(), now);
                service.save(now);
                println!("deleted={} tracked={}", key, service.all().len());
            }
            None => {
                eprintln!("error: missing key");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("reset") => match args.get(2) {
            Some(key) => {
                let now = now_millis();
                let mut service = load_service(now);
                if service.reset_lodestone(key) {
                    service.save(now);
                    println!("reset={key}");
                } else {
                    eprintln!("error: unknown key: {key}");
                    std::process::exit(2);
                }
            }
            None => {
                eprintln!("error: missing key");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("save") => {
            let now = now_millis();
            let mut service = load_service(now);
            service.save(now);
            println!("saved tracked={}", service.all().len());
        }
        Some("backup") => {
            let force = args.get(2).map(String::as_str) == Some("--force");
            let now = now_millis();
            let mut service = load_service(now);
            service.backup(force, now);
            println!("backup requested force={force}");
        }
        _ => {
            print_usage();
        }
    }
}
