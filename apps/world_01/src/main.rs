use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mudsim::{Engine, EngineHandle, RoomRef, SimConfig, Simulation};
use mudwatch::{ContentWatcher, WatchConfig};
use tokio::sync::mpsc;
use tracing::{Level, info, warn};

mod state;

const RELOAD_ERROR_QUEUE: usize = 64;

fn usage_and_exit() -> ! {
    eprintln!(
        "world_01\n\n\
USAGE:\n  world_01 [--data DIR] [--state FILE] [--spawn WORLD:ROOM]\n\n\
ENV:\n  WORLD_DATA_PATH      default data (content root with rooms/ and items/)\n  WORLD_STATE_PATH     default var/world_state.json\n  WORLD_SPAWN          default admin:0\n  WORLD_RESCAN_S       default 60 (content re-scan interval)\n  WORLD_TICK_MS        default 50 (command loop idle tick)\n  WORLD_SAVE_S         default 300 (snapshot interval)\n  WORLD_OUTBOX_CAP     default 32 (per-character event buffer)\n  WORLD_INVENTORY_CAP  default 24 (0 = unbounded)\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug)]
struct Config {
    data_path: PathBuf,
    state_path: PathBuf,
    spawn: RoomRef,
    rescan_s: u64,
    tick_ms: u64,
    save_s: u64,
    outbox_cap: usize,
    inventory_cap: Option<usize>,
}

fn env_num(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_args() -> Config {
    let mut data_path: PathBuf = std::env::var("WORLD_DATA_PATH")
        .unwrap_or_else(|_| "data".to_string())
        .into();
    let mut state_path: PathBuf = std::env::var("WORLD_STATE_PATH")
        .unwrap_or_else(|_| "var/world_state.json".to_string())
        .into();
    let mut spawn = RoomRef::parse(&std::env::var("WORLD_SPAWN").unwrap_or_else(|_| "admin:0".to_string()))
        .unwrap_or_else(|| usage_and_exit());

    let rescan_s = env_num("WORLD_RESCAN_S", 60).max(1);
    let tick_ms = env_num("WORLD_TICK_MS", 50).max(5);
    let save_s = env_num("WORLD_SAVE_S", 300).max(5);
    let outbox_cap = env_num("WORLD_OUTBOX_CAP", 32).max(10) as usize;
    let inventory_cap = match env_num("WORLD_INVENTORY_CAP", 24) {
        0 => None,
        n => Some(n as usize),
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--data" => {
                data_path = it.next().unwrap_or_else(|| usage_and_exit()).into();
            }
            "--state" => {
                state_path = it.next().unwrap_or_else(|| usage_and_exit()).into();
            }
            "--spawn" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                spawn = RoomRef::parse(&v).unwrap_or_else(|| usage_and_exit());
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        data_path,
        state_path,
        spawn,
        rescan_s,
        tick_ms,
        save_s,
        outbox_cap,
        inventory_cap,
    }
}

async fn save_snapshot(engine: &EngineHandle, path: &Path) -> anyhow::Result<()> {
    let snap = engine.snapshot().await?;
    let characters = snap.characters.len();
    state::save(path, &snap)?;
    info!(path = %path.display(), characters, "snapshot saved");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,world_01=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();
    info!(data = %cfg.data_path.display(), spawn = %cfg.spawn, "world_01 starting");

    let mut watcher = ContentWatcher::new(
        WatchConfig {
            root: cfg.data_path.clone(),
            interval: Duration::from_secs(cfg.rescan_s),
        },
        None,
    );
    let scan = watcher.initial_load()?;
    for e in &scan.errors {
        warn!(err = %format!("{e:#}"), "content load error");
    }

    let mut sim = Simulation::new(SimConfig {
        outbox_capacity: cfg.outbox_cap,
        inventory_capacity: cfg.inventory_cap,
    });
    for (label, e) in sim.apply_patches(scan.patches) {
        warn!(patch = %label, err = %e, "content patch failed");
    }
    sim.set_spawn_room(cfg.spawn.clone())
        .with_context(|| format!("spawn room {}", cfg.spawn))?;

    if let Some(snap) = state::load(&cfg.state_path)? {
        let stats = sim.restore(snap);
        info!(
            characters = stats.characters,
            items = stats.items,
            skipped = stats.skipped,
            "state restored"
        );
    }

    let (engine, handle) = Engine::new(sim, Duration::from_millis(cfg.tick_ms));
    let engine_task = tokio::spawn(engine.run());

    let (err_tx, mut err_rx) = mpsc::channel::<anyhow::Error>(RELOAD_ERROR_QUEUE);
    let watch_task = watcher.spawn(handle.clone(), err_tx);
    tokio::spawn(async move {
        while let Some(e) = err_rx.recv().await {
            warn!(err = %format!("{e:#}"), "content reload error");
        }
    });

    let mut save_every = tokio::time::interval(Duration::from_secs(cfg.save_s));
    save_every.tick().await;
    loop {
        tokio::select! {
            _ = save_every.tick() => {
                if let Err(e) = save_snapshot(&handle, &cfg.state_path).await {
                    warn!(err = %e, "snapshot save failed");
                }
            }
            r = tokio::signal::ctrl_c() => {
                if let Err(e) = r {
                    warn!(err = %e, "signal handler failed");
                }
                info!("shutting down");
                break;
            }
        }
    }

    save_snapshot(&handle, &cfg.state_path).await?;
    watch_task.abort();
    let _ = watch_task.await;
    drop(handle);
    let sim = engine_task.await.context("engine task")?;
    info!(characters = sim.characters().count(), "world_01 stopped");
    Ok(())
}
