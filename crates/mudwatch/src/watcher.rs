use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mudsim::{EngineHandle, ItemDefinitionId, RoomId, RoomRef, ScriptHost, WorldPatch};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::content::{self, ITEMS_DIR, ROOMS_DIR, WORLD_MANIFEST};
use crate::fstree::{self, Change, Diff, Node};

#[derive(Clone, Debug)]
pub struct WatchConfig {
    pub root: PathBuf,
    pub interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            interval: Duration::from_secs(60),
        }
    }
}

/// Result of one load or re-scan: patches to apply, and per-file failures.
#[derive(Debug, Default)]
pub struct Scan {
    pub patches: Vec<WorldPatch>,
    pub errors: Vec<anyhow::Error>,
}

impl Scan {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.errors.is_empty()
    }
}

pub struct ContentWatcher {
    cfg: WatchConfig,
    scripts: Option<Arc<dyn ScriptHost>>,
    last: Option<Node>,
}

impl ContentWatcher {
    pub fn new(cfg: WatchConfig, scripts: Option<Arc<dyn ScriptHost>>) -> Self {
        Self {
            cfg,
            scripts,
            last: None,
        }
    }

    /// Loads every world and item definition and records the tree snapshot
    /// later scans are compared against. Fails only when the content root or
    /// its rooms folder cannot be read.
    pub fn initial_load(&mut self) -> anyhow::Result<Scan> {
        let tree = fstree::build(&self.cfg.root)
            .with_context(|| format!("snapshot content root {}", self.cfg.root.display()))?;
        let rooms = self.cfg.root.join(ROOMS_DIR);
        let mut worlds = std::fs::read_dir(&rooms)
            .with_context(|| format!("read rooms folder {}", rooms.display()))?
            .filter_map(|ent| ent.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect::<Vec<_>>();
        worlds.sort();

        let mut scan = Scan::default();
        let items = self.cfg.root.join(ITEMS_DIR);
        if items.is_dir() {
            content::load_items(&items, &mut scan.patches, &mut scan.errors);
        }
        for dir in &worlds {
            content::load_world(dir, self.scripts.as_deref(), &mut scan.patches, &mut scan.errors);
        }
        info!(
            worlds = worlds.len(),
            patches = scan.patches.len(),
            errors = scan.errors.len(),
            "content loaded"
        );
        self.last = Some(tree);
        Ok(scan)
    }

    /// Compares the tree with the previous snapshot and turns the difference
    /// into patches. An unchanged tree yields nothing.
    pub fn rescan(&mut self) -> Scan {
        let mut scan = Scan::default();
        let tree = match fstree::build(&self.cfg.root) {
            Ok(t) => t,
            Err(e) => {
                scan.errors.push(e.context("snapshot content root"));
                return scan;
            }
        };
        let Some(prev) = self.last.replace(tree) else {
            return scan;
        };
        let Some(now) = self.last.as_ref() else {
            return scan;
        };
        let diff = fstree::compare(&prev, now);
        if diff.is_unchanged() {
            return scan;
        }

        if let Some(items) = diff.child(ITEMS_DIR) {
            self.item_changes(items, &mut scan);
        }
        match diff.child(ROOMS_DIR) {
            Some(rooms) if rooms.change != Change::Removed && rooms.is_dir => {
                self.world_changes(rooms, &mut scan);
            }
            _ => scan.errors.push(anyhow::anyhow!(
                "no rooms folder under {}",
                self.cfg.root.display()
            )),
        }
        scan
    }

    fn item_changes(&self, items: &Diff, scan: &mut Scan) {
        for f in items.children.iter().filter(|f| !f.is_dir && f.name.ends_with(".toml")) {
            match f.change {
                Change::Unchanged => {}
                Change::Added | Change::Changed => match content::load_item(&f.path) {
                    Ok(def) => {
                        info!(item = %def.id, name = %def.name, "item definition reloaded");
                        scan.patches.push(WorldPatch::DefineItem(def));
                    }
                    Err(e) => scan.errors.push(e),
                },
                Change::Removed => match content::leading_id(&f.name) {
                    Ok(id) if id >= 0 => scan.patches.push(WorldPatch::RemoveItemDefinition {
                        id: ItemDefinitionId(id as u64),
                    }),
                    Ok(_) => {}
                    Err(e) => scan.errors.push(e),
                },
            }
        }
    }

    fn world_changes(&self, rooms: &Diff, scan: &mut Scan) {
        for w in rooms.children.iter().filter(|w| w.is_dir) {
            let world = content::world_id(&w.path);
            match w.change {
                Change::Unchanged => {}
                Change::Added => {
                    info!(world = %world, "world added");
                    content::load_world(&w.path, self.scripts.as_deref(), &mut scan.patches, &mut scan.errors);
                }
                Change::Removed => {
                    info!(world = %world, "world removed");
                    scan.patches.push(WorldPatch::DestroyWorld { world });
                }
                Change::Changed => self.room_changes(w, scan),
            }
        }
    }

    fn room_changes(&self, w: &Diff, scan: &mut Scan) {
        let world = content::world_id(&w.path);
        let mut removed = BTreeSet::new();
        // id -> (room file, whether the file is new)
        let mut reload: BTreeMap<i64, (PathBuf, bool)> = BTreeMap::new();

        for f in w.children.iter().filter(|f| !f.is_dir && !f.is_unchanged()) {
            if f.name == WORLD_MANIFEST {
                match content::load_world_flags(&w.path) {
                    Ok(flags) => scan.patches.push(WorldPatch::SetWorldFlags {
                        world: world.clone(),
                        flags,
                    }),
                    Err(e) => scan.errors.push(e),
                }
                continue;
            }
            if content::is_script_file(&f.name) {
                let room_file = content::room_file_for_script(&f.path);
                if room_file.is_file() {
                    match content::leading_id(&f.name) {
                        Ok(id) => {
                            reload.entry(id).or_insert((room_file, false));
                        }
                        Err(e) => scan.errors.push(e),
                    }
                }
                continue;
            }
            if !content::is_room_file(&f.name) {
                continue;
            }
            let id = match content::leading_id(&f.name) {
                Ok(id) => id,
                Err(e) => {
                    scan.errors.push(e);
                    continue;
                }
            };
            match f.change {
                Change::Removed => {
                    removed.insert(id);
                }
                Change::Added => {
                    reload.insert(id, (f.path.clone(), true));
                }
                Change::Changed => {
                    let is_new = reload.get(&id).is_some_and(|(_, new)| *new);
                    reload.insert(id, (f.path.clone(), is_new));
                }
                Change::Unchanged => {}
            }
        }

        for id in removed.iter().filter(|id| !reload.contains_key(id)) {
            let at = RoomRef::new(world.clone(), RoomId(*id));
            info!(room = %at, "room removed");
            scan.patches.push(WorldPatch::DestroyRoom { at });
        }
        for (id, (path, is_new)) in reload {
            let room = match content::load_room(&world, &path, self.scripts.as_deref()) {
                Ok(room) => room,
                Err(e) => {
                    scan.errors.push(e);
                    continue;
                }
            };
            // A renamed file shows up as removed plus added; keep the live room.
            if is_new && !removed.contains(&id) {
                info!(room = %room.at, "room added");
                scan.patches.push(WorldPatch::CreateRoom(room));
            } else {
                info!(room = %room.at, "room changed");
                scan.patches.push(WorldPatch::UpdateRoom(room));
            }
        }
    }

    /// Re-scans on a fixed interval and applies the result through the
    /// engine. Failures go to `errors`; a full channel drops the report.
    pub fn spawn(self, engine: EngineHandle, errors: mpsc::Sender<anyhow::Error>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.cfg.interval.max(Duration::from_secs(1)));
            ticker.tick().await;
            let mut watcher = self;
            loop {
                ticker.tick().await;
                // fs walk is blocking
                let joined = tokio::task::spawn_blocking(move || {
                    let scan = watcher.rescan();
                    (watcher, scan)
                })
                .await;
                let (back, scan) = match joined {
                    Ok(out) => out,
                    Err(e) => {
                        warn!(err = %e, "content scan task failed; watcher exiting");
                        return;
                    }
                };
                watcher = back;

                for e in scan.errors {
                    report(&errors, e);
                }
                if scan.patches.is_empty() {
                    continue;
                }
                match engine.apply_patches(scan.patches).await {
                    Ok(failed) => {
                        for (label, e) in failed {
                            report(&errors, anyhow::anyhow!("{label}: {e}"));
                        }
                    }
                    Err(_) => {
                        info!("engine stopped; watcher exiting");
                        return;
                    }
                }
            }
        })
    }
}

fn report(errors: &mpsc::Sender<anyhow::Error>, e: anyhow::Error) {
    match errors.try_send(e) {
        Ok(()) => {}
        Err(TrySendError::Full(e)) => warn!(err = %e, "reload error channel full; dropping"),
        Err(TrySendError::Closed(e)) => warn!(err = %e, "reload error"),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mudsim::{Direction, RoomScript, SimError, Simulation, WorldId};

    use super::*;
    use crate::fstree::tests::{tmp_root, write};

    const VOID: &str = "name = \"Void\"\ndescription = \"Nothing.\"\n\n[exits.north]\nroom_id = 2\n";
    const HALL: &str = "name = \"Hall\"\ndescription = \"A hall.\"\n\n[exits.south]\nroom_id = 1\n";
    const PACK: &str = "name = \"CODA Recon Pack\"\naliases = [\"recon pack\"]\nrig_slot = \"backpack\"\n[container]\n";

    fn seeded(tag: &str) -> PathBuf {
        let root = tmp_root(tag);
        write(&root, "rooms/w1/1 Void.toml", VOID);
        write(&root, "rooms/w1/2 Hall.toml", HALL);
        write(&root, "items/1 CODA Recon Pack.toml", PACK);
        root
    }

    fn watcher(root: &Path) -> ContentWatcher {
        ContentWatcher::new(
            WatchConfig {
                root: root.to_path_buf(),
                interval: Duration::from_secs(60),
            },
            None,
        )
    }

    fn loaded(root: &Path) -> (ContentWatcher, Simulation) {
        let mut w = watcher(root);
        let scan = w.initial_load().unwrap();
        assert!(scan.errors.is_empty(), "{:?}", scan.errors);
        let mut sim = Simulation::default();
        assert!(sim.apply_patches(scan.patches).is_empty());
        sim.set_spawn_room(RoomRef::new("w1", RoomId(1))).unwrap();
        (w, sim)
    }

    fn labels(scan: &Scan) -> Vec<String> {
        scan.patches.iter().map(WorldPatch::label).collect()
    }

    #[test]
    fn initial_load_builds_worlds_rooms_and_items() {
        let root = seeded("initial");
        let (_w, sim) = loaded(&root);
        let void = sim.get_room(&RoomRef::new("w1", RoomId(1))).unwrap();
        assert_eq!(void.name(), "Void");
        assert_eq!(
            void.exits().get(Direction::North).map(|e| e.to.clone()),
            Some(RoomRef::new("w1", RoomId(2)))
        );
        assert!(sim.item_definition(ItemDefinitionId(1)).is_some());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_rooms_folder_fails_initial_load() {
        let root = tmp_root("norooms");
        assert!(watcher(&root).initial_load().is_err());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn unchanged_tree_produces_no_patches() {
        let root = seeded("unchanged");
        let (mut w, _sim) = loaded(&root);
        assert!(w.rescan().is_empty());
        assert!(w.rescan().is_empty());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn edited_room_is_updated_in_place() {
        let root = seeded("edit");
        let (mut w, mut sim) = loaded(&root);
        let at = RoomRef::new("w1", RoomId(1));
        let cid = sim.make_character("Sleepy").unwrap();
        let floor = sim.get_room(&at).unwrap().floor().id();
        let pack = sim.spawn_item(ItemDefinitionId(1), floor).unwrap();

        write(&root, "rooms/w1/1 Void.toml", &VOID.replace("Nothing.", "Something stirs."));
        let scan = w.rescan();
        assert!(scan.errors.is_empty());
        assert_eq!(labels(&scan), vec!["update room w1:1".to_string()]);
        assert!(sim.apply_patches(scan.patches).is_empty());

        let room = sim.get_room(&at).unwrap();
        assert_eq!(room.description(), "Something stirs.");
        assert!(room.has_character(cid));
        assert!(room.floor().contains(pack));
        assert_eq!(sim.character(cid).unwrap().room(), &at);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn worlds_and_rooms_come_and_go() {
        let root = seeded("worlds");
        let (mut w, mut sim) = loaded(&root);

        write(&root, "rooms/w2/5 Annex.toml", "name = \"Annex\"\n");
        write(&root, "rooms/w1/3 Attic.toml", "name = \"Attic\"\n");
        std::fs::remove_file(root.join("rooms/w1/2 Hall.toml")).unwrap();
        let scan = w.rescan();
        let got = labels(&scan);
        assert!(got.contains(&"create world w2".to_string()), "{got:?}");
        assert!(got.contains(&"create room w2:5".to_string()), "{got:?}");
        assert!(got.contains(&"create room w1:3".to_string()), "{got:?}");
        assert!(got.contains(&"destroy room w1:2".to_string()), "{got:?}");
        assert!(sim.apply_patches(scan.patches).is_empty());
        assert!(sim.get_room(&RoomRef::new("w2", RoomId(5))).is_ok());
        assert_eq!(
            sim.get_room(&RoomRef::new("w1", RoomId(2))).unwrap_err(),
            SimError::RoomNotFound
        );

        std::fs::remove_dir_all(root.join("rooms/w2")).unwrap();
        let scan = w.rescan();
        assert_eq!(labels(&scan), vec!["destroy world w2".to_string()]);
        assert!(sim.apply_patches(scan.patches).is_empty());
        assert!(sim.world(&WorldId::from("w2")).is_none());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn renamed_room_file_keeps_the_live_room() {
        let root = seeded("rename");
        let (mut w, _sim) = loaded(&root);
        std::fs::rename(
            root.join("rooms/w1/2 Hall.toml"),
            root.join("rooms/w1/2 Great Hall.toml"),
        )
        .unwrap();
        assert_eq!(labels(&w.rescan()), vec!["update room w1:2".to_string()]);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn malformed_file_is_reported_and_the_rest_applied() {
        let root = seeded("malformed");
        let (mut w, _sim) = loaded(&root);
        write(&root, "rooms/w1/3 Broken.toml", "name = [unclosed\n");
        write(&root, "rooms/w1/4 Fine.toml", "name = \"Fine\"\n");
        let scan = w.rescan();
        assert_eq!(scan.errors.len(), 1);
        assert_eq!(labels(&scan), vec!["create room w1:4".to_string()]);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn fixed_room_file_is_created_on_rescan() {
        let root = seeded("fixed");
        write(&root, "rooms/w1/3 Broken.toml", "name = [unclosed\n");
        let mut w = watcher(&root);
        let scan = w.initial_load().unwrap();
        assert_eq!(scan.errors.len(), 1);
        let mut sim = Simulation::default();
        assert!(sim.apply_patches(scan.patches).is_empty());
        let at = RoomRef::new("w1", RoomId(3));
        assert_eq!(sim.get_room(&at).unwrap_err(), SimError::RoomNotFound);

        write(&root, "rooms/w1/3 Broken.toml", "name = \"Fixed\"\n");
        let scan = w.rescan();
        assert!(scan.errors.is_empty());
        assert!(sim.apply_patches(scan.patches).is_empty());
        assert_eq!(sim.get_room(&at).unwrap().name(), "Fixed");
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn removed_rooms_folder_is_an_error_not_a_wipe() {
        let root = seeded("wipe");
        let (mut w, _sim) = loaded(&root);
        std::fs::remove_dir_all(root.join("rooms")).unwrap();
        let scan = w.rescan();
        assert!(scan.patches.is_empty());
        assert_eq!(scan.errors.len(), 1);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn item_catalog_follows_the_items_folder() {
        let root = seeded("items");
        let (mut w, _sim) = loaded(&root);
        write(&root, "items/2 Rock.toml", "name = \"rock\"\n");
        assert_eq!(labels(&w.rescan()), vec!["define item 2".to_string()]);
        std::fs::remove_file(root.join("items/1 CODA Recon Pack.toml")).unwrap();
        assert_eq!(labels(&w.rescan()), vec!["remove item 1".to_string()]);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn manifest_change_updates_world_flags() {
        let root = seeded("flags");
        let (mut w, mut sim) = loaded(&root);
        write(&root, "rooms/w1/world.toml", "alone = true\n");
        let scan = w.rescan();
        assert_eq!(labels(&scan), vec!["set flags w1".to_string()]);
        assert!(sim.apply_patches(scan.patches).is_empty());
        assert!(sim.world(&WorldId::from("w1")).unwrap().flags().alone);
        std::fs::remove_dir_all(&root).unwrap();
    }

    struct Silent;

    impl RoomScript for Silent {}

    struct CountingHost {
        compiled: AtomicUsize,
    }

    impl ScriptHost for CountingHost {
        fn compile(&self, _room: &RoomRef, source: &str) -> anyhow::Result<Arc<dyn RoomScript>> {
            if source.contains("syntax error") {
                anyhow::bail!("bad script");
            }
            self.compiled.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Silent))
        }
    }

    #[test]
    fn script_edits_reload_their_room() {
        let root = seeded("scripts");
        write(&root, "rooms/w1/1 Void.lua", "-- v1");
        let host = Arc::new(CountingHost {
            compiled: AtomicUsize::new(0),
        });
        let mut w = ContentWatcher::new(
            WatchConfig {
                root: root.clone(),
                interval: Duration::from_secs(60),
            },
            Some(host.clone()),
        );
        let mut sim = Simulation::default();
        assert!(sim.apply_patches(w.initial_load().unwrap().patches).is_empty());
        assert_eq!(host.compiled.load(Ordering::SeqCst), 1);
        assert!(sim.get_room(&RoomRef::new("w1", RoomId(1))).unwrap().has_script());

        write(&root, "rooms/w1/1 Void.lua", "-- v2");
        assert_eq!(labels(&w.rescan()), vec!["update room w1:1".to_string()]);
        assert_eq!(host.compiled.load(Ordering::SeqCst), 2);

        write(&root, "rooms/w1/1 Void.lua", "syntax error");
        let scan = w.rescan();
        assert!(scan.patches.is_empty());
        assert_eq!(scan.errors.len(), 1);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn spawned_watcher_reports_failed_patches() {
        let root = seeded("spawned");
        let mut w = ContentWatcher::new(
            WatchConfig {
                root: root.clone(),
                interval: Duration::from_secs(1),
            },
            None,
        );
        let mut sim = Simulation::default();
        sim.apply_patches(w.initial_load().unwrap().patches);
        let (engine, handle) = mudsim::Engine::new(sim, Duration::from_millis(5));
        let engine_task = tokio::spawn(engine.run());

        let (err_tx, mut err_rx) = mpsc::channel(8);
        let watch_task = w.spawn(handle.clone(), err_tx);
        write(&root, "rooms/w1/3 Broken.toml", "name = [unclosed\n");

        let err = tokio::time::timeout(Duration::from_secs(10), err_rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert!(format!("{err:#}").contains("3 Broken.toml"));

        watch_task.abort();
        drop(handle);
        let _ = watch_task.await;
        engine_task.await.unwrap();
        std::fs::remove_dir_all(&root).unwrap();
    }
}
