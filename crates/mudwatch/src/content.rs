//! Content files: `rooms/<world>/<id> <name>.toml` (with an optional
//! `<id> <name>.lua` script and a `world.toml` manifest per world) and
//! `items/<id> <name>.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use mudsim::{
    ContainerTemplate, Direction, ItemDefinition, ItemDefinitionId, RigSlot, RoomId, RoomPatch,
    RoomRef, ScriptHost, WorldFlags, WorldId, WorldPatch,
};
use serde::Deserialize;
use tracing::debug;

pub const ROOMS_DIR: &str = "rooms";
pub const ITEMS_DIR: &str = "items";
pub const WORLD_MANIFEST: &str = "world.toml";

#[derive(Clone, Debug, Deserialize)]
pub struct RoomFile {
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exits: BTreeMap<String, ExitFile>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExitFile {
    pub room_id: i64,
    /// Defaults to the world the room lives in.
    #[serde(default)]
    pub world_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ItemFile {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, alias = "rigslot")]
    pub rig_slot: Option<String>,
    #[serde(default)]
    pub container: Option<ContainerFile>,
    #[serde(default)]
    pub weight: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ContainerFile {
    #[serde(default)]
    pub capacity: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WorldManifest {
    #[serde(default)]
    pub alone: bool,
    #[serde(default)]
    pub instancable: bool,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `"12 Dusty Hall.toml"` -> 12.
pub fn leading_id(name: &str) -> anyhow::Result<i64> {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    let tok = stem.split_whitespace().next().unwrap_or("");
    tok.parse::<i64>()
        .with_context(|| format!("file name {name:?} does not start with a numeric id"))
}

pub fn is_room_file(name: &str) -> bool {
    name.ends_with(".toml") && name != WORLD_MANIFEST
}

pub fn is_script_file(name: &str) -> bool {
    name.ends_with(".lua")
}

pub fn script_path(room_file: &Path) -> PathBuf {
    room_file.with_extension("lua")
}

pub fn room_file_for_script(script: &Path) -> PathBuf {
    script.with_extension("toml")
}

pub fn parse_room(src: &str) -> anyhow::Result<RoomFile> {
    Ok(toml::from_str(src)?)
}

pub fn parse_item(src: &str) -> anyhow::Result<ItemFile> {
    Ok(toml::from_str(src)?)
}

/// Reads one room file (and its script, when a host is present) into a patch.
pub fn load_room(world: &WorldId, path: &Path, scripts: Option<&dyn ScriptHost>) -> anyhow::Result<RoomPatch> {
    let id = leading_id(&file_name(path))?;
    let at = RoomRef::new(world.clone(), RoomId(id));
    let src = std::fs::read_to_string(path).with_context(|| format!("read room {}", path.display()))?;
    let room = parse_room(&src).with_context(|| format!("parse room {}", path.display()))?;

    let mut exits = Vec::with_capacity(room.exits.len());
    for (dir, exit) in room.exits {
        let dir = Direction::parse(&dir).with_context(|| format!("exit in {}", path.display()))?;
        let to_world = exit
            .world_id
            .filter(|w| !w.trim().is_empty())
            .map(WorldId::from)
            .unwrap_or_else(|| world.clone());
        exits.push((dir, RoomRef::new(to_world, RoomId(exit.room_id))));
    }

    let script_file = script_path(path);
    let script = match scripts {
        Some(host) if script_file.is_file() => {
            let source = std::fs::read_to_string(&script_file)
                .with_context(|| format!("read script {}", script_file.display()))?;
            let compiled = host
                .compile(&at, &source)
                .with_context(|| format!("compile script {}", script_file.display()))?;
            Some(compiled)
        }
        None if script_file.is_file() => {
            debug!(room = %at, "room script present but no script host; ignoring");
            None
        }
        _ => None,
    };

    Ok(RoomPatch {
        at,
        name: room.name,
        region: room.region,
        description: room.description,
        exits,
        script,
    })
}

/// A missing manifest means default flags.
pub fn load_world_flags(dir: &Path) -> anyhow::Result<WorldFlags> {
    let path = dir.join(WORLD_MANIFEST);
    if !path.is_file() {
        return Ok(WorldFlags::default());
    }
    let src = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let m: WorldManifest = toml::from_str(&src).with_context(|| format!("parse {}", path.display()))?;
    Ok(WorldFlags {
        alone: m.alone,
        instancable: m.instancable,
        instance: false,
    })
}

pub fn world_id(dir: &Path) -> WorldId {
    WorldId::from(file_name(dir))
}

fn sorted_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for ent in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let ent = ent.with_context(|| format!("read dir {}", dir.display()))?;
        out.push(ent.path());
    }
    out.sort();
    Ok(out)
}

/// Patches that create one world and all its rooms. A bad room file is
/// reported and skipped; the rest of the world still loads.
pub fn load_world(
    dir: &Path,
    scripts: Option<&dyn ScriptHost>,
    patches: &mut Vec<WorldPatch>,
    errors: &mut Vec<anyhow::Error>,
) {
    let world = world_id(dir);
    let flags = load_world_flags(dir).unwrap_or_else(|e| {
        errors.push(e);
        WorldFlags::default()
    });
    let files = match sorted_files(dir) {
        Ok(files) => files,
        Err(e) => {
            errors.push(e);
            return;
        }
    };
    patches.push(WorldPatch::CreateWorld {
        world: world.clone(),
        flags,
    });
    for path in files {
        if !path.is_file() || !is_room_file(&file_name(&path)) {
            continue;
        }
        match load_room(&world, &path, scripts) {
            Ok(room) => patches.push(WorldPatch::CreateRoom(room)),
            Err(e) => errors.push(e),
        }
    }
}

pub fn load_item(path: &Path) -> anyhow::Result<ItemDefinition> {
    let id = leading_id(&file_name(path))?;
    let src = std::fs::read_to_string(path).with_context(|| format!("read item {}", path.display()))?;
    let item = parse_item(&src).with_context(|| format!("parse item {}", path.display()))?;
    let rig_slot = match item.rig_slot.as_deref() {
        None => None,
        Some(s) => Some(
            RigSlot::parse(s)
                .with_context(|| format!("unknown rig slot {s:?} in {}", path.display()))?,
        ),
    };
    Ok(ItemDefinition {
        id: ItemDefinitionId(u64::try_from(id).with_context(|| format!("negative item id in {}", path.display()))?),
        name: item.name,
        aliases: item.aliases,
        rig_slot,
        container: item.container.map(|c| ContainerTemplate { capacity: c.capacity }),
        weight: item.weight,
    })
}

pub fn load_items(dir: &Path, patches: &mut Vec<WorldPatch>, errors: &mut Vec<anyhow::Error>) {
    let files = match sorted_files(dir) {
        Ok(files) => files,
        Err(e) => {
            errors.push(e);
            return;
        }
    };
    for path in files {
        if !path.is_file() || !file_name(&path).ends_with(".toml") {
            continue;
        }
        match load_item(&path) {
            Ok(def) => patches.push(WorldPatch::DefineItem(def)),
            Err(e) => errors.push(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fstree::tests::{tmp_root, write};

    #[test]
    fn room_ids_come_from_file_names() {
        assert_eq!(leading_id("12 Dusty Hall.toml").unwrap(), 12);
        assert_eq!(leading_id("0 Void.lua").unwrap(), 0);
        assert_eq!(leading_id("-4.toml").unwrap(), -4);
        assert!(leading_id("Hall.toml").is_err());
        assert!(is_room_file("1 Void.toml"));
        assert!(!is_room_file(WORLD_MANIFEST));
        assert!(!is_room_file("1 Void.lua"));
    }

    #[test]
    fn room_exits_default_to_the_same_world() {
        let root = tmp_root("room");
        write(
            &root,
            "w1/1 Void.toml",
            r#"
name = "Void"
region = "Nowhere"
description = "An empty place."

[exits.north]
room_id = 2

[exits.down]
room_id = 0
world_id = "admin"
"#,
        );
        let room = load_room(&WorldId::from("w1"), &root.join("w1/1 Void.toml"), None).unwrap();
        assert_eq!(room.at, RoomRef::new("w1", RoomId(1)));
        assert_eq!(room.region.as_deref(), Some("Nowhere"));
        assert!(room.exits.contains(&(Direction::North, RoomRef::new("w1", RoomId(2)))));
        assert!(room.exits.contains(&(Direction::Down, RoomRef::new("admin", RoomId(0)))));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn unknown_direction_is_an_error() {
        let root = tmp_root("baddir");
        write(&root, "w1/1 Void.toml", "name = \"Void\"\n[exits.sideways]\nroom_id = 2\n");
        let err = load_room(&WorldId::from("w1"), &root.join("w1/1 Void.toml"), None).unwrap_err();
        assert!(format!("{err:#}").contains("sideways"));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn items_parse_slot_and_container() {
        let root = tmp_root("item");
        write(
            &root,
            "items/1 CODA Recon Pack.toml",
            r#"
name = "CODA Recon Pack"
aliases = ["recon pack", "pack"]
rigslot = "backpack"
weight = 3

[container]
capacity = 12
"#,
        );
        write(&root, "items/2 Rock.toml", "name = \"rock\"\nrig_slot = \"head\"\n");
        let def = load_item(&root.join("items/1 CODA Recon Pack.toml")).unwrap();
        assert_eq!(def.id, ItemDefinitionId(1));
        assert_eq!(def.rig_slot, Some(RigSlot::Backpack));
        assert_eq!(def.container, Some(ContainerTemplate { capacity: Some(12) }));
        assert!(def.known_as("Recon Pack"));

        let mut patches = Vec::new();
        let mut errors = Vec::new();
        load_items(&root.join("items"), &mut patches, &mut errors);
        assert_eq!(patches.len(), 1);
        assert_eq!(errors.len(), 1);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn world_manifest_sets_flags() {
        let root = tmp_root("manifest");
        write(&root, "solo/world.toml", "alone = true\n");
        write(&root, "solo/1 Cell.toml", "name = \"Cell\"\n");
        let mut patches = Vec::new();
        let mut errors = Vec::new();
        load_world(&root.join("solo"), None, &mut patches, &mut errors);
        assert!(errors.is_empty());
        assert_eq!(patches.len(), 2);
        match &patches[0] {
            WorldPatch::CreateWorld { world, flags } => {
                assert_eq!(world, &WorldId::from("solo"));
                assert!(flags.alone);
                assert!(!flags.instancable);
            }
            other => panic!("unexpected {other:?}"),
        }
        std::fs::remove_dir_all(&root).unwrap();
    }
}
