use std::path::Path;

use anyhow::Context;
use mudsim::WorldSnapshot;

/// `Ok(None)` when no snapshot has been written yet.
pub fn load(path: &Path) -> anyhow::Result<Option<WorldSnapshot>> {
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read state {}", path.display())),
    };
    let snap = serde_json::from_str(&s).with_context(|| format!("parse state {}", path.display()))?;
    Ok(Some(snap))
}

pub fn save(path: &Path, snap: &WorldSnapshot) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create state dir {}", dir.display()))?;
        }
    }
    let s = serde_json::to_string_pretty(snap)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, s).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use mudsim::{CharacterId, RoomId, WorldId};
    use mudsim::persistence::{CharacterState, RigState};

    use super::*;

    #[test]
    fn missing_file_is_none_and_save_round_trips() {
        let dir = std::env::temp_dir().join(format!("world_01-state-{}", std::process::id()));
        let path = dir.join("nested/world_state.json");
        let _ = std::fs::remove_dir_all(&dir);
        assert!(load(&path).unwrap().is_none());

        let snap = WorldSnapshot {
            characters: vec![CharacterState {
                id: CharacterId(1),
                name: "Sleepy".into(),
                world: WorldId::from("admin"),
                room: RoomId(0),
                rig: RigState::default(),
                items: Vec::new(),
            }],
            worlds: Vec::new(),
        };
        save(&path, &snap).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load(&path).unwrap(), Some(snap));

        std::fs::write(&path, "{not json").unwrap();
        assert!(load(&path).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
