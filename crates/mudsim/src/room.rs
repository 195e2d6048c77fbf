use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::character::CharacterId;
use crate::container::Container;
use crate::direction::Direction;
use crate::script::RoomScript;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub String);

impl WorldId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorldId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorldId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique within its world only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully qualified room address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomRef {
    pub world: WorldId,
    pub room: RoomId,
}

impl RoomRef {
    pub fn new(world: impl Into<WorldId>, room: RoomId) -> Self {
        Self {
            world: world.into(),
            room,
        }
    }

    /// Parses `<world>:<room>`.
    pub fn parse(s: &str) -> Option<Self> {
        let (world, room) = s.trim().rsplit_once(':')?;
        if world.is_empty() {
            return None;
        }
        let room = room.parse::<i64>().ok()?;
        Some(Self::new(world, RoomId(room)))
    }
}

impl fmt::Display for RoomRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.world, self.room)
    }
}

/// One-way link. The destination may have been destroyed since.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exit {
    pub to: RoomRef,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Exits {
    slots: [Option<Exit>; Direction::COUNT],
}

impl Exits {
    pub fn get(&self, dir: Direction) -> Option<&Exit> {
        self.slots[dir.index()].as_ref()
    }

    pub fn set(&mut self, dir: Direction, exit: Option<Exit>) {
        self.slots[dir.index()] = exit;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Direction, &Exit)> {
        Direction::ALL
            .iter()
            .filter_map(|d| self.get(*d).map(|e| (*d, e)))
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Direction, RoomRef)>) -> Self {
        let mut out = Self::default();
        for (dir, to) in pairs {
            out.set(dir, Some(Exit { to }));
        }
        out
    }
}

pub struct Room {
    pub(crate) id: RoomId,
    pub(crate) world: WorldId,
    pub(crate) name: String,
    pub(crate) region: Option<String>,
    pub(crate) description: String,
    pub(crate) exits: Exits,
    pub(crate) floor: Container,
    pub(crate) characters: Vec<CharacterId>,
    pub(crate) script: Option<Arc<dyn RoomScript>>,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("world", &self.world)
            .field("name", &self.name)
            .field("region", &self.region)
            .field("exits", &self.exits)
            .field("floor", &self.floor.id())
            .field("characters", &self.characters)
            .field("script", &self.script.is_some())
            .finish()
    }
}

impl Room {
    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn at(&self) -> RoomRef {
        RoomRef::new(self.world.clone(), self.id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn exits(&self) -> &Exits {
        &self.exits
    }

    pub fn floor(&self) -> &Container {
        &self.floor
    }

    pub fn characters(&self) -> &[CharacterId] {
        &self.characters
    }

    pub fn has_script(&self) -> bool {
        self.script.is_some()
    }

    pub fn has_character(&self, cid: CharacterId) -> bool {
        self.characters.contains(&cid)
    }

    pub(crate) fn add_character(&mut self, cid: CharacterId) {
        if !self.has_character(cid) {
            self.characters.push(cid);
        }
    }

    pub(crate) fn remove_character(&mut self, cid: CharacterId) {
        self.characters.retain(|c| *c != cid);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldFlags {
    /// Players never see each other here.
    pub alone: bool,
    pub instancable: bool,
    /// Set on per-party copies of an instancable world.
    pub instance: bool,
}

#[derive(Debug)]
pub struct World {
    pub(crate) id: WorldId,
    pub(crate) flags: WorldFlags,
    pub(crate) rooms: HashMap<RoomId, Room>,
}

impl World {
    pub fn id(&self) -> &WorldId {
        &self.id
    }

    pub fn flags(&self) -> WorldFlags {
        self.flags
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }
}
