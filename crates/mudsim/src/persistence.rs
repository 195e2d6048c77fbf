//! Flattened snapshot of characters and floor items for the persistence layer.
//! The storage format is up to the caller; the types are plain serde data.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::character::{Character, CharacterId};
use crate::container::{Container, ContainerKind};
use crate::item::{Item, ItemDefinitionId, ItemId};
use crate::room::{RoomId, RoomRef, WorldId};
use crate::sim::Simulation;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub characters: Vec<CharacterState>,
    pub worlds: Vec<WorldState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterState {
    pub id: CharacterId,
    pub name: String,
    pub world: WorldId,
    pub room: RoomId,
    #[serde(default)]
    pub rig: RigState,
    #[serde(default)]
    pub items: Vec<ItemState>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigState {
    pub backpack: Option<ItemState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    pub id: WorldId,
    pub rooms: Vec<RoomState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomState {
    pub id: RoomId,
    pub items: Vec<ItemState>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemState {
    pub id: ItemId,
    pub definition: ItemDefinitionId,
    /// Contents of the item's own container.
    #[serde(default)]
    pub items: Vec<ItemState>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub characters: usize,
    pub items: usize,
    pub skipped: usize,
}

fn item_state(item: &Item) -> ItemState {
    ItemState {
        id: item.id(),
        definition: item.definition().id,
        items: item.container().map(container_state).unwrap_or_default(),
    }
}

fn container_state(c: &Container) -> Vec<ItemState> {
    c.sorted_items().into_iter().map(item_state).collect()
}

fn character_state(c: &Character) -> CharacterState {
    CharacterState {
        id: c.id(),
        name: c.name().to_string(),
        world: c.room.world.clone(),
        room: c.room.room,
        rig: RigState {
            backpack: c.rig.backpack().map(item_state),
        },
        items: container_state(&c.inventory),
    }
}

impl Simulation {
    /// Characters sorted by id; only rooms with something on the floor are listed.
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut characters = self.characters.values().map(character_state).collect::<Vec<_>>();
        characters.sort_by_key(|c| c.id);

        let mut worlds = self
            .worlds
            .values()
            .map(|w| {
                let mut rooms = w
                    .rooms
                    .values()
                    .filter(|r| !r.floor.is_empty())
                    .map(|r| RoomState {
                        id: r.id,
                        items: container_state(&r.floor),
                    })
                    .collect::<Vec<_>>();
                rooms.sort_by_key(|r| r.id);
                WorldState {
                    id: w.id.clone(),
                    rooms,
                }
            })
            .filter(|w| !w.rooms.is_empty())
            .collect::<Vec<_>>();
        worlds.sort_by(|a, b| a.id.cmp(&b.id));

        WorldSnapshot { characters, worlds }
    }

    /// Repopulates characters and floor items. Run before the command loop
    /// starts, after the content has been loaded. Entries that no longer fit
    /// the loaded content are skipped.
    pub fn restore(&mut self, snap: WorldSnapshot) -> RestoreStats {
        let mut stats = RestoreStats::default();
        let mut seen = HashSet::new();

        for cs in snap.characters {
            if self.characters.contains_key(&cs.id) {
                warn!(cid = %cs.id, "duplicate character in snapshot; skipping");
                stats.skipped += 1;
                continue;
            }
            let Some(next_character) = cs.id.0.checked_add(1) else {
                warn!(cid = %cs.id, "character id out of range; skipping");
                stats.skipped += 1;
                continue;
            };
            let mut at = RoomRef::new(cs.world.clone(), cs.room);
            if self.get_room(&at).is_err() {
                match self.spawn_room.clone() {
                    Some(spawn) if self.get_room(&spawn).is_ok() => {
                        warn!(cid = %cs.id, room = %at, "saved room is gone; using spawn room");
                        at = spawn;
                    }
                    _ => {
                        warn!(cid = %cs.id, room = %at, "saved room is gone and no spawn room; skipping");
                        stats.skipped += 1;
                        continue;
                    }
                }
            }

            let inventory = Container::new(self.alloc_container(), ContainerKind::Inventory)
                .with_capacity(self.cfg.inventory_capacity);
            let mut c = Character::new(cs.id, cs.name, at.clone(), inventory);
            if let Some(item) = cs.rig.backpack.and_then(|s| self.rebuild(s, &mut seen, &mut stats)) {
                if let Err(e) = c.rig.equip(item) {
                    warn!(cid = %cs.id, err = %e.reason, "saved rig item cannot be worn");
                    stats.skipped += 1;
                }
            }
            for state in cs.items {
                let Some(item) = self.rebuild(state, &mut seen, &mut stats) else {
                    continue;
                };
                if c.inventory.put(item).is_err() {
                    stats.skipped += 1;
                }
            }

            self.next_character = self.next_character.max(next_character);
            if let Ok(room) = self.room_mut(&at) {
                room.add_character(cs.id);
            }
            self.characters.insert(cs.id, c);
            stats.characters += 1;
        }

        for ws in snap.worlds {
            for rs in ws.rooms {
                let at = RoomRef::new(ws.id.clone(), rs.id);
                if self.get_room(&at).is_err() {
                    warn!(room = %at, items = rs.items.len(), "saved room is gone; dropping its floor");
                    stats.skipped += rs.items.len();
                    continue;
                }
                for state in rs.items {
                    let Some(item) = self.rebuild(state, &mut seen, &mut stats) else {
                        continue;
                    };
                    let stored = self.room_mut(&at).map(|room| room.floor.put(item).is_ok());
                    if stored != Ok(true) {
                        stats.skipped += 1;
                    }
                }
            }
        }
        stats
    }

    /// Rebuilds an item tree. An id already restored, or one the allocator
    /// cannot follow, drops that item and everything inside it.
    fn rebuild(&mut self, state: ItemState, seen: &mut HashSet<ItemId>, stats: &mut RestoreStats) -> Option<Item> {
        let Some(next_item) = state.id.0.checked_add(1) else {
            warn!(item = %state.id, "item id out of range; skipping");
            stats.skipped += 1;
            return None;
        };
        if !seen.insert(state.id) {
            warn!(item = %state.id, "duplicate item in snapshot; skipping");
            stats.skipped += 1;
            return None;
        }
        let Some(def) = self.item_definitions.get(&state.definition).cloned() else {
            warn!(item = %state.id, definition = %state.definition, "unknown item definition; skipping");
            stats.skipped += 1;
            return None;
        };
        self.next_item = self.next_item.max(next_item);
        let mut item = self.instantiate(def, Some(state.id));
        for inner in state.items {
            let Some(child) = self.rebuild(inner, seen, stats) else {
                continue;
            };
            let Some(c) = item.container_mut() else {
                stats.skipped += 1;
                continue;
            };
            if c.put(child).is_err() {
                stats.skipped += 1;
            }
        }
        stats.items += 1;
        Some(item)
    }
}
