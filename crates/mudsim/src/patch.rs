//! Structural changes produced by content reload. Patches only touch world
//! flags, room descriptions, exits, scripts and the item catalog; floors and
//! presence lists belong to the command loop.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::SimError;
use crate::direction::Direction;
use crate::item::{ItemDefinition, ItemDefinitionId};
use crate::room::{Exits, RoomRef, WorldFlags, WorldId};
use crate::script::RoomScript;
use crate::sim::Simulation;

#[derive(Clone)]
pub struct RoomPatch {
    pub at: RoomRef,
    pub name: String,
    pub region: Option<String>,
    pub description: String,
    pub exits: Vec<(Direction, RoomRef)>,
    pub script: Option<Arc<dyn RoomScript>>,
}

impl fmt::Debug for RoomPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomPatch")
            .field("at", &self.at)
            .field("name", &self.name)
            .field("region", &self.region)
            .field("exits", &self.exits)
            .field("script", &self.script.is_some())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum WorldPatch {
    CreateWorld { world: WorldId, flags: WorldFlags },
    SetWorldFlags { world: WorldId, flags: WorldFlags },
    DestroyWorld { world: WorldId },
    CreateRoom(RoomPatch),
    UpdateRoom(RoomPatch),
    DestroyRoom { at: RoomRef },
    DefineItem(ItemDefinition),
    RemoveItemDefinition { id: ItemDefinitionId },
}

impl WorldPatch {
    pub fn label(&self) -> String {
        match self {
            WorldPatch::CreateWorld { world, .. } => format!("create world {world}"),
            WorldPatch::SetWorldFlags { world, .. } => format!("set flags {world}"),
            WorldPatch::DestroyWorld { world } => format!("destroy world {world}"),
            WorldPatch::CreateRoom(r) => format!("create room {}", r.at),
            WorldPatch::UpdateRoom(r) => format!("update room {}", r.at),
            WorldPatch::DestroyRoom { at } => format!("destroy room {at}"),
            WorldPatch::DefineItem(def) => format!("define item {}", def.id),
            WorldPatch::RemoveItemDefinition { id } => format!("remove item {id}"),
        }
    }
}

impl Simulation {
    pub fn apply_patch(&mut self, patch: WorldPatch) -> Result<(), SimError> {
        match patch {
            WorldPatch::CreateWorld { world, flags } => {
                self.create_world(world, flags);
                Ok(())
            }
            WorldPatch::SetWorldFlags { world, flags } => {
                info!(world = %world, alone = flags.alone, instancable = flags.instancable, "world flags updated");
                self.set_world_flags(&world, flags)
            }
            WorldPatch::DestroyWorld { world } => self.destroy_world(&world),
            WorldPatch::CreateRoom(r) => {
                self.create_room(&r.at, r.name, r.region, r.description, r.script)?;
                self.room_mut(&r.at)?.exits = Exits::from_pairs(r.exits);
                Ok(())
            }
            WorldPatch::UpdateRoom(r) => {
                // A file that failed to load earlier was never created.
                if self.get_room(&r.at).is_err() {
                    info!(room = %r.at, "updated room missing, creating");
                    return self.apply_patch(WorldPatch::CreateRoom(r));
                }
                self.update_room(
                    &r.at,
                    r.name,
                    r.region,
                    r.description,
                    Exits::from_pairs(r.exits),
                    r.script,
                )
            }
            WorldPatch::DestroyRoom { at } => self.destroy_room(&at),
            WorldPatch::DefineItem(def) => {
                info!(item = %def.id, name = %def.name, "item defined");
                self.create_item_definition(def);
                Ok(())
            }
            WorldPatch::RemoveItemDefinition { id } => {
                info!(item = %id, "item definition removed");
                self.remove_item_definition(id)
            }
        }
    }

    /// Applies every patch; failures are collected with the patch label.
    pub fn apply_patches(&mut self, patches: Vec<WorldPatch>) -> Vec<(String, SimError)> {
        let mut failed = Vec::new();
        for patch in patches {
            let label = patch.label();
            if let Err(e) = self.apply_patch(patch) {
                failed.push((label, e));
            }
        }
        failed
    }
}
