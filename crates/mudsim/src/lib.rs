//! mudsim
//!
//! In-memory world simulation for a text MUD: worlds, rooms, items and
//! characters, the command/event vocabulary, and the single-writer loop that
//! applies commands to them.

mod actions;
pub mod character;
pub mod container;
pub mod direction;
pub mod engine;
pub mod error;
pub mod event;
pub mod item;
mod lifecycle;
pub mod patch;
pub mod persistence;
pub mod rig;
pub mod room;
pub mod script;
pub mod sim;

pub use character::{Character, CharacterId};
pub use container::{Container, ContainerId, ContainerKind};
pub use direction::Direction;
pub use engine::{Engine, EngineHandle};
pub use error::SimError;
pub use event::{CharacterView, Command, Event, InventoryView, ItemView, RoomView};
pub use item::{ContainerTemplate, Item, ItemDefinition, ItemDefinitionId, ItemId, RigSlot};
pub use patch::{RoomPatch, WorldPatch};
pub use persistence::{RestoreStats, WorldSnapshot};
pub use rig::Rig;
pub use room::{Exit, Exits, Room, RoomId, RoomRef, World, WorldFlags, WorldId};
pub use script::{Hook, RoomScript, ScriptHost};
pub use sim::{SimConfig, Simulation};
