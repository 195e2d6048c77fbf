//! Command and event vocabulary exchanged with the session layer.

use serde::{Deserialize, Serialize};

use crate::character::CharacterId;
use crate::direction::Direction;
use crate::item::{ItemDefinitionId, ItemId};
use crate::room::RoomRef;

/// A player intent. Item references are free text matched against names and aliases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Command {
    Move { direction: Direction },
    Say { text: String },
    Take { item: String },
    Drop { item: String },
    Equip { item: String },
    Unequip { item: String },
    Look,
    Inventory,
    AdminSpawn { definition: ItemDefinitionId },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Move { .. } => "move",
            Command::Say { .. } => "say",
            Command::Take { .. } => "take",
            Command::Drop { .. } => "drop",
            Command::Equip { .. } => "equip",
            Command::Unequip { .. } => "unequip",
            Command::Look => "look",
            Command::Inventory => "inventory",
            Command::AdminSpawn { .. } => "admin_spawn",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterView {
    pub id: CharacterId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: ItemId,
    pub definition: ItemDefinitionId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub room: RoomRef,
    pub name: String,
    pub region: Option<String>,
    pub description: String,
    pub exits: Vec<(Direction, RoomRef)>,
    /// Other awake characters the viewer can see.
    pub characters: Vec<CharacterView>,
    pub items: Vec<ItemView>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryView {
    pub backpack: Option<ItemView>,
    pub backpack_contents: Vec<ItemView>,
    pub items: Vec<ItemView>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Event {
    RoomDescription { room: RoomView },
    CharacterWakes { character: CharacterView },
    CharacterSleeps { character: CharacterView },
    CharacterSpeaks { character: CharacterView, text: String },
    CharacterArrives { character: CharacterView, direction: Direction },
    CharacterLeaves { character: CharacterView, direction: Direction },
    CharacterTakesItem { character: CharacterView, item: ItemView },
    CharacterDropsItem { character: CharacterView, item: ItemView },
    CharacterEquipsItem { character: CharacterView, item: ItemView },
    CharacterUnequipsItem { character: CharacterView, item: ItemView },
    NoExitInThatDirection { direction: Direction },
    ItemNotHere { item: String },
    NoSpaceToTakeItem { item: ItemView },
    YouAreNotWearing { item: String },
    InventoryDescription { inventory: InventoryView },
    AdminSpawnsItem { character: CharacterView, item: ItemView },
    Narration { text: String },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::RoomDescription { .. } => "room_description",
            Event::CharacterWakes { .. } => "character_wakes",
            Event::CharacterSleeps { .. } => "character_sleeps",
            Event::CharacterSpeaks { .. } => "character_speaks",
            Event::CharacterArrives { .. } => "character_arrives",
            Event::CharacterLeaves { .. } => "character_leaves",
            Event::CharacterTakesItem { .. } => "character_takes_item",
            Event::CharacterDropsItem { .. } => "character_drops_item",
            Event::CharacterEquipsItem { .. } => "character_equips_item",
            Event::CharacterUnequipsItem { .. } => "character_unequips_item",
            Event::NoExitInThatDirection { .. } => "no_exit_in_that_direction",
            Event::ItemNotHere { .. } => "item_not_here",
            Event::NoSpaceToTakeItem { .. } => "no_space_to_take_item",
            Event::YouAreNotWearing { .. } => "you_are_not_wearing",
            Event::InventoryDescription { .. } => "inventory_description",
            Event::AdminSpawnsItem { .. } => "admin_spawns_item",
            Event::Narration { .. } => "narration",
        }
    }
}
