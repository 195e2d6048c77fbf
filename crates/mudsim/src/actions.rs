use tracing::{debug, warn};

use crate::SimError;
use crate::character::CharacterId;
use crate::direction::Direction;
use crate::event::{Command, Event, InventoryView};
use crate::item::{Item, ItemDefinitionId};
use crate::rig::EquipError;
use crate::room::RoomRef;
use crate::script::Hook;
use crate::sim::Simulation;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Inventory,
    Floor,
}

impl Simulation {
    /// One pass of the command loop: every awake character gets at most one
    /// command applied. The starting character rotates between passes.
    pub fn process_commands(&mut self) -> usize {
        let mut awake = self
            .characters
            .values()
            .filter(|c| c.is_awake())
            .map(|c| c.id())
            .collect::<Vec<_>>();
        if awake.is_empty() {
            return 0;
        }
        awake.sort();
        let start = self.cursor % awake.len();
        self.cursor = self.cursor.wrapping_add(1);

        let mut applied = 0;
        let (tail, head) = awake.split_at(start);
        for cid in head.iter().chain(tail) {
            let Some(cmd) = self.characters.get_mut(cid).and_then(|c| c.next_command()) else {
                continue;
            };
            self.apply(*cid, cmd);
            applied += 1;
        }
        applied
    }

    /// Runs one command to completion. Errors stay inside the loop.
    fn apply(&mut self, cid: CharacterId, cmd: Command) {
        let kind = cmd.kind();
        let res = match cmd {
            Command::Move { direction } => self.move_character(cid, direction),
            Command::Say { text } => self.say(cid, text),
            Command::Take { item } => self.take(cid, item),
            Command::Drop { item } => self.drop_item(cid, item),
            Command::Equip { item } => self.equip(cid, item),
            Command::Unequip { item } => self.unequip(cid, item),
            Command::Look => self.look(cid),
            Command::Inventory => self.inventory(cid),
            Command::AdminSpawn { definition } => self.admin_spawn(cid, definition),
        };
        match res {
            Ok(()) => {}
            Err(e) if e.is_rule() => debug!(cid = %cid, cmd = kind, err = %e, "command refused"),
            Err(e) => warn!(cid = %cid, cmd = kind, err = %e, "command failed"),
        }
    }

    fn say(&mut self, cid: CharacterId, text: String) -> Result<(), SimError> {
        let (character, at) = self.actor(cid)?;
        self.get_room(&at)?;
        self.announce(&at, cid, Event::CharacterSpeaks { character, text }, true);
        Ok(())
    }

    fn move_character(&mut self, cid: CharacterId, direction: Direction) -> Result<(), SimError> {
        let (character, from) = self.actor(cid)?;
        let exit = self.get_room(&from)?.exits.get(direction).map(|e| e.to.clone());
        let Some(to) = exit else {
            self.tell(cid, Event::NoExitInThatDirection { direction });
            return Ok(());
        };
        if let Err(e) = self.get_room(&to) {
            warn!(cid = %cid, from = %from, to = %to, err = %e, "dangling exit");
            self.tell(cid, Event::NoExitInThatDirection { direction });
            return Ok(());
        }

        self.room_mut(&from)?.remove_character(cid);
        self.announce(
            &from,
            cid,
            Event::CharacterLeaves {
                character: character.clone(),
                direction,
            },
            false,
        );
        self.run_hook(&from, Hook::Exit, cid);

        self.room_mut(&to)?.add_character(cid);
        self.character_mut(cid)?.room = to.clone();
        let room = self.room_view(&to, cid)?;
        self.tell(cid, Event::RoomDescription { room });
        self.announce(
            &to,
            cid,
            Event::CharacterArrives {
                character,
                direction: direction.opposite(),
            },
            false,
        );
        self.run_hook(&to, Hook::Enter, cid);
        Ok(())
    }

    fn take(&mut self, cid: CharacterId, alias: String) -> Result<(), SimError> {
        let (character, at) = self.actor(cid)?;
        let Some(item_id) = self.get_room(&at)?.floor.find(&alias).map(Item::id) else {
            self.tell(cid, Event::ItemNotHere { item: alias });
            return Ok(());
        };
        let c = self.character_mut(cid)?;
        if !c.inventory.has_room() {
            let item = self
                .get_room(&at)?
                .floor
                .get(item_id)
                .map(Item::view)
                .ok_or(SimError::ItemNotFound)?;
            self.tell(cid, Event::NoSpaceToTakeItem { item });
            return Ok(());
        }

        let item = self
            .room_mut(&at)?
            .floor
            .remove(item_id)
            .ok_or(SimError::ItemNotFound)?;
        let view = item.view();
        self.stow(cid, &at, item)?;
        self.announce(&at, cid, Event::CharacterTakesItem { character, item: view }, true);
        Ok(())
    }

    fn drop_item(&mut self, cid: CharacterId, alias: String) -> Result<(), SimError> {
        let (character, at) = self.actor(cid)?;
        self.get_room(&at)?;
        let c = self.character_mut(cid)?;
        let Some(item_id) = c.inventory.find(&alias).map(Item::id) else {
            self.tell(cid, Event::ItemNotHere { item: alias });
            return Ok(());
        };
        let item = c.inventory.remove(item_id).ok_or(SimError::ItemNotFound)?;
        let view = item.view();
        if let Err(item) = self.room_mut(&at)?.floor.put(item) {
            self.put_back(cid, &at, Source::Inventory, item)?;
            return Err(SimError::ContainerFull);
        }
        self.announce(&at, cid, Event::CharacterDropsItem { character, item: view }, true);
        Ok(())
    }

    /// Carried items are preferred over ones lying on the floor.
    fn equip(&mut self, cid: CharacterId, alias: String) -> Result<(), SimError> {
        let (character, at) = self.actor(cid)?;
        let carried = self
            .character_mut(cid)?
            .inventory
            .find(&alias)
            .map(Item::id);
        let (source, item_id) = match carried {
            Some(id) => (Source::Inventory, id),
            None => match self.get_room(&at)?.floor.find(&alias).map(Item::id) {
                Some(id) => (Source::Floor, id),
                None => {
                    self.tell(cid, Event::ItemNotHere { item: alias });
                    return Ok(());
                }
            },
        };
        let item = match source {
            Source::Inventory => self.character_mut(cid)?.inventory.remove(item_id),
            Source::Floor => self.room_mut(&at)?.floor.remove(item_id),
        }
        .ok_or(SimError::ItemNotFound)?;

        let view = item.view();
        let displaced = match self.character_mut(cid)?.rig.equip(item) {
            Ok(displaced) => displaced,
            Err(EquipError { item, reason }) => {
                self.put_back(cid, &at, source, item)?;
                return Err(reason);
            }
        };
        if let Some(old) = displaced {
            let old_view = old.view();
            self.stow(cid, &at, old)?;
            self.announce(
                &at,
                cid,
                Event::CharacterUnequipsItem {
                    character: character.clone(),
                    item: old_view,
                },
                true,
            );
        }
        self.announce(&at, cid, Event::CharacterEquipsItem { character, item: view }, true);
        Ok(())
    }

    fn unequip(&mut self, cid: CharacterId, alias: String) -> Result<(), SimError> {
        let (character, at) = self.actor(cid)?;
        let c = self.character_mut(cid)?;
        let Some(item_id) = c.rig.find(&alias).map(Item::id) else {
            self.tell(cid, Event::YouAreNotWearing { item: alias });
            return Ok(());
        };
        let item = c.rig.unequip(item_id)?;
        let view = item.view();
        self.stow(cid, &at, item)?;
        self.announce(&at, cid, Event::CharacterUnequipsItem { character, item: view }, true);
        Ok(())
    }

    fn look(&mut self, cid: CharacterId) -> Result<(), SimError> {
        let (_, at) = self.actor(cid)?;
        let room = self.room_view(&at, cid)?;
        self.tell(cid, Event::RoomDescription { room });
        Ok(())
    }

    fn inventory(&mut self, cid: CharacterId) -> Result<(), SimError> {
        let c = self.characters.get(&cid).ok_or(SimError::CharacterNotFound)?;
        let backpack = c.rig.backpack();
        let inventory = InventoryView {
            backpack: backpack.map(Item::view),
            backpack_contents: backpack
                .and_then(Item::container)
                .map(|b| b.sorted_items().into_iter().map(Item::view).collect())
                .unwrap_or_default(),
            items: c.inventory.sorted_items().into_iter().map(Item::view).collect(),
        };
        self.tell(cid, Event::InventoryDescription { inventory });
        Ok(())
    }

    fn admin_spawn(&mut self, cid: CharacterId, definition: ItemDefinitionId) -> Result<(), SimError> {
        let (character, at) = self.actor(cid)?;
        let floor = self.get_room(&at)?.floor.id();
        let item_id = self.spawn_item(definition, floor)?;
        let item = self
            .get_room(&at)?
            .floor
            .get(item_id)
            .map(Item::view)
            .ok_or(SimError::ItemNotFound)?;
        self.announce(&at, cid, Event::AdminSpawnsItem { character, item }, true);
        Ok(())
    }

    /// Into the inventory, or onto the floor when the inventory is full.
    fn stow(&mut self, cid: CharacterId, at: &RoomRef, item: Item) -> Result<(), SimError> {
        let Err(item) = self.character_mut(cid)?.inventory.put(item) else {
            return Ok(());
        };
        debug!(cid = %cid, item = %item.id(), "inventory full; item left on the floor");
        self.room_mut(at)?
            .floor
            .put(item)
            .map_err(|_| SimError::ContainerFull)
    }

    fn put_back(&mut self, cid: CharacterId, at: &RoomRef, source: Source, item: Item) -> Result<(), SimError> {
        match source {
            Source::Inventory => self.stow(cid, at, item),
            Source::Floor => self
                .room_mut(at)?
                .floor
                .put(item)
                .map_err(|_| SimError::ContainerFull),
        }
    }
}
