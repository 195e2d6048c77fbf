use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::SimError;
use crate::character::{Character, CharacterId};
use crate::container::{Container, ContainerId, ContainerKind};
use crate::direction::Direction;
use crate::event::{CharacterView, Event, RoomView};
use crate::item::{Item, ItemDefinition, ItemDefinitionId, ItemId};
use crate::room::{Exit, Exits, Room, RoomRef, World, WorldFlags, WorldId};
use crate::script::{Hook, RoomScript};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimConfig {
    /// Per-character event outbox capacity while awake.
    pub outbox_capacity: usize,
    /// `None` means unbounded.
    pub inventory_capacity: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 32,
            inventory_capacity: Some(24),
        }
    }
}

/// The whole simulated universe. Every mutation goes through `&mut self`, so
/// whoever owns the value is the single writer.
#[derive(Debug)]
pub struct Simulation {
    pub(crate) cfg: SimConfig,
    pub(crate) worlds: HashMap<WorldId, World>,
    pub(crate) characters: HashMap<CharacterId, Character>,
    pub(crate) item_definitions: HashMap<ItemDefinitionId, Arc<ItemDefinition>>,
    pub(crate) spawn_room: Option<RoomRef>,
    pub(crate) next_character: u64,
    pub(crate) next_item: u64,
    pub(crate) next_container: u64,
    pub(crate) cursor: usize,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl Simulation {
    pub fn new(cfg: SimConfig) -> Self {
        Self {
            cfg,
            worlds: HashMap::new(),
            characters: HashMap::new(),
            item_definitions: HashMap::new(),
            spawn_room: None,
            next_character: 1,
            next_item: 1,
            next_container: 1,
            cursor: 0,
        }
    }

    pub(crate) fn alloc_container(&mut self) -> ContainerId {
        let id = ContainerId(self.next_container);
        self.next_container += 1;
        id
    }

    pub(crate) fn alloc_item(&mut self) -> ItemId {
        let id = ItemId(self.next_item);
        self.next_item += 1;
        id
    }

    /// Returns false when the world already existed; its flags are updated either way.
    pub fn create_world(&mut self, id: WorldId, flags: WorldFlags) -> bool {
        if let Some(w) = self.worlds.get_mut(&id) {
            w.flags = flags;
            return false;
        }
        info!(world = %id, alone = flags.alone, "world created");
        self.worlds.insert(
            id.clone(),
            World {
                id,
                flags,
                rooms: HashMap::new(),
            },
        );
        true
    }

    pub fn set_world_flags(&mut self, id: &WorldId, flags: WorldFlags) -> Result<(), SimError> {
        let w = self.worlds.get_mut(id).ok_or(SimError::WorldNotFound)?;
        w.flags = flags;
        Ok(())
    }

    /// Destroys the world with its rooms and floor items. Characters inside are
    /// moved to the spawn room when it survives.
    pub fn destroy_world(&mut self, id: &WorldId) -> Result<(), SimError> {
        let world = self.worlds.remove(id).ok_or(SimError::WorldNotFound)?;
        if self.spawn_room.as_ref().is_some_and(|s| &s.world == id) {
            warn!(world = %id, "spawn room destroyed with its world");
            self.spawn_room = None;
        }
        let mut stranded = world
            .rooms
            .values()
            .flat_map(|r| r.characters.iter().copied())
            .collect::<Vec<_>>();
        stranded.sort();
        info!(world = %id, rooms = world.rooms.len(), characters = stranded.len(), "world destroyed");
        self.evacuate(&stranded);
        Ok(())
    }

    pub fn world(&self, id: &WorldId) -> Option<&World> {
        self.worlds.get(id)
    }

    pub fn worlds(&self) -> impl Iterator<Item = &World> {
        self.worlds.values()
    }

    /// Creates a room with an empty floor. An existing room keeps its floor,
    /// presence list and exits; only its descriptive fields are replaced.
    pub fn create_room(
        &mut self,
        at: &RoomRef,
        name: impl Into<String>,
        region: Option<String>,
        description: impl Into<String>,
        script: Option<Arc<dyn RoomScript>>,
    ) -> Result<(), SimError> {
        if !self.worlds.contains_key(&at.world) {
            return Err(SimError::WorldNotFound);
        }
        let name = name.into();
        let description = description.into();
        if let Ok(room) = self.room_mut(at) {
            room.name = name;
            room.region = region;
            room.description = description;
            room.script = script;
            return Ok(());
        }

        let floor = Container::new(self.alloc_container(), ContainerKind::Floor);
        // Characters stranded by an earlier destroy reappear when their room does.
        let mut characters = self
            .characters
            .values()
            .filter(|c| &c.room == at)
            .map(|c| c.id())
            .collect::<Vec<_>>();
        characters.sort();
        let room = Room {
            id: at.room,
            world: at.world.clone(),
            name,
            region,
            description,
            exits: Exits::default(),
            floor,
            characters,
            script,
        };
        let world = self.worlds.get_mut(&at.world).ok_or(SimError::WorldNotFound)?;
        world.rooms.insert(at.room, room);
        info!(room = %at, "room created");
        Ok(())
    }

    /// Replaces the structural fields of a live room in place.
    pub fn update_room(
        &mut self,
        at: &RoomRef,
        name: impl Into<String>,
        region: Option<String>,
        description: impl Into<String>,
        exits: Exits,
        script: Option<Arc<dyn RoomScript>>,
    ) -> Result<(), SimError> {
        let room = self.room_mut(at)?;
        room.name = name.into();
        room.region = region;
        room.description = description.into();
        room.exits = exits;
        room.script = script;
        info!(room = %at, "room updated");
        Ok(())
    }

    pub fn destroy_room(&mut self, at: &RoomRef) -> Result<(), SimError> {
        let world = self.worlds.get_mut(&at.world).ok_or(SimError::WorldNotFound)?;
        let room = world.rooms.remove(&at.room).ok_or(SimError::RoomNotFound)?;
        if self.spawn_room.as_ref() == Some(at) {
            warn!(room = %at, "spawn room destroyed");
            self.spawn_room = None;
        }
        info!(room = %at, characters = room.characters.len(), items = room.floor.len(), "room destroyed");
        self.evacuate(&room.characters);
        Ok(())
    }

    fn evacuate(&mut self, cids: &[CharacterId]) {
        if cids.is_empty() {
            return;
        }
        let Some(spawn) = self.spawn_room.clone().filter(|s| self.get_room(s).is_ok()) else {
            warn!(characters = cids.len(), "no spawn room; characters left stranded");
            return;
        };
        for cid in cids {
            let Some(c) = self.characters.get_mut(cid) else {
                continue;
            };
            c.room = spawn.clone();
            if let Ok(room) = self.room_mut(&spawn) {
                room.add_character(*cid);
            }
            info!(cid = %cid, room = %spawn, "character evacuated");
            if let Ok(view) = self.room_view(&spawn, *cid) {
                self.tell(*cid, Event::RoomDescription { room: view });
            }
        }
    }

    pub fn get_room(&self, at: &RoomRef) -> Result<&Room, SimError> {
        self.worlds
            .get(&at.world)
            .ok_or(SimError::WorldNotFound)?
            .rooms
            .get(&at.room)
            .ok_or(SimError::RoomNotFound)
    }

    pub(crate) fn room_mut(&mut self, at: &RoomRef) -> Result<&mut Room, SimError> {
        self.worlds
            .get_mut(&at.world)
            .ok_or(SimError::WorldNotFound)?
            .rooms
            .get_mut(&at.room)
            .ok_or(SimError::RoomNotFound)
    }

    /// One-way; overwrites whatever the slot held. The destination is not checked.
    pub fn link_exit(&mut self, from: &RoomRef, dir: Direction, to: RoomRef) -> Result<(), SimError> {
        self.room_mut(from)?.exits.set(dir, Some(Exit { to }));
        Ok(())
    }

    pub fn set_spawn_room(&mut self, at: RoomRef) -> Result<(), SimError> {
        self.get_room(&at)?;
        self.spawn_room = Some(at);
        Ok(())
    }

    pub fn spawn_room(&self) -> Option<&RoomRef> {
        self.spawn_room.as_ref()
    }

    /// Inserts or replaces a catalog entry. Spawned items keep the entry they were made from.
    pub fn create_item_definition(&mut self, def: ItemDefinition) -> Arc<ItemDefinition> {
        let def = Arc::new(def);
        self.item_definitions.insert(def.id, def.clone());
        def
    }

    pub fn remove_item_definition(&mut self, id: ItemDefinitionId) -> Result<(), SimError> {
        self.item_definitions
            .remove(&id)
            .map(|_| ())
            .ok_or(SimError::ItemDefinitionNotFound)
    }

    pub fn item_definition(&self, id: ItemDefinitionId) -> Option<&Arc<ItemDefinition>> {
        self.item_definitions.get(&id)
    }

    pub fn item_definitions(&self) -> impl Iterator<Item = &Arc<ItemDefinition>> {
        self.item_definitions.values()
    }

    pub(crate) fn instantiate(&mut self, def: Arc<ItemDefinition>, id: Option<ItemId>) -> Item {
        let id = id.unwrap_or_else(|| self.alloc_item());
        let container = def.container.as_ref().map(|t| {
            Container::new(self.alloc_container(), ContainerKind::Item).with_capacity(t.capacity)
        });
        Item::new(id, def, container)
    }

    /// Spawns a fresh instance of `def` into the container `target`.
    pub fn spawn_item(&mut self, def: ItemDefinitionId, target: ContainerId) -> Result<ItemId, SimError> {
        let def = self
            .item_definitions
            .get(&def)
            .cloned()
            .ok_or(SimError::ItemDefinitionNotFound)?;
        match self.find_container_mut(target) {
            None => return Err(SimError::ContainerNotFound),
            Some(c) if !c.has_room() => return Err(SimError::ContainerFull),
            Some(_) => {}
        }
        let item = self.instantiate(def, None);
        let id = item.id();
        self.find_container_mut(target)
            .ok_or(SimError::ContainerNotFound)?
            .put(item)
            .map_err(|_| SimError::ContainerFull)?;
        Ok(id)
    }

    /// Searches every floor, inventory and rig, including nested containers.
    pub fn find_container_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        let Self {
            worlds, characters, ..
        } = self;
        worlds
            .values_mut()
            .flat_map(|w| w.rooms.values_mut())
            .find_map(|r| r.floor.find_container_mut(id))
            .or_else(|| {
                characters.values_mut().find_map(|c| {
                    c.inventory
                        .find_container_mut(id)
                        .or_else(|| c.rig.find_container_mut(id))
                })
            })
    }

    /// Registers a new, asleep character in the spawn room.
    pub fn make_character(&mut self, name: impl Into<String>) -> Result<CharacterId, SimError> {
        let spawn = self.spawn_room.clone().ok_or(SimError::NoSpawnRoom)?;
        self.get_room(&spawn).map_err(|_| SimError::NoSpawnRoom)?;
        let id = CharacterId(self.next_character);
        self.next_character += 1;
        let inventory = Container::new(self.alloc_container(), ContainerKind::Inventory)
            .with_capacity(self.cfg.inventory_capacity);
        let c = Character::new(id, name.into(), spawn.clone(), inventory);
        info!(cid = %id, name = %c.name(), room = %spawn, "character created");
        self.characters.insert(id, c);
        self.room_mut(&spawn)?.add_character(id);
        Ok(id)
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub(crate) fn character_mut(&mut self, id: CharacterId) -> Result<&mut Character, SimError> {
        self.characters.get_mut(&id).ok_or(SimError::CharacterNotFound)
    }

    /// The actor's public view and current room.
    pub(crate) fn actor(&self, id: CharacterId) -> Result<(CharacterView, RoomRef), SimError> {
        let c = self.characters.get(&id).ok_or(SimError::CharacterNotFound)?;
        Ok((c.view(), c.room.clone()))
    }

    pub fn find_item_in_room(&self, cid: CharacterId, alias: &str) -> Result<ItemId, SimError> {
        let c = self.characters.get(&cid).ok_or(SimError::CharacterNotFound)?;
        let room = self.get_room(&c.room)?;
        room.floor
            .find(alias)
            .map(Item::id)
            .ok_or(SimError::ItemNotFound)
    }

    pub fn find_item_in_inventory(&self, cid: CharacterId, alias: &str) -> Result<ItemId, SimError> {
        let c = self.characters.get(&cid).ok_or(SimError::CharacterNotFound)?;
        c.inventory
            .find(alias)
            .map(Item::id)
            .ok_or(SimError::ItemNotFound)
    }

    pub fn find_item_in_rig(&self, cid: CharacterId, alias: &str) -> Result<ItemId, SimError> {
        let c = self.characters.get(&cid).ok_or(SimError::CharacterNotFound)?;
        c.rig.find(alias).map(Item::id).ok_or(SimError::ItemNotFound)
    }

    pub(crate) fn tell(&self, cid: CharacterId, event: Event) {
        if let Some(c) = self.characters.get(&cid) {
            c.dispatch(event);
        }
    }

    fn is_alone(&self, at: &RoomRef) -> bool {
        self.worlds.get(&at.world).is_some_and(|w| w.flags.alone)
    }

    /// Room-wide delivery. In alone worlds only the actor can be a recipient.
    pub(crate) fn announce(&self, at: &RoomRef, actor: CharacterId, event: Event, include_actor: bool) {
        if self.is_alone(at) {
            if include_actor {
                self.tell(actor, event);
            }
            return;
        }
        let Ok(room) = self.get_room(at) else {
            return;
        };
        for cid in &room.characters {
            if *cid == actor && !include_actor {
                continue;
            }
            self.tell(*cid, event.clone());
        }
    }

    pub(crate) fn room_view(&self, at: &RoomRef, viewer: CharacterId) -> Result<RoomView, SimError> {
        let room = self.get_room(at)?;
        let characters = if self.is_alone(at) {
            Vec::new()
        } else {
            room.characters
                .iter()
                .filter(|cid| **cid != viewer)
                .filter_map(|cid| self.characters.get(cid))
                .filter(|c| c.is_awake())
                .map(Character::view)
                .collect()
        };
        Ok(RoomView {
            room: room.at(),
            name: room.name.clone(),
            region: room.region.clone(),
            description: room.description.clone(),
            exits: room.exits.iter().map(|(d, e)| (d, e.to.clone())).collect(),
            characters,
            items: room.floor.sorted_items().into_iter().map(Item::view).collect(),
        })
    }

    /// Runs a room hook. Failures are logged and otherwise ignored.
    pub(crate) fn run_hook(&self, at: &RoomRef, hook: Hook, cid: CharacterId) {
        let Some(script) = self.get_room(at).ok().and_then(|r| r.script.clone()) else {
            return;
        };
        match script.call(hook, cid) {
            Ok(Some(text)) => self.tell(cid, Event::Narration { text }),
            Ok(None) => {}
            Err(e) => warn!(room = %at, hook = hook.as_str(), cid = %cid, err = %e, "room script failed"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::item::{ContainerTemplate, RigSlot};
    use crate::room::RoomId;

    pub(crate) fn void() -> RoomRef {
        RoomRef::new("test", RoomId(0))
    }

    pub(crate) fn sim_with_void() -> Simulation {
        let mut sim = Simulation::default();
        sim.create_world(WorldId::from("test"), WorldFlags::default());
        sim.create_room(&void(), "Void", None, "Nothing here.", None).unwrap();
        sim.set_spawn_room(void()).unwrap();
        sim
    }

    pub(crate) fn drain(rx: &mut tokio::sync::mpsc::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    pub(crate) fn floor_id(sim: &Simulation, at: &RoomRef) -> ContainerId {
        sim.get_room(at).unwrap().floor().id()
    }

    #[test]
    fn create_room_requires_world() {
        let mut sim = Simulation::default();
        let err = sim
            .create_room(&RoomRef::new("nope", RoomId(1)), "x", None, "", None)
            .unwrap_err();
        assert_eq!(err, SimError::WorldNotFound);
        assert_eq!(sim.get_room(&RoomRef::new("nope", RoomId(1))).unwrap_err(), SimError::WorldNotFound);

        sim.create_world(WorldId::from("w"), WorldFlags::default());
        assert_eq!(sim.get_room(&RoomRef::new("w", RoomId(1))).unwrap_err(), SimError::RoomNotFound);
    }

    #[test]
    fn spawn_room_must_exist() {
        let mut sim = Simulation::default();
        assert_eq!(sim.make_character("x").unwrap_err(), SimError::NoSpawnRoom);
        sim.create_world(WorldId::from("w"), WorldFlags::default());
        assert_eq!(
            sim.set_spawn_room(RoomRef::new("w", RoomId(9))).unwrap_err(),
            SimError::RoomNotFound
        );
    }

    #[test]
    fn make_character_places_in_spawn_room() {
        let mut sim = sim_with_void();
        let a = sim.make_character("Sleepy").unwrap();
        let b = sim.make_character("Grumpy").unwrap();
        assert_ne!(a, b);
        let room = sim.get_room(&void()).unwrap();
        assert_eq!(room.characters(), &[a, b]);
        assert_eq!(sim.character(a).unwrap().room(), &void());
        assert!(!sim.character(a).unwrap().is_awake());
    }

    #[test]
    fn spawn_item_into_floor_and_nested_container() {
        let mut sim = sim_with_void();
        sim.create_item_definition(
            ItemDefinition::new(ItemDefinitionId(1), "CODA Recon Pack")
                .with_aliases(["recon pack", "pack"])
                .with_rig_slot(RigSlot::Backpack)
                .with_container(ContainerTemplate { capacity: Some(1) }),
        );
        sim.create_item_definition(ItemDefinition::new(ItemDefinitionId(2), "rock"));

        let floor = floor_id(&sim, &void());
        let pack = sim.spawn_item(ItemDefinitionId(1), floor).unwrap();
        let inner = sim
            .get_room(&void())
            .unwrap()
            .floor()
            .get(pack)
            .and_then(|i| i.container())
            .map(|c| c.id())
            .unwrap();

        let rock = sim.spawn_item(ItemDefinitionId(2), inner).unwrap();
        assert_ne!(rock, pack);
        assert_eq!(
            sim.spawn_item(ItemDefinitionId(2), inner).unwrap_err(),
            SimError::ContainerFull
        );
        assert_eq!(
            sim.spawn_item(ItemDefinitionId(2), ContainerId(999)).unwrap_err(),
            SimError::ContainerNotFound
        );
        assert_eq!(
            sim.spawn_item(ItemDefinitionId(3), floor).unwrap_err(),
            SimError::ItemDefinitionNotFound
        );
        assert_eq!(sim.get_room(&void()).unwrap().floor().len(), 1);
    }

    #[test]
    fn find_helpers_report_item_not_found() {
        let mut sim = sim_with_void();
        sim.create_item_definition(ItemDefinition::new(ItemDefinitionId(2), "rock"));
        let cid = sim.make_character("Sleepy").unwrap();
        let rock = sim.spawn_item(ItemDefinitionId(2), floor_id(&sim, &void())).unwrap();

        assert_eq!(sim.find_item_in_room(cid, "ROCK"), Ok(rock));
        assert_eq!(sim.find_item_in_inventory(cid, "rock"), Err(SimError::ItemNotFound));
        assert_eq!(sim.find_item_in_rig(cid, "rock"), Err(SimError::ItemNotFound));
        assert_eq!(
            sim.find_item_in_room(CharacterId(77), "rock"),
            Err(SimError::CharacterNotFound)
        );
    }

    #[test]
    fn destroying_a_room_evacuates_to_spawn() {
        let mut sim = sim_with_void();
        let hall = RoomRef::new("test", RoomId(1));
        sim.create_room(&hall, "Hall", None, "", None).unwrap();
        let cid = sim.make_character("Sleepy").unwrap();
        sim.room_mut(&void()).unwrap().remove_character(cid);
        sim.room_mut(&hall).unwrap().add_character(cid);
        sim.character_mut(cid).unwrap().room = hall.clone();

        sim.destroy_room(&hall).unwrap();
        assert_eq!(sim.character(cid).unwrap().room(), &void());
        assert!(sim.get_room(&void()).unwrap().has_character(cid));
        assert_eq!(sim.destroy_room(&hall).unwrap_err(), SimError::RoomNotFound);
    }

    #[test]
    fn destroying_the_spawn_world_strands_until_recreated() {
        let mut sim = sim_with_void();
        let cid = sim.make_character("Sleepy").unwrap();
        sim.destroy_world(&WorldId::from("test")).unwrap();
        assert!(sim.spawn_room().is_none());
        assert_eq!(sim.character(cid).unwrap().room(), &void());
        assert!(sim.world(&WorldId::from("test")).is_none());

        sim.create_world(WorldId::from("test"), WorldFlags::default());
        sim.create_room(&void(), "Void", None, "", None).unwrap();
        assert!(sim.get_room(&void()).unwrap().has_character(cid));
    }

    #[test]
    fn recreating_a_room_keeps_floor_and_presence() {
        let mut sim = sim_with_void();
        sim.create_item_definition(ItemDefinition::new(ItemDefinitionId(2), "rock"));
        let cid = sim.make_character("Sleepy").unwrap();
        sim.spawn_item(ItemDefinitionId(2), floor_id(&sim, &void())).unwrap();
        sim.link_exit(&void(), Direction::Up, RoomRef::new("sky", RoomId(1)))
            .unwrap();

        sim.create_room(&void(), "Still Void", Some("Edge".into()), "Changed.", None)
            .unwrap();
        let room = sim.get_room(&void()).unwrap();
        assert_eq!(room.name(), "Still Void");
        assert_eq!(room.region(), Some("Edge"));
        assert_eq!(room.floor().len(), 1);
        assert!(room.has_character(cid));
        assert!(room.exits().get(Direction::Up).is_some());
    }
}
