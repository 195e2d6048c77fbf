use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::item::{Item, ItemId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub u64);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a container is used for. All kinds behave the same.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Floor,
    Item,
    Inventory,
}

/// A set of items keyed by id. Items are owned by value, so an item can only
/// ever sit in one container.
#[derive(Debug)]
pub struct Container {
    id: ContainerId,
    kind: ContainerKind,
    capacity: Option<usize>,
    items: HashMap<ItemId, Item>,
}

impl Container {
    pub fn new(id: ContainerId, kind: ContainerKind) -> Self {
        Self {
            id,
            kind,
            capacity: None,
            items: HashMap::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_room(&self) -> bool {
        self.capacity.is_none_or(|cap| self.items.len() < cap)
    }

    /// Inserts the item, or hands it back when the container is full.
    pub fn put(&mut self, item: Item) -> Result<(), Item> {
        if !self.has_room() {
            return Err(item);
        }
        self.items.insert(item.id(), item);
        Ok(())
    }

    pub fn remove(&mut self, id: ItemId) -> Option<Item> {
        self.items.remove(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Items ordered by id, for stable listings.
    pub fn sorted_items(&self) -> Vec<&Item> {
        let mut xs = self.items.values().collect::<Vec<_>>();
        xs.sort_by_key(|i| i.id());
        xs
    }

    /// First item (lowest id) known by `alias`. Does not look inside nested containers.
    pub fn find(&self, alias: &str) -> Option<&Item> {
        self.items
            .values()
            .filter(|i| i.known_as(alias))
            .min_by_key(|i| i.id())
    }

    pub fn find_container_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        if self.id == id {
            return Some(self);
        }
        self.items
            .values_mut()
            .find_map(|item| item.find_container_mut(id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::item::{ContainerTemplate, ItemDefinition, ItemDefinitionId};

    fn item(id: u64, name: &str) -> Item {
        let def = Arc::new(ItemDefinition::new(ItemDefinitionId(7), name));
        Item::new(ItemId(id), def, None)
    }

    #[test]
    fn put_remove_and_find() {
        let mut c = Container::new(ContainerId(1), ContainerKind::Floor);
        assert!(c.is_empty());
        c.put(item(2, "Rock")).unwrap();
        c.put(item(1, "rock")).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.find("ROCK").map(|i| i.id()), Some(ItemId(1)));
        assert!(c.find("stick").is_none());

        let taken = c.remove(ItemId(1)).unwrap();
        assert_eq!(taken.id(), ItemId(1));
        assert!(!c.contains(ItemId(1)));
        assert!(c.remove(ItemId(1)).is_none());
    }

    #[test]
    fn full_container_hands_item_back() {
        let mut c = Container::new(ContainerId(1), ContainerKind::Inventory).with_capacity(Some(1));
        c.put(item(1, "a")).unwrap();
        assert!(!c.has_room());
        let back = c.put(item(2, "b")).unwrap_err();
        assert_eq!(back.id(), ItemId(2));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn finds_nested_containers() {
        let def = Arc::new(
            ItemDefinition::new(ItemDefinitionId(3), "crate").with_container(ContainerTemplate::default()),
        );
        let inner = Container::new(ContainerId(5), ContainerKind::Item);
        let mut floor = Container::new(ContainerId(1), ContainerKind::Floor);
        floor.put(Item::new(ItemId(10), def, Some(inner))).unwrap();

        assert_eq!(floor.find_container_mut(ContainerId(1)).map(|c| c.id()), Some(ContainerId(1)));
        let nested = floor.find_container_mut(ContainerId(5)).unwrap();
        assert_eq!(nested.kind(), ContainerKind::Item);
        assert!(floor.find_container_mut(ContainerId(6)).is_none());
    }
}
