use crate::SimError;
use crate::container::{Container, ContainerId};
use crate::item::{Item, ItemId, RigSlot};

/// Items a character wears. Only the backpack slot exists today.
#[derive(Debug, Default)]
pub struct Rig {
    backpack: Option<Item>,
}

/// Equip refused; the item is handed back untouched.
#[derive(Debug)]
pub struct EquipError {
    pub item: Item,
    pub reason: SimError,
}

impl Rig {
    pub fn backpack(&self) -> Option<&Item> {
        self.backpack.as_ref()
    }

    /// Wears `item` in its slot and returns whatever was displaced.
    pub fn equip(&mut self, item: Item) -> Result<Option<Item>, EquipError> {
        match item.rig_slot() {
            Some(RigSlot::Backpack) => Ok(self.backpack.replace(item)),
            None => Err(EquipError {
                item,
                reason: SimError::NotEquipable,
            }),
        }
    }

    pub fn unequip(&mut self, id: ItemId) -> Result<Item, SimError> {
        if self.backpack.as_ref().is_some_and(|i| i.id() == id) {
            return self.backpack.take().ok_or(SimError::ItemNotInRig);
        }
        Err(SimError::ItemNotInRig)
    }

    pub fn find(&self, alias: &str) -> Option<&Item> {
        self.backpack.as_ref().filter(|i| i.known_as(alias))
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.backpack.iter()
    }

    pub fn find_container_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        self.backpack.as_mut()?.find_container_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::item::{ItemDefinition, ItemDefinitionId};

    fn pack(id: u64) -> Item {
        let def = Arc::new(
            ItemDefinition::new(ItemDefinitionId(1), "recon pack")
                .with_aliases(["pack"])
                .with_rig_slot(RigSlot::Backpack),
        );
        Item::new(ItemId(id), def, None)
    }

    #[test]
    fn equip_displaces_previous_backpack() {
        let mut rig = Rig::default();
        assert!(rig.equip(pack(1)).unwrap().is_none());
        let displaced = rig.equip(pack(2)).unwrap().unwrap();
        assert_eq!(displaced.id(), ItemId(1));
        assert_eq!(rig.backpack().map(|i| i.id()), Some(ItemId(2)));
        assert_eq!(rig.find("PACK").map(|i| i.id()), Some(ItemId(2)));
    }

    #[test]
    fn equip_rejects_items_without_slot() {
        let mut rig = Rig::default();
        let rock = Item::new(
            ItemId(5),
            Arc::new(ItemDefinition::new(ItemDefinitionId(2), "rock")),
            None,
        );
        let err = rig.equip(rock).unwrap_err();
        assert_eq!(err.reason, SimError::NotEquipable);
        assert_eq!(err.item.id(), ItemId(5));
        assert!(rig.backpack().is_none());
    }

    #[test]
    fn unequip_requires_the_worn_item() {
        let mut rig = Rig::default();
        assert_eq!(rig.unequip(ItemId(1)).unwrap_err(), SimError::ItemNotInRig);
        rig.equip(pack(1)).unwrap();
        assert_eq!(rig.unequip(ItemId(2)).unwrap_err(), SimError::ItemNotInRig);
        assert_eq!(rig.unequip(ItemId(1)).unwrap().id(), ItemId(1));
        assert!(rig.backpack().is_none());
    }
}
