use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::container::{Container, ContainerId};
use crate::event::ItemView;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemDefinitionId(pub u64);

impl fmt::Display for ItemDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instance id; independent of the definition id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RigSlot {
    Backpack,
}

impl RigSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            RigSlot::Backpack => "backpack",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "backpack" | "back" | "pack" => Some(RigSlot::Backpack),
            _ => None,
        }
    }
}

/// Template for the container an item carries (backpacks, chests).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerTemplate {
    pub capacity: Option<usize>,
}

/// Catalog entry. Never mutated once shared; reloads replace the whole entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemDefinition {
    pub id: ItemDefinitionId,
    pub name: String,
    pub aliases: Vec<String>,
    pub rig_slot: Option<RigSlot>,
    pub container: Option<ContainerTemplate>,
    pub weight: Option<u32>,
}

impl ItemDefinition {
    pub fn new(id: ItemDefinitionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            aliases: Vec::new(),
            rig_slot: None,
            container: None,
            weight: None,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rig_slot(mut self, slot: RigSlot) -> Self {
        self.rig_slot = Some(slot);
        self
    }

    pub fn with_container(mut self, template: ContainerTemplate) -> Self {
        self.container = Some(template);
        self
    }

    /// Case-insensitive match against the name and every alias.
    pub fn known_as(&self, alias: &str) -> bool {
        let t = alias.trim();
        if t.is_empty() {
            return false;
        }
        self.name.eq_ignore_ascii_case(t) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(t))
    }
}

#[derive(Debug)]
pub struct Item {
    id: ItemId,
    definition: Arc<ItemDefinition>,
    container: Option<Container>,
}

impl Item {
    /// `container` must be present iff the definition carries a container template;
    /// `Simulation` allocates the id for it.
    pub fn new(id: ItemId, definition: Arc<ItemDefinition>, container: Option<Container>) -> Self {
        Self {
            id,
            definition,
            container,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &Arc<ItemDefinition> {
        &self.definition
    }

    pub fn rig_slot(&self) -> Option<RigSlot> {
        self.definition.rig_slot
    }

    pub fn known_as(&self, alias: &str) -> bool {
        self.definition.known_as(alias)
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    pub fn container_mut(&mut self) -> Option<&mut Container> {
        self.container.as_mut()
    }

    /// Searches this item's own container and everything nested inside it.
    pub fn find_container_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        self.container.as_mut()?.find_container_mut(id)
    }

    pub fn view(&self) -> ItemView {
        ItemView {
            id: self.id,
            definition: self.definition.id,
            name: self.definition.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerKind;

    fn backpack_def() -> Arc<ItemDefinition> {
        Arc::new(
            ItemDefinition::new(ItemDefinitionId(1), "Test Item")
                .with_aliases(["test", "item"])
                .with_rig_slot(RigSlot::Backpack)
                .with_container(ContainerTemplate::default()),
        )
    }

    #[test]
    fn spawned_item_keeps_its_own_id() {
        let def = backpack_def();
        let item = Item::new(
            ItemId(333),
            def.clone(),
            Some(Container::new(ContainerId(9), ContainerKind::Item)),
        );
        assert_eq!(item.id(), ItemId(333));
        assert_eq!(item.definition().id, ItemDefinitionId(1));
        assert_eq!(item.name(), "Test Item");
        assert_eq!(item.rig_slot(), Some(RigSlot::Backpack));
        assert_eq!(item.container().map(|c| c.id()), Some(ContainerId(9)));
    }

    #[test]
    fn known_as_is_case_insensitive_over_name_and_aliases() {
        let item = Item::new(ItemId(333), backpack_def(), None);
        assert!(item.known_as("Test Item"));
        assert!(item.known_as("test ITEm"));
        assert!(item.known_as("test"));
        assert!(item.known_as("ITEm"));
        assert!(item.known_as("  item "));
        assert!(!item.known_as("something else"));
        assert!(!item.known_as(""));
    }

    #[test]
    fn rig_slot_parse_accepts_aliases() {
        assert_eq!(RigSlot::parse("Backpack"), Some(RigSlot::Backpack));
        assert_eq!(RigSlot::parse("back"), Some(RigSlot::Backpack));
        assert_eq!(RigSlot::parse("head"), None);
    }
}
