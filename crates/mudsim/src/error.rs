use thiserror::Error;

/// Errors returned by the simulation's public entrypoints.
///
/// Not-found variants mean the referenced entity does not currently exist,
/// `CharacterAwake`/`CharacterAsleep` mean the call is invalid for the
/// character's lifecycle state, and the rest are gameplay rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("character not found")]
    CharacterNotFound,
    #[error("character is already awake")]
    CharacterAwake,
    #[error("character is asleep")]
    CharacterAsleep,
    #[error("world not found")]
    WorldNotFound,
    #[error("room not found")]
    RoomNotFound,
    #[error("container not found")]
    ContainerNotFound,
    #[error("container is full")]
    ContainerFull,
    #[error("item not found")]
    ItemNotFound,
    #[error("item definition not found")]
    ItemDefinitionNotFound,
    #[error("item is not equipable")]
    NotEquipable,
    #[error("item is not in the rig")]
    ItemNotInRig,
    #[error("invalid direction: {0:?}")]
    InvalidDirection(String),
    #[error("no spawn room configured")]
    NoSpawnRoom,
    #[error("simulation engine stopped")]
    EngineStopped,
}

impl SimError {
    /// Gameplay rule violations, as opposed to references to missing entities.
    pub fn is_rule(&self) -> bool {
        matches!(
            self,
            SimError::NotEquipable | SimError::ItemNotInRig | SimError::ContainerFull
        )
    }
}
