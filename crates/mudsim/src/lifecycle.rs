use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::SimError;
use crate::character::CharacterId;
use crate::event::{Command, Event};
use crate::script::Hook;
use crate::sim::Simulation;

impl Simulation {
    /// Attaches a session. Returns the character's event stream.
    pub fn wake(&mut self, cid: CharacterId) -> Result<mpsc::Receiver<Event>, SimError> {
        let c = self.characters.get(&cid).ok_or(SimError::CharacterNotFound)?;
        if c.is_awake() {
            return Err(SimError::CharacterAwake);
        }
        let mut at = c.room.clone();
        if self.get_room(&at).is_err() {
            let spawn = self
                .spawn_room
                .clone()
                .filter(|s| self.get_room(s).is_ok())
                .ok_or(SimError::RoomNotFound)?;
            warn!(cid = %cid, from = %at, to = %spawn, "waking in missing room; moving to spawn");
            at = spawn;
            self.character_mut(cid)?.room = at.clone();
        }
        self.room_mut(&at)?.add_character(cid);

        let cap = self.cfg.outbox_capacity;
        let c = self.character_mut(cid)?;
        let events = c.wake(cap);
        let view = c.view();
        info!(cid = %cid, name = %view.name, room = %at, "character woke");

        let room = self.room_view(&at, cid)?;
        self.tell(cid, Event::RoomDescription { room });
        self.announce(&at, cid, Event::CharacterWakes { character: view }, false);
        self.run_hook(&at, Hook::Wake, cid);
        Ok(events)
    }

    /// Detaches the session and closes the event stream.
    pub fn sleep(&mut self, cid: CharacterId) -> Result<(), SimError> {
        let c = self.character_mut(cid)?;
        if !c.is_awake() {
            return Err(SimError::CharacterAsleep);
        }
        c.sleep();
        let view = c.view();
        let at = c.room.clone();
        info!(cid = %cid, name = %view.name, room = %at, "character slept");

        self.announce(&at, cid, Event::CharacterSleeps { character: view }, false);
        self.run_hook(&at, Hook::Exit, cid);
        Ok(())
    }

    /// Offers a command without blocking. A character holds at most one
    /// pending command; further ones are dropped.
    pub fn queue_command(&mut self, cid: CharacterId, command: Command) -> Result<(), SimError> {
        let c = self.characters.get(&cid).ok_or(SimError::CharacterNotFound)?;
        if !c.is_awake() {
            return Err(SimError::CharacterAsleep);
        }
        let kind = command.kind();
        if !c.offer_command(command) {
            debug!(cid = %cid, cmd = kind, "command dropped");
        }
        Ok(())
    }
}
