use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::container::Container;
use crate::event::{CharacterView, Command, Event};
use crate::rig::Rig;
use crate::room::RoomRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub u64);

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channels that exist only while the character is awake.
#[derive(Debug)]
struct Session {
    inbox_tx: mpsc::Sender<Command>,
    inbox_rx: mpsc::Receiver<Command>,
    outbox: mpsc::Sender<Event>,
}

#[derive(Debug)]
pub struct Character {
    id: CharacterId,
    name: String,
    pub(crate) room: RoomRef,
    pub(crate) rig: Rig,
    pub(crate) inventory: Container,
    session: Option<Session>,
}

impl Character {
    pub(crate) fn new(id: CharacterId, name: String, room: RoomRef, inventory: Container) -> Self {
        Self {
            id,
            name,
            room,
            rig: Rig::default(),
            inventory,
            session: None,
        }
    }

    pub fn id(&self) -> CharacterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn room(&self) -> &RoomRef {
        &self.room
    }

    pub fn rig(&self) -> &Rig {
        &self.rig
    }

    pub fn inventory(&self) -> &Container {
        &self.inventory
    }

    pub fn is_awake(&self) -> bool {
        self.session.is_some()
    }

    pub fn view(&self) -> CharacterView {
        CharacterView {
            id: self.id,
            name: self.name.clone(),
        }
    }

    /// Opens a fresh session. The caller checks that the character is asleep.
    pub(crate) fn wake(&mut self, outbox_capacity: usize) -> mpsc::Receiver<Event> {
        let (inbox_tx, inbox_rx) = mpsc::channel(1);
        let (outbox, events) = mpsc::channel(outbox_capacity.max(1));
        self.session = Some(Session {
            inbox_tx,
            inbox_rx,
            outbox,
        });
        events
    }

    /// Drops the session; the client's event stream ends once drained.
    pub(crate) fn sleep(&mut self) {
        self.session = None;
    }

    /// Best-effort delivery. Asleep characters miss events silently.
    pub(crate) fn dispatch(&self, event: Event) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        match session.outbox.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                warn!(cid = %self.id, event = ev.kind(), "outbox full; dropping event");
            }
            Err(TrySendError::Closed(ev)) => {
                debug!(cid = %self.id, event = ev.kind(), "event stream closed");
            }
        }
    }

    /// Holds at most one pending command; extra commands are dropped.
    pub(crate) fn offer_command(&self, command: Command) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        match session.inbox_tx.try_send(command) {
            Ok(()) => true,
            Err(_) => {
                debug!(cid = %self.id, "command inbox full; dropping command");
                false
            }
        }
    }

    pub(crate) fn next_command(&mut self) -> Option<Command> {
        self.session.as_mut()?.inbox_rx.try_recv().ok()
    }
}
