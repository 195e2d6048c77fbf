//! Room lifecycle hooks. The scripting runtime lives outside this crate and is
//! injected through [`ScriptHost`].

use std::sync::Arc;

use crate::character::CharacterId;
use crate::room::RoomRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hook {
    Enter,
    Wake,
    Exit,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Hook::Enter => "on_enter",
            Hook::Wake => "on_wake",
            Hook::Exit => "on_exit",
        }
    }
}

/// A compiled room script. Returning `Some(text)` narrates to that character.
///
/// Hooks run on the command loop, so they must return promptly.
pub trait RoomScript: Send + Sync {
    fn on_enter(&self, _cid: CharacterId) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn on_wake(&self, _cid: CharacterId) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn on_exit(&self, _cid: CharacterId) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

impl dyn RoomScript {
    pub fn call(&self, hook: Hook, cid: CharacterId) -> anyhow::Result<Option<String>> {
        match hook {
            Hook::Enter => self.on_enter(cid),
            Hook::Wake => self.on_wake(cid),
            Hook::Exit => self.on_exit(cid),
        }
    }
}

pub trait ScriptHost: Send + Sync {
    fn compile(&self, room: &RoomRef, source: &str) -> anyhow::Result<Arc<dyn RoomScript>>;
}
