//! The single-writer actor. One task owns the [`Simulation`]; everyone else
//! talks to it through an [`EngineHandle`].

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::SimError;
use crate::character::CharacterId;
use crate::event::{Command, Event};
use crate::patch::WorldPatch;
use crate::persistence::WorldSnapshot;
use crate::sim::Simulation;

const REQUEST_QUEUE: usize = 1024;

enum Request {
    MakeCharacter {
        name: String,
        reply: oneshot::Sender<Result<CharacterId, SimError>>,
    },
    Wake {
        cid: CharacterId,
        reply: oneshot::Sender<Result<mpsc::Receiver<Event>, SimError>>,
    },
    Sleep {
        cid: CharacterId,
        reply: oneshot::Sender<Result<(), SimError>>,
    },
    Queue {
        cid: CharacterId,
        command: Command,
        reply: oneshot::Sender<Result<(), SimError>>,
    },
    Snapshot {
        reply: oneshot::Sender<WorldSnapshot>,
    },
    Patch {
        patches: Vec<WorldPatch>,
        reply: oneshot::Sender<Vec<(String, SimError)>>,
    },
}

pub struct Engine {
    sim: Simulation,
    rx: mpsc::Receiver<Request>,
    tick: Duration,
}

#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Request>,
}

impl Engine {
    pub fn new(sim: Simulation, tick: Duration) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        (
            Self {
                sim,
                rx,
                tick: tick.max(Duration::from_millis(1)),
            },
            EngineHandle { tx },
        )
    }

    /// Runs until every handle is dropped, then hands the simulation back.
    pub async fn run(mut self) -> Simulation {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_ms = self.tick.as_millis() as u64, "engine started");

        loop {
            tokio::select! {
                req = self.rx.recv() => {
                    let Some(req) = req else {
                        break;
                    };
                    self.handle(req);
                }
                _ = ticker.tick() => {}
            }
            let n = self.sim.process_commands();
            if n > 0 {
                debug!(commands = n, "processed");
            }
        }

        info!("engine stopped");
        self.sim
    }

    fn handle(&mut self, req: Request) {
        match req {
            Request::MakeCharacter { name, reply } => {
                let _ = reply.send(self.sim.make_character(name));
            }
            Request::Wake { cid, reply } => {
                // The caller gave up; nobody holds the outbox, so undo the wake.
                if let Err(Ok(_)) = reply.send(self.sim.wake(cid)) {
                    debug!(cid = %cid, "wake abandoned by caller; putting back to sleep");
                    let _ = self.sim.sleep(cid);
                }
            }
            Request::Sleep { cid, reply } => {
                let _ = reply.send(self.sim.sleep(cid));
            }
            Request::Queue {
                cid,
                command,
                reply,
            } => {
                let _ = reply.send(self.sim.queue_command(cid, command));
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.sim.snapshot());
            }
            Request::Patch { patches, reply } => {
                let _ = reply.send(self.sim.apply_patches(patches));
            }
        }
    }
}

impl EngineHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T, SimError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| SimError::EngineStopped)?;
        rx.await.map_err(|_| SimError::EngineStopped)
    }

    pub async fn make_character(&self, name: impl Into<String>) -> Result<CharacterId, SimError> {
        let name = name.into();
        self.call(|reply| Request::MakeCharacter { name, reply }).await?
    }

    pub async fn wake(&self, cid: CharacterId) -> Result<mpsc::Receiver<Event>, SimError> {
        self.call(|reply| Request::Wake { cid, reply }).await?
    }

    pub async fn sleep(&self, cid: CharacterId) -> Result<(), SimError> {
        self.call(|reply| Request::Sleep { cid, reply }).await?
    }

    pub async fn queue_command(&self, cid: CharacterId, command: Command) -> Result<(), SimError> {
        self.call(|reply| Request::Queue {
            cid,
            command,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<WorldSnapshot, SimError> {
        self.call(|reply| Request::Snapshot { reply }).await
    }

    /// Returns the patches that failed, labelled.
    pub async fn apply_patches(&self, patches: Vec<WorldPatch>) -> Result<Vec<(String, SimError)>, SimError> {
        self.call(|reply| Request::Patch { patches, reply }).await
    }
}
