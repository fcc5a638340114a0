// In-process host adapter.
//
// `SimSession` implements the host message contract on top of `SimState`:
// construct (`Init`, `Restore`), advance (`Update`), command
// (`ApplyCommand`), time controls (`SetTimeScale`, `Pause`, `Resume`),
// replay navigation (`Seek`) and reads (`QueryState`).
//
// Time controls live here, not in the sim. `Update` deltas are scaled by the
// time scale (and zeroed while paused) before reaching `SimState::step`; the
// fractional remainder carries over so that a 0.5× scale still delivers
// every millisecond eventually. When tactical pause is not allowed the scale
// cannot drop below 1.0, and a pause is an absolute stop: commands are
// refused and the real-time counter stops too.
//
// Static geometry is sent on the first state exposure after any
// construction or rehydration. The flag that tracks this lives in the
// session and is reset by every rebuild, never read from a snapshot.
//
// A `ReplayFile` (setup plus ordered command log) is enough to regenerate a
// mission. In Replay mode every command comes from that file; `Seek`
// rebuilds from the nearest earlier snapshot (or from scratch) and
// fast-forwards through ordinary steps.
//
// See also: `sim.rs` for `SimState`, `command.rs` for `CommandLogEntry`.

use crate::command::{CommandLogEntry, SimCommand};
use crate::config::GameConfig;
use crate::error::SimError;
use crate::event::SimEvent;
use crate::sim::{MissionSetup, SimState, Snapshot, WorldView};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to regenerate a mission deterministically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplayFile {
    #[serde(flatten)]
    pub setup: MissionSetup,
    pub commands: Vec<CommandLogEntry>,
}

impl ReplayFile {
    /// The replay of a mission so far.
    pub fn from_state(sim: &SimState) -> Self {
        Self {
            setup: sim.setup.clone(),
            commands: sim.command_log.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum HostMessage {
    /// Construct a fresh mission. In Replay mode `commands` is the recorded
    /// log; in Simulation mode a non-empty log is fast-forwarded to
    /// `resume_to`.
    Init {
        setup: MissionSetup,
        #[serde(default)]
        config: Option<GameConfig>,
        mode: EngineMode,
        #[serde(default)]
        commands: Vec<CommandLogEntry>,
        #[serde(default)]
        resume_to: u64,
        #[serde(default = "default_true")]
        allow_tactical_pause: bool,
    },
    /// Rehydrate from a snapshot and continue through `commands`.
    Restore {
        snapshot: Snapshot,
        #[serde(default)]
        commands: Vec<CommandLogEntry>,
    },
    Update {
        sim_delta_ms: u64,
        #[serde(default)]
        real_delta_ms: Option<u64>,
    },
    ApplyCommand { command: SimCommand },
    SetTimeScale { scale: f32 },
    Pause,
    Resume,
    /// Replay mode only.
    Seek { target_t: u64 },
    QueryState,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostResponse {
    State {
        view: Box<WorldView>,
        events: Vec<SimEvent>,
        /// Only filled in by `QueryState`.
        snapshots: Vec<Snapshot>,
    },
    CommandResult { accepted: bool },
    Ack,
}

pub struct SimSession {
    sim: SimState,
    replay: Option<ReplayFile>,
    geometry_sent: bool,
    carry_ms: f64,
}

impl SimSession {
    pub fn new(sim: SimState) -> Self {
        Self {
            sim,
            replay: None,
            geometry_sent: false,
            carry_ms: 0.0,
        }
    }

    /// Start a session from an `Init` or `Restore` message.
    pub fn open(message: HostMessage) -> Result<Self, SimError> {
        match message {
            HostMessage::Init {
                setup,
                config,
                mode,
                commands,
                resume_to,
                allow_tactical_pause,
            } => {
                let (sim, replay) =
                    init_state(setup, config, mode, commands, resume_to, allow_tactical_pause)?;
                let mut session = Self::new(sim);
                session.replay = replay;
                Ok(session)
            }
            HostMessage::Restore { snapshot, commands } => Ok(Self::new(
                SimState::from_snapshot(&snapshot, &commands, snapshot.t)?,
            )),
            _ => Err(SimError::InvalidConfig {
                reason: "a session must open with Init or Restore".into(),
            }),
        }
    }

    pub fn sim(&self) -> &SimState {
        &self.sim
    }

    pub fn replay_file(&self) -> ReplayFile {
        self.replay
            .clone()
            .unwrap_or_else(|| ReplayFile::from_state(&self.sim))
    }

    fn view(&mut self, events: Vec<SimEvent>, snapshots: Vec<Snapshot>) -> HostResponse {
        let view = self.sim.state_view(!self.geometry_sent);
        self.geometry_sent = true;
        HostResponse::State {
            view: Box::new(view),
            events,
            snapshots,
        }
    }

    /// Swap in a rebuilt state. The next exposure carries geometry again.
    fn replace(&mut self, sim: SimState) {
        self.sim = sim;
        self.geometry_sent = false;
        self.carry_ms = 0.0;
    }

    pub fn handle(&mut self, message: HostMessage) -> Result<HostResponse, SimError> {
        match message {
            HostMessage::Init {
                setup,
                config,
                mode,
                commands,
                resume_to,
                allow_tactical_pause,
            } => {
                let (sim, replay) =
                    init_state(setup, config, mode, commands, resume_to, allow_tactical_pause)?;
                self.replay = replay;
                self.replace(sim);
                Ok(self.view(Vec::new(), Vec::new()))
            }
            HostMessage::Restore { snapshot, commands } => {
                let sim = SimState::from_snapshot(&snapshot, &commands, snapshot.t)?;
                self.replay = None;
                self.replace(sim);
                Ok(self.view(Vec::new(), Vec::new()))
            }
            HostMessage::Update {
                sim_delta_ms,
                real_delta_ms,
            } => {
                let settings = &self.sim.settings;
                let hard_stop = settings.is_paused && !settings.allow_tactical_pause;
                let scale = if settings.is_paused {
                    0.0
                } else {
                    f64::from(settings.time_scale)
                };
                self.carry_ms += sim_delta_ms as f64 * scale;
                let delta = self.carry_ms.floor();
                self.carry_ms -= delta;
                let real = if hard_stop { None } else { real_delta_ms };
                let result = self.sim.step(delta as u64, real);
                Ok(self.view(result.events, Vec::new()))
            }
            HostMessage::ApplyCommand { command } => {
                let settings = &self.sim.settings;
                if settings.is_paused && !settings.allow_tactical_pause {
                    tracing::debug!(action = ?command.action, "command refused while stopped");
                    return Ok(HostResponse::CommandResult { accepted: false });
                }
                let accepted = self.sim.issue_command(command)?;
                Ok(HostResponse::CommandResult { accepted })
            }
            HostMessage::SetTimeScale { scale } => {
                let settings = &mut self.sim.settings;
                let floor = if settings.allow_tactical_pause { 0.0 } else { 1.0 };
                settings.time_scale = if scale.is_finite() { scale.max(floor) } else { 1.0 };
                Ok(HostResponse::Ack)
            }
            HostMessage::Pause => {
                self.sim.settings.is_paused = true;
                Ok(HostResponse::Ack)
            }
            HostMessage::Resume => {
                self.sim.settings.is_paused = false;
                Ok(HostResponse::Ack)
            }
            HostMessage::Seek { target_t } => {
                let Some(replay) = self.replay.clone() else {
                    return Err(SimError::ReplayOnly);
                };
                let nearest = self
                    .sim
                    .snapshots
                    .iter()
                    .filter(|s| s.t <= target_t)
                    .max_by_key(|s| s.t)
                    .cloned();
                let mut sim = match nearest {
                    Some(snapshot) => SimState::from_snapshot(&snapshot, &replay.commands, target_t)?,
                    None => SimState::resume(
                        replay.setup.clone(),
                        self.sim.config.clone(),
                        &replay.commands,
                        target_t,
                    )?,
                };
                // Snapshots from earlier playback stay valid for later seeks.
                let mut by_t: BTreeMap<u64, Snapshot> = std::mem::take(&mut self.sim.snapshots)
                    .into_iter()
                    .map(|s| (s.t, s))
                    .collect();
                for snapshot in sim.snapshots.drain(..) {
                    by_t.entry(snapshot.t).or_insert(snapshot);
                }
                sim.snapshots = by_t.into_values().collect();
                sim.settings = self.sim.settings.clone();
                tracing::debug!(target_t, reached = sim.t, "seek");
                self.replace(sim);
                Ok(self.view(Vec::new(), Vec::new()))
            }
            HostMessage::QueryState => {
                let snapshots = self.sim.snapshots.clone();
                Ok(self.view(Vec::new(), snapshots))
            }
        }
    }
}

/// Build the state for an `Init` message. Replay mode keeps the whole log
/// pending; Simulation mode fast-forwards through it.
fn init_state(
    setup: MissionSetup,
    config: Option<GameConfig>,
    mode: EngineMode,
    commands: Vec<CommandLogEntry>,
    resume_to: u64,
    allow_tactical_pause: bool,
) -> Result<(SimState, Option<ReplayFile>), SimError> {
    let replaying = mode == EngineMode::Replay;
    let target = if replaying { 0 } else { resume_to };
    let mut sim = SimState::resume(setup.clone(), config.unwrap_or_default(), &commands, target)?;
    sim.settings = Settings {
        mode,
        allow_tactical_pause,
        ..Settings::default()
    };
    let replay = replaying.then_some(ReplayFile { setup, commands });
    Ok((sim, replay))
}
