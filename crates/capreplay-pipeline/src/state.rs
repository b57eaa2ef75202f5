use capreplay_memory::{DataRef, MemoryError, MemoryLayout, PoolId, Pools, Range};
use serde::{Deserialize, Serialize};

use crate::{CmdId, CommandError, CommandRef};

/// Per-run replay configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Layout of the captured process. Fixed for the whole run.
    pub layout: MemoryLayout,
    /// Treat every transform error as fatal instead of dropping the command's output.
    pub stop_on_transform_error: bool,
}

/// The state one replay run operates on: the captured memory plus the API-specific state `S`.
///
/// Transforms only ever see `&SimulationState`; commands mutate it through
/// [`SimulationState::apply`], which a [`Writer`](crate::Writer) calls once per final command.
#[derive(Debug)]
pub struct SimulationState<S> {
    pub memory: Pools,
    pub api: S,
    layout: MemoryLayout,
    stop_on_transform_error: bool,
    applied: u64,
    last_applied: Option<CmdId>,
}

impl<S> SimulationState<S> {
    pub fn new(config: &ReplayConfig, api: S) -> Self {
        Self {
            memory: Pools::new(),
            api,
            layout: config.layout,
            stop_on_transform_error: config.stop_on_transform_error,
            applied: 0,
            last_applied: None,
        }
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// Whether the run was configured to abort on any transform error.
    pub fn stop_on_transform_error(&self) -> bool {
        self.stop_on_transform_error
    }

    /// A view of `range` in `pool`, suitable for a [`Decoder`](capreplay_memory::Decoder).
    pub fn slice(&self, pool: PoolId, range: Range) -> Result<DataRef, MemoryError> {
        self.memory.get(pool)?.slice(range)
    }

    pub fn read(&self, pool: PoolId, range: Range) -> Result<Vec<u8>, MemoryError> {
        self.memory.get(pool)?.read(range)
    }

    /// Runs `cmd`'s side effects and records it as applied. A failed command is not counted.
    pub fn apply(&mut self, id: CmdId, cmd: &CommandRef<S>) -> Result<(), CommandError> {
        cmd.mutate(id, self)?;
        self.applied += 1;
        self.last_applied = Some(id);
        Ok(())
    }

    /// Number of commands applied so far, injected ones included.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn last_applied(&self) -> Option<CmdId> {
        self.last_applied
    }
}
