use std::fmt;

use capreplay_memory::{DecodeError, MemoryError};
use thiserror::Error;

use crate::{CmdId, SubCmdIdx};

/// Applying a command to the simulation state failed.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{command}: {message}")]
    Failed { command: String, message: String },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("downstream rejected the command: {0}")]
    Downstream(String),
}

impl CommandError {
    pub fn failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// A cut address does not match the shape of the command tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("cut {idx} descends into `{command}`, which is not a container")]
    NotAContainer { idx: SubCmdIdx, command: String },

    #[error("cut {idx} is out of range: `{command}` has {len} children")]
    OutOfRange {
        idx: SubCmdIdx,
        command: String,
        len: u64,
    },
}

/// A single transform phase call failed.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Structural(#[from] SplitError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl TransformError {
    /// Structural errors mean the command tree and the requested rewrite disagree; replaying
    /// further commands would not be meaningful.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Begin,
    Command,
    End,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Begin => "begin",
            Phase::Command => "transform_command",
            Phase::End => "end",
        })
    }
}

/// An error reported by [`TransformChain`](crate::TransformChain) for one phase.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("transform `{transform}` failed in {phase} (command {id}): {source}")]
    Transform {
        transform: String,
        phase: Phase,
        id: CmdId,
        #[source]
        source: TransformError,
    },

    #[error("failed to write command {id} (`{command}`): {source}")]
    Write {
        id: CmdId,
        command: String,
        #[source]
        source: CommandError,
    },
}

impl ReplayError {
    /// Whether the run must stop. Only a non-structural transform error raised while
    /// transforming a single command is recoverable.
    pub fn is_fatal(&self) -> bool {
        match self {
            ReplayError::Transform { phase, source, .. } => {
                *phase != Phase::Command || source.is_structural()
            }
            ReplayError::Write { .. } => true,
        }
    }
}

/// Where a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopPoint {
    Begin,
    Command(CmdId),
    End,
}

impl fmt::Display for StopPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopPoint::Begin => f.write_str("begin"),
            StopPoint::Command(id) => write!(f, "command {id}"),
            StopPoint::End => f.write_str("end"),
        }
    }
}

/// Returned by [`ControlFlow::run`](crate::ControlFlow::run) when the run aborts. Output
/// already written before `stopped_at` is not rolled back.
#[derive(Debug, Error)]
#[error("replay stopped at {stopped_at}: {source}")]
pub struct RunError {
    pub stopped_at: StopPoint,
    #[source]
    pub source: ReplayError,
}
