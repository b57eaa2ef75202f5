//! Replaying captured command streams through chains of rewriting transforms.
//!
//! A [`ControlFlow`] pulls commands from a [`CommandGenerator`] and pushes each one through a
//! [`TransformChain`]. Every [`Transform`] in the chain may drop, replace or inject commands;
//! whatever leaves the last transform reaches a [`Writer`], which applies it to the run's
//! [`SimulationState`] and forwards it downstream.
//!
//! Commands can be addressed below the top level with [`SubCmdIdx`], and the [`Splitter`]
//! transform cuts container commands at such addresses.

#![forbid(unsafe_code)]

mod chain;
mod command;
mod control;
mod error;
mod generator;
mod postback;
mod scratch;
mod split;
mod state;
mod sub_cmd_idx;
mod transform;
pub mod transforms;

pub use chain::TransformChain;
pub use command::{CmdId, Command, CommandRef, Container, WriteMemory};
pub use control::{ControlFlow, RunSummary, StopSignal};
pub use error::{
    CommandError, Phase, ReplayError, RunError, SplitError, StopPoint, TransformError,
};
pub use generator::{CommandGenerator, IterGenerator, LinearGenerator};
pub use postback::{PostBack, PostBackError, PostBackResult, ReadMemory};
pub use scratch::ScratchMemory;
pub use split::{CutMarker, Splitter};
pub use state::{ReplayConfig, SimulationState};
pub use sub_cmd_idx::{SubCmdIdx, SubCmdIdxTrie};
pub use transform::{StateWriter, Transform, Writer};
