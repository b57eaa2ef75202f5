use std::fmt;
use std::sync::Arc;

use capreplay_memory::{DataRef, PoolId};

use crate::{CommandError, SimulationState};

/// Position of a command in the captured stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CmdId(pub u64);

impl CmdId {
    /// Id carried by commands produced outside the captured stream (`begin` / `end` output).
    pub const NONE: CmdId = CmdId(u64::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn next(self) -> CmdId {
        CmdId(self.0.saturating_add(1))
    }
}

impl fmt::Display for CmdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("<none>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// An opaque unit of work in a captured stream, generic over the API-specific part `S` of the
/// simulation state.
pub trait Command<S>: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Applies the command's side effects. Called only through a
    /// [`Writer`](crate::Writer), once the command is final.
    fn mutate(&self, id: CmdId, state: &mut SimulationState<S>) -> Result<(), CommandError>;

    fn as_container(&self) -> Option<&dyn Container<S>> {
        None
    }
}

/// Commands are shared by reference between transforms; rewriting never deep-copies them.
pub type CommandRef<S> = Arc<dyn Command<S>>;

/// A command made of an ordered list of child commands (a submission of command buffers, a
/// command buffer of commands, ...).
///
/// Scope methods take `at`, the number of leading children whose effects precede a cut. A
/// container that has no scoping rules keeps the default empty implementations.
pub trait Container<S>: Command<S> {
    fn child_count(&self) -> u64;

    fn child(&self, index: u64) -> Option<CommandRef<S>>;

    /// Commands that close whatever scope is open after the first `at` children.
    ///
    /// When the cut falls inside child `i`, `at` is `i + 1` even though only the front part of
    /// that child precedes the cut.
    fn close_scope(&self, _at: u64) -> Vec<CommandRef<S>> {
        Vec::new()
    }

    /// Commands that reopen the scope closed by [`Container::close_scope`] for the same `at`.
    fn reopen_scope(&self, _at: u64) -> Vec<CommandRef<S>> {
        Vec::new()
    }

    /// Builds a container of the same kind holding exactly `children`.
    fn rebuild(&self, children: Vec<CommandRef<S>>) -> CommandRef<S>;
}

/// Records `data` at `dst` in pool `pool`. Used by transforms to inject memory their
/// synthesized commands read.
#[derive(Debug, Clone)]
pub struct WriteMemory {
    pub pool: PoolId,
    pub dst: u64,
    pub data: DataRef,
}

impl<S> Command<S> for WriteMemory {
    fn name(&self) -> &str {
        "write-memory"
    }

    fn mutate(&self, _id: CmdId, state: &mut SimulationState<S>) -> Result<(), CommandError> {
        state
            .memory
            .get_or_create(self.pool)
            .write(self.dst, self.data.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use capreplay_memory::{Bytes, Range};

    use super::*;
    use crate::ReplayConfig;

    #[test]
    fn none_id_displays_as_placeholder() {
        assert_eq!(CmdId(4).to_string(), "4");
        assert_eq!(CmdId::NONE.to_string(), "<none>");
        assert_eq!(CmdId::NONE.next(), CmdId::NONE);
    }

    #[test]
    fn write_memory_creates_missing_pools() {
        let mut state = SimulationState::new(&ReplayConfig::default(), ());
        let cmd = WriteMemory {
            pool: PoolId(5),
            dst: 0x20,
            data: Bytes::from(vec![1u8, 2]).into_ref(),
        };
        Command::<()>::mutate(&cmd, CmdId(0), &mut state).unwrap();
        assert_eq!(
            state
                .memory
                .get(PoolId(5))
                .unwrap()
                .read(Range { base: 0x20, size: 2 })
                .unwrap(),
            vec![1, 2]
        );
    }
}
