use tracing::trace;

use crate::{CmdId, CommandError, CommandRef, SimulationState, TransformError};

/// One stage of a rewriting pipeline.
///
/// Phase methods receive the commands produced by the previous stage (or the captured command,
/// for the first stage) and return what should take their place: any of the inputs, new
/// commands, or nothing. They never mutate `state`.
pub trait Transform<S> {
    fn name(&self) -> &str;

    fn begin(
        &mut self,
        input: Vec<CommandRef<S>>,
        _state: &SimulationState<S>,
    ) -> Result<Vec<CommandRef<S>>, TransformError> {
        Ok(input)
    }

    fn transform_command(
        &mut self,
        id: CmdId,
        input: Vec<CommandRef<S>>,
        state: &SimulationState<S>,
    ) -> Result<Vec<CommandRef<S>>, TransformError>;

    fn end(
        &mut self,
        input: Vec<CommandRef<S>>,
        _state: &SimulationState<S>,
    ) -> Result<Vec<CommandRef<S>>, TransformError> {
        Ok(input)
    }

    /// Releases scratch allocations made during the last phase. Called after every phase, also
    /// after failed ones, and possibly more than once per phase.
    fn clear_resources(&mut self) {}

    /// When true, everything produced up to and including this stage is applied to the state
    /// before the next stage runs.
    fn requires_accurate_state(&self) -> bool {
        false
    }
}

/// The end of a [`TransformChain`](crate::TransformChain): applies final commands to the state
/// and forwards them downstream, in order.
pub trait Writer<S> {
    fn state(&self) -> &SimulationState<S>;

    fn mutate_and_write(&mut self, id: CmdId, cmd: CommandRef<S>) -> Result<(), CommandError>;
}

type Downstream<S> = Box<dyn FnMut(CmdId, &CommandRef<S>) -> Result<(), CommandError>>;

/// A [`Writer`] that owns the state and keeps the final stream in memory, optionally handing
/// every command to a downstream sink as well.
pub struct StateWriter<S> {
    state: SimulationState<S>,
    written: Vec<(CmdId, CommandRef<S>)>,
    downstream: Option<Downstream<S>>,
}

impl<S> StateWriter<S> {
    pub fn new(state: SimulationState<S>) -> Self {
        Self {
            state,
            written: Vec::new(),
            downstream: None,
        }
    }

    /// Forwards each command to `sink` after it has been applied. A sink error stops that
    /// command from being recorded.
    pub fn with_downstream<F>(mut self, sink: F) -> Self
    where
        F: FnMut(CmdId, &CommandRef<S>) -> Result<(), CommandError> + 'static,
    {
        self.downstream = Some(Box::new(sink));
        self
    }

    pub fn written(&self) -> &[(CmdId, CommandRef<S>)] {
        &self.written
    }

    pub fn into_parts(self) -> (SimulationState<S>, Vec<(CmdId, CommandRef<S>)>) {
        (self.state, self.written)
    }
}

impl<S> Writer<S> for StateWriter<S> {
    fn state(&self) -> &SimulationState<S> {
        &self.state
    }

    fn mutate_and_write(&mut self, id: CmdId, cmd: CommandRef<S>) -> Result<(), CommandError> {
        self.state.apply(id, &cmd)?;
        if let Some(sink) = self.downstream.as_mut() {
            sink(id, &cmd)?;
        }
        trace!(%id, command = cmd.name(), "wrote command");
        self.written.push((id, cmd));
        Ok(())
    }
}
