use tracing::debug;

use crate::{CmdId, CommandRef, Phase, ReplayError, SimulationState, Transform, Writer};

/// An ordered list of transforms feeding one [`Writer`].
///
/// Commands are applied to the state lazily: a phase's output is flushed once after the last
/// transform, plus once after every transform that asks for accurate state so the transforms
/// after it observe the mutation.
pub struct TransformChain<S, W> {
    transforms: Vec<Box<dyn Transform<S>>>,
    out: W,
}

impl<S, W: Writer<S>> TransformChain<S, W> {
    pub fn new(out: W) -> Self {
        Self {
            transforms: Vec::new(),
            out,
        }
    }

    pub fn with(mut self, transform: impl Transform<S> + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn push(&mut self, transform: Box<dyn Transform<S>>) {
        self.transforms.push(transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn state(&self) -> &SimulationState<S> {
        self.out.state()
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn into_writer(self) -> W {
        self.out
    }

    pub fn begin(&mut self) -> Result<(), ReplayError> {
        self.run_phase(Phase::Begin, CmdId::NONE, Vec::new())
    }

    pub fn transform_command(&mut self, id: CmdId, cmd: CommandRef<S>) -> Result<(), ReplayError> {
        self.run_phase(Phase::Command, id, vec![cmd])
    }

    pub fn end(&mut self) -> Result<(), ReplayError> {
        self.run_phase(Phase::End, CmdId::NONE, Vec::new())
    }

    fn run_phase(
        &mut self,
        phase: Phase,
        id: CmdId,
        cmds: Vec<CommandRef<S>>,
    ) -> Result<(), ReplayError> {
        let result = self.run_transforms(phase, id, cmds);
        for transform in &mut self.transforms {
            transform.clear_resources();
        }
        result
    }

    fn run_transforms(
        &mut self,
        phase: Phase,
        id: CmdId,
        mut cmds: Vec<CommandRef<S>>,
    ) -> Result<(), ReplayError> {
        for transform in &mut self.transforms {
            let state = self.out.state();
            let input = std::mem::take(&mut cmds);
            let output = match phase {
                Phase::Begin => transform.begin(input, state),
                Phase::Command => transform.transform_command(id, input, state),
                Phase::End => transform.end(input, state),
            };
            cmds = output.map_err(|source| ReplayError::Transform {
                transform: transform.name().to_owned(),
                phase,
                id,
                source,
            })?;

            if transform.requires_accurate_state() {
                debug!(%id, %phase, transform = transform.name(), count = cmds.len(), "flushing for accurate state");
                flush(&mut self.out, id, std::mem::take(&mut cmds))?;
                transform.clear_resources();
            }
        }
        flush(&mut self.out, id, cmds)
    }
}

fn flush<S, W: Writer<S>>(
    out: &mut W,
    id: CmdId,
    cmds: Vec<CommandRef<S>>,
) -> Result<(), ReplayError> {
    for cmd in cmds {
        out.mutate_and_write(id, cmd.clone())
            .map_err(|source| ReplayError::Write {
                id,
                command: cmd.name().to_owned(),
                source,
            })?;
    }
    Ok(())
}
