use tracing::debug;

use crate::{CmdId, CommandRef, SimulationState, Transform, TransformError};

/// Drops every command after `last`. `begin` and `end` output still passes through.
#[derive(Debug, Clone)]
pub struct EarlyTerminator {
    last: CmdId,
    dropped: u64,
}

impl EarlyTerminator {
    pub fn new(last: CmdId) -> Self {
        Self { last, dropped: 0 }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<S> Transform<S> for EarlyTerminator {
    fn name(&self) -> &str {
        "early-terminator"
    }

    fn transform_command(
        &mut self,
        id: CmdId,
        input: Vec<CommandRef<S>>,
        _state: &SimulationState<S>,
    ) -> Result<Vec<CommandRef<S>>, TransformError> {
        if id <= self.last {
            return Ok(input);
        }
        if self.dropped == 0 {
            debug!(%id, last = %self.last, "terminating stream");
        }
        self.dropped += 1;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{CutMarker, ReplayConfig, SubCmdIdx};

    #[test]
    fn keeps_commands_up_to_and_including_last() {
        let state = SimulationState::new(&ReplayConfig::default(), ());
        let mut terminator = EarlyTerminator::new(CmdId(1));
        let cmd = || -> Vec<CommandRef<()>> {
            let marker: CommandRef<()> = Arc::new(CutMarker {
                idx: SubCmdIdx::new(),
            });
            vec![marker]
        };

        for id in 0..4 {
            let out = terminator
                .transform_command(CmdId(id), cmd(), &state)
                .unwrap();
            assert_eq!(out.len(), usize::from(id <= 1));
        }
        assert_eq!(terminator.dropped(), 2);
        assert_eq!(Transform::<()>::end(&mut terminator, cmd(), &state).unwrap().len(), 1);
    }
}
