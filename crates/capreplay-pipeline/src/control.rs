use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    CmdId, CommandGenerator, ReplayError, RunError, SimulationState, StopPoint, TransformChain,
    Writer,
};

/// Cancellation flag shared between a running replay and whoever wants to stop it.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a completed (or cancelled) run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Commands pulled from the generator and handed to the chain.
    pub commands: u64,
    /// Commands whose output was dropped because a transform failed on them.
    pub failed: Vec<(CmdId, ReplayError)>,
    pub cancelled: bool,
}

/// Drives a generator through a transform chain: `begin`, one `transform_command` per
/// generated command, then `end`.
pub struct ControlFlow<S, G, W> {
    generator: G,
    chain: TransformChain<S, W>,
    stop: StopSignal,
    stop_on_transform_error: bool,
}

impl<S, G, W> ControlFlow<S, G, W>
where
    G: CommandGenerator<S>,
    W: Writer<S>,
{
    /// Takes the error policy from the state's [`ReplayConfig`](crate::ReplayConfig).
    pub fn new(generator: G, chain: TransformChain<S, W>) -> Self {
        let stop_on_transform_error = chain.state().stop_on_transform_error();
        Self {
            generator,
            chain,
            stop: StopSignal::new(),
            stop_on_transform_error,
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Overrides the configured error policy.
    pub fn stop_on_transform_error(mut self, stop: bool) -> Self {
        self.stop_on_transform_error = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> &SimulationState<S> {
        self.chain.state()
    }

    pub fn into_chain(self) -> TransformChain<S, W> {
        self.chain
    }

    /// Replays the whole stream.
    ///
    /// A transform error on a single command is logged and that command's output is dropped.
    /// Everything else aborts the run: failures in `begin` or `end`, structural errors, writer
    /// failures, and every transform error when `stop_on_transform_error` is set. A raised stop
    /// signal ends the loop between commands; `end` still runs.
    pub fn run(&mut self) -> Result<RunSummary, RunError> {
        info!(transforms = self.chain.len(), "replay started");
        self.chain
            .begin()
            .map_err(|source| abort(StopPoint::Begin, source))?;

        let mut summary = RunSummary::default();
        let mut id = CmdId(0);
        loop {
            if self.stop.is_stopped() {
                info!(%id, "replay cancelled");
                summary.cancelled = true;
                break;
            }
            let Some(cmd) = self.generator.next() else {
                break;
            };
            summary.commands += 1;
            match self.chain.transform_command(id, cmd) {
                Ok(()) => {}
                Err(err) if !err.is_fatal() && !self.stop_on_transform_error => {
                    warn!(%id, error = %err, "dropping command output");
                    summary.failed.push((id, err));
                }
                Err(source) => return Err(abort(StopPoint::Command(id), source)),
            }
            id = id.next();
        }

        self.chain
            .end()
            .map_err(|source| abort(StopPoint::End, source))?;
        info!(
            commands = summary.commands,
            failed = summary.failed.len(),
            cancelled = summary.cancelled,
            "replay finished"
        );
        Ok(summary)
    }
}

fn abort(stopped_at: StopPoint, source: ReplayError) -> RunError {
    error!(%stopped_at, error = %source, "replay aborted");
    RunError { stopped_at, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let signal = StopSignal::new();
        let handle = signal.clone();
        assert!(!signal.is_stopped());
        handle.stop();
        assert!(signal.is_stopped());
    }
}
