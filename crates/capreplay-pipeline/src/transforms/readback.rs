use std::sync::Arc;

use capreplay_memory::{PoolId, Range};
use tracing::{debug, warn};

use crate::{
    CmdId, CommandRef, PostBack, PostBackError, ReadMemory, SimulationState, Transform,
    TransformError,
};

#[derive(Debug)]
struct Request {
    after: CmdId,
    pool: PoolId,
    range: Range,
    post: Arc<PostBack>,
}

/// Reads memory back at chosen points of the replay.
///
/// Each request injects a [`ReadMemory`] right after the output of its command, so the bytes
/// reflect the state once that command has been applied. Requests whose command never made it
/// to the writer are answered with [`PostBackError::NotReached`] at `end`.
#[derive(Debug, Default)]
pub struct Readback {
    requests: Vec<Request>,
}

impl Readback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, after: CmdId, pool: PoolId, range: Range, callback: F)
    where
        F: FnOnce(Result<Vec<u8>, PostBackError>) + Send + 'static,
    {
        self.requests.push(Request {
            after,
            pool,
            range,
            post: PostBack::new(callback),
        });
    }
}

impl<S> Transform<S> for Readback {
    fn name(&self) -> &str {
        "readback"
    }

    fn transform_command(
        &mut self,
        id: CmdId,
        mut input: Vec<CommandRef<S>>,
        _state: &SimulationState<S>,
    ) -> Result<Vec<CommandRef<S>>, TransformError> {
        for request in self.requests.iter().filter(|request| request.after == id) {
            debug!(%id, pool = %request.pool, range = %request.range, "injecting readback");
            input.push(Arc::new(ReadMemory {
                pool: request.pool,
                range: request.range,
                post: request.post.clone(),
            }));
        }
        Ok(input)
    }

    fn end(
        &mut self,
        input: Vec<CommandRef<S>>,
        _state: &SimulationState<S>,
    ) -> Result<Vec<CommandRef<S>>, TransformError> {
        for request in self.requests.drain(..) {
            if request.post.post(Err(PostBackError::NotReached)) {
                warn!(after = %request.after, range = %request.range, "readback never reached");
            }
        }
        Ok(input)
    }
}
