use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use capreplay_memory::{MemoryError, PoolId, Range};
use thiserror::Error;

use crate::{CmdId, Command, CommandError, SimulationState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostBackError {
    #[error("the replay ended before the requested data was produced")]
    NotReached,

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

pub type PostBackResult = Result<Vec<u8>, PostBackError>;

type Callback = Box<dyn FnOnce(PostBackResult) + Send>;

/// A result callback that runs at most once, from whichever side posts first.
pub struct PostBack {
    callback: Mutex<Option<Callback>>,
}

impl PostBack {
    pub fn new<F>(callback: F) -> Arc<Self>
    where
        F: FnOnce(PostBackResult) + Send + 'static,
    {
        Arc::new(Self {
            callback: Mutex::new(Some(Box::new(callback))),
        })
    }

    /// Invokes the callback with `result`. Returns false if it already ran.
    pub fn post(&self, result: PostBackResult) -> bool {
        let callback = self.slot().take();
        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.slot().is_none()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Callback>> {
        // A panicking callback has already been taken out of the slot.
        self.callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for PostBack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostBack")
            .field("done", &self.is_done())
            .finish()
    }
}

/// Reads `range` from `pool` when applied and posts the bytes back.
#[derive(Debug, Clone)]
pub struct ReadMemory {
    pub pool: PoolId,
    pub range: Range,
    pub post: Arc<PostBack>,
}

impl<S> Command<S> for ReadMemory {
    fn name(&self) -> &str {
        "read-memory"
    }

    fn mutate(&self, _id: CmdId, state: &mut SimulationState<S>) -> Result<(), CommandError> {
        match state.read(self.pool, self.range) {
            Ok(bytes) => {
                self.post.post(Ok(bytes));
                Ok(())
            }
            Err(err) => {
                self.post.post(Err(err.clone().into()));
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::ReplayConfig;

    #[test]
    fn posts_at_most_once() {
        let (tx, rx) = mpsc::channel();
        let post = PostBack::new(move |result| tx.send(result).unwrap());
        assert!(!post.is_done());
        assert!(post.post(Ok(vec![1])));
        assert!(!post.post(Err(PostBackError::NotReached)));
        assert!(post.is_done());
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![Ok(vec![1])]);
    }

    #[test]
    fn read_memory_posts_the_bytes_it_reads() {
        let (tx, rx) = mpsc::channel();
        let mut state = SimulationState::new(&ReplayConfig::default(), ());
        state.memory.application_mut().write_bytes(4, vec![7u8, 8]).unwrap();

        let cmd = ReadMemory {
            pool: PoolId::APPLICATION,
            range: Range { base: 3, size: 4 },
            post: PostBack::new(move |result| tx.send(result).unwrap()),
        };
        Command::<()>::mutate(&cmd, CmdId(0), &mut state).unwrap();
        assert_eq!(rx.recv().unwrap(), Ok(vec![0, 7, 8, 0]));
    }

    #[test]
    fn read_memory_reports_missing_pools_to_both_sides() {
        let (tx, rx) = mpsc::channel();
        let mut state = SimulationState::new(&ReplayConfig::default(), ());
        let cmd = ReadMemory {
            pool: PoolId(3),
            range: Range { base: 0, size: 1 },
            post: PostBack::new(move |result| tx.send(result).unwrap()),
        };
        assert!(Command::<()>::mutate(&cmd, CmdId(0), &mut state).is_err());
        assert_eq!(
            rx.recv().unwrap(),
            Err(PostBackError::Memory(MemoryError::UnknownPool(PoolId(3))))
        );
    }
}
