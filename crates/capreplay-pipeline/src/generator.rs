use std::collections::VecDeque;
use std::iter::Fuse;

use crate::CommandRef;

/// Pull-based command source. Once `next` returns `None` it keeps returning `None`.
pub trait CommandGenerator<S> {
    fn next(&mut self) -> Option<CommandRef<S>>;
}

impl<S, G: CommandGenerator<S> + ?Sized> CommandGenerator<S> for Box<G> {
    fn next(&mut self) -> Option<CommandRef<S>> {
        (**self).next()
    }
}

/// Adapts any iterator of commands.
#[derive(Debug)]
pub struct IterGenerator<I: Iterator> {
    iter: Fuse<I>,
}

impl<I: Iterator> IterGenerator<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter().fuse(),
        }
    }
}

impl<S, I: Iterator<Item = CommandRef<S>>> CommandGenerator<S> for IterGenerator<I> {
    fn next(&mut self) -> Option<CommandRef<S>> {
        self.iter.next()
    }
}

/// Yields the commands that rebuild the capture's initial state, then the captured stream.
#[derive(Debug)]
pub struct LinearGenerator<S> {
    initial: VecDeque<CommandRef<S>>,
    commands: VecDeque<CommandRef<S>>,
    initial_len: usize,
}

impl<S> LinearGenerator<S> {
    pub fn new(initial: Vec<CommandRef<S>>, commands: Vec<CommandRef<S>>) -> Self {
        Self {
            initial_len: initial.len(),
            initial: initial.into(),
            commands: commands.into(),
        }
    }

    /// Number of state-rebuilding commands yielded before the captured stream; the first
    /// captured command gets this id.
    pub fn initial_len(&self) -> usize {
        self.initial_len
    }
}

impl<S> CommandGenerator<S> for LinearGenerator<S> {
    fn next(&mut self) -> Option<CommandRef<S>> {
        self.initial
            .pop_front()
            .or_else(|| self.commands.pop_front())
    }
}
