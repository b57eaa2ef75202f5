//! Cutting container commands at nested addresses.
//!
//! A cut at `[id, i, j]` splits top-level command `id` right after grandchild `j` of child `i`.
//! Every container on the way down is rebuilt into pieces: the piece before the cut ends with
//! the container's scope-closing commands, the piece after starts with the commands that reopen
//! that scope. Top-level pieces are separated by a marker command.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    CmdId, Command, CommandError, CommandRef, Container, SimulationState, SplitError, SubCmdIdx,
    SubCmdIdxTrie, Transform, TransformError,
};

/// Marks the point where a command was cut. Has no effect on the state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CutMarker {
    pub idx: SubCmdIdx,
}

impl<S> Command<S> for CutMarker {
    fn name(&self) -> &str {
        "cut-marker"
    }

    fn mutate(&self, _id: CmdId, _state: &mut SimulationState<S>) -> Result<(), CommandError> {
        Ok(())
    }
}

type MarkerFn<S> = Box<dyn Fn(&SubCmdIdx) -> CommandRef<S>>;

/// Splits commands at requested sub-command addresses.
///
/// Cuts addressing a top-level command apply to the first container among the commands that
/// reach this transform for that id. A cut at just `[id]` places a marker after all of them.
pub struct Splitter<S> {
    cuts: Vec<SubCmdIdx>,
    marker: MarkerFn<S>,
    applied: usize,
}

impl<S> fmt::Debug for Splitter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Splitter")
            .field("cuts", &self.cuts)
            .field("applied", &self.applied)
            .finish_non_exhaustive()
    }
}

impl<S> Default for Splitter<S> {
    fn default() -> Self {
        Self::with_marker(|idx| Arc::new(CutMarker { idx: idx.clone() }) as CommandRef<S>)
    }
}

impl<S> Splitter<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `marker` to build the command placed between pieces, given the cut address.
    pub fn with_marker<F>(marker: F) -> Self
    where
        F: Fn(&SubCmdIdx) -> CommandRef<S> + 'static,
    {
        Self {
            cuts: Vec::new(),
            marker: Box::new(marker),
            applied: 0,
        }
    }

    /// Requests a cut right after the command at `sub_idx` inside top-level command `id`. An
    /// empty `sub_idx` cuts after `id` itself.
    pub fn add(&mut self, id: CmdId, sub_idx: SubCmdIdx) {
        self.cuts.push(SubCmdIdx::top(id).join(&sub_idx));
    }

    /// Cuts not yet matched by a command.
    pub fn pending(&self) -> &[SubCmdIdx] {
        &self.cuts
    }

    /// Cuts performed so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Splits the first container in `input` and puts a marker between its pieces.
    fn split_input(
        &mut self,
        id: CmdId,
        input: Vec<CommandRef<S>>,
        cuts: &SubCmdIdxTrie<SubCmdIdx>,
    ) -> Result<Vec<CommandRef<S>>, SplitError> {
        let Some(target) = input.iter().position(|cmd| cmd.as_container().is_some()) else {
            return Err(SplitError::NotAContainer {
                idx: first_nested_cut(cuts),
                command: input
                    .first()
                    .map_or_else(|| "<no command>".to_owned(), |cmd| cmd.name().to_owned()),
            });
        };

        let mut out = Vec::with_capacity(input.len() + 2);
        for (i, cmd) in input.into_iter().enumerate() {
            if i != target {
                out.push(cmd);
                continue;
            }
            let parts = split_child(&cmd, cuts)?;
            debug!(%id, command = cmd.name(), parts = parts.len(), "split command");
            for part in parts {
                match part {
                    Part::Piece(piece) => out.push(piece),
                    Part::Cut(idx) => {
                        out.push((self.marker)(&idx));
                        self.applied += 1;
                    }
                }
            }
        }
        Ok(out)
    }
}

impl<S> Transform<S> for Splitter<S> {
    fn name(&self) -> &str {
        "splitter"
    }

    fn transform_command(
        &mut self,
        id: CmdId,
        input: Vec<CommandRef<S>>,
        _state: &SimulationState<S>,
    ) -> Result<Vec<CommandRef<S>>, TransformError> {
        let top = SubCmdIdx::top(id);
        if !self.cuts.iter().any(|cut| cut.contains(&top)) {
            return Ok(input);
        }

        let mut cuts = SubCmdIdxTrie::new();
        let mut rest = Vec::with_capacity(self.cuts.len());
        for cut in std::mem::take(&mut self.cuts) {
            match cut.strip_prefix(&top) {
                Some(relative) => {
                    cuts.insert(&relative, cut);
                }
                None => rest.push(cut),
            }
        }
        self.cuts = rest;

        let mut out = if cuts.children().next().is_none() {
            input
        } else {
            self.split_input(id, input, &cuts)?
        };

        if let Some(cut) = cuts.value() {
            debug!(%id, "cut after command");
            out.push((self.marker)(cut));
            self.applied += 1;
        }
        Ok(out)
    }

    fn end(
        &mut self,
        input: Vec<CommandRef<S>>,
        _state: &SimulationState<S>,
    ) -> Result<Vec<CommandRef<S>>, TransformError> {
        if !self.cuts.is_empty() {
            warn!(count = self.cuts.len(), cuts = ?self.cuts, "cut requests never reached a command");
        }
        Ok(input)
    }
}

/// A split container: rebuilt pieces with the address of each cut between them. A cut after
/// the last child is not followed by a piece.
enum Part<S> {
    Piece(CommandRef<S>),
    Cut(SubCmdIdx),
}

/// Accumulates the children of the piece being built. `filled` tracks whether anything other
/// than scope-reopening commands went in since the last cut.
struct Pieces<'a, S> {
    container: &'a dyn Container<S>,
    parts: Vec<Part<S>>,
    pending: Vec<CommandRef<S>>,
    filled: bool,
}

impl<'a, S> Pieces<'a, S> {
    fn new(container: &'a dyn Container<S>) -> Self {
        Self {
            container,
            parts: Vec::new(),
            pending: Vec::new(),
            filled: false,
        }
    }

    fn push(&mut self, cmd: CommandRef<S>) {
        self.pending.push(cmd);
        self.filled = true;
    }

    /// Ends the current piece after the first `at` children. A cut coinciding with the
    /// previous one only adds its address.
    fn cut(&mut self, at: u64, idx: SubCmdIdx) {
        if !self.filled && !self.parts.is_empty() {
            self.parts.push(Part::Cut(idx));
            return;
        }
        self.pending.extend(self.container.close_scope(at));
        let piece = self.container.rebuild(std::mem::take(&mut self.pending));
        self.parts.push(Part::Piece(piece));
        self.parts.push(Part::Cut(idx));
        self.pending.extend(self.container.reopen_scope(at));
        self.filled = false;
    }

    fn finish(mut self) -> Vec<Part<S>> {
        if self.filled || self.parts.is_empty() {
            let piece = self.container.rebuild(self.pending);
            self.parts.push(Part::Piece(piece));
        }
        self.parts
    }
}

fn split_child<S>(
    child: &CommandRef<S>,
    cuts: &SubCmdIdxTrie<SubCmdIdx>,
) -> Result<Vec<Part<S>>, SplitError> {
    match child.as_container() {
        Some(container) => split_container(container, child.name(), cuts),
        None => Err(SplitError::NotAContainer {
            idx: first_nested_cut(cuts),
            command: child.name().to_owned(),
        }),
    }
}

/// `cuts` is the trie node for `container`: its children are keyed by child index, and each
/// stored value is the full address of a cut.
fn split_container<S>(
    container: &dyn Container<S>,
    name: &str,
    cuts: &SubCmdIdxTrie<SubCmdIdx>,
) -> Result<Vec<Part<S>>, SplitError> {
    let len = container.child_count();
    let out_of_range = |node: &SubCmdIdxTrie<SubCmdIdx>| SplitError::OutOfRange {
        idx: first_cut(node),
        command: name.to_owned(),
        len,
    };
    if let Some((_, node)) = cuts.children().find(|(index, _)| *index >= len) {
        return Err(out_of_range(node));
    }

    let mut pieces = Pieces::new(container);
    for index in 0..len {
        let child = container.child(index).ok_or_else(|| out_of_range(cuts))?;
        let Some(node) = cuts.child(index) else {
            pieces.push(child);
            continue;
        };

        if node.children().next().is_none() {
            pieces.push(child);
        } else {
            for part in split_child(&child, node)? {
                match part {
                    Part::Piece(piece) => pieces.push(piece),
                    Part::Cut(idx) => pieces.cut(index + 1, idx),
                }
            }
        }

        if let Some(idx) = node.value() {
            pieces.cut(index + 1, idx.clone());
        }
    }
    Ok(pieces.finish())
}

fn first_cut(node: &SubCmdIdxTrie<SubCmdIdx>) -> SubCmdIdx {
    node.values().first().map(|cut| (*cut).clone()).unwrap_or_default()
}

/// The first cut strictly below `node`.
fn first_nested_cut(node: &SubCmdIdxTrie<SubCmdIdx>) -> SubCmdIdx {
    node.children()
        .find_map(|(_, child)| child.values().first().map(|cut| (*cut).clone()))
        .unwrap_or_default()
}
