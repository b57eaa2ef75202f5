//! A small command set for pipeline integration tests: draws that log the pass they ran in,
//! pass begin/end commands, and nestable batches.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use capreplay_pipeline::{
    CmdId, Command, CommandError, CommandRef, Container, ReplayConfig, SimulationState,
    StateWriter, Transform, TransformError,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Toy {
    /// One entry per executed draw: `label@open/passes`.
    pub log: Vec<String>,
    pub open: Vec<&'static str>,
}

pub type ToyState = SimulationState<Toy>;
pub type ToyCmd = CommandRef<Toy>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn toy_state() -> ToyState {
    SimulationState::new(&ReplayConfig::default(), Toy::default())
}

pub fn toy_writer() -> StateWriter<Toy> {
    StateWriter::new(toy_state())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Draw(&'static str),
    BeginPass(&'static str),
    EndPass,
    /// Fails when applied.
    Broken,
}

impl Command<Toy> for Op {
    fn name(&self) -> &str {
        match self {
            Op::Draw(label) => label,
            Op::BeginPass(_) => "begin-pass",
            Op::EndPass => "end-pass",
            Op::Broken => "broken",
        }
    }

    fn mutate(&self, _id: CmdId, state: &mut ToyState) -> Result<(), CommandError> {
        let api = &mut state.api;
        match self {
            Op::Draw(label) => {
                let entry = format!("{label}@{}", api.open.join("/"));
                api.log.push(entry);
            }
            Op::BeginPass(label) => api.open.push(*label),
            Op::EndPass => {
                api.open
                    .pop()
                    .ok_or_else(|| CommandError::failed("end-pass", "no pass is open"))?;
            }
            Op::Broken => return Err(CommandError::failed("broken", "always fails")),
        }
        Ok(())
    }
}

pub fn draw(label: &'static str) -> ToyCmd {
    Arc::new(Op::Draw(label))
}

pub fn begin_pass(label: &'static str) -> ToyCmd {
    Arc::new(Op::BeginPass(label))
}

pub fn end_pass() -> ToyCmd {
    Arc::new(Op::EndPass)
}

/// A container whose passes must not span a cut: passes open after the first `at` children are
/// closed before the cut and begun again after it.
#[derive(Debug)]
pub struct Batch {
    pub label: &'static str,
    pub children: Vec<ToyCmd>,
}

pub fn batch(label: &'static str, children: Vec<ToyCmd>) -> ToyCmd {
    Arc::new(Batch { label, children })
}

impl Batch {
    /// Passes left open by the first `at` children, found by running them on a fresh state.
    fn open_passes(&self, at: u64) -> Vec<&'static str> {
        let mut state = toy_state();
        for child in self.children.iter().take(at as usize) {
            let _ = child.mutate(CmdId(0), &mut state);
        }
        state.api.open
    }
}

impl Command<Toy> for Batch {
    fn name(&self) -> &str {
        self.label
    }

    fn mutate(&self, id: CmdId, state: &mut ToyState) -> Result<(), CommandError> {
        self.children
            .iter()
            .try_for_each(|child| child.mutate(id, state))
    }

    fn as_container(&self) -> Option<&dyn Container<Toy>> {
        Some(self)
    }
}

impl Container<Toy> for Batch {
    fn child_count(&self) -> u64 {
        self.children.len() as u64
    }

    fn child(&self, index: u64) -> Option<ToyCmd> {
        self.children.get(usize::try_from(index).ok()?).cloned()
    }

    fn close_scope(&self, at: u64) -> Vec<ToyCmd> {
        self.open_passes(at).iter().map(|_| end_pass()).collect()
    }

    fn reopen_scope(&self, at: u64) -> Vec<ToyCmd> {
        self.open_passes(at).into_iter().map(begin_pass).collect()
    }

    fn rebuild(&self, children: Vec<ToyCmd>) -> ToyCmd {
        batch(self.label, children)
    }
}

/// Renders a command tree as a compact string, e.g. `submit[cb[a,b],c]`.
pub fn render(cmd: &ToyCmd) -> String {
    match cmd.as_container() {
        Some(container) => {
            let children: Vec<_> = (0..container.child_count())
                .filter_map(|i| container.child(i))
                .map(|child| render(&child))
                .collect();
            format!("{}[{}]", cmd.name(), children.join(","))
        }
        None => cmd.name().to_owned(),
    }
}

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Appends a draw named after itself to every phase's output and journals how many commands
/// the state had applied when it ran.
pub struct Recorder {
    pub name: &'static str,
    pub accurate: bool,
    pub journal: Journal,
    /// Ids this transform fails on.
    pub fail_on: Vec<CmdId>,
    pub fail_begin: bool,
}

impl Recorder {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            accurate: false,
            journal: journal.clone(),
            fail_on: Vec::new(),
            fail_begin: false,
        }
    }

    pub fn accurate(mut self) -> Self {
        self.accurate = true;
        self
    }

    pub fn failing_on(mut self, id: u64) -> Self {
        self.fail_on.push(CmdId(id));
        self
    }

    pub fn failing_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    fn note(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

impl Transform<Toy> for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn begin(
        &mut self,
        mut input: Vec<ToyCmd>,
        state: &ToyState,
    ) -> Result<Vec<ToyCmd>, TransformError> {
        self.note(format!("{} begin applied={}", self.name, state.applied()));
        if self.fail_begin {
            return Err(TransformError::Failed("begin refused".into()));
        }
        input.push(draw(self.name));
        Ok(input)
    }

    fn transform_command(
        &mut self,
        id: CmdId,
        mut input: Vec<ToyCmd>,
        state: &ToyState,
    ) -> Result<Vec<ToyCmd>, TransformError> {
        self.note(format!("{} cmd {id} applied={}", self.name, state.applied()));
        if self.fail_on.contains(&id) {
            return Err(TransformError::Failed(format!("{} rejects {id}", self.name)));
        }
        input.push(draw(self.name));
        Ok(input)
    }

    fn end(&mut self, input: Vec<ToyCmd>, state: &ToyState) -> Result<Vec<ToyCmd>, TransformError> {
        self.note(format!("{} end applied={}", self.name, state.applied()));
        Ok(input)
    }

    fn clear_resources(&mut self) {
        self.note(format!("{} clear", self.name));
    }

    fn requires_accurate_state(&self) -> bool {
        self.accurate
    }
}
