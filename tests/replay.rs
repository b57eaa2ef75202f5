//! End-to-end replays of a miniature graphics API whose commands read their parameters from
//! captured memory.

use std::sync::{mpsc, Arc};

use capreplay_memory::{Decoder, Encoder, MemoryLayout, PoolId, Range};
use capreplay_pipeline::{
    transforms::{EarlyTerminator, Readback},
    CmdId, Command, CommandError, CommandRef, Container, ControlFlow,
    IterGenerator, PostBackResult, ReplayConfig, ReplayError, ScratchMemory,
    SimulationState, Splitter, StateWriter, StopPoint, SubCmdIdx, Transform, TransformChain,
    TransformError, WriteMemory,
};
use pretty_assertions::assert_eq;

/// Where every fill stores its value; readbacks observe the last one.
const FRAMEBUFFER: u64 = 0x9000;

#[derive(Debug, Default)]
struct Gpu {
    fills: Vec<String>,
}

type GpuCmd = CommandRef<Gpu>;

/// `struct { uint32_t value; const char *label; }` at `params`.
#[derive(Debug)]
struct Fill {
    params: u64,
}

impl Command<Gpu> for Fill {
    fn name(&self) -> &str {
        "fill"
    }

    fn mutate(&self, _id: CmdId, state: &mut SimulationState<Gpu>) -> Result<(), CommandError> {
        let layout = *state.layout();
        let params = state.slice(PoolId::APPLICATION, Range::until_end(self.params))?;
        let mut d = Decoder::new(&*params, layout);
        let value = d.u32();
        let label_at = d.pointer();
        d.check()?;

        let label = state.slice(PoolId::APPLICATION, Range::until_end(label_at))?;
        let mut d = Decoder::new(&*label, layout);
        let label = d.string();
        d.check()?;

        state.api.fills.push(format!("{label}={value}"));
        state
            .memory
            .application_mut()
            .write_bytes(FRAMEBUFFER, &value.to_le_bytes()[..])?;
        Ok(())
    }
}

#[derive(Debug)]
struct Submit(Vec<GpuCmd>);

impl Command<Gpu> for Submit {
    fn name(&self) -> &str {
        "submit"
    }

    fn mutate(&self, id: CmdId, state: &mut SimulationState<Gpu>) -> Result<(), CommandError> {
        for cmd in &self.0 {
            cmd.mutate(id, state)?;
        }
        Ok(())
    }

    fn as_container(&self) -> Option<&dyn Container<Gpu>> {
        Some(self)
    }
}

impl Container<Gpu> for Submit {
    fn child_count(&self) -> u64 {
        self.0.len() as u64
    }

    fn child(&self, index: u64) -> Option<GpuCmd> {
        self.0.get(usize::try_from(index).ok()?).cloned()
    }

    fn rebuild(&self, children: Vec<GpuCmd>) -> GpuCmd {
        Arc::new(Submit(children))
    }
}

/// After each listed command, injects a `highlight` fill whose value is derived from the
/// framebuffer as it was before that command ran.
struct Highlight {
    at: Vec<CmdId>,
    scratch: ScratchMemory,
}

impl Highlight {
    fn new(at: Vec<CmdId>) -> Self {
        Self {
            at,
            scratch: ScratchMemory::new(0xf000_0000),
        }
    }
}

impl Transform<Gpu> for Highlight {
    fn name(&self) -> &str {
        "highlight"
    }

    fn transform_command(
        &mut self,
        id: CmdId,
        mut input: Vec<GpuCmd>,
        state: &SimulationState<Gpu>,
    ) -> Result<Vec<GpuCmd>, TransformError> {
        if !self.at.contains(&id) {
            return Ok(input);
        }
        let current = state.read(PoolId::APPLICATION, Range::new(FRAMEBUFFER, 4)?)?;
        let current = <[u8; 4]>::try_from(current.as_slice())
            .map_err(|_| TransformError::Failed("short framebuffer read".into()))?;

        let (label, label_data) = self.scratch.alloc(&b"highlight\0"[..], 1)?;
        let mut params = Encoder::new(*state.layout())?;
        params.u32(u32::from_le_bytes(current) + 100);
        params.pointer(label.base);
        let (params, params_data) = self.scratch.alloc(params.into_data(), 4)?;

        input.push(Arc::new(WriteMemory {
            pool: PoolId::APPLICATION,
            dst: label.base,
            data: label_data,
        }));
        input.push(Arc::new(WriteMemory {
            pool: PoolId::APPLICATION,
            dst: params.base,
            data: params_data,
        }));
        input.push(Arc::new(Fill {
            params: params.base,
        }));
        Ok(input)
    }

    fn clear_resources(&mut self) {
        self.scratch.clear();
    }

    fn requires_accurate_state(&self) -> bool {
        true
    }
}

fn config() -> ReplayConfig {
    ReplayConfig {
        layout: MemoryLayout::ARMV7A,
        ..ReplayConfig::default()
    }
}

fn write(dst: u64, bytes: Vec<u8>) -> GpuCmd {
    Arc::new(WriteMemory {
        pool: PoolId::APPLICATION,
        dst,
        data: capreplay_memory::Bytes::from(bytes).into_ref(),
    })
}

fn params(value: u32, label: u64) -> Vec<u8> {
    let mut enc = Encoder::new(config().layout).unwrap();
    enc.u32(value);
    enc.pointer(label);
    enc.into_bytes()
}

fn fill(params: u64) -> GpuCmd {
    Arc::new(Fill { params })
}

/// 0-3 set up labels and parameter blocks, 4 submits two fills, 5 and 6 repeat them.
fn capture() -> Vec<GpuCmd> {
    vec![
        write(0x2000, b"sky\0".to_vec()),
        write(0x2010, b"sea\0".to_vec()),
        write(0x1000, params(1, 0x2000)),
        write(0x1010, params(2, 0x2010)),
        Arc::new(Submit(vec![fill(0x1000), fill(0x1010)])),
        fill(0x1000),
        fill(0x1010),
    ]
}

fn u32_result(result: &PostBackResult) -> Option<u32> {
    let bytes = result.as_ref().ok()?;
    Some(u32::from_le_bytes(<[u8; 4]>::try_from(bytes.as_slice()).ok()?))
}

#[test]
fn transforms_compose_over_a_memory_backed_stream() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let (tx, rx) = mpsc::channel();
    let mut readback = Readback::new();
    for after in [4, 6, 9] {
        let tx = tx.clone();
        readback.add(
            CmdId(after),
            PoolId::APPLICATION,
            Range::new(FRAMEBUFFER, 4).unwrap(),
            move |result| {
                let _ = tx.send((after, result));
            },
        );
    }
    drop(tx);

    let mut splitter = Splitter::new();
    splitter.add(CmdId(4), SubCmdIdx::from(vec![0]));

    let state = SimulationState::new(&config(), Gpu::default());
    let chain = TransformChain::new(StateWriter::new(state))
        .with(EarlyTerminator::new(CmdId(5)))
        .with(splitter)
        .with(readback)
        .with(Highlight::new(vec![CmdId(5)]));
    let mut flow = ControlFlow::new(IterGenerator::new(capture()), chain);

    let summary = flow.run().unwrap();
    assert_eq!(summary.commands, 7);
    assert!(summary.failed.is_empty());

    let (state, written) = flow.into_chain().into_writer().into_parts();
    assert_eq!(state.api.fills, vec!["sky=1", "sea=2", "sky=1", "highlight=102"]);

    let names: Vec<(u64, &str)> = written.iter().map(|(id, cmd)| (id.0, cmd.name())).collect();
    assert_eq!(
        names,
        vec![
            (0, "write-memory"),
            (1, "write-memory"),
            (2, "write-memory"),
            (3, "write-memory"),
            (4, "submit"),
            (4, "cut-marker"),
            (4, "submit"),
            (4, "read-memory"),
            (5, "fill"),
            (5, "write-memory"),
            (5, "write-memory"),
            (5, "fill"),
            (6, "read-memory"),
        ]
    );

    let mut posted: Vec<(u64, PostBackResult)> = rx.iter().collect();
    posted.sort_by_key(|(after, _)| *after);
    let values: Vec<(u64, Option<u32>)> = posted
        .iter()
        .map(|(after, result)| (*after, u32_result(result)))
        .collect();
    // Command 6 itself was dropped, but its readback still observes command 5's output.
    assert_eq!(values, vec![(4, Some(2)), (6, Some(102)), (9, None)]);
    assert!(posted[2].1.is_err());
}

#[test]
fn injected_memory_lives_past_scratch_release() {
    let state = SimulationState::new(&config(), Gpu::default());
    let chain = TransformChain::new(StateWriter::new(state))
        .with(Highlight::new(vec![CmdId(4), CmdId(5)]));
    let mut flow = ControlFlow::new(IterGenerator::new(capture()), chain);
    flow.run().unwrap();

    // The second highlight reuses the first one's scratch addresses.
    assert_eq!(
        flow.state().api.fills,
        vec!["sky=1", "sea=2", "highlight=100", "sky=1", "highlight=200", "sea=2"]
    );
    let label = flow
        .state()
        .read(PoolId::APPLICATION, Range::new(0xf000_0000, 10).unwrap())
        .unwrap();
    assert_eq!(label, b"highlight\0");
}

#[test]
fn undecodable_parameters_stop_the_replay() {
    let state = SimulationState::new(&config(), Gpu::default());
    let chain = TransformChain::new(StateWriter::new(state));
    let commands = vec![fill(0x1000), fill(u64::MAX - 2)];
    let mut flow = ControlFlow::new(IterGenerator::new(commands), chain);

    let err = flow.run().unwrap_err();
    assert_eq!(err.stopped_at, StopPoint::Command(CmdId(1)));
    assert!(matches!(err.source, ReplayError::Write { .. }));
    assert!(err.to_string().contains("end of data"), "{err}");
    // Unwritten memory reads as zero: an empty label and a zero value.
    assert_eq!(flow.state().api.fills, vec!["=0"]);
}
