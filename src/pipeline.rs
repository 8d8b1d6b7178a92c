//! Software pipeline over the reduction dimension.
//!
//! # Pipeline Scheduler
//!
//! Every block walks its K range one `Block_K` tile at a time. Loads of later
//! tiles are issued before earlier tiles are consumed so that data movement
//! overlaps compute. With prefetch depth `d` and `nk` tiles:
//!
//! ```text
//! Prologue     load 0 .. min(d, nk)                       barrier
//! SteadyState  load i+d -> in-flight | compute i | barrier | commit into slot i % d
//! Epilogue     compute i                                   (no more loads)
//! ```
//!
//! The steady state runs while `i + d < nk`; the epilogue drains the `d` tiles
//! that are still staged.
//!
//! ## Disciplines
//! - [`Scheduler::Intrawave`]: every warp issues its load slice, block barrier,
//!   every warp computes, block barrier.
//! - [`Scheduler::Interwave`]: each warp issues its load slice and then its
//!   compute before the next warp starts; one barrier per iteration.
//!
//! Warps own disjoint accumulators and every tile is consumed in `k` order, so
//! both disciplines produce bit-identical results.
//!
//! The actual data movement and math live behind [`TileProgram`]; this module
//! only decides *when* each piece runs.

use log::trace;

use crate::error::{KernelError, Result};

/// Warp scheduling discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheduler {
    /// Load, barrier, compute, barrier.
    #[default]
    Intrawave,
    /// Loads and computes interleaved per warp.
    Interwave,
}

impl Scheduler {
    /// Name used in instance strings.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Intrawave => "Intrawave",
            Self::Interwave => "Interwave",
        }
    }
}

/// Scheduler and prefetch depth of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineConfig {
    /// Scheduling discipline.
    pub scheduler: Scheduler,
    /// Staged tiles, 1 (single), 2 (double) or 3 (triple buffering).
    pub prefetch: u8,
}

impl PipelineConfig {
    /// A pipeline configuration.
    pub const fn new(scheduler: Scheduler, prefetch: u8) -> Self {
        Self { scheduler, prefetch }
    }

    /// Checks the prefetch depth.
    ///
    /// # Errors
    /// [`KernelError::InvalidInstance`] when the depth is not 1, 2 or 3.
    pub fn validate(&self) -> Result<()> {
        if (1..=3).contains(&self.prefetch) {
            Ok(())
        } else {
            Err(KernelError::InvalidInstance(format!(
                "prefetch depth must be 1..=3, got {}",
                self.prefetch
            )))
        }
    }

    /// Bytes of staging held by the slot ring.
    pub const fn staging_bytes(&self, stage_bytes: usize) -> usize {
        self.prefetch as usize * stage_bytes
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(Scheduler::Intrawave, 2)
    }
}

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    /// Filling the slot ring.
    Prologue,
    /// One load and one compute per iteration.
    SteadyState,
    /// Draining staged tiles.
    Epilogue,
}

/// One recorded step of a block's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The pipeline entered a phase.
    Phase(PipelinePhase),
    /// `warp` issued its load slice of k-tile `tile`. `slot` is `None` for the
    /// in-flight buffer.
    Load {
        /// k-tile index.
        tile: usize,
        /// Destination slot.
        slot: Option<usize>,
        /// Issuing warp.
        warp: usize,
    },
    /// `warp` consumed k-tile `tile` from `slot`.
    Compute {
        /// k-tile index.
        tile: usize,
        /// Source slot.
        slot: usize,
        /// Computing warp.
        warp: usize,
    },
    /// Block-wide barrier.
    Barrier,
    /// The in-flight buffer holding `tile` became slot `slot`.
    Commit {
        /// k-tile index.
        tile: usize,
        /// Slot it now occupies.
        slot: usize,
    },
}

/// Portion of a stage loaded by one warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSlice {
    /// Which portion.
    pub part: usize,
    /// Number of portions.
    pub parts: usize,
}

impl LoadSlice {
    /// Half-open element range of this portion within `len` elements.
    pub const fn range(&self, len: usize) -> core::ops::Range<usize> {
        (self.part * len / self.parts)..((self.part + 1) * len / self.parts)
    }
}

/// The per-block work a kernel plugs into the pipeline.
pub trait TileProgram {
    /// Accumulator element held by warps.
    type Acc: Copy;
    /// One staged k-tile.
    type Stage;

    /// Number of k-tiles this block reduces over.
    fn num_k_tiles(&self) -> usize;

    /// Number of warps in the block.
    fn num_warps(&self) -> usize;

    /// A fresh, uninitialised stage buffer.
    fn alloc_stage(&self) -> Self::Stage;

    /// Loads one slice of k-tile `tile` into `stage`.
    fn load(&self, tile: usize, slice: LoadSlice, stage: &mut Self::Stage);

    /// Folds a staged tile into one warp's accumulators.
    fn compute(&self, stage: &Self::Stage, warp: usize, acc: &mut [Self::Acc]);

    /// Initial accumulators of one warp.
    fn acc_init(&self, warp: usize) -> Vec<Self::Acc>;
}

/// State of one block's pipeline. Owned by exactly one block.
#[derive(Debug)]
pub struct PipelineState<S, A> {
    iteration: usize,
    phase: PipelinePhase,
    slots: Vec<S>,
    in_flight: S,
    accumulators: Vec<Vec<A>>,
    trace: Option<Vec<PipelineEvent>>,
}

impl<S, A> PipelineState<S, A> {
    /// Current iteration (k-tile being computed).
    pub const fn iteration(&self) -> usize {
        self.iteration
    }

    /// Slot of the current iteration.
    pub fn slot(&self) -> usize {
        self.iteration % self.slots.len()
    }

    /// Current phase.
    pub const fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// Recorded events, if tracing was requested.
    pub fn trace(&self) -> Option<&[PipelineEvent]> {
        self.trace.as_deref()
    }

    /// Per-warp accumulators.
    pub fn accumulators(&self) -> &[Vec<A>] {
        &self.accumulators
    }

    /// Consumes the state, returning the per-warp accumulators.
    pub fn into_accumulators(self) -> Vec<Vec<A>> {
        self.accumulators
    }

    fn record(&mut self, ev: PipelineEvent) {
        if let Some(t) = self.trace.as_mut() {
            t.push(ev);
        }
    }

    fn enter(&mut self, phase: PipelinePhase) {
        trace!("pipeline iteration {}: entering {phase:?}", self.iteration);
        self.phase = phase;
        self.record(PipelineEvent::Phase(phase));
    }
}

fn load_into<P: TileProgram>(
    program: &P,
    state: &mut PipelineState<P::Stage, P::Acc>,
    tile: usize,
    slot: Option<usize>,
    warp: usize,
) {
    let slice = LoadSlice { part: warp, parts: program.num_warps() };
    let dst = match slot {
        Some(s) => &mut state.slots[s],
        None => &mut state.in_flight,
    };
    program.load(tile, slice, dst);
    state.record(PipelineEvent::Load { tile, slot, warp });
}

fn compute_from<P: TileProgram>(program: &P, state: &mut PipelineState<P::Stage, P::Acc>, tile: usize, warp: usize) {
    let slot = tile % state.slots.len();
    program.compute(&state.slots[slot], warp, &mut state.accumulators[warp]);
    state.record(PipelineEvent::Compute { tile, slot, warp });
}

/// Runs one block's pipeline to completion.
///
/// # Returns
/// The final state; its accumulators hold the fully reduced block tile.
///
/// # Panics
/// Panics if `config.prefetch` is zero. Configurations coming from a
/// registered instance are validated at registration.
pub fn run_block<P: TileProgram>(
    program: &P,
    config: &PipelineConfig,
    record_trace: bool,
) -> PipelineState<P::Stage, P::Acc> {
    let depth = usize::from(config.prefetch);
    assert!(depth > 0, "prefetch depth must be positive");
    let nk = program.num_k_tiles();
    let warps = program.num_warps();

    let mut state = PipelineState {
        iteration: 0,
        phase: PipelinePhase::Prologue,
        slots: (0..depth).map(|_| program.alloc_stage()).collect(),
        in_flight: program.alloc_stage(),
        accumulators: (0..warps).map(|w| program.acc_init(w)).collect(),
        trace: record_trace.then(Vec::new),
    };

    state.enter(PipelinePhase::Prologue);
    for tile in 0..depth.min(nk) {
        for warp in 0..warps {
            load_into(program, &mut state, tile, Some(tile), warp);
        }
    }
    state.record(PipelineEvent::Barrier);

    for i in 0..nk {
        state.iteration = i;
        let steady = i + depth < nk;
        if steady && state.phase != PipelinePhase::SteadyState {
            state.enter(PipelinePhase::SteadyState);
        } else if !steady && state.phase != PipelinePhase::Epilogue {
            state.enter(PipelinePhase::Epilogue);
        }

        match (config.scheduler, steady) {
            (Scheduler::Intrawave, true) => {
                for warp in 0..warps {
                    load_into(program, &mut state, i + depth, None, warp);
                }
                state.record(PipelineEvent::Barrier);
                for warp in 0..warps {
                    compute_from(program, &mut state, i, warp);
                }
                state.record(PipelineEvent::Barrier);
            }
            (Scheduler::Interwave, true) => {
                for warp in 0..warps {
                    load_into(program, &mut state, i + depth, None, warp);
                    compute_from(program, &mut state, i, warp);
                }
                state.record(PipelineEvent::Barrier);
            }
            (_, false) => {
                for warp in 0..warps {
                    compute_from(program, &mut state, i, warp);
                }
                state.record(PipelineEvent::Barrier);
            }
        }

        if steady {
            let slot = i % depth;
            core::mem::swap(&mut state.slots[slot], &mut state.in_flight);
            state.record(PipelineEvent::Commit { tile: i + depth, slot });
        }
    }

    if state.phase != PipelinePhase::Epilogue {
        state.enter(PipelinePhase::Epilogue);
    }
    state
}
