//! Instance registry and selection.
//!
//! # Instance Registry / Factory
//!
//! Instances are registered per [`OperationFamily`] into a
//! [`RegistryBuilder`] and frozen into an immutable [`Registry`]
//! (populate-then-freeze). A frozen registry is `Send + Sync` and can be
//! queried from any thread.
//!
//! ## Selection
//!
//! [`Registry::select_instance`] picks the best instance for a problem:
//!
//! 1. **Class match.** Element types, layouts and reduction kind must equal
//!    the problem's exactly. No candidate here is a hard
//!    [`KernelError::NoMatch`].
//! 2. **Disqualification.** Candidates whose staging exceeds the device's
//!    shared memory ([`KernelError::PipelineCapacity`]) or that cannot tile
//!    the problem ([`KernelError::UnsupportedShape`]) are dropped and logged
//!    at debug level.
//! 3. **Ranking.** Survivors are ordered by padded volume (the `M × N × K`
//!    actually computed, edge tiles included); ties go to the instance
//!    registered first.
//!
//! If every class match is disqualified the result is still `NoMatch`, with
//! the last disqualification as the reason.
//!
//! ## Example
//!
//! ```rust
//! use tile_kernels::dtype::DataType;
//! use tile_kernels::kernel::OperationFamily;
//! use tile_kernels::problem::{Layout, OperandDesc, ProblemDesc};
//! use tile_kernels::registry::default_registry;
//!
//! let op = |r, c| OperandDesc::packed(&[r, c], DataType::F16, Layout::RowMajor).unwrap();
//! let p = ProblemDesc::gemm(op(512, 256), op(256, 384), op(512, 384)).unwrap();
//! let inst = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();
//! assert!(inst.name().starts_with("gemm_fp16_fp16_fp16_rrr"));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::error::{KernelError, Result};
use crate::instances;
use crate::kernel::{InstanceDescriptor, KernelInstance, OperationFamily, instantiate};
use crate::planner::GridDims;
use crate::problem::ProblemDesc;

/// Per-block resources of the target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLimits {
    /// Staging (shared / LDS) memory per block in bytes.
    pub shared_memory_bytes: usize,
    /// Threads per block.
    pub max_threads_per_block: usize,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            shared_memory_bytes: 64 * 1024,
            max_threads_per_block: 1024,
        }
    }
}

type Catalogue = BTreeMap<OperationFamily, Vec<Arc<dyn KernelInstance>>>;

/// Mutable registry under construction.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    limits: DeviceLimits,
    families: Catalogue,
}

impl RegistryBuilder {
    /// Empty builder with default device limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the device limits used at selection time.
    #[must_use]
    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Registers an instance.
    ///
    /// # Returns
    /// `true` if the instance was added, `false` if an identical descriptor
    /// was already registered for `family`.
    ///
    /// # Errors
    /// [`KernelError::InvalidInstance`] when the descriptor is inconsistent
    /// with the family.
    pub fn register(&mut self, family: OperationFamily, desc: InstanceDescriptor) -> Result<bool> {
        let entries = self.families.entry(family).or_default();
        if entries.iter().any(|i| *i.descriptor() == desc) {
            return Ok(false);
        }
        let instance = instantiate(family, desc)?;
        debug!("registered {}", instance.name());
        entries.push(instance);
        Ok(true)
    }

    /// Freezes the builder.
    pub fn build(self) -> Registry {
        Registry {
            limits: self.limits,
            families: self.families,
        }
    }
}

/// A surviving candidate, as ranked by [`Registry::rank_candidates`].
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The instance.
    pub instance: Arc<dyn KernelInstance>,
    /// Grid it would launch.
    pub grid: GridDims,
    /// `M × N × K` including edge-tile padding, summed over groups.
    pub padded_volume: u128,
    /// Registration index within the family.
    pub index: usize,
}

/// Immutable registry of kernel instances.
#[derive(Debug)]
pub struct Registry {
    limits: DeviceLimits,
    families: Catalogue,
}

impl Registry {
    /// Starts a new builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Device limits used at selection time.
    pub const fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// Instances of a family, in registration order.
    pub fn instances(&self, family: OperationFamily) -> &[Arc<dyn KernelInstance>] {
        self.families.get(&family).map_or(&[], Vec::as_slice)
    }

    /// Total number of instances.
    pub fn len(&self) -> usize {
        self.families.values().map(Vec::len).sum()
    }

    /// Whether no instance is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All instances able to serve `problem`, best first.
    ///
    /// # Errors
    /// [`KernelError::NoMatch`] when no instance matches the problem's
    /// element types, layouts and reduction kind. An empty `Ok` means every
    /// class match was disqualified.
    pub fn rank_candidates(&self, family: OperationFamily, problem: &ProblemDesc) -> Result<Vec<Candidate>> {
        self.rank(family, problem).map(|(c, _)| c)
    }

    fn rank(&self, family: OperationFamily, problem: &ProblemDesc) -> Result<(Vec<Candidate>, Option<KernelError>)> {
        if family.problem_kind() != problem.kind() {
            return Err(KernelError::NoMatch {
                family,
                reason: format!("{family} does not serve {:?} problems", problem.kind()),
            });
        }
        let (dtypes, layouts) = (problem.dtypes(), problem.layouts());
        let class: Vec<(usize, &Arc<dyn KernelInstance>)> = self
            .instances(family)
            .iter()
            .enumerate()
            .filter(|(_, i)| {
                let d = i.descriptor();
                d.dtypes == dtypes && d.layouts == layouts && d.reduce == problem.reduce()
            })
            .collect();
        if class.is_empty() {
            let types: Vec<String> = dtypes.iter().map(ToString::to_string).collect();
            let tags: Vec<String> = layouts.iter().map(ToString::to_string).collect();
            return Err(KernelError::NoMatch {
                family,
                reason: format!(
                    "no instance for types [{}], layouts [{}], {} reduction",
                    types.join(", "),
                    tags.join(", "),
                    problem.reduce()
                ),
            });
        }

        let mut last_err = None;
        let mut survivors = Vec::with_capacity(class.len());
        for (index, instance) in class {
            let grid = match instance
                .check_capacity(&self.limits)
                .and_then(|()| instance.grid_shape(problem))
            {
                Ok(grid) => grid,
                Err(e) => {
                    debug!("{}: disqualified: {e}", instance.name());
                    last_err = Some(e);
                    continue;
                }
            };
            survivors.push(Candidate {
                instance: Arc::clone(instance),
                grid,
                padded_volume: padded_volume(instance.descriptor(), problem),
                index,
            });
        }
        survivors.sort_by_key(|c| (c.padded_volume, c.index));
        Ok((survivors, last_err))
    }

    /// Best instance for `problem`.
    ///
    /// # Errors
    /// [`KernelError::NoMatch`] when no instance matches the problem's class
    /// or every match is disqualified.
    pub fn select_instance(&self, family: OperationFamily, problem: &ProblemDesc) -> Result<Arc<dyn KernelInstance>> {
        let (survivors, last_err) = self.rank(family, problem)?;
        match survivors.into_iter().next() {
            Some(best) => {
                debug!(
                    "selected {} (padded volume {}, true volume {})",
                    best.instance.name(),
                    best.padded_volume,
                    problem.volume()
                );
                Ok(best.instance)
            }
            None => Err(KernelError::NoMatch {
                family,
                reason: match last_err {
                    Some(e) => format!("every matching instance was disqualified, last: {e}"),
                    None => "every matching instance was disqualified".into(),
                },
            }),
        }
    }
}

fn padded_volume(desc: &InstanceDescriptor, problem: &ProblemDesc) -> u128 {
    let t = &desc.tile;
    let k_step = t.block_k * problem.k_batch();
    problem
        .extents()
        .iter()
        .map(|e| {
            let m = e.m.div_ceil(t.block_m) * t.block_m;
            let n = e.n.div_ceil(t.block_n) * t.block_n;
            let k = e.k.div_ceil(k_step) * k_step;
            m as u128 * n as u128 * k as u128
        })
        .sum()
}

fn build_default() -> Registry {
    let mut builder = RegistryBuilder::new();
    #[allow(clippy::expect_used)]
    instances::register_all(&mut builder).expect("built-in instance catalogue is consistent");
    builder.build()
}

lazy_static::lazy_static! {
    static ref DEFAULT_REGISTRY: Registry = build_default();
}

/// The registry of built-in instances, built on first use.
pub fn default_registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}
