//! tile_kernels: tile-partitioned, software-pipelined dense tensor kernels.
//!
//! A library of dense-tensor compute kernels (GEMM with split-K and grouped
//! variants, 2-D RMS normalisation, row-wise smoothquant, 3-D pooling forward
//! and average-pooling backward) built around one execution
//! model: a problem is cut into a grid of independent block tiles, each block
//! streams its reduction dimension through a prefetching pipeline of staged
//! tiles, and a registry of pre-specialised instances picks the best fit for
//! the problem at hand.
//!
//! # Features
//!
//! - Strided operand descriptors with row-major, column-major and custom
//!   layout tags, validated once at construction.
//! - A tile planner mapping problems onto blocks, warps and lanes, with
//!   explicit padding policies for ragged edges.
//! - A prologue / steady-state / epilogue pipeline with intra-wave and
//!   inter-wave scheduling and 1 to 3 staged tiles in flight.
//! - A populate-then-freeze instance registry with deterministic selection.
//! - fp16, bf16, fp32, fp64, int8 and int32 elements; accumulation is wider
//!   than the inputs and narrowing rounds to nearest even.
//!
//! # Modules
//!
//! - [`problem`]: problem and operand descriptors.
//! - [`planner`]: tile shapes, grid computation, intra-block partition.
//! - [`pipeline`]: the software pipeline driving every block.
//! - [`kernel`]: kernel instances, their descriptors and launching.
//! - [`registry`]: instance registration and selection.
//! - [`instances`]: the built-in instance catalogue.
//! - [`ops`]: per-family kernel implementations.
//! - [`tensors`]: host tensors over typed storage.
//! - [`dtype`]: element and accumulator types.
//! - [`backend`]: host / GPU execution switch.
//! - [`approx`]: tolerances for comparing outputs against references.
//!
//! # Example
//!
//! ```rust
//! use tile_kernels::kernel::{launch, LaunchArgs, OperationFamily};
//! use tile_kernels::problem::ProblemDesc;
//! use tile_kernels::registry::default_registry;
//! use tile_kernels::tensor;
//!
//! let a = tensor!(F16; [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
//! let b = tensor!(F16; [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
//! let mut c = tensor!(F16; [[0.0, 0.0], [0.0, 0.0]]);
//!
//! let problem = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), c.desc().clone()).unwrap();
//! let gemm = default_registry().select_instance(OperationFamily::Gemm, &problem).unwrap();
//! launch(gemm.as_ref(), LaunchArgs::gemm(&problem, &a, &b, &mut c)).unwrap();
//! assert_eq!(c.to_logical_f64(), vec![4.0, 5.0, 10.0, 11.0]);
//! ```
//!
//! # Feature Flags
//!
//! - `wgpu`: runs eligible fp32 GEMM instances on a GPU through `wgpu`
//!   when [`backend::Backend::Wgpu`] is selected.

pub mod approx;
pub mod backend;
pub mod dtype;
pub mod error;
pub mod instances;
pub mod kernel;
pub mod ops;
pub mod pipeline;
pub mod planner;
pub mod problem;
pub mod registry;
pub mod tensors;

pub use error::{KernelError, Result};
pub use kernel::{KernelInstance, LaunchArgs, OperationFamily, launch};
pub use registry::{Registry, RegistryBuilder, default_registry};
