//! GPU execution of GEMM instances using WGPU.
//!
//! One WGSL compute shader is generated per `Block_M × Block_N × Block_K`
//! tile and cached. A 16×16 workgroup owns one output tile: every k-step it
//! stages an `A` and a `B` tile in workgroup memory, synchronises, and each
//! invocation accumulates a `(Block_M/16) × (Block_N/16)` fragment in `f32`
//! with a per-element Kahan compensation term.
//!
//! Only a subset of instances is eligible (plain GEMM, `f32` operands,
//! identity post-op, tiles in multiples of 16 that fit the adapter's
//! workgroup storage). [`try_gemm`] reports `Ok(false)` for everything else
//! so the caller can stay on the host pipeline.
//!
//! WGSL has no portable `f64`, so the host path's wide accumulator is
//! emulated: the compensated sum carries roughly twice the `f32` precision
//! and its error does not grow with K. Each product still rounds to `f32`
//! once, so the GPU agrees with the host within `f32` tolerance, not
//! bit-for-bit.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use wgpu::util::DeviceExt;

use crate::dtype::DataType;
use crate::error::{KernelError, Result};
use crate::kernel::{GemmOperands, KernelInstance, OperationFamily};
use crate::ops::elementwise::ElementwiseOp;
use crate::ops::gemm::GemmKernel;
use crate::planner::TileShape;
use crate::problem::ProblemDesc;

const WORKGROUP: usize = 16;

/// Holds the WGPU device and queue plus the layouts shared by every GEMM
/// pipeline.
///
/// Initialized once globally via `lazy_static`.
pub struct GpuContext {
    /// The GPU device.
    pub device: wgpu::Device,
    /// Submission queue of `device`.
    pub queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

impl GpuContext {
    /// Selects the default adapter and creates a device, queue and the GEMM
    /// bind-group layout.
    ///
    /// # Errors
    /// [`KernelError::Gpu`] if no adapter or device is available.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
            .map_err(|e| KernelError::Gpu(format!("adapter: {e}")))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("tile_kernels"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|e| KernelError::Gpu(format!("device: {e}")))?;

        let buffer = |binding, ty| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gemm_bgl"),
            entries: &[
                buffer(0, wgpu::BufferBindingType::Uniform),
                buffer(1, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer(2, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer(3, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gemm_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Ok(Self {
            device,
            queue,
            bind_group_layout,
            pipeline_layout,
        })
    }
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: Option<GpuContext> = match GpuContext::new() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            warn!("{e}; GEMM stays on the host");
            None
        }
    };
    static ref PIPELINES: Mutex<HashMap<(usize, usize, usize), Arc<wgpu::ComputePipeline>>> =
        Mutex::new(HashMap::new());
}

/// Shader uniform. Strides are in elements.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Dims {
    m: u32,
    n: u32,
    k: u32,
    a_s0: u32,
    a_s1: u32,
    b_s0: u32,
    b_s1: u32,
    _pad: u32,
}

fn shader_source(tile: &TileShape) -> String {
    let (bm, bn, bk) = (tile.block_m, tile.block_n, tile.block_k);
    let (tm, tn) = (bm / WORKGROUP, bn / WORKGROUP);
    format!(
        r"
struct Dims {{ m: u32, n: u32, k: u32, a_s0: u32, a_s1: u32, b_s0: u32, b_s1: u32, pad: u32 }};

@group(0) @binding(0) var<uniform> dims: Dims;
@group(0) @binding(1) var<storage, read> a: array<f32>;
@group(0) @binding(2) var<storage, read> b: array<f32>;
@group(0) @binding(3) var<storage, read_write> c: array<f32>;

const BM: u32 = {bm}u;
const BN: u32 = {bn}u;
const BK: u32 = {bk}u;
const TM: u32 = {tm}u;
const TN: u32 = {tn}u;

var<workgroup> a_tile: array<f32, {a_len}>;
var<workgroup> b_tile: array<f32, {b_len}>;

@compute @workgroup_size(16, 16, 1)
fn main(
    @builtin(workgroup_id) wg: vec3<u32>,
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(local_invocation_index) tid: u32,
) {{
    let m0 = wg.y * BM;
    let n0 = wg.x * BN;
    var acc: array<f32, {acc_len}>;
    var comp: array<f32, {acc_len}>;

    for (var k0 = 0u; k0 < dims.k; k0 = k0 + BK) {{
        for (var e = tid; e < BM * BK; e = e + 256u) {{
            let gm = m0 + e / BK;
            let gk = k0 + e % BK;
            var v: f32 = 0.0;
            if (gm < dims.m && gk < dims.k) {{
                v = a[gm * dims.a_s0 + gk * dims.a_s1];
            }}
            a_tile[e] = v;
        }}
        for (var e = tid; e < BK * BN; e = e + 256u) {{
            let gk = k0 + e / BN;
            let gn = n0 + e % BN;
            var v: f32 = 0.0;
            if (gk < dims.k && gn < dims.n) {{
                v = b[gk * dims.b_s0 + gn * dims.b_s1];
            }}
            b_tile[e] = v;
        }}
        workgroupBarrier();

        for (var kk = 0u; kk < BK; kk = kk + 1u) {{
            for (var i = 0u; i < TM; i = i + 1u) {{
                let av = a_tile[(lid.y * TM + i) * BK + kk];
                for (var j = 0u; j < TN; j = j + 1u) {{
                    let idx = i * TN + j;
                    let y = av * b_tile[kk * BN + lid.x * TN + j] - comp[idx];
                    let t = acc[idx] + y;
                    comp[idx] = (t - acc[idx]) - y;
                    acc[idx] = t;
                }}
            }}
        }}
        workgroupBarrier();
    }}

    for (var i = 0u; i < TM; i = i + 1u) {{
        for (var j = 0u; j < TN; j = j + 1u) {{
            let gm = m0 + lid.y * TM + i;
            let gn = n0 + lid.x * TN + j;
            if (gm < dims.m && gn < dims.n) {{
                c[gm * dims.n + gn] = acc[i * TN + j] - comp[i * TN + j];
            }}
        }}
    }}
}}
",
        a_len = bm * bk,
        b_len = bk * bn,
        acc_len = tm * tn,
    )
}

fn pipeline(ctx: &GpuContext, tile: &TileShape) -> Result<Arc<wgpu::ComputePipeline>> {
    let key = (tile.block_m, tile.block_n, tile.block_k);
    let mut cache = PIPELINES
        .lock()
        .map_err(|_| KernelError::Gpu("pipeline cache poisoned".into()))?;
    if let Some(p) = cache.get(&key) {
        return Ok(Arc::clone(p));
    }
    let label = format!("gemm_{}x{}x{}", key.0, key.1, key.2);
    let module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&label),
        source: wgpu::ShaderSource::Wgsl(shader_source(tile).into()),
    });
    let pipeline = Arc::new(ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&label),
        layout: Some(&ctx.pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        cache: None,
        compilation_options: wgpu::PipelineCompilationOptions::default(),
    }));
    debug!("compiled {label}");
    cache.insert(key, Arc::clone(&pipeline));
    Ok(pipeline)
}

fn to_u32(what: &str, v: usize) -> Result<u32> {
    u32::try_from(v).map_err(|_| KernelError::Gpu(format!("{what} = {v} exceeds u32")))
}

/// Why `kernel` cannot run on the GPU, or `None` if it can.
fn ineligible(kernel: &GemmKernel, problem: &ProblemDesc, post_op: &dyn ElementwiseOp) -> Option<&'static str> {
    let desc = kernel.descriptor();
    let t = &desc.tile;
    if kernel.family() != OperationFamily::Gemm || problem.k_batch() != 1 {
        Some("only plain GEMM runs on the GPU")
    } else if desc.dtypes.iter().any(|&d| d != DataType::F32) {
        Some("GPU GEMM takes f32 operands")
    } else if !post_op.is_identity() {
        Some("GPU GEMM has no epilogue")
    } else if t.block_m % WORKGROUP != 0 || t.block_n % WORKGROUP != 0 {
        Some("tile is not a multiple of the 16x16 workgroup")
    } else {
        None
    }
}

/// Runs a GEMM instance on the GPU.
///
/// # Returns
/// `Ok(true)` when `C` was written, `Ok(false)` when the instance or the
/// problem is not eligible (nothing was written).
///
/// # Errors
/// [`KernelError::Gpu`] when the device fails mid-launch. `C` is untouched.
pub(crate) fn try_gemm(
    kernel: &GemmKernel,
    problem: &ProblemDesc,
    groups: &mut [GemmOperands<'_>],
    post_op: &dyn ElementwiseOp,
) -> Result<bool> {
    if let Some(reason) = ineligible(kernel, problem, post_op) {
        debug!("{}: {reason}", kernel.name());
        return Ok(false);
    }
    let Some(ctx) = GPU_CONTEXT.as_ref() else {
        return Ok(false);
    };
    let tile = kernel.descriptor().tile;
    let storage = (tile.block_m * tile.block_k + tile.block_k * tile.block_n) * 4;
    if storage > ctx.device.limits().max_compute_workgroup_storage_size as usize {
        debug!("{}: {storage} bytes of workgroup storage unavailable", kernel.name());
        return Ok(false);
    }
    let [ops] = groups else {
        return Ok(false);
    };
    let (Some(a), Some(b)) = (ops.a.data().as_f32(), ops.b.data().as_f32()) else {
        return Ok(false);
    };

    let ext = problem.extents()[0];
    let (sa, sb) = (ops.a.desc().strides(), ops.b.desc().strides());
    let dims = Dims {
        m: to_u32("M", ext.m)?,
        n: to_u32("N", ext.n)?,
        k: to_u32("K", ext.k)?,
        a_s0: to_u32("A stride", sa[0])?,
        a_s1: to_u32("A stride", sa[1])?,
        b_s0: to_u32("B stride", sb[0])?,
        b_s1: to_u32("B stride", sb[1])?,
        _pad: 0,
    };
    let groups_x = to_u32("grid x", ext.n.div_ceil(tile.block_n))?;
    let groups_y = to_u32("grid y", ext.m.div_ceil(tile.block_m))?;

    let out = run_shader(ctx, &pipeline(ctx, &tile)?, &dims, a, b, ext.m * ext.n, (groups_x, groups_y))?;

    let c = &mut ops.c;
    let mut writes = Vec::with_capacity(out.len());
    for (i, v) in out.iter().enumerate() {
        writes.push((c.desc().offset(&[i / ext.n, i % ext.n]), f64::from(*v)));
    }
    c.data_mut().scatter(&writes);
    debug!("{} ran on the GPU ({groups_x}x{groups_y} workgroups)", kernel.name());
    Ok(true)
}

fn run_shader(
    ctx: &GpuContext,
    pipeline: &wgpu::ComputePipeline,
    dims: &Dims,
    a: &[f32],
    b: &[f32],
    out_len: usize,
    (groups_x, groups_y): (u32, u32),
) -> Result<Vec<f32>> {
    let device = &ctx.device;
    let out_bytes = (out_len * size_of::<f32>()) as u64;

    let dims_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("dims"),
        contents: bytemuck::bytes_of(dims),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let a_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("A"),
        contents: bytemuck::cast_slice(a),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let b_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("B"),
        contents: bytemuck::cast_slice(b),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let c_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("C"),
        size: out_bytes,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("staging"),
        size: out_bytes,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("gemm_bind_group"),
        layout: &ctx.bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: dims_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: a_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: b_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: c_buffer.as_entire_binding(),
            },
        ],
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("gemm_encoder"),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("gemm_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups_x, groups_y, 1);
    }
    encoder.copy_buffer_to_buffer(&c_buffer, 0, &staging, 0, out_bytes);
    ctx.queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| KernelError::Gpu(format!("poll: {e}")))?;
    rx.recv()
        .map_err(|_| KernelError::Gpu("map callback dropped".into()))?
        .map_err(|e| KernelError::Gpu(format!("map: {e}")))?;

    let data = slice.get_mapped_range();
    let out = bytemuck::try_cast_slice::<u8, f32>(&data)
        .map_err(|e| KernelError::Gpu(format!("readback: {e}")))?
        .to_vec();
    drop(data);
    staging.unmap();
    Ok(out)
}
