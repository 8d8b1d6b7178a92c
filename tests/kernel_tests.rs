use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tile_kernels::approx::{first_mismatch, max_relative_error};
use tile_kernels::dtype::DataType::{self, F16, F32, I8};
use tile_kernels::error::KernelError;
use tile_kernels::kernel::{GemmOperands, InstanceDescriptor, KernelInstance, LaunchArgs, OperationFamily, instantiate, launch};
use tile_kernels::ops::elementwise::{FnOp, Scale};
use tile_kernels::pipeline::{PipelineConfig, Scheduler};
use tile_kernels::planner::{GridDims, TileShape};
use tile_kernels::problem::{Layout, OperandDesc, PoolWindow, ProblemDesc, ReduceOp};
use tile_kernels::registry::default_registry;
use tile_kernels::tensors::Tensor;

const NDHWC: Layout = Layout::Custom("NDHWC");

fn random(desc: OperandDesc, rng: &mut StdRng) -> Tensor {
    Tensor::from_fn(desc, |_| rng.random_range(-1.0..1.0))
}

fn matrix(rows: i64, cols: i64, dtype: DataType, layout: Layout) -> OperandDesc {
    OperandDesc::packed(&[rows, cols], dtype, layout).unwrap()
}

fn reference_gemm(a: &Tensor, b: &Tensor) -> Vec<f64> {
    let (m, k) = (a.desc().lengths()[0], a.desc().lengths()[1]);
    let n = b.desc().lengths()[1];
    let mut out = Vec::with_capacity(m * n);
    for i in 0..m {
        for j in 0..n {
            out.push((0..k).map(|kk| a.get(&[i, kk]) * b.get(&[kk, j])).sum());
        }
    }
    out
}

fn assert_close(actual: &[f64], expected: &[f64], dtype: DataType) {
    assert_eq!(actual.len(), expected.len());
    if let Some((i, a, e)) = first_mismatch(actual, expected, dtype) {
        panic!("element {i}: got {a}, expected {e}");
    }
}

fn run_gemm(family: OperationFamily, problem: &ProblemDesc, a: &Tensor, b: &Tensor) -> Tensor {
    let inst = default_registry().select_instance(family, problem).unwrap();
    let mut c = Tensor::zeros(problem.operands()[2].clone());
    launch(inst.as_ref(), LaunchArgs::gemm(problem, a, b, &mut c)).unwrap();
    c
}

#[test]
fn test_fp16_gemm_matches_reference() {
    let mut rng = StdRng::seed_from_u64(7);
    for (la, lb) in [
        (Layout::RowMajor, Layout::RowMajor),
        (Layout::RowMajor, Layout::ColumnMajor),
        (Layout::ColumnMajor, Layout::RowMajor),
        (Layout::ColumnMajor, Layout::ColumnMajor),
    ] {
        let (m, n, k) = (70, 90, 96);
        let a = random(matrix(m, k, F16, la), &mut rng);
        let b = random(matrix(k, n, F16, lb), &mut rng);
        let p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), matrix(m, n, F16, Layout::RowMajor)).unwrap();
        let c = run_gemm(OperationFamily::Gemm, &p, &a, &b);
        assert_close(&c.to_logical_f64(), &reference_gemm(&a, &b), F16);
    }
}

#[test]
fn test_fp16_gemm_accumulates_wider_than_storage() {
    // all-positive products: an fp16 running sum passes 2048 and starts
    // dropping whole units
    let mut rng = StdRng::seed_from_u64(41);
    let (m, n, k) = (16, 16, 4096);
    let a = Tensor::from_fn(matrix(m, k, F16, Layout::RowMajor), |_| rng.random_range(0.0..1.0));
    let b = Tensor::from_fn(matrix(k, n, F16, Layout::RowMajor), |_| rng.random_range(0.0..1.0));
    let p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), matrix(m, n, F16, Layout::RowMajor)).unwrap();
    let inst = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();
    assert_eq!(inst.descriptor().acc, F32);

    let expected = reference_gemm(&a, &b);
    assert!(expected.iter().all(|&v| v > 512.0 && v < 2048.0));
    let c = run_gemm(OperationFamily::Gemm, &p, &a, &b);
    // fp16 output rounding alone is 2^-11
    let err = max_relative_error(&c.to_logical_f64(), &expected);
    assert!(err < 1.5e-3, "max relative error {err}");
}

#[test]
fn test_fp32_gemm_with_ragged_k() {
    let mut rng = StdRng::seed_from_u64(11);
    let a = random(matrix(33, 50, F32, Layout::RowMajor), &mut rng);
    let b = random(matrix(50, 47, F32, Layout::ColumnMajor), &mut rng);
    let p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), matrix(33, 47, F32, Layout::RowMajor)).unwrap();
    let c = run_gemm(OperationFamily::Gemm, &p, &a, &b);
    assert_close(&c.to_logical_f64(), &reference_gemm(&a, &b), F32);
}

#[test]
fn test_strided_output_leaves_gaps_untouched() {
    let a = Tensor::row_major(&[2, 2], F32, &[1.0, 2.0, 3.0, 4.0]);
    let b = Tensor::row_major(&[2, 2], F32, &[1.0, 0.0, 0.0, 1.0]);
    // rows padded to 3 elements
    let c_desc = OperandDesc::new(&[2, 2], &[3, 1], F32, Layout::RowMajor).unwrap();
    let p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), c_desc.clone()).unwrap();
    let inst = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();
    let mut c = Tensor::zeros(c_desc);
    assert_eq!(c.data().len(), 5);
    c.data_mut().scatter(&[(2, -9.0)]);
    launch(inst.as_ref(), LaunchArgs::gemm(&p, &a, &b, &mut c)).unwrap();
    assert_eq!(c.to_logical_f64(), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(c.data().get_f64(2), -9.0);
}

#[test]
fn test_split_k_agrees_with_single_pass() {
    let mut rng = StdRng::seed_from_u64(3);
    let (m, n, k) = (96, 80, 300);
    let a = random(matrix(m, k, F16, Layout::RowMajor), &mut rng);
    let b = random(matrix(k, n, F16, Layout::RowMajor), &mut rng);
    let p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), matrix(m, n, F16, Layout::RowMajor)).unwrap();

    let single = run_gemm(OperationFamily::Gemm, &p, &a, &b);
    for k_batch in [2, 3, 4] {
        let split_p = p.clone().with_k_batch(k_batch).unwrap();
        let split = run_gemm(OperationFamily::GemmSplitK, &split_p, &a, &b);
        assert_close(&split.to_logical_f64(), &single.to_logical_f64(), F16);
        assert_close(&split.to_logical_f64(), &reference_gemm(&a, &b), F16);
    }
}

#[test]
fn test_split_k_is_repeatable() {
    let mut rng = StdRng::seed_from_u64(5);
    let a = random(matrix(64, 512, F16, Layout::RowMajor), &mut rng);
    let b = random(matrix(512, 64, F16, Layout::RowMajor), &mut rng);
    let p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), matrix(64, 64, F16, Layout::RowMajor))
        .unwrap()
        .with_k_batch(8)
        .unwrap();
    let first = run_gemm(OperationFamily::GemmSplitK, &p, &a, &b);
    for _ in 0..3 {
        assert_eq!(run_gemm(OperationFamily::GemmSplitK, &p, &a, &b), first);
    }
}

#[test]
fn test_grouped_gemm_matches_per_group_gemm() {
    let mut rng = StdRng::seed_from_u64(13);
    let (n, k) = (64, 48);
    let ms = [64, 10, 96, 1];
    let mut inputs = Vec::new();
    let mut cs = Vec::new();
    let mut groups = Vec::new();
    for &m in &ms {
        let a = random(matrix(m, k, F16, Layout::RowMajor), &mut rng);
        let b = random(matrix(k, n, F16, Layout::RowMajor), &mut rng);
        let c = matrix(m, n, F16, Layout::RowMajor);
        groups.push([a.desc().clone(), b.desc().clone(), c.clone()]);
        cs.push(Tensor::zeros(c));
        inputs.push((a, b));
    }
    let p = ProblemDesc::grouped_gemm(groups).unwrap();
    let inst = default_registry().select_instance(OperationFamily::GroupedGemm, &p).unwrap();
    let operands: Vec<GemmOperands<'_>> = inputs
        .iter()
        .zip(cs.iter_mut())
        .map(|((a, b), c)| GemmOperands { a, b, c })
        .collect();
    launch(inst.as_ref(), LaunchArgs::grouped_gemm(&p, operands)).unwrap();

    for ((a, b), c) in inputs.iter().zip(&cs) {
        let single_p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), c.desc().clone()).unwrap();
        let single = run_gemm(OperationFamily::Gemm, &single_p, a, b);
        assert_close(&c.to_logical_f64(), &single.to_logical_f64(), F16);
        assert_close(&c.to_logical_f64(), &reference_gemm(a, b), F16);
    }
}

#[test]
fn test_schedulers_produce_identical_output() {
    let mut rng = StdRng::seed_from_u64(17);
    let a = random(matrix(100, 200, F16, Layout::RowMajor), &mut rng);
    let b = random(matrix(200, 60, F16, Layout::ColumnMajor), &mut rng);
    let p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), matrix(100, 60, F16, Layout::RowMajor)).unwrap();
    let tile = TileShape::new(64, 32, 16).warps(2, 2).vector(4).warp_size(8);

    for prefetch in 1..=3 {
        let outputs: Vec<Tensor> = [Scheduler::Intrawave, Scheduler::Interwave]
            .into_iter()
            .map(|scheduler| {
                let desc = InstanceDescriptor::gemm(
                    tile,
                    PipelineConfig::new(scheduler, prefetch),
                    [F16; 3],
                    [Layout::RowMajor, Layout::ColumnMajor, Layout::RowMajor],
                    tile_kernels::problem::Padding::PadMNK,
                );
                let inst = instantiate(OperationFamily::Gemm, desc).unwrap();
                let mut c = Tensor::zeros(p.operands()[2].clone());
                launch(inst.as_ref(), LaunchArgs::gemm(&p, &a, &b, &mut c)).unwrap();
                c
            })
            .collect();
        assert_eq!(outputs[0], outputs[1], "prefetch {prefetch}");
    }
}

#[test]
fn test_post_ops_run_before_the_final_cast() {
    let mut rng = StdRng::seed_from_u64(19);
    let a = random(matrix(40, 64, F32, Layout::RowMajor), &mut rng);
    let b = random(matrix(64, 24, F32, Layout::RowMajor), &mut rng);
    let p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), matrix(40, 24, F32, Layout::RowMajor)).unwrap();
    let inst = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();
    let reference = reference_gemm(&a, &b);

    let scale = Scale(-0.5);
    let mut c = Tensor::zeros(p.operands()[2].clone());
    launch(inst.as_ref(), LaunchArgs::gemm(&p, &a, &b, &mut c).with_post_op(&scale)).unwrap();
    let expected: Vec<f64> = reference.iter().map(|v| -0.5 * v).collect();
    assert_close(&c.to_logical_f64(), &expected, F32);

    let relu = FnOp(|x: f64| x.max(0.0));
    let mut c = Tensor::zeros(p.operands()[2].clone());
    launch(inst.as_ref(), LaunchArgs::gemm(&p, &a, &b, &mut c).with_post_op(&relu)).unwrap();
    let expected: Vec<f64> = reference.iter().map(|v| v.max(0.0)).collect();
    assert_close(&c.to_logical_f64(), &expected, F32);
    assert!(c.to_logical_f64().iter().all(|&v| v >= 0.0));
}

#[test]
fn test_int8_output_saturates() {
    let p = ProblemDesc::gemm(
        matrix(16, 64, I8, Layout::RowMajor),
        matrix(64, 24, I8, Layout::RowMajor),
        matrix(16, 24, I8, Layout::RowMajor),
    )
    .unwrap();
    let a = Tensor::from_fn(p.operands()[0].clone(), |idx| if idx[0] % 2 == 0 { 100.0 } else { -100.0 });
    let b = Tensor::from_fn(p.operands()[1].clone(), |_| 100.0);
    let c = run_gemm(OperationFamily::Gemm, &p, &a, &b);
    for (i, v) in c.to_logical_f64().into_iter().enumerate() {
        let row = i / 24;
        assert_eq!(v, if row % 2 == 0 { 127.0 } else { -128.0 });
    }
}

#[test]
fn test_int8_gemm_is_exact() {
    let mut rng = StdRng::seed_from_u64(23);
    let p = ProblemDesc::gemm(
        matrix(20, 40, I8, Layout::RowMajor),
        matrix(40, 30, I8, Layout::RowMajor),
        matrix(20, 30, I8, Layout::RowMajor),
    )
    .unwrap();
    let a = Tensor::from_fn(p.operands()[0].clone(), |_| f64::from(rng.random_range(-2i8..=2)));
    let b = Tensor::from_fn(p.operands()[1].clone(), |_| f64::from(rng.random_range(-1i8..=1)));
    let c = run_gemm(OperationFamily::Gemm, &p, &a, &b);
    assert_eq!(c.to_logical_f64(), reference_gemm(&a, &b));
}

#[test]
fn test_mismatched_tensors_are_rejected() {
    let mut rng = StdRng::seed_from_u64(29);
    let a = random(matrix(64, 64, F16, Layout::RowMajor), &mut rng);
    let b = random(matrix(64, 64, F16, Layout::RowMajor), &mut rng);
    let p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), matrix(64, 64, F16, Layout::RowMajor)).unwrap();
    let inst = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();

    let mut wrong = Tensor::zeros(matrix(64, 32, F16, Layout::RowMajor));
    let err = launch(inst.as_ref(), LaunchArgs::gemm(&p, &a, &b, &mut wrong)).unwrap_err();
    assert!(matches!(err, KernelError::InvalidArguments(_)));
    assert!(wrong.to_logical_f64().iter().all(|&v| v == 0.0));

    let mut c = Tensor::zeros(p.operands()[2].clone());
    let bad_grid = GridDims { x: 9, y: 9, z: 1 };
    let err = inst.execute(LaunchArgs::gemm(&p, &a, &b, &mut c), &bad_grid).unwrap_err();
    assert!(matches!(err, KernelError::InvalidArguments(_)));

    let x = random(matrix(4, 64, F16, Layout::RowMajor), &mut rng);
    let gamma = Tensor::from_fn(OperandDesc::packed(&[64], F16, Layout::RowMajor).unwrap(), |_| 1.0);
    let norm_p = ProblemDesc::rmsnorm2d(x.desc().clone(), gamma.desc().clone(), x.desc().clone()).unwrap();
    let mut y = Tensor::zeros(x.desc().clone());
    let grid = inst.grid_shape(&p).unwrap();
    let err = inst
        .execute(LaunchArgs::rmsnorm2d(&norm_p, &x, &gamma, &mut y, None, 1e-5), &grid)
        .unwrap_err();
    assert!(matches!(err, KernelError::InvalidArguments(_)));
}

#[test]
fn test_instance_refuses_a_problem_of_another_type() {
    let int8 = instantiate(
        OperationFamily::Gemm,
        InstanceDescriptor::gemm(
            TileShape::new(16, 16, 8).warps(2, 2).warp_size(8),
            PipelineConfig::new(Scheduler::Intrawave, 1),
            [I8; 3],
            [Layout::RowMajor; 3],
            tile_kernels::problem::Padding::PadMNK,
        ),
    )
    .unwrap();
    let a = Tensor::row_major(&[1, 2], F16, &[1.5, 2.5]);
    let b = Tensor::row_major(&[2, 1], F16, &[0.5, 0.25]);
    let p = ProblemDesc::gemm(a.desc().clone(), b.desc().clone(), matrix(1, 1, F16, Layout::RowMajor)).unwrap();
    let mut c = Tensor::zeros(p.operands()[2].clone());
    let err = launch(int8.as_ref(), LaunchArgs::gemm(&p, &a, &b, &mut c)).unwrap_err();
    assert!(matches!(err, KernelError::InvalidArguments(_)), "{err:?}");
    assert_eq!(c.to_logical_f64(), vec![0.0]);

    // same types, transposed B
    let bt = Tensor::from_fn(matrix(2, 1, F16, Layout::ColumnMajor), |idx| b.get(idx));
    let rrr = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();
    let p = ProblemDesc::gemm(a.desc().clone(), bt.desc().clone(), matrix(1, 1, F16, Layout::RowMajor)).unwrap();
    let err = launch(rrr.as_ref(), LaunchArgs::gemm(&p, &a, &bt, &mut c)).unwrap_err();
    assert!(matches!(err, KernelError::InvalidArguments(_)), "{err:?}");
    assert_eq!(c.to_logical_f64(), vec![0.0]);
}

fn reference_avgpool_bwd(dout: &Tensor, in_lengths: &[usize], w: &PoolWindow) -> Vec<f64> {
    let o = dout.desc().lengths();
    let idx = |n: usize, p: [usize; 3], c: usize| {
        (((n * in_lengths[1] + p[0]) * in_lengths[2] + p[1]) * in_lengths[3] + p[2]) * in_lengths[4] + c
    };
    let mut din = vec![0.0; in_lengths.iter().product()];
    for n in 0..o[0] {
        for od in 0..o[1] {
            for oh in 0..o[2] {
                for ow in 0..o[3] {
                    for c in 0..o[4] {
                        let g = dout.get(&[n, od, oh, ow, c]) / w.volume() as f64;
                        for tz in 0..w.lengths[0] {
                            for ty in 0..w.lengths[1] {
                                for tx in 0..w.lengths[2] {
                                    let pos = [
                                        (od * w.strides[0] + tz * w.dilations[0]) as i64 - w.left_pads[0] as i64,
                                        (oh * w.strides[1] + ty * w.dilations[1]) as i64 - w.left_pads[1] as i64,
                                        (ow * w.strides[2] + tx * w.dilations[2]) as i64 - w.left_pads[2] as i64,
                                    ];
                                    if (0..3).any(|a| pos[a] < 0 || pos[a] >= in_lengths[a + 1] as i64) {
                                        continue;
                                    }
                                    din[idx(n, pos.map(|v| v as usize), c)] += g;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    din
}

#[test]
fn test_avgpool3d_bwd_matches_scattered_gradient() {
    let mut rng = StdRng::seed_from_u64(43);
    // overlapping, dilated and padded windows
    let window = PoolWindow::new([2, 3, 3], [1, 2, 2], [1, 1, 2], [0, 1, 1], [0, 1, 1]).unwrap();
    let in_lengths = [2usize, 5, 6, 7, 3];
    let out_lengths: Vec<usize> = (0..5)
        .map(|axis| match axis {
            0 | 4 => in_lengths[axis],
            _ => window.output_len(axis - 1, in_lengths[axis]).unwrap(),
        })
        .collect();
    let signed = |l: &[usize]| l.iter().map(|&v| v as i64).collect::<Vec<_>>();

    for dtype in [F16, F32] {
        let dout = random(OperandDesc::packed(&signed(&out_lengths), dtype, NDHWC).unwrap(), &mut rng);
        let din_desc = OperandDesc::packed(&signed(&in_lengths), dtype, NDHWC).unwrap();
        let p = ProblemDesc::avgpool3d_bwd(dout.desc().clone(), din_desc.clone(), window).unwrap();
        let inst = default_registry().select_instance(OperationFamily::AvgPool3dBwd, &p).unwrap();
        let mut din = Tensor::from_fn(din_desc, |_| 9.0);
        launch(inst.as_ref(), LaunchArgs::avgpool3d_bwd(&p, &dout, &mut din)).unwrap();
        assert_close(&din.to_logical_f64(), &reference_avgpool_bwd(&dout, &in_lengths, &window), dtype);
    }
}

#[test]
fn test_avgpool3d_bwd_leaves_uncovered_inputs_zero() {
    // stride 3 over a width-5 axis with a 2-wide window skips x = 2
    let window = PoolWindow::new([1, 1, 2], [1, 1, 3], [1, 1, 1], [0, 0, 0], [0, 0, 0]).unwrap();
    let dout = Tensor::from_fn(OperandDesc::packed(&[1, 1, 1, 2, 1], F32, NDHWC).unwrap(), |idx| {
        if idx[3] == 0 { 4.0 } else { 8.0 }
    });
    let din_desc = OperandDesc::packed(&[1, 1, 1, 5, 1], F32, NDHWC).unwrap();
    let p = ProblemDesc::avgpool3d_bwd(dout.desc().clone(), din_desc.clone(), window).unwrap();
    let inst = default_registry().select_instance(OperationFamily::AvgPool3dBwd, &p).unwrap();
    let mut din = Tensor::zeros(din_desc);
    launch(inst.as_ref(), LaunchArgs::avgpool3d_bwd(&p, &dout, &mut din)).unwrap();
    assert_eq!(din.to_logical_f64(), vec![2.0, 2.0, 0.0, 4.0, 4.0]);

    // forward arguments are refused
    let mut out = Tensor::zeros(dout.desc().clone());
    let err = launch(inst.as_ref(), LaunchArgs::pool3d(&p, &din, &mut out)).unwrap_err();
    assert!(matches!(err, KernelError::InvalidArguments(_)));
}

fn reference_smoothquant(x: &Tensor, xscale: &Tensor) -> (Vec<f64>, Vec<f64>) {
    let (m, n) = (x.desc().lengths()[0], x.desc().lengths()[1]);
    let mut qy = Vec::with_capacity(m * n);
    let mut scales = Vec::with_capacity(m);
    for r in 0..m {
        let y: Vec<f64> = (0..n).map(|c| x.get(&[r, c]) * xscale.get(&[c])).collect();
        let scale = y.iter().fold(0.0f64, |acc, v| acc.max(v.abs())) / 127.0;
        scales.push(scale);
        qy.extend(y.iter().map(|v| {
            if scale > 0.0 { (v / scale).round_ties_even().clamp(-128.0, 127.0) } else { 0.0 }
        }));
    }
    (qy, scales)
}

#[test]
fn test_smoothquant_matches_reference() {
    let mut rng = StdRng::seed_from_u64(47);
    for (dtype, (m, n)) in [(DataType::BF16, (5, 3072)), (F16, (9, 300)), (DataType::BF16, (16, 64))] {
        let x = random(matrix(m, n, dtype, Layout::RowMajor), &mut rng);
        let xscale = Tensor::from_fn(OperandDesc::packed(&[n], F32, Layout::RowMajor).unwrap(), |_| {
            rng.random_range(0.5..1.5)
        });
        let yscale_desc = OperandDesc::packed(&[m], F32, Layout::RowMajor).unwrap();
        let qy_desc = matrix(m, n, I8, Layout::RowMajor);
        let p = ProblemDesc::smoothquant(x.desc().clone(), xscale.desc().clone(), yscale_desc.clone(), qy_desc.clone())
            .unwrap();
        let inst = default_registry().select_instance(OperationFamily::Smoothquant, &p).unwrap();
        let mut yscale = Tensor::zeros(yscale_desc);
        let mut qy = Tensor::zeros(qy_desc);
        launch(inst.as_ref(), LaunchArgs::smoothquant(&p, &x, &xscale, &mut yscale, &mut qy)).unwrap();

        let (qy_ref, scale_ref) = reference_smoothquant(&x, &xscale);
        assert_eq!(qy.to_logical_f64(), qy_ref, "{dtype} {m}x{n}");
        assert_close(&yscale.to_logical_f64(), &scale_ref, F32);
        // every row reaches full scale at its largest element
        for r in 0..m {
            let row = &qy.to_logical_f64()[(r * n) as usize..((r + 1) * n) as usize];
            assert_eq!(row.iter().fold(0.0f64, |acc, v| acc.max(v.abs())), 127.0);
        }
    }
}

#[test]
fn test_smoothquant_zero_row_has_zero_scale() {
    let x = Tensor::row_major(&[2, 4], DataType::BF16, &[0.0, 0.0, 0.0, 0.0, 1.0, -4.0, 0.25, 0.0]);
    let xscale = Tensor::row_major(&[4], F32, &[1.0, 1.0, 2.0, 1.0]);
    let mut yscale = Tensor::zeros(OperandDesc::packed(&[2], F32, Layout::RowMajor).unwrap());
    let mut qy = Tensor::zeros(matrix(2, 4, I8, Layout::RowMajor));
    let p = ProblemDesc::smoothquant(
        x.desc().clone(),
        xscale.desc().clone(),
        yscale.desc().clone(),
        qy.desc().clone(),
    )
    .unwrap();
    let inst = default_registry().select_instance(OperationFamily::Smoothquant, &p).unwrap();
    launch(inst.as_ref(), LaunchArgs::smoothquant(&p, &x, &xscale, &mut yscale, &mut qy)).unwrap();
    assert_eq!(yscale.get(&[0]), 0.0);
    // second row: Y = [1, -4, 0.5, 0] against 4/127
    assert_eq!(qy.to_logical_f64(), vec![0.0, 0.0, 0.0, 0.0, 32.0, -127.0, 16.0, 0.0]);
}

fn reference_rmsnorm(x: &Tensor, gamma: &Tensor, epsilon: f64) -> (Vec<f64>, Vec<f64>) {
    let (m, n) = (x.desc().lengths()[0], x.desc().lengths()[1]);
    let mut y = Vec::with_capacity(m * n);
    let mut inv = Vec::with_capacity(m);
    for r in 0..m {
        let mean = (0..n).map(|c| x.get(&[r, c]).powi(2)).sum::<f64>() / n as f64;
        let s = 1.0 / (mean + epsilon).sqrt();
        inv.push(s);
        y.extend((0..n).map(|c| x.get(&[r, c]) * s * gamma.get(&[c])));
    }
    (y, inv)
}

#[test]
fn test_rmsnorm_matches_reference() {
    let mut rng = StdRng::seed_from_u64(31);
    for (dtype, (m, n)) in [(F16, (7, 200)), (DataType::BF16, (33, 64)), (F32, (5, 1000))] {
        let x = random(matrix(m, n, dtype, Layout::RowMajor), &mut rng);
        let gamma = random(OperandDesc::packed(&[n], dtype, Layout::RowMajor).unwrap(), &mut rng);
        let p = ProblemDesc::rmsnorm2d(x.desc().clone(), gamma.desc().clone(), x.desc().clone()).unwrap();
        let inst = default_registry().select_instance(OperationFamily::Rmsnorm2dFwd, &p).unwrap();

        let mut y = Tensor::zeros(x.desc().clone());
        let mut inv = Tensor::zeros(OperandDesc::packed(&[m], F32, Layout::RowMajor).unwrap());
        let epsilon = 1e-5;
        launch(
            inst.as_ref(),
            LaunchArgs::rmsnorm2d(&p, &x, &gamma, &mut y, Some(&mut inv), epsilon),
        )
        .unwrap();

        let (y_ref, inv_ref) = reference_rmsnorm(&x, &gamma, f64::from(epsilon));
        assert_close(&y.to_logical_f64(), &y_ref, dtype);
        assert_close(&inv.to_logical_f64(), &inv_ref, dtype);
    }
}

#[test]
fn test_rmsnorm_rejects_negative_epsilon() {
    let x = Tensor::row_major(&[2, 4], F32, &[1.0; 8]);
    let gamma = Tensor::row_major(&[4], F32, &[1.0; 4]);
    let p = ProblemDesc::rmsnorm2d(x.desc().clone(), gamma.desc().clone(), x.desc().clone()).unwrap();
    let inst = default_registry().select_instance(OperationFamily::Rmsnorm2dFwd, &p).unwrap();
    let mut y = Tensor::zeros(x.desc().clone());
    let err = launch(inst.as_ref(), LaunchArgs::rmsnorm2d(&p, &x, &gamma, &mut y, None, -1.0)).unwrap_err();
    assert!(matches!(err, KernelError::InvalidArguments(_)));
}

fn reference_pool(input: &Tensor, out_lengths: &[usize], w: &PoolWindow, reduce: ReduceOp) -> Vec<f64> {
    let i = input.desc().lengths();
    let mut out = Vec::new();
    for n in 0..out_lengths[0] {
        for od in 0..out_lengths[1] {
            for oh in 0..out_lengths[2] {
                for ow in 0..out_lengths[3] {
                    for c in 0..out_lengths[4] {
                        let mut sum = 0.0;
                        let mut max = f64::NEG_INFINITY;
                        for tz in 0..w.lengths[0] {
                            for ty in 0..w.lengths[1] {
                                for tx in 0..w.lengths[2] {
                                    let pos = [
                                        (od * w.strides[0] + tz * w.dilations[0]) as i64 - w.left_pads[0] as i64,
                                        (oh * w.strides[1] + ty * w.dilations[1]) as i64 - w.left_pads[1] as i64,
                                        (ow * w.strides[2] + tx * w.dilations[2]) as i64 - w.left_pads[2] as i64,
                                    ];
                                    if (0..3).any(|a| pos[a] < 0 || pos[a] >= i[a + 1] as i64) {
                                        continue;
                                    }
                                    let v = input.get(&[n, pos[0] as usize, pos[1] as usize, pos[2] as usize, c]);
                                    sum += v;
                                    max = max.max(v);
                                }
                            }
                        }
                        out.push(match reduce {
                            ReduceOp::Max => max,
                            _ => sum / w.volume() as f64,
                        });
                    }
                }
            }
        }
    }
    out
}

#[test]
fn test_pool3d_matches_reference() {
    let mut rng = StdRng::seed_from_u64(37);
    let window = PoolWindow::new([2, 3, 3], [1, 2, 2], [1, 1, 2], [0, 1, 1], [0, 1, 1]).unwrap();
    let in_lengths = [2usize, 5, 6, 7, 3];
    let out_lengths: Vec<usize> = (0..5)
        .map(|axis| match axis {
            0 | 4 => in_lengths[axis],
            _ => window.output_len(axis - 1, in_lengths[axis]).unwrap(),
        })
        .collect();
    let signed = |l: &[usize]| l.iter().map(|&v| v as i64).collect::<Vec<_>>();

    for dtype in [F16, F32] {
        let input = random(OperandDesc::packed(&signed(&in_lengths), dtype, NDHWC).unwrap(), &mut rng);
        for reduce in [ReduceOp::Avg, ReduceOp::Max] {
            let out_desc = OperandDesc::packed(&signed(&out_lengths), dtype, NDHWC).unwrap();
            let p = ProblemDesc::pool3d_fwd(input.desc().clone(), out_desc.clone(), window, reduce).unwrap();
            let inst = default_registry().select_instance(OperationFamily::Pool3dFwd, &p).unwrap();
            assert_eq!(inst.descriptor().reduce, reduce);
            let mut output = Tensor::zeros(out_desc);
            launch(inst.as_ref(), LaunchArgs::pool3d(&p, &input, &mut output)).unwrap();
            let expected = reference_pool(&input, &out_lengths, &window, reduce);
            assert_close(&output.to_logical_f64(), &expected, dtype);
        }
    }
}

#[test]
fn test_avg_pool_counts_padding_taps() {
    // 1x1x1x1 input, 1x1x3 window padded by one on each side
    let window = PoolWindow::new([1, 1, 3], [1, 1, 1], [1, 1, 1], [0, 0, 1], [0, 0, 1]).unwrap();
    let input = Tensor::from_fn(OperandDesc::packed(&[1, 1, 1, 1, 1], F32, NDHWC).unwrap(), |_| 3.0);
    let out_desc = OperandDesc::packed(&[1, 1, 1, 1, 1], F32, NDHWC).unwrap();
    let p = ProblemDesc::pool3d_fwd(input.desc().clone(), out_desc.clone(), window, ReduceOp::Avg).unwrap();
    let inst = default_registry().select_instance(OperationFamily::Pool3dFwd, &p).unwrap();
    let mut output = Tensor::zeros(out_desc);
    launch(inst.as_ref(), LaunchArgs::pool3d(&p, &input, &mut output)).unwrap();
    assert_eq!(output.to_logical_f64(), vec![1.0]);
}

#[test]
fn test_family_for_wrong_pool_reduction_has_no_match() {
    let window = PoolWindow::new([1, 1, 1], [1, 1, 1], [1, 1, 1], [0, 0, 0], [0, 0, 0]).unwrap();
    let d = OperandDesc::packed(&[1, 2, 2, 2, 4], DataType::BF16, NDHWC).unwrap();
    let p = ProblemDesc::pool3d_fwd(d.clone(), d, window, ReduceOp::Max).unwrap();
    assert!(matches!(
        default_registry().select_instance(OperationFamily::Pool3dFwd, &p),
        Err(KernelError::NoMatch { .. })
    ));
}
