use tile_kernels::dtype::DataType::{self, F16, F32, I8};
use tile_kernels::error::KernelError;
use tile_kernels::kernel::{InstanceDescriptor, KernelInstance, OperationFamily};
use tile_kernels::pipeline::{PipelineConfig, Scheduler};
use tile_kernels::planner::{GridDims, TileShape};
use tile_kernels::problem::{Layout, OperandDesc, Padding, ProblemDesc};
use tile_kernels::registry::{DeviceLimits, Registry, RegistryBuilder, default_registry};

fn gemm(m: i64, n: i64, k: i64, dtypes: [DataType; 3]) -> ProblemDesc {
    let op = |r, c, t| OperandDesc::packed(&[r, c], t, Layout::RowMajor).unwrap();
    ProblemDesc::gemm(op(m, k, dtypes[0]), op(k, n, dtypes[1]), op(m, n, dtypes[2])).unwrap()
}

fn f16_rrr(tile: TileShape, prefetch: u8, padding: Padding) -> InstanceDescriptor {
    InstanceDescriptor::gemm(
        tile,
        PipelineConfig::new(Scheduler::Intrawave, prefetch),
        [F16; 3],
        [Layout::RowMajor; 3],
        padding,
    )
}

fn wide_tile() -> TileShape {
    TileShape::new(128, 256, 64).warps(2, 2).vector(8)
}

#[test]
fn test_ragged_problem_selects_the_padding_instance() {
    let mut builder = RegistryBuilder::new();
    assert!(builder.register(OperationFamily::Gemm, f16_rrr(wide_tile(), 1, Padding::PadMN)).unwrap());
    let registry = builder.build();

    let p = gemm(127, 255, 64, [F16; 3]);
    let inst = registry.select_instance(OperationFamily::Gemm, &p).unwrap();
    assert_eq!(inst.descriptor().padding, Padding::PadMN);
    assert_eq!(inst.grid_shape(&p).unwrap(), GridDims { x: 1, y: 1, z: 1 });
    assert_eq!(
        inst.name(),
        "gemm_fp16_fp16_fp16_rrr_128x256x64_2x2x64_v8_Intrawave_p1_MNPadding"
    );
}

#[test]
fn test_int8_with_fp16_output_has_no_match() {
    let p = gemm(64, 64, 64, [I8, I8, F16]);
    let err = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap_err();
    match err {
        KernelError::NoMatch { family, reason } => {
            assert_eq!(family, OperationFamily::Gemm);
            assert!(reason.contains("i8"), "{reason}");
        }
        other => panic!("expected NoMatch, got {other:?}"),
    }
}

#[test]
fn test_selection_is_deterministic() {
    let p = gemm(300, 200, 96, [F16; 3]);
    let first = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap().name();
    for _ in 0..5 {
        let again = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();
        assert_eq!(again.name(), first);
    }

    let mut builder = Registry::builder();
    tile_kernels::instances::register_all(&mut builder).unwrap();
    let rebuilt = builder.build();
    assert_eq!(rebuilt.select_instance(OperationFamily::Gemm, &p).unwrap().name(), first);
}

#[test]
fn test_register_is_idempotent() {
    let mut builder = RegistryBuilder::new();
    let desc = f16_rrr(wide_tile(), 1, Padding::PadMN);
    assert!(builder.register(OperationFamily::Gemm, desc.clone()).unwrap());
    assert!(!builder.register(OperationFamily::Gemm, desc.clone()).unwrap());
    // same descriptor, different family
    assert!(builder.register(OperationFamily::GemmSplitK, desc).unwrap());
    let registry = builder.build();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.instances(OperationFamily::Gemm).len(), 1);
}

#[test]
fn test_exact_shape_prefers_nopad_variant() {
    let p = gemm(512, 256, 384, [F16; 3]);
    let inst = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();
    assert_eq!(inst.descriptor().padding, Padding::NoPad);
    assert_eq!(inst.descriptor().layouts, vec![Layout::RowMajor; 3]);
}

#[test]
fn test_ragged_shape_falls_back_to_padding_variant() {
    let p = gemm(100, 100, 64, [F16; 3]);
    let ranked = default_registry().rank_candidates(OperationFamily::Gemm, &p).unwrap();
    assert!(!ranked.is_empty());
    assert!(ranked.iter().all(|c| c.instance.descriptor().padding == Padding::PadMNK));
    assert_eq!(ranked[0].padded_volume, 128 * 128 * 64);
    let best = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();
    assert_eq!(best.name(), ranked[0].instance.name());
}

#[test]
fn test_candidates_are_ranked_by_padded_volume_then_order() {
    let p = gemm(100, 300, 64, [F16; 3]);
    let ranked = default_registry().rank_candidates(OperationFamily::Gemm, &p).unwrap();
    for pair in ranked.windows(2) {
        let key = |c: &tile_kernels::registry::Candidate| (c.padded_volume, c.index);
        assert!(key(&pair[0]) < key(&pair[1]));
    }
    assert!(ranked.iter().all(|c| c.padded_volume >= p.volume()));
}

#[test]
fn test_staging_overflow_disqualifies() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(OperationFamily::Gemm, f16_rrr(wide_tile(), 2, Padding::PadMN))
        .unwrap();
    let registry = builder.build();
    let inst = &registry.instances(OperationFamily::Gemm)[0];
    match inst.check_capacity(registry.limits()) {
        Err(KernelError::PipelineCapacity { required, available }) => {
            assert_eq!(required, 98_304);
            assert_eq!(available, 65_536);
        }
        other => panic!("expected PipelineCapacity, got {other:?}"),
    }

    let p = gemm(127, 255, 64, [F16; 3]);
    assert!(registry.rank_candidates(OperationFamily::Gemm, &p).unwrap().is_empty());
    let err = registry.select_instance(OperationFamily::Gemm, &p).unwrap_err();
    assert!(matches!(err, KernelError::NoMatch { .. }));
}

#[test]
fn test_larger_device_accepts_deep_pipeline() {
    let limits = DeviceLimits {
        shared_memory_bytes: 128 * 1024,
        ..DeviceLimits::default()
    };
    let mut builder = RegistryBuilder::new().with_limits(limits);
    builder
        .register(OperationFamily::Gemm, f16_rrr(wide_tile(), 2, Padding::PadMN))
        .unwrap();
    let registry = builder.build();
    let p = gemm(127, 255, 64, [F16; 3]);
    assert!(registry.select_instance(OperationFamily::Gemm, &p).is_ok());
}

#[test]
fn test_family_must_serve_the_problem_kind() {
    let p = gemm(64, 64, 64, [F16; 3]);
    let err = default_registry()
        .select_instance(OperationFamily::Rmsnorm2dFwd, &p)
        .unwrap_err();
    assert!(matches!(err, KernelError::NoMatch { family: OperationFamily::Rmsnorm2dFwd, .. }));
}

#[test]
fn test_plain_gemm_does_not_split_k() {
    let p = gemm(64, 64, 256, [F16; 3]).with_k_batch(2).unwrap();
    assert!(matches!(
        default_registry().select_instance(OperationFamily::Gemm, &p),
        Err(KernelError::NoMatch { .. })
    ));
    let inst = default_registry().select_instance(OperationFamily::GemmSplitK, &p).unwrap();
    assert_eq!(inst.grid_shape(&p).unwrap().z, 2);
}

#[test]
fn test_inconsistent_descriptors_are_rejected() {
    let mut builder = RegistryBuilder::new();

    // block_n not divisible by warps_n * vector
    let bad_tile = f16_rrr(TileShape::new(64, 60, 32).warps(2, 2).vector(8), 1, Padding::NoPad);
    assert!(matches!(
        builder.register(OperationFamily::Gemm, bad_tile),
        Err(KernelError::InvalidInstance(_))
    ));

    let no_prefetch = f16_rrr(wide_tile(), 0, Padding::NoPad);
    assert!(matches!(
        builder.register(OperationFamily::Gemm, no_prefetch),
        Err(KernelError::InvalidInstance(_))
    ));

    let narrow_acc = f16_rrr(TileShape::new(64, 64, 32), 1, Padding::NoPad).with_acc(F16);
    assert!(matches!(
        builder.register(OperationFamily::Gemm, narrow_acc),
        Err(KernelError::InvalidInstance(_))
    ));

    let int_acc_for_floats = f16_rrr(TileShape::new(64, 64, 32), 1, Padding::NoPad).with_acc(DataType::I32);
    assert!(matches!(
        builder.register(OperationFamily::Gemm, int_acc_for_floats),
        Err(KernelError::InvalidInstance(_))
    ));

    let gemm_as_pool = f16_rrr(TileShape::new(64, 64, 32), 1, Padding::NoPad);
    assert!(matches!(
        builder.register(OperationFamily::Pool3dFwd, gemm_as_pool),
        Err(KernelError::InvalidInstance(_))
    ));

    assert!(builder.build().is_empty());
}

#[test]
fn test_fp32_accumulates_in_fp64() {
    let p = gemm(64, 64, 64, [F32; 3]);
    let inst = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();
    assert_eq!(inst.descriptor().acc, DataType::F64);
    let p = gemm(64, 64, 64, [I8; 3]);
    let inst = default_registry().select_instance(OperationFamily::Gemm, &p).unwrap();
    assert_eq!(inst.descriptor().acc, DataType::I32);
}

#[test]
fn test_accumulator_must_be_wider_than_inputs() {
    let mut builder = RegistryBuilder::new();
    let tile = TileShape::new(64, 64, 32);
    let desc = |dtypes: [DataType; 3]| {
        InstanceDescriptor::gemm(tile, PipelineConfig::default(), dtypes, [Layout::RowMajor; 3], Padding::NoPad)
    };

    for narrow in [desc([DataType::F64; 3]).with_acc(F32), desc([F32; 3]).with_acc(F32), desc([I8; 3]).with_acc(F32)] {
        assert!(matches!(
            builder.register(OperationFamily::Gemm, narrow),
            Err(KernelError::InvalidInstance(_))
        ));
    }
    // wider than required is fine
    assert!(builder.register(OperationFamily::Gemm, desc([F16; 3]).with_acc(DataType::F64)).unwrap());
    assert!(builder.register(OperationFamily::Gemm, desc([F32; 3])).unwrap());
    assert_eq!(builder.build().len(), 2);
}

#[test]
fn test_catalogue_serves_pool_backward_and_smoothquant() {
    let ndhwc = Layout::Custom("NDHWC");
    let window = tile_kernels::problem::PoolWindow::new([2, 2, 2], [2, 2, 2], [1, 1, 1], [0, 0, 0], [0, 0, 0]).unwrap();
    let dout = OperandDesc::packed(&[1, 2, 2, 2, 8], F16, ndhwc).unwrap();
    let din = OperandDesc::packed(&[1, 4, 4, 4, 8], F16, ndhwc).unwrap();
    let p = ProblemDesc::avgpool3d_bwd(dout, din, window).unwrap();
    let inst = default_registry().select_instance(OperationFamily::AvgPool3dBwd, &p).unwrap();
    assert!(inst.name().starts_with("avgpool3d_bwd_fp16_fp16_NDHWC_"), "{}", inst.name());
    assert!(default_registry().select_instance(OperationFamily::Pool3dFwd, &p).is_err());

    let op = |l: &[i64], t| OperandDesc::packed(l, t, Layout::RowMajor).unwrap();
    let p = ProblemDesc::smoothquant(
        op(&[4, 3072], DataType::BF16),
        op(&[3072], F32),
        op(&[4], F32),
        op(&[4, 3072], I8),
    )
    .unwrap();
    let inst = default_registry().select_instance(OperationFamily::Smoothquant, &p).unwrap();
    assert_eq!(inst.descriptor().padding, Padding::NoPad);
    assert_eq!(inst.descriptor().acc, DataType::F64);

    // an fp32 QY is outside the family
    let mut builder = RegistryBuilder::new();
    let bad = InstanceDescriptor::smoothquant(
        TileShape::new(1, 1, 256),
        PipelineConfig::default(),
        [DataType::BF16, F32, F32, F32],
        Padding::PadMNK,
    );
    assert!(matches!(
        builder.register(OperationFamily::Smoothquant, bad),
        Err(KernelError::InvalidInstance(_))
    ));
}
