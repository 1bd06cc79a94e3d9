use criterion::{
    BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main,
};
use pulsekit_ir::{
    BinOp, Demod, ElementConfig, Expr, HardwareConfig, Measure, Play,
    ProgramBuilder, PulseConfig, ScalarType, SealedProgram, StreamType,
    Transform, Value,
};
use pulsekit_wire as wire;

fn config() -> HardwareConfig {
    HardwareConfig::empty()
        .with_element(
            "qubit",
            ElementConfig::default().with_operation("pi", "pi_pulse"),
        )
        .with_element(
            "rr",
            ElementConfig::default()
                .with_input("out1")
                .with_operation("readout", "ro_pulse"),
        )
        .with_pulse("pi_pulse", PulseConfig::default())
        .with_pulse("ro_pulse", PulseConfig::default().with_weights("cos"))
}

/// `loops` nested counting loops, each playing and measuring once.
fn nested(loops: usize) -> SealedProgram {
    fn level(
        b: &mut ProgramBuilder,
        depth: usize,
        iq: pulsekit_ir::VarId,
        out: pulsekit_ir::StreamId,
    ) -> pulsekit_utils::PulseResult<()> {
        if depth == 0 {
            b.play(Play::new("pi", "qubit"))?;
            b.measure(Measure::new("readout", "rr").demod(Demod::full("cos", iq)))?;
            return b.save(b.var(iq)?, out);
        }
        let i = b.declare_variable(ScalarType::Int, None)?;
        let cond = Expr::binary(BinOp::Lt, b.var(i)?, Expr::int(8))?;
        let update = Expr::binary(BinOp::Add, b.var(i)?, Expr::int(1))?;
        b.for_(i, Expr::int(0), cond, update, |b| {
            b.wait(Expr::int(16), &["qubit"])?;
            level(b, depth - 1, iq, out)?;
            level(b, depth - 1, iq, out)
        })
    }

    let mut b = ProgramBuilder::new();
    let iq = b
        .declare_variable(ScalarType::Fixed, Some(Value::Fixed(0.0)))
        .unwrap();
    let out = b
        .declare_stream("iq", StreamType::Scalar(ScalarType::Fixed))
        .unwrap();
    b.attach(out, Transform::SaveAll).unwrap();
    level(&mut b, loops, iq, out).unwrap();
    b.seal().unwrap()
}

fn serialize_bench(c: &mut Criterion) {
    let config = config();
    let mut group = c.benchmark_group("serialize");
    for depth in [2, 4, 6, 8] {
        let program = nested(depth);
        group.bench_with_input(
            BenchmarkId::from_parameter(depth),
            &program,
            |b, program| b.iter(|| wire::serialize(program, &config).unwrap()),
        );
    }
    group.finish();

    let mut group = c.benchmark_group("deserialize");
    for depth in [2, 4, 6, 8] {
        let bytes = wire::serialize(&nested(depth), &config).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(depth),
            &bytes,
            |b, bytes| {
                b.iter_batched(
                    || bytes.clone(),
                    |bytes| wire::deserialize(&bytes).unwrap(),
                    BatchSize::SmallInput,
                )
            },
        );
    }
    group.finish();
}

criterion_group!(benches, serialize_bench);
criterion_main!(benches);
