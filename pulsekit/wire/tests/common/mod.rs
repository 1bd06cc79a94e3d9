//! Programs and configurations shared by the integration tests.
#![allow(dead_code)]

use proptest::prelude::*;
use pulsekit_ir::{
    BinOp, CompilerOptions, Demod, DemodSource, ElementConfig, Expr,
    ForEachIter, HardwareConfig, IterSource, MapFunction, Measure, Play,
    ProgramBuilder, PulseConfig, ScalarType, SealedProgram, StreamId,
    StreamType, Transform, UnaryOp, Value, VarId, WaitForTrigger,
};
use std::collections::BTreeMap;
use pulsekit_utils::PulseResult;

/// A qubit driven by `pi` and a resonator read out through `out1`.
pub fn config() -> HardwareConfig {
    HardwareConfig::empty()
        .with_element("qubit", ElementConfig::default().with_operation("pi", "pi_pulse"))
        .with_element(
            "rr",
            ElementConfig::default()
                .with_input("out1")
                .with_operation("readout", "ro_pulse"),
        )
        .with_pulse("pi_pulse", PulseConfig::default())
        .with_pulse(
            "ro_pulse",
            PulseConfig::default().with_weights("cos").with_weights("sin"),
        )
}

/// How a generated `measure` demodulates and scales its pulse.
#[derive(Debug, Clone)]
pub enum Readout {
    Full,
    Sliced(u32),
    Accumulated(u32),
}

/// One building step of a generated program.
#[derive(Debug, Clone)]
pub enum Step {
    Bump(i32),
    Scale(f64),
    Negate,
    Truncate,
    Store(u8, i32),
    Wait(i32),
    Play,
    PlayMatrix(f64, i32),
    Measure,
    Readout(Readout, bool),
    Save,
    SaveFlag,
    SavePair,
    Declare(i32),
    Rotate(f64),
    Retune(i32, bool),
    ResetPhase,
    ResetFrame,
    Align,
    Pause,
    Trigger(bool, bool, bool),
    Loop(i32, Vec<Step>),
    While(Vec<Step>),
    Branch(bool, Vec<Step>, Option<Vec<Step>>),
    Strict(Vec<Step>),
    Each(Vec<i32>, Vec<Step>),
    EachCell(Vec<Step>),
    Switch(BTreeMap<i32, Vec<Step>>, Option<Vec<Step>>),
    Forever(Vec<Step>),
}

struct Handles {
    x: VarId,
    amp: VarId,
    iq: VarId,
    flag: VarId,
    table: VarId,
    slices: VarId,
    stamp: VarId,
    out: StreamId,
    flags: StreamId,
    pairs: StreamId,
    raw: StreamId,
}

fn body(b: &mut ProgramBuilder, h: &Handles, steps: &[Step]) -> PulseResult<()> {
    steps.iter().try_for_each(|s| apply(b, h, s))
}

fn apply(b: &mut ProgramBuilder, h: &Handles, step: &Step) -> PulseResult<()> {
    match step {
        Step::Bump(k) => {
            let value = Expr::binary(BinOp::Add, b.var(h.x)?, Expr::int(*k))?;
            b.assign(h.x, value)
        }
        Step::Scale(s) => {
            let value = Expr::binary(BinOp::Mul, b.var(h.amp)?, Expr::fixed(*s))?;
            b.assign(h.amp, value)
        }
        Step::Negate => b.assign(h.x, Expr::unary(UnaryOp::Neg, b.var(h.x)?)?),
        Step::Truncate => b.assign(h.x, Expr::cast(ScalarType::Int, b.var(h.amp)?)?),
        Step::Store(cell, k) => {
            let index = Expr::int(i32::from(*cell % 3));
            let value = Expr::binary(BinOp::Sub, b.cell(h.table, index.clone())?, Expr::int(*k))?;
            b.assign_cell(h.table, index, value)
        }
        Step::Wait(d) => b.wait(Expr::int(*d), &["qubit"]),
        Step::Play => b.play(Play::new("pi", "qubit").amp(b.var(h.amp)?)),
        Step::PlayMatrix(c, d) => {
            let cells = [b.var(h.amp)?, Expr::fixed(*c), Expr::fixed(-*c), b.var(h.amp)?];
            b.play(
                Play::new("pi", "qubit")
                    .amp_matrix(cells)
                    .duration(Expr::int(*d))
                    .condition(b.var(h.flag)?),
            )
        }
        Step::Measure => {
            b.measure(Measure::new("readout", "rr").demod(Demod::full("cos", h.iq)))
        }
        Step::Readout(readout, scaled) => {
            let demod = match readout {
                Readout::Full => Demod::full("sin", h.iq),
                Readout::Sliced(chunk) => Demod::sliced("sin", *chunk, h.slices),
                Readout::Accumulated(chunk) => Demod::accumulated("cos", *chunk, h.slices),
            };
            let mut measure = Measure::new("readout", "rr")
                .demod(demod.on_port("out1"))
                .adc(h.raw);
            if *scaled {
                measure = measure.amp(b.var(h.amp)?);
            }
            b.measure(measure)
        }
        Step::Save => b.save(b.var(h.x)?, h.out),
        Step::SaveFlag => b.save(b.var(h.flag)?, h.flags),
        Step::SavePair => b.save(b.var(h.x)?, h.pairs),
        Step::Declare(k) => {
            let v = b.declare_variable(ScalarType::Int, Some(Value::Int(*k)))?;
            let sum = Expr::binary(BinOp::Add, b.var(h.x)?, b.var(v)?)?;
            b.assign(h.x, sum)
        }
        Step::Rotate(angle) => b.frame_rotation(Expr::fixed(*angle), "qubit"),
        Step::Retune(f, keep) => b.update_frequency("qubit", Expr::int(*f), *keep),
        Step::ResetPhase => b.reset_phase("rr"),
        Step::ResetFrame => b.reset_frame(&["qubit", "rr"]),
        Step::Align => b.align(&["qubit", "rr"]),
        Step::Pause => b.pause(),
        Step::Trigger(pulse, external, tagged) => {
            let mut wait = WaitForTrigger::new("rr");
            if *pulse {
                wait = wait.playing("readout");
            }
            if *external {
                wait = wait.from_element("qubit", Some("trig"));
            }
            if *tagged {
                wait = wait.time_tag(h.stamp);
            }
            b.wait_for_trigger(wait)
        }
        Step::Loop(n, steps) => {
            let i = b.declare_variable(ScalarType::Int, None)?;
            let cond = Expr::binary(BinOp::Lt, b.var(i)?, Expr::int(*n))?;
            let update = Expr::binary(BinOp::Add, b.var(i)?, Expr::int(1))?;
            b.for_(i, Expr::int(0), cond, update, |b| body(b, h, steps))
        }
        Step::Branch(negate, then, otherwise) => {
            let mut cond = Expr::binary(BinOp::Gt, b.var(h.x)?, Expr::int(0))?;
            if *negate {
                cond = Expr::unary(UnaryOp::Not, cond)?;
            }
            b.if_(cond, |b| body(b, h, then))?;
            match otherwise {
                Some(steps) => b.else_(|b| body(b, h, steps)),
                None => Ok(()),
            }
        }
        Step::While(steps) => {
            let cond = Expr::unary(UnaryOp::Not, b.var(h.flag)?)?;
            b.while_(cond, |b| {
                b.assign(h.flag, Expr::bool(true))?;
                body(b, h, steps)
            })
        }
        Step::Strict(steps) => b.strict_timing(|b| body(b, h, steps)),
        Step::Each(values, steps) => {
            let t = b.declare_variable(ScalarType::Int, None)?;
            let iterator = ForEachIter {
                var: t,
                source: IterSource::Values(values.iter().map(|v| Value::Int(*v)).collect()),
            };
            b.for_each(vec![iterator], |b| {
                b.wait(b.var(t)?, &["qubit"])?;
                body(b, h, steps)
            })
        }
        Step::EachCell(steps) => {
            let t = b.declare_variable(ScalarType::Int, None)?;
            let iterator = ForEachIter {
                var: t,
                source: IterSource::Array(h.table),
            };
            b.for_each(vec![iterator], |b| {
                b.assign(h.x, b.var(t)?)?;
                body(b, h, steps)
            })
        }
        Step::Switch(cases, default) => b.switch_(b.var(h.x)?, |b| {
            for (value, steps) in cases {
                b.case_(*value, |b| body(b, h, steps))?;
            }
            match default {
                Some(steps) => b.default_(|b| body(b, h, steps)),
                None => Ok(()),
            }
        }),
        Step::Forever(steps) => b.infinite_loop(|b| body(b, h, steps)),
    }
}

/// Replay `steps` on a fresh builder.
pub fn build(steps: &[Step], options: Option<CompilerOptions>) -> SealedProgram {
    use ScalarType::*;
    let mut b = ProgramBuilder::new();
    let h = Handles {
        x: b.declare_variable(Int, Some(Value::Int(0))).unwrap(),
        amp: b.declare_variable(Fixed, Some(Value::Fixed(0.5))).unwrap(),
        iq: b.declare_variable(Fixed, None).unwrap(),
        flag: b.declare_variable(Bool, Some(Value::Bool(false))).unwrap(),
        table: b
            .declare_array(Int, 3, vec![Value::Int(1), Value::Int(2), Value::Int(3)])
            .unwrap(),
        slices: b.declare_array(Fixed, 4, vec![]).unwrap(),
        stamp: b.declare_variable(Int, None).unwrap(),
        out: b.declare_stream("out", StreamType::Scalar(Int)).unwrap(),
        flags: b.declare_stream("flags", StreamType::Scalar(Bool)).unwrap(),
        pairs: b.declare_stream("pairs", StreamType::Scalar(Int)).unwrap(),
        raw: b
            .declare_stream("raw", StreamType::Array(Int, 16))
            .unwrap(),
    };
    let source = || DemodSource::new("rr", &["out1"]);
    let weights = || [Expr::fixed(1.0), Expr::fixed(0.0)];
    let pipelines = [
        (h.out, Transform::Buffer(4)),
        (h.out, Transform::map(MapFunction::Average)),
        (h.out, Transform::Save),
        (h.flags, Transform::map(MapFunction::BooleanToInt)),
        (h.flags, Transform::Save),
        (h.pairs, Transform::Zip { with: h.flags, item: Int }),
        (h.pairs, Transform::Skip(1)),
        (h.pairs, Transform::SkipLast(1)),
        (h.pairs, Transform::Take(4)),
        (h.pairs, Transform::SaveAll),
        (h.raw, Transform::map(MapFunction::Fft)),
        (h.raw, Transform::Flatten),
        (h.raw, Transform::Cast(Int)),
        (h.raw, Transform::Buffer(8)),
        (h.raw, Transform::demod(false, weights(), source())),
        (h.raw, Transform::SaveAll),
    ];
    for (stream, transform) in pipelines {
        b.attach(stream, transform).unwrap();
    }
    let summed = b.declare_stream("summed", StreamType::Array(Int, 16)).unwrap();
    b.attach(summed, Transform::demod(true, weights(), source())).unwrap();
    b.attach(summed, Transform::Save).unwrap();
    let bits = b.declare_stream("bits", StreamType::Array(Bool, 4)).unwrap();
    for transform in [
        Transform::map(MapFunction::BooleanOr),
        Transform::Buffer(2),
        Transform::map(MapFunction::BooleanXor),
        Transform::Buffer(2),
        Transform::map(MapFunction::BooleanAnd),
        Transform::Cast(Int),
        Transform::Save,
    ] {
        b.attach(bits, transform).unwrap();
    }
    if let Some(options) = options {
        b.set_compiler_options(options).unwrap();
    }
    body(&mut b, &h, steps).unwrap();
    b.seal().unwrap()
}

/// A counting loop with a few hardware statements in it.
pub fn sample() -> SealedProgram {
    build(
        &[
            Step::Loop(
                10,
                vec![Step::Bump(1), Step::Play, Step::Measure, Step::Save],
            ),
            Step::Branch(false, vec![Step::Scale(0.25)], Some(vec![Step::Wait(16)])),
            Step::Each(vec![4, 8], vec![Step::Strict(vec![Step::Declare(3)])]),
            Step::Switch(
                BTreeMap::from([
                    (0, vec![Step::Rotate(0.5), Step::ResetFrame]),
                    (1, vec![Step::Store(1, 2), Step::Negate]),
                ]),
                Some(vec![Step::Readout(Readout::Sliced(4), true)]),
            ),
            Step::Forever(vec![
                Step::Trigger(true, true, true),
                Step::SaveFlag,
                Step::SavePair,
            ]),
        ],
        None,
    )
}

pub fn arb_step() -> impl Strategy<Value = Step> {
    let leaf = prop_oneof![
        any::<i32>().prop_map(Step::Bump),
        (-1.0f64..1.0).prop_map(Step::Scale),
        (4i32..1000).prop_map(Step::Wait),
        Just(Step::Play),
        Just(Step::Measure),
        Just(Step::Save),
        any::<i32>().prop_map(Step::Declare),
        Just(Step::Negate),
        Just(Step::Truncate),
        (any::<u8>(), any::<i32>()).prop_map(|(c, k)| Step::Store(c, k)),
        (-1.0f64..1.0, 4i32..1000).prop_map(|(c, d)| Step::PlayMatrix(c, d)),
        (arb_readout(), any::<bool>()).prop_map(|(r, s)| Step::Readout(r, s)),
        Just(Step::SaveFlag),
        Just(Step::SavePair),
        (-2.0f64..2.0).prop_map(Step::Rotate),
        (any::<i32>(), any::<bool>()).prop_map(|(f, k)| Step::Retune(f, k)),
        Just(Step::ResetPhase),
        Just(Step::ResetFrame),
        Just(Step::Align),
        Just(Step::Pause),
        (any::<bool>(), any::<bool>(), any::<bool>())
            .prop_map(|(p, e, t)| Step::Trigger(p, e, t)),
    ];
    leaf.prop_recursive(4, 48, 4, |inner| {
        let steps = prop::collection::vec(inner, 0..4);
        prop_oneof![
            steps.clone().prop_map(Step::While),
            steps.clone().prop_map(Step::EachCell),
            steps.clone().prop_map(Step::Forever),
            (
                prop::collection::btree_map(any::<i32>(), steps.clone(), 1..3),
                prop::option::of(steps.clone()),
            )
                .prop_map(|(cases, default)| Step::Switch(cases, default)),
            (1i32..100, steps.clone()).prop_map(|(n, s)| Step::Loop(n, s)),
            (any::<bool>(), steps.clone(), prop::option::of(steps.clone()))
                .prop_map(|(neg, t, e)| Step::Branch(neg, t, e)),
            steps.clone().prop_map(Step::Strict),
            (prop::collection::vec(any::<i32>(), 1..4), steps)
                .prop_map(|(v, s)| Step::Each(v, s)),
        ]
    })
}

fn arb_readout() -> impl Strategy<Value = Readout> {
    prop_oneof![
        Just(Readout::Full),
        (1u32..64).prop_map(Readout::Sliced),
        (1u32..64).prop_map(Readout::Accumulated),
    ]
}

pub fn arb_options() -> impl Strategy<Value = Option<CompilerOptions>> {
    prop::option::of(
        (any::<bool>(), prop::collection::vec("[a-z-]{1,8}", 0..3))
            .prop_map(|(strict, flags)| CompilerOptions { strict, flags }),
    )
}

prop_compose! {
    pub fn arb_program()(
        steps in prop::collection::vec(arb_step(), 0..6),
        options in arb_options(),
    ) -> (Vec<Step>, Option<CompilerOptions>) {
        (steps, options)
    }
}
