//! Well-formedness checks.
//!
//! [`check_scopes`] runs when a program is sealed and catches references to
//! variables and streams that are not declared in the referencing block or
//! one of its ancestors. [`check_zips`] runs next and re-checks zipped
//! pipelines. [`check_config`] resolves every hardware name used by a
//! program against a configuration.
use crate::{
    Assign, AssignTarget, Block, BlockId, Decl, ElementConfig, Expr, ExprKind,
    HardwareConfig, IterSource, Program, PulseConfig, Statement, StreamId,
    StreamType, Transform, Trigger, VarId,
    program::Variable,
    stream::{DemodSource, Stream},
};
use pulsekit_utils::{Error, PulseResult, RefKind};

/// Blocks enclosing the statement being checked.
#[derive(Default)]
struct ActiveScopes {
    blocks: Vec<BlockId>,
}

impl ActiveScopes {
    fn push(&mut self, block: BlockId) {
        self.blocks.push(block);
    }

    fn pop(&mut self) {
        self.blocks.pop();
    }

    fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }
}

struct ScopeChecker<'a> {
    program: &'a Program,
    active: ActiveScopes,
}

/// Check scoping of the tree rooted at `root` against the tables of
/// `program`.
pub(crate) fn check_scopes(program: &Program, root: &Block) -> PulseResult<()> {
    let mut checker = ScopeChecker {
        program,
        active: ActiveScopes::default(),
    };
    checker.block(root)
}

/// Every zipped stream must still produce the scalar type recorded when
/// it was zipped in. Its own pipeline may have grown since.
pub(crate) fn check_zips(program: &Program) -> PulseResult<()> {
    for stream in program.streams() {
        for transform in &stream.pipeline {
            let Transform::Zip { with, item } = transform else {
                continue;
            };
            let other = program.lookup_stream(*with)?;
            let produced = other.output_type();
            if produced != StreamType::Scalar(*item) {
                return Err(Error::invalid_pipeline(
                    &stream.name,
                    format!(
                        "`{}` was zipped in as {item} but now produces {produced}",
                        other.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

impl<'a> ScopeChecker<'a> {
    fn block(&mut self, block: &Block) -> PulseResult<()> {
        self.active.push(block.id);
        for stmt in &block.stmts {
            self.stmt(stmt)?;
        }
        self.active.pop();
        Ok(())
    }

    fn var(&self, id: VarId) -> PulseResult<&'a Variable> {
        let var = self.program.lookup(id)?;
        if self.active.contains(var.scope) {
            Ok(var)
        } else {
            Err(Error::unresolved(RefKind::Variable, id))
        }
    }

    fn stream(&self, id: StreamId) -> PulseResult<&'a Stream> {
        let stream = self.program.lookup_stream(id)?;
        if self.active.contains(stream.scope) {
            Ok(stream)
        } else {
            Err(Error::unresolved(RefKind::Stream, &stream.name))
        }
    }

    fn expr(&self, expr: &Expr) -> PulseResult<()> {
        let (id, indexed) = match expr.kind() {
            ExprKind::Var(id) => (Some(*id), false),
            ExprKind::ArrayCell { array, .. } => (Some(*array), true),
            _ => (None, false),
        };
        if let Some(id) = id {
            let var = self.var(id)?;
            if var.is_array() != indexed || var.ty != expr.ty() {
                return Err(Error::type_mismatch(format!(
                    "reference `{expr}` does not match the declaration of {id}"
                )));
            }
        }
        expr.children().into_iter().try_for_each(|c| self.expr(c))
    }

    fn assign(&self, assign: &Assign) -> PulseResult<()> {
        self.var(assign.target.var())?;
        if let AssignTarget::Cell { index, .. } = &assign.target {
            self.expr(index)?;
        }
        self.expr(&assign.value)
    }

    fn stmt(&mut self, stmt: &Statement) -> PulseResult<()> {
        match stmt {
            Statement::Assign(assign) => self.assign(assign),
            Statement::Play(play) => {
                play.amp
                    .iter()
                    .flat_map(|amp| amp.exprs())
                    .chain(&play.duration)
                    .chain(&play.condition)
                    .try_for_each(|e| self.expr(e))
            }
            Statement::Measure(measure) => {
                measure
                    .amp
                    .iter()
                    .flat_map(|amp| amp.exprs())
                    .try_for_each(|e| self.expr(e))?;
                for process in &measure.processes {
                    self.var(process.target)?;
                }
                if let Some(adc) = measure.adc_stream {
                    self.stream(adc)?;
                }
                Ok(())
            }
            Statement::Wait(wait) => self.expr(&wait.duration),
            Statement::Declare(Decl::Var(id)) => self.var(*id).map(|_| ()),
            Statement::Declare(Decl::Stream(id)) => self.stream(*id).map(|_| ()),
            Statement::If(stmt) => {
                self.expr(&stmt.cond)?;
                self.block(&stmt.then)?;
                if let Some(otherwise) = &stmt.otherwise {
                    self.block(otherwise)?;
                }
                Ok(())
            }
            Statement::For(stmt) => {
                // The header is evaluated in the enclosing scope.
                stmt.init
                    .iter()
                    .chain(&stmt.update)
                    .try_for_each(|a| self.assign(a))?;
                self.expr(&stmt.cond)?;
                self.block(&stmt.body)
            }
            Statement::ForEach(stmt) => {
                for it in &stmt.iterators {
                    self.var(it.var)?;
                    if let IterSource::Array(array) = it.source {
                        self.var(array)?;
                    }
                }
                self.block(&stmt.body)
            }
            Statement::Switch(switch) => {
                self.expr(&switch.expr)?;
                if switch.cases.is_empty() {
                    return Err(Error::invalid_scope("switch without any case"));
                }
                for body in stmt.blocks() {
                    self.block(body)?;
                }
                Ok(())
            }
            Statement::InfiniteLoop(body) | Statement::StrictTiming(body) => {
                self.block(body)
            }
            Statement::WaitForTrigger(wait) => match wait.time_tag {
                Some(target) => self.var(target).map(|_| ()),
                None => Ok(()),
            },
            Statement::Save(save) => {
                self.expr(&save.source)?;
                self.stream(save.stream).map(|_| ())
            }
            Statement::FrameRotation(rot) => self.expr(&rot.angle),
            Statement::UpdateFrequency(upd) => self.expr(&upd.frequency),
            Statement::Align(_)
            | Statement::ResetPhase(_)
            | Statement::ResetFrame(_)
            | Statement::Pause => Ok(()),
        }
    }
}

/// Resolves hardware names against a configuration.
struct Resolver<'a> {
    config: &'a HardwareConfig,
}

/// Resolve every element, operation, pulse, input port and integration
/// weights name used by `program` against `config`.
pub(crate) fn check_config(
    program: &Program,
    config: &HardwareConfig,
) -> PulseResult<()> {
    let resolver = Resolver { config };
    resolver.block(program.root())?;
    for stream in program.streams() {
        for transform in &stream.pipeline {
            if let Transform::Map {
                source: Some(source),
                ..
            } = transform
            {
                resolver.demod_source(source)?;
            }
        }
    }
    Ok(())
}

impl<'a> Resolver<'a> {
    fn element(&self, name: &str) -> PulseResult<&'a ElementConfig> {
        self.config
            .element(name)
            .ok_or_else(|| Error::unresolved(RefKind::Element, name))
    }

    /// The pulse an element plays for `operation`.
    fn operation(
        &self,
        element: &str,
        operation: &str,
    ) -> PulseResult<&'a PulseConfig> {
        let pulse = self
            .element(element)?
            .operations
            .get(operation)
            .ok_or_else(|| Error::unresolved(RefKind::Pulse, operation))?;
        self.config
            .pulse(pulse)
            .ok_or_else(|| Error::unresolved(RefKind::Pulse, pulse))
    }

    fn input_port(&self, element: &str, port: &str) -> PulseResult<()> {
        if self.element(element)?.inputs.iter().any(|p| p == port) {
            Ok(())
        } else {
            Err(Error::unresolved(RefKind::Port, format!("{element}.{port}")))
        }
    }

    fn demod_source(&self, source: &DemodSource) -> PulseResult<()> {
        self.element(&source.element)?;
        source
            .inputs
            .iter()
            .try_for_each(|port| self.input_port(&source.element, port))
    }

    fn block(&self, block: &Block) -> PulseResult<()> {
        block.stmts.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&self, stmt: &Statement) -> PulseResult<()> {
        match stmt {
            Statement::Play(play) => {
                self.operation(&play.element, &play.pulse).map(|_| ())
            }
            Statement::Measure(measure) => {
                let pulse = self.operation(&measure.element, &measure.pulse)?;
                let element = self.element(&measure.element)?;
                for process in &measure.processes {
                    if !pulse.integration_weights.contains(&process.weights) {
                        return Err(Error::unresolved(
                            RefKind::Weights,
                            &process.weights,
                        ));
                    }
                    match &process.port {
                        Some(port) => self.input_port(&measure.element, port)?,
                        None if element.inputs.is_empty() => {
                            return Err(Error::unresolved(
                                RefKind::Port,
                                format!("{}.<any>", measure.element),
                            ));
                        }
                        None => (),
                    }
                }
                Ok(())
            }
            Statement::Wait(wait) => wait
                .elements
                .iter()
                .try_for_each(|e| self.element(e).map(|_| ())),
            Statement::Align(align) => align
                .elements
                .iter()
                .try_for_each(|e| self.element(e).map(|_| ())),
            Statement::FrameRotation(rot) => self.element(&rot.element).map(|_| ()),
            Statement::ResetPhase(reset) => {
                self.element(&reset.element).map(|_| ())
            }
            Statement::UpdateFrequency(upd) => {
                self.element(&upd.element).map(|_| ())
            }
            Statement::ResetFrame(reset) => reset
                .elements
                .iter()
                .try_for_each(|e| self.element(e).map(|_| ())),
            Statement::WaitForTrigger(wait) => {
                match &wait.pulse {
                    Some(pulse) => self.operation(&wait.element, pulse).map(|_| ())?,
                    None => self.element(&wait.element).map(|_| ())?,
                }
                match &wait.trigger {
                    Trigger::Element { element, .. } => {
                        self.element(element).map(|_| ())
                    }
                    Trigger::Global => Ok(()),
                }
            }
            _ => stmt.blocks().into_iter().try_for_each(|b| self.block(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        BinOp, Demod, ElementConfig, Expr, HardwareConfig, Measure, Play,
        ProgramBuilder, PulseConfig, ScalarType, StreamType, Transform,
        WaitForTrigger, stream::DemodSource,
    };
    use pulsekit_utils::{Error, RefKind};

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
            .with_pulse(
                "ro_pulse",
                PulseConfig::default().with_weights("cos").with_weights("sin"),
            )
    }

    #[test]
    fn sibling_block_reference_fails_at_seal() {
        let mut b = ProgramBuilder::new();
        let flag = b.declare_variable(ScalarType::Bool, None).unwrap();
        let mut inner = None;
        b.if_(b.var(flag).unwrap(), |b| {
            inner = Some(b.declare_variable(ScalarType::Int, None)?);
            Ok(())
        })
        .unwrap();
        let inner = inner.unwrap();
        // Building the reference succeeds; only sealing sees the scope.
        b.strict_timing(|b| {
            let bumped = Expr::binary(BinOp::Add, b.var(inner)?, Expr::int(1))?;
            b.assign(inner, bumped)
        })
        .unwrap();
        let err = b.seal().unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedReference {
                kind: RefKind::Variable,
                ..
            }
        ));
        assert!(!b.is_sealed());
    }

    #[test]
    fn ancestor_references_are_fine() {
        let mut b = ProgramBuilder::new();
        let x = b.declare_variable(ScalarType::Int, None).unwrap();
        b.strict_timing(|b| {
            b.strict_timing(|b| b.assign(x, Expr::int(3)))
        })
        .unwrap();
        b.seal().unwrap();
    }

    #[test]
    fn unknown_element_is_reported_by_name() {
        let mut b = ProgramBuilder::new();
        b.play(Play::new("pi", "qubit")).unwrap();
        b.play(Play::new("pi", "coupler")).unwrap();
        let program = b.seal().unwrap();
        match program.validate(&config()) {
            Err(Error::UnresolvedReference {
                kind: RefKind::Element,
                name,
            }) => assert_eq!(name, "coupler"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn measure_resolves_weights_and_ports() {
        let mut b = ProgramBuilder::new();
        let i = b.declare_variable(ScalarType::Fixed, None).unwrap();
        b.measure(Measure::new("readout", "rr").demod(Demod::full("cos", i)))
            .unwrap();
        b.measure(
            Measure::new("readout", "rr").demod(Demod::full("cos", i).on_port("out2")),
        )
        .unwrap();
        let program = b.seal().unwrap();
        assert!(matches!(
            program.validate(&config()),
            Err(Error::UnresolvedReference {
                kind: RefKind::Port,
                ..
            })
        ));

        let mut b = ProgramBuilder::new();
        let i = b.declare_variable(ScalarType::Fixed, None).unwrap();
        b.measure(Measure::new("readout", "rr").demod(Demod::full("minus_sin", i)))
            .unwrap();
        let program = b.seal().unwrap();
        assert!(matches!(
            program.validate(&config()),
            Err(Error::UnresolvedReference {
                kind: RefKind::Weights,
                ..
            })
        ));
    }

    #[test]
    fn unknown_operation_is_an_unresolved_pulse() {
        let mut b = ProgramBuilder::new();
        b.play(Play::new("x90", "qubit")).unwrap();
        let program = b.seal().unwrap();
        assert!(matches!(
            program.validate(&config()),
            Err(Error::UnresolvedReference {
                kind: RefKind::Pulse,
                ..
            })
        ));
    }

    #[test]
    fn trigger_and_frame_names_resolve() {
        let mut b = ProgramBuilder::new();
        b.reset_frame(&["qubit", "rr"]).unwrap();
        b.wait_for_trigger(WaitForTrigger::new("qubit").playing("pi"))
            .unwrap();
        let program = b.seal().unwrap();
        program.validate(&config()).unwrap();

        let mut b = ProgramBuilder::new();
        b.wait_for_trigger(WaitForTrigger::new("qubit").from_element("coupler", None))
            .unwrap();
        let program = b.seal().unwrap();
        assert!(matches!(
            program.validate(&config()),
            Err(Error::UnresolvedReference {
                kind: RefKind::Element,
                ..
            })
        ));

        let mut b = ProgramBuilder::new();
        b.wait_for_trigger(WaitForTrigger::new("qubit").playing("readout"))
            .unwrap();
        let program = b.seal().unwrap();
        assert!(matches!(
            program.validate(&config()),
            Err(Error::UnresolvedReference {
                kind: RefKind::Pulse,
                ..
            })
        ));
    }

    #[test]
    fn switch_branches_are_scoped() {
        let mut b = ProgramBuilder::new();
        let x = b.declare_variable(ScalarType::Int, None).unwrap();
        let mut inner = None;
        b.switch_(b.var(x).unwrap(), |b| {
            b.case_(0, |b| {
                inner = Some(b.declare_variable(ScalarType::Int, None)?);
                Ok(())
            })?;
            b.default_(|b| b.assign(x, Expr::int(1)))
        })
        .unwrap();
        let inner = inner.unwrap();
        b.infinite_loop(|b| b.assign(inner, Expr::int(2))).unwrap();
        assert!(matches!(
            b.seal(),
            Err(Error::UnresolvedReference {
                kind: RefKind::Variable,
                ..
            })
        ));
    }

    #[test]
    fn demod_sources_resolve_against_config() {
        let mut b = ProgramBuilder::new();
        let s = b
            .declare_stream("iq", StreamType::Array(ScalarType::Int, 64))
            .unwrap();
        b.attach(
            s,
            Transform::demod(
                true,
                [Expr::fixed(1.0), Expr::fixed(0.0)],
                DemodSource::new("rr", &["out1"]),
            ),
        )
        .unwrap();
        let program = b.seal().unwrap();
        program.validate(&config()).unwrap();
        assert!(program.validate(&HardwareConfig::empty()).is_err());
    }
}
