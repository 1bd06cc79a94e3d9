//! Program builder. The only way to construct a [`Program`].
//!
//! The builder keeps a stack of open blocks; statements are appended to the
//! block on top of the stack. Operands are type-checked when a statement is
//! appended, scoping is validated when the program is sealed.
use crate::{
    Align, Assign, AssignTarget, Block, BlockId, CompilerOptions, Decl,
    DemodKind, Expr, For, ForEach, ForEachIter, FrameRotation, If,
    IterSource, MAX_DEPTH, Measure, Play, Program, ResetFrame, ResetPhase,
    Save, ScalarType, SealedProgram, Statement, StreamId, StreamType, Switch,
    Transform, UpdateFrequency, Value, VarId, Wait, WaitForTrigger,
    control::Amplitude,
    program::Variable,
    stream::Stream,
    well_formed,
};
use pulsekit_utils::{Error, PulseResult, RefKind};

/// The statement a block becomes once it is closed.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    If(Expr),
    /// Else branch of the `if` that was closed last in the current block.
    Else,
    For {
        init: Option<Assign>,
        cond: Expr,
        update: Option<Assign>,
    },
    ForEach(Vec<ForEachIter>),
    /// A case of the `switch` that was appended last in the current block.
    Case(Value),
    /// The fallback of that `switch`, after all of its cases.
    Default,
    InfiniteLoop,
    StrictTiming,
}

impl BlockKind {
    pub fn while_(cond: Expr) -> Self {
        BlockKind::For {
            init: None,
            cond,
            update: None,
        }
    }
}

struct Frame {
    /// `None` for the root block.
    kind: Option<BlockKind>,
    block: Block,
}

/// Mutable construction context for a single [`Program`].
///
/// Every call after [`seal`](Self::seal) fails with
/// [`Error::ProgramSealed`], except `seal` itself which returns the same
/// sealed program again.
pub struct ProgramBuilder {
    program: Program,
    frames: Vec<Frame>,
    sealed: Option<SealedProgram>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        let mut program = Program::default();
        let root = program.blocks.push(None);
        ProgramBuilder {
            program,
            frames: vec![Frame {
                kind: None,
                block: Block::new(root),
            }],
            sealed: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    fn ensure_open(&self) -> PulseResult<()> {
        if self.sealed.is_some() {
            Err(Error::ProgramSealed)
        } else {
            Ok(())
        }
    }

    fn top(&mut self) -> PulseResult<&mut Block> {
        self.frames
            .last_mut()
            .map(|frame| &mut frame.block)
            .ok_or(Error::ProgramSealed)
    }

    /// The block statements are currently appended to.
    pub fn current_block(&self) -> PulseResult<BlockId> {
        self.ensure_open()?;
        self.frames
            .last()
            .map(|frame| frame.block.id)
            .ok_or(Error::ProgramSealed)
    }

    /// Number of blocks open above the root.
    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    // ---------- Declarations ----------

    /// Declare a scalar variable in the current block.
    pub fn declare_variable(
        &mut self,
        ty: ScalarType,
        initial: Option<Value>,
    ) -> PulseResult<VarId> {
        self.ensure_open()?;
        let init = initial
            .map(|v| v.coerce(ty))
            .into_iter()
            .collect::<PulseResult<_>>()?;
        self.declare(ty, None, init)
    }

    /// Declare an array variable with `len` cells. `initial` is either empty
    /// or holds exactly one value per cell.
    pub fn declare_array(
        &mut self,
        ty: ScalarType,
        len: u32,
        initial: Vec<Value>,
    ) -> PulseResult<VarId> {
        self.ensure_open()?;
        if len == 0 {
            return Err(Error::type_mismatch("arrays need at least one cell"));
        }
        if !initial.is_empty() && initial.len() != len as usize {
            return Err(Error::type_mismatch(format!(
                "array of {len} cells initialized with {} values",
                initial.len()
            )));
        }
        let init = initial
            .into_iter()
            .map(|v| v.coerce(ty))
            .collect::<PulseResult<_>>()?;
        self.declare(ty, Some(len), init)
    }

    fn declare(
        &mut self,
        ty: ScalarType,
        len: Option<u32>,
        init: Vec<Value>,
    ) -> PulseResult<VarId> {
        let scope = self.current_block()?;
        let id = self.program.variables.peek_next_idx();
        self.program.variables.push(Variable {
            id,
            ty,
            len,
            init,
            scope,
        });
        let block = self.top()?;
        block.scope.vars.push(id);
        block.stmts.push(Statement::Declare(Decl::Var(id)));
        log::trace!("declared {id}: {ty} in {scope}");
        Ok(id)
    }

    /// Declare a named result stream in the current block. Names are unique
    /// per program.
    pub fn declare_stream<S: ToString>(
        &mut self,
        name: S,
        element: StreamType,
    ) -> PulseResult<StreamId> {
        self.ensure_open()?;
        let name = name.to_string();
        if name.is_empty() {
            return Err(Error::invalid_pipeline(
                name,
                "stream names cannot be empty",
            ));
        }
        if self.program.results.contains_key(&name) {
            return Err(Error::DuplicateName {
                kind: RefKind::Stream,
                name,
            });
        }
        match &element {
            StreamType::Array(_, 0) => {
                return Err(Error::type_mismatch(format!(
                    "stream `{name}` has an empty array element"
                )));
            }
            // Nothing saves a tuple; zipping streams is what produces them.
            StreamType::Tuple(_) => {
                return Err(Error::type_mismatch(format!(
                    "stream `{name}` cannot be declared with tuple element {element}"
                )));
            }
            _ => (),
        }
        let scope = self.current_block()?;
        let id = self.program.streams.peek_next_idx();
        self.program.streams.push(Stream {
            id,
            name: name.clone(),
            element,
            pipeline: vec![],
            scope,
        });
        self.program.results.insert(name, id);
        let block = self.top()?;
        block.scope.streams.push(id);
        block.stmts.push(Statement::Declare(Decl::Stream(id)));
        log::trace!("declared stream {id} in {scope}");
        Ok(id)
    }

    /// Append a transform to a stream's pipeline. The transform is checked
    /// against the pipeline so far; a rejected transform leaves the pipeline
    /// untouched.
    pub fn attach(
        &mut self,
        stream: StreamId,
        transform: Transform,
    ) -> PulseResult<()> {
        self.ensure_open()?;
        if let Transform::Zip { with, item } = &transform {
            self.check_zip(stream, *with, *item)?;
        }
        self.program
            .streams
            .get_mut(stream)
            .ok_or_else(|| Error::unresolved(RefKind::Stream, stream))?
            .attach(transform)
    }

    /// A stream can only be zipped with one declared before it, and only
    /// while that stream produces scalars of `item`.
    fn check_zip(
        &self,
        stream: StreamId,
        with: StreamId,
        item: ScalarType,
    ) -> PulseResult<()> {
        let name = &self.program.lookup_stream(stream)?.name;
        let other = self.program.lookup_stream(with)?;
        if with == stream {
            return Ok(());
        }
        if with > stream {
            return Err(Error::invalid_pipeline(
                name,
                format!("`{}` is declared later and cannot be zipped in", other.name),
            ));
        }
        let produced = other.output_type();
        if produced != StreamType::Scalar(item) {
            return Err(Error::invalid_pipeline(
                name,
                format!("`{}` produces {produced}, not {item}", other.name),
            ));
        }
        Ok(())
    }

    pub fn set_compiler_options(
        &mut self,
        options: CompilerOptions,
    ) -> PulseResult<()> {
        self.ensure_open()?;
        self.program.compiler_options = Some(options);
        Ok(())
    }

    /// Expression reading a scalar variable.
    pub fn var(&self, id: VarId) -> PulseResult<Expr> {
        self.ensure_open()?;
        self.program.var(id)
    }

    /// Expression reading `array[index]`.
    pub fn cell(&self, array: VarId, index: Expr) -> PulseResult<Expr> {
        self.ensure_open()?;
        self.program.cell(array, index)
    }

    // ---------- Block stack ----------

    pub fn open_block(&mut self, kind: BlockKind) -> PulseResult<BlockId> {
        self.ensure_open()?;
        if self.frames.len() > MAX_DEPTH {
            return Err(Error::invalid_scope(format!(
                "blocks nested deeper than {MAX_DEPTH} levels"
            )));
        }
        self.check_block_kind(&kind)?;
        let kind = match kind {
            BlockKind::Case(value) => {
                let switch = self.open_switch()?;
                let value = value.coerce(switch.expr.ty())?;
                if switch.cases.iter().any(|(v, _)| *v == value) {
                    return Err(Error::invalid_scope(format!(
                        "switch already has a case for {value}"
                    )));
                }
                BlockKind::Case(value)
            }
            BlockKind::Default => {
                if self.open_switch()?.cases.is_empty() {
                    return Err(Error::invalid_scope(
                        "default must come after at least one case",
                    ));
                }
                BlockKind::Default
            }
            other => other,
        };
        if matches!(kind, BlockKind::Else) {
            let closes_if = matches!(
                self.top()?.stmts.last(),
                Some(Statement::If(If {
                    otherwise: None,
                    ..
                }))
            );
            if !closes_if {
                return Err(Error::invalid_scope(
                    "else must directly follow an if without an else branch",
                ));
            }
        }
        let parent = self.current_block()?;
        let id = self.program.blocks.push(Some(parent));
        self.frames.push(Frame {
            kind: Some(kind),
            block: Block::new(id),
        });
        log::trace!("opened {id} under {parent}");
        Ok(id)
    }

    /// The switch that a case or default block joins: the last statement of
    /// the current block, as long as it has no default yet.
    fn open_switch(&self) -> PulseResult<&Switch> {
        match self.frames.last().and_then(|frame| frame.block.stmts.last()) {
            Some(Statement::Switch(switch)) if switch.default.is_none() => {
                Ok(switch)
            }
            _ => Err(Error::invalid_scope(
                "case and default must directly follow a switch without a default",
            )),
        }
    }

    pub fn close_block(&mut self) -> PulseResult<()> {
        self.ensure_open()?;
        if self.frames.len() <= 1 {
            return Err(Error::ScopeUnderflow);
        }
        let Some(Frame {
            kind: Some(kind),
            block,
        }) = self.frames.pop()
        else {
            return Err(Error::ScopeUnderflow);
        };
        log::trace!("closed {}", block.id);
        let parent = self.top()?;
        let stmt = match kind {
            BlockKind::If(cond) => Statement::If(If {
                cond,
                then: block,
                otherwise: None,
            }),
            BlockKind::Else => {
                return match parent.stmts.last_mut() {
                    Some(Statement::If(stmt)) => {
                        stmt.otherwise = Some(block);
                        Ok(())
                    }
                    _ => Err(Error::invalid_scope("else without an if")),
                };
            }
            BlockKind::For { init, cond, update } => Statement::For(For {
                init,
                cond,
                update,
                body: block,
            }),
            BlockKind::ForEach(iterators) => Statement::ForEach(ForEach {
                iterators,
                body: block,
            }),
            BlockKind::Case(value) => {
                return match parent.stmts.last_mut() {
                    Some(Statement::Switch(switch)) => {
                        switch.cases.push((value, block));
                        Ok(())
                    }
                    _ => Err(Error::invalid_scope("case outside a switch")),
                };
            }
            BlockKind::Default => {
                return match parent.stmts.last_mut() {
                    Some(Statement::Switch(switch)) => {
                        switch.default = Some(block);
                        Ok(())
                    }
                    _ => Err(Error::invalid_scope("default outside a switch")),
                };
            }
            BlockKind::InfiniteLoop => Statement::InfiniteLoop(block),
            BlockKind::StrictTiming => Statement::StrictTiming(block),
        };
        parent.stmts.push(stmt);
        Ok(())
    }

    /// Append a statement to the current block. Declarations and statements
    /// that own blocks have their own entry points, except for a `switch`
    /// without cases: its cases are opened as blocks right after it.
    pub fn append_statement(&mut self, stmt: Statement) -> PulseResult<()> {
        self.ensure_open()?;
        let switch_header =
            matches!(&stmt, Statement::Switch(switch) if switch.is_empty());
        if stmt.is_compound() && !switch_header {
            return Err(Error::invalid_scope(format!(
                "`{}` blocks are built with open_block and close_block",
                stmt.name()
            )));
        }
        if let Statement::Declare(_) = stmt {
            return Err(Error::invalid_scope(
                "declarations are made with declare_variable and declare_stream",
            ));
        }
        self.check_statement(&stmt)?;
        self.top()?.stmts.push(stmt);
        Ok(())
    }

    // ---------- Sealing ----------

    /// Validate and freeze the program. Sealing an already sealed program
    /// returns the same sealed value and changes nothing.
    pub fn seal(&mut self) -> PulseResult<SealedProgram> {
        if let Some(sealed) = &self.sealed {
            return Ok(sealed.clone());
        }
        if self.frames.len() != 1 {
            return Err(Error::invalid_scope(format!(
                "{} block(s) still open",
                self.depth()
            )));
        }
        well_formed::check_scopes(&self.program, &self.frames[0].block)?;
        well_formed::check_zips(&self.program)?;

        let mut program = std::mem::take(&mut self.program);
        program.root = self
            .frames
            .pop()
            .map(|frame| frame.block)
            .unwrap_or_default();
        log::debug!(
            "sealed program with {} variables, {} streams and {} blocks",
            program.var_count(),
            program.stream_count(),
            program.block_count()
        );
        let sealed = SealedProgram::new(program);
        self.sealed = Some(sealed.clone());
        Ok(sealed)
    }

    // ---------- Type checks ----------

    fn expect_type(
        what: &str,
        expr: &Expr,
        ok: impl Fn(ScalarType) -> bool,
        expected: &str,
    ) -> PulseResult<()> {
        if ok(expr.ty()) {
            Ok(())
        } else {
            Err(Error::type_mismatch(format!(
                "{what} `{expr}` must be {expected}, found {}",
                expr.ty()
            )))
        }
    }

    fn check_assign(&self, assign: &Assign) -> PulseResult<()> {
        let var = self.program.lookup(assign.target.var())?;
        match &assign.target {
            AssignTarget::Var(id) if var.is_array() => {
                return Err(Error::type_mismatch(format!(
                    "cannot assign to array {id} without an index"
                )));
            }
            AssignTarget::Cell { array, .. } if !var.is_array() => {
                return Err(Error::type_mismatch(format!(
                    "{array} is a scalar and cannot be indexed"
                )));
            }
            AssignTarget::Cell { index, .. } => {
                Self::expect_type("index", index, |t| t == ScalarType::Int, "int")?
            }
            AssignTarget::Var(_) => (),
        }
        if var.ty.accepts(assign.value.ty()) {
            Ok(())
        } else {
            Err(Error::type_mismatch(format!(
                "cannot assign {} value `{}` to {}: {}",
                assign.value.ty(),
                assign.value,
                var.id,
                var.ty
            )))
        }
    }

    fn check_amp(amp: Option<&Amplitude>) -> PulseResult<()> {
        for e in amp.map(Amplitude::exprs).unwrap_or_default() {
            Self::expect_type("amplitude", e, |t| t.is_numeric(), "numeric")?;
        }
        Ok(())
    }

    fn check_block_kind(&self, kind: &BlockKind) -> PulseResult<()> {
        match kind {
            BlockKind::If(cond) => {
                Self::expect_type("condition", cond, |t| t == ScalarType::Bool, "bool")
            }
            BlockKind::For { init, cond, update } => {
                Self::expect_type("condition", cond, |t| t == ScalarType::Bool, "bool")?;
                init.iter()
                    .chain(update.iter())
                    .try_for_each(|a| self.check_assign(a))
            }
            BlockKind::ForEach(iterators) => self.check_for_each(iterators),
            BlockKind::Else
            | BlockKind::Case(_)
            | BlockKind::Default
            | BlockKind::InfiniteLoop
            | BlockKind::StrictTiming => Ok(()),
        }
    }

    fn check_for_each(&self, iterators: &[ForEachIter]) -> PulseResult<()> {
        if iterators.is_empty() {
            return Err(Error::invalid_scope("for_each needs at least one iterator"));
        }
        let mut lengths = Vec::with_capacity(iterators.len());
        for it in iterators {
            let var = self.program.lookup(it.var)?;
            if var.is_array() {
                return Err(Error::type_mismatch(format!(
                    "for_each variable {} must be a scalar",
                    it.var
                )));
            }
            let len = match &it.source {
                IterSource::Array(array) => {
                    let source = self.program.lookup(*array)?;
                    let len = source.len.ok_or_else(|| {
                        Error::type_mismatch(format!("{array} is not an array"))
                    })?;
                    if !var.ty.accepts(source.ty) {
                        return Err(Error::type_mismatch(format!(
                            "cannot iterate {} over {}[{len}] {array}",
                            var.ty, source.ty
                        )));
                    }
                    len as usize
                }
                IterSource::Values(values) => {
                    if let Some(v) = values.iter().find(|v| !var.ty.accepts(v.ty())) {
                        return Err(Error::type_mismatch(format!(
                            "cannot iterate {} over {} value `{v}`",
                            var.ty,
                            v.ty()
                        )));
                    }
                    values.len()
                }
            };
            if len == 0 {
                return Err(Error::type_mismatch("for_each over an empty sequence"));
            }
            lengths.push(len);
        }
        if lengths.iter().any(|l| *l != lengths[0]) {
            return Err(Error::type_mismatch(format!(
                "for_each sequences have different lengths: {lengths:?}"
            )));
        }
        Ok(())
    }

    fn check_statement(&self, stmt: &Statement) -> PulseResult<()> {
        let is_int = |t: ScalarType| t == ScalarType::Int;
        match stmt {
            Statement::Assign(assign) => self.check_assign(assign),
            Statement::Play(play) => {
                Self::check_amp(play.amp.as_ref())?;
                if let Some(d) = &play.duration {
                    Self::expect_type("duration", d, is_int, "int")?;
                }
                if let Some(c) = &play.condition {
                    Self::expect_type("condition", c, |t| t == ScalarType::Bool, "bool")?;
                }
                Ok(())
            }
            Statement::Measure(measure) => self.check_measure(measure),
            Statement::Wait(Wait { duration, .. }) => {
                Self::expect_type("duration", duration, is_int, "int")
            }
            Statement::Save(Save { source, stream }) => {
                let stream = self.program.lookup_stream(*stream)?;
                match stream.element {
                    StreamType::Scalar(t) if t.accepts(source.ty()) => Ok(()),
                    _ => Err(Error::type_mismatch(format!(
                        "cannot save {} value `{source}` into stream `{}` of {}",
                        source.ty(),
                        stream.name,
                        stream.element
                    ))),
                }
            }
            Statement::FrameRotation(FrameRotation { angle, .. }) => {
                Self::expect_type("angle", angle, |t| t.is_numeric(), "numeric")
            }
            Statement::UpdateFrequency(UpdateFrequency { frequency, .. }) => {
                Self::expect_type("frequency", frequency, is_int, "int")
            }
            Statement::WaitForTrigger(WaitForTrigger {
                time_tag: Some(target),
                ..
            }) => {
                let var = self.program.lookup(*target)?;
                if var.ty != ScalarType::Int || var.is_array() {
                    return Err(Error::type_mismatch(format!(
                        "time tag target {target} must be an int scalar"
                    )));
                }
                Ok(())
            }
            Statement::Switch(switch) if switch.is_empty() => Ok(()),
            Statement::Align(_)
            | Statement::ResetPhase(_)
            | Statement::ResetFrame(_)
            | Statement::WaitForTrigger(_)
            | Statement::Pause => Ok(()),
            Statement::Declare(_)
            | Statement::If(_)
            | Statement::For(_)
            | Statement::ForEach(_)
            | Statement::Switch(_)
            | Statement::InfiniteLoop(_)
            | Statement::StrictTiming(_) => Err(Error::invalid_scope(format!(
                "`{}` cannot be appended directly",
                stmt.name()
            ))),
        }
    }

    fn check_measure(&self, measure: &Measure) -> PulseResult<()> {
        Self::check_amp(measure.amp.as_ref())?;
        for process in &measure.processes {
            let target = self.program.lookup(process.target)?;
            let wants_array = match process.kind {
                DemodKind::Full => false,
                DemodKind::Sliced(0) | DemodKind::Accumulated(0) => {
                    return Err(Error::type_mismatch(
                        "demodulation chunks must be at least one cycle long",
                    ));
                }
                DemodKind::Sliced(_) | DemodKind::Accumulated(_) => true,
            };
            if target.ty != ScalarType::Fixed || target.is_array() != wants_array {
                return Err(Error::type_mismatch(format!(
                    "demodulation target {} must be a fixed {}",
                    process.target,
                    if wants_array { "array" } else { "scalar" }
                )));
            }
        }
        if let Some(adc) = measure.adc_stream {
            let stream = self.program.lookup_stream(adc)?;
            if !matches!(stream.element, StreamType::Array(ScalarType::Int, _)) {
                return Err(Error::type_mismatch(format!(
                    "adc stream `{}` must carry int arrays, not {}",
                    stream.name, stream.element
                )));
            }
        }
        Ok(())
    }

    // ---------- Fluent helpers ----------

    pub fn assign(&mut self, target: VarId, value: Expr) -> PulseResult<()> {
        self.append_statement(Statement::Assign(Assign {
            target: AssignTarget::Var(target),
            value,
        }))
    }

    pub fn assign_cell(
        &mut self,
        array: VarId,
        index: Expr,
        value: Expr,
    ) -> PulseResult<()> {
        self.append_statement(Statement::Assign(Assign {
            target: AssignTarget::Cell { array, index },
            value,
        }))
    }

    pub fn play(&mut self, play: Play) -> PulseResult<()> {
        self.append_statement(Statement::Play(play))
    }

    pub fn measure(&mut self, measure: Measure) -> PulseResult<()> {
        self.append_statement(Statement::Measure(measure))
    }

    pub fn wait<S: ToString>(
        &mut self,
        duration: Expr,
        elements: &[S],
    ) -> PulseResult<()> {
        self.append_statement(Statement::Wait(Wait {
            duration,
            elements: elements.iter().map(S::to_string).collect(),
        }))
    }

    pub fn align<S: ToString>(&mut self, elements: &[S]) -> PulseResult<()> {
        self.append_statement(Statement::Align(Align {
            elements: elements.iter().map(S::to_string).collect(),
        }))
    }

    pub fn save(&mut self, source: Expr, stream: StreamId) -> PulseResult<()> {
        self.append_statement(Statement::Save(Save { source, stream }))
    }

    pub fn frame_rotation<S: ToString>(
        &mut self,
        angle: Expr,
        element: S,
    ) -> PulseResult<()> {
        self.append_statement(Statement::FrameRotation(FrameRotation {
            angle,
            element: element.to_string(),
        }))
    }

    pub fn reset_phase<S: ToString>(&mut self, element: S) -> PulseResult<()> {
        self.append_statement(Statement::ResetPhase(ResetPhase {
            element: element.to_string(),
        }))
    }

    pub fn update_frequency<S: ToString>(
        &mut self,
        element: S,
        frequency: Expr,
        keep_phase: bool,
    ) -> PulseResult<()> {
        self.append_statement(Statement::UpdateFrequency(UpdateFrequency {
            element: element.to_string(),
            frequency,
            keep_phase,
        }))
    }

    pub fn reset_frame<S: ToString>(&mut self, elements: &[S]) -> PulseResult<()> {
        self.append_statement(Statement::ResetFrame(ResetFrame {
            elements: elements.iter().map(S::to_string).collect(),
        }))
    }

    pub fn wait_for_trigger(&mut self, wait: WaitForTrigger) -> PulseResult<()> {
        self.append_statement(Statement::WaitForTrigger(wait))
    }

    pub fn pause(&mut self) -> PulseResult<()> {
        self.append_statement(Statement::Pause)
    }

    /// Open a block of `kind`, fill it with `body` and close it.
    pub fn scoped<F>(&mut self, kind: BlockKind, body: F) -> PulseResult<()>
    where
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        self.open_block(kind)?;
        body(self)?;
        self.close_block()
    }

    pub fn if_<F>(&mut self, cond: Expr, body: F) -> PulseResult<()>
    where
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        self.scoped(BlockKind::If(cond), body)
    }

    pub fn else_<F>(&mut self, body: F) -> PulseResult<()>
    where
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        self.scoped(BlockKind::Else, body)
    }

    /// `for (var = init; cond; var = update)`
    pub fn for_<F>(
        &mut self,
        var: VarId,
        init: Expr,
        cond: Expr,
        update: Expr,
        body: F,
    ) -> PulseResult<()>
    where
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        let assign = |value| Assign {
            target: AssignTarget::Var(var),
            value,
        };
        let kind = BlockKind::For {
            init: Some(assign(init)),
            cond,
            update: Some(assign(update)),
        };
        self.scoped(kind, body)
    }

    pub fn while_<F>(&mut self, cond: Expr, body: F) -> PulseResult<()>
    where
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        self.scoped(BlockKind::while_(cond), body)
    }

    pub fn for_each<F>(
        &mut self,
        iterators: Vec<ForEachIter>,
        body: F,
    ) -> PulseResult<()>
    where
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        self.scoped(BlockKind::ForEach(iterators), body)
    }

    /// `switch (expr) { ... }`. `body` adds the branches with
    /// [`case_`](Self::case_) and [`default_`](Self::default_) and nothing
    /// else.
    pub fn switch_<F>(&mut self, expr: Expr, body: F) -> PulseResult<()>
    where
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        self.append_statement(Statement::Switch(Switch::new(expr)))?;
        body(self)?;
        match self.top()?.stmts.last() {
            Some(Statement::Switch(switch)) if !switch.cases.is_empty() => Ok(()),
            Some(Statement::Switch(_)) => {
                Err(Error::invalid_scope("switch needs at least one case"))
            }
            _ => Err(Error::invalid_scope(
                "only case and default blocks can appear inside a switch",
            )),
        }
    }

    pub fn case_<V, F>(&mut self, value: V, body: F) -> PulseResult<()>
    where
        V: Into<Value>,
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        self.scoped(BlockKind::Case(value.into()), body)
    }

    pub fn default_<F>(&mut self, body: F) -> PulseResult<()>
    where
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        self.scoped(BlockKind::Default, body)
    }

    pub fn infinite_loop<F>(&mut self, body: F) -> PulseResult<()>
    where
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        self.scoped(BlockKind::InfiniteLoop, body)
    }

    pub fn strict_timing<F>(&mut self, body: F) -> PulseResult<()>
    where
        F: FnOnce(&mut Self) -> PulseResult<()>,
    {
        self.scoped(BlockKind::StrictTiming, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinOp, Demod, IndexRef, MapFunction};

    fn counter(b: &mut ProgramBuilder) -> VarId {
        b.declare_variable(ScalarType::Int, Some(Value::Int(0))).unwrap()
    }

    #[test]
    fn closing_the_root_underflows() {
        let mut b = ProgramBuilder::new();
        assert!(matches!(b.close_block(), Err(Error::ScopeUnderflow)));
        b.open_block(BlockKind::StrictTiming).unwrap();
        b.close_block().unwrap();
        assert!(matches!(b.close_block(), Err(Error::ScopeUnderflow)));
        assert_eq!(b.depth(), 0);
    }

    #[test]
    fn sealing_is_idempotent_and_final() {
        let mut b = ProgramBuilder::new();
        let x = counter(&mut b);
        let first = b.seal().unwrap();
        let second = b.seal().unwrap();
        assert!(first.ptr_eq(&second));
        assert!(b.is_sealed());

        assert!(matches!(b.assign(x, Expr::int(1)), Err(Error::ProgramSealed)));
        assert!(matches!(
            b.declare_variable(ScalarType::Int, None),
            Err(Error::ProgramSealed)
        ));
        assert!(matches!(b.close_block(), Err(Error::ProgramSealed)));
        assert!(matches!(b.var(x), Err(Error::ProgramSealed)));
        assert_eq!(first.root().stmts.len(), 1);
    }

    #[test]
    fn ids_are_dense_in_declaration_order() {
        let mut b = ProgramBuilder::new();
        let a = counter(&mut b);
        let s = b
            .declare_stream("out", StreamType::Scalar(ScalarType::Int))
            .unwrap();
        let block = b.open_block(BlockKind::StrictTiming).unwrap();
        let c = counter(&mut b);
        b.close_block().unwrap();
        let d = counter(&mut b);

        assert_eq!([a, c, d].map(|v| v.index()), [0, 1, 2]);
        assert_eq!(s.index(), 0);
        assert_eq!(block.index(), 1);

        let program = b.seal().unwrap();
        assert_eq!(program.var_count(), 3);
        assert_eq!(program.block_count(), 2);
        assert_eq!(program.block_parent(block), Some(BlockId::ROOT));
        assert_eq!(program.variable(c).unwrap().scope, block);
        assert_eq!(program.result("out").unwrap().id, s);
    }

    #[test]
    fn else_needs_a_preceding_if() {
        let mut b = ProgramBuilder::new();
        let err = b.else_(|_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::InvalidScope(_)));

        b.if_(Expr::bool(true), |b| b.pause()).unwrap();
        b.else_(|b| b.pause()).unwrap();
        // The if already has an else branch.
        assert!(matches!(b.else_(|_| Ok(())), Err(Error::InvalidScope(_))));

        let program = b.seal().unwrap();
        match &program.root().stmts[..] {
            [Statement::If(If {
                otherwise: Some(otherwise),
                ..
            })] => assert_eq!(otherwise.stmts, [Statement::Pause]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn open_blocks_prevent_sealing() {
        let mut b = ProgramBuilder::new();
        b.open_block(BlockKind::while_(Expr::bool(true))).unwrap();
        assert!(matches!(b.seal(), Err(Error::InvalidScope(_))));
        assert!(!b.is_sealed());
        b.close_block().unwrap();
        assert!(b.seal().is_ok());
    }

    #[test]
    fn compound_statements_are_not_appended_directly() {
        let mut b = ProgramBuilder::new();
        let stmt = Statement::StrictTiming(Block::new(BlockId::from(7)));
        assert!(matches!(
            b.append_statement(stmt),
            Err(Error::InvalidScope(_))
        ));
        let decl = Statement::Declare(Decl::Var(VarId::from(0)));
        assert!(matches!(
            b.append_statement(decl),
            Err(Error::InvalidScope(_))
        ));
    }

    #[test]
    fn stream_names_are_unique() {
        let mut b = ProgramBuilder::new();
        b.declare_stream("iq", StreamType::Scalar(ScalarType::Fixed))
            .unwrap();
        let err = b
            .declare_stream("iq", StreamType::Scalar(ScalarType::Int))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateName {
                kind: RefKind::Stream,
                ..
            }
        ));
        assert!(matches!(
            b.declare_stream("empty", StreamType::Array(ScalarType::Int, 0)),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn statements_are_type_checked() {
        let mut b = ProgramBuilder::new();
        let x = counter(&mut b);
        let f = b.declare_variable(ScalarType::Fixed, None).unwrap();
        let flag = b.declare_variable(ScalarType::Bool, None).unwrap();

        // int widens to fixed, the other way around is an error
        b.assign(f, b.var(x).unwrap()).unwrap();
        assert!(matches!(
            b.assign(x, b.var(f).unwrap()),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            b.if_(b.var(x).unwrap(), |_| Ok(())),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            b.wait(Expr::fixed(4.0), &["qubit"]),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            b.play(Play::new("pi", "qubit").amp(b.var(flag).unwrap())),
            Err(Error::TypeMismatch(_))
        ));
        // rejected statements leave nothing behind
        assert_eq!(b.depth(), 0);
        let program = b.seal().unwrap();
        assert_eq!(program.root().stmts.len(), 4);
    }

    #[test]
    fn measurements_check_their_targets() {
        let mut b = ProgramBuilder::new();
        let i = b.declare_variable(ScalarType::Fixed, None).unwrap();
        let slices = b.declare_array(ScalarType::Fixed, 10, vec![]).unwrap();
        let n = counter(&mut b);

        b.measure(
            Measure::new("readout", "rr")
                .demod(Demod::full("cos", i))
                .demod(Demod::sliced("sin", 4, slices)),
        )
        .unwrap();
        assert!(matches!(
            b.measure(Measure::new("readout", "rr").demod(Demod::full("cos", n))),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            b.measure(
                Measure::new("readout", "rr").demod(Demod::sliced("cos", 0, slices))
            ),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            b.measure(Measure::new("readout", "rr").adc(StreamId::from(3))),
            Err(Error::UnresolvedReference { .. })
        ));

        let trace = b
            .declare_stream("trace", StreamType::Array(ScalarType::Int, 16))
            .unwrap();
        let level = b
            .declare_stream("level", StreamType::Scalar(ScalarType::Int))
            .unwrap();
        b.measure(Measure::new("readout", "rr").adc(trace)).unwrap();
        assert!(matches!(
            b.measure(Measure::new("readout", "rr").adc(level)),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn blocks_nest_up_to_the_bound() {
        let mut b = ProgramBuilder::new();
        for _ in 0..MAX_DEPTH {
            b.open_block(BlockKind::StrictTiming).unwrap();
        }
        assert_eq!(b.depth(), MAX_DEPTH);
        assert!(matches!(
            b.open_block(BlockKind::StrictTiming),
            Err(Error::InvalidScope(_))
        ));
        assert!(matches!(
            b.infinite_loop(|b| b.pause()),
            Err(Error::InvalidScope(_))
        ));
        for _ in 0..MAX_DEPTH {
            b.close_block().unwrap();
        }
        let program = b.seal().unwrap();
        assert_eq!(program.block_count(), MAX_DEPTH + 1);
    }

    #[test]
    fn switch_collects_cases_and_a_default() {
        let mut b = ProgramBuilder::new();
        let x = counter(&mut b);
        b.switch_(b.var(x).unwrap(), |b| {
            b.case_(1, |b| b.play(Play::new("pi", "qubit")))?;
            b.case_(2, |b| b.pause())?;
            b.default_(|b| b.reset_frame(&["qubit"]))
        })
        .unwrap();
        let program = b.seal().unwrap();
        match program.root().stmts.last() {
            Some(Statement::Switch(switch)) => {
                let values = switch.cases.iter().map(|(v, _)| *v).collect::<Vec<_>>();
                assert_eq!(values, [Value::Int(1), Value::Int(2)]);
                assert!(switch.default.is_some());
                assert_eq!(Statement::Switch(switch.clone()).blocks().len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn switch_cases_are_checked() {
        let mut b = ProgramBuilder::new();
        let x = counter(&mut b);

        assert!(matches!(b.case_(1, |_| Ok(())), Err(Error::InvalidScope(_))));
        assert!(matches!(
            b.switch_(b.var(x).unwrap(), |_| Ok(())),
            Err(Error::InvalidScope(_))
        ));
        let err = b
            .switch_(b.var(x).unwrap(), |b| {
                b.case_(1, |b| b.pause())?;
                b.case_(1, |b| b.pause())
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidScope(_)));
        assert!(matches!(
            b.switch_(b.var(x).unwrap(), |b| b.case_(0.5, |_| Ok(()))),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            b.switch_(b.var(x).unwrap(), |b| b.default_(|_| Ok(()))),
            Err(Error::InvalidScope(_))
        ));
        assert!(matches!(
            b.switch_(b.var(x).unwrap(), |b| {
                b.case_(1, |_| Ok(()))?;
                b.pause()
            }),
            Err(Error::InvalidScope(_))
        ));

        let mut b = ProgramBuilder::new();
        let a = b.declare_variable(ScalarType::Fixed, None).unwrap();
        // int cases widen to a fixed switch
        b.switch_(b.var(a).unwrap(), |b| {
            b.case_(1, |_| Ok(()))?;
            b.default_(|_| Ok(()))?;
            assert!(matches!(b.case_(2, |_| Ok(())), Err(Error::InvalidScope(_))));
            assert!(matches!(b.default_(|_| Ok(())), Err(Error::InvalidScope(_))));
            Ok(())
        })
        .unwrap();
        assert!(b.seal().is_ok());
    }

    #[test]
    fn switch_with_cases_cannot_be_appended() {
        let mut b = ProgramBuilder::new();
        let x = counter(&mut b);
        let mut switch = Switch::new(b.var(x).unwrap());
        switch.cases.push((Value::Int(1), Block::new(BlockId::from(1))));
        assert!(matches!(
            b.append_statement(Statement::Switch(switch)),
            Err(Error::InvalidScope(_))
        ));
        // a bare header is accepted, but it cannot be sealed without a case
        b.append_statement(Statement::Switch(Switch::new(b.var(x).unwrap())))
            .unwrap();
        assert!(matches!(b.seal(), Err(Error::InvalidScope(_))));
    }

    #[test]
    fn trigger_time_tag_must_be_an_int() {
        let mut b = ProgramBuilder::new();
        let t = counter(&mut b);
        let f = b.declare_variable(ScalarType::Fixed, None).unwrap();
        b.infinite_loop(|b| {
            b.wait_for_trigger(
                WaitForTrigger::new("qubit")
                    .playing("pi")
                    .from_element("rr", Some("out1"))
                    .time_tag(t),
            )
        })
        .unwrap();
        assert!(matches!(
            b.wait_for_trigger(WaitForTrigger::new("qubit").time_tag(f)),
            Err(Error::TypeMismatch(_))
        ));
        let program = b.seal().unwrap();
        assert!(matches!(
            program.root().stmts.last(),
            Some(Statement::InfiniteLoop(body)) if body.stmts.len() == 1
        ));
    }

    #[test]
    fn zip_needs_an_earlier_scalar_stream() {
        let mut b = ProgramBuilder::new();
        let flags = b
            .declare_stream("flags", StreamType::Scalar(ScalarType::Bool))
            .unwrap();
        let iq = b
            .declare_stream("iq", StreamType::Scalar(ScalarType::Fixed))
            .unwrap();
        let later = b
            .declare_stream("later", StreamType::Scalar(ScalarType::Int))
            .unwrap();
        let zip = |with, item| Transform::Zip { with, item };

        assert!(matches!(
            b.attach(iq, zip(later, ScalarType::Int)),
            Err(Error::InvalidPipeline { .. })
        ));
        assert!(matches!(
            b.attach(iq, zip(flags, ScalarType::Int)),
            Err(Error::InvalidPipeline { .. })
        ));
        b.attach(iq, zip(flags, ScalarType::Bool)).unwrap();
        b.attach(iq, Transform::SaveAll).unwrap();
        assert!(matches!(
            b.declare_stream("pairs", StreamType::Tuple(vec![ScalarType::Int])),
            Err(Error::TypeMismatch(_))
        ));

        // the zipped stream may not change what it produces afterwards
        b.attach(flags, Transform::map(MapFunction::BooleanToInt)).unwrap();
        assert!(matches!(b.seal(), Err(Error::InvalidPipeline { .. })));
    }

    #[test]
    fn for_each_sequences_must_line_up() {
        let mut b = ProgramBuilder::new();
        let amps = b
            .declare_array(
                ScalarType::Fixed,
                2,
                vec![Value::Fixed(0.1), Value::Fixed(0.2)],
            )
            .unwrap();
        let a = b.declare_variable(ScalarType::Fixed, None).unwrap();
        let t = counter(&mut b);

        let err = b
            .for_each(
                vec![
                    ForEachIter {
                        var: a,
                        source: IterSource::Array(amps),
                    },
                    ForEachIter {
                        var: t,
                        source: IterSource::Values(vec![4.into(), 8.into(), 16.into()]),
                    },
                ],
                |_| Ok(()),
            )
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
        assert!(matches!(
            b.for_each(vec![], |_| Ok(())),
            Err(Error::InvalidScope(_))
        ));

        b.for_each(
            vec![
                ForEachIter {
                    var: a,
                    source: IterSource::Array(amps),
                },
                ForEachIter {
                    var: t,
                    source: IterSource::Values(vec![4.into(), 8.into()]),
                },
            ],
            |b| b.play(Play::new("pi", "qubit").amp(b.var(a)?).duration(b.var(t)?)),
        )
        .unwrap();
        assert!(b.seal().is_ok());
    }

    #[test]
    fn for_loop_header_is_checked() {
        let mut b = ProgramBuilder::new();
        let i = counter(&mut b);
        let cond = Expr::binary(BinOp::Lt, b.var(i).unwrap(), Expr::int(3)).unwrap();
        assert!(matches!(
            b.for_(i, Expr::fixed(0.5), cond.clone(), Expr::int(1), |_| Ok(())),
            Err(Error::TypeMismatch(_))
        ));
        b.for_(i, Expr::int(0), cond, Expr::int(1), |b| b.pause())
            .unwrap();
        let program = b.seal().unwrap();
        assert!(matches!(
            program.root().stmts.last(),
            Some(Statement::For(stmt)) if !stmt.is_while()
        ));
    }
}
