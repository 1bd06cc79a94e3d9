//! Rebuilds a sealed program from a record table.
//!
//! Decoding replays the builder calls that produced the program: records
//! are visited in the order they were emitted, declarations allocate the
//! same dense ids again and every statement goes through the same checks it
//! went through when it was first built. Nothing is handed out before the
//! replayed program is sealed.
use crate::{
    encode::{UNARY_OPS, for_flags, play_flags},
    header::Header,
    records::{Fields, Kind, RawRecord},
};
use pulsekit_ir::{
    Align, Amplitude, Assign, AssignTarget, BinOp, BlockId, BlockKind,
    Demod, DemodKind, DemodSource, Expr, ExprKind, ForEachIter,
    FrameRotation, IndexRef, IterSource, MAX_DEPTH, MapFunction, Measure,
    Play, ProgramBuilder, ResetFrame, ResetPhase, Save, ScalarType,
    SealedProgram, Statement, StreamId, StreamType, Switch, Transform,
    Trigger, UpdateFrequency, VarId, Wait, WaitForTrigger,
};
use pulsekit_utils::{Error, IrLocation, PulseResult};
use std::{mem, slice};

fn lift<T>(idx: usize, result: PulseResult<T>) -> PulseResult<T> {
    result.map_err(|e| Error::corrupt(IrLocation::Record(idx), e))
}

/// Expression children of a record, consumed in order.
struct Operands {
    idx: usize,
    exprs: std::vec::IntoIter<Expr>,
}

impl Operands {
    fn next(&mut self) -> PulseResult<Expr> {
        self.exprs.next().ok_or_else(|| {
            Error::corrupt(IrLocation::Record(self.idx), "missing operand")
        })
    }

    fn finish(self) -> PulseResult<()> {
        match self.exprs.len() {
            0 => Ok(()),
            extra => Err(Error::corrupt(
                IrLocation::Record(self.idx),
                format!("{extra} unused operands"),
            )),
        }
    }
}

/// An expression record whose operands are still being decoded.
struct Pending<'a> {
    idx: usize,
    children: slice::Iter<'a, usize>,
    operands: Vec<Expr>,
}

/// Split the records off the bytes following the header and check that
/// their links form a single tree rooted at record 0.
fn read_records<'a>(
    header: &Header,
    mut rest: &'a [u8],
) -> PulseResult<Vec<RawRecord<'a>>> {
    let count = header.records as usize;
    if count == 0 {
        return Err(Error::corrupt(IrLocation::Header, "no root block"));
    }
    // Framing alone takes nine bytes per record.
    let mut records = Vec::with_capacity(count.min(rest.len() / 9));
    for idx in 0..count {
        let (record, tail) = RawRecord::parse(idx, rest)?;
        records.push(record);
        rest = tail;
    }
    if !rest.is_empty() {
        return Err(Error::corrupt(
            IrLocation::Header,
            format!("{} bytes after the last of {count} records", rest.len()),
        ));
    }

    if records[0].kind != Kind::Block {
        return Err(Error::corrupt(
            IrLocation::Record(0),
            format!("expected the root block, found {:?}", records[0].kind),
        ));
    }
    let mut referenced = vec![false; count];
    for (idx, record) in records.iter().enumerate() {
        let mut last = idx;
        for &child in &record.children {
            if child <= last || child >= count {
                return Err(Error::corrupt(
                    IrLocation::Record(idx),
                    format!("child index {child} is out of order or out of range"),
                ));
            }
            if mem::replace(&mut referenced[child], true) {
                return Err(Error::corrupt(
                    IrLocation::Record(child),
                    "record is referenced twice",
                ));
            }
            last = child;
        }
    }
    if let Some(orphan) = referenced.iter().skip(1).position(|r| !r) {
        return Err(Error::corrupt(
            IrLocation::Record(orphan + 1),
            "record is never referenced",
        ));
    }
    Ok(records)
}

struct Replayer<'a> {
    header: &'a Header,
    records: &'a [RawRecord<'a>],
    builder: ProgramBuilder,
}

impl<'a> Replayer<'a> {
    fn record(&self, idx: usize) -> &'a RawRecord<'a> {
        let records = self.records;
        &records[idx]
    }

    fn fields(&self, idx: usize) -> Fields<'a> {
        Fields::new(idx, self.record(idx).fields)
    }

    fn arity(&self, idx: usize, expected: usize) -> PulseResult<&'a [usize]> {
        let children = &self.record(idx).children;
        if children.len() == expected {
            Ok(children)
        } else {
            Err(Error::corrupt(
                IrLocation::Record(idx),
                format!(
                    "{:?} record has {} children, expected {expected}",
                    self.record(idx).kind,
                    children.len()
                ),
            ))
        }
    }

    fn var_id(&self, f: &mut Fields) -> PulseResult<VarId> {
        let id = f.u32()?;
        if id >= self.header.variables {
            return Err(f.error(format!(
                "variable {id} is past the high-water mark {}",
                self.header.variables
            )));
        }
        Ok(VarId::from(id))
    }

    fn stream_id(&self, f: &mut Fields) -> PulseResult<StreamId> {
        let id = f.u32()?;
        if id >= self.header.streams {
            return Err(f.error(format!(
                "stream {id} is past the high-water mark {}",
                self.header.streams
            )));
        }
        Ok(StreamId::from(id))
    }

    fn same_type(idx: usize, expr: &Expr, stored: ScalarType) -> PulseResult<()> {
        if expr.ty() == stored {
            Ok(())
        } else {
            Err(Error::corrupt(
                IrLocation::Record(idx),
                format!("`{expr}` is stored as {stored} but checks as {}", expr.ty()),
            ))
        }
    }

    // ---------- Expressions ----------

    fn operands(&self, idx: usize) -> PulseResult<Operands> {
        let exprs = self
            .record(idx)
            .children
            .iter()
            .map(|child| self.expr(*child))
            .collect::<PulseResult<Vec<_>>>()?;
        Ok(Operands {
            idx,
            exprs: exprs.into_iter(),
        })
    }

    fn pending(&self, idx: usize) -> PulseResult<Pending<'a>> {
        let record = self.record(idx);
        if !record.kind.is_expr() {
            return Err(Error::corrupt(
                IrLocation::Record(idx),
                format!("expected an expression, found {:?}", record.kind),
            ));
        }
        Ok(Pending {
            idx,
            children: record.children.iter(),
            operands: Vec::with_capacity(record.children.len()),
        })
    }

    /// Decode the expression rooted at `idx`. Operands are decoded on an
    /// explicit stack, so a tall tree costs heap rather than call frames.
    fn expr(&self, idx: usize) -> PulseResult<Expr> {
        let mut stack = vec![self.pending(idx)?];
        while let Some(mut top) = stack.pop() {
            if let Some(&child) = top.children.next() {
                if stack.len() + 2 > MAX_DEPTH {
                    return Err(Error::corrupt(
                        IrLocation::Record(child),
                        format!("expression nested deeper than {MAX_DEPTH} levels"),
                    ));
                }
                stack.push(top);
                stack.push(self.pending(child)?);
                continue;
            }
            let ops = Operands {
                idx: top.idx,
                exprs: top.operands.into_iter(),
            };
            let expr = self.expr_node(top.idx, ops)?;
            match stack.last_mut() {
                Some(parent) => parent.operands.push(expr),
                None => return Ok(expr),
            }
        }
        Err(Error::corrupt(IrLocation::Record(idx), "empty expression"))
    }

    /// Build one expression node from its already decoded operands.
    fn expr_node(&self, idx: usize, mut ops: Operands) -> PulseResult<Expr> {
        let kind = self.record(idx).kind;
        let mut f = self.fields(idx);
        let expr = match kind {
            Kind::Literal => Expr::lit(f.value()?),
            Kind::Var => {
                let id = self.var_id(&mut f)?;
                let ty = f.ty()?;
                let expr = lift(idx, self.builder.var(id))?;
                Self::same_type(idx, &expr, ty)?;
                expr
            }
            Kind::Cell => {
                let array = self.var_id(&mut f)?;
                let ty = f.ty()?;
                let expr = lift(idx, self.builder.cell(array, ops.next()?))?;
                Self::same_type(idx, &expr, ty)?;
                expr
            }
            Kind::Binary => {
                let tag = f.u8()?;
                let op = BinOp::ALL
                    .get(tag as usize)
                    .copied()
                    .ok_or_else(|| f.error(format!("invalid binary operator {tag}")))?;
                let ty = f.ty()?;
                let (left, right) = (ops.next()?, ops.next()?);
                let expr = lift(idx, Expr::binary(op, left, right))?;
                Self::same_type(idx, &expr, ty)?;
                expr
            }
            Kind::Unary => {
                let tag = f.u8()?;
                let op = UNARY_OPS
                    .get(tag as usize)
                    .copied()
                    .ok_or_else(|| f.error(format!("invalid unary operator {tag}")))?;
                let ty = f.ty()?;
                let expr = lift(idx, Expr::unary(op, ops.next()?))?;
                Self::same_type(idx, &expr, ty)?;
                expr
            }
            Kind::Cast => {
                let target = f.ty()?;
                let expr = lift(idx, Expr::cast(target, ops.next()?))?;
                if !matches!(expr.kind(), ExprKind::Cast { .. }) {
                    return Err(f.error(format!("cast to {target} is not a conversion")));
                }
                expr
            }
            other => {
                return Err(f.error(format!("expected an expression, found {other:?}")));
            }
        };
        ops.finish()?;
        f.finish()?;
        Ok(expr)
    }

    fn assign(&self, idx: usize) -> PulseResult<Assign> {
        let mut f = self.fields(idx);
        let var = self.var_id(&mut f)?;
        f.finish()?;
        let mut ops = match self.record(idx).kind {
            Kind::AssignVar | Kind::AssignCell => self.operands(idx)?,
            other => {
                return Err(Error::corrupt(
                    IrLocation::Record(idx),
                    format!("expected an assignment, found {other:?}"),
                ));
            }
        };
        let target = if self.record(idx).kind == Kind::AssignCell {
            AssignTarget::Cell {
                array: var,
                index: ops.next()?,
            }
        } else {
            AssignTarget::Var(var)
        };
        let value = ops.next()?;
        ops.finish()?;
        Ok(Assign { target, value })
    }

    // ---------- Declarations ----------

    /// Tag 1 is reserved: tuples only come out of `zip`, never out of a
    /// declaration.
    fn stream_type(f: &mut Fields) -> PulseResult<StreamType> {
        match f.u8()? {
            0 => Ok(StreamType::Scalar(f.ty()?)),
            2 => Ok(StreamType::Array(f.ty()?, f.u32()?)),
            other => Err(f.error(format!("invalid stream type tag {other}"))),
        }
    }

    fn transform(&self, f: &mut Fields, ops: &mut Operands) -> PulseResult<Transform> {
        let transform = match f.u8()? {
            0 => Transform::Save,
            1 => Transform::SaveAll,
            2 => Transform::Buffer(f.u32()?),
            3 => Transform::Skip(f.u32()?),
            4 => Transform::Take(f.u32()?),
            5 => Transform::Flatten,
            6 => Transform::Cast(f.ty()?),
            7 => {
                let tag = f.u8()?;
                let function = MapFunction::ALL
                    .get(tag as usize)
                    .copied()
                    .ok_or_else(|| f.error(format!("invalid map function {tag}")))?;
                let args = f.count()?;
                let source = if f.bool()? {
                    Some(DemodSource {
                        element: f.str()?,
                        inputs: f.strs()?,
                    })
                } else {
                    None
                };
                let args = (0..args).map(|_| ops.next()).collect::<PulseResult<_>>()?;
                Transform::Map {
                    function,
                    args,
                    source,
                }
            }
            8 => Transform::SkipLast(f.u32()?),
            9 => Transform::Zip {
                with: self.stream_id(f)?,
                item: f.ty()?,
            },
            other => return Err(f.error(format!("invalid transform tag {other}"))),
        };
        Ok(transform)
    }

    fn declare_var(&mut self, idx: usize, f: &mut Fields) -> PulseResult<()> {
        self.arity(idx, 0)?;
        let expected = self.var_id(f)?;
        let ty = f.ty()?;
        let len = if f.bool()? { Some(f.u32()?) } else { None };
        let init = f.values()?;
        let declared = match len {
            Some(len) => self.builder.declare_array(ty, len, init),
            None => {
                let initial = match init.as_slice() {
                    [] => None,
                    [v] => Some(*v),
                    values => {
                        return Err(f.error(format!(
                            "scalar {expected} initialized with {} values",
                            values.len()
                        )));
                    }
                };
                self.builder.declare_variable(ty, initial)
            }
        };
        let declared = lift(idx, declared)?;
        if declared != expected {
            return Err(f.error(format!("declares {expected} but replays as {declared}")));
        }
        Ok(())
    }

    fn declare_stream(&mut self, idx: usize, f: &mut Fields) -> PulseResult<()> {
        let expected = self.stream_id(f)?;
        let name = f.str()?;
        let element = Self::stream_type(f)?;
        let count = f.count()?;
        let mut ops = self.operands(idx)?;
        let pipeline = (0..count)
            .map(|_| self.transform(f, &mut ops))
            .collect::<PulseResult<Vec<_>>>()?;
        ops.finish()?;

        let declared = lift(idx, self.builder.declare_stream(name, element))?;
        if declared != expected {
            return Err(f.error(format!("declares {expected} but replays as {declared}")));
        }
        for transform in pipeline {
            lift(idx, self.builder.attach(declared, transform))?;
        }
        Ok(())
    }

    // ---------- Statements ----------

    fn append(&mut self, idx: usize, stmt: Statement) -> PulseResult<()> {
        let result = self.builder.append_statement(stmt);
        lift(idx, result)
    }

    /// Replay `block_idx` as the body of a block of `kind` opened by the
    /// statement at `idx`.
    fn nested(
        &mut self,
        idx: usize,
        block_idx: usize,
        kind: BlockKind,
        depth: usize,
    ) -> PulseResult<()> {
        let opened = self.builder.open_block(kind);
        let id = lift(idx, opened)?;
        self.block(block_idx, id, depth + 1)?;
        let closed = self.builder.close_block();
        lift(idx, closed)
    }

    /// `depth` counts the blocks enclosing this one; the root is at 0.
    fn block(&mut self, idx: usize, expected: BlockId, depth: usize) -> PulseResult<()> {
        if depth > MAX_DEPTH {
            return Err(Error::corrupt(
                IrLocation::Record(idx),
                format!("blocks nested deeper than {MAX_DEPTH} levels"),
            ));
        }
        let record = self.record(idx);
        if record.kind != Kind::Block {
            return Err(Error::corrupt(
                IrLocation::Record(idx),
                format!("expected a block, found {:?}", record.kind),
            ));
        }
        let mut f = self.fields(idx);
        let id = f.u32()?;
        f.finish()?;
        if id as usize != expected.index() {
            return Err(Error::corrupt(
                IrLocation::Record(idx),
                format!("block b{id} replays as {expected}"),
            ));
        }
        for child in &record.children {
            self.stmt(*child, depth)?;
        }
        Ok(())
    }

    fn play(&self, idx: usize, f: &mut Fields) -> PulseResult<Play> {
        let element = f.str()?;
        let pulse = f.str()?;
        let flags = f.u8()?;
        let known = play_flags::AMP_SCALAR
            | play_flags::AMP_MATRIX
            | play_flags::DURATION
            | play_flags::CONDITION;
        let both_amps = play_flags::AMP_SCALAR | play_flags::AMP_MATRIX;
        if flags & !known != 0 || flags & both_amps == both_amps {
            return Err(f.error(format!("invalid play flags {flags:#06b}")));
        }
        let mut ops = self.operands(idx)?;
        let amp = if flags & play_flags::AMP_SCALAR != 0 {
            Some(Amplitude::Scalar(ops.next()?))
        } else if flags & play_flags::AMP_MATRIX != 0 {
            Some(Self::matrix(&mut ops)?)
        } else {
            None
        };
        let duration = (flags & play_flags::DURATION != 0)
            .then(|| ops.next())
            .transpose()?;
        let condition = (flags & play_flags::CONDITION != 0)
            .then(|| ops.next())
            .transpose()?;
        ops.finish()?;
        Ok(Play {
            element,
            pulse,
            amp,
            duration,
            condition,
        })
    }

    fn matrix(ops: &mut Operands) -> PulseResult<Amplitude> {
        let cells = [ops.next()?, ops.next()?, ops.next()?, ops.next()?];
        Ok(Amplitude::Matrix(Box::new(cells)))
    }

    fn measure(&self, idx: usize, f: &mut Fields) -> PulseResult<Measure> {
        let element = f.str()?;
        let pulse = f.str()?;
        let amp_tag = f.u8()?;
        let count = f.count()?;
        let processes = (0..count)
            .map(|_| -> PulseResult<Demod> {
                let kind = match (f.u8()?, f.u32()?) {
                    (0, 0) => DemodKind::Full,
                    (1, chunk) => DemodKind::Sliced(chunk),
                    (2, chunk) => DemodKind::Accumulated(chunk),
                    (tag, chunk) => {
                        return Err(f.error(format!(
                            "invalid demodulation {tag} with chunk {chunk}"
                        )));
                    }
                };
                Ok(Demod {
                    kind,
                    weights: f.str()?,
                    port: f.opt_str()?,
                    target: self.var_id(f)?,
                })
            })
            .collect::<PulseResult<Vec<_>>>()?;
        let adc_stream = if f.bool()? {
            Some(self.stream_id(f)?)
        } else {
            None
        };
        let mut ops = self.operands(idx)?;
        let amp = match amp_tag {
            0 => None,
            1 => Some(Amplitude::Scalar(ops.next()?)),
            2 => Some(Self::matrix(&mut ops)?),
            other => return Err(f.error(format!("invalid amplitude tag {other}"))),
        };
        ops.finish()?;
        Ok(Measure {
            element,
            pulse,
            amp,
            processes,
            adc_stream,
        })
    }

    fn for_each(&self, f: &mut Fields) -> PulseResult<Vec<ForEachIter>> {
        let count = f.count()?;
        (0..count)
            .map(|_| {
                let var = self.var_id(f)?;
                let source = match f.u8()? {
                    0 => IterSource::Array(self.var_id(f)?),
                    1 => IterSource::Values(f.values()?),
                    other => {
                        return Err(f.error(format!("invalid iterator source {other}")));
                    }
                };
                Ok(ForEachIter { var, source })
            })
            .collect()
    }

    fn wait_for_trigger(&self, f: &mut Fields) -> PulseResult<WaitForTrigger> {
        let element = f.str()?;
        let pulse = f.opt_str()?;
        let trigger = match f.u8()? {
            0 => Trigger::Global,
            1 => Trigger::Element {
                element: f.str()?,
                output: f.opt_str()?,
            },
            other => return Err(f.error(format!("invalid trigger tag {other}"))),
        };
        let time_tag = if f.bool()? {
            Some(self.var_id(f)?)
        } else {
            None
        };
        Ok(WaitForTrigger {
            element,
            pulse,
            trigger,
            time_tag,
        })
    }

    /// Replay a switch: the header goes in first, then each case and the
    /// default are opened against it.
    fn switch(&mut self, idx: usize, f: &mut Fields, depth: usize) -> PulseResult<()> {
        let has_default = f.bool()?;
        let values = f.values()?;
        if values.is_empty() {
            return Err(f.error("switch without any case"));
        }
        let children = self.arity(idx, 1 + values.len() + has_default as usize)?;
        let (head, bodies) = children.split_at(1);
        let expr = self.expr(head[0])?;
        self.append(idx, Statement::Switch(Switch::new(expr)))?;
        for (value, body) in values.into_iter().zip(bodies) {
            self.nested(idx, *body, BlockKind::Case(value), depth)?;
        }
        if has_default {
            self.nested(idx, bodies[bodies.len() - 1], BlockKind::Default, depth)?;
        }
        Ok(())
    }

    fn stmt(&mut self, idx: usize, depth: usize) -> PulseResult<()> {
        let kind = self.record(idx).kind;
        let mut f = self.fields(idx);
        match kind {
            Kind::AssignVar | Kind::AssignCell => {
                let assign = self.assign(idx)?;
                return self.append(idx, Statement::Assign(assign));
            }
            Kind::Play => {
                let play = self.play(idx, &mut f)?;
                self.append(idx, Statement::Play(play))?;
            }
            Kind::Measure => {
                let measure = self.measure(idx, &mut f)?;
                self.append(idx, Statement::Measure(measure))?;
            }
            Kind::Wait => {
                let elements = f.strs()?;
                let mut ops = self.operands(idx)?;
                let duration = ops.next()?;
                ops.finish()?;
                self.append(
                    idx,
                    Statement::Wait(Wait {
                        duration,
                        elements: elements.into(),
                    }),
                )?;
            }
            Kind::Align => {
                self.arity(idx, 0)?;
                let elements = f.strs()?.into();
                self.append(idx, Statement::Align(Align { elements }))?;
            }
            Kind::DeclareVar => self.declare_var(idx, &mut f)?,
            Kind::DeclareStream => self.declare_stream(idx, &mut f)?,
            Kind::If => {
                let has_else = f.bool()?;
                let children = self.arity(idx, if has_else { 3 } else { 2 })?;
                let cond = self.expr(children[0])?;
                self.nested(idx, children[1], BlockKind::If(cond), depth)?;
                if has_else {
                    self.nested(idx, children[2], BlockKind::Else, depth)?;
                }
            }
            Kind::For => {
                let flags = f.u8()?;
                if flags & !(for_flags::INIT | for_flags::UPDATE) != 0 {
                    return Err(f.error(format!("invalid for flags {flags:#04b}")));
                }
                let has_init = flags & for_flags::INIT != 0;
                let has_update = flags & for_flags::UPDATE != 0;
                let children =
                    self.arity(idx, 2 + has_init as usize + has_update as usize)?;
                let mut children = children.iter().copied();
                let mut next = || {
                    children.next().ok_or_else(|| {
                        Error::corrupt(IrLocation::Record(idx), "missing for clause")
                    })
                };
                let init = if has_init {
                    Some(self.assign(next()?)?)
                } else {
                    None
                };
                let cond = self.expr(next()?)?;
                let update = if has_update {
                    Some(self.assign(next()?)?)
                } else {
                    None
                };
                let body = next()?;
                self.nested(idx, body, BlockKind::For { init, cond, update }, depth)?;
            }
            Kind::ForEach => {
                let children = self.arity(idx, 1)?;
                let iterators = self.for_each(&mut f)?;
                self.nested(idx, children[0], BlockKind::ForEach(iterators), depth)?;
            }
            Kind::Switch => self.switch(idx, &mut f, depth)?,
            Kind::InfiniteLoop => {
                let children = self.arity(idx, 1)?;
                self.nested(idx, children[0], BlockKind::InfiniteLoop, depth)?;
            }
            Kind::StrictTiming => {
                let children = self.arity(idx, 1)?;
                self.nested(idx, children[0], BlockKind::StrictTiming, depth)?;
            }
            Kind::Save => {
                let stream = self.stream_id(&mut f)?;
                let mut ops = self.operands(idx)?;
                let source = ops.next()?;
                ops.finish()?;
                self.append(idx, Statement::Save(Save { source, stream }))?;
            }
            Kind::FrameRotation => {
                let element = f.str()?;
                let mut ops = self.operands(idx)?;
                let angle = ops.next()?;
                ops.finish()?;
                self.append(
                    idx,
                    Statement::FrameRotation(FrameRotation { angle, element }),
                )?;
            }
            Kind::ResetPhase => {
                self.arity(idx, 0)?;
                let element = f.str()?;
                self.append(idx, Statement::ResetPhase(ResetPhase { element }))?;
            }
            Kind::ResetFrame => {
                self.arity(idx, 0)?;
                let elements = f.strs()?.into();
                self.append(idx, Statement::ResetFrame(ResetFrame { elements }))?;
            }
            Kind::WaitForTrigger => {
                self.arity(idx, 0)?;
                let wait = self.wait_for_trigger(&mut f)?;
                self.append(idx, Statement::WaitForTrigger(wait))?;
            }
            Kind::UpdateFrequency => {
                let element = f.str()?;
                let keep_phase = f.bool()?;
                let mut ops = self.operands(idx)?;
                let frequency = ops.next()?;
                ops.finish()?;
                self.append(
                    idx,
                    Statement::UpdateFrequency(UpdateFrequency {
                        element,
                        frequency,
                        keep_phase,
                    }),
                )?;
            }
            Kind::Pause => {
                self.arity(idx, 0)?;
                self.append(idx, Statement::Pause)?;
            }
            Kind::Block
            | Kind::Literal
            | Kind::Var
            | Kind::Cell
            | Kind::Binary
            | Kind::Unary
            | Kind::Cast => {
                return Err(f.error(format!("expected a statement, found {kind:?}")));
            }
        }
        f.finish()
    }
}

/// Check that the replayed program allocated what the header announced.
fn check_counts(header: &Header, program: &SealedProgram) -> PulseResult<()> {
    let counts = [
        ("variables", header.variables, program.var_count()),
        ("streams", header.streams, program.stream_count()),
        ("blocks", header.blocks, program.block_count()),
    ];
    for (what, announced, found) in counts {
        if announced as usize != found {
            return Err(Error::corrupt(
                IrLocation::Header,
                format!("header announces {announced} {what}, records declare {found}"),
            ));
        }
    }
    Ok(())
}

pub(crate) fn decode(bytes: &[u8]) -> PulseResult<SealedProgram> {
    let (header, rest) = Header::read(bytes)?;
    let records = read_records(&header, rest)?;
    log::trace!("read {} records", records.len());

    let mut replayer = Replayer {
        header: &header,
        records: &records,
        builder: ProgramBuilder::new(),
    };
    replayer.block(0, BlockId::ROOT, 0)?;
    if let Some(options) = header.compiler_options.clone() {
        let result = replayer.builder.set_compiler_options(options);
        lift(0, result)?;
    }
    let program = lift(0, replayer.builder.seal())?;
    check_counts(&header, &program)?;
    log::debug!(
        "decoded program with {} variables, {} streams and {} blocks",
        program.var_count(),
        program.stream_count(),
        program.block_count()
    );
    Ok(program)
}
