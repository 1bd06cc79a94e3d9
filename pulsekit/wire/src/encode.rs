//! Lowers a sealed program into the flat record table.
//!
//! Records are emitted in depth-first pre-order: a record's slot is
//! reserved before its children are emitted, so every child index is
//! greater than its parent's.
use crate::{
    header::Header,
    records::{FieldWriter, Kind, Record},
};
use pulsekit_ir::{
    Amplitude, Assign, AssignTarget, BinOp, Block, Decl, DemodKind, Expr,
    ExprKind, IndexRef, IterSource, MapFunction, Program, SealedProgram,
    Statement, Stream, StreamType, Transform, Trigger, UnaryOp, Value,
};
use itertools::Itertools;
use pulsekit_utils::{Error, PulseResult};
use std::iter;

/// Flags of a `play` record.
pub(crate) mod play_flags {
    pub const AMP_SCALAR: u8 = 1;
    pub const AMP_MATRIX: u8 = 1 << 1;
    pub const DURATION: u8 = 1 << 2;
    pub const CONDITION: u8 = 1 << 3;
}

/// Flags of a `for` record.
pub(crate) mod for_flags {
    pub const INIT: u8 = 1;
    pub const UPDATE: u8 = 1 << 1;
}

pub(crate) fn binop_tag(op: BinOp) -> u8 {
    BinOp::ALL.iter().position(|o| *o == op).unwrap_or_default() as u8
}

pub(crate) const UNARY_OPS: [UnaryOp; 2] = [UnaryOp::Neg, UnaryOp::Not];

pub(crate) fn amp_tag(amp: Option<&Amplitude>) -> u8 {
    match amp {
        None => 0,
        Some(Amplitude::Scalar(_)) => 1,
        Some(Amplitude::Matrix(_)) => 2,
    }
}

struct Emitter<'a> {
    program: &'a Program,
    records: Vec<Record>,
}

impl Emitter<'_> {
    /// Reserve the next slot for a record of `kind`.
    fn reserve(&mut self, kind: Kind) -> usize {
        self.records.push(Record {
            kind,
            children: vec![],
            fields: vec![],
        });
        self.records.len() - 1
    }

    fn fill(&mut self, idx: usize, children: Vec<u32>, fields: FieldWriter) {
        let record = &mut self.records[idx];
        record.children = children;
        record.fields = fields.finish();
    }

    fn index(idx: usize) -> PulseResult<u32> {
        u32::try_from(idx)
            .map_err(|_| Error::MalformedTree(format!("record index {idx} does not fit in u32")))
    }

    fn block(&mut self, block: &Block) -> PulseResult<u32> {
        let idx = self.reserve(Kind::Block);
        let children = block
            .stmts
            .iter()
            .map(|stmt| self.stmt(stmt))
            .collect::<PulseResult<_>>()?;
        let mut fields = FieldWriter::default();
        fields.u32(block.id.index() as u32);
        self.fill(idx, children, fields);
        Self::index(idx)
    }

    fn exprs<'e, I>(&mut self, exprs: I) -> PulseResult<Vec<u32>>
    where
        I: IntoIterator<Item = &'e Expr>,
    {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn expr(&mut self, expr: &Expr) -> PulseResult<u32> {
        let kind = match expr.kind() {
            ExprKind::Literal(_) => Kind::Literal,
            ExprKind::Var(_) => Kind::Var,
            ExprKind::ArrayCell { .. } => Kind::Cell,
            ExprKind::Binary { .. } => Kind::Binary,
            ExprKind::Unary { .. } => Kind::Unary,
            ExprKind::Cast { .. } => Kind::Cast,
        };
        let idx = self.reserve(kind);
        let children = self.exprs(expr.children())?;
        let mut fields = FieldWriter::default();
        match expr.kind() {
            ExprKind::Literal(v) => {
                fields.value(v);
            }
            ExprKind::Var(id) => {
                fields.u32(id.index() as u32).ty(expr.ty());
            }
            ExprKind::ArrayCell { array, .. } => {
                fields.u32(array.index() as u32).ty(expr.ty());
            }
            ExprKind::Binary { op, .. } => {
                fields.u8(binop_tag(*op)).ty(expr.ty());
            }
            ExprKind::Unary { op, .. } => {
                let tag = UNARY_OPS.iter().position(|o| o == op).unwrap_or_default();
                fields.u8(tag as u8).ty(expr.ty());
            }
            ExprKind::Cast { target, .. } => {
                fields.ty(*target);
            }
        }
        self.fill(idx, children, fields);
        Self::index(idx)
    }

    fn assign(&mut self, assign: &Assign) -> PulseResult<u32> {
        let (kind, var) = match &assign.target {
            AssignTarget::Var(id) => (Kind::AssignVar, id),
            AssignTarget::Cell { array, .. } => (Kind::AssignCell, array),
        };
        let idx = self.reserve(kind);
        let mut children = vec![];
        if let AssignTarget::Cell { index, .. } = &assign.target {
            children.push(self.expr(index)?);
        }
        children.push(self.expr(&assign.value)?);
        let mut fields = FieldWriter::default();
        fields.u32(var.index() as u32);
        self.fill(idx, children, fields);
        Self::index(idx)
    }

    /// Declared element types. Tag 1 stays reserved for tuples, which only
    /// come out of a pipeline.
    fn stream_type(fields: &mut FieldWriter, ty: &StreamType) -> PulseResult<()> {
        match ty {
            StreamType::Scalar(t) => {
                fields.u8(0).ty(*t);
            }
            StreamType::Array(t, len) => {
                fields.u8(2).ty(*t).u32(*len);
            }
            StreamType::Tuple(_) => {
                return Err(Error::MalformedTree(format!(
                    "stream declared with tuple element {ty}"
                )));
            }
        }
        Ok(())
    }

    /// Fields of a stream declaration. Map arguments become children.
    fn stream(
        &mut self,
        stream: &Stream,
        fields: &mut FieldWriter,
    ) -> PulseResult<Vec<u32>> {
        fields.u32(stream.id.index() as u32).str(&stream.name)?;
        Self::stream_type(fields, &stream.element)?;
        fields.count(stream.pipeline.len())?;
        let mut children = vec![];
        for transform in &stream.pipeline {
            match transform {
                Transform::Save => {
                    fields.u8(0);
                }
                Transform::SaveAll => {
                    fields.u8(1);
                }
                Transform::Buffer(n) => {
                    fields.u8(2).u32(*n);
                }
                Transform::Skip(n) => {
                    fields.u8(3).u32(*n);
                }
                Transform::Take(n) => {
                    fields.u8(4).u32(*n);
                }
                Transform::Flatten => {
                    fields.u8(5);
                }
                Transform::Cast(t) => {
                    fields.u8(6).ty(*t);
                }
                Transform::Map {
                    function,
                    args,
                    source,
                } => {
                    let tag =
                        MapFunction::ALL.iter().position(|f| f == function).unwrap_or_default();
                    fields.u8(7).u8(tag as u8).count(args.len())?;
                    match source {
                        Some(src) => {
                            fields.bool(true).str(&src.element)?.strs(&src.inputs)?;
                        }
                        None => {
                            fields.bool(false);
                        }
                    }
                    children.extend(self.exprs(args)?);
                }
                Transform::SkipLast(n) => {
                    fields.u8(8).u32(*n);
                }
                Transform::Zip { with, item } => {
                    fields.u8(9).u32(with.index() as u32).ty(*item);
                }
            }
        }
        Ok(children)
    }

    fn stmt(&mut self, stmt: &Statement) -> PulseResult<u32> {
        let kind = match stmt {
            Statement::Assign(assign) => return self.assign(assign),
            Statement::Play(_) => Kind::Play,
            Statement::Measure(_) => Kind::Measure,
            Statement::Wait(_) => Kind::Wait,
            Statement::Declare(Decl::Var(_)) => Kind::DeclareVar,
            Statement::Declare(Decl::Stream(_)) => Kind::DeclareStream,
            Statement::If(_) => Kind::If,
            Statement::For(_) => Kind::For,
            Statement::ForEach(_) => Kind::ForEach,
            Statement::Switch(_) => Kind::Switch,
            Statement::InfiniteLoop(_) => Kind::InfiniteLoop,
            Statement::StrictTiming(_) => Kind::StrictTiming,
            Statement::Align(_) => Kind::Align,
            Statement::Save(_) => Kind::Save,
            Statement::FrameRotation(_) => Kind::FrameRotation,
            Statement::ResetPhase(_) => Kind::ResetPhase,
            Statement::UpdateFrequency(_) => Kind::UpdateFrequency,
            Statement::ResetFrame(_) => Kind::ResetFrame,
            Statement::WaitForTrigger(_) => Kind::WaitForTrigger,
            Statement::Pause => Kind::Pause,
        };
        let idx = self.reserve(kind);
        let mut fields = FieldWriter::default();
        let children = match stmt {
            Statement::Assign(_) | Statement::Pause => vec![],
            Statement::Play(play) => {
                let mut flags = 0;
                match &play.amp {
                    Some(Amplitude::Scalar(_)) => flags |= play_flags::AMP_SCALAR,
                    Some(Amplitude::Matrix(_)) => flags |= play_flags::AMP_MATRIX,
                    None => (),
                }
                if play.duration.is_some() {
                    flags |= play_flags::DURATION;
                }
                if play.condition.is_some() {
                    flags |= play_flags::CONDITION;
                }
                fields.str(&play.element)?.str(&play.pulse)?.u8(flags);
                let amp = play.amp.iter().flat_map(Amplitude::exprs);
                self.exprs(amp.chain(&play.duration).chain(&play.condition))?
            }
            Statement::Measure(measure) => {
                fields
                    .str(&measure.element)?
                    .str(&measure.pulse)?
                    .u8(amp_tag(measure.amp.as_ref()))
                    .count(measure.processes.len())?;
                for process in &measure.processes {
                    match process.kind {
                        DemodKind::Full => fields.u8(0).u32(0),
                        DemodKind::Sliced(chunk) => fields.u8(1).u32(chunk),
                        DemodKind::Accumulated(chunk) => fields.u8(2).u32(chunk),
                    };
                    fields
                        .str(&process.weights)?
                        .opt_str(process.port.as_deref())?
                        .u32(process.target.index() as u32);
                }
                match measure.adc_stream {
                    Some(adc) => fields.bool(true).u32(adc.index() as u32),
                    None => fields.bool(false),
                };
                self.exprs(measure.amp.iter().flat_map(Amplitude::exprs))?
            }
            Statement::Wait(wait) => {
                fields.strs(&wait.elements)?;
                vec![self.expr(&wait.duration)?]
            }
            Statement::Align(align) => {
                fields.strs(&align.elements)?;
                vec![]
            }
            Statement::Declare(Decl::Var(id)) => {
                let var = self.program.variable(*id).ok_or_else(|| {
                    Error::MalformedTree(format!("declaration of unknown {id}"))
                })?;
                fields.u32(id.index() as u32).ty(var.ty);
                match var.len {
                    Some(len) => fields.bool(true).u32(len),
                    None => fields.bool(false),
                };
                fields.values(&var.init)?;
                vec![]
            }
            Statement::Declare(Decl::Stream(id)) => {
                let program = self.program;
                let stream = program.stream(*id).ok_or_else(|| {
                    Error::MalformedTree(format!("declaration of unknown {id}"))
                })?;
                self.stream(stream, &mut fields)?
            }
            Statement::Save(save) => {
                fields.u32(save.stream.index() as u32);
                vec![self.expr(&save.source)?]
            }
            Statement::FrameRotation(rot) => {
                fields.str(&rot.element)?;
                vec![self.expr(&rot.angle)?]
            }
            Statement::ResetPhase(reset) => {
                fields.str(&reset.element)?;
                vec![]
            }
            Statement::ResetFrame(reset) => {
                fields.strs(&reset.elements)?;
                vec![]
            }
            Statement::WaitForTrigger(wait) => {
                fields.str(&wait.element)?.opt_str(wait.pulse.as_deref())?;
                match &wait.trigger {
                    Trigger::Global => {
                        fields.u8(0);
                    }
                    Trigger::Element { element, output } => {
                        fields.u8(1).str(element)?.opt_str(output.as_deref())?;
                    }
                }
                match wait.time_tag {
                    Some(target) => fields.bool(true).u32(target.index() as u32),
                    None => fields.bool(false),
                };
                vec![]
            }
            Statement::UpdateFrequency(upd) => {
                fields.str(&upd.element)?.bool(upd.keep_phase);
                vec![self.expr(&upd.frequency)?]
            }
            Statement::If(stmt) => {
                fields.bool(stmt.otherwise.is_some());
                let mut children = vec![self.expr(&stmt.cond)?, self.block(&stmt.then)?];
                if let Some(otherwise) = &stmt.otherwise {
                    children.push(self.block(otherwise)?);
                }
                children
            }
            Statement::For(stmt) => {
                let mut flags = 0;
                if stmt.init.is_some() {
                    flags |= for_flags::INIT;
                }
                if stmt.update.is_some() {
                    flags |= for_flags::UPDATE;
                }
                fields.u8(flags);
                let mut children = vec![];
                if let Some(init) = &stmt.init {
                    children.push(self.assign(init)?);
                }
                children.push(self.expr(&stmt.cond)?);
                if let Some(update) = &stmt.update {
                    children.push(self.assign(update)?);
                }
                children.push(self.block(&stmt.body)?);
                children
            }
            Statement::ForEach(stmt) => {
                fields.count(stmt.iterators.len())?;
                for it in &stmt.iterators {
                    fields.u32(it.var.index() as u32);
                    match &it.source {
                        IterSource::Array(array) => {
                            fields.u8(0).u32(array.index() as u32);
                        }
                        IterSource::Values(values) => {
                            fields.u8(1).values(values)?;
                        }
                    }
                }
                vec![self.block(&stmt.body)?]
            }
            Statement::Switch(switch) => {
                let values = switch.cases.iter().map(|(v, _)| *v).collect::<Vec<Value>>();
                fields.bool(switch.default.is_some()).values(&values)?;
                let mut children = vec![self.expr(&switch.expr)?];
                for body in stmt.blocks() {
                    children.push(self.block(body)?);
                }
                children
            }
            Statement::InfiniteLoop(body) | Statement::StrictTiming(body) => {
                vec![self.block(body)?]
            }
        };
        self.fill(idx, children, fields);
        Self::index(idx)
    }
}

/// Every child must point forward, stay inside the table and appear in
/// increasing order.
pub(crate) fn check_tree(records: &[Record]) -> PulseResult<()> {
    for (idx, record) in records.iter().enumerate() {
        let links = record.children.iter().map(|c| *c as usize);
        if let Some(child) = links.clone().find(|c| *c >= records.len()) {
            return Err(Error::MalformedTree(format!(
                "record {idx} links to {child}, past the last record {}",
                records.len().saturating_sub(1)
            )));
        }
        if let Some((_, child)) = iter::once(idx)
            .chain(links)
            .tuple_windows()
            .find(|(prev, next)| next <= prev)
        {
            return Err(Error::MalformedTree(format!(
                "record {idx} links to {child} out of order"
            )));
        }
    }
    Ok(())
}

/// Build the header and record table for `program`.
pub(crate) fn lower(program: &SealedProgram) -> PulseResult<(Header, Vec<Record>)> {
    let mut emitter = Emitter {
        program: program.program(),
        records: vec![],
    };
    emitter.block(program.root())?;
    let records = emitter.records;
    check_tree(&records)?;
    let count = |n: usize| {
        u32::try_from(n).map_err(|_| Error::MalformedTree(format!("{n} entries do not fit in u32")))
    };
    let header = Header {
        variables: count(program.var_count())?,
        streams: count(program.stream_count())?,
        blocks: count(program.block_count())?,
        records: count(records.len())?,
        compiler_options: program.compiler_options().cloned(),
    };
    Ok((header, records))
}

/// Frame the records after the header.
pub(crate) fn write_records(records: &[Record], out: &mut Vec<u8>) -> PulseResult<()> {
    for record in records {
        let len = u32::try_from(record.payload_len()).map_err(|_| {
            Error::MalformedTree(format!("{:?} record is too large", record.kind))
        })?;
        out.push(record.kind as u8);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(record.children.len() as u32).to_le_bytes());
        for child in &record.children {
            out.extend_from_slice(&child.to_le_bytes());
        }
        out.extend_from_slice(&record.fields);
    }
    Ok(())
}
