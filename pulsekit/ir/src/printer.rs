//! Implements a formatter for sealed programs.
//!
//! The output is canonical: the same program always renders to the same
//! text. Variables are named `v<id>` and streams `s<id>`, so replaying the
//! rendered calls in order reproduces the same numbering. Constructs that
//! have no source form are reported, never skipped.
use crate::{
    Amplitude, AssignTarget, Block, Decl, DemodKind, Expr, ExprKind,
    IndexRef, IterSource, Program, SealedProgram, Statement, Stream,
    Transform, Trigger, Value,
};
use itertools::Itertools;
use pulsekit_utils::{BlockPath, Error, PathSegment, PulseResult};
use std::io;

/// Printer for sealed programs.
pub struct Printer;

impl Printer {
    /// Render the program to text.
    pub fn render(program: &SealedProgram) -> PulseResult<String> {
        let mut renderer = Renderer {
            program,
            buf: String::new(),
            path: BlockPath::root(),
        };
        renderer.program()?;
        Ok(renderer.buf)
    }

    /// Render the program and write it out. Nothing is written if rendering
    /// fails.
    pub fn write_program<F: io::Write>(
        program: &SealedProgram,
        f: &mut F,
    ) -> PulseResult<()> {
        let text = Self::render(program)?;
        f.write_all(text.as_bytes())?;
        Ok(())
    }

    fn quote(s: &str) -> String {
        format!("{s:?}")
    }

    fn quote_all<S: AsRef<str>>(names: &[S]) -> String {
        names.iter().map(|n| Self::quote(n.as_ref())).join(", ")
    }
}

struct Renderer<'a> {
    program: &'a Program,
    buf: String,
    path: BlockPath,
}

impl Renderer<'_> {
    fn line<S: AsRef<str>>(&mut self, indent: usize, text: S) {
        self.buf.push_str(&"  ".repeat(indent));
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
    }

    fn value(&self, value: &Value) -> PulseResult<String> {
        if value.is_finite() {
            Ok(value.to_string())
        } else {
            Err(Error::unsupported(
                format!("non-finite fixed literal `{value}`"),
                &self.path,
            ))
        }
    }

    fn values(&self, values: &[Value]) -> PulseResult<String> {
        let rendered = values
            .iter()
            .map(|v| self.value(v))
            .collect::<PulseResult<Vec<_>>>()?;
        Ok(format!("[{}]", rendered.join(", ")))
    }

    fn expr(&self, expr: &Expr) -> PulseResult<String> {
        self.check_literals(expr)?;
        Ok(expr.to_string())
    }

    fn check_literals(&self, expr: &Expr) -> PulseResult<()> {
        if let ExprKind::Literal(v) = expr.kind() {
            self.value(v)?;
        }
        expr.children()
            .into_iter()
            .try_for_each(|c| self.check_literals(c))
    }

    fn program(&mut self) -> PulseResult<()> {
        if let Some(opts) = self.program.compiler_options() {
            let flags = Printer::quote_all(&opts.flags);
            self.line(
                0,
                format!("compiler_options(strict={}, flags=[{flags}]);", opts.strict),
            );
        }
        self.line(0, "program {");
        self.block(self.program.root(), 1)?;
        self.line(0, "}");

        let program = self.program;
        let with_pipeline = program
            .streams()
            .filter(|s| !s.pipeline.is_empty())
            .collect_vec();
        if !with_pipeline.is_empty() {
            self.line(0, "stream_processing {");
            for stream in with_pipeline {
                self.path.push(PathSegment::Stream(stream.id.index()));
                let text = self.pipeline(stream)?;
                self.path.pop();
                self.line(1, text);
            }
            self.line(0, "}");
        }
        Ok(())
    }

    fn pipeline(&self, stream: &Stream) -> PulseResult<String> {
        let mut text = stream.id.to_string();
        for transform in &stream.pipeline {
            let step = match transform {
                Transform::Save => "save()".to_string(),
                Transform::SaveAll => "save_all()".to_string(),
                Transform::Buffer(n) => format!("buffer({n})"),
                Transform::Skip(n) => format!("skip({n})"),
                Transform::SkipLast(n) => format!("skip_last({n})"),
                Transform::Zip { with, .. } => format!("zip({with})"),
                Transform::Take(n) => format!("take({n})"),
                Transform::Flatten => "flatten()".to_string(),
                Transform::Cast(ty) => format!("cast({ty})"),
                Transform::Map {
                    function,
                    args,
                    source,
                } => {
                    let mut params = args
                        .iter()
                        .map(|a| self.expr(a))
                        .collect::<PulseResult<Vec<_>>>()?;
                    if let Some(src) = source {
                        params.push(format!(
                            "element={}",
                            Printer::quote(&src.element)
                        ));
                        params.push(format!(
                            "inputs=[{}]",
                            Printer::quote_all(&src.inputs)
                        ));
                    }
                    format!("{}({})", function.name(), params.join(", "))
                }
            };
            text.push('.');
            text.push_str(&step);
        }
        text.push(';');
        Ok(text)
    }

    fn block(&mut self, block: &Block, indent: usize) -> PulseResult<()> {
        for (idx, stmt) in block.stmts.iter().enumerate() {
            self.path.push(PathSegment::Stmt(idx));
            self.stmt(stmt, indent)?;
            self.path.pop();
        }
        Ok(())
    }

    fn amp(&self, amp: &Amplitude) -> PulseResult<String> {
        match amp {
            Amplitude::Scalar(e) => Ok(format!("amp={}", self.expr(e)?)),
            Amplitude::Matrix(m) => {
                let cells = m
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<PulseResult<Vec<_>>>()?;
                Ok(format!("amp=[{}]", cells.join(", ")))
            }
        }
    }

    fn target(&self, target: &AssignTarget) -> PulseResult<String> {
        match target {
            AssignTarget::Var(id) => Ok(id.to_string()),
            AssignTarget::Cell { array, index } => {
                Ok(format!("{array}[{}]", self.expr(index)?))
            }
        }
    }

    fn declaration(&self, decl: &Decl) -> PulseResult<String> {
        match decl {
            Decl::Var(id) => {
                let var = self.program.variable(*id).ok_or_else(|| {
                    Error::unsupported(format!("declaration of unknown {id}"), &self.path)
                })?;
                let ty = match var.len {
                    Some(len) => format!("{}[{len}]", var.ty),
                    None => var.ty.to_string(),
                };
                Ok(match (var.len, var.init.as_slice()) {
                    (_, []) => format!("let {id}: {ty};"),
                    (None, [v]) => format!("let {id}: {ty} = {};", self.value(v)?),
                    (_, values) => {
                        format!("let {id}: {ty} = {};", self.values(values)?)
                    }
                })
            }
            Decl::Stream(id) => {
                let stream = self.program.stream(*id).ok_or_else(|| {
                    Error::unsupported(format!("declaration of unknown {id}"), &self.path)
                })?;
                Ok(format!(
                    "stream {id}: {} = {};",
                    stream.element,
                    Printer::quote(&stream.name)
                ))
            }
        }
    }

    fn stmt(&mut self, stmt: &Statement, indent: usize) -> PulseResult<()> {
        let text = match stmt {
            Statement::Declare(decl) => self.declaration(decl)?,
            Statement::Assign(assign) => format!(
                "{} = {};",
                self.target(&assign.target)?,
                self.expr(&assign.value)?
            ),
            Statement::Play(play) => {
                let mut args =
                    vec![Printer::quote(&play.pulse), Printer::quote(&play.element)];
                if let Some(amp) = &play.amp {
                    args.push(self.amp(amp)?);
                }
                if let Some(d) = &play.duration {
                    args.push(format!("duration={}", self.expr(d)?));
                }
                if let Some(c) = &play.condition {
                    args.push(format!("condition={}", self.expr(c)?));
                }
                format!("play({});", args.join(", "))
            }
            Statement::Measure(measure) => {
                let mut args = vec![
                    Printer::quote(&measure.pulse),
                    Printer::quote(&measure.element),
                ];
                if let Some(amp) = &measure.amp {
                    args.push(self.amp(amp)?);
                }
                for process in &measure.processes {
                    let weights = Printer::quote(&process.weights);
                    let mut call = match process.kind {
                        DemodKind::Full => {
                            format!("demod.full({weights}, {}", process.target)
                        }
                        DemodKind::Sliced(chunk) => format!(
                            "demod.sliced({weights}, {chunk}, {}",
                            process.target
                        ),
                        DemodKind::Accumulated(chunk) => format!(
                            "demod.accumulated({weights}, {chunk}, {}",
                            process.target
                        ),
                    };
                    if let Some(port) = &process.port {
                        call.push_str(&format!(", port={}", Printer::quote(port)));
                    }
                    call.push(')');
                    args.push(call);
                }
                if let Some(adc) = measure.adc_stream {
                    args.push(format!("adc={adc}"));
                }
                format!("measure({});", args.join(", "))
            }
            Statement::Wait(wait) => {
                let mut args = vec![self.expr(&wait.duration)?];
                args.extend(wait.elements.iter().map(|e| Printer::quote(e)));
                format!("wait({});", args.join(", "))
            }
            Statement::Align(align) => {
                format!("align({});", Printer::quote_all(&align.elements))
            }
            Statement::Save(save) => {
                format!("save({}, {});", self.expr(&save.source)?, save.stream)
            }
            Statement::FrameRotation(rot) => format!(
                "frame_rotation({}, {});",
                self.expr(&rot.angle)?,
                Printer::quote(&rot.element)
            ),
            Statement::ResetPhase(reset) => {
                format!("reset_phase({});", Printer::quote(&reset.element))
            }
            Statement::UpdateFrequency(upd) => {
                let keep = if upd.keep_phase { ", keep_phase=true" } else { "" };
                format!(
                    "update_frequency({}, {}{keep});",
                    Printer::quote(&upd.element),
                    self.expr(&upd.frequency)?
                )
            }
            Statement::ResetFrame(reset) => {
                format!("reset_frame({});", Printer::quote_all(&reset.elements))
            }
            Statement::WaitForTrigger(wait) => {
                let mut args = vec![Printer::quote(&wait.element)];
                if let Some(pulse) = &wait.pulse {
                    args.push(format!("pulse={}", Printer::quote(pulse)));
                }
                match &wait.trigger {
                    Trigger::Global => (),
                    Trigger::Element {
                        element,
                        output: None,
                    } => args.push(format!("trigger={}", Printer::quote(element))),
                    Trigger::Element {
                        element,
                        output: Some(output),
                    } => args.push(format!(
                        "trigger=({}, {})",
                        Printer::quote(element),
                        Printer::quote(output)
                    )),
                }
                if let Some(target) = wait.time_tag {
                    args.push(format!("time_tag={target}"));
                }
                format!("wait_for_trigger({});", args.join(", "))
            }
            Statement::Pause => "pause();".to_string(),
            Statement::If(stmt) => {
                let header = format!("if ({}) {{", self.expr(&stmt.cond)?);
                self.line(indent, header);
                self.block(&stmt.then, indent + 1)?;
                if let Some(otherwise) = &stmt.otherwise {
                    self.line(indent, "} else {");
                    self.path.push(PathSegment::Else);
                    self.block(otherwise, indent + 1)?;
                    self.path.pop();
                }
                "}".to_string()
            }
            Statement::For(stmt) => {
                let cond = self.expr(&stmt.cond)?;
                let header = match (&stmt.init, &stmt.update) {
                    (None, None) => format!("while ({cond}) {{"),
                    (Some(init), Some(update)) => format!(
                        "for ({} = {}; {cond}; {} = {}) {{",
                        self.target(&init.target)?,
                        self.expr(&init.value)?,
                        self.target(&update.target)?,
                        self.expr(&update.value)?
                    ),
                    (Some(_), None) => {
                        return Err(Error::unsupported(
                            "for loop with an initializer but no update",
                            &self.path,
                        ));
                    }
                    (None, Some(_)) => {
                        return Err(Error::unsupported(
                            "for loop with an update but no initializer",
                            &self.path,
                        ));
                    }
                };
                self.line(indent, header);
                self.block(&stmt.body, indent + 1)?;
                "}".to_string()
            }
            Statement::ForEach(stmt) => {
                let iterators: Vec<_> = stmt
                    .iterators
                    .iter()
                    .map(|it| -> PulseResult<String> {
                        let source = match &it.source {
                            IterSource::Array(array) => array.to_string(),
                            IterSource::Values(values) => self.values(values)?,
                        };
                        Ok(format!("{} in {source}", it.var))
                    })
                    .collect::<PulseResult<Vec<_>>>()?;
                self.line(indent, format!("for_each ({}) {{", iterators.join(", ")));
                self.block(&stmt.body, indent + 1)?;
                "}".to_string()
            }
            Statement::Switch(switch) => {
                let header = format!("switch ({}) {{", self.expr(&switch.expr)?);
                self.line(indent, header);
                for (idx, (value, body)) in switch.cases.iter().enumerate() {
                    self.path.push(PathSegment::Case(idx));
                    let case = format!("case {} {{", self.value(value)?);
                    self.line(indent + 1, case);
                    self.block(body, indent + 2)?;
                    self.line(indent + 1, "}");
                    self.path.pop();
                }
                if let Some(default) = &switch.default {
                    self.path.push(PathSegment::Default);
                    self.line(indent + 1, "default {");
                    self.block(default, indent + 2)?;
                    self.line(indent + 1, "}");
                    self.path.pop();
                }
                "}".to_string()
            }
            Statement::InfiniteLoop(body) => {
                self.line(indent, "infinite_loop {");
                self.block(body, indent + 1)?;
                "}".to_string()
            }
            Statement::StrictTiming(body) => {
                self.line(indent, "strict_timing {");
                self.block(body, indent + 1)?;
                "}".to_string()
            }
        };
        self.line(indent, text);
        Ok(())
    }
}
