use crate::{BlockId, Expr, StreamId, Value, VarId};
use smallvec::SmallVec;

/// Element names a statement acts on. Most statements name one or two.
pub type Elements = SmallVec<[String; 2]>;

/// The place an assignment writes to.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Var(VarId),
    Cell { array: VarId, index: Expr },
}

impl AssignTarget {
    pub fn var(&self) -> VarId {
        match self {
            AssignTarget::Var(id) | AssignTarget::Cell { array: id, .. } => *id,
        }
    }
}

/// Data for an assignment `target = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub target: AssignTarget,
    pub value: Expr,
}

/// Amplitude scaling for `play` and `measure`: either a single factor or a
/// 2x2 matrix applied to the I/Q pair, in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum Amplitude {
    Scalar(Expr),
    Matrix(Box<[Expr; 4]>),
}

impl Amplitude {
    pub fn exprs(&self) -> &[Expr] {
        match self {
            Amplitude::Scalar(e) => std::slice::from_ref(e),
            Amplitude::Matrix(m) => m.as_slice(),
        }
    }
}

/// Data for the `play` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Play {
    pub element: String,
    /// Operation name, resolved through the element's operation table.
    pub pulse: String,
    pub amp: Option<Amplitude>,
    /// Duration override in clock cycles.
    pub duration: Option<Expr>,
    /// Play only when the condition holds.
    pub condition: Option<Expr>,
}

impl Play {
    pub fn new<E: ToString, P: ToString>(pulse: P, element: E) -> Self {
        Play {
            element: element.to_string(),
            pulse: pulse.to_string(),
            amp: None,
            duration: None,
            condition: None,
        }
    }

    pub fn amp(mut self, amp: Expr) -> Self {
        self.amp = Some(Amplitude::Scalar(amp));
        self
    }

    pub fn amp_matrix(mut self, matrix: [Expr; 4]) -> Self {
        self.amp = Some(Amplitude::Matrix(Box::new(matrix)));
        self
    }

    pub fn duration(mut self, duration: Expr) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn condition(mut self, condition: Expr) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// How a demodulation integrates over the measured window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemodKind {
    /// A single value over the whole window.
    Full,
    /// One value per chunk of the given size, in clock cycles.
    Sliced(u32),
    /// Running sum, one value per chunk of the given size.
    Accumulated(u32),
}

/// One demodulation process of a `measure`.
#[derive(Debug, Clone, PartialEq)]
pub struct Demod {
    pub kind: DemodKind,
    /// Integration weights of the measured pulse.
    pub weights: String,
    /// Input port to demodulate. `None` uses the element's first input.
    pub port: Option<String>,
    /// Variable receiving the result: a fixed scalar for `Full`, a fixed
    /// array otherwise.
    pub target: VarId,
}

impl Demod {
    pub fn full<S: ToString>(weights: S, target: VarId) -> Self {
        Demod {
            kind: DemodKind::Full,
            weights: weights.to_string(),
            port: None,
            target,
        }
    }

    pub fn sliced<S: ToString>(weights: S, chunk: u32, target: VarId) -> Self {
        Demod {
            kind: DemodKind::Sliced(chunk),
            ..Self::full(weights, target)
        }
    }

    pub fn accumulated<S: ToString>(
        weights: S,
        chunk: u32,
        target: VarId,
    ) -> Self {
        Demod {
            kind: DemodKind::Accumulated(chunk),
            ..Self::full(weights, target)
        }
    }

    pub fn on_port<S: ToString>(mut self, port: S) -> Self {
        self.port = Some(port.to_string());
        self
    }
}

/// Data for the `measure` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub element: String,
    pub pulse: String,
    pub amp: Option<Amplitude>,
    pub processes: Vec<Demod>,
    /// Stream receiving the raw ADC trace.
    pub adc_stream: Option<StreamId>,
}

impl Measure {
    pub fn new<E: ToString, P: ToString>(pulse: P, element: E) -> Self {
        Measure {
            element: element.to_string(),
            pulse: pulse.to_string(),
            amp: None,
            processes: vec![],
            adc_stream: None,
        }
    }

    pub fn amp(mut self, amp: Expr) -> Self {
        self.amp = Some(Amplitude::Scalar(amp));
        self
    }

    pub fn demod(mut self, process: Demod) -> Self {
        self.processes.push(process);
        self
    }

    pub fn adc(mut self, stream: StreamId) -> Self {
        self.adc_stream = Some(stream);
        self
    }
}

/// Data for the `wait` statement. No elements means all elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Wait {
    pub duration: Expr,
    pub elements: Elements,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Align {
    pub elements: Elements,
}

/// Push the value of an expression into a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Save {
    pub source: Expr,
    pub stream: StreamId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameRotation {
    /// Angle in units of 2π.
    pub angle: Expr,
    pub element: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResetPhase {
    pub element: String,
}

/// Reset the oscillator frame of every listed element to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetFrame {
    pub elements: Elements,
}

/// The source `wait_for_trigger` listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Global,
    /// A digital output of an element; `None` is its only output.
    Element {
        element: String,
        output: Option<String>,
    },
}

/// Data for the `wait_for_trigger` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitForTrigger {
    pub element: String,
    /// Operation played on `element` while waiting.
    pub pulse: Option<String>,
    pub trigger: Trigger,
    /// Int variable receiving the arrival time of the trigger, in ns.
    pub time_tag: Option<VarId>,
}

impl WaitForTrigger {
    pub fn new<E: ToString>(element: E) -> Self {
        WaitForTrigger {
            element: element.to_string(),
            pulse: None,
            trigger: Trigger::Global,
            time_tag: None,
        }
    }

    pub fn playing<P: ToString>(mut self, pulse: P) -> Self {
        self.pulse = Some(pulse.to_string());
        self
    }

    pub fn from_element<E: ToString>(
        mut self,
        element: E,
        output: Option<&str>,
    ) -> Self {
        self.trigger = Trigger::Element {
            element: element.to_string(),
            output: output.map(str::to_string),
        };
        self
    }

    pub fn time_tag(mut self, target: VarId) -> Self {
        self.time_tag = Some(target);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFrequency {
    pub element: String,
    /// New intermediate frequency in Hz.
    pub frequency: Expr,
    pub keep_phase: bool,
}

/// A declaration. The declared entity lives in the program tables; the
/// statement only marks where it was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decl {
    Var(VarId),
    Stream(StreamId),
}

/// Data for the `if` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub cond: Expr,
    pub then: Block,
    pub otherwise: Option<Block>,
}

/// Data for the `for` statement. A loop without initializer and update is a
/// `while` loop.
#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub init: Option<Assign>,
    pub cond: Expr,
    pub update: Option<Assign>,
    pub body: Block,
}

impl For {
    pub fn is_while(&self) -> bool {
        self.init.is_none() && self.update.is_none()
    }
}

/// Data for the `switch` statement. The expression is compared against
/// every case in order; the first match runs, `default` runs when none does.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub expr: Expr,
    pub cases: Vec<(Value, Block)>,
    pub default: Option<Block>,
}

impl Switch {
    /// A switch that has no case yet. This is the form appended to a block
    /// before its cases are opened.
    pub fn new(expr: Expr) -> Self {
        Switch {
            expr,
            cases: vec![],
            default: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty() && self.default.is_none()
    }
}

/// What a `for_each` iterator walks over.
#[derive(Debug, Clone, PartialEq)]
pub enum IterSource {
    Array(VarId),
    Values(Vec<Value>),
}

/// One `var in source` clause of a `for_each`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForEachIter {
    pub var: VarId,
    pub source: IterSource,
}

/// Data for the `for_each` statement. All iterators advance in lock step.
#[derive(Debug, Clone, PartialEq)]
pub struct ForEach {
    pub iterators: Vec<ForEachIter>,
    pub body: Block,
}

/// Statements of the real-time language.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign(Assign),
    Play(Play),
    Measure(Measure),
    Wait(Wait),
    Declare(Decl),
    If(If),
    For(For),
    ForEach(ForEach),
    Switch(Switch),
    /// A loop without exit condition.
    InfiniteLoop(Block),
    /// Statements that must run with fixed, non-drifting timing.
    StrictTiming(Block),
    Align(Align),
    Save(Save),
    FrameRotation(FrameRotation),
    ResetPhase(ResetPhase),
    ResetFrame(ResetFrame),
    UpdateFrequency(UpdateFrequency),
    WaitForTrigger(WaitForTrigger),
    Pause,
}

impl Statement {
    /// Statements that own blocks. They are built through the block stack
    /// and never appended directly.
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            Statement::If(_)
                | Statement::For(_)
                | Statement::ForEach(_)
                | Statement::Switch(_)
                | Statement::InfiniteLoop(_)
                | Statement::StrictTiming(_)
        )
    }

    /// The blocks owned by this statement, in order.
    pub fn blocks(&self) -> Vec<&Block> {
        match self {
            Statement::If(If {
                then, otherwise, ..
            }) => std::iter::once(then).chain(otherwise.as_ref()).collect(),
            Statement::For(For { body, .. })
            | Statement::ForEach(ForEach { body, .. })
            | Statement::InfiniteLoop(body)
            | Statement::StrictTiming(body) => vec![body],
            Statement::Switch(Switch { cases, default, .. }) => cases
                .iter()
                .map(|(_, body)| body)
                .chain(default.as_ref())
                .collect(),
            _ => vec![],
        }
    }

    /// A short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Statement::Assign(_) => "assign",
            Statement::Play(_) => "play",
            Statement::Measure(_) => "measure",
            Statement::Wait(_) => "wait",
            Statement::Declare(_) => "declare",
            Statement::If(_) => "if",
            Statement::For(f) if f.is_while() => "while",
            Statement::For(_) => "for",
            Statement::ForEach(_) => "for_each",
            Statement::Switch(_) => "switch",
            Statement::InfiniteLoop(_) => "infinite_loop",
            Statement::StrictTiming(_) => "strict_timing",
            Statement::Align(_) => "align",
            Statement::Save(_) => "save",
            Statement::FrameRotation(_) => "frame_rotation",
            Statement::ResetPhase(_) => "reset_phase",
            Statement::ResetFrame(_) => "reset_frame",
            Statement::UpdateFrequency(_) => "update_frequency",
            Statement::WaitForTrigger(_) => "wait_for_trigger",
            Statement::Pause => "pause",
        }
    }
}

/// Ids declared directly in a block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub vars: Vec<VarId>,
    pub streams: Vec<StreamId>,
}

/// An ordered sequence of statements with its own lexical scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub stmts: Vec<Statement>,
    pub scope: Scope,
}

impl Block {
    pub fn new(id: BlockId) -> Self {
        Block {
            id,
            stmts: vec![],
            scope: Scope::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Number of blocks in this subtree, including this one.
    pub fn block_count(&self) -> usize {
        1 + self
            .stmts
            .iter()
            .flat_map(Statement::blocks)
            .map(Block::block_count)
            .sum::<usize>()
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::new(BlockId::ROOT)
    }
}
