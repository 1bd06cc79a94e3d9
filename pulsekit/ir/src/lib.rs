//! The in-memory representation of pulse-control programs.
//!
//! Programs are constructed through a [`ProgramBuilder`], which type-checks
//! every expression and statement as it is appended and validates scoping
//! when the program is sealed. A [`SealedProgram`] is immutable and can be
//! shared across threads, rendered with the [`Printer`] or handed to the wire
//! codec.
mod builder;
mod config;
mod control;
mod expr;
mod ids;
mod printer;
mod program;
mod stream;
mod types;
mod well_formed;

/// Deepest nesting a program may have: blocks open below the root, and the
/// height of an expression tree. The builder rejects anything deeper, so
/// every sealed program can be serialized and decoded again.
pub const MAX_DEPTH: usize = 64;

pub use builder::{BlockKind, ProgramBuilder};
pub use config::{ElementConfig, HardwareConfig, PulseConfig};
pub use control::{
    Align, Amplitude, Assign, AssignTarget, Block, Decl, Demod, DemodKind,
    Elements, For, ForEach, ForEachIter, FrameRotation, If, IterSource, Measure,
    Play, ResetFrame, ResetPhase, Save, Scope, Statement, Switch, Trigger,
    UpdateFrequency, Wait, WaitForTrigger,
};
pub use expr::{BinOp, Expr, ExprKind, UnaryOp};
pub use ids::{BlockId, StreamId, VarId};
pub use printer::Printer;
pub use program::{CompilerOptions, Program, SealedProgram, Variable};
pub use stream::{DemodSource, MapFunction, Stream, StreamType, Transform};
pub use types::{ScalarType, Value};

// Re-export the id plumbing so downstream crates do not need their own
// dependency on it.
pub use pulsekit_idx::IndexRef;
