//! Errors generated by the pulsekit crates.
use itertools::Itertools;
use std::fmt;
use thiserror::Error;

/// Convenience wrapper to represent success or a meaningful pulsekit error.
pub type PulseResult<T> = std::result::Result<T, Error>;

/// The namespace an unresolved or duplicated name lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Variable,
    Stream,
    Element,
    Pulse,
    Port,
    Weights,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefKind::Variable => "variable",
            RefKind::Stream => "stream",
            RefKind::Element => "element",
            RefKind::Pulse => "pulse",
            RefKind::Port => "input port",
            RefKind::Weights => "integration weights",
        };
        f.write_str(name)
    }
}

/// One step from a block into something it contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSegment {
    /// The n-th statement of the current block. Descending into a
    /// block-owning statement continues in its (first) body; the branches
    /// of a `switch` are always named by a following `Case` or `Default`.
    Stmt(usize),
    /// The else branch of the `if` reached by the previous segment.
    Else,
    /// The n-th case of the `switch` reached by the previous segment.
    Case(usize),
    /// The default branch of that `switch`.
    Default,
    /// The pipeline of a stream, by stream index.
    Stream(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Stmt(idx) => write!(f, "{idx}"),
            PathSegment::Else => f.write_str("else"),
            PathSegment::Case(idx) => write!(f, "case{idx}"),
            PathSegment::Default => f.write_str("default"),
            PathSegment::Stream(idx) => write!(f, "s{idx}"),
        }
    }
}

/// Location of a construct in the program tree, as the chain of indices
/// taken from the root block. Displayed as `root/2/else/0`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockPath(Vec<PathSegment>);

impl BlockPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for BlockPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("root")
        } else {
            write!(f, "root/{}", self.0.iter().join("/"))
        }
    }
}

/// Where in a serialized buffer a format error was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrLocation {
    Header,
    Record(usize),
}

impl fmt::Display for IrLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrLocation::Header => f.write_str("header"),
            IrLocation::Record(idx) => write!(f, "record {idx}"),
        }
    }
}

/// Every failure the pulsekit crates report.
///
/// Structural errors are raised by the call that violates a contract,
/// format errors only come out of decoding a serialized buffer, and render
/// errors only come out of the textual re-emitter.
#[derive(Error, Debug)]
pub enum Error {
    /// `close_block` was called with only the root block open.
    #[error("close_block called with no open block")]
    ScopeUnderflow,

    /// The program was sealed and can no longer be modified.
    #[error("program is sealed and can no longer be modified")]
    ProgramSealed,

    #[error("unresolved {kind} `{name}`")]
    UnresolvedReference { kind: RefKind, name: String },

    #[error("invalid pipeline on stream `{stream}`: {reason}")]
    InvalidPipeline { stream: String, reason: String },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid cast from {from} to {to}")]
    InvalidCast { from: String, to: String },

    /// Misuse of the block stack that is not an underflow.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("duplicate {kind} `{name}`")]
    DuplicateName { kind: RefKind, name: String },

    #[error("corrupt IR at {at}: {reason}")]
    CorruptIR { at: IrLocation, reason: String },

    /// A child link points outside the emitted node table.
    #[error("malformed tree: {0}")]
    MalformedTree(String),

    #[error("unsupported format version {found} (supported: {supported})")]
    UnsupportedFormatVersion { found: u16, supported: u16 },

    #[error("cannot render {construct} at {path}")]
    UnsupportedConstruct { construct: String, path: BlockPath },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn type_mismatch<S: ToString>(msg: S) -> Self {
        Self::TypeMismatch(msg.to_string())
    }

    pub fn unresolved<S: ToString>(kind: RefKind, name: S) -> Self {
        Self::UnresolvedReference {
            kind,
            name: name.to_string(),
        }
    }

    pub fn invalid_pipeline<S: ToString, R: ToString>(
        stream: S,
        reason: R,
    ) -> Self {
        Self::InvalidPipeline {
            stream: stream.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_scope<S: ToString>(msg: S) -> Self {
        Self::InvalidScope(msg.to_string())
    }

    pub fn corrupt<S: ToString>(at: IrLocation, reason: S) -> Self {
        Self::CorruptIR {
            at,
            reason: reason.to_string(),
        }
    }

    pub fn unsupported<S: ToString>(construct: S, path: &BlockPath) -> Self {
        Self::UnsupportedConstruct {
            construct: construct.to_string(),
            path: path.clone(),
        }
    }

    /// Errors raised while building or sealing a program.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::ScopeUnderflow
                | Error::ProgramSealed
                | Error::UnresolvedReference { .. }
                | Error::InvalidPipeline { .. }
                | Error::TypeMismatch(_)
                | Error::InvalidCast { .. }
                | Error::InvalidScope(_)
                | Error::DuplicateName { .. }
        )
    }

    /// Errors raised while reading or writing the wire format.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Error::CorruptIR { .. }
                | Error::MalformedTree(_)
                | Error::UnsupportedFormatVersion { .. }
        )
    }

    pub fn is_render(&self) -> bool {
        matches!(self, Error::UnsupportedConstruct { .. })
    }
}
