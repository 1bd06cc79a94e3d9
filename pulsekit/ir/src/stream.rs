//! Stream-processing pipelines.
//!
//! A pipeline is a purely descriptive chain of transforms attached to a
//! result stream. It is validated transform by transform as it is attached:
//! each transform is checked against the element type flowing out of the
//! transforms before it.
use crate::{BlockId, Expr, ScalarType, StreamId};
use itertools::Itertools;
use pulsekit_utils::{Error, PulseResult};
use std::fmt;

/// The type of the elements flowing through a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamType {
    Scalar(ScalarType),
    Tuple(Vec<ScalarType>),
    Array(ScalarType, u32),
}

impl StreamType {
    /// Scalar type of the individual values, when there is exactly one.
    fn item(&self) -> Option<ScalarType> {
        match self {
            StreamType::Scalar(t) | StreamType::Array(t, _) => Some(*t),
            StreamType::Tuple(_) => None,
        }
    }

    fn with_item(&self, ty: ScalarType) -> StreamType {
        match self {
            StreamType::Scalar(_) => StreamType::Scalar(ty),
            StreamType::Array(_, len) => StreamType::Array(ty, *len),
            StreamType::Tuple(items) => StreamType::Tuple(vec![ty; items.len()]),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Scalar(t) => write!(f, "{t}"),
            StreamType::Tuple(items) => write!(f, "({})", items.iter().join(", ")),
            StreamType::Array(t, len) => write!(f, "{t}[{len}]"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapFunction {
    Average,
    DemodSum,
    DemodNoSum,
    Fft,
    BooleanAnd,
    BooleanOr,
    BooleanXor,
    BooleanToInt,
}

impl MapFunction {
    pub const ALL: [MapFunction; 8] = [
        MapFunction::Average,
        MapFunction::DemodSum,
        MapFunction::DemodNoSum,
        MapFunction::Fft,
        MapFunction::BooleanAnd,
        MapFunction::BooleanOr,
        MapFunction::BooleanXor,
        MapFunction::BooleanToInt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MapFunction::Average => "average",
            MapFunction::DemodSum => "demod_sum",
            MapFunction::DemodNoSum => "demod_no_sum",
            MapFunction::Fft => "fft",
            MapFunction::BooleanAnd => "boolean_and",
            MapFunction::BooleanOr => "boolean_or",
            MapFunction::BooleanXor => "boolean_xor",
            MapFunction::BooleanToInt => "boolean_to_int",
        }
    }

    pub fn is_demod(&self) -> bool {
        matches!(self, MapFunction::DemodSum | MapFunction::DemodNoSum)
    }
}

/// The element a demodulation reads its samples from, with the input ports
/// it uses. The names are resolved against the hardware configuration when
/// the program is serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemodSource {
    pub element: String,
    pub inputs: Vec<String>,
}

impl DemodSource {
    pub fn new<S: ToString>(element: S, inputs: &[&str]) -> Self {
        DemodSource {
            element: element.to_string(),
            inputs: inputs.iter().map(|i| i.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Store the processed values under the stream's name.
    Save,
    /// Store every value, not only the last one.
    SaveAll,
    /// Group the given number of consecutive values into an array.
    Buffer(u32),
    Skip(u32),
    /// Drop the given number of values at the end of the stream.
    SkipLast(u32),
    Take(u32),
    /// Unpack each array into its items.
    Flatten,
    Cast(ScalarType),
    /// Pair every value with the next value of another stream. `item` is
    /// the scalar type that stream produces.
    Zip {
        with: StreamId,
        item: ScalarType,
    },
    Map {
        function: MapFunction,
        /// Constant arguments; the two weights for demodulations.
        args: Vec<Expr>,
        source: Option<DemodSource>,
    },
}

impl Transform {
    pub fn map(function: MapFunction) -> Self {
        Transform::Map {
            function,
            args: vec![],
            source: None,
        }
    }

    pub fn demod(
        summed: bool,
        weights: [Expr; 2],
        source: DemodSource,
    ) -> Self {
        Transform::Map {
            function: if summed {
                MapFunction::DemodSum
            } else {
                MapFunction::DemodNoSum
            },
            args: weights.into(),
            source: Some(source),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Transform::Save | Transform::SaveAll)
    }
}

/// A declared result stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub id: StreamId,
    pub name: String,
    /// Type of the values saved into the stream.
    pub element: StreamType,
    pub pipeline: Vec<Transform>,
    /// Block the stream was declared in.
    pub scope: BlockId,
}

impl Stream {
    /// Element type after the whole pipeline.
    pub fn output_type(&self) -> StreamType {
        // Every attached transform was checked, so this cannot fail.
        self.pipeline
            .iter()
            .try_fold(self.element.clone(), |ty, t| self.step(&ty, t))
            .unwrap_or_else(|_| self.element.clone())
    }

    /// Validate `transform` against the current pipeline and append it.
    pub(crate) fn attach(&mut self, transform: Transform) -> PulseResult<()> {
        if self.pipeline.last().is_some_and(Transform::is_terminal) {
            return Err(self.invalid("nothing can follow a save"));
        }
        let current = self.output_type();
        self.step(&current, &transform)?;
        self.pipeline.push(transform);
        Ok(())
    }

    fn invalid<R: ToString>(&self, reason: R) -> Error {
        Error::invalid_pipeline(&self.name, reason)
    }

    /// The element type flowing out of `transform` given `input`.
    fn step(
        &self,
        input: &StreamType,
        transform: &Transform,
    ) -> PulseResult<StreamType> {
        use ScalarType::*;
        match transform {
            Transform::Save | Transform::SaveAll => Ok(input.clone()),
            Transform::Buffer(0) | Transform::Take(0) => {
                Err(self.invalid("buffer and take need a positive size"))
            }
            Transform::Buffer(n) => match input {
                StreamType::Scalar(t) => Ok(StreamType::Array(*t, *n)),
                StreamType::Array(t, len) => len
                    .checked_mul(*n)
                    .map(|total| StreamType::Array(*t, total))
                    .ok_or_else(|| self.invalid("buffer size overflows")),
                StreamType::Tuple(_) => {
                    Err(self.invalid("tuples cannot be buffered"))
                }
            },
            Transform::Skip(_) | Transform::SkipLast(_) | Transform::Take(_) => {
                Ok(input.clone())
            }
            Transform::Zip { with, .. } if *with == self.id => {
                Err(self.invalid("a stream cannot be zipped with itself"))
            }
            Transform::Zip { item, .. } => match input {
                StreamType::Scalar(t) => Ok(StreamType::Tuple(vec![*t, *item])),
                StreamType::Tuple(items) => {
                    let mut items = items.clone();
                    items.push(*item);
                    Ok(StreamType::Tuple(items))
                }
                StreamType::Array(..) => {
                    Err(self.invalid(format!("cannot zip {input} items")))
                }
            },
            Transform::Flatten => match input {
                StreamType::Array(t, _) => Ok(StreamType::Scalar(*t)),
                other => {
                    Err(self.invalid(format!("cannot flatten {other}")))
                }
            },
            Transform::Cast(to) => {
                let from = input.item().ok_or_else(|| {
                    self.invalid(format!("cannot cast {input}"))
                })?;
                match (from, *to) {
                    (Int, Fixed) | (Fixed, Int) | (Bool, Int) => {
                        Ok(input.with_item(*to))
                    }
                    _ => Err(self
                        .invalid(format!("cannot cast {from} items to {to}"))),
                }
            }
            Transform::Map {
                function,
                args,
                source,
            } => self.map_step(input, *function, args, source.as_ref()),
        }
    }

    fn map_step(
        &self,
        input: &StreamType,
        function: MapFunction,
        args: &[Expr],
        source: Option<&DemodSource>,
    ) -> PulseResult<StreamType> {
        use ScalarType::*;
        if function.is_demod() {
            if args.len() != 2 {
                return Err(self.invalid(format!(
                    "{} takes exactly two weights, got {}",
                    function.name(),
                    args.len()
                )));
            }
            if let Some(bad) = args.iter().find(|a| !a.ty().is_numeric()) {
                return Err(self.invalid(format!(
                    "weight `{bad}` is not numeric"
                )));
            }
            match source {
                Some(src) if !src.inputs.is_empty() => (),
                Some(src) => {
                    return Err(self.invalid(format!(
                        "element `{}` declares no input port",
                        src.element
                    )));
                }
                None => {
                    return Err(self.invalid(format!(
                        "{} needs a source element",
                        function.name()
                    )));
                }
            }
        } else if !args.is_empty() || source.is_some() {
            return Err(self.invalid(format!(
                "{} takes no arguments",
                function.name()
            )));
        }
        if let Some(arg) = args.iter().find(|a| !a.is_constant()) {
            return Err(self.invalid(format!("argument `{arg}` is not constant")));
        }

        let mismatch = || {
            self.invalid(format!("{} cannot be applied to {input}", function.name()))
        };
        match (function, input) {
            (MapFunction::Average, StreamType::Scalar(t) | StreamType::Array(t, _))
                if t.is_numeric() =>
            {
                Ok(input.with_item(Fixed))
            }
            (MapFunction::DemodSum, StreamType::Array(t, _)) if t.is_numeric() => {
                Ok(StreamType::Scalar(Fixed))
            }
            (MapFunction::DemodNoSum, StreamType::Array(t, len))
                if t.is_numeric() =>
            {
                Ok(StreamType::Array(Fixed, *len))
            }
            (MapFunction::Fft, StreamType::Array(t, len)) if t.is_numeric() => {
                // Interleaved real and imaginary parts.
                len.checked_mul(2)
                    .map(|n| StreamType::Array(Fixed, n))
                    .ok_or_else(mismatch)
            }
            (
                MapFunction::BooleanAnd
                | MapFunction::BooleanOr
                | MapFunction::BooleanXor,
                StreamType::Array(Bool, _),
            ) => Ok(StreamType::Scalar(Bool)),
            (
                MapFunction::BooleanToInt,
                StreamType::Scalar(Bool) | StreamType::Array(Bool, _),
            ) => Ok(input.with_item(Int)),
            _ => Err(mismatch()),
        }
    }
}
