//! The flat record table and the primitives record payloads are made of.
//!
//! Every payload starts with the record's children, as a `u32` count
//! followed by that many `u32` record indices, and continues with the
//! kind-specific fields. All integers are little endian.
use pulsekit_ir::{ScalarType, Value};
use pulsekit_utils::{Error, IrLocation, PulseResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Block = 0x01,

    AssignVar = 0x10,
    AssignCell = 0x11,
    Play = 0x12,
    Measure = 0x13,
    Wait = 0x14,
    DeclareVar = 0x15,
    DeclareStream = 0x16,
    If = 0x17,
    For = 0x18,
    ForEach = 0x19,
    StrictTiming = 0x1A,
    Align = 0x1B,
    Save = 0x1C,
    FrameRotation = 0x1D,
    ResetPhase = 0x1E,
    UpdateFrequency = 0x1F,
    Pause = 0x20,
    Switch = 0x21,
    InfiniteLoop = 0x22,
    ResetFrame = 0x23,
    WaitForTrigger = 0x24,

    Literal = 0x30,
    Var = 0x31,
    Cell = 0x32,
    Binary = 0x33,
    Unary = 0x34,
    Cast = 0x35,
}

impl Kind {
    pub const ALL: [Kind; 28] = [
        Kind::Block,
        Kind::AssignVar,
        Kind::AssignCell,
        Kind::Play,
        Kind::Measure,
        Kind::Wait,
        Kind::DeclareVar,
        Kind::DeclareStream,
        Kind::If,
        Kind::For,
        Kind::ForEach,
        Kind::StrictTiming,
        Kind::Align,
        Kind::Save,
        Kind::FrameRotation,
        Kind::ResetPhase,
        Kind::UpdateFrequency,
        Kind::Pause,
        Kind::Switch,
        Kind::InfiniteLoop,
        Kind::ResetFrame,
        Kind::WaitForTrigger,
        Kind::Literal,
        Kind::Var,
        Kind::Cell,
        Kind::Binary,
        Kind::Unary,
        Kind::Cast,
    ];

    pub fn from_tag(tag: u8) -> Option<Kind> {
        Self::ALL.into_iter().find(|k| *k as u8 == tag)
    }

    pub fn is_expr(&self) -> bool {
        (*self as u8) >= 0x30
    }
}

/// A record on its way out: the children are record indices.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Record {
    pub kind: Kind,
    pub children: Vec<u32>,
    pub fields: Vec<u8>,
}

impl Record {
    pub fn payload_len(&self) -> usize {
        4 + 4 * self.children.len() + self.fields.len()
    }
}

/// A framed record read back from a buffer, with its children split off.
#[derive(Debug)]
pub(crate) struct RawRecord<'a> {
    pub kind: Kind,
    pub children: Vec<usize>,
    pub fields: &'a [u8],
}

impl<'a> RawRecord<'a> {
    /// Split the framing of record `idx` off the front of `bytes`.
    pub fn parse(idx: usize, bytes: &'a [u8]) -> PulseResult<(Self, &'a [u8])> {
        let mut framing = Fields::new(idx, bytes);
        let tag = framing.u8()?;
        let kind = Kind::from_tag(tag).ok_or_else(|| {
            Error::corrupt(IrLocation::Record(idx), format!("unknown kind 0x{tag:02x}"))
        })?;
        let len = framing.count()?;
        let payload = framing.take(len)?;
        let rest = framing.rest();

        let mut payload = Fields::new(idx, payload);
        let count = payload.count()?;
        // Each child index takes four bytes; a count that does not fit is
        // caught before allocating.
        if count > payload.remaining() / 4 {
            return Err(Error::corrupt(
                IrLocation::Record(idx),
                format!("{count} children do not fit the payload"),
            ));
        }
        let children = (0..count)
            .map(|_| payload.count())
            .collect::<PulseResult<_>>()?;
        let record = RawRecord {
            kind,
            children,
            fields: payload.rest(),
        };
        Ok((record, rest))
    }
}

/// Writer for the kind-specific fields of a record.
#[derive(Default)]
pub(crate) struct FieldWriter(Vec<u8>);

impl FieldWriter {
    pub fn finish(self) -> Vec<u8> {
        self.0
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(v as u8)
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// A length or count. Lengths beyond `u32` cannot be represented.
    pub fn count(&mut self, v: usize) -> PulseResult<&mut Self> {
        let v = u32::try_from(v)
            .map_err(|_| Error::MalformedTree(format!("length {v} does not fit in u32")))?;
        Ok(self.u32(v))
    }

    pub fn str(&mut self, s: &str) -> PulseResult<&mut Self> {
        self.count(s.len())?;
        self.0.extend_from_slice(s.as_bytes());
        Ok(self)
    }

    pub fn strs<S: AsRef<str>>(&mut self, items: &[S]) -> PulseResult<&mut Self> {
        self.count(items.len())?;
        for s in items {
            self.str(s.as_ref())?;
        }
        Ok(self)
    }

    pub fn opt_str(&mut self, s: Option<&str>) -> PulseResult<&mut Self> {
        match s {
            Some(s) => self.bool(true).str(s),
            None => Ok(self.bool(false)),
        }
    }

    pub fn ty(&mut self, ty: ScalarType) -> &mut Self {
        self.u8(match ty {
            ScalarType::Int => 0,
            ScalarType::Fixed => 1,
            ScalarType::Bool => 2,
        })
    }

    pub fn value(&mut self, v: &Value) -> &mut Self {
        match v {
            Value::Int(i) => {
                self.u8(0);
                self.0.extend_from_slice(&i.to_le_bytes());
            }
            Value::Fixed(f) => {
                self.u8(1);
                self.0.extend_from_slice(&f.to_bits().to_le_bytes());
            }
            Value::Bool(b) => {
                self.u8(2).bool(*b);
            }
        }
        self
    }

    pub fn values(&mut self, values: &[Value]) -> PulseResult<&mut Self> {
        self.count(values.len())?;
        for v in values {
            self.value(v);
        }
        Ok(self)
    }
}

/// Cursor over the fields of one record. Every failure is reported against
/// that record.
pub(crate) struct Fields<'a> {
    idx: usize,
    bytes: &'a [u8],
}

impl<'a> Fields<'a> {
    pub fn new(idx: usize, bytes: &'a [u8]) -> Self {
        Fields { idx, bytes }
    }

    pub fn error<S: ToString>(&self, reason: S) -> Error {
        Error::corrupt(IrLocation::Record(self.idx), reason)
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn rest(self) -> &'a [u8] {
        self.bytes
    }

    fn take(&mut self, n: usize) -> PulseResult<&'a [u8]> {
        if n > self.bytes.len() {
            return Err(self.error(format!(
                "needs {n} more bytes, {} left",
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> PulseResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> PulseResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> PulseResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.error(format!("invalid flag {other}"))),
        }
    }

    pub fn u32(&mut self) -> PulseResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn count(&mut self) -> PulseResult<usize> {
        Ok(self.u32()? as usize)
    }

    pub fn str(&mut self) -> PulseResult<String> {
        let len = self.count()?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|e| self.error(e))
    }

    pub fn strs(&mut self) -> PulseResult<Vec<String>> {
        let count = self.count()?;
        // Strings take at least their four-byte length.
        if count > self.remaining() / 4 {
            return Err(self.error(format!("{count} strings do not fit the payload")));
        }
        (0..count).map(|_| self.str()).collect()
    }

    pub fn opt_str(&mut self) -> PulseResult<Option<String>> {
        if self.bool()? { self.str().map(Some) } else { Ok(None) }
    }

    pub fn ty(&mut self) -> PulseResult<ScalarType> {
        match self.u8()? {
            0 => Ok(ScalarType::Int),
            1 => Ok(ScalarType::Fixed),
            2 => Ok(ScalarType::Bool),
            other => Err(self.error(format!("invalid scalar type tag {other}"))),
        }
    }

    pub fn value(&mut self) -> PulseResult<Value> {
        match self.u8()? {
            0 => Ok(Value::Int(i32::from_le_bytes(self.array()?))),
            1 => Ok(Value::Fixed(f64::from_bits(u64::from_le_bytes(
                self.array()?,
            )))),
            2 => Ok(Value::Bool(self.bool()?)),
            other => Err(self.error(format!("invalid value tag {other}"))),
        }
    }

    pub fn values(&mut self) -> PulseResult<Vec<Value>> {
        let count = self.count()?;
        // Values take at least two bytes.
        if count > self.remaining() / 2 {
            return Err(self.error(format!("{count} values do not fit the payload")));
        }
        (0..count).map(|_| self.value()).collect()
    }

    /// Fail unless every byte was consumed.
    pub fn finish(self) -> PulseResult<()> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(self.error(format!("{} unread payload bytes", self.bytes.len())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_unique_and_parse_back() {
        for kind in Kind::ALL {
            assert_eq!(Kind::from_tag(kind as u8), Some(kind));
        }
        assert_eq!(Kind::from_tag(0x00), None);
        assert_eq!(Kind::from_tag(0xff), None);
        assert!(Kind::Cast.is_expr());
        assert!(!Kind::Pause.is_expr());
        assert!(!Kind::WaitForTrigger.is_expr());
        let statements = Kind::ALL
            .iter()
            .filter(|k| !k.is_expr() && **k != Kind::Block)
            .count();
        assert_eq!(statements, 21);
    }

    #[test]
    fn fields_read_back_and_must_be_consumed() {
        let mut w = FieldWriter::default();
        w.u32(7).str("rr").unwrap().value(&Value::Fixed(-0.25));
        w.opt_str(None).unwrap().ty(ScalarType::Bool);
        let raw = w.finish();

        let mut r = Fields::new(3, &raw);
        assert_eq!(r.u32().unwrap(), 7);
        assert_eq!(r.str().unwrap(), "rr");
        assert_eq!(r.value().unwrap(), Value::Fixed(-0.25));
        assert_eq!(r.opt_str().unwrap(), None);
        assert!(Fields::new(3, &raw).finish().is_err());
        assert_eq!(r.ty().unwrap(), ScalarType::Bool);
        r.finish().unwrap();
    }

    #[test]
    fn truncated_fields_name_the_record() {
        let mut r = Fields::new(5, &[1, 0]);
        match r.u32() {
            Err(Error::CorruptIR {
                at: IrLocation::Record(5),
                ..
            }) => (),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn huge_counts_do_not_allocate() {
        let raw = u32::MAX.to_le_bytes();
        assert!(Fields::new(0, &raw).strs().is_err());
        assert!(Fields::new(0, &raw).values().is_err());
    }

    #[test]
    fn record_framing() {
        let record = Record {
            kind: Kind::Binary,
            children: vec![4, 5],
            fields: vec![0, 0],
        };
        let mut raw = vec![record.kind as u8];
        raw.extend_from_slice(&(record.payload_len() as u32).to_le_bytes());
        raw.extend_from_slice(&2u32.to_le_bytes());
        raw.extend_from_slice(&4u32.to_le_bytes());
        raw.extend_from_slice(&5u32.to_le_bytes());
        raw.extend_from_slice(&record.fields);
        raw.push(0xAA);

        let (parsed, rest) = RawRecord::parse(3, &raw).unwrap();
        assert_eq!(parsed.kind, Kind::Binary);
        assert_eq!(parsed.children, [4, 5]);
        assert_eq!(parsed.fields, [0, 0]);
        assert_eq!(rest, [0xAA]);

        raw[0] = 0x7f;
        assert!(RawRecord::parse(3, &raw).is_err());
    }
}
