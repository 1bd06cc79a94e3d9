use crate::{FORMAT_VERSION, MAGIC};
use pulsekit_ir::CompilerOptions;
use pulsekit_utils::{Error, IrLocation, PulseResult};
use serde::{Deserialize, Serialize};

/// The JSON header that follows the fixed preamble.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Header {
    /// High-water mark of the variable ids.
    pub variables: u32,
    pub streams: u32,
    pub blocks: u32,
    /// Number of records following the header.
    pub records: u32,
    /// Options from a previous execution. Left out entirely when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_options: Option<CompilerOptions>,
}

/// Size of the magic, the version and the header length.
const PREAMBLE_LEN: usize = MAGIC.len() + 2 + 8;

impl Header {
    pub(crate) fn write(&self, out: &mut Vec<u8>) -> PulseResult<()> {
        let raw = serde_json::to_vec(self)
            .map_err(|e| Error::MalformedTree(format!("unencodable header: {e}")))?;
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(raw.len() as u64).to_le_bytes());
        out.extend_from_slice(&raw);
        Ok(())
    }

    /// Parse the preamble and header, returning the header and the bytes
    /// after it.
    pub(crate) fn read(bytes: &[u8]) -> PulseResult<(Header, &[u8])> {
        let version = read_version(bytes)?;
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedFormatVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        let mut raw_len = [0u8; 8];
        raw_len.copy_from_slice(&bytes[MAGIC.len() + 2..PREAMBLE_LEN]);
        let rest = &bytes[PREAMBLE_LEN..];
        let len = usize::try_from(u64::from_le_bytes(raw_len))
            .ok()
            .filter(|len| *len <= rest.len())
            .ok_or_else(|| {
                Error::corrupt(IrLocation::Header, "header runs past the end of the buffer")
            })?;
        let (raw, rest) = rest.split_at(len);
        let header = serde_json::from_slice(raw)
            .map_err(|e| Error::corrupt(IrLocation::Header, e))?;
        Ok((header, rest))
    }
}

/// The format version of a buffer. Only the magic is checked, so this also
/// works on buffers written by other versions.
pub fn read_version(bytes: &[u8]) -> PulseResult<u16> {
    if bytes.len() < PREAMBLE_LEN {
        return Err(Error::corrupt(IrLocation::Header, "truncated preamble"));
    }
    if bytes[..MAGIC.len()] != MAGIC {
        return Err(Error::corrupt(IrLocation::Header, "bad magic"));
    }
    Ok(u16::from_le_bytes([bytes[MAGIC.len()], bytes[MAGIC.len() + 1]]))
}
