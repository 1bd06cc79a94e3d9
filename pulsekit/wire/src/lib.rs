//! The wire format of pulse-control programs.
//!
//! A serialized program is a fixed preamble (magic and format version), a
//! JSON header carrying the id high-water marks, and a flat table of
//! records, one per statement, expression and block, linked to their
//! children by record index. The format is self-contained: it names
//! elements and pulses but carries nothing from the hardware configuration.
//!
//! Serialization and deserialization are pure functions of their inputs and
//! can run on any number of threads at once.
mod decode;
mod encode;
mod header;
mod records;

pub use header::{Header, read_version};
pub use pulsekit_ir::MAX_DEPTH;
pub use records::Kind;

use pulsekit_ir::{HardwareConfig, SealedProgram};
use pulsekit_utils::PulseResult;
use std::{fs, path::Path};

/// Prefix of every serialized program.
pub const MAGIC: [u8; 4] = *b"PKIR";

/// Version of the record layout written by [`serialize`]. Buffers with any
/// other version are rejected.
pub const FORMAT_VERSION: u16 = 1;

/// Encode `program` after checking that every name it uses resolves in
/// `config`. The output only depends on the program: serializing the same
/// program twice gives identical bytes.
pub fn serialize(
    program: &SealedProgram,
    config: &HardwareConfig,
) -> PulseResult<Vec<u8>> {
    program.validate(config)?;
    let (header, records) = encode::lower(program)?;
    let mut out = vec![];
    header.write(&mut out)?;
    encode::write_records(&records, &mut out)?;
    log::debug!(
        "serialized {} records into {} bytes",
        records.len(),
        out.len()
    );
    Ok(out)
}

/// Rebuild a sealed program from a serialized buffer. Names are not
/// resolved; use [`SealedProgram::validate`] once a configuration is at
/// hand.
pub fn deserialize(bytes: &[u8]) -> PulseResult<SealedProgram> {
    decode::decode(bytes)
}

/// The header of a serialized buffer, without decoding the records.
pub fn read_header(bytes: &[u8]) -> PulseResult<Header> {
    Header::read(bytes).map(|(header, _)| header)
}

/// Serialize `program` into the file at `path`.
pub fn save<P: AsRef<Path>>(
    program: &SealedProgram,
    config: &HardwareConfig,
    path: P,
) -> PulseResult<()> {
    let bytes = serialize(program, config)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Read a serialized program from `path`. The bytes are returned as they
/// are; decoding them is up to [`deserialize`].
pub fn load<P: AsRef<Path>>(path: P) -> PulseResult<Vec<u8>> {
    Ok(fs::read(path)?)
}
