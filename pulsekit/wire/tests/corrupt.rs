mod common;

use proptest::prelude::*;
use pulsekit_utils::{Error, IrLocation};
use pulsekit_wire::{Kind, deserialize, serialize};

fn sample_bytes() -> Vec<u8> {
    serialize(&common::sample(), &common::config()).unwrap()
}

/// Offset of the first record, right after the JSON header.
fn records_start(bytes: &[u8]) -> usize {
    let len = u64::from_le_bytes(bytes[6..14].try_into().unwrap());
    14 + len as usize
}

#[test]
fn every_truncation_is_rejected() {
    let bytes = sample_bytes();
    for len in 0..bytes.len() {
        let err = deserialize(&bytes[..len]).unwrap_err();
        assert!(err.is_format(), "prefix of {len} bytes gave {err}");
    }
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut bytes = sample_bytes();
    bytes.push(0);
    assert!(matches!(
        deserialize(&bytes),
        Err(Error::CorruptIR {
            at: IrLocation::Header,
            ..
        })
    ));
}

#[test]
fn bad_magic_is_corrupt() {
    let mut bytes = sample_bytes();
    bytes[0] = b'X';
    assert!(matches!(
        deserialize(&bytes),
        Err(Error::CorruptIR {
            at: IrLocation::Header,
            ..
        })
    ));
}

#[test]
fn unknown_record_kind_is_corrupt() {
    let mut bytes = sample_bytes();
    let start = records_start(&bytes);
    assert_eq!(bytes[start], Kind::Block as u8);
    bytes[start] = 0xEE;
    assert!(matches!(
        deserialize(&bytes),
        Err(Error::CorruptIR {
            at: IrLocation::Record(0),
            ..
        })
    ));
}

#[test]
fn first_child_out_of_range_is_corrupt() {
    let mut bytes = sample_bytes();
    // kind, payload length, child count, first child
    let first_child = records_start(&bytes) + 1 + 4 + 4;
    bytes[first_child..first_child + 4].copy_from_slice(&u32::MAX.to_le_bytes());
    let err = deserialize(&bytes).unwrap_err();
    assert!(err.to_string().contains("out of order or out of range"), "{err}");
}

#[test]
fn wrong_high_water_mark_is_corrupt() {
    let bytes = sample_bytes();
    let start = records_start(&bytes);
    let header = pulsekit_wire::read_header(&bytes).unwrap();
    let mut json = serde_json::to_value(&header).unwrap();
    json["blocks"] = (header.blocks + 1).into();
    let raw = serde_json::to_vec(&json).unwrap();

    let mut forged = bytes[..6].to_vec();
    forged.extend_from_slice(&(raw.len() as u64).to_le_bytes());
    forged.extend_from_slice(&raw);
    forged.extend_from_slice(&bytes[start..]);
    let err = deserialize(&forged).unwrap_err();
    assert!(err.to_string().contains("blocks"), "{err}");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn flipped_bytes_never_panic(idx in any::<prop::sample::Index>(), mask in 1u8..) {
        let mut bytes = sample_bytes();
        let at = idx.index(bytes.len());
        bytes[at] ^= mask;
        // Some flips still decode to a valid program; none may escape as a
        // panic or as a non-format error.
        if let Err(err) = deserialize(&bytes) {
            prop_assert!(err.is_format(), "{}", err);
        }
    }
}
