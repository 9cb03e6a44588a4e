//! Self-describing binary program format (spec §6 "Program binary format").
//!
//! Layout: `[magic: 4 bytes]["ILPG"][version: u32][bincode-encoded Code][crc32: u32]`.
//! Round-trips to a structurally identical `Program` (testable property #5).

use crate::code::Code;
use crate::error::{DecodeError, DecodeResult};
use crate::program::{Contributors, Fingerprint, Program};

const MAGIC: &[u8; 4] = b"ILPG";
const VERSION: u32 = 1;

/// CRC-32 (IEEE 802.3 polynomial), computed without pulling in a dedicated
/// crc crate: `bincode`/`serde` already cover the structured payload, and a
/// checksum is sixteen lines of table lookup.
fn crc32(bytes: &[u8]) -> u32 {
    static TABLE: std::sync::OnceLock<[u32; 256]> = std::sync::OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut c = i as u32;
            for _ in 0..8 {
                c = if c & 1 != 0 {
                    0xEDB8_8320 ^ (c >> 1)
                } else {
                    c >> 1
                };
            }
            *entry = c;
        }
        table
    });

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in bytes {
        let idx = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = table[idx] ^ (crc >> 8);
    }
    !crc
}

/// Encodes a program to the stable binary format described in spec §6.
/// Only `Code` is encoded: parent fingerprint and contributor tags are
/// fuzzer-process bookkeeping, not part of the wire-portable program
/// identity, and are carried alongside separately by the corpus/sync layers
/// that need them (see `ilfuzz-corpus::storage`).
pub fn encode(program: &Program) -> Vec<u8> {
    let body = bincode::serialize(program.code()).expect("Code serialization is infallible");
    let mut out = Vec::with_capacity(4 + 4 + body.len() + 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    let checksum = crc32(&out);
    out.extend_from_slice(&checksum.to_le_bytes());
    out
}

/// Decodes a program previously produced by [`encode`]. The resulting
/// `Program` carries no parent/contributors (see `encode`'s doc comment);
/// callers that need that context restore it from their own sidecar
/// metadata.
pub fn decode(bytes: &[u8]) -> DecodeResult<Program> {
    if bytes.len() < 4 + 4 + 4 {
        return Err(DecodeError::BadMagic);
    }
    let (header, rest) = bytes.split_at(4);
    if header != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let (version_bytes, rest) = rest.split_at(4);
    let version = u32::from_le_bytes(version_bytes.try_into().unwrap());
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let (body, checksum_bytes) = rest.split_at(rest.len() - 4);
    let expected = u32::from_le_bytes(checksum_bytes.try_into().unwrap());
    let computed = crc32(&bytes[..bytes.len() - 4]);
    if expected != computed {
        return Err(DecodeError::ChecksumMismatch { expected, computed });
    }

    let code: Code = bincode::deserialize(body)?;
    code.validate()?;
    Ok(build_decoded_program(code, None, Vec::new()))
}

fn build_decoded_program(code: Code, parent: Option<Fingerprint>, contributors: Contributors) -> Program {
    Program::new(code, parent, contributors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Instruction, VarList};
    use crate::operation::Operation;
    use crate::variable::Variable;

    fn sample_program() -> Program {
        let mut code = Code::new();
        code.push(Instruction::new(
            Operation::LoadInteger(42),
            VarList::new(),
            VarList::from_slice(&[Variable::new(0)]),
            VarList::new(),
            0,
        ));
        build_decoded_program(code, None, Vec::new())
    }

    #[test]
    fn round_trip_preserves_structure() {
        let program = sample_program();
        let bytes = encode(&program);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.code(), program.code());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let program = sample_program();
        let mut bytes = encode(&program);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(decode(&bytes), Err(DecodeError::ChecksumMismatch { .. })));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let bytes = vec![0u8; 16];
        assert!(matches!(decode(&bytes), Err(DecodeError::BadMagic)));
    }
}
