//! Wire-level constants for the REPRL protocol (spec §4.6, §6).
//!
//! Binary, little-endian, 4-byte control words and 8-byte length prefixes.
//! The child is expected to have exactly these four file descriptors
//! pre-opened when it is exec'd; `ReprlChild::spawn` arranges that with
//! `dup2` in a `pre_exec` hook before handing control to the real binary.

/// Fixed fd numbers the child reads/writes on (spec §6).
pub const CHILD_CONTROL_READ_FD: i32 = 100;
pub const CHILD_CONTROL_WRITE_FD: i32 = 101;
pub const CHILD_DATA_READ_FD: i32 = 102;
pub const CHILD_DATA_WRITE_FD: i32 = 103;

/// Startup handshake token exchanged in both directions (spec §4.6).
pub const HELO: &[u8; 4] = b"HELO";

/// Command written by the host before a script, followed by an 8-byte
/// little-endian script length (spec §4.6 step 1).
pub const CMD_EXEC: &[u8; 4] = b"exec";

/// Status word bit layout: the top bit distinguishes "signaled" from
/// "exited"; the remaining 31 bits carry the exit code or signal number.
pub const STATUS_SIGNALED_BIT: u32 = 0x8000_0000;

/// Minimum required size of the coverage shared-memory mapping (spec §6).
pub const SHM_MIN_SIZE: usize = 0x10_0000;

/// Environment variable the host sets so the child can open the coverage
/// shared-memory segment (spec §6).
pub const SHM_ID_ENV: &str = "SHM_ID";

pub fn encode_status(signaled: bool, code: u32) -> u32 {
    if signaled {
        STATUS_SIGNALED_BIT | (code & !STATUS_SIGNALED_BIT)
    } else {
        code & !STATUS_SIGNALED_BIT
    }
}

pub fn decode_status(raw: u32) -> (bool, u32) {
    (raw & STATUS_SIGNALED_BIT != 0, raw & !STATUS_SIGNALED_BIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        assert_eq!(decode_status(encode_status(false, 0)), (false, 0));
        assert_eq!(decode_status(encode_status(true, 11)), (true, 11));
    }
}
