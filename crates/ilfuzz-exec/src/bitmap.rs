//! Coverage shared-memory bitmap (spec §4.6, §6).
//!
//! Layout: `struct { u32 num_edges; u8 edges[] }` in a `SHM_SIZE`-byte POSIX
//! shared-memory mapping the host creates and the child attaches to by name
//! via `SHM_ID`. The child is a black box that writes hit counts into
//! `edges`; the host never resets them (§4.6 step 5, "no per-execution reset
//! is required for the bitmap on the child side").

use std::fs::File;
use std::os::unix::io::FromRawFd;

use memmap2::MmapMut;

use crate::error::{ExecError, Result};
use crate::protocol::SHM_MIN_SIZE;

const HEADER_LEN: usize = std::mem::size_of::<u32>();

/// One executor slot's coverage mapping. Named `shm_id_<host-pid>_<slot>`:
/// the spec's `shm_id_<pid>` naming is ambiguous about whose pid (the host
/// creates the segment before the child exists), so this implementation
/// scopes by the host's own pid plus executor slot index, which is unique
/// per fuzzer process and stable across child respawns (see DESIGN.md).
pub struct CoverageBitmap {
    name: String,
    mmap: MmapMut,
}

impl CoverageBitmap {
    /// Creates (or re-creates) a shared-memory segment sized for at least
    /// `SHM_MIN_SIZE` bytes, large enough for any realistic SanCov edge
    /// count.
    pub fn create(host_pid: u32, slot: usize) -> Result<Self> {
        let name = format!("shm_id_{host_pid}_{slot}");
        let cname = std::ffi::CString::new(name.clone()).expect("shm name has no interior NUL");

        // SAFETY: `shm_open`/`ftruncate`/`close` are called with a valid,
        // NUL-terminated name and standard flags; the fd is immediately
        // wrapped in a `File` that owns it afterward.
        let fd = unsafe {
            libc::shm_unlink(cname.as_ptr()); // best-effort: drop a stale segment from a crashed prior run
            libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600)
        };
        if fd < 0 {
            return Err(ExecError::Bitmap(std::io::Error::last_os_error()));
        }
        // SAFETY: fd is a just-opened, valid shm descriptor.
        if unsafe { libc::ftruncate(fd, SHM_MIN_SIZE as libc::off_t) } != 0 {
            let err = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(ExecError::Bitmap(err));
        }

        // SAFETY: fd is valid and owned by this call; File takes ownership.
        let file = unsafe { File::from_raw_fd(fd) };
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(ExecError::Bitmap)?;
        // `file` can be dropped: the mapping keeps the pages alive, and the
        // name keeps the segment addressable until `shm_unlink`.
        drop(file);

        let mut bitmap = Self { name, mmap };
        bitmap.set_num_edges(0);
        Ok(bitmap)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn set_num_edges(&mut self, n: u32) {
        self.mmap[..HEADER_LEN].copy_from_slice(&n.to_le_bytes());
    }

    pub fn num_edges(&self) -> u32 {
        u32::from_le_bytes(self.mmap[..HEADER_LEN].try_into().unwrap())
    }

    /// The edge hit-count bytes written by the child, sized by whatever
    /// `num_edges` the child last reported (0 before the child's coverage
    /// instrumentation has run once).
    pub fn edges(&self) -> &[u8] {
        let n = self.num_edges() as usize;
        let available = self.mmap.len() - HEADER_LEN;
        &self.mmap[HEADER_LEN..HEADER_LEN + n.min(available)]
    }
}

impl Drop for CoverageBitmap {
    fn drop(&mut self) {
        let cname = std::ffi::CString::new(self.name.clone()).expect("shm name has no interior NUL");
        // SAFETY: best-effort cleanup; failure just leaks the segment name.
        unsafe {
            libc::shm_unlink(cname.as_ptr());
        }
    }
}
