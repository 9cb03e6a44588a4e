//! One REPRL child process (spec §4.6): spawn, HELO handshake, and the
//! exec/status request-response cycle over the four fixed pipe fds.

use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{ExecError, Result};
use crate::protocol::{decode_status, CHILD_CONTROL_READ_FD, CHILD_CONTROL_WRITE_FD, CHILD_DATA_READ_FD, CHILD_DATA_WRITE_FD, CMD_EXEC, HELO, SHM_ID_ENV};

/// Outcome of one `exec` round-trip, decoded from the 4-byte status word
/// (spec §4.6 step 3: "low bits carry exit/termination code, top bit
/// distinguishes signaled vs exited").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Exited(u32),
    Signaled(i32),
}

fn raw_pipe() -> Result<(RawFd, RawFd)> {
    let mut fds = [0i32; 2];
    // SAFETY: `fds` is a valid, appropriately-sized out-param for `pipe`.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(ExecError::Io(std::io::Error::last_os_error()));
    }
    Ok((fds[0], fds[1]))
}

/// `dup2`s `fd` onto `target` and closes the original if they differ.
/// Runs inside `pre_exec`, after `fork` but before `exec`, so it only ever
/// observes this child's own fd table.
fn dup2_fixed(fd: RawFd, target: RawFd) -> std::io::Result<()> {
    if fd != target {
        // SAFETY: called post-fork, pre-exec, in the child only.
        if unsafe { libc::dup2(fd, target) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// A long-lived child engine process communicating over the fixed REPRL
/// fds. Owns its four pipe endpoints; they are never shared with another
/// executor slot (spec §5 "Child process file descriptors are owned
/// exclusively by one executor slot").
pub struct ReprlChild {
    process: Child,
    control_write: std::fs::File,
    control_read: std::fs::File,
    data_write: std::fs::File,
    spawned_at: Instant,
}

impl ReprlChild {
    /// Spawns `engine_path engine_args...` with fds 100-103 wired to fresh
    /// pipes and `SHM_ID` set to `shm_name`, then performs the HELO
    /// handshake (spec §4.6).
    pub fn spawn(engine_path: &Path, engine_args: &[String], shm_name: &str) -> Result<Self> {
        // host->child control; child->host control; host->child data;
        // child->host data (reserved, unused by the protocol today but
        // wired for symmetry with the spec's four-fd layout).
        let (control_read_child, control_write_host) = raw_pipe()?;
        let (control_read_host, control_write_child) = raw_pipe()?;
        let (data_read_child, data_write_host) = raw_pipe()?;
        let (data_read_host, data_write_child) = raw_pipe()?;

        let mut cmd = Command::new(engine_path);
        cmd.args(engine_args);
        cmd.env(SHM_ID_ENV, shm_name);
        cmd.stdin(Stdio::null());

        // SAFETY: the closure only calls async-signal-safe libc functions
        // (dup2/close) between fork and exec, as required by `pre_exec`.
        unsafe {
            cmd.pre_exec(move || {
                dup2_fixed(control_read_child, CHILD_CONTROL_READ_FD)?;
                dup2_fixed(control_write_child, CHILD_CONTROL_WRITE_FD)?;
                dup2_fixed(data_read_child, CHILD_DATA_READ_FD)?;
                dup2_fixed(data_write_child, CHILD_DATA_WRITE_FD)?;
                Ok(())
            });
        }

        let process = cmd.spawn().map_err(ExecError::Spawn)?;

        // The host no longer needs the child-side descriptors; closing them
        // here (rather than relying on `pre_exec`'s dup2 overwrite, which
        // runs in the forked copy, not this process) avoids leaking them
        // into every subsequent child this host spawns.
        for fd in [control_read_child, control_write_child, data_read_child, data_write_child] {
            // SAFETY: each fd was created by `raw_pipe` above and not yet
            // closed in this process.
            unsafe {
                libc::close(fd);
            }
        }

        // SAFETY: each fd was just created by `raw_pipe` and is owned here.
        let mut child = Self {
            process,
            control_write: unsafe { std::fs::File::from_raw_fd(control_write_host) },
            control_read: unsafe { std::fs::File::from_raw_fd(control_read_host) },
            data_write: unsafe { std::fs::File::from_raw_fd(data_write_host) },
            spawned_at: Instant::now(),
        };
        // Reserved fd (data_read_host) is accepted but not read from; the
        // protocol never has the child push unsolicited data today.
        unsafe {
            libc::close(data_read_host);
        }

        child.handshake()?;
        Ok(child)
    }

    fn handshake(&mut self) -> Result<()> {
        self.control_write.write_all(HELO).map_err(ExecError::Io)?;
        self.control_write.flush().map_err(ExecError::Io)?;

        let mut buf = [0u8; 4];
        self.control_read.read_exact(&mut buf).map_err(|_| ExecError::HandshakeFailed)?;
        if &buf != HELO {
            return Err(ExecError::HandshakeFailed);
        }
        Ok(())
    }

    /// Sends the `exec` command and script bytes (spec §4.6 steps 1-2)
    /// without waiting for a status reply, so the caller can bound the wait
    /// with `wait_readable`/`recv_status` instead of blocking here.
    pub fn send_exec(&mut self, script: &[u8]) -> Result<()> {
        self.control_write.write_all(CMD_EXEC).map_err(ExecError::Io)?;
        self.control_write.write_all(&(script.len() as u64).to_le_bytes()).map_err(ExecError::Io)?;
        self.control_write.flush().map_err(ExecError::Io)?;

        self.data_write.write_all(script).map_err(ExecError::Io)?;
        self.data_write.flush().map_err(ExecError::Io)?;
        Ok(())
    }

    /// Blocking read of the 4-byte status word (spec §4.6 steps 3-4). A
    /// short read means the child died; the caller records a crash and
    /// respawns.
    pub fn recv_status(&mut self) -> Result<ExecStatus> {
        let mut status_buf = [0u8; 4];
        self.control_read.read_exact(&mut status_buf).map_err(|_| ExecError::ChildDied)?;

        let raw = u32::from_le_bytes(status_buf);
        let (signaled, code) = decode_status(raw);
        Ok(if signaled {
            ExecStatus::Signaled(code as i32)
        } else {
            ExecStatus::Exited(code)
        })
    }

    /// Runs one full `exec` round-trip, blocking until the status arrives.
    /// Convenience wrapper over `send_exec`/`recv_status` for callers (tests,
    /// `GenerativeEngine`-style one-shot tools) that do not need a bounded
    /// wait; `ReprlExecutorPool` uses the split form so it can enforce a
    /// deadline between the two.
    pub fn execute(&mut self, script: &[u8]) -> Result<ExecStatus> {
        self.send_exec(script)?;
        self.recv_status()
    }

    /// Polls the control-read fd for readability within `timeout`, used by
    /// the pool to detect a hung child without blocking the whole process
    /// (spec §4.6 "Timeout").
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.control_read.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
        // SAFETY: `pollfd` is a single, valid, stack-local entry.
        let rc = unsafe { libc::poll(&mut pollfd as *mut _, 1, millis) };
        if rc < 0 {
            return Err(ExecError::Io(std::io::Error::last_os_error()));
        }
        Ok(rc > 0 && pollfd.revents & libc::POLLIN != 0)
    }

    /// Soft reset: ask the child to abandon the in-flight script via
    /// `SIGUSR1` (spec §4.6 "host signals the child to reset"). The child is
    /// a black box about how it implements this; if it does not respond
    /// within the caller's grace period, `kill` does a hard reset instead.
    pub fn soft_reset(&mut self) {
        // SAFETY: signaling our own child by its recorded pid is always
        // valid, even if it has already exited (kill then just fails ESRCH).
        unsafe {
            libc::kill(self.process.id() as libc::pid_t, libc::SIGUSR1);
        }
    }

    /// Hard reset: kill and reap the child. The caller is responsible for
    /// respawning a replacement.
    pub fn kill(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }

    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    pub fn uptime(&self) -> Duration {
        self.spawned_at.elapsed()
    }

    /// `Some(status)` once the child has exited on its own (detected via a
    /// non-blocking `waitpid`), without blocking if it is still alive.
    pub fn try_wait(&mut self) -> Result<Option<std::process::ExitStatus>> {
        self.process.try_wait().map_err(ExecError::Io)
    }
}
