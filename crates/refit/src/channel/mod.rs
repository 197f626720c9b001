//! Process isolation channel for one-shot transform runs.
//!
//! A worker is forked with one end of a connected [`UnixStream`] pair,
//! runs a single callable, writes one framed response (see [`frame`]) and
//! exits. The parent accumulates channel bytes until the frame delimiter
//! arrives, bounding each read by a liveness interval so a worker that
//! died without responding is detected instead of waited on forever.
//!
//! Every run reaps its worker exactly once, on success and on every error
//! path, so no call here can leak a zombie process. There are no retries;
//! callers that need an overall deadline must layer one on top.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};

use crate::error::{Error, Result};

pub mod frame;

pub use frame::ChannelMessage;

/// How long a read may block before the worker's liveness is re-checked.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

/// Run `callable` in a freshly forked worker and return its result.
///
/// Blocks until the worker responds or dies. Shorthand for
/// [`WorkerHandle::fork_run`] followed by [`WorkerHandle::wait`].
pub fn run_isolated<F>(callable: F) -> Result<Option<String>>
where
    F: FnOnce() -> Result<Option<String>>,
{
    WorkerHandle::fork_run(callable)?.wait()
}

/// Handle to a forked transform worker.
///
/// Holds the parent end of the channel and the worker's pid. The response
/// is consumed by [`wait`](Self::wait), which takes the handle by value:
/// a channel is read to completion exactly once. Dropping an unconsumed
/// handle kills and reaps the worker.
pub struct WorkerHandle {
    /// The worker process.
    pid: Pid,
    /// Parent end of the stream pair.
    endpoint: UnixStream,
    /// Whether the worker has been collected with waitpid.
    reaped: bool,
}

impl WorkerHandle {
    /// Fork a worker that runs `callable` and writes one framed response.
    ///
    /// The child never returns here: it runs the callable, writes its
    /// frame and exits, status 0 whenever a frame was written (including
    /// throw frames) and nonzero only if the write itself failed.
    pub fn fork_run<F>(callable: F) -> Result<WorkerHandle>
    where
        F: FnOnce() -> Result<Option<String>>,
    {
        let (parent_end, child_end) = UnixStream::pair()
            .map_err(|e| Error::Channel(format!("failed to create channel pair: {}", e)))?;
        parent_end
            .set_read_timeout(Some(LIVENESS_INTERVAL))
            .map_err(|e| Error::Channel(format!("failed to configure channel: {}", e)))?;

        // SAFETY: the child branch runs only the worker routine and then
        // exits; it never unwinds or returns into the caller's stack.
        match unsafe { fork() }.map_err(|e| Error::Channel(format!("fork failed: {}", e)))? {
            ForkResult::Child => {
                drop(parent_end);
                let status = run_worker(child_end, callable);
                std::process::exit(status);
            }
            ForkResult::Parent { child } => {
                drop(child_end);
                tracing::debug!("Forked transform worker {}", child);
                Ok(WorkerHandle {
                    pid: child,
                    endpoint: parent_end,
                    reaped: false,
                })
            }
        }
    }

    /// Process id of the worker.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Block until the worker's response arrives, reap the worker, then
    /// decode the response.
    ///
    /// By the time this returns the worker is gone: collected normally
    /// after a complete response, killed and collected on fatal errors.
    pub fn wait(mut self) -> Result<Option<String>> {
        let buffer = match self.read_frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                self.kill_and_reap();
                return Err(e);
            }
        };
        self.reap_blocking();
        match ChannelMessage::decode(&buffer)? {
            ChannelMessage::Return(content) => Ok(Some(content)),
            ChannelMessage::Void => Ok(None),
            ChannelMessage::Throw(message) => Err(Error::Transform(message)),
        }
    }

    /// Accumulate channel bytes until a complete frame has arrived.
    ///
    /// A message has no length prefix and no size bound, so reads loop
    /// until the delimiter shows up or the channel closes. Each read is
    /// bounded by [`LIVENESS_INTERVAL`]; a timeout tick with no data
    /// re-checks whether the worker died without completing its response.
    fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match self.endpoint.read(&mut chunk) {
                Ok(0) => {
                    // Channel closed without a delimiter.
                    self.reap_blocking();
                    return Err(Error::Channel(
                        "worker exited before completing its response".to_string(),
                    ));
                }
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    if let Some(end) = frame::split_frame(&buffer).map(|f| f.len()) {
                        buffer.truncate(end);
                        return Ok(buffer);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    if self.check_liveness()? {
                        continue;
                    }
                    // The worker is gone. Drain what it flushed before
                    // dying; the frame may have raced its exit.
                    self.drain_remaining(&mut buffer);
                    if let Some(end) = frame::split_frame(&buffer).map(|f| f.len()) {
                        buffer.truncate(end);
                        return Ok(buffer);
                    }
                    return Err(Error::Channel(
                        "worker exited before completing its response".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(Error::Channel(format!("channel read failed: {}", e)));
                }
            }
        }
    }

    /// Non-blocking liveness poll. Returns true while the worker runs;
    /// collects it and returns false once it has exited.
    fn check_liveness(&mut self) -> Result<bool> {
        loop {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => return Ok(true),
                Ok(status) => {
                    tracing::debug!("Transform worker {} exited: {:?}", self.pid, status);
                    self.reaped = true;
                    return Ok(false);
                }
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(Error::Channel(format!(
                        "failed to check worker {}: {}",
                        self.pid, e
                    )));
                }
            }
        }
    }

    /// Final drain after the worker exited, closing the race between its
    /// last flush and its death. Never blocks past the read timeout.
    fn drain_remaining(&mut self, buffer: &mut Vec<u8>) {
        let mut chunk = [0u8; 4096];
        loop {
            match self.endpoint.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }

    /// Blocking wait for worker termination. Idempotent.
    fn reap_blocking(&mut self) {
        if self.reaped {
            return;
        }
        loop {
            match waitpid(self.pid, None) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                // ECHILD: already collected; nothing left to reap.
                Err(_) => break,
            }
        }
        self.reaped = true;
    }

    /// Forcibly end the worker and collect it.
    fn kill_and_reap(&mut self) {
        if self.reaped {
            return;
        }
        // ESRCH just means the worker is already gone.
        let _ = kill(self.pid, Signal::SIGKILL);
        self.reap_blocking();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.kill_and_reap();
    }
}

/// Child-side routine: run the callable, frame the outcome, write it.
///
/// Panics are caught and shipped as throw frames; a panic payload that is
/// not a string becomes [`frame::UNKNOWN_ERROR`].
fn run_worker<F>(mut endpoint: UnixStream, callable: F) -> i32
where
    F: FnOnce() -> Result<Option<String>>,
{
    let message = match panic::catch_unwind(AssertUnwindSafe(callable)) {
        Ok(Ok(Some(content))) => ChannelMessage::Return(content),
        Ok(Ok(None)) => ChannelMessage::Void,
        Ok(Err(e)) => ChannelMessage::Throw(e.to_string()),
        Err(payload) => ChannelMessage::Throw(panic_message(payload.as_ref())),
    };
    match endpoint
        .write_all(&message.encode())
        .and_then(|()| endpoint.flush())
    {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        frame::UNKNOWN_ERROR.to_string()
    }
}
