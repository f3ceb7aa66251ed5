//! Byte-batched terminal output path.
//!
//! Invariant: single output gate — rendered bytes reach the terminal only
//! through [`OutputBuffer::render_to`], one batched write per flush.

use std::io;

use crate::core::escape::Control;
use crate::logging::WriteLog;

#[cfg(unix)]
use crate::platform::fd::write_all_fd;
#[cfg(unix)]
use libc::c_int;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Accumulates escape sequences and text, then flushes them in one write.
///
/// Capacity grows as needed and never shrinks; the used length resets to
/// zero on a successful render. Hosts construct one instance per process
/// and route all drawing through it; tests construct their own.
pub struct OutputBuffer {
    buf: Vec<u8>,
    write_log: Option<WriteLog>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            write_log: WriteLog::from_env(),
        }
    }

    /// Replace the write-log tee (tests inject one, hosts usually rely on
    /// the environment).
    pub fn set_write_log(&mut self, write_log: Option<WriteLog>) {
        self.write_log = write_log;
    }

    /// Append raw bytes to the pending batch. Never truncates or drops.
    pub fn draw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a fixed control sequence.
    pub fn draw_control(&mut self, control: Control) {
        self.draw(control.sequence());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Pending bytes not yet rendered.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Flush the pending batch to standard output.
    #[cfg(unix)]
    pub fn render(&mut self) -> io::Result<()> {
        self.render_to(libc::STDOUT_FILENO)
    }

    /// Flush the pending batch to `fd` and reset the used length.
    ///
    /// On error the pending bytes are retained; a partial write followed by
    /// a failure leaves the batch queued for the caller to retry or drop.
    #[cfg(unix)]
    pub fn render_to(&mut self, fd: c_int) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        write_all_fd(fd, &self.buf)?;
        if let Some(log) = self.write_log.as_mut() {
            log.append(&self.buf);
        }
        self.buf.clear();
        Ok(())
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl io::Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.draw(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.render()
    }
}
