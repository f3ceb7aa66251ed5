//! Best-effort terminal restore for crash and signal paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use libc::{self, c_int};
use signal_hook::iterator::Signals;

use crate::core::escape::Control;

/// Minimal `/dev/tty` writer for cleanup paths.
///
/// Contract: never panics, never blocks. The tty is opened non-blocking;
/// if no controlling terminal is accessible, writes are dropped rather
/// than risking a blocking write to a redirected stdout.
pub struct TtyWriter {
    fd: c_int,
    owns_fd: bool,
}

impl TtyWriter {
    pub fn new() -> Self {
        let flags = libc::O_WRONLY | libc::O_NONBLOCK | libc::O_NOCTTY | libc::O_CLOEXEC;
        let fd = unsafe { libc::open(c"/dev/tty".as_ptr(), flags) };
        if fd >= 0 {
            Self { fd, owns_fd: true }
        } else {
            Self {
                fd: -1,
                owns_fd: false,
            }
        }
    }

    pub fn write_best_effort(&self, bytes: &[u8]) {
        if self.fd < 0 || bytes.is_empty() {
            return;
        }

        let mut written = 0;
        while written < bytes.len() {
            let remaining = &bytes[written..];
            let result = unsafe {
                libc::write(
                    self.fd,
                    remaining.as_ptr() as *const libc::c_void,
                    remaining.len(),
                )
            };
            if result > 0 {
                written = written.saturating_add(result as usize);
                continue;
            }
            if result == 0 {
                break;
            }

            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }

            // EAGAIN or a real error: drop the remaining output.
            break;
        }
    }
}

impl Default for TtyWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TtyWriter {
    fn drop(&mut self) {
        if self.owns_fd {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

/// Write the restore batch: show cursor, leave the alternate screen, reset
/// style. The sequences are idempotent and ignored by terminals that do
/// not implement them.
pub fn restore_terminal(tty: &TtyWriter) {
    tty.write_best_effort(Control::ShowCursor.sequence());
    tty.write_best_effort(Control::LeaveAltScreen.sequence());
    tty.write_best_effort(Control::ResetStyle.sequence());
}

/// Signal handler guard; closes the listener and joins its thread on drop.
pub struct SignalHookGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for SignalHookGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Install a SIGINT/SIGTERM cleanup hook. The cleanup runs at most once,
/// however many signals arrive.
pub fn install_signal_handlers<F>(cleanup: F) -> SignalHookGuard
where
    F: Fn() + Send + Sync + 'static,
{
    let cleanup = Arc::new(cleanup);
    let ran = Arc::new(AtomicBool::new(false));
    let mut signals =
        Signals::new([libc::SIGINT, libc::SIGTERM]).expect("failed to register signal handlers");
    let handle = signals.handle();

    let thread = thread::spawn(move || {
        for _ in signals.forever() {
            if !ran.swap(true, Ordering::SeqCst) {
                cleanup();
            }
        }
    });

    SignalHookGuard {
        handle,
        thread: Some(thread),
    }
}
