//! Raw file-descriptor plumbing for the output path and terminal queries.

use std::io;

use libc::{self, c_int};

use crate::core::escape::{parse_cursor_report, Control, CursorPos};

/// Block until `fd` is writable again.
fn wait_writable(fd: c_int) -> io::Result<()> {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    loop {
        let result = unsafe { libc::poll(&mut fds, 1, -1) };
        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if result == 0 {
            // Infinite timeout should not return 0, but avoid a tight loop if it does.
            continue;
        }
        if (fds.revents & libc::POLLOUT) != 0 {
            return Ok(());
        }

        return Err(io::Error::other(format!(
            "poll(POLLOUT) returned revents=0x{:x}",
            fds.revents
        )));
    }
}

/// Write loop with injectable write/wait primitives so partial writes,
/// EINTR, and EWOULDBLOCK handling stay testable without a real fd.
fn write_all_with<FWrite, FWait>(
    fd: c_int,
    bytes: &[u8],
    mut write_once: FWrite,
    mut wait_writable: FWait,
) -> io::Result<()>
where
    FWrite: FnMut(c_int, &[u8]) -> io::Result<usize>,
    FWait: FnMut(c_int) -> io::Result<()>,
{
    let mut written = 0;
    while written < bytes.len() {
        match write_once(fd, &bytes[written..]) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
            }
            Ok(count) => {
                let remaining = bytes.len() - written;
                if count > remaining {
                    return Err(io::Error::other("write returned more bytes than requested"));
                }
                written += count;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                continue;
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                wait_writable(fd)?;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Write all of `bytes` to `fd`, retrying on EINTR and waiting out
/// EWOULDBLOCK.
pub fn write_all_fd(fd: c_int, bytes: &[u8]) -> io::Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    write_all_with(
        fd,
        bytes,
        |fd, buf| {
            let result = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
            if result < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(result as usize)
            }
        },
        wait_writable,
    )
}

/// Read one byte from `fd`, retrying on EINTR. `None` means end of input.
pub fn read_byte(fd: c_int) -> io::Result<Option<u8>> {
    let mut byte = 0u8;
    loop {
        let result = unsafe { libc::read(fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
        if result > 0 {
            return Ok(Some(byte));
        }
        if result == 0 {
            return Ok(None);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Ask the terminal on `out_fd` for the cursor position and parse the reply
/// arriving on `in_fd`.
///
/// Blocks reading one byte at a time until the `R` terminator or end of
/// input; there is no timeout, so a non-responding terminal hangs the
/// caller. `Ok(None)` reports a reply that did not parse.
pub fn query_cursor_position(out_fd: c_int, in_fd: c_int) -> io::Result<Option<CursorPos>> {
    write_all_fd(out_fd, Control::RequestCursorPosition.sequence())?;

    let mut read_error = None;
    let pos = parse_cursor_report(|| match read_byte(in_fd) {
        Ok(byte) => byte,
        Err(err) => {
            read_error = Some(err);
            None
        }
    });

    match read_error {
        Some(err) => Err(err),
        None => Ok(pos),
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use libc::c_int;

    use super::{query_cursor_position, write_all_fd, write_all_with};
    use crate::core::escape::CursorPos;

    struct Pipe {
        read_fd: c_int,
        write_fd: c_int,
    }

    impl Pipe {
        fn open() -> Self {
            let mut fds = [0 as c_int; 2];
            let result = unsafe { libc::pipe(fds.as_mut_ptr()) };
            assert_eq!(result, 0, "pipe failed");
            Self {
                read_fd: fds[0],
                write_fd: fds[1],
            }
        }

        fn feed(&self, bytes: &[u8]) {
            write_all_fd(self.write_fd, bytes).expect("feed pipe");
        }

        fn drain(&self) -> Vec<u8> {
            let mut out = vec![0u8; 256];
            let read_len = unsafe {
                libc::read(
                    self.read_fd,
                    out.as_mut_ptr() as *mut libc::c_void,
                    out.len(),
                )
            };
            assert!(read_len >= 0, "drain pipe");
            out.truncate(read_len as usize);
            out
        }

        fn close_write(&mut self) {
            if self.write_fd >= 0 {
                unsafe {
                    libc::close(self.write_fd);
                }
                self.write_fd = -1;
            }
        }
    }

    impl Drop for Pipe {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.read_fd);
            }
            self.close_write();
        }
    }

    #[test]
    fn write_all_retries_on_eintr_and_writes_all_bytes() {
        let data = b"hello";
        let mut out = Vec::new();
        let mut calls = 0;
        write_all_with(
            1,
            data,
            |_, buf| {
                calls += 1;
                match calls {
                    1 => Err(io::Error::from(io::ErrorKind::Interrupted)),
                    2 => {
                        out.extend_from_slice(&buf[..2]);
                        Ok(2)
                    }
                    _ => {
                        out.extend_from_slice(buf);
                        Ok(buf.len())
                    }
                }
            },
            |_| unreachable!("wait_writable should not be called for EINTR"),
        )
        .expect("write_all_with failed");

        assert_eq!(out, data);
    }

    #[test]
    fn write_all_handles_partial_writes() {
        let data = b"abcdefg";
        let mut out = Vec::new();
        let mut calls = 0;
        write_all_with(
            1,
            data,
            |_, buf| {
                calls += 1;
                let count = buf.len().min(2);
                out.extend_from_slice(&buf[..count]);
                Ok(count)
            },
            |_| unreachable!("wait_writable should not be called for partial writes"),
        )
        .expect("write_all_with failed");

        assert_eq!(out, data);
        assert!(calls > 1, "expected multiple writes, got {calls}");
    }

    #[test]
    fn write_all_waits_on_would_block_then_retries() {
        let data = b"xyz";
        let mut out = Vec::new();
        let mut calls = 0;
        let events = std::cell::RefCell::new(Vec::new());
        write_all_with(
            1,
            data,
            |_, buf| {
                events.borrow_mut().push("write");
                calls += 1;
                if calls == 1 {
                    return Err(io::Error::from(io::ErrorKind::WouldBlock));
                }
                out.extend_from_slice(buf);
                Ok(buf.len())
            },
            |_| {
                events.borrow_mut().push("wait");
                Ok(())
            },
        )
        .expect("write_all_with failed");

        assert_eq!(out, data);
        assert_eq!(events.into_inner(), vec!["write", "wait", "write"]);
    }

    #[test]
    fn write_all_rejects_zero_length_write() {
        let err = write_all_with(1, b"abc", |_, _| Ok(0), |_| Ok(()))
            .expect_err("expected WriteZero");
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn query_cursor_position_parses_reply() {
        let request = Pipe::open();
        let reply = Pipe::open();
        reply.feed(b"\x1b[12;34R");

        let pos = query_cursor_position(request.write_fd, reply.read_fd)
            .expect("query_cursor_position failed");
        assert_eq!(pos, Some(CursorPos { x: 34, y: 12 }));
        assert_eq!(request.drain(), b"\x1b[6n");
    }

    #[test]
    fn query_cursor_position_reports_desync() {
        let request = Pipe::open();
        let reply = Pipe::open();
        // Missing bracket: the reader still consumes up to the terminator.
        reply.feed(b"12;34R");

        let pos = query_cursor_position(request.write_fd, reply.read_fd)
            .expect("query_cursor_position failed");
        assert_eq!(pos, None);
    }

    #[test]
    fn query_cursor_position_handles_end_of_input() {
        let request = Pipe::open();
        let mut reply = Pipe::open();
        reply.feed(b"\x1b[12;34");
        reply.close_write();

        let pos = query_cursor_position(request.write_fd, reply.read_fd)
            .expect("query_cursor_position failed");
        assert_eq!(pos, None);
    }
}
