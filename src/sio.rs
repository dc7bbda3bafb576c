//! Output that is safe to produce from a signal handler.
//!
//! Formatting goes into a fixed stack buffer and is emitted with a single
//! `write(2)` loop: no allocation, no locks, no userspace buffering. Shell
//! messages printed from the main line use the same path so they interleave
//! with handler output line by line.

use crate::state::MAXLINE;
use nix::errno::Errno;
use nix::unistd::write;
use std::fmt;
use std::os::fd::BorrowedFd;

/// Room for a full stored command line plus its `Job [..] (..)` prefix.
pub const SIO_BUFSIZE: usize = MAXLINE + 64;

// SAFETY: fd 1 stays open for the life of the process.
const STDOUT: BorrowedFd<'static> = unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) };

/// Fixed-size formatting buffer. Text past the end is dropped.
pub struct SioBuf {
    buf: [u8; SIO_BUFSIZE],
    len: usize,
}

impl Default for SioBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl SioBuf {
    pub const fn new() -> Self {
        Self {
            buf: [0; SIO_BUFSIZE],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_truncated(&self) -> bool {
        self.len == SIO_BUFSIZE
    }

    /// Appends a newline, overwriting the last byte if the buffer is full.
    pub fn terminate_line(&mut self) {
        if self.len == SIO_BUFSIZE {
            self.len -= 1;
        }
        self.buf[self.len] = b'\n';
        self.len += 1;
    }
}

impl fmt::Write for SioBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = SIO_BUFSIZE - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

/// Writes all of `bytes` to stdout, retrying on `EINTR`.
pub fn write_stdout(mut bytes: &[u8]) -> nix::Result<()> {
    while !bytes.is_empty() {
        match write(STDOUT, bytes) {
            Ok(0) => return Err(Errno::EIO),
            Ok(n) => bytes = &bytes[n..],
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[doc(hidden)]
pub fn print_fmt(args: fmt::Arguments<'_>, newline: bool) {
    let mut buf = SioBuf::new();
    let _ = fmt::write(&mut buf, args);
    if newline {
        buf.terminate_line();
    }
    let _ = write_stdout(buf.as_bytes());
}

/// `println!` for signal context.
#[macro_export]
macro_rules! sio_println {
    ($($arg:tt)*) => {
        $crate::sio::print_fmt(format_args!($($arg)*), true)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn test_formats_without_allocating_buffer() {
        let mut buf = SioBuf::new();
        write!(buf, "Job [{}] ({}) stopped by signal {}", 1, 4242, 20).unwrap();
        buf.terminate_line();
        assert_eq!(buf.as_bytes(), b"Job [1] (4242) stopped by signal 20\n");
        assert!(!buf.is_truncated());
    }

    #[test]
    fn test_overflow_is_truncated_but_newline_kept() {
        let mut buf = SioBuf::new();
        let long = "x".repeat(SIO_BUFSIZE + 10);
        write!(buf, "{}", long).unwrap();
        assert!(buf.is_truncated());

        buf.terminate_line();
        let bytes = buf.as_bytes();
        assert_eq!(bytes.len(), SIO_BUFSIZE);
        assert_eq!(bytes.last(), Some(&b'\n'));
    }

    #[test]
    fn test_full_stored_command_line_fits_in_one_message() {
        let mut buf = SioBuf::new();
        let cmdline = "x".repeat(MAXLINE);
        write!(buf, "Job [{}] ({}) terminated by signal {}", 16, i32::MAX, 2).unwrap();
        write!(buf, " {}", cmdline).unwrap();
        buf.terminate_line();
        assert!(!buf.is_truncated());
        assert!(buf.as_bytes().ends_with(format!("{cmdline}\n").as_bytes()));
    }
}
