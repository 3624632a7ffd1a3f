//! Diagnostic sink writing straight to file descriptor 2.
//!
//! `std::io::stderr()` may allocate and takes its own reentrant lock; neither
//! is acceptable inside `malloc`.

use memprof_core::{DIAGNOSTIC_LINE_CAPACITY, DiagnosticSink};

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn write_line(&mut self, line: &[u8]) {
        // One write(2) per line when it fits, so lines from other writers on
        // the same descriptor cannot land between text and newline.
        let mut buf = [0u8; DIAGNOSTIC_LINE_CAPACITY + 1];
        if line.len() < buf.len() {
            buf[..line.len()].copy_from_slice(line);
            buf[line.len()] = b'\n';
            write_all(&buf[..=line.len()]);
        } else {
            write_all(line);
            write_all(b"\n");
        }
    }
}

/// Write every byte, retrying on `EINTR`. Other errors drop the rest of the
/// line: there is nowhere left to report them.
pub(crate) fn write_all(mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: `bytes` is a live slice for the duration of the call.
        let written =
            unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };
        if written < 0 {
            if std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return;
        }
        if written == 0 {
            return;
        }
        bytes = &bytes[written.unsigned_abs()..];
    }
}
