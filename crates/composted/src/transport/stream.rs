//! Accepted connection streams and line framing.
//!
//! Each frame is one line. Line breaks inside a frame are escaped with
//! [`ESCAPE`] so codecs may produce any byte: `\n` travels as `ESC n`,
//! `\r` as `ESC r`, and `ESC` itself as `ESC ESC`. JSON text never holds a
//! raw control character, so plain JSON lines are unchanged on the wire.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use thiserror::Error;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Stream types accepted by the socket listener.
#[derive(Debug)]
pub(crate) enum ConnectionStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Applies the same timeout to reads and writes.
    pub(crate) fn set_io_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => {
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)
            }
            #[cfg(unix)]
            Self::Unix(stream) => {
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)
            }
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Escape byte introducing an escaped line break.
pub(crate) const ESCAPE: u8 = 0x1b;

/// Errors raised while reading one frame.
#[derive(Debug, Error)]
pub(crate) enum FrameError {
    #[error("frame exceeds {max} bytes")]
    TooLarge { max: usize },
    #[error("invalid escape sequence at byte {position}")]
    Escape { position: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads one newline-terminated frame, returning it unescaped and without
/// the terminator.
///
/// Returns `Ok(None)` when the peer closes before completing a line. The
/// size cap applies to the line as received.
pub(crate) fn read_frame<R: Read>(
    stream: &mut R,
    max: usize,
) -> Result<Option<Vec<u8>>, FrameError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let read = match stream.read(&mut chunk) {
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(FrameError::Io(error)),
        };
        if read == 0 {
            return Ok(None);
        }
        let received = &chunk[..read];
        if let Some(position) = received.iter().position(|byte| *byte == b'\n') {
            buffer.extend_from_slice(&received[..position]);
            if buffer.len() > max {
                return Err(FrameError::TooLarge { max });
            }
            if buffer.last() == Some(&b'\r') {
                buffer.pop();
            }
            return unescape(&buffer).map(Some);
        }
        buffer.extend_from_slice(received);
        if buffer.len() > max {
            return Err(FrameError::TooLarge { max });
        }
    }
}

/// Writes one frame, escaped, followed by a newline.
pub(crate) fn write_frame<W: Write>(stream: &mut W, frame: &[u8]) -> io::Result<()> {
    stream.write_all(&escape(frame))?;
    stream.write_all(b"\n")?;
    stream.flush()
}

fn escape(frame: &[u8]) -> Vec<u8> {
    let mut line = Vec::with_capacity(frame.len());
    for &byte in frame {
        match byte {
            b'\n' => line.extend_from_slice(&[ESCAPE, b'n']),
            b'\r' => line.extend_from_slice(&[ESCAPE, b'r']),
            ESCAPE => line.extend_from_slice(&[ESCAPE, ESCAPE]),
            other => line.push(other),
        }
    }
    line
}

fn unescape(line: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut frame = Vec::with_capacity(line.len());
    let mut bytes = line.iter().copied().enumerate();
    while let Some((position, byte)) = bytes.next() {
        if byte != ESCAPE {
            frame.push(byte);
            continue;
        }
        match bytes.next() {
            Some((_, b'n')) => frame.push(b'\n'),
            Some((_, b'r')) => frame.push(b'\r'),
            Some((_, ESCAPE)) => frame.push(ESCAPE),
            _ => return Err(FrameError::Escape { position }),
        }
    }
    Ok(frame)
}
