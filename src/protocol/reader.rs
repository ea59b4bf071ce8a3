//! Request decoding
//!
//! [`parse_command`] is a pure function over a buffer: it either consumes one
//! complete request, reports that more input is needed, or fails with a
//! [`ProtocolError`]. [`CommandReader`] feeds it from an async stream.

use std::ops::Range;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::command::Command;
use super::constants::{MAX_BULK_LEN, MAX_INLINE_LEN, MAX_MULTIBULK_LEN};
use crate::error::{Error, ProtocolError, Result};

/// Default read chunk size
const DEFAULT_READ_SIZE: usize = 16 * 1024;

/// Outcome of scanning a buffer for one request
enum Parsed {
    /// Multi-bulk request: byte ranges of each argument within the frame
    MultiBulk(usize, Vec<Range<usize>>),
    /// Inline request: unescaped arguments
    Inline(usize, Vec<Bytes>),
}

/// Try to decode one request from the front of `buf`
///
/// On success the request's bytes are removed from `buf`. Returns `Ok(None)`
/// when `buf` holds only a partial request; nothing is consumed in that case.
/// An empty multi-bulk (`*0`) or blank inline line yields an empty command.
pub fn parse_command(buf: &mut BytesMut) -> std::result::Result<Option<Command>, ProtocolError> {
    let parsed = match buf.first() {
        None => return Ok(None),
        Some(b'*') => scan_multibulk(buf)?,
        Some(_) => scan_inline(buf)?,
    };

    match parsed {
        None => Ok(None),
        Some(Parsed::MultiBulk(consumed, ranges)) => {
            let frame = buf.split_to(consumed).freeze();
            let args = ranges.into_iter().map(|r| frame.slice(r)).collect();
            Ok(Some(Command::new(args)))
        }
        Some(Parsed::Inline(consumed, args)) => {
            let _ = buf.split_to(consumed);
            Ok(Some(Command::new(args)))
        }
    }
}

fn scan_multibulk(buf: &[u8]) -> std::result::Result<Option<Parsed>, ProtocolError> {
    let Some(header_end) = find_crlf(buf, 1) else {
        if buf.len() > MAX_INLINE_LEN {
            return Err(ProtocolError::InvalidMultiBulkLength);
        }
        return Ok(None);
    };

    let count = parse_int(&buf[1..header_end]).ok_or(ProtocolError::InvalidMultiBulkLength)?;
    if count > MAX_MULTIBULK_LEN {
        return Err(ProtocolError::InvalidMultiBulkLength);
    }

    let mut pos = header_end + 2;
    if count <= 0 {
        return Ok(Some(Parsed::MultiBulk(pos, Vec::new())));
    }

    let mut ranges = Vec::with_capacity((count as usize).min(16));
    for _ in 0..count {
        let Some(&marker) = buf.get(pos) else {
            return Ok(None);
        };
        if marker != b'$' {
            return Err(ProtocolError::ExpectedBulk(marker));
        }

        let Some(len_end) = find_crlf(buf, pos + 1) else {
            if buf.len() - pos > MAX_INLINE_LEN {
                return Err(ProtocolError::InvalidBulkLength);
            }
            return Ok(None);
        };
        let len = parse_int(&buf[pos + 1..len_end]).ok_or(ProtocolError::InvalidBulkLength)?;
        if !(0..=MAX_BULK_LEN).contains(&len) {
            return Err(ProtocolError::InvalidBulkLength);
        }

        let start = len_end + 2;
        let end = start + len as usize;
        match buf.get(end..end + 2) {
            None => return Ok(None),
            Some(b"\r\n") => {}
            Some(_) => return Err(ProtocolError::MissingCrlf),
        }

        ranges.push(start..end);
        pos = end + 2;
    }

    Ok(Some(Parsed::MultiBulk(pos, ranges)))
}

fn scan_inline(buf: &[u8]) -> std::result::Result<Option<Parsed>, ProtocolError> {
    let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() > MAX_INLINE_LEN {
            return Err(ProtocolError::InlineTooLong);
        }
        return Ok(None);
    };
    if newline > MAX_INLINE_LEN {
        return Err(ProtocolError::InlineTooLong);
    }

    let mut line = &buf[..newline];
    if let Some(stripped) = line.strip_suffix(b"\r") {
        line = stripped;
    }

    let args = split_inline(line)?;
    Ok(Some(Parsed::Inline(newline + 1, args)))
}

/// Split an inline request on whitespace, honouring double quotes
fn split_inline(line: &[u8]) -> std::result::Result<Vec<Bytes>, ProtocolError> {
    let mut args = Vec::new();
    let mut iter = line.iter().copied().peekable();

    loop {
        while iter.next_if(|b| b.is_ascii_whitespace()).is_some() {}
        let Some(first) = iter.peek().copied() else {
            break;
        };

        let mut current = Vec::new();
        if first == b'"' {
            iter.next();
            let mut closed = false;
            while let Some(b) = iter.next() {
                match b {
                    b'\\' => match iter.next() {
                        Some(b'n') => current.push(b'\n'),
                        Some(b'r') => current.push(b'\r'),
                        Some(b't') => current.push(b'\t'),
                        Some(other) => current.push(other),
                        None => return Err(ProtocolError::InvalidInline),
                    },
                    b'"' => {
                        closed = true;
                        break;
                    }
                    other => current.push(other),
                }
            }
            // A closing quote must be followed by whitespace or end of line
            if !closed || iter.peek().is_some_and(|b| !b.is_ascii_whitespace()) {
                return Err(ProtocolError::InvalidInline);
            }
        } else {
            while let Some(b) = iter.next_if(|b| !b.is_ascii_whitespace()) {
                current.push(b);
            }
        }
        args.push(Bytes::from(current));
    }

    Ok(args)
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| i + from)
}

fn parse_int(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Reads requests from an async byte stream
pub struct CommandReader<R> {
    inner: R,
    buf: BytesMut,
    read_size: usize,
}

impl<R: AsyncRead + Unpin> CommandReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_capacity(DEFAULT_READ_SIZE, inner)
    }

    /// Create a reader that grows its buffer in `read_size` steps
    pub fn with_capacity(read_size: usize, inner: R) -> Self {
        let read_size = read_size.max(64);
        Self {
            inner,
            buf: BytesMut::with_capacity(read_size),
            read_size,
        }
    }

    /// Read the next request
    ///
    /// Returns `Ok(None)` when the peer closed the stream between requests.
    /// A malformed frame yields [`Error::Protocol`]; the buffered input is
    /// discarded so the next call starts from fresh data. This method is
    /// cancel safe: partially received requests stay buffered.
    pub async fn read_command(&mut self) -> Result<Option<Command>> {
        loop {
            match parse_command(&mut self.buf) {
                Ok(Some(command)) => return Ok(Some(command)),
                Ok(None) => {}
                Err(e) => {
                    self.buf.clear();
                    return Err(Error::Protocol(e));
                }
            }

            if self.buf.capacity() - self.buf.len() < self.read_size / 4 {
                self.buf.reserve(self.read_size);
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed in the middle of a request",
                )));
            }
        }
    }

    /// Number of bytes received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
