//! RESP values
//!
//! The broker only ever *writes* values, but a decoder is provided as well so
//! clients (and the crate's own tests) can read replies and pushed messages.

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::{CRLF, MAX_BULK_LEN, MAX_MULTIBULK_LEN};
use crate::error::ProtocolError;

/// A RESP value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK`
    SimpleString(String),
    /// `-ERR something`
    Error(String),
    /// `:42`
    Integer(i64),
    /// `$5\r\nhello`
    Bulk(Bytes),
    /// `$-1` / `*-1`
    Null,
    /// `*N` followed by N values
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        RespValue::Bulk(Bytes::copy_from_slice(data.as_ref()))
    }

    /// Append the wire encoding of this value to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => encode_line(buf, b'+', s.as_bytes()),
            RespValue::Error(s) => encode_line(buf, b'-', s.as_bytes()),
            RespValue::Integer(i) => encode_line(buf, b':', i.to_string().as_bytes()),
            RespValue::Bulk(data) => encode_bulk(buf, data),
            RespValue::Null => buf.put_slice(b"$-1\r\n"),
            RespValue::Array(items) => {
                encode_line(buf, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode one value from the front of `buf`
    ///
    /// Returns `Ok(None)` without consuming anything if `buf` holds only part
    /// of a value.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<RespValue>, ProtocolError> {
        match decode_at(buf, 0)? {
            Some((value, consumed)) => {
                let _ = buf.split_to(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Bulk or simple string contents, if any
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::Bulk(b) => Some(b),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

/// Append `*N` followed by N bulk strings
pub fn encode_bulks(buf: &mut BytesMut, items: &[&[u8]]) {
    encode_line(buf, b'*', items.len().to_string().as_bytes());
    for item in items {
        encode_bulk(buf, item);
    }
}

/// Append a single bulk string
pub fn encode_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.reserve(data.len() + 16);
    encode_line(buf, b'$', data.len().to_string().as_bytes());
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

fn encode_line(buf: &mut BytesMut, marker: u8, line: &[u8]) {
    buf.put_u8(marker);
    buf.put_slice(line);
    buf.put_slice(CRLF);
}

fn decode_at(buf: &[u8], pos: usize) -> Result<Option<(RespValue, usize)>, ProtocolError> {
    let Some(&marker) = buf.get(pos) else {
        return Ok(None);
    };
    let Some(line_end) = buf
        .get(pos + 1..)
        .and_then(|rest| rest.windows(2).position(|w| w == CRLF))
        .map(|i| i + pos + 1)
    else {
        return Ok(None);
    };
    let line = &buf[pos + 1..line_end];
    let next = line_end + 2;

    let value = match marker {
        b'+' => RespValue::SimpleString(String::from_utf8_lossy(line).into_owned()),
        b'-' => RespValue::Error(String::from_utf8_lossy(line).into_owned()),
        b':' => RespValue::Integer(parse_int(line).ok_or(ProtocolError::InvalidLength)?),
        b'$' => {
            let len = parse_int(line).ok_or(ProtocolError::InvalidBulkLength)?;
            if len < 0 {
                return Ok(Some((RespValue::Null, next)));
            }
            if len > MAX_BULK_LEN {
                return Err(ProtocolError::InvalidBulkLength);
            }
            let end = next + len as usize;
            match buf.get(end..end + 2) {
                None => return Ok(None),
                Some(CRLF) => {}
                Some(_) => return Err(ProtocolError::MissingCrlf),
            }
            return Ok(Some((
                RespValue::Bulk(Bytes::copy_from_slice(&buf[next..end])),
                end + 2,
            )));
        }
        b'*' => {
            let count = parse_int(line).ok_or(ProtocolError::InvalidMultiBulkLength)?;
            if count < 0 {
                return Ok(Some((RespValue::Null, next)));
            }
            if count > MAX_MULTIBULK_LEN {
                return Err(ProtocolError::InvalidMultiBulkLength);
            }
            let mut items = Vec::with_capacity((count as usize).min(16));
            let mut cursor = next;
            for _ in 0..count {
                match decode_at(buf, cursor)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            return Ok(Some((RespValue::Array(items), cursor)));
        }
        other => return Err(ProtocolError::ExpectedBulk(other)),
    };

    Ok(Some((value, next)))
}

fn parse_int(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_subscribe_ack() {
        let ack = RespValue::Array(vec![
            RespValue::bulk("subscribe"),
            RespValue::bulk("news"),
            RespValue::Integer(1),
        ]);
        assert_eq!(
            &ack.to_bytes()[..],
            b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n"
        );
    }

    #[test]
    fn test_encode_bulks() {
        let mut buf = BytesMut::new();
        encode_bulks(&mut buf, &[&b"message"[..], &b"news"[..], &b""[..]]);
        assert_eq!(
            &buf[..],
            b"*3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$0\r\n\r\n"
        );
    }

    #[test]
    fn test_decode_nested_and_partial() {
        let wire = b"*2\r\n+PONG\r\n*2\r\n:7\r\n$-1\r\n-ERR no\r\n";
        let mut buf = BytesMut::from(&wire[..10]);
        assert_eq!(RespValue::decode(&mut buf).unwrap(), None);

        let mut buf = BytesMut::from(&wire[..]);
        let value = RespValue::decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::SimpleString("PONG".into()),
                RespValue::Array(vec![RespValue::Integer(7), RespValue::Null]),
            ])
        );

        let value = RespValue::decode(&mut buf).unwrap().unwrap();
        assert_eq!(value, RespValue::Error("ERR no".into()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_unknown_marker() {
        let mut buf = BytesMut::from(&b"?what\r\n"[..]);
        assert_eq!(
            RespValue::decode(&mut buf),
            Err(ProtocolError::ExpectedBulk(b'?'))
        );
    }
}
