//! Reply encoding over a buffered async writer
//!
//! Every `write_*` call only appends to the internal buffer; nothing reaches
//! the peer until [`RespWriter::flush`] is called (or the buffer fills up).

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use super::constants::ERROR_PREFIX;
use super::value::{encode_bulk, encode_bulks, RespValue};
use crate::error::Result;

/// Default write buffer size
const DEFAULT_WRITE_BUFFER: usize = 64 * 1024;

/// Buffered RESP writer
pub struct RespWriter<W: AsyncWrite> {
    inner: BufWriter<W>,
    scratch: BytesMut,
}

impl<W: AsyncWrite + Unpin> RespWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_capacity(DEFAULT_WRITE_BUFFER, inner)
    }

    pub fn with_capacity(capacity: usize, inner: W) -> Self {
        Self {
            inner: BufWriter::with_capacity(capacity, inner),
            scratch: BytesMut::with_capacity(256),
        }
    }

    /// `+<s>\r\n`
    pub async fn write_simple_string(&mut self, s: &str) -> Result<()> {
        self.write_value(&RespValue::SimpleString(s.to_string()))
            .await
    }

    /// `-ERR <msg>\r\n`
    pub async fn write_error(&mut self, msg: &str) -> Result<()> {
        self.write_value(&RespValue::Error(format!("{}{}", ERROR_PREFIX, msg)))
            .await
    }

    /// `:<n>\r\n`
    pub async fn write_int(&mut self, n: i64) -> Result<()> {
        self.write_value(&RespValue::Integer(n)).await
    }

    /// `$<len>\r\n<data>\r\n`
    pub async fn write_bulk(&mut self, data: &[u8]) -> Result<()> {
        self.scratch.clear();
        encode_bulk(&mut self.scratch, data);
        self.write_scratch().await
    }

    /// An array made only of bulk strings
    pub async fn write_bulks(&mut self, items: &[&[u8]]) -> Result<()> {
        self.scratch.clear();
        encode_bulks(&mut self.scratch, items);
        self.write_scratch().await
    }

    /// An array of arbitrary values
    pub async fn write_values(&mut self, items: Vec<RespValue>) -> Result<()> {
        self.write_value(&RespValue::Array(items)).await
    }

    pub async fn write_value(&mut self, value: &RespValue) -> Result<()> {
        self.scratch.clear();
        value.encode(&mut self.scratch);
        self.write_scratch().await
    }

    /// Write an already encoded frame as-is
    pub async fn write_raw(&mut self, frame: &[u8]) -> Result<()> {
        self.inner.write_all(frame).await?;
        Ok(())
    }

    /// Push everything buffered to the peer
    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Bytes accepted but not yet flushed
    pub fn pending(&self) -> usize {
        self.inner.buffer().len()
    }

    async fn write_scratch(&mut self) -> Result<()> {
        self.inner.write_all(&self.scratch).await?;
        Ok(())
    }
}
