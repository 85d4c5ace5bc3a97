//! Records produced by local storage.

use bytes::Bytes;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

type ValueReader = Pin<Box<dyn AsyncRead + Send>>;

/// A value fetched from local storage.
///
/// The value is read lazily from the underlying reader. The reader is owned by
/// the record, so whatever holds the record releases it exactly once, when the
/// record (or the stream it was turned into) is dropped.
pub struct BlockRecord {
    pub value_len: u64,
    reader: ValueReader,
}

impl BlockRecord {
    pub fn new<R>(value_len: u64, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            value_len,
            reader: Box::pin(reader),
        }
    }

    pub fn from_bytes(value: Bytes) -> Self {
        let value_len = value.len() as u64;
        Self::new(value_len, io::Cursor::new(value))
    }

    /// Reads the whole value into memory, consuming the record.
    pub async fn read_all(mut self) -> io::Result<Vec<u8>> {
        let mut value = Vec::with_capacity(self.value_len as usize);
        self.read_to_end(&mut value).await?;
        Ok(value)
    }
}

impl AsyncRead for BlockRecord {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.reader.as_mut().poll_read(cx, buf)
    }
}

impl std::fmt::Debug for BlockRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRecord")
            .field("value_len", &self.value_len)
            .finish_non_exhaustive()
    }
}

/// A fully materialized entry, as produced by range scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}
