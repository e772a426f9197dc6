//! Line-delimited JSON over an async byte stream.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use crate::error::ProtocolError;
use crate::protocol::{Message, decode, encode};

/// Outcome of reading one line that was not end of stream.
#[derive(Debug)]
pub enum Incoming<M> {
    Message(M),
    /// The line could not be decoded; the stream is still usable.
    Malformed(ProtocolError),
    /// The stream failed; no further reads should be attempted.
    Broken(io::Error),
}

/// Reads one message per line.
pub struct LineReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            lines: BufReader::new(inner).lines(),
        }
    }

    /// Wait for the next message. `None` means end of stream.
    ///
    /// Blank lines are skipped. Cancel safe: a dropped call loses no data.
    pub async fn next_message<M: Message>(&mut self) -> Option<Incoming<M>> {
        loop {
            match self.lines.next_line().await {
                Ok(None) => return None,
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    return Some(match decode::<M>(&line) {
                        Ok(message) => Incoming::Message(message),
                        Err(err) => Incoming::Malformed(err),
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    return Some(Incoming::Malformed(ProtocolError::Json(
                        serde_json::Error::io(err),
                    )));
                }
                Err(err) => return Some(Incoming::Broken(err)),
            }
        }
    }
}

/// Writes one message per line and flushes after every message.
pub struct LineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send<M: Message>(&mut self, message: &M) -> io::Result<()> {
        let mut line = encode(message);
        line.push('\n');
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
