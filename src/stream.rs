//! Newline-delimited JSON decoding over an HTTP byte stream

use crate::error::{Error, Result};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::pin::Pin;

/// Decodes one JSON value per line from a streamed response body
///
/// Chunks may split a line anywhere (including inside a UTF-8 sequence), so
/// raw bytes are buffered until a `\n` arrives. A final line without a
/// trailing newline is decoded when the stream ends.
pub struct LineStream {
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl LineStream {
    pub(crate) fn new(stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// Next non-blank line decoded as `T`, or `None` once the body is exhausted
    ///
    /// A line that is not valid UTF-8 JSON yields [`Error::StreamDecode`]; callers are
    /// expected to stop reading at the first error.
    pub async fn next_chunk<T: DeserializeOwned>(&mut self) -> Option<Result<T>> {
        loop {
            if let Some(line) = self.take_line() {
                let trimmed = line.trim_ascii();
                if trimmed.is_empty() {
                    continue;
                }
                return Some(serde_json::from_slice(trimmed).map_err(|source| {
                    Error::StreamDecode {
                        line: String::from_utf8_lossy(trimmed).into_owned(),
                        source,
                    }
                }));
            }

            if self.finished {
                return None;
            }

            match self.inner.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(Error::Http(e)));
                }
                None => self.finished = true,
            }
        }
    }

    /// Pop a complete line; after the stream ends, the remainder counts as one
    fn take_line(&mut self) -> Option<Vec<u8>> {
        if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            return Some(line);
        }
        if self.finished && !self.buffer.is_empty() {
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }

    /// Read every line, feeding each decoded chunk to `fold`
    ///
    /// Stops at the first undecodable line or transport error.
    pub async fn fold<T, F>(mut self, mut fold: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: FnMut(T),
    {
        while let Some(chunk) = self.next_chunk::<T>().await {
            fold(chunk?);
        }
        Ok(())
    }
}
