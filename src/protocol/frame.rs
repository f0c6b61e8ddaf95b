//! Newline-delimited framing over byte streams
//!
//! Frame format:
//! ```text
//! +------------------+----+
//! | payload          | \n |
//! +------------------+----+
//! ```
//!
//! The delimiter is not part of the payload, and payloads never contain a
//! literal `\n` (the JSON codec escapes control characters). A frame that
//! grows past the configured cap before its delimiter arrives is an error.

use std::io::{self, ErrorKind};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Read chunk size for the streaming reader.
const READ_CHUNK_BYTES: usize = 4096;

/// Incremental framer for streaming use. Feed bytes in as they arrive and
/// pull complete frames out.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    max_frame_bytes: usize,
}

impl LineFramer {
    /// Create a framer with a strict maximum frame size. The limit applies
    /// to the payload only, excluding the delimiter.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_CHUNK_BYTES.min(max_frame_bytes)),
            max_frame_bytes,
        }
    }

    /// Feed data into the framer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next complete frame.
    /// Returns Ok(Some(payload)) if a full frame is buffered, Ok(None) if
    /// more data is needed.
    pub fn next_frame(&mut self) -> io::Result<Option<Bytes>> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(delimiter) => {
                if delimiter > self.max_frame_bytes {
                    return Err(frame_too_large(self.max_frame_bytes));
                }
                let payload = self.buffer.split_to(delimiter).freeze();
                // Drop the delimiter itself.
                let _ = self.buffer.split_to(1);
                Ok(Some(payload))
            }
            None => {
                if self.buffer.len() > self.max_frame_bytes {
                    return Err(frame_too_large(self.max_frame_bytes));
                }
                Ok(None)
            }
        }
    }

    /// Whether any partial frame is buffered
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

fn frame_too_large(max_frame_bytes: usize) -> io::Error {
    io::Error::new(
        ErrorKind::InvalidData,
        format!("frame exceeds maximum allowed size (max={} bytes)", max_frame_bytes),
    )
}

/// Reads newline-delimited frames from an async byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    framer: LineFramer,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            reader,
            framer: LineFramer::new(max_frame_bytes),
            chunk: vec![0u8; READ_CHUNK_BYTES],
        }
    }

    /// Read the next frame, suspending until one full frame is available.
    ///
    /// Returns `Ok(Some(payload))` with freshly owned bytes, `Ok(None)` on a
    /// clean close (EOF with nothing buffered), and an error for oversized
    /// frames, a close mid-frame, or any transport error.
    pub async fn read_frame(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.framer.next_frame()? {
                return Ok(Some(frame));
            }

            let bytes_read = self.reader.read(&mut self.chunk).await?;
            if bytes_read == 0 {
                if self.framer.has_partial() {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "connection closed mid-frame",
                    ));
                }
                return Ok(None);
            }

            self.framer.feed(&self.chunk[..bytes_read]);
        }
    }
}

/// Writes newline-delimited frames to an async byte stream.
#[derive(Debug)]
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a single frame followed by the delimiter and flush.
    /// Fails fast if the cancellation signal fired before the write begins.
    pub async fn write_frame(
        &mut self,
        cancel: &CancellationToken,
        payload: &[u8],
    ) -> io::Result<()> {
        if cancel.is_cancelled() {
            return Err(io::Error::new(ErrorKind::Interrupted, "write canceled"));
        }

        self.writer.write_all(payload).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framer_single_frame() {
        let mut framer = LineFramer::new(1024);
        framer.feed(b"{\"type\":\"USERS\"}\n");

        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.as_ref(), b"{\"type\":\"USERS\"}");
        assert!(framer.next_frame().unwrap().is_none());
        assert!(!framer.has_partial());
    }

    #[test]
    fn test_framer_split_feed() {
        let mut framer = LineFramer::new(1024);
        framer.feed(b"{\"type\":\"US");
        assert!(framer.next_frame().unwrap().is_none());
        assert!(framer.has_partial());

        framer.feed(b"ERS\"}\nextra");
        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.as_ref(), b"{\"type\":\"USERS\"}");
        assert!(framer.has_partial());
    }

    #[test]
    fn test_framer_multiple_frames_in_one_feed() {
        let mut framer = LineFramer::new(1024);
        framer.feed(b"one\ntwo\nthree\n");

        assert_eq!(framer.next_frame().unwrap().unwrap().as_ref(), b"one");
        assert_eq!(framer.next_frame().unwrap().unwrap().as_ref(), b"two");
        assert_eq!(framer.next_frame().unwrap().unwrap().as_ref(), b"three");
        assert!(framer.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_framer_empty_frame() {
        let mut framer = LineFramer::new(1024);
        framer.feed(b"\n");
        let frame = framer.next_frame().unwrap().unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_framer_too_large_without_delimiter() {
        let mut framer = LineFramer::new(8);
        framer.feed(b"123456789");
        assert!(framer.next_frame().is_err());
    }

    #[test]
    fn test_framer_too_large_with_delimiter() {
        let mut framer = LineFramer::new(8);
        framer.feed(b"123456789\n");
        assert!(framer.next_frame().is_err());
    }

    #[test]
    fn test_framer_payload_at_exact_cap() {
        let mut framer = LineFramer::new(8);
        framer.feed(b"12345678\n");
        let frame = framer.next_frame().unwrap().unwrap();
        assert_eq!(frame.as_ref(), b"12345678");
    }

    #[tokio::test]
    async fn test_reader_writer_roundtrip() {
        let (client, server) = tokio::io::duplex(256);
        let cancel = CancellationToken::new();

        let mut writer = FrameWriter::new(client);
        writer.write_frame(&cancel, b"{\"type\":\"USERS\"}").await.unwrap();
        writer.write_frame(&cancel, b"payload two").await.unwrap();
        drop(writer);

        let mut reader = FrameReader::new(server, 1024);
        let first = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), b"{\"type\":\"USERS\"}");
        let second = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(second.as_ref(), b"payload two");

        // Writer dropped: clean EOF.
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_rejects_eof_mid_frame() {
        let (mut client, server) = tokio::io::duplex(256);
        client.write_all(b"partial frame without delimiter").await.unwrap();
        drop(client);

        let mut reader = FrameReader::new(server, 1024);
        let err = reader.read_frame().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_writer_fails_fast_when_canceled() {
        let (client, _server) = tokio::io::duplex(256);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut writer = FrameWriter::new(client);
        let err = writer.write_frame(&cancel, b"late").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
    }
}
