//! Git pktline framing.
//!
//! Every packet starts with four lowercase hex digits giving the packet
//! length including the header. `0000` is a flush packet and `0001` a
//! delimiter. Text packets end in a single `\n`, which the reader strips.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{LfsError, LfsResult};

/// Largest payload a single packet can carry.
pub const MAX_PAYLOAD: usize = 65516;

const HEADER_LEN: usize = 4;
const FLUSH: &[u8; 4] = b"0000";
const DELIM: &[u8; 4] = b"0001";

/// One decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Flush,
    Delim,
    Data(Bytes),
}

impl Packet {
    /// The payload as a text line without its trailing newline.
    ///
    /// # Errors
    ///
    /// Returns `LfsError::Protocol` for special packets or non UTF-8 payloads.
    pub fn into_text(self) -> LfsResult<String> {
        match self {
            Self::Data(data) => {
                let mut text = String::from_utf8(data.to_vec())
                    .map_err(|_| LfsError::protocol("packet is not valid utf-8"))?;
                if text.ends_with('\n') {
                    text.pop();
                }
                Ok(text)
            }
            Self::Flush => Err(LfsError::protocol("unexpected flush packet")),
            Self::Delim => Err(LfsError::protocol("unexpected delim packet")),
        }
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Reads packets from an async byte stream.
pub struct PktReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> PktReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next packet. Returns `None` on a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, a malformed header or a truncated packet.
    pub async fn read_packet(&mut self) -> LfsResult<Option<Packet>> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self.inner.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(LfsError::protocol("truncated packet header"));
            }
            filled += n;
        }

        if &header == FLUSH {
            return Ok(Some(Packet::Flush));
        }
        if &header == DELIM {
            return Ok(Some(Packet::Delim));
        }

        let text = std::str::from_utf8(&header)
            .map_err(|_| LfsError::protocol("invalid packet header"))?;
        let len = usize::from_str_radix(text, 16)
            .map_err(|_| LfsError::protocol(format!("invalid packet length {text:?}")))?;
        if len <= HEADER_LEN || len > MAX_PAYLOAD + HEADER_LEN {
            return Err(LfsError::protocol(format!("invalid packet length {len}")));
        }

        let mut payload = vec![0u8; len - HEADER_LEN];
        self.inner.read_exact(&mut payload).await?;
        Ok(Some(Packet::Data(Bytes::from(payload))))
    }

    /// Reads a packet, treating end of stream as an error.
    ///
    /// # Errors
    ///
    /// Returns `LfsError::Protocol` on end of stream.
    pub async fn expect_packet(&mut self) -> LfsResult<Packet> {
        self.read_packet()
            .await?
            .ok_or_else(|| LfsError::protocol("unexpected end of stream"))
    }

    /// Reads text lines up to the next flush or delimiter and returns them
    /// together with the packet that ended the section.
    ///
    /// # Errors
    ///
    /// Returns an error if a line is not text or the stream ends.
    pub async fn read_section(&mut self) -> LfsResult<(Vec<String>, Packet)> {
        let mut lines = Vec::new();
        loop {
            match self.expect_packet().await? {
                packet @ (Packet::Flush | Packet::Delim) => return Ok((lines, packet)),
                data => lines.push(data.into_text()?),
            }
        }
    }

    /// Reads text lines up to the next flush.
    ///
    /// # Errors
    ///
    /// Returns `LfsError::Protocol` if a delimiter appears first.
    pub async fn read_until_flush(&mut self) -> LfsResult<Vec<String>> {
        match self.read_section().await? {
            (lines, Packet::Flush) => Ok(lines),
            _ => Err(LfsError::protocol("unexpected delim packet")),
        }
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Writes packets to an async byte stream.
pub struct PktWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> PktWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes `line` followed by a newline as one packet.
    ///
    /// # Errors
    ///
    /// Returns an error if the line does not fit a packet or the write fails.
    pub async fn write_text(&mut self, line: &str) -> LfsResult<()> {
        if line.len() + 1 > MAX_PAYLOAD {
            return Err(LfsError::protocol("line too long for a packet"));
        }
        let mut payload = Vec::with_capacity(line.len() + 1);
        payload.extend_from_slice(line.as_bytes());
        payload.push(b'\n');
        self.write_payload(&payload).await
    }

    /// Writes each line as a text packet.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails.
    pub async fn write_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> LfsResult<()> {
        for line in lines {
            self.write_text(line.as_ref()).await?;
        }
        Ok(())
    }

    /// Writes binary data, split across as many packets as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_data(&mut self, data: &[u8]) -> LfsResult<()> {
        for chunk in data.chunks(MAX_PAYLOAD) {
            self.write_payload(chunk).await?;
        }
        Ok(())
    }

    /// Writes a flush packet and flushes the underlying stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn flush(&mut self) -> LfsResult<()> {
        self.inner.write_all(FLUSH).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Writes a delimiter packet.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn delim(&mut self) -> LfsResult<()> {
        self.inner.write_all(DELIM).await?;
        Ok(())
    }

    async fn write_payload(&mut self, payload: &[u8]) -> LfsResult<()> {
        if payload.is_empty() {
            return Ok(());
        }
        let header = format!("{:04x}", payload.len() + HEADER_LEN);
        self.inner.write_all(header.as_bytes()).await?;
        self.inner.write_all(payload).await?;
        Ok(())
    }

    /// Consumes the writer, returning the underlying stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_text_and_flush() {
        let mut writer = PktWriter::new(Vec::new());
        writer.write_text("version=1").await.unwrap();
        writer.delim().await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(writer.into_inner(), b"000eversion=1\n00010000");
    }

    #[tokio::test]
    async fn test_writer_against_mock_stream() {
        let stream = tokio_test::io::Builder::new()
            .write(b"000clocking\n")
            .write(b"0008data")
            .write(b"0000")
            .build();
        let mut writer = PktWriter::new(stream);
        writer.write_text("locking").await.unwrap();
        writer.write_data(b"data").await.unwrap();
        writer.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_section_stops_at_delim() {
        let input: &[u8] = b"000csize=42\n0001000bpayload0000";
        let mut reader = PktReader::new(input);

        let (args, end) = reader.read_section().await.unwrap();
        assert_eq!(args, vec!["size=42"]);
        assert_eq!(end, Packet::Delim);

        let data = reader.expect_packet().await.unwrap();
        assert_eq!(data, Packet::Data(Bytes::from_static(b"payload")));
        assert_eq!(reader.expect_packet().await.unwrap(), Packet::Flush);
        assert_eq!(reader.read_packet().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_large_data_is_chunked() {
        let data = vec![7u8; MAX_PAYLOAD + 10];
        let mut writer = PktWriter::new(Vec::new());
        writer.write_data(&data).await.unwrap();
        let encoded = writer.into_inner();

        let mut reader = PktReader::new(encoded.as_slice());
        let Some(Packet::Data(first)) = reader.read_packet().await.unwrap() else {
            panic!("expected data packet");
        };
        let Some(Packet::Data(second)) = reader.read_packet().await.unwrap() else {
            panic!("expected data packet");
        };
        assert_eq!(first.len(), MAX_PAYLOAD);
        assert_eq!(second.len(), 10);
        assert_eq!(&encoded[..4], b"fff0");
    }

    #[tokio::test]
    async fn test_rejects_bad_headers() {
        let mut reader = PktReader::new(&b"zzzz"[..]);
        assert!(matches!(
            reader.read_packet().await,
            Err(LfsError::Protocol(_))
        ));

        let mut reader = PktReader::new(&b"0003"[..]);
        assert!(reader.read_packet().await.is_err());

        let mut reader = PktReader::new(&b"00"[..]);
        assert!(reader.read_packet().await.is_err());
    }
}
