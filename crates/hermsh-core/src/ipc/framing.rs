//! Message framing: newline-delimited with a length-declared escape.
//!
//! A single-line message is written as `<msg>\n`. A message containing
//! newlines is written as `LEN:<byte-count>\n<bytes>`. Frames larger than
//! [`MAX_FRAME_BYTES`] are refused in both directions — the middleware
//! maps that refusal to `blocked:oversize`.

use std::io::{BufRead, Write};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};

/// Upper bound on a single frame. Replies beyond this are policy-rejected.
pub const MAX_FRAME_BYTES: usize = 256 * 1024;

const LEN_PREFIX: &str = "LEN:";

/// Errors from reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    Oversize { len: usize, max: usize },

    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl FrameError {
    /// Whether this error is the size-limit refusal.
    pub fn is_oversize(&self) -> bool {
        matches!(self, FrameError::Oversize { .. })
    }
}

// ── Synchronous (front end) ─────────────────────────────────────────────

/// Write one message.
pub fn write_frame<W: Write>(writer: &mut W, msg: &str) -> Result<(), FrameError> {
    check_size(msg.len())?;
    if msg.contains('\n') {
        write!(writer, "{LEN_PREFIX}{}\n{msg}", msg.len())?;
    } else {
        writeln!(writer, "{msg}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read one message. Returns `None` on a clean EOF before any bytes.
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Option<String>, FrameError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    strip_newline(&mut line);
    check_size(line.len())?;

    let Some(len) = line.strip_prefix(LEN_PREFIX) else {
        return Ok(Some(line));
    };
    let len = parse_len(len)?;
    let mut buf = vec![0u8; len];
    std::io::Read::read_exact(reader, &mut buf)?;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

// ── Asynchronous (daemons) ──────────────────────────────────────────────

/// Write one message to an async writer.
pub async fn write_frame_async<W>(writer: &mut W, msg: &str) -> Result<(), FrameError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    check_size(msg.len())?;
    let encoded = if msg.contains('\n') {
        format!("{LEN_PREFIX}{}\n{msg}", msg.len())
    } else {
        format!("{msg}\n")
    };
    writer.write_all(encoded.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message from an async reader. Returns `None` on a clean EOF.
pub async fn read_frame_async<R>(reader: &mut R) -> Result<Option<String>, FrameError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    strip_newline(&mut line);
    check_size(line.len())?;

    let Some(len) = line.strip_prefix(LEN_PREFIX) else {
        return Ok(Some(line));
    };
    let len = parse_len(len)?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

// ── Shared helpers ──────────────────────────────────────────────────────

fn check_size(len: usize) -> Result<(), FrameError> {
    if len > MAX_FRAME_BYTES {
        return Err(FrameError::Oversize {
            len,
            max: MAX_FRAME_BYTES,
        });
    }
    Ok(())
}

fn parse_len(s: &str) -> Result<usize, FrameError> {
    let len = s
        .parse::<usize>()
        .map_err(|_| FrameError::Malformed(format!("bad length declaration {s:?}")))?;
    check_size(len)?;
    Ok(len)
}

fn strip_newline(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(msg: &str) -> String {
        let mut buf = Vec::new();
        write_frame(&mut buf, msg).unwrap();
        let mut cursor = Cursor::new(buf);
        read_frame(&mut cursor).unwrap().unwrap()
    }

    #[test]
    fn test_single_line_frame() {
        assert_eq!(roundtrip("STATUS"), "STATUS");
        assert_eq!(roundtrip("QUERY:please list the pods"), "QUERY:please list the pods");
    }

    #[test]
    fn test_multiline_frame_uses_length_declaration() {
        let msg = "edit:first line\nsecond line\n";
        let mut buf = Vec::new();
        write_frame(&mut buf, msg).unwrap();
        assert!(buf.starts_with(b"LEN:"));
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), msg);
    }

    #[test]
    fn test_eof_returns_none() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_two_messages_in_sequence() {
        let mut buf = Vec::new();
        write_frame(&mut buf, "OK").unwrap();
        write_frame(&mut buf, "a\nb").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), "OK");
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), "a\nb");
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_oversize_write_refused() {
        let huge = "x".repeat(MAX_FRAME_BYTES + 1);
        let mut buf = Vec::new();
        assert!(write_frame(&mut buf, &huge).unwrap_err().is_oversize());
    }

    #[test]
    fn test_oversize_declaration_refused() {
        let mut cursor = Cursor::new(format!("LEN:{}\n", MAX_FRAME_BYTES + 1).into_bytes());
        assert!(read_frame(&mut cursor).unwrap_err().is_oversize());
    }

    #[test]
    fn test_bad_length_declaration() {
        let mut cursor = Cursor::new(b"LEN:banana\n".to_vec());
        assert!(matches!(
            read_frame(&mut cursor),
            Err(FrameError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let mut buf = Vec::new();
        write_frame_async(&mut buf, "cmd:ls -la").await.unwrap();
        write_frame_async(&mut buf, "edit:a\nb").await.unwrap();

        let mut reader = tokio::io::BufReader::new(std::io::Cursor::new(buf));
        assert_eq!(
            read_frame_async(&mut reader).await.unwrap().unwrap(),
            "cmd:ls -la"
        );
        assert_eq!(
            read_frame_async(&mut reader).await.unwrap().unwrap(),
            "edit:a\nb"
        );
        assert!(read_frame_async(&mut reader).await.unwrap().is_none());
    }
}
