//! JSON-RPC framing: line-delimited JSON or LSP `Content-Length` headers,
//! whichever the client sent (so both a bare JSON-RPC client and an
//! LSP-style client can drive the same stdio transport).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Read, Write};

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn ok(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    #[must_use]
    pub fn err(id: Option<Value>, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data }),
        }
    }
}

/// Read one message, returning `(body, was_content_length_framed)`.
///
/// # Errors
/// Propagates the underlying reader's I/O errors.
pub fn read_next_message<R: BufRead + Read>(reader: &mut R) -> io::Result<Option<(String, bool)>> {
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('{') {
            return Ok(Some((trimmed.to_string(), false)));
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("content-length:") {
            let len: usize = trimmed
                .splitn(2, ':')
                .nth(1)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0);
            loop {
                let mut header_line = String::new();
                let header_n = reader.read_line(&mut header_line)?;
                if header_n == 0 || header_line.trim().is_empty() {
                    break;
                }
            }
            if len == 0 {
                continue;
            }
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf)?;
            return Ok(Some((String::from_utf8_lossy(&buf).to_string(), true)));
        }
        continue;
    }
}

/// Write a response using LSP `Content-Length` framing.
///
/// # Errors
/// Propagates the underlying writer's I/O errors.
pub fn write_response_with_length<W: Write>(writer: &mut W, body: &str) -> io::Result<()> {
    let bytes = body.as_bytes();
    write!(writer, "Content-Length: {}\r\n\r\n", bytes.len())?;
    writer.write_all(bytes)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Write a response as a bare line-delimited JSON message.
///
/// # Errors
/// Propagates the underlying writer's I/O errors.
pub fn write_response_line<W: Write>(writer: &mut W, body: &str) -> io::Result<()> {
    writeln!(writer, "{body}")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_a_bare_json_line() {
        let mut cursor = Cursor::new(b"{\"jsonrpc\":\"2.0\"}\n".to_vec());
        let (body, is_lsp) = read_next_message(&mut cursor).unwrap().unwrap();
        assert!(!is_lsp);
        assert_eq!(body, "{\"jsonrpc\":\"2.0\"}");
    }

    #[test]
    fn reads_content_length_framed_message() {
        let payload = "{\"jsonrpc\":\"2.0\"}";
        let framed = format!("Content-Length: {}\r\n\r\n{payload}", payload.len());
        let mut cursor = Cursor::new(framed.into_bytes());
        let (body, is_lsp) = read_next_message(&mut cursor).unwrap().unwrap();
        assert!(is_lsp);
        assert_eq!(body, payload);
    }

    #[test]
    fn returns_none_at_eof() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_next_message(&mut cursor).unwrap().is_none());
    }
}
