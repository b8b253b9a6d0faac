//! MCP Transport Layer
//!
//! Newline-delimited JSON-RPC over any async byte stream; stdio in
//! production, in-memory buffers in tests.

use super::protocol::JsonRpcResponse;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// One JSON message per line in, one per line out
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

/// The transport used when the server runs over stdio
pub type StdioTransport = LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

/// Transport over the process's stdin and stdout
pub fn stdio() -> StdioTransport {
    LineTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Next non-blank line, or `None` once the peer closes the stream
    pub async fn read_message(&mut self) -> io::Result<Option<String>> {
        loop {
            let mut line = String::new();
            let bytes_read = self.reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                return Ok(None); // EOF
            }

            let line = line.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }

    /// Write a JSON-RPC response followed by a newline
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Give back the writer, e.g. to inspect what a test session produced
    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::JsonRpcError;

    #[tokio::test]
    async fn test_reads_lines_and_skips_blanks() {
        let input: &[u8] = b"{\"a\":1}\n\n   \n{\"b\":2}\n";
        let mut transport = LineTransport::new(input, Vec::new());

        assert_eq!(transport.read_message().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(transport.read_message().await.unwrap().as_deref(), Some("{\"b\":2}"));
        assert_eq!(transport.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let input: &[u8] = b"{\"a\":1}";
        let mut transport = LineTransport::new(input, Vec::new());
        assert!(transport.read_message().await.unwrap().is_some());
        assert!(transport.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_response_is_one_line() {
        let input: &[u8] = b"";
        let mut transport = LineTransport::new(input, Vec::new());
        let response = JsonRpcResponse::error(
            Some(serde_json::json!(1)),
            JsonRpcError::method_not_found("unknown"),
        );
        transport.write_response(&response).await.unwrap();

        let written = String::from_utf8(transport.into_writer()).unwrap();
        assert!(written.ends_with('\n'));
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains("-32601"));
    }
}
