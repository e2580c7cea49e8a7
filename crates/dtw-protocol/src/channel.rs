//! Request/response channel.
//!
//! Frames a pair of byte streams into one JSON object per line. Reading
//! is blocking; writing flushes after every response because the driver
//! waits for exactly one line per request.

use std::io::{BufRead, Write};

use crate::error::ProtocolError;
use crate::request::WorkRequest;
use crate::response::WorkResponse;

/// Reads work requests, one per line.
pub struct RequestReader<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: BufRead> RequestReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
        }
    }

    /// Read the next request.
    ///
    /// Returns `Ok(None)` at end of stream. A line that does not decode is
    /// reported as [`ProtocolError::Malformed`]; the reader stays positioned
    /// after that line, so the caller may answer it and keep reading.
    pub fn receive(&mut self) -> Result<Option<WorkRequest>, ProtocolError> {
        self.buffer.clear();
        let read = self.reader.read_until(b'\n', &mut self.buffer)?;
        if read == 0 {
            return Ok(None);
        }

        let line = trim_line_ending(&self.buffer);
        match serde_json::from_slice::<WorkRequest>(line) {
            Ok(request) => Ok(Some(request)),
            Err(e) => Err(ProtocolError::Malformed {
                request_id: salvage_request_id(line),
                message: e.to_string(),
                line: String::from_utf8_lossy(line).into_owned(),
            }),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes work responses, one per line.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize `response` as a single line and flush.
    pub fn send(&mut self, response: &WorkResponse) -> Result<(), ProtocolError> {
        // serde_json escapes control characters, so the encoded object never
        // contains a raw newline.
        let json = serde_json::to_string(response)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Recover an integer `requestId` from a line that is valid JSON but not a
/// valid request, so the error response still pairs with its request.
fn salvage_request_id(line: &[u8]) -> i64 {
    serde_json::from_slice::<serde_json::Value>(line)
        .ok()
        .and_then(|value| value.get("requestId").and_then(serde_json::Value::as_i64))
        .unwrap_or(0)
}
