//! Record output in JSON or JSON Lines.
//!
//! Records are written as they are produced. In JSON mode the writer emits
//! one array, opened by the first record and closed by [`OutputWriter::finish`].

use serde::Serialize;
use std::io::{self, Write};

use crate::types::{ImageFormat, RequestEncoding, WireRequest};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// A single JSON array
    Json,
    /// One JSON object per line
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Streaming record writer.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    records_written: usize,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            records_written: 0,
        }
    }

    /// Write one record.
    pub fn write<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        if self.format == OutputFormat::Json {
            let separator = if self.records_written == 0 { "[\n" } else { ",\n" };
            self.writer.write_all(separator.as_bytes())?;
            serde_json::to_writer_pretty(&mut self.writer, record).map_err(io::Error::other)?;
        } else {
            serde_json::to_writer(&mut self.writer, record).map_err(io::Error::other)?;
            writeln!(self.writer)?;
        }
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Close the JSON array (if any), flush, and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.format == OutputFormat::Json {
            let closing = if self.records_written == 0 { "[]\n" } else { "\n]\n" };
            self.writer.write_all(closing.as_bytes())?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// What one wire request carries, without the payload bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    pub deployment_id: String,
    pub affiliate: String,
    pub correlation_id: String,
    pub total_bytes: usize,
    pub inputs: Vec<InputSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSummary {
    pub correlation_id: String,
    pub format: ImageFormat,
    pub encoding: RequestEncoding,
    pub bytes: usize,
    /// Recorded content hashes, original first
    pub hashes: Vec<String>,
}

impl From<&WireRequest> for RequestSummary {
    fn from(request: &WireRequest) -> Self {
        let inputs: Vec<InputSummary> = request
            .inputs
            .iter()
            .map(|input| InputSummary {
                correlation_id: input.correlation_id.clone(),
                format: input.format,
                encoding: input.encoding,
                bytes: input.data.len(),
                hashes: input.hashes.iter().map(|hash| hash.value.clone()).collect(),
            })
            .collect();
        Self {
            deployment_id: request.deployment_id.clone(),
            affiliate: request.affiliate.clone(),
            correlation_id: request.correlation_id.clone(),
            total_bytes: inputs.iter().map(|i| i.bytes).sum(),
            inputs,
        }
    }
}
