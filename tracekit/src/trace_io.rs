//! Trace input/output
//!
//! The production binary trace codec lives outside this crate. What the
//! engines need from it is small: a forward-only stream of
//! [`InstructionEvent`]s that can start mid-trace, and an append-only sink for
//! rewritten events. This module defines that contract and provides a JSON
//! Lines implementation (one serialized event per line) used by the CLI and
//! the test fixtures.
//!
//! # Performance
//!
//! - `TraceReader::next()`: one line read + one `serde_json` parse, reusing a
//!   single line buffer for the whole run
//! - Memory: O(1) in trace length

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::warn;
use tracekit_common::InstructionEvent;

use crate::domain::TraceError;

/// Path that selects stdin/stdout instead of a file
pub const STDIO_PATH: &str = "-";

// =============================================================================
// OUTPUT SINK
// =============================================================================

/// Append-only destination for instruction events
///
/// Implementations must preserve write order.
pub trait TraceSink {
    /// Append one event to the trace being built
    ///
    /// # Errors
    /// Returns an error if the underlying writer fails.
    fn append(&mut self, event: &InstructionEvent) -> Result<(), TraceError>;
}

impl TraceSink for Vec<InstructionEvent> {
    fn append(&mut self, event: &InstructionEvent) -> Result<(), TraceError> {
        self.push(event.clone());
        Ok(())
    }
}

impl<S: TraceSink + ?Sized> TraceSink for &mut S {
    fn append(&mut self, event: &InstructionEvent) -> Result<(), TraceError> {
        (**self).append(event)
    }
}

/// Returns true if `path` names stdout/stdin rather than a file
#[must_use]
pub fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO_PATH
}

/// Open an output destination, treating `-` as stdout
///
/// # Errors
/// Returns an error if the file cannot be created.
pub fn open_output(path: &Path) -> io::Result<Box<dyn Write>> {
    if is_stdio(path) {
        Ok(Box::new(BufWriter::new(io::stdout())))
    } else {
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }
}

// =============================================================================
// JSON LINES WRITER
// =============================================================================

/// Writes events as JSON Lines
pub struct TraceWriter<W: Write> {
    writer: W,
    written: u64,
}

impl TraceWriter<Box<dyn Write>> {
    /// Create a writer for `path` (`-` writes to stdout)
    ///
    /// # Errors
    /// Returns an error if the output file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        Ok(Self::new(open_output(path.as_ref())?))
    }
}

impl<W: Write> TraceWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of events written so far
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush buffered output and hand back the underlying writer
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn finish(mut self) -> Result<W, TraceError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> TraceSink for TraceWriter<W> {
    fn append(&mut self, event: &InstructionEvent) -> Result<(), TraceError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }
}

// =============================================================================
// JSON LINES READER
// =============================================================================

/// Forward-only reader over a JSON Lines trace
///
/// Yields `Result<InstructionEvent, TraceError>`; a malformed line is
/// reported with its line number and ends nothing by itself, the caller
/// decides whether to keep iterating.
pub struct TraceReader<R: BufRead> {
    reader: R,
    line: String,
    line_no: u64,
    /// Malformed lines passed over by `seek_to_index`
    skipped_malformed: u64,
    /// Event consumed by `seek_to_index` that still has to be yielded
    pending: Option<InstructionEvent>,
}

impl TraceReader<BufReader<File>> {
    /// Open a trace file
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: String::new(), line_no: 0, skipped_malformed: 0, pending: None }
    }

    /// Malformed lines dropped while seeking
    #[must_use]
    pub fn skipped_malformed(&self) -> u64 {
        self.skipped_malformed
    }

    /// Advance so the next event yielded is the first with `index >= target`
    ///
    /// # Errors
    /// Returns [`TraceError::SeekPastEnd`] if the trace ends first, or any
    /// read error encountered while skipping. Malformed lines are logged,
    /// counted in [`Self::skipped_malformed`] and passed over.
    pub fn seek_to_index(&mut self, target: u64) -> Result<(), TraceError> {
        if let Some(pending) = &self.pending {
            if pending.index >= target {
                return Ok(());
            }
            self.pending = None;
        }

        loop {
            match self.read_event() {
                Ok(Some(event)) if event.index >= target => {
                    self.pending = Some(event);
                    return Ok(());
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(TraceError::MalformedRecord { line, source }) => {
                    warn!("skipping malformed trace record on line {line}: {source}");
                    self.skipped_malformed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Err(TraceError::SeekPastEnd(target))
    }

    fn read_event(&mut self) -> Result<Option<InstructionEvent>, TraceError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }

            return serde_json::from_str(text)
                .map(Some)
                .map_err(|source| TraceError::MalformedRecord { line: self.line_no, source });
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<InstructionEvent, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.pending.take() {
            return Some(Ok(event));
        }
        self.read_event().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tracekit_common::{MemoryAccess, OpcodeSize};

    fn trace_text() -> &'static str {
        r#"{"index":1,"pc":256,"opcode":19}

{"index":2,"pc":260,"opcode":8195,"memory_reads":[{"address":8192,"size":4}]}
{"index":3,"pc":264,"opcode":1,"size":"compressed"}
"#
    }

    #[test]
    fn test_reader_parses_events_and_skips_blank_lines() {
        let events: Vec<_> = TraceReader::new(Cursor::new(trace_text()))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].pc, 0x100);
        assert!(events[0].valid, "missing fields take defaults");
        assert_eq!(events[1].memory_reads, vec![MemoryAccess::new(0x2000, 4)]);
        assert_eq!(events[2].size, OpcodeSize::Compressed);
    }

    #[test]
    fn test_reader_reports_line_of_malformed_record() {
        let text = "{\"index\":1,\"pc\":0,\"opcode\":0}\nnot json\n";
        let mut reader = TraceReader::new(Cursor::new(text));
        assert!(reader.next().unwrap().is_ok());
        match reader.next().unwrap() {
            Err(TraceError::MalformedRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed record, got {other:?}"),
        }
    }

    #[test]
    fn test_seek_to_index_yields_target_first() {
        let mut reader = TraceReader::new(Cursor::new(trace_text()));
        reader.seek_to_index(2).unwrap();
        let next = reader.next().unwrap().unwrap();
        assert_eq!(next.index, 2);
        assert_eq!(reader.next().unwrap().unwrap().index, 3);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_seek_passes_over_malformed_line() {
        let text = "{\"index\":1,\"pc\":0,\"opcode\":19}\nnot json\n\
                    {\"index\":2,\"pc\":4,\"opcode\":19}\n{\"index\":3,\"pc\":8,\"opcode\":19}\n";
        let mut reader = TraceReader::new(Cursor::new(text));
        reader.seek_to_index(3).unwrap();

        assert_eq!(reader.skipped_malformed(), 1);
        assert_eq!(reader.next().unwrap().unwrap().index, 3);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_seek_past_end_fails() {
        let mut reader = TraceReader::new(Cursor::new(trace_text()));
        assert!(matches!(reader.seek_to_index(10), Err(TraceError::SeekPastEnd(10))));
    }

    #[test]
    fn test_writer_output_reads_back() {
        let mut writer = TraceWriter::new(Vec::new());
        let event = InstructionEvent::new(7, 0x400, 0x13);
        writer.append(&event).unwrap();
        assert_eq!(writer.written(), 1);
        let bytes = writer.finish().unwrap();

        let back: Vec<_> = TraceReader::new(Cursor::new(bytes)).collect::<Result<_, _>>().unwrap();
        assert_eq!(back, vec![event]);
    }
}
