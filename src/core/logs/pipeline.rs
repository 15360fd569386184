//! Line source → finalized event stream.

use std::io::BufRead;

use tracing::{debug, info};

use super::extractor::{EventExtractor, Extraction, ExtractionStats};
use super::record::TrafficEvent;
use super::sequence::SequenceBuilder;

/// Lines between progress reports.
pub const PROGRESS_INTERVAL: usize = 500_000;

/// Output of one extraction run.
#[derive(Debug)]
pub struct ExtractedStream {
    pub events: Vec<TrafficEvent>,
    pub stats: ExtractionStats,
}

/// Extract and finalize every event from a stream of raw lines.
///
/// Buffers the full event list of the source before sequencing it.
pub fn extract_lines<I, S>(extractor: &EventExtractor, lines: I) -> ExtractedStream
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut stats = ExtractionStats::default();
    let mut builder = SequenceBuilder::new();

    for line in lines {
        stats.lines_read += 1;
        if stats.lines_read % PROGRESS_INTERVAL == 0 {
            info!(
                lines = stats.lines_read,
                events = builder.len(),
                "Extraction progress"
            );
        }

        match extractor.extract(line.as_ref()) {
            Ok(Extraction::Event(event)) => {
                stats.record_event(&event);
                builder.push(event);
            }
            Ok(Extraction::Skipped(reason)) => stats.record_skip(reason),
            Err(e) => {
                debug!(line = stats.lines_read, error = %e, "Discarding malformed line");
                stats.malformed += 1;
            }
        }
    }

    info!(
        events = builder.len(),
        profile = %extractor.profile(),
        "Collected events, computing delays"
    );

    ExtractedStream {
        events: builder.build(),
        stats,
    }
}

/// Lines of a buffered reader, decoded lossily.
///
/// Invalid UTF-8 is replaced instead of failing the line, and the trailing
/// `\n` or `\r\n` is stripped. Only read errors are surfaced.
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = std::io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                let mut line = self.buf.as_slice();
                if let Some(rest) = line.strip_suffix(b"\n") {
                    line = rest.strip_suffix(b"\r").unwrap_or(rest);
                }
                Some(Ok(String::from_utf8_lossy(line).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Same as [`extract_lines`] over a buffered reader, one line at a time.
/// Undecodable bytes are replaced rather than aborting the run.
pub fn extract_reader<R: BufRead>(
    extractor: &EventExtractor,
    reader: R,
) -> std::io::Result<ExtractedStream> {
    let mut failure = None;
    let lines = LossyLines::new(reader).map_while(|line| match line {
        Ok(line) => Some(line),
        Err(e) => {
            failure = Some(e);
            None
        }
    });
    let stream = extract_lines(extractor, lines);
    match failure {
        Some(e) => Err(e),
        None => Ok(stream),
    }
}
