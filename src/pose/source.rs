//! JSON-lines landmark frames produced by an external pose detector.
//!
//! One frame per line: `null` for "no detection", otherwise
//! `{"landmarks": [[x, y, visibility], ...]}`. Points may also be written as
//! `{"x": .., "y": .., "visibility": ..}`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::warn;

use super::landmark::{Landmark, Landmarks};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointRecord {
    Tuple([f64; 3]),
    Object {
        x: f64,
        y: f64,
        #[serde(default = "default_visibility")]
        visibility: f64,
    },
}

fn default_visibility() -> f64 {
    1.0
}

impl From<&PointRecord> for Landmark {
    fn from(p: &PointRecord) -> Self {
        match *p {
            PointRecord::Tuple([x, y, v]) => Landmark::new(x, y, v),
            PointRecord::Object { x, y, visibility } => Landmark::new(x, y, visibility),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
    landmarks: Vec<PointRecord>,
}

/// One tick of detector output
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Detected(Landmarks),
    Empty,
}

impl Frame {
    pub fn landmarks(&self) -> Option<&Landmarks> {
        match self {
            Frame::Detected(l) => Some(l),
            Frame::Empty => None,
        }
    }
}

/// Parse a single JSON line. Malformed input yields `Frame::Empty`.
pub fn parse_frame(line: &str) -> Frame {
    match serde_json::from_str::<Option<FrameRecord>>(line) {
        Ok(Some(record)) if !record.landmarks.is_empty() => {
            let points: Vec<Landmark> = record.landmarks.iter().map(Landmark::from).collect();
            Frame::Detected(Landmarks::from_slice(&points))
        }
        Ok(_) => Frame::Empty,
        Err(e) => {
            warn!("Discarding malformed landmark frame: {}", e);
            Frame::Empty
        }
    }
}

pub struct FrameSource<R> {
    reader: R,
    line: Vec<u8>,
    frames_read: u64,
}

impl FrameSource<Box<dyn BufRead>> {
    /// Read from a file, or from stdin when `path` is `None` or `-`
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let reader: Box<dyn BufRead> = match path {
            Some(p) if p != Path::new("-") => {
                let file = File::open(p)
                    .with_context(|| format!("Failed to open landmark stream {}", p.display()))?;
                Box::new(BufReader::new(file))
            }
            _ => Box::new(BufReader::new(io::stdin())),
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> FrameSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            frames_read: 0,
        }
    }

    /// Next frame, or `None` at end of stream. Blank lines are skipped and
    /// lines that are not valid UTF-8 count as a frame without detection.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.line)
                .context("Failed to read landmark stream")?;
            if n == 0 {
                return Ok(None);
            }
            let text = match std::str::from_utf8(&self.line) {
                Ok(text) => text.trim(),
                Err(e) => {
                    self.frames_read += 1;
                    warn!("Discarding landmark frame that is not UTF-8: {}", e);
                    return Ok(Some(Frame::Empty));
                }
            };
            if text.is_empty() {
                continue;
            }
            self.frames_read += 1;
            return Ok(Some(parse_frame(text)));
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}
