//! Incremental detection of JSON objects embedded in streamed text.
//!
//! Models without native tool calling are prompted to write calls as JSON
//! inside their reply. The extractor scans the text as it arrives and splits
//! it into plain-text runs and complete JSON objects, without waiting for the
//! stream to end.
//!
//! Scanning rules:
//! - A candidate opens at `{` and closes when brace depth returns to zero
//!   outside a string. String and escape state is tracked only inside a
//!   candidate, so quotes in prose never confuse the scanner.
//! - The top level of a candidate must keep looking like an object: `{`
//!   followed by `"key":` pairs separated by commas. The first byte that
//!   breaks that shape demotes the candidate on the spot, so a stray `{` in
//!   prose holds text back for a few bytes at most.
//! - A candidate longer than [`MAX_CANDIDATE_BYTES`] is demoted too. This also
//!   bounds how much text a demotion rescans.
//! - A closed candidate that fails to parse is demoted: its `{` becomes plain
//!   text and scanning resumes right after it.
//! - At [`JsonExtractor::finish`] an unterminated candidate is demoted the same
//!   way.

use std::collections::VecDeque;

use serde_json::Value;

/// A complete JSON object found in the text.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonMatch {
    /// The object's source text.
    pub raw: String,
    /// Byte offset of the opening brace in the accumulated text.
    pub start: usize,
    /// Byte offset just past the closing brace.
    pub end: usize,
    /// Parsed object.
    pub value: Value,
}

/// A classified piece of the text, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Text that is not part of any JSON object.
    Text(String),
    /// A complete JSON object.
    Json(JsonMatch),
}

/// Longest candidate the scanner will hold open before giving up on it.
pub const MAX_CANDIDATE_BYTES: usize = 64 * 1024;

/// What the top level of a candidate object expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Just after `{`: a key or `}`.
    Open,
    /// After a `,`: a key.
    Key,
    /// Inside a key string.
    KeyString,
    /// After a key: `:`.
    Colon,
    /// Inside a value.
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Close,
    Reject,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    start: usize,
    depth: usize,
    brackets: usize,
    in_string: bool,
    escaped: bool,
    shape: Shape,
}

impl Candidate {
    fn open(start: usize) -> Self {
        Self {
            start,
            depth: 1,
            brackets: 0,
            in_string: false,
            escaped: false,
            shape: Shape::Open,
        }
    }

    fn step(&mut self, byte: u8) -> Step {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
                if self.shape == Shape::KeyString {
                    self.shape = Shape::Colon;
                }
            }
            return Step::Continue;
        }

        let top_level = self.depth == 1 && self.brackets == 0;
        if top_level && self.shape != Shape::Value {
            if byte.is_ascii_whitespace() {
                return Step::Continue;
            }
            return match (self.shape, byte) {
                (Shape::Open | Shape::Key, b'"') => {
                    self.in_string = true;
                    self.shape = Shape::KeyString;
                    Step::Continue
                }
                (Shape::Open, b'}') => {
                    self.depth = 0;
                    Step::Close
                }
                (Shape::Colon, b':') => {
                    self.shape = Shape::Value;
                    Step::Continue
                }
                _ => Step::Reject,
            };
        }

        match byte {
            b'"' => self.in_string = true,
            b'[' => self.brackets += 1,
            b']' => self.brackets = self.brackets.saturating_sub(1),
            b'{' => self.depth += 1,
            b',' if top_level => self.shape = Shape::Key,
            b'}' => {
                self.depth -= 1;
                if self.depth == 0 {
                    return Step::Close;
                }
            }
            _ => {}
        }
        Step::Continue
    }
}

/// Streaming JSON object extractor.
#[derive(Debug, Default)]
pub struct JsonExtractor {
    text: String,
    cursor: usize,
    released: usize,
    candidate: Option<Candidate>,
    matches: Vec<JsonMatch>,
    ready: VecDeque<Segment>,
}

impl JsonExtractor {
    /// Create an empty extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of text.
    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.advance();
    }

    /// Mark the end of the text. Any open candidate becomes plain text.
    pub fn finish(&mut self) {
        while let Some(candidate) = self.candidate {
            self.demote(candidate.start, "unterminated");
            self.advance();
        }
        self.release(self.text.len());
    }

    /// Matches found so far, in order. Each call starts from the first.
    pub fn matches(&self) -> impl Iterator<Item = &JsonMatch> {
        self.matches.iter()
    }

    /// Drain classified segments, in stream order.
    pub fn take_segments(&mut self) -> Vec<Segment> {
        self.ready.drain(..).collect()
    }

    /// Drain classified plain text. Matches stay available through
    /// [`matches`](Self::matches).
    pub fn take_plain_text(&mut self) -> String {
        self.ready
            .drain(..)
            .filter_map(|segment| match segment {
                Segment::Text(text) => Some(text),
                Segment::Json(_) => None,
            })
            .collect()
    }

    /// Whether a candidate is open (text is being withheld).
    pub fn is_pending(&self) -> bool {
        self.candidate.is_some()
    }

    fn advance(&mut self) {
        while self.cursor < self.text.len() {
            let byte = self.text.as_bytes()[self.cursor];
            self.cursor += 1;

            let Some(candidate) = self.candidate.as_mut() else {
                if byte == b'{' {
                    let start = self.cursor - 1;
                    self.release(start);
                    self.candidate = Some(Candidate::open(start));
                }
                continue;
            };

            let start = candidate.start;
            match candidate.step(byte) {
                Step::Close => self.close(start, self.cursor),
                Step::Reject => self.demote(start, "not an object"),
                Step::Continue if self.cursor - start > MAX_CANDIDATE_BYTES => {
                    self.demote(start, "candidate too long");
                }
                Step::Continue => {}
            }
        }

        if self.candidate.is_none() {
            self.release(self.cursor);
        }
    }

    fn close(&mut self, start: usize, end: usize) {
        self.candidate = None;
        let raw = &self.text[start..end];
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => {
                let found = JsonMatch {
                    raw: raw.to_string(),
                    start,
                    end,
                    value,
                };
                self.ready.push_back(Segment::Json(found.clone()));
                self.matches.push(found);
                self.released = end;
            }
            Err(e) => {
                tracing::trace!(offset = start, error = %e, "brace region is not JSON");
                self.cursor = start + 1;
            }
        }
    }

    /// Give up on the candidate at `start`; its `{` becomes plain text.
    fn demote(&mut self, start: usize, reason: &str) {
        tracing::trace!(offset = start, reason, "JSON candidate demoted");
        self.candidate = None;
        self.cursor = start + 1;
    }

    /// Move `released..upto` into the ready queue as plain text.
    fn release(&mut self, upto: usize) {
        if upto <= self.released {
            return;
        }
        let text = &self.text[self.released..upto];
        match self.ready.back_mut() {
            Some(Segment::Text(last)) => last.push_str(text),
            _ => self.ready.push_back(Segment::Text(text.to_string())),
        }
        self.released = upto;
    }
}
