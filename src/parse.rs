//! Single-pass dotted-decimal parser.
//!
//! Every byte advances a small per-line state machine; nothing is buffered and
//! nothing is re-read. A line is only judged when its `\n` arrives (or when
//! the caller declares the input finished), and a bad line never stops the scan.

/// Longest accepted line, counting digits and dots.
pub const MAX_LINE_LEN: u8 = 19;

const MAX_OCTET_DIGITS: u8 = 3;

/// Digit-run and dot-run boundaries in `d.d.d.d`: four digit groups, three dots.
const FIELD_TRANSITIONS: u8 = 7;

/// Outcome of one line.
///
/// `start` is the position of the line's first byte, counted from the first
/// byte ever pushed into the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Address(u32),
    Invalid { start: usize },
}

/// Per-line accumulator, owned by exactly one worker.
#[derive(Debug)]
pub struct LineParser {
    ip: u32,
    octet: u32,
    octet_digits: u8,
    line_len: u8,
    in_digits: bool,
    transitions: u8,
    valid: bool,
    line_start: usize,
    consumed: usize,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    pub fn new() -> Self {
        Self {
            ip: 0,
            octet: 0,
            octet_digits: 0,
            line_len: 0,
            in_digits: false,
            transitions: 0,
            valid: true,
            line_start: 0,
            consumed: 0,
        }
    }

    /// Feeds `data`, reporting every line terminated inside it.
    ///
    /// A trailing partial line stays pending and continues with the next call.
    pub fn push(&mut self, data: &[u8], on_line: &mut impl FnMut(Line)) {
        for (i, &b) in data.iter().enumerate() {
            match b {
                b'0'..=b'9' => {
                    self.octet = self.octet.wrapping_mul(10).wrapping_add((b - b'0') as u32);
                    self.octet_digits = self.octet_digits.saturating_add(1);
                    self.line_len = self.line_len.saturating_add(1);
                    if !self.in_digits {
                        self.in_digits = true;
                        self.transitions = self.transitions.saturating_add(1);
                    }
                }
                b'.' => {
                    // an empty octet would shift an extra byte through `ip`
                    if self.octet > 255
                        || self.octet_digits > MAX_OCTET_DIGITS
                        || self.octet_digits == 0
                    {
                        self.valid = false;
                    }
                    self.ip = (self.ip << 8) | (self.octet & 0xff);
                    self.octet = 0;
                    self.octet_digits = 0;
                    self.line_len = self.line_len.saturating_add(1);
                    if self.in_digits {
                        self.in_digits = false;
                        self.transitions = self.transitions.saturating_add(1);
                    }
                }
                b'\n' => {
                    on_line(self.end_line());
                    self.line_start = self.consumed + i + 1;
                }
                _ => self.valid = false,
            }
        }
        self.consumed += data.len();
    }

    /// Judges a pending unterminated line as if a `\n` followed it.
    ///
    /// Used for the last line of the input when it lacks a trailing newline.
    pub fn finish(&mut self, on_line: &mut impl FnMut(Line)) {
        if self.has_pending() {
            on_line(self.end_line());
            self.line_start = self.consumed;
        }
    }

    /// Drops a pending unterminated line, reporting it as invalid.
    ///
    /// Used when a line runs past the end of the bytes a worker can see.
    pub fn discard(&mut self, on_line: &mut impl FnMut(Line)) {
        if self.has_pending() {
            on_line(Line::Invalid {
                start: self.line_start,
            });
            self.reset();
            self.line_start = self.consumed;
        }
    }

    fn has_pending(&self) -> bool {
        self.line_start < self.consumed
    }

    fn end_line(&mut self) -> Line {
        let valid = self.valid
            && self.octet <= 255
            && self.octet_digits <= MAX_OCTET_DIGITS
            && self.transitions == FIELD_TRANSITIONS
            && self.line_len <= MAX_LINE_LEN;
        let line = if valid {
            Line::Address((self.ip << 8) | self.octet)
        } else {
            Line::Invalid {
                start: self.line_start,
            }
        };
        self.reset();
        line
    }

    fn reset(&mut self) {
        self.ip = 0;
        self.octet = 0;
        self.octet_digits = 0;
        self.line_len = 0;
        self.in_digits = false;
        self.transitions = 0;
        self.valid = true;
    }
}
