//! Line cursor over RESP text with one line of lookahead.

use crate::error::{RespError, Result};
use regex::Regex;
use std::iter::Enumerate;
use std::str::Lines;
use std::sync::LazyLock;

static PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^B(\d{3})F(\d{2})(?:-(\d{2}))?$").expect("valid regex"));

/// One record line, `BxxxFyy label: value` or `BxxxFyy-zz v v v`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Line<'a> {
    pub number: usize,
    pub text: &'a str,
    pub blockette: u32,
    pub field: u32,
    /// Last field of a `Fyy-zz` range
    pub last_field: Option<u32>,
    rest: &'a str,
}

impl<'a> Line<'a> {
    /// Splits a non-empty, non-comment line into its prefix and body.
    fn parse(number: usize, text: &'a str) -> Result<Self> {
        let (prefix, rest) = match text.find(char::is_whitespace) {
            Some(idx) => (&text[..idx], &text[idx..]),
            None => (text, ""),
        };
        let caps = PREFIX.captures(prefix).ok_or_else(|| RespError::Parse {
            line: number,
            blockette: 0,
            field: 0,
            text: text.to_string(),
            message: "malformed record prefix, expected BxxxFyy".to_string(),
        })?;
        // the pattern only captures ASCII digits, so these parses cannot fail
        let blockette = caps[1].parse().unwrap_or_default();
        let field = caps[2].parse().unwrap_or_default();
        let last_field = caps.get(3).and_then(|m| m.as_str().parse().ok());
        Ok(Self {
            number,
            text,
            blockette,
            field,
            last_field,
            rest,
        })
    }

    pub fn is(&self, blockette: u32, field: u32) -> bool {
        self.blockette == blockette && self.field == field
    }

    /// Text after the first ':' with surrounding blanks removed.
    pub fn value(&self) -> Result<&'a str> {
        match self.rest.find(':') {
            Some(idx) => Ok(self.rest[idx + 1..].trim()),
            None => Err(self.error("missing ':' separator")),
        }
    }

    /// First whitespace-separated token of the value.
    pub fn first_value(&self) -> Result<&'a str> {
        let value = self.value()?;
        value
            .split_whitespace()
            .next()
            .ok_or_else(|| self.error("empty value"))
    }

    /// Whitespace-separated tokens following the prefix.
    pub fn tokens(&self) -> Vec<&'a str> {
        self.rest.split_whitespace().collect()
    }

    pub fn float(&self) -> Result<f64> {
        self.parse_float(self.first_value()?)
    }

    pub fn int(&self) -> Result<i64> {
        self.parse_int(self.first_value()?)
    }

    /// A non-negative count or index.
    pub fn count(&self) -> Result<usize> {
        let value = self.int()?;
        usize::try_from(value).map_err(|_| self.error(format!("'{}' is not a valid count", value)))
    }

    pub fn parse_float(&self, token: &str) -> Result<f64> {
        match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(self.error(format!("'{}' is not a number", token))),
        }
    }

    pub fn parse_int(&self, token: &str) -> Result<i64> {
        token
            .parse::<i64>()
            .map_err(|_| self.error(format!("'{}' is not an integer", token)))
    }

    /// Float at `index` in the tuple tokens.
    pub fn token_float(&self, tokens: &[&str], index: usize) -> Result<f64> {
        let token = tokens
            .get(index)
            .ok_or_else(|| self.error(format!("missing value #{}", index + 1)))?;
        self.parse_float(token)
    }

    pub fn error(&self, message: impl Into<String>) -> RespError {
        RespError::Parse {
            line: self.number,
            blockette: self.blockette,
            field: self.field,
            text: self.text.to_string(),
            message: message.into(),
        }
    }
}

/// Reads record lines, skipping blanks and `#` comments.
pub(crate) struct Cursor<'a> {
    lines: Enumerate<Lines<'a>>,
    pending: Option<Line<'a>>,
    last_number: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
            pending: None,
            last_number: 0,
        }
    }

    fn next_raw(&mut self) -> Option<(usize, &'a str)> {
        for (idx, raw) in self.lines.by_ref() {
            let text = raw.trim();
            self.last_number = idx + 1;
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            return Some((idx + 1, text));
        }
        None
    }

    /// Looks at the next record line without consuming it.
    ///
    /// A malformed line is consumed and reported.
    pub fn peek(&mut self) -> Result<Option<Line<'a>>> {
        if self.pending.is_none() {
            if let Some((number, text)) = self.next_raw() {
                self.pending = Some(Line::parse(number, text)?);
            }
        }
        Ok(self.pending)
    }

    pub fn next_line(&mut self) -> Result<Option<Line<'a>>> {
        self.peek()?;
        Ok(self.pending.take())
    }

    /// Consumes the next line, which must carry `(blockette, field)`.
    ///
    /// Scalar lines of the same blockette with a lower field number are
    /// optional labels (names, lookup keys) and are skipped, except the
    /// station line that opens a channel.
    pub fn take(&mut self, blockette: u32, field: u32) -> Result<Line<'a>> {
        loop {
            let line = self.peek()?.ok_or_else(|| self.eof_error(blockette, field))?;
            if line.is(blockette, field) {
                self.pending = None;
                return Ok(line);
            }
            let skippable = line.blockette == blockette
                && line.field < field
                && line.last_field.is_none()
                && !line.is(50, 3);
            if !skippable {
                return Err(line.error(format!(
                    "(record, field) mismatch, expected B{:03}F{:02}",
                    blockette, field
                )));
            }
            log::debug!("skipping optional line {}: '{}'", line.number, line.text);
            self.pending = None;
        }
    }

    /// Reads `count` tuple lines `(blockette, field)` through `decode`.
    ///
    /// A table shorter than declared is reported as a resource error.
    pub fn take_table<T>(
        &mut self,
        blockette: u32,
        field: u32,
        count: usize,
        what: &str,
        mut decode: impl FnMut(&Line<'a>, &[&'a str]) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        rows.try_reserve(count).map_err(|_| RespError::Resource {
            what: what.to_string(),
            count,
        })?;
        for found in 0..count {
            let line = match self.peek()? {
                Some(line) if line.is(blockette, field) => line,
                _ => {
                    return Err(RespError::Resource {
                        what: format!("{} (table truncated after {} rows)", what, found),
                        count,
                    });
                }
            };
            self.pending = None;
            rows.push(decode(&line, &line.tokens())?);
        }
        Ok(rows)
    }

    /// Drops lines until the next channel header (B050F03) or the end of input.
    pub fn skip_to_header(&mut self) {
        if let Some(line) = self.pending {
            if line.is(50, 3) {
                return;
            }
            self.pending = None;
        }
        while let Some((number, text)) = self.next_raw() {
            if let Ok(line) = Line::parse(number, text) {
                if line.is(50, 3) {
                    self.pending = Some(line);
                    return;
                }
            }
        }
    }

    pub fn eof_error(&self, blockette: u32, field: u32) -> RespError {
        RespError::Parse {
            line: self.last_number,
            blockette,
            field,
            text: String::new(),
            message: format!(
                "unexpected end of input, expected B{:03}F{:02}",
                blockette, field
            ),
        }
    }
}
