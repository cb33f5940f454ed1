//! Tokenizer for the on-disk block file format.
//!
//! The format is line-oriented: tokens split on whitespace and commas,
//! `#` strips a trailing comment, single or double quotes preserve
//! embedded whitespace. Every token carries its source position so parse
//! errors can name the exact spot in the input file.
//!
//! [`LineStream`] is the pull-based cursor over a file's meaningful lines:
//! lazy, non-restartable, blank and comment-only lines skipped.

use crate::error::DataError;

/// One token with its source position (1-based line and column).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub line: u32,
    pub column: u32,
    /// Set when the token came from a quoted string; quoted tokens never
    /// match keywords.
    pub quoted: bool,
}

impl Token {
    /// Case-insensitive keyword match. Quoted tokens are data, not keywords.
    pub fn matches(&self, keyword: &str) -> bool {
        !self.quoted && self.text.eq_ignore_ascii_case(keyword)
    }

    /// Lowercased unquoted text, used for name lookups.
    pub fn lower(&self) -> String {
        self.text.to_ascii_lowercase()
    }
}

/// Tokenize one raw line. Fails on an unterminated quote.
pub fn tokenize_line(raw: &str, line_no: u32, file: &str) -> Result<Vec<Token>, DataError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];

        if c == '#' {
            break; // trailing comment
        }
        if c.is_whitespace() || c == ',' {
            pos += 1;
            continue;
        }

        let column = pos as u32 + 1;

        if c == '"' || c == '\'' {
            let quote = c;
            pos += 1;
            let mut text = String::new();
            loop {
                if pos >= chars.len() {
                    return Err(DataError::parse(
                        file,
                        line_no,
                        column,
                        "unterminated quoted string",
                    ));
                }
                if chars[pos] == quote {
                    pos += 1;
                    break;
                }
                text.push(chars[pos]);
                pos += 1;
            }
            tokens.push(Token {
                text,
                line: line_no,
                column,
                quoted: true,
            });
            continue;
        }

        let start = pos;
        while pos < chars.len()
            && !chars[pos].is_whitespace()
            && chars[pos] != ','
            && chars[pos] != '#'
        {
            pos += 1;
        }
        tokens.push(Token {
            text: chars[start..pos].iter().collect(),
            line: line_no,
            column,
            quoted: false,
        });
    }

    Ok(tokens)
}

/// One meaningful (non-blank, non-comment) line of tokens.
#[derive(Debug, Clone)]
pub struct Line {
    pub tokens: Vec<Token>,
    pub number: u32,
}

impl Line {
    pub fn first(&self) -> &Token {
        &self.tokens[0]
    }
}

/// Lazy, non-restartable cursor over a file's meaningful lines.
pub struct LineStream<'a> {
    file: String,
    source: &'a str,
    lines: std::str::Lines<'a>,
    next_number: u32,
    peeked: Option<Line>,
    /// Line number of the last line handed out, for EOF error context.
    pub last_line: u32,
}

impl<'a> LineStream<'a> {
    pub fn new(text: &'a str, file: &str) -> Self {
        LineStream {
            file: file.to_owned(),
            source: text,
            lines: text.lines(),
            next_number: 0,
            peeked: None,
            last_line: 0,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// Raw source text of an inclusive 1-based line range, blank and
    /// comment-only lines included. Used to preserve extension content
    /// verbatim.
    pub fn raw_span(&self, from: u32, to: u32) -> String {
        self.source
            .lines()
            .skip(from.saturating_sub(1) as usize)
            .take(to.saturating_sub(from) as usize + 1)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn pull(&mut self) -> Result<Option<Line>, DataError> {
        loop {
            let raw = match self.lines.next() {
                Some(r) => r,
                None => return Ok(None),
            };
            self.next_number += 1;
            let tokens = tokenize_line(raw, self.next_number, &self.file)?;
            if tokens.is_empty() {
                continue;
            }
            return Ok(Some(Line {
                tokens,
                number: self.next_number,
            }));
        }
    }

    /// Next meaningful line, advancing the cursor.
    pub fn next_line(&mut self) -> Result<Option<Line>, DataError> {
        let line = match self.peeked.take() {
            Some(l) => Some(l),
            None => self.pull()?,
        };
        if let Some(l) = &line {
            self.last_line = l.number;
        }
        Ok(line)
    }

    /// Next meaningful line without advancing.
    pub fn peek_line(&mut self) -> Result<Option<&Line>, DataError> {
        if self.peeked.is_none() {
            self.peeked = self.pull()?;
        }
        Ok(self.peeked.as_ref())
    }
}
