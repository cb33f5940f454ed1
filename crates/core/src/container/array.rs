//! Array container: homogeneous N-dimensional numeric grids.
//!
//! An array keeps the storage mode it was given -- CONSTANT, INTERNAL, or
//! OPEN/CLOSE external -- and writes it back unchanged; the engine never
//! promotes one mode to another on its own. Constant arrays expand lazily
//! on `get`; external arrays re-read their file on every `get`, so edits
//! to the referenced file are picked up without reloading the package
//! (deliberately uncached).
//!
//! Binary external files carry a fixed 52-byte header (kstp, kper int32;
//! pertim, totim float64; 16 text bytes; ncol, nrow, ilay int32; all
//! little-endian) ahead of the raw payload.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use mfio_spec::{DataItemSpec, ItemKind};

use crate::error::DataError;
use crate::format::{fmt_double, fmt_int};
use crate::lexer::{LineStream, Token};
use crate::value::{parse_double, parse_int, Value};

use super::IoCtx;

const BINARY_HEADER_LEN: usize = 52;

/// Flat element storage; the grid's element kind follows the item kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArrayValues {
    Int(Vec<i64>),
    Double(Vec<f64>),
}

impl ArrayValues {
    pub fn len(&self) -> usize {
        match self {
            ArrayValues::Int(v) => v.len(),
            ArrayValues::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A realized array: concrete shape plus flat values in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayValue {
    pub shape: Vec<usize>,
    pub values: ArrayValues,
}

/// How the array's value is represented on disk.
#[derive(Debug, Clone)]
pub enum ArrayStorage {
    /// Single value, shape-expanded lazily on `get`.
    Constant(Value),
    /// Values inline in the owning file, kept raw (factor not folded in).
    Internal {
        values: ArrayValues,
        factor: Option<f64>,
        iprn: Option<i64>,
    },
    /// A file reference; the numeric load is deferred to `get`.
    External {
        path: PathBuf,
        factor: Option<f64>,
        iprn: Option<i64>,
        binary: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ArrayData {
    storage: Option<ArrayStorage>,
}

impl ArrayData {
    pub fn new() -> ArrayData {
        ArrayData::default()
    }

    pub fn is_set(&self) -> bool {
        self.storage.is_some()
    }

    pub fn storage(&self) -> Option<&ArrayStorage> {
        self.storage.as_ref()
    }

    fn expected_count(item: &DataItemSpec, ctx: &IoCtx) -> Result<(Vec<usize>, usize), DataError> {
        let shape = item.shape.as_ref().ok_or_else(|| {
            DataError::coercion("shaped array item", "item without a shape".to_owned(), &item.name)
        })?;
        let dims = shape.eval(ctx.resolver, &item.name)?;
        let count = dims.iter().product();
        Ok((dims, count))
    }

    // ── Setters ─────────────────────────────────────────────────────

    pub fn set_constant(&mut self, value: Value, item: &DataItemSpec) -> Result<(), DataError> {
        let checked = match (&item.kind, value) {
            (ItemKind::Integer, Value::Int(n)) => Value::Int(n),
            (ItemKind::Double, Value::Double(v)) => Value::Double(v),
            (ItemKind::Double, Value::Int(n)) => Value::Double(n as f64),
            (_, other) => {
                return Err(DataError::coercion(
                    "numeric constant",
                    format!("{:?}", other),
                    &item.name,
                ));
            }
        };
        self.storage = Some(ArrayStorage::Constant(checked));
        Ok(())
    }

    /// Store inline values, validating the element count against the
    /// item's shape under the current dimensions.
    pub fn set_internal(
        &mut self,
        value: ArrayValue,
        item: &DataItemSpec,
        ctx: &IoCtx,
    ) -> Result<(), DataError> {
        let (_, count) = Self::expected_count(item, ctx)?;
        if value.values.len() != count {
            return Err(DataError::ShapeMismatch {
                name: item.name.clone(),
                expected: count,
                found: value.values.len(),
            });
        }
        let declared: usize = value.shape.iter().product();
        if declared != value.values.len() {
            return Err(DataError::ShapeMismatch {
                name: item.name.clone(),
                expected: declared,
                found: value.values.len(),
            });
        }
        match (&item.kind, &value.values) {
            (ItemKind::Integer, ArrayValues::Int(_))
            | (ItemKind::Double, ArrayValues::Double(_)) => {}
            _ => {
                return Err(DataError::coercion(
                    "matching numeric element kind",
                    format!("{:?}", value.values),
                    &item.name,
                ));
            }
        }
        self.storage = Some(ArrayStorage::Internal {
            values: value.values,
            factor: None,
            iprn: None,
        });
        Ok(())
    }

    pub fn set_external(&mut self, path: impl Into<PathBuf>, binary: bool) {
        self.storage = Some(ArrayStorage::External {
            path: path.into(),
            factor: None,
            iprn: None,
            binary,
        });
    }

    // ── get ─────────────────────────────────────────────────────────

    /// Realize the array under the current dimensions. External storage
    /// reads its file afresh on every call.
    pub fn get(&self, item: &DataItemSpec, ctx: &IoCtx) -> Result<ArrayValue, DataError> {
        let storage = self.storage.as_ref().ok_or_else(|| DataError::NoData {
            name: item.name.clone(),
        })?;
        let (shape, count) = Self::expected_count(item, ctx)?;
        match storage {
            ArrayStorage::Constant(v) => {
                let values = match (&item.kind, v) {
                    (ItemKind::Integer, Value::Int(n)) => ArrayValues::Int(vec![*n; count]),
                    (_, v) => {
                        let d = v.as_double().ok_or_else(|| {
                            DataError::coercion("numeric constant", format!("{:?}", v), &item.name)
                        })?;
                        ArrayValues::Double(vec![d; count])
                    }
                };
                Ok(ArrayValue { shape, values })
            }
            ArrayStorage::Internal { values, factor, .. } => {
                if values.len() != count {
                    return Err(DataError::ShapeMismatch {
                        name: item.name.clone(),
                        expected: count,
                        found: values.len(),
                    });
                }
                Ok(ArrayValue {
                    shape,
                    values: apply_factor(values.clone(), *factor),
                })
            }
            ArrayStorage::External {
                path,
                factor,
                binary,
                ..
            } => {
                let full = if path.is_absolute() {
                    path.clone()
                } else {
                    ctx.base_dir.join(path)
                };
                let values = if *binary {
                    read_binary_array_file(&full, &item.kind, count)?
                } else {
                    read_text_array_file(&full, &item.kind, count, &item.name)?
                };
                Ok(ArrayValue {
                    shape,
                    values: apply_factor(values, *factor),
                })
            }
        }
    }

    // ── Text protocol ───────────────────────────────────────────────

    /// Consume the storage control tokens (`CONSTANT …`, `INTERNAL …`,
    /// `OPEN/CLOSE …`) and, for INTERNAL, the value lines that follow.
    pub fn read_from(
        &mut self,
        control: &[Token],
        stream: &mut LineStream,
        item: &DataItemSpec,
        ctx: &IoCtx,
    ) -> Result<(), DataError> {
        let file = stream.file().to_owned();
        let head = control.first().ok_or_else(|| {
            DataError::parse(
                &file,
                stream.last_line,
                1,
                format!("missing storage control for array '{}'", item.name),
            )
        })?;

        if head.matches("constant") {
            let value_tok = expect_next(control, 1, &file, head, "CONSTANT value")?;
            ensure_consumed(control, 2, &file)?;
            let value = parse_element(value_tok, &item.kind, &item.name)?;
            self.storage = Some(ArrayStorage::Constant(value));
            return Ok(());
        }

        if head.matches("internal") {
            let (factor, iprn, rest) = parse_control_options(&control[1..], &file, &item.name)?;
            if let Some(extra) = rest.first() {
                return Err(unexpected(&file, extra));
            }
            let (_, count) = Self::expected_count(item, ctx)?;
            let values = read_inline_values(stream, &item.kind, count, &item.name)?;
            self.storage = Some(ArrayStorage::Internal {
                values,
                factor,
                iprn,
            });
            return Ok(());
        }

        if head.matches("open/close") {
            let path_tok = expect_next(control, 1, &file, head, "OPEN/CLOSE file name")?;
            let (factor, iprn, rest) = parse_control_options(&control[2..], &file, &item.name)?;
            let mut binary = false;
            let mut rest = rest;
            if let Some(tok) = rest.first() {
                if tok.matches("binary") || tok.matches("(binary)") {
                    binary = true;
                    rest = &rest[1..];
                }
            }
            if let Some(extra) = rest.first() {
                return Err(unexpected(&file, extra));
            }
            self.storage = Some(ArrayStorage::External {
                path: PathBuf::from(&path_tok.text),
                factor,
                iprn,
                binary,
            });
            return Ok(());
        }

        Err(DataError::parse(
            &file,
            head.line,
            head.column,
            format!(
                "array '{}' expects CONSTANT, INTERNAL, or OPEN/CLOSE, found '{}'",
                item.name, head.text
            ),
        ))
    }

    /// Render the array item: name line, control line, and inline values
    /// for INTERNAL storage (wrapped at the trailing dimension extent).
    pub fn write_to(
        &self,
        out: &mut String,
        item: &DataItemSpec,
        ctx: &IoCtx,
    ) -> Result<(), DataError> {
        let storage = self.storage.as_ref().ok_or_else(|| DataError::NoData {
            name: item.name.clone(),
        })?;
        out.push_str("  ");
        out.push_str(&item.name.to_uppercase());
        out.push('\n');
        match storage {
            ArrayStorage::Constant(v) => {
                out.push_str("    CONSTANT ");
                out.push_str(&fmt_element(v));
                out.push('\n');
            }
            ArrayStorage::Internal {
                values,
                factor,
                iprn,
            } => {
                out.push_str("    INTERNAL");
                push_control_options(out, *factor, *iprn);
                out.push('\n');
                let per_line = item
                    .shape
                    .as_ref()
                    .and_then(|s| s.eval(ctx.resolver, &item.name).ok())
                    .and_then(|dims| dims.last().copied())
                    .filter(|n| *n > 0)
                    .unwrap_or(values.len().max(1));
                write_values(out, values, per_line);
            }
            ArrayStorage::External {
                path,
                factor,
                iprn,
                binary,
            } => {
                out.push_str("    OPEN/CLOSE ");
                let shown = path.to_string_lossy();
                if shown.contains(char::is_whitespace) {
                    out.push('\'');
                    out.push_str(&shown);
                    out.push('\'');
                } else {
                    out.push_str(&shown);
                }
                push_control_options(out, *factor, *iprn);
                if *binary {
                    out.push_str(" (BINARY)");
                }
                out.push('\n');
            }
        }
        Ok(())
    }
}

// ── Element helpers ─────────────────────────────────────────────────

fn parse_element(token: &Token, kind: &ItemKind, name: &str) -> Result<Value, DataError> {
    match kind {
        ItemKind::Integer => Ok(Value::Int(parse_int(token, name)?)),
        _ => Ok(Value::Double(parse_double(token, name)?)),
    }
}

fn fmt_element(v: &Value) -> String {
    match v {
        Value::Int(n) => fmt_int(*n),
        Value::Double(d) => fmt_double(*d),
        other => format!("{:?}", other),
    }
}

fn apply_factor(values: ArrayValues, factor: Option<f64>) -> ArrayValues {
    let f = match factor {
        Some(f) if f != 1.0 => f,
        _ => return values,
    };
    match values {
        ArrayValues::Double(v) => ArrayValues::Double(v.into_iter().map(|x| x * f).collect()),
        ArrayValues::Int(v) => {
            ArrayValues::Int(v.into_iter().map(|x| (x as f64 * f).round() as i64).collect())
        }
    }
}

fn expect_next<'a>(
    tokens: &'a [Token],
    idx: usize,
    file: &str,
    anchor: &Token,
    what: &str,
) -> Result<&'a Token, DataError> {
    tokens.get(idx).ok_or_else(|| {
        DataError::parse(
            file,
            anchor.line,
            anchor.column,
            format!("missing {}", what),
        )
    })
}

fn ensure_consumed(tokens: &[Token], from: usize, file: &str) -> Result<(), DataError> {
    match tokens.get(from) {
        Some(extra) => Err(unexpected(file, extra)),
        None => Ok(()),
    }
}

fn unexpected(file: &str, token: &Token) -> DataError {
    DataError::parse(
        file,
        token.line,
        token.column,
        format!("unexpected token '{}'", token.text),
    )
}

/// Parse trailing `FACTOR f` / `IPRN n` options, returning the remainder.
fn parse_control_options<'a>(
    mut tokens: &'a [Token],
    file: &str,
    name: &str,
) -> Result<(Option<f64>, Option<i64>, &'a [Token]), DataError> {
    let mut factor = None;
    let mut iprn = None;
    loop {
        match tokens.first() {
            Some(tok) if tok.matches("factor") => {
                let v = expect_next(tokens, 1, file, tok, "FACTOR value")?;
                factor = Some(parse_double(v, name)?);
                tokens = &tokens[2..];
            }
            Some(tok) if tok.matches("iprn") => {
                let v = expect_next(tokens, 1, file, tok, "IPRN value")?;
                iprn = Some(parse_int(v, name)?);
                tokens = &tokens[2..];
            }
            _ => return Ok((factor, iprn, tokens)),
        }
    }
}

fn push_control_options(out: &mut String, factor: Option<f64>, iprn: Option<i64>) {
    if let Some(f) = factor {
        out.push_str(" FACTOR ");
        out.push_str(&fmt_double(f));
    }
    if let Some(n) = iprn {
        out.push_str(" IPRN ");
        out.push_str(&fmt_int(n));
    }
}

/// Pull value lines from the stream until `count` elements are read.
fn read_inline_values(
    stream: &mut LineStream,
    kind: &ItemKind,
    count: usize,
    name: &str,
) -> Result<ArrayValues, DataError> {
    let file = stream.file().to_owned();
    let mut ints = Vec::new();
    let mut doubles = Vec::new();
    let want_int = matches!(kind, ItemKind::Integer);
    let mut read = 0usize;
    while read < count {
        let line = stream.next_line()?.ok_or_else(|| {
            DataError::parse(
                &file,
                stream.last_line,
                1,
                format!(
                    "end of file while reading values for '{}': expected {}, found {}",
                    name, count, read
                ),
            )
        })?;
        for tok in &line.tokens {
            if read >= count {
                return Err(DataError::parse(
                    &file,
                    tok.line,
                    tok.column,
                    format!("too many values for '{}': expected {}", name, count),
                ));
            }
            if want_int {
                ints.push(parse_int(tok, name)?);
            } else {
                doubles.push(parse_double(tok, name)?);
            }
            read += 1;
        }
    }
    Ok(if want_int {
        ArrayValues::Int(ints)
    } else {
        ArrayValues::Double(doubles)
    })
}

fn write_values(out: &mut String, values: &ArrayValues, per_line: usize) {
    let render: Vec<String> = match values {
        ArrayValues::Int(v) => v.iter().map(|n| fmt_int(*n)).collect(),
        ArrayValues::Double(v) => v.iter().map(|d| fmt_double(*d)).collect(),
    };
    for chunk in render.chunks(per_line) {
        out.push_str("      ");
        out.push_str(&chunk.join(" "));
        out.push('\n');
    }
}

// ── External file I/O ───────────────────────────────────────────────

fn read_text_array_file(
    path: &Path,
    kind: &ItemKind,
    count: usize,
    name: &str,
) -> Result<ArrayValues, DataError> {
    let text = fs::read_to_string(path)?;
    let file = path.to_string_lossy();
    let mut ints = Vec::new();
    let mut doubles = Vec::new();
    let want_int = matches!(kind, ItemKind::Integer);
    for (idx, raw) in text.lines().enumerate() {
        let tokens = crate::lexer::tokenize_line(raw, idx as u32 + 1, &file)?;
        for tok in &tokens {
            if want_int {
                ints.push(parse_int(tok, name)?);
            } else {
                doubles.push(parse_double(tok, name)?);
            }
        }
    }
    let found = if want_int { ints.len() } else { doubles.len() };
    if found != count {
        return Err(DataError::ShapeMismatch {
            name: name.to_owned(),
            expected: count,
            found,
        });
    }
    Ok(if want_int {
        ArrayValues::Int(ints)
    } else {
        ArrayValues::Double(doubles)
    })
}

fn read_binary_array_file(
    path: &Path,
    kind: &ItemKind,
    count: usize,
) -> Result<ArrayValues, DataError> {
    let mut f = fs::File::open(path)?;
    let mut header = [0u8; BINARY_HEADER_LEN];
    f.read_exact(&mut header)?;
    if matches!(kind, ItemKind::Integer) {
        let mut buf = vec![0u8; count * 4];
        f.read_exact(&mut buf)?;
        let values = buf
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as i64)
            .collect();
        Ok(ArrayValues::Int(values))
    } else {
        let mut buf = vec![0u8; count * 8];
        f.read_exact(&mut buf)?;
        let values = buf
            .chunks_exact(8)
            .map(|c| {
                f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
            })
            .collect();
        Ok(ArrayValues::Double(values))
    }
}

/// Write a plain-text external array file, one row of values per line.
pub fn write_text_array_file(path: &Path, values: &ArrayValues) -> Result<(), DataError> {
    let mut out = String::new();
    write_values(&mut out, values, values.len().max(1));
    fs::write(path, out.trim_start())?;
    Ok(())
}

/// Write a binary external array file with the standard 52-byte header.
pub fn write_binary_array_file(
    path: &Path,
    values: &ArrayValues,
    shape: &[usize],
) -> Result<(), DataError> {
    let (ncol, nrow, ilay) = match shape {
        [n] => (*n as i32, 1, 1),
        [r, c] => (*c as i32, *r as i32, 1),
        [l, r, c] => (*c as i32, *r as i32, *l as i32),
        _ => (values.len() as i32, 1, 1),
    };
    let mut f = fs::File::create(path)?;
    f.write_all(&1i32.to_le_bytes())?; // kstp
    f.write_all(&1i32.to_le_bytes())?; // kper
    f.write_all(&1f64.to_le_bytes())?; // pertim
    f.write_all(&1f64.to_le_bytes())?; // totim
    f.write_all(format!("{:>16}", "ARRAY").as_bytes())?;
    f.write_all(&ncol.to_le_bytes())?;
    f.write_all(&nrow.to_le_bytes())?;
    f.write_all(&ilay.to_le_bytes())?;
    match values {
        ArrayValues::Int(v) => {
            for n in v {
                f.write_all(&(*n as i32).to_le_bytes())?;
            }
        }
        ArrayValues::Double(v) => {
            for d in v {
                f.write_all(&d.to_le_bytes())?;
            }
        }
    }
    Ok(())
}
