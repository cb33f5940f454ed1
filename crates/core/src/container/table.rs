//! Tabular container: ordered rows of heterogeneous columns.
//!
//! Column types come from the owning data structure. Keystring columns are
//! tagged unions resolved at parse time: the first token on the row picks
//! the variant, and only that variant's fields are read from the rest of
//! the line. Cellid columns read as many integers as the grid's spatial
//! coordinate count and normalize to [`crate::value::CellId`].

use std::collections::BTreeMap;

use mfio_spec::{DataItemSpec, DataStructureSpec, ItemKind};

use crate::error::DataError;
use crate::format::fmt_value;
use crate::lexer::{Line, Token};
use crate::value::{parse_int, parse_leaf, CellId, Value};

use super::IoCtx;

/// One row: field name to typed value. Keystring columns store the chosen
/// variant under the column name plus one entry per variant field.
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct TabularData {
    rows: Vec<Row>,
}

/// Cursor over one data line's tokens.
struct RowCursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    file: &'a str,
    line: u32,
}

impl<'a> RowCursor<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn take(&mut self, what: &str) -> Result<&'a Token, DataError> {
        let tok = self.tokens.get(self.pos).ok_or_else(|| {
            DataError::parse(
                self.file,
                self.line,
                1,
                format!("row ended early: missing {}", what),
            )
        })?;
        self.pos += 1;
        Ok(tok)
    }

    fn exhausted(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

impl TabularData {
    pub fn new() -> TabularData {
        TabularData::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Replace all rows, validating each against the declared columns.
    /// On failure the prior rows are retained.
    pub fn set_rows(
        &mut self,
        rows: Vec<Row>,
        structure: &DataStructureSpec,
    ) -> Result<(), DataError> {
        for row in &rows {
            for item in &structure.items {
                if row.contains_key(&item.name) {
                    continue;
                }
                // keyword and optional columns may be absent
                if item.optional || matches!(item.kind, ItemKind::Keyword) {
                    continue;
                }
                return Err(DataError::ShapeMismatch {
                    name: structure.name.clone(),
                    expected: structure.items.len(),
                    found: row.len(),
                });
            }
        }
        if !structure.repeating && rows.len() > 1 {
            return Err(DataError::ShapeMismatch {
                name: structure.name.clone(),
                expected: 1,
                found: rows.len(),
            });
        }
        self.rows = rows;
        Ok(())
    }

    /// Parse one data line as a row. `tokens` is the full line, except
    /// that record structures matched through their name tag pass only
    /// the remainder.
    pub fn read_row(
        &mut self,
        tokens: &[Token],
        line: &Line,
        structure: &DataStructureSpec,
        ctx: &IoCtx,
        file: &str,
    ) -> Result<(), DataError> {
        let mut cursor = RowCursor {
            tokens,
            pos: 0,
            file,
            line: line.number,
        };
        let mut row = Row::new();
        read_columns(&structure.items, &mut cursor, &mut row, ctx)?;
        if let Some(extra) = cursor.peek() {
            return Err(DataError::parse(
                file,
                extra.line,
                extra.column,
                format!(
                    "too many values in row for '{}': unexpected '{}'",
                    structure.name, extra.text
                ),
            ));
        }
        if !structure.repeating && !self.rows.is_empty() {
            return Err(DataError::parse(
                file,
                line.number,
                1,
                format!("'{}' may appear only once", structure.name),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Render all rows in declaration order, one line each.
    pub fn write_to(&self, out: &mut String, structure: &DataStructureSpec) -> Result<(), DataError> {
        for row in &self.rows {
            let mut fields = Vec::new();
            render_columns(&structure.items, row, &mut fields)?;
            out.push_str("  ");
            out.push_str(&fields.join(" "));
            out.push('\n');
        }
        Ok(())
    }
}

/// Read a column list positionally into `row`.
fn read_columns(
    items: &[DataItemSpec],
    cursor: &mut RowCursor,
    row: &mut Row,
    ctx: &IoCtx,
) -> Result<(), DataError> {
    for item in items {
        if cursor.exhausted() {
            if item.optional {
                continue;
            }
            return Err(DataError::parse(
                cursor.file,
                cursor.line,
                1,
                format!("row ended early: missing '{}'", item.name),
            ));
        }
        match &item.kind {
            // presence-style column: consume only on a name match
            ItemKind::Keyword => match cursor.peek() {
                Some(tok) if tok.matches(&item.name) => {
                    cursor.pos += 1;
                    row.insert(item.name.clone(), Value::Keyword(item.name.clone()));
                }
                Some(tok) if !item.optional => {
                    return Err(DataError::parse(
                        cursor.file,
                        tok.line,
                        tok.column,
                        format!("expected keyword '{}', found '{}'", item.name, tok.text),
                    ));
                }
                _ => {}
            },
            ItemKind::Keystring(variants) => {
                let tok = cursor.take("keystring discriminator")?;
                let variant = variants
                    .iter()
                    .find(|v| tok.matches(&v.name))
                    .ok_or_else(|| {
                        let legal: Vec<&str> =
                            variants.iter().map(|v| v.name.as_str()).collect();
                        DataError::parse(
                            cursor.file,
                            tok.line,
                            tok.column,
                            format!(
                                "'{}' is not a variant of '{}' (expected one of: {})",
                                tok.text,
                                item.name,
                                legal.join(", ")
                            ),
                        )
                    })?;
                row.insert(item.name.clone(), Value::Keyword(variant.name.clone()));
                read_columns(&variant.items, cursor, row, ctx)?;
            }
            ItemKind::Record(components) => {
                read_columns(components, cursor, row, ctx)?;
            }
            _ if item.is_cellid() => {
                let value = read_cellid(item, cursor, ctx)?;
                row.insert(item.name.clone(), value);
            }
            _ => {
                let tok = cursor.take(&item.name)?;
                row.insert(item.name.clone(), parse_leaf(tok, item)?);
            }
        }
    }
    Ok(())
}

/// Read a cellid column: as many 1-based integers as the grid has spatial
/// coordinates (3 for layer/row/column grids, 1 for flat node numbering).
fn read_cellid(item: &DataItemSpec, cursor: &mut RowCursor, ctx: &IoCtx) -> Result<Value, DataError> {
    let width = match &item.shape {
        Some(shape) => shape.element_count(ctx.resolver, &item.name)?,
        None => 1,
    };
    let mut parts = Vec::with_capacity(width);
    for _ in 0..width {
        let tok = cursor.take("cellid component")?;
        parts.push(parse_int(tok, &item.name)? - 1);
    }
    match parts.as_slice() {
        [node] => Ok(Value::CellId(CellId::Node(*node))),
        [layer, row, col] => Ok(Value::CellId(CellId::Lrc(*layer, *row, *col))),
        other => Err(DataError::ShapeMismatch {
            name: item.name.clone(),
            expected: 3,
            found: other.len(),
        }),
    }
}

fn render_columns(
    items: &[DataItemSpec],
    row: &Row,
    fields: &mut Vec<String>,
) -> Result<(), DataError> {
    for item in items {
        match &item.kind {
            ItemKind::Keyword => {
                if row.contains_key(&item.name) {
                    fields.push(item.name.to_uppercase());
                }
            }
            ItemKind::Keystring(variants) => {
                let chosen = match row.get(&item.name) {
                    Some(Value::Keyword(name)) => name,
                    _ => {
                        return Err(DataError::NoData {
                            name: item.name.clone(),
                        });
                    }
                };
                let variant = variants.iter().find(|v| &v.name == chosen).ok_or_else(|| {
                    DataError::coercion("keystring variant", chosen.clone(), &item.name)
                })?;
                fields.push(chosen.to_uppercase());
                render_columns(&variant.items, row, fields)?;
            }
            ItemKind::Record(components) => {
                render_columns(components, row, fields)?;
            }
            _ => match row.get(&item.name) {
                Some(value) => fields.push(fmt_value(value, item)),
                None if item.optional => {}
                None => {
                    return Err(DataError::NoData {
                        name: item.name.clone(),
                    });
                }
            },
        }
    }
    Ok(())
}
