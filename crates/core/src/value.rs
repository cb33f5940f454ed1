//! Runtime values and the coercion rules between on-disk tokens and typed
//! in-memory data.
//!
//! Indices follow the original convention: 1-based on disk, 0-based in
//! memory. Cellids keep the form they had on disk (layer/row/column tuple
//! or flat node number) and normalize to a flat node index on demand.

use serde::Serialize;

use mfio_spec::{DataItemSpec, DimensionResolver, ItemKind};

use crate::error::DataError;
use crate::lexer::Token;

/// A composite or flat spatial-cell identifier, zero-based in memory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CellId {
    /// Flat node index.
    Node(i64),
    /// (layer, row, column).
    Lrc(i64, i64, i64),
}

impl CellId {
    /// Canonical flat node index, regardless of the on-disk form.
    pub fn node_index(&self, resolver: &dyn DimensionResolver) -> Result<i64, DataError> {
        match *self {
            CellId::Node(n) => Ok(n),
            CellId::Lrc(layer, row, col) => {
                let nrow = resolver
                    .dimension("nrow")
                    .ok_or_else(|| missing_dim("nrow"))?;
                let ncol = resolver
                    .dimension("ncol")
                    .ok_or_else(|| missing_dim("ncol"))?;
                Ok(layer * nrow * ncol + row * ncol + col)
            }
        }
    }
}

fn missing_dim(name: &str) -> DataError {
    DataError::Spec(mfio_spec::SpecError::UndefinedDimension {
        name: name.to_owned(),
        item: "cellid".to_owned(),
    })
}

/// One typed runtime value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
    /// A keyword's presence; holds the lowercase keyword name.
    Keyword(String),
    CellId(CellId),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Keyword(s) => Some(s),
            _ => None,
        }
    }
}

/// Parse an integer token: `[+-]?digits`.
pub fn parse_int(token: &Token, context: &str) -> Result<i64, DataError> {
    token
        .text
        .parse::<i64>()
        .map_err(|_| DataError::coercion("integer", token.text.clone(), context))
}

/// Parse a double token. Fortran-style `d`/`D` exponents are accepted and
/// normalized (`1.5d-3` reads as `1.5e-3`).
pub fn parse_double(token: &Token, context: &str) -> Result<f64, DataError> {
    let normalized: String = token
        .text
        .chars()
        .map(|c| match c {
            'd' | 'D' => 'e',
            other => other,
        })
        .collect();
    normalized
        .parse::<f64>()
        .map_err(|_| DataError::coercion("double", token.text.clone(), context))
}

/// Coerce one token to the declared leaf kind of `item`.
///
/// `numeric_index` integers are shifted to 0-based on the way in. Record,
/// keystring, and cellid items are compound and handled by the table
/// reader, not here.
pub fn parse_leaf(token: &Token, item: &DataItemSpec) -> Result<Value, DataError> {
    match &item.kind {
        ItemKind::Keyword => {
            if token.matches(&item.name) {
                Ok(Value::Keyword(item.name.clone()))
            } else {
                Err(DataError::coercion(
                    "keyword",
                    token.text.clone(),
                    &item.name,
                ))
            }
        }
        ItemKind::Integer => {
            let mut n = parse_int(token, &item.name)?;
            if item.numeric_index {
                n -= 1;
            }
            Ok(Value::Int(n))
        }
        ItemKind::Double => Ok(Value::Double(parse_double(token, &item.name)?)),
        ItemKind::String | ItemKind::Filename => {
            if !item.valid.is_empty() && !token.quoted {
                let lower = token.lower();
                if !item.valid.contains(&lower) {
                    return Err(DataError::coercion(
                        "enumerated string",
                        token.text.clone(),
                        &item.name,
                    ));
                }
                return Ok(Value::Str(lower));
            }
            Ok(Value::Str(token.text.clone()))
        }
        ItemKind::Record(_) | ItemKind::Keystring(_) => Err(DataError::coercion(
            "primitive",
            token.text.clone(),
            &item.name,
        )),
    }
}
