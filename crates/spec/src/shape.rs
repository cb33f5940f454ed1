//! Symbolic shape expressions for array-valued data items.
//!
//! A shape like `(nrow*ncol)` or `(nlay, nrow, ncol)` is parsed once at
//! registry-build time and evaluated later against whatever dimension
//! values the owning model currently holds. Evaluation goes through the
//! [`DimensionResolver`] seam so the core never reads another package's
//! file to learn NROW/NCOL.

use serde::Serialize;

use crate::error::SpecError;

/// Supplies current values for named dimensions (nlay, nrow, ncol, nodes,
/// maxbound, ...). Implemented by the owning model container.
pub trait DimensionResolver {
    fn dimension(&self, name: &str) -> Option<i64>;
}

/// A fixed dimension table, used standalone and in tests.
impl DimensionResolver for std::collections::HashMap<String, i64> {
    fn dimension(&self, name: &str) -> Option<i64> {
        self.get(name).copied()
    }
}

/// One factor of a dimension: a literal or a named dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ShapeFactor {
    Literal(i64),
    Name(String),
}

/// One dimension: the product of its factors (`nrow*ncol` has two).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeDim {
    pub factors: Vec<ShapeFactor>,
}

/// An ordered list of dimensions, e.g. `(nlay, nrow*ncol)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeExpr {
    pub dims: Vec<ShapeDim>,
}

impl ShapeExpr {
    /// Parse a shape expression from its dfn text, with or without the
    /// surrounding parentheses: `(nrow, ncol)`, `nrow*ncol`, `(3)`.
    pub fn parse(text: &str, file: &str, line: u32) -> Result<ShapeExpr, SpecError> {
        let inner = text.trim().trim_start_matches('(').trim_end_matches(')');
        if inner.trim().is_empty() {
            return Err(SpecError::parse(file, line, "empty shape expression"));
        }
        let mut dims = Vec::new();
        for dim_text in inner.split(',') {
            let mut factors = Vec::new();
            for factor_text in dim_text.split('*') {
                let factor_text = factor_text.trim();
                if factor_text.is_empty() {
                    return Err(SpecError::parse(
                        file,
                        line,
                        format!("malformed shape dimension '{}'", dim_text.trim()),
                    ));
                }
                if let Ok(n) = factor_text.parse::<i64>() {
                    if n < 0 {
                        return Err(SpecError::parse(
                            file,
                            line,
                            format!("negative literal in shape: '{}'", factor_text),
                        ));
                    }
                    factors.push(ShapeFactor::Literal(n));
                } else if factor_text.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    factors.push(ShapeFactor::Name(factor_text.to_ascii_lowercase()));
                } else {
                    return Err(SpecError::parse(
                        file,
                        line,
                        format!("invalid shape factor '{}'", factor_text),
                    ));
                }
            }
            dims.push(ShapeDim { factors });
        }
        Ok(ShapeExpr { dims })
    }

    /// Evaluate to a concrete extent per dimension. Fails with
    /// [`SpecError::UndefinedDimension`] naming the first unresolvable
    /// dimension; `item` is only used for error context.
    pub fn eval(
        &self,
        resolver: &dyn DimensionResolver,
        item: &str,
    ) -> Result<Vec<usize>, SpecError> {
        let mut out = Vec::with_capacity(self.dims.len());
        for dim in &self.dims {
            let mut extent: i64 = 1;
            for factor in &dim.factors {
                let v = match factor {
                    ShapeFactor::Literal(n) => *n,
                    ShapeFactor::Name(name) => resolver.dimension(name).ok_or_else(|| {
                        SpecError::UndefinedDimension {
                            name: name.clone(),
                            item: item.to_owned(),
                        }
                    })?,
                };
                extent *= v;
            }
            out.push(extent.max(0) as usize);
        }
        Ok(out)
    }

    /// Total element count under a resolver.
    pub fn element_count(
        &self,
        resolver: &dyn DimensionResolver,
        item: &str,
    ) -> Result<usize, SpecError> {
        Ok(self.eval(resolver, item)?.iter().product())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn dims(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn parse_product_shape() {
        let s = ShapeExpr::parse("(nrow*ncol)", "t.dfn", 1).unwrap();
        assert_eq!(s.dims.len(), 1);
        assert_eq!(s.dims[0].factors.len(), 2);
    }

    #[test]
    fn parse_multi_dim_shape() {
        let s = ShapeExpr::parse("(nlay, nrow, ncol)", "t.dfn", 1).unwrap();
        assert_eq!(s.dims.len(), 3);
    }

    #[test]
    fn eval_resolves_names() {
        let s = ShapeExpr::parse("(nrow*ncol)", "t.dfn", 1).unwrap();
        let d = dims(&[("nrow", 2), ("ncol", 3)]);
        assert_eq!(s.eval(&d, "k").unwrap(), vec![6]);
        assert_eq!(s.element_count(&d, "k").unwrap(), 6);
    }

    #[test]
    fn eval_missing_dimension_fails() {
        let s = ShapeExpr::parse("(nodes)", "t.dfn", 1).unwrap();
        let d = dims(&[]);
        let err = s.eval(&d, "idomain").unwrap_err();
        assert!(matches!(err, SpecError::UndefinedDimension { .. }));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(ShapeExpr::parse("(nrow&ncol)", "t.dfn", 3).is_err());
        assert!(ShapeExpr::parse("()", "t.dfn", 3).is_err());
    }
}
