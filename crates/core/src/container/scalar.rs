//! Scalar container: one typed value or a keyword presence flag.

use mfio_spec::{DataItemSpec, ItemKind};

use crate::error::DataError;
use crate::format::fmt_value;
use crate::lexer::Token;
use crate::value::{parse_leaf, Value};

#[derive(Debug, Clone, Default)]
pub struct ScalarData {
    value: Option<Value>,
}

impl ScalarData {
    pub fn new() -> ScalarData {
        ScalarData::default()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn set(&mut self, value: Value) {
        self.value = Some(value);
    }

    pub fn clear(&mut self) {
        self.value = None;
    }

    /// Set with type checking against the item kind. Ints widen to
    /// doubles; nothing else coerces silently.
    pub fn set_checked(&mut self, value: Value, item: &DataItemSpec) -> Result<(), DataError> {
        let checked = match (&item.kind, value) {
            (ItemKind::Keyword, Value::Keyword(_)) => Value::Keyword(item.name.clone()),
            (ItemKind::Integer, Value::Int(n)) => Value::Int(n),
            (ItemKind::Double, Value::Double(v)) => Value::Double(v),
            (ItemKind::Double, Value::Int(n)) => Value::Double(n as f64),
            (ItemKind::String | ItemKind::Filename, Value::Str(s)) => Value::Str(s),
            (_, other) => {
                return Err(DataError::coercion(
                    kind_label(&item.kind),
                    format!("{:?}", other),
                    &item.name,
                ));
            }
        };
        self.value = Some(checked);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Value, DataError> {
        self.value.as_ref().ok_or_else(|| DataError::NoData {
            name: name.to_owned(),
        })
    }

    /// Consume the value tokens that followed the item's tag (empty for a
    /// bare keyword line).
    pub fn read_from(
        &mut self,
        tokens: &[Token],
        item: &DataItemSpec,
        file: &str,
        line: u32,
    ) -> Result<(), DataError> {
        match &item.kind {
            ItemKind::Keyword => {
                if let Some(extra) = tokens.first() {
                    return Err(DataError::parse(
                        file,
                        extra.line,
                        extra.column,
                        format!(
                            "keyword '{}' takes no value, found '{}'",
                            item.name, extra.text
                        ),
                    ));
                }
                self.value = Some(Value::Keyword(item.name.clone()));
                Ok(())
            }
            _ => {
                let token = tokens.first().ok_or_else(|| {
                    DataError::parse(
                        file,
                        line,
                        1,
                        format!("missing value for '{}'", item.name),
                    )
                })?;
                if let Some(extra) = tokens.get(1) {
                    return Err(DataError::parse(
                        file,
                        extra.line,
                        extra.column,
                        format!(
                            "too many values for '{}': unexpected '{}'",
                            item.name, extra.text
                        ),
                    ));
                }
                self.value = Some(parse_leaf(token, item)?);
                Ok(())
            }
        }
    }

    /// Render as a block data line: `NAME value`, bare `NAME` for
    /// keywords, or the bare value for untagged items.
    pub fn write_to(&self, out: &mut String, item: &DataItemSpec) -> Result<(), DataError> {
        let value = self.get(&item.name)?;
        match value {
            Value::Keyword(_) => {
                out.push_str("  ");
                out.push_str(&item.name.to_uppercase());
            }
            other => {
                out.push_str("  ");
                if item.tagged {
                    out.push_str(&item.name.to_uppercase());
                    out.push(' ');
                }
                out.push_str(&fmt_value(other, item));
            }
        }
        out.push('\n');
        Ok(())
    }
}

fn kind_label(kind: &ItemKind) -> &'static str {
    match kind {
        ItemKind::Keyword => "keyword",
        ItemKind::Integer => "integer",
        ItemKind::Double => "double",
        ItemKind::String => "string",
        ItemKind::Filename => "filename",
        ItemKind::Record(_) => "record",
        ItemKind::Keystring(_) => "keystring",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize_line;

    fn item(kind: ItemKind, name: &str) -> DataItemSpec {
        DataItemSpec {
            name: name.to_owned(),
            kind,
            shape: None,
            optional: false,
            tagged: true,
            default_value: None,
            numeric_index: false,
            ucase: false,
            valid: Vec::new(),
            description: None,
        }
    }

    #[test]
    fn get_before_set_is_no_data() {
        let s = ScalarData::new();
        assert!(matches!(s.get("nrow"), Err(DataError::NoData { .. })));
    }

    #[test]
    fn reads_tagged_integer() {
        let it = item(ItemKind::Integer, "nrow");
        let toks = tokenize_line("2", 1, "t").unwrap();
        let mut s = ScalarData::new();
        s.read_from(&toks, &it, "t", 1).unwrap();
        assert_eq!(s.get("nrow").unwrap(), &Value::Int(2));
    }

    #[test]
    fn keyword_with_value_is_parse_error() {
        let it = item(ItemKind::Keyword, "save_flows");
        let toks = tokenize_line("1", 1, "t").unwrap();
        let mut s = ScalarData::new();
        assert!(matches!(
            s.read_from(&toks, &it, "t", 1),
            Err(DataError::Parse { .. })
        ));
    }

    #[test]
    fn failed_set_keeps_prior_value() {
        let it = item(ItemKind::Integer, "nrow");
        let mut s = ScalarData::new();
        s.set_checked(Value::Int(4), &it).unwrap();
        let err = s.set_checked(Value::Str("x".into()), &it).unwrap_err();
        assert!(matches!(err, DataError::TypeCoercion { .. }));
        assert_eq!(s.get("nrow").unwrap(), &Value::Int(4));
    }

    #[test]
    fn writes_tagged_line() {
        let it = item(ItemKind::Double, "botm");
        let mut s = ScalarData::new();
        s.set_checked(Value::Double(1.5), &it).unwrap();
        let mut out = String::new();
        s.write_to(&mut out, &it).unwrap();
        assert_eq!(out, "  BOTM 1.50000000\n");
    }
}
