//! Text rendering of runtime values back into block-file form.
//!
//! Doubles inside [1e-5, 1e5) (and zero) print fixed with eight decimals;
//! anything else switches to scientific notation so precision survives.
//! Strings with embedded whitespace are single-quoted, index-like values
//! are shifted back to 1-based, and `ucase` items are upper-cased.

use mfio_spec::DataItemSpec;

use crate::value::{CellId, Value};

const SCI_NOTE_UPPER: f64 = 1e5;
const SCI_NOTE_LOWER: f64 = 1e-5;

pub fn fmt_double(v: f64) -> String {
    let abs = v.abs();
    if abs == 0.0 || (abs >= SCI_NOTE_LOWER && abs < SCI_NOTE_UPPER) {
        format!("{:.8}", v)
    } else {
        format!("{:.8E}", v)
    }
}

pub fn fmt_int(v: i64) -> String {
    v.to_string()
}

fn fmt_str(s: &str, ucase: bool) -> String {
    let quoted = if s.contains(char::is_whitespace) {
        format!("'{}'", s)
    } else {
        s.to_owned()
    };
    if ucase {
        quoted.to_uppercase()
    } else {
        quoted
    }
}

pub fn fmt_cellid(cell: &CellId) -> String {
    match *cell {
        CellId::Node(n) => (n + 1).to_string(),
        CellId::Lrc(l, r, c) => format!("{} {} {}", l + 1, r + 1, c + 1),
    }
}

/// Render one value under its item's formatting hints.
pub fn fmt_value(value: &Value, item: &DataItemSpec) -> String {
    match value {
        Value::Int(n) => {
            let shown = if item.numeric_index { n + 1 } else { *n };
            fmt_int(shown)
        }
        Value::Double(v) => fmt_double(*v),
        Value::Str(s) => fmt_str(s, item.ucase),
        Value::Keyword(k) => k.to_uppercase(),
        Value::CellId(c) => fmt_cellid(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfio_spec::ItemKind;

    fn item() -> DataItemSpec {
        DataItemSpec {
            name: "x".to_owned(),
            kind: ItemKind::Double,
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
    fn in_range_doubles_print_fixed() {
        assert_eq!(fmt_double(5.0), "5.00000000");
        assert_eq!(fmt_double(0.0), "0.00000000");
        assert_eq!(fmt_double(-1.5), "-1.50000000");
    }

    #[test]
    fn out_of_range_doubles_print_scientific() {
        assert_eq!(fmt_double(1.0e-9), "1.00000000E-9");
        assert!(fmt_double(2.5e7).contains('E'));
    }

    #[test]
    fn strings_with_spaces_are_quoted() {
        let mut it = item();
        it.kind = ItemKind::String;
        assert_eq!(
            fmt_value(&Value::Str("my file.txt".to_owned()), &it),
            "'my file.txt'"
        );
        assert_eq!(fmt_value(&Value::Str("plain".to_owned()), &it), "plain");
    }

    #[test]
    fn numeric_index_shifts_back_to_one_based() {
        let mut it = item();
        it.kind = ItemKind::Integer;
        it.numeric_index = true;
        assert_eq!(fmt_value(&Value::Int(2), &it), "3");
    }

    #[test]
    fn cellid_components_are_one_based() {
        assert_eq!(fmt_cellid(&CellId::Lrc(0, 1, 2)), "1 2 3");
        assert_eq!(fmt_cellid(&CellId::Node(9)), "10");
    }
}
