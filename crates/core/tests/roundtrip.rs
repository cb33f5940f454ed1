//! End-to-end package behavior: load, mutate, write, and the semantic
//! round-trip guarantee for unmodified data.

use std::collections::HashMap;

use mfio_core::{CellId, DataError, DataValue, Package, Row, Value};
use mfio_spec::Registry;

const DIS_DFN: &str = "\
package-type dis

block options
name length_units
type string
optional true
valid feet meters centimeters

block options
name nogrb
type keyword
optional true

block dimensions
name nlay
type integer

block dimensions
name nrow
type integer

block dimensions
name ncol
type integer

block griddata
name botm
type double precision
shape (nrow, ncol)

block griddata
name idomain
type integer
shape (nrow, ncol)
optional true
";

const DRN_DFN: &str = "\
package-type drn
multi-package true

block options
name save_flows
type keyword
optional true

block dimensions
name maxbound
type integer

block period
name iper
type integer
block_variable true
in_record true

block period
name stress_period_data
type recarray cellid elev cond
shape (maxbound)

block period
name cellid
type integer
shape (ncelldim)
in_record true
tagged false

block period
name elev
type double precision
in_record true
tagged false

block period
name cond
type double precision
in_record true
tagged false
";

const OC_DFN: &str = "\
package-type oc
extension-blocks true

block options
name budget_filerecord
type record budget fileout budgetfile
optional true

block options
name budget
type keyword
in_record true

block options
name fileout
type keyword
in_record true

block options
name budgetfile
type filename
in_record true
tagged false

block period
name iper
type integer
block_variable true
in_record true

block period
name saverecord
type recarray save
shape (any)
optional true

block period
name save
type keystring head budget_all
in_record true
tagged false

block period
name head
type record frequency
in_record true

block period
name frequency
type integer
in_record true
tagged false

block period
name budget_all
type keyword
in_record true
";

const STO_DFN: &str = "\
package-type sto

block period
name iper
type integer
block_variable true
in_record true

block period
name steady-state
type keyword
optional true

block period
name transient
type keyword
optional true
";

fn registry() -> Registry {
    Registry::from_sources([
        ("dis.dfn", DIS_DFN),
        ("drn.dfn", DRN_DFN),
        ("oc.dfn", OC_DFN),
        ("sto.dfn", STO_DFN),
    ])
    .unwrap()
}

fn grid_dims() -> HashMap<String, i64> {
    let mut d = HashMap::new();
    d.insert("nlay".to_owned(), 1_i64);
    d.insert("nrow".to_owned(), 2_i64);
    d.insert("ncol".to_owned(), 3_i64);
    d.insert("maxbound".to_owned(), 10_i64);
    d.insert("ncelldim".to_owned(), 3_i64);
    d.insert("any".to_owned(), 100_i64);
    d
}

fn load(reg: &Registry, package_type: &str, text: &str, dims: &HashMap<String, i64>) -> Package {
    let mut pkg = Package::new(reg, package_type, package_type).unwrap();
    pkg.read_str(text, "test.pkg", dims).unwrap();
    pkg
}

// ── Round-trip fidelity ─────────────────────────────────────────────

#[test]
fn unmodified_package_round_trips_exactly() {
    let reg = registry();
    let dims = grid_dims();
    let text = "\
BEGIN OPTIONS
  LENGTH_UNITS meters
  NOGRB
END OPTIONS

BEGIN DIMENSIONS
  NLAY 1
  NROW 2
  NCOL 3
END DIMENSIONS

BEGIN GRIDDATA
  BOTM
    INTERNAL FACTOR 2.0
      1.0 2.0 3.0
      4.0 5.0 6.0
  IDOMAIN
    CONSTANT 1
END GRIDDATA
";
    let pkg = load(&reg, "dis", text, &dims);
    let first = pkg.write_to_string(&dims).unwrap();
    let pkg2 = load(&reg, "dis", &first, &dims);
    let second = pkg2.write_to_string(&dims).unwrap();
    assert_eq!(first, second);
    // storage mode and factor survive, values stay raw
    assert!(first.contains("INTERNAL FACTOR 2.00000000"));
    assert!(first.contains("1.00000000 2.00000000 3.00000000"));
    assert!(first.contains("CONSTANT 1"));
}

#[test]
fn transient_package_round_trips_exactly() {
    let reg = registry();
    let dims = grid_dims();
    let text = "\
BEGIN OPTIONS
  SAVE_FLOWS
END OPTIONS

BEGIN DIMENSIONS
  MAXBOUND 10
END DIMENSIONS

BEGIN PERIOD 1
  1 1 1 -2.5 100.0
  1 2 3 -3.5 150.0
END PERIOD

BEGIN PERIOD 4
  1 1 2 -1.0 120.0
END PERIOD
";
    let pkg = load(&reg, "drn", text, &dims);
    let first = pkg.write_to_string(&dims).unwrap();
    let pkg2 = load(&reg, "drn", &first, &dims);
    let second = pkg2.write_to_string(&dims).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("BEGIN PERIOD 1"));
    assert!(first.contains("BEGIN PERIOD 4"));
}

#[test]
fn constant_value_is_reformatted_canonically() {
    let reg = registry();
    let dims = grid_dims();
    let text = "\
BEGIN DIMENSIONS
  NLAY 1
  NROW 2
  NCOL 3
END DIMENSIONS

BEGIN GRIDDATA
  BOTM
    CONSTANT 5.0
END GRIDDATA
";
    let pkg = load(&reg, "dis", text, &dims);
    let out = pkg.write_to_string(&dims).unwrap();
    assert!(out.contains("CONSTANT 5.00000000"), "got:\n{}", out);
    // the realized array expands the constant under the dimensions
    match pkg.get_data("botm", None, &dims).unwrap() {
        DataValue::Array(a) => {
            assert_eq!(a.shape, vec![2, 3]);
            assert_eq!(a.values, mfio_core::ArrayValues::Double(vec![5.0; 6]));
        }
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn open_close_reference_round_trips() {
    let reg = registry();
    let dims = grid_dims();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("botm.txt"), "1.0 2.0 3.0\n4.0 5.0 6.0\n").unwrap();
    let text = "\
BEGIN DIMENSIONS
  NLAY 1
  NROW 2
  NCOL 3
END DIMENSIONS

BEGIN GRIDDATA
  BOTM
    OPEN/CLOSE botm.txt FACTOR 0.5
END GRIDDATA
";
    let mut pkg = Package::new(&reg, "dis", "dis").unwrap();
    pkg.set_base_dir(dir.path());
    pkg.read_str(text, "test.dis", &dims).unwrap();

    // the reference is deferred: get reads the file, write keeps the mode
    match pkg.get_data("botm", None, &dims).unwrap() {
        DataValue::Array(a) => {
            assert_eq!(
                a.values,
                mfio_core::ArrayValues::Double(vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0])
            );
        }
        other => panic!("expected array, got {:?}", other),
    }
    let first = pkg.write_to_string(&dims).unwrap();
    assert!(first.contains("OPEN/CLOSE botm.txt FACTOR 0.50000000"));

    let mut pkg2 = Package::new(&reg, "dis", "dis").unwrap();
    pkg2.set_base_dir(dir.path());
    pkg2.read_str(&first, "test.dis", &dims).unwrap();
    assert_eq!(first, pkg2.write_to_string(&dims).unwrap());
}

// ── Transient semantics ─────────────────────────────────────────────

#[test]
fn carry_forward_answers_between_explicit_periods() {
    let reg = registry();
    let dims = grid_dims();
    let text = "\
BEGIN DIMENSIONS
  MAXBOUND 10
END DIMENSIONS

BEGIN PERIOD 1
  1 1 1 -2.5 100.0
END PERIOD

BEGIN PERIOD 4
  1 1 2 -1.0 120.0
END PERIOD
";
    let pkg = load(&reg, "drn", text, &dims);
    let at = |p| match pkg.get_data("stress_period_data", Some(p), &dims).unwrap() {
        DataValue::Table(rows) => rows,
        other => panic!("expected table, got {:?}", other),
    };
    assert_eq!(at(1)[0]["elev"], Value::Double(-2.5));
    assert_eq!(at(2)[0]["elev"], Value::Double(-2.5));
    assert_eq!(at(3)[0]["elev"], Value::Double(-2.5));
    assert_eq!(at(4)[0]["elev"], Value::Double(-1.0));
    assert_eq!(at(9)[0]["elev"], Value::Double(-1.0));
}

#[test]
fn only_explicit_periods_are_written() {
    let reg = registry();
    let dims = grid_dims();
    let mut pkg = Package::new(&reg, "drn", "drn-1").unwrap();
    pkg.set_data("maxbound", None, DataValue::Scalar(Value::Int(5)), &dims)
        .unwrap();

    let mut row = Row::new();
    row.insert("cellid".to_owned(), Value::CellId(CellId::Lrc(0, 0, 0)));
    row.insert("elev".to_owned(), Value::Double(-2.0));
    row.insert("cond".to_owned(), Value::Double(50.0));
    pkg.set_data(
        "stress_period_data",
        Some(1),
        DataValue::Table(vec![row.clone()]),
        &dims,
    )
    .unwrap();
    row.insert("elev".to_owned(), Value::Double(-4.0));
    pkg.set_data(
        "stress_period_data",
        Some(3),
        DataValue::Table(vec![row]),
        &dims,
    )
    .unwrap();

    let out = pkg.write_to_string(&dims).unwrap();
    assert_eq!(out.matches("BEGIN PERIOD").count(), 2);
    assert!(out.contains("BEGIN PERIOD 1"));
    assert!(out.contains("BEGIN PERIOD 3"));
    // cellid written 1-based
    assert!(out.contains("  1 1 1 "), "got:\n{}", out);
}

#[test]
fn transient_keyword_scalars_write_one_block_per_explicit_period() {
    let reg = registry();
    let dims = grid_dims();
    let mut pkg = Package::new(&reg, "sto", "sto").unwrap();
    pkg.set_data("steady-state", Some(1), DataValue::Flag(true), &dims)
        .unwrap();
    pkg.set_data("transient", Some(3), DataValue::Flag(true), &dims)
        .unwrap();

    let out = pkg.write_to_string(&dims).unwrap();
    assert_eq!(out.matches("BEGIN PERIOD").count(), 2);
    assert!(
        out.contains("BEGIN PERIOD 1\n  STEADY-STATE\nEND PERIOD"),
        "got:\n{}",
        out
    );
    assert!(
        out.contains("BEGIN PERIOD 3\n  TRANSIENT\nEND PERIOD"),
        "got:\n{}",
        out
    );

    // the period-1 flag carries forward until the next explicit set
    let pkg2 = load(&reg, "sto", &out, &dims);
    assert_eq!(
        pkg2.get_data("steady-state", Some(2), &dims).unwrap(),
        DataValue::Flag(true)
    );
    assert_eq!(out, pkg2.write_to_string(&dims).unwrap());
}

#[test]
fn transient_access_without_a_period_is_rejected() {
    let reg = registry();
    let dims = grid_dims();
    let pkg = Package::new(&reg, "drn", "drn-1").unwrap();
    assert!(matches!(
        pkg.get_data("stress_period_data", None, &dims),
        Err(DataError::InvalidPeriod { .. })
    ));
}

// ── Malformed input ─────────────────────────────────────────────────

#[test]
fn missing_end_at_eof_is_a_parse_error() {
    let reg = registry();
    let dims = grid_dims();
    let mut pkg = Package::new(&reg, "dis", "dis").unwrap();
    let err = pkg
        .read_str("BEGIN OPTIONS\n  NOGRB\n", "broken.dis", &dims)
        .unwrap_err();
    match err {
        DataError::Parse { file, line, message, .. } => {
            assert_eq!(file, "broken.dis");
            assert_eq!(line, 1);
            assert!(message.contains("END"));
        }
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn mismatched_end_name_is_a_parse_error() {
    let reg = registry();
    let dims = grid_dims();
    let mut pkg = Package::new(&reg, "dis", "dis").unwrap();
    let err = pkg
        .read_str(
            "BEGIN OPTIONS\n  NOGRB\nEND GRIDDATA\n",
            "broken.dis",
            &dims,
        )
        .unwrap_err();
    match err {
        DataError::Parse { message, .. } => {
            assert!(message.contains("OPTIONS") || message.contains("options"));
        }
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn unknown_enumerated_value_is_rejected() {
    let reg = registry();
    let dims = grid_dims();
    let mut pkg = Package::new(&reg, "dis", "dis").unwrap();
    let err = pkg
        .read_str(
            "BEGIN OPTIONS\n  LENGTH_UNITS furlongs\nEND OPTIONS\n",
            "bad.dis",
            &dims,
        )
        .unwrap_err();
    assert!(matches!(err, DataError::TypeCoercion { .. }));
}

// ── Keystrings and records ──────────────────────────────────────────

#[test]
fn keystring_rows_round_trip() {
    let reg = registry();
    let dims = grid_dims();
    let text = "\
BEGIN OPTIONS
  BUDGET FILEOUT model.cbc
END OPTIONS

BEGIN PERIOD 1
  HEAD 2
  BUDGET_ALL
END PERIOD
";
    let pkg = load(&reg, "oc", text, &dims);
    let first = pkg.write_to_string(&dims).unwrap();
    let pkg2 = load(&reg, "oc", &first, &dims);
    let second = pkg2.write_to_string(&dims).unwrap();
    assert_eq!(first, second);

    let rows = match pkg.get_data("saverecord", Some(1), &dims).unwrap() {
        DataValue::Table(rows) => rows,
        other => panic!("expected table, got {:?}", other),
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["save"], Value::Keyword("head".to_owned()));
    assert_eq!(rows[0]["frequency"], Value::Int(2));
    assert_eq!(rows[1]["save"], Value::Keyword("budget_all".to_owned()));
}

#[test]
fn record_matched_by_leading_keyword() {
    let reg = registry();
    let dims = grid_dims();
    let text = "\
BEGIN OPTIONS
  BUDGET FILEOUT model.cbc
END OPTIONS
";
    let pkg = load(&reg, "oc", text, &dims);
    let rows = match pkg.get_data("budget_filerecord", None, &dims).unwrap() {
        DataValue::Table(rows) => rows,
        other => panic!("expected table, got {:?}", other),
    };
    assert_eq!(rows[0]["budgetfile"], Value::Str("model.cbc".to_owned()));
}

// ── Extension blocks ────────────────────────────────────────────────

#[test]
fn extension_blocks_are_preserved_verbatim() {
    let reg = registry();
    let dims = grid_dims();
    let text = "\
BEGIN OPTIONS
  BUDGET FILEOUT model.cbc
END OPTIONS

BEGIN CUSTOMDATA
  SOMETHING weird here
END CUSTOMDATA
";
    let pkg = load(&reg, "oc", text, &dims);
    let out = pkg.write_to_string(&dims).unwrap();
    assert!(out.contains("BEGIN CUSTOMDATA\n  SOMETHING weird here\nEND CUSTOMDATA"));
    // and they stay stable across another cycle
    let pkg2 = load(&reg, "oc", &out, &dims);
    assert_eq!(out, pkg2.write_to_string(&dims).unwrap());
}

#[test]
fn extension_blocks_keep_interior_blank_and_comment_lines() {
    let reg = registry();
    let dims = grid_dims();
    let text = "\
BEGIN OPTIONS
  BUDGET FILEOUT model.cbc
END OPTIONS

BEGIN CUSTOMDATA
  FIRST thing

  # a note between entries
  SECOND thing
END CUSTOMDATA
";
    let pkg = load(&reg, "oc", text, &dims);
    let out = pkg.write_to_string(&dims).unwrap();
    assert!(
        out.contains("  FIRST thing\n\n  # a note between entries\n  SECOND thing"),
        "got:\n{}",
        out
    );
    let pkg2 = load(&reg, "oc", &out, &dims);
    assert_eq!(out, pkg2.write_to_string(&dims).unwrap());
}

#[test]
fn unknown_block_is_fatal_when_extensions_are_not_allowed() {
    let reg = registry();
    let dims = grid_dims();
    let mut pkg = Package::new(&reg, "dis", "dis").unwrap();
    let err = pkg
        .read_str(
            "BEGIN CUSTOMDATA\n  X 1\nEND CUSTOMDATA\n",
            "bad.dis",
            &dims,
        )
        .unwrap_err();
    assert!(matches!(err, DataError::Parse { .. }));
}
