//! Package files: load, data access, and write-back.
//!
//! A package binds one specification (shared by `Arc` with every other
//! package of the same type) to runtime blocks holding the file's data.
//! Loading is strict: unknown blocks are fatal unless the specification
//! permits extension blocks, in which case they are preserved verbatim
//! and re-emitted after the known blocks.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mfio_spec::{BlockSpec, DimensionResolver, PackageSpec, Registry, SpecError};

use crate::block::Block;
use crate::container::{Container, ContainerValue, DataValue, IoCtx};
use crate::error::DataError;
use crate::lexer::LineStream;

pub struct Package {
    /// Lowercase package type tag (e.g. `dis`, `chd`).
    pub package_type: String,
    /// User-assigned instance name, unique within a model.
    pub name: String,
    spec: Arc<PackageSpec>,
    blocks: Vec<Block>,
    /// Raw text of permitted extension blocks, re-emitted verbatim.
    extensions: Vec<String>,
    /// Directory external file references resolve against.
    base_dir: PathBuf,
    /// Source file, when loaded from disk.
    pub path: Option<PathBuf>,
}

impl Package {
    /// An empty package of the given type, with every block unpopulated.
    pub fn new(registry: &Registry, package_type: &str, name: &str) -> Result<Package, DataError> {
        let spec = registry.get_package_spec(package_type)?;
        let blocks = spec.blocks.iter().map(Block::new).collect();
        Ok(Package {
            package_type: spec.package_type.clone(),
            name: name.to_owned(),
            spec,
            blocks,
            extensions: Vec::new(),
            base_dir: PathBuf::from("."),
            path: None,
        })
    }

    pub fn spec(&self) -> &Arc<PackageSpec> {
        &self.spec
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        let lower = name.to_ascii_lowercase();
        self.blocks.iter().find(|b| b.name == lower)
    }

    pub fn block_mut(&mut self, name: &str) -> Option<&mut Block> {
        let lower = name.to_ascii_lowercase();
        self.blocks.iter_mut().find(|b| b.name == lower)
    }

    pub fn set_base_dir(&mut self, dir: impl Into<PathBuf>) {
        self.base_dir = dir.into();
    }

    // ── Loading ─────────────────────────────────────────────────────

    /// Load a package from a file on disk. External array references in
    /// the file resolve against the file's directory.
    pub fn load(
        registry: &Registry,
        package_type: &str,
        name: &str,
        path: &Path,
        resolver: &dyn DimensionResolver,
    ) -> Result<Package, DataError> {
        let text = fs::read_to_string(path)?;
        let mut pkg = Package::new(registry, package_type, name)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                pkg.base_dir = parent.to_owned();
            }
        }
        pkg.path = Some(path.to_owned());
        pkg.read_str(&text, &path.to_string_lossy(), resolver)?;
        Ok(pkg)
    }

    /// Parse package text into this package's blocks. `file` is used only
    /// for error reporting. Integer scalars parsed from the file's own
    /// `dimensions` block shape arrays in later blocks; names it does not
    /// declare fall through to the caller's resolver.
    pub fn read_str(
        &mut self,
        text: &str,
        file: &str,
        resolver: &dyn DimensionResolver,
    ) -> Result<(), DataError> {
        let spec = self.spec.clone();
        let mut stream = LineStream::new(text, file);
        let mut seen: HashSet<String> = HashSet::new();
        let mut own_dims: HashMap<String, i64> = HashMap::new();

        while let Some(line) = stream.next_line()? {
            let first = line.first();
            if !first.matches("begin") {
                return Err(DataError::parse(
                    file,
                    first.line,
                    first.column,
                    format!("expected BEGIN, found '{}'", first.text),
                ));
            }
            let name_tok = line.tokens.get(1).ok_or_else(|| {
                DataError::parse(file, line.number, 1, "BEGIN without a block name")
            })?;
            let lower = name_tok.lower();

            match spec.block(&lower) {
                Some(block_spec) => {
                    if !block_spec.transient && !seen.insert(lower.clone()) {
                        return Err(DataError::parse(
                            file,
                            name_tok.line,
                            name_tok.column,
                            format!("block '{}' appears more than once", lower),
                        ));
                    }
                    let block = self
                        .blocks
                        .iter_mut()
                        .find(|b| b.name == block_spec.name)
                        .ok_or_else(|| {
                            DataError::Spec(SpecError::unknown("block", lower.clone()))
                        })?;
                    let layered = LoadDims {
                        own: &own_dims,
                        outer: resolver,
                    };
                    let ctx = IoCtx {
                        resolver: &layered,
                        base_dir: &self.base_dir,
                    };
                    block.read_occurrence(block_spec, &line, &mut stream, &ctx)?;
                    if block_spec.name == "dimensions" {
                        collect_dimensions(block_spec, block, &mut own_dims);
                    }
                }
                None => {
                    if !spec.extension_blocks {
                        return Err(DataError::parse(
                            file,
                            name_tok.line,
                            name_tok.column,
                            format!(
                                "unknown block '{}' in {} package",
                                lower, spec.package_type
                            ),
                        ));
                    }
                    self.extensions
                        .push(capture_extension(&line, name_tok, &mut stream, file)?);
                }
            }
        }
        Ok(())
    }

    // ── Writing ─────────────────────────────────────────────────────

    /// Render the package to block-file text: known blocks in
    /// specification order, then preserved extension blocks.
    pub fn write_to_string(&self, resolver: &dyn DimensionResolver) -> Result<String, DataError> {
        let ctx = IoCtx {
            resolver,
            base_dir: &self.base_dir,
        };
        let mut out = String::new();
        for (block_spec, block) in self.spec.blocks.iter().zip(&self.blocks) {
            block.write_to(&mut out, block_spec, &ctx, &self.name)?;
        }
        for ext in &self.extensions {
            out.push_str(ext);
            out.push_str("\n\n");
        }
        let trimmed = out.trim_end();
        if trimmed.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("{}\n", trimmed))
        }
    }

    pub fn write(&self, path: &Path, resolver: &dyn DimensionResolver) -> Result<(), DataError> {
        let text = self.write_to_string(resolver)?;
        fs::write(path, text)?;
        Ok(())
    }

    // ── Data access ─────────────────────────────────────────────────

    /// Current value of a named data structure. Transient data requires a
    /// period and answers with the value in force at that period.
    pub fn get_data(
        &self,
        name: &str,
        period: Option<u32>,
        resolver: &dyn DimensionResolver,
    ) -> Result<DataValue, DataError> {
        let spec = self.spec.clone();
        let (block_spec, structure) = spec
            .structure(name)
            .ok_or_else(|| DataError::Spec(SpecError::unknown("data structure", name)))?;
        let container = self
            .block(&block_spec.name)
            .and_then(|b| b.container(&structure.name))
            .ok_or_else(|| DataError::Spec(SpecError::unknown("data structure", name)))?;
        let ctx = IoCtx {
            resolver,
            base_dir: &self.base_dir,
        };
        match container {
            Container::Static(value) => value.get(structure, &ctx),
            Container::Transient(t) => {
                // period 0 is a valid query: nothing is in force yet, so
                // the answer is NoData rather than a rejected period
                let p = period.ok_or(DataError::InvalidPeriod { period: 0 })?;
                let value = t.at(p).ok_or_else(|| DataError::NoData {
                    name: structure.name.clone(),
                })?;
                value.get(structure, &ctx)
            }
        }
    }

    /// Replace the value of a named data structure, validating against its
    /// specification. On failure the prior value is retained. For transient
    /// data the value is set explicitly at `period` and carries forward.
    pub fn set_data(
        &mut self,
        name: &str,
        period: Option<u32>,
        value: DataValue,
        resolver: &dyn DimensionResolver,
    ) -> Result<(), DataError> {
        let spec = self.spec.clone();
        let (block_spec, structure) = spec
            .structure(name)
            .ok_or_else(|| DataError::Spec(SpecError::unknown("data structure", name)))?;
        let base_dir = self.base_dir.clone();
        let container = self
            .block_mut(&block_spec.name)
            .and_then(|b| b.container_mut(&structure.name))
            .ok_or_else(|| DataError::Spec(SpecError::unknown("data structure", name)))?;
        let ctx = IoCtx {
            resolver,
            base_dir: &base_dir,
        };
        match container {
            Container::Static(slot) => slot.set(structure, value, &ctx),
            Container::Transient(t) => {
                let p = required_period(period)?;
                let mut working = t
                    .explicit_at(p)
                    .cloned()
                    .unwrap_or_else(|| ContainerValue::empty_for(structure));
                working.set(structure, value, &ctx)?;
                t.set(p, working)
            }
        }
    }

    /// Whether a named data structure holds any data at all.
    pub fn has_data(&self, name: &str) -> bool {
        let Some((block_spec, structure)) = self.spec.structure(name) else {
            return false;
        };
        self.block(&block_spec.name)
            .and_then(|b| b.container(&structure.name))
            .map(|c| c.is_populated())
            .unwrap_or(false)
    }
}

/// Stress periods are 1-based; writing requires an explicit one.
fn required_period(period: Option<u32>) -> Result<u32, DataError> {
    match period {
        Some(0) | None => Err(DataError::InvalidPeriod { period: 0 }),
        Some(p) => Ok(p),
    }
}

/// Dimension lookup during load: the file's own dimension scalars shadow
/// the caller's resolver.
struct LoadDims<'a> {
    own: &'a HashMap<String, i64>,
    outer: &'a dyn DimensionResolver,
}

impl DimensionResolver for LoadDims<'_> {
    fn dimension(&self, name: &str) -> Option<i64> {
        self.own
            .get(name)
            .copied()
            .or_else(|| self.outer.dimension(name))
    }
}

/// Pull every set integer scalar out of a freshly-read dimensions block.
fn collect_dimensions(spec: &BlockSpec, block: &Block, dims: &mut HashMap<String, i64>) {
    for structure in &spec.structures {
        let Some(Container::Static(ContainerValue::Scalar(scalar))) =
            block.container(&structure.name)
        else {
            continue;
        };
        let Ok(value) = scalar.get(&structure.name) else {
            continue;
        };
        if let Some(n) = value.as_int() {
            dims.insert(structure.name.clone(), n);
        }
    }
}

/// Consume an unrecognized block through its END line, keeping the raw
/// source span (blank and comment lines included).
fn capture_extension(
    header: &crate::lexer::Line,
    name_tok: &crate::lexer::Token,
    stream: &mut LineStream,
    file: &str,
) -> Result<String, DataError> {
    loop {
        let line = stream.next_line()?.ok_or_else(|| {
            DataError::parse(
                file,
                header.number,
                1,
                format!(
                    "block '{}' beginning at line {} has no END before end of file",
                    name_tok.text, header.number
                ),
            )
        })?;
        let closes = line.first().matches("end")
            && line
                .tokens
                .get(1)
                .map(|t| t.matches(&name_tok.text))
                .unwrap_or(false);
        if closes {
            return Ok(stream.raw_span(header.number, line.number));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const DIS_DFN: &str = "\
package-type dis

block options
name length_units
type string
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
";

    const CHD_DFN: &str = "\
package-type chd
multi-package true

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
type recarray cellid head
shape (maxbound)

block period
name cellid
type integer
shape (ncelldim)
in_record true
tagged false

block period
name head
type double precision
in_record true
tagged false
";

    fn registry() -> Registry {
        Registry::from_sources([("dis.dfn", DIS_DFN), ("chd.dfn", CHD_DFN)]).unwrap()
    }

    fn dims() -> HashMap<String, i64> {
        let mut d = HashMap::new();
        d.insert("nrow".to_owned(), 2_i64);
        d.insert("ncol".to_owned(), 2_i64);
        d.insert("maxbound".to_owned(), 10_i64);
        d.insert("ncelldim".to_owned(), 3_i64);
        d
    }

    const DIS_FILE: &str = "\
BEGIN OPTIONS
  LENGTH_UNITS meters
END OPTIONS

BEGIN DIMENSIONS
  NLAY 1
  NROW 2
  NCOL 2
END DIMENSIONS

BEGIN GRIDDATA
  BOTM
    CONSTANT 5.0
END GRIDDATA
";

    #[test]
    fn loads_and_reads_scalars() {
        let reg = registry();
        let dims = dims();
        let mut pkg = Package::new(&reg, "dis", "dis").unwrap();
        pkg.read_str(DIS_FILE, "dis.dis", &dims).unwrap();
        let nrow = pkg.get_data("nrow", None, &dims).unwrap();
        assert_eq!(nrow, DataValue::Scalar(crate::value::Value::Int(2)));
    }

    #[test]
    fn constant_array_reformats_on_write() {
        let reg = registry();
        let dims = dims();
        let mut pkg = Package::new(&reg, "dis", "dis").unwrap();
        pkg.read_str(DIS_FILE, "dis.dis", &dims).unwrap();
        let out = pkg.write_to_string(&dims).unwrap();
        assert!(out.contains("CONSTANT 5.00000000"), "got:\n{}", out);
    }

    #[test]
    fn dimensions_block_shapes_arrays_later_in_the_file() {
        let reg = registry();
        let empty: HashMap<String, i64> = HashMap::new();
        let mut pkg = Package::new(&reg, "dis", "dis").unwrap();
        pkg.read_str(
            "BEGIN DIMENSIONS\n  NLAY 1\n  NROW 2\n  NCOL 2\nEND DIMENSIONS\n\n\
             BEGIN GRIDDATA\n  BOTM\n    INTERNAL\n      1.0 2.0\n      3.0 4.0\nEND GRIDDATA\n",
            "dis.dis",
            &empty,
        )
        .unwrap();
        match pkg.get_data("botm", None, &dims()).unwrap() {
            DataValue::Array(a) => assert_eq!(a.shape, vec![2, 2]),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn unknown_block_is_fatal_without_extension_flag() {
        let reg = registry();
        let dims = dims();
        let mut pkg = Package::new(&reg, "dis", "dis").unwrap();
        let text = "BEGIN MYSTERY\n  X 1\nEND MYSTERY\n";
        let err = pkg.read_str(text, "dis.dis", &dims).unwrap_err();
        assert!(matches!(err, DataError::Parse { .. }));
    }

    #[test]
    fn transient_data_requires_a_period() {
        let reg = registry();
        let dims = dims();
        let mut pkg = Package::new(&reg, "chd", "chd-1").unwrap();
        let text = "\
BEGIN DIMENSIONS
  MAXBOUND 10
END DIMENSIONS

BEGIN PERIOD 1
  1 1 1 10.0
END PERIOD
";
        pkg.read_str(text, "chd.chd", &dims).unwrap();
        assert!(matches!(
            pkg.get_data("stress_period_data", None, &dims),
            Err(DataError::InvalidPeriod { .. })
        ));
        let rows = pkg
            .get_data("stress_period_data", Some(3), &dims)
            .unwrap();
        match rows {
            DataValue::Table(rows) => assert_eq!(rows.len(), 1),
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn period_zero_reads_as_no_data() {
        let reg = registry();
        let dims = dims();
        let mut pkg = Package::new(&reg, "chd", "chd-1").unwrap();
        pkg.read_str(
            "BEGIN DIMENSIONS\n  MAXBOUND 10\nEND DIMENSIONS\n\n\
             BEGIN PERIOD 1\n  1 1 1 10.0\nEND PERIOD\n",
            "chd.chd",
            &dims,
        )
        .unwrap();
        // nothing is in force before the first stress period
        assert!(matches!(
            pkg.get_data("stress_period_data", Some(0), &dims),
            Err(DataError::NoData { .. })
        ));
        // setting still requires a positive period
        assert!(matches!(
            pkg.set_data(
                "stress_period_data",
                Some(0),
                DataValue::Table(Vec::new()),
                &dims
            ),
            Err(DataError::InvalidPeriod { .. })
        ));
    }

    #[test]
    fn missing_required_block_on_write() {
        let reg = registry();
        let dims = dims();
        let pkg = Package::new(&reg, "dis", "dis").unwrap();
        let err = pkg.write_to_string(&dims).unwrap_err();
        assert!(matches!(err, DataError::MissingRequiredBlock { .. }));
    }
}
