//! The immutable specification tree: package -> block -> data structure ->
//! data item.
//!
//! These types are produced once by the dfn parser and shared by reference
//! (`Arc<PackageSpec>`) from every package instance of the same type. They
//! are never mutated after registry construction.

use serde::Serialize;

use crate::shape::ShapeExpr;

// ──────────────────────────────────────────────
// Data items
// ──────────────────────────────────────────────

/// Primitive kind of a data item.
///
/// `Record` and `Keystring` are compound: their components are resolved to
/// concrete item specs at registry-build time, never re-derived from text
/// at runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ItemKind {
    /// Bare keyword; presence is the value.
    Keyword,
    Integer,
    Double,
    String,
    /// A path-valued string; quoting survives round-trips.
    Filename,
    /// Fixed component sequence read/written as one line fragment.
    Record(Vec<DataItemSpec>),
    /// Tagged union: the leading token on the line selects the variant.
    Keystring(Vec<KeystringVariant>),
}

/// One legal variant of a keystring item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeystringVariant {
    /// Discriminator token (lowercase).
    pub name: String,
    pub items: Vec<DataItemSpec>,
}

/// The leaf metadata unit of the specification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataItemSpec {
    /// Lowercase item name.
    pub name: String,
    pub kind: ItemKind,
    /// Symbolic shape; presence on a numeric free-standing item makes it
    /// an array item.
    pub shape: Option<ShapeExpr>,
    pub optional: bool,
    /// Whether the item name precedes the value on the data line.
    pub tagged: bool,
    pub default_value: Option<String>,
    /// Value is a 1-based index on disk, 0-based in memory.
    pub numeric_index: bool,
    /// Render upper-cased on write.
    pub ucase: bool,
    /// Enumerated legal values; empty means unconstrained.
    pub valid: Vec<String>,
    pub description: Option<String>,
}

impl DataItemSpec {
    /// Cellid items are integer tuples with special 1-based/flat-node
    /// handling; following the original convention they are recognized
    /// by name.
    pub fn is_cellid(&self) -> bool {
        self.name == "cellid" || self.name.starts_with("cellid_")
    }
}

// ──────────────────────────────────────────────
// Data structures
// ──────────────────────────────────────────────

/// How a data structure stores and serializes its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StructureKind {
    /// Single typed value or presence flag.
    Scalar,
    /// Homogeneous N-dimensional numeric grid with a storage-mode control
    /// line (CONSTANT / INTERNAL / OPEN/CLOSE).
    Array,
    /// Row-per-line table; `repeating` distinguishes recarrays from
    /// one-shot records.
    Table,
}

/// A group of data items read/written together as a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataStructureSpec {
    /// Lowercase structure name; unique within the package.
    pub name: String,
    pub kind: StructureKind,
    /// For `Scalar`/`Array`: exactly one item. For `Table`: the columns.
    pub items: Vec<DataItemSpec>,
    /// Zero or more occurrences (recarray rows) vs exactly one.
    pub repeating: bool,
    pub optional: bool,
}

impl DataStructureSpec {
    /// The single item of a scalar/array structure.
    pub fn item(&self) -> &DataItemSpec {
        &self.items[0]
    }
}

// ──────────────────────────────────────────────
// Blocks and packages
// ──────────────────────────────────────────────

/// An ordered, named section of a package file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSpec {
    /// Lowercase block name.
    pub name: String,
    pub structures: Vec<DataStructureSpec>,
    /// Block recurs once per stress period (`BEGIN PERIOD <iper>`).
    pub transient: bool,
    /// Name of the block-variable header item (e.g. `iper`), when transient.
    pub index_item: Option<String>,
}

impl BlockSpec {
    pub fn structure(&self, name: &str) -> Option<&DataStructureSpec> {
        self.structures.iter().find(|s| s.name == name)
    }

    /// A block with only optional structures may be omitted entirely.
    pub fn required(&self) -> bool {
        self.structures.iter().any(|s| !s.optional)
    }
}

/// The top-level addressable specification unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageSpec {
    /// Lowercase package type tag (e.g. `npf`, `dis`, `chd`).
    pub package_type: String,
    pub blocks: Vec<BlockSpec>,
    /// The same package type may appear more than once per model, under
    /// distinct user-assigned names.
    pub multi_package: bool,
    /// Unrecognized trailing blocks are preserved verbatim instead of
    /// being a fatal parse error.
    pub extension_blocks: bool,
}

impl PackageSpec {
    pub fn block(&self, name: &str) -> Option<&BlockSpec> {
        let lower = name.to_ascii_lowercase();
        self.blocks.iter().find(|b| b.name == lower)
    }

    /// Locate a data structure anywhere in the package.
    pub fn structure(&self, name: &str) -> Option<(&BlockSpec, &DataStructureSpec)> {
        let lower = name.to_ascii_lowercase();
        for block in &self.blocks {
            if let Some(s) = block.structure(&lower) {
                return Some((block, s));
            }
        }
        None
    }
}
