//! mfio-spec: input-file specification metadata for mfio.
//!
//! Parses declarative definition (dfn) sources into the immutable
//! specification tree `PackageSpec -> BlockSpec -> DataStructureSpec ->
//! DataItemSpec`, and exposes the process-wide [`Registry`] over all
//! registered package types.
//!
//! Key types are re-exported at the crate root:
//!
//! - [`Registry`] plus the [`registry::init`] / [`registry::global`]
//!   process-wide lifecycle
//! - the spec tree: [`PackageSpec`], [`BlockSpec`], [`DataStructureSpec`],
//!   [`DataItemSpec`], [`ItemKind`]
//! - [`ShapeExpr`] and the [`DimensionResolver`] seam
//! - [`SpecError`]

pub mod dfn;
pub mod error;
pub mod registry;
pub mod shape;
pub mod tree;

pub use dfn::parse_dfn;
pub use error::SpecError;
pub use registry::Registry;
pub use shape::{DimensionResolver, ShapeDim, ShapeExpr, ShapeFactor};
pub use tree::{
    BlockSpec, DataItemSpec, DataStructureSpec, ItemKind, KeystringVariant, PackageSpec,
    StructureKind,
};
