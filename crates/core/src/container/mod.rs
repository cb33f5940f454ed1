//! Runtime value containers.
//!
//! Three concrete holders -- [`ScalarData`], [`ArrayData`], [`TabularData`]
//! -- share one capability contract (set / get / read_from / write_to),
//! and [`Transient`] wraps any of them with per-stress-period carry-forward
//! semantics. No inheritance tree: block and package code dispatch over
//! [`ContainerValue`].

mod array;
mod scalar;
mod table;
mod transient;

pub use array::{ArrayData, ArrayStorage, ArrayValue, ArrayValues};
pub use scalar::ScalarData;
pub use table::{Row, TabularData};
pub use transient::Transient;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use mfio_spec::{DataStructureSpec, DimensionResolver, StructureKind};

use crate::error::DataError;
use crate::value::Value;

/// Shared context for container I/O: the dimension callback into the
/// owning model and the directory external file references resolve
/// against.
pub struct IoCtx<'a> {
    pub resolver: &'a dyn DimensionResolver,
    pub base_dir: &'a Path,
}

/// A language-native value moving across the `set`/`get` boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DataValue {
    /// Keyword presence.
    Flag(bool),
    Scalar(Value),
    Array(ArrayValue),
    Table(Vec<Row>),
}

/// One concrete container, matching its structure's [`StructureKind`].
#[derive(Debug, Clone)]
pub enum ContainerValue {
    Scalar(ScalarData),
    Array(ArrayData),
    Table(TabularData),
}

impl ContainerValue {
    pub fn empty_for(structure: &DataStructureSpec) -> ContainerValue {
        match structure.kind {
            StructureKind::Scalar => ContainerValue::Scalar(ScalarData::new()),
            StructureKind::Array => ContainerValue::Array(ArrayData::new()),
            StructureKind::Table => ContainerValue::Table(TabularData::new()),
        }
    }

    pub fn is_set(&self) -> bool {
        match self {
            ContainerValue::Scalar(s) => s.is_set(),
            ContainerValue::Array(a) => a.is_set(),
            ContainerValue::Table(t) => !t.is_empty(),
        }
    }

    /// Current value in language-native form. Arrays expand lazily against
    /// the context; external arrays re-read their file on every call.
    pub fn get(
        &self,
        structure: &DataStructureSpec,
        ctx: &IoCtx,
    ) -> Result<DataValue, DataError> {
        match self {
            ContainerValue::Scalar(s) => {
                let value = s.get(&structure.name)?;
                match value {
                    Value::Keyword(_) => Ok(DataValue::Flag(true)),
                    other => Ok(DataValue::Scalar(other.clone())),
                }
            }
            ContainerValue::Array(a) => Ok(DataValue::Array(a.get(structure.item(), ctx)?)),
            ContainerValue::Table(t) => {
                if t.is_empty() {
                    return Err(DataError::NoData {
                        name: structure.name.clone(),
                    });
                }
                Ok(DataValue::Table(t.rows().to_vec()))
            }
        }
    }

    /// Replace the current value, validating shape and type against the
    /// structure. On failure the prior value is retained.
    pub fn set(
        &mut self,
        structure: &DataStructureSpec,
        value: DataValue,
        ctx: &IoCtx,
    ) -> Result<(), DataError> {
        match (self, value) {
            (ContainerValue::Scalar(s), DataValue::Flag(true)) => {
                s.set(Value::Keyword(structure.item().name.clone()));
                Ok(())
            }
            (ContainerValue::Scalar(s), DataValue::Flag(false)) => {
                s.clear();
                Ok(())
            }
            (ContainerValue::Scalar(s), DataValue::Scalar(v)) => {
                s.set_checked(v, structure.item())
            }
            // A scalar on an array structure selects CONSTANT storage.
            (ContainerValue::Array(a), DataValue::Scalar(v)) => {
                a.set_constant(v, structure.item())
            }
            (ContainerValue::Array(a), DataValue::Array(av)) => {
                a.set_internal(av, structure.item(), ctx)
            }
            (ContainerValue::Table(t), DataValue::Table(rows)) => {
                t.set_rows(rows, structure)
            }
            (this, other) => Err(DataError::coercion(
                kind_name(this),
                format!("{:?}", other),
                &structure.name,
            )),
        }
    }

    /// Render into block-file text form. Side-effect free.
    pub fn write_to(
        &self,
        out: &mut String,
        structure: &DataStructureSpec,
        ctx: &IoCtx,
    ) -> Result<(), DataError> {
        match self {
            ContainerValue::Scalar(s) => s.write_to(out, structure.item()),
            ContainerValue::Array(a) => a.write_to(out, structure.item(), ctx),
            ContainerValue::Table(t) => t.write_to(out, structure),
        }
    }
}

fn kind_name(c: &ContainerValue) -> &'static str {
    match c {
        ContainerValue::Scalar(_) => "scalar",
        ContainerValue::Array(_) => "array",
        ContainerValue::Table(_) => "table",
    }
}

/// Storage slot for one data structure inside a runtime block: static for
/// ordinary blocks, period-keyed for transient blocks.
#[derive(Debug, Clone)]
pub enum Container {
    Static(ContainerValue),
    Transient(Transient<ContainerValue>),
}

impl Container {
    pub fn new(structure: &DataStructureSpec, transient: bool) -> Container {
        if transient {
            Container::Transient(Transient::new())
        } else {
            Container::Static(ContainerValue::empty_for(structure))
        }
    }

    pub fn is_populated(&self) -> bool {
        match self {
            Container::Static(v) => v.is_set(),
            Container::Transient(t) => !t.is_empty(),
        }
    }

    /// Explicitly-set stress periods, ascending. Empty for static data.
    pub fn explicit_periods(&self) -> Vec<u32> {
        match self {
            Container::Static(_) => Vec::new(),
            Container::Transient(t) => t.periods(),
        }
    }
}

/// A populated transient occurrence keyed by structure name, built while
/// reading one `BEGIN PERIOD` block before insertion into the containers.
pub type Occurrence = BTreeMap<String, ContainerValue>;
