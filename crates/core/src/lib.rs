//! Runtime data layer for block-structured simulation input files.
//!
//! Text in the `BEGIN <block> ... END <block>` format is parsed against a
//! specification from [`mfio_spec`] into typed containers, mutated through
//! validated `get`/`set` operations, and written back with canonical
//! formatting. Unmodified data round-trips semantically: storage modes
//! (CONSTANT / INTERNAL / OPEN/CLOSE), factors, and keystring variants
//! survive a load/write cycle.

pub mod block;
pub mod container;
pub mod error;
pub mod format;
pub mod lexer;
pub mod model;
pub mod package;
pub mod value;

pub use block::Block;
pub use container::{
    ArrayData, ArrayStorage, ArrayValue, ArrayValues, Container, ContainerValue, DataValue,
    IoCtx, Row, ScalarData, TabularData, Transient,
};
pub use error::DataError;
pub use model::{Model, Simulation};
pub use package::Package;
pub use value::{CellId, Value};
