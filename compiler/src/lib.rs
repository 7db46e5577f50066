//! sheetpack-compiler
//!
//! This crate implements the sheetpack core:
//!  1) A parser for the unified collection/delimiter type syntax,
//!  2) A type registry that resolves named types into a frozen, validated
//!     graph (unknown references, recursive structs, delimiter depth,
//!     primary keys),
//!  3) Value coercion from raw cell content (delimited text or JSON) into
//!     typed value trees,
//!  4) The canonical binary encoder plus its layout trace,
//!  5) The per-table pipeline with parallel fan-out, and
//!  6) The schema descriptor export consumed by external code renderers.

pub mod coerce;
pub mod encode;
pub mod error;
pub mod export;
pub mod parser;
pub mod registry;
pub mod table;
pub mod types;

pub use coerce::{coerce, CellContent};
pub use encode::{encode_singleton, encode_table, LayoutWriter};
pub use error::SheetError;
pub use export::{export, SchemaDescriptor};
pub use parser::parse_field_type;
pub use registry::{ReadInfo, ReadShape, TableInfo, TableMode, TypeGraph};
pub use table::{compile_table, compile_tables, TableArtifact, TableData, TableJob};
pub use types::{FieldType, Primitive, TableDecl, TypeExpr, TypeModule};
