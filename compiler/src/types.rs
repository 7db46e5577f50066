use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The fixed primitive keyword set of the type syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Int,
    Long,
    Float,
    Bool,
    #[serde(rename = "string")]
    Str,
}

impl Primitive {
    pub fn from_keyword(word: &str) -> Option<Primitive> {
        match word {
            "int" => Some(Primitive::Int),
            "long" => Some(Primitive::Long),
            "float" => Some(Primitive::Float),
            "bool" => Some(Primitive::Bool),
            "string" => Some(Primitive::Str),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Bool => "bool",
            Primitive::Str => "string",
        }
    }

    /// Encoded width in bytes. Strings are length-prefixed, not fixed-width.
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            Primitive::Int => Some(4),
            Primitive::Long => Some(8),
            Primitive::Float => Some(4),
            Primitive::Bool => Some(1),
            Primitive::Str => None,
        }
    }

    /// The reader routine a target renderer must emit for this primitive.
    pub fn read_method(&self) -> &'static str {
        match self {
            Primitive::Int => "read_int",
            Primitive::Long => "read_long",
            Primitive::Float => "read_float",
            Primitive::Bool => "read_bool",
            Primitive::Str => "read_string",
        }
    }
}

/// An unresolved type expression, straight out of the parser. Identifiers are
/// kept as [`Reference`](TypeExpr::Reference) for the registry to bind.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Primitive(Primitive),
    Reference(String),
    List(Box<TypeExpr>),
}

impl TypeExpr {
    /// Number of `list(...)` wrappers along the spine of this expression.
    pub fn collection_depth(&self) -> usize {
        match self {
            TypeExpr::List(inner) => 1 + inner.collection_depth(),
            _ => 0,
        }
    }

    /// The expression inside every `list(...)` wrapper.
    pub fn innermost(&self) -> &TypeExpr {
        match self {
            TypeExpr::List(inner) => inner.innermost(),
            other => other,
        }
    }
}

/// A parsed field type: the expression plus the optional delimiter list from
/// the trailing bracket, outer level first. `delimiters = None` means the
/// source cell is JSON for every collection/struct level along this branch.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldType {
    pub expr: TypeExpr,
    pub delimiters: Option<Vec<String>>,
}

/// One field (or flat-table property) declaration: name, unified type syntax
/// and comment, as found in a `FieldSequence` entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldDecl {
    #[serde(rename = "Field")]
    pub field: String,
    #[serde(rename = "Type")]
    pub type_syntax: String,
    #[serde(default, rename = "Comment")]
    pub comment: String,
}

/// One named-type declaration out of a metadata module: an enum when
/// `TargetTypeAsEnum` is set, otherwise a struct with an ordered field list.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeDecl {
    /// Output path for renderers, e.g. `items/ItemInfo`. The last path
    /// segment is the rendered type name.
    #[serde(rename = "TargetType")]
    pub target_type: String,
    #[serde(default, rename = "Comment")]
    pub comment: String,
    #[serde(default, rename = "TargetTypeAsEnum")]
    pub as_enum: bool,
    #[serde(default, rename = "EnumMembers")]
    pub enum_members: BTreeMap<String, i32>,
    #[serde(default, rename = "FieldSequence")]
    pub field_sequence: Vec<FieldDecl>,
}

/// A metadata module: named-type declarations plus the modules it imports
/// (import resolution happens at load time; names are global once loaded).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TypeModule {
    #[serde(default, rename = "ImportTypes")]
    pub import_types: Vec<String>,
    #[serde(default, rename = "TypeDefines")]
    pub type_defines: BTreeMap<String, TypeDecl>,
}

/// A table declaration. `Standard` tables carry their row layout in
/// `FieldSequence` and key rows by `PrimaryKeyFields`; `Flat` tables are a
/// singleton whose properties arrive with the row data instead.
#[derive(Debug, Clone, Deserialize)]
pub struct TableDecl {
    /// Source identifier (sheet base name); fills from the file stem when the
    /// declaration file doesn't carry one.
    #[serde(default, rename = "Source")]
    pub source: String,
    #[serde(rename = "TargetType")]
    pub target_type: String,
    #[serde(default, rename = "IsFlatTable")]
    pub is_flat_table: bool,
    #[serde(default, rename = "Comment")]
    pub comment: String,
    #[serde(default, rename = "ImportTypes")]
    pub import_types: Vec<String>,
    #[serde(default, rename = "PrimaryKeyFields")]
    pub primary_key_fields: Vec<String>,
    #[serde(default, rename = "FieldSequence")]
    pub field_sequence: Vec<FieldDecl>,
}

impl TableDecl {
    pub fn with_source(mut self, source: &str) -> TableDecl {
        if self.source.is_empty() {
            self.source = source.to_owned();
        }
        self
    }
}
