use serde::Serialize;

use crate::registry::{NamedType, ReadInfo, ReadShape, TableInfo, TableMode, TypeGraph};
use crate::types::Primitive;

/// The flattened, serializable form of a frozen [`TypeGraph`], handed to
/// external code renderers. It carries no behavior; per field it exposes
/// everything a renderer needs to reproduce the encoder's byte layout
/// independently (primitive widths and read methods, enum ordinal width,
/// collection element shapes, struct field order, delimiter lists).
#[derive(Debug, Clone, Serialize)]
pub struct SchemaDescriptor {
    pub types: Vec<TypeDescriptor>,
    pub tables: Vec<TableDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub kind: TypeKind,
    pub target_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<EnumMemberDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldDescriptor>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Enum,
    Struct,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumMemberDescriptor {
    pub name: String,
    pub ordinal: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
    pub type_syntax: String,
    pub read: ReadDescriptor,
}

/// The per-field read recipe. Exactly one of the `is_*` flags is set; for
/// collections `element` describes the item and the whole nesting repeats
/// inside it.
#[derive(Debug, Clone, Serialize)]
pub struct ReadDescriptor {
    pub kind: ReadKind,
    pub is_primitive: bool,
    pub is_enum: bool,
    pub is_complex: bool,
    pub is_collection: bool,
    /// Named type behind an enum/struct node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Reader routine for primitives and enums (enums read as `read_int`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_method: Option<&'static str>,
    /// Fixed encoded width; absent for strings, structs and collections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_width: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<Box<ReadDescriptor>>,
    /// Delimiter list of the declaring field, outer level first. Only set on
    /// the outermost descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiters: Option<Vec<String>>,
}

fn describe_shape(shape: &ReadShape) -> ReadDescriptor {
    match shape {
        ReadShape::Primitive(p) => ReadDescriptor {
            kind: ReadKind::Primitive,
            is_primitive: true,
            is_enum: false,
            is_complex: false,
            is_collection: false,
            type_name: None,
            read_method: Some(p.read_method()),
            byte_width: p.byte_width(),
            element: None,
            delimiters: None,
        },
        ReadShape::Enum(name) => ReadDescriptor {
            kind: ReadKind::Enum,
            is_primitive: false,
            is_enum: true,
            is_complex: false,
            is_collection: false,
            type_name: Some(name.clone()),
            read_method: Some(Primitive::Int.read_method()),
            byte_width: Primitive::Int.byte_width(),
            element: None,
            delimiters: None,
        },
        ReadShape::Struct(name) => ReadDescriptor {
            kind: ReadKind::Struct,
            is_primitive: false,
            is_enum: false,
            is_complex: true,
            is_collection: false,
            type_name: Some(name.clone()),
            read_method: None,
            byte_width: None,
            element: None,
            delimiters: None,
        },
        ReadShape::Collection(item) => ReadDescriptor {
            kind: ReadKind::Collection,
            is_primitive: false,
            is_enum: false,
            is_complex: false,
            is_collection: true,
            type_name: None,
            read_method: None,
            byte_width: None,
            element: Some(Box::new(describe_shape(item))),
            delimiters: None,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadKind {
    Primitive,
    Enum,
    Struct,
    Collection,
}

/// Describes one resolved field, delimiters included.
pub fn describe_read(read: &ReadInfo) -> ReadDescriptor {
    let mut descriptor = describe_shape(&read.shape);
    descriptor.delimiters = read.delimiters.clone();
    descriptor
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDescriptor {
    pub source: String,
    pub output: String,
    pub mode: TableModeDescriptor,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableModeDescriptor {
    Standard,
    Flat,
}

/// Flattens a frozen graph into its serializable descriptor. Types come out
/// in sorted name order so regeneration is diffable.
pub fn export(graph: &TypeGraph) -> SchemaDescriptor {
    let mut types = Vec::new();
    for name in graph.type_names() {
        match graph.get(name) {
            Some(NamedType::Enum(info)) => types.push(TypeDescriptor {
                name: info.name.clone(),
                kind: TypeKind::Enum,
                target_path: info.target_path.clone(),
                comment: info.comment.clone(),
                members: Some(
                    info.members
                        .iter()
                        .map(|(n, v)| EnumMemberDescriptor {
                            name: n.clone(),
                            ordinal: *v,
                        })
                        .collect(),
                ),
                fields: None,
            }),
            Some(NamedType::Struct(info)) => types.push(TypeDescriptor {
                name: info.name.clone(),
                kind: TypeKind::Struct,
                target_path: info.target_path.clone(),
                comment: info.comment.clone(),
                members: None,
                fields: Some(
                    info.fields
                        .iter()
                        .map(|f| FieldDescriptor {
                            name: f.name.clone(),
                            comment: f.comment.clone(),
                            type_syntax: f.type_syntax.clone(),
                            read: describe_read(&f.read),
                        })
                        .collect(),
                ),
            }),
            None => {}
        }
    }

    let tables = graph
        .tables()
        .iter()
        .map(|table: &TableInfo| TableDescriptor {
            source: table.source.clone(),
            output: table.target_type.clone(),
            mode: match table.mode {
                TableMode::Standard => TableModeDescriptor::Standard,
                TableMode::Flat => TableModeDescriptor::Flat,
            },
            comment: table.comment.clone(),
            primary_key: table.primary_key.clone(),
        })
        .collect();

    SchemaDescriptor { types, tables }
}
