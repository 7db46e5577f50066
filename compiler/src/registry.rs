use std::collections::HashMap;

use tracing::{debug, info};

use crate::{
    error::SheetError,
    parser::parse_field_type,
    types::{FieldType, Primitive, TableDecl, TypeDecl, TypeExpr, TypeModule},
};

/// A resolved, acyclic per-field shape descriptor. Struct and enum nodes
/// refer back into the frozen [`TypeGraph`] by name, which keeps
/// self-reference through a collection representable without making the
/// descriptor itself infinite.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadShape {
    Primitive(Primitive),
    Enum(String),
    Struct(String),
    Collection(Box<ReadShape>),
}

impl ReadShape {
    pub fn is_collection(&self) -> bool {
        matches!(self, ReadShape::Collection(_))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, ReadShape::Primitive(_))
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, ReadShape::Enum(_))
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, ReadShape::Struct(_))
    }

    /// Number of collection wrappers along the spine of this shape.
    pub fn collection_depth(&self) -> usize {
        match self {
            ReadShape::Collection(item) => 1 + item.collection_depth(),
            _ => 0,
        }
    }

    /// The element shape inside every collection wrapper.
    pub fn innermost(&self) -> &ReadShape {
        match self {
            ReadShape::Collection(item) => item.innermost(),
            other => other,
        }
    }
}

/// A fully resolved field shape: the [`ReadShape`] plus the delimiter list
/// from the field's declaration (outer level first). `None` means the source
/// cell is JSON for every collection/struct level of this field.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadInfo {
    pub shape: ReadShape,
    pub delimiters: Option<Vec<String>>,
}

/// A resolved enum: ordered members and both lookup directions.
#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub name: String,
    pub target_path: String,
    pub comment: String,
    /// Members sorted by ordinal.
    pub members: Vec<(String, i32)>,
    by_name: HashMap<String, i32>,
}

impl EnumInfo {
    pub fn ordinal_of(&self, member: &str) -> Option<i32> {
        self.by_name.get(member).copied()
    }

    pub fn name_of(&self, ordinal: i32) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, v)| *v == ordinal)
            .map(|(n, _)| n.as_str())
    }

    pub fn contains_ordinal(&self, ordinal: i32) -> bool {
        self.members.iter().any(|(_, v)| *v == ordinal)
    }
}

/// A resolved struct field.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub comment: String,
    pub type_syntax: String,
    pub read: ReadInfo,
}

/// A resolved struct: ordered fields, order is authoritative for layout.
#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: String,
    pub target_path: String,
    pub comment: String,
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug, Clone)]
pub enum NamedType {
    Enum(EnumInfo),
    Struct(StructInfo),
}

impl NamedType {
    pub fn name(&self) -> &str {
        match self {
            NamedType::Enum(info) => &info.name,
            NamedType::Struct(info) => &info.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMode {
    Standard,
    Flat,
}

/// A resolved table. For `Standard` tables the row layout is the struct
/// registered under `target_type`; `Flat` tables get their properties with
/// the row data instead.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub source: String,
    pub target_type: String,
    pub mode: TableMode,
    pub comment: String,
    pub primary_key: Vec<String>,
}

/// The frozen type graph: every named type and table, resolved and
/// validated. Built once per generation run, then shared read-only by the
/// coercer, encoder, decoder and exporter; nothing mutates it afterwards.
#[derive(Debug)]
pub struct TypeGraph {
    types: HashMap<String, NamedType>,
    tables: Vec<TableInfo>,
}

impl TypeGraph {
    /// Registers every declared name, resolves all field expressions,
    /// validates the graph (cycles, delimiter depth, primary keys) and
    /// freezes it.
    pub fn build(modules: &[TypeModule], tables: &[TableDecl]) -> Result<TypeGraph, SheetError> {
        // 1) Register every declared name. A Standard table's field sequence
        //    is itself a struct declaration under the table's target type.
        let mut decls: Vec<(String, TypeDecl)> = Vec::new();
        for module in modules {
            for (name, decl) in &module.type_defines {
                decls.push((name.clone(), decl.clone()));
            }
        }
        for table in tables {
            if !table.is_flat_table {
                decls.push((
                    table.target_type.clone(),
                    TypeDecl {
                        target_type: table.target_type.clone(),
                        comment: table.comment.clone(),
                        as_enum: false,
                        enum_members: Default::default(),
                        field_sequence: table.field_sequence.clone(),
                    },
                ));
            }
        }

        let mut names: HashMap<String, usize> = HashMap::new();
        for (i, (name, _)) in decls.iter().enumerate() {
            if Primitive::from_keyword(name).is_some() || names.insert(name.clone(), i).is_some() {
                return Err(SheetError::DuplicateType(name.clone()));
            }
            debug!(name = %name, "registered type");
        }

        // 2) Resolve every field expression against the name table.
        let mut types: HashMap<String, NamedType> = HashMap::new();
        for (name, decl) in &decls {
            let resolved = if decl.as_enum {
                let mut members: Vec<(String, i32)> = decl
                    .enum_members
                    .iter()
                    .map(|(n, v)| (n.clone(), *v))
                    .collect();
                members.sort_by_key(|(_, v)| *v);
                let by_name = members.iter().map(|(n, v)| (n.clone(), *v)).collect();
                NamedType::Enum(EnumInfo {
                    name: name.clone(),
                    target_path: decl.target_type.clone(),
                    comment: decl.comment.clone(),
                    members,
                    by_name,
                })
            } else {
                let mut fields = Vec::with_capacity(decl.field_sequence.len());
                for field_decl in &decl.field_sequence {
                    let parsed = parse_field_type(&field_decl.type_syntax)?;
                    let read = resolve_field(&field_decl.field, &parsed, &names, &decls)?;
                    validate_delimiters(&field_decl.field, &field_decl.type_syntax, &read)?;
                    fields.push(FieldInfo {
                        name: field_decl.field.clone(),
                        comment: field_decl.comment.clone(),
                        type_syntax: field_decl.type_syntax.clone(),
                        read,
                    });
                }
                NamedType::Struct(StructInfo {
                    name: name.clone(),
                    target_path: decl.target_type.clone(),
                    comment: decl.comment.clone(),
                    fields,
                })
            };
            types.insert(name.clone(), resolved);
        }

        // 3) Reject structs that reach themselves through only non-collection
        //    edges. A collection boundary is bounded by a runtime count, so
        //    recursion through it stays finite.
        let mut state: HashMap<String, u8> = HashMap::new();
        let mut stack: Vec<String> = Vec::new();
        for (name, _) in &decls {
            check_recursion(name, &types, &mut state, &mut stack)?;
        }

        // 4) Resolve tables: primary keys must name declared fields and be
        //    hashable scalars.
        let mut table_infos = Vec::with_capacity(tables.len());
        for table in tables {
            let mode = if table.is_flat_table {
                TableMode::Flat
            } else {
                TableMode::Standard
            };
            if mode == TableMode::Standard {
                let row_struct = match types.get(&table.target_type) {
                    Some(NamedType::Struct(info)) => info,
                    _ => {
                        return Err(SheetError::UnknownType {
                            name: table.target_type.clone(),
                            field: table.source.clone(),
                        })
                    }
                };
                for key_field in &table.primary_key_fields {
                    let field = row_struct
                        .fields
                        .iter()
                        .find(|f| &f.name == key_field)
                        .ok_or_else(|| SheetError::UnknownField {
                            table: table.source.clone(),
                            field: key_field.clone(),
                        })?;
                    let scalar = match &field.read.shape {
                        ReadShape::Primitive(Primitive::Float) => false,
                        ReadShape::Primitive(_) | ReadShape::Enum(_) => true,
                        _ => false,
                    };
                    if !scalar {
                        return Err(SheetError::InvalidPrimaryKey {
                            table: table.source.clone(),
                            field: key_field.clone(),
                        });
                    }
                }
            }
            table_infos.push(TableInfo {
                source: table.source.clone(),
                target_type: table.target_type.clone(),
                mode,
                comment: table.comment.clone(),
                primary_key: table.primary_key_fields.clone(),
            });
        }

        info!(
            types = types.len(),
            tables = table_infos.len(),
            "type graph frozen"
        );
        Ok(TypeGraph {
            types,
            tables: table_infos,
        })
    }

    pub fn get(&self, name: &str) -> Option<&NamedType> {
        self.types.get(name)
    }

    /// Looks up a struct the graph is known to contain. A miss means the
    /// caller is holding a shape that never went through [`TypeGraph::build`].
    pub fn struct_info(&self, name: &str) -> Result<&StructInfo, SheetError> {
        match self.types.get(name) {
            Some(NamedType::Struct(info)) => Ok(info),
            _ => Err(SheetError::Internal(format!(
                "struct {:?} is not in the frozen graph",
                name
            ))),
        }
    }

    /// Looks up an enum the graph is known to contain.
    pub fn enum_info(&self, name: &str) -> Result<&EnumInfo, SheetError> {
        match self.types.get(name) {
            Some(NamedType::Enum(info)) => Ok(info),
            _ => Err(SheetError::Internal(format!(
                "enum {:?} is not in the frozen graph",
                name
            ))),
        }
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn table(&self, source: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.source == source)
    }

    /// Type names in deterministic (sorted) order, for export.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(|n| n.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Resolves a parsed field type against the frozen graph. Used for
    /// flat-table properties, whose type syntax arrives with the row data
    /// after the graph is built.
    pub fn resolve(&self, field: &str, parsed: &FieldType) -> Result<ReadInfo, SheetError> {
        let shape = self.resolve_expr(field, &parsed.expr)?;
        let read = ReadInfo {
            shape,
            delimiters: parsed.delimiters.clone(),
        };
        validate_delimiters(field, field, &read)?;
        Ok(read)
    }

    fn resolve_expr(&self, field: &str, expr: &TypeExpr) -> Result<ReadShape, SheetError> {
        match expr {
            TypeExpr::Primitive(p) => Ok(ReadShape::Primitive(*p)),
            TypeExpr::List(inner) => Ok(ReadShape::Collection(Box::new(
                self.resolve_expr(field, inner)?,
            ))),
            TypeExpr::Reference(name) => match self.types.get(name) {
                Some(NamedType::Enum(_)) => Ok(ReadShape::Enum(name.clone())),
                Some(NamedType::Struct(_)) => Ok(ReadShape::Struct(name.clone())),
                None => Err(SheetError::UnknownType {
                    name: name.clone(),
                    field: field.to_owned(),
                }),
            },
        }
    }
}

/// Resolves one parsed field expression during graph construction, before
/// the final type table exists.
fn resolve_field(
    field: &str,
    parsed: &FieldType,
    names: &HashMap<String, usize>,
    decls: &[(String, TypeDecl)],
) -> Result<ReadInfo, SheetError> {
    fn resolve_expr(
        field: &str,
        expr: &TypeExpr,
        names: &HashMap<String, usize>,
        decls: &[(String, TypeDecl)],
    ) -> Result<ReadShape, SheetError> {
        match expr {
            TypeExpr::Primitive(p) => Ok(ReadShape::Primitive(*p)),
            TypeExpr::List(inner) => Ok(ReadShape::Collection(Box::new(resolve_expr(
                field, inner, names, decls,
            )?))),
            TypeExpr::Reference(name) => {
                let index = names.get(name).ok_or_else(|| SheetError::UnknownType {
                    name: name.clone(),
                    field: field.to_owned(),
                })?;
                if decls[*index].1.as_enum {
                    Ok(ReadShape::Enum(name.clone()))
                } else {
                    Ok(ReadShape::Struct(name.clone()))
                }
            }
        }
    }

    Ok(ReadInfo {
        shape: resolve_expr(field, &parsed.expr, names, decls)?,
        delimiters: parsed.delimiters.clone(),
    })
}

/// A present delimiter list must cover every collection level exactly;
/// entries beyond the collection depth are legal only when the innermost
/// element is a struct (they split its field groups positionally).
fn validate_delimiters(field: &str, text: &str, read: &ReadInfo) -> Result<(), SheetError> {
    let delimiters = match &read.delimiters {
        Some(list) => list,
        None => return Ok(()),
    };
    let required = read.shape.collection_depth();
    let given = delimiters.len();
    if given < required || (given > required && !read.shape.innermost().is_complex()) {
        return Err(SheetError::DelimiterDepth {
            field: field.to_owned(),
            text: text.to_owned(),
            given,
            required,
        });
    }
    Ok(())
}

/// Tri-state depth-first search: 1 = in progress, 2 = done. Collection
/// edges are not traversed, so a struct may contain itself only through a
/// collection.
fn check_recursion(
    name: &str,
    types: &HashMap<String, NamedType>,
    state: &mut HashMap<String, u8>,
    stack: &mut Vec<String>,
) -> Result<(), SheetError> {
    let info = match types.get(name) {
        Some(NamedType::Struct(info)) => info,
        _ => return Ok(()),
    };
    match state.get(name) {
        Some(1) => {
            let start = stack.iter().position(|n| n == name).unwrap_or(0);
            let mut path: Vec<&str> = stack[start..].iter().map(|n| n.as_str()).collect();
            path.push(name);
            return Err(SheetError::CyclicType(name.to_owned(), path.join(" -> ")));
        }
        Some(2) => return Ok(()),
        _ => {}
    }
    state.insert(name.to_owned(), 1);
    stack.push(name.to_owned());
    for field in &info.fields {
        // Only the non-collection spine can recurse unboundedly.
        if let ReadShape::Struct(child) = &field.read.shape {
            check_recursion(child, types, state, stack)?;
        }
    }
    stack.pop();
    state.insert(name.to_owned(), 2);
    Ok(())
}
