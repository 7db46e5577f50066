//! sheetpack
//!
//! Runtime support for working with sheetpack-encoded table data.
//!
//! - Decoders that read a binary blob back into a [`TypedValue`] tree using
//!   the frozen type graph (the exact inverse of the compiler's encoder),
//! - JSON rendering of decoded values for inspection,
//! - Re-exports of the schema and compiler surface consumers need.

use serde_json::Value as Json;

pub use sheetpack_compiler::error::SheetError;
pub use sheetpack_compiler::registry::{
    EnumInfo, FieldInfo, NamedType, ReadShape, StructInfo, TableInfo, TableMode, TypeGraph,
};
pub use sheetpack_schema::{ByteReader, ByteWriter, TypedValue};

use sheetpack_compiler::types::Primitive;

pub mod error {
    pub use sheetpack_compiler::error::SheetError;
}

pub mod schema {
    pub use sheetpack_schema::{ByteReader, ByteWriter, TypedValue};
}

fn truncated(label: &str) -> SheetError {
    SheetError::Decode(format!("unexpected end of data while reading {}", label))
}

/// Decodes one value of the given shape from the reader's current index.
/// After this returns, the index has advanced past the value. This is the
/// inverse of the compiler's `encode_value` and must agree with it
/// byte-for-byte.
pub fn decode_value(
    br: &mut ByteReader,
    shape: &ReadShape,
    graph: &TypeGraph,
) -> Result<TypedValue, SheetError> {
    match shape {
        ReadShape::Primitive(Primitive::Int) => {
            br.read_int().map(TypedValue::Int).map_err(|_| truncated("int"))
        }
        ReadShape::Primitive(Primitive::Long) => {
            br.read_long().map(TypedValue::Long).map_err(|_| truncated("long"))
        }
        ReadShape::Primitive(Primitive::Float) => {
            br.read_float().map(TypedValue::Float).map_err(|_| truncated("float"))
        }
        ReadShape::Primitive(Primitive::Bool) => {
            br.read_bool().map(TypedValue::Bool).map_err(|_| truncated("bool"))
        }
        ReadShape::Primitive(Primitive::Str) => {
            br.read_string().map(TypedValue::Str).map_err(|_| truncated("string"))
        }
        ReadShape::Enum(name) => {
            let ordinal = br.read_int().map_err(|_| truncated("enum ordinal"))?;
            let info = graph.enum_info(name)?;
            if info.contains_ordinal(ordinal) {
                Ok(TypedValue::Enum(ordinal))
            } else {
                Err(SheetError::Decode(format!(
                    "{} has no member with ordinal {}",
                    name, ordinal
                )))
            }
        }
        ReadShape::Struct(name) => {
            let info = graph.struct_info(name)?;
            let mut values = Vec::with_capacity(info.fields.len());
            for field in &info.fields {
                values.push(decode_value(br, &field.read.shape, graph)?);
            }
            Ok(TypedValue::Struct(values))
        }
        ReadShape::Collection(item) => {
            let count = br.read_int().map_err(|_| truncated("element count"))?;
            if count < 0 {
                return Err(SheetError::Decode(format!(
                    "negative element count {}",
                    count
                )));
            }
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(decode_value(br, item, graph)?);
            }
            Ok(TypedValue::Seq(values))
        }
    }
}

/// Decodes a Standard-table blob into its rows. Fails on truncated input
/// and on trailing bytes, which both mean the blob and the graph disagree.
pub fn decode_table(
    graph: &TypeGraph,
    table: &TableInfo,
    bytes: &[u8],
) -> Result<Vec<TypedValue>, SheetError> {
    let root = ReadShape::Struct(table.target_type.clone());
    let mut br = ByteReader::new(bytes);
    let count = br.read_int().map_err(|_| truncated("record count"))?;
    if count < 0 {
        return Err(SheetError::Decode(format!("negative record count {}", count)));
    }
    let mut rows = Vec::with_capacity(count as usize);
    for _ in 0..count {
        rows.push(decode_value(&mut br, &root, graph)?);
    }
    if !br.is_at_end() {
        return Err(SheetError::Decode(format!(
            "{} trailing byte(s) after the last record",
            bytes.len() - br.index()
        )));
    }
    Ok(rows)
}

/// Decodes a Flat-table blob against its resolved property list (flat
/// properties live with the row data, not in the graph).
pub fn decode_singleton(
    graph: &TypeGraph,
    fields: &[FieldInfo],
    bytes: &[u8],
) -> Result<TypedValue, SheetError> {
    let mut br = ByteReader::new(bytes);
    let mut values = Vec::with_capacity(fields.len());
    for field in fields {
        values.push(decode_value(&mut br, &field.read.shape, graph)?);
    }
    if !br.is_at_end() {
        return Err(SheetError::Decode(format!(
            "{} trailing byte(s) after the last property",
            bytes.len() - br.index()
        )));
    }
    Ok(TypedValue::Struct(values))
}

/// Renders a decoded value as JSON: structs become objects keyed by field
/// name, enums become their member name when one is declared.
pub fn value_to_json(
    value: &TypedValue,
    shape: &ReadShape,
    graph: &TypeGraph,
) -> Result<Json, SheetError> {
    Ok(match (shape, value) {
        (ReadShape::Primitive(Primitive::Str), TypedValue::Str(v)) => Json::String(v.clone()),
        (ReadShape::Primitive(Primitive::Bool), TypedValue::Bool(v)) => Json::Bool(*v),
        (ReadShape::Primitive(Primitive::Int), TypedValue::Int(v)) => Json::from(*v),
        (ReadShape::Primitive(Primitive::Long), TypedValue::Long(v)) => Json::from(*v),
        (ReadShape::Primitive(Primitive::Float), TypedValue::Float(v)) => {
            Json::from(*v as f64)
        }
        (ReadShape::Enum(name), TypedValue::Enum(ordinal)) => {
            match graph.enum_info(name)?.name_of(*ordinal) {
                Some(member) => Json::String(member.to_owned()),
                None => Json::from(*ordinal),
            }
        }
        (ReadShape::Struct(name), TypedValue::Struct(values)) => {
            let info = graph.struct_info(name)?;
            let mut map = serde_json::Map::with_capacity(values.len());
            for (field, field_value) in info.fields.iter().zip(values) {
                map.insert(
                    field.name.clone(),
                    value_to_json(field_value, &field.read.shape, graph)?,
                );
            }
            Json::Object(map)
        }
        (ReadShape::Collection(item), TypedValue::Seq(values)) => Json::Array(
            values
                .iter()
                .map(|v| value_to_json(v, item, graph))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        (shape, value) => {
            return Err(SheetError::Internal(format!(
                "value {:?} does not match shape {:?}",
                value, shape
            )))
        }
    })
}

/// Decodes a Standard-table blob into a pretty-printed JSON array of row
/// objects, for inspection.
pub fn decode_to_json(
    graph: &TypeGraph,
    table: &TableInfo,
    bytes: &[u8],
) -> Result<String, SheetError> {
    if table.mode != TableMode::Standard {
        return Err(SheetError::Decode(
            "flat tables need their resolved property list; use decode_singleton".to_owned(),
        ));
    }
    let root = ReadShape::Struct(table.target_type.clone());
    let rows = decode_table(graph, table, bytes)?;
    let json_rows = rows
        .iter()
        .map(|row| value_to_json(row, &root, graph))
        .collect::<Result<Vec<_>, _>>()?;
    serde_json::to_string_pretty(&Json::Array(json_rows))
        .map_err(|e| SheetError::Decode(e.to_string()))
}
