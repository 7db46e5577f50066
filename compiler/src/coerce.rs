use serde_json::Value as Json;
use sheetpack_schema::TypedValue;

use crate::{
    error::SheetError,
    registry::{ReadInfo, ReadShape, TypeGraph},
    types::Primitive,
};

/// Raw content of one source cell. The variant is decided once per cell from
/// the extracted value (JSON strings enter `Text`, everything else stays
/// `Json`) and never re-sniffed further down the tree: inside `Text`, the
/// field's delimiter list decides where delimiter splitting ends and JSON
/// decoding begins.
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Text(String),
    Json(Json),
}

impl CellContent {
    /// Classifies an extracted cell value. `Null` is an empty cell.
    pub fn from_json(value: &Json) -> CellContent {
        match value {
            Json::String(s) => CellContent::Text(s.clone()),
            Json::Null => CellContent::Text(String::new()),
            other => CellContent::Json(other.clone()),
        }
    }

    pub fn empty() -> CellContent {
        CellContent::Text(String::new())
    }
}

/// Converts raw cell content into a [`TypedValue`] shaped exactly like
/// `info`. Any shape/content mismatch fails with the offending field
/// identity; the table layer adds table name and row index.
pub fn coerce(
    cell: &CellContent,
    info: &ReadInfo,
    graph: &TypeGraph,
    field: &str,
) -> Result<TypedValue, SheetError> {
    match cell {
        CellContent::Text(text) => coerce_text(
            text,
            &info.shape,
            info.delimiters.as_deref().unwrap_or(&[]),
            graph,
            field,
        ),
        CellContent::Json(value) => coerce_json(value, &info.shape, graph, field),
    }
}

fn mismatch(field: &str, detail: String) -> SheetError {
    SheetError::Coercion {
        table: String::new(),
        row: 0,
        field: field.to_owned(),
        detail,
    }
}

fn coerce_text(
    text: &str,
    shape: &ReadShape,
    delims: &[String],
    graph: &TypeGraph,
    field: &str,
) -> Result<TypedValue, SheetError> {
    match shape {
        ReadShape::Primitive(p) => parse_primitive_text(text, *p, field),

        ReadShape::Enum(name) => parse_enum_text(text, name, graph, field),

        ReadShape::Struct(name) => {
            let info = graph.struct_info(name)?;
            if let Some((head, tail)) = delims.split_first() {
                if text.is_empty() {
                    return default_value(shape, graph, field);
                }
                let segments: Vec<&str> = text.split(head.as_str()).collect();
                if segments.len() > info.fields.len() {
                    return Err(mismatch(
                        field,
                        format!(
                            "{} has {} fields but the segment {:?} splits into {}",
                            name,
                            info.fields.len(),
                            text,
                            segments.len()
                        ),
                    ));
                }
                let mut values = Vec::with_capacity(info.fields.len());
                for (i, field_info) in info.fields.iter().enumerate() {
                    let segment = segments.get(i).copied().unwrap_or("");
                    values.push(coerce_text(
                        segment,
                        &field_info.read.shape,
                        tail,
                        graph,
                        field,
                    )?);
                }
                Ok(TypedValue::Struct(values))
            } else {
                if text.trim().is_empty() {
                    return default_value(shape, graph, field);
                }
                let value: Json = serde_json::from_str(text)
                    .map_err(|e| mismatch(field, format!("malformed JSON {:?}: {}", text, e)))?;
                coerce_json(&value, shape, graph, field)
            }
        }

        ReadShape::Collection(item) => {
            if let Some((head, tail)) = delims.split_first() {
                if text.is_empty() {
                    return Ok(TypedValue::Seq(vec![]));
                }
                let mut values = Vec::new();
                for segment in text.split(head.as_str()) {
                    values.push(coerce_text(segment, item, tail, graph, field)?);
                }
                Ok(TypedValue::Seq(values))
            } else {
                if text.trim().is_empty() {
                    return Ok(TypedValue::Seq(vec![]));
                }
                let value: Json = serde_json::from_str(text)
                    .map_err(|e| mismatch(field, format!("malformed JSON {:?}: {}", text, e)))?;
                coerce_json(&value, shape, graph, field)
            }
        }
    }
}

fn coerce_json(
    value: &Json,
    shape: &ReadShape,
    graph: &TypeGraph,
    field: &str,
) -> Result<TypedValue, SheetError> {
    match shape {
        ReadShape::Primitive(p) => parse_primitive_json(value, *p, field),

        ReadShape::Enum(name) => match value {
            Json::String(s) => parse_enum_text(s, name, graph, field),
            Json::Number(n) => {
                let info = graph.enum_info(name)?;
                let ordinal = n
                    .as_i64()
                    .filter(|v| i32::try_from(*v).is_ok())
                    .map(|v| v as i32)
                    .ok_or_else(|| {
                        mismatch(field, format!("{} is not a valid {} ordinal", n, name))
                    })?;
                if info.contains_ordinal(ordinal) {
                    Ok(TypedValue::Enum(ordinal))
                } else {
                    Err(mismatch(
                        field,
                        format!("{} has no member with ordinal {}", name, ordinal),
                    ))
                }
            }
            Json::Null => Ok(TypedValue::Enum(0)),
            other => Err(mismatch(
                field,
                format!("expected a {} value, found {}", name, other),
            )),
        },

        ReadShape::Struct(name) => {
            let info = graph.struct_info(name)?;
            match value {
                // Named form: fields matched by name, absent fields default.
                Json::Object(map) => {
                    let mut values = Vec::with_capacity(info.fields.len());
                    for field_info in &info.fields {
                        match map.get(&field_info.name) {
                            None | Some(Json::Null) => {
                                values.push(default_value(&field_info.read.shape, graph, field)?)
                            }
                            Some(Json::String(s)) => values.push(coerce_text(
                                s,
                                &field_info.read.shape,
                                field_info.read.delimiters.as_deref().unwrap_or(&[]),
                                graph,
                                field,
                            )?),
                            Some(v) => {
                                values.push(coerce_json(v, &field_info.read.shape, graph, field)?)
                            }
                        }
                    }
                    Ok(TypedValue::Struct(values))
                }
                // Positional form: must not exceed the field count.
                Json::Array(items) => {
                    if items.len() > info.fields.len() {
                        return Err(mismatch(
                            field,
                            format!(
                                "{} has {} fields but the array holds {}",
                                name,
                                info.fields.len(),
                                items.len()
                            ),
                        ));
                    }
                    let mut values = Vec::with_capacity(info.fields.len());
                    for (i, field_info) in info.fields.iter().enumerate() {
                        match items.get(i) {
                            None | Some(Json::Null) => {
                                values.push(default_value(&field_info.read.shape, graph, field)?)
                            }
                            Some(Json::String(s)) => values.push(coerce_text(
                                s,
                                &field_info.read.shape,
                                field_info.read.delimiters.as_deref().unwrap_or(&[]),
                                graph,
                                field,
                            )?),
                            Some(v) => {
                                values.push(coerce_json(v, &field_info.read.shape, graph, field)?)
                            }
                        }
                    }
                    Ok(TypedValue::Struct(values))
                }
                Json::Null => default_value(shape, graph, field),
                other => Err(mismatch(
                    field,
                    format!("expected a JSON object or array for {}, found {}", name, other),
                )),
            }
        }

        ReadShape::Collection(item) => match value {
            Json::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for element in items {
                    match element {
                        Json::String(s) => values.push(coerce_text(s, item, &[], graph, field)?),
                        other => values.push(coerce_json(other, item, graph, field)?),
                    }
                }
                Ok(TypedValue::Seq(values))
            }
            Json::Null => Ok(TypedValue::Seq(vec![])),
            other => Err(mismatch(
                field,
                format!("expected a JSON array, found {}", other),
            )),
        },
    }
}

fn parse_primitive_text(text: &str, p: Primitive, field: &str) -> Result<TypedValue, SheetError> {
    match p {
        Primitive::Str => Ok(TypedValue::Str(text.to_owned())),
        Primitive::Int => {
            let t = text.trim();
            if t.is_empty() {
                return Ok(TypedValue::Int(0));
            }
            t.parse::<i32>().map(TypedValue::Int).map_err(|_| {
                mismatch(field, format!("expected a 32-bit integer, found {:?}", text))
            })
        }
        Primitive::Long => {
            let t = text.trim();
            if t.is_empty() {
                return Ok(TypedValue::Long(0));
            }
            t.parse::<i64>().map(TypedValue::Long).map_err(|_| {
                mismatch(field, format!("expected a 64-bit integer, found {:?}", text))
            })
        }
        Primitive::Float => {
            let t = text.trim();
            if t.is_empty() {
                return Ok(TypedValue::Float(0.0));
            }
            t.parse::<f32>().map(TypedValue::Float).map_err(|_| {
                mismatch(field, format!("expected a float, found {:?}", text))
            })
        }
        Primitive::Bool => match text.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "0" | "no" => Ok(TypedValue::Bool(false)),
            "true" | "1" | "yes" => Ok(TypedValue::Bool(true)),
            _ => Err(mismatch(
                field,
                format!("expected a boolean, found {:?}", text),
            )),
        },
    }
}

fn parse_primitive_json(value: &Json, p: Primitive, field: &str) -> Result<TypedValue, SheetError> {
    match (p, value) {
        (Primitive::Str, Json::String(s)) => Ok(TypedValue::Str(s.clone())),
        (Primitive::Str, Json::Number(n)) => Ok(TypedValue::Str(n.to_string())),
        (Primitive::Int, Json::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(TypedValue::Int)
            .ok_or_else(|| mismatch(field, format!("{} does not fit a 32-bit integer", n))),
        (Primitive::Long, Json::Number(n)) => n
            .as_i64()
            .map(TypedValue::Long)
            .ok_or_else(|| mismatch(field, format!("{} does not fit a 64-bit integer", n))),
        (Primitive::Float, Json::Number(n)) => n
            .as_f64()
            .map(|v| TypedValue::Float(v as f32))
            .ok_or_else(|| mismatch(field, format!("{} is not a float", n))),
        (Primitive::Bool, Json::Bool(b)) => Ok(TypedValue::Bool(*b)),
        (Primitive::Bool, Json::Number(n)) => match n.as_i64() {
            Some(0) => Ok(TypedValue::Bool(false)),
            Some(1) => Ok(TypedValue::Bool(true)),
            _ => Err(mismatch(field, format!("{} is not a boolean", n))),
        },
        (_, Json::String(s)) => parse_primitive_text(s, p, field),
        (_, Json::Null) => parse_primitive_text("", p, field),
        (_, other) => Err(mismatch(
            field,
            format!("expected a {} value, found {}", p.keyword(), other),
        )),
    }
}

fn parse_enum_text(
    text: &str,
    name: &str,
    graph: &TypeGraph,
    field: &str,
) -> Result<TypedValue, SheetError> {
    let info = graph.enum_info(name)?;
    let t = text.trim();
    if t.is_empty() {
        return Ok(TypedValue::Enum(0));
    }
    if let Ok(ordinal) = t.parse::<i32>() {
        return if info.contains_ordinal(ordinal) {
            Ok(TypedValue::Enum(ordinal))
        } else {
            Err(mismatch(
                field,
                format!("{} has no member with ordinal {}", name, ordinal),
            ))
        };
    }
    info.ordinal_of(t).map(TypedValue::Enum).ok_or_else(|| {
        mismatch(field, format!("{} has no member named {:?}", name, t))
    })
}

/// The default value of a shape, used for empty cells and omitted struct
/// fields: 0 / 0.0 / false / "" / ordinal 0 / empty sequence / a struct of
/// field defaults.
fn default_value(
    shape: &ReadShape,
    graph: &TypeGraph,
    field: &str,
) -> Result<TypedValue, SheetError> {
    Ok(match shape {
        ReadShape::Primitive(Primitive::Int) => TypedValue::Int(0),
        ReadShape::Primitive(Primitive::Long) => TypedValue::Long(0),
        ReadShape::Primitive(Primitive::Float) => TypedValue::Float(0.0),
        ReadShape::Primitive(Primitive::Bool) => TypedValue::Bool(false),
        ReadShape::Primitive(Primitive::Str) => TypedValue::Str(String::new()),
        ReadShape::Enum(_) => TypedValue::Enum(0),
        ReadShape::Collection(_) => TypedValue::Seq(vec![]),
        ReadShape::Struct(name) => {
            let info = graph.struct_info(name)?;
            let mut values = Vec::with_capacity(info.fields.len());
            for field_info in &info.fields {
                values.push(default_value(&field_info.read.shape, graph, field)?);
            }
            TypedValue::Struct(values)
        }
    })
}
