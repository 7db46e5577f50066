use std::collections::HashMap;
use std::fmt;

use rayon::prelude::*;
use serde::Deserialize;
use serde_json::Value as Json;
use sheetpack_schema::TypedValue;
use tracing::info;

use crate::{
    coerce::{coerce, CellContent},
    encode::{encode_singleton, encode_table},
    error::SheetError,
    parser::parse_field_type,
    registry::{FieldInfo, TableInfo, TableMode, TypeGraph},
};

/// One property row of a Flat table, as extracted from its source sheet:
/// the property name, its unified type syntax, the raw value and a comment.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyRow {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Type")]
    pub type_syntax: String,
    #[serde(default, rename = "Value")]
    pub value: Json,
    #[serde(default, rename = "Comment")]
    pub comment: String,
}

/// One scalar component of a composite primary key. Restricted to hashable
/// kinds at registry-build time, so rows can be keyed without comparing
/// floats.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyScalar {
    Int(i32),
    Long(i64),
    Bool(bool),
    Str(String),
}

impl KeyScalar {
    fn from_value(value: &TypedValue) -> Option<KeyScalar> {
        match value {
            TypedValue::Int(v) => Some(KeyScalar::Int(*v)),
            TypedValue::Enum(v) => Some(KeyScalar::Int(*v)),
            TypedValue::Long(v) => Some(KeyScalar::Long(*v)),
            TypedValue::Bool(v) => Some(KeyScalar::Bool(*v)),
            TypedValue::Str(v) => Some(KeyScalar::Str(v.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for KeyScalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeyScalar::Int(v) => write!(f, "{}", v),
            KeyScalar::Long(v) => write!(f, "{}", v),
            KeyScalar::Bool(v) => write!(f, "{}", v),
            KeyScalar::Str(v) => write!(f, "{:?}", v),
        }
    }
}

fn format_key(key: &[KeyScalar]) -> String {
    let parts: Vec<String> = key.iter().map(|k| k.to_string()).collect();
    format!("({})", parts.join(", "))
}

/// The output of compiling one table: the binary blob, its layout trace and
/// bookkeeping for the command layer.
#[derive(Debug, Clone)]
pub struct TableArtifact {
    pub source: String,
    pub output: String,
    pub bytes: Vec<u8>,
    pub layout: String,
    pub rows: usize,
}

/// Row data for one table, matching its mode.
#[derive(Debug, Clone)]
pub enum TableData {
    /// Standard: one JSON object per row, cells keyed by field name.
    Rows(Vec<Json>),
    /// Flat: one property per row.
    Properties(Vec<PropertyRow>),
}

/// A unit of work for [`compile_tables`].
#[derive(Debug, Clone)]
pub struct TableJob {
    pub table: TableInfo,
    pub data: TableData,
}

/// Coerces and encodes a Standard table. Rows are validated against the
/// table's field sequence, keyed by the declared primary-key tuple
/// (duplicates are rejected, the first occurrence wins the error report)
/// and encoded in input order.
pub fn compile_standard_table(
    graph: &TypeGraph,
    table: &TableInfo,
    rows: &[Json],
) -> Result<TableArtifact, SheetError> {
    let info = graph.struct_info(&table.target_type)?;

    // The key positions were validated at registry-build time.
    let mut key_positions = Vec::with_capacity(table.primary_key.len());
    for key_field in &table.primary_key {
        let position = info
            .fields
            .iter()
            .position(|f| &f.name == key_field)
            .ok_or_else(|| {
                SheetError::Internal(format!(
                    "primary key field {:?} missing from frozen struct {:?}",
                    key_field, table.target_type
                ))
            })?;
        key_positions.push(position);
    }

    let mut typed_rows = Vec::with_capacity(rows.len());
    let mut seen_keys: HashMap<Vec<KeyScalar>, usize> = HashMap::new();

    for (row_index, row) in rows.iter().enumerate() {
        let cells = match row {
            Json::Object(map) => map,
            _ => {
                return Err(SheetError::Coercion {
                    table: table.source.clone(),
                    row: row_index,
                    field: String::new(),
                    detail: "row is not a JSON object".to_owned(),
                })
            }
        };

        let mut values = Vec::with_capacity(info.fields.len());
        for field in &info.fields {
            let cell = cells
                .get(&field.name)
                .map(CellContent::from_json)
                .unwrap_or_else(CellContent::empty);
            let value = coerce(&cell, &field.read, graph, &field.name)
                .map_err(|e| e.at_row(&table.source, row_index))?;
            values.push(value);
        }

        if !key_positions.is_empty() {
            let mut key = Vec::with_capacity(key_positions.len());
            for &position in &key_positions {
                let scalar = KeyScalar::from_value(&values[position]).ok_or_else(|| {
                    SheetError::Internal(format!(
                        "primary key field {:?} coerced to a non-scalar value",
                        info.fields[position].name
                    ))
                })?;
                key.push(scalar);
            }
            if let Some(&first_row) = seen_keys.get(&key) {
                return Err(SheetError::DuplicatePrimaryKey {
                    table: table.source.clone(),
                    key: format_key(&key),
                    first_row,
                    row: row_index,
                });
            }
            seen_keys.insert(key, row_index);
        }

        typed_rows.push(TypedValue::Struct(values));
    }

    let (bytes, layout) = encode_table(graph, table, &typed_rows)?;
    info!(
        table = %table.source,
        rows = typed_rows.len(),
        bytes = bytes.len(),
        "compiled standard table"
    );
    Ok(TableArtifact {
        source: table.source.clone(),
        output: table.target_type.clone(),
        bytes,
        layout,
        rows: typed_rows.len(),
    })
}

/// Coerces and encodes a Flat table. Each property row carries its own type
/// syntax, parsed and resolved against the frozen graph; properties encode
/// in row order as one singleton record.
pub fn compile_flat_table(
    graph: &TypeGraph,
    table: &TableInfo,
    props: &[PropertyRow],
) -> Result<TableArtifact, SheetError> {
    let mut resolved = Vec::with_capacity(props.len());
    for (row_index, prop) in props.iter().enumerate() {
        let parsed = parse_field_type(&prop.type_syntax)?;
        let read = graph.resolve(&prop.key, &parsed)?;
        let cell = CellContent::from_json(&prop.value);
        let value = coerce(&cell, &read, graph, &prop.key)
            .map_err(|e| e.at_row(&table.source, row_index))?;
        resolved.push((
            FieldInfo {
                name: prop.key.clone(),
                comment: prop.comment.clone(),
                type_syntax: prop.type_syntax.clone(),
                read,
            },
            value,
        ));
    }

    let (bytes, layout) = encode_singleton(graph, table, &resolved)?;
    info!(
        table = %table.source,
        props = resolved.len(),
        bytes = bytes.len(),
        "compiled flat table"
    );
    Ok(TableArtifact {
        source: table.source.clone(),
        output: table.target_type.clone(),
        bytes,
        layout,
        rows: resolved.len(),
    })
}

/// Compiles one job, dispatching on the table's mode.
pub fn compile_table(graph: &TypeGraph, job: &TableJob) -> Result<TableArtifact, SheetError> {
    match (&job.table.mode, &job.data) {
        (TableMode::Standard, TableData::Rows(rows)) => {
            compile_standard_table(graph, &job.table, rows)
        }
        (TableMode::Flat, TableData::Properties(props)) => {
            compile_flat_table(graph, &job.table, props)
        }
        (mode, _) => Err(SheetError::Internal(format!(
            "table {:?} has mode {:?} but the data has the other shape",
            job.table.source, mode
        ))),
    }
}

/// Compiles every table concurrently against the frozen graph. Tables share
/// no mutable state, so a failing table aborts only itself; the result
/// order matches the job order and each entry carries its table source
/// for reporting.
pub fn compile_tables(
    graph: &TypeGraph,
    jobs: &[TableJob],
) -> Vec<(String, Result<TableArtifact, SheetError>)> {
    jobs.par_iter()
        .map(|job| (job.table.source.clone(), compile_table(graph, job)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeGraph;
    use crate::types::{TableDecl, TypeModule};
    use serde_json::json;

    fn build_graph() -> TypeGraph {
        let module: TypeModule = serde_json::from_str(
            r#"{
                "TypeDefines": {
                    "Item": {
                        "TargetType": "items/Item",
                        "FieldSequence": [
                            { "Field": "ItemId", "Type": "int" },
                            { "Field": "Count", "Type": "int" }
                        ]
                    }
                }
            }"#,
        )
        .unwrap();
        let standard: TableDecl = serde_json::from_str(
            r##"{
                "Source": "Reward",
                "TargetType": "RewardConfig",
                "PrimaryKeyFields": ["Id"],
                "FieldSequence": [
                    { "Field": "Id", "Type": "int" },
                    { "Field": "Name", "Type": "string" },
                    { "Field": "Items", "Type": "list(Item)[\"~\",\"#\"]" }
                ]
            }"##,
        )
        .unwrap();
        let flat: TableDecl = serde_json::from_str(
            r#"{
                "Source": "Global",
                "TargetType": "GlobalSettings",
                "IsFlatTable": true
            }"#,
        )
        .unwrap();
        TypeGraph::build(&[module], &[standard, flat]).unwrap()
    }

    #[test]
    fn compiles_a_standard_table() {
        let g = build_graph();
        let table = g.table("Reward").unwrap().clone();
        let rows = vec![
            json!({ "Id": "1", "Name": "first", "Items": "1001#10~1002#5" }),
            json!({ "Id": 2, "Name": "second", "Items": "" }),
        ];
        let artifact = compile_standard_table(&g, &table, &rows).unwrap();
        assert_eq!(artifact.rows, 2);
        // record count prefix
        assert_eq!(&artifact.bytes[..4], &[2, 0, 0, 0]);
        assert!(artifact.layout.contains("Row [1]"));
    }

    #[test]
    fn duplicate_primary_keys_are_rejected_before_encoding() {
        let g = build_graph();
        let table = g.table("Reward").unwrap().clone();
        let rows = vec![
            json!({ "Id": 7, "Name": "a", "Items": "" }),
            json!({ "Id": "7", "Name": "b", "Items": "" }),
        ];
        let err = compile_standard_table(&g, &table, &rows).unwrap_err();
        match err {
            SheetError::DuplicatePrimaryKey {
                table,
                key,
                first_row,
                row,
            } => {
                assert_eq!(table, "Reward");
                assert_eq!(key, "(7)");
                assert_eq!(first_row, 0);
                assert_eq!(row, 1);
            }
            other => panic!("expected DuplicatePrimaryKey, got {:?}", other),
        }
    }

    #[test]
    fn coercion_failures_carry_table_row_and_field() {
        let g = build_graph();
        let table = g.table("Reward").unwrap().clone();
        let rows = vec![json!({ "Id": 1, "Name": "ok", "Items": "oops#10" })];
        let err = compile_standard_table(&g, &table, &rows).unwrap_err();
        match err {
            SheetError::Coercion {
                table, row, field, ..
            } => {
                assert_eq!(table, "Reward");
                assert_eq!(row, 0);
                assert_eq!(field, "Items");
            }
            other => panic!("expected Coercion, got {:?}", other),
        }
    }

    #[test]
    fn flat_singleton_matches_the_documented_bytes() {
        let g = build_graph();
        let table = g.table("Global").unwrap().clone();
        let props = vec![
            PropertyRow {
                key: "Name".to_owned(),
                type_syntax: "string".to_owned(),
                value: json!("Alice"),
                comment: String::new(),
            },
            PropertyRow {
                key: "Active".to_owned(),
                type_syntax: "bool".to_owned(),
                value: json!(true),
                comment: String::new(),
            },
        ];
        let artifact = compile_flat_table(&g, &table, &props).unwrap();
        assert_eq!(
            artifact.bytes,
            [5, 0, 0, 0, b'A', b'l', b'i', b'c', b'e', 1]
        );
    }

    #[test]
    fn fan_out_reports_per_table_results() {
        let g = build_graph();
        let good = TableJob {
            table: g.table("Reward").unwrap().clone(),
            data: TableData::Rows(vec![json!({ "Id": 1, "Name": "a", "Items": "" })]),
        };
        let bad = TableJob {
            table: g.table("Reward").unwrap().clone(),
            data: TableData::Rows(vec![json!({ "Id": "x", "Name": "a", "Items": "" })]),
        };
        let results = compile_tables(&g, &[good, bad]);
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }

    #[test]
    fn row_order_is_preserved() {
        let g = build_graph();
        let table = g.table("Reward").unwrap().clone();
        let rows: Vec<Json> = (0..50)
            .map(|i| json!({ "Id": i, "Name": format!("row{}", i), "Items": "" }))
            .collect();
        let artifact = compile_standard_table(&g, &table, &rows).unwrap();
        // First row's Id follows the record count.
        assert_eq!(&artifact.bytes[4..8], &[0, 0, 0, 0]);
        // Second row: Id=1 after name "row0" (4 + 4 = 8 bytes) and empty list (4 bytes).
        assert_eq!(&artifact.bytes[8 + 8 + 4..8 + 8 + 4 + 4], &[1, 0, 0, 0]);
    }
}
