use sheetpack_schema::{ByteWriter, TypedValue};
use tracing::debug;

use crate::{
    error::SheetError,
    registry::{FieldInfo, ReadShape, TableInfo, TypeGraph},
};

/// Records a human-readable rendering of the byte layout while encoding.
/// The text file is written next to the binary artifact so a mismatch
/// between a reader and the blob can be debugged without a hex dump.
pub struct LayoutWriter {
    lines: Vec<String>,
    indent: usize,
}

impl LayoutWriter {
    pub fn new() -> LayoutWriter {
        LayoutWriter {
            lines: Vec::new(),
            indent: 0,
        }
    }

    fn pad(&self) -> String {
        "  ".repeat(self.indent)
    }

    /// Records a single value line. Long value reprs are truncated.
    pub fn log(&mut self, type_label: &str, field: &str, value: &str) {
        let mut repr = value.to_owned();
        if repr.chars().count() > 100 {
            repr = repr.chars().take(100).collect::<String>() + "...";
        }
        self.lines
            .push(format!("{}[{}] {} = {}", self.pad(), type_label, field, repr));
    }

    /// Enters a data scope (a row, struct or collection), increasing indent.
    pub fn enter_scope(&mut self, name: &str) {
        self.lines.push(format!("{}{} {{", self.pad(), name));
        self.indent += 1;
    }

    /// Exits the current data scope.
    pub fn exit_scope(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        let pad = self.pad();
        self.lines.push(format!("{}}}", pad));
    }

    /// The complete layout text.
    pub fn content(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

impl Default for LayoutWriter {
    fn default() -> Self {
        LayoutWriter::new()
    }
}

/// A display name for a shape, used only in the layout trace.
fn shape_label(shape: &ReadShape) -> String {
    match shape {
        ReadShape::Primitive(p) => p.keyword().to_owned(),
        ReadShape::Enum(name) => format!("enum({})", name),
        ReadShape::Struct(name) => name.clone(),
        ReadShape::Collection(item) => format!("list({})", shape_label(item)),
    }
}

/// Serializes one value against its shape. The pair is produced together by
/// the coercer, so a mismatch here is a defect in the caller, reported as
/// [`SheetError::Internal`] rather than a user-facing diagnostic.
pub fn encode_value(
    bw: &mut ByteWriter,
    layout: &mut LayoutWriter,
    value: &TypedValue,
    shape: &ReadShape,
    graph: &TypeGraph,
    label: &str,
) -> Result<(), SheetError> {
    use crate::types::Primitive;

    match (shape, value) {
        (ReadShape::Primitive(Primitive::Int), TypedValue::Int(v)) => {
            bw.write_int(*v);
            layout.log("int", label, &v.to_string());
        }
        (ReadShape::Primitive(Primitive::Long), TypedValue::Long(v)) => {
            bw.write_long(*v);
            layout.log("long", label, &v.to_string());
        }
        (ReadShape::Primitive(Primitive::Float), TypedValue::Float(v)) => {
            bw.write_float(*v);
            layout.log("float", label, &v.to_string());
        }
        (ReadShape::Primitive(Primitive::Bool), TypedValue::Bool(v)) => {
            bw.write_bool(*v);
            layout.log("bool", label, &v.to_string());
        }
        (ReadShape::Primitive(Primitive::Str), TypedValue::Str(v)) => {
            bw.write_string(v);
            layout.log("string", label, &format!("{:?}", v));
        }
        (ReadShape::Enum(name), TypedValue::Enum(ordinal)) => {
            bw.write_int(*ordinal);
            layout.log(&format!("enum({})", name), label, &ordinal.to_string());
        }
        (ReadShape::Collection(item), TypedValue::Seq(values)) => {
            bw.write_int(values.len() as i32);
            layout.log("int", &format!("{}_count", label), &values.len().to_string());
            layout.enter_scope(&format!("{}: {}", label, shape_label(shape)));
            for (i, element) in values.iter().enumerate() {
                encode_value(bw, layout, element, item, graph, &format!("[{}]", i))?;
            }
            layout.exit_scope();
        }
        (ReadShape::Struct(name), TypedValue::Struct(values)) => {
            let info = graph.struct_info(name)?;
            if values.len() != info.fields.len() {
                return Err(SheetError::Internal(format!(
                    "{}: struct {} has {} fields but the value holds {}",
                    label,
                    name,
                    info.fields.len(),
                    values.len()
                )));
            }
            layout.enter_scope(&format!("{}: {}", label, name));
            for (field, field_value) in info.fields.iter().zip(values) {
                encode_value(bw, layout, field_value, &field.read.shape, graph, &field.name)?;
            }
            layout.exit_scope();
        }
        (shape, value) => {
            return Err(SheetError::Internal(format!(
                "{}: value {:?} does not match shape {}",
                label,
                value,
                shape_label(shape)
            )));
        }
    }
    Ok(())
}

/// Serializes a Standard table: an `i32` record count, then each row's
/// struct encoding in input order. Returns the blob and its layout trace.
pub fn encode_table(
    graph: &TypeGraph,
    table: &TableInfo,
    rows: &[TypedValue],
) -> Result<(Vec<u8>, String), SheetError> {
    let info = graph.struct_info(&table.target_type)?;
    let mut bw = ByteWriter::new();
    let mut layout = LayoutWriter::new();

    layout.log(
        "Standard Table",
        &table.target_type,
        &format!("{} rows from {}", rows.len(), table.source),
    );
    bw.write_int(rows.len() as i32);
    layout.enter_scope("Data Rows");
    for (i, row) in rows.iter().enumerate() {
        let values = match row {
            TypedValue::Struct(values) if values.len() == info.fields.len() => values,
            other => {
                return Err(SheetError::Internal(format!(
                    "row {} of {} is not a {}-field struct: {:?}",
                    i,
                    table.source,
                    info.fields.len(),
                    other
                )))
            }
        };
        layout.enter_scope(&format!("Row [{}]", i));
        for (field, value) in info.fields.iter().zip(values) {
            encode_value(&mut bw, &mut layout, value, &field.read.shape, graph, &field.name)?;
        }
        layout.exit_scope();
    }
    layout.exit_scope();

    debug!(table = %table.source, rows = rows.len(), bytes = bw.len(), "encoded table");
    Ok((bw.data(), layout.content()))
}

/// Serializes a Flat table: the singleton struct encoding directly, no
/// count prefix. Properties arrive resolved and in row order.
pub fn encode_singleton(
    graph: &TypeGraph,
    table: &TableInfo,
    props: &[(FieldInfo, TypedValue)],
) -> Result<(Vec<u8>, String), SheetError> {
    let mut bw = ByteWriter::new();
    let mut layout = LayoutWriter::new();

    layout.log(
        "Flat Table",
        &table.target_type,
        &format!("from {}", table.source),
    );
    layout.enter_scope(&format!("Properties of {}", table.target_type));
    for (field, value) in props {
        encode_value(&mut bw, &mut layout, value, &field.read.shape, graph, &field.name)?;
    }
    layout.exit_scope();

    debug!(table = %table.source, props = props.len(), bytes = bw.len(), "encoded singleton");
    Ok((bw.data(), layout.content()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ReadInfo, TypeGraph};
    use crate::types::{TableDecl, TypeModule};

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
        let table: TableDecl = serde_json::from_str(
            r##"{
                "Source": "Reward",
                "TargetType": "RewardConfig",
                "PrimaryKeyFields": ["Id"],
                "FieldSequence": [
                    { "Field": "Id", "Type": "int" },
                    { "Field": "Items", "Type": "list(Item)[\"~\",\"#\"]" }
                ]
            }"##,
        )
        .unwrap();
        TypeGraph::build(&[module], &[table]).unwrap()
    }

    fn encode_one(graph: &TypeGraph, value: &TypedValue, shape: &ReadShape) -> Vec<u8> {
        let mut bw = ByteWriter::new();
        let mut layout = LayoutWriter::new();
        encode_value(&mut bw, &mut layout, value, shape, graph, "F").unwrap();
        bw.data()
    }

    fn shape(graph: &TypeGraph, syntax: &str) -> ReadInfo {
        let parsed = crate::parser::parse_field_type(syntax).unwrap();
        graph.resolve("F", &parsed).unwrap()
    }

    #[test]
    fn int_encodes_to_four_bytes() {
        let g = build_graph();
        assert_eq!(
            encode_one(&g, &TypedValue::Int(42), &shape(&g, "int").shape),
            [0x2A, 0, 0, 0]
        );
    }

    #[test]
    fn collection_is_count_prefixed() {
        let g = build_graph();
        let value = TypedValue::Seq(vec![
            TypedValue::Int(1),
            TypedValue::Int(2),
            TypedValue::Int(3),
        ]);
        assert_eq!(
            encode_one(&g, &value, &shape(&g, r#"list(int)["~"]"#).shape),
            [3, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]
        );
    }

    #[test]
    fn struct_fields_are_inline_without_prefix() {
        let g = build_graph();
        let value = TypedValue::Struct(vec![TypedValue::Int(1001), TypedValue::Int(10)]);
        assert_eq!(
            encode_one(&g, &value, &shape(&g, "Item").shape),
            [0xE9, 0x03, 0, 0, 10, 0, 0, 0]
        );
    }

    #[test]
    fn standard_table_blob_is_count_plus_rows() {
        let g = build_graph();
        let table = g.table("Reward").unwrap().clone();
        let rows = vec![
            TypedValue::Struct(vec![TypedValue::Int(1), TypedValue::Seq(vec![])]),
            TypedValue::Struct(vec![
                TypedValue::Int(2),
                TypedValue::Seq(vec![TypedValue::Struct(vec![
                    TypedValue::Int(1001),
                    TypedValue::Int(10),
                ])]),
            ]),
        ];
        let (bytes, layout) = encode_table(&g, &table, &rows).unwrap();
        let mut expected = vec![2, 0, 0, 0];
        expected.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);
        expected.extend_from_slice(&[2, 0, 0, 0, 1, 0, 0, 0, 0xE9, 0x03, 0, 0, 10, 0, 0, 0]);
        assert_eq!(bytes, expected);
        assert!(layout.contains("Row [0]"));
        assert!(layout.contains("Items_count"));
    }

    #[test]
    fn encoding_is_deterministic() {
        let g = build_graph();
        let table = g.table("Reward").unwrap().clone();
        let rows = vec![TypedValue::Struct(vec![
            TypedValue::Int(7),
            TypedValue::Seq(vec![]),
        ])];
        let first = encode_table(&g, &table, &rows).unwrap();
        let second = encode_table(&g, &table, &rows).unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn shape_value_mismatch_is_internal() {
        let g = build_graph();
        let mut bw = ByteWriter::new();
        let mut layout = LayoutWriter::new();
        let err = encode_value(
            &mut bw,
            &mut layout,
            &TypedValue::Str("oops".to_owned()),
            &shape(&g, "int").shape,
            &g,
            "F",
        )
        .unwrap_err();
        assert!(matches!(err, SheetError::Internal(_)));
    }
}
