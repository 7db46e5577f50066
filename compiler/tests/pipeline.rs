#![cfg(test)]

use serde_json::json;
use sheetpack_compiler::{
    compile_table, compile_tables,
    error::SheetError,
    export::export,
    registry::TypeGraph,
    table::{PropertyRow, TableData, TableJob},
    types::{TableDecl, TypeModule},
};

fn modules() -> Vec<TypeModule> {
    vec![serde_json::from_str(
        r#"{
            "ImportTypes": [],
            "TypeDefines": {
                "Quality": {
                    "TargetType": "items/Quality",
                    "TargetTypeAsEnum": true,
                    "EnumMembers": { "Common": 0, "Rare": 1, "Epic": 2 }
                },
                "Item": {
                    "TargetType": "items/Item",
                    "Comment": "One stack of an inventory item.",
                    "FieldSequence": [
                        { "Field": "ItemId", "Type": "int", "Comment": "Item id" },
                        { "Field": "Count", "Type": "int" }
                    ]
                }
            }
        }"#,
    )
    .unwrap()]
}

fn reward_table() -> TableDecl {
    serde_json::from_str(
        r##"{
            "Source": "Reward",
            "TargetType": "RewardConfig",
            "Comment": "Reward grants per id.",
            "ImportTypes": ["items"],
            "PrimaryKeyFields": ["Id"],
            "FieldSequence": [
                { "Field": "Id", "Type": "int" },
                { "Field": "Values", "Type": "list(int)[\"~\"]" },
                { "Field": "Items", "Type": "list(Item)[\"~\",\"#\"]" }
            ]
        }"##,
    )
    .unwrap()
}

fn settings_table() -> TableDecl {
    serde_json::from_str(
        r#"{
            "Source": "Settings",
            "TargetType": "GlobalSettings",
            "IsFlatTable": true
        }"#,
    )
    .unwrap()
}

#[test]
fn single_int_cell_produces_four_bytes() {
    let table: TableDecl = serde_json::from_str(
        r#"{
            "Source": "T",
            "TargetType": "TConfig",
            "FieldSequence": [ { "Field": "X", "Type": "int" } ]
        }"#,
    )
    .unwrap();
    let graph = TypeGraph::build(&[], &[table]).unwrap();
    let job = TableJob {
        table: graph.table("T").unwrap().clone(),
        data: TableData::Rows(vec![json!({ "X": "42" })]),
    };
    let artifact = compile_table(&graph, &job).unwrap();
    // record count 1, then 0x0000002A little-endian
    assert_eq!(artifact.bytes, [1, 0, 0, 0, 0x2A, 0, 0, 0]);
}

#[test]
fn delimited_int_list_is_count_prefixed() {
    let graph = TypeGraph::build(&modules(), &[reward_table()]).unwrap();
    let job = TableJob {
        table: graph.table("Reward").unwrap().clone(),
        data: TableData::Rows(vec![json!({
            "Id": 1,
            "Values": "1~2~3",
            "Items": ""
        })]),
    };
    let artifact = compile_table(&graph, &job).unwrap();
    let expected: Vec<u8> = [
        1i32, // record count
        1,    // Id
        3,    // Values count
        1, 2, 3, // Values
        0, // Items count
    ]
    .iter()
    .flat_map(|v| v.to_le_bytes())
    .collect();
    assert_eq!(artifact.bytes, expected);
}

#[test]
fn nested_struct_list_coerces_and_encodes() {
    let graph = TypeGraph::build(&modules(), &[reward_table()]).unwrap();
    let job = TableJob {
        table: graph.table("Reward").unwrap().clone(),
        data: TableData::Rows(vec![json!({
            "Id": 1,
            "Values": "",
            "Items": "1001#10~1002#5"
        })]),
    };
    let artifact = compile_table(&graph, &job).unwrap();
    let expected: Vec<u8> = [
        1i32, // record count
        1,    // Id
        0,    // Values count
        2,    // Items count
        1001, 10, // first item
        1002, 5, // second item
    ]
    .iter()
    .flat_map(|v| v.to_le_bytes())
    .collect();
    assert_eq!(artifact.bytes, expected);
    assert!(artifact.layout.contains("Items_count"));
}

#[test]
fn duplicate_primary_keys_abort_the_table() {
    let graph = TypeGraph::build(&modules(), &[reward_table()]).unwrap();
    let job = TableJob {
        table: graph.table("Reward").unwrap().clone(),
        data: TableData::Rows(vec![
            json!({ "Id": 7, "Values": "", "Items": "" }),
            json!({ "Id": 7, "Values": "1", "Items": "" }),
        ]),
    };
    let err = compile_table(&graph, &job).unwrap_err();
    assert!(matches!(
        err,
        SheetError::DuplicatePrimaryKey { first_row: 0, row: 1, .. }
    ));
}

#[test]
fn flat_singleton_encodes_properties_in_row_order() {
    let graph = TypeGraph::build(&modules(), &[settings_table()]).unwrap();
    let job = TableJob {
        table: graph.table("Settings").unwrap().clone(),
        data: TableData::Properties(vec![
            PropertyRow {
                key: "Name".to_owned(),
                type_syntax: "string".to_owned(),
                value: json!("Alice"),
                comment: "Display name".to_owned(),
            },
            PropertyRow {
                key: "Active".to_owned(),
                type_syntax: "bool".to_owned(),
                value: json!(true),
                comment: String::new(),
            },
        ]),
    };
    let artifact = compile_table(&graph, &job).unwrap();
    assert_eq!(
        artifact.bytes,
        [5, 0, 0, 0, b'A', b'l', b'i', b'c', b'e', 1]
    );
    assert!(artifact.layout.contains("Properties of GlobalSettings"));
}

#[test]
fn flat_properties_resolve_against_imported_types() {
    let graph = TypeGraph::build(&modules(), &[settings_table()]).unwrap();
    let job = TableJob {
        table: graph.table("Settings").unwrap().clone(),
        data: TableData::Properties(vec![PropertyRow {
            key: "StarterItems".to_owned(),
            type_syntax: r##"list(Item)["~","#"]"##.to_owned(),
            value: json!("1#1~2#1"),
            comment: String::new(),
        }]),
    };
    let artifact = compile_table(&graph, &job).unwrap();
    let expected: Vec<u8> = [2i32, 1, 1, 2, 1]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    assert_eq!(artifact.bytes, expected);
}

#[test]
fn a_failing_table_does_not_abort_its_siblings() {
    let graph = TypeGraph::build(&modules(), &[reward_table(), settings_table()]).unwrap();
    let jobs = vec![
        TableJob {
            table: graph.table("Reward").unwrap().clone(),
            data: TableData::Rows(vec![json!({
                "Id": "not a number",
                "Values": "",
                "Items": ""
            })]),
        },
        TableJob {
            table: graph.table("Settings").unwrap().clone(),
            data: TableData::Properties(vec![PropertyRow {
                key: "Active".to_owned(),
                type_syntax: "bool".to_owned(),
                value: json!(false),
                comment: String::new(),
            }]),
        },
    ];
    let results = compile_tables(&graph, &jobs);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "Reward");
    assert!(results[0].1.is_err());
    assert_eq!(results[1].0, "Settings");
    assert!(results[1].1.is_ok());
}

#[test]
fn exported_descriptor_covers_the_whole_graph() {
    let graph = TypeGraph::build(&modules(), &[reward_table(), settings_table()]).unwrap();
    let descriptor = export(&graph);

    let names: Vec<&str> = descriptor.types.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["Item", "Quality", "RewardConfig"]);

    let reward = descriptor
        .types
        .iter()
        .find(|t| t.name == "RewardConfig")
        .unwrap();
    let items = &reward.fields.as_ref().unwrap()[2];
    assert!(items.read.is_collection);
    assert_eq!(
        items.read.element.as_ref().unwrap().type_name.as_deref(),
        Some("Item")
    );

    let modes: Vec<_> = descriptor.tables.iter().map(|t| t.mode).collect();
    assert_eq!(modes.len(), 2);
    let json = serde_json::to_string(&descriptor).unwrap();
    assert!(json.contains("\"standard\""));
    assert!(json.contains("\"flat\""));
}
