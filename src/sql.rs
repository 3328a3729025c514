//! SQL text generation: table DDL from a schema, and reload scripts.

use crate::types::{Column, Schema};
use std::fmt::Write;
use std::path::PathBuf;

/// SQL type for a column, or `None` when the type is not understood.
///
/// A few columns are declared too narrowly (or with the wrong type) in the
/// published schema; those get the types the actual dump data needs.
pub fn column_sql_type(table_name: &str, column: &Column) -> Option<String> {
    let name = column.name.as_str();
    match (table_name, name) {
        ("group_membership_dim", "id" | "canvas_id") => return Some("BIGINT".to_string()),
        (
            "quiz_question_answer_dim",
            "answer_match_left" | "answer_match_right" | "matching_answer_incorrect_matches",
        )
        | ("quiz_question_dim", "name") => return Some("VARCHAR(4096)".to_string()),
        _ => {}
    }

    let sql = match column.data_type.as_str() {
        "varchar" => match column.length {
            Some(length) => format!("VARCHAR({})", length),
            None => "VARCHAR".to_string(),
        },
        "bigint" => "BIGINT".to_string(),
        "boolean" => "BOOLEAN".to_string(),
        "date" => "DATE".to_string(),
        "timestamp" | "datetime" => "TIMESTAMP".to_string(),
        "double precision" => "FLOAT".to_string(),
        "enum" | "guid" => "VARCHAR(256)".to_string(),
        "int" | "integer" => "INTEGER".to_string(),
        "text" => "TEXT".to_string(),
        _ => return None,
    };
    Some(sql)
}

/// `CREATE TABLE` and `DROP TABLE` statements (without trailing `;`), one
/// of each per table, in schema key order.
pub fn ddl_from_schema(schema: &Schema) -> (Vec<String>, Vec<String>) {
    let mut create = Vec::with_capacity(schema.len());
    let mut drop = Vec::with_capacity(schema.len());

    for definition in schema.values() {
        let table = &definition.table_name;
        let columns: Vec<String> = definition
            .columns
            .iter()
            .filter_map(|column| {
                column_sql_type(table, column).map(|sql| format!("\t{} {}", column.name, sql))
            })
            .collect();

        create.push(format!("CREATE TABLE {} (\n{}\n)", table, columns.join(",\n")));
        drop.push(format!("DROP TABLE {}", table));
    }

    (create, drop)
}

/// One table's line in a reload script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEntry {
    pub table_name: String,
    pub data_file: PathBuf,
    /// Partial dumps are applied on top of existing rows.
    pub partial: bool,
}

/// A script that loads reassembled table files, truncating a table first
/// only when its dump is a full snapshot.
pub fn reload_script(entries: &[ReloadEntry]) -> String {
    let mut script = String::new();
    for entry in entries {
        if !entry.partial {
            let _ = writeln!(script, "TRUNCATE TABLE {};", entry.table_name);
        }
        let _ = writeln!(
            script,
            "COPY {} FROM '{}';",
            entry.table_name,
            entry.data_file.display()
        );
    }
    script
}
