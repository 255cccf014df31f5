//! T-SQL rendering of a table layout.

use crate::emitter::{ColumnDef, TableDef};
use std::fmt::Write;

/// Batch separator after every statement
pub const BATCH_SEPARATOR: &str = "GO";

/// Render one `CREATE TABLE` batch
///
/// ```text
/// CREATE TABLE [t_loop_2400_Service_Line] ( -- /ISA_LOOP/GS_LOOP/ST_LOOP/2000A/2000B/2300/2400
///     [2400_num] [int] IDENTITY (1, 1) NOT NULL
/// ,   [LX01_Assigned_Number] [int] NULL  -- N0(1, 6)
/// ) ON [PRIMARY]
/// GO
/// ```
pub fn create_table(table: &TableDef) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "CREATE TABLE {} ( -- {}", quote(&table.name), table.path);
    // Leading commas keep the trailing comments out of the column list
    let _ = writeln!(out, "\t{} [int] IDENTITY (1, 1) NOT NULL", quote(&table.key));
    for column in &table.columns {
        let _ = writeln!(out, ",\t{}", column_sql(column));
    }
    let _ = writeln!(out, ") ON [PRIMARY]");
    let _ = writeln!(out, "{BATCH_SEPARATOR}");
    out
}

/// Render every table, separated by blank lines
pub fn render(tables: &[TableDef]) -> String {
    tables
        .iter()
        .map(create_table)
        .collect::<Vec<_>>()
        .join("\n")
}

fn column_sql(column: &ColumnDef) -> String {
    let null = if column.nullable { "NULL" } else { "NOT NULL" };
    format!(
        "{} {} {null}  -- {}",
        quote(&column.name),
        column.sql_type,
        column.source
    )
}

fn quote(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}
