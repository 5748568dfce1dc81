// T-SQL Statement Builders
// Every value travels as an @Pn parameter; identifiers are bracket-quoted

use crate::db::traits::{CellValue, ColumnValue};

/// A statement text with the values bound to its @P1..@Pn placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<CellValue>,
}

impl Statement {
    fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a parameter and return its placeholder
    fn placeholder(&mut self, value: &CellValue) -> String {
        self.params.push(value.clone());
        format!("@P{}", self.params.len())
    }

    /// Append `WHERE a = @Pn AND b IS NULL ...`
    fn push_where(&mut self, filter: &[ColumnValue<'_>]) {
        if filter.is_empty() {
            return;
        }
        let conditions: Vec<String> = filter
            .iter()
            .map(|(column, value)| {
                if value.is_null() {
                    format!("{} IS NULL", quote_ident(column))
                } else {
                    format!("{} = {}", quote_ident(column), self.placeholder(value))
                }
            })
            .collect();
        self.sql.push_str(" WHERE ");
        self.sql.push_str(&conditions.join(" AND "));
    }
}

/// Quote a possibly schema-qualified name: `dbo.Users` -> `[dbo].[Users]`
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("[{}]", part.trim_matches(|c| c == '[' || c == ']').replace(']', "]]")))
        .collect::<Vec<_>>()
        .join(".")
}

/// `SELECT TOP 1 1 FROM t WHERE ...`
pub fn exists_statement(table: &str, key: &[ColumnValue<'_>]) -> Statement {
    let mut stmt = Statement::new();
    stmt.sql = format!("SELECT TOP 1 1 FROM {}", quote_ident(table));
    stmt.push_where(key);
    stmt
}

/// `INSERT INTO t (...) VALUES (...)` followed by a read of the generated identity
pub fn insert_statement(table: &str, values: &[ColumnValue<'_>]) -> Statement {
    let mut stmt = Statement::new();
    let columns: Vec<String> = values.iter().map(|(c, _)| quote_ident(c)).collect();
    let placeholders: Vec<String> = values.iter().map(|(_, v)| stmt.placeholder(v)).collect();
    stmt.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}); SELECT CAST(SCOPE_IDENTITY() AS BIGINT) AS NewId",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    );
    stmt
}

/// `UPDATE t SET ... WHERE ...`
pub fn update_statement(
    table: &str,
    set: &[ColumnValue<'_>],
    key: &[ColumnValue<'_>],
) -> Statement {
    let mut stmt = Statement::new();
    let assignments: Vec<String> = set
        .iter()
        .map(|(column, value)| format!("{} = {}", quote_ident(column), stmt.placeholder(value)))
        .collect();
    stmt.sql = format!("UPDATE {} SET {}", quote_ident(table), assignments.join(", "));
    stmt.push_where(key);
    stmt
}

/// `SELECT a, b FROM t WHERE ...`
pub fn select_statement(table: &str, columns: &[&str], filter: &[ColumnValue<'_>]) -> Statement {
    let mut stmt = Statement::new();
    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
    };
    stmt.sql = format!("SELECT {} FROM {}", projection, quote_ident(table));
    stmt.push_where(filter);
    stmt
}

/// `SET IDENTITY_INSERT t ON|OFF`
pub fn identity_insert_statement(table: &str, enabled: bool) -> String {
    format!(
        "SET IDENTITY_INSERT {} {}",
        quote_ident(table),
        if enabled { "ON" } else { "OFF" }
    )
}

pub const LIST_TABLES: &str = r#"
    SELECT TABLE_SCHEMA, TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

/// Column metadata for one table; @P1 = schema, @P2 = table
pub const LIST_COLUMNS: &str = r#"
    SELECT
        c.COLUMN_NAME,
        c.DATA_TYPE,
        c.CHARACTER_MAXIMUM_LENGTH,
        c.IS_NULLABLE,
        COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), c.COLUMN_NAME, 'IsIdentity') AS IS_IDENTITY,
        c.ORDINAL_POSITION
    FROM INFORMATION_SCHEMA.COLUMNS c
    WHERE c.TABLE_SCHEMA = @P1 AND c.TABLE_NAME = @P2
    ORDER BY c.ORDINAL_POSITION
"#;

/// Split `schema.table`, defaulting the schema to dbo
pub fn split_table_name(table: &str) -> (&str, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (schema, name),
        None => ("dbo", table),
    }
}
