// Database Connection Traits
// Defines the value model and the connection abstraction shared by the
// seeder, the schema inspector and the row editor

use chrono::{NaiveDate, NaiveDateTime};

/// Common database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution error: {0}")]
    QueryError(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Password expired. Please change your password using another tool properly.")]
    PasswordExpired,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<tiberius::error::Error> for DatabaseError {
    fn from(err: tiberius::error::Error) -> Self {
        // Login failures with an expired password come back as 18488
        if let tiberius::error::Error::Server(e) = &err {
            if e.code() == 18488 {
                return DatabaseError::PasswordExpired;
            }
        }
        DatabaseError::QueryError(err.to_string())
    }
}

/// A single value read from or bound to a statement
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Integer view of a numeric cell. Decimal columns arrive as floats and
    /// are rounded to the nearest whole unit.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::Float(v) => Some(v.round() as i64),
            CellValue::Bool(b) => Some(i64::from(*b)),
            CellValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            CellValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Parse operator input: whole numbers become integers, anything else text
    pub fn parse_input(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed.parse::<i64>() {
            Ok(v) => CellValue::Int(v),
            Err(_) => CellValue::String(trimmed.to_string()),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Bool(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::String(s) => write!(f, "{}", s),
            CellValue::Date(d) => write!(f, "{}", d),
            CellValue::DateTime(dt) => write!(f, "{}", dt),
        }
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int(i64::from(v))
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::String(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::String(v)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(v: NaiveDate) -> Self {
        CellValue::Date(v)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(v: NaiveDateTime) -> Self {
        CellValue::DateTime(v)
    }
}

/// Column metadata from INFORMATION_SCHEMA
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i32>,
    pub is_nullable: bool,
    pub is_identity: bool,
    pub ordinal_position: i32,
}

impl ColumnInfo {
    /// Nullable, non-identity column of the given type
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            max_length: None,
            is_nullable: true,
            is_identity: false,
            ordinal_position: 0,
        }
    }

    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self.is_nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }
}

/// Base table information
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub schema_name: String,
    pub table_name: String,
}

impl TableInfo {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }
}

/// A column paired with the value bound for it
pub type ColumnValue<'a> = (&'a str, CellValue);

/// Connection trait - everything the seeder, inspector and editor need from
/// a live database session. Every value is bound as a statement parameter;
/// table and column names are quoted identifiers.
#[async_trait::async_trait]
pub trait Connection: Send {
    /// Label of the driver attempt that produced this connection
    fn driver_label(&self) -> &str;

    // --- Rows ---
    /// True when at least one row in `table` matches every key column
    async fn row_exists(
        &mut self,
        table: &str,
        key: &[ColumnValue<'_>],
    ) -> Result<bool, DatabaseError>;

    /// Insert one row, returning the identity value generated for it (if any)
    async fn insert_row(
        &mut self,
        table: &str,
        values: &[ColumnValue<'_>],
    ) -> Result<Option<i64>, DatabaseError>;

    /// Update every row matching `key`, returning the affected row count
    async fn update_rows(
        &mut self,
        table: &str,
        set: &[ColumnValue<'_>],
        key: &[ColumnValue<'_>],
    ) -> Result<u64, DatabaseError>;

    /// Read `columns` from every row matching `filter`
    async fn select_rows(
        &mut self,
        table: &str,
        columns: &[&str],
        filter: &[ColumnValue<'_>],
    ) -> Result<Vec<Vec<CellValue>>, DatabaseError>;

    /// Toggle explicit identity values for `table` (SET IDENTITY_INSERT)
    async fn set_identity_insert(&mut self, table: &str, enabled: bool)
        -> Result<(), DatabaseError>;

    // --- Transactions ---
    async fn begin(&mut self) -> Result<(), DatabaseError>;
    async fn commit(&mut self) -> Result<(), DatabaseError>;
    async fn rollback(&mut self) -> Result<(), DatabaseError>;

    // --- Schema Metadata ---
    /// List base tables
    async fn list_tables(&mut self) -> Result<Vec<TableInfo>, DatabaseError>;

    /// Columns of one table, ordered by position; empty when the table is unknown
    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError>;
}
