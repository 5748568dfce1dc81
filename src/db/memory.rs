// In-Memory Connection
// Test double with SQL Server identity semantics: explicit identity values
// only while IDENTITY_INSERT is ON for that table, one such table per
// session, and generated keys advanced past explicit ones

use std::collections::BTreeSet;

use crate::db::query::split_table_name;
use crate::db::traits::{CellValue, ColumnInfo, ColumnValue, Connection, DatabaseError, TableInfo};

#[derive(Debug, Clone)]
struct MemoryTable {
    name: String,
    columns: Vec<ColumnInfo>,
    identity: Option<usize>,
    next_id: i64,
    rows: Vec<Vec<CellValue>>,
}

impl MemoryTable {
    fn column_index(&self, column: &str) -> Result<usize, DatabaseError> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
            .ok_or_else(|| DatabaseError::QueryError(format!("Invalid column name '{}'.", column)))
    }

    fn matching(&self, filter: &[ColumnValue<'_>]) -> Result<Vec<usize>, DatabaseError> {
        let filter = filter
            .iter()
            .map(|(c, v)| Ok((self.column_index(c)?, v)))
            .collect::<Result<Vec<_>, DatabaseError>>()?;

        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| filter.iter().all(|(idx, v)| same_value(&row[*idx], v)))
            .map(|(i, _)| i)
            .collect())
    }
}

/// Numbers compare by value whatever their cell variant
fn same_value(stored: &CellValue, wanted: &CellValue) -> bool {
    match (stored, wanted) {
        (CellValue::Null, CellValue::Null) => true,
        (CellValue::Null, _) | (_, CellValue::Null) => false,
        (CellValue::String(a), CellValue::String(b)) => a == b,
        (a, b) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: Vec<MemoryTable>,
    identity_insert: Option<String>,
    snapshot: Option<Vec<MemoryTable>>,
    failing_inserts: BTreeSet<String>,
    fail_identity_restore: bool,
    ops: Vec<String>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: Vec<ColumnInfo>) -> Self {
        let columns: Vec<ColumnInfo> = columns
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.ordinal_position = i as i32 + 1;
                c
            })
            .collect();
        let identity = columns.iter().position(|c| c.is_identity);
        self.tables.push(MemoryTable {
            name: name.to_string(),
            columns,
            identity,
            next_id: 1,
            rows: Vec::new(),
        });
        self
    }

    /// The student-records schema the seed plans write to
    pub fn tuition_schema() -> Self {
        fn table(db: MemoryDatabase, name: &str, identity: &str, rest: &[&str]) -> MemoryDatabase {
            let mut columns = vec![ColumnInfo::new(identity, "int").identity()];
            columns.extend(rest.iter().map(|c| ColumnInfo::new(c, "nvarchar")));
            db.with_table(name, columns)
        }

        let db = Self::new();
        let db = table(db, "Departments", "DepartmentID", &["DepartmentName", "DepartmentCode", "Description"]);
        let db = table(db, "Classes", "ClassID", &["ClassName", "ClassCode", "DepartmentID"]);
        let db = table(
            db,
            "Users",
            "UserID",
            &["Email", "Password", "FullName", "PhoneNumber", "UserType", "IsActive", "RegistrationDate", "LastLogin"],
        );
        let db = table(
            db,
            "Students",
            "StudentID",
            &["UserID", "StudentCode", "DepartmentID", "ClassID", "EnrollmentYear", "CurrentSemester"],
        );
        let db = table(
            db,
            "Semesters",
            "SemesterID",
            &["SemesterName", "StartDate", "EndDate", "AcademicYear", "IsActive"],
        );
        let db = table(db, "FeeCategories", "FeeCategoryID", &["CategoryName", "Description", "IsActive"]);
        let db = table(
            db,
            "FeeStructures",
            "FeeStructureID",
            &["DepartmentID", "SemesterID", "FeeCategoryID", "Amount", "PerCredit", "CreatedDate", "LastUpdated"],
        );
        let db = table(
            db,
            "Courses",
            "CourseID",
            &["CourseCode", "CourseName", "Credits", "DepartmentID", "IsActive"],
        );
        let db = table(
            db,
            "StudentCourses",
            "StudentCourseID",
            &["StudentID", "CourseID", "SemesterID", "RegistrationDate"],
        );
        let db = table(
            db,
            "StudentFees",
            "StudentFeeID",
            &["StudentID", "SemesterID", "TotalAmount", "DueDate", "Status", "CreatedDate", "LastUpdated"],
        );
        let db = table(db, "StudentFeeDetails", "StudentFeeDetailID", &["StudentFeeID", "FeeCategoryID", "Amount"]);
        let db = table(db, "PaymentMethods", "PaymentMethodID", &["MethodName", "Description", "IsActive"]);
        let db = table(
            db,
            "Payments",
            "PaymentID",
            &["StudentFeeID", "PaymentMethodID", "Amount", "TransactionID", "PaymentDate", "Status", "PaymentReference"],
        );
        let db = table(
            db,
            "Invoices",
            "InvoiceID",
            &["PaymentID", "InvoiceNumber", "InvoiceDate", "InvoicePath", "SentToEmail"],
        );
        table(
            db,
            "Notifications",
            "NotificationID",
            &["UserID", "Title", "Message", "NotificationType", "SentDate", "IsRead"],
        )
    }

    /// Make every insert into `table` fail
    pub fn fail_inserts_into(&mut self, table: &str) {
        self.failing_inserts.insert(table.to_ascii_lowercase());
    }

    /// Make `SET IDENTITY_INSERT ... OFF` fail
    pub fn fail_identity_restore(&mut self) {
        self.fail_identity_restore = true;
    }

    pub fn identity_insert_table(&self) -> Option<&str> {
        self.identity_insert.as_deref()
    }

    /// Statement log, e.g. `INSERT Departments`, `IDENTITY_INSERT Users ON`
    pub fn ops(&self) -> &[String] {
        &self.ops
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.find(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Value of `column` in every row, in insert order
    pub fn column_values(&self, table: &str, column: &str) -> Vec<CellValue> {
        let Some(t) = self.find(table) else {
            return Vec::new();
        };
        match t.column_index(column) {
            Ok(idx) => t.rows.iter().map(|r| r[idx].clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn find(&self, table: &str) -> Option<&MemoryTable> {
        let (_, name) = split_table_name(table);
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    fn find_mut(&mut self, table: &str) -> Result<&mut MemoryTable, DatabaseError> {
        let (_, name) = split_table_name(table);
        self.tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| DatabaseError::QueryError(format!("Invalid object name '{}'.", table)))
    }

    fn table(&self, table: &str) -> Result<&MemoryTable, DatabaseError> {
        self.find(table)
            .ok_or_else(|| DatabaseError::QueryError(format!("Invalid object name '{}'.", table)))
    }

    fn identity_insert_on(&self, table: &str) -> bool {
        self.identity_insert
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case(table))
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl Connection for MemoryDatabase {
    fn driver_label(&self) -> &str {
        "memory"
    }

    async fn row_exists(
        &mut self,
        table: &str,
        key: &[ColumnValue<'_>],
    ) -> Result<bool, DatabaseError> {
        Ok(!self.table(table)?.matching(key)?.is_empty())
    }

    async fn insert_row(
        &mut self,
        table: &str,
        values: &[ColumnValue<'_>],
    ) -> Result<Option<i64>, DatabaseError> {
        self.ops.push(format!("INSERT {}", table));
        if self.failing_inserts.contains(&table.to_ascii_lowercase()) {
            return Err(DatabaseError::QueryError(format!(
                "The INSERT statement conflicted with a constraint on table '{}'.",
                table
            )));
        }

        let identity_on = self.identity_insert_on(table);
        let t = self.find_mut(table)?;
        let mut row = vec![CellValue::Null; t.columns.len()];
        for (column, value) in values {
            let idx = t.column_index(column)?;
            row[idx] = value.clone();
        }

        let Some(identity_idx) = t.identity else {
            t.rows.push(row);
            return Ok(None);
        };

        let explicit = values
            .iter()
            .any(|(c, _)| c.eq_ignore_ascii_case(&t.columns[identity_idx].name));
        let id = match (explicit, identity_on) {
            (true, false) => {
                return Err(DatabaseError::QueryError(format!(
                    "Cannot insert explicit value for identity column in table '{}' when IDENTITY_INSERT is set to OFF.",
                    t.name
                )))
            }
            (false, true) => {
                return Err(DatabaseError::QueryError(format!(
                    "Explicit value must be specified for identity column in table '{}' when IDENTITY_INSERT is set to ON.",
                    t.name
                )))
            }
            (true, true) => {
                let id = row[identity_idx].as_i64().ok_or_else(|| {
                    DatabaseError::QueryError("Identity value must be an integer".to_string())
                })?;
                t.next_id = t.next_id.max(id + 1);
                id
            }
            (false, false) => {
                let id = t.next_id;
                t.next_id += 1;
                row[identity_idx] = CellValue::Int(id);
                id
            }
        };

        t.rows.push(row);
        Ok(Some(id))
    }

    async fn update_rows(
        &mut self,
        table: &str,
        set: &[ColumnValue<'_>],
        key: &[ColumnValue<'_>],
    ) -> Result<u64, DatabaseError> {
        self.ops.push(format!("UPDATE {}", table));
        let t = self.find_mut(table)?;
        let targets = t.matching(key)?;
        let set = set
            .iter()
            .map(|(c, v)| Ok((t.column_index(c)?, v.clone())))
            .collect::<Result<Vec<_>, DatabaseError>>()?;
        for &row in &targets {
            for (idx, value) in &set {
                t.rows[row][*idx] = value.clone();
            }
        }
        Ok(targets.len() as u64)
    }

    async fn select_rows(
        &mut self,
        table: &str,
        columns: &[&str],
        filter: &[ColumnValue<'_>],
    ) -> Result<Vec<Vec<CellValue>>, DatabaseError> {
        let t = self.table(table)?;
        let indexes: Vec<usize> = if columns.is_empty() {
            (0..t.columns.len()).collect()
        } else {
            columns
                .iter()
                .map(|c| t.column_index(c))
                .collect::<Result<_, _>>()?
        };
        Ok(t.matching(filter)?
            .into_iter()
            .map(|r| indexes.iter().map(|&i| t.rows[r][i].clone()).collect())
            .collect())
    }

    async fn set_identity_insert(
        &mut self,
        table: &str,
        enabled: bool,
    ) -> Result<(), DatabaseError> {
        self.ops.push(format!(
            "IDENTITY_INSERT {} {}",
            table,
            if enabled { "ON" } else { "OFF" }
        ));

        if !enabled {
            if self.fail_identity_restore {
                return Err(DatabaseError::ConnectionFailed("connection reset".to_string()));
            }
            if self.identity_insert_on(table) {
                self.identity_insert = None;
            }
            return Ok(());
        }

        if self.table(table)?.identity.is_none() {
            return Err(DatabaseError::QueryError(format!(
                "Table '{}' does not have the identity property. Cannot perform SET operation.",
                table
            )));
        }
        match &self.identity_insert {
            Some(other) if !other.eq_ignore_ascii_case(table) => Err(DatabaseError::QueryError(format!(
                "IDENTITY_INSERT is already ON for table '{}'. Cannot perform SET operation for table '{}'.",
                other, table
            ))),
            _ => {
                self.identity_insert = Some(table.to_string());
                Ok(())
            }
        }
    }

    async fn begin(&mut self) -> Result<(), DatabaseError> {
        self.ops.push("BEGIN".to_string());
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.ops.push("COMMIT".to_string());
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.ops.push("ROLLBACK".to_string());
        if let Some(tables) = self.snapshot.take() {
            self.tables = tables;
        }
        Ok(())
    }

    async fn list_tables(&mut self) -> Result<Vec<TableInfo>, DatabaseError> {
        Ok(self
            .tables
            .iter()
            .map(|t| TableInfo {
                schema_name: "dbo".to_string(),
                table_name: t.name.clone(),
            })
            .collect())
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        Ok(self.find(table).map(|t| t.columns.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_identity_requires_identity_insert() {
        let mut db = MemoryDatabase::tuition_schema();
        let err = db
            .insert_row("Departments", &[("DepartmentID", CellValue::Int(1)), ("DepartmentName", "CS".into())])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("IDENTITY_INSERT is set to OFF"));

        db.set_identity_insert("Departments", true).await.unwrap();
        let id = db
            .insert_row("Departments", &[("DepartmentID", CellValue::Int(7)), ("DepartmentName", "CS".into())])
            .await
            .unwrap();
        assert_eq!(id, Some(7));
        db.set_identity_insert("Departments", false).await.unwrap();

        let next = db
            .insert_row("Departments", &[("DepartmentName", "QTKD".into())])
            .await
            .unwrap();
        assert_eq!(next, Some(8));
    }

    #[tokio::test]
    async fn test_only_one_identity_insert_table() {
        let mut db = MemoryDatabase::tuition_schema();
        db.set_identity_insert("Users", true).await.unwrap();
        assert!(db.set_identity_insert("Students", true).await.is_err());
        assert_eq!(db.identity_insert_table(), Some("Users"));
    }

    #[tokio::test]
    async fn test_rollback_restores_rows() {
        let mut db = MemoryDatabase::tuition_schema();
        db.begin().await.unwrap();
        db.insert_row("Departments", &[("DepartmentName", "CS".into())])
            .await
            .unwrap();
        db.rollback().await.unwrap();
        assert_eq!(db.row_count("Departments"), 0);
    }
}
