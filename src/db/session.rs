// MS-SQL Session
// A single tiberius client implementing the Connection trait

use chrono::{NaiveDate, NaiveDateTime};
use futures::future::LocalBoxFuture;
use tiberius::{Client, ColumnType, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use crate::db::connection::{
    ConnectAttempt, ConnectionConfig, ConnectionError, ConnectionEstablisher, Connector,
};
use crate::db::query::{self, Statement};
use crate::db::traits::{CellValue, ColumnInfo, ColumnValue, Connection, DatabaseError, TableInfo};

pub type MssqlClient = Client<Compat<TcpStream>>;

/// Opens tiberius clients over TCP, bounded by the configured timeout
pub struct TiberiusConnector;

#[async_trait::async_trait]
impl Connector for TiberiusConnector {
    type Conn = MssqlSession;

    async fn open(
        &self,
        config: &ConnectionConfig,
        attempt: &ConnectAttempt,
    ) -> Result<Self::Conn, DatabaseError> {
        let tiberius_config = config.config_for(attempt)?;
        let connect = async {
            let tcp = TcpStream::connect(tiberius_config.get_addr())
                .await
                .map_err(|e| DatabaseError::ConnectionFailed(format!("TCP connection failed: {}", e)))?;
            tcp.set_nodelay(true).map_err(|e| {
                DatabaseError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
            })?;
            Client::connect(tiberius_config, tcp.compat_write())
                .await
                .map_err(|e| match DatabaseError::from(e) {
                    DatabaseError::QueryError(msg) => DatabaseError::ConnectionFailed(msg),
                    other => other,
                })
        };

        let client = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| DatabaseError::Timeout)??;

        Ok(MssqlSession::new(client, attempt.label()))
    }

    async fn close(&self, conn: Self::Conn) {
        conn.close().await;
    }
}

/// Connection on one live tiberius client
pub struct MssqlSession {
    client: MssqlClient,
    driver_label: String,
}

impl MssqlSession {
    pub fn new(client: MssqlClient, driver_label: String) -> Self {
        Self {
            client,
            driver_label,
        }
    }

    /// Close the underlying connection
    pub async fn close(self) {
        if let Err(e) = self.client.close().await {
            warn!("Error while closing database connection: {}", e);
        } else {
            debug!("Database connection closed");
        }
    }

    fn prepare(stmt: &Statement) -> Query<'_> {
        let mut query = Query::new(stmt.sql.as_str());
        for value in &stmt.params {
            bind_value(&mut query, value);
        }
        query
    }

    /// Run a parameterized statement and collect every result set
    async fn fetch_all(&mut self, stmt: &Statement) -> Result<Vec<Vec<Row>>, DatabaseError> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "query");
        let stream = Self::prepare(stmt).query(&mut self.client).await?;
        Ok(stream.into_results().await?)
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64, DatabaseError> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), "execute");
        let result = Self::prepare(stmt).execute(&mut self.client).await?;
        Ok(result.total())
    }

    async fn simple(&mut self, sql: &str) -> Result<(), DatabaseError> {
        debug!(sql, "simple query");
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}

/// Bind one value as the next @Pn parameter
fn bind_value(query: &mut Query<'_>, value: &CellValue) {
    match value {
        CellValue::Null => query.bind(Option::<String>::None),
        CellValue::Bool(b) => query.bind(*b),
        CellValue::Int(v) => query.bind(*v),
        CellValue::Float(v) => query.bind(*v),
        CellValue::String(s) => query.bind(s.clone()),
        CellValue::Date(d) => query.bind(*d),
        CellValue::DateTime(dt) => query.bind(*dt),
    }
}

/// Extract a cell value from a row by column type
fn cell_value_from_row(row: &Row, idx: usize) -> CellValue {
    let col_type = row
        .columns()
        .get(idx)
        .map(|c| c.column_type())
        .unwrap_or(ColumnType::Null);

    let value = match col_type {
        ColumnType::Null => None,

        // Integer types
        ColumnType::Int1 => row.try_get::<u8, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)),
        ColumnType::Int2 => row.try_get::<i16, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)),
        ColumnType::Int4 => row.try_get::<i32, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)),
        ColumnType::Int8 => row.try_get::<i64, _>(idx).ok().flatten().map(CellValue::Int),
        ColumnType::Intn => row
            .try_get::<i64, _>(idx)
            .ok()
            .flatten()
            .map(CellValue::Int)
            .or_else(|| row.try_get::<i32, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)))
            .or_else(|| row.try_get::<i16, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)))
            .or_else(|| row.try_get::<u8, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64))),

        // Float types
        ColumnType::Float4 => row.try_get::<f32, _>(idx).ok().flatten().map(|v| CellValue::Float(v as f64)),
        ColumnType::Float8 | ColumnType::Money | ColumnType::Money4 => {
            row.try_get::<f64, _>(idx).ok().flatten().map(CellValue::Float)
        }
        ColumnType::Floatn => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .map(CellValue::Float)
            .or_else(|| row.try_get::<f32, _>(idx).ok().flatten().map(|v| CellValue::Float(v as f64))),

        // Decimal/Numeric types
        ColumnType::Decimaln | ColumnType::Numericn => row
            .try_get::<tiberius::numeric::Numeric, _>(idx)
            .ok()
            .flatten()
            .map(|n| CellValue::Float(f64::from(n))),

        // Boolean
        ColumnType::Bit | ColumnType::Bitn => row.try_get::<bool, _>(idx).ok().flatten().map(CellValue::Bool),

        // String types
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText => row
            .try_get::<&str, _>(idx)
            .ok()
            .flatten()
            .map(|s| CellValue::String(s.to_string())),

        // Date/Time types
        ColumnType::Datetime | ColumnType::Datetime2 | ColumnType::Datetimen | ColumnType::Datetime4 => row
            .try_get::<NaiveDateTime, _>(idx)
            .ok()
            .flatten()
            .map(CellValue::DateTime),
        ColumnType::Daten => row.try_get::<NaiveDate, _>(idx).ok().flatten().map(CellValue::Date),

        // GUID
        ColumnType::Guid => row
            .try_get::<tiberius::Uuid, _>(idx)
            .ok()
            .flatten()
            .map(|u| CellValue::String(u.to_string())),

        _ => None,
    };

    value.unwrap_or(CellValue::Null)
}

fn row_values(row: &Row) -> Vec<CellValue> {
    (0..row.columns().len()).map(|idx| cell_value_from_row(row, idx)).collect()
}

#[async_trait::async_trait]
impl Connection for MssqlSession {
    fn driver_label(&self) -> &str {
        &self.driver_label
    }

    async fn row_exists(
        &mut self,
        table: &str,
        key: &[ColumnValue<'_>],
    ) -> Result<bool, DatabaseError> {
        let stmt = query::exists_statement(table, key);
        let results = self.fetch_all(&stmt).await?;
        Ok(results.first().map(|rows| !rows.is_empty()).unwrap_or(false))
    }

    async fn insert_row(
        &mut self,
        table: &str,
        values: &[ColumnValue<'_>],
    ) -> Result<Option<i64>, DatabaseError> {
        let stmt = query::insert_statement(table, values);
        let results = self.fetch_all(&stmt).await?;
        // The SCOPE_IDENTITY() read is the last result set
        let new_id = results
            .last()
            .and_then(|rows| rows.first())
            .and_then(|row| cell_value_from_row(row, 0).as_i64());
        Ok(new_id)
    }

    async fn update_rows(
        &mut self,
        table: &str,
        set: &[ColumnValue<'_>],
        key: &[ColumnValue<'_>],
    ) -> Result<u64, DatabaseError> {
        let stmt = query::update_statement(table, set, key);
        self.execute(&stmt).await
    }

    async fn select_rows(
        &mut self,
        table: &str,
        columns: &[&str],
        filter: &[ColumnValue<'_>],
    ) -> Result<Vec<Vec<CellValue>>, DatabaseError> {
        let stmt = query::select_statement(table, columns, filter);
        let results = self.fetch_all(&stmt).await?;
        Ok(results
            .first()
            .map(|rows| rows.iter().map(row_values).collect())
            .unwrap_or_default())
    }

    async fn set_identity_insert(
        &mut self,
        table: &str,
        enabled: bool,
    ) -> Result<(), DatabaseError> {
        self.simple(&query::identity_insert_statement(table, enabled)).await
    }

    async fn begin(&mut self) -> Result<(), DatabaseError> {
        self.simple("BEGIN TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.simple("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.simple("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    async fn list_tables(&mut self) -> Result<Vec<TableInfo>, DatabaseError> {
        let stream = self.client.simple_query(query::LIST_TABLES).await?;
        let rows = stream.into_first_result().await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let schema_name = row.try_get::<&str, _>(0).ok().flatten()?.to_string();
                let table_name = row.try_get::<&str, _>(1).ok().flatten()?.to_string();
                Some(TableInfo {
                    schema_name,
                    table_name,
                })
            })
            .collect())
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let (schema, name) = query::split_table_name(table);
        let stmt = Statement {
            sql: query::LIST_COLUMNS.to_string(),
            params: vec![CellValue::from(schema), CellValue::from(name)],
        };
        let results = self.fetch_all(&stmt).await?;
        let rows = results.into_iter().next().unwrap_or_default();

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.try_get::<&str, _>(0).ok().flatten()?.to_string();
                let data_type = row.try_get::<&str, _>(1).ok().flatten().unwrap_or("unknown").to_string();
                let max_length = row.try_get::<i32, _>(2).ok().flatten();
                let is_nullable = row.try_get::<&str, _>(3).ok().flatten().map(|s| s == "YES").unwrap_or(true);
                let is_identity = row.try_get::<i32, _>(4).ok().flatten().map(|v| v == 1).unwrap_or(false);
                let ordinal_position = row.try_get::<i32, _>(5).ok().flatten().unwrap_or(0);
                Some(ColumnInfo {
                    name,
                    data_type,
                    max_length,
                    is_nullable,
                    is_identity,
                    ordinal_position,
                })
            })
            .collect())
    }
}

/// Connect over tiberius with the full fallback chain, run `f`, and close
/// the session on every exit path
pub async fn with_session<T, E, F>(config: &ConnectionConfig, f: F) -> Result<T, E>
where
    E: From<ConnectionError>,
    F: for<'s> FnOnce(&'s mut MssqlSession) -> LocalBoxFuture<'s, Result<T, E>>,
{
    with_connector_session(TiberiusConnector, config, f).await
}

/// Same as `with_session`, over any connector
pub async fn with_connector_session<K, T, E, F>(
    connector: K,
    config: &ConnectionConfig,
    f: F,
) -> Result<T, E>
where
    K: Connector,
    E: From<ConnectionError>,
    F: for<'s> FnOnce(&'s mut K::Conn) -> LocalBoxFuture<'s, Result<T, E>>,
{
    let establisher = ConnectionEstablisher::new(connector, config.clone());
    let established = establisher.connect().await?;
    debug!(
        attempt = %established.attempt.label(),
        failed_attempts = established.failures.len(),
        "session open"
    );
    let mut conn = established.conn;

    let outcome = f(&mut conn).await;
    establisher.connector().close(conn).await;
    outcome
}
