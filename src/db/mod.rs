// Database Module
// Connection establishment, the MS-SQL session, statement building and
// schema metadata

pub mod connection;
pub mod query;
pub mod schema;
pub mod session;
pub mod traits;

#[cfg(test)]
pub(crate) mod memory;

pub use connection::{
    AttemptFailure, ConnectAttempt, ConnectionConfig, ConnectionError, ConnectionEstablisher,
    Connector, DriverCandidate, EncryptionMode, Established,
};
pub use schema::SchemaInspector;
pub use session::{with_session, MssqlSession, TiberiusConnector};
pub use traits::{CellValue, ColumnInfo, ColumnValue, Connection, DatabaseError, TableInfo};
