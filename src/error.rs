//! Error types for the driver.

use std::collections::HashMap;
use thiserror::Error;

use crate::protocol::types::Oid;

/// Result type for driver operations.
pub type Result<T> = core::result::Result<T, Error>;

/// PostgreSQL error/notice field type codes.
pub mod field_type {
    pub const SEVERITY: u8 = b'S';
    pub const SEVERITY_V: u8 = b'V';
    pub const CODE: u8 = b'C';
    pub const MESSAGE: u8 = b'M';
    pub const DETAIL: u8 = b'D';
    pub const HINT: u8 = b'H';
    pub const POSITION: u8 = b'P';
    pub const INTERNAL_POSITION: u8 = b'p';
    pub const INTERNAL_QUERY: u8 = b'q';
    pub const WHERE: u8 = b'W';
    pub const SCHEMA: u8 = b's';
    pub const TABLE: u8 = b't';
    pub const COLUMN: u8 = b'c';
    pub const DATA_TYPE: u8 = b'd';
    pub const CONSTRAINT: u8 = b'n';
    pub const FILE: u8 = b'F';
    pub const LINE: u8 = b'L';
    pub const ROUTINE: u8 = b'R';
}

/// Classification of a `DatabaseError` by its SQLSTATE class, so callers can
/// match on error category without parsing the code themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlStateClass {
    /// 23xxx - constraint violations
    Integrity,
    /// 42xxx, 26xxx, 2Dxxx - bad SQL, undefined objects, invalid transaction termination
    Programming,
    /// 22xxx - bad input data
    Data,
    /// 53xxx, 57xxx, 58xxx - resource exhaustion, operator intervention (including cancellation), system errors
    Operational,
    /// XXxxx - internal server errors
    Internal,
    /// Anything else
    Other,
}

fn classify(sqlstate: &str) -> SqlStateClass {
    let class = sqlstate.get(0..2).unwrap_or("");
    match class {
        "23" => SqlStateClass::Integrity,
        "42" | "26" | "2D" => SqlStateClass::Programming,
        "22" => SqlStateClass::Data,
        "53" | "57" | "58" => SqlStateClass::Operational,
        "XX" => SqlStateClass::Internal,
        _ => SqlStateClass::Other,
    }
}

/// A PostgreSQL `ErrorResponse`/`NoticeResponse` payload, field-coded per the protocol.
#[derive(Debug, Clone, Default)]
pub struct ServerError(pub(crate) HashMap<u8, String>);

impl ServerError {
    /// Build from a map of field-type byte to value.
    pub fn new(fields: HashMap<u8, String>) -> Self {
        Self(fields)
    }

    /// Severity (localized): ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG.
    pub fn severity(&self) -> &str {
        self.0
            .get(&field_type::SEVERITY)
            .map(|s| s.as_str())
            .unwrap_or_default()
    }

    /// Severity (non-localized, PostgreSQL 9.6+, never translated).
    pub fn severity_v(&self) -> &str {
        self.0
            .get(&field_type::SEVERITY_V)
            .map(|s| s.as_str())
            .unwrap_or_default()
    }

    /// SQLSTATE error code (5 characters).
    pub fn code(&self) -> &str {
        self.0
            .get(&field_type::CODE)
            .map(|s| s.as_str())
            .unwrap_or_default()
    }

    /// This error's SQLSTATE class.
    pub fn sqlstate_class(&self) -> SqlStateClass {
        classify(self.code())
    }

    /// Primary error message.
    pub fn message(&self) -> &str {
        self.0
            .get(&field_type::MESSAGE)
            .map(|s| s.as_str())
            .unwrap_or_default()
    }

    /// Detailed error explanation.
    pub fn detail(&self) -> Option<&str> {
        self.0.get(&field_type::DETAIL).map(|s| s.as_str())
    }

    /// Suggestion for fixing the error.
    pub fn hint(&self) -> Option<&str> {
        self.0.get(&field_type::HINT).map(|s| s.as_str())
    }

    /// Cursor position in the query string (1-based).
    pub fn position(&self) -> Option<u32> {
        self.0
            .get(&field_type::POSITION)
            .and_then(|s| s.parse().ok())
    }

    /// Position in an internally generated command.
    pub fn internal_position(&self) -> Option<u32> {
        self.0
            .get(&field_type::INTERNAL_POSITION)
            .and_then(|s| s.parse().ok())
    }

    /// Text of the internally generated command that failed.
    pub fn internal_query(&self) -> Option<&str> {
        self.0.get(&field_type::INTERNAL_QUERY).map(|s| s.as_str())
    }

    /// Context in which the error occurred.
    pub fn where_(&self) -> Option<&str> {
        self.0.get(&field_type::WHERE).map(|s| s.as_str())
    }

    /// Schema name, if applicable.
    pub fn schema(&self) -> Option<&str> {
        self.0.get(&field_type::SCHEMA).map(|s| s.as_str())
    }

    /// Table name, if applicable.
    pub fn table(&self) -> Option<&str> {
        self.0.get(&field_type::TABLE).map(|s| s.as_str())
    }

    /// Column name, if applicable.
    pub fn column(&self) -> Option<&str> {
        self.0.get(&field_type::COLUMN).map(|s| s.as_str())
    }

    /// Data type name, if applicable.
    pub fn data_type(&self) -> Option<&str> {
        self.0.get(&field_type::DATA_TYPE).map(|s| s.as_str())
    }

    /// Constraint name, if applicable.
    pub fn constraint(&self) -> Option<&str> {
        self.0.get(&field_type::CONSTRAINT).map(|s| s.as_str())
    }

    /// Server source file that raised the error.
    pub fn file(&self) -> Option<&str> {
        self.0.get(&field_type::FILE).map(|s| s.as_str())
    }

    /// Server source line number.
    pub fn line(&self) -> Option<u32> {
        self.0.get(&field_type::LINE).and_then(|s| s.parse().ok())
    }

    /// Server source routine name.
    pub fn routine(&self) -> Option<&str> {
        self.0.get(&field_type::ROUTINE).map(|s| s.as_str())
    }

    /// Raw access to a field by its type code.
    pub fn get(&self, field_type: u8) -> Option<&str> {
        self.0.get(&field_type).map(|s| s.as_str())
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (SQLSTATE {})",
            self.severity(),
            self.message(),
            self.code()
        )?;
        if let Some(detail) = self.detail() {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = self.hint() {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// A server-reported `ErrorResponse`, classified by SQLSTATE.
#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub server: ServerError,
    pub class: SqlStateClass,
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.server)
    }
}

/// The driver's error type.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure or timeout on the underlying transport; the connection is unusable.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed framing, unexpected message, or unsupported authentication method;
    /// the connection is unusable.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A server-reported `ErrorResponse`, classified by SQLSTATE.
    #[error(transparent)]
    Database(DatabaseError),

    /// TLS handshake or certificate error.
    #[cfg(any(feature = "sync-tls", feature = "tokio-tls"))]
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Misuse of the client API: operation on a closed cursor/connection,
    /// unsupported paramstyle, second execute before drain, etc.
    #[error("interface error: {0}")]
    Interface(String),

    /// An execute was attempted while the transaction status is `failed`.
    #[error("current transaction is aborted; only ROLLBACK is permitted")]
    InFailedTransaction,

    /// Value decode/encode error (type mismatch, overflow, malformed bytes).
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Build a classified `Database` error from server fields.
    pub fn database(server: ServerError) -> Self {
        let class = server.sqlstate_class();
        Error::Database(DatabaseError { server, class })
    }

    /// Build an `UnsupportedAuthMethod` protocol error for an auth subtype code.
    pub fn unsupported_auth_method(auth_type: i32) -> Self {
        Error::Protocol(format!("unsupported authentication method: {auth_type}"))
    }

    /// Build a decode error for a value that cannot be represented as `target_oid`.
    pub fn type_mismatch(natural_oid: Oid, target_oid: Oid) -> Self {
        Error::Decode(format!(
            "cannot encode value (natural oid {natural_oid}) as target oid {target_oid}"
        ))
    }

    /// Build a decode error for a value that overflows the target wire type.
    pub fn overflow(from: &str, to: &str) -> Self {
        Error::Decode(format!("{from} value overflows {to}"))
    }

    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Database(db) => matches!(db.server.severity_v(), "FATAL" | "PANIC"),
            _ => false,
        }
    }

    /// The SQLSTATE code, if this is a server-reported error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Database(db) => Some(db.server.code()),
            _ => None,
        }
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized> From<zerocopy::error::CastError<Src, Dst>>
    for Error
{
    fn from(err: zerocopy::error::CastError<Src, Dst>) -> Self {
        Error::Protocol(format!("zerocopy cast error: {err:?}"))
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_integrity_violation() {
        let mut fields = HashMap::new();
        fields.insert(field_type::CODE, "23505".to_string());
        let err = ServerError::new(fields);
        assert_eq!(err.sqlstate_class(), SqlStateClass::Integrity);
    }

    #[test]
    fn classifies_data_error() {
        let mut fields = HashMap::new();
        fields.insert(field_type::CODE, "22012".to_string());
        let err = ServerError::new(fields);
        assert_eq!(err.sqlstate_class(), SqlStateClass::Data);
    }

    #[test]
    fn classifies_operational_cancellation() {
        let mut fields = HashMap::new();
        fields.insert(field_type::CODE, "57014".to_string());
        let err = ServerError::new(fields);
        assert_eq!(err.sqlstate_class(), SqlStateClass::Operational);
    }
}
