//! Tests for the failed-transaction guard and error-drain discipline.

use std::env;
use zero_postgres::sync::Conn;
use zero_postgres::Error;

fn get_conn() -> Conn {
    let mut db_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/postgres".to_string());
    if !db_url.contains("sslmode=") {
        if db_url.contains('?') {
            db_url.push_str("&sslmode=disable");
        } else {
            db_url.push_str("?sslmode=disable");
        }
    }
    Conn::new(db_url.as_str()).expect("Failed to connect")
}

/// S2: a failing statement inside an explicit transaction puts the connection
/// into the failed state; a further statement must be rejected locally with
/// `InFailedTransaction` rather than round-tripping to the server, and the
/// connection must not desync (the subsequent `ROLLBACK` must still work).
#[test]
fn failed_transaction_rejects_further_statements_until_rollback() {
    let mut conn = get_conn();

    conn.query_drop("BEGIN").unwrap();

    let err = conn.query_drop("SELECT 1/0").unwrap_err();
    assert!(matches!(err, Error::Database(_)));
    assert!(conn.transaction_status().is_failed());

    let err = conn
        .exec_drop("SELECT 1", ())
        .expect_err("execute must be rejected locally while the transaction is failed");
    assert!(matches!(err, Error::InFailedTransaction));

    conn.query_drop("ROLLBACK").unwrap();
    assert!(!conn.transaction_status().is_failed());

    let rows: Vec<(i32,)> = conn.exec_collect("SELECT 1", ()).unwrap();
    assert_eq!(rows, vec![(1,)]);
}

/// The connection must stay in sync after an `ErrorResponse`: a statement
/// executed right after the failing one must not desync on a stray
/// `ReadyForQuery` left unread on the wire.
#[test]
fn connection_stays_in_sync_after_extended_query_error() {
    let mut conn = get_conn();

    conn.query_drop("BEGIN").unwrap();
    let err = conn.exec_drop("SELECT 1/0", ()).unwrap_err();
    assert!(matches!(err, Error::Database(_)));

    conn.query_drop("ROLLBACK").unwrap();

    let rows: Vec<(i32,)> = conn.exec_collect("SELECT 2", ()).unwrap();
    assert_eq!(rows, vec![(2,)]);
}
