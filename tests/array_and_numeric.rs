//! Tests for array decoding and the NUMERIC parameter wire format.

use std::env;
use zero_postgres::conversion::Array;
use zero_postgres::sync::Conn;

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

/// spec.md §8 scenario S3: `SELECT '{1,2,NULL,4}'::int[]` decodes to
/// `[1, 2, null, 4]` regardless of which format the server used.
#[test]
fn test_array_literal_with_null() {
    let mut conn = get_conn();

    let row: Option<(Array<i32>,)> = conn
        .query_first("SELECT '{1,2,NULL,4}'::int[]")
        .unwrap();
    let (arr,) = row.unwrap();
    assert_eq!(arr.0, vec![Some(1), Some(2), None, Some(4)]);
}

#[test]
fn test_array_binary_round_trip() {
    let mut conn = get_conn();

    let stmt = conn.prepare("SELECT $1::int4[]").unwrap();
    let input = Array::<i32>(vec![Some(10), None, Some(30)]);
    let rows: Vec<(Array<i32>,)> = conn.exec_collect(&stmt, (input.clone(),)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0 .0, input.0);
}

#[test]
fn test_empty_array() {
    let mut conn = get_conn();

    let row: Option<(Array<i32>,)> = conn.query_first("SELECT '{}'::int[]").unwrap();
    let (arr,) = row.unwrap();
    assert!(arr.0.is_empty());
}

#[test]
fn test_text_array_of_strings() {
    let mut conn = get_conn();

    let row: Option<(Array<String>,)> = conn
        .query_first(r#"SELECT ARRAY['hello, world', 'a"b', NULL]::text[]"#)
        .unwrap();
    let (arr,) = row.unwrap();
    assert_eq!(
        arr.0,
        vec![
            Some("hello, world".to_string()),
            Some("a\"b".to_string()),
            None
        ]
    );
}

/// Regression test: a NUMERIC parameter must round-trip through the
/// extended query protocol without format/payload mismatch (the Bind
/// message's declared format code must match the bytes actually sent).
#[cfg(feature = "with-rust-decimal")]
#[test]
fn test_numeric_parameter_round_trip() {
    use rust_decimal::Decimal;
    use std::str::FromStr;

    let mut conn = get_conn();

    let stmt = conn.prepare("SELECT $1::numeric").unwrap();
    let value = Decimal::from_str("123.456").unwrap();
    let rows: Vec<(Decimal,)> = conn.exec_collect(&stmt, (value,)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, value);
}
