//! Tests for automatic statement caching of raw SQL via `exec`/`exec_iter`.

use std::env;
use zero_postgres::sync::Conn;
use zero_postgres::{Opts, ParamStyle};

fn base_url() -> String {
    let mut db_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/postgres".to_string());
    if !db_url.contains("sslmode=") {
        if db_url.contains('?') {
            db_url.push_str("&sslmode=disable");
        } else {
            db_url.push_str("?sslmode=disable");
        }
    }
    db_url
}

fn get_conn() -> Conn {
    Conn::new(base_url().as_str()).expect("Failed to connect")
}

fn get_conn_with_cache_capacity(capacity: usize) -> Conn {
    let mut url = base_url();
    url.push_str(&format!("&statement_cache_capacity={}", capacity));
    Conn::new(url.as_str()).expect("Failed to connect")
}

/// Executing the same raw SQL text repeatedly should reuse the cached
/// prepared statement rather than erroring on a clash with a leftover
/// server-side statement name.
#[test]
fn repeated_raw_sql_reuses_cached_statement() {
    let mut conn = get_conn();

    for i in 0..5 {
        let rows: Vec<(i32,)> = conn
            .exec_collect("SELECT $1::int4", (i,))
            .expect("exec_collect should succeed on every call");
        assert_eq!(rows, vec![(i,)]);
    }
}

/// Different parameter OID tuples for the same SQL text must be treated
/// as distinct cache entries (the cache key is `(sql, param_oids)`).
#[test]
fn same_sql_different_param_oids_both_work() {
    let mut conn = get_conn();

    let rows: Vec<(i32,)> = conn.exec_collect("SELECT $1", (7_i32,)).unwrap();
    assert_eq!(rows, vec![(7,)]);

    let rows: Vec<(i64,)> = conn.exec_collect("SELECT $1", (7_i64,)).unwrap();
    assert_eq!(rows, vec![(7,)]);
}

/// A tiny cache capacity forces eviction; execution must still succeed
/// (the evicted statement is re-parsed on next use, not an error).
#[test]
fn eviction_under_tight_capacity_still_executes_correctly() {
    let mut conn = get_conn_with_cache_capacity(1);

    let rows: Vec<(i32,)> = conn.exec_collect("SELECT 1", ()).unwrap();
    assert_eq!(rows, vec![(1,)]);

    let rows: Vec<(i32,)> = conn.exec_collect("SELECT 2", ()).unwrap();
    assert_eq!(rows, vec![(2,)]);

    // "SELECT 1" was evicted by "SELECT 2" under capacity 1; re-running it
    // must re-prepare transparently rather than fail.
    let rows: Vec<(i32,)> = conn.exec_collect("SELECT 1", ()).unwrap();
    assert_eq!(rows, vec![(1,)]);
}

/// Raw SQL executed through `exec_iter`'s unnamed-portal path must also
/// go through the cache and paramstyle rewrite, not just `exec`.
#[test]
fn exec_iter_reuses_cached_statement_and_rewrites_placeholders() {
    use zero_postgres::handler::CollectHandler;

    let url = url::Url::parse(&base_url()).expect("valid url");
    let mut opts: Opts = (&url).try_into().expect("valid opts");
    opts.paramstyle = ParamStyle::Qmark;
    let mut conn = Conn::new(opts).expect("Failed to connect");

    for i in 0..3 {
        let rows: Vec<(i32,)> = conn
            .exec_iter("SELECT ?::int4", (i,), |portal| {
                let mut handler = CollectHandler::<(i32,)>::new();
                portal.fetch(0, &mut handler)?;
                Ok(handler.into_rows())
            })
            .unwrap();
        assert_eq!(rows, vec![(i,)]);
    }
}
