//! LRU cache mapping raw SQL text plus inferred parameter OIDs to an
//! already-prepared statement, so repeated `exec`/`exec_iter` calls with a
//! `&str` avoid re-parsing on the server.

use crate::protocol::types::Oid;
use crate::state::extended::PreparedStatement;

type Key = (String, Vec<Oid>);

#[derive(Debug)]
pub(crate) struct StatementCache {
    capacity: Option<usize>,
    entries: std::collections::HashMap<Key, PreparedStatement>,
    // Least-recently-used at the front, most-recently-used at the back.
    order: Vec<Key>,
}

impl StatementCache {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            entries: std::collections::HashMap::new(),
            order: Vec::new(),
        }
    }

    pub(crate) fn get(&mut self, sql: &str, param_oids: &[Oid]) -> Option<&PreparedStatement> {
        let key = (sql.to_string(), param_oids.to_vec());
        if !self.entries.contains_key(&key) {
            return None;
        }
        if let Some(pos) = self.order.iter().position(|k| k == &key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
        self.entries.get(&key)
    }

    /// Insert a freshly-prepared statement, returning one evicted statement
    /// (if the cache is at capacity) whose server-side resources the caller
    /// must release with `Close(Statement)` + `Sync`.
    pub(crate) fn insert(
        &mut self,
        sql: String,
        param_oids: Vec<Oid>,
        stmt: PreparedStatement,
    ) -> Option<PreparedStatement> {
        let key = (sql, param_oids);
        self.entries.insert(key.clone(), stmt);
        self.order.push(key);

        match self.capacity {
            Some(cap) if self.order.len() > cap => {
                let evicted_key = self.order.remove(0);
                self.entries.remove(&evicted_key)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(name: &str) -> PreparedStatement {
        PreparedStatement::new(0, Vec::new(), None, name.to_string())
    }

    #[test]
    fn hit_after_insert() {
        let mut cache = StatementCache::new(None);
        assert!(cache.get("SELECT $1", &[23]).is_none());
        cache.insert("SELECT $1".to_string(), vec![23], stmt("s1"));
        assert!(cache.get("SELECT $1", &[23]).is_some());
    }

    #[test]
    fn distinct_param_oids_are_distinct_keys() {
        let mut cache = StatementCache::new(None);
        cache.insert("SELECT $1".to_string(), vec![23], stmt("s1"));
        assert!(cache.get("SELECT $1", &[25]).is_none());
    }

    #[test]
    fn evicts_least_recently_used_past_capacity() {
        let mut cache = StatementCache::new(Some(2));
        assert!(cache.insert("a".to_string(), vec![], stmt("s1")).is_none());
        assert!(cache.insert("b".to_string(), vec![], stmt("s2")).is_none());
        // touch "a" so "b" becomes the LRU entry
        assert!(cache.get("a", &[]).is_some());
        let evicted = cache.insert("c".to_string(), vec![], stmt("s3"));
        assert_eq!(evicted.map(|s| s.wire_name()), Some("s2".to_string()));
        assert!(cache.get("a", &[]).is_some());
        assert!(cache.get("c", &[]).is_some());
    }
}
