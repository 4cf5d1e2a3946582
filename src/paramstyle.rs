//! Rewriting of DB-API-style placeholder syntax to the wire's native `$N` form.
//!
//! The scanner tracks quoting/comment context so placeholders inside string
//! literals, quoted identifiers, dollar-quoted strings, and comments are left
//! untouched.

use std::borrow::Cow;

use crate::error::Result;
use crate::opts::ParamStyle;

/// Rewrite `sql` from `style` to native `$N` placeholders.
///
/// Returns the original string unchanged (as `Cow::Borrowed`) for
/// [`ParamStyle::Native`] or when the statement contains no placeholders.
pub fn rewrite(sql: &str, style: ParamStyle) -> Result<Cow<'_, str>> {
    if style == ParamStyle::Native {
        return Ok(Cow::Borrowed(sql));
    }

    let mut out = String::new();
    let mut names: Vec<String> = Vec::new();
    let mut rewritten = false;
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        match b {
            b'\'' => {
                let end = scan_quoted(sql, i, b'\'');
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'"' => {
                let end = scan_quoted(sql, i, b'"');
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'$' if is_dollar_quote_start(sql, i) => {
                let end = scan_dollar_quoted(sql, i);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = sql[i..].find('\n').map_or(sql.len(), |n| i + n + 1);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = scan_block_comment(sql, i);
                out.push_str(&sql[i..end]);
                i = end;
            }
            b'?' if style == ParamStyle::Qmark => {
                names.push(names.len().to_string());
                out.push('$');
                out.push_str(&names.len().to_string());
                rewritten = true;
                i += 1;
            }
            b':' if style == ParamStyle::Numeric && next_is_digit(bytes, i + 1) => {
                let (digits, end) = scan_digits(sql, i + 1);
                out.push('$');
                out.push_str(digits);
                rewritten = true;
                i = end;
            }
            b':' if style == ParamStyle::Named && next_is_ident_start(bytes, i + 1) => {
                let (name, end) = scan_ident(sql, i + 1);
                let idx = index_of_name(&mut names, name);
                out.push('$');
                out.push_str(&idx.to_string());
                rewritten = true;
                i = end;
            }
            b'%' if style == ParamStyle::Format && bytes.get(i + 1) == Some(&b's') => {
                names.push(names.len().to_string());
                out.push('$');
                out.push_str(&names.len().to_string());
                rewritten = true;
                i += 2;
            }
            b'%' if style == ParamStyle::PyFormat && bytes.get(i + 1) == Some(&b'(') => {
                let Some((name, end)) = scan_pyformat(sql, i) else {
                    out.push(b as char);
                    i += 1;
                    continue;
                };
                let idx = index_of_name(&mut names, name);
                out.push('$');
                out.push_str(&idx.to_string());
                rewritten = true;
                i = end;
            }
            b'%' if style == ParamStyle::Format && bytes.get(i + 1) == Some(&b'%') => {
                out.push('%');
                i += 2;
            }
            _ => {
                // Advance by one UTF-8 scalar, not necessarily one byte.
                let ch_len = utf8_len(b);
                out.push_str(&sql[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    if rewritten {
        Ok(Cow::Owned(out))
    } else {
        Ok(Cow::Borrowed(sql))
    }
}

fn index_of_name(names: &mut Vec<String>, name: &str) -> usize {
    if let Some(pos) = names.iter().position(|n| n == name) {
        pos + 1
    } else {
        names.push(name.to_string());
        names.len()
    }
}

fn utf8_len(lead: u8) -> usize {
    if lead & 0b1000_0000 == 0 {
        1
    } else if lead & 0b1110_0000 == 0b1100_0000 {
        2
    } else if lead & 0b1111_0000 == 0b1110_0000 {
        3
    } else {
        4
    }
}

fn next_is_digit(bytes: &[u8], i: usize) -> bool {
    bytes.get(i).is_some_and(u8::is_ascii_digit)
}

fn next_is_ident_start(bytes: &[u8], i: usize) -> bool {
    bytes
        .get(i)
        .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
}

fn scan_digits(sql: &str, start: usize) -> (&str, usize) {
    let bytes = sql.as_bytes();
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    (&sql[start..end], end)
}

fn scan_ident(sql: &str, start: usize) -> (&str, usize) {
    let bytes = sql.as_bytes();
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    (&sql[start..end], end)
}

/// Scans `%(name)s`. Returns `None` (leave text untouched) if the trailing `s` is missing.
fn scan_pyformat(sql: &str, start: usize) -> Option<(&str, usize)> {
    let bytes = sql.as_bytes();
    let close = sql[start + 2..].find(')')? + start + 2;
    if bytes.get(close + 1) != Some(&b's') {
        return None;
    }
    Some((&sql[start + 2..close], close + 2))
}

/// Scans a `'...'` or `"..."` literal starting at the opening quote, doubled-quote escaped.
fn scan_quoted(sql: &str, start: usize, quote: u8) -> usize {
    let bytes = sql.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += utf8_len(bytes[i]);
    }
    i
}

/// True if `$` at `start` begins a dollar-quote tag (`$$` or `$tag$`).
fn is_dollar_quote_start(sql: &str, start: usize) -> bool {
    dollar_tag_end(sql, start).is_some()
}

/// Returns the index just past the closing `$` of the opening tag, if `start` begins one.
fn dollar_tag_end(sql: &str, start: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'$' => return Some(i + 1),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' => i += 1,
            _ => return None,
        }
    }
    None
}

fn scan_dollar_quoted(sql: &str, start: usize) -> usize {
    let Some(tag_end) = dollar_tag_end(sql, start) else {
        return start + 1;
    };
    let tag = &sql[start..tag_end];
    match sql[tag_end..].find(tag) {
        Some(rel) => tag_end + rel + tag.len(),
        None => sql.len(),
    }
}

fn scan_block_comment(sql: &str, start: usize) -> usize {
    let mut depth = 1usize;
    let mut i = start + 2;
    let bytes = sql.as_bytes();
    while i < bytes.len() && depth > 0 {
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
            depth -= 1;
            i += 2;
        } else {
            i += utf8_len(bytes[i]);
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_is_noop() {
        let sql = "SELECT * FROM t WHERE a = $1 AND b = ?";
        assert!(matches!(
            rewrite(sql, ParamStyle::Native).unwrap(),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn qmark_rewrites_sequentially() {
        let sql = "SELECT * FROM t WHERE a = ? AND b = ?";
        assert_eq!(
            rewrite(sql, ParamStyle::Qmark).unwrap(),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn numeric_maps_directly_and_allows_reuse() {
        let sql = "SELECT * FROM t WHERE a = :2 AND b = :1 AND c = :2";
        assert_eq!(
            rewrite(sql, ParamStyle::Numeric).unwrap(),
            "SELECT * FROM t WHERE a = $2 AND b = $1 AND c = $2"
        );
    }

    #[test]
    fn named_assigns_by_first_occurrence() {
        let sql = "SELECT * FROM t WHERE a = :foo AND b = :bar AND c = :foo";
        assert_eq!(
            rewrite(sql, ParamStyle::Named).unwrap(),
            "SELECT * FROM t WHERE a = $1 AND b = $2 AND c = $1"
        );
    }

    #[test]
    fn format_rewrites_sequentially() {
        let sql = "SELECT * FROM t WHERE a = %s AND b = %s";
        assert_eq!(
            rewrite(sql, ParamStyle::Format).unwrap(),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn format_percent_escape_is_preserved() {
        let sql = "SELECT a FROM t WHERE name LIKE '100%%' AND b = %s";
        assert_eq!(
            rewrite(sql, ParamStyle::Format).unwrap(),
            "SELECT a FROM t WHERE name LIKE '100%' AND b = $1"
        );
    }

    #[test]
    fn pyformat_assigns_by_name() {
        let sql = "SELECT * FROM t WHERE a = %(foo)s AND b = %(bar)s AND c = %(foo)s";
        assert_eq!(
            rewrite(sql, ParamStyle::PyFormat).unwrap(),
            "SELECT * FROM t WHERE a = $1 AND b = $2 AND c = $1"
        );
    }

    #[test]
    fn placeholders_in_string_literals_are_preserved() {
        let sql = "SELECT * FROM t WHERE a = ? AND note = 'what? really?'";
        assert_eq!(
            rewrite(sql, ParamStyle::Qmark).unwrap(),
            "SELECT * FROM t WHERE a = $1 AND note = 'what? really?'"
        );
    }

    #[test]
    fn placeholders_in_quoted_identifiers_are_preserved() {
        let sql = r#"SELECT "weird?col" FROM t WHERE a = ?"#;
        assert_eq!(
            rewrite(sql, ParamStyle::Qmark).unwrap(),
            r#"SELECT "weird?col" FROM t WHERE a = $1"#
        );
    }

    #[test]
    fn escaped_quotes_inside_literal_are_handled() {
        let sql = "SELECT * FROM t WHERE note = 'it''s a ? test' AND a = ?";
        assert_eq!(
            rewrite(sql, ParamStyle::Qmark).unwrap(),
            "SELECT * FROM t WHERE note = 'it''s a ? test' AND a = $1"
        );
    }

    #[test]
    fn placeholders_in_dollar_quoted_strings_are_preserved() {
        let sql = "SELECT $tag$literal ? text$tag$ FROM t WHERE a = ?";
        assert_eq!(
            rewrite(sql, ParamStyle::Qmark).unwrap(),
            "SELECT $tag$literal ? text$tag$ FROM t WHERE a = $1"
        );
    }

    #[test]
    fn placeholders_in_line_comments_are_preserved() {
        let sql = "SELECT a FROM t -- what about ?\nWHERE b = ?";
        assert_eq!(
            rewrite(sql, ParamStyle::Qmark).unwrap(),
            "SELECT a FROM t -- what about ?\nWHERE b = $1"
        );
    }

    #[test]
    fn placeholders_in_block_comments_are_preserved() {
        let sql = "SELECT a FROM t /* ? nested /* ? */ still a comment */ WHERE b = ?";
        assert_eq!(
            rewrite(sql, ParamStyle::Qmark).unwrap(),
            "SELECT a FROM t /* ? nested /* ? */ still a comment */ WHERE b = $1"
        );
    }

    #[test]
    fn rewrite_is_idempotent_on_native_output() {
        let sql = "SELECT * FROM t WHERE a = ? AND b = ?";
        let once = rewrite(sql, ParamStyle::Qmark).unwrap().into_owned();
        let twice = rewrite(&once, ParamStyle::Native).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unsupported_paramstyle_mismatch_is_caller_error() {
        // qmark placeholders left in a named-style rewrite are simply not touched.
        let sql = "SELECT * FROM t WHERE a = ?";
        assert_eq!(rewrite(sql, ParamStyle::Named).unwrap(), sql);
    }
}
