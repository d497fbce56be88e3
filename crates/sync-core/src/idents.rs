//! Identifier sanitization for destination-side SQL.
//!
//! Document field and collection names are arbitrary UTF-8; PostgreSQL
//! identifiers are not. Every name that reaches emitted SQL goes through
//! [`sanitize_identifier`] and is then unconditionally quoted with
//! [`quote_ident`], so no reserved-word table is needed.

/// Maximum identifier length accepted by PostgreSQL.
pub const PG_MAX_IDENTIFIER_LEN: usize = 63;

/// Sanitize an arbitrary name into a valid PostgreSQL identifier.
///
/// Lowercases the input, replaces every character outside `[a-z0-9_]` with
/// an underscore, prefixes an underscore when the result would start with a
/// digit, and truncates to [`PG_MAX_IDENTIFIER_LEN`]. Total and
/// deterministic: every input maps to exactly one valid identifier.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    if out.as_bytes()[0].is_ascii_digit() {
        out.insert(0, '_');
    }
    out.truncate(PG_MAX_IDENTIFIER_LEN);
    out
}

/// Quote an identifier for use in emitted SQL.
///
/// Applied unconditionally to every generated identifier, independent of
/// collision with reserved words.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build the physical destination table name for a collection.
///
/// The name is the sanitized collection name suffixed with the numeric data
/// source id, so two sources importing same-named collections never collide.
/// The combined identifier always fits [`PG_MAX_IDENTIFIER_LEN`].
pub fn physical_table_name(collection: &str, data_source_id: i64) -> String {
    let suffix = format!("_{data_source_id}");
    let mut base = sanitize_identifier(collection);
    base.truncate(PG_MAX_IDENTIFIER_LEN - suffix.len());
    format!("{base}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_lowercases_and_replaces() {
        assert_eq!(sanitize_identifier("User Name"), "user_name");
        assert_eq!(sanitize_identifier("order-total($)"), "order_total___");
        assert_eq!(sanitize_identifier("Café"), "caf_");
    }

    #[test]
    fn test_sanitize_digit_prefix() {
        assert_eq!(sanitize_identifier("2fa_enabled"), "_2fa_enabled");
    }

    #[test]
    fn test_sanitize_is_total() {
        for input in ["", "!!!", "日本語", "\"quoted\"", "a.b.c"] {
            let out = sanitize_identifier(input);
            assert!(!out.is_empty());
            assert!(out.len() <= PG_MAX_IDENTIFIER_LEN);
            assert!(out
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
            assert!(!out.as_bytes()[0].is_ascii_digit());
        }
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_identifier(&long).len(), PG_MAX_IDENTIFIER_LEN);
    }

    #[test]
    fn test_sanitize_is_deterministic() {
        assert_eq!(sanitize_identifier("Some Field"), sanitize_identifier("Some Field"));
    }

    #[test]
    fn test_quote_ident_doubles_embedded_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_physical_table_name_appends_source_id() {
        assert_eq!(physical_table_name("Orders", 42), "orders_42");
    }

    #[test]
    fn test_physical_table_name_fits_limit() {
        let name = physical_table_name(&"collection".repeat(20), 123456);
        assert!(name.len() <= PG_MAX_IDENTIFIER_LEN);
        assert!(name.ends_with("_123456"));
    }
}
