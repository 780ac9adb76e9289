//! SQL identifier quoting utilities
//!
//! Provides safe quoting for SQL identifiers and literals so that migration
//! steps loaded from plan files can be turned into dynamic SQL without
//! injection.

/// Quote a SQL identifier to prevent injection.
///
/// Wraps the identifier in double quotes and escapes any embedded double quotes
/// by doubling them, following the SQL standard.
///
/// # Examples
/// ```
/// use ob_core::sql_utils::quote_ident;
/// assert_eq!(quote_ident("players"), r#""players""#);
/// assert_eq!(quote_ident(r#"my"table"#), r#""my""table""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Escape a SQL string literal value by doubling single quotes.
///
/// This is for use inside single-quoted SQL string literals, not identifiers.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render a complete single-quoted SQL string literal.
///
/// # Examples
/// ```
/// use ob_core::sql_utils::quote_literal;
/// assert_eq!(quote_literal("Unknown"), "'Unknown'");
/// assert_eq!(quote_literal("O'Neil"), "'O''Neil'");
/// ```
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape_sql_string(value))
}

/// Join identifiers into a quoted, comma-separated column list.
pub fn quote_ident_list<S: AsRef<str>>(idents: &[S]) -> String {
    idents
        .iter()
        .map(|i| quote_ident(i.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}
