//! Security utilities for SQL injection prevention
//!
//! This module provides functions for:
//! - Validating identifier names (tables, columns, aliases)
//! - Validating raw WHERE fragments against a model's field whitelist

use crate::error::ModelError;

/// Statement keywords that may never appear in an identifier position
static RESERVED_IDENTIFIERS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "UNION",
    "DROP", "CREATE", "ALTER", "GRANT", "REVOKE", "TRUNCATE", "EXEC", "EXECUTE",
];

/// Keywords that change what a statement does. A raw fragment containing
/// any of them is rejected outright.
static FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "INSERT", "UPDATE", "GRANT",
    "REVOKE", "ALTER", "CREATE", "REPLACE", "UNION", "ATTACH", "EXEC", "EXECUTE",
];

/// Operator words accepted anywhere in a raw fragment
static OPERATOR_KEYWORDS: &[&str] = &[
    "AND", "OR", "NOT", "NULL", "IS", "IN", "LIKE", "BETWEEN", "TRUE", "FALSE",
    "CASE", "WHEN", "THEN", "ELSE", "END", "COLLATE",
];

/// Niladic values; reserved words, so never column names
static VALUE_KEYWORDS: &[&str] = &["CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME"];

/// Accepted only directly after COLLATE
static COLLATIONS: &[&str] = &["NOCASE", "BINARY", "RTRIM"];

/// Accepted only inside an `INTERVAL <n> <unit>` expression
static INTERVAL_UNITS: &[&str] = &["SECOND", "MINUTE", "HOUR", "DAY", "WEEK", "MONTH", "YEAR"];

/// Scalar functions a raw fragment may call
static SAFE_FUNCTIONS: &[&str] = &[
    "LOWER", "UPPER", "LENGTH", "CHAR_LENGTH", "TRIM", "LTRIM", "RTRIM",
    "SUBSTR", "SUBSTRING", "COALESCE", "IFNULL", "NULLIF", "ABS", "ROUND",
    "FLOOR", "CEIL", "DATE", "TIME", "DATETIME", "YEAR", "MONTH", "DAY",
    "NOW", "STRFTIME", "JSON_EXTRACT", "JSON_LENGTH", "CAST",
];

/// Validate that an identifier is safe for use in SQL
///
/// Accepts plain names and `table.column` references. Each segment must
/// start with a letter or underscore and contain only ASCII alphanumerics
/// and underscores.
pub fn validate_identifier(identifier: &str) -> Result<(), ModelError> {
    if identifier.is_empty() {
        return Err(ModelError::Validation("Identifier cannot be empty".to_string()));
    }

    if identifier.len() > 64 {
        return Err(ModelError::Validation(format!(
            "Identifier '{}' is too long (max 64 characters)",
            identifier
        )));
    }

    for segment in identifier.split('.') {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            Some(c) => {
                return Err(ModelError::Validation(format!(
                    "Identifier '{}' cannot start with '{}'",
                    identifier, c
                )))
            }
            None => {
                return Err(ModelError::Validation(format!(
                    "Identifier '{}' has an empty segment",
                    identifier
                )))
            }
        }

        if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
            return Err(ModelError::Validation(format!(
                "Identifier '{}' contains invalid character '{}'",
                identifier, c
            )));
        }

        if RESERVED_IDENTIFIERS.contains(&segment.to_uppercase().as_str()) {
            return Err(ModelError::Validation(format!(
                "Identifier '{}' is a reserved SQL keyword",
                identifier
            )));
        }
    }

    Ok(())
}

/// Validate a raw WHERE fragment before it is stored on a builder.
///
/// Every bare identifier must be the primary key or a whitelisted field.
/// Statement-altering keywords, comments and statement separators are
/// rejected, and the number of `?` placeholders must match `param_count`.
/// Single-quoted string literals and numeric literals are skipped.
pub fn validate_raw_fragment(
    sql: &str,
    param_count: usize,
    allowed_fields: &[String],
    primary_key: &str,
) -> Result<(), ModelError> {
    if sql.trim().is_empty() {
        return Err(ModelError::Validation("Raw fragment cannot be empty".to_string()));
    }

    let chars: Vec<char> = sql.chars().collect();
    let mut placeholders = 0usize;
    let mut i = 0usize;
    let mut context = WordContext::default();

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
        } else if c == '\'' {
            i = skip_string_literal(&chars, i, sql)?;
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
        } else if c == '?' {
            placeholders += 1;
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let next = chars[i..].iter().find(|c| !c.is_whitespace()).copied();
            check_word(&word, next, &mut context, allowed_fields, primary_key)?;
        } else if c == ';' {
            return Err(ModelError::Validation(
                "Raw fragment cannot contain statement separators".to_string(),
            ));
        } else if (c == '-' && chars.get(i + 1) == Some(&'-')) || (c == '/' && chars.get(i + 1) == Some(&'*')) {
            return Err(ModelError::Validation("Raw fragment cannot contain comments".to_string()));
        } else if "=<>!(),+-*/%".contains(c) {
            i += 1;
        } else {
            return Err(ModelError::Validation(format!(
                "Raw fragment contains disallowed character '{}'",
                c
            )));
        }
    }

    if placeholders != param_count {
        return Err(ModelError::Validation(format!(
            "Raw fragment has {} placeholder(s) but {} parameter(s) were supplied",
            placeholders, param_count
        )));
    }

    Ok(())
}

fn skip_string_literal(chars: &[char], start: usize, sql: &str) -> Result<usize, ModelError> {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '\'' {
            // '' is an escaped quote inside the literal
            if chars.get(i + 1) == Some(&'\'') {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        if chars[i] == '\\' {
            return Err(ModelError::Validation(format!(
                "Backslash escapes are not allowed in raw fragment '{}'",
                sql
            )));
        }
        i += 1;
    }
    Err(ModelError::Validation(format!("Unterminated string literal in raw fragment '{}'", sql)))
}

/// What the previous words allow the next one to be
#[derive(Debug, Default)]
struct WordContext {
    after_collate: bool,
    in_interval: bool,
}

fn check_word(
    word: &str,
    next: Option<char>,
    context: &mut WordContext,
    allowed_fields: &[String],
    primary_key: &str,
) -> Result<(), ModelError> {
    let upper = word.to_uppercase();
    let after_collate = std::mem::take(&mut context.after_collate);

    if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
        return Err(ModelError::Validation(format!(
            "Raw fragment contains forbidden keyword '{}'",
            word
        )));
    }

    if next == Some('(') {
        if SAFE_FUNCTIONS.contains(&upper.as_str()) {
            return Ok(());
        }
        return Err(ModelError::Validation(format!(
            "Raw fragment calls function '{}' which is not allowed",
            word
        )));
    }

    let column = word.rsplit('.').next().unwrap_or(word);
    if column == primary_key || allowed_fields.iter().any(|f| f == column) {
        return validate_identifier(word);
    }

    if OPERATOR_KEYWORDS.contains(&upper.as_str()) {
        context.after_collate = upper == "COLLATE";
        return Ok(());
    }
    if VALUE_KEYWORDS.contains(&upper.as_str()) {
        return Ok(());
    }
    if after_collate && COLLATIONS.contains(&upper.as_str()) {
        return Ok(());
    }
    let literal_follows = matches!(next, Some(c) if c.is_ascii_digit() || c == '?' || c == '\'');
    if upper == "ESCAPE" && literal_follows {
        return Ok(());
    }
    if upper == "INTERVAL" && literal_follows {
        context.in_interval = true;
        return Ok(());
    }
    if context.in_interval && INTERVAL_UNITS.contains(&upper.as_str()) {
        context.in_interval = false;
        return Ok(());
    }

    validate_identifier(word)?;
    Err(ModelError::Validation(format!(
        "Raw fragment references field '{}' which is not in the allowed fields",
        word
    )))
}
