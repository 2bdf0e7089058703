use crate::backend::models::{DialectVersion, ValidationVerdict};

/// Statement kind, decided by the first whitespace-delimited token.
/// Shared by the validator and the identifier rewriter so keyword matching
/// lives in exactly one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Show,
    Create,
    Delete,
    Other,
}

pub fn classify(text: &str) -> StatementKind {
    let first = match text.split_whitespace().next() {
        Some(token) => token,
        None => return StatementKind::Other,
    };
    if first.eq_ignore_ascii_case("SELECT") {
        StatementKind::Select
    } else if first.eq_ignore_ascii_case("INSERT") {
        StatementKind::Insert
    } else if first.eq_ignore_ascii_case("SHOW") {
        StatementKind::Show
    } else if first.eq_ignore_ascii_case("CREATE") {
        StatementKind::Create
    } else if first.eq_ignore_ascii_case("DELETE") {
        StatementKind::Delete
    } else {
        StatementKind::Other
    }
}

/// Byte offset of the first case-insensitive occurrence of `needle`.
/// ASCII-only folding, which is all the clause keywords need.
pub fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_uppercase()
        .find(&needle.to_ascii_uppercase())
}

pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    find_ci(haystack, needle).is_some()
}

fn has_keyword_token(text: &str, keyword: &str) -> bool {
    text.split_whitespace()
        .any(|token| token.eq_ignore_ascii_case(keyword))
}

const INSERT_FORM: &str =
    "INSERT [INTO] [database_name] measurement,tag_key=tag_value field_key=\"field_value\"";

/// Validates a statement for the given dialect before it goes over the
/// wire. Only v1.x is implemented; other dialects short-circuit.
pub fn validate(text: &str, version: DialectVersion) -> ValidationVerdict {
    if version != DialectVersion::V1 {
        return ValidationVerdict::invalid(
            "Only InfluxDB v1.x queries are supported; v2.x and v3.x support is under development",
        );
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ValidationVerdict::invalid("Query cannot be empty");
    }

    match classify(trimmed) {
        StatementKind::Select => validate_select(trimmed),
        StatementKind::Insert => validate_insert(trimmed),
        StatementKind::Show => validate_show(trimmed),
        StatementKind::Create => validate_create(trimmed),
        StatementKind::Delete => validate_delete(trimmed),
        StatementKind::Other => ValidationVerdict::valid(),
    }
}

fn validate_select(query: &str) -> ValidationVerdict {
    if has_keyword_token(query, "FROM") {
        return ValidationVerdict::valid();
    }
    ValidationVerdict::invalid("SELECT statement is missing a FROM clause")
        .with_suggestion("Add a FROM clause, e.g. SELECT * FROM measurement")
        .with_corrected_text(format!("{query} FROM \"measurement\""))
}

fn validate_delete(query: &str) -> ValidationVerdict {
    if has_keyword_token(query, "FROM") {
        return ValidationVerdict::valid();
    }
    ValidationVerdict::invalid("DELETE statement is missing a FROM clause")
        .with_suggestion("Add a FROM clause, e.g. DELETE FROM measurement")
}

const SHOW_FORMS: [&str; 5] = [
    "SHOW DATABASES",
    "SHOW MEASUREMENTS",
    "SHOW RETENTION POLICIES",
    "SHOW TAG KEYS",
    "SHOW FIELD KEYS",
];

fn validate_show(query: &str) -> ValidationVerdict {
    if SHOW_FORMS.iter().any(|form| contains_ci(query, form)) {
        return ValidationVerdict::valid();
    }
    ValidationVerdict::invalid("Unsupported SHOW statement")
        .with_suggestion(format!("Supported SHOW statements: {}", SHOW_FORMS.join(", ")))
}

fn validate_create(query: &str) -> ValidationVerdict {
    if contains_ci(query, "CREATE DATABASE") {
        return ValidationVerdict::valid();
    }
    ValidationVerdict::invalid("Unsupported CREATE statement")
        .with_suggestion("Only CREATE DATABASE is supported")
}

/// INSERT accepts four statement shapes, in priority order:
/// `INSERT INTO "<db>" ...`, `INSERT INTO <db> ...`, `INSERT "<db>" ...`,
/// `INSERT <db> ...` (INTO and the quotes are both optional).
fn validate_insert(query: &str) -> ValidationVerdict {
    let rest = skip_leading_token(query);
    let rest = skip_keyword(rest, "INTO");

    let rest = match take_name_token(rest) {
        Some((_database, rest)) => rest,
        None => {
            return ValidationVerdict::invalid("INSERT statement is malformed")
                .with_suggestion(format!("Use the form: {INSERT_FORM}"));
        }
    };

    if take_measurement_token(rest).is_none() {
        return ValidationVerdict::invalid("INSERT statement is missing a measurement name")
            .with_suggestion(format!("Name the measurement: {INSERT_FORM}"));
    }

    if !query.contains('=') {
        return ValidationVerdict::invalid("INSERT statement is missing field values")
            .with_suggestion(
                "Add field values, e.g. measurement,tag_key=tag_value field_key=\"field_value\"",
            );
    }

    if query.split_whitespace().count() < 3 {
        return ValidationVerdict::invalid("INSERT statement is incomplete")
            .with_suggestion(format!("Provide measurement, tags and fields: {INSERT_FORM}"));
    }

    ValidationVerdict::valid()
}

fn skip_leading_token(text: &str) -> &str {
    let trimmed = text.trim_start();
    match trimmed.find(char::is_whitespace) {
        Some(end) => &trimmed[end..],
        None => "",
    }
}

fn skip_keyword<'a>(text: &'a str, keyword: &str) -> &'a str {
    let trimmed = text.trim_start();
    match trimmed.split_whitespace().next() {
        Some(token) if token.eq_ignore_ascii_case(keyword) => &trimmed[token.len()..],
        _ => text,
    }
}

/// A database name token: double-quoted, or bare up to the next
/// whitespace. Returns the name and the remainder after it.
fn take_name_token(text: &str) -> Option<(&str, &str)> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(inner) = trimmed.strip_prefix('"') {
        let end = inner.find('"')?;
        let name = &inner[..end];
        if name.is_empty() {
            return None;
        }
        return Some((name, &inner[end + 1..]));
    }
    let end = trimmed
        .find(char::is_whitespace)
        .unwrap_or(trimmed.len());
    Some((&trimmed[..end], &trimmed[end..]))
}

/// The measurement chunk after the database token: optionally separated by
/// a comma, running until the next comma or whitespace.
fn take_measurement_token(text: &str) -> Option<&str> {
    let mut rest = text.trim_start();
    if let Some(after_comma) = rest.strip_prefix(',') {
        rest = after_comma.trim_start();
    }
    let end = rest
        .find(|ch: char| ch == ',' || ch.is_whitespace())
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

/// Illustrative statements for the query editor.
pub fn query_examples(version: DialectVersion) -> Vec<String> {
    match version {
        DialectVersion::V1 => vec![
            "SELECT * FROM \"measurement\" LIMIT 10".to_string(),
            "INSERT INTO \"testdb\" cpu,host=server01 value=0.64".to_string(),
            "INSERT INTO \"testdb\" memory,host=server01,region=us-west value=0.32".to_string(),
            "SHOW DATABASES".to_string(),
            "SHOW MEASUREMENTS".to_string(),
            "CREATE DATABASE \"new_database\"".to_string(),
        ],
        DialectVersion::V2 | DialectVersion::V3 => vec![
            "Query examples are only available for InfluxDB v1.x connections".to_string(),
            "v2.x and v3.x support is under development".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate_v1(text: &str) -> ValidationVerdict {
        validate(text, DialectVersion::V1)
    }

    #[test]
    fn classifies_by_leading_keyword() {
        assert_eq!(classify("select * from cpu"), StatementKind::Select);
        assert_eq!(classify("  INSERT cpu value=1"), StatementKind::Insert);
        assert_eq!(classify("Show databases"), StatementKind::Show);
        assert_eq!(classify("CREATE DATABASE x"), StatementKind::Create);
        assert_eq!(classify("delete from cpu"), StatementKind::Delete);
        assert_eq!(classify("GRANT ALL ON db TO user"), StatementKind::Other);
        assert_eq!(classify("   "), StatementKind::Other);
    }

    #[test]
    fn accepts_select_with_from() {
        assert!(validate_v1("SELECT * FROM \"cpu\" LIMIT 10").is_valid);
    }

    #[test]
    fn rejects_select_without_from() {
        let verdict = validate_v1("SELECT *");
        assert!(!verdict.is_valid);
        assert!(verdict.error.unwrap().contains("FROM"));
        // The corrected form must itself pass validation.
        let corrected = verdict.corrected_text.unwrap();
        assert!(validate_v1(&corrected).is_valid);
    }

    #[test]
    fn rejects_non_v1_dialects() {
        let verdict = validate("SELECT * FROM cpu", DialectVersion::V2);
        assert!(!verdict.is_valid);
        let verdict = validate("SELECT * FROM cpu", DialectVersion::V3);
        assert!(!verdict.is_valid);
    }

    #[test]
    fn rejects_empty_statement() {
        let verdict = validate_v1("   \n ");
        assert!(!verdict.is_valid);
        assert_eq!(verdict.error.unwrap(), "Query cannot be empty");
    }

    #[test]
    fn accepts_all_insert_variants() {
        for statement in [
            "INSERT INTO \"db\" m,tag=v f=1",
            "INSERT INTO db m,tag=v f=1",
            "INSERT \"db\" m,tag=v f=1",
            "INSERT db m,tag=v f=1",
        ] {
            let verdict = validate_v1(statement);
            assert!(verdict.is_valid, "expected valid: {statement}");
        }
    }

    #[test]
    fn rejects_insert_without_measurement() {
        let verdict = validate_v1("INSERT INTO \"db\"");
        assert!(!verdict.is_valid);
        assert!(verdict.error.unwrap().contains("measurement"));
    }

    #[test]
    fn rejects_insert_without_field_values() {
        let verdict = validate_v1("INSERT INTO \"db\" cpu extra");
        assert!(!verdict.is_valid);
        assert!(verdict.error.unwrap().contains("field values"));
    }

    #[test]
    fn rejects_bare_insert() {
        let verdict = validate_v1("INSERT");
        assert!(!verdict.is_valid);
        assert_eq!(verdict.error.unwrap(), "INSERT statement is malformed");
    }

    #[test]
    fn show_allow_list() {
        assert!(validate_v1("SHOW DATABASES").is_valid);
        assert!(validate_v1("show retention policies on mydb").is_valid);
        assert!(validate_v1("SHOW TAG KEYS FROM \"cpu\"").is_valid);
        let verdict = validate_v1("SHOW USERS");
        assert!(!verdict.is_valid);
        assert!(verdict.suggestion.unwrap().contains("SHOW FIELD KEYS"));
    }

    #[test]
    fn create_supports_only_create_database() {
        assert!(validate_v1("CREATE DATABASE \"metrics\"").is_valid);
        assert!(!validate_v1("CREATE USER admin").is_valid);
    }

    #[test]
    fn delete_requires_from() {
        assert!(validate_v1("DELETE FROM cpu WHERE time < now()").is_valid);
        assert!(!validate_v1("DELETE cpu").is_valid);
    }

    #[test]
    fn unknown_statements_pass_through() {
        assert!(validate_v1("GRANT ALL ON db TO user").is_valid);
    }

    #[test]
    fn examples_per_dialect() {
        let v1 = query_examples(DialectVersion::V1);
        assert!(v1.iter().any(|e| e.starts_with("SELECT")));
        for example in &v1 {
            assert!(validate_v1(example).is_valid, "example must validate: {example}");
        }
        let v2 = query_examples(DialectVersion::V2);
        assert!(v2[0].contains("v1.x"));
    }
}
