use crate::backend::statement::{contains_ci, find_ci};

/// Clause keywords that introduce a table/measurement identifier, in match
/// priority order. Matching is a plain case-insensitive substring check,
/// not anchored to the line start; a keyword inside a string literal or
/// comment is still honored (known limitation of this lightweight tool).
const CLAUSE_KEYWORDS: [&str; 6] = [
    "FROM",
    "INSERT INTO",
    "UPDATE",
    "DELETE FROM",
    "DROP TABLE",
    "CREATE TABLE",
];

/// Retargets a statement at a different table/measurement without parsing
/// it. Works line by line; each line rewrites at most the identifier that
/// follows its first matching clause keyword, and the replacement is
/// always emitted double-quoted.
pub fn rewrite_table_name(text: &str, new_name: &str) -> String {
    if text.is_empty() || new_name.is_empty() {
        return text.to_string();
    }
    text.split('\n')
        .map(|line| rewrite_line(line, new_name))
        .collect::<Vec<_>>()
        .join("\n")
}

fn rewrite_line(line: &str, new_name: &str) -> String {
    for keyword in CLAUSE_KEYWORDS {
        let Some(pos) = find_ci(line, keyword) else {
            continue;
        };
        let after = pos + keyword.len();
        if let Some((start, end)) = identifier_span(&line[after..]) {
            let mut rewritten = String::with_capacity(line.len() + new_name.len() + 2);
            rewritten.push_str(&line[..after + start]);
            rewritten.push('"');
            rewritten.push_str(new_name);
            rewritten.push('"');
            rewritten.push_str(&line[after + end..]);
            return rewritten;
        }
        // The clause governs the line even when nothing rewritable follows.
        return line.to_string();
    }
    line.to_string()
}

/// Byte span of the identifier at the start of `text`: optional leading
/// whitespace, then a double-quoted string, a single-quoted string, or a
/// bare `[A-Za-z_][A-Za-z0-9_]*` identifier. Quotes are part of the span.
fn identifier_span(text: &str) -> Option<(usize, usize)> {
    let start = text.len() - text.trim_start().len();
    let rest = &text[start..];
    let first = rest.chars().next()?;

    if first == '"' || first == '\'' {
        let close = rest[1..].find(first)?;
        return Some((start, start + close + 2));
    }

    if first.is_ascii_alphabetic() || first == '_' {
        let mut end = rest.len();
        for (idx, ch) in rest.char_indices() {
            if idx == 0 {
                continue;
            }
            if !(ch.is_ascii_alphanumeric() || ch == '_') {
                end = idx;
                break;
            }
        }
        return Some((start, start + end));
    }

    None
}

/// Strips the surrounding quotes off an identifier span, if any.
fn unquote(identifier: &str) -> &str {
    let bytes = identifier.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &identifier[1..identifier.len() - 1];
        }
    }
    identifier
}

/// Whether any clause keyword occurs in the text. Purely syntactic.
pub fn has_any_table_name(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    CLAUSE_KEYWORDS
        .iter()
        .any(|keyword| contains_ci(text, keyword))
}

/// Whether `name` appears as the target of any clause keyword, in quoted
/// or bare form.
pub fn contains_identifier(text: &str, name: &str) -> bool {
    if text.is_empty() || name.is_empty() {
        return false;
    }
    CLAUSE_KEYWORDS.iter().any(|keyword| {
        contains_ci(text, &format!("{keyword} \"{name}\""))
            || contains_ci(text, &format!("{keyword} '{name}'"))
            || contains_ci(text, &format!("{keyword} {name}"))
    })
}

/// The identifier targeted by the first line carrying a clause keyword,
/// unquoted. `None` when no line matches or the matching clause has no
/// identifier after it.
pub fn first_identifier(text: &str) -> Option<String> {
    for line in text.split('\n') {
        for keyword in CLAUSE_KEYWORDS {
            let Some(pos) = find_ci(line, keyword) else {
                continue;
            };
            let after = &line[pos + keyword.len()..];
            return identifier_span(after)
                .map(|(start, end)| unquote(&after[start..end]).to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_from_clause_target() {
        assert_eq!(
            rewrite_table_name("SELECT * FROM measurement LIMIT 10", "cpu_usage"),
            "SELECT * FROM \"cpu_usage\" LIMIT 10"
        );
    }

    #[test]
    fn rewrites_quoted_targets() {
        assert_eq!(
            rewrite_table_name("SELECT * FROM \"disk_io\" WHERE host = 'a'", "cpu"),
            "SELECT * FROM \"cpu\" WHERE host = 'a'"
        );
        assert_eq!(
            rewrite_table_name("DELETE FROM 'old_data'", "cpu"),
            "DELETE FROM \"cpu\""
        );
    }

    #[test]
    fn rewrites_each_clause_kind() {
        assert_eq!(
            rewrite_table_name("INSERT INTO metrics,host=a value=1", "cpu"),
            "INSERT INTO \"cpu\",host=a value=1"
        );
        assert_eq!(
            rewrite_table_name("UPDATE metrics SET value = 2", "cpu"),
            "UPDATE \"cpu\" SET value = 2"
        );
        assert_eq!(
            rewrite_table_name("DROP TABLE metrics", "cpu"),
            "DROP TABLE \"cpu\""
        );
        assert_eq!(
            rewrite_table_name("CREATE TABLE metrics (v INT)", "cpu"),
            "CREATE TABLE \"cpu\" (v INT)"
        );
    }

    #[test]
    fn only_the_first_clause_on_a_line_is_rewritten() {
        assert_eq!(
            rewrite_table_name("SELECT * FROM a WHERE x IN (SELECT y FROM b)", "cpu"),
            "SELECT * FROM \"cpu\" WHERE x IN (SELECT y FROM b)"
        );
    }

    #[test]
    fn lines_without_a_clause_pass_through() {
        let text = "-- comment line\nSELECT * FROM cpu\nLIMIT 10";
        assert_eq!(
            rewrite_table_name(text, "mem"),
            "-- comment line\nSELECT * FROM \"mem\"\nLIMIT 10"
        );
    }

    #[test]
    fn keywords_inside_literals_are_still_honored() {
        // No literal awareness: the quoted FROM is treated as a clause.
        assert_eq!(
            rewrite_table_name("SELECT 'from x' AS label", "cpu"),
            "SELECT 'from \"cpu\"' AS label"
        );
    }

    #[test]
    fn rewrite_is_idempotent() {
        for sql in [
            "SELECT * FROM measurement LIMIT 10",
            "INSERT INTO metrics,host=a value=1",
            "UPDATE metrics SET value = 2\nDELETE FROM metrics",
        ] {
            let once = rewrite_table_name(sql, "x");
            let twice = rewrite_table_name(&once, "x");
            assert_eq!(once, twice, "not idempotent for: {sql}");
        }
    }

    #[test]
    fn first_identifier_round_trips_through_rewrite() {
        for sql in [
            "SELECT * FROM measurement LIMIT 10",
            "DROP TABLE \"disk_io\"",
            "no clause here\nUPDATE metrics SET v = 1",
        ] {
            assert!(has_any_table_name(sql));
            let rewritten = rewrite_table_name(sql, "newname");
            assert_eq!(first_identifier(&rewritten).as_deref(), Some("newname"));
        }
    }

    #[test]
    fn first_identifier_unquotes() {
        assert_eq!(
            first_identifier("SELECT * FROM \"cpu\"").as_deref(),
            Some("cpu")
        );
        assert_eq!(first_identifier("SELECT 1 + 1"), None);
    }

    #[test]
    fn has_any_table_name_is_syntactic() {
        assert!(has_any_table_name("select * from cpu"));
        assert!(has_any_table_name("drop table x"));
        assert!(!has_any_table_name("SHOW DATABASES"));
        assert!(!has_any_table_name(""));
    }

    #[test]
    fn contains_identifier_matches_quoted_and_bare_forms() {
        assert!(contains_identifier("SELECT * FROM \"cpu\" LIMIT 1", "cpu"));
        assert!(contains_identifier("SELECT * FROM 'cpu'", "cpu"));
        assert!(contains_identifier("delete from cpu", "cpu"));
        assert!(contains_identifier("INSERT INTO cpu,host=a value=1", "cpu"));
        assert!(!contains_identifier("SELECT * FROM memory", "cpu"));
        assert!(!contains_identifier("", "cpu"));
    }
}
