//! SQL statement classifier.
//!
//! Decides whether a raw SQL string goes through the ClickHouse *command*
//! path (side effects, no tabular result) or the *query* path (rows plus
//! column metadata).
//!
//! Comment lines are removed first, so a commented-out `CREATE` above a
//! `SELECT` stays read-only. Each remaining statement is checked against an
//! ordered rule table; when in doubt the command path wins.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use utoipa::ToSchema;

/// Execution path selected for a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPath {
    /// Side-effecting statement, executed without reading a result set.
    Command,
    /// Read-only statement returning rows.
    Query,
}

/// Outcome of classifying a SQL string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Path the statement should take.
    pub path: ExecutionPath,
    /// Label of the first rule that matched, if any.
    pub label: Option<&'static str>,
}

impl Classification {
    /// Whether the statement mutates schema, data or privileges.
    pub fn is_mutating(&self) -> bool {
        self.path == ExecutionPath::Command
    }
}

/// Ordered `(pattern, label)` rules, matched against a lowercased statement
/// with leading comments removed. More specific rules come first.
const RULES: &[(&str, &str)] = &[
    (
        r"^create\s+(?:or\s+replace\s+)?(?:user|role|quota|row\s+policy|settings\s+profile)\b",
        "create_access_entity",
    ),
    (r"^create\b", "create"),
    (r"^insert\b", "insert"),
    (r"^alter\b", "alter"),
    (r"^drop\b", "drop"),
    (r"^truncate\b", "truncate"),
    (r"^replace\b", "replace"),
    (r"^rename\b", "rename"),
    (r"^exchange\b", "exchange"),
    (r"^attach\b", "attach"),
    (r"^detach\b", "detach"),
    (r"^undrop\b", "undrop"),
    (r"^restore\b", "restore"),
    (r"^backup\b", "backup"),
    (r"^optimize\b", "optimize"),
    (r"^delete\s+from\b", "delete"),
    (r"^update\b", "update"),
    (r"^grant\b", "grant"),
    (r"^revoke\b", "revoke"),
    (r"^set\s+allow_\w+", "set_allow"),
    (r"^set\s+(?:default\s+)?role\b", "set_role"),
    (r"^system\b", "system"),
    (r"^kill\b", "kill"),
];

static PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|(pattern, label)| match Regex::new(pattern) {
            Ok(re) => Some((re, *label)),
            Err(e) => {
                tracing::error!(pattern, error = %e, "invalid classifier pattern");
                None
            }
        })
        .collect()
});

/// Comment markers recognised at the start of a line.
const LINE_COMMENT_MARKERS: [&str; 2] = ["--", "#"];

/// Classifies SQL statements by execution path.
pub struct SqlClassifier;

impl SqlClassifier {
    /// Classifies a raw SQL string. Never fails; unknown input is a query.
    pub fn classify(sql: &str) -> Classification {
        let cleaned = Self::strip_comment_lines(sql).to_lowercase();

        for statement in Self::split_statements(&cleaned) {
            let statement = skip_leading_comments(statement);
            if statement.is_empty() {
                continue;
            }
            if let Some((_, label)) = PATTERNS.iter().find(|(re, _)| re.is_match(statement)) {
                return Classification {
                    path: ExecutionPath::Command,
                    label: Some(label),
                };
            }
        }

        Classification {
            path: ExecutionPath::Query,
            label: None,
        }
    }

    /// Returns `true` when the SQL must go through the command path.
    pub fn is_create_or_insert(sql: &str) -> bool {
        Self::classify(sql).is_mutating()
    }

    /// Removes lines whose trimmed content starts with a comment marker.
    pub fn strip_comment_lines(sql: &str) -> String {
        sql.lines()
            .filter(|line| {
                let trimmed = line.trim_start();
                !LINE_COMMENT_MARKERS.iter().any(|m| trimmed.starts_with(m))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Splits on `;` outside of quoted strings, identifiers and comments.
    /// Returned statements are trimmed; empty ones are dropped.
    pub fn split_statements(sql: &str) -> Vec<&str> {
        let mut statements = Vec::new();
        let mut state = Scan::Code;
        let mut escaped = false;
        let mut start = 0;
        let mut chars = sql.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            match state {
                Scan::Quote(q) => {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == q {
                        state = Scan::Code;
                    }
                }
                Scan::LineComment => {
                    if c == '\n' {
                        state = Scan::Code;
                    }
                }
                Scan::BlockComment => {
                    if c == '*' && chars.next_if(|&(_, n)| n == '/').is_some() {
                        state = Scan::Code;
                    }
                }
                Scan::Code => match c {
                    '\'' | '"' | '`' => state = Scan::Quote(c),
                    '#' => state = Scan::LineComment,
                    '-' if chars.next_if(|&(_, n)| n == '-').is_some() => state = Scan::LineComment,
                    '/' if chars.next_if(|&(_, n)| n == '*').is_some() => state = Scan::BlockComment,
                    ';' => {
                        statements.push(sql[start..i].trim());
                        start = i + 1;
                    }
                    _ => {}
                },
            }
        }
        statements.push(sql[start..].trim());
        statements.retain(|s| !s.is_empty());
        statements
    }
}

#[derive(Clone, Copy)]
enum Scan {
    Code,
    Quote(char),
    LineComment,
    BlockComment,
}

/// Shorthand for [`SqlClassifier::is_create_or_insert`].
pub fn is_create_or_insert(sql: &str) -> bool {
    SqlClassifier::is_create_or_insert(sql)
}

/// Skips any mix of `/* */` and `--`/`#` comments before the first keyword.
fn skip_leading_comments(mut statement: &str) -> &str {
    loop {
        statement = statement.trim_start();
        if let Some(rest) = statement.strip_prefix("/*") {
            match rest.find("*/") {
                Some(end) => statement = &rest[end + 2..],
                // Unterminated comment: nothing executable follows.
                None => return "",
            }
        } else if LINE_COMMENT_MARKERS.iter().any(|m| statement.starts_with(m)) {
            match statement.find('\n') {
                Some(end) => statement = &statement[end + 1..],
                None => return "",
            }
        } else {
            return statement;
        }
    }
}
