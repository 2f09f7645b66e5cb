//! Statement safety policy.
//!
//! Every statement must pass all rules in order. The rules run over lexer
//! tokens, so keywords inside string literals or quoted identifiers never
//! trigger them, and the result is cross-checked with a real SQL parser
//! before a statement is admitted. Anything the policy cannot classify is
//! rejected.

use crate::error::{DbError, DbResult};
use crate::models::{CommandKind, DatabaseType};
use crate::sql::lexer::{Token, TokenKind, tokenize};
use crate::sql::splitter::StatementBatch;
use schemars::JsonSchema;
use serde::Serialize;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use std::fmt;
use tracing::warn;

/// Keywords rejected anywhere outside literals and quoted identifiers.
const BLOCKED_KEYWORDS: &[&str] = &[
    "DROP", "ALTER", "CREATE", "TRUNCATE", "EXEC", "EXECUTE", "CALL", "GRANT", "REVOKE",
    "PRAGMA", "ATTACH", "DETACH", "VACUUM", "LOAD_FILE", "OUTFILE", "DUMPFILE", "SHUTDOWN",
];

/// Keywords rejected only where a statement begins. These are also ordinary
/// column names (`lock`, `handler`), so a bare-word match would reject plain
/// queries.
const STATEMENT_KEYWORDS: &[&str] = &[
    "RENAME", "MERGE", "LOCK", "UNLOCK", "KILL", "DECLARE", "HANDLER",
];

/// Words that end a WHERE or HAVING predicate.
const PREDICATE_END_KEYWORDS: &[&str] = &[
    "ORDER", "GROUP", "HAVING", "WINDOW", "LIMIT", "OFFSET", "FETCH", "RETURNING", "FOR",
    "UNION", "EXCEPT", "INTERSECT",
];

/// Functions that stall the server when called.
const DELAY_FUNCTIONS: &[&str] = &[
    "SLEEP",
    "BENCHMARK",
    "PG_SLEEP",
    "PG_SLEEP_FOR",
    "PG_SLEEP_UNTIL",
];

const PREVIEW_CHARS: usize = 80;

/// The rule that rejected a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Lexical,
    CommandWhitelist,
    KeywordBlacklist,
    Comment,
    SystemVariable,
    TimeDelay,
    UnionSelect,
    Tautology,
    Structure,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::CommandWhitelist => "command_whitelist",
            Self::KeywordBlacklist => "keyword_blacklist",
            Self::Comment => "comment",
            Self::SystemVariable => "system_variable",
            Self::TimeDelay => "time_delay",
            Self::UnionSelect => "union_select",
            Self::Tautology => "tautology",
            Self::Structure => "structure",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for a single statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ValidationVerdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
}

impl ValidationVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            rule: None,
        }
    }

    pub fn reject(rule: Rule, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            rule: Some(rule),
        }
    }
}

/// Stateless policy checker for one SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct SafetyValidator {
    dialect: DatabaseType,
}

impl SafetyValidator {
    pub fn new(dialect: DatabaseType) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    /// Check one statement against every rule.
    pub fn validate(&self, statement: &str) -> ValidationVerdict {
        let tokens = match tokenize(statement, self.dialect) {
            Ok(tokens) => tokens,
            Err(e) => return ValidationVerdict::reject(Rule::Lexical, e.to_string()),
        };
        let significant: Vec<&Token<'_>> = tokens.iter().filter(|t| !t.is_whitespace()).collect();

        let command = match leading_command(&significant) {
            Ok(command) => command,
            Err(verdict) => return verdict,
        };

        if let Some(verdict) = check_blacklist(&significant)
            .or_else(|| check_heuristics(&significant))
            .or_else(|| check_injection_patterns(command, &significant, self.dialect))
            .or_else(|| self.check_structure(command, &tokens))
        {
            return verdict;
        }

        ValidationVerdict::allow()
    }

    /// Check every statement of a batch, failing on the first rejection.
    pub fn validate_batch(&self, batch: &StatementBatch) -> DbResult<()> {
        for (index, statement) in batch.iter() {
            let verdict = self.validate(statement);
            if let (false, Some(rule)) = (verdict.allowed, verdict.rule) {
                let reason = verdict.reason.unwrap_or_default();
                warn!(
                    rule = %rule,
                    statement_index = index,
                    statement = %preview(statement),
                    reason = %reason,
                    "Statement rejected"
                );
                return Err(DbError::rejected(index, rule.as_str(), reason));
            }
        }
        Ok(())
    }

    /// Parse the statement with placeholders rewritten to the dialect's
    /// positional form and confirm it is exactly one statement of the kind
    /// its leading keyword claims.
    fn check_structure(&self, command: CommandKind, tokens: &[Token<'_>]) -> Option<ValidationVerdict> {
        let parse_text = placeholder_neutral_text(tokens, self.dialect);
        let dialect = get_dialect(self.dialect);

        let statements = match Parser::parse_sql(dialect.as_ref(), &parse_text) {
            Ok(statements) => statements,
            Err(e) => {
                return Some(ValidationVerdict::reject(
                    Rule::Structure,
                    format!("statement could not be parsed: {}", e),
                ));
            }
        };

        let [statement] = statements.as_slice() else {
            return Some(ValidationVerdict::reject(
                Rule::Structure,
                format!("expected exactly one statement, found {}", statements.len()),
            ));
        };

        let matches = match (command, statement) {
            (CommandKind::Select, Statement::Query(query)) => {
                if query_has_into(query) {
                    return Some(ValidationVerdict::reject(
                        Rule::Structure,
                        "SELECT ... INTO is not allowed",
                    ));
                }
                true
            }
            (CommandKind::Insert, Statement::Insert { .. }) => true,
            (CommandKind::Update, Statement::Update { .. }) => true,
            (CommandKind::Delete, Statement::Delete { .. }) => true,
            _ => false,
        };

        if matches {
            None
        } else {
            Some(ValidationVerdict::reject(
                Rule::Structure,
                format!(
                    "statement does not parse as the {} its leading keyword claims",
                    command.as_str()
                ),
            ))
        }
    }
}

/// Get the sqlparser dialect for a database type.
pub(crate) fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

fn leading_command(significant: &[&Token<'_>]) -> Result<CommandKind, ValidationVerdict> {
    let Some(first) = significant.first() else {
        return Err(ValidationVerdict::reject(
            Rule::CommandWhitelist,
            "empty statement",
        ));
    };

    let command = match first.kind {
        TokenKind::Word => CommandKind::from_keyword(first.text),
        _ => None,
    };

    command.ok_or_else(|| {
        let found = match first.kind {
            TokenKind::Word => first.text.to_ascii_uppercase(),
            kind => kind.describe().to_string(),
        };
        ValidationVerdict::reject(
            Rule::CommandWhitelist,
            format!(
                "statement must begin with SELECT, INSERT, UPDATE or DELETE, found {}",
                found
            ),
        )
    })
}

fn check_blacklist(significant: &[&Token<'_>]) -> Option<ValidationVerdict> {
    significant.iter().enumerate().find_map(|(i, token)| match token.kind {
        TokenKind::Semicolon => Some(ValidationVerdict::reject(
            Rule::KeywordBlacklist,
            "stacked statements are not allowed",
        )),
        TokenKind::Word => {
            let upper = token.text.to_ascii_uppercase();
            let starts_statement = i == 0 || significant[i - 1].kind == TokenKind::Semicolon;
            let blocked = BLOCKED_KEYWORDS.contains(&upper.as_str())
                || (starts_statement && STATEMENT_KEYWORDS.contains(&upper.as_str()));
            blocked.then(|| {
                ValidationVerdict::reject(
                    Rule::KeywordBlacklist,
                    format!("keyword {} is not allowed", upper),
                )
            })
        }
        _ => None,
    })
}

fn check_heuristics(significant: &[&Token<'_>]) -> Option<ValidationVerdict> {
    for (i, token) in significant.iter().enumerate() {
        let next = significant.get(i + 1);

        if token.is_comment() {
            return Some(ValidationVerdict::reject(
                Rule::Comment,
                "comments are not allowed",
            ));
        }
        if token.kind == TokenKind::SystemVariable {
            return Some(ValidationVerdict::reject(
                Rule::SystemVariable,
                "system variable references are not allowed",
            ));
        }
        if let Some(name) = function_name(token) {
            let upper = name.to_ascii_uppercase();
            if DELAY_FUNCTIONS.contains(&upper.as_str()) && next.is_some_and(|n| n.is_punct("(")) {
                return Some(ValidationVerdict::reject(
                    Rule::TimeDelay,
                    format!("{} calls are not allowed", upper),
                ));
            }
        }
        if token.kind == TokenKind::Word {
            let upper = token.text.to_ascii_uppercase();
            if upper == "WAITFOR"
                && next.is_some_and(|n| n.is_keyword("DELAY") || n.is_keyword("TIME"))
            {
                return Some(ValidationVerdict::reject(
                    Rule::TimeDelay,
                    "WAITFOR is not allowed",
                ));
            }
        }
    }
    None
}

/// Name a word or quoted identifier would resolve to if called.
///
/// `"pg_sleep"(1)` and `` `sleep`(1) `` call the same functions as their bare
/// spellings.
fn function_name<'a>(token: &Token<'a>) -> Option<&'a str> {
    match token.kind {
        TokenKind::Word => Some(token.text),
        TokenKind::QuotedIdentifier if token.text.len() >= 2 => {
            Some(&token.text[1..token.text.len() - 1])
        }
        _ => None,
    }
}

fn check_injection_patterns(
    command: CommandKind,
    significant: &[&Token<'_>],
    dialect: DatabaseType,
) -> Option<ValidationVerdict> {
    if command == CommandKind::Select && has_union_select(significant) {
        return Some(ValidationVerdict::reject(
            Rule::UnionSelect,
            "UNION SELECT is not allowed",
        ));
    }
    if command != CommandKind::Insert && trailing_tautologies(significant, dialect) > 0 {
        return Some(ValidationVerdict::reject(
            Rule::Tautology,
            "always-true OR condition is not allowed",
        ));
    }
    None
}

/// `UNION [ALL | DISTINCT] (* SELECT`
fn has_union_select(significant: &[&Token<'_>]) -> bool {
    significant.iter().enumerate().any(|(i, token)| {
        if !token.is_keyword("UNION") {
            return false;
        }
        let mut rest = significant[i + 1..].iter().peekable();
        rest.next_if(|t| t.is_keyword("ALL") || t.is_keyword("DISTINCT"));
        while rest.next_if(|t| t.is_punct("(")).is_some() {}
        rest.next().is_some_and(|t| t.is_keyword("SELECT"))
    })
}

/// Count `OR x = x` conditions that close a predicate.
///
/// A predicate ends at the end of the statement, at a closing parenthesis or
/// at a clause keyword such as ORDER BY or LIMIT. Chains are peeled one
/// condition at a time, and parentheses wrapped around a condition are
/// skipped.
fn trailing_tautologies(significant: &[&Token<'_>], dialect: DatabaseType) -> usize {
    let predicate_ends = significant
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            t.is_punct(")")
                || PREDICATE_END_KEYWORDS
                    .iter()
                    .any(|keyword| t.is_keyword(keyword))
        })
        .map(|(i, _)| i)
        .chain(std::iter::once(significant.len()));

    let mut found = 0;
    for end in predicate_ends {
        let mut end = end;
        while let Some(start) = peel_tautology(significant, end, dialect) {
            found += 1;
            end = start;
        }
    }
    found
}

/// If `significant[..end]` finishes with `OR x = x`, return where the `OR` is.
fn peel_tautology(significant: &[&Token<'_>], end: usize, dialect: DatabaseType) -> Option<usize> {
    let mut end = end;
    let mut closing = 0;
    while end > 0 && significant[end - 1].is_punct(")") {
        end -= 1;
        closing += 1;
    }
    if end < 4 {
        return None;
    }

    let (lhs, op, rhs) = (significant[end - 3], significant[end - 2], significant[end - 1]);
    if !(op.is_punct("=") || op.is_punct("==")) || !same_operand(lhs, rhs, dialect) {
        return None;
    }

    let mut start = end - 3;
    while closing > 0 && start > 0 && significant[start - 1].is_punct("(") {
        start -= 1;
        closing -= 1;
    }
    (start > 0 && significant[start - 1].is_keyword("OR")).then(|| start - 1)
}

fn same_operand(lhs: &Token<'_>, rhs: &Token<'_>, dialect: DatabaseType) -> bool {
    match (literal_text(lhs, dialect), literal_text(rhs, dialect)) {
        (Some(a), Some(b)) => {
            a == b
                || matches!((a.parse::<f64>(), b.parse::<f64>()), (Ok(x), Ok(y)) if x == y)
        }
        _ => match (lhs.kind, rhs.kind) {
            (TokenKind::Word, TokenKind::Word) => lhs.text.eq_ignore_ascii_case(rhs.text),
            (TokenKind::QuotedIdentifier, TokenKind::QuotedIdentifier) => lhs.text == rhs.text,
            _ => false,
        },
    }
}

/// Literal content of a number or quoted string.
///
/// MySQL lexes `"..."` as a string. SQLite reads a double-quoted name that
/// matches no column as a string, so it is treated as a literal here too.
fn literal_text<'a>(token: &Token<'a>, dialect: DatabaseType) -> Option<&'a str> {
    let quoted = |quote: char| {
        token.text.len() >= 2 && token.text.starts_with(quote) && token.text.ends_with(quote)
    };
    match token.kind {
        TokenKind::Number => Some(token.text),
        TokenKind::String if quoted('\'') || quoted('"') => {
            Some(&token.text[1..token.text.len() - 1])
        }
        TokenKind::QuotedIdentifier if dialect == DatabaseType::SQLite && quoted('"') => {
            Some(&token.text[1..token.text.len() - 1])
        }
        _ => None,
    }
}

fn query_has_into(query: &Query) -> bool {
    set_expr_has_into(&query.body)
}

fn set_expr_has_into(expr: &SetExpr) -> bool {
    match expr {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::Query(query) => query_has_into(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_has_into(left) || set_expr_has_into(right)
        }
        _ => false,
    }
}

/// Rebuild the statement with `:name` parameters replaced by positional
/// placeholders the parser understands.
fn placeholder_neutral_text(tokens: &[Token<'_>], dialect: DatabaseType) -> String {
    let mut text = String::new();
    let mut position = 0;
    for token in tokens {
        if token.kind == TokenKind::NamedParameter {
            position += 1;
            match dialect {
                DatabaseType::PostgreSQL => text.push_str(&format!("${}", position)),
                DatabaseType::MySQL | DatabaseType::SQLite => text.push('?'),
            }
        } else {
            text.push_str(token.text);
        }
    }
    text
}

/// Truncated statement text for logs.
pub(crate) fn preview(statement: &str) -> String {
    let mut chars = statement.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite() -> SafetyValidator {
        SafetyValidator::new(DatabaseType::SQLite)
    }

    fn rule_of(validator: &SafetyValidator, sql: &str) -> Option<Rule> {
        validator.validate(sql).rule
    }

    #[test]
    fn test_allows_plain_dml() {
        let v = sqlite();
        for sql in [
            "SELECT * FROM users",
            "select id, name from users where id = 1",
            "INSERT INTO users (name) VALUES ('ann')",
            "UPDATE users SET name = 'bob' WHERE id = 2",
            "DELETE FROM users WHERE id = 3",
            "SELECT * FROM users WHERE id = :id",
            "INSERT INTO users (name) VALUES ('x') RETURNING id",
        ] {
            let verdict = v.validate(sql);
            assert!(verdict.allowed, "{sql}: {:?}", verdict.reason);
        }
    }

    #[test]
    fn test_rejects_non_whitelisted_commands() {
        let v = sqlite();
        assert_eq!(rule_of(&v, "DROP TABLE users"), Some(Rule::CommandWhitelist));
        assert_eq!(rule_of(&v, "WITH x AS (SELECT 1) SELECT * FROM x"), Some(Rule::CommandWhitelist));
        assert_eq!(rule_of(&v, "PRAGMA table_info(users)"), Some(Rule::CommandWhitelist));
        assert_eq!(rule_of(&v, ""), Some(Rule::CommandWhitelist));

        let verdict = v.validate("-- hi\nSELECT 1");
        assert_eq!(verdict.rule, Some(Rule::CommandWhitelist));
        assert!(verdict.reason.unwrap().contains("comment"));
    }

    #[test]
    fn test_rejects_blocked_keywords() {
        let v = sqlite();
        let verdict = v.validate("SELECT * FROM users WHERE id IN (SELECT 1) AND DROP = 1");
        assert_eq!(verdict.rule, Some(Rule::KeywordBlacklist));
        assert!(verdict.reason.unwrap().contains("DROP"));
        assert_eq!(
            rule_of(&v, "UPDATE users SET x = 1; DELETE FROM users"),
            Some(Rule::KeywordBlacklist)
        );
    }

    #[test]
    fn test_keywords_inside_literals_are_ignored() {
        let v = sqlite();
        assert!(v.validate("SELECT 'DROP TABLE users' AS note").allowed);
        assert!(v.validate("SELECT \"create\" FROM t").allowed);
        assert!(v.validate("SELECT * FROM t WHERE note = 'a -- b'").allowed);
        assert!(v.validate("SELECT * FROM t WHERE a = 'x; y'").allowed);
    }

    #[test]
    fn test_keyword_matching_is_whole_word() {
        let v = sqlite();
        assert!(v.validate("SELECT created_at, dropped FROM events").allowed);
    }

    #[test]
    fn test_rejects_comments() {
        let v = sqlite();
        assert_eq!(rule_of(&v, "SELECT 1 -- trailing"), Some(Rule::Comment));
        assert_eq!(rule_of(&v, "SELECT /* x */ 1"), Some(Rule::Comment));
    }

    #[test]
    fn test_rejects_system_variables_and_delays() {
        let mysql = SafetyValidator::new(DatabaseType::MySQL);
        assert_eq!(rule_of(&mysql, "SELECT @@version"), Some(Rule::SystemVariable));
        assert_eq!(rule_of(&mysql, "SELECT SLEEP(5)"), Some(Rule::TimeDelay));
        assert_eq!(
            rule_of(&mysql, "SELECT BENCHMARK (1000000, MD5('a'))"),
            Some(Rule::TimeDelay)
        );

        let pg = SafetyValidator::new(DatabaseType::PostgreSQL);
        assert_eq!(rule_of(&pg, "SELECT pg_sleep(10)"), Some(Rule::TimeDelay));
        assert!(pg.validate("SELECT sleep FROM naps").allowed);
    }

    #[test]
    fn test_rejects_union_select() {
        let v = sqlite();
        assert_eq!(
            rule_of(&v, "SELECT name FROM users UNION SELECT password FROM secrets"),
            Some(Rule::UnionSelect)
        );
        assert_eq!(
            rule_of(&v, "SELECT 1 union all (select 2)"),
            Some(Rule::UnionSelect)
        );
    }

    #[test]
    fn test_rejects_trailing_tautologies() {
        let v = sqlite();
        assert_eq!(
            rule_of(&v, "SELECT * FROM users WHERE name = 'a' OR 1=1"),
            Some(Rule::Tautology)
        );
        assert_eq!(
            rule_of(&v, "SELECT * FROM users WHERE name = 'a' OR 'x' = 'x'"),
            Some(Rule::Tautology)
        );
        assert_eq!(
            rule_of(&v, "DELETE FROM users WHERE id = 5 OR id = id"),
            Some(Rule::Tautology)
        );
        assert!(v.validate("SELECT * FROM users WHERE a = 1 OR b = 2").allowed);
        assert!(v.validate("SELECT * FROM users WHERE a = 1 OR a = 2").allowed);
    }

    #[test]
    fn test_tautology_peeling() {
        let v = sqlite();
        let sql = "SELECT * FROM t WHERE a = 1 OR 1 = 1 OR 2 = 2";
        let tokens = tokenize(sql, DatabaseType::SQLite).unwrap();
        let significant: Vec<&Token<'_>> = tokens.iter().filter(|t| !t.is_whitespace()).collect();
        assert_eq!(trailing_tautologies(&significant, DatabaseType::SQLite), 2);
        assert_eq!(rule_of(&v, sql), Some(Rule::Tautology));
    }

    #[test]
    fn test_rejects_quoted_delay_functions() {
        let pg = SafetyValidator::new(DatabaseType::PostgreSQL);
        assert_eq!(rule_of(&pg, "SELECT \"pg_sleep\"(5)"), Some(Rule::TimeDelay));
        assert_eq!(rule_of(&pg, "SELECT pg_catalog.\"pg_sleep\"(5)"), Some(Rule::TimeDelay));
        assert_eq!(rule_of(&pg, "SELECT \"PG_SLEEP_FOR\" ('5 s')"), Some(Rule::TimeDelay));
        // A quoted column that merely shares the name is not a call
        assert!(pg.validate("SELECT \"pg_sleep\" FROM t").allowed);

        let mysql = SafetyValidator::new(DatabaseType::MySQL);
        assert_eq!(rule_of(&mysql, "SELECT `sleep`(5)"), Some(Rule::TimeDelay));
    }

    #[test]
    fn test_rejects_tautologies_inside_predicate() {
        let v = sqlite();
        for sql in [
            "SELECT * FROM users WHERE (name = 'a' OR 1=1)",
            "SELECT * FROM users WHERE name = 'a' OR 1=1 ORDER BY id",
            "SELECT * FROM users WHERE name = 'a' OR 1=1 LIMIT 5",
            "SELECT * FROM users WHERE name = 'a' OR (1=1)",
            "SELECT * FROM users WHERE ((name = 'a') OR 'x' = 'x') AND id > 0",
            "SELECT role, COUNT(*) FROM users GROUP BY role HAVING COUNT(*) > 1 OR 2 = 2 ORDER BY role",
            "DELETE FROM users WHERE (id = 5 OR 1=1)",
            "UPDATE users SET name = 'x' WHERE id = 1 OR id = id RETURNING id",
        ] {
            assert_eq!(rule_of(&v, sql), Some(Rule::Tautology), "{sql}");
        }
        assert!(v.validate("SELECT * FROM users WHERE (a = 1 OR b = 2) ORDER BY id").allowed);
        assert!(v.validate("SELECT * FROM users WHERE a IN (1, 2) OR b = 3 LIMIT 5").allowed);
    }

    #[test]
    fn test_tautology_literals_follow_dialect_quoting() {
        let mysql = SafetyValidator::new(DatabaseType::MySQL);
        assert_eq!(
            rule_of(&mysql, "SELECT * FROM users WHERE name = 'a' OR \"x\"=\"x\""),
            Some(Rule::Tautology)
        );
        assert_eq!(
            rule_of(&mysql, "SELECT * FROM users WHERE name = 'a' OR 'x'=\"x\""),
            Some(Rule::Tautology)
        );

        let v = sqlite();
        assert_eq!(
            rule_of(&v, "SELECT * FROM users WHERE name = 'a' OR 'a'=\"a\""),
            Some(Rule::Tautology)
        );

        // On PostgreSQL "a" is always an identifier, never the string 'a'
        let pg = SafetyValidator::new(DatabaseType::PostgreSQL);
        assert!(pg.validate("SELECT * FROM users WHERE name = 'a' OR 'a' = \"a\"").allowed);
    }

    #[test]
    fn test_rule_bypass_attempts() {
        let cases: &[(DatabaseType, &str, Rule)] = &[
            (DatabaseType::PostgreSQL, "SELECT \"pg_sleep\"(5)", Rule::TimeDelay),
            (DatabaseType::PostgreSQL, "SELECT pg_catalog.\"pg_sleep\"(5)", Rule::TimeDelay),
            (DatabaseType::PostgreSQL, "SELECT id FROM t WHERE x = \"pg_sleep\" (1)", Rule::TimeDelay),
            (DatabaseType::MySQL, "SELECT id FROM t WHERE a = `BENCHMARK`(9, 1)", Rule::TimeDelay),
            (DatabaseType::SQLite, "SELECT id FROM t WHERE (a = 1 OR 1 = 1)", Rule::Tautology),
            (DatabaseType::SQLite, "SELECT id FROM t WHERE ((a = 1 OR ((1 = 1))))", Rule::Tautology),
            (DatabaseType::PostgreSQL, "SELECT id FROM t WHERE a = 1 OR 1 = 1 ORDER BY id", Rule::Tautology),
            (DatabaseType::PostgreSQL, "SELECT id FROM t WHERE a = 1 OR 1 = 1 FETCH FIRST 1 ROWS ONLY", Rule::Tautology),
            (DatabaseType::MySQL, "SELECT id FROM t WHERE a = 1 OR 'x' = 'x' LIMIT 1", Rule::Tautology),
            (DatabaseType::MySQL, "SELECT id FROM t WHERE a = 1 OR \"x\" = \"x\"", Rule::Tautology),
            (DatabaseType::SQLite, "SELECT id FROM t WHERE a = 1 OR 'x' = \"x\"", Rule::Tautology),
            (DatabaseType::SQLite, "SELECT id FROM t WHERE a = 1 OR 1.0 = 1", Rule::Tautology),
            (DatabaseType::SQLite, "DELETE FROM t WHERE (a = 1 OR 1 = 1)", Rule::Tautology),
        ];
        for (dialect, sql, rule) in cases {
            let verdict = SafetyValidator::new(*dialect).validate(sql);
            assert_eq!(verdict.rule, Some(*rule), "{dialect:?}: {sql}");
        }
    }

    #[test]
    fn test_statement_keywords_allowed_as_column_names() {
        let v = sqlite();
        assert!(v.validate("SELECT lock FROM jobs").allowed);
        assert!(v.validate("SELECT handler FROM tasks").allowed);
        assert_eq!(rule_of(&v, "LOCK TABLES users WRITE"), Some(Rule::CommandWhitelist));

        let tokens = tokenize("HANDLER t OPEN", DatabaseType::MySQL).unwrap();
        let significant: Vec<&Token<'_>> = tokens.iter().filter(|t| !t.is_whitespace()).collect();
        assert_eq!(
            check_blacklist(&significant).and_then(|v| v.rule),
            Some(Rule::KeywordBlacklist)
        );
    }

    #[test]
    fn test_structure_check() {
        let v = sqlite();
        assert_eq!(rule_of(&v, "SELECT * FROM users WHERE"), Some(Rule::Structure));
        assert_eq!(rule_of(&v, "SELECT * FROM"), Some(Rule::Structure));

        let pg = SafetyValidator::new(DatabaseType::PostgreSQL);
        assert_eq!(
            rule_of(&pg, "SELECT * INTO backup FROM users"),
            Some(Rule::Structure)
        );
        assert!(pg.validate("SELECT * FROM users WHERE id = :id AND name = :name").allowed);
    }

    #[test]
    fn test_unterminated_literal() {
        assert_eq!(rule_of(&sqlite(), "SELECT 'abc"), Some(Rule::Lexical));
    }

    #[test]
    fn test_validate_batch_reports_first_rejection() {
        let batch = crate::sql::split(
            "SELECT 1; DROP TABLE users; DELETE FROM users",
            DatabaseType::SQLite,
        )
        .unwrap();
        let err = sqlite().validate_batch(&batch).unwrap_err();
        match err {
            DbError::ValidationRejected {
                statement_index,
                rule,
                ..
            } => {
                assert_eq!(statement_index, 1);
                assert_eq!(rule, "command_whitelist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("SELECT 1"), "SELECT 1");
    }
}
