//! Dialect-aware SQL tokenizer.
//!
//! The lexer knows exactly where string literals, quoted identifiers and
//! comments begin and end, so that everything downstream (splitting, policy
//! checks, placeholder rewriting) can reason about tokens rather than raw
//! characters. Every byte of the input belongs to exactly one token, so
//! concatenating token texts reproduces the input.

use crate::models::DatabaseType;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    /// Unquoted identifier or keyword
    Word,
    /// `"name"`, `` `name` `` or `[name]`
    QuotedIdentifier,
    /// Any string literal, including prefixed and dollar-quoted forms
    String,
    Number,
    LineComment,
    BlockComment,
    Semicolon,
    /// `:name`
    NamedParameter,
    /// `?`, `?NNN`, `$1` or `$name`
    Placeholder,
    /// `@@name`
    SystemVariable,
    /// `@name`
    Variable,
    /// Operators and punctuation
    Punct,
}

impl TokenKind {
    /// Human-readable name, safe to put into error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::Word => "keyword",
            Self::QuotedIdentifier => "quoted identifier",
            Self::String => "string literal",
            Self::Number => "number",
            Self::LineComment | Self::BlockComment => "comment",
            Self::Semicolon => "semicolon",
            Self::NamedParameter => "named parameter",
            Self::Placeholder => "placeholder",
            Self::SystemVariable => "system variable",
            Self::Variable => "variable",
            Self::Punct => "operator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the token in the source
    pub offset: usize,
}

impl Token<'_> {
    pub fn is_whitespace(&self) -> bool {
        self.kind == TokenKind::Whitespace
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::LineComment | TokenKind::BlockComment)
    }

    /// True if this is the unquoted keyword `keyword` (case-insensitive).
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == symbol
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at byte {offset}")]
pub struct LexError {
    pub offset: usize,
    pub message: String,
}

impl LexError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Multi-character operators, longest first.
const OPERATORS: &[&str] = &[
    "->>", "#>>", "<=>", "<=", ">=", "<>", "!=", "==", "||", "::", "->", "#>", "<<", ">>", "&&",
    "@>", "<@",
];

/// Streaming tokenizer. Yields at most one error, after which it stops.
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    dialect: DatabaseType,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, dialect: DatabaseType) -> Self {
        Self {
            src,
            pos: 0,
            dialect,
            failed: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek(0) {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn next_token(&mut self) -> Result<TokenKind, LexError> {
        let start = self.pos;
        let Some(c) = self.peek(0) else {
            return Err(LexError::new(start, "unexpected end of input"));
        };
        let next = self.peek(1);

        let kind = match c {
            c if c.is_whitespace() => {
                self.bump_while(char::is_whitespace);
                TokenKind::Whitespace
            }
            '-' if next == Some('-') => self.line_comment(),
            '#' if self.dialect == DatabaseType::MySQL => self.line_comment(),
            '/' if next == Some('*') => self.block_comment(start)?,
            '\'' => {
                self.quoted(start, '\'', self.dialect == DatabaseType::MySQL)?;
                TokenKind::String
            }
            '"' if self.dialect == DatabaseType::MySQL => {
                self.quoted(start, '"', true)?;
                TokenKind::String
            }
            '"' => {
                self.quoted(start, '"', false)?;
                TokenKind::QuotedIdentifier
            }
            '`' => {
                self.quoted(start, '`', false)?;
                TokenKind::QuotedIdentifier
            }
            '[' if self.dialect == DatabaseType::SQLite => {
                self.bump();
                match self.rest().find(']') {
                    Some(end) => self.pos += end + 1,
                    None => return Err(LexError::new(start, "unterminated bracket identifier")),
                }
                TokenKind::QuotedIdentifier
            }
            ';' => {
                self.bump();
                TokenKind::Semicolon
            }
            '$' => self.dollar(start)?,
            '?' if self.dialect != DatabaseType::PostgreSQL => {
                self.bump();
                self.bump_while(|c| c.is_ascii_digit());
                TokenKind::Placeholder
            }
            ':' if next == Some(':') => {
                self.pos += 2;
                TokenKind::Punct
            }
            ':' if next.is_some_and(is_ident_start) => {
                self.bump();
                self.bump_while(is_ident_char);
                TokenKind::NamedParameter
            }
            '@' if next == Some('@') => {
                self.pos += 2;
                self.bump_while(|c| is_ident_char(c) || c == '.');
                TokenKind::SystemVariable
            }
            '@' if next.is_some_and(is_ident_start) => {
                self.bump();
                self.bump_while(is_ident_char);
                TokenKind::Variable
            }
            c if c.is_ascii_digit() => self.number(),
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => self.number(),
            c if is_ident_start(c) => self.word(start)?,
            _ => {
                match OPERATORS.iter().find(|op| self.rest().starts_with(*op)) {
                    Some(op) => self.pos += op.len(),
                    None => {
                        self.bump();
                    }
                }
                TokenKind::Punct
            }
        };
        Ok(kind)
    }

    fn line_comment(&mut self) -> TokenKind {
        self.bump_while(|c| c != '\n');
        TokenKind::LineComment
    }

    /// PostgreSQL block comments nest; the other dialects end at the first `*/`.
    fn block_comment(&mut self, start: usize) -> Result<TokenKind, LexError> {
        self.pos += 2;
        let nests = self.dialect == DatabaseType::PostgreSQL;
        let mut depth = 1usize;
        while depth > 0 {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(LexError::new(start, "unterminated block comment"));
            }
            if rest.starts_with("*/") {
                depth -= 1;
                self.pos += 2;
            } else if nests && rest.starts_with("/*") {
                depth += 1;
                self.pos += 2;
            } else {
                self.bump();
            }
        }
        Ok(TokenKind::BlockComment)
    }

    /// Consume a quoted run starting at the opening quote. A doubled quote is
    /// an escaped quote; with `backslash` a backslash escapes the next char.
    fn quoted(&mut self, start: usize, quote: char, backslash: bool) -> Result<(), LexError> {
        self.bump();
        loop {
            let Some(c) = self.bump() else {
                return Err(LexError::new(start, unterminated_message(quote)));
            };
            if backslash && c == '\\' {
                if self.bump().is_none() {
                    return Err(LexError::new(start, unterminated_message(quote)));
                }
            } else if c == quote {
                if self.peek(0) == Some(quote) {
                    self.bump();
                } else {
                    return Ok(());
                }
            }
        }
    }

    fn dollar(&mut self, start: usize) -> Result<TokenKind, LexError> {
        if self.dialect != DatabaseType::PostgreSQL {
            self.bump();
            self.bump_while(is_ident_char);
            return Ok(TokenKind::Placeholder);
        }

        let after = &self.rest()[1..];
        if after.starts_with(|c: char| c.is_ascii_digit()) {
            self.bump();
            self.bump_while(|c| c.is_ascii_digit());
            return Ok(TokenKind::Placeholder);
        }

        // $tag$ ... $tag$ where tag may be empty
        let tag_len = after
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(after.len());
        if after[tag_len..].starts_with('$') {
            let delimiter = &self.rest()[..tag_len + 2];
            let body_start = self.pos + delimiter.len();
            match self.src[body_start..].find(delimiter) {
                Some(end) => {
                    self.pos = body_start + end + delimiter.len();
                    Ok(TokenKind::String)
                }
                None => Err(LexError::new(start, "unterminated dollar-quoted string")),
            }
        } else {
            self.bump();
            Ok(TokenKind::Punct)
        }
    }

    fn number(&mut self) -> TokenKind {
        while let Some(c) = self.peek(0) {
            if (c == 'e' || c == 'E') && matches!(self.peek(1), Some('+' | '-')) {
                self.pos += 2;
            } else if c.is_alphanumeric() || c == '_' || c == '.' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        TokenKind::Number
    }

    /// A word, or a prefixed string literal such as `E'..'` or `N'..'`.
    fn word(&mut self, start: usize) -> Result<TokenKind, LexError> {
        self.bump_while(|c| is_ident_char(c) || c == '$');
        if self.peek(0) == Some('\'') {
            let prefix = &self.src[start..self.pos];
            let backslash = match self.dialect {
                DatabaseType::PostgreSQL => prefix.eq_ignore_ascii_case("e"),
                DatabaseType::MySQL => true,
                DatabaseType::SQLite => false,
            };
            if is_string_prefix(prefix, self.dialect) {
                self.quoted(start, '\'', backslash)?;
                return Ok(TokenKind::String);
            }
        }
        Ok(TokenKind::Word)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.src.len() {
            return None;
        }
        let start = self.pos;
        match self.next_token() {
            Ok(kind) => Some(Ok(Token {
                kind,
                text: &self.src[start..self.pos],
                offset: start,
            })),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn unterminated_message(quote: char) -> &'static str {
    match quote {
        '\'' => "unterminated string literal",
        '"' => "unterminated double-quoted token",
        _ => "unterminated quoted identifier",
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_string_prefix(prefix: &str, dialect: DatabaseType) -> bool {
    let upper = prefix.to_ascii_uppercase();
    match dialect {
        DatabaseType::PostgreSQL => matches!(upper.as_str(), "E" | "B" | "X" | "N"),
        DatabaseType::MySQL => {
            matches!(upper.as_str(), "N" | "B" | "X") || upper.starts_with('_')
        }
        DatabaseType::SQLite => upper == "X",
    }
}

/// Tokenize the whole input.
pub fn tokenize(src: &str, dialect: DatabaseType) -> Result<Vec<Token<'_>>, LexError> {
    Lexer::new(src, dialect).collect()
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str, dialect: DatabaseType) -> Vec<TokenKind> {
        tokenize(sql, dialect)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_whitespace())
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokens_cover_input() {
        let sql = "SELECT a, 'x;y' FROM \"t\" WHERE b >= 1.5e+3 -- tail";
        let tokens = tokenize(sql, DatabaseType::PostgreSQL).unwrap();
        let rebuilt: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, sql);
    }

    #[test]
    fn test_semicolon_inside_literal_is_not_a_separator() {
        let tokens = tokenize("SELECT 'a;b'", DatabaseType::SQLite).unwrap();
        assert!(tokens.iter().all(|t| t.kind != TokenKind::Semicolon));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::String);
    }

    #[test]
    fn test_doubled_quote_escape() {
        let tokens = tokenize("SELECT 'it''s'", DatabaseType::SQLite).unwrap();
        assert_eq!(tokens.last().unwrap().text, "'it''s'");
    }

    #[test]
    fn test_mysql_backslash_escape() {
        let tokens = tokenize(r"SELECT 'a\';b'", DatabaseType::MySQL).unwrap();
        assert_eq!(tokens.last().unwrap().text, r"'a\';b'");

        // The same text is an unterminated literal where backslash is ordinary
        assert!(tokenize(r"SELECT 'a\';b", DatabaseType::SQLite).is_err());
    }

    #[test]
    fn test_postgres_escape_string() {
        let tokens = tokenize(r"SELECT E'a\'b'", DatabaseType::PostgreSQL).unwrap();
        assert_eq!(tokens.last().unwrap().kind, TokenKind::String);
        assert_eq!(tokens.last().unwrap().text, r"E'a\'b'");
    }

    #[test]
    fn test_dollar_quoting() {
        let sql = "SELECT $body$ it's; DROP $body$";
        let tokens = tokenize(sql, DatabaseType::PostgreSQL).unwrap();
        assert_eq!(tokens.last().unwrap().kind, TokenKind::String);
        assert!(tokens.iter().all(|t| t.kind != TokenKind::Semicolon));

        assert!(tokenize("SELECT $$ open", DatabaseType::PostgreSQL).is_err());
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("SELECT 1 -- x", DatabaseType::SQLite),
            vec![TokenKind::Word, TokenKind::Number, TokenKind::LineComment]
        );
        assert_eq!(
            kinds("SELECT /* x */ 1", DatabaseType::SQLite),
            vec![TokenKind::Word, TokenKind::BlockComment, TokenKind::Number]
        );
        assert_eq!(
            kinds("SELECT 1 # x", DatabaseType::MySQL),
            vec![TokenKind::Word, TokenKind::Number, TokenKind::LineComment]
        );
        assert!(tokenize("SELECT /* open", DatabaseType::MySQL).is_err());
    }

    #[test]
    fn test_postgres_comments_nest() {
        let tokens = tokenize("/* a /* b */ c */ SELECT", DatabaseType::PostgreSQL).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::BlockComment);
        assert_eq!(tokens[0].text, "/* a /* b */ c */");
    }

    #[test]
    fn test_named_parameter_and_cast() {
        assert_eq!(
            kinds("SELECT :id::int", DatabaseType::PostgreSQL),
            vec![
                TokenKind::Word,
                TokenKind::NamedParameter,
                TokenKind::Punct,
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn test_placeholders_and_variables() {
        assert_eq!(
            kinds("SELECT ?, @x, @@version", DatabaseType::MySQL),
            vec![
                TokenKind::Word,
                TokenKind::Placeholder,
                TokenKind::Punct,
                TokenKind::Variable,
                TokenKind::Punct,
                TokenKind::SystemVariable
            ]
        );
        assert_eq!(
            kinds("SELECT $1", DatabaseType::PostgreSQL),
            vec![TokenKind::Word, TokenKind::Placeholder]
        );
    }

    #[test]
    fn test_quoted_identifiers() {
        let tokens = tokenize("SELECT \"DROP\", `x`, [y]", DatabaseType::SQLite).unwrap();
        let quoted: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::QuotedIdentifier)
            .map(|t| t.text)
            .collect();
        assert_eq!(quoted, vec!["\"DROP\"", "`x`", "[y]"]);
    }

    #[test]
    fn test_multichar_operators() {
        let tokens = tokenize("a<>b", DatabaseType::SQLite).unwrap();
        assert!(tokens[1].is_punct("<>"));
    }

    #[test]
    fn test_error_offset() {
        let err = tokenize("SELECT 1; SELECT 'x", DatabaseType::SQLite).unwrap_err();
        assert_eq!(err.offset, 17);
        assert!(err.to_string().contains("unterminated string literal"));
    }
}
