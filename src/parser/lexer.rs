//! Lexer for Bash Scripts
//!
//! The lexer shares its cursor with the parser: tokens are read on demand
//! from the current position under the current word context, so the same
//! characters can lex differently inside `[[ ]]`, after `=~`, or while a
//! command substitution is waiting for its closing `)`.
//!
//! It handles:
//! - Operators and delimiters
//! - Words (delegated to the word reader)
//! - Comments
//! - A one-token lookahead cache

use super::parser::Parser;
use super::scan_helpers::{is_blank, is_metachar, is_redirect_char, is_whitespace};
use super::state::{ParserMode, WordContext};
use super::types::ParseResult;
use crate::ast::types::{CaseTerminator, WordNode};
use std::collections::HashSet;

/// Token types for bash lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // End of input
    Eof,

    Word,

    // Newlines and separators
    Newline,
    Semicolon,
    Amp, // &

    // Operators
    Pipe,    // |
    PipeAmp, // |&
    AndAnd,  // &&
    OrOr,    // ||

    // Redirections
    Less,      // <
    Great,     // >
    DLess,     // <<
    DGreat,    // >>
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    DLessDash, // <<-
    Clobber,   // >|
    TLess,     // <<<
    AndGreat,  // &>
    AndDGreat, // &>>

    // Grouping
    LParen, // (
    RParen, // )

    // Case terminators
    DSemi,       // ;;
    SemiAnd,     // ;&
    SemiSemiAnd, // ;;&
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "EOF",
            Self::Word => "WORD",
            Self::Newline => "NEWLINE",
            Self::Semicolon => ";",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::PipeAmp => "|&",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Less => "<",
            Self::Great => ">",
            Self::DLess => "<<",
            Self::DGreat => ">>",
            Self::LessAnd => "<&",
            Self::GreatAnd => ">&",
            Self::LessGreat => "<>",
            Self::DLessDash => "<<-",
            Self::Clobber => ">|",
            Self::TLess => "<<<",
            Self::AndGreat => "&>",
            Self::AndDGreat => "&>>",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::DSemi => ";;",
            Self::SemiAnd => ";&",
            Self::SemiSemiAnd => ";;&",
        }
    }

    pub fn is_operator(&self) -> bool {
        !matches!(self, Self::Eof | Self::Word | Self::Newline)
    }
}

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenType,
    pub value: String,
    /// Character offset of the first character (after leading blanks)
    pub pos: usize,
    /// For WORD tokens: the parsed word with its expansions
    pub word: Option<WordNode>,
}

impl Token {
    pub fn new(kind: TokenType, value: impl Into<String>, pos: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            pos,
            word: None,
        }
    }

    pub fn eof(pos: usize) -> Self {
        Self::new(TokenType::Eof, "", pos)
    }

    pub fn word(word: WordNode, pos: usize) -> Self {
        Self {
            kind: TokenType::Word,
            value: word.value.clone(),
            pos,
            word: Some(word),
        }
    }
}

/// Everything that can change how the characters at a position lex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenKey {
    pos: usize,
    word_context: WordContext,
    at_command_start: bool,
    in_array_literal: bool,
    in_assign_builtin: bool,
    eof_token: Option<char>,
    mode: ParserMode,
}

impl TokenKey {
    fn same_place(&self, other: &TokenKey) -> bool {
        self.pos == other.pos
            && self.word_context == other.word_context
            && self.eof_token == other.eof_token
            && self.mode == other.mode
    }
}

/// The last peeked token and where the cursor ends up after consuming it.
#[derive(Debug, Clone)]
pub(crate) struct CachedToken {
    key: TokenKey,
    token: Token,
    end: usize,
    /// The word reader consulted the command-start, array-literal or
    /// assign-builtin flag while reading this token.
    flag_sensitive: bool,
}

impl CachedToken {
    fn answers(&self, key: &TokenKey) -> bool {
        if self.flag_sensitive {
            self.key == *key
        } else {
            self.key.same_place(key)
        }
    }
}

lazy_static::lazy_static! {
    /// Reserved words in bash
    pub static ref RESERVED_WORDS: HashSet<&'static str> = [
        "case", "coproc", "do", "done", "elif", "else", "esac", "fi", "for",
        "function", "if", "in", "select", "then", "until", "while",
    ]
    .into_iter()
    .collect();

    /// Unary test operators inside `[[ ]]`
    pub static ref COND_UNARY_OPS: HashSet<&'static str> = [
        "-G", "-L", "-N", "-O", "-R", "-S", "-a", "-b", "-c", "-d", "-e", "-f",
        "-g", "-h", "-k", "-n", "-o", "-p", "-r", "-s", "-t", "-u", "-v", "-w",
        "-x", "-z",
    ]
    .into_iter()
    .collect();

    /// Binary test operators inside `[[ ]]`
    pub static ref COND_BINARY_OPS: HashSet<&'static str> = [
        "!=", "-ef", "-eq", "-ge", "-gt", "-le", "-lt", "-ne", "-nt", "-ot",
        "<", "=", "==", "=~", ">",
    ]
    .into_iter()
    .collect();

    /// Builtins whose arguments may contain `name=(...)` array literals
    pub static ref ASSIGNMENT_BUILTINS: HashSet<&'static str> = [
        "alias", "declare", "eval", "export", "let", "local", "readonly", "typeset",
    ]
    .into_iter()
    .collect();
}

/// Three-character operators
const THREE_CHAR_OPS: &[(&str, TokenType)] = &[
    (";;&", TokenType::SemiSemiAnd),
    ("<<-", TokenType::DLessDash),
    ("<<<", TokenType::TLess),
    ("&>>", TokenType::AndDGreat),
];

/// Two-character operators
const TWO_CHAR_OPS: &[(&str, TokenType)] = &[
    ("&&", TokenType::AndAnd),
    ("||", TokenType::OrOr),
    (";;", TokenType::DSemi),
    (";&", TokenType::SemiAnd),
    ("<<", TokenType::DLess),
    (">>", TokenType::DGreat),
    ("<&", TokenType::LessAnd),
    (">&", TokenType::GreatAnd),
    ("<>", TokenType::LessGreat),
    (">|", TokenType::Clobber),
    ("&>", TokenType::AndGreat),
    ("|&", TokenType::PipeAmp),
];

/// Characters after which a `#` starts a comment
const COMMENT_PRECEDERS: &str = " \t\n;|&(){}";

impl Parser {
    pub(crate) fn skip_blanks(&mut self) {
        while self.peek().is_some_and(is_blank) {
            self.pos += 1;
        }
    }

    /// Skip a comment up to (not including) the newline.
    pub(crate) fn skip_comment(&mut self) -> bool {
        if self.peek() != Some('#') {
            return false;
        }
        if self.pos > 0 && !COMMENT_PRECEDERS.contains(self.source[self.pos - 1]) {
            return false;
        }
        while self.peek().is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
        true
    }

    fn read_operator(&mut self) -> Option<Token> {
        let start = self.pos;
        let c = self.peek()?;
        for (text, kind) in THREE_CHAR_OPS.iter().chain(TWO_CHAR_OPS) {
            if self.lookahead_is(text) {
                self.pos += text.len();
                return Some(Token::new(*kind, *text, start));
            }
        }
        let kind = match c {
            ';' => TokenType::Semicolon,
            '|' => TokenType::Pipe,
            '&' => TokenType::Amp,
            '(' | ')' if self.word_context == WordContext::Regex => return None,
            '(' => TokenType::LParen,
            ')' => TokenType::RParen,
            '<' | '>' if self.peek_at(1) == Some('(') => return None,
            '<' => TokenType::Less,
            '>' => TokenType::Great,
            '\n' => TokenType::Newline,
            _ => return None,
        };
        self.pos += 1;
        Some(Token::new(kind, c.to_string(), start))
    }

    fn read_word_token(&mut self) -> ParseResult<Option<Token>> {
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let is_procsub = is_redirect_char(c) && self.peek_at(1) == Some('(');
        let is_regex_paren = self.word_context == WordContext::Regex && (c == '(' || c == ')');
        if is_metachar(c) && !is_procsub && !is_regex_paren {
            return Ok(None);
        }
        let word = self.read_word_internal(
            self.word_context,
            self.at_command_start,
            self.in_array_literal,
            self.in_assign_builtin,
        )?;
        Ok(word.map(|w| Token::word(w, start)))
    }

    /// Read one token from the cursor, bypassing the cache.
    fn read_token(&mut self) -> ParseResult<Token> {
        self.skip_blanks();
        if self.at_end() {
            return Ok(Token::eof(self.pos));
        }
        while self.skip_comment() {
            self.skip_blanks();
            if self.at_end() {
                return Ok(Token::eof(self.pos));
            }
        }
        if let Some(token) = self.read_operator() {
            return Ok(token);
        }
        if let Some(token) = self.read_word_token()? {
            return Ok(token);
        }
        Ok(Token::eof(self.pos))
    }

    fn token_key(&self) -> TokenKey {
        TokenKey {
            pos: self.pos,
            word_context: self.word_context,
            at_command_start: self.at_command_start,
            in_array_literal: self.in_array_literal,
            in_assign_builtin: self.in_assign_builtin,
            eof_token: self.eof_token,
            mode: self.mode,
        }
    }

    /// Look at the next token without consuming it.
    pub(crate) fn peek_token(&mut self) -> ParseResult<Token> {
        let key = self.token_key();
        if let Some(cached) = &self.token_cache {
            if cached.answers(&key) {
                return Ok(cached.token.clone());
            }
        }
        let saved = self.pos;
        self.word_used_flags = false;
        let token = self.read_token()?;
        let flag_sensitive = self.word_used_flags;
        let end = self.pos;
        self.pos = saved;
        log::trace!(
            "peek {} {:?} at {} in {:?}",
            token.kind.as_str(),
            token.value,
            token.pos,
            self.contexts.current().kind
        );
        self.token_cache = Some(CachedToken {
            key,
            token: token.clone(),
            end,
            flag_sensitive,
        });
        Ok(token)
    }

    /// Consume and return the next token.
    pub(crate) fn next_token(&mut self) -> ParseResult<Token> {
        let key = self.token_key();
        if let Some(cached) = self.token_cache.take() {
            if cached.answers(&key) {
                self.pos = cached.end;
                return Ok(cached.token);
            }
        }
        self.read_token()
    }

    /// Whether `ch` at the cursor ends a word in the given context.
    pub(crate) fn is_word_terminator(
        &self,
        ctx: WordContext,
        ch: char,
        bracket_depth: usize,
        paren_depth: usize,
    ) -> bool {
        let next = self.peek_at(1);
        match ctx {
            WordContext::Regex => {
                if (ch == ']' && next == Some(']')) || (ch == '&' && next == Some('&')) {
                    return true;
                }
                if ch == ')' && paren_depth == 0 {
                    return true;
                }
                is_whitespace(ch) && paren_depth == 0
            }
            WordContext::Cond => {
                if ch == ']' && next == Some(']') {
                    return true;
                }
                if matches!(ch, ')' | '&' | '|' | ';') {
                    return true;
                }
                if is_redirect_char(ch) && next != Some('(') {
                    return true;
                }
                is_whitespace(ch)
            }
            WordContext::Normal => {
                if self.mode.contains(ParserMode::EOFTOKEN)
                    && self.eof_token == Some(ch)
                    && bracket_depth == 0
                {
                    return true;
                }
                if is_redirect_char(ch) && next == Some('(') {
                    return false;
                }
                is_metachar(ch) && bracket_depth == 0
            }
        }
    }

    // =========================================================================
    // TOKEN QUERIES USED BY THE GRAMMAR
    // =========================================================================

    /// The reserved word (or `{`, `}`, `[[`, `]]`, `!`, `time`) at the cursor.
    pub(crate) fn peek_reserved_word(&mut self) -> ParseResult<Option<String>> {
        let token = self.peek_token()?;
        if token.kind != TokenType::Word {
            return Ok(None);
        }
        let word = token.value.strip_suffix("\\\n").unwrap_or(&token.value);
        if RESERVED_WORDS.contains(word) || matches!(word, "{" | "}" | "[[" | "]]" | "!" | "time") {
            return Ok(Some(word.to_string()));
        }
        Ok(None)
    }

    pub(crate) fn is_at_reserved_word(&mut self, word: &str) -> ParseResult<bool> {
        Ok(self.peek_reserved_word()?.as_deref() == Some(word))
    }

    /// Consume the next word token if it is exactly `expected`.
    pub(crate) fn consume_reserved_word(&mut self, expected: &str) -> ParseResult<bool> {
        let token = self.peek_token()?;
        if token.kind != TokenType::Word {
            return Ok(false);
        }
        let word = token.value.strip_suffix("\\\n").unwrap_or(&token.value);
        if word == expected {
            self.next_token()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub(crate) fn peek_case_terminator(&mut self) -> ParseResult<Option<CaseTerminator>> {
        Ok(match self.peek_token()?.kind {
            TokenType::DSemi => Some(CaseTerminator::DoubleSemi),
            TokenType::SemiAnd => Some(CaseTerminator::SemiAnd),
            TokenType::SemiSemiAnd => Some(CaseTerminator::SemiSemiAnd),
            _ => None,
        })
    }

    pub(crate) fn is_command_terminator(&mut self) -> ParseResult<bool> {
        Ok(matches!(
            self.peek_token()?.kind,
            TokenType::Eof
                | TokenType::Newline
                | TokenType::Pipe
                | TokenType::Semicolon
                | TokenType::LParen
                | TokenType::RParen
                | TokenType::Amp
        ))
    }

    /// The operator token at the cursor, if any.
    pub(crate) fn peek_operator(&mut self) -> ParseResult<Option<Token>> {
        let token = self.peek_token()?;
        Ok(token.kind.is_operator().then_some(token))
    }
}
