//! Recursive Descent Parser for Bash Scripts
//!
//! The parser and lexer share one cursor over the source characters. Word
//! scanning calls back into statement parsing for `$(...)`, `<(...)` and
//! friends, and statement parsing asks the lexer for the next token under
//! whatever context is active at that moment.
//!
//! Grammar (simplified):
//!   script       ::= list (newline list)*
//!   list         ::= pipeline ((&&|'||'|;|&|newline) pipeline)*
//!   pipeline     ::= [time [-p]] [!] command ((|||&) command)*
//!   command      ::= simple_command | compound_command | function_def
//!   simple_cmd   ::= (word | redirection)+
//!   compound_cmd ::= if | for | while | until | case | select | subshell
//!                  | group | (( | [[ | coproc

use super::heredoc::HeredocRecord;
use super::lexer::{CachedToken, TokenType, RESERVED_WORDS};
use super::scan_helpers::{is_metachar, is_negation_boundary, is_whitespace, is_word_end_context};
use super::state::{
    Checkpoint, ContextStack, DolbraceState, ParserMode, QuoteState, WordContext,
};
use super::types::{ParseException, ParseResult, ParserOptions};
use crate::ast::types::{NegationNode, Node, Redirection, TimeNode, WordNode, AST};

/// Main parser struct
pub struct Parser {
    pub(crate) source: Vec<char>,
    pub(crate) pos: usize,
    pub(crate) options: ParserOptions,
    /// Nesting of sub-parsers and list bodies
    pub(crate) depth: usize,

    pub(crate) quote: QuoteState,
    pub(crate) contexts: ContextStack,
    pub(crate) mode: ParserMode,
    pub(crate) dolbrace: DolbraceState,
    /// Character that ends the current nested list (`)` or `}`)
    pub(crate) eof_token: Option<char>,
    pub(crate) word_context: WordContext,
    pub(crate) at_command_start: bool,
    pub(crate) in_array_literal: bool,
    pub(crate) in_assign_builtin: bool,
    /// Set by the word reader when one of the three flags above mattered.
    pub(crate) word_used_flags: bool,

    /// Every heredoc registered so far; nodes refer to these by index.
    pub(crate) heredocs: Vec<HeredocRecord>,
    /// Registered heredocs whose bodies have not been read yet.
    pub(crate) pending_heredocs: Vec<usize>,
    /// Where heredoc bodies consumed by a backtick substitution end.
    pub(crate) cmdsub_heredoc_end: Option<usize>,
    pub(crate) saw_newline_in_single_quote: bool,

    pub(crate) token_cache: Option<CachedToken>,
}

impl Parser {
    /// Create a new parser over `source`.
    pub fn new(source: &str, options: ParserOptions) -> Self {
        Self::nested(source, options, 0)
    }

    pub fn with_options(source: &str, options: ParserOptions) -> Self {
        Self::new(source, options)
    }

    fn nested(source: &str, options: ParserOptions, depth: usize) -> Self {
        Parser {
            source: source.chars().collect(),
            pos: 0,
            options,
            depth,
            quote: QuoteState::new(),
            contexts: ContextStack::new(),
            mode: ParserMode::NONE,
            dolbrace: DolbraceState::None,
            eof_token: None,
            word_context: WordContext::Normal,
            at_command_start: false,
            in_array_literal: false,
            in_assign_builtin: false,
            word_used_flags: false,
            heredocs: Vec::new(),
            pending_heredocs: Vec::new(),
            cmdsub_heredoc_end: None,
            saw_newline_in_single_quote: false,
            token_cache: None,
        }
    }

    pub(crate) fn extglob(&self) -> bool {
        self.options.extglob
    }

    // =========================================================================
    // CURSOR
    // =========================================================================

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    pub(crate) fn peek_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    pub(crate) fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// The source at the cursor starts with `s`.
    pub(crate) fn lookahead_is(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.source.len());
        if start >= end {
            return String::new();
        }
        self.source[start..end].iter().collect()
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> ParseException {
        ParseException::new(message, self.pos)
    }

    // =========================================================================
    // STATE SNAPSHOTS
    // =========================================================================

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            mode: self.mode,
            dolbrace: self.dolbrace,
            pending_heredocs: self.pending_heredocs.clone(),
            contexts: self.contexts.copy_stack(),
            quote: self.quote.clone(),
            eof_token: self.eof_token,
        }
    }

    /// Leave a nested construct. Heredocs registered inside stay pending.
    pub(crate) fn restore_state(&mut self, saved: &Checkpoint) {
        self.mode = saved.mode;
        self.dolbrace = saved.dolbrace;
        self.eof_token = saved.eof_token;
        self.contexts.restore_from(&saved.contexts);
    }

    /// Undo a failed speculative parse completely.
    pub(crate) fn rollback(&mut self, saved: &Checkpoint) {
        self.restore_state(saved);
        self.quote = saved.quote.clone();
        self.pending_heredocs = saved.pending_heredocs.clone();
    }

    /// Run `f` one nesting level deeper, failing once the configured limit
    /// is reached.
    pub(crate) fn descend<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        if self.depth >= self.options.max_depth {
            return Err(ParseException::limit(
                format!("Maximum nesting depth of {} exceeded", self.options.max_depth),
                self.pos,
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // =========================================================================
    // WHITESPACE
    // =========================================================================

    /// Skip blanks, comments and line continuations, stopping at a newline.
    pub(crate) fn skip_whitespace(&mut self) {
        while !self.at_end() {
            self.skip_blanks();
            match self.peek() {
                Some('#') => {
                    if !self.skip_comment() {
                        break;
                    }
                }
                Some('\\') if self.peek_at(1) == Some('\n') => self.pos += 2,
                _ => break,
            }
        }
    }

    /// Like [`Parser::skip_whitespace`] but also crosses newlines, reading any
    /// heredoc bodies that become due.
    pub(crate) fn skip_whitespace_and_newlines(&mut self) {
        while let Some(c) = self.peek() {
            if is_whitespace(c) {
                self.pos += 1;
                if c == '\n' {
                    self.finish_line();
                }
            } else if c == '#' {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
            } else if c == '\\' && self.peek_at(1) == Some('\n') {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    /// Called just past a newline: collect due heredoc bodies and jump over
    /// any a backtick substitution already consumed.
    pub(crate) fn finish_line(&mut self) {
        self.gather_heredoc_bodies();
        if let Some(end) = self.cmdsub_heredoc_end {
            if end > self.pos {
                self.pos = end;
                self.cmdsub_heredoc_end = None;
            }
        }
    }

    /// Cursor sits on something that closes the enclosing list.
    pub(crate) fn at_list_terminating_bracket(&self) -> bool {
        let Some(c) = self.peek() else {
            return false;
        };
        if self.eof_token == Some(c) || c == ')' {
            return true;
        }
        if c == '}' {
            return self.peek_at(1).map_or(true, is_word_end_context);
        }
        false
    }

    fn at_eof_token(&mut self) -> ParseResult<bool> {
        let token = match self.eof_token {
            Some(')') | Some('}') => self.peek_token()?,
            _ => return Ok(false),
        };
        Ok(match self.eof_token {
            Some(')') => token.kind == TokenType::RParen,
            _ => token.kind == TokenType::Word && token.value == "}",
        })
    }

    // =========================================================================
    // WORD PEEKING FOR KEYWORDS
    // =========================================================================

    /// The plain word at the cursor without consuming it. Stops at quotes.
    pub(crate) fn peek_word(&mut self) -> String {
        let saved = self.pos;
        self.skip_whitespace();
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if is_metachar(c) || c == '\'' || c == '"' {
                break;
            }
            if c == '\\' {
                match self.peek_at(1) {
                    Some('\n') => break,
                    Some(next) => {
                        word.push(c);
                        word.push(next);
                        self.pos += 2;
                        continue;
                    }
                    None => {}
                }
            }
            word.push(c);
            self.pos += 1;
        }
        self.pos = saved;
        word
    }

    /// Consume `expected` if it is the next plain word. Inside a process
    /// substitution a `}` glued to the front is accepted too.
    pub(crate) fn consume_word(&mut self, expected: &str) -> bool {
        let saved = self.pos;
        self.skip_whitespace();
        let word = self.peek_word();
        let (keyword, leading_brace) = match word.strip_prefix('}') {
            Some(rest) if self.mode.contains(ParserMode::PROCSUB) && !rest.is_empty() => (rest.to_string(), true),
            _ => (word, false),
        };
        if keyword != expected {
            self.pos = saved;
            return false;
        }
        self.skip_whitespace();
        if leading_brace {
            self.pos += 1;
        }
        self.pos += expected.chars().count();
        while self.peek() == Some('\\') && self.peek_at(1) == Some('\n') {
            self.pos += 2;
        }
        true
    }

    /// The keyword at the cursor, also looking past a glued `}` inside a
    /// process substitution.
    pub(crate) fn peek_keyword(&mut self) -> ParseResult<Option<String>> {
        let reserved = self.peek_reserved_word()?;
        if reserved.is_some() || !self.mode.contains(ParserMode::PROCSUB) {
            return Ok(reserved);
        }
        let word = self.peek_word();
        if let Some(rest) = word.strip_prefix('}') {
            if !rest.is_empty()
                && (RESERVED_WORDS.contains(rest)
                    || matches!(rest, "{" | "}" | "[[" | "]]" | "!" | "time"))
            {
                return Ok(Some(rest.to_string()));
            }
        }
        Ok(None)
    }

    fn is_bang_followed_by_procsub(&self) -> bool {
        matches!(self.peek_at(1), Some('<') | Some('>')) && self.peek_at(2) == Some('(')
    }

    // =========================================================================
    // LISTS AND PIPELINES
    // =========================================================================

    /// `&&`, `||`, `;` or `&` at the cursor, consumed.
    pub(crate) fn parse_list_operator(&mut self) -> ParseResult<Option<&'static str>> {
        self.skip_whitespace();
        let Some(token) = self.peek_operator()? else {
            return Ok(None);
        };
        let op = match token.kind {
            TokenType::AndAnd => "&&",
            TokenType::OrOr => "||",
            TokenType::Semicolon => ";",
            TokenType::Amp => "&",
            _ => return Ok(None),
        };
        self.next_token()?;
        Ok(Some(op))
    }

    fn peek_list_operator(&mut self) -> ParseResult<Option<&'static str>> {
        let saved = self.pos;
        let op = self.parse_list_operator()?;
        self.pos = saved;
        Ok(op)
    }

    /// Parse a list. With `newline_as_separator` newlines join pipelines
    /// instead of ending the list.
    pub(crate) fn parse_list(&mut self, newline_as_separator: bool) -> ParseResult<Option<Node>> {
        self.descend(|p| p.parse_list_inner(newline_as_separator))
    }

    fn parse_list_inner(&mut self, newline_as_separator: bool) -> ParseResult<Option<Node>> {
        if newline_as_separator {
            self.skip_whitespace_and_newlines();
        } else {
            self.skip_whitespace();
        }
        let Some(first) = self.parse_pipeline()? else {
            return Ok(None);
        };
        let mut parts = vec![first];
        if self.mode.contains(ParserMode::EOFTOKEN) && self.at_eof_token()? {
            return Ok(Some(AST::list(parts)));
        }
        loop {
            self.skip_whitespace();
            let op = match self.parse_list_operator()? {
                Some(op) => op,
                None if self.peek() == Some('\n') && newline_as_separator => {
                    self.pos += 1;
                    self.finish_line();
                    self.skip_whitespace_and_newlines();
                    if self.at_end() || self.at_list_terminating_bracket() {
                        break;
                    }
                    if matches!(self.peek_list_operator()?, Some("&") | Some(";")) {
                        break;
                    }
                    "\n"
                }
                None => break,
            };
            match op {
                "&&" | "||" => {
                    parts.push(AST::operator(op));
                    self.skip_whitespace_and_newlines();
                }
                "&" | ";" => {
                    let ended = self.list_ends_after_separator(newline_as_separator);
                    // a trailing `;` adds nothing, a trailing `&` still backgrounds
                    if op == "&" || !ended {
                        parts.push(AST::operator(op));
                    }
                    if ended {
                        break;
                    }
                }
                _ => parts.push(AST::operator(op)),
            }
            let Some(pipeline) = self.parse_pipeline()? else {
                return Err(self.error(format!("Expected command after {}", op)));
            };
            parts.push(pipeline);
            if self.mode.contains(ParserMode::EOFTOKEN) && self.at_eof_token()? {
                break;
            }
        }
        Ok(Some(AST::list(parts)))
    }

    /// Whether nothing follows a `;` or `&` separator in this list.
    fn list_ends_after_separator(&mut self, newline_as_separator: bool) -> bool {
        self.skip_whitespace();
        if self.at_end() || self.at_list_terminating_bracket() {
            return true;
        }
        if self.peek() == Some('\n') {
            if !newline_as_separator {
                return true;
            }
            self.skip_whitespace_and_newlines();
            return self.at_end() || self.at_list_terminating_bracket();
        }
        false
    }

    fn at_list_until_terminator(&mut self, stop_words: &[&str]) -> ParseResult<bool> {
        match self.peek() {
            None | Some(')') => return Ok(true),
            Some('}') if self.peek_at(1).map_or(true, is_word_end_context) => return Ok(true),
            _ => {}
        }
        if let Some(reserved) = self.peek_reserved_word()? {
            if stop_words.contains(&reserved.as_str()) {
                return Ok(true);
            }
        }
        Ok(self.peek_case_terminator()?.is_some())
    }

    /// Parse a list body that ends at one of `stop_words` (`fi`, `done`, ...).
    pub(crate) fn parse_list_until(&mut self, stop_words: &[&str]) -> ParseResult<Option<Node>> {
        self.descend(|p| p.parse_list_until_inner(stop_words))
    }

    fn parse_list_until_inner(&mut self, stop_words: &[&str]) -> ParseResult<Option<Node>> {
        self.skip_whitespace_and_newlines();
        if let Some(reserved) = self.peek_reserved_word()? {
            if stop_words.contains(&reserved.as_str()) {
                return Ok(None);
            }
        }
        let Some(first) = self.parse_pipeline()? else {
            return Ok(None);
        };
        let mut parts = vec![first];
        loop {
            self.skip_whitespace();
            let op = match self.parse_list_operator()? {
                Some(op) => op,
                None if self.peek() == Some('\n') => {
                    self.pos += 1;
                    self.finish_line();
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop_words)? {
                        break;
                    }
                    if matches!(self.peek_list_operator()?, Some("&") | Some(";")) {
                        break;
                    }
                    "\n"
                }
                None => break,
            };
            match op {
                ";" => {
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop_words)? {
                        break;
                    }
                    parts.push(AST::operator(op));
                }
                "&" => {
                    parts.push(AST::operator(op));
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop_words)? {
                        break;
                    }
                }
                "&&" | "||" => {
                    parts.push(AST::operator(op));
                    self.skip_whitespace_and_newlines();
                }
                _ => parts.push(AST::operator(op)),
            }
            if self.at_list_until_terminator(stop_words)? {
                break;
            }
            let Some(pipeline) = self.parse_pipeline()? else {
                return Err(self.error(format!("Expected command after {}", op)));
            };
            parts.push(pipeline);
        }
        Ok(Some(AST::list(parts)))
    }

    /// `!` at the cursor negates the following pipeline.
    fn at_negation(&self) -> bool {
        self.peek() == Some('!')
            && self.peek_at(1).map_or(true, is_negation_boundary)
            && !self.is_bang_followed_by_procsub()
    }

    /// `-p` after `time`, consumed when it stands alone.
    fn consume_time_posix_flag(&mut self) -> bool {
        if self.peek() == Some('-') && self.peek_at(1) == Some('p') {
            if self.peek_at(2).map_or(true, is_metachar) {
                self.pos += 2;
                return true;
            }
        }
        false
    }

    pub(crate) fn parse_pipeline(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if self.is_at_reserved_word("time")? {
            self.consume_reserved_word("time")?;
            let mut posix = false;
            self.skip_whitespace();
            posix |= self.consume_time_posix_flag();
            self.skip_whitespace();
            if self.lookahead_is("--") && self.peek_at(2).map_or(true, is_whitespace) {
                self.pos += 2;
                posix = true;
                self.skip_whitespace();
            }
            while self.is_at_reserved_word("time")? {
                self.consume_reserved_word("time")?;
                self.skip_whitespace();
                posix |= self.consume_time_posix_flag();
            }
            self.skip_whitespace();
            let negated = self.at_negation();
            if negated {
                self.pos += 1;
                self.skip_whitespace();
            }
            let pipeline = self.parse_simple_pipeline()?;
            let timed = Node::Time(TimeNode {
                pipeline: pipeline.map(Box::new),
                posix,
            });
            if negated {
                return Ok(Some(Node::Negation(NegationNode {
                    pipeline: Some(Box::new(timed)),
                })));
            }
            return Ok(Some(timed));
        }
        if self.at_negation() {
            self.pos += 1;
            self.skip_whitespace();
            let inner = self.parse_pipeline()?;
            // `! !cmd` cancels out
            if let Some(Node::Negation(negation)) = inner {
                return Ok(Some(match negation.pipeline {
                    Some(pipeline) => *pipeline,
                    None => AST::command(Vec::new(), Vec::new()),
                }));
            }
            return Ok(Some(Node::Negation(NegationNode {
                pipeline: inner.map(Box::new),
            })));
        }
        self.parse_simple_pipeline()
    }

    fn parse_simple_pipeline(&mut self) -> ParseResult<Option<Node>> {
        let Some(first) = self.parse_compound_command()? else {
            return Ok(None);
        };
        let mut commands = vec![first];
        loop {
            self.skip_whitespace();
            let pipe_both = match self.peek_operator()? {
                Some(token) if token.kind == TokenType::Pipe => false,
                Some(token) if token.kind == TokenType::PipeAmp => true,
                _ => break,
            };
            self.next_token()?;
            self.skip_whitespace_and_newlines();
            if pipe_both {
                commands.push(Node::PipeBoth);
            }
            let Some(command) = self.parse_compound_command()? else {
                return Err(self.error("Expected command after |"));
            };
            commands.push(command);
        }
        Ok(Some(AST::pipeline(commands)))
    }

    // =========================================================================
    // ENTRY POINTS
    // =========================================================================

    /// Parse the whole source into its top-level nodes.
    pub fn parse(&mut self) -> ParseResult<Vec<Node>> {
        log::debug!("parsing {} characters", self.source.len());
        let result = self.parse_script().map_err(|e| e.locate(&self.source));
        match &result {
            Ok(nodes) => log::debug!("parsed {} top-level nodes", nodes.len()),
            Err(e) => log::debug!("parse failed: {}", e),
        }
        result
    }

    fn parse_script(&mut self) -> ParseResult<Vec<Node>> {
        if self.source.len() > self.options.max_input_size {
            return Err(ParseException::limit(
                format!(
                    "Input too large: {} characters exceeds limit of {}",
                    self.source.len(),
                    self.options.max_input_size
                ),
                0,
            ));
        }
        if self.source.iter().all(|c| c.is_whitespace()) {
            return Ok(vec![Node::Empty]);
        }
        // leading comments and blank lines
        loop {
            self.skip_whitespace();
            while self.peek() == Some('\n') {
                self.pos += 1;
            }
            if self.at_end() || self.peek() != Some('#') {
                break;
            }
            while self.peek().is_some_and(|c| c != '\n') {
                self.pos += 1;
            }
        }
        let mut results = Vec::new();
        while !self.at_end() {
            if let Some(node) = self.parse_list(false)? {
                results.push(node);
            }
            self.skip_whitespace();
            let mut found_newline = false;
            while self.peek() == Some('\n') {
                found_newline = true;
                self.pos += 1;
                self.finish_line();
                self.skip_whitespace();
            }
            if !found_newline && !self.at_end() {
                return Err(self.error("Syntax error"));
            }
        }
        if results.is_empty() {
            return Ok(vec![Node::Empty]);
        }
        self.fill_heredocs(&mut results);
        if self.needs_trailing_backslash_fixup() && results.len() < 2 {
            strip_trailing_backslash(&mut results);
        }
        Ok(results)
    }

    /// A single-quoted string spanning lines left the final backslash glued
    /// to the last word.
    fn needs_trailing_backslash_fixup(&self) -> bool {
        let n = self.source.len();
        self.saw_newline_in_single_quote
            && self.source.last() == Some(&'\\')
            && !(n >= 3 && self.source[n - 3] == '\\' && self.source[n - 2] == '\n')
    }

    /// Copy collected heredoc bodies into the nodes that registered them.
    pub(crate) fn fill_heredocs(&self, nodes: &mut [Node]) {
        for node in nodes {
            node.for_each_heredoc_mut(&mut |heredoc| {
                if let Some(slot) = heredoc.slot.take() {
                    if let Some(content) = self.heredocs.get(slot).and_then(|r| r.content.clone()) {
                        heredoc.content = content;
                    }
                }
            });
        }
    }

    /// Parse `content` as a list with a fresh parser, as the body of a
    /// backtick or arithmetic command substitution.
    pub(crate) fn parse_nested_list(
        content: String,
        extglob: bool,
        depth: usize,
    ) -> ParseResult<Option<Node>> {
        let options = ParserOptions::with_extglob(extglob);
        if depth >= options.max_depth {
            return Err(ParseException::limit(
                format!("Maximum nesting depth of {} exceeded", options.max_depth),
                0,
            ));
        }
        let mut sub = Parser::nested(&content, options, depth);
        let Some(mut node) = sub.parse_list(true)? else {
            return Ok(None);
        };
        sub.fill_heredocs(std::slice::from_mut(&mut node));
        Ok(Some(node))
    }
}

fn strip_trailing_backslash(nodes: &mut [Node]) {
    let Some(last) = nodes.last_mut() else {
        return;
    };
    let emptied = match find_last_word(last) {
        Some(word) if word.value.ends_with('\\') => {
            word.value.pop();
            word.value.is_empty()
        }
        _ => return,
    };
    if emptied {
        if let Node::Command(command) = last {
            command.words.pop();
        }
    }
}

fn find_last_word(node: &mut Node) -> Option<&mut WordNode> {
    match node {
        Node::Command(command) => {
            if command.words.last().is_some_and(|w| w.value.ends_with('\\')) {
                return command.words.last_mut();
            }
            if let Some(Redirection::File(redirect)) = command.redirects.last_mut() {
                return Some(&mut redirect.target);
            }
            command.words.last_mut()
        }
        Node::Pipeline(pipeline) => pipeline.commands.last_mut().and_then(find_last_word),
        Node::List(list) => list.parts.last_mut().and_then(find_last_word),
        _ => None,
    }
}

/// Parse a bash script.
pub fn parse(source: &str, extglob: bool) -> ParseResult<Vec<Node>> {
    Parser::with_options(source, ParserOptions::with_extglob(extglob)).parse()
}
