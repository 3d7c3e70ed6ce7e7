//! Compound Command Parser
//!
//! Handles parsing of compound commands: if, for, while, until, case, select,
//! subshell, group, arithmetic command, coproc and function definitions.

use super::arithmetic_parser::ArithParser;
use super::lexer::RESERVED_WORDS;
use super::parser::Parser;
use super::scan_helpers::{
    assignment, is_expansion_start, is_extglob_prefix, is_metachar, is_valid_identifier,
    is_whitespace,
};
use super::state::ContextKind;
use super::types::{ParseException, ParseResult};
use crate::ast::types::{
    ArithmeticCommandNode, BraceGroupNode, CaseNode, CasePatternNode, CaseTerminator,
    CoprocNode, ForArithNode, ForNode, FunctionNode, IfNode, Node, SelectNode, SubshellNode,
    UntilNode, WhileNode,
};

/// Keywords that open a compound command usable as a coproc body.
const COMPOUND_KEYWORDS: &[&str] = &["case", "for", "if", "select", "until", "while"];

/// Reserved words that can never start a command.
const CLOSING_KEYWORDS: &[&str] = &["fi", "then", "elif", "else", "done", "esac", "do", "in"];

fn is_quote(c: char) -> bool {
    c == '\'' || c == '"'
}

impl Parser {
    /// Error located at the next token.
    fn token_error(&mut self, message: impl Into<String>) -> ParseException {
        let pos = self.peek_token().map_or(self.pos, |t| t.pos);
        ParseException::new(message, pos)
    }

    /// Parse any command at the cursor: a compound command, a function
    /// definition or a simple command.
    pub(crate) fn parse_compound_command(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };
        if self.lookahead_is("((") {
            if let Some(node) = self.parse_arithmetic_command()? {
                return Ok(Some(node));
            }
        }
        if ch == '(' {
            return self.parse_subshell();
        }
        if ch == '{' {
            if let Some(group) = self.parse_brace_group()? {
                return Ok(Some(Node::BraceGroup(group)));
            }
        }
        if self.lookahead_is("[[") {
            if let Some(node) = self.parse_conditional_expr()? {
                return Ok(Some(node));
            }
        }
        let keyword = self.peek_keyword()?;
        match keyword.as_deref() {
            Some(word) if CLOSING_KEYWORDS.contains(&word) => {
                Err(self.token_error(format!("Unexpected reserved word '{}'", word)))
            }
            Some("if") => self.parse_if(),
            Some("while") => self.parse_while(),
            Some("until") => self.parse_until(),
            Some("for") => self.parse_for(),
            Some("select") => self.parse_select(),
            Some("case") => self.parse_case(),
            Some("function") => self.parse_function(),
            Some("coproc") => self.parse_coproc(),
            _ => match self.parse_function()? {
                Some(function) => Ok(Some(function)),
                None => self.parse_command(),
            },
        }
    }

    /// The body of a function definition.
    fn parse_function_body(&mut self) -> ParseResult<Option<Node>> {
        if let Some(group) = self.parse_brace_group()? {
            return Ok(Some(Node::BraceGroup(group)));
        }
        if self.lookahead_is("((") {
            if let Some(node) = self.parse_arithmetic_command()? {
                return Ok(Some(node));
            }
        }
        if let Some(node) = self.parse_subshell()? {
            return Ok(Some(node));
        }
        if let Some(node) = self.parse_conditional_expr()? {
            return Ok(Some(node));
        }
        self.skip_whitespace();
        let keyword = self.peek_reserved_word()?;
        match keyword.as_deref() {
            Some("if") => self.parse_if(),
            Some("while") => self.parse_while(),
            Some("until") => self.parse_until(),
            Some("for") => self.parse_for(),
            Some("case") => self.parse_case(),
            Some("select") => self.parse_select(),
            _ => Ok(None),
        }
    }

    // =========================================================================
    // GROUPING
    // =========================================================================

    fn parse_subshell(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Ok(None);
        }
        self.pos += 1;
        let body = self.parse_subshell_body()?;
        Ok(Some(Node::Subshell(SubshellNode {
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        })))
    }

    fn parse_subshell_body(&mut self) -> ParseResult<Node> {
        let Some(body) = self.parse_list(true)? else {
            return Err(self.error("Expected command in subshell"));
        };
        self.skip_whitespace();
        if self.peek() != Some(')') {
            return Err(self.error("Expected ) to close subshell"));
        }
        self.pos += 1;
        Ok(body)
    }

    fn parse_brace_group(&mut self) -> ParseResult<Option<BraceGroupNode>> {
        self.skip_whitespace();
        if !self.consume_reserved_word("{")? {
            return Ok(None);
        }
        self.skip_whitespace_and_newlines();
        let Some(body) = self.parse_list(true)? else {
            return Err(self.token_error("Expected command in brace group"));
        };
        self.skip_whitespace();
        if !self.consume_reserved_word("}")? {
            return Err(self.token_error("Expected } to close brace group"));
        }
        Ok(Some(BraceGroupNode {
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        }))
    }

    /// `(( expr ))`. Returns `None` with the cursor restored when the
    /// parentheses close like two nested subshells.
    fn parse_arithmetic_command(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.lookahead_is("((") {
            return Ok(None);
        }
        let saved = self.pos;
        self.pos += 2;
        let content_start = self.pos;
        self.contexts.push(ContextKind::Arithmetic);
        let arithmetic = self.scan_arithmetic_command();
        self.contexts.pop();
        if !arithmetic {
            self.pos = saved;
            return Ok(None);
        }
        if self.at_end() {
            return Err(ParseException::unexpected_eof(
                "unexpected EOF looking for `))'",
                saved,
            ));
        }
        let raw_content = self.slice(content_start, self.pos).replace("\\\n", "");
        self.pos += 2;
        let expression =
            ArithParser::new(&raw_content, content_start, self.extglob(), self.depth).parse();
        Ok(Some(Node::ArithmeticCommand(ArithmeticCommandNode {
            expression: expression?,
            redirects: self.collect_redirects()?,
            raw_content,
        })))
    }

    /// Scan to the `))` closing a `((` command. A lone `)` that closes the
    /// outer paren means the text is a nested subshell instead.
    fn scan_arithmetic_command(&mut self) -> bool {
        self.contexts.current_mut().open_paren();
        while let Some(c) = self.peek() {
            match c {
                '\'' | '"' => self.skip_arith_quote(c),
                '\\' if self.peek_at(1).is_some() => self.pos += 2,
                '(' => {
                    self.contexts.current_mut().open_paren();
                    self.pos += 1;
                }
                ')' => {
                    if self.contexts.current().paren_depth == 1 && self.peek_at(1) == Some(')') {
                        return true;
                    }
                    if self.contexts.current_mut().close_paren() == 0 {
                        return false;
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        true
    }

    // =========================================================================
    // CONDITIONALS AND LOOPS
    // =========================================================================

    fn parse_if(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_reserved_word("if")? {
            return Ok(None);
        }
        let (condition, then_body) = self.parse_if_branch("if")?;
        let else_body = self.parse_else_branch()?;
        self.skip_whitespace_and_newlines();
        if !self.consume_reserved_word("fi")? {
            return Err(self.token_error("Expected 'fi' to close if statement"));
        }
        Ok(Some(Node::If(IfNode {
            condition: Box::new(condition),
            then_body: Box::new(then_body),
            else_body,
            redirects: self.collect_redirects()?,
        })))
    }

    /// Condition and body after `if` or `elif` (already consumed).
    fn parse_if_branch(&mut self, keyword: &str) -> ParseResult<(Node, Node)> {
        let Some(condition) = self.parse_list_until(&["then"])? else {
            return Err(self.token_error(format!("Expected condition after '{}'", keyword)));
        };
        self.skip_whitespace_and_newlines();
        if !self.consume_reserved_word("then")? {
            return Err(self.token_error(format!("Expected 'then' after {} condition", keyword)));
        }
        let Some(then_body) = self.parse_list_until(&["elif", "else", "fi"])? else {
            return Err(self.token_error("Expected commands after 'then'"));
        };
        self.skip_whitespace_and_newlines();
        Ok((condition, then_body))
    }

    /// An `elif` chain nests as `if` nodes without redirects.
    fn parse_else_branch(&mut self) -> ParseResult<Option<Box<Node>>> {
        if self.is_at_reserved_word("elif")? {
            self.consume_reserved_word("elif")?;
            let (condition, then_body) = self.parse_if_branch("elif")?;
            let else_body = self.parse_else_branch()?;
            return Ok(Some(Box::new(Node::If(IfNode {
                condition: Box::new(condition),
                then_body: Box::new(then_body),
                else_body,
                redirects: Vec::new(),
            }))));
        }
        if self.is_at_reserved_word("else")? {
            self.consume_reserved_word("else")?;
            let Some(body) = self.parse_list_until(&["fi"])? else {
                return Err(self.token_error("Expected commands after 'else'"));
            };
            return Ok(Some(Box::new(body)));
        }
        Ok(None)
    }

    fn parse_while(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_reserved_word("while")? {
            return Ok(None);
        }
        let (condition, body) = self.parse_condition_loop("while")?;
        Ok(Some(Node::While(WhileNode {
            condition: Box::new(condition),
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        })))
    }

    fn parse_until(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_reserved_word("until")? {
            return Ok(None);
        }
        let (condition, body) = self.parse_condition_loop("until")?;
        Ok(Some(Node::Until(UntilNode {
            condition: Box::new(condition),
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        })))
    }

    /// `cond; do body; done` after `while` or `until`.
    fn parse_condition_loop(&mut self, keyword: &str) -> ParseResult<(Node, Node)> {
        let Some(condition) = self.parse_list_until(&["do"])? else {
            return Err(self.token_error(format!("Expected condition after '{}'", keyword)));
        };
        self.skip_whitespace_and_newlines();
        if !self.consume_reserved_word("do")? {
            return Err(self.token_error(format!("Expected 'do' after {} condition", keyword)));
        }
        let Some(body) = self.parse_list_until(&["done"])? else {
            return Err(self.token_error("Expected commands after 'do'"));
        };
        self.skip_whitespace_and_newlines();
        if !self.consume_reserved_word("done")? {
            return Err(self.token_error(format!("Expected 'done' to close {} loop", keyword)));
        }
        Ok((condition, body))
    }

    /// `do ... done` or a brace group.
    fn parse_loop_body(&mut self, context: &str) -> ParseResult<Node> {
        if self.peek() == Some('{') {
            let Some(group) = self.parse_brace_group()? else {
                return Err(self.token_error(format!("Expected brace group body in {}", context)));
            };
            return Ok(*group.body);
        }
        if !self.consume_reserved_word("do")? {
            return Err(self.token_error(format!("Expected 'do' or '{{' in {}", context)));
        }
        let Some(body) = self.parse_list_until(&["done"])? else {
            return Err(self.token_error("Expected commands after 'do'"));
        };
        self.skip_whitespace_and_newlines();
        if !self.consume_reserved_word("done")? {
            return Err(self.token_error(format!("Expected 'done' to close {}", context)));
        }
        Ok(body)
    }

    /// The loop variable after `for` or `select`.
    fn parse_loop_variable(&mut self, keyword: &str, allow_expansion: bool) -> ParseResult<String> {
        if allow_expansion && self.peek() == Some('$') {
            return match self.parse_word(false, false, false)? {
                Some(word) => Ok(word.value),
                None => Err(self.token_error(format!("Expected variable name after '{}'", keyword))),
            };
        }
        let name = self.peek_word();
        if name.is_empty() {
            return Err(self.token_error(format!("Expected variable name after '{}'", keyword)));
        }
        self.consume_word(&name);
        Ok(name)
    }

    fn parse_for(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_reserved_word("for")? {
            return Ok(None);
        }
        self.skip_whitespace();
        if self.lookahead_is("((") {
            return self.parse_for_arith().map(Some);
        }
        let variable = self.parse_loop_variable("for", true)?;
        self.skip_whitespace();
        if self.peek() == Some(';') {
            self.pos += 1;
        }
        self.skip_whitespace_and_newlines();

        let mut words = None;
        if self.is_at_reserved_word("in")? {
            self.consume_reserved_word("in")?;
            self.skip_whitespace();
            let mut saw_delimiter = matches!(self.peek(), Some(';' | '\n'));
            if self.peek() == Some(';') {
                self.pos += 1;
            }
            self.skip_whitespace_and_newlines();
            let mut list = Vec::new();
            loop {
                self.skip_whitespace();
                let Some(c) = self.peek() else {
                    break;
                };
                if c == ';' || c == '\n' {
                    if c == ';' {
                        self.pos += 1;
                    }
                    break;
                }
                if self.is_at_reserved_word("do")? {
                    if saw_delimiter {
                        break;
                    }
                    return Err(self.token_error("Expected ';' or newline before 'do'"));
                }
                let Some(word) = self.parse_word(false, false, false)? else {
                    break;
                };
                list.push(word);
                saw_delimiter = false;
            }
            words = Some(list);
        }

        self.skip_whitespace_and_newlines();
        let body = if self.peek() == Some('{') {
            let Some(group) = self.parse_brace_group()? else {
                return Err(self.token_error("Expected brace group in for loop"));
            };
            *group.body
        } else {
            if !self.consume_reserved_word("do")? {
                return Err(self.token_error("Expected 'do' in for loop"));
            }
            let Some(body) = self.parse_list_until(&["done"])? else {
                return Err(self.token_error("Expected commands after 'do'"));
            };
            self.skip_whitespace_and_newlines();
            if !self.consume_reserved_word("done")? {
                return Err(self.token_error("Expected 'done' to close for loop"));
            }
            body
        };
        Ok(Some(Node::For(ForNode {
            variable,
            words,
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        })))
    }

    /// `for ((init; cond; incr))`; the cursor is on the first `(`.
    fn parse_for_arith(&mut self) -> ParseResult<Node> {
        self.pos += 2;
        let mut parts: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut paren_depth = 0usize;
        let mut closed = false;
        while let Some(c) = self.peek() {
            match c {
                '(' => paren_depth += 1,
                ')' if paren_depth > 0 => paren_depth -= 1,
                ')' if self.peek_at(1) == Some(')') => {
                    parts.push(current.trim_start_matches([' ', '\t']).to_string());
                    self.pos += 2;
                    closed = true;
                    break;
                }
                ';' if paren_depth == 0 => {
                    parts.push(current.trim_start_matches([' ', '\t']).to_string());
                    current.clear();
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }
            current.push(c);
            self.pos += 1;
        }
        if !closed || parts.len() != 3 {
            return Err(self.error("Expected three expressions in for ((;;))"));
        }
        let increment = parts.pop().unwrap_or_default();
        let condition = parts.pop().unwrap_or_default();
        let init = parts.pop().unwrap_or_default();
        self.skip_whitespace();
        if self.peek() == Some(';') {
            self.pos += 1;
        }
        self.skip_whitespace_and_newlines();
        let body = self.parse_loop_body("for loop")?;
        Ok(Node::ForArith(ForArithNode {
            init,
            condition,
            increment,
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        }))
    }

    fn parse_select(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_reserved_word("select")? {
            return Ok(None);
        }
        self.skip_whitespace();
        let variable = self.parse_loop_variable("select", false)?;
        self.skip_whitespace();
        if self.peek() == Some(';') {
            self.pos += 1;
        }
        self.skip_whitespace_and_newlines();
        let mut words = None;
        if self.is_at_reserved_word("in")? {
            self.consume_reserved_word("in")?;
            self.skip_whitespace_and_newlines();
            let mut list = Vec::new();
            loop {
                self.skip_whitespace();
                let Some(c) = self.peek() else {
                    break;
                };
                if matches!(c, ';' | '\n' | '{') {
                    if c == ';' {
                        self.pos += 1;
                    }
                    break;
                }
                if self.is_at_reserved_word("do")? {
                    break;
                }
                let Some(word) = self.parse_word(false, false, false)? else {
                    break;
                };
                list.push(word);
            }
            words = Some(list);
        }
        self.skip_whitespace_and_newlines();
        let body = self.parse_loop_body("select")?;
        Ok(Some(Node::Select(SelectNode {
            variable,
            words,
            body: Box::new(body),
            redirects: self.collect_redirects()?,
        })))
    }

    // =========================================================================
    // CASE
    // =========================================================================

    fn parse_case(&mut self) -> ParseResult<Option<Node>> {
        if !self.consume_word("case") {
            return Ok(None);
        }
        self.skip_whitespace();
        let Some(word) = self.parse_word(false, false, false)? else {
            return Err(self.token_error("Expected word after 'case'"));
        };
        self.skip_whitespace_and_newlines();
        if !self.consume_reserved_word("in")? {
            return Err(self.token_error("Expected 'in' after case word"));
        }
        self.skip_whitespace_and_newlines();

        let patterns = self.parse_case_clauses()?;

        self.skip_whitespace_and_newlines();
        if !self.consume_reserved_word("esac")? {
            return Err(self.token_error("Expected 'esac' to close case statement"));
        }
        Ok(Some(Node::Case(CaseNode {
            word,
            patterns,
            redirects: self.collect_redirects()?,
        })))
    }

    fn parse_case_clauses(&mut self) -> ParseResult<Vec<CasePatternNode>> {
        let mut patterns = Vec::new();
        loop {
            self.skip_whitespace_and_newlines();
            if self.is_at_reserved_word("esac")? && !self.esac_is_pattern() {
                break;
            }
            self.skip_whitespace_and_newlines();
            if self.peek() == Some('(') {
                self.pos += 1;
                self.skip_whitespace_and_newlines();
            }
            let pattern = self.read_case_pattern();
            if pattern.is_empty() {
                return Err(self.token_error("Expected pattern in case statement"));
            }

            self.skip_whitespace();
            let mut body = None;
            if self.peek_case_terminator()?.is_none() {
                self.skip_whitespace_and_newlines();
                if !self.at_end()
                    && !self.is_at_reserved_word("esac")?
                    && self.peek_case_terminator()?.is_none()
                {
                    body = self.parse_list_until(&["esac"])?.map(Box::new);
                    self.skip_whitespace();
                }
            }
            let terminator = match self.peek_case_terminator()? {
                Some(terminator) => {
                    self.next_token()?;
                    terminator
                }
                None => CaseTerminator::DoubleSemi,
            };
            self.skip_whitespace_and_newlines();
            patterns.push(CasePatternNode {
                pattern,
                body,
                terminator,
            });
        }
        Ok(patterns)
    }

    /// `esac` at the cursor starts a pattern such as `esac)` rather than
    /// closing the statement.
    fn esac_is_pattern(&mut self) -> bool {
        let saved = self.pos;
        self.skip_whitespace();
        while self.peek().is_some_and(|c| !is_metachar(c) && !is_quote(c)) {
            self.pos += 1;
        }
        self.skip_whitespace();
        let mut is_pattern = false;
        if self.peek() == Some(')') && self.eof_token != Some(')') {
            self.pos += 1;
            self.skip_whitespace();
            is_pattern = match self.peek() {
                Some(';') => true,
                Some('\n' | ')') | None => false,
                Some(_) => true,
            };
        }
        self.pos = saved;
        is_pattern
    }

    /// Pattern text up to the closing `)`, with unquoted blanks dropped.
    fn read_case_pattern(&mut self) -> String {
        self.contexts.push(ContextKind::CasePattern);
        let pattern = self.scan_case_pattern();
        self.contexts.pop();
        pattern
    }

    /// Parens opened by extglob groups and `$(` are counted on the
    /// case-pattern context; the pattern ends at a `)` at depth zero.
    fn scan_case_pattern(&mut self) -> String {
        let mut pattern = String::new();
        while let Some(ch) = self.peek() {
            match ch {
                ')' => {
                    self.pos += 1;
                    if self.contexts.current().paren_depth == 0 {
                        break;
                    }
                    pattern.push(ch);
                    self.contexts.current_mut().close_paren();
                }
                '\\' if self.peek_at(1) == Some('\n') => self.pos += 2,
                '\\' => {
                    pattern.push(ch);
                    self.pos += 1;
                    if let Some(next) = self.advance() {
                        pattern.push(next);
                    }
                }
                '$' if is_expansion_start(&self.source, self.pos, "$(") => {
                    pattern.push_str("$(");
                    self.pos += 2;
                    if self.peek() == Some('(') {
                        // `$((...))` is copied whole
                        let mut depth = 2usize;
                        while depth > 0 {
                            let Some(c) = self.advance() else {
                                break;
                            };
                            match c {
                                '(' => depth += 1,
                                ')' => depth -= 1,
                                _ => {}
                            }
                            pattern.push(c);
                        }
                    } else {
                        self.contexts.current_mut().open_paren();
                    }
                }
                '(' if self.contexts.current().paren_depth > 0 => {
                    pattern.push(ch);
                    self.pos += 1;
                    self.contexts.current_mut().open_paren();
                }
                _ if self.extglob() && is_extglob_prefix(ch) && self.peek_at(1) == Some('(') => {
                    pattern.push(ch);
                    pattern.push('(');
                    self.pos += 2;
                    self.contexts.current_mut().open_paren();
                }
                '[' => self.read_case_bracket(&mut pattern),
                '\'' => {
                    pattern.push(ch);
                    self.pos += 1;
                    while let Some(c) = self.peek().filter(|&c| c != '\'') {
                        pattern.push(c);
                        self.pos += 1;
                    }
                    if let Some(c) = self.advance() {
                        pattern.push(c);
                    }
                }
                '"' => {
                    pattern.push(ch);
                    self.pos += 1;
                    while let Some(c) = self.peek().filter(|&c| c != '"') {
                        if c == '\\' && self.peek_at(1).is_some() {
                            pattern.push(c);
                            self.pos += 1;
                        }
                        if let Some(c) = self.advance() {
                            pattern.push(c);
                        }
                    }
                    if let Some(c) = self.advance() {
                        pattern.push(c);
                    }
                }
                _ if is_whitespace(ch) => {
                    if self.contexts.current().paren_depth > 0 {
                        pattern.push(ch);
                    }
                    self.pos += 1;
                }
                _ => {
                    pattern.push(ch);
                    self.pos += 1;
                }
            }
        }
        pattern
    }

    /// A `[` in a case pattern: copy a whole bracket expression when one
    /// closes before the pattern ends, otherwise just the `[`.
    fn read_case_bracket(&mut self, pattern: &mut String) {
        let mut scan = self.pos + 1;
        let at = |i: usize| self.source.get(i).copied();
        if matches!(at(scan), Some('^' | '!')) {
            scan += 1;
        }
        let first_is_literal = at(scan) == Some(']');
        if first_is_literal {
            scan += 1;
        }
        let mut depth = 0usize;
        let mut is_class = false;
        while let Some(c) = at(scan) {
            match c {
                ']' if depth == 0 => {
                    is_class = true;
                    break;
                }
                '[' => depth += 1,
                ')' | '|' if depth == 0 => break,
                _ => {}
            }
            scan += 1;
        }
        pattern.push('[');
        self.pos += 1;
        if !is_class {
            return;
        }
        if let Some(c) = self.peek().filter(|&c| c == '^' || c == '!') {
            pattern.push(c);
            self.pos += 1;
        }
        if first_is_literal && self.peek() == Some(']') {
            pattern.push(']');
            self.pos += 1;
        }
        while let Some(c) = self.peek().filter(|&c| c != ']') {
            pattern.push(c);
            self.pos += 1;
        }
        if let Some(c) = self.advance() {
            pattern.push(c);
        }
    }

    // =========================================================================
    // COPROC AND FUNCTIONS
    // =========================================================================

    fn parse_coproc(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.consume_reserved_word("coproc")? {
            return Ok(None);
        }
        self.skip_whitespace();
        if let Some(command) = self.parse_coproc_compound()? {
            return Ok(Some(coproc(command, None)));
        }

        let word_start = self.pos;
        let name = self.peek_word();
        if !name.is_empty() {
            while self.peek().is_some_and(|c| !is_metachar(c) && !is_quote(c)) {
                self.pos += 1;
            }
            self.skip_whitespace();
            if is_valid_identifier(&name) {
                if let Some(command) = self.parse_coproc_compound()? {
                    return Ok(Some(coproc(command, Some(name))));
                }
            }
            self.pos = word_start;
        }
        match self.parse_command()? {
            Some(command) => Ok(Some(coproc(command, None))),
            None => Err(self.error("Expected command after coproc")),
        }
    }

    /// A group, subshell, arithmetic command or keyword compound command.
    fn parse_coproc_compound(&mut self) -> ParseResult<Option<Node>> {
        match self.peek() {
            Some('{') => {
                if let Some(group) = self.parse_brace_group()? {
                    return Ok(Some(Node::BraceGroup(group)));
                }
            }
            Some('(') => {
                if self.peek_at(1) == Some('(') {
                    if let Some(node) = self.parse_arithmetic_command()? {
                        return Ok(Some(node));
                    }
                }
                return self.parse_subshell();
            }
            _ => {}
        }
        let keyword = self.peek_reserved_word()?;
        if keyword.is_some_and(|k| COMPOUND_KEYWORDS.contains(&k.as_str())) {
            return self.parse_compound_command();
        }
        Ok(None)
    }

    /// `function name [()] body` or `name () body`. Returns `None` with the
    /// cursor restored when the text is not a function definition.
    fn parse_function(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        let saved = self.pos;
        if self.is_at_reserved_word("function")? {
            self.consume_reserved_word("function")?;
            self.skip_whitespace();
            let name = self.peek_word();
            if name.is_empty() {
                self.pos = saved;
                return Ok(None);
            }
            self.consume_word(&name);
            self.skip_whitespace();
            if self.lookahead_is("()") {
                self.pos += 2;
            }
            self.skip_whitespace_and_newlines();
            return self.finish_function(name).map(Some);
        }

        let name = self.peek_word();
        if name.is_empty() || RESERVED_WORDS.contains(name.as_str()) || assignment(&name).is_some() {
            return Ok(None);
        }
        self.skip_whitespace();
        let name_start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !is_metachar(c) && !is_quote(c) && c != '(' && c != ')')
        {
            self.pos += 1;
        }
        let name = self.slice(name_start, self.pos);
        if name.is_empty() || has_open_brace_expansion(&name) {
            self.pos = saved;
            return Ok(None);
        }
        let after_name = self.pos;
        self.skip_whitespace();
        let glued = self.pos == after_name;
        // `@(...)` and friends are extglob words, `$(` a substitution
        if glued && name.ends_with(['*', '?', '@', '+', '!', '$']) {
            self.pos = saved;
            return Ok(None);
        }
        if self.peek() != Some('(') {
            self.pos = saved;
            return Ok(None);
        }
        self.pos += 1;
        self.skip_whitespace();
        if self.peek() != Some(')') {
            self.pos = saved;
            return Ok(None);
        }
        self.pos += 1;
        self.skip_whitespace_and_newlines();
        self.finish_function(name).map(Some)
    }

    fn finish_function(&mut self, name: String) -> ParseResult<Node> {
        let Some(body) = self.descend(|p| p.parse_function_body())? else {
            return Err(self.error("Expected function body"));
        };
        log::trace!("function definition '{}'", name);
        Ok(Node::Function(FunctionNode {
            name,
            body: Box::new(body),
        }))
    }
}

fn coproc(command: Node, name: Option<String>) -> Node {
    Node::Coproc(CoprocNode {
        command: Box::new(command),
        name,
    })
}

/// The name contains a `${` that is not closed inside it.
fn has_open_brace_expansion(name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    let mut depth = 0isize;
    let mut i = 0;
    while i < chars.len() {
        if is_expansion_start(&chars, i, "${") {
            depth += 1;
            i += 2;
            continue;
        }
        if chars[i] == '}' {
            depth -= 1;
        }
        i += 1;
    }
    depth > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{ArithExpr, Redirection};
    use crate::parser::types::ParserOptions;

    fn parse_one(input: &str) -> Node {
        let mut parser = Parser::new(input, ParserOptions::default());
        let Some(node) = parser.parse_compound_command().unwrap() else {
            panic!("Expected a command for {:?}", input);
        };
        node
    }

    fn parse_err(input: &str) -> String {
        let mut parser = Parser::new(input, ParserOptions::default());
        parser.parse_compound_command().unwrap_err().message
    }

    fn words(node: &Node) -> Vec<String> {
        let Node::Command(command) = node else {
            panic!("Expected command, got {}", node.kind());
        };
        command.words.iter().map(|w| w.value.clone()).collect()
    }

    #[test]
    fn test_if_elif_else_chain() {
        let Node::If(node) = parse_one("if a; then b; elif c; then d; else e; fi") else {
            panic!("Expected if");
        };
        assert_eq!(words(&node.condition), vec!["a"]);
        let Some(else_body) = node.else_body else {
            panic!("Expected elif branch");
        };
        let Node::If(elif) = *else_body else {
            panic!("Expected nested if");
        };
        assert_eq!(words(&elif.condition), vec!["c"]);
        assert!(elif.redirects.is_empty());
        assert_eq!(words(elif.else_body.as_deref().unwrap()), vec!["e"]);
    }

    #[test]
    fn test_if_missing_fi() {
        assert_eq!(parse_err("if a; then b;"), "Expected 'fi' to close if statement");
    }

    #[test]
    fn test_while_with_redirect() {
        let Node::While(node) = parse_one("while read l; do echo $l; done < input") else {
            panic!("Expected while");
        };
        assert_eq!(words(&node.condition), vec!["read", "l"]);
        assert_eq!(node.redirects.len(), 1);
    }

    #[test]
    fn test_until_loop() {
        assert!(matches!(parse_one("until false; do :; done"), Node::Until(_)));
    }

    #[test]
    fn test_for_in_words() {
        let Node::For(node) = parse_one("for x in a b c; do echo $x; done") else {
            panic!("Expected for");
        };
        assert_eq!(node.variable, "x");
        let values: Vec<String> = node.words.unwrap().iter().map(|w| w.value.clone()).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_for_without_in() {
        let Node::For(node) = parse_one("for x\ndo echo; done") else {
            panic!("Expected for");
        };
        assert!(node.words.is_none());
    }

    #[test]
    fn test_for_with_brace_body() {
        let Node::For(node) = parse_one("for x in a; { echo; }") else {
            panic!("Expected for");
        };
        assert_eq!(words(&node.body), vec!["echo"]);
    }

    #[test]
    fn test_for_arith() {
        let Node::ForArith(node) = parse_one("for ((i = 0; i < 3; i++)); do echo; done") else {
            panic!("Expected for-arith");
        };
        assert_eq!(node.init, "i = 0");
        assert_eq!(node.condition, "i < 3");
        assert_eq!(node.increment, "i++");
    }

    #[test]
    fn test_for_arith_wrong_clause_count() {
        assert_eq!(
            parse_err("for ((i = 0; i++)); do :; done"),
            "Expected three expressions in for ((;;))"
        );
    }

    #[test]
    fn test_select() {
        let Node::Select(node) = parse_one("select opt in a b\ndo break; done") else {
            panic!("Expected select");
        };
        assert_eq!(node.variable, "opt");
        assert_eq!(node.words.map(|w| w.len()), Some(2));
    }

    #[test]
    fn test_case_clauses() {
        let Node::Case(node) = parse_one("case $x in\n a|b) echo hi;;\n (c) ;&\n *) ;;& esac") else {
            panic!("Expected case");
        };
        assert_eq!(node.word.value, "$x");
        let summary: Vec<(&str, bool, CaseTerminator)> = node
            .patterns
            .iter()
            .map(|p| (p.pattern.as_str(), p.body.is_some(), p.terminator))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a|b", true, CaseTerminator::DoubleSemi),
                ("c", false, CaseTerminator::SemiAnd),
                ("*", false, CaseTerminator::SemiSemiAnd),
            ]
        );
    }

    #[test]
    fn test_case_pattern_bracket_and_quotes() {
        let Node::Case(node) = parse_one("case x in []a]|'a b') ;; esac") else {
            panic!("Expected case");
        };
        assert_eq!(node.patterns[0].pattern, "[]a]|'a b'");
    }

    #[test]
    fn test_case_esac_as_pattern() {
        let Node::Case(node) = parse_one("case x in esac) echo;; esac") else {
            panic!("Expected case");
        };
        assert_eq!(node.patterns[0].pattern, "esac");
    }

    #[test]
    fn test_case_extglob_pattern() {
        let mut parser = Parser::new("case x in @(a|b)) ;; esac", ParserOptions::with_extglob(true));
        let Some(Node::Case(node)) = parser.parse_compound_command().unwrap() else {
            panic!("Expected case");
        };
        assert_eq!(node.patterns[0].pattern, "@(a|b)");
    }

    #[test]
    fn test_case_pattern_nested_groups() {
        let mut parser = Parser::new(
            "case x in @(a|+(b|c)) | $(echo (d))) ;; esac",
            ParserOptions::with_extglob(true),
        );
        let Some(Node::Case(node)) = parser.parse_compound_command().unwrap() else {
            panic!("Expected case");
        };
        assert_eq!(node.patterns[0].pattern, "@(a|+(b|c))|$(echo (d))");
        assert_eq!(parser.contexts.depth(), 1);
        assert_eq!(parser.contexts.current().paren_depth, 0);
    }

    #[test]
    fn test_arithmetic_command_restores_context() {
        let mut parser = Parser::new("(( (a) + (b) ))", ParserOptions::default());
        assert!(matches!(
            parser.parse_compound_command().unwrap(),
            Some(Node::ArithmeticCommand(_))
        ));
        assert_eq!(parser.contexts.depth(), 1);

        let mut parser = Parser::new("((a) )", ParserOptions::default());
        assert!(matches!(parser.parse_compound_command().unwrap(), Some(Node::Subshell(_))));
        assert_eq!(parser.contexts.depth(), 1);
    }

    #[test]
    fn test_subshell_and_group() {
        let Node::Subshell(sub) = parse_one("(cd /tmp; ls) >out") else {
            panic!("Expected subshell");
        };
        assert!(matches!(*sub.body, Node::List(_)));
        assert!(matches!(sub.redirects[0], Redirection::File(_)));
        assert!(matches!(parse_one("{ ls; }"), Node::BraceGroup(_)));
    }

    #[test]
    fn test_unclosed_group() {
        assert_eq!(parse_err("{ ls;"), "Expected } to close brace group");
        assert_eq!(parse_err("(ls"), "Expected ) to close subshell");
    }

    #[test]
    fn test_arithmetic_command() {
        let Node::ArithmeticCommand(node) = parse_one("(( x += 1 ))") else {
            panic!("Expected arithmetic command");
        };
        assert_eq!(node.raw_content, " x += 1 ");
        assert!(matches!(node.expression, ArithExpr::Assign { .. }));
    }

    #[test]
    fn test_nested_subshells_not_arithmetic() {
        let Node::Subshell(outer) = parse_one("((ls) )") else {
            panic!("Expected subshell");
        };
        assert!(matches!(*outer.body, Node::Subshell(_)));
    }

    #[test]
    fn test_unterminated_arithmetic_command() {
        let mut parser = Parser::new("(( 1 + 2", ParserOptions::default());
        let err = parser.parse_compound_command().unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[test]
    fn test_function_forms() {
        let Node::Function(f) = parse_one("greet() { echo hi; }") else {
            panic!("Expected function");
        };
        assert_eq!(f.name, "greet");
        assert!(matches!(*f.body, Node::BraceGroup(_)));
        let Node::Function(f) = parse_one("function build\n{ make; }") else {
            panic!("Expected function");
        };
        assert_eq!(f.name, "build");
        let Node::Function(f) = parse_one("function t() ( exit 1 )") else {
            panic!("Expected function");
        };
        assert!(matches!(*f.body, Node::Subshell(_)));
    }

    #[test]
    fn test_function_without_body() {
        assert_eq!(parse_err("f() echo"), "Expected function body");
    }

    #[test]
    fn test_assignment_is_not_function() {
        assert!(matches!(parse_one("x=(1 2)"), Node::Command(_)));
    }

    #[test]
    fn test_coproc_forms() {
        let Node::Coproc(c) = parse_one("coproc worker { cat; }") else {
            panic!("Expected coproc");
        };
        assert_eq!(c.name.as_deref(), Some("worker"));
        let Node::Coproc(c) = parse_one("coproc cat file") else {
            panic!("Expected coproc");
        };
        assert_eq!(c.name, None);
        assert_eq!(words(&c.command), vec!["cat", "file"]);
    }

    #[test]
    fn test_reserved_word_out_of_place() {
        assert_eq!(parse_err("done"), "Unexpected reserved word 'done'");
    }

    #[test]
    fn test_open_brace_expansion_in_name() {
        assert!(has_open_brace_expansion("a${b"));
        assert!(!has_open_brace_expansion("a${b}"));
    }
}
