//! Heredoc Handling
//!
//! `<<` and `<<-` register a record when the operator is parsed. The body is
//! read later, once the parser steps over the newline that ends the line
//! holding the operator; several heredocs on one line are read in order.

use super::parser::Parser;
use super::scan_helpers::{
    ansi_c_escape, count_trailing_backslashes, is_expansion_start, is_metachar, is_redirect_char,
    normalize_heredoc_delimiter,
};
use super::state::ParserMode;
use crate::ast::types::HereDocNode;

/// A registered heredoc and, once read, its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeredocRecord {
    /// Cursor position right after the operator
    pub start_pos: usize,
    pub delimiter: String,
    pub strip_tabs: bool,
    pub quoted: bool,
    pub fd: Option<i32>,
    pub content: Option<String>,
}

impl HeredocRecord {
    fn node(&self, slot: usize) -> HereDocNode {
        HereDocNode {
            delimiter: self.delimiter.clone(),
            content: self.content.clone().unwrap_or_default(),
            strip_tabs: self.strip_tabs,
            quoted: self.quoted,
            fd: self.fd,
            slot: Some(slot),
        }
    }
}

impl Parser {
    /// Parse the heredoc word after `<<`/`<<-` and register it.
    pub(crate) fn parse_heredoc(&mut self, fd: Option<i32>, strip_tabs: bool) -> HereDocNode {
        let start_pos = self.pos;
        let (delimiter, quoted) = self.parse_heredoc_delimiter();
        for &slot in &self.pending_heredocs {
            let existing = &self.heredocs[slot];
            if existing.start_pos == start_pos && existing.delimiter == delimiter {
                return existing.node(slot);
            }
        }
        let record = HeredocRecord {
            start_pos,
            delimiter,
            strip_tabs,
            quoted,
            fd,
            content: None,
        };
        let slot = self.heredocs.len();
        let node = record.node(slot);
        self.heredocs.push(record);
        self.pending_heredocs.push(slot);
        node
    }

    /// Read the delimiter word. Returns it with quoting removed and whether
    /// any part of it was quoted.
    fn parse_heredoc_delimiter(&mut self) -> (String, bool) {
        self.skip_whitespace();
        let mut quoted = false;
        let mut out = String::new();
        loop {
            while let Some(ch) = self.peek() {
                if is_metachar(ch) {
                    break;
                }
                match ch {
                    '"' => {
                        quoted = true;
                        self.pos += 1;
                        while let Some(c) = self.peek().filter(|&c| c != '"') {
                            out.push(c);
                            self.pos += 1;
                        }
                        self.advance();
                    }
                    '\'' => {
                        quoted = true;
                        self.pos += 1;
                        while let Some(c) = self.peek().filter(|&c| c != '\'') {
                            if c == '\n' {
                                self.saw_newline_in_single_quote = true;
                            }
                            out.push(c);
                            self.pos += 1;
                        }
                        self.advance();
                    }
                    '\\' => {
                        self.pos += 1;
                        match self.advance() {
                            Some('\n') | None => {}
                            Some(c) => {
                                quoted = true;
                                out.push(c);
                            }
                        }
                    }
                    '$' if self.peek_at(1) == Some('\'') => {
                        quoted = true;
                        self.pos += 2;
                        self.read_ansi_delimiter(&mut out);
                    }
                    '$' if is_expansion_start(&self.source, self.pos, "$(") => {
                        out.push_str("$(");
                        self.pos += 2;
                        self.copy_balanced(&mut out, '(', ')', 1);
                    }
                    '$' if self.peek_at(1) == Some('{') => {
                        if self.escaped_dollar_parity() {
                            out.push('$');
                            self.pos += 1;
                        } else {
                            out.push_str("${");
                            self.pos += 2;
                            self.copy_braced_delimiter(&mut out);
                        }
                    }
                    '$' if self.peek_at(1) == Some('[') => {
                        if self.escaped_dollar_parity() {
                            out.push('$');
                            self.pos += 1;
                        } else {
                            out.push_str("$[");
                            self.pos += 2;
                            self.copy_balanced(&mut out, '[', ']', 1);
                        }
                    }
                    '`' => self.copy_backtick_delimiter(&mut out),
                    _ => {
                        out.push(ch);
                        self.pos += 1;
                    }
                }
            }
            // a process substitution glued to the word is part of it
            if self.peek().is_some_and(is_redirect_char) && self.peek_at(1) == Some('(') {
                out.extend(self.source[self.pos..self.pos + 2].iter());
                self.pos += 2;
                self.copy_balanced(&mut out, '(', ')', 1);
                continue;
            }
            break;
        }
        (out, quoted)
    }

    /// Odd number of `$` before the cursor once a preceding backslash is
    /// discounted: this `$` is the second half of `$$`.
    fn escaped_dollar_parity(&self) -> bool {
        let mut count = 0i64;
        let mut j = self.pos;
        while j > 0 && self.source[j - 1] == '$' {
            count += 1;
            j -= 1;
        }
        if j > 0 && self.source[j - 1] == '\\' {
            count -= 1;
        }
        count % 2 == 1
    }

    fn read_ansi_delimiter(&mut self, out: &mut String) {
        while let Some(c) = self.peek().filter(|&c| c != '\'') {
            if c == '\\' && self.peek_at(1).is_some() {
                self.pos += 1;
                let Some(esc) = self.advance() else {
                    break;
                };
                match ansi_c_escape(esc) {
                    Some(byte) => out.push(char::from(byte)),
                    None => out.push(esc),
                }
            } else {
                out.push(c);
                self.pos += 1;
            }
        }
        self.advance();
    }

    /// Copy characters until `depth` returns to zero.
    fn copy_balanced(&mut self, out: &mut String, open: char, close: char, mut depth: usize) {
        while depth > 0 {
            let Some(c) = self.advance() else {
                break;
            };
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
            }
            out.push(c);
        }
    }

    fn copy_braced_delimiter(&mut self, out: &mut String) {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            if c == '{' {
                depth += 1;
            } else if c == '}' {
                out.push(c);
                self.pos += 1;
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 && self.peek().is_some_and(is_metachar) {
                    break;
                }
                continue;
            }
            out.push(c);
            self.pos += 1;
        }
    }

    fn copy_backtick_delimiter(&mut self, out: &mut String) {
        out.push('`');
        self.pos += 1;
        while let Some(c) = self.peek().filter(|&c| c != '`') {
            match c {
                '\'' => {
                    out.push(c);
                    self.pos += 1;
                    while let Some(q) = self.peek().filter(|&q| q != '\'' && q != '`') {
                        out.push(q);
                        self.pos += 1;
                    }
                    if self.peek() == Some('\'') {
                        out.push('\'');
                        self.pos += 1;
                    }
                }
                '"' => {
                    out.push(c);
                    self.pos += 1;
                    while let Some(q) = self.peek().filter(|&q| q != '"' && q != '`') {
                        if q == '\\' && self.peek_at(1).is_some() {
                            out.push(q);
                            self.pos += 1;
                        }
                        if let Some(next) = self.advance() {
                            out.push(next);
                        }
                    }
                    if self.peek() == Some('"') {
                        out.push('"');
                        self.pos += 1;
                    }
                }
                '\\' if self.peek_at(1).is_some() => {
                    out.extend(self.source[self.pos..self.pos + 2].iter());
                    self.pos += 2;
                }
                _ => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        if let Some(c) = self.advance() {
            out.push(c);
        }
    }

    /// One body line starting at the cursor, joining backslash-continued
    /// lines unless the delimiter was quoted. Returns the line and the
    /// position of the newline (or end of input) that ends it.
    fn read_heredoc_line(&self, quoted: bool) -> (String, usize) {
        let n = self.source.len();
        let mut line_end = self.pos;
        while line_end < n && self.source[line_end] != '\n' {
            line_end += 1;
        }
        let mut line = self.slice(self.pos, line_end);
        if !quoted {
            while line_end < n && count_trailing_backslashes(&line) % 2 == 1 {
                line.pop();
                line_end += 1;
                let next_start = line_end;
                while line_end < n && self.source[line_end] != '\n' {
                    line_end += 1;
                }
                line.push_str(&self.slice(next_start, line_end));
            }
        }
        (line, line_end)
    }

    /// Read the bodies of every pending heredoc, in registration order.
    pub(crate) fn gather_heredoc_bodies(&mut self) {
        let pending = std::mem::take(&mut self.pending_heredocs);
        let n = self.source.len();
        for slot in pending {
            let (delimiter, strip_tabs, quoted) = {
                let record = &self.heredocs[slot];
                (record.delimiter.clone(), record.strip_tabs, record.quoted)
            };
            let normalized_delim = normalize_heredoc_delimiter(&delimiter);
            let delim_len = delimiter.chars().count();
            let mut content = String::new();
            while self.pos < n {
                let line_start = self.pos;
                let (line, line_end) = self.read_heredoc_line(quoted);
                let check_line = if strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                let normalized_check = normalize_heredoc_delimiter(check_line);
                if normalized_check == normalized_delim {
                    self.pos = if line_end < n { line_end + 1 } else { line_end };
                    break;
                }
                let tabs = line.chars().count() - check_line.chars().count();
                // the closing `)` of a command substitution may share the
                // delimiter line, as may the end of a process substitution
                let prefix_match = normalized_check.starts_with(&normalized_delim);
                let procsub_end = line_end >= n && self.mode.contains(ParserMode::PROCSUB);
                if prefix_match && (self.eof_token == Some(')') || procsub_end) {
                    self.pos = line_start + tabs + delim_len;
                    break;
                }
                content.push_str(check_line);
                if line_end < n {
                    content.push('\n');
                    self.pos = line_end + 1;
                } else {
                    if quoted || count_trailing_backslashes(&line) % 2 == 0 {
                        content.push('\n');
                    }
                    self.pos = n;
                }
            }
            log::trace!(
                "heredoc {:?} collected {} characters",
                delimiter,
                content.chars().count()
            );
            self.heredocs[slot].content = Some(content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParserOptions;

    fn parser_at(input: &str, pos: usize) -> Parser {
        let mut parser = Parser::new(input, ParserOptions::default());
        parser.pos = pos;
        parser
    }

    #[test]
    fn test_delimiter_quoting() {
        let mut p = parser_at("'EOF'", 0);
        assert_eq!(p.parse_heredoc_delimiter(), ("EOF".to_string(), true));
        let mut p = parser_at("E\"O\"F rest", 0);
        assert_eq!(p.parse_heredoc_delimiter(), ("EOF".to_string(), true));
        let mut p = parser_at("\\EOF", 0);
        assert_eq!(p.parse_heredoc_delimiter(), ("EOF".to_string(), true));
        let mut p = parser_at("EOF;", 0);
        assert_eq!(p.parse_heredoc_delimiter(), ("EOF".to_string(), false));
        assert_eq!(p.peek(), Some(';'));
    }

    #[test]
    fn test_delimiter_with_expansions() {
        let mut p = parser_at("$(echo x)", 0);
        assert_eq!(p.parse_heredoc_delimiter().0, "$(echo x)");
        let mut p = parser_at("a$'\\t'b", 0);
        assert_eq!(p.parse_heredoc_delimiter(), ("a\tb".to_string(), true));
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut p = parser_at("EOF\nbody\nEOF\n", 0);
        let first = p.parse_heredoc(None, false);
        p.pos = 0;
        let second = p.parse_heredoc(None, false);
        assert_eq!(first.slot, second.slot);
        assert_eq!(p.pending_heredocs.len(), 1);
    }

    #[test]
    fn test_gather_strip_tabs() {
        let mut p = parser_at("EOF\n\tone\n\t\ttwo\n\tEOF\nnext", 0);
        p.parse_heredoc(Some(3), true);
        p.pos = 4;
        p.gather_heredoc_bodies();
        assert_eq!(p.heredocs[0].content.as_deref(), Some("one\ntwo\n"));
        assert_eq!(p.heredocs[0].fd, Some(3));
        assert_eq!(p.slice(p.pos, p.source.len()), "next");
        assert!(p.pending_heredocs.is_empty());
    }

    #[test]
    fn test_gather_two_heredocs_in_order() {
        let mut p = parser_at("A B\n1\nA\n2\nB\n", 0);
        p.parse_heredoc(None, false);
        p.skip_whitespace();
        p.parse_heredoc(None, false);
        p.pos = 4;
        p.gather_heredoc_bodies();
        assert_eq!(p.heredocs[0].content.as_deref(), Some("1\n"));
        assert_eq!(p.heredocs[1].content.as_deref(), Some("2\n"));
    }

    #[test]
    fn test_continuation_joins_unquoted_lines() {
        let mut p = parser_at("E\na\\\nb\nE\n", 0);
        p.parse_heredoc(None, false);
        p.pos = 2;
        p.gather_heredoc_bodies();
        assert_eq!(p.heredocs[0].content.as_deref(), Some("ab\n"));

        let mut p = parser_at("'E'\na\\\nb\nE\n", 0);
        p.parse_heredoc(None, false);
        p.pos = 4;
        p.gather_heredoc_bodies();
        assert_eq!(p.heredocs[0].content.as_deref(), Some("a\\\nb\n"));
    }

    #[test]
    fn test_unterminated_body_runs_to_end() {
        let mut p = parser_at("E\nline", 0);
        p.parse_heredoc(None, false);
        p.pos = 2;
        p.gather_heredoc_bodies();
        assert_eq!(p.heredocs[0].content.as_deref(), Some("line\n"));
        assert!(p.at_end());
    }
}
