//! Command and Process Substitution Parsing
//!
//! `$(...)`, `${ ...; }` and `<(...)` are parsed in place: the shared cursor
//! descends into a nested list whose end is marked by an end-of-input token,
//! then the saved state is put back. Backtick bodies are unescaped first and
//! handed to a fresh parser.

use super::expansion_parser::Parsed;
use super::parser::Parser;
use super::scan_helpers::{
    find_heredoc_content_end, is_blank, is_escape_char_in_backtick, is_metachar, is_whitespace,
    strip_line_continuations_comment_aware,
};
use super::state::{Checkpoint, ContextKind, PairFlags, ParserMode, WordContext};
use super::types::{ErrorKind, ParseException, ParseResult};
use crate::ast::types::{Expansion, Node, ProcessDirection, ProcessSubstitutionNode, AST};

/// State to put back when leaving a nested list.
pub(crate) struct NestedList {
    checkpoint: Checkpoint,
    word_context: WordContext,
    word_flags: (bool, bool, bool),
}

/// Whether `$((` at `start` opens a command substitution holding a subshell
/// rather than an arithmetic expansion: the inner group closes and is
/// followed by more text, or a pipeline operator appears between groups.
pub(crate) fn is_dollar_dparen_subshell(s: &[char], start: usize) -> bool {
    let at = |i: usize| s.get(i).copied();
    let mut pos = start + 3;
    let mut depth = 2usize;
    let mut single = false;
    let mut double = false;
    while let Some(c) = at(pos) {
        if single {
            single = c != '\'';
            pos += 1;
            continue;
        }
        if double {
            if c == '\\' {
                pos += 2;
                continue;
            }
            double = c != '"';
            pos += 1;
            continue;
        }
        match c {
            '\'' => single = true,
            '"' => double = true,
            '\\' => {
                pos += 2;
                continue;
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 1 {
                    // `))` closes an arithmetic expansion
                    return at(pos + 1) != Some(')');
                }
                if depth == 0 {
                    return false;
                }
            }
            '|' if depth == 1 => return true,
            '&' if depth == 1 && at(pos + 1) == Some('&') => return true,
            _ => {}
        }
        pos += 1;
    }
    false
}

impl Parser {
    /// Switch to parsing a nested list that ends at `eof`.
    pub(crate) fn enter_nested_list(&mut self, eof: char, mode: ParserMode) -> NestedList {
        let nested = NestedList {
            checkpoint: self.checkpoint(),
            word_context: self.word_context,
            word_flags: self.swap_word_flags((false, false, false)),
        };
        self.mode.insert(mode | ParserMode::EOFTOKEN);
        self.eof_token = Some(eof);
        self.word_context = WordContext::Normal;
        self.contexts.push(ContextKind::CommandSub);
        self.quote.push();
        nested
    }

    /// Leave a nested list. Heredocs registered inside stay pending unless
    /// `rollback` is set.
    pub(crate) fn leave_nested_list(&mut self, nested: NestedList, rollback: bool) {
        self.quote.pop();
        if rollback {
            self.rollback(&nested.checkpoint);
        } else {
            self.restore_state(&nested.checkpoint);
        }
        self.word_context = nested.word_context;
        self.swap_word_flags(nested.word_flags);
    }

    /// Parse the list of a nested construct and require `close` after it.
    /// Returns `None` (cursor after the list) when `close` is missing.
    fn parse_nested_body(&mut self, close: char) -> ParseResult<Option<Node>> {
        let command = self.parse_list(true)?.unwrap_or(Node::Empty);
        self.skip_whitespace_and_newlines();
        if self.peek() != Some(close) {
            return Ok(None);
        }
        self.pos += 1;
        Ok(Some(command))
    }

    /// `$((` at the cursor: arithmetic first unless the text looks like a
    /// subshell, then the other reading.
    pub(crate) fn parse_dollar_dparen(&mut self) -> ParseResult<Parsed> {
        if is_dollar_dparen_subshell(&self.source, self.pos) {
            if let Some(found) = self.parse_command_substitution()? {
                return Ok(Some(found));
            }
            log::trace!("`$((` at {} is not a subshell, trying arithmetic", self.pos);
            return self.parse_arithmetic_expansion();
        }
        if let Some(found) = self.parse_arithmetic_expansion()? {
            return Ok(Some(found));
        }
        log::trace!("`$((` at {} is not arithmetic, trying command substitution", self.pos);
        self.parse_command_substitution()
    }

    /// `$(...)` at the cursor.
    pub(crate) fn parse_command_substitution(&mut self) -> ParseResult<Parsed> {
        if !self.lookahead_is("$(") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;
        let nested = self.enter_nested_list(')', ParserMode::NONE);
        let body = self.parse_nested_body(')');
        self.leave_nested_list(nested, false);
        match body? {
            Some(command) => {
                let text = self.slice(start, self.pos);
                Ok(Some((AST::command_substitution(command, false), text)))
            }
            None => {
                self.pos = start;
                Ok(None)
            }
        }
    }

    /// `${ cmd; }` or `${| cmd; }`. The cursor is just past `${`; `start` is
    /// the `$`.
    pub(crate) fn parse_funsub(&mut self, start: usize) -> ParseResult<(Expansion, String)> {
        if self.peek() == Some('|') {
            self.pos += 1;
        }
        let nested = self.enter_nested_list('}', ParserMode::NONE);
        let body = self.parse_nested_body('}');
        self.leave_nested_list(nested, false);
        match body? {
            Some(command) => {
                let text = self.slice(start, self.pos);
                Ok((AST::command_substitution(command, true), text))
            }
            None => Err(ParseException::unexpected_eof("unexpected EOF looking for `}'", start)),
        }
    }

    /// `<(...)` or `>(...)` at the cursor.
    ///
    /// When the body does not parse as a list the text up to the matching
    /// paren is still consumed and returned without a node.
    pub(crate) fn parse_process_substitution(&mut self) -> ParseResult<(Option<Expansion>, String)> {
        let direction = match (self.peek(), self.peek_at(1)) {
            (Some('<'), Some('(')) => ProcessDirection::Input,
            (Some('>'), Some('(')) => ProcessDirection::Output,
            _ => return Ok((None, String::new())),
        };
        let start = self.pos;
        self.pos += 2;
        let nested = self.enter_nested_list(')', ParserMode::PROCSUB);
        match self.parse_nested_body(')') {
            Ok(Some(command)) => {
                self.leave_nested_list(nested, false);
                let text = strip_line_continuations_comment_aware(&self.source[start..self.pos]);
                let expansion = Expansion::ProcessSubstitution(ProcessSubstitutionNode {
                    direction,
                    command: Box::new(command),
                });
                return Ok((Some(expansion), text));
            }
            Ok(None) => self.leave_nested_list(nested, true),
            Err(e) => {
                self.leave_nested_list(nested, true);
                if e.kind == ErrorKind::LimitExceeded {
                    return Err(e);
                }
                log::trace!("process substitution at {} failed: {}", start, e.message);
            }
        }

        if self.source.get(start + 2).copied().is_some_and(is_whitespace) {
            return Err(ParseException::new("Invalid process substitution", start));
        }
        self.pos = start + 2;
        self.parse_matched_pair('(', ')', PairFlags::NONE, false)?;
        let text = strip_line_continuations_comment_aware(&self.source[start..self.pos]);
        Ok((None, text))
    }

    /// `` `...` `` at the cursor.
    pub(crate) fn parse_backtick_substitution(&mut self) -> ParseResult<Parsed> {
        if self.peek() != Some('`') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 1;
        let mut body = BacktickBody::default();

        while let Some(c) = self.peek() {
            if body.current.is_some() {
                self.copy_backtick_heredoc_line(&mut body);
                continue;
            }
            if c == '`' {
                break;
            }
            if c == '\\' && self.peek_at(1).is_some() {
                match self.peek_at(1) {
                    Some('\n') => self.pos += 2,
                    Some(next) if is_escape_char_in_backtick(next) => {
                        self.pos += 2;
                        body.content.push(next);
                        body.text.push('\\');
                        body.text.push(next);
                    }
                    _ => {
                        self.pos += 1;
                        body.push('\\');
                    }
                }
                continue;
            }
            if self.lookahead_is("<<<") {
                self.copy_backtick_herestring(&mut body);
                continue;
            }
            if self.lookahead_is("<<") {
                self.copy_backtick_heredoc_operator(&mut body);
                continue;
            }
            self.pos += 1;
            body.push(c);
            if c == '\n' && !body.pending.is_empty() {
                body.current = Some(body.pending.remove(0));
            }
        }
        if self.at_end() {
            return Err(ParseException::new("Unterminated backtick", start));
        }
        self.pos += 1;
        body.text.push('`');

        let mut content = body.content;
        if !body.pending.is_empty() {
            let (content_start, content_end) =
                find_heredoc_content_end(&self.source, self.pos, &body.pending);
            if content_end > content_start {
                content.push_str(&self.slice(content_start, content_end));
                self.cmdsub_heredoc_end = Some(
                    self.cmdsub_heredoc_end
                        .map_or(content_end, |end| end.max(content_end)),
                );
            }
        }
        let command = Parser::parse_nested_list(content, self.extglob(), self.depth + 1)?
            .unwrap_or(Node::Empty);
        Ok(Some((AST::command_substitution(command, false), body.text)))
    }

    /// One line of a heredoc body inside backticks, copied verbatim.
    fn copy_backtick_heredoc_line(&mut self, body: &mut BacktickBody) {
        let Some((delimiter, strip_tabs)) = body.current.clone() else {
            return;
        };
        let line_start = self.pos;
        let line_end = self.source[line_start..]
            .iter()
            .position(|&c| c == '\n')
            .map_or(self.source.len(), |i| line_start + i);
        let line: Vec<char> = self.source[line_start..line_end].to_vec();
        let tabs = if strip_tabs {
            line.iter().take_while(|&&c| c == '\t').count()
        } else {
            0
        };
        let check: String = line[tabs..].iter().collect();
        let delim_len = delimiter.chars().count();
        if check == delimiter || check.starts_with(delimiter.as_str()) && check.chars().count() > delim_len {
            let exact = check == delimiter;
            let end = if exact { line.len() } else { tabs + delim_len };
            body.push_chars(&line[..end]);
            self.pos = line_start + end;
            if exact && self.peek() == Some('\n') {
                self.pos += 1;
                body.push('\n');
            }
            body.current = (!body.pending.is_empty()).then(|| body.pending.remove(0));
            return;
        }
        body.push_chars(&line);
        self.pos = line_end;
        if self.peek() == Some('\n') {
            self.pos += 1;
            body.push('\n');
        }
    }

    /// `<<<` and its word inside backticks.
    fn copy_backtick_herestring(&mut self, body: &mut BacktickBody) {
        body.push_str("<<<");
        self.pos += 3;
        while let Some(c) = self.peek().filter(|&c| is_blank(c)) {
            self.pos += 1;
            body.push(c);
        }
        while let Some(c) = self.peek() {
            if is_whitespace(c) || c == '(' || c == ')' {
                break;
            }
            if c == '\\' && self.peek_at(1).is_some() {
                self.copy_chars(body, 2);
            } else if c == '"' || c == '\'' {
                self.copy_chars(body, 1);
                while let Some(q) = self.peek() {
                    if q == c {
                        break;
                    }
                    if c == '"' && q == '\\' {
                        self.copy_chars(body, 1);
                    }
                    self.copy_chars(body, 1);
                }
                self.copy_chars(body, 1);
            } else {
                self.copy_chars(body, 1);
            }
        }
    }

    /// `<<` or `<<-` and its delimiter inside backticks; the delimiter is
    /// queued so the following lines are copied as heredoc body.
    fn copy_backtick_heredoc_operator(&mut self, body: &mut BacktickBody) {
        body.push_str("<<");
        self.pos += 2;
        let strip_tabs = self.peek() == Some('-');
        if strip_tabs {
            self.copy_chars(body, 1);
        }
        while self.peek().is_some_and(is_blank) {
            self.copy_chars(body, 1);
        }
        let mut delimiter = String::new();
        match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.copy_chars(body, 1);
                while self.peek().is_some_and(|c| c != q) {
                    delimiter.extend(self.copy_chars(body, 1));
                }
                self.copy_chars(body, 1);
            }
            Some('\\') => {
                self.copy_chars(body, 1);
                delimiter.extend(self.copy_chars(body, 1));
                while self.peek().is_some_and(|c| !is_metachar(c)) {
                    delimiter.extend(self.copy_chars(body, 1));
                }
            }
            Some(_) => {
                while let Some(c) = self.peek() {
                    if is_metachar(c) || c == '`' {
                        break;
                    }
                    match c {
                        '\'' | '"' => {
                            self.copy_chars(body, 1);
                            while self.peek().is_some_and(|q| q != c) {
                                delimiter.extend(self.copy_chars(body, 1));
                            }
                            self.copy_chars(body, 1);
                        }
                        '\\' => {
                            self.copy_chars(body, 1);
                            delimiter.extend(self.copy_chars(body, 1));
                        }
                        _ => delimiter.extend(self.copy_chars(body, 1)),
                    }
                }
            }
            None => {}
        }
        if !delimiter.is_empty() {
            body.pending.push((delimiter, strip_tabs));
        }
    }

    /// Copy up to `n` characters into both the content and the text.
    fn copy_chars(&mut self, body: &mut BacktickBody, n: usize) -> Option<char> {
        let mut last = None;
        for _ in 0..n {
            let c = self.advance()?;
            body.push(c);
            last = Some(c);
        }
        last
    }
}

/// Accumulates a backtick substitution: `content` is what the nested parser
/// sees, `text` is the source as written.
#[derive(Debug)]
struct BacktickBody {
    content: String,
    text: String,
    pending: Vec<(String, bool)>,
    current: Option<(String, bool)>,
}

impl Default for BacktickBody {
    fn default() -> Self {
        Self {
            content: String::new(),
            text: String::from('`'),
            pending: Vec::new(),
            current: None,
        }
    }
}

impl BacktickBody {
    fn push(&mut self, c: char) {
        self.content.push(c);
        self.text.push(c);
    }

    fn push_str(&mut self, s: &str) {
        self.content.push_str(s);
        self.text.push_str(s);
    }

    fn push_chars(&mut self, chars: &[char]) {
        self.content.extend(chars);
        self.text.extend(chars);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{CommandSubstitutionNode, Redirection};
    use crate::parser::types::ParserOptions;

    fn cmdsub(expansion: Expansion) -> CommandSubstitutionNode {
        let Expansion::CommandSubstitution(node) = expansion else {
            panic!("Expected command substitution, got {}", expansion.kind());
        };
        node
    }

    fn words(node: &Node) -> Vec<String> {
        let Node::Command(command) = node else {
            panic!("Expected command, got {}", node.kind());
        };
        command.words.iter().map(|w| w.value.clone()).collect()
    }

    #[test]
    fn test_command_substitution() {
        let mut parser = Parser::new("$(echo a; echo b) tail", ParserOptions::default());
        let (expansion, text) = parser.parse_command_substitution().unwrap().unwrap();
        assert_eq!(text, "$(echo a; echo b)");
        assert!(matches!(*cmdsub(expansion).command, Node::List(_)));
        assert_eq!(parser.eof_token, None);
        assert_eq!(parser.mode, ParserMode::NONE);
        assert_eq!(parser.quote.depth(), 0);
        assert_eq!(parser.contexts.depth(), 1);
    }

    #[test]
    fn test_failed_process_substitution_rolls_back() {
        let mut parser = Parser::new("<(cat <<EOF; if) tail", ParserOptions::default());
        let (expansion, text) = parser.parse_process_substitution().unwrap();
        assert!(expansion.is_none());
        assert_eq!(text, "<(cat <<EOF; if)");
        assert_eq!(parser.pos, text.chars().count());
        assert!(parser.pending_heredocs.is_empty());
        assert_eq!(parser.eof_token, None);
        assert_eq!(parser.mode, ParserMode::NONE);
        assert_eq!(parser.quote.depth(), 0);
        assert_eq!(parser.contexts.depth(), 1);
    }

    #[test]
    fn test_empty_command_substitution() {
        let mut parser = Parser::new("$( )", ParserOptions::default());
        let (expansion, _) = parser.parse_command_substitution().unwrap().unwrap();
        assert_eq!(*cmdsub(expansion).command, Node::Empty);
    }

    #[test]
    fn test_case_inside_command_substitution() {
        let mut parser = Parser::new("$(case x in a) echo;; esac)", ParserOptions::default());
        let (expansion, _) = parser.parse_command_substitution().unwrap().unwrap();
        assert!(matches!(*cmdsub(expansion).command, Node::Case(_)));
    }

    #[test]
    fn test_funsub() {
        let mut parser = Parser::new("${ echo hi; }", ParserOptions::default());
        let (expansion, text) = parser.parse_param_expansion(false).unwrap().unwrap();
        assert_eq!(text, "${ echo hi; }");
        let node = cmdsub(expansion);
        assert!(node.brace);
        assert_eq!(words(&node.command), vec!["echo", "hi"]);
    }

    #[test]
    fn test_unterminated_funsub() {
        let mut parser = Parser::new("${ echo hi", ParserOptions::default());
        let err = parser.parse_param_expansion(false).unwrap_err();
        assert_eq!(err.message, "unexpected EOF looking for `}'");
    }

    #[test]
    fn test_backtick_unescapes() {
        let mut parser = Parser::new("`echo \\$HOME \\`date\\``", ParserOptions::default());
        let (expansion, text) = parser.parse_backtick_substitution().unwrap().unwrap();
        assert_eq!(text, "`echo \\$HOME \\`date\\``");
        let node = cmdsub(expansion);
        let Node::Command(command) = *node.command else {
            panic!("Expected command");
        };
        assert_eq!(command.words[1].value, "$HOME");
        assert_eq!(command.words[2].value, "`date`");
    }

    #[test]
    fn test_backtick_with_heredoc() {
        let mut parser = Parser::new("`cat <<EOF\nbody\nEOF\n`", ParserOptions::default());
        let (expansion, _) = parser.parse_backtick_substitution().unwrap().unwrap();
        let Node::Command(command) = *cmdsub(expansion).command else {
            panic!("Expected command");
        };
        let Some(Redirection::HereDoc(heredoc)) = command.redirects.first() else {
            panic!("Expected heredoc");
        };
        assert_eq!(heredoc.content, "body\n");
    }

    #[test]
    fn test_unterminated_backtick() {
        let mut parser = Parser::new("`echo", ParserOptions::default());
        let err = parser.parse_backtick_substitution().unwrap_err();
        assert_eq!(err.message, "Unterminated backtick");
        assert_eq!(err.position, 0);
    }

    #[test]
    fn test_process_substitution() {
        let mut parser = Parser::new(">(tee log)", ParserOptions::default());
        let (expansion, text) = parser.parse_process_substitution().unwrap();
        assert_eq!(text, ">(tee log)");
        let Some(Expansion::ProcessSubstitution(node)) = expansion else {
            panic!("Expected process substitution");
        };
        assert_eq!(node.direction, ProcessDirection::Output);
        assert!(!parser.mode.contains(ParserMode::PROCSUB));
    }

    #[test]
    fn test_invalid_process_substitution() {
        let mut parser = Parser::new("<( ;; )", ParserOptions::default());
        let err = parser.parse_process_substitution().unwrap_err();
        assert_eq!(err.message, "Invalid process substitution");
    }

    #[test]
    fn test_dparen_subshell_detection() {
        let source: Vec<char> = "$((a) | (b))".chars().collect();
        assert!(is_dollar_dparen_subshell(&source, 0));
        let source: Vec<char> = "$((1 + (2)))".chars().collect();
        assert!(!is_dollar_dparen_subshell(&source, 0));
    }

    #[test]
    fn test_dparen_prefers_subshell() {
        let mut parser = Parser::new("$((echo a) | (cat))", ParserOptions::default());
        let (expansion, _) = parser.parse_dollar_dparen().unwrap().unwrap();
        assert!(matches!(*cmdsub(expansion).command, Node::Pipeline(_)));
    }
}
