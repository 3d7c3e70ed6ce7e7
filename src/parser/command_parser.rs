//! Command Parser
//!
//! Handles parsing of simple commands and redirections.

use super::lexer::ASSIGNMENT_BUILTINS;
use super::parser::Parser;
use super::scan_helpers::{assignment, is_metachar, is_name_char, is_name_start, is_redirect_char};
use super::types::ParseResult;
use crate::ast::types::{Node, Redirection, WordNode, WordPart, AST};

/// `name` or `name[subscript]` as allowed inside `{...}` before a redirect.
fn is_valid_fd_variable(name: &str) -> bool {
    let base = match (name.find('['), name.rfind(']')) {
        (None, None) => name,
        (Some(left), Some(right)) if right == name.len() - 1 && right > left + 1 => &name[..left],
        _ => return false,
    };
    let mut chars = base.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

/// Prefix a duplication target with `&`, shifting its expansion spans.
fn dup_target(word: WordNode) -> WordNode {
    let parts = word
        .parts
        .into_iter()
        .map(|p| WordPart {
            start: p.start + 1,
            end: p.end + 1,
            expansion: p.expansion,
        })
        .collect();
    AST::word(format!("&{}", word.value), parts)
}

impl Parser {
    /// `{name}` before a redirect operator, consumed when valid.
    fn read_fd_variable(&mut self) -> Option<String> {
        if self.peek() != Some('{') {
            return None;
        }
        let saved = self.pos;
        self.pos += 1;
        let mut name = String::new();
        let mut in_bracket = false;
        while let Some(c) = self.peek() {
            if is_redirect_char(c) || c == '}' && !in_bracket {
                break;
            }
            let keep = match c {
                '[' => {
                    in_bracket = true;
                    true
                }
                ']' => {
                    in_bracket = false;
                    true
                }
                _ => c.is_alphanumeric() || c == '_' || in_bracket && !is_metachar(c),
            };
            if !keep {
                break;
            }
            name.push(c);
            self.pos += 1;
        }
        if self.peek() == Some('}') && is_valid_fd_variable(&name) {
            self.pos += 1;
            return Some(name);
        }
        self.pos = saved;
        None
    }

    fn read_fd_number(&mut self) -> Option<i32> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        match self.slice(start, self.pos).parse() {
            Ok(fd) => Some(fd),
            Err(_) => {
                self.pos = start;
                None
            }
        }
    }

    /// Parse one redirection at the cursor, or return `None` with the cursor
    /// unchanged.
    pub(crate) fn parse_redirect(&mut self) -> ParseResult<Option<Redirection>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        let start = self.pos;
        let fd_variable = self.read_fd_variable();
        let fd = match fd_variable {
            Some(_) => None,
            None => self.read_fd_number(),
        };

        if self.lookahead_is("&>") {
            if fd.is_some() || fd_variable.is_some() {
                self.pos = start;
                return Ok(None);
            }
            self.pos += 2;
            let op = if self.peek() == Some('>') {
                self.pos += 1;
                "&>>"
            } else {
                "&>"
            };
            self.skip_whitespace();
            let Some(target) = self.parse_word(false, false, false)? else {
                return Err(self.error(format!("Expected target for redirect {}", op)));
            };
            return Ok(Some(AST::redirect(op, target, None, None)));
        }

        let Some(first) = self.peek().filter(|&c| is_redirect_char(c)) else {
            self.pos = start;
            return Ok(None);
        };
        // `<(` and `>(` without an fd are process substitutions
        if fd.is_none() && self.peek_at(1) == Some('(') {
            self.pos = start;
            return Ok(None);
        }
        self.pos += 1;
        let plain = fd.is_none() && fd_variable.is_none();
        let dup_allowed =
            |next: Option<char>| !next.is_some_and(|c| c.is_ascii_digit() || c == '-');
        let mut strip_tabs = false;
        let op = match (first, self.peek()) {
            ('>', Some('>')) => {
                self.pos += 1;
                ">>"
            }
            ('<', Some('<')) => {
                self.pos += 1;
                match self.peek() {
                    Some('<') => {
                        self.pos += 1;
                        "<<<"
                    }
                    Some('-') => {
                        self.pos += 1;
                        strip_tabs = true;
                        "<<"
                    }
                    _ => "<<",
                }
            }
            ('<', Some('>')) => {
                self.pos += 1;
                "<>"
            }
            ('>', Some('|')) => {
                self.pos += 1;
                ">|"
            }
            ('>', Some('&')) if plain && dup_allowed(self.peek_at(1)) => {
                self.pos += 1;
                ">&"
            }
            ('<', Some('&')) if plain && dup_allowed(self.peek_at(1)) => {
                self.pos += 1;
                "<&"
            }
            ('>', _) => ">",
            _ => "<",
        };

        if op == "<<" {
            return Ok(Some(Redirection::HereDoc(self.parse_heredoc(fd, strip_tabs))));
        }
        let full_op = match (&fd_variable, fd) {
            (Some(name), _) => format!("{{{}}}{}", name, op),
            (None, Some(n)) => format!("{}{}", n, op),
            (None, None) => op.to_string(),
        };

        let target = if self.peek() == Some('&') {
            self.pos += 1;
            self.skip_whitespace();
            self.parse_dup_target(&full_op)?
        } else {
            self.skip_whitespace();
            if matches!(op, ">&" | "<&")
                && self.peek() == Some('-')
                && self.peek_at(1).is_some_and(|c| !is_metachar(c))
            {
                self.pos += 1;
                Some(AST::literal("&-"))
            } else {
                self.parse_word(false, false, false)?
            }
        };
        let Some(target) = target else {
            return Err(self.error(format!("Expected target for redirect {}", full_op)));
        };
        Ok(Some(AST::redirect(full_op, target, fd, fd_variable)))
    }

    /// The target after `N>&` or `N<&`: a descriptor, `-`, or any word.
    fn parse_dup_target(&mut self, op: &str) -> ParseResult<Option<WordNode>> {
        if self.peek() == Some('-') && self.peek_at(1).is_some_and(|c| !is_metachar(c)) {
            self.pos += 1;
            return Ok(Some(AST::literal("&-")));
        }
        if self.peek().is_some_and(|c| c.is_ascii_digit() || c == '-') {
            let word_start = self.pos;
            let mut fd_target = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
                fd_target.push(c);
                self.pos += 1;
            }
            if self.peek() == Some('-') {
                fd_target.push('-');
                self.pos += 1;
            }
            if fd_target == "-" || self.peek().map_or(true, is_metachar) {
                return Ok(Some(AST::literal(format!("&{}", fd_target))));
            }
            self.pos = word_start;
        }
        match self.parse_word(false, false, false)? {
            Some(word) => Ok(Some(dup_target(word))),
            None => Err(self.error(format!("Expected target for redirect {}", op))),
        }
    }

    /// Redirections trailing a compound command.
    pub(crate) fn collect_redirects(&mut self) -> ParseResult<Vec<Redirection>> {
        let mut redirects = Vec::new();
        while let Some(redirect) = self.parse_redirect()? {
            redirects.push(redirect);
        }
        Ok(redirects)
    }

    /// Parse a simple command: words and redirections in any order.
    pub(crate) fn parse_command(&mut self) -> ParseResult<Option<Node>> {
        let mut words: Vec<WordNode> = Vec::new();
        let mut redirects = Vec::new();
        loop {
            self.skip_whitespace();
            if self.is_command_terminator()? {
                break;
            }
            if words.is_empty() {
                if let Some("}" | "]]") = self.peek_reserved_word()?.as_deref() {
                    break;
                }
            }
            if let Some(redirect) = self.parse_redirect()? {
                redirects.push(redirect);
                continue;
            }
            let all_assignments = words.iter().all(|w| assignment(&w.value).is_some());
            let in_assign_builtin = words
                .first()
                .is_some_and(|w| ASSIGNMENT_BUILTINS.contains(w.value.as_str()));
            let at_command_start = words.is_empty() || all_assignments && redirects.is_empty();
            let Some(word) = self.parse_word(at_command_start, false, in_assign_builtin)? else {
                break;
            };
            words.push(word);
        }
        if words.is_empty() && redirects.is_empty() {
            return Ok(None);
        }
        Ok(Some(AST::command(words, redirects)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{Expansion, RedirectNode};
    use crate::parser::types::ParserOptions;

    fn command(input: &str) -> (Vec<String>, Vec<Redirection>) {
        let mut parser = Parser::new(input, ParserOptions::default());
        let Some(Node::Command(command)) = parser.parse_command().unwrap() else {
            panic!("Expected command for {:?}", input);
        };
        let words = command.words.iter().map(|w| w.value.clone()).collect();
        (words, command.redirects)
    }

    fn file_redirect(redirect: &Redirection) -> &RedirectNode {
        let Redirection::File(node) = redirect else {
            panic!("Expected file redirect");
        };
        node
    }

    #[test]
    fn test_words_and_redirects_interleaved() {
        let (words, redirects) = command("echo a >out b 2>>err");
        assert_eq!(words, vec!["echo", "a", "b"]);
        assert_eq!(redirects.len(), 2);
        assert_eq!(file_redirect(&redirects[0]).op, ">");
        assert_eq!(file_redirect(&redirects[0]).target.value, "out");
        let append = file_redirect(&redirects[1]);
        assert_eq!(append.op, "2>>");
        assert_eq!(append.fd, Some(2));
    }

    #[test]
    fn test_fd_variable_redirect() {
        let (_, redirects) = command("exec {fd}>log");
        let node = file_redirect(&redirects[0]);
        assert_eq!(node.op, "{fd}>");
        assert_eq!(node.fd_variable.as_deref(), Some("fd"));
        assert_eq!(node.fd, None);
    }

    #[test]
    fn test_invalid_fd_variable_is_a_word() {
        let (words, redirects) = command("echo {1x}");
        assert_eq!(words, vec!["echo", "{1x}"]);
        assert!(redirects.is_empty());
    }

    #[test]
    fn test_duplication_targets() {
        let (_, redirects) = command("cmd 2>&1 >&- 3<&0- 1>&$fd");
        let targets: Vec<(&str, &str)> = redirects
            .iter()
            .map(file_redirect)
            .map(|r| (r.op.as_str(), r.target.value.as_str()))
            .collect();
        assert_eq!(
            targets,
            vec![("2>", "&1"), (">", "&-"), ("3<", "&0-"), ("1>", "&$fd")]
        );
        let last = file_redirect(&redirects[3]);
        assert_eq!((last.target.parts[0].start, last.target.parts[0].end), (1, 4));
        assert!(matches!(last.target.parts[0].expansion, Expansion::Param(_)));
    }

    #[test]
    fn test_and_great_forms() {
        let (_, redirects) = command("cmd &>all &>>more");
        assert_eq!(file_redirect(&redirects[0]).op, "&>");
        assert_eq!(file_redirect(&redirects[1]).op, "&>>");
    }

    #[test]
    fn test_here_string_and_clobber() {
        let (_, redirects) = command("cat <<<word >|file <>rw");
        let ops: Vec<&str> = redirects.iter().map(|r| file_redirect(r).op.as_str()).collect();
        assert_eq!(ops, vec!["<<<", ">|", "<>"]);
    }

    #[test]
    fn test_heredoc_operator() {
        let (_, redirects) = command("cat <<-END");
        let Redirection::HereDoc(heredoc) = &redirects[0] else {
            panic!("Expected heredoc");
        };
        assert_eq!(heredoc.delimiter, "END");
        assert!(heredoc.strip_tabs);
    }

    #[test]
    fn test_missing_redirect_target() {
        let mut parser = Parser::new("echo >", ParserOptions::default());
        let err = parser.parse_command().unwrap_err();
        assert_eq!(err.message, "Expected target for redirect >");
    }

    #[test]
    fn test_process_substitution_is_not_a_redirect() {
        let (words, redirects) = command("diff <(ls) <(ls -a)");
        assert_eq!(words, vec!["diff", "<(ls)", "<(ls -a)"]);
        assert!(redirects.is_empty());
    }

    #[test]
    fn test_assignment_builtin_array() {
        let mut parser = Parser::new("declare -a xs=(1 2)", ParserOptions::default());
        let Some(Node::Command(command)) = parser.parse_command().unwrap() else {
            panic!("Expected command");
        };
        assert_eq!(command.words[2].value, "xs=(1 2)");
        assert!(matches!(command.words[2].parts[0].expansion, Expansion::Array(_)));
    }

    #[test]
    fn test_fd_variable_names() {
        assert!(is_valid_fd_variable("fd"));
        assert!(is_valid_fd_variable("fds[1]"));
        assert!(!is_valid_fd_variable("1fd"));
        assert!(!is_valid_fd_variable("fds[]"));
    }
}
