//! Expansion Parser
//!
//! Handles parsing of parameter expansions, arithmetic expansions and array
//! literals. Every function here starts at the cursor and returns the parsed
//! expansion together with the text it occupies in the enclosing word, or
//! `None` (cursor unchanged) when the characters are not that expansion.

use super::arithmetic_parser::ArithParser;
use super::parser::Parser;
use super::scan_helpers::{
    count_consecutive_dollars_before, is_escape_char_in_backtick, is_funsub_char,
    is_name_char, is_name_start, is_simple_param_op, is_special_param, is_special_param_unbraced,
};
use super::state::{ContextKind, DolbraceState, PairFlags};
use super::types::{ErrorKind, ParseException, ParseResult};
use crate::ast::types::{
    ArithDeprecatedNode, ArithmeticExpansionNode, ArrayNode, Expansion, ParamExpansionNode,
    ParamLengthNode, AST,
};

pub(crate) type Parsed = Option<(Expansion, String)>;

fn indirect(param: impl Into<String>, op: Option<String>, arg: Option<String>) -> Expansion {
    Expansion::ParamIndirect(ParamExpansionNode {
        param: param.into(),
        op,
        arg,
    })
}

impl Parser {
    // =========================================================================
    // PARAMETERS
    // =========================================================================

    /// `$name`, `$1`, `$?` or `${...}` at the cursor.
    pub(crate) fn parse_param_expansion(&mut self, in_dquote: bool) -> ParseResult<Parsed> {
        if self.peek() != Some('$') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 1;
        let Some(ch) = self.peek() else {
            self.pos = start;
            return Ok(None);
        };
        if ch == '{' {
            self.pos += 1;
            return self.read_braced_param(start, in_dquote).map(Some);
        }
        if is_special_param_unbraced(ch) || ch.is_ascii_digit() {
            self.pos += 1;
            let text = self.slice(start, self.pos);
            return Ok(Some((AST::param(ch.to_string(), None, None), text)));
        }
        if is_name_start(ch) {
            let name_start = self.pos;
            while self.peek().is_some_and(is_name_char) {
                self.pos += 1;
            }
            let name = self.slice(name_start, self.pos);
            let text = self.slice(start, self.pos);
            return Ok(Some((AST::param(name, None, None), text)));
        }
        self.pos = start;
        Ok(None)
    }

    fn unclosed_brace(start: usize) -> ParseException {
        ParseException::unexpected_eof("unexpected EOF looking for `}'", start)
    }

    /// The cursor is just past `${`; `start` is the `$`.
    fn read_braced_param(&mut self, start: usize, in_dquote: bool) -> ParseResult<(Expansion, String)> {
        let Some(ch) = self.peek() else {
            return Err(Self::unclosed_brace(start));
        };
        if is_funsub_char(ch) {
            return self.parse_funsub(start);
        }
        let saved = self.dolbrace;
        self.dolbrace = DolbraceState::Param;
        let result = self.read_braced_param_body(start, ch, in_dquote);
        self.dolbrace = saved;
        result
    }

    fn read_braced_param_body(
        &mut self,
        start: usize,
        first: char,
        in_dquote: bool,
    ) -> ParseResult<(Expansion, String)> {
        if first == '#' {
            self.pos += 1;
            let param = self.consume_param_name()?;
            if !param.is_empty() && self.peek() == Some('}') {
                self.pos += 1;
                let text = self.slice(start, self.pos);
                return Ok((Expansion::ParamLength(ParamLengthNode { param }), text));
            }
            self.pos = start + 2;
        }
        if first == '!' {
            if let Some(found) = self.read_indirect_param(start)? {
                return Ok(found);
            }
            self.pos = start + 2;
        }

        let mut param = self.consume_param_name()?;
        if param.is_empty() {
            let operator_follows = match self.peek() {
                Some('-' | '=' | '+' | '?') => true,
                Some(':') => self.peek_at(1).is_some_and(is_simple_param_op),
                _ => false,
            };
            if !operator_follows {
                let content = self.parse_matched_pair('{', '}', PairFlags::DOLBRACE, false)?;
                let text = format!("${{{}}}", content);
                return Ok((AST::param(content, None, None), text));
            }
            param = String::new();
        }
        match self.peek() {
            None => return Err(Self::unclosed_brace(start)),
            Some('}') => {
                self.pos += 1;
                let text = self.slice(start, self.pos);
                return Ok((AST::param(param, None, None), text));
            }
            Some(_) => {}
        }

        let mut op = self.consume_param_operator();
        if op.is_empty() {
            op = self.read_unusual_param_operator()?;
        }
        self.update_dolbrace_for_op(&op, !param.is_empty());
        let flags = if in_dquote { PairFlags::DQUOTE } else { PairFlags::NONE };
        let arg = self.parse_matched_pair('{', '}', flags | PairFlags::DOLBRACE, param.ends_with('$'))?;
        let text = format!("${{{}{}{}}}", param, op, arg);
        let op = (!op.is_empty()).then_some(op);
        let arg = (op.is_some() || !arg.is_empty()).then_some(arg);
        Ok((AST::param(param, op, arg), text))
    }

    /// `${!name...}`. Returns `None` when the text after `!` is not an
    /// indirection and should be re-read as an ordinary parameter.
    fn read_indirect_param(&mut self, start: usize) -> ParseResult<Option<(Expansion, String)>> {
        self.pos += 1;
        self.skip_blanks();
        let param = self.consume_param_name()?;
        if param.is_empty() {
            return Ok(None);
        }
        self.skip_blanks();
        match self.peek() {
            Some('}') => {
                self.pos += 1;
                let text = self.slice(start, self.pos);
                return Ok(Some((indirect(param, None, None), text)));
            }
            Some(suffix @ ('@' | '*')) => {
                self.pos += 1;
                let trailing = self.parse_matched_pair('{', '}', PairFlags::DOLBRACE, false)?;
                let text = self.slice(start, self.pos);
                return Ok(Some((indirect(format!("{}{}{}", param, suffix, trailing), None, None), text)));
            }
            _ => {}
        }
        let mut op = self.consume_param_operator();
        if op.is_empty() {
            if let Some(c) = self.peek().filter(|c| !"}\"'`".contains(*c)) {
                self.pos += 1;
                op.push(c);
            }
        }
        if !op.is_empty() && !op.chars().all(|c| "\"'`".contains(c)) {
            let arg = self.parse_matched_pair('{', '}', PairFlags::DOLBRACE, false)?;
            let text = self.slice(start, self.pos);
            return Ok(Some((indirect(param, Some(op), Some(arg)), text)));
        }
        if self.at_end() {
            return Err(Self::unclosed_brace(start));
        }
        Ok(None)
    }

    /// An operator that is not one of the standard ones: a quoted or
    /// backquoted operand, an escape, or any single character.
    fn read_unusual_param_operator(&mut self) -> ParseResult<String> {
        let Some(c) = self.peek() else {
            return Ok(String::new());
        };
        match (c, self.peek_at(1)) {
            ('$', Some('"' | '\'')) => {
                let dollars = 1 + count_consecutive_dollars_before(&self.source, self.pos);
                if dollars % 2 == 1 {
                    return Ok(String::new());
                }
                self.pos += 1;
                Ok(c.to_string())
            }
            ('`', _) => {
                let backtick_pos = self.pos;
                self.pos += 1;
                while let Some(b) = self.peek() {
                    if b == '`' {
                        break;
                    }
                    if b == '\\' && self.peek_at(1).is_some_and(is_escape_char_in_backtick) {
                        self.pos += 1;
                    }
                    self.pos += 1;
                }
                if self.at_end() {
                    return Err(ParseException::new("Unterminated backtick", backtick_pos));
                }
                self.pos += 1;
                Ok("`".to_string())
            }
            ('$', Some('{')) | ('\'' | '"', _) => Ok(String::new()),
            ('\\', _) => {
                self.pos += 1;
                let mut op = String::from('\\');
                if let Some(next) = self.advance() {
                    op.push(next);
                }
                Ok(op)
            }
            _ => {
                self.pos += 1;
                Ok(c.to_string())
            }
        }
    }

    /// A parameter operator at the cursor, longest match first.
    pub(crate) fn consume_param_operator(&mut self) -> String {
        let Some(ch) = self.peek() else {
            return String::new();
        };
        self.pos += 1;
        let next = self.peek();
        match ch {
            ':' => match next {
                Some(n) if is_simple_param_op(n) => {
                    self.pos += 1;
                    format!(":{}", n)
                }
                _ => ":".to_string(),
            },
            c if is_simple_param_op(c) => c.to_string(),
            '#' | '%' | '^' | ',' if next == Some(ch) => {
                self.pos += 1;
                format!("{}{}", ch, ch)
            }
            '#' | '%' | '^' | ',' | '@' => ch.to_string(),
            '/' => match next {
                Some(n @ ('/' | '#' | '%')) => {
                    self.pos += 1;
                    format!("/{}", n)
                }
                _ => "/".to_string(),
            },
            _ => {
                self.pos -= 1;
                String::new()
            }
        }
    }

    /// Whether the `[` at `open` is closed by a `]` before the `}` of the
    /// enclosing `${...}`.
    fn param_subscript_has_close(&self, open: usize) -> bool {
        let s = &self.source;
        let mut depth = 1;
        let mut i = open + 1;
        let mut single = false;
        let mut double = false;
        while i < s.len() {
            let c = s[i];
            if single {
                single = c != '\'';
                i += 1;
                continue;
            }
            if double {
                if c == '\\' && i + 1 < s.len() {
                    i += 2;
                    continue;
                }
                double = c != '"';
                i += 1;
                continue;
            }
            match c {
                '\'' => single = true,
                '"' => double = true,
                '\\' => {
                    i += 2;
                    continue;
                }
                '}' => return false,
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return true;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        false
    }

    /// The parameter name inside `${`: a special parameter, positional
    /// digits, or an identifier with an optional subscript.
    fn consume_param_name(&mut self) -> ParseResult<String> {
        let Some(ch) = self.peek() else {
            return Ok(String::new());
        };
        if is_special_param(ch) {
            if ch == '$' && matches!(self.peek_at(1), Some('{' | '\'' | '"')) {
                return Ok(String::new());
            }
            self.pos += 1;
            return Ok(ch.to_string());
        }
        if ch.is_ascii_digit() {
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            return Ok(self.slice(start, self.pos));
        }
        if !is_name_start(ch) {
            return Ok(String::new());
        }
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_name_char(c) {
                name.push(c);
                self.pos += 1;
            } else if c == '[' {
                if !self.param_subscript_has_close(self.pos) {
                    break;
                }
                self.pos += 1;
                let subscript = self.parse_matched_pair('[', ']', PairFlags::ARRAYSUB, false)?;
                name.push('[');
                name.push_str(&subscript);
                name.push(']');
                break;
            } else {
                break;
            }
        }
        Ok(name)
    }

    // =========================================================================
    // ARITHMETIC
    // =========================================================================

    /// `$(( ... ))` at the cursor. Falls back to `None` when the parens do
    /// not close as an arithmetic expansion or the contents do not parse,
    /// so the caller can retry as a command substitution.
    pub(crate) fn parse_arithmetic_expansion(&mut self) -> ParseResult<Parsed> {
        if !self.lookahead_is("$((") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 3;
        let content_start = self.pos;
        self.contexts.push(ContextKind::Arithmetic);
        let (closed, first_close) = self.scan_arithmetic_expansion();
        self.contexts.pop();
        if !closed {
            if self.at_end() {
                return Err(ParseException::unexpected_eof("unexpected EOF looking for `))'", start));
            }
            self.pos = start;
            return Ok(None);
        }
        let content = self.slice(content_start, first_close.unwrap_or(self.pos));
        self.pos += 1;
        let text = self.slice(start, self.pos);
        log::trace!("arithmetic expansion {:?}", content);
        match ArithParser::new(&content, content_start, self.extglob(), self.depth).parse() {
            Ok(expression) => Ok(Some((
                Expansion::ArithmeticExpansion(ArithmeticExpansionNode {
                    expression: Box::new(expression),
                }),
                text,
            ))),
            // closed by `))`: the text can only be arithmetic
            Err(e) if e.kind == ErrorKind::LimitExceeded || first_close.is_some() => Err(e),
            Err(_) => {
                self.pos = start;
                Ok(None)
            }
        }
    }

    /// Scan to the `)` that closes a `$((`, counting parens on the
    /// arithmetic context. Returns whether it closed, and where the inner
    /// level closed when the text ends in `))`.
    fn scan_arithmetic_expansion(&mut self) -> (bool, Option<usize>) {
        self.contexts.current_mut().open_paren();
        self.contexts.current_mut().open_paren();
        let mut first_close: Option<usize> = None;
        while let Some(c) = self.peek() {
            match c {
                '\'' | '"' => self.skip_arith_quote(c),
                '\\' if self.peek_at(1).is_some() => self.pos += 2,
                '(' => {
                    self.contexts.current_mut().open_paren();
                    self.pos += 1;
                }
                ')' => {
                    if self.contexts.current().paren_depth == 2 {
                        first_close = Some(self.pos);
                    }
                    if self.contexts.current_mut().close_paren() == 0 {
                        return (true, first_close);
                    }
                    self.pos += 1;
                }
                _ => {
                    if self.contexts.current().paren_depth == 1 {
                        first_close = None;
                    }
                    self.pos += 1;
                }
            }
        }
        (false, first_close)
    }

    /// Skip a quoted run inside arithmetic text; the cursor is on the quote.
    pub(crate) fn skip_arith_quote(&mut self, quote: char) {
        self.pos += 1;
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == quote {
                break;
            }
            if quote == '"' && c == '\\' && !self.at_end() {
                self.pos += 1;
            }
        }
    }

    /// `$[ ... ]` at the cursor; the contents are kept as text.
    pub(crate) fn parse_deprecated_arithmetic(&mut self) -> ParseResult<Parsed> {
        if !self.lookahead_is("$[") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;
        let expression = self.parse_matched_pair('[', ']', PairFlags::ARITH, false)?;
        let text = self.slice(start, self.pos);
        Ok(Some((Expansion::ArithDeprecated(ArithDeprecatedNode { expression }), text)))
    }

    // =========================================================================
    // ARRAYS
    // =========================================================================

    /// `( elem ... )` after `name=` at the cursor.
    pub(crate) fn parse_array_literal(&mut self) -> ParseResult<Parsed> {
        if self.peek() != Some('(') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 1;
        let elements = self.parse_array_elements(start)?;
        let text = self.slice(start, self.pos);
        Ok(Some((Expansion::Array(ArrayNode { elements }), text)))
    }

    fn parse_array_elements(&mut self, start: usize) -> ParseResult<Vec<crate::ast::types::WordNode>> {
        let mut elements = Vec::new();
        loop {
            self.skip_whitespace_and_newlines();
            match self.peek() {
                None => return Err(ParseException::new("Unterminated array literal", start)),
                Some(')') => break,
                Some(_) => {}
            }
            match self.parse_word(false, true, false)? {
                Some(word) => elements.push(word),
                None if self.peek() == Some(')') => break,
                None => return Err(self.error("Expected word in array literal")),
            }
        }
        if self.peek() != Some(')') {
            return Err(self.error("Expected ) to close array literal"));
        }
        self.pos += 1;
        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::ArithExpr;
    use crate::parser::types::ParserOptions;

    fn param(input: &str) -> (Expansion, String) {
        let mut parser = Parser::new(input, ParserOptions::default());
        parser.parse_param_expansion(false).unwrap().unwrap()
    }

    fn param_node(input: &str) -> ParamExpansionNode {
        match param(input).0 {
            Expansion::Param(node) => node,
            other => panic!("Expected param, got {}", other.kind()),
        }
    }

    #[test]
    fn test_simple_params() {
        assert_eq!(param_node("$HOME/x").param, "HOME");
        assert_eq!(param_node("$1x").param, "1");
        assert_eq!(param_node("$?").param, "?");
        assert_eq!(param("$HOME/x").1, "$HOME");
    }

    #[test]
    fn test_lone_dollar_is_not_a_param() {
        let mut parser = Parser::new("$ x", ParserOptions::default());
        assert!(parser.parse_param_expansion(false).unwrap().is_none());
        assert_eq!(parser.pos, 0);
    }

    #[test]
    fn test_braced_with_operator() {
        let node = param_node("${var:-default}");
        assert_eq!(node.param, "var");
        assert_eq!(node.op.as_deref(), Some(":-"));
        assert_eq!(node.arg.as_deref(), Some("default"));

        let node = param_node("${path##*/}");
        assert_eq!(node.op.as_deref(), Some("##"));
        assert_eq!(node.arg.as_deref(), Some("*/"));

        let node = param_node("${s//a/b}");
        assert_eq!(node.op.as_deref(), Some("//"));
        assert_eq!(node.arg.as_deref(), Some("a/b"));
    }

    #[test]
    fn test_braced_subscript() {
        let node = param_node("${arr[@]}");
        assert_eq!(node.param, "arr[@]");
        assert_eq!(node.op, None);
    }

    #[test]
    fn test_length_and_indirect() {
        let (expansion, text) = param("${#arr[@]}");
        assert_eq!(text, "${#arr[@]}");
        let Expansion::ParamLength(length) = expansion else {
            panic!("Expected length");
        };
        assert_eq!(length.param, "arr[@]");

        let Expansion::ParamIndirect(node) = param("${!ref}").0 else {
            panic!("Expected indirect");
        };
        assert_eq!(node.param, "ref");

        let Expansion::ParamIndirect(node) = param("${!prefix*}").0 else {
            panic!("Expected indirect");
        };
        assert_eq!(node.param, "prefix*");
    }

    #[test]
    fn test_hash_alone_is_param() {
        assert_eq!(param_node("${#}").param, "#");
    }

    #[test]
    fn test_unterminated_brace() {
        let mut parser = Parser::new("${x", ParserOptions::default());
        let err = parser.parse_param_expansion(false).unwrap_err();
        assert!(err.is_unexpected_eof());
        assert_eq!(err.position, 0);
    }

    #[test]
    fn test_nested_braces_in_argument() {
        let node = param_node("${a:-${b:-c}}");
        assert_eq!(node.arg.as_deref(), Some("${b:-c}"));
    }

    #[test]
    fn test_arithmetic_expansion() {
        let mut parser = Parser::new("$((1 + 2)) rest", ParserOptions::default());
        let (expansion, text) = parser.parse_arithmetic_expansion().unwrap().unwrap();
        assert_eq!(text, "$((1 + 2))");
        let Expansion::ArithmeticExpansion(arith) = expansion else {
            panic!("Expected arithmetic expansion");
        };
        assert!(matches!(*arith.expression, ArithExpr::Binary { .. }));
    }

    #[test]
    fn test_arithmetic_unterminated() {
        let mut parser = Parser::new("$((1 + 2", ParserOptions::default());
        let err = parser.parse_arithmetic_expansion().unwrap_err();
        assert_eq!(err.message, "unexpected EOF looking for `))'");
    }

    #[test]
    fn test_malformed_arithmetic_expansion() {
        let mut parser = Parser::new("$(( * 2))", ParserOptions::default());
        let err = parser.parse_arithmetic_expansion().unwrap_err();
        assert_eq!(err.message, "Unexpected character '*' in arithmetic expression");
        assert_eq!(err.position, 4);

        // not closed by `))`, so another reading is still possible
        let mut parser = Parser::new("$((* 2) )", ParserOptions::default());
        assert!(parser.parse_arithmetic_expansion().unwrap().is_none());
        assert_eq!(parser.pos, 0);
    }

    #[test]
    fn test_deprecated_arithmetic() {
        let mut parser = Parser::new("$[1+2]", ParserOptions::default());
        let (expansion, text) = parser.parse_deprecated_arithmetic().unwrap().unwrap();
        assert_eq!(text, "$[1+2]");
        let Expansion::ArithDeprecated(node) = expansion else {
            panic!("Expected deprecated arithmetic");
        };
        assert_eq!(node.expression, "1+2");
    }

    #[test]
    fn test_array_literal_multiline() {
        let mut parser = Parser::new("(\n  one\n  [2]=two # c\n)", ParserOptions::default());
        let (expansion, _) = parser.parse_array_literal().unwrap().unwrap();
        let Expansion::Array(array) = expansion else {
            panic!("Expected array");
        };
        let values: Vec<&str> = array.elements.iter().map(|w| w.value.as_str()).collect();
        assert_eq!(values, vec!["one", "[2]=two"]);
    }

    #[test]
    fn test_array_literal_unterminated() {
        let mut parser = Parser::new("(a b", ParserOptions::default());
        let err = parser.parse_array_literal().unwrap_err();
        assert_eq!(err.message, "Unterminated array literal");
    }
}
