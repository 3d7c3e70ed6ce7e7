//! Balanced Delimiter Scanning
//!
//! Reads the text between an opening delimiter (already consumed) and its
//! matching close, recursing into quotes and calling back into the
//! expansion parsers so a `}` or `)` inside `$(...)` or `"..."` does not end
//! the region early. The returned text excludes the closing delimiter.

use super::parser::Parser;
use super::scan_helpers::is_funsub_char;
use super::state::{DolbraceState, PairFlags};
use super::types::{ErrorKind, ParseException, ParseResult};

/// Characters that may make up a parameter operator.
const PARAM_OP_CHARS: &str = "#%^,~:-=?+/";

impl Parser {
    pub(crate) fn parse_matched_pair(
        &mut self,
        open: char,
        close: char,
        flags: PairFlags,
        initial_was_dollar: bool,
    ) -> ParseResult<String> {
        let start = self.pos;
        let mut count = 1usize;
        let mut out = String::new();
        let mut pass_next = false;
        let mut was_dollar = initial_was_dollar;
        let mut was_gtlt = false;

        while count > 0 {
            let Some(ch) = self.advance() else {
                return Err(ParseException::unexpected_eof(
                    format!("unexpected EOF while looking for matching `{}'", close),
                    start,
                ));
            };
            if flags.contains(PairFlags::DOLBRACE)
                && self.dolbrace == DolbraceState::Op
                && !PARAM_OP_CHARS.contains(ch)
            {
                self.dolbrace = DolbraceState::Word;
            }
            if pass_next {
                pass_next = false;
                out.push(ch);
                was_dollar = ch == '$';
                was_gtlt = ch == '<' || ch == '>';
                continue;
            }
            if open == '\'' {
                if ch == close {
                    count -= 1;
                    if count == 0 {
                        break;
                    }
                }
                if ch == '\\' && flags.contains(PairFlags::ALLOWESC) {
                    pass_next = true;
                }
                out.push(ch);
                was_dollar = false;
                was_gtlt = false;
                continue;
            }
            if ch == '\\' {
                if self.peek() == Some('\n') {
                    self.pos += 1;
                } else {
                    pass_next = true;
                    out.push(ch);
                }
                was_dollar = false;
                was_gtlt = false;
                continue;
            }
            if ch == close {
                count -= 1;
                if count == 0 {
                    break;
                }
                out.push(ch);
                was_dollar = false;
                was_gtlt = ch == '<' || ch == '>';
                continue;
            }
            if ch == open && open != close {
                if !(flags.contains(PairFlags::DOLBRACE) && open == '{') {
                    count += 1;
                }
                out.push(ch);
                was_dollar = false;
                was_gtlt = ch == '<' || ch == '>';
                continue;
            }
            if matches!(ch, '\'' | '"' | '`') && open != close {
                let nested_flags = match ch {
                    '\'' if was_dollar => flags | PairFlags::ALLOWESC,
                    '"' => flags | PairFlags::DQUOTE,
                    _ => flags,
                };
                out.push(ch);
                let outer = (ch != '`').then(|| self.quote.enter(ch == '\''));
                let quoted = self.parse_matched_pair(ch, ch, nested_flags, false);
                if let Some(outer) = outer {
                    self.quote.leave(outer);
                }
                out.push_str(&quoted?);
                out.push(ch);
                was_dollar = false;
                was_gtlt = false;
                continue;
            }
            if ch == '$' && !self.at_end() && !flags.contains(PairFlags::EXTGLOB) {
                if was_dollar {
                    out.push(ch);
                    was_dollar = false;
                    was_gtlt = false;
                    continue;
                }
                if let Some(dollar) = self.matched_pair_dollar(flags)? {
                    out.push_str(&dollar.text);
                    was_dollar = dollar.leaves_dollar;
                    was_gtlt = false;
                    continue;
                }
            }
            if ch == '(' && was_gtlt && flags.contains(PairFlags::DOLBRACE | PairFlags::ARRAYSUB) {
                // the direction char was pushed on the previous step
                let direction = out.pop();
                out.push_str(&self.matched_pair_procsub(direction)?);
                was_dollar = false;
                was_gtlt = false;
                continue;
            }
            out.push(ch);
            was_dollar = ch == '$';
            was_gtlt = ch == '<' || ch == '>';
        }
        Ok(out)
    }

    /// A `$` was just consumed inside a matched pair. Returns the text to
    /// append when the following character starts an expansion form.
    fn matched_pair_dollar(&mut self, flags: PairFlags) -> ParseResult<Option<DollarText>> {
        let dollar_pos = self.pos - 1;
        match self.peek() {
            Some('{') => {
                if flags.contains(PairFlags::ARITH)
                    && !self.peek_at(1).is_some_and(is_funsub_char)
                {
                    return Ok(Some(DollarText::literal("$", true)));
                }
                self.pos = dollar_pos;
                let in_dquote = flags.contains(PairFlags::DQUOTE);
                match self.parse_param_expansion(in_dquote)? {
                    Some((_, text)) => Ok(Some(DollarText::literal(text, false))),
                    None => {
                        self.pos = dollar_pos + 1;
                        Ok(Some(DollarText::literal("$", true)))
                    }
                }
            }
            Some('(') => {
                self.pos = dollar_pos;
                let found = if self.peek_at(2) == Some('(') {
                    self.parse_dollar_dparen()?
                } else {
                    self.parse_command_substitution()?
                };
                if let Some((_, text)) = found {
                    return Ok(Some(DollarText::literal(text, false)));
                }
                self.pos = dollar_pos + 2;
                Ok(Some(DollarText::literal("$(", false)))
            }
            Some('[') => {
                self.pos = dollar_pos;
                match self.parse_deprecated_arithmetic()? {
                    Some((_, text)) => Ok(Some(DollarText::literal(text, false))),
                    None => {
                        self.pos = dollar_pos + 1;
                        Ok(Some(DollarText::literal("$", true)))
                    }
                }
            }
            _ => Ok(None),
        }
    }

    /// `<(` or `>(` inside a parameter operand or subscript. The cursor is
    /// just past the `(`.
    fn matched_pair_procsub(&mut self, direction: Option<char>) -> ParseResult<String> {
        let open_pos = self.pos - 1;
        let fallback = |dir: Option<char>| {
            let mut text: String = dir.into_iter().collect();
            text.push('(');
            text
        };
        let Some(dir) = direction else {
            return Ok(fallback(direction));
        };
        self.pos = open_pos - 1;
        match self.parse_process_substitution() {
            Ok((_, text)) if !text.is_empty() => Ok(text),
            Err(e) if e.kind == ErrorKind::LimitExceeded => Err(e),
            Ok(_) | Err(_) => {
                self.pos = open_pos + 1;
                Ok(fallback(Some(dir)))
            }
        }
    }

    /// Track where inside `${...}` the scanner is once the operator is known.
    pub(crate) fn update_dolbrace_for_op(&mut self, op: &str, has_param: bool) {
        if self.dolbrace == DolbraceState::None {
            return;
        }
        let Some(first) = op.chars().next() else {
            return;
        };
        if self.dolbrace == DolbraceState::Param && has_param {
            if matches!(first, '%' | '#' | '^' | ',') {
                self.dolbrace = DolbraceState::Quote;
                return;
            }
            if first == '/' {
                self.dolbrace = DolbraceState::Quote2;
                return;
            }
        }
        if self.dolbrace == DolbraceState::Param && PARAM_OP_CHARS.contains(first) {
            self.dolbrace = DolbraceState::Op;
        }
    }
}

struct DollarText {
    text: String,
    /// The text ends in a bare `$` that may pair with the next one.
    leaves_dollar: bool,
}

impl DollarText {
    fn literal(text: impl Into<String>, leaves_dollar: bool) -> Self {
        Self {
            text: text.into(),
            leaves_dollar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParserOptions;

    fn scan(input: &str, open: char, close: char, flags: PairFlags) -> (String, usize) {
        let mut parser = Parser::new(input, ParserOptions::default());
        // the opening delimiter is consumed by the caller
        parser.pos = 1;
        let text = parser.parse_matched_pair(open, close, flags, false).unwrap();
        (text, parser.pos)
    }

    #[test]
    fn test_nested_parens() {
        let (text, end) = scan("(a (b) c) rest", '(', ')', PairFlags::NONE);
        assert_eq!(text, "a (b) c");
        assert_eq!(end, 9);
    }

    #[test]
    fn test_quotes_hide_close() {
        let (text, _) = scan("{a '}' \"}\" b}", '{', '}', PairFlags::DOLBRACE);
        assert_eq!(text, "a '}' \"}\" b");
    }

    #[test]
    fn test_command_substitution_hides_close() {
        let (text, _) = scan("{x$(echo })y}", '{', '}', PairFlags::DOLBRACE);
        assert_eq!(text, "x$(echo })y");
    }

    #[test]
    fn test_line_continuation_removed() {
        let (text, _) = scan("(a\\\nb)", '(', ')', PairFlags::NONE);
        assert_eq!(text, "ab");
    }

    #[test]
    fn test_escape_passes_close() {
        let (text, _) = scan("(a\\)b)", '(', ')', PairFlags::NONE);
        assert_eq!(text, "a\\)b");
    }

    #[test]
    fn test_unterminated() {
        let mut parser = Parser::new("(abc", ParserOptions::default());
        parser.pos = 1;
        let err = parser
            .parse_matched_pair('(', ')', PairFlags::NONE, false)
            .unwrap_err();
        assert!(err.is_unexpected_eof());
        assert_eq!(err.message, "unexpected EOF while looking for matching `)'");
        assert_eq!(err.position, 1);
    }

    #[test]
    fn test_process_substitution_in_operand() {
        let (text, _) = scan("{x/<(echo })/y}", '{', '}', PairFlags::DOLBRACE);
        assert_eq!(text, "x/<(echo })/y");
    }

    #[test]
    fn test_rescan_consumes_the_same_length() {
        for (input, open, close, flags) in [
            ("{a:-\"$(echo })\" '}'}", '{', '}', PairFlags::DOLBRACE),
            ("(x $((1 + 2)) `y` (z))", '(', ')', PairFlags::NONE),
            ("[i + ${j}]", '[', ']', PairFlags::ARRAYSUB),
            ("(a\\\nb $(c))", '(', ')', PairFlags::NONE),
        ] {
            let (text, _) = scan(input, open, close, flags);
            let again = format!("{}{}{}", open, text, close);
            let (text2, end2) = scan(&again, open, close, flags);
            assert_eq!(text2, text, "rescan of {:?}", input);
            assert_eq!(end2, again.chars().count(), "rescan of {:?}", input);
        }
    }

    #[test]
    fn test_quote_state_restored_after_scan() {
        let mut parser = Parser::new("{a \"b\" 'c'}", ParserOptions::default());
        parser.pos = 1;
        parser.parse_matched_pair('{', '}', PairFlags::DOLBRACE, false).unwrap();
        assert!(!parser.quote.in_quotes());

        let mut parser = Parser::new("{a \"b", ParserOptions::default());
        parser.pos = 1;
        assert!(parser.parse_matched_pair('{', '}', PairFlags::DOLBRACE, false).is_err());
        assert!(!parser.quote.in_quotes());
    }

    #[test]
    fn test_limit_inside_process_substitution_propagates() {
        let options = ParserOptions {
            max_depth: 2,
            ..ParserOptions::default()
        };
        let mut parser = Parser::new("{x/<(echo $(echo $(echo y)))}", options);
        parser.pos = 1;
        let err = parser
            .parse_matched_pair('{', '}', PairFlags::DOLBRACE, false)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::LimitExceeded);
    }

    #[test]
    fn test_dolbrace_tracking() {
        let mut parser = Parser::new("", ParserOptions::default());
        parser.dolbrace = DolbraceState::Param;
        parser.update_dolbrace_for_op("%%", true);
        assert_eq!(parser.dolbrace, DolbraceState::Quote);
        parser.dolbrace = DolbraceState::Param;
        parser.update_dolbrace_for_op("/", true);
        assert_eq!(parser.dolbrace, DolbraceState::Quote2);
        parser.dolbrace = DolbraceState::Param;
        parser.update_dolbrace_for_op(":-", true);
        assert_eq!(parser.dolbrace, DolbraceState::Op);
    }
}
