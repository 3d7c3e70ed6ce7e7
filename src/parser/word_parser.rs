//! Word Reading
//!
//! A word is read straight from the shared cursor. Its text is kept exactly
//! as written (quotes, escapes and all, minus line continuations) while every
//! expansion found along the way is recorded with its character span inside
//! that text.

use super::parser::Parser;
use super::scan_helpers::{
    is_array_assignment_prefix, is_blank, is_expansion_start, is_extglob_prefix, is_metachar,
    is_name_char, is_redirect_char, is_whitespace,
};
use super::state::{PairFlags, ParserMode, WordContext};
use super::types::{ParseException, ParseResult};
use crate::ast::types::{Expansion, QuotedContentNode, WordNode, WordPart};

/// Accumulates the text of a word and the expansions inside it.
#[derive(Debug, Default)]
pub(crate) struct WordBuilder {
    chars: Vec<char>,
    /// Start of the most recently appended piece.
    last_start: usize,
    parts: Vec<WordPart>,
}

impl WordBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, c: char) {
        self.last_start = self.chars.len();
        self.chars.push(c);
    }

    pub(crate) fn push_str(&mut self, s: &str) {
        self.last_start = self.chars.len();
        self.chars.extend(s.chars());
    }

    /// Append the source text of an expansion and record its span.
    pub(crate) fn push_expansion(&mut self, text: &str, expansion: Expansion) {
        self.push_str(text);
        self.parts.push(WordPart {
            start: self.last_start,
            end: self.chars.len(),
            expansion,
        });
    }

    /// Record expansions found inside the last piece, whose spans are
    /// relative to `offset` within that piece.
    pub(crate) fn push_inner_parts(&mut self, offset: usize, inner: Vec<WordPart>) {
        let base = self.last_start + offset;
        self.parts.extend(inner.into_iter().map(|p| WordPart {
            start: p.start + base,
            end: p.end + base,
            expansion: p.expansion,
        }));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub(crate) fn chars(&self) -> &[char] {
        &self.chars
    }

    pub(crate) fn last_piece(&self) -> &[char] {
        &self.chars[self.last_start..]
    }

    pub(crate) fn into_parts(self) -> (String, Vec<WordPart>) {
        (self.chars.into_iter().collect(), self.parts)
    }

    pub(crate) fn finish(self) -> Option<WordNode> {
        if self.chars.is_empty() {
            return None;
        }
        let (value, parts) = self.into_parts();
        Some(WordNode { value, parts })
    }
}

/// `name=` or `name+=` (with optional subscripts) right before a `(`.
fn ends_with_array_assignment(chars: &[char]) -> bool {
    let n = chars.len();
    if n >= 3 && chars[n - 2] == '+' && chars[n - 1] == '=' {
        return is_array_assignment_prefix(&chars[..n - 2]);
    }
    if n >= 2 && chars[n - 1] == '=' {
        return is_array_assignment_prefix(&chars[..n - 1]);
    }
    false
}

impl Parser {
    /// Read one word at the cursor under `ctx`. Returns `None` when nothing
    /// was consumed.
    pub(crate) fn read_word_internal(
        &mut self,
        ctx: WordContext,
        at_command_start: bool,
        in_array_literal: bool,
        in_assign_builtin: bool,
    ) -> ParseResult<Option<WordNode>> {
        let start = self.pos;
        let mut word = WordBuilder::new();
        let mut bracket_depth = 0usize;
        let mut bracket_start: Option<usize> = None;
        let mut seen_equals = false;
        let mut paren_depth = 0usize;
        let mut used_flags = false;

        while let Some(ch) = self.peek() {
            if ctx == WordContext::Regex && ch == '\\' && self.peek_at(1) == Some('\n') {
                self.pos += 2;
                continue;
            }
            if ctx != WordContext::Normal && self.is_word_terminator(ctx, ch, bracket_depth, paren_depth) {
                break;
            }
            if ctx == WordContext::Normal && ch == '[' {
                if bracket_depth > 0 {
                    bracket_depth += 1;
                    self.take_char(&mut word);
                    continue;
                }
                used_flags |= !seen_equals;
                let subscript_ok = !word.is_empty()
                    && at_command_start
                    && !seen_equals
                    && is_array_assignment_prefix(word.chars())
                    && word.last_piece().first().is_some_and(|&c| is_name_char(c));
                let element_ok = word.is_empty() && !seen_equals && in_array_literal;
                if subscript_ok || element_ok {
                    bracket_start = Some(self.pos);
                    bracket_depth += 1;
                    self.take_char(&mut word);
                    continue;
                }
            }
            if ctx == WordContext::Normal && ch == ']' && bracket_depth > 0 {
                bracket_depth -= 1;
                self.take_char(&mut word);
                continue;
            }
            if ctx == WordContext::Normal && ch == '=' && bracket_depth == 0 {
                seen_equals = true;
            }
            if ctx == WordContext::Regex && ch == '(' {
                paren_depth += 1;
                self.take_char(&mut word);
                continue;
            }
            if ctx == WordContext::Regex && ch == ')' {
                if paren_depth == 0 {
                    break;
                }
                paren_depth -= 1;
                self.take_char(&mut word);
                continue;
            }
            if ctx != WordContext::Normal && ch == '[' {
                let for_regex = ctx == WordContext::Regex;
                if !self.read_bracket_expression(&mut word, for_regex, paren_depth)? {
                    self.take_char(&mut word);
                }
                continue;
            }
            if ctx == WordContext::Cond && ch == '(' {
                let after_prefix = word.last_piece().first().is_some_and(|&c| is_extglob_prefix(c));
                if self.extglob() && !word.is_empty() && after_prefix {
                    self.take_char(&mut word);
                    self.read_extglob_body(&mut word)?;
                    continue;
                }
                break;
            }
            if ctx == WordContext::Regex && is_whitespace(ch) && paren_depth > 0 {
                self.take_char(&mut word);
                continue;
            }
            if ch == '\'' {
                self.pos += 1;
                let outer = self.quote.enter(true);
                let quoted = self.read_single_quote(start);
                self.quote.leave(outer);
                let (quoted, saw_newline) = quoted?;
                word.push_str(&quoted);
                if ctx == WordContext::Normal && saw_newline {
                    self.saw_newline_in_single_quote = true;
                }
                continue;
            }
            if ch == '"' {
                self.pos += 1;
                let outer = self.quote.enter(false);
                let scanned = if ctx == WordContext::Normal {
                    self.read_double_quote_in_word(&mut word, start)
                } else {
                    self.scan_double_quote(&mut word, start, ctx == WordContext::Cond)
                };
                self.quote.leave(outer);
                scanned?;
                continue;
            }
            if ch == '\\' && self.peek_at(1).is_some() {
                if ctx != WordContext::Regex && self.peek_at(1) == Some('\n') {
                    self.pos += 2;
                } else {
                    self.take_char(&mut word);
                    self.take_char(&mut word);
                }
                continue;
            }
            if ctx != WordContext::Regex && ch == '$' && self.peek_at(1) == Some('\'') {
                match self.read_ansi_c_quote()? {
                    Some((expansion, text)) => word.push_expansion(&text, expansion),
                    None => self.take_char(&mut word),
                }
                continue;
            }
            if ctx != WordContext::Regex && ch == '$' && self.peek_at(1) == Some('"') {
                match self.read_locale_string()? {
                    Some((expansion, text, inner)) => {
                        word.push_expansion(&text, expansion);
                        // inner spans are relative to the content after `$"`
                        word.push_inner_parts(2, inner);
                    }
                    None => self.take_char(&mut word),
                }
                continue;
            }
            if ch == '$' {
                if !self.parse_dollar_expansion(&mut word)? {
                    self.take_char(&mut word);
                } else if self.extglob()
                    && ctx == WordContext::Normal
                    && matches!(word.last_piece(), ['$', '?' | '*' | '@'])
                    && self.peek() == Some('(')
                {
                    self.take_char(&mut word);
                    self.read_extglob_body(&mut word)?;
                }
                continue;
            }
            if ctx != WordContext::Regex && ch == '`' {
                match self.parse_backtick_substitution()? {
                    Some((expansion, text)) => word.push_expansion(&text, expansion),
                    None => self.take_char(&mut word),
                }
                continue;
            }
            if ctx != WordContext::Regex && is_redirect_char(ch) && self.peek_at(1) == Some('(') {
                match self.parse_process_substitution()? {
                    (Some(expansion), text) => word.push_expansion(&text, expansion),
                    (None, text) if !text.is_empty() => word.push_str(&text),
                    (None, _) => {
                        self.take_char(&mut word);
                        if ctx == WordContext::Normal {
                            self.take_char(&mut word);
                        }
                    }
                }
                continue;
            }
            if ctx == WordContext::Normal
                && ch == '('
                && !word.is_empty()
                && bracket_depth == 0
                && ends_with_array_assignment(word.chars())
            {
                used_flags = true;
                if at_command_start || in_assign_builtin {
                    match self.parse_array_literal()? {
                        Some((expansion, text)) => word.push_expansion(&text, expansion),
                        None => break,
                    }
                    continue;
                }
            }
            if self.extglob()
                && ctx == WordContext::Normal
                && is_extglob_prefix(ch)
                && self.peek_at(1) == Some('(')
            {
                self.take_char(&mut word);
                self.take_char(&mut word);
                self.read_extglob_body(&mut word)?;
                continue;
            }
            if ctx == WordContext::Normal
                && self.mode.contains(ParserMode::EOFTOKEN)
                && self.eof_token == Some(ch)
                && bracket_depth == 0
            {
                if word.is_empty() {
                    self.take_char(&mut word);
                }
                break;
            }
            if ctx == WordContext::Normal && is_metachar(ch) && bracket_depth == 0 {
                break;
            }
            self.take_char(&mut word);
        }

        if let Some(bracket_pos) = bracket_start {
            if bracket_depth > 0 && self.at_end() {
                return Err(ParseException::unexpected_eof(
                    "unexpected EOF looking for `]'",
                    bracket_pos,
                ));
            }
        }
        self.word_used_flags = used_flags;
        Ok(word.finish())
    }

    fn take_char(&mut self, word: &mut WordBuilder) {
        if let Some(c) = self.advance() {
            word.push(c);
        }
    }

    /// The cursor is just past the `(` of an extended glob group; copy the
    /// group through its closing paren.
    fn read_extglob_body(&mut self, word: &mut WordBuilder) -> ParseResult<()> {
        let body = self.parse_matched_pair('(', ')', PairFlags::EXTGLOB, false)?;
        word.push_str(&body);
        word.push(')');
        Ok(())
    }

    /// The cursor is just past an opening `'`. Returns the quoted text
    /// including both quotes and whether it spans a newline.
    pub(crate) fn read_single_quote(&mut self, word_start: usize) -> ParseResult<(String, bool)> {
        let mut text = String::from('\'');
        let mut saw_newline = false;
        while let Some(c) = self.advance() {
            saw_newline |= c == '\n';
            text.push(c);
            if c == '\'' {
                return Ok((text, saw_newline));
            }
        }
        Err(ParseException::new("Unterminated single quote", word_start))
    }

    /// Double-quoted section of an ordinary word. The cursor is just past
    /// the opening `"`.
    fn read_double_quote_in_word(&mut self, word: &mut WordBuilder, word_start: usize) -> ParseResult<()> {
        word.push('"');
        while let Some(c) = self.peek() {
            if c == '"' {
                break;
            }
            match c {
                '\\' if self.peek_at(1).is_some() => {
                    if self.peek_at(1) == Some('\n') {
                        self.pos += 2;
                    } else {
                        self.take_char(word);
                        self.take_char(word);
                    }
                }
                '$' => {
                    if !self.parse_dollar_expansion(word)? {
                        self.take_char(word);
                    }
                }
                '`' => match self.parse_backtick_substitution()? {
                    Some((expansion, text)) => word.push_expansion(&text, expansion),
                    None => self.take_char(word),
                },
                _ => self.take_char(word),
            }
        }
        if self.at_end() {
            return Err(ParseException::new("Unterminated double quote", word_start));
        }
        self.take_char(word);
        Ok(())
    }

    /// Double-quoted section inside `[[ ]]` or a regex. The cursor is just
    /// past the opening `"`.
    pub(crate) fn scan_double_quote(
        &mut self,
        word: &mut WordBuilder,
        word_start: usize,
        handle_line_continuation: bool,
    ) -> ParseResult<()> {
        word.push('"');
        while let Some(c) = self.peek() {
            if c == '"' {
                break;
            }
            if c == '\\' && self.peek_at(1).is_some() {
                if handle_line_continuation && self.peek_at(1) == Some('\n') {
                    self.pos += 2;
                } else {
                    self.take_char(word);
                    self.take_char(word);
                }
            } else if c == '$' {
                if !self.parse_dollar_expansion(word)? {
                    self.take_char(word);
                }
            } else {
                self.take_char(word);
            }
        }
        if self.at_end() {
            return Err(ParseException::new("Unterminated double quote", word_start));
        }
        self.take_char(word);
        Ok(())
    }

    /// A `[...]` bracket expression inside `[[ ]]`. Returns false when the
    /// `[` should be taken literally.
    fn read_bracket_expression(
        &mut self,
        word: &mut WordBuilder,
        for_regex: bool,
        paren_depth: usize,
    ) -> ParseResult<bool> {
        if for_regex {
            if !self.regex_bracket_will_close(paren_depth) {
                return Ok(false);
            }
        } else {
            match self.peek_at(1) {
                None => return Ok(false),
                Some(c) if is_blank(c) || c == '&' || c == '|' => return Ok(false),
                Some(_) => {}
            }
        }
        self.take_char(word);
        if self.peek() == Some('^') {
            self.take_char(word);
        }
        if self.peek() == Some(']') {
            self.take_char(word);
        }
        while let Some(c) = self.peek() {
            if c == ']' {
                self.take_char(word);
                break;
            }
            let class_close = match (c, self.peek_at(1)) {
                ('[', Some(':')) => Some(':'),
                ('[', Some('=')) if !for_regex => Some('='),
                ('[', Some('.')) if !for_regex => Some('.'),
                _ => None,
            };
            if let Some(close) = class_close {
                self.take_char(word);
                self.take_char(word);
                while self.peek().is_some() && !(self.peek() == Some(close) && self.peek_at(1) == Some(']')) {
                    self.take_char(word);
                }
                if !self.at_end() {
                    self.take_char(word);
                    self.take_char(word);
                }
            } else if for_regex && c == '$' {
                if !self.parse_dollar_expansion(word)? {
                    self.take_char(word);
                }
            } else {
                self.take_char(word);
            }
        }
        Ok(true)
    }

    /// Look ahead from a `[` in a regex for its closing `]` before the
    /// regex itself ends.
    fn regex_bracket_will_close(&self, paren_depth: usize) -> bool {
        let s = &self.source;
        let at = |i: usize| s.get(i).copied();
        let mut scan = self.pos + 1;
        if at(scan) == Some('^') {
            scan += 1;
        }
        if at(scan) == Some(']') {
            scan += 1;
        }
        while let Some(c) = at(scan) {
            match c {
                ']' if at(scan + 1) == Some(']') => return false,
                ')' if paren_depth > 0 => return false,
                '&' if at(scan + 1) == Some('&') => return false,
                ']' => return true,
                '[' if at(scan + 1) == Some(':') => {
                    scan += 2;
                    while at(scan).is_some() && !(at(scan) == Some(':') && at(scan + 1) == Some(']')) {
                        scan += 1;
                    }
                    if scan < s.len() {
                        scan += 2;
                    }
                }
                _ => scan += 1,
            }
        }
        false
    }

    /// `$'...'` at the cursor.
    pub(crate) fn read_ansi_c_quote(&mut self) -> ParseResult<Option<(Expansion, String)>> {
        if !self.lookahead_is("$'") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;
        let mut content = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(ParseException::unexpected_eof(
                        "unexpected EOF while looking for matching `''",
                        start,
                    ))
                }
                Some('\'') => break,
                Some('\\') => {
                    content.push('\\');
                    if let Some(c) = self.advance() {
                        content.push(c);
                    }
                }
                Some(c) => content.push(c),
            }
        }
        let text = self.slice(start, self.pos);
        Ok(Some((Expansion::AnsiCQuote(QuotedContentNode { content }), text)))
    }

    /// `$"..."` at the cursor. Expansions inside are returned with spans
    /// relative to the start of the content.
    pub(crate) fn read_locale_string(
        &mut self,
    ) -> ParseResult<Option<(Expansion, String, Vec<WordPart>)>> {
        if !self.lookahead_is("$\"") {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;
        let mut inner = WordBuilder::new();
        let mut closed = false;
        while let Some(c) = self.peek() {
            if c == '"' {
                self.pos += 1;
                closed = true;
                break;
            }
            if c == '\\' && self.peek_at(1).is_some() {
                if self.peek_at(1) == Some('\n') {
                    self.pos += 2;
                } else {
                    self.take_char(&mut inner);
                    self.take_char(&mut inner);
                }
            } else if self.lookahead_is("$((") {
                match self.parse_dollar_dparen()? {
                    Some((expansion, text)) => inner.push_expansion(&text, expansion),
                    None => self.take_char(&mut inner),
                }
            } else if is_expansion_start(&self.source, self.pos, "$(") {
                match self.parse_command_substitution()? {
                    Some((expansion, text)) => inner.push_expansion(&text, expansion),
                    None => self.take_char(&mut inner),
                }
            } else if c == '$' {
                match self.parse_param_expansion(false)? {
                    Some((expansion, text)) => inner.push_expansion(&text, expansion),
                    None => self.take_char(&mut inner),
                }
            } else if c == '`' {
                match self.parse_backtick_substitution()? {
                    Some((expansion, text)) => inner.push_expansion(&text, expansion),
                    None => self.take_char(&mut inner),
                }
            } else {
                self.take_char(&mut inner);
            }
        }
        if !closed {
            self.pos = start;
            return Ok(None);
        }
        let (content, parts) = inner.into_parts();
        let text = format!("$\"{}\"", content);
        Ok(Some((Expansion::LocaleString(QuotedContentNode { content }), text, parts)))
    }

    /// Any `$` form at the cursor. Returns false when the `$` is literal.
    pub(crate) fn parse_dollar_expansion(&mut self, word: &mut WordBuilder) -> ParseResult<bool> {
        let parsed = match (self.peek_at(1), self.peek_at(2)) {
            (Some('('), Some('(')) => self.parse_dollar_dparen()?,
            (Some('['), _) => self.parse_deprecated_arithmetic()?,
            (Some('('), _) => self.parse_command_substitution()?,
            _ => self.parse_param_expansion(self.quote.double)?,
        };
        match parsed {
            Some((expansion, text)) => {
                word.push_expansion(&text, expansion);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Read the next word token. The flags steer how `[` and `(` are read;
    /// the caller's flags are put back afterwards.
    pub(crate) fn parse_word(
        &mut self,
        at_command_start: bool,
        in_array_literal: bool,
        in_assign_builtin: bool,
    ) -> ParseResult<Option<WordNode>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        let saved = self.swap_word_flags((at_command_start, in_array_literal, in_assign_builtin));
        let result = self.next_word_token();
        self.swap_word_flags(saved);
        result
    }

    /// Install new (command-start, array-literal, assign-builtin) flags and
    /// return the old ones.
    pub(crate) fn swap_word_flags(&mut self, flags: (bool, bool, bool)) -> (bool, bool, bool) {
        let old = (self.at_command_start, self.in_array_literal, self.in_assign_builtin);
        (self.at_command_start, self.in_array_literal, self.in_assign_builtin) = flags;
        old
    }

    fn next_word_token(&mut self) -> ParseResult<Option<WordNode>> {
        let token = self.peek_token()?;
        if token.word.is_none() {
            return Ok(None);
        }
        Ok(self.next_token()?.word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParserOptions;

    fn read(input: &str) -> WordNode {
        read_with(input, ParserOptions::default())
    }

    fn read_with(input: &str, options: ParserOptions) -> WordNode {
        let mut parser = Parser::new(input, options);
        parser
            .read_word_internal(WordContext::Normal, true, false, false)
            .unwrap()
            .unwrap()
    }

    fn kinds(word: &WordNode) -> Vec<&'static str> {
        word.parts.iter().map(|p| p.expansion.kind()).collect()
    }

    fn span(word: &WordNode, index: usize) -> String {
        let part = &word.parts[index];
        word.value.chars().skip(part.start).take(part.end - part.start).collect()
    }

    #[test]
    fn test_plain_word_stops_at_metachar() {
        let mut parser = Parser::new("abc;def", ParserOptions::default());
        let word = parser
            .read_word_internal(WordContext::Normal, false, false, false)
            .unwrap()
            .unwrap();
        assert_eq!(word.value, "abc");
        assert!(word.is_literal());
        assert_eq!(parser.pos, 3);
    }

    #[test]
    fn test_quotes_are_kept() {
        let word = read("'a b'\"c $x\"d");
        assert_eq!(word.value, "'a b'\"c $x\"d");
        assert_eq!(kinds(&word), vec!["param"]);
        assert_eq!(span(&word, 0), "$x");
    }

    #[test]
    fn test_line_continuation_dropped() {
        assert_eq!(read("ab\\\ncd").value, "abcd");
        assert_eq!(read("a\\ b").value, "a\\ b");
    }

    #[test]
    fn test_expansion_spans() {
        let word = read("pre${x:-y}$(cmd)`b`post");
        assert_eq!(kinds(&word), vec!["param", "cmdsub", "cmdsub"]);
        assert_eq!(span(&word, 0), "${x:-y}");
        assert_eq!(span(&word, 1), "$(cmd)");
        assert_eq!(span(&word, 2), "`b`");
    }

    #[test]
    fn test_ansi_c_and_locale() {
        let word = read("$'a\\'b'");
        let Expansion::AnsiCQuote(quoted) = &word.parts[0].expansion else {
            panic!("Expected ANSI-C quote");
        };
        assert_eq!(quoted.content, "a\\'b");

        let word = read("$\"hi $USER\"");
        assert_eq!(kinds(&word), vec!["locale", "param"]);
        assert_eq!(span(&word, 1), "$USER");
    }

    #[test]
    fn test_array_assignment() {
        let word = read("arr=(a b c)");
        assert_eq!(word.value, "arr=(a b c)");
        let Expansion::Array(array) = &word.parts[0].expansion else {
            panic!("Expected array");
        };
        let values: Vec<&str> = array.elements.iter().map(|w| w.value.as_str()).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_subscript_assignment() {
        let word = read("a[i + 1]=x");
        assert_eq!(word.value, "a[i + 1]=x");
    }

    #[test]
    fn test_extglob_group() {
        let word = read_with("@(a|b)", ParserOptions::with_extglob(true));
        assert_eq!(word.value, "@(a|b)");
        let word = read_with("$@(x)", ParserOptions::with_extglob(true));
        assert_eq!(word.value, "$@(x)");
    }

    #[test]
    fn test_unterminated_quotes() {
        let mut parser = Parser::new("x'abc", ParserOptions::default());
        let err = parser
            .read_word_internal(WordContext::Normal, false, false, false)
            .unwrap_err();
        assert_eq!(err.message, "Unterminated single quote");
        assert_eq!(err.position, 0);

        let mut parser = Parser::new("\"abc", ParserOptions::default());
        let err = parser
            .read_word_internal(WordContext::Normal, false, false, false)
            .unwrap_err();
        assert_eq!(err.message, "Unterminated double quote");
    }

    #[test]
    fn test_cond_context_brackets() {
        let mut parser = Parser::new("[a-z]* ]]", ParserOptions::default());
        let word = parser
            .read_word_internal(WordContext::Cond, false, false, false)
            .unwrap()
            .unwrap();
        assert_eq!(word.value, "[a-z]*");
    }

    #[test]
    fn test_regex_context_keeps_parens_and_spaces() {
        let mut parser = Parser::new("^(a b)+$ ]]", ParserOptions::default());
        let word = parser
            .read_word_internal(WordContext::Regex, false, false, false)
            .unwrap()
            .unwrap();
        assert_eq!(word.value, "^(a b)+$");
    }

    #[test]
    fn test_process_substitution_part() {
        let word = read("<(ls -l)");
        assert_eq!(kinds(&word), vec!["procsub"]);
        assert_eq!(span(&word, 0), "<(ls -l)");
    }

    #[test]
    fn test_parse_word_restores_caller_flags() {
        let mut parser = Parser::new("  a=(1 [2]=x)", ParserOptions::default());
        let word = parser.parse_word(true, false, false).unwrap().unwrap();
        assert_eq!(word.value, "a=(1 [2]=x)");
        assert_eq!(word.parts.len(), 1);
        assert!(!parser.at_command_start);
        assert!(parser.at_end());

        parser = Parser::new("x", ParserOptions::default());
        parser.in_assign_builtin = true;
        parser.parse_word(true, true, false).unwrap().unwrap();
        assert!(parser.in_assign_builtin);
        assert!(!parser.at_command_start && !parser.in_array_literal);
    }

    #[test]
    fn test_flag_free_word_is_read_once() {
        let mut parser = Parser::new("$(echo a) b", ParserOptions::default());
        parser.peek_token().unwrap();
        // a second read would see the edit
        parser.source[2] = 'x';
        let word = parser.parse_word(true, false, false).unwrap().unwrap();
        assert_eq!(word.value, "$(echo a)");

        let mut parser = Parser::new("a=(1) b", ParserOptions::default());
        let peeked = parser.peek_token().unwrap();
        assert_eq!(peeked.value, "a=");
        let word = parser.parse_word(true, false, false).unwrap().unwrap();
        assert_eq!(word.value, "a=(1)");
    }
}
