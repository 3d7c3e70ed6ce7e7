//! Scan Helpers
//!
//! Free functions that look ahead over raw source characters without
//! touching parser state. They locate the ends of quoted regions,
//! substitutions and heredocs so callers can slice text out of the source.

// =============================================================================
// CHARACTER CLASSES
// =============================================================================

pub fn is_metachar(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|' | '&' | ';' | '(' | ')' | '<' | '>')
}

/// Characters after `${` that start a funsub.
pub fn is_funsub_char(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|')
}

pub fn is_extglob_prefix(c: char) -> bool {
    matches!(c, '@' | '?' | '*' | '+' | '!')
}

pub fn is_redirect_char(c: char) -> bool {
    c == '<' || c == '>'
}

pub fn is_special_param(c: char) -> bool {
    matches!(c, '?' | '$' | '!' | '#' | '@' | '*' | '-' | '&')
}

pub fn is_special_param_unbraced(c: char) -> bool {
    matches!(c, '?' | '$' | '!' | '#' | '@' | '*' | '-')
}

pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

pub fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

pub fn is_word_end_context(c: char) -> bool {
    is_metachar(c)
}

/// Characters that may follow a `!` for it to be a pipeline negation.
pub fn is_negation_boundary(c: char) -> bool {
    is_whitespace(c) || matches!(c, ';' | '|' | ')' | '&' | '>' | '<')
}

pub fn is_simple_param_op(c: char) -> bool {
    matches!(c, '-' | '=' | '?' | '+')
}

pub fn is_escape_char_in_backtick(c: char) -> bool {
    matches!(c, '$' | '`' | '\\')
}

pub fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => chars.all(is_name_char),
        _ => false,
    }
}

// =============================================================================
// POSITION HELPERS
// =============================================================================

pub fn starts_with(s: &[char], pos: usize, prefix: &str) -> bool {
    let mut i = pos;
    for p in prefix.chars() {
        if i >= s.len() || s[i] != p {
            return false;
        }
        i += 1;
    }
    true
}

/// Number of unescaped `$` immediately before `pos`.
pub fn count_consecutive_dollars_before(s: &[char], pos: usize) -> usize {
    let mut count = 0;
    let mut k = pos;
    while k > 0 && s[k - 1] == '$' {
        let mut backslashes = 0;
        let mut j = k - 1;
        while j > 0 && s[j - 1] == '\\' {
            backslashes += 1;
            j -= 1;
        }
        if backslashes % 2 == 1 {
            break;
        }
        count += 1;
        k -= 1;
    }
    count
}

/// `delimiter` starts at `pos` and is not the tail of a `$$` pair.
pub fn is_expansion_start(s: &[char], pos: usize, delimiter: &str) -> bool {
    starts_with(s, pos, delimiter) && count_consecutive_dollars_before(s, pos) % 2 == 0
}

/// Keyword at `pos` is not glued to identifier characters on either side.
pub fn is_word_boundary(s: &[char], pos: usize, word_len: usize) -> bool {
    if pos > 0 {
        let prev = s[pos - 1];
        if is_name_char(prev) || matches!(prev, '{' | '}' | '!') {
            return false;
        }
    }
    let end = pos + word_len;
    !(end < s.len() && is_name_char(s[end]))
}

pub fn count_trailing_backslashes(s: &str) -> usize {
    s.chars().rev().take_while(|&c| c == '\\').count()
}

pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_ws = false;
    for c in s.chars() {
        if c == ' ' || c == '\t' {
            if !prev_ws {
                out.push(' ');
            }
            prev_ws = true;
        } else {
            out.push(c);
            prev_ws = false;
        }
    }
    out.trim().to_string()
}

// =============================================================================
// SKIPPERS
// =============================================================================

/// Position after the closing `'`; `start` is just past the opening quote.
pub fn skip_single_quoted(s: &[char], start: usize) -> usize {
    let mut i = start;
    while i < s.len() && s[i] != '\'' {
        i += 1;
    }
    if i < s.len() {
        i + 1
    } else {
        i
    }
}

/// Position after the closing `"`; `start` is just past the opening quote.
pub fn skip_double_quoted(s: &[char], start: usize) -> usize {
    let n = s.len();
    let mut i = start;
    let mut pass_next = false;
    let mut backq = false;
    while i < n {
        let c = s[i];
        if pass_next {
            pass_next = false;
            i += 1;
            continue;
        }
        if c == '\\' {
            pass_next = true;
            i += 1;
            continue;
        }
        if backq {
            if c == '`' {
                backq = false;
            }
            i += 1;
            continue;
        }
        if c == '`' {
            backq = true;
            i += 1;
            continue;
        }
        if c == '$' && i + 1 < n {
            if s[i + 1] == '(' {
                i = find_cmdsub_end(s, i + 2);
                continue;
            }
            if s[i + 1] == '{' {
                i = find_braced_param_end(s, i + 2);
                continue;
            }
        }
        if c == '"' {
            return i + 1;
        }
        i += 1;
    }
    i
}

pub fn skip_backtick(s: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < s.len() && s[i] != '`' {
        if s[i] == '\\' && i + 1 < s.len() {
            i += 2;
        } else {
            i += 1;
        }
    }
    if i < s.len() {
        i += 1;
    }
    i
}

/// `$((` at `start` closes with `))` at paren depth zero.
pub fn is_valid_arithmetic_start(s: &[char], start: usize) -> bool {
    let mut depth = 0usize;
    let mut i = start + 3;
    while i < s.len() {
        if is_expansion_start(s, i, "$(") {
            i = find_cmdsub_end(s, i + 2);
            continue;
        }
        match s[i] {
            '(' => depth += 1,
            ')' => {
                if depth > 0 {
                    depth -= 1;
                } else {
                    return i + 1 < s.len() && s[i + 1] == ')';
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Whether an `esac` closing `case_depth` appears before an unbalanced `)`.
pub fn lookahead_for_esac(s: &[char], start: usize, case_depth: usize) -> bool {
    let mut i = start;
    let mut depth = case_depth;
    let mut single = false;
    let mut double = false;
    while i < s.len() {
        let c = s[i];
        if c == '\\' && i + 1 < s.len() && double {
            i += 2;
            continue;
        }
        if c == '\'' && !double {
            single = !single;
            i += 1;
            continue;
        }
        if c == '"' && !single {
            double = !double;
            i += 1;
            continue;
        }
        if single || double {
            i += 1;
            continue;
        }
        if starts_with(s, i, "case") && is_word_boundary(s, i, 4) {
            depth += 1;
            i += 4;
        } else if starts_with(s, i, "esac") && is_word_boundary(s, i, 4) {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return true;
            }
            i += 4;
        } else if c == ')' && depth == 0 {
            break;
        } else {
            i += 1;
        }
    }
    false
}

/// End of a `$(...)` whose body starts at `start`: the position after `)`.
pub fn find_cmdsub_end(s: &[char], start: usize) -> usize {
    let n = s.len();
    let mut depth = 1usize;
    let mut i = start;
    let mut case_depth = 0usize;
    let mut in_case_patterns = false;
    let mut arith_depth = 0usize;
    let mut arith_paren_depth = 0usize;
    while i < n && depth > 0 {
        let c = s[i];
        if c == '\\' && i + 1 < n {
            i += 2;
            continue;
        }
        if c == '\'' {
            i = skip_single_quoted(s, i + 1);
            continue;
        }
        if c == '"' {
            i = skip_double_quoted(s, i + 1);
            continue;
        }
        if c == '#'
            && arith_depth == 0
            && (i == start || matches!(s[i - 1], ' ' | '\t' | '\n' | ';' | '|' | '&' | '(' | ')'))
        {
            while i < n && s[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if starts_with(s, i, "<<<") {
            i = skip_herestring_word(s, i + 3);
            continue;
        }
        if is_expansion_start(s, i, "$((") {
            if is_valid_arithmetic_start(s, i) {
                arith_depth += 1;
                i += 3;
            } else {
                i = find_cmdsub_end(s, i + 2);
            }
            continue;
        }
        if arith_depth > 0 && arith_paren_depth == 0 && starts_with(s, i, "))") {
            arith_depth -= 1;
            i += 2;
            continue;
        }
        if c == '`' {
            i = skip_backtick(s, i);
            continue;
        }
        if arith_depth == 0 && starts_with(s, i, "<<") {
            i = skip_heredoc(s, i);
            continue;
        }
        if starts_with(s, i, "case") && is_word_boundary(s, i, 4) {
            case_depth += 1;
            in_case_patterns = false;
            i += 4;
            continue;
        }
        if case_depth > 0 && starts_with(s, i, "in") && is_word_boundary(s, i, 2) {
            in_case_patterns = true;
            i += 2;
            continue;
        }
        if starts_with(s, i, "esac") && is_word_boundary(s, i, 4) {
            if case_depth > 0 {
                case_depth -= 1;
                in_case_patterns = false;
            }
            i += 4;
            continue;
        }
        if starts_with(s, i, ";;") {
            i += 2;
            continue;
        }
        let in_patterns = in_case_patterns && case_depth > 0;
        if c == '(' {
            if !in_patterns {
                if arith_depth > 0 {
                    arith_paren_depth += 1;
                } else {
                    depth += 1;
                }
            }
        } else if c == ')' {
            if in_patterns {
                if !lookahead_for_esac(s, i + 1, case_depth) {
                    depth -= 1;
                }
            } else if arith_depth > 0 {
                arith_paren_depth = arith_paren_depth.saturating_sub(1);
            } else {
                depth -= 1;
            }
        }
        i += 1;
    }
    i
}

fn skip_herestring_word(s: &[char], start: usize) -> usize {
    let n = s.len();
    let mut i = start;
    while i < n && is_blank(s[i]) {
        i += 1;
    }
    if i < n && s[i] == '"' {
        i += 1;
        while i < n && s[i] != '"' {
            i += if s[i] == '\\' && i + 1 < n { 2 } else { 1 };
        }
        if i < n {
            i += 1;
        }
    } else if i < n && s[i] == '\'' {
        i = skip_single_quoted(s, i + 1);
    } else {
        while i < n && !matches!(s[i], ' ' | '\t' | '\n' | ';' | '|' | '&' | '<' | '>' | '(' | ')') {
            i += 1;
        }
    }
    i
}

/// End of a `${...}` whose body starts at `start`: the position after `}`.
pub fn find_braced_param_end(s: &[char], start: usize) -> usize {
    #[derive(PartialEq)]
    enum State {
        Param,
        Quote,
        Word,
    }
    let n = s.len();
    let mut depth = 1usize;
    let mut i = start;
    let mut in_double = false;
    let mut state = State::Param;
    while i < n && depth > 0 {
        let c = s[i];
        if c == '\\' && i + 1 < n {
            i += 2;
            continue;
        }
        if c == '\'' && state == State::Quote && !in_double {
            i = skip_single_quoted(s, i + 1);
            continue;
        }
        if c == '"' {
            in_double = !in_double;
            i += 1;
            continue;
        }
        if in_double {
            i += 1;
            continue;
        }
        if state == State::Param && matches!(c, '%' | '#' | '^' | ',') {
            state = State::Quote;
        } else if state == State::Param && matches!(c, ':' | '-' | '=' | '?' | '+' | '/') {
            state = State::Word;
        }
        if c == '[' && state == State::Param {
            if let Some(end) = skip_subscript(s, i, false) {
                i = end;
                continue;
            }
        }
        if is_redirect_char(c) && i + 1 < n && s[i + 1] == '(' {
            i = find_cmdsub_end(s, i + 2);
            continue;
        }
        if c == '{' {
            depth += 1;
        } else if c == '}' {
            depth -= 1;
            if depth == 0 {
                return i + 1;
            }
        }
        if is_expansion_start(s, i, "$(") {
            i = find_cmdsub_end(s, i + 2);
            continue;
        }
        if is_expansion_start(s, i, "${") {
            i = find_braced_param_end(s, i + 2);
            continue;
        }
        i += 1;
    }
    i
}

/// Read one physical line starting at `start`, joining lines whose trailing
/// backslash count is odd. Returns the logical line and the index of the
/// newline (or end of input) that ends it.
fn read_joined_line(s: &[char], start: usize) -> (String, usize) {
    let n = s.len();
    let mut end = start;
    while end < n && s[end] != '\n' {
        end += 1;
    }
    let mut line: String = s[start..end].iter().collect();
    while end < n {
        if count_trailing_backslashes(&line) % 2 == 0 {
            break;
        }
        line.pop();
        end += 1;
        let next = end;
        while end < n && s[end] != '\n' {
            end += 1;
        }
        line.extend(&s[next..end]);
    }
    (line, end)
}

/// Scan heredoc body lines from `pos` until `delimiter`. Returns the
/// position after the terminating line, or the position just past the
/// delimiter when a line merely starts with it.
fn scan_heredoc_body(s: &[char], mut pos: usize, delimiter: &str, strip_tabs: bool) -> usize {
    let n = s.len();
    let delim_len = delimiter.chars().count();
    while pos < n {
        let line_start = pos;
        let (line, line_end) = read_joined_line(s, pos);
        let stripped = if strip_tabs {
            line.trim_start_matches('\t')
        } else {
            line.as_str()
        };
        if stripped == delimiter {
            return if line_end < n { line_end + 1 } else { line_end };
        }
        if stripped.starts_with(delimiter) && stripped.chars().count() > delim_len {
            let tabs = line.chars().count() - stripped.chars().count();
            return line_start + tabs + delim_len;
        }
        pos = if line_end < n { line_end + 1 } else { line_end };
    }
    pos
}

/// Skip a `<<`/`<<-` heredoc at `start` inside command-substitution text,
/// including its body.
pub fn skip_heredoc(s: &[char], start: usize) -> usize {
    let n = s.len();
    let strip_tabs = start + 2 < n && s[start + 2] == '-';
    let mut i = start + 2;
    if strip_tabs {
        i += 1;
    }
    while i < n && is_blank(s[i]) {
        i += 1;
    }
    let delimiter: String;
    if i < n && (s[i] == '"' || s[i] == '\'') {
        let quote = s[i];
        i += 1;
        let delim_start = i;
        while i < n && s[i] != quote {
            i += 1;
        }
        delimiter = s[delim_start..i].iter().collect();
        if i < n {
            i += 1;
        }
    } else {
        if i < n && s[i] == '\\' {
            i += 1;
            let delim_start = i;
            if i < n {
                i += 1;
            }
            while i < n && !is_metachar(s[i]) {
                i += 1;
            }
            delimiter = s[delim_start..i].iter().collect();
        } else {
            let delim_start = i;
            while i < n && !is_metachar(s[i]) {
                i += 1;
            }
            delimiter = s[delim_start..i].iter().collect();
        }
    }

    // rest of the operator's line
    let mut paren_depth = 0usize;
    let mut single = false;
    let mut double = false;
    let mut in_backtick = false;
    while i < n && s[i] != '\n' {
        let c = s[i];
        if c == '\\' && i + 1 < n && (double || in_backtick) {
            i += 2;
            continue;
        }
        if c == '\'' && !double && !in_backtick {
            single = !single;
            i += 1;
            continue;
        }
        if c == '"' && !single && !in_backtick {
            double = !double;
            i += 1;
            continue;
        }
        if c == '`' && !single {
            in_backtick = !in_backtick;
            i += 1;
            continue;
        }
        if single || double || in_backtick {
            i += 1;
            continue;
        }
        if c == '(' {
            paren_depth += 1;
        } else if c == ')' {
            if paren_depth == 0 {
                break;
            }
            paren_depth -= 1;
        }
        i += 1;
    }
    if i < n && s[i] == ')' {
        return i;
    }
    if i < n && s[i] == '\n' {
        i += 1;
    }
    scan_heredoc_body(s, i, &delimiter, strip_tabs)
}

/// Locate the heredoc bodies that follow the line containing `start`.
/// Returns `(content_start, end)` where `content_start` is the newline
/// ending that line; both equal `start` when there is nothing to skip.
pub fn find_heredoc_content_end(
    s: &[char],
    start: usize,
    delimiters: &[(String, bool)],
) -> (usize, usize) {
    if delimiters.is_empty() {
        return (start, start);
    }
    let mut pos = start;
    while pos < s.len() && s[pos] != '\n' {
        pos += 1;
    }
    if pos >= s.len() {
        return (start, start);
    }
    let content_start = pos;
    pos += 1;
    for (delimiter, strip_tabs) in delimiters {
        pos = scan_heredoc_body(s, pos, delimiter, *strip_tabs);
    }
    (content_start, pos)
}

/// Skip a balanced `open`/`close` region. With `past_open` the scan starts
/// inside the region; with `literal` quotes and expansions are not special.
/// Returns the position after the closer.
pub fn skip_matched_pair(
    s: &[char],
    start: usize,
    open: char,
    close: char,
    past_open: bool,
    literal: bool,
) -> Option<usize> {
    let n = s.len();
    let mut i = if past_open {
        start
    } else {
        if start >= n || s[start] != open {
            return None;
        }
        start + 1
    };
    let mut depth = 1usize;
    let mut pass_next = false;
    let mut backq = false;
    while i < n && depth > 0 {
        let c = s[i];
        if pass_next {
            pass_next = false;
            i += 1;
            continue;
        }
        if !literal && c == '\\' {
            pass_next = true;
            i += 1;
            continue;
        }
        if backq {
            if c == '`' {
                backq = false;
            }
            i += 1;
            continue;
        }
        if !literal {
            if c == '`' {
                backq = true;
                i += 1;
                continue;
            }
            if c == '\'' {
                i = skip_single_quoted(s, i + 1);
                continue;
            }
            if c == '"' {
                i = skip_double_quoted(s, i + 1);
                continue;
            }
            if is_expansion_start(s, i, "$(") {
                i = find_cmdsub_end(s, i + 2);
                continue;
            }
            if is_expansion_start(s, i, "${") {
                i = find_braced_param_end(s, i + 2);
                continue;
            }
        }
        if !literal && c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
        }
        i += 1;
    }
    if depth == 0 {
        Some(i)
    } else {
        None
    }
}

pub fn skip_subscript(s: &[char], start: usize, literal: bool) -> Option<usize> {
    skip_matched_pair(s, start, '[', ']', false, literal)
}

/// Index of the `=` if `s` is an assignment word (`name=`, `name+=`,
/// `name[sub]=`, `name[sub]+=`).
pub fn assignment(s: &str) -> Option<usize> {
    let chars: Vec<char> = s.chars().collect();
    if !chars.first().copied().is_some_and(is_name_start) {
        return None;
    }
    let mut i = 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '=' {
            return Some(i);
        }
        if c == '[' {
            i = skip_subscript(&chars, i, false)?;
            if i < chars.len() && chars[i] == '+' {
                i += 1;
            }
            return (i < chars.len() && chars[i] == '=').then_some(i);
        }
        if c == '+' {
            return (i + 1 < chars.len() && chars[i + 1] == '=').then_some(i + 1);
        }
        if !is_name_char(c) {
            return None;
        }
        i += 1;
    }
    None
}

/// `chars` is a name optionally followed by literal subscripts.
pub fn is_array_assignment_prefix(chars: &[char]) -> bool {
    if !chars.first().copied().is_some_and(is_name_start) {
        return false;
    }
    let mut i = 1;
    while i < chars.len() && is_name_char(chars[i]) {
        i += 1;
    }
    while i < chars.len() {
        if chars[i] != '[' {
            return false;
        }
        match skip_subscript(chars, i, true) {
            Some(end) => i = end,
            None => return false,
        }
    }
    true
}

/// Remove backslash-newline continuations, keeping the newline that ends a
/// comment.
pub fn strip_line_continuations_comment_aware(text: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_comment = false;
    let mut single = false;
    let mut double = false;
    let mut i = 0;
    while i < text.len() {
        let c = text[i];
        if c == '\\' && i + 1 < text.len() && text[i + 1] == '\n' {
            let preceding = text[..i].iter().rev().take_while(|&&b| b == '\\').count();
            if preceding % 2 == 0 {
                if in_comment {
                    out.push('\n');
                }
                i += 2;
                in_comment = false;
                continue;
            }
        }
        if c == '\n' {
            in_comment = false;
            out.push(c);
            i += 1;
            continue;
        }
        if c == '\'' && !double && !in_comment {
            single = !single;
        } else if c == '"' && !single && !in_comment {
            double = !double;
        } else if c == '#' && !single && !in_comment {
            in_comment = true;
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Collapse runs of blanks inside `$(..)`, `${..}`, `<(..)` and `>(..)` so
/// delimiters compare equal regardless of spacing.
pub fn normalize_heredoc_delimiter(delimiter: &str) -> String {
    let d: Vec<char> = delimiter.chars().collect();
    let mut out = String::with_capacity(delimiter.len());
    let mut i = 0;
    while i < d.len() {
        let group = if starts_with(&d, i, "$(") {
            Some(('(', ')'))
        } else if starts_with(&d, i, "${") {
            Some(('{', '}'))
        } else if i + 1 < d.len() && is_redirect_char(d[i]) && d[i + 1] == '(' {
            Some(('(', ')'))
        } else {
            None
        };
        let Some((open, close)) = group else {
            out.push(d[i]);
            i += 1;
            continue;
        };
        out.push(d[i]);
        out.push(d[i + 1]);
        i += 2;
        let mut depth = 1;
        let mut inner = String::new();
        while i < d.len() && depth > 0 {
            let c = d[i];
            if c == open {
                depth += 1;
                inner.push(c);
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    out.push_str(&collapse_whitespace(&inner));
                    out.push(close);
                } else {
                    inner.push(c);
                }
            } else {
                inner.push(c);
            }
            i += 1;
        }
    }
    out
}

/// Byte value of a single-character ANSI-C escape such as `\n`.
pub fn ansi_c_escape(c: char) -> Option<u8> {
    match c {
        'a' => Some(0x07),
        'b' => Some(0x08),
        'e' | 'E' => Some(0x1B),
        'f' => Some(0x0C),
        'n' => Some(0x0A),
        'r' => Some(0x0D),
        't' => Some(0x09),
        'v' => Some(0x0B),
        '\\' => Some(0x5C),
        '"' => Some(0x22),
        '?' => Some(0x3F),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_find_cmdsub_end_nested() {
        let s = chars("$(echo $(date) \")\" ')') rest");
        let end = find_cmdsub_end(&s, 2);
        assert_eq!(s[..end].iter().collect::<String>(), "$(echo $(date) \")\" ')')");
    }

    #[test]
    fn test_find_cmdsub_end_case_pattern_paren() {
        let s = chars("$(case x in a) echo;; esac) tail");
        let end = find_cmdsub_end(&s, 2);
        assert_eq!(s[end - 1], ')');
        assert_eq!(s[end..].iter().collect::<String>(), " tail");
    }

    #[test]
    fn test_find_braced_param_end() {
        let s = chars("${a:-${b}} x");
        assert_eq!(find_braced_param_end(&s, 2), 10);
    }

    #[test]
    fn test_dollar_parity() {
        let s = chars("$$(");
        assert!(!is_expansion_start(&s, 1, "$("));
        assert_eq!(count_consecutive_dollars_before(&s, 2), 2);
    }

    #[test]
    fn test_assignment_forms() {
        assert_eq!(assignment("a=1"), Some(1));
        assert_eq!(assignment("a+=1"), Some(2));
        assert_eq!(assignment("arr[1+2]=x"), Some(8));
        assert_eq!(assignment("arr[i]+=x"), Some(7));
        assert_eq!(assignment("1a=1"), None);
        assert_eq!(assignment("echo"), None);
    }

    #[test]
    fn test_array_assignment_prefix() {
        assert!(is_array_assignment_prefix(&chars("arr")));
        assert!(is_array_assignment_prefix(&chars("arr[0]")));
        assert!(!is_array_assignment_prefix(&chars("arr[0")));
        assert!(!is_array_assignment_prefix(&chars("a-b")));
    }

    #[test]
    fn test_skip_heredoc_inside_cmdsub() {
        let s = chars("<<EOF\nhello )\nEOF\n)");
        let end = skip_heredoc(&s, 0);
        assert_eq!(s[end..].iter().collect::<String>(), ")");
    }

    #[test]
    fn test_find_heredoc_content_end() {
        let s = chars("cat <<A`\nbody\nA\nnext");
        let (content_start, end) = find_heredoc_content_end(&s, 8, &[("A".to_string(), false)]);
        assert_eq!(content_start, 8);
        assert_eq!(s[end..].iter().collect::<String>(), "next");
    }

    #[test]
    fn test_normalize_heredoc_delimiter() {
        assert_eq!(normalize_heredoc_delimiter("$(  echo   hi )"), "$(echo hi)");
        assert_eq!(normalize_heredoc_delimiter("EOF"), "EOF");
    }

    #[test]
    fn test_strip_line_continuations_keeps_comment_newline() {
        let s = chars("a \\\nb # c\\\nd");
        assert_eq!(strip_line_continuations_comment_aware(&s), "a b # c\nd");
    }

    #[test]
    fn test_is_word_boundary() {
        let s = chars("xcase case");
        assert!(!is_word_boundary(&s, 1, 4));
        assert!(is_word_boundary(&s, 6, 4));
    }
}
