//! Arithmetic Expression Parser
//!
//! Parses the text inside `$(( ))`, `(( ))` and `for (( ))` clauses:
//! - $((1 + 2))
//! - $((x++))
//! - $((a ? b : c))
//! - $((2#1010))
//!
//! Precedence, lowest first: comma, assignment, ternary, `||`, `&&`, `|`,
//! `^`, `&`, equality, comparison, shift, additive, multiplicative, `**`,
//! unary, postfix, primary.

use super::parser::Parser;
use super::scan_helpers::{is_name_char, is_name_start, is_special_param, is_whitespace};
use super::types::ParseException;
use crate::ast::types::*;

/// Assignment operators, longest first so `<<=` wins over `<`.
const ARITH_ASSIGN_OPS: &[&str] = &[
    "<<=", ">>=", "+=", "-=", "*=", "/=", "%=", "&=", "^=", "|=", "=",
];

type ArithResult = Result<ArithExpr, ParseException>;

pub struct ArithParser {
    src: Vec<char>,
    pos: usize,
    /// Source offset of `src[0]`, used for error positions.
    base: usize,
    extglob: bool,
    depth: usize,
}

impl ArithParser {
    pub fn new(content: &str, base: usize, extglob: bool, depth: usize) -> Self {
        Self {
            src: content.chars().collect(),
            pos: 0,
            base,
            extglob,
            depth,
        }
    }

    /// Parse the whole content. Empty (or blank) content yields `ArithExpr::Empty`.
    pub fn parse(mut self) -> ArithResult {
        self.skip_ws();
        if self.at_end() {
            return Ok(ArithExpr::Empty);
        }
        self.parse_arith_comma()
    }

    fn error(&self, message: impl Into<String>) -> ParseException {
        ParseException::new(message, self.base + self.pos)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek(0) {
            if is_whitespace(c) {
                self.pos += 1;
            } else if c == '\\' && self.peek(1) == Some('\n') {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    fn matches(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek(i) == Some(c))
    }

    fn consume(&mut self, s: &str) -> bool {
        if self.matches(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.src[start..end].iter().collect()
    }

    // =========================================================================
    // BINARY LEVELS
    // =========================================================================

    fn parse_arith_comma(&mut self) -> ArithResult {
        let mut left = self.parse_arith_assign()?;
        loop {
            self.skip_ws();
            if !self.consume(",") {
                break;
            }
            self.skip_ws();
            let right = self.parse_arith_assign()?;
            left = ArithExpr::Comma {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_arith_assign(&mut self) -> ArithResult {
        let left = self.parse_arith_ternary()?;
        self.skip_ws();
        for op in ARITH_ASSIGN_OPS {
            if self.matches(op) {
                if *op == "=" && self.peek(1) == Some('=') {
                    break;
                }
                self.consume(op);
                self.skip_ws();
                let value = self.parse_arith_assign()?;
                return Ok(ArithExpr::Assign {
                    op: (*op).to_string(),
                    target: Box::new(left),
                    value: Box::new(value),
                });
            }
        }
        Ok(left)
    }

    fn parse_arith_ternary(&mut self) -> ArithResult {
        let condition = self.parse_arith_logical_or()?;
        self.skip_ws();
        if !self.consume("?") {
            return Ok(condition);
        }
        self.skip_ws();
        let if_true = if self.matches(":") {
            None
        } else {
            Some(Box::new(self.parse_arith_assign()?))
        };
        self.skip_ws();
        let if_false = if self.consume(":") {
            self.skip_ws();
            if self.at_end() || self.peek(0) == Some(')') {
                None
            } else {
                Some(Box::new(self.parse_arith_ternary()?))
            }
        } else {
            None
        };
        Ok(ArithExpr::Ternary {
            condition: Box::new(condition),
            if_true,
            if_false,
        })
    }

    fn parse_arith_logical_or(&mut self) -> ArithResult {
        let mut left = self.parse_arith_logical_and()?;
        loop {
            self.skip_ws();
            if !self.consume("||") {
                return Ok(left);
            }
            self.skip_ws();
            let right = self.parse_arith_logical_and()?;
            left = ArithExpr::binary("||", left, right);
        }
    }

    fn parse_arith_logical_and(&mut self) -> ArithResult {
        let mut left = self.parse_arith_bitwise_or()?;
        loop {
            self.skip_ws();
            if !self.consume("&&") {
                return Ok(left);
            }
            self.skip_ws();
            let right = self.parse_arith_bitwise_or()?;
            left = ArithExpr::binary("&&", left, right);
        }
    }

    fn parse_arith_bitwise_or(&mut self) -> ArithResult {
        let mut left = self.parse_arith_bitwise_xor()?;
        loop {
            self.skip_ws();
            if self.peek(0) == Some('|') && !matches!(self.peek(1), Some('|') | Some('=')) {
                self.advance();
                self.skip_ws();
                let right = self.parse_arith_bitwise_xor()?;
                left = ArithExpr::binary("|", left, right);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_arith_bitwise_xor(&mut self) -> ArithResult {
        let mut left = self.parse_arith_bitwise_and()?;
        loop {
            self.skip_ws();
            if self.peek(0) == Some('^') && self.peek(1) != Some('=') {
                self.advance();
                self.skip_ws();
                let right = self.parse_arith_bitwise_and()?;
                left = ArithExpr::binary("^", left, right);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_arith_bitwise_and(&mut self) -> ArithResult {
        let mut left = self.parse_arith_equality()?;
        loop {
            self.skip_ws();
            if self.peek(0) == Some('&') && !matches!(self.peek(1), Some('&') | Some('=')) {
                self.advance();
                self.skip_ws();
                let right = self.parse_arith_equality()?;
                left = ArithExpr::binary("&", left, right);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_arith_equality(&mut self) -> ArithResult {
        let mut left = self.parse_arith_relational()?;
        loop {
            self.skip_ws();
            let op = if self.consume("==") {
                "=="
            } else if self.consume("!=") {
                "!="
            } else {
                return Ok(left);
            };
            self.skip_ws();
            let right = self.parse_arith_relational()?;
            left = ArithExpr::binary(op, left, right);
        }
    }

    fn parse_arith_relational(&mut self) -> ArithResult {
        let mut left = self.parse_arith_shift()?;
        loop {
            self.skip_ws();
            let op = if self.consume("<=") {
                "<="
            } else if self.consume(">=") {
                ">="
            } else if self.peek(0) == Some('<') && !matches!(self.peek(1), Some('<') | Some('=')) {
                self.advance();
                "<"
            } else if self.peek(0) == Some('>') && !matches!(self.peek(1), Some('>') | Some('=')) {
                self.advance();
                ">"
            } else {
                return Ok(left);
            };
            self.skip_ws();
            let right = self.parse_arith_shift()?;
            left = ArithExpr::binary(op, left, right);
        }
    }

    fn parse_arith_shift(&mut self) -> ArithResult {
        let mut left = self.parse_arith_additive()?;
        loop {
            self.skip_ws();
            if self.matches("<<=") || self.matches(">>=") {
                return Ok(left);
            }
            let op = if self.consume("<<") {
                "<<"
            } else if self.consume(">>") {
                ">>"
            } else {
                return Ok(left);
            };
            self.skip_ws();
            let right = self.parse_arith_additive()?;
            left = ArithExpr::binary(op, left, right);
        }
    }

    fn parse_arith_additive(&mut self) -> ArithResult {
        let mut left = self.parse_arith_multiplicative()?;
        loop {
            self.skip_ws();
            let op = match (self.peek(0), self.peek(1)) {
                (Some('+'), next) if next != Some('+') && next != Some('=') => "+",
                (Some('-'), next) if next != Some('-') && next != Some('=') => "-",
                _ => return Ok(left),
            };
            self.advance();
            self.skip_ws();
            let right = self.parse_arith_multiplicative()?;
            left = ArithExpr::binary(op, left, right);
        }
    }

    fn parse_arith_multiplicative(&mut self) -> ArithResult {
        let mut left = self.parse_arith_power()?;
        loop {
            self.skip_ws();
            let op = match (self.peek(0), self.peek(1)) {
                (Some('*'), next) if next != Some('*') && next != Some('=') => "*",
                (Some('/'), next) if next != Some('=') => "/",
                (Some('%'), next) if next != Some('=') => "%",
                _ => return Ok(left),
            };
            self.advance();
            self.skip_ws();
            let right = self.parse_arith_power()?;
            left = ArithExpr::binary(op, left, right);
        }
    }

    /// `**` is right-associative.
    fn parse_arith_power(&mut self) -> ArithResult {
        let left = self.parse_arith_unary()?;
        self.skip_ws();
        if self.consume("**") {
            self.skip_ws();
            let right = self.parse_arith_power()?;
            return Ok(ArithExpr::binary("**", left, right));
        }
        Ok(left)
    }

    fn parse_arith_unary(&mut self) -> ArithResult {
        self.skip_ws();
        if self.consume("++") {
            self.skip_ws();
            let operand = Box::new(self.parse_arith_unary()?);
            return Ok(ArithExpr::PreIncr { operand });
        }
        if self.consume("--") {
            self.skip_ws();
            let operand = Box::new(self.parse_arith_unary()?);
            return Ok(ArithExpr::PreDecr { operand });
        }
        let op = match (self.peek(0), self.peek(1)) {
            (Some('!'), _) => "!",
            (Some('~'), _) => "~",
            (Some('+'), next) if next != Some('+') => "+",
            (Some('-'), next) if next != Some('-') => "-",
            _ => return self.parse_arith_postfix(),
        };
        self.advance();
        self.skip_ws();
        let operand = self.parse_arith_unary()?;
        Ok(ArithExpr::unary(op, operand))
    }

    fn parse_arith_postfix(&mut self) -> ArithResult {
        let mut left = self.parse_arith_primary()?;
        loop {
            self.skip_ws();
            if self.consume("++") {
                left = ArithExpr::PostIncr {
                    operand: Box::new(left),
                };
            } else if self.consume("--") {
                left = ArithExpr::PostDecr {
                    operand: Box::new(left),
                };
            } else if self.peek(0) == Some('[') {
                let ArithExpr::Var { name } = &left else {
                    return Ok(left);
                };
                let array = name.clone();
                self.advance();
                self.skip_ws();
                let index = self.parse_arith_comma()?;
                self.skip_ws();
                if !self.consume("]") {
                    return Err(self.error("Expected ']' in array subscript"));
                }
                left = ArithExpr::Subscript {
                    array,
                    index: Box::new(index),
                };
            } else {
                return Ok(left);
            }
        }
    }

    // =========================================================================
    // PRIMARIES
    // =========================================================================

    fn parse_arith_primary(&mut self) -> ArithResult {
        self.skip_ws();
        let Some(c) = self.peek(0) else {
            return Err(self.error("Expected operand at end of arithmetic expression"));
        };
        match c {
            '(' => {
                self.advance();
                self.skip_ws();
                let expr = self.parse_arith_comma()?;
                self.skip_ws();
                if !self.consume(")") {
                    return Err(self.error("Expected ')' in arithmetic expression"));
                }
                Ok(expr)
            }
            '#' if self.peek(1) == Some('$') => {
                self.advance();
                self.parse_arith_expansion()
            }
            '$' => self.parse_arith_expansion(),
            '\'' => self.parse_arith_single_quote(),
            '"' => self.parse_arith_double_quote(),
            '`' => self.parse_arith_backtick(),
            '\\' => {
                self.advance();
                match self.advance() {
                    Some(escaped) => Ok(ArithExpr::Escape {
                        ch: escaped.to_string(),
                    }),
                    None => Err(self.error("Unexpected end after backslash in arithmetic")),
                }
            }
            _ => self.parse_arith_number_or_var(),
        }
    }

    fn parse_arith_expansion(&mut self) -> ArithResult {
        if !self.consume("$") {
            return Err(self.error("Expected '$'"));
        }
        match self.peek(0) {
            Some('(') => return self.parse_arith_cmdsub(),
            Some('{') => return self.parse_arith_braced_param(),
            _ => {}
        }
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if is_name_char(c) {
                self.advance();
            } else if (is_special_param(c) || c.is_ascii_digit()) && self.pos == start {
                self.advance();
                break;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("Expected variable name after $"));
        }
        Ok(ArithExpr::expansion(AST::param(self.slice(start, self.pos), None, None)))
    }

    /// `$(cmd)` or a nested `$((expr))`; the `$` is already consumed.
    fn parse_arith_cmdsub(&mut self) -> ArithResult {
        self.advance();
        if self.peek(0) == Some('(') {
            self.advance();
            let mut depth = 1;
            let content_start = self.pos;
            while let Some(c) = self.peek(0) {
                if c == '(' {
                    depth += 1;
                } else if c == ')' {
                    if depth == 1 && self.peek(1) == Some(')') {
                        break;
                    }
                    depth -= 1;
                }
                self.advance();
            }
            let content = self.slice(content_start, self.pos);
            let inner_base = self.base + content_start;
            self.advance();
            self.advance();
            let inner = ArithParser::new(&content, inner_base, self.extglob, self.depth).parse()?;
            return Ok(ArithExpr::expansion(Expansion::ArithmeticExpansion(
                ArithmeticExpansionNode {
                    expression: Box::new(inner),
                },
            )));
        }
        let mut depth = 1;
        let content_start = self.pos;
        while let Some(c) = self.peek(0) {
            if c == '(' {
                depth += 1;
            } else if c == ')' {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            self.advance();
        }
        let content = self.slice(content_start, self.pos);
        self.advance();
        let command = self.parse_nested_command(content)?;
        Ok(ArithExpr::expansion(AST::command_substitution(command, false)))
    }

    fn parse_nested_command(&self, content: String) -> Result<Node, ParseException> {
        let command = Parser::parse_nested_list(content, self.extglob, self.depth + 1)?;
        Ok(command.unwrap_or(Node::Empty))
    }

    /// `${...}` inside arithmetic; the `$` is already consumed.
    fn parse_arith_braced_param(&mut self) -> ArithResult {
        self.advance();
        if matches!(self.peek(0), Some('!') | Some('#')) {
            let indirect = self.advance() == Some('!');
            let start = self.pos;
            while self.peek(0).is_some_and(|c| c != '}') {
                self.advance();
            }
            let param = self.slice(start, self.pos);
            self.consume("}");
            let expansion = if indirect {
                Expansion::ParamIndirect(ParamExpansionNode {
                    param,
                    op: None,
                    arg: None,
                })
            } else {
                Expansion::ParamLength(ParamLengthNode { param })
            };
            return Ok(ArithExpr::expansion(expansion));
        }
        let name_start = self.pos;
        while let Some(c) = self.peek(0) {
            if c == '}' {
                let name = self.slice(name_start, self.pos);
                self.advance();
                return Ok(ArithExpr::expansion(AST::param(name, None, None)));
            }
            if is_param_expansion_op(c) {
                break;
            }
            self.advance();
        }
        let name = self.slice(name_start, self.pos);
        let op_start = self.pos;
        let mut depth = 1;
        while let Some(c) = self.peek(0) {
            if c == '{' {
                depth += 1;
            } else if c == '}' {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            self.advance();
        }
        let op_text = self.slice(op_start, self.pos);
        self.consume("}");
        const PREFIXES: &[&str] = &[":-", ":=", ":+", ":?", ":", "##", "#", "%%", "%", "//", "/"];
        for prefix in PREFIXES {
            if let Some(arg) = op_text.strip_prefix(prefix) {
                return Ok(ArithExpr::expansion(AST::param(
                    name,
                    Some((*prefix).to_string()),
                    Some(arg.to_string()),
                )));
            }
        }
        Ok(ArithExpr::expansion(AST::param(name, None, Some(op_text))))
    }

    fn parse_arith_single_quote(&mut self) -> ArithResult {
        self.advance();
        let start = self.pos;
        while self.peek(0).is_some_and(|c| c != '\'') {
            self.advance();
        }
        let value = self.slice(start, self.pos);
        if !self.consume("'") {
            return Err(self.error("Unterminated single quote in arithmetic"));
        }
        Ok(ArithExpr::Number { value })
    }

    fn parse_arith_double_quote(&mut self) -> ArithResult {
        self.advance();
        let start = self.pos;
        self.skip_escaped_until('"');
        let value = self.slice(start, self.pos);
        if !self.consume("\"") {
            return Err(self.error("Unterminated double quote in arithmetic"));
        }
        Ok(ArithExpr::Number { value })
    }

    fn parse_arith_backtick(&mut self) -> ArithResult {
        self.advance();
        let start = self.pos;
        self.skip_escaped_until('`');
        let content = self.slice(start, self.pos);
        if !self.consume("`") {
            return Err(self.error("Unterminated backtick in arithmetic"));
        }
        let command = self.parse_nested_command(content)?;
        Ok(ArithExpr::expansion(AST::command_substitution(command, false)))
    }

    fn skip_escaped_until(&mut self, close: char) {
        while let Some(c) = self.peek(0) {
            if c == close {
                break;
            }
            if c == '\\' {
                self.advance();
            }
            self.advance();
        }
    }

    fn parse_arith_number_or_var(&mut self) -> ArithResult {
        self.skip_ws();
        let start = self.pos;
        let c = self.peek(0).unwrap_or('\0');
        if c.is_ascii_digit() {
            while self
                .peek(0)
                .is_some_and(|ch| ch.is_alphanumeric() || ch == '#' || ch == '_')
            {
                self.advance();
            }
            let prefix = ArithExpr::number(self.slice(start, self.pos));
            if self.peek(0) == Some('$') {
                let expansion = self.parse_arith_expansion()?;
                return Ok(ArithExpr::Concat {
                    parts: vec![prefix, expansion],
                });
            }
            return Ok(prefix);
        }
        if is_name_start(c) {
            while self.peek(0).is_some_and(is_name_char) {
                self.advance();
            }
            return Ok(ArithExpr::var(self.slice(start, self.pos)));
        }
        Err(self.error(format!("Unexpected character '{}' in arithmetic expression", c)))
    }
}

fn is_param_expansion_op(c: char) -> bool {
    matches!(
        c,
        ':' | '-' | '=' | '+' | '?' | '#' | '%' | '/' | '^' | ',' | '@' | '*' | '['
    )
}

/// Convenience wrapper for parsing a standalone arithmetic expression.
pub fn parse_arithmetic_expression(
    content: &str,
    extglob: bool,
) -> Result<ArithExpr, ParseException> {
    ArithParser::new(content, 0, extglob, 0).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ArithExpr {
        parse_arithmetic_expression(input, false).unwrap()
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3");
        let ArithExpr::Binary { op, left, right } = expr else {
            panic!("Expected binary");
        };
        assert_eq!(op, "+");
        assert_eq!(*left, ArithExpr::number("1"));
        assert_eq!(
            *right,
            ArithExpr::binary("*", ArithExpr::number("2"), ArithExpr::number("3"))
        );
    }

    #[test]
    fn test_power_right_assoc() {
        let expr = parse("2 ** 3 ** 2");
        assert_eq!(
            expr,
            ArithExpr::binary(
                "**",
                ArithExpr::number("2"),
                ArithExpr::binary("**", ArithExpr::number("3"), ArithExpr::number("2"))
            )
        );
    }

    #[test]
    fn test_assignment_right_assoc() {
        let expr = parse("a = b += 1");
        if let ArithExpr::Assign { op, value, .. } = expr {
            assert_eq!(op, "=");
            assert!(matches!(*value, ArithExpr::Assign { ref op, .. } if op == "+="));
        } else {
            panic!("Expected assignment");
        }
    }

    #[test]
    fn test_equality_is_not_assignment() {
        let expr = parse("a == 1");
        assert!(matches!(expr, ArithExpr::Binary { ref op, .. } if op == "=="));
    }

    #[test]
    fn test_ternary_missing_branches() {
        let expr = parse("a ? : ");
        if let ArithExpr::Ternary { if_true, if_false, .. } = expr {
            assert!(if_true.is_none());
            assert!(if_false.is_none());
        } else {
            panic!("Expected ternary");
        }
    }

    #[test]
    fn test_increments_and_subscript() {
        assert!(matches!(parse("++i"), ArithExpr::PreIncr { .. }));
        assert!(matches!(parse("i--"), ArithExpr::PostDecr { .. }));
        let expr = parse("arr[i + 1]");
        if let ArithExpr::Subscript { array, index } = expr {
            assert_eq!(array, "arr");
            assert!(matches!(*index, ArithExpr::Binary { .. }));
        } else {
            panic!("Expected subscript");
        }
    }

    #[test]
    fn test_base_prefix_concat() {
        let expr = parse("16#$x");
        if let ArithExpr::Concat { parts } = expr {
            assert_eq!(parts[0], ArithExpr::number("16#"));
            assert!(matches!(parts[1], ArithExpr::Expansion { .. }));
        } else {
            panic!("Expected concat");
        }
    }

    #[test]
    fn test_braced_param_operator() {
        let expr = parse("${x:-3} + 1");
        let ArithExpr::Binary { left, .. } = expr else {
            panic!("Expected binary");
        };
        let ArithExpr::Expansion { expansion } = *left else {
            panic!("Expected expansion");
        };
        assert_eq!(
            *expansion,
            AST::param("x", Some(":-".to_string()), Some("3".to_string()))
        );
    }

    #[test]
    fn test_command_substitution_inside() {
        let expr = parse("$(echo 3) * 2");
        let ArithExpr::Binary { left, .. } = expr else {
            panic!("Expected binary");
        };
        assert!(matches!(
            *left,
            ArithExpr::Expansion { ref expansion } if matches!(**expansion, Expansion::CommandSubstitution(_))
        ));
    }

    #[test]
    fn test_empty_and_errors() {
        assert_eq!(parse("   "), ArithExpr::Empty);
        assert!(parse_arithmetic_expression("(1 + 2", false).is_err());
        assert!(parse_arithmetic_expression("a[1", false).is_err());
        let err = parse_arithmetic_expression("1 + @", false).unwrap_err();
        assert!(err.message.contains("Unexpected character '@'"));
    }

    #[test]
    fn test_missing_operands_are_errors() {
        let err = parse_arithmetic_expression(" * 2", false).unwrap_err();
        assert_eq!(err.message, "Unexpected character '*' in arithmetic expression");
        assert_eq!(err.position, 1);
        assert!(parse_arithmetic_expression("1 +", false).is_err());
        assert!(parse_arithmetic_expression("a = ", false).is_err());
        assert!(parse_arithmetic_expression("x[]", false).is_err());
        assert!(parse_arithmetic_expression("(,)", false).is_err());
    }
}
