//! Conditional Expression Parser
//!
//! Handles parsing of `[[ ... ]]`. Inside the brackets words are read in the
//! conditional word context; `&&`, `||`, `!` and parentheses are operators
//! and newlines are ordinary whitespace.

use super::lexer::{COND_BINARY_OPS, COND_UNARY_OPS};
use super::parser::Parser;
use super::scan_helpers::{is_blank, is_redirect_char, is_whitespace};
use super::state::WordContext;
use super::types::ParseResult;
use crate::ast::types::{CondExpr, ConditionalExprNode, Node, WordNode};

impl Parser {
    /// `[[ expr ]]` at the cursor. `[[` must be followed by whitespace or a
    /// line continuation.
    pub(crate) fn parse_conditional_expr(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.lookahead_is("[[") {
            return Ok(None);
        }
        match (self.peek_at(2), self.peek_at(3)) {
            (None, _) | (Some('\\'), Some('\n')) => {}
            (Some(c), _) if is_whitespace(c) => {}
            _ => return Ok(None),
        }
        self.pos += 2;
        self.word_context = WordContext::Cond;
        let body = self.parse_cond_body();
        self.word_context = WordContext::Normal;
        let body = body?;
        Ok(Some(Node::ConditionalExpr(ConditionalExprNode {
            body,
            redirects: self.collect_redirects()?,
        })))
    }

    fn parse_cond_body(&mut self) -> ParseResult<CondExpr> {
        let body = self.parse_cond_or()?;
        while self.peek().is_some_and(is_blank) {
            self.pos += 1;
        }
        if !self.lookahead_is("]]") {
            return Err(self.error("Expected ]] to close conditional expression"));
        }
        self.pos += 2;
        Ok(body)
    }

    fn cond_skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if is_whitespace(c) {
                self.pos += 1;
            } else if c == '\\' && self.peek_at(1) == Some('\n') {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    fn cond_at_end(&self) -> bool {
        self.at_end() || self.lookahead_is("]]")
    }

    fn parse_cond_or(&mut self) -> ParseResult<CondExpr> {
        self.cond_skip_whitespace();
        let left = self.parse_cond_and()?;
        self.cond_skip_whitespace();
        if !self.cond_at_end() && self.lookahead_is("||") {
            self.pos += 2;
            let right = self.parse_cond_or()?;
            return Ok(CondExpr::Or {
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_cond_and(&mut self) -> ParseResult<CondExpr> {
        self.cond_skip_whitespace();
        let left = self.parse_cond_term()?;
        self.cond_skip_whitespace();
        if !self.cond_at_end() && self.lookahead_is("&&") {
            self.pos += 2;
            let right = self.parse_cond_and()?;
            return Ok(CondExpr::And {
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_cond_term(&mut self) -> ParseResult<CondExpr> {
        self.cond_skip_whitespace();
        if self.cond_at_end() {
            return Err(self.error("Unexpected end of conditional expression"));
        }
        // `!x` glued to its operand is an ordinary word
        if self.peek() == Some('!') && self.peek_at(1).map_or(true, is_blank) {
            self.pos += 1;
            let operand = self.parse_cond_term()?;
            return Ok(CondExpr::Not {
                operand: Box::new(operand),
            });
        }
        if self.peek() == Some('(') {
            self.pos += 1;
            let inner = self.parse_cond_or()?;
            self.cond_skip_whitespace();
            if self.peek() != Some(')') {
                return Err(self.error("Expected ) in conditional expression"));
            }
            self.pos += 1;
            return Ok(CondExpr::Paren {
                inner: Box::new(inner),
            });
        }

        let Some(left) = self.parse_cond_word()? else {
            return Err(self.error("Expected word in conditional expression"));
        };
        self.cond_skip_whitespace();
        if COND_UNARY_OPS.contains(left.value.as_str()) {
            let Some(operand) = self.parse_cond_word()? else {
                return Err(self.error(format!("Expected operand after {}", left.value)));
            };
            return Ok(CondExpr::Unary {
                op: left.value,
                operand,
            });
        }

        if !self.cond_at_end() && !matches!(self.peek(), Some('&' | '|' | ')')) {
            if let Some(c) = self.peek().filter(|&c| is_redirect_char(c)) {
                if self.peek_at(1) != Some('(') {
                    self.pos += 1;
                    self.cond_skip_whitespace();
                    let Some(right) = self.parse_cond_word()? else {
                        return Err(self.error(format!("Expected operand after {}", c)));
                    };
                    return Ok(CondExpr::Binary {
                        op: c.to_string(),
                        left,
                        right,
                    });
                }
            }
            let saved = self.pos;
            match self.parse_cond_word()? {
                Some(op) if COND_BINARY_OPS.contains(op.value.as_str()) => {
                    self.cond_skip_whitespace();
                    let right = if op.value == "=~" {
                        self.parse_cond_regex_word()?
                    } else {
                        self.parse_cond_word()?
                    };
                    let Some(right) = right else {
                        return Err(self.error(format!("Expected operand after {}", op.value)));
                    };
                    return Ok(CondExpr::Binary {
                        op: op.value,
                        left,
                        right,
                    });
                }
                _ => self.pos = saved,
            }
        }
        Ok(CondExpr::Unary {
            op: "-n".to_string(),
            operand: left,
        })
    }

    fn parse_cond_word(&mut self) -> ParseResult<Option<WordNode>> {
        self.cond_skip_whitespace();
        if self.cond_at_end()
            || matches!(self.peek(), Some('(' | ')'))
            || self.lookahead_is("&&")
            || self.lookahead_is("||")
        {
            return Ok(None);
        }
        self.read_word_internal(WordContext::Cond, false, false, false)
    }

    /// Right-hand side of `=~`: parentheses and `|` belong to the pattern.
    fn parse_cond_regex_word(&mut self) -> ParseResult<Option<WordNode>> {
        self.cond_skip_whitespace();
        if self.cond_at_end() {
            return Ok(None);
        }
        let result = self.read_word_internal(WordContext::Regex, false, false, false);
        self.word_context = WordContext::Cond;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::ParserOptions;

    fn cond(input: &str) -> CondExpr {
        let mut parser = Parser::new(input, ParserOptions::default());
        let Some(Node::ConditionalExpr(node)) = parser.parse_conditional_expr().unwrap() else {
            panic!("Expected conditional for {:?}", input);
        };
        assert_eq!(parser.word_context, WordContext::Normal);
        node.body
    }

    #[test]
    fn test_unary_test() {
        let CondExpr::Unary { op, operand } = cond("[[ -f /etc/passwd ]]") else {
            panic!("Expected unary");
        };
        assert_eq!(op, "-f");
        assert_eq!(operand.value, "/etc/passwd");
    }

    #[test]
    fn test_bare_word_is_non_empty_test() {
        let CondExpr::Unary { op, operand } = cond("[[ $x ]]") else {
            panic!("Expected unary");
        };
        assert_eq!(op, "-n");
        assert_eq!(operand.value, "$x");
    }

    #[test]
    fn test_binary_and_logical_operators() {
        let CondExpr::Or { left, right } = cond("[[ a == b && c != d || -z e ]]") else {
            panic!("Expected or");
        };
        let CondExpr::And { left: eq, .. } = *left else {
            panic!("Expected and");
        };
        assert!(matches!(*eq, CondExpr::Binary { ref op, .. } if op == "=="));
        assert!(matches!(*right, CondExpr::Unary { ref op, .. } if op == "-z"));
    }

    #[test]
    fn test_string_comparison_with_angle_bracket() {
        let CondExpr::Binary { op, left, right } = cond("[[ a < b ]]") else {
            panic!("Expected binary");
        };
        assert_eq!((op.as_str(), left.value.as_str(), right.value.as_str()), ("<", "a", "b"));
    }

    #[test]
    fn test_negation_and_grouping() {
        let CondExpr::Not { operand } = cond("[[ ! ( -n a ) ]]") else {
            panic!("Expected not");
        };
        assert!(matches!(*operand, CondExpr::Paren { .. }));
    }

    #[test]
    fn test_regex_operand_keeps_parens() {
        let CondExpr::Binary { op, right, .. } = cond("[[ $v =~ ^(a|b)+$ ]]") else {
            panic!("Expected binary");
        };
        assert_eq!(op, "=~");
        assert_eq!(right.value, "^(a|b)+$");
    }

    #[test]
    fn test_newlines_inside_brackets() {
        assert!(matches!(cond("[[ a &&\n b ]]"), CondExpr::And { .. }));
    }

    #[test]
    fn test_unclosed_conditional() {
        let mut parser = Parser::new("[[ a == b", ParserOptions::default());
        let err = parser.parse_conditional_expr().unwrap_err();
        assert_eq!(err.message, "Expected ]] to close conditional expression");
    }

    #[test]
    fn test_glued_brackets_are_not_conditional() {
        let mut parser = Parser::new("[[a]]", ParserOptions::default());
        assert!(parser.parse_conditional_expr().unwrap().is_none());
    }
}
