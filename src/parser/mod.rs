//! Parser module for bash scripts
//!
//! The lexer, word scanner and grammar all operate on one [`Parser`] value;
//! each submodule adds the methods for one layer of the language.

pub mod types;
pub mod state;
pub mod scan_helpers;
pub mod lexer;
pub mod heredoc;
pub mod matched_pair;
pub mod arithmetic_parser;
pub mod word_parser;
pub mod expansion_parser;
pub mod parser_substitution;
pub mod conditional_parser;
pub mod compound_parser;
pub mod command_parser;
pub mod parser;

// Re-exports
pub use arithmetic_parser::parse_arithmetic_expression;
pub use lexer::{Token, TokenType};
pub use parser::{parse, Parser};
pub use types::{ErrorKind, ParseException, ParseResult, ParserOptions};
