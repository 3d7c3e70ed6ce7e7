//! bashparse - A parser for bash scripts
//!
//! Turns bash source text into an AST covering the full statement grammar,
//! the word-level expansion forms and the arithmetic and `[[ ]]` expression
//! languages. Nothing is executed or expanded.
//!
//! ```
//! let nodes = bashparse::parse("echo $((1 + 2))", false).unwrap();
//! assert_eq!(nodes[0].kind(), "command");
//! ```

pub mod ast;
pub mod parser;

pub use ast::types::*;
pub use parser::{parse, ErrorKind, ParseException, Parser, ParserOptions};
