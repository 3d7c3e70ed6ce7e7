//! Abstract Syntax Tree (AST) Types for Bash
//!
//! Statements, words with their located expansions, and the arithmetic and
//! conditional expression trees. Every type serializes with serde so a tree
//! can be dumped or compared as JSON.

pub mod types;
