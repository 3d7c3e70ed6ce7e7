//! Abstract Syntax Tree (AST) Types for Bash
//!
//! This module defines the complete AST produced by the parser. Statement-level
//! constructs live in [`Node`], expansions embedded inside words live in
//! [`Expansion`], and the two expression sub-languages have their own closed
//! enums: [`ArithExpr`] for `$(( ))`/`(( ))` and [`CondExpr`] for `[[ ]]`.

use serde::Serialize;
use std::fmt;

// =============================================================================
// STATEMENTS
// =============================================================================

/// Any statement-level node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Node {
    Command(CommandNode),
    Pipeline(PipelineNode),
    List(ListNode),
    Operator(OperatorNode),
    /// Marks the preceding pipe as `|&` (stderr joins stdout).
    PipeBoth,
    Empty,
    Comment(CommentNode),
    Subshell(SubshellNode),
    BraceGroup(BraceGroupNode),
    If(IfNode),
    While(WhileNode),
    Until(UntilNode),
    For(ForNode),
    ForArith(ForArithNode),
    Select(SelectNode),
    Case(CaseNode),
    Function(FunctionNode),
    Coproc(CoprocNode),
    Negation(NegationNode),
    Time(TimeNode),
    ArithmeticCommand(ArithmeticCommandNode),
    ConditionalExpr(ConditionalExprNode),
}

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Command(_) => "command",
            Node::Pipeline(_) => "pipeline",
            Node::List(_) => "list",
            Node::Operator(_) => "operator",
            Node::PipeBoth => "pipe-both",
            Node::Empty => "empty",
            Node::Comment(_) => "comment",
            Node::Subshell(_) => "subshell",
            Node::BraceGroup(_) => "brace-group",
            Node::If(_) => "if",
            Node::While(_) => "while",
            Node::Until(_) => "until",
            Node::For(_) => "for",
            Node::ForArith(_) => "for-arith",
            Node::Select(_) => "select",
            Node::Case(_) => "case",
            Node::Function(_) => "function",
            Node::Coproc(_) => "coproc",
            Node::Negation(_) => "negation",
            Node::Time(_) => "time",
            Node::ArithmeticCommand(_) => "arithmetic-command",
            Node::ConditionalExpr(_) => "conditional-expr",
        }
    }

    /// Redirects attached to this node, if it is a kind that carries them.
    pub fn redirects(&self) -> Option<&[Redirection]> {
        match self {
            Node::Command(n) => Some(&n.redirects),
            Node::Subshell(n) => Some(&n.redirects),
            Node::BraceGroup(n) => Some(&n.redirects),
            Node::If(n) => Some(&n.redirects),
            Node::While(n) => Some(&n.redirects),
            Node::Until(n) => Some(&n.redirects),
            Node::For(n) => Some(&n.redirects),
            Node::ForArith(n) => Some(&n.redirects),
            Node::Select(n) => Some(&n.redirects),
            Node::Case(n) => Some(&n.redirects),
            Node::ArithmeticCommand(n) => Some(&n.redirects),
            Node::ConditionalExpr(n) => Some(&n.redirects),
            _ => None,
        }
    }

    /// Call `f` on every heredoc reachable from this node, including those inside
    /// nested substitutions.
    pub fn for_each_heredoc_mut(&mut self, f: &mut dyn FnMut(&mut HereDocNode)) {
        match self {
            Node::Command(n) => {
                for w in &mut n.words {
                    w.for_each_heredoc_mut(f);
                }
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::Pipeline(n) => {
                for c in &mut n.commands {
                    c.for_each_heredoc_mut(f);
                }
            }
            Node::List(n) => {
                for p in &mut n.parts {
                    p.for_each_heredoc_mut(f);
                }
            }
            Node::Operator(_) | Node::PipeBoth | Node::Empty | Node::Comment(_) => {}
            Node::Subshell(n) => {
                n.body.for_each_heredoc_mut(f);
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::BraceGroup(n) => {
                n.body.for_each_heredoc_mut(f);
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::If(n) => {
                n.condition.for_each_heredoc_mut(f);
                n.then_body.for_each_heredoc_mut(f);
                if let Some(e) = &mut n.else_body {
                    e.for_each_heredoc_mut(f);
                }
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::While(n) => {
                n.condition.for_each_heredoc_mut(f);
                n.body.for_each_heredoc_mut(f);
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::Until(n) => {
                n.condition.for_each_heredoc_mut(f);
                n.body.for_each_heredoc_mut(f);
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::For(n) => {
                for w in n.words.iter_mut().flatten() {
                    w.for_each_heredoc_mut(f);
                }
                n.body.for_each_heredoc_mut(f);
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::ForArith(n) => {
                n.body.for_each_heredoc_mut(f);
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::Select(n) => {
                for w in n.words.iter_mut().flatten() {
                    w.for_each_heredoc_mut(f);
                }
                n.body.for_each_heredoc_mut(f);
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::Case(n) => {
                n.word.for_each_heredoc_mut(f);
                for p in &mut n.patterns {
                    if let Some(b) = &mut p.body {
                        b.for_each_heredoc_mut(f);
                    }
                }
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::Function(n) => n.body.for_each_heredoc_mut(f),
            Node::Coproc(n) => n.command.for_each_heredoc_mut(f),
            Node::Negation(n) => {
                if let Some(p) = &mut n.pipeline {
                    p.for_each_heredoc_mut(f);
                }
            }
            Node::Time(n) => {
                if let Some(p) = &mut n.pipeline {
                    p.for_each_heredoc_mut(f);
                }
            }
            Node::ArithmeticCommand(n) => {
                n.expression.for_each_heredoc_mut(f);
                redirects_heredocs_mut(&mut n.redirects, f);
            }
            Node::ConditionalExpr(n) => {
                n.body.for_each_heredoc_mut(f);
                redirects_heredocs_mut(&mut n.redirects, f);
            }
        }
    }
}

fn redirects_heredocs_mut(redirects: &mut [Redirection], f: &mut dyn FnMut(&mut HereDocNode)) {
    for r in redirects {
        match r {
            Redirection::File(r) => r.target.for_each_heredoc_mut(f),
            Redirection::HereDoc(h) => f(h),
        }
    }
}

/// Simple command: words followed or interleaved with redirections
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandNode {
    pub words: Vec<WordNode>,
    pub redirects: Vec<Redirection>,
}

/// A pipeline: cmd1 | cmd2 |& cmd3
///
/// A [`Node::PipeBoth`] entry follows the command whose output is piped with `|&`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineNode {
    pub commands: Vec<Node>,
}

/// Pipelines separated by [`Node::Operator`] entries (`&&`, `||`, `;`, `&`, newline).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListNode {
    pub parts: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorNode {
    pub op: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentNode {
    pub text: String,
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Redirection {
    File(RedirectNode),
    HereDoc(HereDocNode),
}

/// A non-heredoc redirection.
///
/// `op` is the operator exactly as written including any fd prefix
/// (`2>`, `{fd}>`, `&>>`). A duplication target keeps its leading `&`
/// (`&1`, `&-`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedirectNode {
    pub op: String,
    pub target: WordNode,
    pub fd: Option<i32>,
    pub fd_variable: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HereDocNode {
    pub delimiter: String,
    /// Body text; empty until the line holding the operator is finished.
    pub content: String,
    /// `<<-` form
    pub strip_tabs: bool,
    /// Any part of the delimiter was quoted or escaped; the body is literal.
    pub quoted: bool,
    pub fd: Option<i32>,
    #[serde(skip)]
    pub(crate) slot: Option<usize>,
}

// =============================================================================
// COMPOUND COMMANDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubshellNode {
    pub body: Box<Node>,
    pub redirects: Vec<Redirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BraceGroupNode {
    pub body: Box<Node>,
    pub redirects: Vec<Redirection>,
}

/// if statement; an `elif` chain nests as an `IfNode` in `else_body`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfNode {
    pub condition: Box<Node>,
    pub then_body: Box<Node>,
    pub else_body: Option<Box<Node>>,
    pub redirects: Vec<Redirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhileNode {
    pub condition: Box<Node>,
    pub body: Box<Node>,
    pub redirects: Vec<Redirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UntilNode {
    pub condition: Box<Node>,
    pub body: Box<Node>,
    pub redirects: Vec<Redirection>,
}

/// for loop: for VAR [in WORDS]; do ...; done
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForNode {
    pub variable: String,
    /// Words to iterate over (None = no `in` clause, i.e. "$@")
    pub words: Option<Vec<WordNode>>,
    pub body: Box<Node>,
    pub redirects: Vec<Redirection>,
}

/// C-style for loop: for ((init; cond; incr)); do ...; done
///
/// The three clauses are kept as source text with leading blanks removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForArithNode {
    pub init: String,
    pub condition: String,
    pub increment: String,
    pub body: Box<Node>,
    pub redirects: Vec<Redirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectNode {
    pub variable: String,
    pub words: Option<Vec<WordNode>>,
    pub body: Box<Node>,
    pub redirects: Vec<Redirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseNode {
    pub word: WordNode,
    pub patterns: Vec<CasePatternNode>,
    pub redirects: Vec<Redirection>,
}

/// One `pattern) body ;;` clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CasePatternNode {
    /// Pattern text as written, alternatives joined by `|`, unquoted blanks dropped.
    pub pattern: String,
    pub body: Option<Box<Node>>,
    pub terminator: CaseTerminator,
}

impl CasePatternNode {
    /// Split the pattern on top-level `|`, respecting quotes, escapes,
    /// brackets and extglob groups.
    pub fn alternatives(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = String::new();
        let mut depth = 0usize;
        let mut chars = self.pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    current.push(c);
                    if let Some(n) = chars.next() {
                        current.push(n);
                    }
                }
                '\'' | '"' => {
                    current.push(c);
                    while let Some(n) = chars.next() {
                        current.push(n);
                        if n == '\\' && c == '"' {
                            if let Some(e) = chars.next() {
                                current.push(e);
                            }
                            continue;
                        }
                        if n == c {
                            break;
                        }
                    }
                }
                '(' | '[' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                '|' if depth == 0 => out.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        out.push(current);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaseTerminator {
    #[serde(rename = ";;")]
    DoubleSemi,
    #[serde(rename = ";&")]
    SemiAnd,
    #[serde(rename = ";;&")]
    SemiSemiAnd,
}

impl CaseTerminator {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseTerminator::DoubleSemi => ";;",
            CaseTerminator::SemiAnd => ";&",
            CaseTerminator::SemiSemiAnd => ";;&",
        }
    }
}

impl fmt::Display for CaseTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionNode {
    pub name: String,
    pub body: Box<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoprocNode {
    pub command: Box<Node>,
    pub name: Option<String>,
}

/// `! pipeline`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NegationNode {
    pub pipeline: Option<Box<Node>>,
}

/// `time [-p] pipeline`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeNode {
    pub pipeline: Option<Box<Node>>,
    pub posix: bool,
}

/// `(( expr ))`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithmeticCommandNode {
    pub expression: ArithExpr,
    pub redirects: Vec<Redirection>,
    /// Text between the parentheses with line continuations removed.
    pub raw_content: String,
}

/// `[[ expr ]]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionalExprNode {
    pub body: CondExpr,
    pub redirects: Vec<Redirection>,
}

// =============================================================================
// WORDS
// =============================================================================

/// A word as written in the source together with the expansions found in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordNode {
    pub value: String,
    pub parts: Vec<WordPart>,
}

impl WordNode {
    pub fn is_literal(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn for_each_heredoc_mut(&mut self, f: &mut dyn FnMut(&mut HereDocNode)) {
        for p in &mut self.parts {
            p.expansion.for_each_heredoc_mut(f);
        }
    }
}

/// An expansion located inside a word.
///
/// `start..end` is the character range of its source text within the
/// containing word's `value`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordPart {
    pub start: usize,
    pub end: usize,
    pub expansion: Expansion,
}

// =============================================================================
// EXPANSIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Expansion {
    /// `$name`, `${name}`, `${name op arg}`
    Param(ParamExpansionNode),
    /// `${#name}`
    ParamLength(ParamLengthNode),
    /// `${!name}` and its operator forms
    ParamIndirect(ParamExpansionNode),
    /// `$(...)`, `` `...` `` and the `${ ...; }` funsub form
    CommandSubstitution(CommandSubstitutionNode),
    ArithmeticExpansion(ArithmeticExpansionNode),
    /// `$[ ... ]`
    ArithDeprecated(ArithDeprecatedNode),
    ProcessSubstitution(ProcessSubstitutionNode),
    /// `$'...'`
    AnsiCQuote(QuotedContentNode),
    /// `$"..."`
    LocaleString(QuotedContentNode),
    /// `name=( ... )`
    Array(ArrayNode),
}

impl Expansion {
    pub fn kind(&self) -> &'static str {
        match self {
            Expansion::Param(_) => "param",
            Expansion::ParamLength(_) => "param-length",
            Expansion::ParamIndirect(_) => "param-indirect",
            Expansion::CommandSubstitution(_) => "cmdsub",
            Expansion::ArithmeticExpansion(_) => "arith",
            Expansion::ArithDeprecated(_) => "arith-deprecated",
            Expansion::ProcessSubstitution(_) => "procsub",
            Expansion::AnsiCQuote(_) => "ansi-c",
            Expansion::LocaleString(_) => "locale",
            Expansion::Array(_) => "array",
        }
    }

    pub fn for_each_heredoc_mut(&mut self, f: &mut dyn FnMut(&mut HereDocNode)) {
        match self {
            Expansion::CommandSubstitution(c) => c.command.for_each_heredoc_mut(f),
            Expansion::ProcessSubstitution(p) => p.command.for_each_heredoc_mut(f),
            Expansion::ArithmeticExpansion(a) => a.expression.for_each_heredoc_mut(f),
            Expansion::Array(a) => {
                for w in &mut a.elements {
                    w.for_each_heredoc_mut(f);
                }
            }
            Expansion::Param(_)
            | Expansion::ParamLength(_)
            | Expansion::ParamIndirect(_)
            | Expansion::ArithDeprecated(_)
            | Expansion::AnsiCQuote(_)
            | Expansion::LocaleString(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamExpansionNode {
    pub param: String,
    pub op: Option<String>,
    pub arg: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamLengthNode {
    pub param: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSubstitutionNode {
    pub command: Box<Node>,
    /// `${ ...; }` / `${| ...; }`
    pub brace: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArithmeticExpansionNode {
    pub expression: Box<ArithExpr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArithDeprecatedNode {
    pub expression: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessDirection {
    Input,  // <(...)
    Output, // >(...)
}

impl ProcessDirection {
    pub fn as_char(&self) -> char {
        match self {
            ProcessDirection::Input => '<',
            ProcessDirection::Output => '>',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSubstitutionNode {
    pub direction: ProcessDirection,
    pub command: Box<Node>,
}

/// Raw text between the quotes of `$'...'` or `$"..."`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotedContentNode {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayNode {
    pub elements: Vec<WordNode>,
}

// =============================================================================
// ARITHMETIC EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ArithExpr {
    /// Numeric literal text, or the contents of a quoted string used as one
    Number { value: String },
    Empty,
    Var { name: String },
    Binary { op: String, left: Box<ArithExpr>, right: Box<ArithExpr> },
    Unary { op: String, operand: Box<ArithExpr> },
    PreIncr { operand: Box<ArithExpr> },
    PostIncr { operand: Box<ArithExpr> },
    PreDecr { operand: Box<ArithExpr> },
    PostDecr { operand: Box<ArithExpr> },
    Assign { op: String, target: Box<ArithExpr>, value: Box<ArithExpr> },
    Ternary {
        condition: Box<ArithExpr>,
        if_true: Option<Box<ArithExpr>>,
        if_false: Option<Box<ArithExpr>>,
    },
    Comma { left: Box<ArithExpr>, right: Box<ArithExpr> },
    Subscript { array: String, index: Box<ArithExpr> },
    /// `\c`
    Escape { ch: String },
    /// Adjacent fragments such as `16#$x`
    Concat { parts: Vec<ArithExpr> },
    /// `$var`, `${...}`, `$(...)` or a nested `$((...))` inside the expression
    Expansion { expansion: Box<Expansion> },
}

impl ArithExpr {
    pub fn number(value: impl Into<String>) -> Self {
        ArithExpr::Number { value: value.into() }
    }

    pub fn var(name: impl Into<String>) -> Self {
        ArithExpr::Var { name: name.into() }
    }

    pub fn binary(op: impl Into<String>, left: ArithExpr, right: ArithExpr) -> Self {
        ArithExpr::Binary {
            op: op.into(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: impl Into<String>, operand: ArithExpr) -> Self {
        ArithExpr::Unary {
            op: op.into(),
            operand: Box::new(operand),
        }
    }

    pub fn expansion(expansion: Expansion) -> Self {
        ArithExpr::Expansion {
            expansion: Box::new(expansion),
        }
    }

    pub fn for_each_heredoc_mut(&mut self, f: &mut dyn FnMut(&mut HereDocNode)) {
        match self {
            ArithExpr::Number { .. }
            | ArithExpr::Empty
            | ArithExpr::Var { .. }
            | ArithExpr::Escape { .. } => {}
            ArithExpr::Binary { left, right, .. } | ArithExpr::Comma { left, right } => {
                left.for_each_heredoc_mut(f);
                right.for_each_heredoc_mut(f);
            }
            ArithExpr::Unary { operand, .. }
            | ArithExpr::PreIncr { operand }
            | ArithExpr::PostIncr { operand }
            | ArithExpr::PreDecr { operand }
            | ArithExpr::PostDecr { operand } => operand.for_each_heredoc_mut(f),
            ArithExpr::Assign { target, value, .. } => {
                target.for_each_heredoc_mut(f);
                value.for_each_heredoc_mut(f);
            }
            ArithExpr::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                condition.for_each_heredoc_mut(f);
                if let Some(t) = if_true {
                    t.for_each_heredoc_mut(f);
                }
                if let Some(e) = if_false {
                    e.for_each_heredoc_mut(f);
                }
            }
            ArithExpr::Subscript { index, .. } => index.for_each_heredoc_mut(f),
            ArithExpr::Concat { parts } => {
                for p in parts {
                    p.for_each_heredoc_mut(f);
                }
            }
            ArithExpr::Expansion { expansion } => expansion.for_each_heredoc_mut(f),
        }
    }
}

// =============================================================================
// CONDITIONAL EXPRESSIONS ([[ ]])
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CondExpr {
    /// `-f file`; a bare word is recorded as `-n word`
    Unary { op: String, operand: WordNode },
    Binary { op: String, left: WordNode, right: WordNode },
    And { left: Box<CondExpr>, right: Box<CondExpr> },
    Or { left: Box<CondExpr>, right: Box<CondExpr> },
    Not { operand: Box<CondExpr> },
    Paren { inner: Box<CondExpr> },
}

impl CondExpr {
    pub fn for_each_heredoc_mut(&mut self, f: &mut dyn FnMut(&mut HereDocNode)) {
        match self {
            CondExpr::Unary { operand, .. } => operand.for_each_heredoc_mut(f),
            CondExpr::Binary { left, right, .. } => {
                left.for_each_heredoc_mut(f);
                right.for_each_heredoc_mut(f);
            }
            CondExpr::And { left, right } | CondExpr::Or { left, right } => {
                left.for_each_heredoc_mut(f);
                right.for_each_heredoc_mut(f);
            }
            CondExpr::Not { operand } => operand.for_each_heredoc_mut(f),
            CondExpr::Paren { inner } => inner.for_each_heredoc_mut(f),
        }
    }
}

// =============================================================================
// FACTORY FUNCTIONS (AST builders)
// =============================================================================

/// AST factory for building nodes
pub struct AST;

impl AST {
    pub fn word(value: impl Into<String>, parts: Vec<WordPart>) -> WordNode {
        WordNode {
            value: value.into(),
            parts,
        }
    }

    pub fn literal(value: impl Into<String>) -> WordNode {
        Self::word(value, Vec::new())
    }

    pub fn command(words: Vec<WordNode>, redirects: Vec<Redirection>) -> Node {
        Node::Command(CommandNode { words, redirects })
    }

    pub fn operator(op: impl Into<String>) -> Node {
        Node::Operator(OperatorNode { op: op.into() })
    }

    /// A single-element sequence collapses to that element.
    pub fn list(mut parts: Vec<Node>) -> Node {
        if parts.len() == 1 {
            if let Some(only) = parts.pop() {
                return only;
            }
        }
        Node::List(ListNode { parts })
    }

    /// A single-element sequence collapses to that element.
    pub fn pipeline(mut commands: Vec<Node>) -> Node {
        if commands.len() == 1 {
            if let Some(only) = commands.pop() {
                return only;
            }
        }
        Node::Pipeline(PipelineNode { commands })
    }

    pub fn redirect(
        op: impl Into<String>,
        target: WordNode,
        fd: Option<i32>,
        fd_variable: Option<String>,
    ) -> Redirection {
        Redirection::File(RedirectNode {
            op: op.into(),
            target,
            fd,
            fd_variable,
        })
    }

    pub fn param(param: impl Into<String>, op: Option<String>, arg: Option<String>) -> Expansion {
        Expansion::Param(ParamExpansionNode {
            param: param.into(),
            op,
            arg,
        })
    }

    pub fn command_substitution(command: Node, brace: bool) -> Expansion {
        Expansion::CommandSubstitution(CommandSubstitutionNode {
            command: Box::new(command),
            brace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_pattern_alternatives() {
        let pattern = CasePatternNode {
            pattern: "a|'x|y'|@(b|c)|[|]".to_string(),
            body: None,
            terminator: CaseTerminator::DoubleSemi,
        };
        assert_eq!(pattern.alternatives(), vec!["a", "'x|y'", "@(b|c)", "[|]"]);
    }

    #[test]
    fn test_list_collapses_single_part() {
        let node = AST::list(vec![AST::command(vec![AST::literal("ls")], vec![])]);
        assert!(matches!(node, Node::Command(_)));
    }

    #[test]
    fn test_heredoc_visitor_reaches_substitutions() {
        let heredoc = HereDocNode {
            delimiter: "EOF".to_string(),
            content: String::new(),
            strip_tabs: false,
            quoted: false,
            fd: None,
            slot: Some(0),
        };
        let inner = AST::command(vec![AST::literal("cat")], vec![Redirection::HereDoc(heredoc)]);
        let word = AST::word(
            "$(cat <<EOF)",
            vec![WordPart {
                start: 0,
                end: 12,
                expansion: AST::command_substitution(inner, false),
            }],
        );
        let mut node = AST::command(vec![AST::literal("echo"), word], vec![]);
        let mut seen = 0;
        node.for_each_heredoc_mut(&mut |h| {
            h.content = "body\n".to_string();
            seen += 1;
        });
        assert_eq!(seen, 1);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "command");
        assert_eq!(
            json["words"][1]["parts"][0]["expansion"]["command"]["redirects"][0]["content"],
            "body\n"
        );
    }

    #[test]
    fn test_arith_serializes_with_kind_tag() {
        let expr = ArithExpr::binary("+", ArithExpr::number("1"), ArithExpr::var("x"));
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json["kind"], "binary");
        assert_eq!(json["right"]["name"], "x");
    }
}
