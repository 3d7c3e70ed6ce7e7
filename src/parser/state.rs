//! Parser State
//!
//! Quote nesting, the parse-context stack, mode flags and the snapshot used
//! for backtracking.

/// Single/double quote status with a stack of saved outer layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteState {
    pub single: bool,
    pub double: bool,
    stack: Vec<(bool, bool)>,
}

impl QuoteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the current layer and start a fresh, unquoted one.
    pub fn push(&mut self) {
        self.stack.push((self.single, self.double));
        self.single = false;
        self.double = false;
    }

    pub fn pop(&mut self) {
        if let Some((single, double)) = self.stack.pop() {
            self.single = single;
            self.double = double;
        }
    }

    /// Mark the current layer as inside `'...'` (or `"..."`) and return
    /// what it was before.
    pub fn enter(&mut self, single: bool) -> (bool, bool) {
        let outer = (self.single, self.double);
        self.single = single;
        self.double = !single;
        outer
    }

    pub fn leave(&mut self, outer: (bool, bool)) {
        (self.single, self.double) = outer;
    }

    pub fn in_quotes(&self) -> bool {
        self.single || self.double
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Normal,
    CommandSub,
    Arithmetic,
    CasePattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseContext {
    pub kind: ContextKind,
    /// Unclosed `(` seen while this context is on top.
    pub paren_depth: usize,
}

impl ParseContext {
    pub fn new(kind: ContextKind) -> Self {
        Self {
            kind,
            paren_depth: 0,
        }
    }

    pub fn open_paren(&mut self) {
        self.paren_depth += 1;
    }

    /// Close one paren and return the remaining depth. Never goes below zero.
    pub fn close_paren(&mut self) -> usize {
        self.paren_depth = self.paren_depth.saturating_sub(1);
        self.paren_depth
    }
}

/// Stack of parse contexts. The bottom `Normal` context is never removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStack {
    stack: Vec<ParseContext>,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStack {
    pub fn new() -> Self {
        Self {
            stack: vec![ParseContext::new(ContextKind::Normal)],
        }
    }

    pub fn current(&self) -> &ParseContext {
        // never empty
        &self.stack[self.stack.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut ParseContext {
        let top = self.stack.len() - 1;
        &mut self.stack[top]
    }

    pub fn push(&mut self, kind: ContextKind) {
        self.stack.push(ParseContext::new(kind));
    }

    pub fn pop(&mut self) -> Option<ParseContext> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn copy_stack(&self) -> Vec<ParseContext> {
        self.stack.clone()
    }

    pub fn restore_from(&mut self, saved: &[ParseContext]) {
        if saved.is_empty() {
            *self = Self::new();
        } else {
            self.stack = saved.to_vec();
        }
    }
}

/// Parser mode flags scoped to one parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserMode(u16);

impl ParserMode {
    pub const NONE: ParserMode = ParserMode(0);
    /// Inside the body of `<(...)` or `>(...)`
    pub const PROCSUB: ParserMode = ParserMode(1 << 0);
    /// A nested list is waiting for its `eof_token`
    pub const EOFTOKEN: ParserMode = ParserMode(1 << 1);

    pub fn contains(self, other: ParserMode) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: ParserMode) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for ParserMode {
    type Output = ParserMode;

    fn bitor(self, rhs: ParserMode) -> ParserMode {
        ParserMode(self.0 | rhs.0)
    }
}

/// Sub-state while scanning inside `${ ... }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DolbraceState {
    #[default]
    None,
    Param,
    Op,
    Word,
    Quote,
    Quote2,
}

/// Flags for the matched-pair scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairFlags(u16);

impl PairFlags {
    pub const NONE: PairFlags = PairFlags(0);
    pub const DQUOTE: PairFlags = PairFlags(1 << 0);
    pub const DOLBRACE: PairFlags = PairFlags(1 << 1);
    pub const ARITH: PairFlags = PairFlags(1 << 2);
    pub const ALLOWESC: PairFlags = PairFlags(1 << 3);
    pub const EXTGLOB: PairFlags = PairFlags(1 << 4);
    pub const ARRAYSUB: PairFlags = PairFlags(1 << 5);

    pub fn contains(self, other: PairFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for PairFlags {
    type Output = PairFlags;

    fn bitor(self, rhs: PairFlags) -> PairFlags {
        PairFlags(self.0 | rhs.0)
    }
}

/// Which rules govern where a word ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WordContext {
    #[default]
    Normal,
    /// Inside `[[ ]]`
    Cond,
    /// Right-hand side of `=~`
    Regex,
}

/// Snapshot taken before a speculative or nested sub-parse.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub(crate) mode: ParserMode,
    pub(crate) dolbrace: DolbraceState,
    pub(crate) pending_heredocs: Vec<usize>,
    pub(crate) contexts: Vec<ParseContext>,
    pub(crate) quote: QuoteState,
    pub(crate) eof_token: Option<char>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_state_push_pop() {
        let mut q = QuoteState::new();
        q.double = true;
        q.push();
        assert!(!q.in_quotes());
        q.single = true;
        q.pop();
        assert!(q.double);
        assert!(!q.single);
        assert_eq!(q.depth(), 0);
        // popping the base layer is a no-op
        q.pop();
        assert!(q.double);
    }

    #[test]
    fn test_context_stack_keeps_base() {
        let mut stack = ContextStack::new();
        stack.push(ContextKind::CommandSub);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.current().kind, ContextKind::CommandSub);
        assert!(stack.pop().is_some());
        assert!(stack.pop().is_none());
        assert_eq!(stack.current().kind, ContextKind::Normal);
    }

    #[test]
    fn test_context_stack_restore() {
        let mut stack = ContextStack::new();
        let saved = stack.copy_stack();
        stack.push(ContextKind::CasePattern);
        stack.restore_from(&saved);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_quote_enter_leave() {
        let mut q = QuoteState::new();
        let outer = q.enter(false);
        assert!(q.double && !q.single);
        let inner = q.enter(true);
        assert!(q.single && !q.double);
        q.leave(inner);
        assert!(q.double);
        q.leave(outer);
        assert!(!q.in_quotes());
    }

    #[test]
    fn test_context_paren_depth_is_per_context() {
        let mut stack = ContextStack::new();
        stack.push(ContextKind::Arithmetic);
        stack.current_mut().open_paren();
        stack.current_mut().open_paren();
        stack.push(ContextKind::CommandSub);
        assert_eq!(stack.current().paren_depth, 0);
        assert_eq!(stack.current_mut().close_paren(), 0);
        stack.pop();
        assert_eq!(stack.current_mut().close_paren(), 1);
    }

    #[test]
    fn test_parser_mode_flags() {
        let mut mode = ParserMode::NONE;
        mode.insert(ParserMode::PROCSUB | ParserMode::EOFTOKEN);
        assert!(mode.contains(ParserMode::EOFTOKEN));
        assert!(mode.contains(ParserMode::PROCSUB));
        assert!(!ParserMode::NONE.contains(ParserMode::PROCSUB));
    }
}
