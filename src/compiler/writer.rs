//! The back-patch token buffer.
//!
//! Every compilation owns exactly one writer. Besides plain appending it
//! supports a retroactive insertion cursor: a caller can rewind to a marked
//! offset, write text there (shifting everything after it), and restore the
//! previous cursor — the mechanism behind emitting connectives and
//! parentheses only once both sides of a binary node are known to have
//! produced output.
use crate::ast::Value;
use serde::Serialize;

/// A named parameter binding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
}

/// The ordered parameter map of a compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Params(Vec<Parameter>);

impl Params {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.0.iter()
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|p| p.name.as_str())
    }
}

/// Restores the insertion cursor saved by [`TokenWriter::begin_insert`].
///
/// The saved position is kept as a distance from the buffer end: insertions
/// always happen at or before the saved cursor, so the suffix behind it is
/// untouched and the distance stays valid no matter how much text the
/// nested insertion wrote.
#[must_use = "the saved cursor must be restored with end_insert"]
#[derive(Debug)]
pub struct InsertGuard {
    prev_tail: Option<usize>,
}

/// Scratch state swapped out by [`TokenWriter::begin_capture`].
#[must_use = "the captured buffer must be taken back with end_capture"]
#[derive(Debug)]
pub struct CaptureGuard {
    buf: String,
    cursor: Option<usize>,
}

#[derive(Debug, Default)]
pub struct TokenWriter {
    buf: String,
    /// `None` appends; `Some(at)` splices at `at` and advances.
    cursor: Option<usize>,
    params: Vec<Parameter>,
    negated: bool,
}

impl TokenWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The position the next `write` lands at.
    pub fn position(&self) -> usize {
        self.cursor.unwrap_or(self.buf.len())
    }

    /// Records the current position for a later back-patch.
    pub fn mark(&self) -> usize {
        self.position()
    }

    /// Writes at the cursor, advancing it; appends in append mode.
    pub fn write(&mut self, text: &str) {
        match self.cursor {
            Some(at) => {
                self.buf.insert_str(at, text);
                self.cursor = Some(at + text.len());
            }
            None => self.buf.push_str(text),
        }
    }

    /// Splices text at an absolute offset, keeping the cursor pointing at
    /// the same logical spot.
    pub fn insert_at(&mut self, at: usize, text: &str) {
        self.buf.insert_str(at, text);
        if let Some(cursor) = self.cursor {
            if cursor >= at {
                self.cursor = Some(cursor + text.len());
            }
        }
    }

    /// Rewinds the cursor to `at`. Must be paired with
    /// [`end_insert`](Self::end_insert); the pair is stack-disciplined and
    /// nests.
    pub fn begin_insert(&mut self, at: usize) -> InsertGuard {
        debug_assert!(at <= self.buf.len());
        let prev_tail = self.cursor.map(|c| self.buf.len() - c);
        self.cursor = Some(at);
        InsertGuard { prev_tail }
    }

    /// Restores the cursor saved by the matching
    /// [`begin_insert`](Self::begin_insert), advanced past everything
    /// written in between.
    pub fn end_insert(&mut self, guard: InsertGuard) {
        self.cursor = guard.prev_tail.map(|tail| self.buf.len() - tail);
    }

    /// Swaps in an empty scratch buffer. Parameters and the negation flag
    /// are shared with the window; only the text buffer and cursor are
    /// scoped.
    pub fn begin_capture(&mut self) -> CaptureGuard {
        CaptureGuard {
            buf: std::mem::take(&mut self.buf),
            cursor: self.cursor.take(),
        }
    }

    /// Ends a capture window, returning the fragment it produced.
    pub fn end_capture(&mut self, guard: CaptureGuard) -> String {
        self.cursor = guard.cursor;
        std::mem::replace(&mut self.buf, guard.buf)
    }

    /// Whether the enclosing predicate context is logically inverted.
    pub fn negated(&self) -> bool {
        self.negated
    }

    /// Sets the negation flag, returning the previous value for restore.
    pub fn set_negated(&mut self, negated: bool) -> bool {
        std::mem::replace(&mut self.negated, negated)
    }

    /// Declares a parameter under a preferred name. An existing binding
    /// with the same name and an equal value is reused; a name collision
    /// with a different value appends a numeric suffix.
    pub fn declare_parameter(&mut self, preferred: &str, value: Value) -> String {
        let base = sanitize_name(preferred);
        let mut candidate = base.clone();
        let mut suffix = 0usize;

        loop {
            match self.params.iter().position(|p| p.name == candidate) {
                None => break,
                Some(i) if self.params[i].value == value => return candidate,
                Some(_) => {
                    suffix += 1;
                    candidate = format!("{base}{suffix}");
                }
            }
        }

        self.params.push(Parameter {
            name: candidate.clone(),
            value,
        });
        candidate
    }

    /// Consumes the writer, returning the text and the parameter map.
    pub fn finish(self) -> (String, Params) {
        (self.buf, Params(self.params))
    }

    pub fn params_len(&self) -> usize {
        self.params.len()
    }
}

fn sanitize_name(preferred: &str) -> String {
    let cleaned: String = preferred
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if cleaned.is_empty() || cleaned.chars().next().unwrap().is_ascii_digit() {
        format!("p{cleaned}")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_appends_without_a_cursor() {
        let mut w = TokenWriter::new();
        w.write("a = 1");
        assert_eq!(5, w.position());
    }

    #[test]
    fn begin_insert_splices_before_existing_text() {
        let mut w = TokenWriter::new();
        w.write("right");

        let guard = w.begin_insert(0);
        w.write("left ");
        w.end_insert(guard);

        w.write(" end");
        let (sql, _) = w.finish();
        assert_eq!("left right end", sql);
    }

    #[test]
    fn nested_inserts_restore_the_outer_cursor() {
        let mut w = TokenWriter::new();
        w.write("CCC");

        let outer = w.begin_insert(0);
        w.write("BBB");

        // The outer insertion is mid-flight at position 3; the nested one
        // rewinds to the very start again.
        let inner = w.begin_insert(0);
        w.write("AAA");
        w.end_insert(inner);

        // Back in the outer insertion, still writing before "CCC".
        w.write("bbb");
        w.end_insert(outer);

        w.write("ddd");
        let (sql, _) = w.finish();
        assert_eq!("AAABBBbbbCCCddd", sql);
    }

    #[test]
    fn insert_at_keeps_the_cursor_on_the_same_logical_spot() {
        let mut w = TokenWriter::new();
        w.write("ab");

        let guard = w.begin_insert(2);
        w.write("cd");
        w.insert_at(0, "((");
        w.write("ef");
        w.end_insert(guard);

        let (sql, _) = w.finish();
        assert_eq!("((abcdef", sql);
    }

    #[test]
    fn capture_windows_share_parameters_but_not_text() {
        let mut w = TokenWriter::new();
        w.write("outer");

        let guard = w.begin_capture();
        w.write("inner");
        w.declare_parameter("p", Value::Int32(1));
        let frag = w.end_capture(guard);

        assert_eq!("inner", frag);
        assert_eq!(1, w.params_len());

        let (sql, params) = w.finish();
        assert_eq!("outer", sql);
        assert_eq!(Some(&Value::Int32(1)), params.get("p"));
    }

    #[test]
    fn equal_name_and_value_reuses_the_binding() {
        let mut w = TokenWriter::new();
        let a = w.declare_parameter("Status", Value::Int32(1));
        let b = w.declare_parameter("Status", Value::Int32(1));

        assert_eq!(a, b);
        assert_eq!(1, w.params_len());
    }

    #[test]
    fn colliding_values_get_numeric_suffixes() {
        let mut w = TokenWriter::new();
        let a = w.declare_parameter("Status", Value::Int32(1));
        let b = w.declare_parameter("Status", Value::Int32(2));
        let c = w.declare_parameter("Status", Value::Int32(3));
        let again = w.declare_parameter("Status", Value::Int32(2));

        assert_eq!("Status", a);
        assert_eq!("Status1", b);
        assert_eq!("Status2", c);
        assert_eq!("Status1", again);
        assert_eq!(3, w.params_len());
    }

    #[test]
    fn parameter_names_are_sanitized() {
        let mut w = TokenWriter::new();
        assert_eq!("p", w.declare_parameter("", Value::Int32(1)));
        assert_eq!("p0", w.declare_parameter("0", Value::Int32(2)));
        assert_eq!("ab", w.declare_parameter("a-b", Value::Int32(3)));
    }
}
