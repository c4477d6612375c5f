//! Nested alias tables.
//!
//! A fresh frame is pushed per query level (root statement, subquery, join
//! side, combination operand) and popped when its visitor finishes. Lookups
//! fall back outward through the chain; a frame never writes into an
//! ancestor.
#[derive(Debug, Clone)]
struct Binding {
    entity: String,
    /// The declared lambda-parameter or selector-member name the entity was
    /// bound under, when there is one.
    name: Option<String>,
    alias: String,
}

#[derive(Debug, Default)]
struct Frame {
    bindings: Vec<Binding>,
}

#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    fn current(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        self.frames.last_mut().unwrap()
    }

    /// The alias already bound for an entity in the current frame, if any.
    /// Within one frame the first alias bound for an entity wins; a later
    /// request under a different proposed name still returns it.
    pub fn existing_in_current(&self, entity: &str) -> Option<&str> {
        self.frames
            .last()?
            .bindings
            .iter()
            .find(|b| b.entity == entity)
            .map(|b| b.alias.as_str())
    }

    /// Records a binding in the current frame.
    pub fn record(&mut self, entity: &str, name: Option<&str>, alias: &str) {
        let frame = self.current();
        let already = frame
            .bindings
            .iter()
            .any(|b| b.entity == entity && b.name.as_deref() == name);
        if !already {
            frame.bindings.push(Binding {
                entity: entity.to_string(),
                name: name.map(str::to_string),
                alias: alias.to_string(),
            });
        }
    }

    /// Resolves an entity reference to its alias.
    ///
    /// An exact `(entity, declared name)` match is searched through the
    /// whole chain first, so a correlated subquery over the same entity
    /// type as its enclosing query still sees the outer lambda parameter
    /// under the outer alias. Only then does the name-agnostic per-entity
    /// fallback run, innermost frame first.
    pub fn resolve(&self, entity: &str, name: Option<&str>) -> Option<&str> {
        if let Some(wanted) = name {
            for frame in self.frames.iter().rev() {
                let hit = frame
                    .bindings
                    .iter()
                    .find(|b| b.entity == entity && b.name.as_deref() == Some(wanted));
                if let Some(b) = hit {
                    return Some(&b.alias);
                }
            }
        }

        for frame in self.frames.iter().rev() {
            if let Some(b) = frame.bindings.iter().find(|b| b.entity == entity) {
                return Some(&b.alias);
            }
        }

        None
    }
}
