//! The open slot in operator dispatch.
//!
//! Recognized operator names are matched exhaustively; anything else is
//! looked up here before the compiler gives up with `UnsupportedOperator`.
//! Handlers receive the already-emitted receiver/argument fragments and
//! write their own output, so a handler cannot corrupt traversal state.
use crate::dialect::DialectProfile;
use crate::error::Result;
use crate::TokenWriter;
use std::collections::HashMap;

/// A custom scalar-operator handler. `frags` holds the receiver fragment
/// (when the call has a receiver) followed by one fragment per argument.
pub type CallHandler = fn(&mut TokenWriter, &DialectProfile, frags: &[String]) -> Result<()>;

/// Custom operator handlers, keyed by `(operator name, argument arity)`.
#[derive(Debug, Default)]
pub struct CallRegistry {
    handlers: HashMap<(String, usize), CallHandler>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler; a later registration for the same key replaces
    /// the earlier one.
    pub fn register(&mut self, name: impl Into<String>, arity: usize, handler: CallHandler) -> &mut Self {
        self.handlers.insert((name.into(), arity), handler);
        self
    }

    pub fn get(&self, name: &str, arity: usize) -> Option<CallHandler> {
        self.handlers.get(&(name.to_string(), arity)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_keyed_by_name_and_arity() {
        fn emit_year(w: &mut TokenWriter, _: &DialectProfile, frags: &[String]) -> Result<()> {
            w.write(&format!("YEAR({})", frags[0]));
            Ok(())
        }

        let mut registry = CallRegistry::new();
        registry.register("Year", 0, emit_year);

        assert!(registry.get("Year", 0).is_some());
        assert!(registry.get("Year", 1).is_none());
        assert!(registry.get("Month", 0).is_none());
    }
}
