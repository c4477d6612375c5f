//! Turning expression trees into dialect-correct SQL.
//!
//! One [`Compiler`] call owns one token writer and one root alias scope;
//! nothing is shared across compilations except the schema resolver, which
//! must tolerate concurrent lookups. Compilation is a single synchronous
//! tree walk with no I/O; every error aborts the whole compile at its point
//! of detection.
mod combine;
mod core;
mod exists;
mod registry;
mod scope;
mod select;
mod writer;

pub use registry::{CallHandler, CallRegistry};
pub use writer::{Parameter, Params, TokenWriter};

use crate::ast::{Expr, Value};
use crate::dialect::DialectProfile;
use crate::error::Result;
use crate::schema::SchemaResolver;
use serde::Serialize;

/// The outcome of one compilation: the statement, its parameter map and the
/// row-expectation metadata terminal operators left behind. Immutable once
/// returned.
#[derive(Debug, Clone, Serialize)]
pub struct Compilation {
    pub sql: String,
    pub params: Params,
    /// The caller must surface an error when no row comes back.
    pub required: bool,
    /// Stand-in row value for `...OrDefault` terminals.
    pub default_value: Option<Value>,
    /// The message to raise when `required` is violated.
    pub missing_data_message: Option<String>,
    /// Statement timeout in seconds; opaque to the compiler, applied by the
    /// execution layer.
    pub timeout: Option<u32>,
}

/// The compilation façade: one dialect profile, one schema resolver, an
/// optional registry of custom operator handlers.
pub struct Compiler<'a> {
    profile: &'a DialectProfile,
    schema: &'a dyn SchemaResolver,
    registry: CallRegistry,
}

impl<'a> Compiler<'a> {
    pub fn new(profile: &'a DialectProfile, schema: &'a dyn SchemaResolver) -> Self {
        Self {
            profile,
            schema,
            registry: CallRegistry::new(),
        }
    }

    /// Installs a custom operator handler.
    pub fn register(mut self, name: impl Into<String>, arity: usize, handler: CallHandler) -> Self {
        self.registry.register(name, arity, handler);
        self
    }

    /// Compiles a root expression tree into SQL text plus parameters.
    pub fn compile(&self, root: &Expr) -> Result<Compilation> {
        let mut emitter = self::core::Emitter::new(self.profile, self.schema, &self.registry);
        let compiled = select::compile_root(&mut emitter, root)?;
        let (_, params) = emitter.w.finish();

        let compilation = Compilation {
            sql: compiled.sql,
            params,
            required: compiled.required,
            default_value: compiled.default_value,
            missing_data_message: compiled.missing_data_message,
            timeout: compiled.timeout,
        };

        tracing::debug!(
            engine = %self.profile.engine(),
            params = compilation.params.len(),
            sql = %compilation.sql,
            "compiled query tree"
        );

        Ok(compilation)
    }
}
