//! A collection of the most relevant imports.
pub use crate::ast::builder::*;
pub use crate::ast::{BinaryOp, Expr, QueryOp, TypeRef, UnaryOp, Value};
pub use crate::compiler::{CallRegistry, Compilation, Compiler, Params};
pub use crate::dialect::{DialectProfile, Engine};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::schema::{CachingResolver, SchemaRegistry, SchemaResolver, TableSchema};
