//! The query expression tree.
//!
//! The ast module holds the generic, declarative operator tree the compiler
//! consumes, without going into database-level specifics. Everything related
//! to turning a tree into SQL text lives in the
//! [compiler](../compiler/index.html) module.
pub mod builder;
mod expression;
mod ops;
mod types;
mod values;

pub use expression::{
    Binary, Call, Conditional, Constant, Expr, Lambda, Member, NewShape, Param, Switch, SwitchCase, Unary,
};
pub use ops::{BinaryOp, QueryOp, UnaryOp};
pub use types::TypeRef;
pub use values::Value;
