//! # treeline
//!
//! An abstraction layer compiling declarative query expression trees into
//! dialect-correct SQL text plus a named parameter map, for SQL Server,
//! MySQL, Oracle, PostgreSQL, SQLite, DB2, Sybase, Access and a generic
//! fallback.
//!
//! The crate deliberately ends where execution begins: it knows nothing
//! about connections, transactions or result sets. Feed it an expression
//! tree (usually assembled through [`ast::builder`]), a
//! [`DialectProfile`](dialect::DialectProfile) and a
//! [`SchemaResolver`](schema::SchemaResolver), and it hands back a
//! [`Compilation`].
//!
//! ### Example
//!
//! ```rust
//! use treeline::ast::builder::*;
//! use treeline::ast::TypeRef;
//! use treeline::dialect::DialectProfile;
//! use treeline::schema::{SchemaRegistry, TableSchema};
//! use treeline::Compiler;
//!
//! # fn main() -> Result<(), treeline::Error> {
//! let schema = SchemaRegistry::new().register(
//!     TableSchema::build("Order", "orders")
//!         .generated("Id", "id")
//!         .field("Status", "status")
//!         .field("Total", "total")
//!         .primary_key(&["Id"])
//!         .finish(),
//! );
//!
//! let order = TypeRef::entity("Order");
//! let o = || param("o", order.clone());
//!
//! let query = from("Order")
//!     .filter(lambda(
//!         "o",
//!         order.clone(),
//!         o().get("Status", TypeRef::Int32)
//!             .eq(val(1))
//!             .and(o().get("Total", TypeRef::Decimal).gt(val(100))),
//!     ))
//!     .order_by_desc(lambda("o", order.clone(), o().get("Total", TypeRef::Decimal)))
//!     .take(10)
//!     .select(lambda(
//!         "o",
//!         order.clone(),
//!         new_shape(vec![
//!             ("Id", o().get("Id", TypeRef::Int64)),
//!             ("Total", o().get("Total", TypeRef::Decimal)),
//!         ]),
//!     ));
//!
//! let profile = DialectProfile::sql_server();
//! let compilation = Compiler::new(&profile, &schema).compile(&query)?;
//!
//! assert_eq!(
//!     "SELECT TOP (10) t0.[id] AS [Id], t0.[total] AS [Total] FROM [orders] t0 \
//!      WHERE (t0.[status] = @Status AND t0.[total] > @Total) ORDER BY t0.[total] DESC",
//!     compilation.sql
//! );
//! # Ok(())
//! # }
//! ```
pub mod ast;
pub mod compiler;
pub mod dialect;
pub mod error;
pub mod prelude;
pub mod schema;

pub use compiler::{CallHandler, CallRegistry, Compilation, Compiler, Parameter, Params, TokenWriter};
pub use error::{Error, ErrorKind, Result};
