//! Combinations: `UNION`, `UNION ALL` (from `Concat`), `EXCEPT`,
//! `INTERSECT`.
//!
//! Both operands compile as independent statements sharing one parameter
//! table. A combination at the chain root is returned as-is; mid-chain it
//! is wrapped as a parenthesized table source by the select visitor.
use crate::ast::Call;
use crate::compiler::core::Emitter;
use crate::compiler::select::{self, CompiledSelect, SubOptions};
use crate::error::{Error, Result};

pub(crate) fn compile_combination(em: &mut Emitter<'_>, c: &Call) -> Result<(String, usize)> {
    let keyword = match c.name.as_str() {
        "Union" => "UNION",
        "Concat" => "UNION ALL",
        "Except" => "EXCEPT",
        "Intersect" => "INTERSECT",
        other => return Err(Error::unsupported(format!("combination operator {other}"))),
    };

    let left = c
        .receiver
        .as_deref()
        .ok_or_else(|| Error::syntax("a combination needs a left operand"))?;
    let right = c
        .args
        .first()
        .ok_or_else(|| Error::syntax("a combination needs a right operand"))?;

    let left = compile_operand(em, left)?;
    let right = compile_operand(em, right)?;

    // Column lists must agree for the engine to line the sides up.
    if left.arity != right.arity {
        return Err(Error::type_access(format!(
            "the combination sides project {} and {} columns",
            left.arity, right.arity
        )));
    }

    Ok((format!("{} {keyword} {}", left.sql, right.sql), left.arity))
}

fn compile_operand(em: &mut Emitter<'_>, operand: &crate::ast::Expr) -> Result<CompiledSelect> {
    select::compile_with(em, operand, &SubOptions::default())
}
