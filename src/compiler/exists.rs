//! Nested existence: `Any`/`All`/`Exists` as `EXISTS (...)` subqueries and
//! `Contains` as membership tests, batched for in-memory collections.
use crate::ast::{Expr, Lambda, Value};
use crate::compiler::core::{member_name_of, Emitter};
use crate::compiler::select::{self, SubOptions};
use crate::error::{Error, Result};
use either::Either;

/// `Any(pred)` and its `Exists` alias: an `EXISTS` subquery selecting a
/// bare `1`, with the optional predicate folded into its `WHERE`.
pub(crate) fn visit_any(em: &mut Emitter<'_>, source: &Expr, pred: Option<&Lambda>) -> Result<()> {
    ensure_query_source(source)?;

    let keyword = if em.w.negated() { "NOT EXISTS (" } else { "EXISTS (" };
    em.w.write(keyword);
    let sub = compile_existence(em, source, pred, false)?;
    em.w.write(&sub);
    em.w.write(")");
    Ok(())
}

/// `All(pred)` is `NOT EXISTS` of the counterexamples: the subquery keeps
/// the source shape and negates the predicate through the writer flag.
pub(crate) fn visit_all(em: &mut Emitter<'_>, source: &Expr, pred: &Lambda) -> Result<()> {
    ensure_query_source(source)?;

    let keyword = if em.w.negated() { "EXISTS (" } else { "NOT EXISTS (" };
    em.w.write(keyword);
    let sub = compile_existence(em, source, Some(pred), true)?;
    em.w.write(&sub);
    em.w.write(")");
    Ok(())
}

fn compile_existence(
    em: &mut Emitter<'_>,
    source: &Expr,
    pred: Option<&Lambda>,
    negate_pred: bool,
) -> Result<String> {
    // The subquery starts its own predicate context; the enclosing
    // inversion already chose the EXISTS polarity.
    let prev = em.w.set_negated(false);
    let opts = SubOptions {
        projection_override: Some("1"),
        extra_pred: pred,
        negate_extra: negate_pred,
    };
    let out = select::compile_with(em, source, &opts);
    em.w.set_negated(prev);
    Ok(out?.sql)
}

/// `Contains` over anything that is not text: an in-memory collection
/// becomes batched `IN` lists, a query source becomes `IN (subquery)`.
pub(crate) fn visit_membership(em: &mut Emitter<'_>, source: &Expr, item: &Expr) -> Result<()> {
    match membership_source(source) {
        Some(Either::Left(values)) => visit_in_list(em, &values, item),
        Some(Either::Right(query)) => visit_in_subquery(em, query, item),
        None => Err(Error::unsupported(
            "a membership test needs an in-memory collection or a query source",
        )),
    }
}

/// Classifies the receiver of a `Contains`. Navigation-style members
/// (collection fields on an entity) carry no relation metadata and are not
/// translatable.
fn membership_source(source: &Expr) -> Option<Either<Vec<Value>, &Expr>> {
    match source {
        Expr::Constant(c) => match &c.value {
            Value::Array(items) => Some(Either::Left(items.clone())),
            _ => None,
        },
        Expr::Member(m) => {
            // A captured collection on a host object.
            let rooted = match &*m.target {
                Expr::Constant(c) => c.value.record_field(&m.name).cloned(),
                _ => None,
            };
            match rooted {
                Some(Value::Array(items)) => Some(Either::Left(items)),
                _ => None,
            }
        }
        Expr::Call(_) => Some(Either::Right(source)),
        _ => None,
    }
}

fn visit_in_list(em: &mut Emitter<'_>, values: &[Value], item: &Expr) -> Result<()> {
    let negated = em.w.negated();

    // An empty collection is an always-false membership; the sentinel keeps
    // boolean semantics intact under AND composition instead of silently
    // dropping the clause.
    if values.is_empty() {
        em.w.write(if negated { "1 = 1" } else { "1 = 0" });
        return Ok(());
    }

    let frag = em.capture(|em| em.visit_value(item, None))?;
    let hint = member_name_of(item).unwrap_or("p").to_string();
    let keyword = if negated { " NOT IN (" } else { " IN (" };
    let joiner = if negated { " AND " } else { " OR " };

    let ceiling = em.profile.in_batch_ceiling();
    let batches: Vec<&[Value]> = values.chunks(ceiling).collect();
    let wrapped = batches.len() > 1;

    if wrapped {
        em.w.write("(");
    }

    for (i, batch) in batches.iter().enumerate() {
        if i > 0 {
            em.w.write(joiner);
        }
        em.w.write(&frag);
        em.w.write(keyword);
        for (j, value) in batch.iter().enumerate() {
            if j > 0 {
                em.w.write(", ");
            }
            let name = em.w.declare_parameter(&hint, value.clone());
            let text = em.profile.format_param(&name);
            em.w.write(&text);
        }
        em.w.write(")");
    }

    if wrapped {
        em.w.write(")");
    }

    Ok(())
}

fn visit_in_subquery(em: &mut Emitter<'_>, query: &Expr, item: &Expr) -> Result<()> {
    em.visit_value(item, None)?;
    let keyword = if em.w.negated() { " NOT IN (" } else { " IN (" };
    em.w.write(keyword);

    let prev = em.w.set_negated(false);
    let sub = select::compile_with(em, query, &SubOptions::default());
    em.w.set_negated(prev);
    let sub = sub?;

    if sub.arity != 1 {
        return Err(Error::type_access(format!(
            "the membership subquery must project exactly one column, it projects {}",
            sub.arity
        )));
    }

    em.w.write(&sub.sql);
    em.w.write(")");
    Ok(())
}

fn ensure_query_source(source: &Expr) -> Result<()> {
    match source {
        Expr::Call(_) => Ok(()),
        Expr::Member(m) => Err(Error::unsupported(format!(
            "existence over the collection member '{}' needs relation metadata the schema does not carry",
            m.name
        ))),
        _ => Err(Error::syntax("an existence test needs a query source")),
    }
}
