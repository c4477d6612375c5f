//! Statement assembly: the state machine over a linear operator chain.
//!
//! The chain's innermost node is the source; operators accumulate clause
//! fragments (produced by the core traversal through capture windows) until
//! the final assembly hands the parts to the dialect's pagination hook.
//! Two states exist: collecting-shape and select-emitted — shape-mutating
//! operators are only legal before the terminal projection.
use crate::ast::{Call, Expr, Lambda, QueryOp, Value};
use crate::compiler::combine;
use crate::compiler::core::{Emitter, GroupContext, GroupKey};
use crate::dialect::SelectParts;
use crate::error::{Error, Result};
use itertools::Itertools;
use std::collections::BTreeSet;

/// One fully compiled statement plus the row-expectation metadata carried
/// out of terminal operators.
#[derive(Debug, Clone)]
pub(crate) struct CompiledSelect {
    pub sql: String,
    /// Number of projected columns; combinations and membership subqueries
    /// check it.
    pub arity: usize,
    pub required: bool,
    pub default_value: Option<Value>,
    pub missing_data_message: Option<String>,
    pub timeout: Option<u32>,
}

/// Adjustments for nested compilations (existence subqueries, membership
/// subqueries, combination operands).
#[derive(Default)]
pub(crate) struct SubOptions<'x> {
    /// Replaces the projection entirely, e.g. the bare `1` of an `EXISTS`.
    pub projection_override: Option<&'x str>,
    /// An extra predicate folded into `WHERE` after the chain's own
    /// operators.
    pub extra_pred: Option<&'x Lambda>,
    /// Visit the extra predicate under an inverted context (`All`).
    pub negate_extra: bool,
}

#[derive(Default)]
struct SelectState {
    entity: Option<String>,
    alias: Option<String>,
    from_sql: String,
    joins: Vec<String>,
    wheres: Vec<String>,
    havings: Vec<String>,
    group_by: Vec<String>,
    /// `(fragment, descending)`; the direction is XORed with `reverse` at
    /// assembly.
    order: Vec<(String, bool)>,
    projection: Option<(String, usize)>,
    /// Arity of a wrapped combination source, used when no projection
    /// narrows it down.
    wildcard_arity: Option<usize>,
    distinct: bool,
    take: Option<u64>,
    skip: u64,
    reverse: bool,
    select_emitted: bool,
    grouped: bool,
    /// Only `From`/`Join` seen so far; a join's left side must stay pure.
    pure_source: bool,
    allowed: Option<BTreeSet<String>>,
    required: bool,
    default_value: Option<Value>,
    missing_data_message: Option<String>,
    timeout: Option<u32>,
}

pub(crate) fn compile_root(em: &mut Emitter<'_>, root: &Expr) -> Result<CompiledSelect> {
    compile_with(em, root, &SubOptions::default())
}

/// Compiles one statement in a fresh alias frame, with the enclosing
/// frames visible read-only. Grouping state of the enclosing statement is
/// shelved for the duration.
pub(crate) fn compile_with(em: &mut Emitter<'_>, root: &Expr, opts: &SubOptions<'_>) -> Result<CompiledSelect> {
    let saved_group = em.group.take();
    em.scopes.push();
    let out = compile_inner(em, root, opts);
    em.scopes.pop();
    em.group = saved_group;
    out
}

fn compile_inner(em: &mut Emitter<'_>, root: &Expr, opts: &SubOptions<'_>) -> Result<CompiledSelect> {
    let (source, ops) = flatten(root)?;
    let mut st = SelectState {
        pure_source: true,
        ..SelectState::default()
    };

    apply_source(em, &mut st, source, &ops, opts)?;

    // A chain that is exactly a combination compiles to the joined
    // statements with no wrapper.
    if st.from_sql.is_empty() {
        let (sql, arity) = combine::compile_combination(em, source)?;
        return Ok(CompiledSelect {
            sql,
            arity,
            required: false,
            default_value: None,
            missing_data_message: None,
            timeout: None,
        });
    }

    let total = ops.len();
    for (i, c) in ops.iter().enumerate() {
        let op = QueryOp::from_name(&c.name).expect("flatten validated the names");
        let last = i + 1 == total;

        if op.is_aggregate() {
            if !last {
                return Err(Error::syntax(
                    "no operator may follow an aggregation; the result has no row shape",
                ));
            }
            return finish_aggregate(em, &mut st, c);
        }

        apply_operator(em, &mut st, c, op)?;
    }

    if let Some(pred) = opts.extra_pred {
        apply_extra_predicate(em, &mut st, pred, opts.negate_extra)?;
    }

    if let Some(projection) = opts.projection_override {
        st.projection = Some((projection.to_string(), 1));
    }

    let sql = assemble(em, &st)?;
    let arity = st
        .projection
        .as_ref()
        .map(|(_, arity)| *arity)
        .or(st.wildcard_arity)
        .map(Ok)
        .unwrap_or_else(|| default_projection(em, &st).map(|(_, arity)| arity))?;

    Ok(CompiledSelect {
        sql,
        arity,
        required: st.required,
        default_value: st.default_value,
        missing_data_message: st.missing_data_message,
        timeout: st.timeout,
    })
}

/// Splits the chain into its innermost source node and the operator list,
/// innermost first.
fn flatten(root: &Expr) -> Result<(&Call, Vec<&Call>)> {
    let mut ops: Vec<&Call> = Vec::new();
    let mut cur = root;

    loop {
        let c = match cur {
            Expr::Call(c) => c,
            _ => return Err(Error::syntax("the query root must be an operator chain over a source")),
        };

        let op = QueryOp::from_name(&c.name)
            .ok_or_else(|| Error::unsupported(format!("query operator {}", c.name)))?;

        if op == QueryOp::From || op.is_combination() {
            ops.reverse();
            return Ok((c, ops));
        }

        let receiver = c
            .receiver
            .as_deref()
            .ok_or_else(|| Error::syntax(format!("operator {} needs a source", c.name)))?;
        ops.push(c);
        cur = receiver;
    }
}

fn apply_source(
    em: &mut Emitter<'_>,
    st: &mut SelectState,
    source: &Call,
    ops: &[&Call],
    opts: &SubOptions<'_>,
) -> Result<()> {
    if source.name == "From" {
        let entity = source
            .ty
            .entity_name()
            .ok_or_else(|| Error::type_access("a query source must be entity-shaped"))?
            .to_string();
        let schema = em.table_schema(&entity)?;
        let alias = em.bind_entity(&entity, None);

        st.from_sql = format!(" FROM {} {}", em.profile.quote(schema.table()), alias);
        st.entity = Some(entity);
        st.alias = Some(alias);
        return Ok(());
    }

    // Combination source. When nothing follows it, compile_inner returns
    // the naked combination; otherwise it becomes a wrapped table source.
    if ops.is_empty() && opts.projection_override.is_none() && opts.extra_pred.is_none() {
        return Ok(());
    }

    let (sql, arity) = combine::compile_combination(em, source)?;
    let entity = source.ty.entity_name().map(str::to_string);
    let alias = match &entity {
        Some(e) => em.bind_entity(e, None),
        None => em.fresh_alias(),
    };

    st.from_sql = format!(" FROM ({sql}) {alias}");
    st.entity = entity;
    st.alias = Some(alias);
    st.wildcard_arity = Some(arity);
    Ok(())
}

fn apply_operator(em: &mut Emitter<'_>, st: &mut SelectState, c: &Call, op: QueryOp) -> Result<()> {
    if op != QueryOp::Join {
        st.pure_source = false;
    }

    match op {
        QueryOp::Where | QueryOp::TakeWhile => apply_where(em, st, c, false),
        QueryOp::SkipWhile => apply_where(em, st, c, true),
        QueryOp::Select => apply_select(em, st, c),
        QueryOp::OrderBy | QueryOp::ThenBy => apply_order(em, st, c, false),
        QueryOp::OrderByDescending | QueryOp::ThenByDescending => apply_order(em, st, c, true),
        QueryOp::GroupBy => apply_group(em, st, c),
        QueryOp::Join => apply_join(em, st, c),
        QueryOp::Distinct => {
            ensure_shape_open(st, "Distinct")?;
            st.distinct = true;
            Ok(())
        }
        QueryOp::Cast | QueryOp::OfType => apply_cast(em, st, c),
        QueryOp::Take => {
            ensure_shape_open(st, "Take")?;
            tighten_take(st, positive_arg(c, "Take")?)
        }
        QueryOp::Skip => {
            ensure_shape_open(st, "Skip")?;
            let n = non_negative_arg(c, "Skip")?;
            st.skip += n;
            Ok(())
        }
        QueryOp::TakeLast => {
            ensure_shape_open(st, "TakeLast")?;
            require_order(st, "TakeLast")?;
            st.reverse = !st.reverse;
            tighten_take(st, positive_arg(c, "TakeLast")?)
        }
        QueryOp::SkipLast => {
            ensure_shape_open(st, "SkipLast")?;
            require_order(st, "SkipLast")?;
            st.reverse = !st.reverse;
            st.skip += non_negative_arg(c, "SkipLast")?;
            Ok(())
        }
        QueryOp::Reverse => {
            ensure_shape_open(st, "Reverse")?;
            require_order(st, "Reverse")?;
            st.reverse = !st.reverse;
            Ok(())
        }
        QueryOp::First | QueryOp::FirstOrDefault | QueryOp::Single | QueryOp::SingleOrDefault => {
            apply_row_terminal(em, st, c, matches!(op, QueryOp::First | QueryOp::Single), false)
        }
        QueryOp::Last | QueryOp::LastOrDefault => {
            require_order(st, "Last")?;
            st.reverse = !st.reverse;
            apply_row_terminal(em, st, c, op == QueryOp::Last, false)
        }
        QueryOp::ElementAt | QueryOp::ElementAtOrDefault => {
            apply_row_terminal(em, st, c, op == QueryOp::ElementAt, true)
        }
        QueryOp::DefaultIfEmpty => {
            st.required = false;
            st.missing_data_message = None;
            st.default_value = Some(
                c.args
                    .first()
                    .and_then(Expr::as_constant)
                    .cloned()
                    .unwrap_or(Value::Null),
            );
            Ok(())
        }
        QueryOp::WithTimeout => {
            let seconds = const_int(c.args.first()).ok_or_else(|| {
                Error::syntax("WithTimeout expects a constant number of seconds")
            })?;
            if seconds < 0 {
                return Err(Error::range("a timeout cannot be negative"));
            }
            st.timeout = Some(seconds as u32);
            Ok(())
        }
        QueryOp::From
        | QueryOp::Union
        | QueryOp::Concat
        | QueryOp::Except
        | QueryOp::Intersect
        | QueryOp::Count
        | QueryOp::LongCount
        | QueryOp::Sum
        | QueryOp::Min
        | QueryOp::Max
        | QueryOp::Average => unreachable!("handled before the operator loop"),
    }
}

fn ensure_shape_open(st: &SelectState, op: &str) -> Result<()> {
    if st.select_emitted {
        return Err(Error::syntax(format!(
            "{op} cannot follow the projection; place the projection last"
        )));
    }
    Ok(())
}

fn require_order(st: &SelectState, op: &str) -> Result<()> {
    if st.order.is_empty() {
        return Err(Error::syntax(format!(
            "{op} needs an ordering; compose an OrderBy first"
        )));
    }
    Ok(())
}

fn const_int(e: Option<&Expr>) -> Option<i64> {
    e.and_then(Expr::as_constant).and_then(Value::as_integer)
}

fn positive_arg(c: &Call, op: &str) -> Result<u64> {
    let n = const_int(c.args.first())
        .ok_or_else(|| Error::syntax(format!("{op} expects a constant count")))?;
    if n <= 0 {
        return Err(Error::range(format!("{op} expects a positive count, got {n}")));
    }
    Ok(n as u64)
}

fn non_negative_arg(c: &Call, op: &str) -> Result<u64> {
    let n = const_int(c.args.first())
        .ok_or_else(|| Error::syntax(format!("{op} expects a constant count")))?;
    if n < 0 {
        return Err(Error::range(format!("{op} expects a non-negative count, got {n}")));
    }
    Ok(n as u64)
}

/// Later bounds may only tighten: the smallest take wins, loosening is a
/// contradiction the caller must hear about.
fn tighten_take(st: &mut SelectState, n: u64) -> Result<()> {
    match st.take {
        Some(t) if n > t => Err(Error::range(format!(
            "Take({n}) loosens the earlier Take({t}); bounds may only tighten"
        ))),
        _ => {
            st.take = Some(n);
            Ok(())
        }
    }
}

fn single_lambda<'x>(c: &'x Call, op: &str) -> Result<&'x Lambda> {
    c.args
        .first()
        .and_then(Expr::as_lambda)
        .ok_or_else(|| Error::syntax(format!("{op} expects a lambda argument")))
}

/// Binds a lambda's parameter for the current statement level. After a
/// grouping, the parameter stands for the grouping itself.
fn bind_lambda(em: &mut Emitter<'_>, st: &SelectState, lambda: &Lambda) -> Result<()> {
    if lambda.params.len() != 1 {
        return Err(Error::syntax("multi-parameter lambdas are not translatable"));
    }

    let (name, ty) = &lambda.params[0];
    if st.grouped {
        if let Some(group) = em.group.as_mut() {
            group.param = Some(name.clone());
        }
    } else if let Some(entity) = ty.entity_name() {
        let entity = entity.to_string();
        em.bind_entity(&entity, Some(name.as_str()));
    }

    Ok(())
}

fn apply_where(em: &mut Emitter<'_>, st: &mut SelectState, c: &Call, invert: bool) -> Result<()> {
    ensure_shape_open(st, &c.name)?;
    let lambda = single_lambda(c, &c.name)?;
    bind_lambda(em, st, lambda)?;
    push_predicate(em, st, lambda, invert)
}

fn apply_extra_predicate(em: &mut Emitter<'_>, st: &mut SelectState, lambda: &Lambda, invert: bool) -> Result<()> {
    bind_lambda(em, st, lambda)?;
    push_predicate(em, st, lambda, invert)
}

fn push_predicate(em: &mut Emitter<'_>, st: &mut SelectState, lambda: &Lambda, invert: bool) -> Result<()> {
    if matches!(&*lambda.body, Expr::Constant(_)) {
        return Err(Error::syntax(
            "a boolean literal cannot stand as a predicate on its own",
        ));
    }

    let frag = em.capture(|em| em.with_negated_xor(invert, |em| em.visit_predicate(&lambda.body)))?;

    if !frag.is_empty() {
        if st.grouped {
            st.havings.push(frag);
        } else {
            st.wheres.push(frag);
        }
    }
    Ok(())
}

fn apply_order(em: &mut Emitter<'_>, st: &mut SelectState, c: &Call, descending: bool) -> Result<()> {
    ensure_shape_open(st, &c.name)?;
    let lambda = single_lambda(c, &c.name)?;
    bind_lambda(em, st, lambda)?;

    let frag = em.capture(|em| em.visit_value(&lambda.body, None))?;
    st.order.push((frag, descending));
    Ok(())
}

/// Captures, per key member, the SQL that computes it. Later `.Key`
/// accesses substitute the captured fragment verbatim instead of
/// recomputing it.
fn apply_group(em: &mut Emitter<'_>, st: &mut SelectState, c: &Call) -> Result<()> {
    ensure_shape_open(st, "GroupBy")?;
    if st.grouped {
        return Err(Error::syntax("only one grouping level is translatable"));
    }

    let lambda = single_lambda(c, "GroupBy")?;
    bind_lambda(em, st, lambda)?;

    let mut keys = Vec::new();
    match &*lambda.body {
        Expr::New(shape) => {
            for (name, expr) in &shape.members {
                let frag = em.capture(|em| em.visit_value(expr, None))?;
                st.group_by.push(frag.clone());
                keys.push(GroupKey {
                    name: Some(name.clone()),
                    frag,
                });
            }
        }
        key => {
            let frag = em.capture(|em| em.visit_value(key, None))?;
            st.group_by.push(frag.clone());
            keys.push(GroupKey { name: None, frag });
        }
    }

    em.group = Some(GroupContext { keys, param: None });
    st.grouped = true;
    Ok(())
}

fn apply_cast(em: &mut Emitter<'_>, st: &mut SelectState, c: &Call) -> Result<()> {
    ensure_shape_open(st, &c.name)?;

    let target = c
        .ty
        .entity_name()
        .ok_or_else(|| Error::type_access("a cast must target an entity type"))?
        .to_string();
    let target_schema = em.table_schema(&target)?;
    let target_fields: BTreeSet<String> = target_schema.fields().iter().map(|f| f.name.clone()).collect();

    let current: BTreeSet<String> = match &st.allowed {
        Some(allowed) => allowed.clone(),
        None => {
            let entity = st
                .entity
                .as_deref()
                .ok_or_else(|| Error::type_access("a cast needs an entity-shaped source"))?;
            em.table_schema(entity)?
                .fields()
                .iter()
                .map(|f| f.name.clone())
                .collect()
        }
    };

    let narrowed: BTreeSet<String> = current.intersection(&target_fields).cloned().collect();
    if narrowed.is_empty() {
        return Err(Error::no_queryable_fields(format!(
            "casting to '{target}' leaves no usable fields"
        )));
    }

    st.allowed = Some(narrowed);
    Ok(())
}

fn apply_row_terminal(
    em: &mut Emitter<'_>,
    st: &mut SelectState,
    c: &Call,
    required: bool,
    indexed: bool,
) -> Result<()> {
    if indexed {
        let n = non_negative_arg(c, &c.name)?;
        if let Some(t) = st.take {
            if n + 1 > t {
                return Err(Error::range(format!(
                    "{}({n}) lies beyond the earlier Take({t})",
                    c.name
                )));
            }
        }
        st.skip += n;
    } else if let Some(pred) = c.args.first().and_then(Expr::as_lambda) {
        // The predicate overload folds into WHERE before the row is picked.
        bind_lambda(em, st, pred)?;
        push_predicate(em, st, pred, false)?;
    }

    st.take = Some(1);
    if required {
        st.required = true;
        st.missing_data_message = Some(format!("the query behind {} returned no rows", c.name));
        st.default_value = None;
    } else {
        st.required = false;
        st.default_value = Some(Value::Null);
        st.missing_data_message = None;
    }
    Ok(())
}

fn apply_select(em: &mut Emitter<'_>, st: &mut SelectState, c: &Call) -> Result<()> {
    ensure_shape_open(st, "Select")?;
    let lambda = single_lambda(c, "Select")?;
    bind_lambda(em, st, lambda)?;

    let projection = project(em, st, &lambda.body)?;
    st.projection = Some(projection);
    st.select_emitted = true;
    Ok(())
}

fn project(em: &mut Emitter<'_>, st: &SelectState, body: &Expr) -> Result<(String, usize)> {
    match body {
        Expr::Parameter(p) => {
            if st.grouped {
                return Err(Error::type_access(
                    "project the grouping key or aggregates, not the grouping itself",
                ));
            }
            let entity = p
                .ty
                .entity_name()
                .ok_or_else(|| Error::type_access("an identity projection needs an entity source"))?
                .to_string();
            let alias = em.alias_for(body)?;
            expansion(em, st, &entity, &alias)
        }
        Expr::Member(m) if m.ty.is_entity() => {
            let entity = m.ty.entity_name().expect("entity member").to_string();
            let alias = em.alias_for(body)?;
            expansion(em, st, &entity, &alias)
        }
        Expr::Member(m) if st.grouped && m.name == "Key" && is_group_param(em, &m.target) => {
            let group = em.group.as_ref().expect("grouped state");
            if group.keys.len() == 1 {
                return Ok((group.keys[0].frag.clone(), 1));
            }
            let parts = group
                .keys
                .iter()
                .map(|k| {
                    let name = k.name.as_deref().unwrap_or("Key");
                    format!("{} AS {}", k.frag, em.profile.quote(name))
                })
                .join(", ");
            Ok((parts, group.keys.len()))
        }
        Expr::New(shape) => {
            let mut parts = Vec::with_capacity(shape.members.len());
            let mut arity = 0;

            for (name, expr) in &shape.members {
                let entity_shaped = match expr {
                    Expr::Parameter(p) => p.ty.is_entity(),
                    Expr::Member(m) => m.ty.is_entity(),
                    _ => false,
                };

                if entity_shaped {
                    let entity = expr.ty().entity_name().expect("entity-shaped").to_string();
                    let alias = em.alias_for(expr)?;
                    let (list, n) = expansion(em, st, &entity, &alias)?;
                    parts.push(list);
                    arity += n;
                } else {
                    let frag = em.capture(|em| em.visit_value(expr, None))?;
                    parts.push(format!("{frag} AS {}", em.profile.quote(name)));
                    arity += 1;
                }
            }

            if arity == 0 {
                return Err(Error::no_queryable_fields("the projection selects nothing"));
            }
            Ok((parts.join(", "), arity))
        }
        scalar => {
            let frag = em.capture(|em| em.visit_value(scalar, None))?;
            Ok((frag, 1))
        }
    }
}

fn is_group_param(em: &Emitter<'_>, target: &Expr) -> bool {
    match (&em.group, target) {
        (Some(group), Expr::Parameter(p)) => group.param.as_deref() == Some(p.name.as_str()),
        _ => false,
    }
}

/// The ordered, possibly cast-narrowed column list of an entity.
fn expansion(em: &Emitter<'_>, st: &SelectState, entity: &str, alias: &str) -> Result<(String, usize)> {
    let schema = em.table_schema(entity)?;
    let fields: Vec<_> = schema
        .fields()
        .iter()
        .filter(|f| match &st.allowed {
            Some(allowed) => allowed.contains(&f.name),
            None => true,
        })
        .collect();

    if fields.is_empty() {
        return Err(Error::no_queryable_fields(format!(
            "entity '{entity}' has no fields left after narrowing"
        )));
    }

    let list = fields
        .iter()
        .map(|f| format!("{alias}.{}", em.profile.quote(&f.column)))
        .join(", ");
    Ok((list, fields.len()))
}

fn apply_join(em: &mut Emitter<'_>, st: &mut SelectState, c: &Call) -> Result<()> {
    ensure_shape_open(st, "Join")?;
    if !st.pure_source {
        return Err(Error::syntax(
            "a join's left side may only contain plain sources; compose other operators after the join",
        ));
    }
    if c.args.len() != 4 {
        return Err(Error::syntax("Join expects inner source, two key selectors and a result selector"));
    }

    let inner = &c.args[0];
    let outer_key = c.args[1]
        .as_lambda()
        .ok_or_else(|| Error::syntax("the outer key selector must be a lambda"))?;
    let inner_key = c.args[2]
        .as_lambda()
        .ok_or_else(|| Error::syntax("the inner key selector must be a lambda"))?;
    let result = c.args[3]
        .as_lambda()
        .ok_or_else(|| Error::syntax("the join result selector must be a lambda"))?;

    bind_lambda(em, st, outer_key)?;

    let inner_entity = inner
        .ty()
        .entity_name()
        .ok_or_else(|| Error::type_access("the join's inner source must be entity-shaped"))?
        .to_string();

    // Simple shape: a bare source joins as a table. Anything shaped joins
    // as an inlined subquery.
    let simple = matches!(
        flatten(inner),
        Ok((source, ref ops)) if ops.is_empty() && source.name == "From"
    );

    let rhs_body = if simple {
        let schema = em.table_schema(&inner_entity)?;
        em.profile.quote(schema.table())
    } else {
        let sub = compile_with(em, inner, &SubOptions::default())?;
        format!("({})", sub.sql)
    };

    if inner_key.params.len() != 1 {
        return Err(Error::syntax("multi-parameter lambdas are not translatable"));
    }
    let inner_param = &inner_key.params[0].0;
    let alias = em.bind_entity_fresh(&inner_entity, Some(inner_param.as_str()));

    let on = em.capture(|em| {
        em.visit_value(&outer_key.body, None)?;
        em.w.write(" = ");
        em.visit_value(&inner_key.body, None)
    })?;

    st.joins.push(format!(" LEFT JOIN {rhs_body} {alias} ON {on}"));

    // The result selector's member names become scope bindings so later
    // operators can reach both sides through the row.
    if result.params.len() > 2 {
        return Err(Error::syntax("a join result selector takes the two joined sources"));
    }
    match &*result.body {
        Expr::New(shape) => {
            for (name, expr) in &shape.members {
                let Expr::Parameter(p) = expr else {
                    return Err(Error::type_access(
                        "join result selector members must reference the joined sources",
                    ));
                };
                let entity = p
                    .ty
                    .entity_name()
                    .ok_or_else(|| Error::type_access("join result selector members must be entity-shaped"))?
                    .to_string();
                let bound = em
                    .scopes
                    .resolve(&entity, Some(p.name.as_str()))
                    .map(str::to_string)
                    .ok_or_else(|| Error::syntax(format!("'{}' is not a source of this join", p.name)))?;
                em.scopes.record(&entity, Some(name.as_str()), &bound);
            }
        }
        Expr::Parameter(_) => {}
        _ => {
            return Err(Error::type_access(
                "join result selectors project source references only",
            ))
        }
    }

    Ok(())
}

fn finish_aggregate(em: &mut Emitter<'_>, st: &mut SelectState, c: &Call) -> Result<CompiledSelect> {
    let func = match c.name.as_str() {
        "Count" | "LongCount" => "COUNT",
        "Sum" => "SUM",
        "Min" => "MIN",
        "Max" => "MAX",
        _ => "AVG",
    };

    let counting = func == "COUNT";

    // Count's predicate overload folds into the clause set first.
    if counting {
        if let Some(pred) = c.args.first().and_then(Expr::as_lambda) {
            bind_lambda(em, st, pred)?;
            push_predicate(em, st, pred, false)?;
        }
    }

    // A paginated or grouped source aggregates over a wrapped inner
    // statement; the plain case folds the aggregate into the projection.
    let needs_wrap = st.grouped || st.take.is_some() || st.skip > 0;

    // Ordering only matters to the aggregate when it bounds the row set;
    // some engines reject ORDER BY in an unpaginated derived table.
    if st.take.is_none() && st.skip == 0 {
        st.order.clear();
    }

    let sql = if counting {
        if needs_wrap {
            if st.projection.is_none() {
                if st.grouped {
                    let group = em.group.as_ref().expect("grouped state");
                    let keys = group.keys.iter().map(|k| k.frag.clone()).join(", ");
                    st.projection = Some((keys, em.group.as_ref().unwrap().keys.len()));
                } else {
                    st.projection = Some(default_projection(em, st)?);
                }
            }
            let inner = assemble(em, st)?;
            let alias = em.fresh_alias();
            format!("SELECT COUNT(*) FROM ({inner}) {alias}")
        } else {
            st.projection = Some(("COUNT(*)".to_string(), 1));
            assemble(em, st)?
        }
    } else {
        let frag = match c.args.first().and_then(Expr::as_lambda) {
            Some(selector) => {
                bind_lambda(em, st, selector)?;
                em.capture(|em| em.visit_value(&selector.body, None))?
            }
            None => match &st.projection {
                Some((proj, 1)) => proj.clone(),
                _ => {
                    return Err(Error::syntax(format!(
                        "{} needs a selector or a preceding single-column projection",
                        c.name
                    )))
                }
            },
        };

        if needs_wrap {
            let agg_col = em.profile.quote("agg_");
            st.projection = Some((format!("{frag} AS {agg_col}"), 1));
            let inner = assemble(em, st)?;
            let alias = em.fresh_alias();
            format!("SELECT {func}({alias}.{agg_col}) FROM ({inner}) {alias}")
        } else {
            st.projection = Some((format!("{func}({frag})"), 1));
            assemble(em, st)?
        }
    };

    Ok(CompiledSelect {
        sql,
        arity: 1,
        required: false,
        default_value: None,
        missing_data_message: None,
        timeout: st.timeout,
    })
}

fn default_projection(em: &Emitter<'_>, st: &SelectState) -> Result<(String, usize)> {
    // A wrapped combination's column list is whatever its sides agreed on;
    // the wildcard keeps it intact no matter how the sides projected.
    if let (Some(alias), Some(arity)) = (&st.alias, st.wildcard_arity) {
        return Ok((format!("{alias}.*"), arity));
    }
    if let (Some(entity), Some(alias)) = (&st.entity, &st.alias) {
        return expansion(em, st, entity, alias);
    }
    Err(Error::type_access("the query has nothing to project"))
}

fn assemble(em: &Emitter<'_>, st: &SelectState) -> Result<String> {
    let (projection, _) = match &st.projection {
        Some(p) => p.clone(),
        None => default_projection(em, st)?,
    };

    let mut body = st.from_sql.clone();
    for join in &st.joins {
        body.push_str(join);
    }
    if !st.wheres.is_empty() {
        body.push_str(" WHERE ");
        body.push_str(&st.wheres.join(" AND "));
    }
    if !st.group_by.is_empty() {
        body.push_str(" GROUP BY ");
        body.push_str(&st.group_by.join(", "));
    }
    if !st.havings.is_empty() {
        body.push_str(" HAVING ");
        body.push_str(&st.havings.join(" AND "));
    }

    let order_by = if st.order.is_empty() {
        None
    } else {
        let items = st
            .order
            .iter()
            .map(|(frag, descending)| {
                if descending ^ st.reverse {
                    format!("{frag} DESC")
                } else {
                    frag.clone()
                }
            })
            .join(", ");
        Some(items)
    };

    let parts = SelectParts {
        distinct: st.distinct,
        projection,
        body,
        order_by,
    };

    let skip = if st.skip == 0 { None } else { Some(st.skip) };
    em.profile.page(&parts, st.take, skip)
}
