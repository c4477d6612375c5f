//! The core traversal: member, constant, binary, unary, conditional and
//! switch nodes down to SQL fragments.
//!
//! Dispatch is by node shape, and for calls by operator name plus arity.
//! Query-shape operators (`Where`, `Select`, joins, ...) live in the
//! sibling modules; everything here emits scalar or predicate fragments
//! into the shared token writer.
use crate::ast::{Binary, BinaryOp, Call, Conditional, Expr, Member, Switch, UnaryOp, Value};
use crate::compiler::registry::CallRegistry;
use crate::compiler::scope::ScopeStack;
use crate::compiler::writer::TokenWriter;
use crate::dialect::{DialectProfile, PatternPiece};
use crate::error::{Error, Result};
use crate::schema::{SchemaResolver, TableSchema};
use std::sync::Arc;

/// One captured grouping-key fragment.
#[derive(Debug, Clone)]
pub(crate) struct GroupKey {
    /// The key member name; `None` for a single unnamed key.
    pub name: Option<String>,
    /// The SQL that computes the key, substituted verbatim wherever the
    /// key is referenced afterwards.
    pub frag: String,
}

/// Grouping state of the statement currently being assembled.
#[derive(Debug, Clone)]
pub(crate) struct GroupContext {
    pub keys: Vec<GroupKey>,
    /// The lambda parameter name standing for the grouping in the operator
    /// currently being visited.
    pub param: Option<String>,
}

impl GroupContext {
    fn single_key(&self) -> Option<&GroupKey> {
        if self.keys.len() == 1 {
            self.keys.first()
        } else {
            None
        }
    }

    fn key_by_name(&self, name: &str) -> Option<&GroupKey> {
        self.keys.iter().find(|k| k.name.as_deref() == Some(name))
    }
}

/// Per-compilation traversal state: the writer, the alias scopes and the
/// read-only collaborators.
pub(crate) struct Emitter<'a> {
    pub w: TokenWriter,
    pub profile: &'a DialectProfile,
    pub schema: &'a dyn SchemaResolver,
    pub registry: &'a CallRegistry,
    pub scopes: ScopeStack,
    next_alias: usize,
    pub group: Option<GroupContext>,
}

enum LikeKind {
    Contains,
    StartsWith,
    EndsWith,
}

impl<'a> Emitter<'a> {
    pub fn new(profile: &'a DialectProfile, schema: &'a dyn SchemaResolver, registry: &'a CallRegistry) -> Self {
        Self {
            w: TokenWriter::new(),
            profile,
            schema,
            registry,
            scopes: ScopeStack::new(),
            next_alias: 0,
            group: None,
        }
    }

    /// Aliases are drawn from one per-compilation counter so no two scopes
    /// of the same compile ever produce the same name.
    pub fn fresh_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    /// Binds an entity in the current scope, reusing the first alias bound
    /// for it there.
    pub fn bind_entity(&mut self, entity: &str, name: Option<&str>) -> String {
        let existing = self.scopes.existing_in_current(entity).map(str::to_string);
        match existing {
            Some(alias) => {
                self.scopes.record(entity, name, &alias);
                alias
            }
            None => {
                let alias = self.fresh_alias();
                self.scopes.record(entity, name, &alias);
                alias
            }
        }
    }

    /// Binds an entity under a brand-new alias even when the current scope
    /// already has one — the join-inner case, where a self-join must not
    /// collapse onto the outer table.
    pub fn bind_entity_fresh(&mut self, entity: &str, name: Option<&str>) -> String {
        let alias = self.fresh_alias();
        self.scopes.record(entity, name, &alias);
        alias
    }

    pub fn table_schema(&self, entity: &str) -> Result<Arc<TableSchema>> {
        self.schema.resolve(entity)
    }

    /// Runs `f` against a scratch capture window and returns the fragment
    /// it produced. Parameters and the negation flag flow through.
    pub fn capture<F>(&mut self, f: F) -> Result<String>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let guard = self.w.begin_capture();
        let out = f(self);
        let frag = self.w.end_capture(guard);
        out.map(|_| frag)
    }

    /// Runs `f` with the negation flag flipped when `flip` is set,
    /// restoring it afterwards.
    pub fn with_negated_xor<F>(&mut self, flip: bool, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if !flip {
            return f(self);
        }
        let flipped = !self.w.negated();
        let prev = self.w.set_negated(flipped);
        let out = f(self);
        self.w.set_negated(prev);
        out
    }

    // ----- predicates ------------------------------------------------------

    /// Emits a boolean context. Boolean literals emit nothing here; that is
    /// the pruning path for compile-time-constant sub-predicates. A literal
    /// standing alone as a whole predicate is rejected one level up, where
    /// the clause is assembled.
    pub fn visit_predicate(&mut self, e: &Expr) -> Result<()> {
        match e {
            Expr::Binary(b) if b.op.is_connective() => self.visit_connective(b),
            Expr::Binary(b) if b.op.is_comparison() => self.visit_comparison(b.op, &b.left, &b.right),
            Expr::Binary(b) => Err(Error::type_access(format!(
                "operator {:?} does not produce a predicate",
                b.op
            ))),
            Expr::Unary(u) if u.op == UnaryOp::Not => self.with_negated_xor(true, |em| em.visit_predicate(&u.operand)),
            Expr::Unary(u) => Err(Error::type_access(format!(
                "operator {:?} does not produce a predicate",
                u.op
            ))),
            Expr::Constant(c) => match &c.value {
                // Pruned: identity operands of connectives vanish entirely.
                Value::Boolean(_) => Ok(()),
                other => Err(Error::type_access(format!(
                    "constant {other} cannot stand as a predicate"
                ))),
            },
            Expr::Member(m) if m.name == "HasValue" => {
                self.visit_value(&m.target, None)?;
                let text = if self.w.negated() { " IS NULL" } else { " IS NOT NULL" };
                self.w.write(text);
                Ok(())
            }
            Expr::Member(m) if m.ty.is_bool() => self.visit_bool_as_comparison(e),
            Expr::Member(m) => Err(Error::type_access(format!(
                "member '{}' is not boolean and cannot stand as a predicate",
                m.name
            ))),
            Expr::Call(c) => self.visit_predicate_call(c),
            Expr::Conditional(_) | Expr::Switch(_) => self.visit_bool_as_comparison(e),
            Expr::Parameter(p) => Err(Error::type_access(format!(
                "parameter '{}' cannot stand as a predicate",
                p.name
            ))),
            Expr::Lambda(_) | Expr::New(_) => Err(Error::syntax("a lambda or projection is not a predicate")),
        }
    }

    /// A boolean-valued fragment with no SQL inverse: compare against 1,
    /// with an explicit `NOT (...)` under inversion.
    fn visit_bool_as_comparison(&mut self, e: &Expr) -> Result<()> {
        let negated = self.w.negated();
        if negated {
            self.w.write("NOT (");
        }
        let prev = self.w.set_negated(false);
        let out = self.visit_value(e, None).map(|_| {
            self.w.write(" = 1");
        });
        self.w.set_negated(prev);
        out?;
        if negated {
            self.w.write(")");
        }
        Ok(())
    }

    /// The conditional-connective algorithm: the right operand is emitted
    /// first at the marked position; the left operand is spliced in before
    /// it; the parentheses and the connective token appear only when both
    /// sides produced output. An empty side degrades the node to the other
    /// side alone, with no stray tokens.
    fn visit_connective(&mut self, b: &Binary) -> Result<()> {
        let conn = if self.w.negated() { b.op.inverted() } else { b.op };

        let start = self.w.position();
        self.visit_predicate(&b.right)?;
        let right_len = self.w.position() - start;

        if right_len == 0 {
            return self.visit_predicate(&b.left);
        }

        let guard = self.w.begin_insert(start);
        let out = self.visit_predicate(&b.left);
        let left_len = self.w.position() - start;

        if out.is_err() || left_len == 0 {
            self.w.end_insert(guard);
            return out;
        }

        self.w.insert_at(start, "(");
        let conn_text = format!(" {} ", conn.sql());
        self.w.insert_at(start + 1 + left_len, &conn_text);
        self.w
            .insert_at(start + 1 + left_len + conn_text.len() + right_len, ")");
        self.w.end_insert(guard);

        Ok(())
    }

    fn visit_comparison(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<()> {
        // NULL comparisons become IS [NOT] NULL.
        if right.as_constant().map(Value::is_null).unwrap_or(false) {
            return self.visit_null_check(op, left);
        }
        if left.as_constant().map(Value::is_null).unwrap_or(false) {
            return self.visit_null_check(op, right);
        }

        // A comparison against a boolean literal reduces to the other side
        // as a predicate; boolean operands get the same empty-side pruning
        // as connectives. Numeric comparisons never prune.
        if left.ty().is_bool() && right.ty().is_bool() {
            if let Some(b) = right.as_bool_constant() {
                let flip = !b ^ (op == BinaryOp::NotEqual);
                return self.with_negated_xor(flip, |em| em.visit_predicate(left));
            }
            if let Some(b) = left.as_bool_constant() {
                let flip = !b ^ (op == BinaryOp::NotEqual);
                return self.with_negated_xor(flip, |em| em.visit_predicate(right));
            }
        }

        let eff = if self.w.negated() { op.inverted() } else { op };
        let left_hint = member_name_of(right);
        let right_hint = member_name_of(left);

        self.visit_value(left, left_hint)?;
        self.w.write(&format!(" {} ", eff.sql()));
        self.visit_value(right, right_hint)
    }

    fn visit_null_check(&mut self, op: BinaryOp, operand: &Expr) -> Result<()> {
        if !matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
            return Err(Error::type_access("NULL only participates in (in)equality"));
        }

        self.visit_value(operand, None)?;
        let is_not = (op == BinaryOp::NotEqual) ^ self.w.negated();
        self.w.write(if is_not { " IS NOT NULL" } else { " IS NULL" });
        Ok(())
    }

    fn visit_predicate_call(&mut self, c: &Call) -> Result<()> {
        let receiver = c.receiver.as_deref();

        match (c.name.as_str(), receiver, c.args.len()) {
            ("Equals", Some(recv), 1) => self.visit_comparison(BinaryOp::Equal, recv, &c.args[0]),
            ("StartsWith", Some(recv), 1) => self.visit_like(recv, &c.args[0], LikeKind::StartsWith),
            ("EndsWith", Some(recv), 1) => self.visit_like(recv, &c.args[0], LikeKind::EndsWith),
            ("Contains", Some(recv), 1) if recv.ty().is_text() => {
                self.visit_like(recv, &c.args[0], LikeKind::Contains)
            }
            ("Contains", Some(recv), 1) => crate::compiler::exists::visit_membership(self, recv, &c.args[0]),
            ("Any" | "Exists", Some(recv), 0) => crate::compiler::exists::visit_any(self, recv, None),
            ("Any" | "Exists", Some(recv), 1) => {
                let pred = c.args[0]
                    .as_lambda()
                    .ok_or_else(|| Error::syntax("the existence predicate must be a lambda"))?;
                crate::compiler::exists::visit_any(self, recv, Some(pred))
            }
            ("All", Some(recv), 1) => {
                let pred = c.args[0]
                    .as_lambda()
                    .ok_or_else(|| Error::syntax("the universal predicate must be a lambda"))?;
                crate::compiler::exists::visit_all(self, recv, pred)
            }
            _ if c.ty.is_bool() && self.registry.get(&c.name, c.args.len()).is_some() => {
                self.visit_registered_call(c)
            }
            (name, _, argc) => Err(Error::unsupported(format!("predicate operator {name}/{argc}"))),
        }
    }

    fn visit_like(&mut self, recv: &Expr, needle: &Expr, kind: LikeKind) -> Result<()> {
        self.visit_value(recv, None)?;
        let keyword = if self.w.negated() { " NOT LIKE " } else { " LIKE " };
        self.w.write(keyword);

        match needle.as_constant() {
            Some(Value::Text(text)) => {
                let (escaped, needs_clause) = self.profile.escape_like(text);
                let pattern = match kind {
                    LikeKind::Contains => format!("%{escaped}%"),
                    LikeKind::StartsWith => format!("{escaped}%"),
                    LikeKind::EndsWith => format!("%{escaped}"),
                };

                let hint = member_name_of(recv).unwrap_or("pattern");
                let name = self.w.declare_parameter(hint, Value::Text(pattern));
                let text = self.profile.format_param(&name);
                self.w.write(&text);
                if needs_clause {
                    self.w.write(" ESCAPE '\\'");
                }
                Ok(())
            }
            Some(other) => Err(Error::type_access(format!(
                "a LIKE needle must be text, got {other}"
            ))),
            None => {
                let frag = self.capture(|em| em.visit_value(needle, None))?;
                let wildcard = PatternPiece::Lit("%".to_string());
                let pieces = match kind {
                    LikeKind::Contains => vec![wildcard.clone(), PatternPiece::Frag(frag), wildcard],
                    LikeKind::StartsWith => vec![PatternPiece::Frag(frag), wildcard],
                    LikeKind::EndsWith => vec![wildcard, PatternPiece::Frag(frag)],
                };
                let pattern = self.profile.like_pattern(&pieces);
                self.w.write(&pattern);
                Ok(())
            }
        }
    }

    // ----- values ----------------------------------------------------------

    /// Emits a scalar fragment. `hint` is the preferred parameter name when
    /// the node binds one, usually derived from the member on the other
    /// side of a comparison.
    pub fn visit_value(&mut self, e: &Expr, hint: Option<&str>) -> Result<()> {
        match e {
            Expr::Constant(c) => match &c.value {
                Value::Null => {
                    self.w.write("NULL");
                    Ok(())
                }
                Value::Array(_) | Value::Record(_) => Err(Error::type_access(
                    "collections and captured objects only participate in membership tests",
                )),
                value => {
                    let name = self.w.declare_parameter(hint.unwrap_or("p"), value.clone());
                    let text = self.profile.format_param(&name);
                    self.w.write(&text);
                    Ok(())
                }
            },
            Expr::Member(m) => self.visit_member_value(m),
            Expr::Parameter(p) => Err(Error::type_access(format!(
                "entity reference '{}' cannot be used as a scalar value",
                p.name
            ))),
            Expr::Binary(b) => self.visit_binary_value(b),
            Expr::Unary(u) => match u.op {
                UnaryOp::Negate => {
                    self.w.write("-");
                    self.visit_value(&u.operand, hint)
                }
                UnaryOp::Not => Err(Error::type_access("logical negation does not produce a scalar")),
            },
            Expr::Conditional(c) => self.visit_case(c),
            Expr::Switch(s) => self.visit_switch(s),
            Expr::Call(c) => self.visit_scalar_call(c),
            Expr::Lambda(_) | Expr::New(_) => {
                Err(Error::syntax("a lambda or projection cannot appear in scalar position"))
            }
        }
    }

    fn visit_binary_value(&mut self, b: &Binary) -> Result<()> {
        if b.op == BinaryOp::Concat {
            let left = self.capture(|em| em.visit_value(&b.left, None))?;
            let right = self.capture(|em| em.visit_value(&b.right, None))?;
            let text = self.profile.concat(&[left, right]);
            self.w.write(&text);
            return Ok(());
        }

        if b.op == BinaryOp::Modulo {
            if let Some(modulo) = self.profile.modulo_fn() {
                self.w.write(modulo);
                self.w.write("(");
                self.visit_value(&b.left, None)?;
                self.w.write(", ");
                self.visit_value(&b.right, None)?;
                self.w.write(")");
                return Ok(());
            }
        }

        if b.op.is_arithmetic() || b.op.is_bitwise() {
            self.w.write("(");
            self.visit_value(&b.left, None)?;
            self.w.write(&format!(" {} ", b.op.sql()));
            self.visit_value(&b.right, None)?;
            self.w.write(")");
            return Ok(());
        }

        Err(Error::type_access(format!(
            "operator {:?} does not produce a scalar value",
            b.op
        )))
    }

    fn visit_member_value(&mut self, m: &Member) -> Result<()> {
        if let Some(frag) = self.group_key_fragment(m)? {
            self.w.write(&frag);
            return Ok(());
        }

        // A chain bottoming out in a captured host object flows into the
        // statement as a parameter, never as inline text.
        if let Some(value) = resolve_captured(m) {
            let name = self.w.declare_parameter(&m.name, value);
            let text = self.profile.format_param(&name);
            self.w.write(&text);
            return Ok(());
        }

        match m.name.as_str() {
            "Length" if m.target.ty().is_text() => {
                self.w.write(self.profile.length_fn());
                self.w.write("(");
                self.visit_value(&m.target, None)?;
                self.w.write(")");
                Ok(())
            }
            "Value" if m.target.ty().is_nullable() => self.visit_value(&m.target, None),
            "Key" => Err(Error::syntax("'Key' is only available after a grouping")),
            _ => self.visit_column(m),
        }
    }

    fn visit_column(&mut self, m: &Member) -> Result<()> {
        if m.ty.is_entity() {
            return Err(Error::type_access(format!(
                "entity-shaped member '{}' cannot be used as a scalar; project it instead",
                m.name
            )));
        }

        let alias = self.alias_for(&m.target)?;
        let entity = m
            .target
            .ty()
            .entity_name()
            .ok_or_else(|| Error::type_access(format!("member '{}' has no entity-shaped source", m.name)))?
            .to_string();

        let schema = self.table_schema(&entity)?;
        let column = schema
            .column(&m.name)
            .ok_or_else(|| Error::type_access(format!("entity '{entity}' has no field '{}'", m.name)))?;

        let quoted = self.profile.quote(column);
        self.w.write(&format!("{alias}.{quoted}"));
        Ok(())
    }

    /// The SQL alias of an entity-shaped node: a lambda parameter, or an
    /// entity member of a join/projection row.
    pub fn alias_for(&mut self, target: &Expr) -> Result<String> {
        let (entity, name) = match target {
            Expr::Parameter(p) => {
                let entity = p
                    .ty
                    .entity_name()
                    .ok_or_else(|| Error::type_access(format!("parameter '{}' is not entity-shaped", p.name)))?;
                (entity, p.name.as_str())
            }
            Expr::Member(m) if m.ty.is_entity() => {
                let entity = m.ty.entity_name().expect("entity members carry an entity type");
                (entity, m.name.as_str())
            }
            other => {
                return Err(Error::type_access(format!(
                    "field access requires an entity-shaped source, got {:?}",
                    std::mem::discriminant(other)
                )))
            }
        };

        self.scopes
            .resolve(entity, Some(name))
            .map(str::to_string)
            .ok_or_else(|| Error::syntax(format!("entity '{entity}' is not among the sources of this query")))
    }

    fn group_key_fragment(&self, m: &Member) -> Result<Option<String>> {
        let Some(group) = &self.group else { return Ok(None) };
        let Some(gparam) = &group.param else { return Ok(None) };

        // g.Key
        if let Expr::Parameter(p) = &*m.target {
            if &p.name == gparam && m.name == "Key" {
                return match group.single_key() {
                    Some(key) => Ok(Some(key.frag.clone())),
                    None => Err(Error::type_access(
                        "a composite grouping key cannot be used as a scalar; access its members",
                    )),
                };
            }
            return Ok(None);
        }

        // g.Key.Member
        if let Expr::Member(inner) = &*m.target {
            if let Expr::Parameter(p) = &*inner.target {
                if &p.name == gparam && inner.name == "Key" {
                    return match group.key_by_name(&m.name) {
                        Some(key) => Ok(Some(key.frag.clone())),
                        None => Err(Error::type_access(format!(
                            "the grouping key has no member '{}'",
                            m.name
                        ))),
                    };
                }
            }
        }

        Ok(None)
    }

    fn visit_case(&mut self, c: &Conditional) -> Result<()> {
        // A compile-time-known test short-circuits to the winning branch;
        // no CASE is emitted at all.
        if let Some(b) = c.test.as_bool_constant() {
            let winner = if b { &c.if_true } else { &c.if_false };
            return self.visit_value(winner, None);
        }

        self.w.write("CASE WHEN ");
        let prev = self.w.set_negated(false);
        let test = self.visit_predicate(&c.test);
        self.w.set_negated(prev);
        test?;

        self.w.write(" THEN ");
        self.visit_value(&c.if_true, None)?;
        self.w.write(" ELSE ");
        self.visit_value(&c.if_false, None)?;
        self.w.write(" END");
        Ok(())
    }

    fn visit_switch(&mut self, s: &Switch) -> Result<()> {
        self.w.write("CASE ");
        self.visit_value(&s.subject, None)?;

        for case in &s.cases {
            for matched in &case.matches {
                self.w.write(" WHEN ");
                self.visit_value(matched, None)?;
                self.w.write(" THEN ");
                self.visit_value(&case.body, None)?;
            }
        }

        if let Some(default) = &s.default {
            self.w.write(" ELSE ");
            self.visit_value(default, None)?;
        }

        self.w.write(" END");
        Ok(())
    }

    // ----- scalar calls ----------------------------------------------------

    fn visit_scalar_call(&mut self, c: &Call) -> Result<()> {
        if self.is_grouped_aggregate(c) {
            return self.visit_grouped_aggregate(c);
        }

        let receiver = c.receiver.as_deref();

        match (c.name.as_str(), receiver, c.args.len()) {
            ("ToUpper", Some(recv), 0) => self.emit_wrapped("UPPER", recv),
            ("ToLower", Some(recv), 0) => self.emit_wrapped("LOWER", recv),
            ("Trim", Some(recv), 0) => match self.profile.trim_fn() {
                Some(trim) => self.emit_wrapped(trim, recv),
                None => {
                    self.w.write("LTRIM(RTRIM(");
                    self.visit_value(recv, None)?;
                    self.w.write("))");
                    Ok(())
                }
            },
            ("TrimStart", Some(recv), 0) => self.emit_wrapped("LTRIM", recv),
            ("TrimEnd", Some(recv), 0) => self.emit_wrapped("RTRIM", recv),
            ("Substring", Some(recv), 1 | 2) => self.visit_substring(recv, c),
            ("IndexOf", Some(recv), 1) => self.visit_index_of(recv, &c.args[0]),
            ("Replace", Some(recv), 2) => {
                self.w.write("REPLACE(");
                self.visit_value(recv, None)?;
                self.w.write(", ");
                self.visit_value(&c.args[0], None)?;
                self.w.write(", ");
                self.visit_value(&c.args[1], None)?;
                self.w.write(")");
                Ok(())
            }
            ("Concat", None, argc) if argc >= 2 => {
                let mut frags = Vec::with_capacity(argc);
                for arg in &c.args {
                    frags.push(self.capture(|em| em.visit_value(arg, None))?);
                }
                let text = self.profile.concat(&frags);
                self.w.write(&text);
                Ok(())
            }
            _ if self.registry.get(&c.name, c.args.len()).is_some() => self.visit_registered_call(c),
            (name, _, argc) => Err(Error::unsupported(format!("scalar operator {name}/{argc}"))),
        }
    }

    fn emit_wrapped(&mut self, func: &str, operand: &Expr) -> Result<()> {
        self.w.write(func);
        self.w.write("(");
        self.visit_value(operand, None)?;
        self.w.write(")");
        Ok(())
    }

    /// Zero-based host substring onto the one-based SQL form. Constant
    /// start offsets are folded; computed ones shift at runtime.
    fn visit_substring(&mut self, recv: &Expr, c: &Call) -> Result<()> {
        self.w.write(self.profile.substring_fn());
        self.w.write("(");
        self.visit_value(recv, None)?;
        self.w.write(", ");

        let start = &c.args[0];
        match start.as_constant().and_then(Value::as_integer) {
            Some(n) => self.w.write(&(n + 1).to_string()),
            None => {
                self.w.write("(");
                self.visit_value(start, None)?;
                self.w.write(" + 1)");
            }
        }

        if let Some(len) = c.args.get(1) {
            self.w.write(", ");
            match len.as_constant().and_then(Value::as_integer) {
                Some(n) => self.w.write(&n.to_string()),
                None => self.visit_value(len, None)?,
            }
        }

        self.w.write(")");
        Ok(())
    }

    /// One-based SQL position back to the zero-based host convention, with
    /// the argument order the engine's function expects.
    fn visit_index_of(&mut self, recv: &Expr, needle: &Expr) -> Result<()> {
        self.w.write("(");
        self.w.write(self.profile.indexof_fn());
        self.w.write("(");

        if self.profile.indexof_needle_first() {
            self.visit_value(needle, None)?;
            self.w.write(", ");
            self.visit_value(recv, None)?;
        } else {
            self.visit_value(recv, None)?;
            self.w.write(", ");
            self.visit_value(needle, None)?;
        }

        self.w.write(") - 1)");
        Ok(())
    }

    fn visit_registered_call(&mut self, c: &Call) -> Result<()> {
        let handler = self
            .registry
            .get(&c.name, c.args.len())
            .expect("checked by the caller");

        let mut frags = Vec::with_capacity(c.args.len() + 1);
        if let Some(recv) = c.receiver.as_deref() {
            frags.push(self.capture(|em| em.visit_value(recv, None))?);
        }
        for arg in &c.args {
            frags.push(self.capture(|em| em.visit_value(arg, None))?);
        }

        handler(&mut self.w, self.profile, &frags)
    }

    // ----- grouped aggregates ----------------------------------------------

    fn is_grouped_aggregate(&self, c: &Call) -> bool {
        let Some(group) = &self.group else { return false };
        let Some(gparam) = &group.param else { return false };

        let receiver_is_group = matches!(
            c.receiver.as_deref(),
            Some(Expr::Parameter(p)) if &p.name == gparam
        );

        receiver_is_group
            && matches!(
                c.name.as_str(),
                "Count" | "LongCount" | "Sum" | "Min" | "Max" | "Average"
            )
    }

    fn visit_grouped_aggregate(&mut self, c: &Call) -> Result<()> {
        match (c.name.as_str(), c.args.len()) {
            ("Count" | "LongCount", 0) => {
                self.w.write("COUNT(*)");
                Ok(())
            }
            // A predicate inside a grouped count becomes a conditional
            // aggregate instead of a second GROUP BY.
            ("Count" | "LongCount", 1) => {
                let lambda = c.args[0]
                    .as_lambda()
                    .ok_or_else(|| Error::syntax("the aggregate predicate must be a lambda"))?;
                self.bind_aggregate_param(lambda)?;

                self.w.write("COUNT(CASE WHEN ");
                let prev = self.w.set_negated(false);
                let out = self.visit_predicate(&lambda.body);
                self.w.set_negated(prev);
                out?;
                self.w.write(" THEN 1 END)");
                Ok(())
            }
            ("Sum" | "Min" | "Max" | "Average", 1) => {
                let lambda = c.args[0]
                    .as_lambda()
                    .ok_or_else(|| Error::syntax("the aggregate selector must be a lambda"))?;
                self.bind_aggregate_param(lambda)?;

                let func = match c.name.as_str() {
                    "Sum" => "SUM",
                    "Min" => "MIN",
                    "Max" => "MAX",
                    _ => "AVG",
                };
                self.w.write(func);
                self.w.write("(");
                self.visit_value(&lambda.body, None)?;
                self.w.write(")");
                Ok(())
            }
            (name, argc) => Err(Error::unsupported(format!("grouped aggregate {name}/{argc}"))),
        }
    }

    /// The selector of a grouped aggregate ranges over the source rows; its
    /// parameter re-binds to the existing source alias.
    fn bind_aggregate_param(&mut self, lambda: &crate::ast::Lambda) -> Result<()> {
        let (name, ty) = lambda
            .params
            .first()
            .ok_or_else(|| Error::syntax("an aggregate lambda needs a parameter"))?;

        if lambda.params.len() > 1 {
            return Err(Error::syntax("multi-parameter lambdas are not translatable"));
        }

        if let Some(entity) = ty.entity_name() {
            let entity = entity.to_string();
            self.bind_entity(&entity, Some(name.as_str()));
        }
        Ok(())
    }
}

pub(crate) fn member_name_of(e: &Expr) -> Option<&str> {
    match e {
        Expr::Member(m) => Some(&m.name),
        _ => None,
    }
}

/// Resolves a member chain that bottoms out in a captured constant.
fn resolve_captured(m: &Member) -> Option<Value> {
    fn resolve(e: &Expr) -> Option<Value> {
        match e {
            Expr::Constant(c) => Some(c.value.clone()),
            Expr::Member(m) => resolve(&m.target)?.record_field(&m.name).cloned(),
            _ => None,
        }
    }

    resolve(&m.target)?.record_field(&m.name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;
    use crate::ast::TypeRef;
    use crate::compiler::writer::Params;
    use crate::schema::{SchemaRegistry, TableSchema};

    fn schema() -> SchemaRegistry {
        SchemaRegistry::new().register(
            TableSchema::build("Order", "orders")
                .generated("Id", "id")
                .field("Status", "status")
                .field("Total", "total")
                .field("Name", "name")
                .field("Active", "active")
                .field("ShipDate", "ship_date")
                .primary_key(&["Id"])
                .finish(),
        )
    }

    fn order() -> TypeRef {
        TypeRef::entity("Order")
    }

    fn o() -> Expr {
        param("o", order())
    }

    fn emit_pred(pred: Expr) -> (String, Params) {
        let profile = crate::dialect::DialectProfile::sql_server();
        let schema = schema();
        let registry = CallRegistry::new();
        let mut em = Emitter::new(&profile, &schema, &registry);
        em.scopes.push();
        em.bind_entity("Order", Some("o"));
        em.visit_predicate(&pred).unwrap();
        em.w.finish()
    }

    #[test]
    fn comparison_binds_member_named_parameter() {
        let (sql, params) = emit_pred(o().get("Status", TypeRef::Int32).eq(val(1)));

        assert_eq!("t0.[status] = @Status", sql);
        assert_eq!(Some(&Value::Int32(1)), params.get("Status"));
    }

    #[test]
    fn both_sides_produce_wrapped_connective() {
        let pred = o()
            .get("Status", TypeRef::Int32)
            .eq(val(1))
            .and(o().get("Total", TypeRef::Decimal).gt(val(100)));
        let (sql, params) = emit_pred(pred);

        assert_eq!("(t0.[status] = @Status AND t0.[total] > @Total)", sql);
        assert_eq!(2, params.len());
    }

    #[test]
    fn constant_true_left_of_and_is_pruned() {
        let pred = val(true).and(o().get("Status", TypeRef::Int32).eq(val(1)));
        let (sql, _) = emit_pred(pred);

        assert_eq!("t0.[status] = @Status", sql);
        assert!(!sql.contains('('));
    }

    #[test]
    fn constant_false_right_of_or_is_pruned() {
        let pred = o().get("Status", TypeRef::Int32).eq(val(1)).or(val(false));
        let (sql, _) = emit_pred(pred);

        assert_eq!("t0.[status] = @Status", sql);
    }

    #[test]
    fn fully_constant_connective_emits_nothing() {
        let (sql, params) = emit_pred(val(true).and(val(true)));

        assert_eq!("", sql);
        assert!(params.is_empty());
    }

    #[test]
    fn not_inverts_comparisons_instead_of_wrapping() {
        let pred = o().get("Status", TypeRef::Int32).eq(val(1)).not();
        let (sql, _) = emit_pred(pred);

        assert_eq!("t0.[status] <> @Status", sql);
    }

    #[test]
    fn not_over_connective_applies_de_morgan() {
        let pred = o()
            .get("Status", TypeRef::Int32)
            .eq(val(1))
            .and(o().get("Total", TypeRef::Decimal).gt(val(100)))
            .not();
        let (sql, _) = emit_pred(pred);

        assert_eq!("(t0.[status] <> @Status OR t0.[total] <= @Total)", sql);
    }

    #[test]
    fn double_negation_cancels() {
        let pred = o().get("Status", TypeRef::Int32).lt(val(5)).not().not();
        let (sql, _) = emit_pred(pred);

        assert_eq!("t0.[status] < @Status", sql);
    }

    #[test]
    fn raw_boolean_member_gets_explicit_not() {
        let pred = o().get("Active", TypeRef::Bool).not();
        let (sql, _) = emit_pred(pred);

        assert_eq!("NOT (t0.[active] = 1)", sql);
    }

    #[test]
    fn comparison_with_true_reduces_to_the_other_side() {
        let pred = o().get("Active", TypeRef::Bool).eq(val(true));
        let (sql, _) = emit_pred(pred);

        assert_eq!("t0.[active] = 1", sql);
    }

    #[test]
    fn comparison_with_false_inverts_the_other_side() {
        let pred = o().get("Active", TypeRef::Bool).ne(val(false));
        let (sql, _) = emit_pred(pred);

        assert_eq!("t0.[active] = 1", sql);
    }

    #[test]
    fn null_comparison_becomes_is_null() {
        let ship = TypeRef::nullable(TypeRef::DateTime);
        let (sql, params) = emit_pred(o().get("ShipDate", ship.clone()).eq(null()));
        assert_eq!("t0.[ship_date] IS NULL", sql);
        assert!(params.is_empty());

        let (sql, _) = emit_pred(o().get("ShipDate", ship).ne(null()));
        assert_eq!("t0.[ship_date] IS NOT NULL", sql);
    }

    #[test]
    fn has_value_translates_to_is_not_null() {
        let ship = TypeRef::nullable(TypeRef::DateTime);
        let (sql, _) = emit_pred(o().get("ShipDate", ship.clone()).has_value());
        assert_eq!("t0.[ship_date] IS NOT NULL", sql);

        let (sql, _) = emit_pred(o().get("ShipDate", ship).has_value().not());
        assert_eq!("t0.[ship_date] IS NULL", sql);
    }

    #[test]
    fn captured_members_bind_parameters() {
        let filter = captured(vec![("MinTotal", Value::Int32(50))]);
        let pred = o()
            .get("Total", TypeRef::Decimal)
            .gt(filter.get("MinTotal", TypeRef::Int32));
        let (sql, params) = emit_pred(pred);

        assert_eq!("t0.[total] > @MinTotal", sql);
        assert_eq!(Some(&Value::Int32(50)), params.get("MinTotal"));
    }

    #[test]
    fn equal_parameters_are_deduplicated() {
        let pred = o()
            .get("Status", TypeRef::Int32)
            .eq(val(1))
            .and(o().get("Status", TypeRef::Int32).ne(val(1)));
        let (sql, params) = emit_pred(pred);

        assert_eq!("(t0.[status] = @Status AND t0.[status] <> @Status)", sql);
        assert_eq!(1, params.len());
    }

    #[test]
    fn conflicting_parameters_get_suffixes() {
        let pred = o()
            .get("Status", TypeRef::Int32)
            .eq(val(1))
            .or(o().get("Status", TypeRef::Int32).eq(val(2)));
        let (sql, params) = emit_pred(pred);

        // The right operand is emitted first, so its value claims the
        // unsuffixed name.
        assert_eq!("(t0.[status] = @Status1 OR t0.[status] = @Status)", sql);
        assert_eq!(Some(&Value::Int32(2)), params.get("Status"));
        assert_eq!(Some(&Value::Int32(1)), params.get("Status1"));
    }

    #[test]
    fn constant_test_conditional_short_circuits() {
        let profile = crate::dialect::DialectProfile::sql_server();
        let schema = schema();
        let registry = CallRegistry::new();
        let mut em = Emitter::new(&profile, &schema, &registry);
        em.scopes.push();
        em.bind_entity("Order", Some("o"));

        let cond = when(val(true), o().get("Total", TypeRef::Decimal), val(0));
        em.visit_value(&cond, None).unwrap();
        let (sql, _) = em.w.finish();

        assert_eq!("t0.[total]", sql);
        assert!(!sql.contains("CASE"));
    }

    #[test]
    fn conditional_emits_case_when() {
        let profile = crate::dialect::DialectProfile::sql_server();
        let schema = schema();
        let registry = CallRegistry::new();
        let mut em = Emitter::new(&profile, &schema, &registry);
        em.scopes.push();
        em.bind_entity("Order", Some("o"));

        let cond = when(
            o().get("Status", TypeRef::Int32).eq(val(1)),
            val("open"),
            val("closed"),
        );
        em.visit_value(&cond, None).unwrap();
        let (sql, _) = em.w.finish();

        assert_eq!("CASE WHEN t0.[status] = @Status THEN @p ELSE @p1 END", sql);
    }

    #[test]
    fn switch_emits_simple_case_with_repeated_arms() {
        let profile = crate::dialect::DialectProfile::sql_server();
        let schema = schema();
        let registry = CallRegistry::new();
        let mut em = Emitter::new(&profile, &schema, &registry);
        em.scopes.push();
        em.bind_entity("Order", Some("o"));

        let sw = switch(
            o().get("Status", TypeRef::Int32),
            vec![
                (vec![val(1), val(2)], val("open")),
                (vec![val(3)], val("closed")),
            ],
            Some(val("unknown")),
        );
        em.visit_value(&sw, None).unwrap();
        let (sql, _) = em.w.finish();

        assert_eq!(
            "CASE t0.[status] WHEN @p THEN @p1 WHEN @p2 THEN @p1 WHEN @p3 THEN @p4 ELSE @p5 END",
            sql
        );
    }

    #[test]
    fn string_functions_follow_the_profile() {
        let name = o().get("Name", TypeRef::Text);
        let profile = crate::dialect::DialectProfile::sql_server();
        let schema = schema();
        let registry = CallRegistry::new();
        let mut em = Emitter::new(&profile, &schema, &registry);
        em.scopes.push();
        em.bind_entity("Order", Some("o"));

        em.visit_value(&name.clone().length(), None).unwrap();
        em.w.write(" | ");
        em.visit_value(&name.clone().substring(val(2), Some(val(3))), None).unwrap();
        em.w.write(" | ");
        em.visit_value(&name.index_of(val("x")), None).unwrap();
        let (sql, _) = em.w.finish();

        assert_eq!(
            "LEN(t0.[name]) | SUBSTRING(t0.[name], 3, 3) | (CHARINDEX(@p, t0.[name]) - 1)",
            sql
        );
    }

    #[test]
    fn like_with_constant_needle_binds_a_pattern_parameter() {
        let pred = o().get("Name", TypeRef::Text).contains(val("mus"));
        let (sql, params) = emit_pred(pred);

        assert_eq!("t0.[name] LIKE @Name", sql);
        assert_eq!(Some(&Value::Text("%mus%".to_string())), params.get("Name"));
    }

    #[test]
    fn like_escapes_wildcards_in_constant_needles() {
        let pred = o().get("Name", TypeRef::Text).starts_with(val("100%"));
        let (_, params) = emit_pred(pred);

        assert_eq!(Some(&Value::Text("100[%]%".to_string())), params.get("Name"));
    }

    #[test]
    fn negated_like_emits_not_like() {
        let pred = o().get("Name", TypeRef::Text).ends_with(val("sti")).not();
        let (sql, params) = emit_pred(pred);

        assert_eq!("t0.[name] NOT LIKE @Name", sql);
        assert_eq!(Some(&Value::Text("%sti".to_string())), params.get("Name"));
    }

    #[test]
    fn like_with_computed_needle_concatenates_wildcards() {
        let pred = o()
            .get("Name", TypeRef::Text)
            .contains(o().get("Status", TypeRef::Int32).invoke("ToUpper", vec![], TypeRef::Text));
        let (sql, _) = emit_pred(pred);

        assert_eq!("t0.[name] LIKE '%' + UPPER(t0.[status]) + '%'", sql);
    }

    #[test]
    fn registered_handlers_take_over_unknown_calls() {
        fn emit_year(w: &mut TokenWriter, _: &DialectProfile, frags: &[String]) -> Result<()> {
            w.write(&format!("YEAR({})", frags[0]));
            Ok(())
        }

        let profile = crate::dialect::DialectProfile::sql_server();
        let schema = schema();
        let mut registry = CallRegistry::new();
        registry.register("Year", 0, emit_year);

        let mut em = Emitter::new(&profile, &schema, &registry);
        em.scopes.push();
        em.bind_entity("Order", Some("o"));

        let call = o()
            .get("ShipDate", TypeRef::nullable(TypeRef::DateTime))
            .invoke("Year", vec![], TypeRef::Int32);
        em.visit_value(&call, None).unwrap();
        let (sql, _) = em.w.finish();

        assert_eq!("YEAR(t0.[ship_date])", sql);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let profile = crate::dialect::DialectProfile::sql_server();
        let schema = schema();
        let registry = CallRegistry::new();
        let mut em = Emitter::new(&profile, &schema, &registry);
        em.scopes.push();
        em.bind_entity("Order", Some("o"));

        let call = o().get("Name", TypeRef::Text).invoke("Reverse", vec![], TypeRef::Text);
        let err = em.visit_value(&call, None).unwrap_err();

        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::UnsupportedOperator(_)
        ));
    }

    #[test]
    fn modulo_uses_the_function_form_when_the_engine_has_one() {
        let profile = crate::dialect::DialectProfile::oracle();
        let schema = schema();
        let registry = CallRegistry::new();
        let mut em = Emitter::new(&profile, &schema, &registry);
        em.scopes.push();
        em.bind_entity("Order", Some("o"));

        let expr = o().get("Status", TypeRef::Int32).rem(val(2));
        em.visit_value(&expr, None).unwrap();
        let (sql, _) = em.w.finish();

        assert_eq!("MOD(t0.\"status\", :p)", sql);
    }

    #[test]
    fn concat_follows_the_engine_style() {
        let expr = o()
            .get("Name", TypeRef::Text)
            .concat(o().get("Status", TypeRef::Int32));

        let schema = schema();
        let registry = CallRegistry::new();

        let mysql = crate::dialect::DialectProfile::mysql();
        let mut em = Emitter::new(&mysql, &schema, &registry);
        em.scopes.push();
        em.bind_entity("Order", Some("o"));
        em.visit_value(&expr, None).unwrap();
        let (sql, _) = em.w.finish();
        assert_eq!("CONCAT(t0.`name`, t0.`status`)", sql);

        let mssql = crate::dialect::DialectProfile::sql_server();
        let mut em = Emitter::new(&mssql, &schema, &registry);
        em.scopes.push();
        em.bind_entity("Order", Some("o"));
        em.visit_value(&expr, None).unwrap();
        let (sql, _) = em.w.finish();
        assert_eq!("(t0.[name] + t0.[status])", sql);
    }
}
