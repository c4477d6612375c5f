//! A fluent construction API for expression trees.
//!
//! The compiler consumes [`Expr`] values directly; nothing here is required.
//! The builder only makes assembling trees bearable for embedders and tests:
//!
//! ```rust
//! use treeline::ast::builder::*;
//! use treeline::ast::TypeRef;
//!
//! let order = TypeRef::entity("Order");
//! let query = from("Order")
//!     .filter(lambda("o", order.clone(), param("o", order.clone()).get("Status", TypeRef::Int32).eq(val(1))))
//!     .take(10);
//!
//! assert!(matches!(query, treeline::ast::Expr::Call(_)));
//! ```
use crate::ast::{
    Binary, BinaryOp, Call, Constant, Expr, Lambda, Member, NewShape, Param, Switch, SwitchCase, TypeRef, Unary,
    UnaryOp, Value,
};

/// The root of every chain: a typed entity source.
pub fn from(entity: impl Into<String>) -> Expr {
    Expr::Call(Call {
        name: "From".to_string(),
        receiver: None,
        args: Vec::new(),
        ty: TypeRef::sequence(TypeRef::entity(entity)),
    })
}

/// A literal constant. The type tag is derived from the value.
pub fn val(value: impl Into<Value>) -> Expr {
    let value = value.into();
    let ty = value.type_ref();
    Expr::Constant(Constant { value, ty })
}

/// The `NULL` literal.
pub fn null() -> Expr {
    Expr::Constant(Constant {
        value: Value::Null,
        ty: TypeRef::Unit,
    })
}

/// A captured host object; member accesses over it bind parameters.
pub fn captured(fields: Vec<(&str, Value)>) -> Expr {
    let value = Value::Record(fields.into_iter().map(|(n, v)| (n.to_string(), v)).collect());
    Expr::Constant(Constant {
        value,
        ty: TypeRef::Row,
    })
}

/// A lambda parameter reference.
pub fn param(name: impl Into<String>, ty: TypeRef) -> Expr {
    Expr::Parameter(Param { name: name.into(), ty })
}

/// A single-parameter lambda.
pub fn lambda(name: impl Into<String>, ty: TypeRef, body: Expr) -> Expr {
    Expr::Lambda(Lambda {
        params: vec![(name.into(), ty)],
        body: Box::new(body),
    })
}

/// A two-parameter lambda; only legal as a join result selector.
pub fn lambda2(first: (&str, TypeRef), second: (&str, TypeRef), body: Expr) -> Expr {
    Expr::Lambda(Lambda {
        params: vec![(first.0.to_string(), first.1), (second.0.to_string(), second.1)],
        body: Box::new(body),
    })
}

/// An anonymous projection shape.
pub fn new_shape(members: Vec<(&str, Expr)>) -> Expr {
    Expr::New(NewShape {
        members: members.into_iter().map(|(n, e)| (n.to_string(), e)).collect(),
        ty: TypeRef::Row,
    })
}

/// `test ? if_true : if_false`.
pub fn when(test: Expr, if_true: Expr, if_false: Expr) -> Expr {
    let ty = if_true.ty().clone();
    Expr::Conditional(crate::ast::Conditional {
        test: Box::new(test),
        if_true: Box::new(if_true),
        if_false: Box::new(if_false),
        ty,
    })
}

/// A multi-way branch over one subject.
pub fn switch(subject: Expr, cases: Vec<(Vec<Expr>, Expr)>, default: Option<Expr>) -> Expr {
    let ty = cases
        .first()
        .map(|(_, body)| body.ty().clone())
        .unwrap_or(TypeRef::Unit);

    Expr::Switch(Switch {
        subject: Box::new(subject),
        cases: cases
            .into_iter()
            .map(|(matches, body)| SwitchCase { matches, body })
            .collect(),
        default: default.map(Box::new),
        ty,
    })
}

/// A static (receiver-less) call, e.g. string concatenation over many parts.
pub fn static_call(name: impl Into<String>, args: Vec<Expr>, ty: TypeRef) -> Expr {
    Expr::Call(Call {
        name: name.into(),
        receiver: None,
        args,
        ty,
    })
}

fn chain(receiver: Expr, name: &str, args: Vec<Expr>, ty: TypeRef) -> Expr {
    Expr::Call(Call {
        name: name.to_string(),
        receiver: Some(Box::new(receiver)),
        args,
        ty,
    })
}

fn lambda_body_ty(lambda: &Expr) -> TypeRef {
    lambda
        .as_lambda()
        .map(|l| l.body.ty().clone())
        .unwrap_or(TypeRef::Unit)
}

impl Expr {
    /// Member access.
    pub fn get(self, name: impl Into<String>, ty: TypeRef) -> Expr {
        Expr::Member(Member {
            target: Box::new(self),
            name: name.into(),
            ty,
        })
    }

    /// The string `Length` member.
    pub fn length(self) -> Expr {
        self.get("Length", TypeRef::Int32)
    }

    /// The nullable `HasValue` member, compiled to `IS NOT NULL`.
    pub fn has_value(self) -> Expr {
        self.get("HasValue", TypeRef::Bool)
    }

    /// The nullable `Value` member, a pass-through to the underlying column.
    pub fn value_of(self) -> Expr {
        let ty = self.ty().strip_nullable().clone();
        self.get("Value", ty)
    }

    fn binary(self, op: BinaryOp, other: Expr, ty: TypeRef) -> Expr {
        Expr::Binary(Binary {
            op,
            left: Box::new(self),
            right: Box::new(other),
            ty,
        })
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Equal, other, TypeRef::Bool)
    }

    pub fn ne(self, other: Expr) -> Expr {
        self.binary(BinaryOp::NotEqual, other, TypeRef::Bool)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::LessThan, other, TypeRef::Bool)
    }

    pub fn lte(self, other: Expr) -> Expr {
        self.binary(BinaryOp::LessThanOrEqual, other, TypeRef::Bool)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::GreaterThan, other, TypeRef::Bool)
    }

    pub fn gte(self, other: Expr) -> Expr {
        self.binary(BinaryOp::GreaterThanOrEqual, other, TypeRef::Bool)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other, TypeRef::Bool)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other, TypeRef::Bool)
    }

    pub fn add(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        self.binary(BinaryOp::Add, other, ty)
    }

    pub fn sub(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        self.binary(BinaryOp::Subtract, other, ty)
    }

    pub fn mul(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        self.binary(BinaryOp::Multiply, other, ty)
    }

    pub fn div(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        self.binary(BinaryOp::Divide, other, ty)
    }

    pub fn rem(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        self.binary(BinaryOp::Modulo, other, ty)
    }

    pub fn concat(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Concat, other, TypeRef::Text)
    }

    pub fn bit_and(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        self.binary(BinaryOp::BitAnd, other, ty)
    }

    pub fn bit_or(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        self.binary(BinaryOp::BitOr, other, ty)
    }

    pub fn bit_xor(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        self.binary(BinaryOp::BitXor, other, ty)
    }

    /// Logical negation.
    pub fn not(self) -> Expr {
        Expr::Unary(Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
            ty: TypeRef::Bool,
        })
    }

    /// Arithmetic negation.
    pub fn neg(self) -> Expr {
        let ty = self.ty().clone();
        Expr::Unary(Unary {
            op: UnaryOp::Negate,
            operand: Box::new(self),
            ty,
        })
    }

    /// A scalar method call with an explicit result type.
    pub fn invoke(self, name: impl Into<String>, args: Vec<Expr>, ty: TypeRef) -> Expr {
        Expr::Call(Call {
            name: name.into(),
            receiver: Some(Box::new(self)),
            args,
            ty,
        })
    }

    pub fn to_upper(self) -> Expr {
        self.invoke("ToUpper", Vec::new(), TypeRef::Text)
    }

    pub fn to_lower(self) -> Expr {
        self.invoke("ToLower", Vec::new(), TypeRef::Text)
    }

    pub fn trim(self) -> Expr {
        self.invoke("Trim", Vec::new(), TypeRef::Text)
    }

    /// Zero-based substring; shifted to the SQL one-based form on emission.
    pub fn substring(self, start: Expr, len: Option<Expr>) -> Expr {
        let mut args = vec![start];
        args.extend(len);
        self.invoke("Substring", args, TypeRef::Text)
    }

    /// Zero-based index lookup; `-1` when absent, as in the host language.
    pub fn index_of(self, needle: Expr) -> Expr {
        self.invoke("IndexOf", vec![needle], TypeRef::Int32)
    }

    pub fn replace(self, search: Expr, replacement: Expr) -> Expr {
        self.invoke("Replace", vec![search, replacement], TypeRef::Text)
    }

    pub fn starts_with(self, prefix: Expr) -> Expr {
        self.invoke("StartsWith", vec![prefix], TypeRef::Bool)
    }

    pub fn ends_with(self, suffix: Expr) -> Expr {
        self.invoke("EndsWith", vec![suffix], TypeRef::Bool)
    }

    /// Membership or substring test, decided by the receiver's shape: a text
    /// receiver compiles to `LIKE`, a collection or query receiver to `IN`.
    pub fn contains(self, item: Expr) -> Expr {
        self.invoke("Contains", vec![item], TypeRef::Bool)
    }

    pub fn filter(self, pred: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "Where", vec![pred], ty)
    }

    pub fn take_while(self, pred: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "TakeWhile", vec![pred], ty)
    }

    pub fn skip_while(self, pred: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "SkipWhile", vec![pred], ty)
    }

    pub fn select(self, selector: Expr) -> Expr {
        let ty = TypeRef::sequence(lambda_body_ty(&selector));
        chain(self, "Select", vec![selector], ty)
    }

    pub fn order_by(self, selector: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "OrderBy", vec![selector], ty)
    }

    pub fn order_by_desc(self, selector: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "OrderByDescending", vec![selector], ty)
    }

    pub fn then_by(self, selector: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "ThenBy", vec![selector], ty)
    }

    pub fn then_by_desc(self, selector: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "ThenByDescending", vec![selector], ty)
    }

    pub fn group_by(self, key: Expr) -> Expr {
        chain(self, "GroupBy", vec![key], TypeRef::sequence(TypeRef::Row))
    }

    pub fn join(self, inner: Expr, outer_key: Expr, inner_key: Expr, result: Expr) -> Expr {
        chain(
            self,
            "Join",
            vec![inner, outer_key, inner_key, result],
            TypeRef::sequence(TypeRef::Row),
        )
    }

    pub fn take(self, count: i64) -> Expr {
        let ty = self.ty().clone();
        chain(self, "Take", vec![val(count)], ty)
    }

    pub fn skip(self, count: i64) -> Expr {
        let ty = self.ty().clone();
        chain(self, "Skip", vec![val(count)], ty)
    }

    pub fn take_last(self, count: i64) -> Expr {
        let ty = self.ty().clone();
        chain(self, "TakeLast", vec![val(count)], ty)
    }

    pub fn skip_last(self, count: i64) -> Expr {
        let ty = self.ty().clone();
        chain(self, "SkipLast", vec![val(count)], ty)
    }

    pub fn reverse(self) -> Expr {
        let ty = self.ty().clone();
        chain(self, "Reverse", Vec::new(), ty)
    }

    pub fn distinct(self) -> Expr {
        let ty = self.ty().clone();
        chain(self, "Distinct", Vec::new(), ty)
    }

    pub fn cast_to(self, entity: impl Into<String>) -> Expr {
        chain(self, "Cast", Vec::new(), TypeRef::sequence(TypeRef::entity(entity)))
    }

    pub fn of_type(self, entity: impl Into<String>) -> Expr {
        chain(self, "OfType", Vec::new(), TypeRef::sequence(TypeRef::entity(entity)))
    }

    fn element_ty(&self) -> TypeRef {
        self.ty().element().cloned().unwrap_or(TypeRef::Unit)
    }

    pub fn first(self) -> Expr {
        let ty = self.element_ty();
        chain(self, "First", Vec::new(), ty)
    }

    pub fn first_or_default(self) -> Expr {
        let ty = self.element_ty();
        chain(self, "FirstOrDefault", Vec::new(), ty)
    }

    /// `First` with the predicate overload; the predicate folds into the
    /// `WHERE` clause before the row is picked.
    pub fn first_with(self, pred: Expr) -> Expr {
        let ty = self.element_ty();
        chain(self, "First", vec![pred], ty)
    }

    pub fn first_or_default_with(self, pred: Expr) -> Expr {
        let ty = self.element_ty();
        chain(self, "FirstOrDefault", vec![pred], ty)
    }

    pub fn single(self) -> Expr {
        let ty = self.element_ty();
        chain(self, "Single", Vec::new(), ty)
    }

    pub fn single_or_default(self) -> Expr {
        let ty = self.element_ty();
        chain(self, "SingleOrDefault", Vec::new(), ty)
    }

    pub fn last(self) -> Expr {
        let ty = self.element_ty();
        chain(self, "Last", Vec::new(), ty)
    }

    pub fn last_or_default(self) -> Expr {
        let ty = self.element_ty();
        chain(self, "LastOrDefault", Vec::new(), ty)
    }

    pub fn element_at(self, index: i64) -> Expr {
        let ty = self.element_ty();
        chain(self, "ElementAt", vec![val(index)], ty)
    }

    pub fn element_at_or_default(self, index: i64) -> Expr {
        let ty = self.element_ty();
        chain(self, "ElementAtOrDefault", vec![val(index)], ty)
    }

    pub fn default_if_empty(self, default: Option<Value>) -> Expr {
        let ty = self.ty().clone();
        let args = default
            .map(|v| {
                let ty = v.type_ref();
                vec![Expr::Constant(Constant { value: v, ty })]
            })
            .unwrap_or_default();
        chain(self, "DefaultIfEmpty", args, ty)
    }

    pub fn count(self) -> Expr {
        chain(self, "Count", Vec::new(), TypeRef::Int32)
    }

    pub fn count_matching(self, pred: Expr) -> Expr {
        chain(self, "Count", vec![pred], TypeRef::Int32)
    }

    pub fn long_count(self) -> Expr {
        chain(self, "LongCount", Vec::new(), TypeRef::Int64)
    }

    pub fn sum(self, selector: Expr) -> Expr {
        let ty = lambda_body_ty(&selector);
        chain(self, "Sum", vec![selector], ty)
    }

    pub fn min(self, selector: Expr) -> Expr {
        let ty = lambda_body_ty(&selector);
        chain(self, "Min", vec![selector], ty)
    }

    pub fn max(self, selector: Expr) -> Expr {
        let ty = lambda_body_ty(&selector);
        chain(self, "Max", vec![selector], ty)
    }

    pub fn average(self, selector: Expr) -> Expr {
        chain(self, "Average", vec![selector], TypeRef::Float)
    }

    pub fn any(self) -> Expr {
        chain(self, "Any", Vec::new(), TypeRef::Bool)
    }

    pub fn any_matching(self, pred: Expr) -> Expr {
        chain(self, "Any", vec![pred], TypeRef::Bool)
    }

    pub fn all_matching(self, pred: Expr) -> Expr {
        chain(self, "All", vec![pred], TypeRef::Bool)
    }

    pub fn union(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "Union", vec![other], ty)
    }

    /// `UNION ALL`.
    pub fn union_all(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "Concat", vec![other], ty)
    }

    pub fn except(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "Except", vec![other], ty)
    }

    pub fn intersect(self, other: Expr) -> Expr {
        let ty = self.ty().clone();
        chain(self, "Intersect", vec![other], ty)
    }

    /// Statement timeout in seconds, carried through as opaque metadata.
    pub fn with_timeout(self, seconds: u32) -> Expr {
        let ty = self.ty().clone();
        chain(self, "WithTimeout", vec![val(i64::from(seconds))], ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_builds_a_typed_source() {
        let source = from("Order");

        match source {
            Expr::Call(c) => {
                assert_eq!("From", c.name);
                assert!(c.receiver.is_none());
                assert_eq!(Some("Order"), c.ty.entity_name());
            }
            other => panic!("expected a call node, got {other:?}"),
        }
    }

    #[test]
    fn select_derives_sequence_type_from_selector_body() {
        let order = TypeRef::entity("Order");
        let sel = lambda("o", order.clone(), param("o", order).get("Total", TypeRef::Decimal));
        let query = from("Order").select(sel);

        assert_eq!(&TypeRef::sequence(TypeRef::Decimal), query.ty());
    }

    #[test]
    fn comparisons_are_boolean() {
        let order = TypeRef::entity("Order");
        let pred = param("o", order).get("Status", TypeRef::Int32).eq(val(1));
        assert_eq!(&TypeRef::Bool, pred.ty());
    }
}
