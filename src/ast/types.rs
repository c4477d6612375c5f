use serde::Serialize;
use std::fmt;

/// The static result type carried by every expression node.
///
/// The compiler never reflects over runtime values during traversal; this
/// tag is all it needs to classify a node as scalar, nullable scalar,
/// entity-shaped or sequence-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TypeRef {
    /// No meaningful type, e.g. the static type of a `NULL` literal.
    Unit,
    Bool,
    Int32,
    Int64,
    Float,
    Decimal,
    Text,
    Bytes,
    DateTime,
    Uuid,
    Json,
    /// A scalar that may be `NULL`.
    Nullable(Box<TypeRef>),
    /// A mapped entity, identified by its registered schema name.
    Entity(String),
    /// An anonymous projection shape (`New` nodes, join result rows).
    Row,
    /// A sequence of elements, e.g. a query source or an in-memory
    /// collection.
    Sequence(Box<TypeRef>),
}

impl TypeRef {
    /// An entity reference by schema name.
    pub fn entity(name: impl Into<String>) -> Self {
        TypeRef::Entity(name.into())
    }

    /// A sequence of the given element type.
    pub fn sequence(elem: TypeRef) -> Self {
        TypeRef::Sequence(Box::new(elem))
    }

    /// A nullable version of the given scalar.
    pub fn nullable(inner: TypeRef) -> Self {
        TypeRef::Nullable(Box::new(inner))
    }

    /// Strips one level of nullability.
    pub fn strip_nullable(&self) -> &TypeRef {
        match self {
            TypeRef::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeRef::Nullable(_))
    }

    /// `true` for boolean results, nullable or not.
    pub fn is_bool(&self) -> bool {
        matches!(self.strip_nullable(), TypeRef::Bool)
    }

    /// `true` for text results, nullable or not.
    pub fn is_text(&self) -> bool {
        matches!(self.strip_nullable(), TypeRef::Text)
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.strip_nullable(), TypeRef::Entity(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, TypeRef::Sequence(_))
    }

    /// `true` for plain and nullable scalars.
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self.strip_nullable(),
            TypeRef::Entity(_) | TypeRef::Sequence(_) | TypeRef::Row | TypeRef::Unit
        )
    }

    /// The element type of a sequence.
    pub fn element(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Sequence(elem) => Some(elem),
            _ => None,
        }
    }

    /// The entity name, looking through nullability and one sequence level.
    /// `Sequence(Entity("Order"))` and `Entity("Order")` both resolve to
    /// `"Order"`.
    pub fn entity_name(&self) -> Option<&str> {
        match self.strip_nullable() {
            TypeRef::Entity(name) => Some(name),
            TypeRef::Sequence(elem) => match elem.strip_nullable() {
                TypeRef::Entity(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Unit => write!(f, "unit"),
            TypeRef::Bool => write!(f, "bool"),
            TypeRef::Int32 => write!(f, "i32"),
            TypeRef::Int64 => write!(f, "i64"),
            TypeRef::Float => write!(f, "f64"),
            TypeRef::Decimal => write!(f, "decimal"),
            TypeRef::Text => write!(f, "text"),
            TypeRef::Bytes => write!(f, "bytes"),
            TypeRef::DateTime => write!(f, "datetime"),
            TypeRef::Uuid => write!(f, "uuid"),
            TypeRef::Json => write!(f, "json"),
            TypeRef::Nullable(inner) => write!(f, "{inner}?"),
            TypeRef::Entity(name) => write!(f, "{name}"),
            TypeRef::Row => write!(f, "row"),
            TypeRef::Sequence(elem) => write!(f, "[{elem}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_name_looks_through_sequences_and_nullability() {
        let t = TypeRef::sequence(TypeRef::entity("Order"));
        assert_eq!(Some("Order"), t.entity_name());

        let t = TypeRef::nullable(TypeRef::entity("Order"));
        assert_eq!(Some("Order"), t.entity_name());

        assert_eq!(None, TypeRef::Text.entity_name());
    }

    #[test]
    fn scalar_classification() {
        assert!(TypeRef::Text.is_scalar());
        assert!(TypeRef::nullable(TypeRef::Int32).is_scalar());
        assert!(!TypeRef::entity("Order").is_scalar());
        assert!(!TypeRef::sequence(TypeRef::Int32).is_scalar());
    }
}
