/// Binary node operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitOr,
    BitXor,
    /// String concatenation; rendered per dialect.
    Concat,
}

impl BinaryOp {
    /// `AND`/`OR`.
    pub fn is_connective(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor)
    }

    /// The logical dual, used when the enclosing predicate context is
    /// inverted: `AND` becomes `OR`, comparisons flip to their negation.
    pub fn inverted(self) -> BinaryOp {
        match self {
            BinaryOp::And => BinaryOp::Or,
            BinaryOp::Or => BinaryOp::And,
            BinaryOp::Equal => BinaryOp::NotEqual,
            BinaryOp::NotEqual => BinaryOp::Equal,
            BinaryOp::LessThan => BinaryOp::GreaterThanOrEqual,
            BinaryOp::LessThanOrEqual => BinaryOp::GreaterThan,
            BinaryOp::GreaterThan => BinaryOp::LessThanOrEqual,
            BinaryOp::GreaterThanOrEqual => BinaryOp::LessThan,
            other => other,
        }
    }

    /// The SQL token for comparison and plain arithmetic operators.
    pub fn sql(self) -> &'static str {
        match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "<>",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Concat => "+",
        }
    }
}

/// Unary node operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation. Toggles the writer's negation flag around the
    /// operand instead of emitting a literal `NOT` wherever an inverse
    /// exists.
    Not,
    /// Arithmetic negation.
    Negate,
}

/// The closed set of recognized chain operators, dispatched from the string
/// name carried by a `Call` node. Unrecognized names fall through to the
/// custom handler registry and then to `UnsupportedOperator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    From,
    Where,
    TakeWhile,
    SkipWhile,
    Select,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    GroupBy,
    Join,
    Take,
    Skip,
    TakeLast,
    SkipLast,
    Reverse,
    Distinct,
    Cast,
    OfType,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Last,
    LastOrDefault,
    ElementAt,
    ElementAtOrDefault,
    DefaultIfEmpty,
    Count,
    LongCount,
    Sum,
    Min,
    Max,
    Average,
    Union,
    Concat,
    Except,
    Intersect,
    WithTimeout,
}

impl QueryOp {
    pub fn from_name(name: &str) -> Option<QueryOp> {
        let op = match name {
            "From" => QueryOp::From,
            "Where" => QueryOp::Where,
            "TakeWhile" => QueryOp::TakeWhile,
            "SkipWhile" => QueryOp::SkipWhile,
            "Select" => QueryOp::Select,
            "OrderBy" => QueryOp::OrderBy,
            "OrderByDescending" => QueryOp::OrderByDescending,
            "ThenBy" => QueryOp::ThenBy,
            "ThenByDescending" => QueryOp::ThenByDescending,
            "GroupBy" => QueryOp::GroupBy,
            "Join" => QueryOp::Join,
            "Take" => QueryOp::Take,
            "Skip" => QueryOp::Skip,
            "TakeLast" => QueryOp::TakeLast,
            "SkipLast" => QueryOp::SkipLast,
            "Reverse" => QueryOp::Reverse,
            "Distinct" => QueryOp::Distinct,
            "Cast" => QueryOp::Cast,
            "OfType" => QueryOp::OfType,
            "First" => QueryOp::First,
            "FirstOrDefault" => QueryOp::FirstOrDefault,
            "Single" => QueryOp::Single,
            "SingleOrDefault" => QueryOp::SingleOrDefault,
            "Last" => QueryOp::Last,
            "LastOrDefault" => QueryOp::LastOrDefault,
            "ElementAt" => QueryOp::ElementAt,
            "ElementAtOrDefault" => QueryOp::ElementAtOrDefault,
            "DefaultIfEmpty" => QueryOp::DefaultIfEmpty,
            "Count" => QueryOp::Count,
            "LongCount" => QueryOp::LongCount,
            "Sum" => QueryOp::Sum,
            "Min" => QueryOp::Min,
            "Max" => QueryOp::Max,
            "Average" => QueryOp::Average,
            "Union" => QueryOp::Union,
            "Concat" => QueryOp::Concat,
            "Except" => QueryOp::Except,
            "Intersect" => QueryOp::Intersect,
            "WithTimeout" => QueryOp::WithTimeout,
            _ => return None,
        };

        Some(op)
    }

    /// Operators joining two compiled statements.
    pub fn is_combination(self) -> bool {
        matches!(
            self,
            QueryOp::Union | QueryOp::Concat | QueryOp::Except | QueryOp::Intersect
        )
    }

    /// Terminal scalar aggregations.
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            QueryOp::Count | QueryOp::LongCount | QueryOp::Sum | QueryOp::Min | QueryOp::Max | QueryOp::Average
        )
    }
}
