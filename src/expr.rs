//! Expression (AST) module: the parsed representation of filter expressions.
//!
//! [`FilterExpr`] nodes are boolean tests; [`Operand`] nodes produce the
//! (possibly multi-valued) values those tests compare. Every node owns its
//! children and its [`Location`] in the source text.

use crate::error::Location;
use crate::schema::FieldId;
use crate::types::{FieldType, FieldValue};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ComparisonOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains, // substring or byte subsequence
    Matches,  // regular expression
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 8] = [
        ComparisonOp::Eq,
        ComparisonOp::Neq,
        ComparisonOp::Lt,
        ComparisonOp::Lte,
        ComparisonOp::Gt,
        ComparisonOp::Gte,
        ComparisonOp::Contains,
        ComparisonOp::Matches,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Neq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Contains => "contains",
            ComparisonOp::Matches => "matches",
        }
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            ComparisonOp::Lt | ComparisonOp::Lte | ComparisonOp::Gt | ComparisonOp::Gte
        )
    }

    /// Applies the operator to two resolved values. `Matches` takes a
    /// [`Pattern`] instead and is always false here.
    pub fn apply(&self, left: &FieldValue, right: &FieldValue, ignore_case: bool) -> bool {
        match self {
            ComparisonOp::Eq => left.equals(right, ignore_case),
            ComparisonOp::Neq => !left.equals(right, ignore_case),
            ComparisonOp::Lt => left.compare(right, ignore_case) == Some(Ordering::Less),
            ComparisonOp::Lte => matches!(
                left.compare(right, ignore_case),
                Some(Ordering::Less | Ordering::Equal)
            ),
            ComparisonOp::Gt => left.compare(right, ignore_case) == Some(Ordering::Greater),
            ComparisonOp::Gte => matches!(
                left.compare(right, ignore_case),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            ComparisonOp::Contains => left.contains(right, ignore_case),
            ComparisonOp::Matches => false,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A field resolved against the schema at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub id: FieldId,
    pub name: String,
    pub ftype: FieldType,
}

/// A compiled regular expression, compared by its source.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    case_insensitive: bool,
    #[cfg(feature = "regex")]
    regex: regex::bytes::Regex,
}

impl Pattern {
    pub fn new(source: &str, case_insensitive: bool) -> Result<Self, String> {
        #[cfg(feature = "regex")]
        {
            let regex = regex::bytes::RegexBuilder::new(source)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| format!("invalid regular expression: {e}"))?;
            Ok(Self {
                source: source.to_string(),
                case_insensitive,
                regex,
            })
        }
        #[cfg(not(feature = "regex"))]
        {
            let _ = (source, case_insensitive);
            Err("pattern matching requires the `regex` feature".to_string())
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, haystack: &[u8]) -> bool {
        #[cfg(feature = "regex")]
        {
            self.regex.is_match(haystack)
        }
        #[cfg(not(feature = "regex"))]
        {
            let _ = haystack;
            false
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.case_insensitive == other.case_insensitive
    }
}

/// Literal operand. Everything but `Value` is replaced during semantic analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Unquoted text, reparsed by the kind it is compared with.
    Unparsed(String),
    /// Quoted string contents.
    Quoted(Vec<u8>),
    Pattern(Pattern),
    Value(FieldValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceEnd {
    ToEnd,
    /// Exclusive end offset; negative offsets count from the end.
    Offset(i64),
    Length(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceRange {
    pub start: i64,
    pub end: SliceEnd,
    pub location: Location,
}

impl SliceRange {
    /// Resolves the range against a value of `len` bytes, `None` when it
    /// falls outside the value.
    pub fn resolve(&self, len: usize) -> Option<Range<usize>> {
        let len = i64::try_from(len).ok()?;
        let start = if self.start < 0 { len + self.start } else { self.start };
        if start < 0 || start > len {
            return None;
        }
        let end = match self.end {
            SliceEnd::ToEnd => len,
            SliceEnd::Offset(e) if e < 0 => len + e,
            SliceEnd::Offset(e) => e,
            SliceEnd::Length(n) => start.checked_add(n)?,
        };
        if end < start || end > len {
            return None;
        }
        Some(start as usize..end as usize)
    }
}

impl fmt::Display for SliceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            SliceEnd::ToEnd => write!(f, "{}:", self.start),
            SliceEnd::Offset(e) => write!(f, "{}:{}", self.start, e),
            SliceEnd::Length(1) => write!(f, "{}", self.start),
            SliceEnd::Length(n) => write!(f, "{}:+{}", self.start, n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetElement {
    Value {
        value: Literal,
        location: Location,
    },
    /// Inclusive range; a missing bound is unbounded.
    Range {
        low: Option<Literal>,
        high: Option<Literal>,
        location: Location,
    },
}

impl SetElement {
    /// Whether `value` equals the element or lies within its range. Bounds
    /// that were never resolved match nothing.
    pub fn contains(&self, value: &FieldValue, ignore_case: bool) -> bool {
        match self {
            SetElement::Value { value: Literal::Value(v), .. } => value.equals(v, ignore_case),
            SetElement::Value { .. } => false,
            SetElement::Range { low, high, .. } => {
                let above = match low {
                    None => true,
                    Some(Literal::Value(lo)) => ComparisonOp::Gte.apply(value, lo, ignore_case),
                    Some(_) => false,
                };
                let below = match high {
                    None => true,
                    Some(Literal::Value(hi)) => ComparisonOp::Lte.apply(value, hi, ignore_case),
                    Some(_) => false,
                };
                above && below
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Operand {
    Field {
        field: FieldRef,
        location: Location,
    },
    Literal {
        value: Literal,
        location: Location,
    },
    Slice {
        base: Box<Operand>,
        ranges: Vec<SliceRange>,
        location: Location,
    },
    FunctionCall {
        name: String,
        args: Vec<Operand>,
        location: Location,
    },
    BitAnd {
        left: Box<Operand>,
        right: Box<Operand>,
        location: Location,
    },
}

impl Operand {
    pub fn location(&self) -> Location {
        match self {
            Operand::Field { location, .. }
            | Operand::Literal { location, .. }
            | Operand::Slice { location, .. }
            | Operand::FunctionCall { location, .. }
            | Operand::BitAnd { location, .. } => *location,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Operand::Literal { .. })
    }

    /// The resolved value of a literal operand.
    pub fn literal_value(&self) -> Option<&FieldValue> {
        match self {
            Operand::Literal { value: Literal::Value(v), .. } => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FilterExpr {
    /// Two or more operands joined by one logical operator.
    LogicalOp {
        op: LogicalOp,
        operands: Vec<FilterExpr>,
        location: Location,
    },
    Comparison {
        left: Operand,
        op: ComparisonOp,
        right: Operand,
        ignore_case: bool,
        location: Location,
    },
    Membership {
        operand: Operand,
        set: Vec<SetElement>,
        ignore_case: bool,
        location: Location,
    },
    Not {
        operand: Box<FilterExpr>,
        location: Location,
    },
    /// Bare operand: true when it yields at least one value.
    Exists {
        operand: Operand,
        location: Location,
    },
    Constant {
        value: bool,
        location: Location,
    },
}

impl FilterExpr {
    pub fn location(&self) -> Location {
        match self {
            FilterExpr::LogicalOp { location, .. }
            | FilterExpr::Comparison { location, .. }
            | FilterExpr::Membership { location, .. }
            | FilterExpr::Not { location, .. }
            | FilterExpr::Exists { location, .. }
            | FilterExpr::Constant { location, .. } => *location,
        }
    }

    pub fn logical(op: LogicalOp, left: FilterExpr, right: FilterExpr) -> FilterExpr {
        let location = left.location().merge(right.location());
        FilterExpr::LogicalOp {
            op,
            operands: vec![left, right],
            location,
        }
    }

    /// One chain over `operands`, which must not be empty.
    pub fn chain(op: LogicalOp, operands: Vec<FilterExpr>) -> FilterExpr {
        let location = match (operands.first(), operands.last()) {
            (Some(first), Some(last)) => first.location().merge(last.location()),
            _ => Location::EMPTY,
        };
        FilterExpr::LogicalOp { op, operands, location }
    }

    pub fn negate(operand: FilterExpr, location: Location) -> FilterExpr {
        FilterExpr::Not {
            location: location.merge(operand.location()),
            operand: Box::new(operand),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Unparsed(text) => f.write_str(text),
            Literal::Quoted(bytes) => {
                f.write_str("\"")?;
                for b in bytes {
                    match b {
                        b'"' => f.write_str("\\\"")?,
                        b'\\' => f.write_str("\\\\")?,
                        0x20..=0x7e => write!(f, "{}", *b as char)?,
                        _ => write!(f, "\\x{b:02x}")?,
                    }
                }
                f.write_str("\"")
            }
            Literal::Pattern(p) => write!(f, "{:?}", p.source()),
            Literal::Value(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Field { field, .. } => f.write_str(&field.name),
            Operand::Literal { value, .. } => write!(f, "{value}"),
            Operand::Slice { base, ranges, .. } => {
                write!(f, "{base}[")?;
                for (i, r) in ranges.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{r}")?;
                }
                f.write_str("]")
            }
            Operand::FunctionCall { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Operand::BitAnd { left, right, .. } => write!(f, "({left} & {right})"),
        }
    }
}

impl fmt::Display for SetElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetElement::Value { value, .. } => write!(f, "{value}"),
            SetElement::Range { low, high, .. } => {
                if let Some(low) = low {
                    write!(f, "{low}")?;
                }
                f.write_str("..")?;
                if let Some(high) = high {
                    write!(f, "{high}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::LogicalOp { op, operands, .. } => {
                let sep = match op {
                    LogicalOp::And => " && ",
                    LogicalOp::Or => " || ",
                };
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    match operand {
                        FilterExpr::LogicalOp { .. } => write!(f, "({operand})")?,
                        _ => write!(f, "{operand}")?,
                    }
                }
                Ok(())
            }
            FilterExpr::Comparison { left, op, right, .. } => write!(f, "{left} {op} {right}"),
            FilterExpr::Membership { operand, set, .. } => {
                write!(f, "{operand} in {{")?;
                for (i, element) in set.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("}")
            }
            FilterExpr::Not { operand, .. } => match operand.as_ref() {
                FilterExpr::Exists { .. } | FilterExpr::Constant { .. } => write!(f, "!{operand}"),
                _ => write!(f, "!({operand})"),
            },
            FilterExpr::Exists { operand, .. } => write!(f, "{operand}"),
            FilterExpr::Constant { value, .. } => write!(f, "{value}"),
        }
    }
}
