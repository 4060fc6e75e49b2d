//! Semantic module: type checking and literal resolution.
//!
//! Literals are left as raw text by the parser. The checker reparses each one
//! into the kind of the operand it meets, so `tcp.port == "80"` ends up
//! comparing two integers. After a successful check no [`Literal`] other
//! than [`Literal::Value`] or [`Literal::Pattern`] remains in the tree.

use crate::config::{CompileOptions, SliceIndexMode, StringCase};
use crate::error::{CompileError, Location};
use crate::expr::{
    ComparisonOp, FilterExpr, Literal, Operand, Pattern, SetElement, SliceEnd, SliceRange,
};
use crate::functions::FunctionRegistry;
use crate::schema::{FieldDescriptor, FilterSchema};
use crate::types::{parse_integer, FieldType, FieldValue};
use std::cmp::Ordering;

pub struct SemanticChecker<'a> {
    schema: &'a FilterSchema,
    functions: &'a FunctionRegistry,
    options: &'a CompileOptions,
}

impl<'a> SemanticChecker<'a> {
    pub fn new(
        schema: &'a FilterSchema,
        functions: &'a FunctionRegistry,
        options: &'a CompileOptions,
    ) -> Self {
        Self {
            schema,
            functions,
            options,
        }
    }

    /// Checks `expr` bottom-up, resolving its literals in place.
    pub fn check(&self, expr: &mut FilterExpr) -> Result<(), CompileError> {
        match expr {
            FilterExpr::LogicalOp { operands, .. } => {
                operands.iter_mut().try_for_each(|operand| self.check(operand))
            }
            FilterExpr::Not { operand, .. } => self.check(operand),
            FilterExpr::Constant { .. } => Ok(()),
            FilterExpr::Exists { operand, location } => match self.operand_kind(operand)? {
                Some(_) => Ok(()),
                None => Err(CompileError::syntax("a literal on its own is not a test", *location)),
            },
            FilterExpr::Comparison {
                left,
                op,
                right,
                ignore_case,
                location,
            } => self.check_comparison(left, *op, right, ignore_case, *location),
            FilterExpr::Membership {
                operand,
                set,
                ignore_case,
                ..
            } => self.check_membership(operand, set, ignore_case),
        }
    }

    fn check_comparison(
        &self,
        left: &mut Operand,
        op: ComparisonOp,
        right: &mut Operand,
        ignore_case: &mut bool,
        location: Location,
    ) -> Result<(), CompileError> {
        let lk = self.operand_kind(left)?;
        let rk = self.operand_kind(right)?;
        if op == ComparisonOp::Matches {
            let kind = match lk {
                Some(kind) => kind,
                None => self.resolve_natural(left)?,
            };
            self.check_supported(left, kind, op)?;
            return self.compile_pattern(right);
        }
        let kind = match (lk, rk) {
            (Some(l), Some(r)) => {
                if !l.is_compatible_with(&r) {
                    return Err(CompileError::type_mismatch(
                        format!("{left} ({l}) and {right} ({r}) are not of compatible types"),
                        location,
                    ));
                }
                self.check_supported(right, r, op)?;
                l
            }
            (Some(l), None) => {
                let desc = self.descriptor_of(left);
                self.resolve_literal(right, l, desc)?;
                l
            }
            (None, Some(r)) => {
                let desc = self.descriptor_of(right);
                self.resolve_literal(left, r, desc)?;
                r
            }
            (None, None) => self.resolve_literal_pair(left, right, location)?,
        };
        self.check_supported(left, kind, op)?;
        *ignore_case = kind == FieldType::String && self.options.string_case == StringCase::Insensitive;
        Ok(())
    }

    fn check_membership(
        &self,
        operand: &mut Operand,
        set: &mut [SetElement],
        ignore_case: &mut bool,
    ) -> Result<(), CompileError> {
        let kind = match self.operand_kind(operand)? {
            Some(kind) => kind,
            None => self.resolve_natural(operand)?,
        };
        let desc = self.descriptor_of(operand);
        for element in set.iter_mut() {
            match element {
                SetElement::Value { value, location } => {
                    let resolved = self.reparse(value, kind, desc, *location)?;
                    *value = Literal::Value(resolved);
                }
                SetElement::Range { low, high, location } => {
                    if !kind.supports_ordering() {
                        return Err(CompileError::type_mismatch(
                            format!("{operand} ({kind}) cannot be tested against a range"),
                            *location,
                        ));
                    }
                    for bound in [&mut *low, &mut *high].into_iter().flatten() {
                        let resolved = self.reparse(bound, kind, desc, *location)?;
                        *bound = Literal::Value(resolved);
                    }
                    if let (Some(Literal::Value(lo)), Some(Literal::Value(hi))) = (&*low, &*high) {
                        if lo.compare(hi, false) == Some(Ordering::Greater) {
                            return Err(CompileError::range(
                                format!("range {lo}..{hi} is empty"),
                                *location,
                            ));
                        }
                    }
                }
            }
        }
        *ignore_case = kind == FieldType::String && self.options.string_case == StringCase::Insensitive;
        Ok(())
    }

    /// Kind of an operand, `None` for a literal whose kind depends on its peer.
    fn operand_kind(&self, operand: &mut Operand) -> Result<Option<FieldType>, CompileError> {
        match operand {
            Operand::Field { field, .. } => Ok(Some(field.ftype)),
            Operand::Literal { value: Literal::Value(v), .. } => Ok(Some(natural_type(v))),
            Operand::Literal { .. } => Ok(None),
            Operand::Slice { base, ranges, .. } => {
                match self.operand_kind(base)? {
                    Some(kind) if kind.is_byte_like() => {}
                    Some(kind) => {
                        return Err(CompileError::type_mismatch(
                            format!("{base} ({kind}) cannot be sliced"),
                            base.location(),
                        ))
                    }
                    None => {
                        return Err(CompileError::type_mismatch(
                            "a literal cannot be sliced",
                            base.location(),
                        ))
                    }
                }
                ranges.iter().try_for_each(|r| self.check_range(r))?;
                Ok(Some(FieldType::Bytes))
            }
            Operand::FunctionCall { name, args, location } => {
                let Some(function) = self.functions.get(name) else {
                    return Err(CompileError::syntax(
                        format!("function '{name}' does not exist"),
                        *location,
                    ));
                };
                let (min, max) = function.arity();
                if args.len() < min || args.len() > max {
                    let expected = if min == max {
                        format!("{min}")
                    } else {
                        format!("{min} to {max}")
                    };
                    return Err(CompileError::arity(
                        format!("{name}() takes {expected} argument(s), {} given", args.len()),
                        *location,
                    ));
                }
                let mut kinds = Vec::with_capacity(args.len());
                for arg in args.iter_mut() {
                    let kind = match self.operand_kind(arg)? {
                        Some(kind) => kind,
                        None => self.resolve_natural(arg)?,
                    };
                    kinds.push(kind);
                }
                function
                    .check(&kinds)
                    .map(Some)
                    .map_err(|reason| CompileError::arity(format!("{name}(): {reason}"), *location))
            }
            Operand::BitAnd { left, right, location } => {
                let lk = self.operand_kind(left)?;
                let rk = self.operand_kind(right)?;
                for kind in [lk, rk].into_iter().flatten() {
                    if !kind.is_integer() {
                        return Err(CompileError::type_mismatch(
                            format!("'&' requires integer operands, found {kind}"),
                            *location,
                        ));
                    }
                }
                let kind = match (lk, rk) {
                    (Some(l), Some(_)) => l,
                    (Some(l), None) => {
                        let desc = self.descriptor_of(left);
                        self.resolve_literal(right, l, desc)?;
                        l
                    }
                    (None, Some(r)) => {
                        let desc = self.descriptor_of(right);
                        self.resolve_literal(left, r, desc)?;
                        r
                    }
                    (None, None) => {
                        let l = self.resolve_natural(left)?;
                        if !l.is_integer() {
                            return Err(CompileError::type_mismatch(
                                format!("'&' requires integer operands, found {l}"),
                                *location,
                            ));
                        }
                        self.resolve_literal(right, l, None)?;
                        l
                    }
                };
                Ok(Some(kind))
            }
        }
    }

    fn check_range(&self, range: &SliceRange) -> Result<(), CompileError> {
        let negative = range.start < 0 || matches!(range.end, SliceEnd::Offset(e) if e < 0);
        if negative && self.options.slice_indices == SliceIndexMode::Reject {
            return Err(CompileError::range(
                format!("negative slice offsets are not allowed: [{range}]"),
                range.location,
            ));
        }
        match range.end {
            SliceEnd::Length(n) if n < 1 => Err(CompileError::range(
                format!("slice length must be at least 1: [{range}]"),
                range.location,
            )),
            SliceEnd::Offset(0) => Err(CompileError::range(
                format!("slice is always empty: [{range}]"),
                range.location,
            )),
            SliceEnd::Offset(e) if (range.start < 0) == (e < 0) && range.start >= e => {
                Err(CompileError::range(
                    format!("slice start must come before its end: [{range}]"),
                    range.location,
                ))
            }
            _ => Ok(()),
        }
    }

    fn check_supported(
        &self,
        operand: &Operand,
        kind: FieldType,
        op: ComparisonOp,
    ) -> Result<(), CompileError> {
        if kind.supports(op) {
            Ok(())
        } else {
            Err(CompileError::type_mismatch(
                format!("{operand} ({kind}) cannot participate in '{op}' comparison"),
                operand.location(),
            ))
        }
    }

    fn compile_pattern(&self, operand: &mut Operand) -> Result<(), CompileError> {
        let location = operand.location();
        let Operand::Literal { value, .. } = operand else {
            return Err(CompileError::type_mismatch(
                "the right side of 'matches' must be a quoted string",
                location,
            ));
        };
        let pattern = match value {
            Literal::Pattern(_) => return Ok(()),
            Literal::Quoted(bytes) => {
                let source = std::str::from_utf8(bytes).map_err(|_| {
                    CompileError::type_mismatch("pattern is not valid UTF-8", location)
                })?;
                Pattern::new(source, self.options.matches_case_insensitive)
                    .map_err(|reason| CompileError::type_mismatch(reason, location))?
            }
            _ => {
                return Err(CompileError::type_mismatch(
                    "the right side of 'matches' must be a quoted string",
                    location,
                ))
            }
        };
        *value = Literal::Pattern(pattern);
        Ok(())
    }

    fn descriptor_of(&self, operand: &Operand) -> Option<&'a FieldDescriptor> {
        match operand {
            Operand::Field { field, .. } => self.schema.lookup(&field.name),
            _ => None,
        }
    }

    fn resolve_literal(
        &self,
        operand: &mut Operand,
        kind: FieldType,
        desc: Option<&FieldDescriptor>,
    ) -> Result<(), CompileError> {
        if let Operand::Literal { value, location } = operand {
            let resolved = self.reparse(value, kind, desc, *location)?;
            *value = Literal::Value(resolved);
        }
        Ok(())
    }

    /// Both sides are literals: take their natural kinds, or reparse one into
    /// the other's kind when those disagree.
    fn resolve_literal_pair(
        &self,
        left: &mut Operand,
        right: &mut Operand,
        location: Location,
    ) -> Result<FieldType, CompileError> {
        let (Operand::Literal { value: lv, location: ll }, Operand::Literal { value: rv, location: rl }) =
            (&mut *left, &mut *right)
        else {
            return Err(CompileError::type_mismatch("expected two literals", location));
        };
        let lval = self.natural_value(lv, *ll)?;
        let rval = self.natural_value(rv, *rl)?;
        let (lk, rk) = (natural_type(&lval), natural_type(&rval));
        let (lval, rval, kind) = if lk.is_compatible_with(&rk) {
            (lval, rval, lk)
        } else if let Ok(r) = self.reparse(rv, lk, None, *rl) {
            (lval, r, lk)
        } else if let Ok(l) = self.reparse(lv, rk, None, *ll) {
            (l, rval, rk)
        } else {
            return Err(CompileError::type_mismatch(
                format!("{lval} ({lk}) and {rval} ({rk}) are not of compatible types"),
                location,
            ));
        };
        *lv = Literal::Value(lval);
        *rv = Literal::Value(rval);
        Ok(kind)
    }

    fn resolve_natural(&self, operand: &mut Operand) -> Result<FieldType, CompileError> {
        if let Operand::Literal { value, location } = operand {
            let resolved = self.natural_value(value, *location)?;
            let kind = natural_type(&resolved);
            *value = Literal::Value(resolved);
            return Ok(kind);
        }
        Err(CompileError::type_mismatch(
            format!("cannot determine the type of {operand}"),
            operand.location(),
        ))
    }

    /// Reparses a literal into `kind`, consulting the field's value names.
    fn reparse(
        &self,
        literal: &Literal,
        kind: FieldType,
        desc: Option<&FieldDescriptor>,
        location: Location,
    ) -> Result<FieldValue, CompileError> {
        let named = |text: &str| {
            desc.filter(|_| kind.is_integer())
                .and_then(|d| d.value_for_name(text))
                .and_then(|n| kind.integer_value(n as i128))
        };
        match literal {
            Literal::Value(v) if v.conforms_to(kind) || kind.is_compatible_with(&natural_type(v)) => {
                Ok(v.clone())
            }
            Literal::Value(v) => Err(CompileError::type_mismatch(
                format!("{v} is not a valid {kind}"),
                location,
            )),
            Literal::Unparsed(text) => {
                if let Some(value) = named(text) {
                    return Ok(value);
                }
                kind.parse_value(text).map_err(|reason| {
                    if looks_like_field(text) {
                        CompileError::unknown_field(text, location)
                    } else {
                        CompileError::type_mismatch(reason, location)
                    }
                })
            }
            Literal::Quoted(bytes) => {
                if let Some(value) = std::str::from_utf8(bytes).ok().and_then(named) {
                    return Ok(value);
                }
                kind.value_from_bytes(bytes)
                    .map_err(|reason| CompileError::type_mismatch(reason, location))
            }
            Literal::Pattern(p) => Err(CompileError::type_mismatch(
                format!("pattern {:?} can only be used with 'matches'", p.source()),
                location,
            )),
        }
    }

    /// Value of a literal with no typed peer.
    fn natural_value(&self, literal: &Literal, location: Location) -> Result<FieldValue, CompileError> {
        match literal {
            Literal::Value(v) => Ok(v.clone()),
            Literal::Quoted(bytes) => Ok(match String::from_utf8(bytes.clone()) {
                Ok(s) => FieldValue::String(s),
                Err(e) => FieldValue::Bytes(e.into_bytes()),
            }),
            Literal::Unparsed(text) => {
                if let Some(n) = parse_integer(text) {
                    if let Some(v) = FieldType::Int64
                        .integer_value(n)
                        .or_else(|| FieldType::UInt64.integer_value(n))
                    {
                        return Ok(v);
                    }
                }
                let numeric = text.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.');
                let candidates: &[FieldType] = if numeric {
                    &[FieldType::Float, FieldType::Ipv4, FieldType::Ipv6, FieldType::Ether, FieldType::Guid, FieldType::Bytes]
                } else {
                    &[FieldType::Bool, FieldType::Ipv6, FieldType::Ether, FieldType::Guid, FieldType::Bytes]
                };
                if let Some(v) = candidates.iter().find_map(|k| k.parse_value(text).ok()) {
                    return Ok(v);
                }
                if looks_like_field(text) {
                    return Err(CompileError::unknown_field(text, location));
                }
                Ok(FieldValue::String(text.clone()))
            }
            Literal::Pattern(p) => Err(CompileError::type_mismatch(
                format!("pattern {:?} can only be used with 'matches'", p.source()),
                location,
            )),
        }
    }
}

/// The kind a resolved literal takes when nothing else constrains it.
fn natural_type(value: &FieldValue) -> FieldType {
    match value {
        FieldValue::Int(_) => FieldType::Int64,
        FieldValue::UInt(_) => FieldType::UInt64,
        FieldValue::Float(_) => FieldType::Float,
        FieldValue::Bool(_) => FieldType::Bool,
        FieldValue::String(_) => FieldType::String,
        FieldValue::Bytes(_) => FieldType::Bytes,
        FieldValue::Ipv4(_) => FieldType::Ipv4,
        FieldValue::Ipv6(_) => FieldType::Ipv6,
        FieldValue::Ether(_) => FieldType::Ether,
        FieldValue::AbsoluteTime(_) => FieldType::AbsoluteTime,
        FieldValue::RelativeTime(_) => FieldType::RelativeTime,
        FieldValue::Guid(_) => FieldType::Guid,
    }
}

/// Dotted names such as `foo.bar` that failed to resolve as fields.
fn looks_like_field(text: &str) -> bool {
    text.contains('.')
        && text.starts_with(|c: char| c.is_ascii_alphabetic())
        && text.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
