//! Optimizer module: semantics-preserving rewrites of a checked filter.
//!
//! One bottom-up pass folds literal-only tests, removes double negation,
//! flattens nested `&&`/`||` chains and drops or absorbs boolean constants.
//! Children are simplified before their parent looks at them, so a second
//! pass over the result changes nothing.

use crate::error::Location;
use crate::expr::{ComparisonOp, FilterExpr, Literal, LogicalOp, Operand, SetElement};

pub struct Optimizer {
    simplified: bool,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Self { simplified: false }
    }

    /// Whether the last call to [`Optimizer::optimize`] changed anything.
    pub fn was_simplified(&self) -> bool {
        self.simplified
    }

    pub fn optimize(&mut self, expr: FilterExpr) -> FilterExpr {
        self.simplified = false;
        self.simplify(expr)
    }

    fn simplify(&mut self, expr: FilterExpr) -> FilterExpr {
        match expr {
            FilterExpr::LogicalOp { op, operands, location } => {
                self.simplify_logical(op, operands, location)
            }
            FilterExpr::Not { operand, location } => match self.simplify(*operand) {
                FilterExpr::Constant { value, .. } => {
                    self.simplified = true;
                    FilterExpr::Constant { value: !value, location }
                }
                FilterExpr::Not { operand, .. } => {
                    self.simplified = true;
                    *operand
                }
                other => FilterExpr::Not {
                    operand: Box::new(other),
                    location,
                },
            },
            FilterExpr::Comparison {
                ref left,
                op,
                ref right,
                ignore_case,
                location,
            } => match fold_comparison(left, op, right, ignore_case) {
                Some(value) => {
                    self.simplified = true;
                    FilterExpr::Constant { value, location }
                }
                None => expr,
            },
            FilterExpr::Membership {
                ref operand,
                ref set,
                ignore_case,
                location,
            } => match fold_membership(operand, set, ignore_case) {
                Some(value) => {
                    self.simplified = true;
                    FilterExpr::Constant { value, location }
                }
                None => expr,
            },
            other => other,
        }
    }

    fn simplify_logical(
        &mut self,
        op: LogicalOp,
        operands: Vec<FilterExpr>,
        location: Location,
    ) -> FilterExpr {
        // `true` is neutral for `&&` and absorbing for `||`.
        let neutral = op == LogicalOp::And;
        let mut flat = Vec::with_capacity(operands.len());
        for operand in operands {
            match self.simplify(operand) {
                FilterExpr::LogicalOp { op: inner, operands, .. } if inner == op => {
                    self.simplified = true;
                    flat.extend(operands);
                }
                FilterExpr::Constant { value, .. } if value == neutral => {
                    self.simplified = true;
                }
                FilterExpr::Constant { value, .. } => {
                    self.simplified = true;
                    return FilterExpr::Constant { value, location };
                }
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => FilterExpr::Constant { value: neutral, location },
            1 => flat.pop().unwrap_or(FilterExpr::Constant { value: neutral, location }),
            _ => FilterExpr::LogicalOp {
                op,
                operands: flat,
                location,
            },
        }
    }
}

fn fold_comparison(
    left: &Operand,
    op: ComparisonOp,
    right: &Operand,
    ignore_case: bool,
) -> Option<bool> {
    let value = left.literal_value()?;
    match right {
        Operand::Literal { value: Literal::Pattern(pattern), .. } => {
            value.as_bytes().map(|bytes| pattern.is_match(&bytes))
        }
        _ => Some(op.apply(value, right.literal_value()?, ignore_case)),
    }
}

fn fold_membership(operand: &Operand, set: &[SetElement], ignore_case: bool) -> Option<bool> {
    let value = operand.literal_value()?;
    Some(set.iter().any(|element| element.contains(value, ignore_case)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::functions::FunctionRegistry;
    use crate::parser::FilterParser;
    use crate::schema::{FilterSchema, FilterSchemaBuilder};
    use crate::semantic::SemanticChecker;
    use crate::types::FieldType;

    fn schema() -> FilterSchema {
        FilterSchemaBuilder::new()
            .field("tcp.port", FieldType::UInt16)
            .field("frame", FieldType::Bytes)
            .field("http.host", FieldType::String)
            .build()
    }

    fn checked(input: &str) -> FilterExpr {
        let schema = schema();
        let functions = FunctionRegistry::with_builtins();
        let options = CompileOptions::default();
        let mut expr = FilterParser::new(input, &schema, &functions)
            .unwrap()
            .parse_filter()
            .unwrap();
        SemanticChecker::new(&schema, &functions, &options)
            .check(&mut expr)
            .unwrap();
        expr
    }

    fn optimized(input: &str) -> FilterExpr {
        Optimizer::new().optimize(checked(input))
    }

    #[test]
    fn test_neutral_constants_dropped() {
        assert!(matches!(optimized("true && tcp.port == 1"), FilterExpr::Comparison { .. }));
        assert!(matches!(optimized("false || frame"), FilterExpr::Exists { .. }));
        assert!(matches!(optimized("true && true"), FilterExpr::Constant { value: true, .. }));
    }

    #[test]
    fn test_absorbing_constants() {
        assert!(matches!(optimized("frame && false"), FilterExpr::Constant { value: false, .. }));
        assert!(matches!(optimized("frame || true"), FilterExpr::Constant { value: true, .. }));
    }

    #[test]
    fn test_double_negation() {
        assert!(matches!(optimized("!!frame"), FilterExpr::Exists { .. }));
        assert!(matches!(optimized("!!!frame"), FilterExpr::Not { .. }));
        assert!(matches!(optimized("!true"), FilterExpr::Constant { value: false, .. }));
    }

    #[test]
    fn test_constant_folding() {
        assert!(matches!(optimized("1 == 1"), FilterExpr::Constant { value: true, .. }));
        assert!(matches!(optimized("1 == 2 && frame"), FilterExpr::Constant { value: false, .. }));
        assert!(matches!(optimized("5 in {1..10}"), FilterExpr::Constant { value: true, .. }));
        assert!(matches!(optimized("\"abc\" contains \"bc\""), FilterExpr::Constant { value: true, .. }));
    }

    #[cfg(feature = "regex")]
    #[test]
    fn test_pattern_folding() {
        assert!(matches!(optimized("\"abc\" matches \"B\""), FilterExpr::Constant { value: true, .. }));
    }

    #[test]
    fn test_flatten_chains() {
        let expr = optimized("tcp.port == 1 && (tcp.port == 2 && tcp.port == 3) && frame");
        match expr {
            FilterExpr::LogicalOp { op: LogicalOp::And, operands, .. } => assert_eq!(operands.len(), 4),
            other => panic!("unexpected {other:?}"),
        }
        let expr = optimized("tcp.port == 1 || (tcp.port == 2 && frame)");
        match expr {
            FilterExpr::LogicalOp { op: LogicalOp::Or, operands, .. } => assert_eq!(operands.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_idempotent() {
        for input in [
            "tcp.port == 1 && (tcp.port == 2 && !!frame) || false",
            "!(true && !frame) || tcp.port in {1, 2..4}",
            "http.host == \"a\" && (1 == 1 || frame)",
        ] {
            let mut optimizer = Optimizer::new();
            let once = optimizer.optimize(checked(input));
            assert!(optimizer.was_simplified());
            let twice = optimizer.optimize(once.clone());
            assert_eq!(once, twice);
            assert!(!optimizer.was_simplified());
        }
    }

    #[test]
    fn test_untouched_tree_reports_no_change() {
        let mut optimizer = Optimizer::new();
        let expr = checked("tcp.port == 1 || frame");
        assert_eq!(optimizer.optimize(expr.clone()), expr);
        assert!(!optimizer.was_simplified());
    }
}
