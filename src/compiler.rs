//! Compiler module: lowers a checked filter expression into a [`Program`].
//!
//! Operands compile to pushes, tests to the instruction that pops them.
//! `&&`/`||` chains compile to short-circuit jumps: every `And`/`Or` in a
//! chain jumps to the end of the chain, leaving the deciding boolean on top.

use crate::error::CompileError;
use crate::expr::{ComparisonOp, FilterExpr, Literal, LogicalOp, Operand};
use crate::functions::FunctionRegistry;
use crate::ir::{Instruction, Program, ProgramBuilder};

pub struct ProgramCompiler<'a> {
    functions: &'a FunctionRegistry,
}

impl<'a> ProgramCompiler<'a> {
    pub fn new(functions: &'a FunctionRegistry) -> Self {
        Self { functions }
    }

    pub fn compile(&self, expr: &FilterExpr) -> Result<Program, CompileError> {
        let mut builder = ProgramBuilder::new();
        self.compile_expr(expr, &mut builder)?;
        builder.emit(Instruction::Return);
        Ok(builder.build())
    }

    fn compile_expr(&self, expr: &FilterExpr, builder: &mut ProgramBuilder) -> Result<(), CompileError> {
        match expr {
            FilterExpr::LogicalOp { op, operands, .. } => {
                let mut jumps = Vec::with_capacity(operands.len());
                for (i, operand) in operands.iter().enumerate() {
                    self.compile_expr(operand, builder)?;
                    if i > 0 {
                        builder.emit(match op {
                            LogicalOp::And => Instruction::AndFinalize,
                            LogicalOp::Or => Instruction::OrFinalize,
                        });
                    }
                    if i + 1 < operands.len() {
                        jumps.push(builder.position());
                        // placeholder, patched below
                        builder.emit(match op {
                            LogicalOp::And => Instruction::And(0),
                            LogicalOp::Or => Instruction::Or(0),
                        });
                    }
                }
                let end = builder.position();
                for pos in jumps {
                    builder.patch_jump(pos, end);
                }
            }
            FilterExpr::Not { operand, .. } => {
                self.compile_expr(operand, builder)?;
                builder.emit(Instruction::Not);
            }
            FilterExpr::Constant { value, .. } => builder.emit(Instruction::PushBool(*value)),
            FilterExpr::Exists { operand, .. } => {
                self.compile_operand(operand, builder)?;
                builder.emit(Instruction::Exists);
            }
            FilterExpr::Comparison {
                left,
                op: ComparisonOp::Matches,
                right,
                ..
            } => {
                let Operand::Literal { value: Literal::Pattern(pattern), .. } = right else {
                    return Err(CompileError::type_mismatch(
                        "the right side of 'matches' must be a pattern",
                        right.location(),
                    ));
                };
                self.compile_operand(left, builder)?;
                let id = builder.add_pattern(pattern);
                builder.emit(Instruction::Matches(id));
            }
            FilterExpr::Comparison {
                left,
                op,
                right,
                ignore_case,
                ..
            } => {
                self.compile_operand(left, builder)?;
                self.compile_operand(right, builder)?;
                builder.emit(Instruction::Compare {
                    op: *op,
                    ignore_case: *ignore_case,
                });
            }
            FilterExpr::Membership {
                operand,
                set,
                ignore_case,
                ..
            } => {
                self.compile_operand(operand, builder)?;
                let id = builder.add_set(set);
                builder.emit(Instruction::InSet {
                    set: id,
                    ignore_case: *ignore_case,
                });
            }
        }
        Ok(())
    }

    fn compile_operand(&self, operand: &Operand, builder: &mut ProgramBuilder) -> Result<(), CompileError> {
        match operand {
            Operand::Field { field, .. } => {
                let id = builder.add_field(&field.name);
                builder.emit(Instruction::ReadField(id));
            }
            Operand::Literal { value: Literal::Value(value), .. } => {
                let id = builder.add_constant(value);
                builder.emit(Instruction::PushConst(id));
            }
            Operand::Literal { value, location } => {
                return Err(CompileError::type_mismatch(
                    format!("literal {value} was not resolved to a value"),
                    *location,
                ))
            }
            Operand::Slice { base, ranges, .. } => {
                self.compile_operand(base, builder)?;
                let id = builder.add_slice(ranges);
                builder.emit(Instruction::Slice(id));
            }
            Operand::FunctionCall { name, args, location } => {
                let function = self.functions.get(name).ok_or_else(|| {
                    CompileError::syntax(format!("function '{name}' does not exist"), *location)
                })?;
                for arg in args {
                    self.compile_operand(arg, builder)?;
                }
                let id = builder.add_function(name, function);
                builder.emit(Instruction::Call {
                    function: id,
                    argc: args.len(),
                });
            }
            Operand::BitAnd { left, right, .. } => {
                self.compile_operand(left, builder)?;
                self.compile_operand(right, builder)?;
                builder.emit(Instruction::BitAnd);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::optimizer::Optimizer;
    use crate::parser::FilterParser;
    use crate::schema::{FilterSchema, FilterSchemaBuilder};
    use crate::semantic::SemanticChecker;
    use crate::types::{FieldType, FieldValue};

    fn schema() -> FilterSchema {
        FilterSchemaBuilder::new()
            .field("tcp.port", FieldType::UInt16)
            .field("ip.addr", FieldType::Ipv4)
            .field("frame", FieldType::Bytes)
            .build()
    }

    fn compile(input: &str) -> Program {
        compile_with(input, false)
    }

    fn compile_with(input: &str, optimize: bool) -> Program {
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
        if optimize {
            expr = Optimizer::new().optimize(expr);
        }
        ProgramCompiler::new(&functions).compile(&expr).unwrap()
    }

    #[test]
    fn test_compile_comparison() {
        let program = compile("tcp.port == 80");
        assert_eq!(
            program.ops(),
            [
                Instruction::ReadField(0),
                Instruction::PushConst(0),
                Instruction::Compare { op: ComparisonOp::Eq, ignore_case: false },
                Instruction::Return,
            ]
        );
        assert_eq!(program.constants(), [FieldValue::UInt(80)]);
    }

    #[test]
    fn test_compile_short_circuit_chain() {
        // flattened by the optimizer into one three-operand chain
        let program = compile_with("(tcp.port == 1 || tcp.port == 2) || frame", true);
        let ops = program.ops();
        let end = ops.len() - 1;
        let targets: Vec<usize> = ops
            .iter()
            .filter_map(|op| match op {
                Instruction::Or(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec![end, end]);
        assert_eq!(ops.iter().filter(|op| **op == Instruction::OrFinalize).count(), 2);
    }

    #[test]
    fn test_nested_chain_jumps_to_inner_end() {
        let program = compile("(tcp.port == 1 || tcp.port == 2) || frame");
        let ops = program.ops();
        let targets: Vec<usize> = ops
            .iter()
            .filter_map(|op| match op {
                Instruction::Or(t) => Some(*t),
                _ => None,
            })
            .collect();
        // the inner chain ends at its OrFinalize, the outer one at Return
        assert_eq!(targets.len(), 2);
        assert_eq!(ops[targets[0] - 1], Instruction::OrFinalize);
        assert_eq!(targets[1], ops.len() - 1);
    }

    #[test]
    fn test_constants_and_fields_shared() {
        let program = compile("tcp.port == 80 || (tcp.port == 80 && ip.addr == 10.0.0.1)");
        assert_eq!(program.fields(), ["tcp.port", "ip.addr"]);
        assert_eq!(program.constants().len(), 2);
    }

    #[test]
    fn test_compile_slice_set_and_call() {
        let program = compile("frame[0:2] == 45:00 && tcp.port in {80, 443} && len(frame) > 20");
        let ops = program.ops();
        assert!(ops.contains(&Instruction::Slice(0)));
        assert!(ops.contains(&Instruction::InSet { set: 0, ignore_case: false }));
        assert!(ops.contains(&Instruction::Call { function: 0, argc: 1 }));
        assert_eq!(program.fields(), ["frame", "tcp.port"]);
    }

    #[test]
    fn test_unresolved_literal_rejected() {
        let schema = schema();
        let functions = FunctionRegistry::with_builtins();
        // skip semantic analysis on purpose
        let expr = FilterParser::new("tcp.port == 80", &schema, &functions)
            .unwrap()
            .parse_filter()
            .unwrap();
        let err = ProgramCompiler::new(&functions).compile(&expr).unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }
}
