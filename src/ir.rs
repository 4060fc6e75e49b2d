//! Intermediate Representation (IR) for the filter engine.
//!
//! A [`Program`] is a linear instruction sequence for a stack machine plus
//! the pools its instructions index into: constants, sets, slice specs,
//! patterns, functions and referenced field names. Programs are immutable
//! once built and may be shared between threads.

use crate::expr::{ComparisonOp, Pattern, SetElement, SliceRange};
use crate::functions::FilterFunction;
use crate::types::FieldValue;
use std::fmt;
use std::sync::Arc;

/// A single instruction in the filter bytecode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    /// Push the occurrences of a referenced field.
    ReadField(usize),
    PushConst(usize),
    PushBool(bool),
    /// Replace the operand on top with the bytes a slice spec selects.
    Slice(usize),
    /// Pop a mask and an operand, push their bitwise and.
    BitAnd,
    Call { function: usize, argc: usize },
    /// Pop two operands, push whether any pair satisfies `op`.
    Compare { op: ComparisonOp, ignore_case: bool },
    Matches(usize),
    InSet { set: usize, ignore_case: bool },
    /// Pop an operand, push whether it has any occurrence.
    Exists,
    Not,
    /// If the boolean on top is false, jump to the target.
    And(usize),
    /// Pop two booleans, push their conjunction.
    AndFinalize,
    /// If the boolean on top is true, jump to the target.
    Or(usize),
    OrFinalize,
    Return,
}

impl Instruction {
    fn stack_effect(&self) -> isize {
        match self {
            Instruction::ReadField(_) | Instruction::PushConst(_) | Instruction::PushBool(_) => 1,
            Instruction::Call { argc, .. } => 1 - *argc as isize,
            Instruction::BitAnd
            | Instruction::Compare { .. }
            | Instruction::AndFinalize
            | Instruction::OrFinalize => -1,
            Instruction::Return => -1,
            _ => 0,
        }
    }
}

#[derive(Clone)]
pub struct Program {
    ops: Vec<Instruction>,
    constants: Vec<FieldValue>,
    sets: Vec<Vec<SetElement>>,
    slices: Vec<Vec<SliceRange>>,
    patterns: Vec<Pattern>,
    functions: Vec<(String, Arc<dyn FilterFunction>)>,
    fields: Vec<String>,
    max_stack_depth: usize,
}

impl Program {
    pub fn ops(&self) -> &[Instruction] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Maximum stack depth needed, for pre-allocation.
    pub fn max_stack_depth(&self) -> usize {
        self.max_stack_depth
    }

    /// Names of every field the program reads, in first-use order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn constants(&self) -> &[FieldValue] {
        &self.constants
    }

    pub(crate) fn field(&self, id: usize) -> &str {
        &self.fields[id]
    }

    pub(crate) fn constant(&self, id: usize) -> &FieldValue {
        &self.constants[id]
    }

    pub(crate) fn set(&self, id: usize) -> &[SetElement] {
        &self.sets[id]
    }

    pub(crate) fn slice(&self, id: usize) -> &[SliceRange] {
        &self.slices[id]
    }

    pub(crate) fn pattern(&self, id: usize) -> &Pattern {
        &self.patterns[id]
    }

    pub(crate) fn function(&self, id: usize) -> &dyn FilterFunction {
        self.functions[id].1.as_ref()
    }

    fn compute_stack_depth(ops: &[Instruction]) -> usize {
        let mut depth: isize = 0;
        let mut max_depth: isize = 0;
        for op in ops {
            depth += op.stack_effect();
            max_depth = max_depth.max(depth);
        }
        (max_depth as usize).max(1)
    }

    /// Listing of the program, one instruction per line.
    pub fn disassemble(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pc, op) in self.ops.iter().enumerate() {
            write!(f, "{pc:04}: ")?;
            match *op {
                Instruction::ReadField(id) => write!(f, "ReadField {}", self.fields[id])?,
                Instruction::PushConst(id) => write!(f, "PushConst {}", self.constants[id])?,
                Instruction::PushBool(b) => write!(f, "PushBool {b}")?,
                Instruction::Slice(id) => {
                    let ranges: Vec<String> = self.slices[id].iter().map(|r| r.to_string()).collect();
                    write!(f, "Slice [{}]", ranges.join(", "))?
                }
                Instruction::Call { function, argc } => {
                    write!(f, "Call {}/{argc}", self.functions[function].0)?
                }
                Instruction::Compare { op, ignore_case: true } => write!(f, "Compare {op} (nocase)")?,
                Instruction::Compare { op, .. } => write!(f, "Compare {op}")?,
                Instruction::Matches(id) => write!(f, "Matches {:?}", self.patterns[id].source())?,
                Instruction::InSet { set, .. } => {
                    let elements: Vec<String> = self.sets[set].iter().map(|e| e.to_string()).collect();
                    write!(f, "InSet {{{}}}", elements.join(", "))?
                }
                Instruction::And(target) => write!(f, "And -> {target:04}")?,
                Instruction::Or(target) => write!(f, "Or -> {target:04}")?,
                other => write!(f, "{other:?}")?,
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("ops", &self.ops)
            .field("constants", &self.constants)
            .field("fields", &self.fields)
            .field("max_stack_depth", &self.max_stack_depth)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing programs
#[derive(Default)]
pub struct ProgramBuilder {
    ops: Vec<Instruction>,
    constants: Vec<FieldValue>,
    sets: Vec<Vec<SetElement>>,
    slices: Vec<Vec<SliceRange>>,
    patterns: Vec<Pattern>,
    functions: Vec<(String, Arc<dyn FilterFunction>)>,
    fields: Vec<String>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            ops: Vec::with_capacity(32),
            ..Self::default()
        }
    }

    #[inline]
    pub fn emit(&mut self, op: Instruction) {
        self.ops.push(op);
    }

    /// Current position, for jump targets.
    #[inline]
    pub fn position(&self) -> usize {
        self.ops.len()
    }

    pub fn patch_jump(&mut self, pos: usize, target: usize) {
        if let Some(Instruction::And(t) | Instruction::Or(t)) = self.ops.get_mut(pos) {
            *t = target;
        }
    }

    /// Pool index of `value`; identical values share one slot.
    pub fn add_constant(&mut self, value: &FieldValue) -> usize {
        if let Some(id) = self.constants.iter().position(|c| c.identical(value)) {
            return id;
        }
        self.constants.push(value.clone());
        self.constants.len() - 1
    }

    pub fn add_field(&mut self, name: &str) -> usize {
        if let Some(id) = self.fields.iter().position(|f| f == name) {
            return id;
        }
        self.fields.push(name.to_string());
        self.fields.len() - 1
    }

    pub fn add_set(&mut self, set: &[SetElement]) -> usize {
        self.sets.push(set.to_vec());
        self.sets.len() - 1
    }

    pub fn add_slice(&mut self, ranges: &[SliceRange]) -> usize {
        if let Some(id) = self.slices.iter().position(|s| s.as_slice() == ranges) {
            return id;
        }
        self.slices.push(ranges.to_vec());
        self.slices.len() - 1
    }

    pub fn add_pattern(&mut self, pattern: &Pattern) -> usize {
        if let Some(id) = self.patterns.iter().position(|p| p == pattern) {
            return id;
        }
        self.patterns.push(pattern.clone());
        self.patterns.len() - 1
    }

    pub fn add_function(&mut self, name: &str, function: &Arc<dyn FilterFunction>) -> usize {
        if let Some(id) = self.functions.iter().position(|(n, _)| n == name) {
            return id;
        }
        self.functions.push((name.to_string(), Arc::clone(function)));
        self.functions.len() - 1
    }

    pub fn build(self) -> Program {
        let max_stack_depth = Program::compute_stack_depth(&self.ops);
        Program {
            ops: self.ops,
            constants: self.constants,
            sets: self.sets,
            slices: self.slices,
            patterns: self.patterns,
            functions: self.functions,
            fields: self.fields,
            max_stack_depth,
        }
    }
}
