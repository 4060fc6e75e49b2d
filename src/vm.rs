//! Filter virtual machine.
//!
//! Executes a [`Program`] against the fields of one packet. Operand slots
//! hold every occurrence of a value, and each test is existential: it holds
//! when any occurrence (or any pair of occurrences) satisfies it. Boolean
//! slots may carry the byte ranges that made them true, for highlighting.
//!
//! Execution is linear with forward jumps only, so it always terminates.

use crate::context::{ByteRange, FieldSource};
use crate::ir::{Instruction, Program};
use crate::types::FieldValue;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::BTreeSet;
use tracing::trace;

const STACK_INLINE_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
struct Occurrence<'v> {
    value: Cow<'v, FieldValue>,
    range: Option<ByteRange>,
}

type Occurrences<'v> = SmallVec<[Occurrence<'v>; 4]>;
type Ranges = SmallVec<[ByteRange; 4]>;

#[derive(Debug)]
enum Slot<'v> {
    Values(Occurrences<'v>),
    Bool { value: bool, ranges: Ranges },
}

impl Slot<'_> {
    fn truth(value: bool, ranges: Ranges) -> Self {
        if value {
            Slot::Bool { value, ranges }
        } else {
            Slot::Bool { value, ranges: Ranges::new() }
        }
    }
}

/// Runs `program` against `source`, returning whether the filter matches.
pub fn execute<S: FieldSource + ?Sized>(program: &Program, source: &S) -> bool {
    Machine::new(program, source, false).run().0
}

/// Runs `program` against `source` and also gathers the byte ranges of the
/// occurrences that made the filter true. `||` evaluates every branch so
/// that all matching ranges are reported.
pub fn execute_with_ranges<S: FieldSource + ?Sized>(
    program: &Program,
    source: &S,
) -> (bool, BTreeSet<ByteRange>) {
    let (value, ranges) = Machine::new(program, source, true).run();
    (value, ranges.into_iter().collect())
}

struct Machine<'v, S: ?Sized> {
    program: &'v Program,
    source: &'v S,
    collect: bool,
    stack: SmallVec<[Slot<'v>; STACK_INLINE_CAPACITY]>,
}

impl<'v, S: FieldSource + ?Sized> Machine<'v, S> {
    fn new(program: &'v Program, source: &'v S, collect: bool) -> Self {
        let mut stack = SmallVec::new();
        stack.reserve(program.max_stack_depth());
        Self {
            program,
            source,
            collect,
            stack,
        }
    }

    fn run(mut self) -> (bool, Ranges) {
        let program = self.program;
        let source = self.source;
        let ops = program.ops();
        let mut pc = 0;
        while pc < ops.len() {
            match ops[pc] {
                Instruction::ReadField(id) => {
                    let values = source
                        .occurrences(program.field(id))
                        .iter()
                        .map(|o| Occurrence {
                            value: Cow::Borrowed(&o.value),
                            range: o.range,
                        })
                        .collect();
                    self.stack.push(Slot::Values(values));
                }
                Instruction::PushConst(id) => {
                    let mut values = Occurrences::new();
                    values.push(Occurrence {
                        value: Cow::Borrowed(program.constant(id)),
                        range: None,
                    });
                    self.stack.push(Slot::Values(values));
                }
                Instruction::PushBool(value) => {
                    self.stack.push(Slot::truth(value, Ranges::new()));
                }
                Instruction::Slice(id) => {
                    let values = self.pop_values();
                    let sliced = self.slice(values, id);
                    self.stack.push(Slot::Values(sliced));
                }
                Instruction::BitAnd => {
                    let masks = self.pop_values();
                    let values = self.pop_values();
                    let mut result = Occurrences::new();
                    for left in &values {
                        for mask in &masks {
                            if let Some(value) = left.value.bitand(&mask.value) {
                                result.push(Occurrence {
                                    value: Cow::Owned(value),
                                    range: left.range,
                                });
                            }
                        }
                    }
                    self.stack.push(Slot::Values(result));
                }
                Instruction::Call { function, argc } => {
                    let at = self.stack.len().checked_sub(argc).unwrap_or_else(|| {
                        panic!("internal error: stack underflow calling function {function}")
                    });
                    let args: Vec<Vec<FieldValue>> = self
                        .stack
                        .drain(at..)
                        .map(|slot| match slot {
                            Slot::Values(values) => {
                                values.into_iter().map(|o| o.value.into_owned()).collect()
                            }
                            Slot::Bool { .. } => {
                                panic!("internal error: boolean passed as a function argument")
                            }
                        })
                        .collect();
                    let result = program
                        .function(function)
                        .call(&args)
                        .into_iter()
                        .map(|value| Occurrence {
                            value: Cow::Owned(value),
                            range: None,
                        })
                        .collect();
                    self.stack.push(Slot::Values(result));
                }
                Instruction::Compare { op, ignore_case } => {
                    let right = self.pop_values();
                    let left = self.pop_values();
                    let mut ranges = Ranges::new();
                    let mut found = false;
                    'outer: for l in &left {
                        for r in &right {
                            if op.apply(&l.value, &r.value, ignore_case) {
                                found = true;
                                if !self.collect {
                                    break 'outer;
                                }
                                ranges.extend(l.range);
                                ranges.extend(r.range);
                            }
                        }
                    }
                    self.stack.push(Slot::truth(found, ranges));
                }
                Instruction::Matches(id) => {
                    let pattern = program.pattern(id);
                    let values = self.pop_values();
                    let slot = self.any(values, |value| {
                        value.as_bytes().is_some_and(|bytes| pattern.is_match(&bytes))
                    });
                    self.stack.push(slot);
                }
                Instruction::InSet { set, ignore_case } => {
                    let elements = program.set(set);
                    let values = self.pop_values();
                    let slot = self.any(values, |value| {
                        elements.iter().any(|e| e.contains(value, ignore_case))
                    });
                    self.stack.push(slot);
                }
                Instruction::Exists => {
                    let values = self.pop_values();
                    let slot = self.any(values, |_| true);
                    self.stack.push(slot);
                }
                Instruction::Not => {
                    let (value, _) = self.pop_bool();
                    self.stack.push(Slot::truth(!value, Ranges::new()));
                }
                Instruction::And(target) => {
                    if !self.peek_bool() {
                        pc = target;
                        continue;
                    }
                }
                Instruction::Or(target) => {
                    if !self.collect && self.peek_bool() {
                        pc = target;
                        continue;
                    }
                }
                Instruction::AndFinalize => {
                    let (b, b_ranges) = self.pop_bool();
                    let (a, mut ranges) = self.pop_bool();
                    ranges.extend(b_ranges);
                    self.stack.push(Slot::truth(a && b, ranges));
                }
                Instruction::OrFinalize => {
                    let (b, b_ranges) = self.pop_bool();
                    let (a, mut ranges) = self.pop_bool();
                    // false slots never carry ranges
                    ranges.extend(b_ranges);
                    self.stack.push(Slot::truth(a || b, ranges));
                }
                Instruction::Return => return self.pop_bool(),
            }
            pc += 1;
        }
        self.pop_bool()
    }

    /// Existential test over one operand, gathering the ranges of every
    /// satisfying occurrence when collecting.
    fn any(&self, values: Occurrences<'v>, test: impl Fn(&FieldValue) -> bool) -> Slot<'v> {
        let mut ranges = Ranges::new();
        let mut found = false;
        for occurrence in &values {
            if test(&occurrence.value) {
                found = true;
                if !self.collect {
                    break;
                }
                ranges.extend(occurrence.range);
            }
        }
        Slot::truth(found, ranges)
    }

    fn slice(&self, values: Occurrences<'v>, id: usize) -> Occurrences<'v> {
        let spec = self.program.slice(id);
        let mut sliced = Occurrences::new();
        'occurrences: for occurrence in values {
            let Some(bytes) = occurrence.value.as_bytes() else {
                continue;
            };
            let mut out = Vec::new();
            let mut span: Option<(usize, usize)> = None;
            for range in spec {
                let Some(r) = range.resolve(bytes.len()) else {
                    trace!(range = %range, len = bytes.len(), "slice out of bounds, occurrence dropped");
                    continue 'occurrences;
                };
                span = Some(match span {
                    Some((lo, hi)) => (lo.min(r.start), hi.max(r.end)),
                    None => (r.start, r.end),
                });
                out.extend_from_slice(&bytes[r]);
            }
            // narrow only when the packet range maps byte for byte onto the value
            let range = match (occurrence.range, span) {
                (Some(full), Some((lo, hi))) if full.len == bytes.len() => Some(full.narrow(lo..hi)),
                (range, _) => range,
            };
            sliced.push(Occurrence {
                value: Cow::Owned(FieldValue::Bytes(out)),
                range,
            });
        }
        sliced
    }

    fn pop_values(&mut self) -> Occurrences<'v> {
        match self.stack.pop() {
            Some(Slot::Values(values)) => values,
            other => panic!("internal error: expected operand on the stack, found {other:?}"),
        }
    }

    fn pop_bool(&mut self) -> (bool, Ranges) {
        match self.stack.pop() {
            Some(Slot::Bool { value, ranges }) => (value, ranges),
            other => panic!("internal error: expected boolean on the stack, found {other:?}"),
        }
    }

    fn peek_bool(&self) -> bool {
        match self.stack.last() {
            Some(Slot::Bool { value, .. }) => *value,
            other => panic!("internal error: expected boolean on the stack, found {other:?}"),
        }
    }
}
