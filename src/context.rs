//! Context module: the per-packet field occurrences a filter is evaluated against.
//!
//! The VM reads fields through the [`FieldSource`] trait, so a dissection tree
//! can be filtered directly. [`FilterContext`] is the owned implementation.

use crate::error::ContextError;
use crate::schema::FilterSchema;
use crate::types::FieldValue;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Span of packet bytes an occurrence was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub len: usize,
}

impl ByteRange {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// The part of this range covered by `sub`, relative to its start.
    pub fn narrow(&self, sub: Range<usize>) -> ByteRange {
        ByteRange::new(self.start + sub.start, sub.len())
    }
}

/// One appearance of a field in a packet.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOccurrence {
    pub value: FieldValue,
    pub range: Option<ByteRange>,
}

impl FieldOccurrence {
    pub fn new(value: FieldValue, range: Option<ByteRange>) -> Self {
        Self { value, range }
    }
}

/// Read-only view of the fields dissected from one packet.
pub trait FieldSource {
    /// Occurrences of `field` in packet order; empty when it is absent.
    fn occurrences(&self, field: &str) -> &[FieldOccurrence];
}

#[derive(Debug, Clone, Default)]
pub struct FilterContext {
    values: FxHashMap<String, Vec<FieldOccurrence>>,
}

impl FilterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an occurrence after checking the field and its kind against
    /// the registry.
    pub fn set(
        &mut self,
        field: &str,
        value: FieldValue,
        range: Option<ByteRange>,
        schema: &FilterSchema,
    ) -> Result<(), ContextError> {
        let expected = schema
            .get_field_type(field)
            .ok_or_else(|| ContextError::UnknownField(field.to_string()))?;
        if !value.conforms_to(expected) {
            return Err(ContextError::TypeMismatch {
                field: field.to_string(),
                expected: expected.to_string(),
                actual: value.kind_name().to_string(),
            });
        }
        self.add(field, value, range);
        Ok(())
    }

    /// Appends an occurrence without consulting the registry.
    pub fn add(&mut self, field: &str, value: FieldValue, range: Option<ByteRange>) {
        self.values
            .entry(field.to_string())
            .or_default()
            .push(FieldOccurrence::new(value, range));
    }

    pub fn get(&self, field: &str) -> &[FieldOccurrence] {
        self.values.get(field).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.get(field).is_some_and(|v| !v.is_empty())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops all occurrences so the context can be reused for the next packet.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl FieldSource for FilterContext {
    fn occurrences(&self, field: &str) -> &[FieldOccurrence] {
        self.get(field)
    }
}

impl<S: FieldSource + ?Sized> FieldSource for &S {
    fn occurrences(&self, field: &str) -> &[FieldOccurrence] {
        (**self).occurrences(field)
    }
}
