//! Functions module: the table of functions callable from filter expressions.
//!
//! A function maps the occurrence lists of its arguments to a new occurrence
//! list. Its argument kinds are checked once at compile time through
//! [`FilterFunction::check`]; `call` is then total.

use crate::types::{FieldType, FieldValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub trait FilterFunction: Send + Sync {
    /// Inclusive bounds on the number of arguments.
    fn arity(&self) -> (usize, usize);
    /// Result kind for the given argument kinds, or why they do not fit.
    fn check(&self, args: &[FieldType]) -> Result<FieldType, String>;
    fn call(&self, args: &[Vec<FieldValue>]) -> Vec<FieldValue>;
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn FilterFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self { functions: HashMap::new() }
    }

    /// A registry holding every built-in function.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        register_builtins(&mut reg);
        reg
    }

    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: FilterFunction + 'static,
    {
        self.functions.insert(name.into(), Arc::new(func));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn FilterFunction>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

fn expect_kind(kind: FieldType, ok: bool, what: &str) -> Result<(), String> {
    if ok {
        Ok(())
    } else {
        Err(format!("expected {what}, found {kind}"))
    }
}

/// Text of a value without the quoting `Display` adds.
fn plain_text(value: &FieldValue) -> String {
    match value {
        FieldValue::String(s) => s.clone(),
        FieldValue::AbsoluteTime(t) => t.format("%Y-%m-%d %H:%M:%S%.9f").to_string(),
        other => other.to_string(),
    }
}

macro_rules! builtin_functions {
    ($( $name:ident: $func_name:literal, ($min:expr, $max:expr), |$kinds:ident| $check:block, |$args:ident| $body:block ),* $(,)?) => {
        $(
            pub struct $name;
            impl FilterFunction for $name {
                fn arity(&self) -> (usize, usize) {
                    ($min, $max)
                }
                fn check(&self, $kinds: &[FieldType]) -> Result<FieldType, String> $check
                fn call(&self, $args: &[Vec<FieldValue>]) -> Vec<FieldValue> $body
            }
        )*
        pub fn register_builtins(reg: &mut FunctionRegistry) {
            $(reg.register($func_name, $name);)*
        }
    };
}

builtin_functions! {
    LenFunction: "len", (1, 1), |kinds| {
        expect_kind(kinds[0], kinds[0].is_byte_like(), "a byte sequence or string")?;
        Ok(FieldType::UInt32)
    }, |args| {
        args[0]
            .iter()
            .filter_map(|v| v.byte_len())
            .map(|n| FieldValue::UInt(n as u64))
            .collect()
    },
    CountFunction: "count", (1, 1), |_kinds| {
        Ok(FieldType::UInt32)
    }, |args| {
        vec![FieldValue::UInt(args[0].len() as u64)]
    },
    UpperFunction: "upper", (1, 1), |kinds| {
        expect_kind(kinds[0], kinds[0] == FieldType::String, "a string")?;
        Ok(FieldType::String)
    }, |args| {
        args[0]
            .iter()
            .filter_map(|v| match v {
                FieldValue::String(s) => Some(FieldValue::String(s.to_uppercase())),
                _ => None,
            })
            .collect()
    },
    LowerFunction: "lower", (1, 1), |kinds| {
        expect_kind(kinds[0], kinds[0] == FieldType::String, "a string")?;
        Ok(FieldType::String)
    }, |args| {
        args[0]
            .iter()
            .filter_map(|v| match v {
                FieldValue::String(s) => Some(FieldValue::String(s.to_lowercase())),
                _ => None,
            })
            .collect()
    },
    StringFunction: "string", (1, 1), |_kinds| {
        Ok(FieldType::String)
    }, |args| {
        args[0].iter().map(|v| FieldValue::String(plain_text(v))).collect()
    },
    AbsFunction: "abs", (1, 1), |kinds| {
        let ok = kinds[0].is_integer()
            || matches!(kinds[0], FieldType::Float | FieldType::RelativeTime);
        expect_kind(kinds[0], ok, "a number or relative time")?;
        Ok(kinds[0])
    }, |args| {
        args[0]
            .iter()
            .map(|v| match v {
                FieldValue::Int(n) => FieldValue::Int(n.saturating_abs()),
                FieldValue::Float(x) => FieldValue::Float(x.abs()),
                FieldValue::RelativeTime(d) => FieldValue::RelativeTime(d.abs()),
                other => other.clone(),
            })
            .collect()
    },
}
