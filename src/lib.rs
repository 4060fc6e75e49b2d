//! dfilter: a display-filter compiler and evaluator for dissected packets.
//!
//! Filters such as `ip.addr == 10.0.0.0/8 && tcp.port in {80 443}` are
//! compiled once against a registry of typed fields and then evaluated
//! against each packet's field occurrences.
//!
//! # Architecture
//! - Lexer and parser (text to AST, fields resolved against the registry)
//! - Semantic checker (types, literal reparsing, slice and set validation)
//! - Optimizer (constant folding, flattening, double negation)
//! - Bytecode compiler and stack VM (existential multi-occurrence semantics)
//!
//! ```
//! use dfilter::{compile, FieldType, FieldValue, FilterContext, FilterSchemaBuilder};
//!
//! let schema = FilterSchemaBuilder::new()
//!     .field("tcp.port", FieldType::UInt16)
//!     .build();
//! let filter = compile("tcp.port == 80", &schema).unwrap();
//!
//! let mut packet = FilterContext::new();
//! packet.set("tcp.port", FieldValue::UInt(80), None, &schema).unwrap();
//! assert!(filter.evaluate(&packet));
//! ```

mod compiler;
mod config;
mod context;
mod error;
mod expr;
mod filter;
mod functions;
mod ir;
mod lexer;
mod optimizer;
mod parser;
mod schema;
mod semantic;
mod types;
mod vm;

pub use compiler::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use expr::*;
pub use filter::*;
pub use functions::*;
pub use ir::*;
pub use lexer::*;
pub use optimizer::*;
pub use parser::*;
pub use schema::*;
pub use semantic::*;
pub use types::*;
pub use vm::{execute, execute_with_ranges};
