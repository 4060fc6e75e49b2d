//! Filter module: the compile pipeline and the compiled filter handle.
//!
//! [`FilterEngine`] runs text through the lexer, parser, semantic checker,
//! optimizer and bytecode compiler. The resulting [`CompiledFilter`] is
//! immutable and can be evaluated from many threads at once.

use crate::compiler::ProgramCompiler;
use crate::config::CompileOptions;
use crate::context::{ByteRange, FieldSource};
use crate::error::CompileError;
use crate::expr::FilterExpr;
use crate::functions::FunctionRegistry;
use crate::ir::Program;
use crate::optimizer::Optimizer;
use crate::parser::FilterParser;
use crate::schema::FilterSchema;
use crate::semantic::SemanticChecker;
use crate::vm;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// Compiles `text` against `schema` with default options and the built-in
/// functions.
pub fn compile(text: &str, schema: &FilterSchema) -> Result<CompiledFilter, CompileError> {
    FilterEngine::new(schema).compile(text)
}

#[derive(Debug, Clone)]
pub struct FilterEngine<'s> {
    schema: &'s FilterSchema,
    functions: FunctionRegistry,
    options: CompileOptions,
}

impl<'s> FilterEngine<'s> {
    pub fn new(schema: &'s FilterSchema) -> Self {
        Self {
            schema,
            functions: FunctionRegistry::with_builtins(),
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the function table. Pass a registry built from
    /// [`FunctionRegistry::with_builtins`] to keep the built-ins.
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn schema(&self) -> &FilterSchema {
        self.schema
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Parses and checks `text`, returning the tree the compiler would lower.
    pub fn parse(&self, text: &str) -> Result<FilterExpr, CompileError> {
        let mut expr = FilterParser::new(text, self.schema, &self.functions)?.parse_filter()?;
        SemanticChecker::new(self.schema, &self.functions, &self.options).check(&mut expr)?;
        if self.options.optimize {
            let mut optimizer = Optimizer::new();
            expr = optimizer.optimize(expr);
            if optimizer.was_simplified() {
                trace!(expr = %expr, "simplified filter");
            }
        }
        Ok(expr)
    }

    pub fn compile(&self, text: &str) -> Result<CompiledFilter, CompileError> {
        debug!(filter = text, "compiling filter");
        let result = self.parse(text).and_then(|expr| {
            let program = ProgramCompiler::new(&self.functions).compile(&expr)?;
            Ok((expr, program))
        });
        match result {
            Ok((expr, program)) => {
                trace!(ops = program.len(), listing = %program, "compiled filter");
                Ok(CompiledFilter {
                    source: text.to_string(),
                    expr,
                    program,
                })
            }
            Err(e) => {
                debug!(filter = text, error = %e, "filter failed to compile");
                Err(e)
            }
        }
    }
}

/// A compiled filter, ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    source: String,
    expr: FilterExpr,
    program: Program,
}

impl CompiledFilter {
    /// Whether the packet whose fields `source` exposes matches the filter.
    pub fn evaluate<S: FieldSource + ?Sized>(&self, source: &S) -> bool {
        vm::execute(&self.program, source)
    }

    /// Byte ranges of the occurrences that made the filter match, empty when
    /// it does not match.
    pub fn matched_ranges<S: FieldSource + ?Sized>(&self, source: &S) -> BTreeSet<ByteRange> {
        match vm::execute_with_ranges(&self.program, source) {
            (true, ranges) => ranges,
            (false, _) => BTreeSet::new(),
        }
    }

    /// Names of every field the filter reads.
    pub fn referenced_fields(&self) -> BTreeSet<&str> {
        self.program.fields().iter().map(String::as_str).collect()
    }

    pub fn depends_on(&self, field: &str) -> bool {
        self.program.fields().iter().any(|f| f == field)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn expr(&self) -> &FilterExpr {
        &self.expr
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SliceIndexMode, StringCase};
    use crate::context::FilterContext;
    use crate::schema::FilterSchemaBuilder;
    use crate::types::{FieldType, FieldValue};

    fn schema() -> FilterSchema {
        FilterSchemaBuilder::new()
            .field("tcp.port", FieldType::UInt16)
            .field("http.host", FieldType::String)
            .field("frame", FieldType::Bytes)
            .build()
    }

    fn context(schema: &FilterSchema) -> FilterContext {
        let mut ctx = FilterContext::new();
        ctx.set("tcp.port", FieldValue::UInt(80), Some(ByteRange::new(34, 2)), schema).unwrap();
        ctx.set("http.host", FieldValue::String("Example.com".into()), Some(ByteRange::new(60, 11)), schema)
            .unwrap();
        ctx
    }

    #[test]
    fn test_compiled_filter_evaluate() {
        let schema = schema();
        let ctx = context(&schema);
        assert!(compile("tcp.port == 80", &schema).unwrap().evaluate(&ctx));
        assert!(!compile("tcp.port == 443", &schema).unwrap().evaluate(&ctx));
        assert!(compile("tcp.port == \"80\"", &schema).unwrap().evaluate(&ctx));
    }

    #[test]
    fn test_matched_ranges() {
        let schema = schema();
        let ctx = context(&schema);
        let filter = compile("tcp.port == 80 && http.host contains \"com\"", &schema).unwrap();
        let ranges: Vec<_> = filter.matched_ranges(&ctx).into_iter().collect();
        assert_eq!(ranges, vec![ByteRange::new(34, 2), ByteRange::new(60, 11)]);

        let filter = compile("tcp.port == 443 || frame", &schema).unwrap();
        assert!(filter.matched_ranges(&ctx).is_empty());
    }

    #[test]
    fn test_referenced_fields() {
        let schema = schema();
        let filter = compile("tcp.port == 80 || (http.host && tcp.port > 1)", &schema).unwrap();
        assert_eq!(
            filter.referenced_fields().into_iter().collect::<Vec<_>>(),
            vec!["http.host", "tcp.port"]
        );
        assert!(filter.depends_on("tcp.port"));
        assert!(!filter.depends_on("frame"));
        assert_eq!(filter.source(), "tcp.port == 80 || (http.host && tcp.port > 1)");
    }

    #[test]
    fn test_engine_options() {
        let schema = schema();
        let ctx = context(&schema);
        let sensitive = FilterEngine::new(&schema).compile("http.host == \"example.com\"").unwrap();
        assert!(!sensitive.evaluate(&ctx));
        let insensitive = FilterEngine::new(&schema)
            .with_options(CompileOptions::new().string_case(StringCase::Insensitive))
            .compile("http.host == \"example.com\"")
            .unwrap();
        assert!(insensitive.evaluate(&ctx));

        let reject = FilterEngine::new(&schema)
            .with_options(CompileOptions::new().slice_indices(SliceIndexMode::Reject));
        assert!(matches!(reject.compile("frame[0:-1] == 00"), Err(CompileError::Range { .. })));
    }

    #[test]
    fn test_unoptimized_keeps_tree() {
        let schema = schema();
        let engine = FilterEngine::new(&schema).with_options(CompileOptions::new().optimize(false));
        assert!(matches!(engine.parse("!!frame").unwrap(), FilterExpr::Not { .. }));
        assert!(matches!(FilterEngine::new(&schema).parse("!!frame").unwrap(), FilterExpr::Exists { .. }));
    }

    #[test]
    fn test_custom_functions_replace_builtins() {
        let schema = schema();
        let engine = FilterEngine::new(&schema).with_functions(FunctionRegistry::new());
        assert!(matches!(engine.compile("len(frame) > 1"), Err(CompileError::Syntax { .. })));
    }
}
