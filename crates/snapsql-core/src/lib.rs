//! Template tokenizer, staged parser, and intermediate-instruction
//! emitter. This crate has no I/O: callers supply template text, a
//! parameter schema, constants, and a target dialect, and receive back a
//! compiled `IntermediateFormat` or a diagnostic error.

pub mod ast;
pub mod emitter;
pub mod errors;
pub mod expr;
pub mod ir;
pub mod parser;
pub mod schema;
pub mod tokenizer;

use snapsql_helpers::CancellationToken;

pub use errors::{CompileDiagnostic, CompileError, DiagnosticSink, ErrorKind, SnapSqlError};
pub use ir::{Dialect, IntermediateFormat};
pub use schema::{Constants, FunctionDefinition, ParamType};

/// The core's own config surface for a compile call: the target dialect
/// plus a caller-supplied cancellation token (spec.md §6, §5
/// "Cancellation"). Populated by the caller, never read from disk by
/// this crate.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub dialect: Dialect,
    pub cancellation: CancellationToken,
}

impl CompileOptions {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Compiles `template` against `schema` and `constants` for `dialect`.
///
/// Runs the tokenizer, all six parser stages in order (stopping at the
/// first stage that reports diagnostics, per spec.md §7 band 2), and the
/// intermediate emitter.
pub fn compile(
    template: &str,
    schema: &FunctionDefinition,
    constants: &Constants,
    dialect: Dialect,
) -> Result<IntermediateFormat, SnapSqlError> {
    compile_with_options(template, schema, constants, &CompileOptions::new(dialect))
}

/// Same as [`compile`] but takes the full [`CompileOptions`], checking
/// the cancellation token between pipeline stages.
pub fn compile_with_options(
    template: &str,
    schema: &FunctionDefinition,
    constants: &Constants,
    options: &CompileOptions,
) -> Result<IntermediateFormat, SnapSqlError> {
    tracing::debug!(dialect = ?options.dialect, len = template.len(), "compiling template");
    let tokens = tokenizer::tokenize(template)?;
    if options.cancellation.is_cancelled() {
        tracing::warn!("compile cancelled after tokenization");
        return Err(SnapSqlError::Cancelled);
    }

    parser::stage1::run(&tokens)?;
    let statement = parser::stage2::run(&tokens)?;
    if options.cancellation.is_cancelled() {
        tracing::warn!("compile cancelled after statement framing");
        return Err(SnapSqlError::Cancelled);
    }
    parser::stage3::run(&statement, &tokens)?;
    let mut statement = parser::stage4::run(statement, &tokens)?;
    let dummies = parser::stage5::run(&mut statement, &tokens);
    parser::stage6::run(&tokens, schema, constants)?;
    if options.cancellation.is_cancelled() {
        tracing::warn!("compile cancelled after semantic validation");
        return Err(SnapSqlError::Cancelled);
    }

    let ir = emitter::emit(&statement, &tokens, &dummies, options.dialect);
    tracing::debug!(instructions = ir.instructions.len(), "compiled template");
    Ok(ir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::OpCode;

    #[test]
    fn simple_select_with_conditional_where_compiles() {
        let template =
            "SELECT id, name FROM users /*# if active != null */WHERE active = /*= active */true/*# end */";
        let schema = FunctionDefinition::new().with_parameter("active", ParamType::Bool);
        let constants = Constants::default();
        let ir = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
        assert!(ir.check_balanced());
        assert!(ir.check_expr_indices_valid());
        assert!(ir.instructions.iter().any(|op| matches!(op, OpCode::If { .. })));
        assert!(ir
            .instructions
            .iter()
            .any(|op| matches!(op, OpCode::AddParam { .. })));
    }

    #[test]
    fn implicit_limit_guard_compiles() {
        let template = "SELECT id FROM t LIMIT /*= limit */10";
        let schema = FunctionDefinition::new().with_parameter("limit", ParamType::Int);
        let constants = Constants::default();
        let ir = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
        assert!(ir.check_balanced());
    }

    #[test]
    fn bare_asterisk_is_rejected() {
        let template = "SELECT * FROM users";
        let schema = FunctionDefinition::new();
        let constants = Constants::default();
        let err = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap_err();
        match err {
            SnapSqlError::Compile(e) => {
                assert_eq!(e.diagnostics[0].kind, ErrorKind::AsteriskInSelect);
            }
            other => panic!("expected a compile error, got {other:?}"),
        }
    }

    #[test]
    fn loop_with_trailing_comma_suppression_compiles() {
        let template = "SELECT /*# for f in fields */ /*$ f */col,/*# end */ 1 FROM t";
        let schema =
            FunctionDefinition::new().with_parameter("fields", ParamType::List(Box::new(ParamType::Str)));
        let constants = Constants::default();
        let ir = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
        assert!(ir
            .instructions
            .iter()
            .any(|op| matches!(op, OpCode::LoopStart { .. })));
        assert!(ir.instructions.iter().any(|op| matches!(op, OpCode::LoopEnd)));
    }

    #[test]
    fn undefined_parameter_is_rejected() {
        let template = "SELECT id FROM t /*# if missing != null */WHERE x = 1/*# end */";
        let schema = FunctionDefinition::new();
        let constants = Constants::default();
        let err = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap_err();
        match err {
            SnapSqlError::Compile(e) => {
                assert!(e.diagnostics.iter().any(|d| d.kind == ErrorKind::UndefinedParameter));
            }
            other => panic!("expected a compile error, got {other:?}"),
        }
    }
}
