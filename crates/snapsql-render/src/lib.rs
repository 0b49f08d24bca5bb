//! The dialect optimizer and renderer: walks an `IntermediateFormat`
//! opcode stream with a parameter map to produce SQL text plus an
//! ordered argument vector (spec.md §4.9).
//!
//! This crate has no I/O of its own: it consumes what `snapsql-core`
//! compiled and a caller-supplied parameter map, and returns text plus
//! bound arguments or a `RenderError`.

mod optimizer;

use snapsql_core::expr::{self, Scope, Value};
use snapsql_core::ir::{CelExpression, Dialect, IntermediateFormat, OpCode};
use snapsql_helpers::{CancellationToken, IndexMap};

pub use snapsql_dialects::DialectConfig;

/// Runtime/render-time failures (spec.md §7 band 3). Distinct from
/// `CompileError`, which covers structural/semantic failures found
/// before a template ever runs.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("undefined parameter {0:?}")]
    UndefinedParameter(String),
    #[error("expression type mismatch evaluating {expr:?}: {source}")]
    ExpressionTypeMismatch {
        expr: String,
        #[source]
        source: expr::EvalError,
    },
    #[error("cel_expressions index {0} out of range")]
    ExpressionIndexNotFound(usize),
    #[error("unsupported dialect for this render call")]
    UnsupportedDialect,
    #[error("render was cancelled")]
    Cancelled,
}

/// The render call's own config surface: target dialect plus a
/// caller-supplied cancellation token (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub dialect: Dialect,
    pub cancellation: CancellationToken,
}

impl RenderOptions {
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

/// Renders `ir` against `params`, returning the SQL text and the
/// argument vector in `ADD_PARAM` execution order (spec.md §5
/// "Ordering guarantees").
pub fn render(
    ir: &IntermediateFormat,
    params: IndexMap<String, Value>,
    options: &RenderOptions,
) -> Result<(String, Vec<Value>), RenderError> {
    if ir.dialect != options.dialect {
        tracing::warn!(ir_dialect = ?ir.dialect, requested = ?options.dialect, "dialect mismatch on render");
        return Err(RenderError::UnsupportedDialect);
    }
    let config = DialectConfig::for_dialect(options.dialect);
    let plan = optimizer::optimize(&ir.instructions);
    tracing::debug!(instructions = plan.len(), dialect = ?options.dialect, "rendering template");

    let mut state = RenderState {
        out: String::new(),
        args: Vec::new(),
        deferred: Vec::new(),
        content_since_boundary: false,
        scope: Scope::new(params),
        config: &config,
        cancellation: &options.cancellation,
    };
    state.exec(&plan, ir)?;
    state.flush_deferred();
    tracing::debug!(args = state.args.len(), "rendered template");
    Ok((state.out, state.args))
}

struct RenderState<'a> {
    out: String,
    args: Vec<Value>,
    deferred: Vec<String>,
    content_since_boundary: bool,
    scope: Scope,
    config: &'a DialectConfig,
    cancellation: &'a CancellationToken,
}

impl RenderState<'_> {
    /// Executes `plan` without flushing leftover deferred tokens — only
    /// the outermost caller in [`render`] does that, once, after the
    /// whole instruction stream has run.
    fn exec(&mut self, plan: &[OpCode], ir: &IntermediateFormat) -> Result<(), RenderError> {
        let mut pc = 0;
        while pc < plan.len() {
            if self.cancellation.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            match &plan[pc] {
                OpCode::EmitStatic { value } => {
                    self.emit_static(value);
                    pc += 1;
                }
                OpCode::EmitUnlessBoundary { value } => {
                    self.deferred.push(value.clone());
                    pc += 1;
                }
                OpCode::Boundary => {
                    self.hit_boundary();
                    pc += 1;
                }
                OpCode::AddParam { expr_index } => {
                    let value = self.eval_index(ir, *expr_index)?;
                    let nth = self.args.len() + 1;
                    self.emit_static(&self.config.placeholder_text(nth));
                    self.args.push(value);
                    pc += 1;
                }
                OpCode::EmitEval { expr_index } => {
                    let value = self.eval_index(ir, *expr_index)?;
                    self.emit_static(&value.to_string());
                    pc += 1;
                }
                OpCode::EmitSystemValue { field } => {
                    let value = self
                        .scope
                        .get(field)
                        .cloned()
                        .ok_or_else(|| RenderError::UndefinedParameter(field.clone()))?;
                    self.emit_static(&value.to_string());
                    pc += 1;
                }
                OpCode::If { expr_index } => {
                    let taken = self.eval_index(ir, *expr_index)?.is_truthy();
                    pc = self.run_branch(plan, ir, pc, taken)?;
                }
                OpCode::ElseIf { .. } | OpCode::Else => {
                    // Reached only by falling out of a taken branch;
                    // skip straight past the rest of the if/elseif/else chain.
                    pc = skip_to_end_if(plan, pc);
                }
                OpCode::EndIf => {
                    pc += 1;
                }
                OpCode::LoopStart { var, list_expr_index } => {
                    pc = self.run_loop(plan, ir, pc, var, *list_expr_index)?;
                }
                OpCode::LoopEnd => {
                    pc += 1;
                }
            }
        }
        Ok(())
    }

    /// Executes the branch starting at `if_pc` (an `If`) if `taken`,
    /// otherwise scans forward for the first matching `ElseIf`/`Else`
    /// whose condition holds, executing that one instead. Returns the
    /// program counter just past the chain's `EndIf`.
    fn run_branch(
        &mut self,
        plan: &[OpCode],
        ir: &IntermediateFormat,
        if_pc: usize,
        taken: bool,
    ) -> Result<usize, RenderError> {
        if taken {
            let (body_end, branch) = branch_bounds(plan, if_pc);
            self.exec(&plan[branch].to_vec(), ir)?;
            return Ok(body_end);
        }
        let mut pc = if_pc + 1;
        pc = skip_branch_body(plan, pc);
        loop {
            match &plan[pc] {
                OpCode::ElseIf { expr_index } => {
                    let cond = self.eval_index(ir, *expr_index)?.is_truthy();
                    if cond {
                        let (body_end, branch) = branch_bounds(plan, pc);
                        self.exec(&plan[branch].to_vec(), ir)?;
                        return Ok(body_end);
                    }
                    pc = skip_branch_body(plan, pc + 1);
                }
                OpCode::Else => {
                    let (body_end, branch) = branch_bounds(plan, pc);
                    self.exec(&plan[branch].to_vec(), ir)?;
                    return Ok(body_end);
                }
                OpCode::EndIf => return Ok(pc + 1),
                _ => unreachable!("branch scan landed on a non-branch-head opcode"),
            }
        }
    }

    fn run_loop(
        &mut self,
        plan: &[OpCode],
        ir: &IntermediateFormat,
        loop_start: usize,
        var: &str,
        list_expr_index: usize,
    ) -> Result<usize, RenderError> {
        let list = match self.eval_index(ir, list_expr_index)? {
            Value::List(items) => items,
            other => {
                return Err(RenderError::ExpressionTypeMismatch {
                    expr: var.to_string(),
                    source: expr::EvalError::NoSuchField("list", other.type_name().to_string()),
                });
            }
        };
        let loop_end = find_loop_end(plan, loop_start);
        let body = (loop_start + 1)..loop_end;
        for item in list {
            self.scope.push_frame(var, item);
            self.exec(&plan[body.clone()].to_vec(), ir)?;
            self.scope.pop_frame();
        }
        Ok(loop_end + 1)
    }

    fn eval_index(&self, ir: &IntermediateFormat, idx: usize) -> Result<Value, RenderError> {
        let compiled: &CelExpression = ir
            .cel_expressions
            .get(idx)
            .ok_or(RenderError::ExpressionIndexNotFound(idx))?;
        let ast = match &compiled.ast {
            Some(ast) => std::borrow::Cow::Borrowed(ast),
            None => std::borrow::Cow::Owned(expr::parse(&compiled.text).map_err(|_| {
                RenderError::ExpressionTypeMismatch {
                    expr: compiled.text.clone(),
                    source: expr::EvalError::UndefinedReference(compiled.text.clone()),
                }
            })?),
        };
        expr::eval(&ast, &self.scope).map_err(|source| RenderError::ExpressionTypeMismatch {
            expr: compiled.text.clone(),
            source,
        })
    }

    fn emit_static(&mut self, value: &str) {
        if value.trim().is_empty() {
            return;
        }
        self.flush_deferred();
        self.out.push_str(value);
        self.content_since_boundary = true;
    }

    fn hit_boundary(&mut self) {
        if self.content_since_boundary {
            self.flush_deferred();
        } else {
            self.deferred.clear();
        }
        self.content_since_boundary = false;
    }

    fn flush_deferred(&mut self) {
        for value in self.deferred.drain(..) {
            self.out.push_str(&value);
        }
    }
}

/// Given the index of an `If`/`ElseIf`/`Else` opcode, returns
/// `(index just past the matching EndIf, range of the branch body)`.
fn branch_bounds(plan: &[OpCode], head: usize) -> (usize, std::ops::Range<usize>) {
    let body_start = head + 1;
    let body_end = skip_branch_body(plan, body_start);
    let end_if = find_chain_end(plan, body_end);
    (end_if + 1, body_start..body_end)
}

/// Advances past a single branch's body (stopping at the next
/// `ElseIf`/`Else`/`EndIf` at the same nesting depth).
fn skip_branch_body(plan: &[OpCode], mut pc: usize) -> usize {
    let mut depth = 0i64;
    while pc < plan.len() {
        match &plan[pc] {
            OpCode::If { .. } => {
                depth += 1;
                pc += 1;
            }
            OpCode::EndIf if depth > 0 => {
                depth -= 1;
                pc += 1;
            }
            OpCode::ElseIf { .. } | OpCode::Else | OpCode::EndIf if depth == 0 => return pc,
            _ => pc += 1,
        }
    }
    pc
}

/// From a position already sitting on `ElseIf`/`Else`/`EndIf` at depth
/// 0, finds the chain's terminating `EndIf`.
fn find_chain_end(plan: &[OpCode], mut pc: usize) -> usize {
    loop {
        match &plan[pc] {
            OpCode::EndIf => return pc,
            _ => pc = skip_branch_body(plan, pc + 1),
        }
    }
}

/// Skips an entire `If ... EndIf` chain when its opening condition was
/// never reached via `run_branch` (defensive; `run` always dispatches
/// `If` through `run_branch`, so this only guards against an `ElseIf`/
/// `Else` appearing as a jump target from elsewhere).
fn skip_to_end_if(plan: &[OpCode], pc: usize) -> usize {
    find_chain_end(plan, pc) + 1
}

fn find_loop_end(plan: &[OpCode], loop_start: usize) -> usize {
    let mut depth = 0i64;
    let mut pc = loop_start + 1;
    while pc < plan.len() {
        match &plan[pc] {
            OpCode::LoopStart { .. } => depth += 1,
            OpCode::LoopEnd if depth == 0 => return pc,
            OpCode::LoopEnd => depth -= 1,
            _ => {}
        }
        pc += 1;
    }
    pc
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsql_core::ir::{CelExpression, IrBuilder};
    use snapsql_core::schema::{Constants, FunctionDefinition, ParamType};

    fn params(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        let mut map = IndexMap::default();
        for (k, v) in pairs {
            map.insert((*k).to_string(), v.clone());
        }
        map
    }

    #[test]
    fn renders_static_template_verbatim() {
        let schema = FunctionDefinition::new();
        let constants = Constants::default();
        let ir = snapsql_core::compile(
            "SELECT id FROM users",
            &schema,
            &constants,
            Dialect::PostgreSql,
        )
        .unwrap();
        let options = RenderOptions::new(Dialect::PostgreSql);
        let (sql, args) = render(&ir, params(&[]), &options).unwrap();
        assert_eq!(sql.trim(), "SELECT id FROM users");
        assert!(args.is_empty());
    }

    #[test]
    fn renders_conditional_where_with_postgres_placeholder() {
        let schema = FunctionDefinition::new().with_parameter("active", ParamType::Bool);
        let constants = Constants::default();
        let template = "SELECT id FROM users /*# if active != null */WHERE active = /*= active */true/*# end */";
        let ir = snapsql_core::compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
        let options = RenderOptions::new(Dialect::PostgreSql);
        let (sql, args) = render(&ir, params(&[("active", Value::Bool(true))]), &options).unwrap();
        assert!(sql.contains("WHERE active = $1"));
        assert_eq!(args, vec![Value::Bool(true)]);
    }

    #[test]
    fn omits_conditional_where_when_condition_is_false() {
        let schema = FunctionDefinition::new().with_parameter("active", ParamType::Bool);
        let constants = Constants::default();
        let template = "SELECT id FROM users /*# if active != null */WHERE active = /*= active */true/*# end */";
        let ir = snapsql_core::compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
        let options = RenderOptions::new(Dialect::PostgreSql);
        let (sql, args) = render(&ir, params(&[("active", Value::Null)]), &options).unwrap();
        assert!(!sql.contains("WHERE"));
        assert!(args.is_empty());
    }

    #[test]
    fn mysql_uses_positional_placeholders_on_render() {
        let schema = FunctionDefinition::new().with_parameter("active", ParamType::Bool);
        let constants = Constants::default();
        let template = "SELECT id FROM users WHERE active = /*= active */true";
        let ir = snapsql_core::compile(template, &schema, &constants, Dialect::MySql).unwrap();
        let options = RenderOptions::new(Dialect::MySql);
        let (sql, args) = render(&ir, params(&[("active", Value::Bool(true))]), &options).unwrap();
        assert!(sql.contains("WHERE active = ?"));
        assert_eq!(args, vec![Value::Bool(true)]);
    }

    #[test]
    fn loop_renders_each_element_without_dangling_comma() {
        let schema =
            FunctionDefinition::new().with_parameter("fields", ParamType::List(Box::new(ParamType::Str)));
        let constants = Constants::default();
        let template = "SELECT /*# for f in fields */ /*$ f */col,/*# end */ 1 FROM t";
        let ir = snapsql_core::compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
        let options = RenderOptions::new(Dialect::PostgreSql);
        let list = Value::List(vec![
            Value::Str("a".to_string()),
            Value::Str("b".to_string()),
            Value::Str("c".to_string()),
        ]);
        let (sql, _args) = render(&ir, params(&[("fields", list)]), &options).unwrap();
        assert!(sql.contains("a, b, c"));
    }

    #[test]
    fn undefined_parameter_surfaces_as_render_error() {
        let mut builder = IrBuilder::default();
        let idx = builder.intern_expr("missing", snapsql_core::expr::Expr::Ident("missing".to_string()));
        builder.push(OpCode::EmitEval { expr_index: idx });
        let ir = builder.finish(Dialect::PostgreSql);
        let options = RenderOptions::new(Dialect::PostgreSql);
        let err = render(&ir, params(&[]), &options).unwrap_err();
        assert!(matches!(err, RenderError::ExpressionTypeMismatch { .. }));
    }

    #[test]
    fn dialect_mismatch_is_rejected() {
        let schema = FunctionDefinition::new();
        let constants = Constants::default();
        let ir = snapsql_core::compile("SELECT id FROM t", &schema, &constants, Dialect::PostgreSql).unwrap();
        let options = RenderOptions::new(Dialect::MySql);
        let err = render(&ir, params(&[]), &options).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedDialect));
    }
}
