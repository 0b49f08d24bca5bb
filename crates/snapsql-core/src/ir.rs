//! The intermediate instruction format (spec.md §3 "Intermediate format",
//! §4.8, §6 wire shape). This is the compiler's sole output and the
//! renderer's sole input; it serializes to a stable JSON document.

use snapsql_helpers::IndexMap;

use crate::expr::Expr;

/// The closed opcode set (spec.md §3 "OpCode").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "op"))]
pub enum OpCode {
    EmitStatic {
        value: String,
    },
    EmitEval {
        expr_index: usize,
    },
    AddParam {
        expr_index: usize,
    },
    EmitUnlessBoundary {
        value: String,
    },
    Boundary,
    If {
        expr_index: usize,
    },
    ElseIf {
        expr_index: usize,
    },
    Else,
    EndIf,
    LoopStart {
        var: String,
        list_expr_index: usize,
    },
    LoopEnd,
    EmitSystemValue {
        field: String,
    },
}

/// A directive expression's source text plus its parsed form, indexed by
/// position in `IntermediateFormat::cel_expressions`. Compiled once per
/// distinct text (spec.md §9 "Namespace evaluation").
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CelExpression {
    pub text: String,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub ast: Option<Expr>,
}

impl CelExpression {
    pub fn new(text: impl Into<String>, ast: Expr) -> Self {
        Self {
            text: text.into(),
            ast: Some(ast),
        }
    }
}

/// Where a response column originated, for `response_fields` provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldOrigin {
    Select,
    Returning,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResponseField {
    pub name: String,
    pub type_name: Option<String>,
    pub origin: FieldOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TableRole {
    From,
    Join,
    Update,
    InsertInto,
    DeleteFrom,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableReference {
    pub name: String,
    pub alias: Option<String>,
    pub role: TableRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Dialect {
    #[default]
    PostgreSql,
    MySql,
    Sqlite,
    MariaDb,
}

/// The compiler's sole output: an ordered opcode stream plus the metadata
/// tables the renderer and its callers need (spec.md §3, §6).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntermediateFormat {
    pub instructions: Vec<OpCode>,
    pub cel_expressions: Vec<CelExpression>,
    pub response_fields: Vec<ResponseField>,
    pub parameter_refs: Vec<String>,
    pub table_references: Vec<TableReference>,
    pub dialect: Dialect,
}

impl IntermediateFormat {
    /// Invariant 1 (spec.md §3): every `If`/`LoopStart` is matched by an
    /// `EndIf`/`LoopEnd` at the same nesting depth.
    pub fn check_balanced(&self) -> bool {
        let mut if_depth: i64 = 0;
        let mut loop_depth: i64 = 0;
        for op in &self.instructions {
            match op {
                OpCode::If { .. } => if_depth += 1,
                OpCode::EndIf => if_depth -= 1,
                OpCode::LoopStart { .. } => loop_depth += 1,
                OpCode::LoopEnd => loop_depth -= 1,
                _ => {}
            }
            if if_depth < 0 || loop_depth < 0 {
                return false;
            }
        }
        if_depth == 0 && loop_depth == 0
    }

    /// Invariant 2 (spec.md §3): no opcode references an out-of-range
    /// `cel_expressions` index.
    pub fn check_expr_indices_valid(&self) -> bool {
        let len = self.cel_expressions.len();
        self.instructions.iter().all(|op| match op {
            OpCode::EmitEval { expr_index }
            | OpCode::AddParam { expr_index }
            | OpCode::If { expr_index }
            | OpCode::ElseIf { expr_index }
            | OpCode::LoopStart {
                list_expr_index: expr_index,
                ..
            } => *expr_index < len,
            _ => true,
        })
    }
}

/// Scratch accumulator the emitter uses to build an `IntermediateFormat`
/// while walking the validated AST, deduplicating expression text by
/// position (spec.md §9 "compiled once per distinct expression").
#[derive(Debug, Default)]
pub struct IrBuilder {
    pub instructions: Vec<OpCode>,
    expr_index_by_text: IndexMap<String, usize>,
    pub cel_expressions: Vec<CelExpression>,
    pub response_fields: Vec<ResponseField>,
    pub parameter_refs: Vec<String>,
    pub table_references: Vec<TableReference>,
}

impl IrBuilder {
    pub fn intern_expr(&mut self, text: &str, ast: Expr) -> usize {
        if let Some(&idx) = self.expr_index_by_text.get(text) {
            return idx;
        }
        let idx = self.cel_expressions.len();
        self.cel_expressions.push(CelExpression::new(text, ast));
        self.expr_index_by_text.insert(text.to_string(), idx);
        idx
    }

    pub fn push(&mut self, op: OpCode) {
        self.instructions.push(op);
    }

    pub fn finish(self, dialect: Dialect) -> IntermediateFormat {
        IntermediateFormat {
            instructions: self.instructions,
            cel_expressions: self.cel_expressions,
            response_fields: self.response_fields,
            parameter_refs: self.parameter_refs,
            table_references: self.table_references,
            dialect,
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn intermediate_format_round_trips_through_json() {
        let mut builder = IrBuilder::default();
        let expr_index = builder.intern_expr("active", Expr::Ident("active".to_string()));
        builder.push(OpCode::EmitStatic {
            value: "SELECT 1".to_string(),
        });
        builder.push(OpCode::If { expr_index });
        builder.push(OpCode::AddParam { expr_index });
        builder.push(OpCode::EndIf);
        let ir = builder.finish(Dialect::PostgreSql);

        let json = serde_json::to_string(&ir).unwrap();
        let restored: IntermediateFormat = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.instructions, ir.instructions);
        assert_eq!(restored.dialect, ir.dialect);
        assert_eq!(restored.cel_expressions.len(), ir.cel_expressions.len());
        // `ast` is intentionally skipped on serialize; only `text` round-trips.
        assert!(restored.cel_expressions[0].ast.is_none());
        assert_eq!(restored.cel_expressions[0].text, ir.cel_expressions[0].text);
    }

    #[test]
    fn dialect_serializes_as_lowercase() {
        let json = serde_json::to_string(&Dialect::MySql).unwrap();
        assert_eq!(json, "\"mysql\"");
    }
}
