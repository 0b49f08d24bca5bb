//! Integration tests exercising spec.md §8's concrete scenarios and
//! universal invariants against the public `compile` entry point.

use snapsql_core::ir::{Dialect, OpCode};
use snapsql_core::{Constants, ErrorKind, FunctionDefinition, ParamType, SnapSqlError, compile};

#[test]
fn scenario_subquery_alias_required_is_rejected() {
    let template = "SELECT x FROM (SELECT id AS x FROM t)";
    let schema = FunctionDefinition::new();
    let constants = Constants::default();
    let err = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap_err();
    match err {
        SnapSqlError::Compile(e) => {
            assert!(e.diagnostics.iter().any(|d| d.kind == ErrorKind::SubqueryAliasMissing));
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn scenario_insert_without_column_list_is_rejected() {
    let template = "INSERT INTO users VALUES (1, 'a')";
    let schema = FunctionDefinition::new();
    let constants = Constants::default();
    let err = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap_err();
    match err {
        SnapSqlError::Compile(e) => {
            assert!(e.diagnostics.iter().any(|d| d.kind == ErrorKind::InsertColumnListRequired));
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}

#[test]
fn tokenization_round_trips_byte_for_byte() {
    let template =
        "SELECT id, name FROM users /*# if active != null */WHERE active = /*= active */true/*# end */ -- trailing comment\n";
    let tokens = snapsql_core::tokenizer::tokenize(template).unwrap();
    let reconstructed: String = tokens.iter().map(|t| t.raw.as_str()).collect();
    assert_eq!(reconstructed, template);
}

#[test]
fn directive_pairing_is_balanced_across_nested_constructs() {
    let template = "SELECT id FROM t /*# if a != null */ /*# for x in xs */ /*$ x */y,/*# end */ /*# end */";
    let schema = FunctionDefinition::new()
        .with_parameter("a", ParamType::Bool)
        .with_parameter("xs", ParamType::List(Box::new(ParamType::Str)));
    let constants = Constants::default();
    let ir = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
    assert!(ir.check_balanced());

    let if_count = ir.instructions.iter().filter(|op| matches!(op, OpCode::If { .. })).count();
    let end_if_count = ir.instructions.iter().filter(|op| matches!(op, OpCode::EndIf)).count();
    assert_eq!(if_count, end_if_count);

    let loop_start_count = ir
        .instructions
        .iter()
        .filter(|op| matches!(op, OpCode::LoopStart { .. }))
        .count();
    let loop_end_count = ir.instructions.iter().filter(|op| matches!(op, OpCode::LoopEnd)).count();
    assert_eq!(loop_start_count, loop_end_count);
}

#[test]
fn compile_is_idempotent_on_identical_inputs() {
    let template =
        "SELECT id, name FROM users /*# if active != null */WHERE active = /*= active */true/*# end */";
    let schema = FunctionDefinition::new().with_parameter("active", ParamType::Bool);
    let constants = Constants::default();
    let first = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
    let second = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
    assert_eq!(first, second);
}

#[test]
fn schema_soundness_rejects_names_not_reachable_in_any_scope() {
    let template = "SELECT id FROM t /*# if nope != null */WHERE x = 1/*# end */";
    let schema = FunctionDefinition::new();
    let mut constants = Constants::default();
    constants.insert("known_constant".to_string(), snapsql_core::expr::Value::Int(1));
    let err = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap_err();
    match err {
        SnapSqlError::Compile(e) => {
            assert!(e.diagnostics.iter().any(|d| d.kind == ErrorKind::UndefinedParameter));
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
}
