//! Integration tests exercising spec.md §8's concrete scenarios and
//! render-time invariants end-to-end: compile with `snapsql-core`, then
//! render with `snapsql-render`.

use snapsql_core::expr::Value;
use snapsql_core::ir::Dialect;
use snapsql_core::{Constants, FunctionDefinition, ParamType, compile};
use snapsql_helpers::IndexMap;
use snapsql_render::{RenderOptions, render};

fn params(pairs: Vec<(&str, Value)>) -> IndexMap<String, Value> {
    let mut map = IndexMap::default();
    for (k, v) in pairs {
        map.insert(k.to_string(), v);
    }
    map
}

#[test]
fn scenario_conditional_where_renders_with_and_without_the_param() {
    let template =
        "SELECT id, name FROM users /*# if active != null */WHERE active = /*= active */true/*# end */";
    let schema = FunctionDefinition::new().with_parameter("active", ParamType::Bool);
    let constants = Constants::default();
    let ir = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
    let options = RenderOptions::new(Dialect::PostgreSql);

    let (sql, args) = render(&ir, params(vec![("active", Value::Bool(true))]), &options).unwrap();
    assert_eq!(sql, "SELECT id, name FROM users WHERE active = $1");
    assert_eq!(args, vec![Value::Bool(true)]);

    let (sql, args) = render(&ir, params(vec![("active", Value::Null)]), &options).unwrap();
    assert_eq!(sql, "SELECT id, name FROM users");
    assert!(args.is_empty());
}

#[test]
fn scenario_loop_suppresses_the_trailing_comma() {
    let template = "SELECT /*# for f in fields */ /*$ f */col,/*# end */ 1 FROM t";
    let schema =
        FunctionDefinition::new().with_parameter("fields", ParamType::List(Box::new(ParamType::Str)));
    let constants = Constants::default();
    let ir = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
    let options = RenderOptions::new(Dialect::PostgreSql);

    let fields = Value::List(vec![
        Value::Str("a".to_string()),
        Value::Str("b".to_string()),
        Value::Str("c".to_string()),
    ]);
    let (sql, _args) = render(&ir, params(vec![("fields", fields)]), &options).unwrap();
    assert!(sql.contains("a, b, c, 1"));
    assert!(!sql.contains(",,"));
}

#[test]
fn scenario_implicit_limit_guard_elides_or_binds_limit() {
    let template = "SELECT id FROM t LIMIT /*= limit */10";
    let schema = FunctionDefinition::new().with_parameter("limit", ParamType::Int);
    let constants = Constants::default();
    let ir = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
    let options = RenderOptions::new(Dialect::PostgreSql);

    let (sql, args) = render(&ir, params(vec![("limit", Value::Null)]), &options).unwrap();
    assert_eq!(sql, "SELECT id FROM t");
    assert!(args.is_empty());

    let (sql, args) = render(&ir, params(vec![("limit", Value::Int(5))]), &options).unwrap();
    assert_eq!(sql, "SELECT id FROM t LIMIT $1");
    assert_eq!(args, vec![Value::Int(5)]);
}

#[test]
fn placeholder_count_matches_argument_count_on_mysql() {
    let template = "SELECT id FROM users /*# if active != null */WHERE active = /*= active */true/*# end */ /*# if name != null */AND name = /*= name */'x'/*# end */";
    let schema = FunctionDefinition::new()
        .with_parameter("active", ParamType::Bool)
        .with_parameter("name", ParamType::Str);
    let constants = Constants::default();
    let ir = compile(template, &schema, &constants, Dialect::MySql).unwrap();
    let options = RenderOptions::new(Dialect::MySql);

    let (sql, args) = render(
        &ir,
        params(vec![
            ("active", Value::Bool(true)),
            ("name", Value::Str("x".to_string())),
        ]),
        &options,
    )
    .unwrap();
    assert_eq!(sql.matches('?').count(), args.len());
}

#[test]
fn render_is_deterministic_given_the_same_inputs() {
    let template =
        "SELECT id, name FROM users /*# if active != null */WHERE active = /*= active */true/*# end */";
    let schema = FunctionDefinition::new().with_parameter("active", ParamType::Bool);
    let constants = Constants::default();
    let ir = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
    let options = RenderOptions::new(Dialect::PostgreSql);

    let first = render(&ir, params(vec![("active", Value::Bool(true))]), &options).unwrap();
    let second = render(&ir, params(vec![("active", Value::Bool(true))]), &options).unwrap();
    assert_eq!(first, second);
}

#[test]
fn dialect_mismatch_between_compile_and_render_is_rejected() {
    let template = "SELECT id FROM t";
    let schema = FunctionDefinition::new();
    let constants = Constants::default();
    let ir = compile(template, &schema, &constants, Dialect::PostgreSql).unwrap();
    let options = RenderOptions::new(Dialect::MySql);

    let err = render(&ir, IndexMap::default(), &options).unwrap_err();
    assert!(matches!(err, snapsql_render::RenderError::UnsupportedDialect));
}
