//! JSON (de)serialization for the parameter schema, constants, and
//! parameter-value files this binary reads from disk — a collaborator
//! concern the core itself never touches (spec.md §1).

use std::path::Path;

use snapsql_core::expr::Value;
use snapsql_core::schema::{Constants, FunctionDefinition, ParamType};
use snapsql_helpers::IndexMap;

#[derive(Debug, thiserror::Error)]
pub enum SchemaIoError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unrecognized parameter type {0:?}")]
    UnknownType(String),
    #[error("parameter type entry must be a string, {{\"list\": ...}}, or {{\"object\": ...}}")]
    MalformedType,
}

fn read_json(path: &Path) -> Result<serde_json::Value, SchemaIoError> {
    let text = std::fs::read_to_string(path).map_err(|source| SchemaIoError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SchemaIoError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Loads a `{"param": <type>, ...}` JSON document into a
/// `FunctionDefinition`. Type entries are either a primitive name
/// (`"str"`, `"int"`, `"float"`, `"bool"`, `"date"`, `"timestamp"`,
/// `"decimal"`), `{"list": <type>}`, or `{"object": {field: <type>, ...}}`.
pub fn load_schema(path: &Path) -> Result<FunctionDefinition, SchemaIoError> {
    let json = read_json(path)?;
    let obj = json.as_object().ok_or(SchemaIoError::MalformedType)?;
    let mut def = FunctionDefinition::new();
    for (name, ty) in obj {
        def = def.with_parameter(name.clone(), parse_param_type(ty)?);
    }
    Ok(def)
}

fn parse_param_type(value: &serde_json::Value) -> Result<ParamType, SchemaIoError> {
    match value {
        serde_json::Value::String(s) => match s.as_str() {
            "str" => Ok(ParamType::Str),
            "int" => Ok(ParamType::Int),
            "float" => Ok(ParamType::Float),
            "bool" => Ok(ParamType::Bool),
            "date" => Ok(ParamType::Date),
            "timestamp" => Ok(ParamType::Timestamp),
            "decimal" => Ok(ParamType::Decimal),
            other => Err(SchemaIoError::UnknownType(other.to_string())),
        },
        serde_json::Value::Object(obj) if obj.len() == 1 && obj.contains_key("list") => {
            let elem = parse_param_type(&obj["list"])?;
            Ok(ParamType::List(Box::new(elem)))
        }
        serde_json::Value::Object(obj) if obj.len() == 1 && obj.contains_key("object") => {
            let fields = obj["object"].as_object().ok_or(SchemaIoError::MalformedType)?;
            let mut map = IndexMap::default();
            for (name, ty) in fields {
                map.insert(name.clone(), parse_param_type(ty)?);
            }
            Ok(ParamType::Object(map))
        }
        _ => Err(SchemaIoError::MalformedType),
    }
}

/// Loads a flat `{"name": <value>, ...}` JSON document as render-time
/// constants.
pub fn load_constants(path: &Path) -> Result<Constants, SchemaIoError> {
    let json = read_json(path)?;
    let obj = json.as_object().ok_or(SchemaIoError::MalformedType)?;
    let mut constants = Constants::default();
    for (name, value) in obj {
        constants.insert(name.clone(), json_to_value(value));
    }
    Ok(constants)
}

/// Loads a flat `{"name": <value>, ...}` JSON document as the render-time
/// parameter map.
pub fn load_params(path: &Path) -> Result<IndexMap<String, Value>, SchemaIoError> {
    let json = read_json(path)?;
    let obj = json.as_object().ok_or(SchemaIoError::MalformedType)?;
    let mut params = IndexMap::default();
    for (name, value) in obj {
        params.insert(name.clone(), json_to_value(value));
    }
    Ok(params)
}

fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            let mut map = IndexMap::default();
            for (k, v) in obj {
                map.insert(k.clone(), json_to_value(v));
            }
            Value::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primitive_and_compound_types() {
        assert_eq!(parse_param_type(&serde_json::json!("int")).unwrap(), ParamType::Int);
        assert_eq!(
            parse_param_type(&serde_json::json!({"list": "str"})).unwrap(),
            ParamType::List(Box::new(ParamType::Str))
        );
        let object_ty = parse_param_type(&serde_json::json!({"object": {"age": "int"}})).unwrap();
        assert!(matches!(object_ty, ParamType::Object(_)));
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        assert!(parse_param_type(&serde_json::json!("weird")).is_err());
    }

    #[test]
    fn converts_json_values() {
        assert_eq!(json_to_value(&serde_json::json!(null)), Value::Null);
        assert_eq!(json_to_value(&serde_json::json!(42)), Value::Int(42));
        assert_eq!(json_to_value(&serde_json::json!("x")), Value::Str("x".to_string()));
        assert_eq!(
            json_to_value(&serde_json::json!([1, 2])),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }
}
