//! Parameter schema (`FunctionDefinition`) and constants (spec.md §3).

use snapsql_helpers::IndexMap;

/// Primitive leaf types a parameter or constant may hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    Date,
    Timestamp,
    Decimal,
    /// An ordered map of field name to type — an interior schema node.
    Object(IndexMap<String, ParamType>),
    /// A homogeneous list of the given element type.
    List(Box<ParamType>),
}

impl ParamType {
    pub fn field(&self, name: &str) -> Option<&ParamType> {
        match self {
            ParamType::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&ParamType> {
        match self {
            ParamType::List(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn is_comparable_to(&self, other: &ParamType) -> bool {
        use ParamType::*;
        match (self, other) {
            (Int, Float) | (Float, Int) => true,
            (Date, Timestamp) | (Timestamp, Date) => true,
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamType::Str => write!(f, "str"),
            ParamType::Int => write!(f, "int"),
            ParamType::Float => write!(f, "float"),
            ParamType::Bool => write!(f, "bool"),
            ParamType::Date => write!(f, "date"),
            ParamType::Timestamp => write!(f, "timestamp"),
            ParamType::Decimal => write!(f, "decimal"),
            ParamType::Object(_) => write!(f, "object"),
            ParamType::List(elem) => write!(f, "list<{elem}>"),
        }
    }
}

/// The recursive type environment a template compiles against: parameters
/// the caller must supply, plus the function's declared response shape
/// (used only to populate `response_fields` defaults; never enforced).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub parameters: IndexMap<String, ParamType>,
    pub response_type: Option<ParamType>,
}

impl FunctionDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.parameters.insert(name.into(), ty);
        self
    }
}

/// Flat name→value constants map, merged into the evaluation scope with
/// lower priority than explicit parameters (spec.md §3).
pub type Constants = IndexMap<String, crate::expr::Value>;
