use std::fmt;
use std::str::FromStr;

/// Result type of an IR instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    /// Not yet resolved (phis before type back-fill).
    #[default]
    NoType,
    Bool,
    Int32,
    Int64,
    Float64,
    Reference,
    /// Dynamically typed value.
    Any,
    /// No value.
    Void,
}

impl DataType {
    #[inline]
    pub fn is_typed(self) -> bool {
        self != DataType::NoType
    }

    pub fn is_integer(self) -> bool {
        matches!(self, DataType::Bool | DataType::Int32 | DataType::Int64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self == DataType::Float64
    }

    /// Short name used in dumps and manifests.
    pub fn name(self) -> &'static str {
        match self {
            DataType::NoType => "-",
            DataType::Bool => "b",
            DataType::Int32 => "i32",
            DataType::Int64 => "i64",
            DataType::Float64 => "f64",
            DataType::Reference => "ref",
            DataType::Any => "any",
            DataType::Void => "void",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "b" | "bool" | "u1" => DataType::Bool,
            "i32" => DataType::Int32,
            "i64" => DataType::Int64,
            "f64" => DataType::Float64,
            "ref" | "obj" => DataType::Reference,
            "any" => DataType::Any,
            "void" => DataType::Void,
            _ => return Err(format!("unknown type '{s}'")),
        })
    }
}

/// Value of a `Constant` instruction.
///
/// Floats are stored as raw bits so constants can be deduplicated by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    Int(i64),
    Float(u64),
    Null,
}

impl ConstValue {
    pub fn float(v: f64) -> Self {
        ConstValue::Float(v.to_bits())
    }

    pub fn data_type(self) -> DataType {
        match self {
            ConstValue::Int(_) => DataType::Int64,
            ConstValue::Float(_) => DataType::Float64,
            ConstValue::Null => DataType::Reference,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Float(bits) => write!(f, "{:?}", f64::from_bits(*bits)),
            ConstValue::Null => f.write_str("null"),
        }
    }
}

/// Condition code of `If` / `IfImm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionCode {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionCode::Eq => "eq",
            ConditionCode::Ne => "ne",
            ConditionCode::Lt => "lt",
            ConditionCode::Gt => "gt",
            ConditionCode::Le => "le",
            ConditionCode::Ge => "ge",
        };
        f.write_str(s)
    }
}
