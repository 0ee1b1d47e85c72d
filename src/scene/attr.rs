//! Typed node attributes and attribute connections.

use std::fmt;

use crate::util::{Transform, Vector};

use super::node::NodeId;

/// Value stored in an attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
    Matrix(Transform),
    Triple(Vector),
}

impl AttrValue {
    /// Numeric view used by connections and weights.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<Transform> {
        match self {
            AttrValue::Matrix(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_triple(&self) -> Option<Vector> {
        match self {
            AttrValue::Triple(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }

    /// Rebuild a value of the same type from a number.
    pub(crate) fn with_number(&self, v: f64) -> AttrValue {
        match self {
            AttrValue::Int(_) => AttrValue::Int(v.trunc() as i64),
            AttrValue::Bool(_) => AttrValue::Bool(to_bool(v)),
            _ => AttrValue::Float(v),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<Transform> for AttrValue {
    fn from(v: Transform) -> Self {
        AttrValue::Matrix(v)
    }
}

impl From<Vector> for AttrValue {
    fn from(v: Vector) -> Self {
        AttrValue::Triple(v)
    }
}

/// Number to bool conversion used when a float drives a boolean input.
/// Truncates toward zero, so anything in (-1, 1) reads as false.
#[inline]
pub fn to_bool(v: f64) -> bool {
    v.trunc() != 0.0
}

/// Reference to `node.attr`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Plug {
    pub node: NodeId,
    pub attr: String,
}

impl Plug {
    pub fn new(node: NodeId, attr: impl Into<String>) -> Self {
        Self { node, attr: attr.into() }
    }
}

impl fmt::Debug for Plug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}.{}", self.node, self.attr)
    }
}

/// Unit operation applied on a connection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlugOp {
    Direct,
    /// `source + bias`
    Add(f64),
    /// `1 - source`
    Reverse,
    /// `1 - (source + bias)`
    AddReverse(f64),
}

impl PlugOp {
    pub fn apply(self, v: f64) -> f64 {
        match self {
            PlugOp::Direct => v,
            PlugOp::Add(bias) => v + bias,
            PlugOp::Reverse => 1.0 - v,
            PlugOp::AddReverse(bias) => 1.0 - (v + bias),
        }
    }
}

/// Incoming connection of an attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub source: Plug,
    pub op: PlugOp,
}

/// Attribute definition and stored value.
#[derive(Clone, Debug, PartialEq)]
pub struct Attr {
    pub value: AttrValue,
    pub default: AttrValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub keyable: bool,
    pub locked: bool,
    pub input: Option<Connection>,
}

impl Attr {
    pub fn new(value: AttrValue) -> Self {
        Self {
            default: value.clone(),
            value,
            min: None,
            max: None,
            keyable: false,
            locked: false,
            input: None,
        }
    }

    pub fn float(v: f64) -> Self {
        Self::new(AttrValue::Float(v))
    }

    pub fn boolean(v: bool) -> Self {
        Self::new(AttrValue::Bool(v))
    }

    pub fn int(v: i64) -> Self {
        Self::new(AttrValue::Int(v))
    }

    pub fn string(v: impl Into<String>) -> Self {
        Self::new(AttrValue::Str(v.into()))
    }

    pub fn matrix(m: Transform) -> Self {
        Self::new(AttrValue::Matrix(m))
    }

    pub fn triple(v: Vector) -> Self {
        Self::new(AttrValue::Triple(v))
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.value = self.value.with_number(self.clamp(self.value.as_f64().unwrap_or(0.0)));
        self.default = self.value.clone();
        self
    }

    pub fn keyable(mut self, keyable: bool) -> Self {
        self.keyable = keyable;
        self
    }

    /// Clamp a number into this attribute's range.
    pub fn clamp(&self, mut v: f64) -> f64 {
        if let Some(min) = self.min {
            v = v.max(min);
        }
        if let Some(max) = self.max {
            v = v.min(max);
        }
        v
    }
}
