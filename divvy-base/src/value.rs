use serde::{Deserialize, Serialize};

/// The marshallable primitive value domain a generator may emit and a processor must accept.
///
/// This is the data model's marshallable primitive set: booleans, 64-bit integers,
/// floats, byte strings, text strings, ordered sequences, and string-keyed maps.
/// `Map` is a `Vec` of pairs rather than a `HashMap` so that wire round-trips are
/// deterministic and `Value` doesn't need to implement `Hash`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    Seq(Vec<Value>),
    Map(Vec<(String, Value)>),
}

/// One item yielded by a generator and accepted by a processor. Arity is whatever the
/// `Vec`'s length happens to be; the task implementer is responsible for the arity
/// invariant named in the data model (generator arity equals processor arity).
pub type Tuple = Vec<Value>;

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from("hi"), Value::Str("hi".to_string()));
    }

    #[test]
    fn nested_value_equality() {
        let a = Value::Seq(vec![Value::Int(1), Value::Str("x".into())]);
        let b = Value::Seq(vec![Value::Int(1), Value::Str("x".into())]);
        assert_eq!(a, b);
    }
}
