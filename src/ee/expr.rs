//! Earth Engine expression graphs.
//!
//! Computations are built client-side as a tree of [`Value`]s and serialized to the
//! REST `Expression` form: a table of value nodes plus the key of the result node.
//! Function bodies must live in that table, so they are hoisted during encoding.
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value as Json, json};

/// A node of a client-side computation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Constant(Json),
    Array(Vec<Value>),
    Dictionary(BTreeMap<String, Value>),
    Invocation {
        function: String,
        arguments: BTreeMap<String, Value>,
    },
    FunctionDefinition {
        argument_names: Vec<String>,
        body: Box<Value>,
    },
    ArgumentReference(String),
}

impl Value {
    pub fn constant<T: Into<Json>>(v: T) -> Value {
        Value::Constant(v.into())
    }

    pub fn strings<S: AsRef<str>>(items: &[S]) -> Value {
        Value::Array(
            items
                .iter()
                .map(|s| Value::constant(s.as_ref()))
                .collect(),
        )
    }

    /// Invocation of a server-side algorithm with named arguments.
    pub fn invoke<I, K>(function: &str, arguments: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Invocation {
            function: function.to_string(),
            arguments: arguments.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::constant(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::constant(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::constant(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::constant(v)
    }
}

/// A serialized expression, as posted in `value:compute`, `image:computePixels` and
/// `table:computeFeatures` requests.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Expression {
    pub result: String,
    pub values: BTreeMap<String, Json>,
}

impl Expression {
    pub fn new(root: &Value) -> Self {
        let mut encoder = Encoder::default();
        let node = encoder.encode(root);
        let result = encoder.push(node);
        Expression {
            result,
            values: encoder.values,
        }
    }
}

#[derive(Default)]
struct Encoder {
    values: BTreeMap<String, Json>,
    next: usize,
}

impl Encoder {
    fn push(&mut self, node: Json) -> String {
        let key = self.next.to_string();
        self.next += 1;
        self.values.insert(key.clone(), node);
        key
    }

    fn encode(&mut self, value: &Value) -> Json {
        match value {
            Value::Constant(c) => json!({ "constantValue": c }),
            Value::Array(items) => {
                let values: Vec<Json> = items.iter().map(|v| self.encode(v)).collect();
                json!({ "arrayValue": { "values": values } })
            }
            Value::Dictionary(map) => {
                let values: serde_json::Map<String, Json> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.encode(v)))
                    .collect();
                json!({ "dictionaryValue": { "values": values } })
            }
            Value::Invocation {
                function,
                arguments,
            } => {
                let args: serde_json::Map<String, Json> = arguments
                    .iter()
                    .map(|(k, v)| (k.clone(), self.encode(v)))
                    .collect();
                json!({
                    "functionInvocationValue": {
                        "functionName": function,
                        "arguments": args,
                    }
                })
            }
            Value::FunctionDefinition {
                argument_names,
                body,
            } => {
                let body_node = self.encode(body);
                let key = self.push(body_node);
                json!({
                    "functionDefinitionValue": {
                        "argumentNames": argument_names,
                        "body": key,
                    }
                })
            }
            Value::ArgumentReference(name) => json!({ "argumentReference": name }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_expression() {
        let expr = Expression::new(&Value::constant(42));
        assert_eq!(expr.result, "0");
        assert_eq!(expr.values["0"], json!({ "constantValue": 42 }));
    }

    #[test]
    fn test_invocation_encoding() {
        let v = Value::invoke("Image.load", [("id", Value::from("NASA/NASADEM_HGT/001"))]);
        let expr = Expression::new(&v);
        let encoded = serde_json::to_value(&expr).unwrap();
        assert_eq!(
            encoded,
            json!({
                "result": "0",
                "values": {
                    "0": {
                        "functionInvocationValue": {
                            "functionName": "Image.load",
                            "arguments": { "id": { "constantValue": "NASA/NASADEM_HGT/001" } }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_function_body_is_hoisted() {
        let body = Value::invoke(
            "Image.select",
            [
                ("input", Value::ArgumentReference("_MAPPING_VAR_0_0".into())),
                ("bandSelectors", Value::strings(&["B2"])),
            ],
        );
        let f = Value::FunctionDefinition {
            argument_names: vec!["_MAPPING_VAR_0_0".into()],
            body: Box::new(body),
        };
        let expr = Expression::new(&f);
        // body first, then the definition as result
        assert_eq!(expr.result, "1");
        assert_eq!(
            expr.values["1"]["functionDefinitionValue"]["body"],
            json!("0")
        );
        assert!(expr.values["0"]["functionInvocationValue"].is_object());
    }
}
