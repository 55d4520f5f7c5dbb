//! Vendor-neutral structured-output schema and its provider dialects.
//!
//! A [`Schema`] is authored once per stage and translated into whatever the
//! target provider understands. No provider-specific schema is written by
//! hand, so the two representations cannot drift apart.
//!
//! ```text
//!                      ┌── Dialect::Strict ──► {"type": "OBJECT", ...}        (Gemini responseSchema)
//! Schema ── translate ─┤
//!                      └── Dialect::Loose  ──► {"type": "object",
//!                                               "additionalProperties": false} (system-prompt schema)
//! ```
//!
//! OBJECT nodes own their `properties` and ARRAY nodes own their `items`, so
//! a schema missing either cannot be constructed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// A node in a vendor-neutral schema.
///
/// Serializes to the wire shape `{"type": "OBJECT", "properties": {...}}`.
///
/// # Example
///
/// ```
/// use codeshift::schema::{translate, Dialect, Schema};
///
/// let schema = Schema::object([
///     ("title", Schema::string()),
///     ("tags", Schema::array(Schema::string())),
/// ])
/// .require_all();
///
/// let loose = translate(&schema, Dialect::Loose);
/// assert_eq!(loose["type"], "object");
/// assert_eq!(loose["additionalProperties"], false);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(flatten)]
    pub kind: SchemaKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Allowed values (string enums only).
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

/// The type tag of a schema node, with the children that tag requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum SchemaKind {
    String,
    Number,
    Integer,
    Boolean,
    Array {
        items: Box<Schema>,
    },
    Object {
        properties: BTreeMap<String, Schema>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<String>,
    },
}

/// Target representation for [`translate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Enumerated, case-sensitive uppercase type constants.
    Strict,
    /// JSON-Schema-like lowercase types; every object is closed with
    /// `additionalProperties: false`.
    Loose,
}

impl Schema {
    fn with_kind(kind: SchemaKind) -> Self {
        Self {
            kind,
            description: None,
            enum_values: None,
        }
    }

    pub fn string() -> Self {
        Self::with_kind(SchemaKind::String)
    }

    pub fn number() -> Self {
        Self::with_kind(SchemaKind::Number)
    }

    pub fn integer() -> Self {
        Self::with_kind(SchemaKind::Integer)
    }

    pub fn boolean() -> Self {
        Self::with_kind(SchemaKind::Boolean)
    }

    pub fn array(items: Schema) -> Self {
        Self::with_kind(SchemaKind::Array {
            items: Box::new(items),
        })
    }

    /// An object node with the given fields and no required list.
    pub fn object<K, I>(properties: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        Self::with_kind(SchemaKind::Object {
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
            required: Vec::new(),
        })
    }

    /// Set the description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restrict the node to a fixed set of string values.
    pub fn one_of<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Set the required field list. No-op on non-object nodes.
    pub fn required<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        if let SchemaKind::Object { required, .. } = &mut self.kind {
            *required = fields.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Mark every declared property as required. No-op on non-object nodes.
    pub fn require_all(mut self) -> Self {
        if let SchemaKind::Object {
            properties,
            required,
        } = &mut self.kind
        {
            *required = properties.keys().cloned().collect();
        }
        self
    }

    /// Shorthand for `translate(self, dialect)`.
    pub fn to_dialect(&self, dialect: Dialect) -> Value {
        translate(self, dialect)
    }
}

/// Translate a schema into a provider dialect.
///
/// Pure and deterministic: properties are emitted in key order, so the same
/// input always yields the same output.
pub fn translate(schema: &Schema, dialect: Dialect) -> Value {
    let mut node = Map::new();
    node.insert("type".into(), json!(type_name(&schema.kind, dialect)));

    if let Some(ref description) = schema.description {
        node.insert("description".into(), json!(description));
    }
    if let Some(ref values) = schema.enum_values {
        node.insert("enum".into(), json!(values));
    }

    match &schema.kind {
        SchemaKind::Array { items } => {
            node.insert("items".into(), translate(items, dialect));
        }
        SchemaKind::Object {
            properties,
            required,
        } => {
            let props: Map<String, Value> = properties
                .iter()
                .map(|(name, child)| (name.clone(), translate(child, dialect)))
                .collect();
            node.insert("properties".into(), Value::Object(props));
            if !required.is_empty() {
                node.insert("required".into(), json!(required));
            }
            if dialect == Dialect::Loose {
                node.insert("additionalProperties".into(), Value::Bool(false));
            }
        }
        SchemaKind::String | SchemaKind::Number | SchemaKind::Integer | SchemaKind::Boolean => {}
    }

    Value::Object(node)
}

fn type_name(kind: &SchemaKind, dialect: Dialect) -> &'static str {
    let (strict, loose) = match kind {
        SchemaKind::String => ("STRING", "string"),
        SchemaKind::Number => ("NUMBER", "number"),
        SchemaKind::Integer => ("INTEGER", "integer"),
        SchemaKind::Boolean => ("BOOLEAN", "boolean"),
        SchemaKind::Array { .. } => ("ARRAY", "array"),
        SchemaKind::Object { .. } => ("OBJECT", "object"),
    };
    match dialect {
        Dialect::Strict => strict,
        Dialect::Loose => loose,
    }
}
