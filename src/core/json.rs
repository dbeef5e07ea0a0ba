//! JSON authoring surface for templates, and conversions between [`Value`]
//! and `serde_json::Value`.
//!
//! A template written as JSON uses plain objects for object templates, the
//! strings `"String"`, `"Number"` and `"Tag"` as markers, and the reserved
//! keys below for metadata:
//!
//! | key | meaning |
//! |---|---|
//! | `_list` | `true` for any matching child, or the item element name |
//! | `_wrapitem` | keep list items under their element name |
//! | `_bareobj` | replace the object with its matching child's value |
//! | `_order` | field emission order |
//! | `_attrs` | attributes, as an object or a list of `{"key", "val"}` |
//! | `_type` | a marker, a type name, or an inline template |
//! | `_types` | the type table |
//! | `_text` | key receiving the element's own text |
//!
//! `_result` and `_transform` take functions and are only available through
//! the builder API.
//!
//! ```
//! use xml_template::core::schema::Schema;
//!
//! let schema = Schema::from_json_str(r#"{
//!     "root": {
//!         "list": { "_list": "item", "item": { "name": "String" } }
//!     }
//! }"#).unwrap();
//! assert!(schema.as_object().is_some());
//! ```

use serde_json::Value as Json;

use crate::core::schema::{ObjectSchema, Schema};
use crate::core::tag::Attributes;
use crate::core::value::{Map, Value};
use crate::error::{Result, TemplateError};

impl Schema {
    pub fn from_json_str(text: &str) -> Result<Schema> {
        let json: Json = serde_json::from_str(text)?;
        Schema::from_json(&json)
    }

    pub fn from_json(json: &Json) -> Result<Schema> {
        match json {
            Json::String(marker) => marker_schema(marker),
            Json::Object(entries) => {
                let mut obj = ObjectSchema::new();
                for (key, value) in entries {
                    obj = apply_entry(obj, key, value)?;
                }
                Ok(Schema::Object(obj))
            }
            other => Err(TemplateError::Schema(format!(
                "expected a marker string or an object, found {}",
                other
            ))),
        }
    }
}

fn marker_schema(marker: &str) -> Result<Schema> {
    match marker {
        "String" => Ok(Schema::String),
        "Number" => Ok(Schema::Number),
        "Tag" => Ok(Schema::Tag),
        other => Err(TemplateError::Schema(format!("unknown marker '{}'", other))),
    }
}

fn apply_entry(obj: ObjectSchema, key: &str, value: &Json) -> Result<ObjectSchema> {
    if !key.starts_with('_') {
        return Ok(obj.field(key, Schema::from_json(value)?));
    }
    let obj = match (key, value) {
        ("_list", Json::Bool(true)) => obj.list(),
        ("_list", Json::Bool(false)) => obj,
        ("_list", Json::String(item)) => obj.list_of(item.as_str()),
        ("_wrapitem", Json::Bool(flag)) => {
            if *flag {
                obj.wrap_item()
            } else {
                obj
            }
        }
        ("_bareobj", Json::Bool(flag)) => {
            if *flag {
                obj.bare_object()
            } else {
                obj
            }
        }
        ("_order", Json::Array(names)) => {
            let names = names
                .iter()
                .map(|name| {
                    name.as_str().map(str::to_string).ok_or_else(|| {
                        TemplateError::Schema(format!("_order entries must be strings, found {}", name))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            obj.order(names)
        }
        ("_attrs", attrs) => obj.attrs(json_attributes(attrs)?),
        ("_type", Json::String(name)) => match marker_schema(name) {
            Ok(marker) => obj.of_type(marker),
            Err(_) => obj.named_type(name.as_str()),
        },
        ("_type", Json::Object(_)) => obj.of_type(Schema::from_json(value)?),
        ("_types", Json::Object(table)) => {
            let mut obj = obj;
            for (name, schema) in table {
                obj = obj.define_type(name.as_str(), Schema::from_json(schema)?);
            }
            obj
        }
        ("_text", Json::String(text_key)) => obj.text_key(text_key.as_str()),
        ("_result" | "_transform", _) => {
            return Err(TemplateError::Schema(format!(
                "{} needs a function; use the builder API",
                key
            )))
        }
        _ => {
            return Err(TemplateError::Schema(format!(
                "unsupported template key {} = {}",
                key, value
            )))
        }
    };
    Ok(obj)
}

fn json_attributes(json: &Json) -> Result<Attributes> {
    match json {
        Json::Object(entries) => Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), scalar_string(v)))
            .collect()),
        Json::Array(pairs) => pairs
            .iter()
            .map(|pair| {
                let key = pair.get("key").and_then(Json::as_str);
                let val = pair.get("val").map(scalar_string);
                match (key, val) {
                    (Some(key), Some(val)) => Ok((key.to_string(), val)),
                    _ => Err(TemplateError::Schema(format!(
                        "attribute entries need \"key\" and \"val\", found {}",
                        pair
                    ))),
                }
            })
            .collect(),
        other => Err(TemplateError::Schema(format!(
            "_attrs must be an object or a list, found {}",
            other
        ))),
    }
}

fn scalar_string(json: &Json) -> String {
    match json {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<&Json> for Value {
    fn from(json: &Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            Json::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect::<Map>(),
            ),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from(&json)
    }
}

impl Value {
    /// Converts to JSON. Tags become `{"tag", "attrs", "children"}` objects.
    pub fn to_json(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}
