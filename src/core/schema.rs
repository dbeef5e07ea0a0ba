//! Structure templates.
//!
//! A [`Schema`] describes the shape an XML document is expected to have. The
//! same tree drives both directions: the reader folds matching elements into a
//! [`Value`], the writer expands a [`Value`] back into elements.
//!
//! Templates are usually assembled with the builder methods of
//! [`ObjectSchema`]:
//!
//! ```
//! use xml_template::core::schema::Schema;
//!
//! let schema: Schema = Schema::object()
//!     .field(
//!         "root",
//!         Schema::object()
//!             .order(["first", "second"])
//!             .field("first", Schema::String)
//!             .field("second", Schema::Number),
//!     )
//!     .into();
//! ```

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::core::tag::{Attributes, Tag, TagArg};
use crate::core::value::Value;
use crate::error::{Result, TemplateError};

/// Post-processing hook run when a matched element closes.
///
/// It receives the in-progress result and the element's attributes. It may
/// edit the result in place, return a replacement, or both.
pub type ResultFn = Arc<dyn Fn(&mut Value, &Attributes) -> Option<Value> + Send + Sync>;

/// Whole-object transform applied to a value before its fields are written.
pub type TransformFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Computes the attributes of an element from the value being written.
pub type AttrsFn = Arc<dyn Fn(&Value) -> Attributes + Send + Sync>;

type RenderFn = dyn Fn(&Value, &RenderContext<'_>) -> Option<Rendered> + Send + Sync;

/// Nesting limit for chains of type indirections.
const MAX_TYPE_DEPTH: usize = 32;

/// A template function.
///
/// On write it receives the value at its position and returns what to emit.
/// On read it receives the element text and returns the decoded value.
/// Returning `None` drops the field on read and aborts the write.
#[derive(Clone)]
pub struct SchemaFn(Arc<RenderFn>);

impl SchemaFn {
    pub fn call(&self, value: &Value, ctx: &RenderContext<'_>) -> Option<Rendered> {
        (self.0)(value, ctx)
    }
}

impl fmt::Debug for SchemaFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SchemaFn(..)")
    }
}

/// One node of a structure template.
#[derive(Clone, Debug)]
pub enum Schema {
    /// Decode the enclosed text as a string.
    String,
    /// Decode the enclosed text as a number.
    Number,
    /// Capture the subtree verbatim as a [`Tag`].
    Tag,
    /// Match child elements by name.
    Object(ObjectSchema),
    /// Compute the value with a function.
    Func(SchemaFn),
}

impl Schema {
    /// Starts an object template.
    pub fn object() -> ObjectSchema {
        ObjectSchema::default()
    }

    /// Wraps a function as a template node.
    pub fn func<F>(f: F) -> Schema
    where
        F: Fn(&Value, &RenderContext<'_>) -> Option<Rendered> + Send + Sync + 'static,
    {
        Schema::Func(SchemaFn(Arc::new(f)))
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Schema::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Schema::String => "String",
            Schema::Number => "Number",
            Schema::Tag => "Tag",
            Schema::Object(_) => "object",
            Schema::Func(_) => "function",
        }
    }
}

impl From<ObjectSchema> for Schema {
    fn from(obj: ObjectSchema) -> Self {
        Schema::Object(obj)
    }
}

/// How an object collapses its children into a sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListMode {
    /// Every child whose name has a field schema becomes an item.
    Any,
    /// Items are the children with this name.
    Item(String),
}

/// Where the effective schema of an object comes from.
#[derive(Clone, Debug)]
pub enum TypeRef {
    Inline(Box<Schema>),
    /// A name in the root template's type table.
    Named(String),
}

/// Attributes emitted on an element when writing.
#[derive(Clone)]
pub enum AttrSource {
    Fixed(Attributes),
    Computed(AttrsFn),
}

impl AttrSource {
    pub fn evaluate(&self, value: &Value) -> Attributes {
        match self {
            AttrSource::Fixed(attrs) => attrs.clone(),
            AttrSource::Computed(f) => f(value),
        }
    }
}

impl fmt::Debug for AttrSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrSource::Fixed(attrs) => f.debug_tuple("Fixed").field(attrs).finish(),
            AttrSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// An object template: expected child elements plus metadata.
#[derive(Clone, Default)]
pub struct ObjectSchema {
    fields: IndexMap<String, Schema>,
    order: Option<Vec<String>>,
    list: Option<ListMode>,
    wrap_item: bool,
    bare_object: bool,
    text_key: Option<String>,
    type_ref: Option<TypeRef>,
    types: IndexMap<String, Schema>,
    attrs: Option<AttrSource>,
    on_result: Option<ResultFn>,
    on_write: Option<TransformFn>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the child element `name` and its template.
    pub fn field<N: Into<String>, S: Into<Schema>>(mut self, name: N, schema: S) -> Self {
        self.fields.insert(name.into(), schema.into());
        self
    }

    /// Sets the order in which fields are written.
    pub fn order<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.order = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Collapses matching children into a sequence.
    pub fn list(mut self) -> Self {
        self.list = Some(ListMode::Any);
        self
    }

    /// Collapses the children named `item` into a sequence.
    pub fn list_of<N: Into<String>>(mut self, item: N) -> Self {
        self.list = Some(ListMode::Item(item.into()));
        self
    }

    /// Keeps each list item under its element name.
    pub fn wrap_item(mut self) -> Self {
        self.wrap_item = true;
        self
    }

    /// Replaces the decoded object with the value of its matching child.
    pub fn bare_object(mut self) -> Self {
        self.bare_object = true;
        self
    }

    /// Captures the element's own text under `key`.
    pub fn text_key<K: Into<String>>(mut self, key: K) -> Self {
        self.text_key = Some(key.into());
        self
    }

    /// Takes the effective shape from an inline template.
    pub fn of_type<S: Into<Schema>>(mut self, schema: S) -> Self {
        self.type_ref = Some(TypeRef::Inline(Box::new(schema.into())));
        self
    }

    /// Takes the effective shape from the root type table.
    pub fn named_type<N: Into<String>>(mut self, name: N) -> Self {
        self.type_ref = Some(TypeRef::Named(name.into()));
        self
    }

    /// Adds an entry to the type table. Only the root template's table is consulted.
    pub fn define_type<N: Into<String>, S: Into<Schema>>(mut self, name: N, schema: S) -> Self {
        self.types.insert(name.into(), schema.into());
        self
    }

    pub fn attrs<A: Into<Attributes>>(mut self, attrs: A) -> Self {
        self.attrs = Some(AttrSource::Fixed(attrs.into()));
        self
    }

    pub fn attrs_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Attributes + Send + Sync + 'static,
    {
        self.attrs = Some(AttrSource::Computed(Arc::new(f)));
        self
    }

    pub fn on_result<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Value, &Attributes) -> Option<Value> + Send + Sync + 'static,
    {
        self.on_result = Some(Arc::new(f));
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.on_write = Some(Arc::new(f));
        self
    }

    pub fn fields(&self) -> &IndexMap<String, Schema> {
        &self.fields
    }

    pub fn list_mode(&self) -> Option<&ListMode> {
        self.list.as_ref()
    }

    pub fn types(&self) -> &IndexMap<String, Schema> {
        &self.types
    }

    /// Field names in emission order.
    ///
    /// An explicit order wins; otherwise declaration order, minus names
    /// starting with `_`.
    pub fn field_order(&self) -> Vec<&str> {
        match &self.order {
            Some(order) => order.iter().map(String::as_str).collect(),
            None => self
                .fields
                .keys()
                .filter(|k| !k.starts_with('_'))
                .map(String::as_str)
                .collect(),
        }
    }
}

impl fmt::Debug for ObjectSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSchema")
            .field("fields", &self.fields)
            .field("order", &self.order)
            .field("list", &self.list)
            .field("wrap_item", &self.wrap_item)
            .field("bare_object", &self.bare_object)
            .field("text_key", &self.text_key)
            .field("type_ref", &self.type_ref)
            .field("types", &self.types)
            .field("attrs", &self.attrs)
            .field("on_result", &self.on_result.is_some())
            .field("on_write", &self.on_write.is_some())
            .finish()
    }
}

/// What a template function produces.
#[derive(Clone, Debug, PartialEq)]
pub enum Rendered {
    Text(String),
    Number(f64),
    /// Keep the element but give it no content.
    Null,
    /// Emit this tag; a nameless tag takes the field name.
    Tag(Tag),
}

impl Rendered {
    pub fn into_value(self) -> Value {
        match self {
            Rendered::Text(s) => Value::String(s),
            Rendered::Number(n) => Value::Number(n),
            Rendered::Null => Value::Null,
            Rendered::Tag(tag) => Value::Tag(tag),
        }
    }
}

impl From<&str> for Rendered {
    fn from(s: &str) -> Self {
        Rendered::Text(s.to_string())
    }
}

impl From<String> for Rendered {
    fn from(s: String) -> Self {
        Rendered::Text(s)
    }
}

impl From<f64> for Rendered {
    fn from(n: f64) -> Self {
        Rendered::Number(n)
    }
}

impl From<Tag> for Rendered {
    fn from(tag: Tag) -> Self {
        Rendered::Tag(tag)
    }
}

/// Helper handed to template functions.
pub struct RenderContext<'a> {
    attrs: &'a Attributes,
    nodent: Cell<bool>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(attrs: &'a Attributes) -> Self {
        Self {
            attrs,
            nodent: Cell::new(false),
        }
    }

    /// Attributes of the element being read. Empty when writing.
    pub fn attrs(&self) -> &Attributes {
        self.attrs
    }

    /// Builds a tag, same argument convention as [`Tag::with`].
    pub fn tag<N: Into<String>, A: Into<TagArg>>(&self, name: N, arg: A) -> Tag {
        Tag::with(name, arg)
    }

    /// Writes this element's content inline, without indentation.
    pub fn nodent(&self) {
        self.nodent.set(true);
    }

    pub(crate) fn is_nodent(&self) -> bool {
        self.nodent.get()
    }
}

/// A template with its type indirections followed.
///
/// `shape` is the final node of the chain. `overlays` are the objects that
/// pointed onward, outermost first; their metadata applies on top of the shape.
#[derive(Clone, Debug)]
pub(crate) struct Resolved<'s> {
    pub shape: &'s Schema,
    overlays: Vec<&'s ObjectSchema>,
}

impl<'s> Resolved<'s> {
    pub fn object(&self) -> Option<&'s ObjectSchema> {
        self.shape.as_object()
    }

    /// Metadata layers, innermost first.
    fn layers(&self) -> impl Iterator<Item = &'s ObjectSchema> + '_ {
        self.object()
            .into_iter()
            .chain(self.overlays.iter().rev().copied())
    }

    pub fn child(&self, name: &str) -> Option<&'s Schema> {
        self.object().and_then(|obj| obj.fields.get(name))
    }

    pub fn list_mode(&self) -> Option<&'s ListMode> {
        self.object().and_then(|obj| obj.list.as_ref())
    }

    pub fn wrap_item(&self) -> bool {
        self.layers().any(|layer| layer.wrap_item)
    }

    pub fn bare_object(&self) -> bool {
        self.layers().any(|layer| layer.bare_object)
    }

    pub fn text_key(&self) -> Option<&'s str> {
        self.layers().find_map(|layer| layer.text_key.as_deref())
    }

    /// The outermost attribute source.
    pub fn attrs(&self) -> Option<&'s AttrSource> {
        self.overlays
            .iter()
            .copied()
            .chain(self.object())
            .find_map(|layer| layer.attrs.as_ref())
    }

    /// Result hooks, innermost first.
    pub fn result_fns(&self) -> Vec<&'s ResultFn> {
        self.layers().filter_map(|layer| layer.on_result.as_ref()).collect()
    }

    /// Write transforms, outermost first.
    pub fn write_transforms(&self) -> Vec<&'s TransformFn> {
        self.overlays
            .iter()
            .copied()
            .chain(self.object())
            .filter_map(|layer| layer.on_write.as_ref())
            .collect()
    }
}

/// Follows type indirections starting at `schema`.
pub(crate) fn resolve<'s>(
    schema: &'s Schema,
    types: &'s IndexMap<String, Schema>,
) -> Result<Resolved<'s>> {
    let mut overlays = Vec::new();
    let mut current = schema;
    for _ in 0..MAX_TYPE_DEPTH {
        let next = match current {
            Schema::Object(obj) => match &obj.type_ref {
                Some(TypeRef::Inline(inner)) => inner.as_ref(),
                Some(TypeRef::Named(name)) => types.get(name).ok_or_else(|| {
                    TemplateError::Schema(format!("unknown type name '{}'", name))
                })?,
                None => break,
            },
            _ => break,
        };
        if let Schema::Object(obj) = current {
            overlays.push(obj);
        }
        current = next;
    }
    if let Schema::Object(ObjectSchema {
        type_ref: Some(_), ..
    }) = current
    {
        return Err(TemplateError::Schema(format!(
            "type indirection nested deeper than {} levels",
            MAX_TYPE_DEPTH
        )));
    }
    Ok(Resolved {
        shape: current,
        overlays,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order_defaults_to_declaration_order() {
        let obj = Schema::object()
            .field("b", Schema::String)
            .field("_hidden", Schema::String)
            .field("a", Schema::Number);
        assert_eq!(obj.field_order(), ["b", "a"]);

        let obj = obj.order(["a", "missing", "b"]);
        assert_eq!(obj.field_order(), ["a", "missing", "b"]);
    }

    #[test]
    fn named_types_resolve_through_the_table() {
        let root = Schema::object().define_type(
            "keyval",
            Schema::object()
                .field("key", Schema::String)
                .field("value", Schema::String),
        );
        let entry: Schema = Schema::object().named_type("keyval").wrap_item().into();

        let resolved = resolve(&entry, root.types()).unwrap();
        assert!(resolved.child("key").is_some());
        assert!(resolved.child("nope").is_none());
        assert!(resolved.wrap_item());
    }

    #[test]
    fn inline_scalar_type_keeps_overlay_hooks() {
        let int: Schema = Schema::object()
            .of_type(Schema::Number)
            .on_result(|v, _| v.as_f64().map(|n| Value::Number(-n)))
            .into();
        let types = IndexMap::new();

        let resolved = resolve(&int, &types).unwrap();
        assert!(matches!(resolved.shape, Schema::Number));
        assert_eq!(resolved.result_fns().len(), 1);
        assert!(resolved.object().is_none());
    }

    #[test]
    fn unknown_type_name_is_a_schema_error() {
        let entry: Schema = Schema::object().named_type("missing").into();
        let types = IndexMap::new();
        let err = resolve(&entry, &types).unwrap_err();
        assert!(matches!(err, TemplateError::Schema(msg) if msg.contains("missing")));
    }

    #[test]
    fn cyclic_types_are_rejected() {
        let mut types = IndexMap::new();
        types.insert("a".to_string(), Schema::object().named_type("b").into());
        types.insert("b".to_string(), Schema::object().named_type("a").into());
        let start: Schema = Schema::object().named_type("a").into();

        assert!(matches!(
            resolve(&start, &types),
            Err(TemplateError::Schema(_))
        ));
    }

    #[test]
    fn outer_attributes_win() {
        let inner = Schema::object().attrs([("k", "inner")]);
        let outer: Schema = Schema::object().attrs([("k", "outer")]).of_type(inner).into();
        let types = IndexMap::new();

        let resolved = resolve(&outer, &types).unwrap();
        let attrs = resolved.attrs().unwrap().evaluate(&Value::Null);
        assert_eq!(attrs.get("k"), Some("outer"));
    }

    #[test]
    fn render_context_records_nodent() {
        let attrs = Attributes::from([("id", "7")]);
        let ctx = RenderContext::new(&attrs);
        assert!(!ctx.is_nodent());
        ctx.nodent();
        assert!(ctx.is_nodent());
        assert_eq!(ctx.attrs().get("id"), Some("7"));
        assert_eq!(ctx.tag("b", "x"), Tag::with("b", "x"));
    }
}
