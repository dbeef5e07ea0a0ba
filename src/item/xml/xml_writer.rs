use std::borrow::Cow;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, error};

use crate::core::schema::{resolve, ListMode, ObjectSchema, RenderContext, Rendered, Resolved, Schema};
use crate::core::tag::{Attributes, Child, Tag};
use crate::core::value::{format_number, Value};
use crate::error::{Result, TemplateError};
use crate::item::xml::escape::{escape_attr, escape_text};
use crate::item::xml::sink::{BufferedSink, Sink};

const PROLOGUE: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Builder for writing values as XML through a template.
///
/// # Examples
///
/// ```
/// use xml_template::core::schema::Schema;
/// use xml_template::core::value::Value;
/// use xml_template::item::xml::xml_writer::XmlTemplateWriterBuilder;
///
/// let schema: Schema = Schema::object()
///     .field(
///         "root",
///         Schema::object()
///             .order(["first", "second"])
///             .field("first", Schema::String)
///             .field("second", Schema::String),
///     )
///     .into();
///
/// let value = Value::map([(
///     "root",
///     Value::map([("second", "There"), ("first", "Hello")]),
/// )]);
///
/// let xml = XmlTemplateWriterBuilder::new()
///     .indent("  ")
///     .write_to_string(&schema, &value)
///     .unwrap();
///
/// assert_eq!(
///     xml,
///     "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
///      <root>\n  <first>Hello</first>\n  <second>There</second>\n</root>\n"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct XmlTemplateWriterBuilder {
    indent: String,
    capacity: usize,
    prologue: bool,
}

impl Default for XmlTemplateWriterBuilder {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            capacity: 8192,
            prologue: true,
        }
    }
}

impl XmlTemplateWriterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the text written once per nesting level.
    pub fn indent(mut self, indent: &str) -> Self {
        self.indent = indent.to_string();
        self
    }

    /// Sets the size of the output buffer, in bytes, past which the writer
    /// waits for a drain.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Whether to start the output with the XML declaration.
    pub fn prologue(mut self, prologue: bool) -> Self {
        self.prologue = prologue;
        self
    }

    fn writer<'s>(&self, schema: &'s Schema, value: &'s Value) -> Result<SchemaWriter<'s>> {
        Ok(SchemaWriter::new(schema, value)?
            .indent(&self.indent)
            .prologue(self.prologue))
    }

    /// Writes into a caller-supplied [`Sink`], honouring its backpressure.
    pub fn write_to_sink<S: Sink>(&self, sink: &mut S, schema: &Schema, value: &Value) -> Result<()> {
        let mut writer = self.writer(schema, value)?;
        while let Some(fragment) = writer.next_fragment()? {
            if !sink.write_chunk(&fragment)? {
                debug!("Output buffer full, waiting for drain");
                sink.drain()?;
            }
        }
        sink.end()?;
        Ok(())
    }

    /// Writes into any [`Write`] and hands it back.
    pub fn write_to_writer<W: Write>(&self, writer: W, schema: &Schema, value: &Value) -> Result<W> {
        let mut sink = BufferedSink::new(writer, self.capacity);
        self.write_to_sink(&mut sink, schema, value)?;
        Ok(sink.into_inner())
    }

    /// Creates (or truncates) the file at `path` and writes into it.
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P, schema: &Schema, value: &Value) -> Result<()> {
        let file_path = path.as_ref();
        let file = File::create(file_path).map_err(|e| {
            error!("Failed to create XML file {}: {}", file_path.display(), e);
            TemplateError::Io(e)
        })?;
        debug!("Writing {}", file_path.display());
        self.write_to_writer(file, schema, value)?;
        Ok(())
    }

    pub fn write_to_string(&self, schema: &Schema, value: &Value) -> Result<String> {
        let bytes = self.write_to_writer(Vec::new(), schema, value)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Writes into an asynchronous destination and hands it back.
    #[cfg(feature = "async")]
    pub async fn write_to_async<W>(&self, mut out: W, schema: &Schema, value: &Value) -> Result<W>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        use tokio::io::AsyncWriteExt;

        let mut writer = self.writer(schema, value)?;
        let mut buffer = String::with_capacity(self.capacity);
        while let Some(fragment) = writer.next_fragment()? {
            buffer.push_str(&fragment);
            if buffer.len() >= self.capacity {
                debug!("Output buffer full, waiting for drain");
                out.write_all(buffer.as_bytes()).await?;
                buffer.clear();
            }
        }
        out.write_all(buffer.as_bytes()).await?;
        out.flush().await?;
        Ok(out)
    }
}

/// Writes `value` to a new file at `path` through `schema`.
pub fn write<P: AsRef<Path>>(path: P, schema: &Schema, value: &Value) -> Result<()> {
    XmlTemplateWriterBuilder::new().write_to_path(path, schema, value)
}

/// Writes `value` into `writer` through `schema`.
pub fn write_to_writer<W: Write>(writer: W, schema: &Schema, value: &Value) -> Result<W> {
    XmlTemplateWriterBuilder::new().write_to_writer(writer, schema, value)
}

/// Renders `value` through `schema` as a string.
pub fn write_to_string(schema: &Schema, value: &Value) -> Result<String> {
    XmlTemplateWriterBuilder::new().write_to_string(schema, value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Open,
    Children,
    Final,
}

/// How a node finds its content at `Init`.
enum Plan<'s> {
    Field {
        schema: &'s Schema,
        value: Cow<'s, Value>,
    },
    Tag(Cow<'s, Tag>),
}

/// A child waiting to be written.
enum Pending<'s> {
    Text(String),
    Field {
        name: String,
        schema: &'s Schema,
        value: Cow<'s, Value>,
    },
    Tag(Cow<'s, Tag>),
}

struct Node<'s> {
    phase: Phase,
    /// `None` only for the document node.
    name: Option<String>,
    plan: Option<Plan<'s>>,
    attrs: Attributes,
    children: VecDeque<Pending<'s>>,
    depth: usize,
    parent_inline: bool,
    inline: bool,
}

impl<'s> Node<'s> {
    fn new(name: Option<String>, plan: Plan<'s>, depth: usize, parent_inline: bool) -> Self {
        Self {
            phase: Phase::Init,
            name,
            plan: Some(plan),
            attrs: Attributes::new(),
            children: VecDeque::new(),
            depth,
            parent_inline,
            inline: parent_inline,
        }
    }

    fn is_document(&self) -> bool {
        self.depth == 0
    }
}

/// Expands a value through a template into XML text, one fragment at a time.
///
/// The node tree is built lazily: an element's children are worked out only
/// when the element is reached. Fragments come out of a FIFO queue in
/// document order, so a caller that pauses between two calls to
/// [`SchemaWriter::next_fragment`] neither loses nor repeats output.
///
/// ```
/// use xml_template::core::schema::Schema;
/// use xml_template::core::value::Value;
/// use xml_template::item::xml::xml_writer::SchemaWriter;
///
/// let schema: Schema = Schema::object().field("n", Schema::Number).into();
/// let value = Value::map([("n", 3)]);
///
/// let mut writer = SchemaWriter::new(&schema, &value).unwrap().prologue(false);
/// let mut out = String::new();
/// while let Some(fragment) = writer.next_fragment().unwrap() {
///     out.push_str(&fragment);
/// }
/// assert_eq!(out, "<n>3</n>\n");
/// ```
pub struct SchemaWriter<'s> {
    types: &'s IndexMap<String, Schema>,
    nodes: Vec<Node<'s>>,
    queue: VecDeque<String>,
    indent: String,
    prologue: bool,
}

impl<'s> SchemaWriter<'s> {
    /// Prepares a write. The template root must be an object.
    pub fn new(schema: &'s Schema, value: &'s Value) -> Result<Self> {
        let Schema::Object(obj) = schema else {
            return Err(TemplateError::Schema(format!(
                "the document template must be an object, found {}",
                schema.kind()
            )));
        };
        let document = Node::new(
            None,
            Plan::Field {
                schema,
                value: Cow::Borrowed(value),
            },
            0,
            false,
        );
        Ok(Self {
            types: obj.types(),
            nodes: vec![document],
            queue: VecDeque::new(),
            indent: "  ".to_string(),
            prologue: true,
        })
    }

    pub fn indent(mut self, indent: &str) -> Self {
        self.indent = indent.to_string();
        self
    }

    pub fn prologue(mut self, prologue: bool) -> Self {
        self.prologue = prologue;
        self
    }

    /// Returns the next piece of output, or `None` once the document is complete.
    ///
    /// After an error the writer is empty and keeps returning `None`.
    pub fn next_fragment(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(fragment) = self.queue.pop_front() {
                return Ok(Some(fragment));
            }
            if self.nodes.is_empty() {
                return Ok(None);
            }
            if let Err(e) = self.step() {
                error!("Writing stopped: {}", e);
                self.nodes.clear();
                self.queue.clear();
                return Err(e);
            }
        }
    }

    fn step(&mut self) -> Result<()> {
        let Some(mut node) = self.nodes.pop() else {
            return Ok(());
        };
        match node.phase {
            Phase::Init => {
                self.expand(&mut node)?;
                node.phase = Phase::Open;
                self.nodes.push(node);
            }
            Phase::Open => self.open(node),
            Phase::Children => match node.children.pop_front() {
                None => {
                    node.phase = Phase::Final;
                    self.nodes.push(node);
                }
                Some(Pending::Text(text)) => {
                    self.queue.push_back(escape_text(&text).into_owned());
                    self.nodes.push(node);
                }
                Some(Pending::Field {
                    name,
                    schema,
                    value,
                }) => {
                    let child = Node::new(
                        Some(name),
                        Plan::Field { schema, value },
                        node.depth + 1,
                        node.inline,
                    );
                    self.nodes.push(node);
                    self.nodes.push(child);
                }
                Some(Pending::Tag(tag)) => {
                    let name = tag.name().map(str::to_string);
                    let child = Node::new(name, Plan::Tag(tag), node.depth + 1, node.inline);
                    self.nodes.push(node);
                    self.nodes.push(child);
                }
            },
            Phase::Final => self.close(node),
        }
        Ok(())
    }

    fn open(&mut self, mut node: Node<'s>) {
        if node.is_document() {
            if self.prologue {
                self.queue.push_back(PROLOGUE.to_string());
            }
            node.phase = Phase::Children;
            self.nodes.push(node);
            return;
        }

        let mut out = String::new();
        if !node.parent_inline {
            out.push_str(&self.indent.repeat(node.depth - 1));
        }
        out.push('<');
        out.push_str(node.name.as_deref().unwrap_or_default());
        for attr in node.attrs.iter() {
            out.push(' ');
            out.push_str(&attr.key);
            out.push_str("=\"");
            out.push_str(&escape_attr(&attr.value));
            out.push('"');
        }

        if node.children.is_empty() {
            out.push_str("/>");
            if !node.parent_inline {
                out.push('\n');
            }
            self.queue.push_back(out);
            return;
        }

        out.push('>');
        if !node.inline {
            out.push('\n');
        }
        self.queue.push_back(out);
        node.phase = Phase::Children;
        self.nodes.push(node);
    }

    fn close(&mut self, node: Node<'s>) {
        if node.is_document() {
            return;
        }
        let mut out = String::new();
        if !node.inline {
            out.push_str(&self.indent.repeat(node.depth - 1));
        }
        out.push_str("</");
        out.push_str(node.name.as_deref().unwrap_or_default());
        out.push('>');
        if !node.parent_inline {
            out.push('\n');
        }
        self.queue.push_back(out);
    }

    /// Works out a node's attributes and children.
    fn expand(&self, node: &mut Node<'s>) -> Result<()> {
        let Some(plan) = node.plan.take() else {
            return Ok(());
        };
        let nodent = match plan {
            Plan::Tag(tag) => {
                apply_tag(node, tag);
                false
            }
            Plan::Field { schema, value } => self.expand_field(node, schema, value)?,
        };
        node.inline = nodent
            || node.parent_inline
            || node.children.iter().any(|child| matches!(child, Pending::Text(_)));
        Ok(())
    }

    /// Returns whether the template asked for inline output.
    fn expand_field(&self, node: &mut Node<'s>, schema: &'s Schema, value: Cow<'s, Value>) -> Result<bool> {
        let field = node.name.clone().unwrap_or_default();
        let resolved = resolve(schema, self.types)?;

        let mut value = value;
        for transform in resolved.write_transforms() {
            value = Cow::Owned(transform(value.as_ref()));
        }
        if let Some(source) = resolved.attrs() {
            node.attrs = source.evaluate(&value);
        }

        match resolved.shape {
            Schema::Func(f) => {
                let no_attrs = Attributes::new();
                let ctx = RenderContext::new(&no_attrs);
                let rendered = f
                    .call(&value, &ctx)
                    .ok_or_else(|| TemplateError::Undefined {
                        field: field.clone(),
                    })?;
                match rendered {
                    Rendered::Text(text) => node.children.push_back(Pending::Text(text)),
                    Rendered::Number(n) => node.children.push_back(Pending::Text(format_number(n))),
                    Rendered::Null => {}
                    Rendered::Tag(tag) => apply_tag(node, Cow::Owned(tag)),
                }
                return Ok(ctx.is_nodent());
            }
            Schema::String | Schema::Number => {
                if let Some(text) = scalar_text(&value, &field, resolved.shape)? {
                    node.children.push_back(Pending::Text(text));
                }
            }
            Schema::Tag => match value {
                Cow::Borrowed(Value::Tag(tag)) => apply_tag(node, Cow::Borrowed(tag)),
                Cow::Owned(Value::Tag(tag)) => apply_tag(node, Cow::Owned(tag)),
                other => {
                    if let Some(text) = scalar_text(&other, &field, resolved.shape)? {
                        node.children.push_back(Pending::Text(text));
                    }
                }
            },
            Schema::Object(obj) => self.expand_object(node, &resolved, obj, value, &field)?,
        }
        Ok(false)
    }

    fn expand_object(
        &self,
        node: &mut Node<'s>,
        resolved: &Resolved<'s>,
        obj: &'s ObjectSchema,
        value: Cow<'s, Value>,
        field: &str,
    ) -> Result<()> {
        if let Some(key) = resolved.text_key() {
            if let Some(text) = value.get(key) {
                if let Some(text) = scalar_text(text, key, &Schema::String)? {
                    node.children.push_back(Pending::Text(text));
                }
            }
        }

        let Some(mode) = obj.list_mode() else {
            return self.expand_fields(node, obj, value, field);
        };

        let wrap_item = resolved.wrap_item();
        match mode {
            ListMode::Item(item_name) => {
                let schema = obj
                    .fields()
                    .get(item_name)
                    .filter(|_| obj.fields().len() == 1)
                    .ok_or_else(|| {
                        TemplateError::Schema(format!(
                            "list <{}> names item <{}> and must declare exactly that one child",
                            field, item_name
                        ))
                    })?;
                for item in items_of(value, field)? {
                    let item = if wrap_item {
                        unwrap_item(item, item_name)
                    } else {
                        item
                    };
                    node.children.push_back(Pending::Field {
                        name: item_name.clone(),
                        schema,
                        value: item,
                    });
                }
            }
            ListMode::Any if wrap_item => {
                for item in items_of(value, field)? {
                    push_wrapped(node, obj, item, field)?;
                }
            }
            ListMode::Any => {
                let mut candidates = obj.fields().iter();
                let (item_name, schema) = match (candidates.next(), candidates.next()) {
                    (Some(only), None) => only,
                    _ => {
                        return Err(TemplateError::Schema(format!(
                            "list <{}> has {} candidate item elements; wrap the items to name each one",
                            field,
                            obj.fields().len()
                        )))
                    }
                };
                for item in items_of(value, field)? {
                    node.children.push_back(Pending::Field {
                        name: item_name.clone(),
                        schema,
                        value: item,
                    });
                }
            }
        }
        Ok(())
    }

    fn expand_fields(
        &self,
        node: &mut Node<'s>,
        obj: &'s ObjectSchema,
        value: Cow<'s, Value>,
        field: &str,
    ) -> Result<()> {
        match value.as_ref() {
            Value::Null => return Ok(()),
            Value::Map(_) => {}
            other => {
                return Err(TemplateError::Schema(format!(
                    "object <{}> needs a map value, found {}",
                    field,
                    other.type_name()
                )))
            }
        }
        for name in obj.field_order() {
            let Some(schema) = obj.fields().get(name) else {
                continue;
            };
            let Some(field_value) = field_of(&value, name) else {
                continue;
            };
            if field_value.is_null() {
                continue;
            }
            node.children.push_back(Pending::Field {
                name: name.to_string(),
                schema,
                value: field_value,
            });
        }
        Ok(())
    }
}

/// Takes name, attributes and children from `tag`.
///
/// A named tag renames the element; a nameless one keeps the field name.
/// Tag attributes replace template attributes when present.
fn apply_tag<'s>(node: &mut Node<'s>, tag: Cow<'s, Tag>) {
    if let Some(name) = tag.name() {
        node.name = Some(name.to_string());
    }
    if !tag.attrs().is_empty() {
        node.attrs = tag.attrs().clone();
    }
    push_tag_children(&mut node.children, tag);
}

/// Queues the children of `tag`. Nameless child tags are spliced in place.
fn push_tag_children<'s>(out: &mut VecDeque<Pending<'s>>, tag: Cow<'s, Tag>) {
    match tag {
        Cow::Borrowed(tag) => {
            for child in tag.children() {
                match child {
                    Child::Text(text) => out.push_back(Pending::Text(text.clone())),
                    Child::Tag(inner) if inner.name().is_none() => {
                        push_tag_children(out, Cow::Borrowed(inner))
                    }
                    Child::Tag(inner) => out.push_back(Pending::Tag(Cow::Borrowed(inner))),
                }
            }
        }
        Cow::Owned(tag) => {
            for child in tag.into_children() {
                match child {
                    Child::Text(text) => out.push_back(Pending::Text(text)),
                    Child::Tag(inner) if inner.name().is_none() => {
                        push_tag_children(out, Cow::Owned(inner))
                    }
                    Child::Tag(inner) => out.push_back(Pending::Tag(Cow::Owned(inner))),
                }
            }
        }
    }
}

fn scalar_text(value: &Value, field: &str, shape: &Schema) -> Result<Option<String>> {
    match value {
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(format_number(*n))),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Null => Ok(None),
        other => Err(TemplateError::Schema(format!(
            "cannot write {} <{}> as {}",
            other.type_name(),
            field,
            shape.kind()
        ))),
    }
}

fn field_of<'s>(value: &Cow<'s, Value>, key: &str) -> Option<Cow<'s, Value>> {
    match value {
        Cow::Borrowed(v) => {
            let v: &'s Value = *v;
            v.get(key).map(Cow::Borrowed)
        }
        Cow::Owned(v) => v.get(key).cloned().map(Cow::Owned),
    }
}

fn items_of<'s>(value: Cow<'s, Value>, field: &str) -> Result<Vec<Cow<'s, Value>>> {
    match value {
        Cow::Borrowed(Value::List(items)) => Ok(items.iter().map(Cow::Borrowed).collect()),
        Cow::Owned(Value::List(items)) => Ok(items.into_iter().map(Cow::Owned).collect()),
        Cow::Borrowed(Value::Null) | Cow::Owned(Value::Null) => Ok(Vec::new()),
        other => Err(TemplateError::Schema(format!(
            "list <{}> needs a list value, found {}",
            field,
            other.type_name()
        ))),
    }
}

/// Strips the `{item: ...}` wrapper a wrapped list item carries.
fn unwrap_item<'s>(item: Cow<'s, Value>, name: &str) -> Cow<'s, Value> {
    let wrapped = matches!(item.as_ref(), Value::Map(map) if map.len() == 1 && map.contains_key(name));
    if !wrapped {
        return item;
    }
    match item {
        Cow::Borrowed(value) => value.get(name).map_or(Cow::Borrowed(value), Cow::Borrowed),
        Cow::Owned(Value::Map(mut map)) => map
            .swap_remove(name)
            .map_or(Cow::Owned(Value::Null), Cow::Owned),
        Cow::Owned(other) => Cow::Owned(other),
    }
}

/// Queues the entries of a wrapped item whose names the list declares.
fn push_wrapped<'s>(
    node: &mut Node<'s>,
    obj: &'s ObjectSchema,
    item: Cow<'s, Value>,
    field: &str,
) -> Result<()> {
    let entries: Vec<(String, Cow<'s, Value>)> = match item {
        Cow::Borrowed(Value::Map(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), Cow::Borrowed(v)))
            .collect(),
        Cow::Owned(Value::Map(map)) => map.into_iter().map(|(k, v)| (k, Cow::Owned(v))).collect(),
        other => {
            return Err(TemplateError::Schema(format!(
                "items of wrapped list <{}> must be maps, found {}",
                field,
                other.type_name()
            )))
        }
    };
    for (name, value) in entries {
        match obj.fields().get(&name) {
            Some(schema) => node.children.push_back(Pending::Field {
                name,
                schema,
                value,
            }),
            None => debug!("Skipping undeclared item <{}> in list <{}>", name, field),
        }
    }
    Ok(())
}
