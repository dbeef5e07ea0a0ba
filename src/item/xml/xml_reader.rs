use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, error, warn};

use crate::core::schema::{resolve, ListMode, RenderContext, Resolved, Schema, SchemaFn};
use crate::core::tag::{Attributes, Child, Tag};
use crate::core::value::{coerce_number, Map, Value};
use crate::error::{Result, TemplateError};
use crate::item::xml::event::{Tokenizer, XmlEvent};

/// Builder for reading XML documents through a template.
///
/// # Examples
///
/// ```
/// use xml_template::core::schema::Schema;
/// use xml_template::core::value::Value;
/// use xml_template::item::xml::xml_reader::XmlTemplateReaderBuilder;
///
/// let schema: Schema = Schema::object()
///     .field(
///         "root",
///         Schema::object()
///             .field("first", Schema::String)
///             .field("second", Schema::String),
///     )
///     .into();
///
/// let xml = "<root><first>First</first><second>Second</second><third>Third</third></root>";
///
/// let value = XmlTemplateReaderBuilder::new()
///     .capacity(4096)
///     .parse_str(xml, &schema)
///     .unwrap();
///
/// let root = value.get("root").unwrap();
/// assert_eq!(root.get("first"), Some(&Value::from("First")));
/// assert_eq!(root.get("second"), Some(&Value::from("Second")));
/// assert!(root.get("third").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct XmlTemplateReaderBuilder {
    capacity: usize,
    keep_whitespace: bool,
}

impl Default for XmlTemplateReaderBuilder {
    fn default() -> Self {
        Self {
            capacity: 1024,
            keep_whitespace: false,
        }
    }
}

impl XmlTemplateReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity of the read buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Keeps indentation inside captured tags.
    ///
    /// By default a whitespace-only text run that contains a line break is
    /// dropped, so that indentation between elements does not show up as
    /// children. Runs without a line break, such as the space in
    /// `<b>a</b> <i>b</i>`, are always kept.
    pub fn keep_whitespace(mut self, keep: bool) -> Self {
        self.keep_whitespace = keep;
        self
    }

    /// Reads a document from any [`Read`] source.
    pub fn parse_reader<R: Read>(&self, source: R, schema: &Schema) -> Result<Value> {
        let reader = BufReader::with_capacity(self.capacity, source);
        self.parse_buffered(reader, schema)
    }

    /// Reads a document held in memory.
    pub fn parse_str(&self, xml: &str, schema: &Schema) -> Result<Value> {
        self.parse_buffered(xml.as_bytes(), schema)
    }

    /// Reads a document from a file.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Io`] if the file cannot be opened.
    pub fn parse_path<P: AsRef<Path>>(&self, path: P, schema: &Schema) -> Result<Value> {
        let file_path = path.as_ref();
        let file = File::open(file_path).map_err(|e| {
            error!("Failed to open XML file {}: {}", file_path.display(), e);
            TemplateError::Io(e)
        })?;
        debug!("Reading {}", file_path.display());
        self.parse_reader(file, schema)
    }

    /// Reads a document from an asynchronous source.
    #[cfg(feature = "async")]
    pub async fn parse_async<R>(&self, source: R, schema: &Schema) -> Result<Value>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        use crate::item::xml::event::AsyncTokenizer;

        let mut machine = SchemaReader::new(schema)?.keep_whitespace(self.keep_whitespace);
        let mut tokens =
            AsyncTokenizer::new(tokio::io::BufReader::with_capacity(self.capacity, source));
        loop {
            if let Some(result) = machine.handle(tokens.next_event().await) {
                return result;
            }
        }
    }

    fn parse_buffered<R: BufRead>(&self, source: R, schema: &Schema) -> Result<Value> {
        let mut machine = SchemaReader::new(schema)?.keep_whitespace(self.keep_whitespace);
        let mut tokens = Tokenizer::new(source);
        loop {
            if let Some(result) = machine.handle(tokens.next_event()) {
                return result;
            }
        }
    }
}

/// Reads the file at `path` through `schema`.
pub fn parse<P: AsRef<Path>>(path: P, schema: &Schema) -> Result<Value> {
    XmlTemplateReaderBuilder::new().parse_path(path, schema)
}

/// Reads `source` through `schema`.
pub fn parse_reader<R: Read>(source: R, schema: &Schema) -> Result<Value> {
    XmlTemplateReaderBuilder::new().parse_reader(source, schema)
}

/// Reads an in-memory document through `schema`.
pub fn parse_str(xml: &str, schema: &Schema) -> Result<Value> {
    XmlTemplateReaderBuilder::new().parse_str(xml, schema)
}

fn is_indentation(text: &str) -> bool {
    text.contains('\n') && text.trim().is_empty()
}

enum ScalarKind<'s> {
    String,
    Number,
    Func(&'s SchemaFn),
}

/// What an open element is building.
enum Slot<'s> {
    /// Unmatched; walked for nesting only.
    Skip,
    Scalar {
        kind: ScalarKind<'s>,
        text: String,
    },
    Object {
        map: Map,
        text: Option<String>,
        bare: Option<Value>,
    },
    List {
        items: Vec<Value>,
    },
    Capture {
        children: Vec<Child>,
    },
}

struct Frame<'s> {
    name: String,
    attrs: Attributes,
    schema: Option<Resolved<'s>>,
    slot: Slot<'s>,
}

impl<'s> Frame<'s> {
    fn skip(name: String, attrs: Attributes) -> Self {
        Self {
            name,
            attrs,
            schema: None,
            slot: Slot::Skip,
        }
    }

    fn matched(name: String, attrs: Attributes, resolved: Resolved<'s>) -> Result<Self> {
        let slot = seed(&name, &resolved)?;
        Ok(Self {
            name,
            attrs,
            schema: Some(resolved),
            slot,
        })
    }
}

fn seed<'s>(name: &str, resolved: &Resolved<'s>) -> Result<Slot<'s>> {
    let slot = match resolved.shape {
        Schema::String => Slot::Scalar {
            kind: ScalarKind::String,
            text: String::new(),
        },
        Schema::Number => Slot::Scalar {
            kind: ScalarKind::Number,
            text: String::new(),
        },
        Schema::Func(f) => Slot::Scalar {
            kind: ScalarKind::Func(f),
            text: String::new(),
        },
        Schema::Tag => Slot::Capture {
            children: Vec::new(),
        },
        Schema::Object(obj) => match obj.list_mode() {
            Some(ListMode::Item(item)) => {
                if obj.fields().len() != 1 || !obj.fields().contains_key(item) {
                    return Err(TemplateError::Schema(format!(
                        "list <{}> names item <{}> and must declare exactly that one child, found {}",
                        name,
                        item,
                        obj.fields().len()
                    )));
                }
                Slot::List { items: Vec::new() }
            }
            Some(ListMode::Any) => Slot::List { items: Vec::new() },
            None => Slot::Object {
                map: Map::new(),
                text: resolved.text_key().map(|_| String::new()),
                bare: None,
            },
        },
    };
    Ok(slot)
}

/// Folds a stream of [`XmlEvent`]s into a [`Value`] shaped by a template.
///
/// Feed events with [`SchemaReader::handle`]. The first `Error`, the `End`
/// event, or a template misuse produces the outcome; every later call returns
/// `None`.
///
/// ```
/// use xml_template::core::schema::Schema;
/// use xml_template::core::tag::Attributes;
/// use xml_template::item::xml::event::XmlEvent;
/// use xml_template::item::xml::xml_reader::SchemaReader;
///
/// let schema: Schema = Schema::object().field("n", Schema::Number).into();
/// let mut reader = SchemaReader::new(&schema).unwrap();
///
/// let events = vec![
///     XmlEvent::Open { name: "n".into(), attrs: Attributes::new() },
///     XmlEvent::Text("4".into()),
///     XmlEvent::Text("2".into()),
///     XmlEvent::Close { name: "n".into() },
/// ];
/// for event in events {
///     assert!(reader.handle(event).is_none());
/// }
/// let value = reader.handle(XmlEvent::End).unwrap().unwrap();
/// assert_eq!(value.get("n").and_then(|n| n.as_f64()), Some(42.0));
/// assert!(reader.handle(XmlEvent::End).is_none());
/// ```
pub struct SchemaReader<'s> {
    types: &'s IndexMap<String, Schema>,
    root: Frame<'s>,
    stack: Vec<Frame<'s>>,
    depth: usize,
    keep_whitespace: bool,
    done: bool,
}

impl<'s> SchemaReader<'s> {
    /// Prepares a read. The template root must be an object.
    pub fn new(schema: &'s Schema) -> Result<Self> {
        let Schema::Object(obj) = schema else {
            return Err(TemplateError::Schema(format!(
                "the document template must be an object, found {}",
                schema.kind()
            )));
        };
        let types = obj.types();
        let resolved = resolve(schema, types)?;
        let root = Frame::matched(String::new(), Attributes::new(), resolved)?;
        Ok(Self {
            types,
            root,
            stack: Vec::new(),
            depth: 0,
            keep_whitespace: false,
            done: false,
        })
    }

    pub fn keep_whitespace(mut self, keep: bool) -> Self {
        self.keep_whitespace = keep;
        self
    }

    /// Whether the outcome has already been delivered.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consumes one event.
    ///
    /// Returns `Some` exactly once per reader: the decoded document, or the
    /// first error. Events after that are ignored.
    pub fn handle(&mut self, event: XmlEvent) -> Option<Result<Value>> {
        if self.done {
            return None;
        }
        let outcome = match event {
            XmlEvent::Open { name, attrs } => self.open(name, attrs).map(|_| None),
            XmlEvent::Text(text) => {
                self.text(&text);
                Ok(None)
            }
            XmlEvent::Close { name } => self.close(&name).map(|_| None),
            XmlEvent::Error(e) => Err(e),
            XmlEvent::End => self.end().map(Some),
        };
        match outcome {
            Ok(None) => None,
            Ok(Some(value)) => {
                debug!("Document read");
                self.finish();
                Some(Ok(value))
            }
            Err(e) => {
                error!("Reading stopped: {}", e);
                self.finish();
                Some(Err(e))
            }
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.stack.clear();
        self.root = Frame::skip(String::new(), Attributes::new());
    }

    fn top(&mut self) -> &mut Frame<'s> {
        match self.stack.last_mut() {
            Some(frame) => frame,
            None => &mut self.root,
        }
    }

    fn open(&mut self, name: String, attrs: Attributes) -> Result<()> {
        let types = self.types;
        let parent = self.top();
        let frame = match &parent.slot {
            Slot::Skip | Slot::Scalar { .. } => Frame::skip(name, attrs),
            Slot::Capture { .. } => Frame {
                name,
                attrs,
                schema: None,
                slot: Slot::Capture {
                    children: Vec::new(),
                },
            },
            Slot::Object { .. } | Slot::List { .. } => {
                match parent.schema.as_ref().and_then(|r| r.child(&name)) {
                    Some(child) => Frame::matched(name, attrs, resolve(child, types)?)?,
                    None => {
                        debug!("Skipping unmatched element <{}>", name);
                        Frame::skip(name, attrs)
                    }
                }
            }
        };
        self.depth += 1;
        self.stack.push(frame);
        Ok(())
    }

    fn text(&mut self, chunk: &str) {
        let mut direct = true;
        let frames = self
            .stack
            .iter_mut()
            .rev()
            .chain(std::iter::once(&mut self.root));
        for frame in frames {
            match &mut frame.slot {
                // Markup nested in a scalar still contributes its text.
                Slot::Skip => direct = false,
                Slot::Scalar { text, .. } => {
                    text.push_str(chunk);
                    return;
                }
                Slot::Object {
                    text: Some(text), ..
                } if direct => {
                    text.push_str(chunk);
                    return;
                }
                Slot::Capture { children } if direct => {
                    match children.last_mut() {
                        Some(Child::Text(text)) => text.push_str(chunk),
                        _ => children.push(Child::Text(chunk.to_string())),
                    }
                    return;
                }
                _ => return,
            }
        }
    }

    fn close(&mut self, name: &str) -> Result<()> {
        let Some(frame) = self.stack.pop() else {
            return Err(TemplateError::Xml(format!(
                "closing tag </{}> without an open element",
                name
            )));
        };
        debug_assert_eq!(frame.name, name, "closing tag does not match open element");
        self.depth -= 1;

        let frame_name = frame.name.clone();
        if let Some(value) = self.finalize(frame) {
            self.attach(frame_name, value);
        }
        Ok(())
    }

    fn end(&mut self) -> Result<Value> {
        assert_eq!(self.depth, 0, "document ended inside an element");
        assert!(self.stack.is_empty(), "document ended with open frames");
        let root = std::mem::replace(&mut self.root, Frame::skip(String::new(), Attributes::new()));
        Ok(self.finalize(root).unwrap_or_else(Value::empty_map))
    }

    /// Turns a closed frame into its value. `None` means nothing is recorded.
    fn finalize(&self, frame: Frame<'s>) -> Option<Value> {
        let Frame {
            name,
            attrs,
            schema,
            slot,
        } = frame;

        let mut value = match slot {
            Slot::Skip => return None,
            Slot::Scalar {
                kind: ScalarKind::String,
                text,
            } => Value::String(text),
            Slot::Scalar {
                kind: ScalarKind::Number,
                text,
            } => Value::Number(coerce_number(&text)),
            Slot::Scalar {
                kind: ScalarKind::Func(f),
                text,
            } => {
                let ctx = RenderContext::new(&attrs);
                match f.call(&Value::String(text), &ctx) {
                    Some(rendered) => rendered.into_value(),
                    None => {
                        debug!("Template function dropped <{}>", name);
                        return None;
                    }
                }
            }
            Slot::Object {
                mut map,
                text,
                bare,
            } => match bare {
                Some(value) => value,
                None => {
                    let key = schema.as_ref().and_then(|r| r.text_key());
                    if let (Some(key), Some(text)) = (key, text) {
                        map.insert(key.to_string(), Value::String(text));
                    }
                    Value::Map(map)
                }
            },
            Slot::List { items } => Value::List(items),
            Slot::Capture { children } => {
                let children = self.tidy_capture(children);
                Value::Tag(Tag::from_parts(Some(name), attrs.clone(), children))
            }
        };

        if let Some(resolved) = &schema {
            for hook in resolved.result_fns() {
                if let Some(replacement) = hook(&mut value, &attrs) {
                    value = replacement;
                }
            }
        }
        Some(value)
    }

    fn tidy_capture(&self, children: Vec<Child>) -> Vec<Child> {
        if self.keep_whitespace {
            return children;
        }
        children
            .into_iter()
            .filter(|child| !matches!(child, Child::Text(text) if is_indentation(text)))
            .collect()
    }

    fn attach(&mut self, name: String, value: Value) {
        let parent = self.top();
        let (wrap_item, bare_object) = parent
            .schema
            .as_ref()
            .map(|r| (r.wrap_item(), r.bare_object()))
            .unwrap_or_default();

        match &mut parent.slot {
            Slot::List { items } => {
                if wrap_item {
                    items.push(Value::map([(name, value)]));
                } else {
                    items.push(value);
                }
            }
            Slot::Capture { children } => match value {
                Value::Tag(tag) => children.push(Child::Tag(tag)),
                other => debug!("Dropping non-tag {} inside capture", other.type_name()),
            },
            Slot::Object { map, bare, .. } => {
                if bare_object {
                    if bare.is_some() {
                        warn!(
                            "Bare object <{}> received a second child <{}>; keeping the last one",
                            parent.name, name
                        );
                    }
                    *bare = Some(value);
                } else {
                    map.insert(name, value);
                }
            }
            Slot::Skip | Slot::Scalar { .. } => {}
        }
    }
}
