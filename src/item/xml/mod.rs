/// XML support for reading and writing values through structure templates.
///
/// This module provides the two directions of the codec. The reader folds a
/// `quick-xml` token stream into a [`Value`](crate::core::value::Value) shaped
/// by a [`Schema`](crate::core::schema::Schema); the writer expands a value back
/// into indented XML, pausing whenever its output buffer is full.
///
/// # Features
///
/// - Extract a subset of a larger document: unknown elements are skipped
/// - Collapse repeated children into lists, optionally keeping their names
/// - Capture mixed content verbatim as [`Tag`](crate::core::tag::Tag) values
/// - Post-process decoded objects with their source attributes
/// - Bounded output with drain-based backpressure
///
/// # Examples
///
/// ## Reading lists
///
/// ```
/// use xml_template::core::schema::Schema;
/// use xml_template::core::value::Value;
/// use xml_template::item::xml::parse_str;
///
/// let schema: Schema = Schema::object()
///     .field(
///         "list",
///         Schema::object().list().field(
///             "item",
///             Schema::object()
///                 .field("name", Schema::String)
///                 .field("count", Schema::Number),
///         ),
///     )
///     .into();
///
/// let xml = r#"
/// <list>
///   <item><name>First</name><count>4</count></item>
///   <item><name>Second</name></item>
/// </list>
/// "#;
///
/// let value = parse_str(xml, &schema).unwrap();
/// assert_eq!(
///     value,
///     Value::map([(
///         "list",
///         Value::List(vec![
///             Value::map([("name", Value::from("First")), ("count", Value::from(4))]),
///             Value::map([("name", "Second")]),
///         ]),
///     )])
/// );
/// ```
///
/// ## Writing with computed content
///
/// ```
/// use xml_template::core::schema::{Rendered, Schema};
/// use xml_template::core::value::Value;
/// use xml_template::item::xml::XmlTemplateWriterBuilder;
///
/// let schema: Schema = Schema::object()
///     .field(
///         "path",
///         Schema::func(|v, _| {
///             let parts: Vec<&str> = v
///                 .as_list()?
///                 .iter()
///                 .filter_map(Value::as_str)
///                 .collect();
///             Some(Rendered::from(parts.join("/")))
///         }),
///     )
///     .into();
///
/// let value = Value::map([("path", vec!["usr", "local", "bin"])]);
///
/// let xml = XmlTemplateWriterBuilder::new()
///     .prologue(false)
///     .write_to_string(&schema, &value)
///     .unwrap();
/// assert_eq!(xml, "<path>usr/local/bin</path>\n");
/// ```
pub mod escape;
pub mod event;
pub mod sink;
pub mod xml_reader;
pub mod xml_writer;

pub use event::{Tokenizer, XmlEvent};
pub use sink::{BufferedSink, Sink};
pub use xml_reader::{parse, parse_reader, parse_str, SchemaReader, XmlTemplateReaderBuilder};
pub use xml_writer::{write, write_to_string, write_to_writer, SchemaWriter, XmlTemplateWriterBuilder};
