pub mod common;

use serde_json::json;
use xml_template::{
    core::{
        schema::{Rendered, Schema},
        tag::{Attributes, Child, Tag},
        value::Value,
    },
    error::TemplateError,
    item::xml::{write, write_to_string, write_to_writer, SchemaWriter, XmlTemplateWriterBuilder},
};

const PROLOGUE: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

fn render(schema: &Schema, value: &Value) -> String {
    common::init_logger();
    XmlTemplateWriterBuilder::new()
        .prologue(false)
        .write_to_string(schema, value)
        .unwrap()
}

fn two_strings() -> Schema {
    Schema::from_json(&json!({
        "root": { "first": "String", "second": "String" }
    }))
    .unwrap()
}

#[test]
fn writes_prologue_and_fields() {
    common::init_logger();
    let value = Value::map([("root", Value::map([("first", "Hello"), ("second", "There")]))]);
    let xml = write_to_string(&two_strings(), &value).unwrap();
    assert_eq!(
        xml,
        format!(
            "{}<root>\n  <first>Hello</first>\n  <second>There</second>\n</root>\n",
            PROLOGUE
        )
    );
}

#[test]
fn template_order_wins_over_value_order() {
    let schema = Schema::from_json(&json!({
        "root": { "_order": ["second", "first"], "first": "String", "second": "String" }
    }))
    .unwrap();
    let value = Value::map([("root", Value::map([("first", "Hello"), ("second", "There")]))]);
    assert_eq!(
        render(&schema, &value),
        "<root>\n  <second>There</second>\n  <first>Hello</first>\n</root>\n"
    );
}

#[test]
fn missing_and_null_fields_are_skipped() {
    let schema = Schema::from_json(&json!({
        "root": { "first": "String", "second": "String", "third": "Number" }
    }))
    .unwrap();
    let value = Value::map([(
        "root",
        Value::map([
            ("second", Value::Null),
            ("third", Value::from(7)),
            ("extra", Value::from("ignored")),
        ]),
    )]);
    assert_eq!(render(&schema, &value), "<root>\n  <third>7</third>\n</root>\n");
}

#[test]
fn ordered_names_without_a_template_are_skipped() {
    let schema = Schema::from_json(&json!({
        "root": { "_order": ["a", "ghost", "b"], "a": "String", "b": "Number" }
    }))
    .unwrap();
    let value = Value::map([(
        "root",
        Value::map([
            ("a", Value::from("x")),
            ("ghost", Value::from("boo")),
            ("b", Value::from(2)),
        ]),
    )]);
    let xml = render(&schema, &value);
    assert!(!xml.contains("ghost"));
    assert_eq!(xml, "<root>\n  <a>x</a>\n  <b>2</b>\n</root>\n");
}

#[test]
fn scalars_are_formatted_and_escaped() {
    let schema = Schema::from_json(&json!({
        "root": { "int": "Number", "real": "Number", "flag": "String", "text": "String" }
    }))
    .unwrap();
    let value = Value::map([(
        "root",
        Value::map([
            ("int", Value::from(42)),
            ("real", Value::from(-2.5)),
            ("flag", Value::from(true)),
            ("text", Value::from("a < b & \"c\"")),
        ]),
    )]);
    assert_eq!(
        render(&schema, &value),
        "<root>\n  <int>42</int>\n  <real>-2.5</real>\n  <flag>true</flag>\n  \
         <text>a &lt; b &amp; \"c\"</text>\n</root>\n"
    );
}

#[test]
fn empty_values() {
    let schema: Schema = Schema::object()
        .field(
            "root",
            Schema::object()
                .field("empty", Schema::String)
                .field("obj", Schema::object().field("inner", Schema::String)),
        )
        .into();
    let value = Value::map([(
        "root",
        Value::map([("empty", Value::from("")), ("obj", Value::empty_map())]),
    )]);
    assert_eq!(render(&schema, &value), "<root>\n  <empty></empty>\n  <obj/>\n</root>\n");
}

#[test]
fn named_item_list() {
    let schema = Schema::from_json(&json!({
        "root": { "variables": { "_list": "variable", "variable": { "name": "String", "value": "Number" } } }
    }))
    .unwrap();
    let value = Value::map([(
        "root",
        Value::map([(
            "variables",
            Value::List(vec![
                Value::map([("name", Value::from("x")), ("value", Value::from(1))]),
                Value::map([("name", Value::from("y")), ("value", Value::from(2))]),
            ]),
        )]),
    )]);
    assert_eq!(
        render(&schema, &value),
        "<root>\n  <variables>\n    <variable>\n      <name>x</name>\n      <value>1</value>\n    </variable>\n    \
         <variable>\n      <name>y</name>\n      <value>2</value>\n    </variable>\n  </variables>\n</root>\n"
    );
}

#[test]
fn wrapped_list_names_each_item() {
    let schema = Schema::from_json(&json!({
        "root": { "list": { "_list": true, "_wrapitem": true, "int": "Number", "string": "String" } }
    }))
    .unwrap();
    let value = Value::map([(
        "root",
        Value::map([(
            "list",
            Value::List(vec![
                Value::map([("int", 11)]),
                Value::map([("string", "Foo")]),
                Value::map([("unknown", "dropped")]),
            ]),
        )]),
    )]);
    assert_eq!(
        render(&schema, &value),
        "<root>\n  <list>\n    <int>11</int>\n    <string>Foo</string>\n  </list>\n</root>\n"
    );
}

#[test]
fn unwrapped_list_needs_a_single_candidate() {
    let schema = Schema::from_json(&json!({
        "root": { "list": { "_list": true, "int": "Number", "string": "String" } }
    }))
    .unwrap();
    let value = Value::map([("root", Value::map([("list", Value::from(vec![1, 2]))]))]);
    let err = XmlTemplateWriterBuilder::new()
        .write_to_string(&schema, &value)
        .unwrap_err();
    assert!(matches!(err, TemplateError::Schema(_)));
}

#[test]
fn template_attributes_fixed_and_computed() {
    let schema: Schema = Schema::object()
        .field(
            "root",
            Schema::object()
                .attrs([("version", "1.0"), ("note", "a \"quoted\" & <odd> value")])
                .field(
                    "item",
                    Schema::object()
                        .attrs_with(|v| {
                            let id = v.get("id").and_then(Value::as_str).unwrap_or("none");
                            Attributes::from([("id", id)])
                        })
                        .field("id", Schema::String),
                ),
        )
        .into();
    let value = Value::map([("root", Value::map([("item", Value::map([("id", "i7")]))]))]);
    assert_eq!(
        render(&schema, &value),
        "<root version=\"1.0\" note=\"a &quot;quoted&quot; &amp; &lt;odd&gt; value\">\n  \
         <item id=\"i7\">\n    <id>i7</id>\n  </item>\n</root>\n"
    );
}

#[test]
fn functions_render_objects_as_text() {
    let schema: Schema = Schema::object()
        .field(
            "root",
            Schema::object()
                .field(
                    "point",
                    Schema::func(|v, _| {
                        let x = v.get("x").and_then(Value::as_f64)?;
                        let y = v.get("y").and_then(Value::as_f64)?;
                        Some(Rendered::from(format!("{},{}", x, y)))
                    }),
                )
                .field("count", Schema::func(|v, _| v.as_list().map(|l| Rendered::from(l.len() as f64))))
                .field("marker", Schema::func(|_, _| Some(Rendered::Null))),
        )
        .into();
    let value = Value::map([(
        "root",
        Value::map([
            ("point", Value::map([("x", 3), ("y", 4)])),
            ("count", Value::from(vec!["a", "b", "c"])),
            ("marker", Value::from("ignored")),
        ]),
    )]);
    assert_eq!(
        render(&schema, &value),
        "<root>\n  <point>3,4</point>\n  <count>3</count>\n  <marker/>\n</root>\n"
    );
}

#[test]
fn undefined_function_result_names_the_field() {
    let schema: Schema = Schema::object()
        .field(
            "root",
            Schema::object().field(
                "point",
                Schema::func(|v, _| v.get("x").map(|_| Rendered::from("ok"))),
            ),
        )
        .into();
    let value = Value::map([("root", Value::map([("point", Value::map([("y", 1)]))]))]);
    let err = write_to_string(&schema, &value).unwrap_err();
    assert!(matches!(err, TemplateError::Undefined { field } if field == "point"));
}

#[test]
fn functions_can_emit_tags() {
    let schema: Schema = Schema::object()
        .field(
            "root",
            Schema::object()
                .field(
                    "link",
                    Schema::func(|v, ctx| {
                        ctx.nodent();
                        let href = v.as_str()?;
                        Some(Rendered::from(Tag::with_attrs(
                            "a",
                            [("href", href)],
                            [Child::from(Tag::with("b", "go"))],
                        )))
                    }),
                )
                .field(
                    "block",
                    Schema::func(|v, ctx| {
                        let label = v.as_str()?;
                        Some(Rendered::from(Tag::anonymous([Child::from(ctx.tag("label", label))])))
                    }),
                ),
        )
        .into();
    let value = Value::map([(
        "root",
        Value::map([("link", "/home"), ("block", "Hi")]),
    )]);
    assert_eq!(
        render(&schema, &value),
        "<root>\n  <a href=\"/home\"><b>go</b></a>\n  <block>\n    <label>Hi</label>\n  </block>\n</root>\n"
    );
}

#[test]
fn captured_tags_are_written_back() {
    let schema = Schema::from_json(&json!({ "root": { "title": "String", "body": "Tag" } })).unwrap();
    let body = Tag::with(
        "body",
        [Child::from(Tag::with(
            "p",
            [
                Child::from("Text-"),
                Child::from(Tag::with("em", "italic")),
                Child::from("-end."),
            ],
        ))],
    );
    let value = Value::map([(
        "root",
        Value::map([("title", Value::from("T")), ("body", Value::from(body))]),
    )]);
    assert_eq!(
        render(&schema, &value),
        "<root>\n  <title>T</title>\n  <body>\n    <p>Text-<em>italic</em>-end.</p>\n  </body>\n</root>\n"
    );
}

#[test]
fn transforms_reshape_before_writing() {
    let schema: Schema = Schema::object()
        .field(
            "root",
            Schema::object()
                .transform(|v| {
                    let full = v.get("full").and_then(Value::as_str).unwrap_or_default();
                    let (first, last) = full.split_once(' ').unwrap_or((full, ""));
                    Value::map([("first", first), ("last", last)])
                })
                .field("first", Schema::String)
                .field("last", Schema::String),
        )
        .into();
    let value = Value::map([("root", Value::map([("full", "Ada Lovelace")]))]);
    assert_eq!(
        render(&schema, &value),
        "<root>\n  <first>Ada</first>\n  <last>Lovelace</last>\n</root>\n"
    );
}

#[test]
fn mismatched_value_is_a_schema_error() {
    let value = Value::map([("root", Value::map([("first", Value::from(vec!["a"]))]))]);
    let err = write_to_string(&two_strings(), &value).unwrap_err();
    assert!(matches!(err, TemplateError::Schema(_)));

    let value = Value::map([("root", Value::from("not a map"))]);
    let err = write_to_string(&two_strings(), &value).unwrap_err();
    assert!(matches!(err, TemplateError::Schema(_)));
}

#[test]
fn non_object_document_template_is_rejected() {
    assert!(matches!(
        SchemaWriter::new(&Schema::String, &Value::from("x")),
        Err(TemplateError::Schema(_))
    ));
}

#[test]
fn custom_indent() {
    let value = Value::map([("root", Value::map([("first", "Hello")]))]);
    let xml = XmlTemplateWriterBuilder::new()
        .indent("\t")
        .prologue(false)
        .write_to_string(&two_strings(), &value)
        .unwrap();
    assert_eq!(xml, "<root>\n\t<first>Hello</first>\n</root>\n");
}

#[test]
fn fragments_concatenate_to_the_document() {
    let schema = two_strings();
    let value = Value::map([("root", Value::map([("first", "Hello"), ("second", "There")]))]);
    let mut writer = SchemaWriter::new(&schema, &value).unwrap();
    let mut fragments = Vec::new();
    while let Some(fragment) = writer.next_fragment().unwrap() {
        fragments.push(fragment);
    }
    assert!(fragments.len() > 3);
    assert_eq!(fragments[0], PROLOGUE);
    assert_eq!(fragments.concat(), write_to_string(&schema, &value).unwrap());
    assert!(writer.next_fragment().unwrap().is_none());
}

#[test]
fn writer_stops_after_an_error() {
    let schema: Schema = Schema::object()
        .field("root", Schema::object().field("bad", Schema::func(|_, _| None)))
        .into();
    let value = Value::map([("root", Value::map([("bad", "x")]))]);
    let mut writer = SchemaWriter::new(&schema, &value).unwrap();
    let mut result = Ok(None);
    for _ in 0..16 {
        result = writer.next_fragment();
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(result, Err(TemplateError::Undefined { .. })));
    assert!(writer.next_fragment().unwrap().is_none());
}

#[test]
fn writes_into_writer_and_file() {
    let value = Value::map([("root", Value::map([("first", "Hello")]))]);
    let expected = format!("{}<root>\n  <first>Hello</first>\n</root>\n", PROLOGUE);

    let bytes = write_to_writer(Vec::new(), &two_strings(), &value).unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), expected);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.xml");
    write(&path, &two_strings(), &value).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);
}

#[test]
fn unwritable_path_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("out.xml");
    let value = Value::map([("root", Value::empty_map())]);
    assert!(matches!(
        write(&path, &two_strings(), &value),
        Err(TemplateError::Io(_))
    ));
}
