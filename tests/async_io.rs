pub mod common;

use serde_json::json;
use xml_template::{
    core::{schema::Schema, value::Value},
    error::TemplateError,
    item::xml::{parse_str, write_to_string, XmlTemplateReaderBuilder, XmlTemplateWriterBuilder},
};

fn schema() -> Schema {
    Schema::from_json(&json!({
        "catalog": {
            "title": "String",
            "books": { "_list": "book", "book": { "name": "String", "year": "Number" } }
        }
    }))
    .unwrap()
}

const CATALOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<catalog>
  <title>Shelf &amp; Co</title>
  <books>
    <book><name>Dune</name><year>1965</year></book>
    <book><name>Emma</name><year>1815</year></book>
  </books>
</catalog>"#;

#[tokio::test]
async fn async_read_matches_sync_read() {
    common::init_logger();
    let value = XmlTemplateReaderBuilder::new()
        .capacity(8)
        .parse_async(CATALOG.as_bytes(), &schema())
        .await
        .unwrap();
    assert_eq!(value, parse_str(CATALOG, &schema()).unwrap());
    assert_eq!(
        value.get("catalog").and_then(|c| c.get("title")),
        Some(&Value::from("Shelf & Co"))
    );
}

#[tokio::test]
async fn async_read_reports_malformed_input() {
    let err = XmlTemplateReaderBuilder::new()
        .parse_async("<catalog><title>x</catalog>".as_bytes(), &schema())
        .await
        .unwrap_err();
    assert!(matches!(err, TemplateError::Xml(_)));
}

#[tokio::test]
async fn async_write_matches_sync_write() {
    let value = parse_str(CATALOG, &schema()).unwrap();
    let out = XmlTemplateWriterBuilder::new()
        .capacity(32)
        .write_to_async(Vec::new(), &schema(), &value)
        .await
        .unwrap();
    let written = String::from_utf8(out).unwrap();
    assert_eq!(written, write_to_string(&schema(), &value).unwrap());
    assert!(written.contains("<title>Shelf &amp; Co</title>"));
}

#[tokio::test]
async fn async_round_trip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.xml");
    let value = parse_str(CATALOG, &schema()).unwrap();

    let file = tokio::fs::File::create(&path).await.unwrap();
    XmlTemplateWriterBuilder::new()
        .write_to_async(file, &schema(), &value)
        .await
        .unwrap();

    let file = tokio::fs::File::open(&path).await.unwrap();
    let reread = XmlTemplateReaderBuilder::new()
        .parse_async(file, &schema())
        .await
        .unwrap();
    assert_eq!(reread, value);
}
