#![cfg_attr(docsrs, feature(doc_cfg))]
//#![warn(missing_docs)]

/*!
 # XML Template

 Read and write XML documents through declarative **structure templates**
 instead of generated parsers or serde derives.

 A template says which elements matter and what they mean. Reading folds
 matching elements into a [`Value`] tree and quietly skips everything else,
 so a small template can pick a few fields out of a large document. Writing
 walks a [`Value`] through the same kind of template and emits indented XML,
 one fragment at a time, pausing whenever the output buffer is full.

 ## Core Concepts

- **Schema:** a template node. Either a scalar marker (`String`, `Number`),
  the `Tag` capture marker, a function, or an object template listing the
  expected child elements plus metadata (list collapsing, item wrapping,
  bare objects, attributes, field order, result hooks, type indirection).
- **Value:** the decoded tree: maps, lists, strings, numbers, or captured tags.
- **Tag:** an element kept verbatim, with attributes in source order and
  mixed text/element children. Two tags are equal when their names,
  attribute sequences and children match in order.
- **SchemaReader / SchemaWriter:** the two state machines. Each read or
  write uses a fresh one; nothing is shared between calls.

 ## Features

| **Feature** | **Description**                                                 |
|-------------|-----------------------------------------------------------------|
| json        | Author templates as JSON, convert values to and from `serde_json` |
| async       | Read from `AsyncRead` and write to `AsyncWrite` with tokio       |
| full        | Enables all available features                                  |

 ## Getting Started

```rust
use xml_template::{
    core::{schema::Schema, value::Value},
    error::TemplateError,
    item::xml::{parse_str, write_to_string},
};

fn main() -> Result<(), TemplateError> {
    let schema: Schema = Schema::object()
        .field(
            "root",
            Schema::object()
                .order(["name", "tags"])
                .field("name", Schema::String)
                .field("tags", Schema::object().list_of("tag").field("tag", Schema::String)),
        )
        .into();

    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <name>Title</name>
  <ignored>not in the template</ignored>
  <tags><tag>a</tag><tag>b</tag></tags>
</root>"#;

    let value = parse_str(xml, &schema)?;
    assert_eq!(
        value.get("root").and_then(|root| root.get("tags")),
        Some(&Value::from(vec!["a", "b"]))
    );

    let written = write_to_string(&schema, &value)?;
    assert_eq!(parse_str(&written, &schema)?, value);

    Ok(())
}
```

 ## License
 Licensed under either of

 -   Apache License, Version 2.0
     ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
 -   MIT license
     ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)

 at your option.
 */

/// Templates, values and tags
pub mod core;

/// Error types
pub mod error;

#[doc(inline)]
pub use error::*;

/// Template-driven readers and writers
pub mod item;

#[doc(inline)]
pub use crate::core::schema::Schema;
#[doc(inline)]
pub use crate::core::tag::{tag_equal, Tag};
#[doc(inline)]
pub use crate::core::value::Value;
