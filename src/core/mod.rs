/// Structure templates and type indirection.
pub mod schema;

/// Verbatim tag capture and its equality law.
pub mod tag;

/// The decoded value tree.
pub mod value;

/// JSON authoring of templates.
#[cfg(feature = "json")]
pub mod json;
