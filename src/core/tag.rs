//! Generic tag capture: elements kept verbatim, with ordered attributes and
//! mixed text/element children.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// One `key="value"` pair of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

/// The attributes of an element, both as an ordered sequence and as a lookup
/// table.
///
/// The sequence keeps source order, which takes part in equality and in
/// serialization. The lookup table answers [`Attributes::get`]; when a key is
/// repeated the last occurrence wins. Both views are built together and never
/// change afterwards.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    list: Vec<Attribute>,
    index: HashMap<String, usize>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .and_then(|&position| self.list.get(position))
            .map(|attr| attr.value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.list.iter()
    }

    pub fn as_slice(&self) -> &[Attribute] {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.list == other.list
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::default();
        for (key, value) in iter {
            let key = key.into();
            attrs.index.insert(key.clone(), attrs.list.len());
            attrs.list.push(Attribute {
                key,
                value: value.into(),
            });
        }
        attrs
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for Attributes {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Attributes {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<Vec<Attribute>> for Attributes {
    fn from(list: Vec<Attribute>) -> Self {
        list.into_iter().map(|attr| (attr.key, attr.value)).collect()
    }
}

impl From<IndexMap<String, String>> for Attributes {
    fn from(map: IndexMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.iter()
    }
}

/// A child of a [`Tag`]: a run of text or a nested element.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Text(String),
    Tag(Tag),
}

impl Child {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Child::Text(text) => Some(text),
            Child::Tag(_) => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Child::Tag(tag) => Some(tag),
            Child::Text(_) => None,
        }
    }
}

impl From<Tag> for Child {
    fn from(tag: Tag) -> Self {
        Child::Tag(tag)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_string())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text)
    }
}

/// The flexible argument accepted by [`Tag::with`].
///
/// Depending on what is passed, it is either the attribute set or the
/// content of the tag being built.
#[derive(Debug, Clone)]
pub enum TagArg {
    Attrs(Attributes),
    Text(String),
    Children(Vec<Child>),
}

impl From<Attributes> for TagArg {
    fn from(attrs: Attributes) -> Self {
        TagArg::Attrs(attrs)
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for TagArg {
    fn from(pairs: Vec<(K, V)>) -> Self {
        TagArg::Attrs(pairs.into())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for TagArg {
    fn from(pairs: [(K, V); N]) -> Self {
        TagArg::Attrs(pairs.into())
    }
}

impl From<&str> for TagArg {
    fn from(text: &str) -> Self {
        TagArg::Text(text.to_string())
    }
}

impl From<String> for TagArg {
    fn from(text: String) -> Self {
        TagArg::Text(text)
    }
}

impl From<Vec<Child>> for TagArg {
    fn from(children: Vec<Child>) -> Self {
        TagArg::Children(children)
    }
}

impl<const N: usize> From<[Child; N]> for TagArg {
    fn from(children: [Child; N]) -> Self {
        TagArg::Children(children.into())
    }
}

impl From<Tag> for TagArg {
    fn from(tag: Tag) -> Self {
        TagArg::Children(vec![Child::Tag(tag)])
    }
}

/// One XML element captured verbatim.
///
/// A tag has an optional name (absent only for a synthetic wrapper), an
/// ordered attribute set and an ordered list of children. Once built, a tag
/// never changes.
///
/// # Examples
///
/// ```
/// use xml_template::core::tag::{Child, Tag};
///
/// let para = Tag::with("p", [
///     Child::from("Text-"),
///     Child::from(Tag::with("em", "italic")),
///     Child::from("-end."),
/// ]);
/// assert_eq!(para.name(), Some("p"));
/// assert_eq!(para.children().len(), 3);
///
/// let link = Tag::with_attrs("a", [("href", "/home")], "Home");
/// assert_eq!(link.attrs().get("href"), Some("/home"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Tag {
    name: Option<String>,
    attrs: Attributes,
    children: Vec<Child>,
}

impl Tag {
    /// An empty element.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self::build(Some(name.into()), None, None)
    }

    /// An element with either attributes or content.
    ///
    /// A string becomes the single text child, a child list becomes the
    /// children, and an attribute set (or list of pairs) becomes the
    /// attributes.
    pub fn with<N: Into<String>, A: Into<TagArg>>(name: N, arg: A) -> Self {
        Self::build(Some(name.into()), Some(arg.into()), None)
    }

    /// An element with both attributes and content.
    pub fn with_attrs<N, A, C>(name: N, attrs: A, content: C) -> Self
    where
        N: Into<String>,
        A: Into<Attributes>,
        C: Into<TagArg>,
    {
        Self::build(
            Some(name.into()),
            Some(TagArg::Attrs(attrs.into())),
            Some(content.into()),
        )
    }

    /// A nameless wrapper around `content`.
    pub fn anonymous<C: Into<TagArg>>(content: C) -> Self {
        Self::build(None, None, Some(content.into()))
    }

    // The only place where the flexible argument convention is interpreted.
    fn build(name: Option<String>, first: Option<TagArg>, second: Option<TagArg>) -> Self {
        let (attrs, content) = match (first, second) {
            (Some(TagArg::Attrs(attrs)), content) => (attrs, content),
            (Some(content), None) => (Attributes::default(), Some(content)),
            (Some(_), Some(content)) | (None, Some(content)) => (Attributes::default(), Some(content)),
            (None, None) => (Attributes::default(), None),
        };

        let children = match content {
            Some(TagArg::Text(text)) => vec![Child::Text(text)],
            Some(TagArg::Children(children)) => children,
            Some(TagArg::Attrs(_)) | None => Vec::new(),
        };

        Self {
            name,
            attrs,
            children,
        }
    }

    /// Assembles a tag from parts that are already in canonical shape.
    pub(crate) fn from_parts(name: Option<String>, attrs: Attributes, children: Vec<Child>) -> Self {
        Self {
            name,
            attrs,
            children,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key)
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn into_children(self) -> Vec<Child> {
        self.children
    }

    /// Concatenated text of this tag and all of its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(children: &[Child], out: &mut String) {
    for child in children {
        match child {
            Child::Text(text) => out.push_str(text),
            Child::Tag(tag) => collect_text(&tag.children, out),
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        tag_equal(self, other)
    }
}

/// Structural equality of two tags.
///
/// Names must match (both may be absent), attributes must match pairwise in
/// order, and children must match pairwise in order. A tag without children
/// equals a tag with an empty child list.
pub fn tag_equal(a: &Tag, b: &Tag) -> bool {
    if a.name != b.name {
        return false;
    }
    if a.attrs.list != b.attrs.list {
        return false;
    }
    a.children.len() == b.children.len()
        && a
            .children
            .iter()
            .zip(&b.children)
            .all(|(x, y)| child_equal(x, y))
}

/// Equality over the tag domain, where a bare string is a text leaf.
///
/// A string never equals a tag.
pub fn child_equal(a: &Child, b: &Child) -> bool {
    match (a, b) {
        (Child::Text(x), Child::Text(y)) => x == y,
        (Child::Tag(x), Child::Tag(y)) => tag_equal(x, y),
        _ => false,
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("tag", &self.name)?;
        map.serialize_entry("attrs", &self.attrs)?;
        map.serialize_entry("children", &self.children)?;
        map.end()
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.list.len()))?;
        for attr in &self.list {
            seq.serialize_element(&(&attr.key, &attr.value))?;
        }
        seq.end()
    }
}

impl Serialize for Child {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Child::Text(text) => serializer.serialize_str(text),
            Child::Tag(tag) => tag.serialize(serializer),
        }
    }
}
