//! The token feed consumed by the schema reader.
//!
//! [`Tokenizer`] adapts a quick-xml pull reader into the five events the
//! reader understands. Entity references arrive from quick-xml as separate
//! events; they are resolved here and passed on as text, so one element's text
//! may come in several pieces.

use std::collections::VecDeque;
use std::io::BufRead;

use log::debug;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::core::tag::Attributes;
use crate::error::TemplateError;

/// One token of an XML document.
#[derive(Debug)]
pub enum XmlEvent {
    /// An element starts. `name` is the local name.
    Open { name: String, attrs: Attributes },
    /// A run of character data inside the root element.
    Text(String),
    Close { name: String },
    /// The document is malformed. No further events follow.
    Error(TemplateError),
    /// The document ended cleanly.
    End,
}

/// Turns quick-xml events into [`XmlEvent`]s, tracking nesting so that an
/// unterminated document is reported instead of ending silently.
#[derive(Debug, Default)]
struct TokenState {
    depth: usize,
    seen_root: bool,
    pending: VecDeque<XmlEvent>,
    finished: bool,
}

impl TokenState {
    fn accept(&mut self, event: Result<Event<'_>, quick_xml::Error>, position: u64) {
        match event {
            Err(e) => self.fail(format!("{} (near byte {})", e, position)),
            Ok(Event::Start(start)) => {
                if let Some(open) = self.open(&start, position) {
                    self.depth += 1;
                    self.pending.push_back(open);
                }
            }
            Ok(Event::Empty(start)) => {
                if let Some(open) = self.open(&start, position) {
                    let name = match &open {
                        XmlEvent::Open { name, .. } => name.clone(),
                        _ => String::new(),
                    };
                    self.pending.push_back(open);
                    self.pending.push_back(XmlEvent::Close { name });
                }
            }
            Ok(Event::End(end)) => {
                self.depth = self.depth.saturating_sub(1);
                let name = String::from_utf8_lossy(end.local_name().as_ref()).into_owned();
                self.pending.push_back(XmlEvent::Close { name });
            }
            Ok(Event::Text(text)) if self.depth > 0 => {
                let text = String::from_utf8_lossy(&text).into_owned();
                self.pending.push_back(XmlEvent::Text(text));
            }
            Ok(Event::CData(data)) if self.depth > 0 => {
                let text = String::from_utf8_lossy(&data).into_owned();
                self.pending.push_back(XmlEvent::Text(text));
            }
            Ok(Event::GeneralRef(entity)) if self.depth > 0 => {
                let name = String::from_utf8_lossy(&entity).into_owned();
                match resolve_entity(&name) {
                    Some(text) => self.pending.push_back(XmlEvent::Text(text)),
                    None => self.fail(format!("unknown entity &{}; (near byte {})", name, position)),
                }
            }
            Ok(Event::Eof) => {
                if self.depth > 0 {
                    self.fail(format!(
                        "document ended with {} unclosed element(s)",
                        self.depth
                    ));
                } else if !self.seen_root {
                    self.fail("document has no root element".to_string());
                } else {
                    self.pending.push_back(XmlEvent::End);
                    self.finished = true;
                }
            }
            // Declarations, comments, processing instructions and doctypes
            // carry nothing a template can match.
            Ok(_) => {}
        }
    }

    fn open(&mut self, start: &BytesStart<'_>, position: u64) -> Option<XmlEvent> {
        if self.depth == 0 && self.seen_root {
            self.fail(format!("second root element (near byte {})", position));
            return None;
        }
        self.seen_root = true;
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        match decode_attributes(start) {
            Ok(attrs) => Some(XmlEvent::Open { name, attrs }),
            Err(message) => {
                self.fail(format!("{} (near byte {})", message, position));
                None
            }
        }
    }

    fn fail(&mut self, message: String) {
        debug!("Tokenizer stopped: {}", message);
        self.pending.push_back(XmlEvent::Error(TemplateError::Xml(message)));
        self.finished = true;
    }

    fn next(&mut self) -> Option<XmlEvent> {
        match self.pending.pop_front() {
            Some(event) => Some(event),
            None if self.finished => Some(XmlEvent::End),
            None => None,
        }
    }
}

fn decode_attributes(start: &BytesStart<'_>) -> Result<Attributes, String> {
    let mut pairs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        let value = unescape(&raw).map_err(|e| e.to_string())?.into_owned();
        pairs.push((key, value));
    }
    Ok(pairs.into())
}

/// Resolves a predefined entity or a numeric character reference.
fn resolve_entity(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    resolve_predefined_entity(name).map(str::to_string)
}

/// Pull tokenizer over a buffered byte source.
pub struct Tokenizer<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: TokenState,
}

impl<R: BufRead> Tokenizer<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            state: TokenState::default(),
        }
    }

    /// Returns the next event. After `Error` or `End`, keeps returning `End`.
    pub fn next_event(&mut self) -> XmlEvent {
        loop {
            if let Some(event) = self.state.next() {
                return event;
            }
            self.buf.clear();
            let position = self.reader.buffer_position() as u64;
            let event = self.reader.read_event_into(&mut self.buf);
            self.state.accept(event, position);
        }
    }
}

/// Pull tokenizer over an asynchronous byte source.
#[cfg(feature = "async")]
pub struct AsyncTokenizer<R: tokio::io::AsyncBufRead + Unpin> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: TokenState,
}

#[cfg(feature = "async")]
impl<R: tokio::io::AsyncBufRead + Unpin> AsyncTokenizer<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            state: TokenState::default(),
        }
    }

    pub async fn next_event(&mut self) -> XmlEvent {
        loop {
            if let Some(event) = self.state.next() {
                return event;
            }
            self.buf.clear();
            let position = self.reader.buffer_position() as u64;
            let event = self.reader.read_event_into_async(&mut self.buf).await;
            self.state.accept(event, position);
        }
    }
}
