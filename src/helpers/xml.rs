//! Streaming XML cursor shared by the XLSX and ODS codecs.
//! Provides a forward-only node cursor, a callback dispatch table keyed by element name,
//! helper traits for attribute and text processing, and the SpreadsheetML text escapers.

use crate::error::SheetStreamError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Captures;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// `_xHHHH_` escape sequences used by SpreadsheetML for characters XML cannot carry.
static ESCAPED_CHARACTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_x([0-9A-Fa-f]{4})_").expect("Hardcode regex pattern"));

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Parse attribute value '{0}' failed")]
    ParseAttributeValueError(String),

    #[error("Entity declarations are not allowed")]
    EntityDeclarationError,

    #[error("Invalid cell reference or range '{0}'")]
    InvalidReferenceError(String),

    #[error("Unexpected end of document inside '{0}'")]
    UnexpectedEndError(String),
}

/// Kind of the node the cursor is positioned on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum NodeKind {
    /// Opening tag (empty elements are expanded into start + end)
    Start,
    /// Closing tag
    End,
    /// Character data, CDATA or a resolved character/entity reference
    Text,
    /// Declarations, comments and processing instructions
    Other,
}

/// Owned copy of the current node.
enum Node {
    Nothing,
    Start(BytesStart<'static>),
    End(Vec<u8>),
    Text(String),
    Other,
}

/// Forward-only XML cursor with optimized configuration for spreadsheet parsing
pub(crate) struct XmlCursor<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
    node: Node,
}

impl<R: BufRead> XmlCursor<R> {
    /// Creates a new XML cursor with optimized configuration for spreadsheet parsing
    pub(crate) fn new(buf_reader: R) -> XmlCursor<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = true;
        config.expand_empty_elements = true;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlCursor {
            reader,
            buffer,
            node: Node::Nothing,
        }
    }

    /// Advances to the next node. Returns `false` once the end of the stream is reached.
    pub(crate) fn read(&mut self) -> Result<bool, SheetStreamError> {
        self.buffer.clear();
        let node = match self.reader.read_event_into(&mut self.buffer)? {
            Event::Eof => {
                self.node = Node::Nothing;
                return Ok(false);
            }
            Event::Start(event) => Node::Start(event.into_owned()),
            Event::End(event) => Node::End(event.name().as_ref().to_vec()),
            Event::Text(event) => Node::Text(event.xml_content()?.into_owned()),
            Event::CData(event) => Node::Text(event.xml_content()?.into_owned()),
            Event::GeneralRef(event) => {
                let mut text = String::new();
                text.push_bytes_ref(&event)?;
                Node::Text(text)
            }
            Event::DocType(event) => {
                // Entities are never expanded: a document declaring any fails closed
                if contains_ignore_ascii_case(&event, b"<!ENTITY") {
                    Err(XmlError::EntityDeclarationError)?;
                }
                Node::Other
            }
            _ => Node::Other,
        };
        self.node = node;
        Ok(true)
    }

    /// Kind of the current node
    pub(crate) fn kind(&self) -> NodeKind {
        match self.node {
            Node::Start(_) => NodeKind::Start,
            Node::End(_) => NodeKind::End,
            Node::Text(_) => NodeKind::Text,
            Node::Nothing | Node::Other => NodeKind::Other,
        }
    }

    /// Qualified (prefixed) name of the current element, empty for non-element nodes
    pub(crate) fn name(&self) -> &[u8] {
        match &self.node {
            Node::Start(event) => event.name().into_inner(),
            Node::End(name) => name,
            _ => b"",
        }
    }

    /// Name of the current element with any namespace prefix stripped
    pub(crate) fn local_name(&self) -> &[u8] {
        strip_prefix(self.name())
    }

    /// Text of the current node when it is a text node
    pub(crate) fn text(&self) -> Option<&str> {
        match &self.node {
            Node::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Gets an attribute value of the current start element by qualified name
    pub(crate) fn attribute(&self, name: &str) -> Result<Option<Cow<'_, str>>, SheetStreamError> {
        match &self.node {
            Node::Start(event) => event.get_attribute_value(name),
            _ => Ok(None),
        }
    }

    /// Gets an attribute value by local name, ignoring whatever prefix the document chose
    pub(crate) fn attribute_by_local_name(&self, name: &[u8]) -> Result<Option<String>, SheetStreamError> {
        if let Node::Start(event) = &self.node {
            for result in event.attributes() {
                let attribute = result?;
                if attribute.key.local_name().as_ref() == name {
                    return Ok(Some(attribute.get_value()?.into_owned()));
                }
            }
        }
        Ok(None)
    }

    /// Parses an attribute value of the current start element to the specified type
    pub(crate) fn parse_attribute<T: FromStr>(&self, name: &str) -> Result<Option<T>, SheetStreamError> {
        match &self.node {
            Node::Start(event) => event.parse_attribute_value(name),
            _ => Ok(None),
        }
    }

    /// Collects all text below the current start element and stops on its closing tag.
    pub(crate) fn read_text(&mut self) -> Result<String, SheetStreamError> {
        let element = self.current_element_name();
        let mut text = String::new();
        let mut depth = 0usize;
        while self.read()? {
            match &self.node {
                Node::Start(_) => depth += 1,
                Node::End(_) if depth == 0 => return Ok(text),
                Node::End(_) => depth -= 1,
                Node::Text(value) => text.push_str(value),
                _ => (),
            }
        }
        Err(XmlError::UnexpectedEndError(element))?
    }

    /// Collects the visible text of a rich text container (`<si>` or `<is>`).
    ///
    /// Only `<t>` runs contribute; phonetic `<rPh>` annotations are skipped.
    pub(crate) fn read_rich_text(&mut self) -> Result<String, SheetStreamError> {
        let element = self.current_element_name();
        let mut text = String::new();
        let mut depth = 0usize;
        let mut phonetic_depth = None::<usize>;
        let mut text_depth = None::<usize>;
        while self.read()? {
            match &self.node {
                Node::Start(event) => {
                    depth += 1;
                    let name = strip_prefix(event.name().into_inner());
                    if phonetic_depth.is_none() && name == b"rPh" {
                        phonetic_depth = Some(depth);
                    } else if phonetic_depth.is_none() && name == b"t" {
                        text_depth = Some(depth);
                    }
                }
                Node::End(_) if depth == 0 => return Ok(text),
                Node::End(_) => {
                    if phonetic_depth == Some(depth) {
                        phonetic_depth = None;
                    }
                    if text_depth == Some(depth) {
                        text_depth = None;
                    }
                    depth -= 1;
                }
                Node::Text(value) if text_depth.is_some() => text.push_str(value),
                _ => (),
            }
        }
        Err(XmlError::UnexpectedEndError(element))?
    }

    fn current_element_name(&self) -> String {
        String::from_utf8_lossy(self.name()).into_owned()
    }
}

/// Outcome of a node handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Handler invoked for one `(element name, node kind)` pair.
pub(crate) type NodeHandler<S, R> = fn(&mut S, &mut XmlCursor<R>) -> Result<Flow, SheetStreamError>;

/// Dispatch table driving an [`XmlCursor`].
///
/// Elements are looked up by qualified name first, then by local name, so a handler
/// registered as `x:row` wins over one registered as `row` for prefixed documents.
pub(crate) struct XmlProcessor<S, R: BufRead> {
    handlers: HashMap<NodeKind, HashMap<Vec<u8>, NodeHandler<S, R>>>,
    text_handler: Option<NodeHandler<S, R>>,
}

impl<S, R: BufRead> XmlProcessor<S, R> {
    pub(crate) fn new() -> Self {
        XmlProcessor {
            handlers: HashMap::new(),
            text_handler: None,
        }
    }

    /// Registers a handler for an element start or end.
    pub(crate) fn on(mut self, name: &str, kind: NodeKind, handler: NodeHandler<S, R>) -> Self {
        self.handlers
            .entry(kind)
            .or_default()
            .insert(name.as_bytes().to_vec(), handler);
        self
    }

    /// Registers a handler for text nodes.
    pub(crate) fn on_text(mut self, handler: NodeHandler<S, R>) -> Self {
        self.text_handler = Some(handler);
        self
    }

    fn lookup(&self, cursor: &XmlCursor<R>) -> Option<NodeHandler<S, R>> {
        match cursor.kind() {
            NodeKind::Text => self.text_handler,
            NodeKind::Other => None,
            kind => {
                let handlers = self.handlers.get(&kind)?;
                handlers
                    .get(cursor.name())
                    .or_else(|| handlers.get(cursor.local_name()))
                    .copied()
            }
        }
    }

    /// Reads nodes and dispatches them until a handler stops the scan.
    ///
    /// Returns `true` when a handler stopped, `false` when the stream ended.
    pub(crate) fn process_until_stopped(&self, cursor: &mut XmlCursor<R>, state: &mut S) -> Result<bool, SheetStreamError> {
        while cursor.read()? {
            if let Some(handler) = self.lookup(cursor) {
                if handler(state, cursor)? == Flow::Stop {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// Helper trait for XML attributes providing convenient value extraction and parsing
pub(crate) trait XmlAttributeHelper<'a> {
    /// Gets the unescaped attribute value as a string
    fn get_value(&self) -> Result<Cow<'a, str>, SheetStreamError>;

    /// Parses the attribute value to the specified type
    fn parse_value<T: FromStr>(&self) -> Result<T, SheetStreamError>;
}

impl<'a> XmlAttributeHelper<'a> for Attribute<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, SheetStreamError> {
        Ok(self.unescape_value()?)
    }

    fn parse_value<T: FromStr>(&self) -> Result<T, SheetStreamError> {
        self.get_value()?
            .trim()
            .parse()
            .map_err(|_| match std::str::from_utf8(&self.value) {
                Ok(value) => SheetStreamError::XmlHelperError(XmlError::ParseAttributeValueError(value.to_string())),
                Err(error) => SheetStreamError::StringEncodingError(error),
            })
    }
}

/// Helper trait for XML nodes providing attribute access methods
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets an attribute value by name
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetStreamError>;

    /// Parses an attribute value to the specified type
    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, SheetStreamError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetStreamError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.get_value())
            .transpose()
    }

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, SheetStreamError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.parse_value())
            .transpose()
    }
}

/// Helper trait for building text content from XML reference events
pub(crate) trait XmlTextContextHelper {
    /// Appends text content from BytesRef event (handles entities and character references)
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetStreamError>;
}

impl XmlTextContextHelper for String {
    /// Only the five predefined entities and character references are accepted;
    /// anything else would need a DTD and is rejected.
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetStreamError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix('x') {
                u32::from_str_radix(hex, 16)?
            } else {
                number.parse::<u32>()?
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }

        Ok(())
    }
}

/// Strips the namespace prefix of a qualified name.
pub(crate) fn strip_prefix(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|byte| *byte == b':') {
        Some(index) => &name[index + 1..],
        None => name,
    }
}

fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}

/// Escapes text for SpreadsheetML content.
///
/// Existing `_xHHHH_` sequences get their underscore protected as `_x005F_`, C0 control
/// characters other than TAB and LF become `_xHHHH_`, then XML markup is escaped.
pub(crate) fn escape_xlsx_text(value: &str) -> String {
    let protected = ESCAPED_CHARACTER.replace_all(value, "_x005F_x${1}_");
    let mut escaped = String::with_capacity(protected.len());
    for character in protected.chars() {
        // XML parsers normalize a bare CR to LF
        if is_escaped_control(character) || character == '\r' {
            escaped.push_str(&format!("_x{:04X}_", character as u32));
        } else {
            escaped.push(character);
        }
    }
    quick_xml::escape::escape(escaped.as_str()).into_owned()
}

/// Decodes `_xHHHH_` sequences in SpreadsheetML text. Each sequence is decoded exactly once.
pub(crate) fn unescape_xlsx_text(value: &str) -> Cow<'_, str> {
    if !value.contains("_x") {
        return Cow::Borrowed(value);
    }
    ESCAPED_CHARACTER.replace_all(value, |captures: &Captures| {
        u32::from_str_radix(&captures[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| captures[0].to_owned())
    })
}

/// Escapes attribute values and plain element content.
pub(crate) fn escape(value: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(value)
}

/// C0 control characters that XML 1.0 cannot carry.
pub(crate) fn is_escaped_control(character: char) -> bool {
    character < ' ' && !matches!(character, '\t' | '\n' | '\r')
}
