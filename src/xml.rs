//! Minimal XML element tree
//!
//! Manifests are small documents edited in place, so they are held as a plain
//! element tree. Whitespace is kept the way an element tree keeps it: the text
//! before an element's first child lives in `text`, the text after an element's
//! end tag lives in its `tail`. Comments, processing instructions and the
//! declaration are dropped on read.

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// A single XML element with its attributes and children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
    pub tail: Option<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
            tail: None,
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, keeping its position if it already exists
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    /// Parse a document and return its root element
    pub fn parse(input: &str) -> Result<Self> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event()
                .with_context(|| format!("XML error at byte {}", reader.buffer_position()))?;

            match event {
                Event::Start(start) => stack.push(Self::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Self::from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| anyhow!("Unexpected closing tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().context("Invalid text content")?;
                    append_text(&mut stack, &text);
                }
                Event::CData(data) => {
                    let text = String::from_utf8(data.into_inner().into_owned())
                        .context("CDATA section is not valid UTF-8")?;
                    append_text(&mut stack, &text);
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions and doctypes carry no data
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            bail!("Unexpected end of document inside <{}>", open.tag);
        }

        root.ok_or_else(|| anyhow!("Document has no root element"))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let tag = std::str::from_utf8(start.name().as_ref())
            .context("Element name is not valid UTF-8")?
            .to_string();

        let mut element = Self::new(tag);
        for attribute in start.attributes() {
            let attribute = attribute.context("Malformed attribute")?;
            let key = std::str::from_utf8(attribute.key.as_ref())
                .context("Attribute name is not valid UTF-8")?
                .to_string();
            let value = attribute
                .unescape_value()
                .context("Invalid attribute value")?
                .into_owned();
            element.attributes.push((key, value));
        }

        Ok(element)
    }

    /// Re-indent in place with two spaces per nesting level.
    ///
    /// Only whitespace-only `text`/`tail` values are replaced, so applying it to an
    /// already indented tree changes nothing.
    pub fn indent(&mut self, level: usize) {
        let newline = format!("\n{}", "  ".repeat(level));

        if !self.children.is_empty() {
            if is_blank(&self.text) {
                self.text = Some(format!("{}  ", newline));
            }
            if is_blank(&self.tail) {
                self.tail = Some(newline.clone());
            }
            for child in &mut self.children {
                child.indent(level + 1);
            }
            // The last child closes its parent, so its tail drops back one level
            if let Some(last) = self.children.last_mut() {
                if is_blank(&last.tail) {
                    last.tail = Some(newline);
                }
            }
        } else if level > 0 && is_blank(&self.tail) {
            self.tail = Some(newline);
        }
    }

    /// Serialize as a full document with an XML declaration
    pub fn to_document(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .context("Failed to write XML declaration")?;
        writer
            .write_event(Event::Text(BytesText::new("\n")))
            .context("Failed to write XML")?;
        self.write(&mut writer)?;

        String::from_utf8(writer.into_inner()).context("Serialized XML is not valid UTF-8")
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.tag.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        let text = self.text.as_deref().unwrap_or("");
        if self.children.is_empty() && text.is_empty() {
            writer
                .write_event(Event::Empty(start))
                .with_context(|| format!("Failed to write <{}>", self.tag))?;
        } else {
            writer
                .write_event(Event::Start(start))
                .with_context(|| format!("Failed to write <{}>", self.tag))?;
            if !text.is_empty() {
                writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .context("Failed to write XML text")?;
            }
            for child in &self.children {
                child.write(writer)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(self.tag.as_str())))
                .with_context(|| format!("Failed to write </{}>", self.tag))?;
        }

        if let Some(tail) = self.tail.as_deref().filter(|tail| !tail.is_empty()) {
            writer
                .write_event(Event::Text(BytesText::new(tail)))
                .context("Failed to write XML text")?;
        }

        Ok(())
    }

    /// Compare tags, attributes and children, ignoring text and tails
    pub fn same_structure(&self, other: &Element) -> bool {
        self.tag == other.tag
            && self.attributes == other.attributes
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.same_structure(b))
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        bail!("Document has more than one root element");
    }
    *root = Some(element);
    Ok(())
}

// Text outside the root element is dropped.
fn append_text(stack: &mut [Element], text: &str) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    let slot = match parent.children.last_mut() {
        Some(previous) => &mut previous.tail,
        None => &mut parent.text,
    };
    slot.get_or_insert_with(String::new).push_str(text);
}
