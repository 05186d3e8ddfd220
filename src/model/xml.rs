//! Streaming XML field edits
//!
//! Documents are copied event by event; only the targeted text nodes and
//! attributes change, so comments, ordering and unrelated elements survive
//! the round trip.

use crate::{Error, Result};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use rustc_hash::FxHashMap;
use std::io::Cursor;

fn xml_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Xml(format!("{context}: {e}"))
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    let attr = e
        .try_get_attribute(key)
        .map_err(|err| xml_err("bad attribute", err))?;
    attr.map(|a| {
        a.unescape_value()
            .map(std::borrow::Cow::into_owned)
            .map_err(|err| xml_err("bad attribute value", err))
    })
    .transpose()
}

struct Rewriter<'a> {
    reader: Reader<&'a [u8]>,
    writer: Writer<Cursor<Vec<u8>>>,
}

impl<'a> Rewriter<'a> {
    fn new(xml: &'a str) -> Self {
        Self {
            reader: Reader::from_str(xml),
            writer: Writer::new(Cursor::new(Vec::new())),
        }
    }

    fn next(&mut self) -> Result<Event<'a>> {
        self.reader
            .read_event()
            .map_err(|e| xml_err(&format!("at byte {}", self.reader.buffer_position()), e))
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| xml_err("write failed", e))
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner().into_inner())
            .map_err(|e| xml_err("output is not UTF-8", e))
    }
}

/// Text of every `<tag>` element, in document order.
///
/// # Errors
///
/// Returns `Error::Xml` on malformed input
pub fn element_texts(xml: &str, tag: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut texts = Vec::new();
    let mut current: Option<String> = None;
    loop {
        match reader.read_event().map_err(|e| xml_err("read failed", e))? {
            Event::Start(e) if e.name().as_ref() == tag.as_bytes() => current = Some(String::new()),
            Event::Empty(e) if e.name().as_ref() == tag.as_bytes() => texts.push(String::new()),
            Event::Text(t) => {
                if let Some(buf) = current.as_mut() {
                    buf.push_str(&t.unescape().map_err(|e| xml_err("bad text", e))?);
                }
            }
            Event::End(e) if e.name().as_ref() == tag.as_bytes() => {
                if let Some(buf) = current.take() {
                    texts.push(buf.trim().to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(texts)
}

/// Replace the text of the `occurrence`-th (0-based) `<tag>` element.
///
/// Returns `None` when the document has fewer matching elements.
///
/// # Errors
///
/// Returns `Error::Xml` on malformed input
pub fn replace_element_text(
    xml: &str,
    tag: &str,
    occurrence: usize,
    value: &str,
) -> Result<Option<String>> {
    let mut rw = Rewriter::new(xml);
    let mut seen = 0usize;
    let mut inside = false;
    let mut replaced = false;
    loop {
        let event = rw.next()?;
        match event {
            Event::Start(ref e) if e.name().as_ref() == tag.as_bytes() => {
                inside = seen == occurrence;
                seen += 1;
                rw.write(event)?;
                if inside {
                    rw.write(Event::Text(BytesText::new(value)))?;
                    replaced = true;
                }
            }
            Event::Empty(ref e) if e.name().as_ref() == tag.as_bytes() => {
                if seen == occurrence {
                    let name = local_name(e);
                    let start = e.to_owned();
                    rw.write(Event::Start(start))?;
                    rw.write(Event::Text(BytesText::new(value)))?;
                    rw.write(Event::End(quick_xml::events::BytesEnd::new(name)))?;
                    replaced = true;
                } else {
                    rw.write(event)?;
                }
                seen += 1;
            }
            Event::Text(_) | Event::CData(_) if inside => {}
            Event::End(ref e) if e.name().as_ref() == tag.as_bytes() => {
                inside = false;
                rw.write(event)?;
            }
            Event::Eof => break,
            other => rw.write(other)?,
        }
    }
    if replaced {
        rw.finish().map(Some)
    } else {
        Ok(None)
    }
}

/// Value of attribute `key` on the first `<tag>` element.
///
/// # Errors
///
/// Returns `Error::Xml` on malformed input
pub fn first_attribute(xml: &str, tag: &str, key: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(|e| xml_err("read failed", e))? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == tag.as_bytes() => {
                return attribute(&e, key);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Set attribute `key` on the first `<tag>` element. `None` if there is none.
///
/// # Errors
///
/// Returns `Error::Xml` on malformed input
pub fn set_first_attribute(xml: &str, tag: &str, key: &str, value: &str) -> Result<Option<String>> {
    let mut rw = Rewriter::new(xml);
    let mut done = false;
    loop {
        let event = rw.next()?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e)
                if !done && e.name().as_ref() == tag.as_bytes() =>
            {
                let mut edited = BytesStart::new(local_name(e));
                let mut had_key = false;
                for attr in e.attributes() {
                    let attr = attr.map_err(|err| xml_err("bad attribute", err))?;
                    if attr.key.as_ref() == key.as_bytes() {
                        edited.push_attribute((key, value));
                        had_key = true;
                    } else {
                        edited.push_attribute(attr);
                    }
                }
                if !had_key {
                    edited.push_attribute((key, value));
                }
                done = true;
                if matches!(event, Event::Empty(_)) {
                    rw.write(Event::Empty(edited))?;
                } else {
                    rw.write(Event::Start(edited))?;
                }
            }
            Event::Eof => break,
            other => rw.write(other)?,
        }
    }
    if done {
        rw.finish().map(Some)
    } else {
        Ok(None)
    }
}

/// `name` attribute → `<mass>` text for every `<Body>` element.
///
/// Only a `<mass>` that is a direct child of `<Body>` counts.
///
/// # Errors
///
/// Returns `Error::Xml` on malformed input or a non-numeric mass
pub fn body_masses(xml: &str) -> Result<Vec<(String, f64)>> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut body: Option<String> = None;
    let mut masses = Vec::new();
    loop {
        match reader.read_event().map_err(|e| xml_err("read failed", e))? {
            Event::Start(e) => {
                let name = local_name(&e);
                if name == "Body" {
                    body = attribute(&e, "name")?;
                }
                stack.push(name);
            }
            Event::Text(t) => {
                let in_mass = stack.len() >= 2
                    && stack[stack.len() - 1] == "mass"
                    && stack[stack.len() - 2] == "Body";
                if in_mass {
                    let text = t.unescape().map_err(|e| xml_err("bad text", e))?;
                    let text = text.trim();
                    if !text.is_empty() {
                        let value: f64 = text.parse().map_err(|_| {
                            Error::Xml(format!("mass `{text}` is not a number"))
                        })?;
                        let name = body.clone().unwrap_or_default();
                        masses.push((name, value));
                    }
                }
            }
            Event::End(_) => {
                if stack.pop().as_deref() == Some("Body") {
                    body = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(masses)
}

/// Overwrite `<Body name=..><mass>` for every body in `masses`.
///
/// Returns the edited document and the names from `masses` that matched no
/// `<Body>` element. Bodies not in `masses` keep their mass.
///
/// # Errors
///
/// Returns `Error::Xml` on malformed input
pub fn replace_body_masses(
    xml: &str,
    masses: &FxHashMap<String, f64>,
) -> Result<(String, Vec<String>)> {
    let mut rw = Rewriter::new(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut body: Option<String> = None;
    let mut pending: Option<f64> = None;
    let mut matched: Vec<String> = Vec::new();
    loop {
        let event = rw.next()?;
        match event {
            Event::Start(ref e) => {
                let name = local_name(e);
                if name == "Body" {
                    body = attribute(e, "name")?;
                }
                let is_mass = name == "mass" && stack.last().map(String::as_str) == Some("Body");
                stack.push(name);
                rw.write(event)?;
                if is_mass {
                    if let Some(value) = body.as_ref().and_then(|b| masses.get(b)) {
                        pending = Some(*value);
                    }
                }
            }
            Event::Text(_) if pending.is_some() => {
                if let Some(value) = pending.take() {
                    rw.write(Event::Text(BytesText::new(&value.to_string())))?;
                    if let Some(b) = body.clone() {
                        matched.push(b);
                    }
                }
            }
            Event::End(_) => {
                // `<mass></mass>` with no text node
                if let Some(value) = pending.take() {
                    rw.write(Event::Text(BytesText::new(&value.to_string())))?;
                    if let Some(b) = body.clone() {
                        matched.push(b);
                    }
                }
                if stack.pop().as_deref() == Some("Body") {
                    body = None;
                }
                rw.write(event)?;
            }
            Event::Eof => break,
            other => rw.write(other)?,
        }
    }
    let mut missing: Vec<String> = masses
        .keys()
        .filter(|name| !matched.contains(name))
        .cloned()
        .collect();
    missing.sort();
    Ok((rw.finish()?, missing))
}
