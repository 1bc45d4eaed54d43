//! Parsing and serialization through quick-xml events

use anyhow::{Result, bail};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use super::{Element, Node};

/// Parse a single-rooted XML document into an owned tree.
///
/// Comments, processing instructions and the declaration are dropped;
/// text runs are whitespace-trimmed and skipped entirely when empty.
pub fn parse(input: &str) -> Result<Element> {
    let mut reader = Reader::from_str(input);

    let mut root: Option<Element> = None;
    let mut stack: Vec<Element> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                complete(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    bail!("unexpected closing tag");
                };
                complete(element, &mut stack, &mut root)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                push_text(text.trim(), &mut stack)?;
            }
            Event::CData(cdata) => {
                let text = String::from_utf8(cdata.into_inner().into_owned())?;
                push_text(text.trim(), &mut stack)?;
            }
            Event::Eof => break,
            // Declaration, comments, doctype and processing instructions
            // carry nothing the tree needs.
            _ => {}
        }
    }

    if !stack.is_empty() {
        bail!("unexpected end of input, {} element(s) left open", stack.len());
    }
    root.ok_or_else(|| anyhow::anyhow!("document has no root element"))
}

fn push_text(text: &str, stack: &mut Vec<Element>) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Text(text.to_string())),
        None => bail!("text outside of the root element"),
    }
    Ok(())
}

fn element_from_start(start: &BytesStart) -> Result<Element> {
    let name = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn complete(element: Element, stack: &mut Vec<Element>, root: &mut Option<Element>) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => {
            if root.is_some() {
                bail!("document has more than one root element");
            }
            *root = Some(element);
        }
    }
    Ok(())
}

pub(super) fn to_xml(element: &Element) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, element)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
