//! Minimal element tree built from quick-xml events
//!
//! Text nodes are dropped; Mondrian schemas carry everything in attributes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::SchemaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    /// Attribute value, treating blank values as absent
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn required(&self, key: &str) -> Result<&str, SchemaError> {
        self.attr(key).ok_or_else(|| SchemaError::missing(&self.name, key))
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

pub(crate) fn parse_document(xml: &str) -> Result<Element, SchemaError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| malformed(reader.buffer_position(), e))?;
        match event {
            Event::Start(ref e) => stack.push(open(e, reader.buffer_position())?),
            Event::Empty(ref e) => {
                let element = open(e, reader.buffer_position())?;
                attach(&mut stack, &mut root, element, reader.buffer_position())?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed(reader.buffer_position(), "unexpected closing tag"))?;
                attach(&mut stack, &mut root, element, reader.buffer_position())?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(unclosed) = stack.last() {
        return Err(malformed(
            reader.buffer_position(),
            format!("unclosed element <{}>", unclosed.name),
        ));
    }
    root.ok_or_else(|| malformed(0, "document has no root element"))
}

fn open(start: &BytesStart<'_>, position: usize) -> Result<Element, SchemaError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(position, e))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(position, e))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    position: usize,
) -> Result<(), SchemaError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(malformed(position, "multiple root elements")),
    }
    Ok(())
}

fn malformed(position: usize, message: impl ToString) -> SchemaError {
    SchemaError::Malformed {
        position,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_nested_tree() {
        let root = parse_document(r#"<A x="1"><B/><C y="&amp;"><D/></C></A>"#).unwrap();
        assert_eq!(root.name, "A");
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.child("C").unwrap().attr("y"), Some("&"));
        assert_eq!(root.child("C").unwrap().children[0].name, "D");
    }

    #[test]
    fn test_blank_attribute_is_absent() {
        let root = parse_document(r#"<A x="  "/>"#).unwrap();
        assert_eq!(root.attr("x"), None);
    }

    #[test]
    fn test_rejects_unclosed_element() {
        let err = parse_document("<A><B></B>").unwrap_err();
        assert!(matches!(err, SchemaError::Malformed { .. }));
    }

    #[test]
    fn test_rejects_mismatched_tags() {
        assert!(parse_document("<A><B></A></B>").is_err());
    }

    #[test]
    fn test_rejects_multiple_roots() {
        let err = parse_document("<A/><B/>").unwrap_err();
        assert!(err.to_string().contains("multiple root"));
    }

    #[test]
    fn test_rejects_empty_document() {
        assert!(parse_document("   ").is_err());
    }
}
