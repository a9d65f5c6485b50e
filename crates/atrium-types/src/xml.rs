//! Minimal XML reading and writing.
//!
//! The platform persists a handful of fixed document shapes (sealed-file
//! containers, account payloads, realm configuration fragments). This module
//! covers exactly what those documents need: elements, attributes, and
//! character data. No namespaces, no CDATA; declarations, comments, and
//! doctypes are skipped on input.

use thiserror::Error;

/// Errors from parsing an XML document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum XmlError {
    /// The input is not well-formed.
    #[error("malformed XML at byte {pos}: {reason}")]
    Malformed { pos: usize, reason: String },
}

/// Result alias for XML parsing.
pub type Result<T> = std::result::Result<T, XmlError>;

/// An XML element: name, attributes in document order, child elements, and
/// the concatenation of its character data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    /// Create an empty element with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder: add an attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Builder: set the character data.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Builder: add a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// The element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// An attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The concatenated character data (surrounding whitespace included).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// All child elements, in document order.
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// The first child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search for an element with the given name carrying the
    /// given attribute value. The receiver itself may match.
    pub fn find_where(&self, name: &str, attr: &str, value: &str) -> Option<&Element> {
        if self.name == name && self.attr(attr) == Some(value) {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|c| c.find_where(name, attr, value))
    }

    /// Serialize as a standalone document with an XML declaration.
    pub fn to_document(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.write_into(&mut out, 0);
        out.push('\n');
        out
    }

    /// Serialize this element (no declaration).
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out, 0);
        out
    }

    fn write_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("   ");
        }
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape(v));
            out.push('"');
        }

        if self.children.is_empty() && self.text.is_empty() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        out.push_str(&escape(&self.text));
        if !self.children.is_empty() {
            for child in &self.children {
                out.push('\n');
                child.write_into(out, depth + 1);
            }
            out.push('\n');
            for _ in 0..depth {
                out.push_str("   ");
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Parse a document, returning its root element.
    pub fn parse(input: &str) -> Result<Element> {
        let mut parser = Parser { input, pos: 0 };
        parser.skip_misc();
        let root = parser.parse_element()?;
        parser.skip_misc();
        if parser.pos != parser.input.len() {
            return Err(parser.err("content after the root element"));
        }
        Ok(root)
    }
}

/// Escape the five XML entities in attribute values and character data.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn err(&self, reason: impl Into<String>) -> XmlError {
        XmlError::Malformed {
            pos: self.pos,
            reason: reason.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, prefix: &str) -> Result<()> {
        if self.eat(prefix) {
            Ok(())
        } else {
            Err(self.err(format!("expected {prefix:?}")))
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.bump();
        }
    }

    /// Skip whitespace, the XML declaration, comments, and doctypes.
    fn skip_misc(&mut self) {
        loop {
            self.skip_ws();
            if self.rest().starts_with("<?") {
                self.skip_until("?>");
            } else if self.rest().starts_with("<!--") {
                self.skip_until("-->");
            } else if self.rest().starts_with("<!") {
                self.skip_until(">");
            } else {
                return;
            }
        }
    }

    fn skip_until(&mut self, terminator: &str) {
        match self.rest().find(terminator) {
            Some(offset) => self.pos += offset + terminator.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn read_name(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')) {
            self.bump();
        }
        if self.pos == start {
            return Err(self.err("expected a name"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_element(&mut self) -> Result<Element> {
        self.expect("<")?;
        let name = self.read_name()?;
        let mut element = Element::new(&name);

        loop {
            self.skip_ws();
            if self.eat("/>") {
                return Ok(element);
            }
            if self.eat(">") {
                self.parse_content(&mut element)?;
                return Ok(element);
            }

            let attr_name = self.read_name()?;
            self.skip_ws();
            self.expect("=")?;
            self.skip_ws();
            let quote = match self.bump() {
                Some(q @ ('"' | '\'')) => q,
                _ => return Err(self.err("expected a quoted attribute value")),
            };
            let start = self.pos;
            let end = self.rest()
                .find(quote)
                .ok_or_else(|| self.err("unterminated attribute value"))?;
            let raw = &self.input[start..start + end];
            self.pos = start + end + 1;
            element.attrs.push((attr_name, self.unescape(raw)?));
        }
    }

    fn parse_content(&mut self, element: &mut Element) -> Result<()> {
        loop {
            if self.eat("</") {
                let close = self.read_name()?;
                if close != element.name {
                    return Err(self.err(format!(
                        "mismatched closing tag: expected </{}>, got </{close}>",
                        element.name
                    )));
                }
                self.skip_ws();
                self.expect(">")?;
                return Ok(());
            }
            if self.rest().starts_with("<!--") {
                self.skip_until("-->");
                continue;
            }
            match self.peek() {
                Some('<') => {
                    let child = self.parse_element()?;
                    element.children.push(child);
                }
                Some(_) => {
                    let start = self.pos;
                    let end = self.rest().find('<').unwrap_or(self.rest().len());
                    let raw = &self.input[start..start + end];
                    self.pos = start + end;
                    let chunk = self.unescape(raw)?;
                    element.text.push_str(&chunk);
                }
                None => return Err(self.err(format!("unterminated <{}> element", element.name))),
            }
        }
    }

    fn unescape(&self, raw: &str) -> Result<String> {
        if !raw.contains('&') {
            return Ok(raw.to_string());
        }
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(amp) = rest.find('&') {
            out.push_str(&rest[..amp]);
            rest = &rest[amp..];
            let semi = rest
                .find(';')
                .ok_or_else(|| self.err("unterminated entity reference"))?;
            let entity = &rest[1..semi];
            match entity {
                "amp" => out.push('&'),
                "lt" => out.push('<'),
                "gt" => out.push('>'),
                "quot" => out.push('"'),
                "apos" => out.push('\''),
                _ => {
                    let code = entity
                        .strip_prefix("#x")
                        .map(|h| u32::from_str_radix(h, 16))
                        .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                        .ok_or_else(|| self.err(format!("unknown entity &{entity};")))?
                        .map_err(|_| self.err(format!("invalid character reference &{entity};")))?;
                    let c = char::from_u32(code)
                        .ok_or_else(|| self.err(format!("invalid character reference &{entity};")))?;
                    out.push(c);
                }
            }
            rest = &rest[semi + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_serialize() {
        let doc = Element::new("Vault")
            .with_attr("version", "1")
            .with_child(Element::new("Content").with_attr("name", "a.xml"))
            .with_child(Element::new("Ciphertext").with_text("0a0b"));
        let xml = doc.to_xml();
        assert!(xml.contains("<Vault version=\"1\">"));
        assert!(xml.contains("<Content name=\"a.xml\"/>"));
        assert!(xml.contains("<Ciphertext>0a0b</Ciphertext>"));
    }

    #[test]
    fn parse_round_trip() {
        let doc = Element::new("Realm")
            .with_attr("name", "MEMBERS")
            .with_attr("secure", "true")
            .with_child(
                Element::new("AccountIndexes")
                    .with_child(Element::new("AccountIndex").with_attr("name", "combo")),
            )
            .with_child(Element::new("Note").with_text("a < b & c"));
        let parsed = Element::parse(&doc.to_document()).unwrap();
        assert_eq!(parsed.attr("name"), Some("MEMBERS"));
        let indexes = parsed.child("AccountIndexes").unwrap();
        assert_eq!(indexes.children().len(), 1);
        assert_eq!(indexes.children()[0].attr("name"), Some("combo"));
        assert_eq!(parsed.child("Note").unwrap().text(), "a < b & c");
    }

    #[test]
    fn parse_skips_declaration_and_comments() {
        let input = r#"<?xml version="1.0"?>
            <!-- factory default -->
            <Root><Leaf value="x&amp;y"/><!-- inner --></Root>"#;
        let parsed = Element::parse(input).unwrap();
        assert_eq!(parsed.name(), "Root");
        assert_eq!(parsed.child("Leaf").unwrap().attr("value"), Some("x&y"));
    }

    #[test]
    fn parse_numeric_entities() {
        let parsed = Element::parse("<A>&#65;&#x42;</A>").unwrap();
        assert_eq!(parsed.text(), "AB");
    }

    #[test]
    fn reject_malformed_input() {
        for input in [
            "",
            "<A>",
            "<A></B>",
            "<A attr=value/>",
            "<A/><B/>",
            "<A>&bogus;</A>",
        ] {
            assert!(Element::parse(input).is_err(), "{input}");
        }
    }

    #[test]
    fn find_where_searches_depth_first() {
        let doc = Element::new("Realm").with_child(
            Element::new("LoginPage")
                .with_child(Element::new("Field").with_attr("name", "User").with_attr("type", "text"))
                .with_child(Element::new("Field").with_attr("name", "Pass").with_attr("type", "password")),
        );
        let field = doc.find_where("Field", "name", "Pass").unwrap();
        assert_eq!(field.attr("type"), Some("password"));
        assert!(doc.find_where("Field", "name", "Token").is_none());
    }
}
