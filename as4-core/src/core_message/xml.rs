//! Minimal XML plumbing on top of `quick-xml`
//!
//! `XmlWriter` emits compact markup with no insignificant whitespace, so the
//! same typed value always serializes to the same bytes. `Node` is a small
//! element tree built from `quick-xml` events; lookups go by local name.

use super::errors::CodecError;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

#[derive(Debug, Default)]
pub(crate) struct XmlWriter {
    out: String,
}

impl XmlWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn raw(&mut self, markup: &str) {
        self.out.push_str(markup);
    }

    fn start_tag(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attrs {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape(*value));
            self.out.push('"');
        }
    }

    pub(crate) fn open(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.start_tag(name, attrs);
        self.out.push('>');
    }

    pub(crate) fn close(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    pub(crate) fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.start_tag(name, attrs);
        self.out.push_str("/>");
    }

    pub(crate) fn leaf(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) {
        self.open(name, attrs);
        self.out.push_str(&escape(text));
        self.close(name);
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}

/// Parsed XML element
#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    pub(crate) qname: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) children: Vec<Node>,
    pub(crate) text: String,
}

impl Node {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, CodecError> {
        let qname = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| CodecError::Xml(e.to_string()))?
            .to_string();

        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| CodecError::Xml(e.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| CodecError::Xml(e.to_string()))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| CodecError::Xml(e.to_string()))?
                .into_owned();
            attrs.push((key, value));
        }

        Ok(Self {
            qname,
            attrs,
            children: Vec::new(),
            text: String::new(),
        })
    }

    pub(crate) fn local_name(&self) -> &str {
        local_part(&self.qname)
    }

    pub(crate) fn prefix(&self) -> Option<&str> {
        self.qname.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Attribute by local name, ignoring namespace declarations
    pub(crate) fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .filter(|(key, _)| key != "xmlns" && !key.starts_with("xmlns:"))
            .find(|(key, _)| local_part(key) == local)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn require_attr(&self, local: &str) -> Result<&str, CodecError> {
        self.attr(local).ok_or_else(|| {
            CodecError::Malformed(format!("{} lacks attribute {}", self.local_name(), local))
        })
    }

    /// Namespace URI bound to `prefix` on this element
    pub(crate) fn namespace_declaration(&self, prefix: Option<&str>) -> Option<&str> {
        let key = match prefix {
            Some(prefix) => format!("xmlns:{}", prefix),
            None => "xmlns".to_string(),
        };
        self.attrs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn child(&self, local: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.local_name() == local)
    }

    pub(crate) fn require_child(&self, local: &str) -> Result<&Node, CodecError> {
        self.child(local).ok_or_else(|| {
            CodecError::MissingElement(format!("{} in {}", local, self.local_name()))
        })
    }

    pub(crate) fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.local_name() == local)
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn child_text(&self, local: &str) -> Option<&str> {
        self.child(local).map(Node::text)
    }

    pub(crate) fn require_child_text(&self, local: &str) -> Result<&str, CodecError> {
        self.require_child(local).map(Node::text)
    }
}

fn local_part(qname: &str) -> &str {
    qname.rsplit_once(':').map_or(qname, |(_, local)| local)
}

/// Parse a document into its root element
pub(crate) fn parse_document(bytes: &[u8]) -> Result<Node, CodecError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => stack.push(Node::from_start(&start)?),
            Ok(Event::Empty(start)) => {
                let node = Node::from_start(&start)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| CodecError::Xml("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    let text = text.unescape().map_err(|e| CodecError::Xml(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    let data = data.into_inner();
                    let text =
                        std::str::from_utf8(&data).map_err(|e| CodecError::Xml(e.to_string()))?;
                    top.text.push_str(text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(CodecError::Xml(e.to_string())),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(CodecError::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| CodecError::Malformed("document has no root element".to_string()))
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) -> Result<(), CodecError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(CodecError::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_escapes_text_and_attributes() {
        let mut w = XmlWriter::new();
        w.open("a:root", &[("name", "x\"<y>")]);
        w.leaf("a:item", &[], "1 < 2 & 3");
        w.empty("a:flag", &[]);
        w.close("a:root");
        let xml = w.finish();
        assert_eq!(
            xml,
            "<a:root name=\"x&quot;&lt;y&gt;\"><a:item>1 &lt; 2 &amp; 3</a:item><a:flag/></a:root>"
        );
    }

    #[test]
    fn test_parse_roundtrip_of_escaped_content() {
        let doc = "<a:root xmlns:a=\"urn:a\" name=\"x&quot;&lt;y&gt;\"><a:item>1 &lt; 2 &amp; 3</a:item><a:flag/></a:root>";
        let root = parse_document(doc.as_bytes()).unwrap();
        assert_eq!(root.local_name(), "root");
        assert_eq!(root.prefix(), Some("a"));
        assert_eq!(root.namespace_declaration(Some("a")), Some("urn:a"));
        assert_eq!(root.attr("name"), Some("x\"<y>"));
        assert_eq!(root.attr("a"), None);
        assert_eq!(root.child_text("item"), Some("1 < 2 & 3"));
        assert!(root.child("flag").is_some());
    }

    #[test]
    fn test_whitespace_text_is_preserved_in_leaves() {
        let root = parse_document(b"<r><v>  padded  </v></r>").unwrap();
        assert_eq!(root.child_text("v"), Some("  padded  "));
    }

    #[test]
    fn test_rejects_broken_documents() {
        assert!(parse_document(b"<a><b></a>").is_err());
        assert!(parse_document(b"<a>").is_err());
        assert!(parse_document(b"").is_err());
    }
}
