//! Arena-backed XML tree for problem documents.
//!
//! The authored markup is parsed once with `roxmltree` and copied into a
//! flat arena of nodes addressed by [`NodeId`]. Construction passes
//! (normalisation, shuffling, choice naming) mutate the arena; after that the
//! problem only reads it. Comments and processing instructions are dropped.

use std::fmt::Write as _;

use crate::error::CapaError;

/// Index of a node in a [`Document`].
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed problem document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

/// HTML elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "input", "meta", "link", "col", "area"];

impl Document {
    /// Parse `source` into an arena.
    pub fn parse(source: &str) -> Result<Self, CapaError> {
        let parsed = roxmltree::Document::parse(source)
            .map_err(|e| CapaError::Parse(format!("malformed problem XML: {e}")))?;

        let mut doc = Document {
            nodes: Vec::new(),
            root: 0,
        };
        doc.root = doc.copy_node(parsed.root_element(), None);
        Ok(doc)
    }

    fn copy_node(&mut self, node: roxmltree::Node<'_, '_>, parent: Option<NodeId>) -> NodeId {
        let attrs = node
            .attributes()
            .map(|a| (a.name().to_string(), a.value().to_string()))
            .collect();
        let id = self.push(
            NodeKind::Element {
                tag: node.tag_name().name().to_string(),
                attrs,
            },
            parent,
        );
        for child in node.children() {
            if child.is_element() {
                let child_id = self.copy_node(child, Some(id));
                self.nodes[id].children.push(child_id);
            } else if child.is_text() {
                if let Some(text) = child.text() {
                    let text_id = self.push(NodeKind::Text(text.to_string()), Some(id));
                    self.nodes[id].children.push(text_id);
                }
            }
        }
        id
    }

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].kind, NodeKind::Element { .. })
    }

    /// Tag name, or `None` for text nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn has_tag(&self, id: NodeId, name: &str) -> bool {
        self.tag(id) == Some(name)
    }

    pub fn set_tag(&mut self, id: NodeId, name: &str) {
        if let NodeKind::Element { tag, .. } = &mut self.nodes[id].kind {
            *tag = name.to_string();
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id].kind {
            NodeKind::Element { attrs, .. } => attrs,
            NodeKind::Text(_) => &[],
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            match attrs.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id].kind {
            attrs.retain(|(k, _)| k != name);
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
    }

    pub fn find_child(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.element_children(id).find(|c| self.has_tag(*c, tag))
    }

    pub fn find_children(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.element_children(id)
            .filter(|c| self.has_tag(*c, tag))
            .collect()
    }

    /// Every element below `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            if self.is_element(next) {
                out.push(next);
                stack.extend(self.nodes[next].children.iter().rev().copied());
            }
        }
        out
    }

    pub fn find_descendants(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|d| self.has_tag(*d, tag))
            .collect()
    }

    /// Elements below `id` whose tag is one of `tags`, in document order.
    pub fn find_descendants_any(&self, id: NodeId, tags: &[&str]) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|d| self.tag(*d).map(|t| tags.contains(&t)).unwrap_or(false))
            .collect()
    }

    /// Nearest ancestor with the given tag.
    pub fn ancestor(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if self.has_tag(p, tag) {
                return Some(p);
            }
            cur = self.parent(p);
        }
        None
    }

    pub fn previous_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = &self.nodes[parent].children;
        let pos = siblings.iter().position(|c| *c == id)?;
        siblings[..pos]
            .iter()
            .rev()
            .copied()
            .find(|c| self.is_element(*c))
    }

    pub fn following_element_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        let siblings = &self.nodes[parent].children;
        match siblings.iter().position(|c| *c == id) {
            Some(pos) => siblings[pos + 1..]
                .iter()
                .copied()
                .filter(|c| self.is_element(*c))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Text before the first child element.
    pub fn leading_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in &self.nodes[id].children {
            match &self.nodes[*child].kind {
                NodeKind::Text(t) => out.push_str(t),
                NodeKind::Element { .. } => break,
            }
        }
        out
    }

    /// All text below `id`, concatenated in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Element { .. } => {
                for child in &self.nodes[id].children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Replace the children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        for child in std::mem::take(&mut self.nodes[id].children) {
            self.nodes[child].parent = None;
        }
        let text_id = self.push(NodeKind::Text(text.to_string()), Some(id));
        self.nodes[id].children.push(text_id);
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.push(
            NodeKind::Element {
                tag: tag.to_string(),
                attrs,
            },
            None,
        )
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Unlink `id` from its parent. The node stays in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|c| *c != id);
        }
    }

    /// Reorder the element children of `parent` that appear in `order`.
    ///
    /// Elements named in `order` are placed into the slots previously held by
    /// those same elements, so surrounding text and other elements keep their
    /// positions. Elements of `parent` missing from `order` are removed.
    pub fn reorder_children(&mut self, parent: NodeId, selected: &[NodeId], order: &[NodeId]) {
        let mut replacement = order.iter().copied();
        let old = std::mem::take(&mut self.nodes[parent].children);
        let mut new_children = Vec::with_capacity(old.len());
        for child in old {
            if selected.contains(&child) {
                match replacement.next() {
                    Some(next) => new_children.push(next),
                    None => self.nodes[child].parent = None,
                }
            } else {
                new_children.push(child);
            }
        }
        for child in &new_children {
            self.nodes[*child].parent = Some(parent);
        }
        for dropped in selected.iter().filter(|s| !order.contains(*s)) {
            self.nodes[*dropped].parent = None;
        }
        self.nodes[parent].children = new_children;
    }

    /// Serialize the children of `id`.
    pub fn inner_xml(&self, id: NodeId) -> String {
        self.inner_xml_without(id, &[])
    }

    /// Serialize the children of `id`, leaving out elements tagged `skip`.
    pub fn inner_xml_without(&self, id: NodeId, skip: &[&str]) -> String {
        let mut out = String::new();
        for child in &self.nodes[id].children {
            self.write_node(*child, &mut out, skip);
        }
        out
    }

    /// Serialize `id` including its own tag.
    pub fn outer_xml(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out, &[]);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String, skip: &[&str]) {
        match &self.nodes[id].kind {
            NodeKind::Text(t) => out.push_str(&escape_text(t)),
            NodeKind::Element { tag, .. } if skip.contains(&tag.as_str()) => {}
            NodeKind::Element { tag, attrs } => {
                write_open_tag(out, tag, attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                if self.nodes[id].children.is_empty() && VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in &self.nodes[id].children {
                    self.write_node(*child, out, skip);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

/// Write `<tag k="v" ...>` with escaped attribute values.
pub fn write_open_tag<'a>(
    out: &mut String,
    tag: &str,
    attrs: impl IntoIterator<Item = (&'a str, &'a str)>,
) {
    out.push('<');
    out.push_str(tag);
    for (k, v) in attrs {
        let _ = write!(out, " {k}=\"{}\"", escape_attr(v));
    }
    out.push('>');
}

pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<problem>
<p>Intro <b>bold</b> tail</p>
<!-- comment -->
<choiceresponse>
  <checkboxgroup>
    <choice correct="true">A</choice>
    <choice correct="false">B</choice>
  </checkboxgroup>
</choiceresponse>
</problem>"#;

    #[test]
    fn parses_and_drops_comments() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.tag(doc.root()), Some("problem"));
        assert!(!doc.inner_xml(doc.root()).contains("comment"));
        let choices = doc.find_descendants(doc.root(), "choice");
        assert_eq!(choices.len(), 2);
        assert_eq!(doc.attr(choices[0], "correct"), Some("true"));
        assert_eq!(doc.text_content(choices[1]), "B");
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = Document::parse("<problem><p></problem>").unwrap_err();
        assert!(matches!(err, CapaError::Parse(_)));
    }

    #[test]
    fn leading_text_stops_at_first_element() {
        let doc = Document::parse("<p>Intro <b>bold</b> tail</p>").unwrap();
        assert_eq!(doc.leading_text(doc.root()), "Intro ");
        assert_eq!(doc.text_content(doc.root()), "Intro bold tail");
    }

    #[test]
    fn serializes_with_escaping() {
        let mut doc = Document::parse(r#"<a x="1">&lt;b&gt; &amp; c</a>"#).unwrap();
        let root = doc.root();
        doc.set_attr(root, "title", "say \"hi\"");
        assert_eq!(
            doc.outer_xml(root),
            r#"<a x="1" title="say &quot;hi&quot;">&lt;b&gt; &amp; c</a>"#
        );
    }

    #[test]
    fn reorder_keeps_text_slots() {
        let mut doc = Document::parse("<g>x<c>1</c><c>2</c><c>3</c>y</g>").unwrap();
        let root = doc.root();
        let cs = doc.find_children(root, "c");
        doc.reorder_children(root, &cs, &[cs[2], cs[0]]);
        assert_eq!(doc.inner_xml(root), "x<c>3</c><c>1</c>y");
        assert_eq!(doc.parent(cs[1]), None);
    }

    #[test]
    fn sibling_and_ancestor_navigation() {
        let doc = Document::parse("<r><p>label</p>text<i/><s><t/></s></r>").unwrap();
        let root = doc.root();
        let i = doc.find_child(root, "i").unwrap();
        let p = doc.previous_element_sibling(i).unwrap();
        assert_eq!(doc.tag(p), Some("p"));
        let s = doc.find_child(root, "s").unwrap();
        assert_eq!(doc.following_element_siblings(p), vec![i, s]);
        let t = doc.find_descendants(root, "t")[0];
        assert_eq!(doc.ancestor(t, "r"), Some(root));
        assert_eq!(doc.outer_xml(i), "<i></i>");
    }

    #[test]
    fn skipped_tags_are_not_serialized() {
        let doc = Document::parse("<choice>Red <choicehint>No</choicehint>apple</choice>").unwrap();
        assert_eq!(doc.inner_xml_without(doc.root(), &["choicehint"]), "Red apple");
    }
}
