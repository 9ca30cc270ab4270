//! Arena-allocated DOM tree.
//!
//! Nodes live in one `Vec` and link to each other by index, so the
//! sanitizer can detach, move and re-insert subtrees without fighting the
//! borrow checker. Removed nodes stay allocated until the whole `Dom` is
//! dropped; a sanitizer run is short-lived so that is never a concern.

use html5ever::{local_name, ns, LocalName, QualName};

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel for "no node".
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_some(self) -> bool {
        self.0 != u32::MAX
    }

    pub fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    fn get(self) -> Option<NodeId> {
        self.is_some().then_some(self)
    }
}

/// An attribute as parsed, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: QualName,
    pub value: String,
}

impl Attr {
    /// Attribute as written in markup: `epub:type`, `href`, …
    pub fn key(&self) -> String {
        match self.name.prefix {
            Some(ref p) => format!("{}:{}", p, self.name.local),
            None => self.name.local.to_string(),
        }
    }
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Doctype,
    Element { name: QualName, attrs: Vec<Attr> },
    Text(String),
    Comment(String),
    /// Markup emitted verbatim by the renderer.
    Raw(String),
}

#[derive(Debug)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Arena DOM with a document root at index 0.
#[derive(Debug)]
pub struct Dom {
    nodes: Vec<Node>,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeData::Document)],
        }
    }

    pub fn document(&self) -> NodeId {
        NodeId(0)
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(data));
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize)
    }

    // ── Construction ─────────────────────────────────────────────────────

    pub fn create_element(&mut self, name: QualName, attrs: Vec<Attr>) -> NodeId {
        self.alloc(NodeData::Element { name, attrs })
    }

    /// New element in the HTML namespace without attributes.
    pub fn create_html_element(&mut self, local: LocalName) -> NodeId {
        self.create_element(QualName::new(None, ns!(html), local), Vec::new())
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Comment(text.into()))
    }

    pub fn create_doctype(&mut self) -> NodeId {
        self.alloc(NodeData::Doctype)
    }

    pub fn create_raw(&mut self, markup: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Raw(markup.into()))
    }

    // ── Tree surgery ─────────────────────────────────────────────────────

    /// Unlink `id` from its parent and siblings. Its own subtree stays intact.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = match self.node(id) {
            Some(n) => (n.parent, n.prev_sibling, n.next_sibling),
            None => return,
        };
        if let Some(p) = prev.get().and_then(|p| self.node_mut(p)) {
            p.next_sibling = next;
        } else if let Some(par) = parent.get().and_then(|p| self.node_mut(p)) {
            par.first_child = next;
        }
        if let Some(n) = next.get().and_then(|n| self.node_mut(n)) {
            n.prev_sibling = prev;
        } else if let Some(par) = parent.get().and_then(|p| self.node_mut(p)) {
            par.last_child = prev;
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = NodeId::NONE;
            n.prev_sibling = NodeId::NONE;
            n.next_sibling = NodeId::NONE;
        }
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        let last = match self.node(parent) {
            Some(p) => p.last_child,
            None => return,
        };
        if let Some(c) = self.node_mut(child) {
            c.parent = parent;
            c.prev_sibling = last;
        }
        if let Some(l) = last.get().and_then(|l| self.node_mut(l)) {
            l.next_sibling = child;
        }
        if let Some(p) = self.node_mut(parent) {
            if p.first_child.is_none() {
                p.first_child = child;
            }
            p.last_child = child;
        }
    }

    /// Insert `new_node` immediately before `sibling`, detaching it first.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        if sibling == new_node {
            return;
        }
        self.detach(new_node);
        let (parent, prev) = match self.node(sibling) {
            Some(s) => (s.parent, s.prev_sibling),
            None => return,
        };
        if let Some(n) = self.node_mut(new_node) {
            n.parent = parent;
            n.prev_sibling = prev;
            n.next_sibling = sibling;
        }
        if let Some(s) = self.node_mut(sibling) {
            s.prev_sibling = new_node;
        }
        if let Some(p) = prev.get().and_then(|p| self.node_mut(p)) {
            p.next_sibling = new_node;
        } else if let Some(par) = parent.get().and_then(|p| self.node_mut(p)) {
            par.first_child = new_node;
        }
    }

    /// Insert `new_node` immediately after `sibling`.
    pub fn insert_after(&mut self, sibling: NodeId, new_node: NodeId) {
        match self.next_sibling(sibling) {
            Some(next) => self.insert_before(next, new_node),
            None => {
                if let Some(parent) = self.parent(sibling) {
                    self.append(parent, new_node);
                }
            }
        }
    }

    /// Append text, merging with a trailing text child.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last = self.node(parent).map(|p| p.last_child).unwrap_or(NodeId::NONE);
        if let Some(Node {
            data: NodeData::Text(existing),
            ..
        }) = last.get().and_then(|l| self.node_mut(l))
        {
            existing.push_str(text);
            return;
        }
        let t = self.create_text(text);
        self.append(parent, t);
    }

    /// Insert text before `sibling`, merging with a preceding text node.
    pub fn insert_text_before(&mut self, sibling: NodeId, text: &str) {
        let prev = self.node(sibling).map(|s| s.prev_sibling).unwrap_or(NodeId::NONE);
        if let Some(Node {
            data: NodeData::Text(existing),
            ..
        }) = prev.get().and_then(|p| self.node_mut(p))
        {
            existing.push_str(text);
            return;
        }
        let t = self.create_text(text);
        self.insert_before(sibling, t);
    }

    /// Move every child of `from` to the end of `to`, keeping order.
    pub fn reparent_children(&mut self, from: NodeId, to: NodeId) {
        for child in self.children(from) {
            self.append(to, child);
        }
    }

    // ── Navigation ───────────────────────────────────────────────────────

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent.get())
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.first_child.get())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.next_sibling.get())
    }

    /// Snapshot of the children of `id`, safe to iterate while mutating.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.first_child(id);
        while let Some(c) = cur {
            out.push(c);
            cur = self.next_sibling(c);
        }
        out
    }

    /// Depth-first, document-order list of `root` and all its descendants.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut kids = self.children(id);
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    // ── Element accessors ────────────────────────────────────────────────

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.node(id).map(|n| &n.data)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id), Some(NodeData::Element { .. }))
    }

    /// Local name of an element, `None` for other node kinds.
    pub fn local_name(&self, id: NodeId) -> Option<&LocalName> {
        match self.data(id) {
            Some(NodeData::Element { name, .. }) => Some(&name.local),
            _ => None,
        }
    }

    pub fn is_named(&self, id: NodeId, local: &LocalName) -> bool {
        self.local_name(id) == Some(local)
    }

    /// Rename an element, keeping attributes and children.
    pub fn rename(&mut self, id: NodeId, local: LocalName) {
        if let Some(Node {
            data: NodeData::Element { name, .. },
            ..
        }) = self.node_mut(id)
        {
            name.local = local;
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[Attr] {
        match self.data(id) {
            Some(NodeData::Element { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    pub fn set_attrs(&mut self, id: NodeId, new_attrs: Vec<Attr>) {
        if let Some(Node {
            data: NodeData::Element { attrs, .. },
            ..
        }) = self.node_mut(id)
        {
            *attrs = new_attrs;
        }
    }

    /// Value of the first attribute with key `key`.
    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|a| a.name.prefix.is_none() && &*a.name.local == key)
            .map(|a| a.value.as_str())
    }

    /// Set (or add) an unprefixed attribute.
    pub fn set_attr(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(Node {
            data: NodeData::Element { attrs, .. },
            ..
        }) = self.node_mut(id)
        {
            match attrs
                .iter_mut()
                .find(|a| a.name.prefix.is_none() && &*a.name.local == key)
            {
                Some(a) => a.value = value,
                None => attrs.push(Attr {
                    name: QualName::new(None, ns!(), LocalName::from(key)),
                    value,
                }),
            }
        }
    }

    /// Text of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Text(t)) => Some(t),
            _ => None,
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// First element named `local` in document order.
    pub fn find_first(&self, local: &LocalName) -> Option<NodeId> {
        self.descendants(self.document())
            .into_iter()
            .find(|&n| self.is_named(n, local))
    }

    /// The `<body>` element created by the HTML parser.
    pub fn body(&self) -> Option<NodeId> {
        self.find_first(&local_name!("body"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(dom: &mut Dom, tag: &str) -> NodeId {
        dom.create_html_element(LocalName::from(tag))
    }

    #[test]
    fn append_and_children_order() {
        let mut dom = Dom::new();
        let root = dom.document();
        let a = el(&mut dom, "a");
        let b = el(&mut dom, "b");
        dom.append(root, a);
        dom.append(root, b);
        assert_eq!(dom.children(root), vec![a, b]);
        assert_eq!(dom.parent(b), Some(root));
    }

    #[test]
    fn insert_before_first_updates_parent() {
        let mut dom = Dom::new();
        let root = dom.document();
        let a = el(&mut dom, "a");
        let b = el(&mut dom, "b");
        dom.append(root, a);
        dom.insert_before(a, b);
        assert_eq!(dom.children(root), vec![b, a]);
        assert_eq!(dom.first_child(root), Some(b));
    }

    #[test]
    fn append_moves_existing_node() {
        let mut dom = Dom::new();
        let root = dom.document();
        let p = el(&mut dom, "p");
        let div = el(&mut dom, "div");
        let span = el(&mut dom, "span");
        dom.append(root, p);
        dom.append(root, div);
        dom.append(p, span);
        dom.append(div, span);
        assert!(dom.children(p).is_empty());
        assert_eq!(dom.children(div), vec![span]);
    }

    #[test]
    fn detach_middle_and_last() {
        let mut dom = Dom::new();
        let root = dom.document();
        let ids: Vec<_> = ["a", "b", "c"].iter().map(|t| el(&mut dom, t)).collect();
        for &i in &ids {
            dom.append(root, i);
        }
        dom.detach(ids[1]);
        assert_eq!(dom.children(root), vec![ids[0], ids[2]]);
        dom.detach(ids[2]);
        assert_eq!(dom.children(root), vec![ids[0]]);
        assert_eq!(dom.node(root).unwrap().last_child, ids[0]);
    }

    #[test]
    fn text_merges() {
        let mut dom = Dom::new();
        let root = dom.document();
        dom.append_text(root, "Hello, ");
        dom.append_text(root, "world");
        assert_eq!(dom.children(root).len(), 1);
        assert_eq!(dom.text_content(root), "Hello, world");
    }

    #[test]
    fn attributes_set_and_read() {
        let mut dom = Dom::new();
        let a = el(&mut dom, "a");
        dom.set_attr(a, "href", "#x");
        assert_eq!(dom.attr(a, "href"), Some("#x"));
        dom.set_attr(a, "href", "#y");
        assert_eq!(dom.attrs(a).len(), 1);
        assert_eq!(dom.attr(a, "href"), Some("#y"));
        assert_eq!(dom.attrs(a)[0].key(), "href");
    }

    #[test]
    fn rename_keeps_children() {
        let mut dom = Dom::new();
        let root = dom.document();
        let fc = el(&mut dom, "figcaption");
        dom.append(root, fc);
        dom.append_text(fc, "cap");
        dom.rename(fc, local_name!("p"));
        assert!(dom.is_named(fc, &local_name!("p")));
        assert_eq!(dom.text_content(fc), "cap");
    }
}
