//! html5ever `TreeSink` that builds a [`Dom`].

use std::borrow::Cow;
use std::cell::{Cell, RefCell};

use html5ever::interface::ElemName;
use html5ever::tendril::StrTendril;
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{local_name, ns, Attribute, LocalName, Namespace, QualName};

use super::arena::{Attr, Dom, NodeData, NodeId};

/// Owned element name handed back to the tree builder.
///
/// The arena sits behind a `RefCell`, so a borrowed `&QualName` cannot
/// outlive the borrow guard; cloning the (interned) name sidesteps that.
#[derive(Debug)]
pub struct SinkName(QualName);

impl ElemName for SinkName {
    fn ns(&self) -> &Namespace {
        &self.0.ns
    }

    fn local_name(&self) -> &LocalName {
        &self.0.local
    }
}

/// Tree builder target. Interior mutability because `TreeSink` takes `&self`.
pub struct DomSink {
    dom: RefCell<Dom>,
    quirks_mode: Cell<QuirksMode>,
}

impl Default for DomSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DomSink {
    pub fn new() -> Self {
        Self {
            dom: RefCell::new(Dom::new()),
            quirks_mode: Cell::new(QuirksMode::NoQuirks),
        }
    }

    pub fn into_dom(self) -> Dom {
        self.dom.into_inner()
    }

    fn convert_attrs(attrs: Vec<Attribute>) -> Vec<Attr> {
        attrs
            .into_iter()
            .map(|a| Attr {
                name: a.name,
                value: a.value.to_string(),
            })
            .collect()
    }
}

impl TreeSink for DomSink {
    type Handle = NodeId;
    type Output = Self;
    type ElemName<'a>
        = SinkName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    fn parse_error(&self, _msg: Cow<'static, str>) {}

    fn get_document(&self) -> Self::Handle {
        self.dom.borrow().document()
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        match self.dom.borrow().data(*target) {
            Some(NodeData::Element { name, .. }) => SinkName(name.clone()),
            _ => SinkName(QualName::new(None, ns!(), local_name!(""))),
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        self.dom
            .borrow_mut()
            .create_element(name, Self::convert_attrs(attrs))
    }

    fn create_comment(&self, text: StrTendril) -> Self::Handle {
        self.dom.borrow_mut().create_comment(text.to_string())
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        self.dom.borrow_mut().create_comment(String::new())
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let mut dom = self.dom.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => dom.append(*parent, node),
            NodeOrText::AppendText(text) => dom.append_text(*parent, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        let parent = self.dom.borrow().parent(*element);
        match parent {
            Some(_) => self.append_before_sibling(element, child),
            None => self.append(prev_element, child),
        }
    }

    fn append_doctype_to_document(
        &self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
        let mut dom = self.dom.borrow_mut();
        let doc = dom.document();
        let doctype = dom.create_doctype();
        dom.append(doc, doctype);
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        *target
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        x == y
    }

    fn set_quirks_mode(&self, mode: QuirksMode) {
        self.quirks_mode.set(mode);
    }

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let mut dom = self.dom.borrow_mut();
        match new_node {
            NodeOrText::AppendNode(node) => dom.insert_before(*sibling, node),
            NodeOrText::AppendText(text) => dom.insert_text_before(*sibling, &text),
        }
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        let mut dom = self.dom.borrow_mut();
        let mut existing = dom.attrs(*target).to_vec();
        for attr in Self::convert_attrs(attrs) {
            if !existing.iter().any(|a| a.name == attr.name) {
                existing.push(attr);
            }
        }
        dom.set_attrs(*target, existing);
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        self.dom.borrow_mut().detach(*target);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        self.dom.borrow_mut().reparent_children(*node, *new_parent);
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse_document;

    #[test]
    fn builds_implied_structure() {
        let dom = parse_document("<p>Hello</p>");
        let body = dom.body().unwrap();
        let kids = dom.children(body);
        assert_eq!(kids.len(), 1);
        assert_eq!(dom.local_name(kids[0]).map(|l| &**l), Some("p"));
        assert_eq!(dom.text_content(kids[0]), "Hello");
    }

    #[test]
    fn misnested_formatting_is_repaired() {
        let dom = parse_document("<b><i>x</b>y</i>");
        let body = dom.body().unwrap();
        assert_eq!(dom.text_content(body), "xy");
    }

    #[test]
    fn table_foster_parenting_keeps_text() {
        let dom = parse_document("<table>stray<tr><td>cell</td></tr></table>");
        let body = dom.body().unwrap();
        let text = dom.text_content(body);
        assert!(text.contains("stray"));
        assert!(text.contains("cell"));
    }

    #[test]
    fn attributes_survive_parsing() {
        let dom = parse_document(r#"<a href="/x" title="t">l</a>"#);
        let a = dom.find_first(&html5ever::local_name!("a")).unwrap();
        assert_eq!(dom.attr(a, "href"), Some("/x"));
        assert_eq!(dom.attr(a, "title"), Some("t"));
    }
}
