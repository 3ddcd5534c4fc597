/*
 * xml.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! XML escaping, entity unescaping, and node serialization.
//!
//! The serializers here back the copy commands (`outer_xml`) and
//! template extraction from XML elements (`inner_xml`). They write a
//! canonical form: attributes double-quoted in document order, childless
//! elements self-closed as `<name/>`, text re-escaped.

use sxd_document::dom::{ChildOfElement, Element, Root};
use sxd_xpath::nodeset::Node;

/// Escape the characters that are unsafe in XML text content.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape an attribute value for serialization. Apostrophes stay raw;
/// the serializer always double-quotes.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a value for emission into any XML context, quotes included.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode the five predefined XML entities. `&amp;` is decoded last so
/// that `&amp;lt;` becomes `&lt;` and not `<`.
pub fn unescape(value: &str) -> String {
    value
        .replace("&apos;", "'")
        .replace("&quot;", "\"")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

/// Serialize a query-result node to its full markup.
pub fn outer_xml(node: &Node<'_>) -> String {
    let mut out = String::new();
    match node {
        Node::Element(el) => write_element(el, &mut out),
        Node::Attribute(attr) => {
            out.push_str(attr.name().local_part());
            out.push_str("=\"");
            out.push_str(&escape_attribute(attr.value()));
            out.push('"');
        }
        Node::Text(text) => out.push_str(&escape_text(text.text())),
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment.text());
            out.push_str("-->");
        }
        Node::ProcessingInstruction(pi) => {
            out.push_str("<?");
            out.push_str(pi.target());
            if let Some(value) = pi.value() {
                out.push(' ');
                out.push_str(value);
            }
            out.push_str("?>");
        }
        Node::Root(root) => write_root(root, &mut out),
        Node::Namespace(ns) => out.push_str(ns.uri()),
    }
    out
}

/// Serialize the children of an element, the element's own tag excluded.
pub fn inner_xml(element: &Element<'_>) -> String {
    let mut out = String::new();
    for child in element.children() {
        write_child(&child, &mut out);
    }
    out
}

fn write_root(root: &Root<'_>, out: &mut String) {
    for child in root.children() {
        if let Some(el) = child.element() {
            write_element(&el, out);
        }
    }
}

fn write_element(element: &Element<'_>, out: &mut String) {
    out.push('<');
    out.push_str(element.name().local_part());
    for attr in element.attributes() {
        out.push(' ');
        out.push_str(attr.name().local_part());
        out.push_str("=\"");
        out.push_str(&escape_attribute(attr.value()));
        out.push('"');
    }
    let children = element.children();
    if children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &children {
        write_child(child, out);
    }
    out.push_str("</");
    out.push_str(element.name().local_part());
    out.push('>');
}

fn write_child(child: &ChildOfElement<'_>, out: &mut String) {
    match child {
        ChildOfElement::Element(el) => write_element(el, out),
        ChildOfElement::Text(text) => out.push_str(&escape_text(text.text())),
        ChildOfElement::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment.text());
            out.push_str("-->");
        }
        ChildOfElement::ProcessingInstruction(pi) => {
            out.push_str("<?");
            out.push_str(pi.target());
            if let Some(value) = pi.value() {
                out.push(' ');
                out.push_str(value);
            }
            out.push_str("?>");
        }
    }
}
