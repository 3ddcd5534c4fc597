/*
 * xhtml.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! HTML to XHTML coercion for the `xhtml` result command.
//!
//! The rewriter walks tag by tag: unvalued attributes expand to
//! `name="name"`, unquoted attribute values gain double quotes, `<` and
//! `>` inside attribute values are entity-escaped, and HTML void
//! elements (`<br>`, `<hr>`, ...) become self-closing, swallowing an
//! immediately following explicit close tag. Text outside of tags
//! passes through untouched.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(?P<name>/?[A-Za-z_][A-Za-z0-9._:-]*)\s*").expect("tag start pattern")
});

// Attribute at the cursor: a name, optionally `= value` where the value
// is single-quoted, double-quoted, or a bare run of non-whitespace.
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?P<name>[A-Za-z_][A-Za-z0-9._:-]*)(?P<valued>(?P<equals>\s*=\s*)(?P<value>'[^']*'|"[^"]*"|[^ \t\n\r\x0b\x0c]+))?(?P<trailing>\s*)"#,
    )
    .expect("attribute pattern")
});

static TAG_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"/?>").expect("tag end pattern"));

static VOID_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:area|base|basefont|br|col|frame|hr|img|input|isindex|link|meta|param)$")
        .expect("void element pattern")
});

fn escape_angles(value: &str) -> String {
    value.replace('<', "&lt;").replace('>', "&gt;")
}

/// Rewrite an HTML string into well-formed XHTML.
pub fn coerce(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;

    while cursor < input.len() {
        let Some(tag) = TAG_START.captures_at(input, cursor) else {
            out.push_str(&input[cursor..]);
            break;
        };
        let whole = tag.get(0).expect("whole match");
        let name = tag.name("name").expect("tag name").as_str().to_string();
        out.push_str(&input[cursor..whole.end()]);
        cursor = whole.end();

        // Attributes must match exactly at the cursor.
        while cursor < input.len() {
            let Some(attr) = ATTRIBUTE.captures_at(input, cursor) else {
                break;
            };
            let matched = attr.get(0).expect("whole match");
            if matched.start() != cursor {
                break;
            }
            let trailing = attr.name("trailing").map_or("", |m| m.as_str());
            if attr.name("valued").is_none() {
                let attr_name = attr.name("name").expect("attr name").as_str();
                out.push_str(attr_name);
                out.push_str("=\"");
                out.push_str(attr_name);
                out.push('"');
                out.push_str(trailing);
            } else {
                let value = attr.name("value").expect("attr value").as_str();
                if value.starts_with('"') || value.starts_with('\'') {
                    out.push_str(&escape_angles(matched.as_str()));
                } else {
                    out.push_str(attr.name("name").expect("attr name").as_str());
                    out.push_str(attr.name("equals").expect("equals").as_str());
                    out.push('"');
                    out.push_str(&escape_angles(value));
                    out.push('"');
                    out.push_str(trailing);
                }
            }
            cursor = matched.end();
        }

        // Copy any stray content up to the tag end.
        if cursor < input.len() {
            if let Some(end) = TAG_END.find_at(input, cursor) {
                if end.start() > cursor {
                    out.push_str(&input[cursor..end.start()]);
                    cursor = end.start();
                }
            }
        }

        // Self-close void elements; drop a redundant explicit close tag.
        if VOID_ELEMENT.is_match(&name.to_ascii_lowercase()) && input[cursor..].starts_with('>') {
            out.push_str(" /");
            let close =
                Regex::new(&format!(r"^>\s*</{}>", regex::escape(&name))).expect("close pattern");
            if let Some(matched) = close.find(&input[cursor..]) {
                // Land on the final `>` so the normal copy emits it.
                cursor += matched.end() - 1;
            }
        }
    }
    out
}
