/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! XPath-driven stencil templates over XML documents.
//!
//! A template is plain text with embedded commands between configurable
//! delimiters (`{{` ... `}}` by default). Commands query the source
//! document with XPath 1.0 expressions and emit results, iterate
//! node-sets, branch on conditions, bind variables, apply named
//! sub-templates, and format values. Transformation concatenates the
//! literal text and the command output in source order.
//!
//! ```
//! use sxd_document::parser;
//! use xstencil::{Engine, Template};
//!
//! let package = parser::parse("<order><item>socks</item></order>").unwrap();
//! let doc = package.as_document();
//! let order = doc.root().children()[0].element().unwrap();
//!
//! let template = Template::compile("You ordered: {{ = item }}").unwrap();
//! let out = Engine::new().transform(&template, order);
//! assert_eq!(out, "You ordered: socks");
//! ```

pub mod ast;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod format;
pub mod parser;
pub mod resolver;
pub mod xhtml;
pub mod xml;
pub mod xpath;

pub use context::Bindings;
pub use error::{TemplateError, TemplateResult};
pub use evaluator::Engine;
pub use parser::{Template, TemplateOptions};
pub use resolver::TemplateCatalog;
pub use xpath::{DocumentLoader, FsDocumentLoader, QueryEngine, Resolved};
