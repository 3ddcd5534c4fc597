/*
 * xpath.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The path-query bridge: expression evaluation against the context
//! node with the current variable bindings, plus the `Split`/`Replace`
//! regex extension functions and external document loading.
//!
//! Query failures are never fatal. A malformed expression or an
//! evaluation error logs at debug level and resolves to nothing; the
//! calling command then renders empty or skips.

use std::borrow::Cow;

use regex::Regex;
use sxd_document::parser;
use sxd_document::Package;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{context, Context, Factory, Value};
use tracing::debug;
use typed_arena::Arena;

use crate::context::Bindings;
use crate::error::{TemplateError, TemplateResult};

/// A single-node query result. Scalar results (strings, numbers,
/// booleans, literals) carry no node and are distinguished so the copy
/// commands can wrap them in synthetic markup.
#[derive(Debug, Clone)]
pub enum Resolved<'d> {
    Node(Node<'d>),
    Scalar(String),
}

impl Resolved<'_> {
    /// The text value: the node's string-value, or the scalar itself.
    pub fn text(&self) -> String {
        match self {
            Resolved::Node(node) => node.string_value(),
            Resolved::Scalar(s) => s.clone(),
        }
    }
}

/// Compiles and evaluates query expressions for one template, carrying
/// the template's variable-prefix rewrite.
pub struct QueryEngine {
    factory: Factory,
    prefix_rewrite: Option<Regex>,
}

impl QueryEngine {
    /// `variable_prefix` is the prefix marking variable references in
    /// template expressions. The standard `$` passes straight through
    /// to the query engine; any other prefix is textually rewritten to
    /// `$` before evaluation.
    pub fn new(variable_prefix: &str) -> Self {
        let prefix_rewrite = if variable_prefix == "$" {
            None
        } else {
            let pattern = format!(
                "{}(?P<name>[A-Za-z_][A-Za-z0-9_.-]*)",
                regex::escape(variable_prefix)
            );
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    debug!(variable_prefix, error = %e, "unusable variable prefix");
                    None
                }
            }
        };
        Self {
            factory: Factory::new(),
            prefix_rewrite,
        }
    }

    /// Evaluate an expression. `None` means the expression was empty,
    /// malformed, or failed to evaluate.
    pub fn evaluate<'d>(
        &self,
        expr: &str,
        context_node: Node<'d>,
        bindings: &Bindings<'d>,
    ) -> Option<Value<'d>> {
        let expr = expr.trim();
        if expr.is_empty() {
            return None;
        }
        let expr = match &self.prefix_rewrite {
            Some(re) => re.replace_all(expr, "$$$name"),
            None => Cow::Borrowed(expr),
        };
        let xpath = match self.factory.build(&expr) {
            Ok(Some(xpath)) => xpath,
            Ok(None) => return None,
            Err(e) => {
                debug!(expr = %expr, error = %e, "malformed query expression");
                return None;
            }
        };
        let mut context = Context::new();
        context.set_function("Split", RegexSplit);
        context.set_function("Replace", RegexReplace);
        for (name, value) in bindings.iter() {
            context.set_variable(name, value.clone());
        }
        match xpath.evaluate(&context, context_node) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(expr = %expr, error = %e, "query evaluation failed");
                None
            }
        }
    }

    /// Resolve to a single node: the first node of a node-set in
    /// document order, or the scalar value of a non-node-set result.
    pub fn first<'d>(
        &self,
        expr: &str,
        context_node: Node<'d>,
        bindings: &Bindings<'d>,
    ) -> Option<Resolved<'d>> {
        match self.evaluate(expr, context_node, bindings)? {
            Value::Nodeset(nodes) => nodes.document_order_first().map(Resolved::Node),
            other => Some(Resolved::Scalar(other.string())),
        }
    }

    /// Resolve to a node list in document order. Non-node-set results
    /// resolve to an empty list.
    pub fn select<'d>(
        &self,
        expr: &str,
        context_node: Node<'d>,
        bindings: &Bindings<'d>,
    ) -> Vec<Node<'d>> {
        match self.evaluate(expr, context_node, bindings) {
            Some(Value::Nodeset(nodes)) => nodes.document_order(),
            _ => Vec::new(),
        }
    }

    /// Conditional truth: an empty test is vacuously true; a node-set
    /// passes when non-empty; a boolean passes as itself; any other
    /// value passes unless its string value is "false" (any casing). A
    /// failed evaluation does not pass.
    pub fn test_passes<'d>(
        &self,
        test: &str,
        context_node: Node<'d>,
        bindings: &Bindings<'d>,
    ) -> bool {
        let test = test.trim();
        if test.is_empty() {
            return true;
        }
        match self.evaluate(test, context_node, bindings) {
            None => false,
            Some(Value::Nodeset(nodes)) => nodes.size() > 0,
            Some(Value::Boolean(b)) => b,
            Some(other) => !other.string().eq_ignore_ascii_case("false"),
        }
    }
}

fn string_arg(args: &[Value<'_>], index: usize) -> String {
    args.get(index).map(Value::string).unwrap_or_default()
}

/// `Split(source, pattern, n)`: split `source` on the regex `pattern`
/// and return the `n`th piece, 1-based. Out-of-range or invalid input
/// returns the empty string.
struct RegexSplit;

impl sxd_xpath::function::Function for RegexSplit {
    fn evaluate<'c, 'd>(
        &self,
        _context: &context::Evaluation<'c, 'd>,
        args: Vec<Value<'d>>,
    ) -> Result<Value<'d>, sxd_xpath::function::Error> {
        let source = string_arg(&args, 0);
        let pattern = string_arg(&args, 1);
        let n = args.get(2).map(Value::number).unwrap_or(0.0);
        let piece = match Regex::new(&pattern) {
            Ok(re) if n >= 1.0 => re
                .split(&source)
                .nth(n as usize - 1)
                .unwrap_or_default()
                .to_string(),
            Ok(_) => String::new(),
            Err(e) => {
                debug!(pattern, error = %e, "invalid Split pattern");
                String::new()
            }
        };
        Ok(Value::String(piece))
    }
}

/// `Replace(source, pattern, replacement)`: regex replacement over
/// `source`. An invalid pattern returns `source` unchanged.
struct RegexReplace;

impl sxd_xpath::function::Function for RegexReplace {
    fn evaluate<'c, 'd>(
        &self,
        _context: &context::Evaluation<'c, 'd>,
        args: Vec<Value<'d>>,
    ) -> Result<Value<'d>, sxd_xpath::function::Error> {
        let source = string_arg(&args, 0);
        let pattern = string_arg(&args, 1);
        let replacement = string_arg(&args, 2);
        let replaced = match Regex::new(&pattern) {
            Ok(re) => re.replace_all(&source, replacement.as_str()).into_owned(),
            Err(e) => {
                debug!(pattern, error = %e, "invalid Replace pattern");
                source
            }
        };
        Ok(Value::String(replaced))
    }
}

/// Supplies external documents to the `load` command.
pub trait DocumentLoader<'d> {
    fn load(&self, location: &str) -> TemplateResult<sxd_document::dom::Document<'d>>;
}

/// Loads documents from the filesystem, keeping each parsed package
/// alive in an arena so its nodes remain valid for the engine lifetime.
#[derive(Default)]
pub struct FsDocumentLoader {
    arena: Arena<Package>,
}

impl FsDocumentLoader {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
        }
    }
}

impl<'d> DocumentLoader<'d> for &'d FsDocumentLoader {
    fn load(&self, location: &str) -> TemplateResult<sxd_document::dom::Document<'d>> {
        let text = std::fs::read_to_string(location)?;
        let package = parser::parse(&text)
            .map_err(|e| TemplateError::MalformedDocument(format!("{location}: {e:?}")))?;
        let package: &'d Package = self.arena.alloc(package);
        Ok(package.as_document())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sxd_document::parser;

    use super::*;

    fn with_doc<F: FnOnce(&QueryEngine, Node<'_>)>(xml: &str, f: F) {
        let package = parser::parse(xml).unwrap();
        let doc = package.as_document();
        let root = doc.root().children()[0].element().unwrap();
        f(&QueryEngine::new("$"), root.into());
    }

    #[test]
    fn test_first_prefers_document_order() {
        with_doc("<r><a>1</a><b>2</b><a>3</a></r>", |query, node| {
            let bindings = Bindings::new();
            let first = query.first("a|b", node, &bindings).unwrap();
            assert_eq!(first.text(), "1");
        });
    }

    #[test]
    fn test_scalar_results_are_distinguished() {
        with_doc("<r><a>1</a></r>", |query, node| {
            let bindings = Bindings::new();
            match query.first("count(a)", node, &bindings) {
                Some(Resolved::Scalar(s)) => assert_eq!(s, "1"),
                other => panic!("unexpected result: {other:?}"),
            }
        });
    }

    #[test]
    fn test_malformed_expression_resolves_to_nothing() {
        with_doc("<r/>", |query, node| {
            let bindings = Bindings::new();
            assert!(query.first("///", node, &bindings).is_none());
            assert!(query.first("", node, &bindings).is_none());
        });
    }

    #[test]
    fn test_variables_are_late_bound() {
        with_doc("<r><a>x</a></r>", |query, node| {
            let mut bindings = Bindings::new();
            bindings.set("v", Value::String("hello".into()));
            let first = query.first("$v", node, &bindings).unwrap();
            assert_eq!(first.text(), "hello");
        });
    }

    #[test]
    fn test_variable_prefix_rewrite() {
        with_doc("<r/>", |_, node| {
            let query = QueryEngine::new("@@");
            let mut bindings = Bindings::new();
            bindings.set("v", Value::String("hi".into()));
            let first = query.first("@@v", node, &bindings).unwrap();
            assert_eq!(first.text(), "hi");
        });
    }

    #[test]
    fn test_test_passes_rules() {
        with_doc("<r><a>x</a><f>false</f></r>", |query, node| {
            let bindings = Bindings::new();
            assert!(query.test_passes("", node, &bindings));
            assert!(query.test_passes("a", node, &bindings));
            assert!(!query.test_passes("missing", node, &bindings));
            assert!(query.test_passes("count(a) = 1", node, &bindings));
            // A non-empty node-set passes even when its content is "false"...
            assert!(query.test_passes("f/text()", node, &bindings));
            // ...but the string value "false" fails the test.
            assert!(!query.test_passes("string(f)", node, &bindings));
            assert!(!query.test_passes("///", node, &bindings));
        });
    }

    #[test]
    fn test_split_function() {
        with_doc("<r><csv>a,b,c</csv></r>", |query, node| {
            let bindings = Bindings::new();
            let first = query
                .first("Split(csv, ',', 2)", node, &bindings)
                .unwrap();
            assert_eq!(first.text(), "b");
            let missing = query
                .first("Split(csv, ',', 9)", node, &bindings)
                .unwrap();
            assert_eq!(missing.text(), "");
        });
    }

    #[test]
    fn test_replace_function() {
        with_doc("<r><v>2010-08-26</v></r>", |query, node| {
            let bindings = Bindings::new();
            let first = query
                .first("Replace(v, '(\\d+)-(\\d+)-(\\d+)', '$3/$2/$1')", node, &bindings)
                .unwrap();
            assert_eq!(first.text(), "26/08/2010");
        });
    }
}
