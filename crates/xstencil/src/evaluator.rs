/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template execution.
//!
//! The executor walks a fragment index range against a context node,
//! appending to a shared output buffer. Block commands recurse over
//! their inner range and jump past their closer; an opener whose closer
//! was never matched executes as a no-op and the walk resumes at the
//! next fragment. Execution never fails: unresolved queries, missing
//! templates, and unknown commands degrade to empty output.

use md5::{Digest, Md5};
use sha1::Sha1;
use sxd_xpath::nodeset::{Node, Nodeset};
use sxd_xpath::Value;
use tracing::{debug, trace};

use crate::ast::{Command, CommandKind, FormatSpec, FragmentBody, ResultMode};
use crate::context::Bindings;
use crate::error::TemplateResult;
use crate::format;
use crate::parser::Template;
use crate::resolver::TemplateCatalog;
use crate::xhtml;
use crate::xml;
use crate::xpath::{DocumentLoader, QueryEngine, Resolved};

/// The transform entry point: a catalog of supporting templates plus an
/// optional loader for externally referenced documents.
#[derive(Default)]
pub struct Engine<'d> {
    catalog: TemplateCatalog,
    loader: Option<Box<dyn DocumentLoader<'d> + 'd>>,
}

impl<'d> Engine<'d> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: TemplateCatalog) -> Self {
        Self {
            catalog,
            loader: None,
        }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Install a loader for the external-document command.
    pub fn set_loader(&mut self, loader: impl DocumentLoader<'d> + 'd) {
        self.loader = Some(Box::new(loader));
    }

    /// Execute a compiled template against a context node.
    pub fn transform(&self, template: &Template, context: impl Into<Node<'d>>) -> String {
        let mut bindings = Bindings::new();
        let mut out = String::new();
        let executor = Executor::new(self, template);
        executor.run_all(context.into(), &mut bindings, &mut out);
        out
    }

    /// One-shot transform mirroring the XML-borne calling convention:
    /// the template and the optional supporting-template catalog are
    /// both read from XML elements.
    pub fn transform_node(
        source: impl Into<Node<'d>>,
        template: sxd_document::dom::Element<'d>,
        supporting: Option<sxd_document::dom::Element<'d>>,
    ) -> TemplateResult<String> {
        let template = Template::from_element(template)?;
        let catalog = match supporting {
            Some(element) => TemplateCatalog::from_element(element)?,
            None => TemplateCatalog::default(),
        };
        Ok(Engine::with_catalog(catalog).transform(&template, source))
    }
}

struct Executor<'a, 'd> {
    engine: &'a Engine<'d>,
    template: &'a Template,
    query: QueryEngine,
}

impl<'a, 'd> Executor<'a, 'd> {
    fn new(engine: &'a Engine<'d>, template: &'a Template) -> Self {
        Self {
            engine,
            template,
            query: QueryEngine::new(&template.options().variable_prefix),
        }
    }

    fn run_all(&self, context: Node<'d>, bindings: &mut Bindings<'d>, out: &mut String) {
        let count = self.template.fragments().len();
        if count > 0 {
            self.run(0, count - 1, context, bindings, out);
        }
    }

    /// Execute fragments `start..=end`.
    fn run(
        &self,
        start: usize,
        end: usize,
        context: Node<'d>,
        bindings: &mut Bindings<'d>,
        out: &mut String,
    ) {
        let fragments = self.template.fragments();
        let mut index = start;
        while index <= end && index < fragments.len() {
            let fragment = &fragments[index];
            match &fragment.body {
                FragmentBody::Text => {
                    out.push_str(self.template.text_of(fragment));
                    index += 1;
                }
                FragmentBody::Command(command) => {
                    index = self.step(command, index, context, bindings, out);
                }
            }
        }
    }

    /// Execute one command and return the index to resume at.
    fn step(
        &self,
        command: &Command,
        at: usize,
        context: Node<'d>,
        bindings: &mut Bindings<'d>,
        out: &mut String,
    ) -> usize {
        match &command.kind {
            CommandKind::If {
                test,
                else_index,
                end_index,
            } => {
                let Some(end) = end_index.filter(|e| *e > at) else {
                    trace!("conditional with no closer skipped");
                    return at + 1;
                };
                let else_at = else_index.filter(|e| *e > at && *e < end);
                if self.query.test_passes(test, context, bindings) {
                    let stop = else_at.unwrap_or(end);
                    let mut branch = bindings.fork();
                    self.run(at + 1, stop - 1, context, &mut branch, out);
                } else if let Some(else_at) = else_at {
                    let mut branch = bindings.fork();
                    self.run(else_at + 1, end - 1, context, &mut branch, out);
                }
                end + 1
            }

            CommandKind::Each { pattern, end_index } => {
                let Some(end) = end_index.filter(|e| *e > at) else {
                    trace!("iteration with no closer skipped");
                    return at + 1;
                };
                // Bindings are shared across iterations on purpose:
                // assignments made in one pass are visible to the next.
                for node in self.query.select(pattern, context, bindings) {
                    self.run(at + 1, end - 1, node, bindings, out);
                }
                end + 1
            }

            CommandKind::Apply {
                name,
                context: context_expr,
            } => {
                let nodes = context_expr
                    .as_deref()
                    .map(|expr| self.query.select(expr, context, bindings));
                self.invoke(name, nodes, context, bindings, out);
                at + 1
            }

            CommandKind::ParamApply {
                name,
                context: context_expr,
                end_index,
            } => {
                let Some(end) = end_index.filter(|e| *e > at) else {
                    // No parameter block: behave like a plain apply.
                    let nodes = context_expr
                        .as_deref()
                        .map(|expr| self.query.select(expr, context, bindings));
                    self.invoke(name, nodes, context, bindings, out);
                    return at + 1;
                };
                let mut scoped = bindings.fork();
                self.run(at + 1, end - 1, context, &mut scoped, out);
                let nodes = context_expr
                    .as_deref()
                    .map(|expr| self.query.select(expr, context, bindings));
                self.invoke(name, nodes, context, &mut scoped, out);
                end + 1
            }

            CommandKind::Result { expr, mode } => {
                self.emit_result(expr, *mode, context, bindings, out);
                at + 1
            }

            CommandKind::Format(spec) => {
                let rendered = match spec {
                    FormatSpec::Date { format, expr } => {
                        format::format_date(&self.first_text(expr, context, bindings), format)
                    }
                    FormatSpec::Number { format, expr } => {
                        format::format_number(&self.first_text(expr, context, bindings), format)
                    }
                    FormatSpec::Str { format, exprs } => {
                        let values: Vec<String> = exprs
                            .iter()
                            .map(|expr| self.first_text(expr, context, bindings))
                            .collect();
                        format::format_composite(format, &values)
                    }
                };
                out.push_str(&rendered);
                at + 1
            }

            CommandKind::Replace {
                pattern,
                replacement,
                input,
            } => {
                let text = self.first_text(input, context, bindings);
                match regex::Regex::new(pattern) {
                    Ok(re) => out.push_str(&re.replace_all(&text, replacement.as_str())),
                    Err(e) => {
                        debug!(pattern, error = %e, "invalid replace pattern");
                        out.push_str(&text);
                    }
                }
                at + 1
            }

            CommandKind::Var { name, expr } => {
                if !name.is_empty() {
                    if let Some(value) = self.query.evaluate(expr, context, bindings) {
                        // Node-sets bind as handles; scalars bind as text.
                        let value = match value {
                            Value::Nodeset(_) => value,
                            other => Value::String(other.string()),
                        };
                        bindings.set(name, value);
                    }
                }
                at + 1
            }

            CommandKind::MultiVar { name, end_index } => {
                let Some(end) = end_index.filter(|e| *e > at) else {
                    trace!("multi-part variable with no closer skipped");
                    return at + 1;
                };
                let mut scoped = bindings.fork();
                let mut rendered = String::new();
                self.run(at + 1, end - 1, context, &mut scoped, &mut rendered);
                if !name.is_empty() {
                    bindings.merge_back(name, rendered);
                }
                end + 1
            }

            CommandKind::Load { name, location } => {
                self.load_document(name, location, bindings);
                at + 1
            }

            CommandKind::Version => {
                out.push_str(concat!(
                    env!("CARGO_PKG_NAME"),
                    " v",
                    env!("CARGO_PKG_VERSION")
                ));
                at + 1
            }

            CommandKind::Else
            | CommandKind::EndIf
            | CommandKind::EndEach
            | CommandKind::EndParamApply
            | CommandKind::EndMultiVar { .. } => at + 1,

            CommandKind::Unsupported | CommandKind::Unknown => {
                trace!(keyword = command.params.first().map(String::as_str), "no-op command");
                at + 1
            }
        }
    }

    fn first_text(&self, expr: &str, context: Node<'d>, bindings: &Bindings<'d>) -> String {
        self.query
            .first(expr, context, bindings)
            .map(|r| r.text())
            .unwrap_or_default()
    }

    fn emit_result(
        &self,
        expr: &str,
        mode: ResultMode,
        context: Node<'d>,
        bindings: &Bindings<'d>,
        out: &mut String,
    ) {
        let resolved = self.query.first(expr, context, bindings);
        match mode {
            ResultMode::Escaped => {
                let text = resolved.map(|r| r.text()).unwrap_or_default();
                out.push_str(&xml::escape_value(&text));
            }
            ResultMode::Raw => {
                if let Some(resolved) = resolved {
                    out.push_str(&resolved.text());
                }
            }
            ResultMode::Xhtml => {
                if let Some(resolved) = resolved {
                    out.push_str(&xhtml::coerce(&resolved.text()));
                }
            }
            ResultMode::Copy => {
                if let Some(resolved) = resolved {
                    out.push_str(&copy_markup(&resolved));
                }
            }
            ResultMode::CopyEscaped => {
                if let Some(resolved) = resolved {
                    out.push_str(&xml::escape_value(&copy_markup(&resolved)));
                }
            }
            ResultMode::Md5 => {
                if let Some(resolved) = resolved {
                    out.push_str(&hex_digest::<Md5>(&resolved.text()));
                }
            }
            ResultMode::Sha1 => {
                if let Some(resolved) = resolved {
                    out.push_str(&hex_digest::<Sha1>(&resolved.text()));
                }
            }
        }
    }

    /// Apply a named template, once per context node (or once against
    /// `fallback` when no context expression was given), with `env` as
    /// the sub-template's variable environment.
    fn invoke(
        &self,
        name: &str,
        nodes: Option<Vec<Node<'d>>>,
        fallback: Node<'d>,
        env: &mut Bindings<'d>,
        out: &mut String,
    ) {
        let Some(template) = self.engine.catalog.get(name) else {
            debug!(name, "applied template not found");
            return;
        };
        let executor = Executor::new(self.engine, template);
        match nodes {
            Some(nodes) => {
                for node in nodes {
                    executor.run_all(node, env, out);
                }
            }
            None => executor.run_all(fallback, env, out),
        }
    }

    /// Bind the document element of an external document.
    fn load_document(&self, name: &str, location: &str, bindings: &mut Bindings<'d>) {
        if name.is_empty() || location.is_empty() {
            return;
        }
        let Some(loader) = &self.engine.loader else {
            debug!(name, location, "no document loader installed");
            return;
        };
        match loader.load(location) {
            Ok(document) => {
                let mut nodes = Nodeset::new();
                if let Some(element) = document
                    .root()
                    .children()
                    .iter()
                    .find_map(|child| child.element())
                {
                    nodes.add(element);
                }
                bindings.set(name, Value::Nodeset(nodes));
            }
            Err(e) => debug!(location, error = %e, "external document load failed"),
        }
    }
}

/// Markup for the copy commands: the node's own serialization, or a
/// synthetic wrapper for scalar results.
fn copy_markup(resolved: &Resolved<'_>) -> String {
    match resolved {
        Resolved::Node(node) => xml::outer_xml(node),
        Resolved::Scalar(s) => format!("<node>{}</node>", xml::escape_text(s)),
    }
}

fn hex_digest<D: Digest>(text: &str) -> String {
    let mut hasher = D::new();
    hasher.update(text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sxd_document::parser;

    use super::*;

    fn render(source: &str, template: &str) -> String {
        render_with(source, template, &[])
    }

    fn render_with(source: &str, template: &str, supporting: &[(&str, &str)]) -> String {
        let package = parser::parse(source).unwrap();
        let doc = package.as_document();
        let root = doc.root().children()[0].element().unwrap();
        let template = Template::compile(template).unwrap();
        let mut catalog = TemplateCatalog::new();
        for (name, text) in supporting {
            catalog.insert(*name, Template::compile(text).unwrap());
        }
        Engine::with_catalog(catalog).transform(&template, root)
    }

    #[test]
    fn test_text_only_template() {
        assert_eq!(render("<r/>", "plain text"), "plain text");
        assert_eq!(render("<r/>", ""), "");
    }

    #[test]
    fn test_result_modes() {
        let source = "<r><v>a &amp; b</v></r>";
        assert_eq!(render(source, "{{ = v }}"), "a &amp; b");
        assert_eq!(render(source, "{{ == v }}"), "a & b");
        assert_eq!(render(source, "{{ = missing }}"), "");
        assert_eq!(render(source, "{{ == missing }}"), "");
    }

    #[test]
    fn test_digests() {
        let source = "<r><v>abc</v></r>";
        assert_eq!(
            render(source, "{{ md5 v }}"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            render(source, "{{ sha1 v }}"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_copy_modes() {
        let source = "<r><v a=\"1\">x<i/></v></r>";
        assert_eq!(render(source, "{{ * v }}"), "<v a=\"1\">x<i/></v>");
        assert_eq!(
            render(source, "{{ *= v }}"),
            "&lt;v a=&quot;1&quot;&gt;x&lt;i/&gt;&lt;/v&gt;"
        );
        assert_eq!(
            render(source, "{{ * (count(v)) }}"),
            "<node>1</node>"
        );
    }

    #[test]
    fn test_conditional_branches_are_exclusive() {
        let source = "<r><on>true</on><off>false</off></r>";
        let template = "{{ if on }}A{{ else }}B{{ endif }}";
        assert_eq!(render(source, template), "A");
        // A multi-token test must be parenthesized into one parameter.
        let template = "{{ if (string(off)) }}A{{ else }}B{{ endif }}";
        assert_eq!(render(source, template), "B");
    }

    #[test]
    fn test_conditional_fork_isolates_assignments() {
        let source = "<r/>";
        let template = "{{ if 'yes' }}{{ := v 'inner' }}{{ endif }}[{{ = $v }}]";
        assert_eq!(render(source, template), "[]");
    }

    #[test]
    fn test_each_iterates_in_document_order() {
        let source = "<r><i>1</i><i>2</i><i>3</i></r>";
        assert_eq!(render(source, "{{ each i }}{{ = . }};{{ endeach }}"), "1;2;3;");
    }

    #[test]
    fn test_each_bindings_persist_across_iterations() {
        let source = "<r><i>a</i><i>b</i></r>";
        let template =
            "{{ each i }}{{ = $prev }}{{ := prev . }}{{ endeach }}{{ = $prev }}";
        assert_eq!(render(source, template), "ab");
    }

    #[test]
    fn test_apply_with_and_without_context() {
        let source = "<r><i>1</i><i>2</i></r>";
        assert_eq!(
            render_with(source, "{{ % item i }}", &[("item", "[{{ = . }}]")]),
            "[1][2]"
        );
        assert_eq!(
            render_with(source, "{{ % whole }}", &[("whole", "[{{ = i }}]")]),
            "[1]"
        );
        assert_eq!(render_with(source, "{{ % missing }}", &[]), "");
    }

    #[test]
    fn test_paramapply_isolates_parameters() {
        let source = "<r><i>1</i></r>";
        let template =
            "{{ %% item i }}{{ := tag 'T' }}{{ /%% }}[{{ = $tag }}]";
        assert_eq!(
            render_with(source, template, &[("item", "{{ = $tag }}{{ = . }}")]),
            "T1[]"
        );
    }

    #[test]
    fn test_mvar_merges_back_and_suppresses_output() {
        let source = "<r><i>1</i><i>2</i></r>";
        let template =
            "{{ ::= built }}{{ each i }}{{ = . }}.{{ endeach }}{{ /::= }}<{{ = $built }}>";
        assert_eq!(render(source, template), "<1.2.>");
    }

    #[test]
    fn test_nodeset_variable_drives_iteration() {
        let source = "<r><i>1</i><i>2</i></r>";
        let template = "{{ := set i }}{{ each $set }}({{ = . }}){{ endeach }}";
        assert_eq!(render(source, template), "(1)(2)");
    }

    #[test]
    fn test_malformed_block_is_skipped() {
        let source = "<r><i>1</i></r>";
        assert_eq!(render(source, "a{{ each i }}b"), "ab");
        assert_eq!(render(source, "a{{ if i }}b"), "ab");
        assert_eq!(render(source, "a{{ endeach }}b{{ else }}c"), "abc");
    }

    #[test]
    fn test_unknown_and_unsupported_are_noops() {
        let source = "<r/>";
        assert_eq!(render(source, "a{{ bogus x y }}b"), "ab");
        assert_eq!(render(source, "a{{ while x }}b"), "ab");
    }

    #[test]
    fn test_version_identifies_engine() {
        assert_eq!(
            render("<r/>", "{{ version }}"),
            concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_load_binds_external_document() {
        use crate::xpath::FsDocumentLoader;

        let path = std::env::temp_dir().join("xstencil_load_test.xml");
        std::fs::write(&path, "<ext><item>42</item></ext>").unwrap();

        let package = parser::parse("<r/>").unwrap();
        let doc = package.as_document();
        let root = doc.root().children()[0].element().unwrap();
        let template_src = format!("{{{{ ::: ext {} }}}}{{{{ = $ext/item }}}}", path.display());
        let template = Template::compile(&template_src).unwrap();

        let loader = FsDocumentLoader::new();
        let mut engine = Engine::new();
        engine.set_loader(&loader);
        assert_eq!(engine.transform(&template, root), "42");

        // Without a loader the command is a no-op and the variable
        // stays unbound.
        assert_eq!(Engine::new().transform(&template, root), "");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_replace_command() {
        let source = "<r><phone>555-1234</phone></r>";
        let template = "{{ ~ ((\\d+)-(\\d+)) ($2.$1) phone }}";
        assert_eq!(render(source, template), "1234.555");
    }

    #[test]
    fn test_deterministic_output() {
        let source = "<r><i>1</i><i>2</i></r>";
        let template = "{{ each i }}{{ = . }}{{ endeach }}";
        let first = render(source, template);
        assert_eq!(first, render(source, template));
        assert_eq!(first, "12");
    }
}
