/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template compilation: delimiter lexing, parameter splitting, command
//! classification, and block matching.
//!
//! Compilation is a four-stage pipeline over the raw template text:
//!
//! 1. The lexer splits the text into literal runs and command bodies by
//!    scanning for the configured delimiters. A doubled start delimiter
//!    escapes itself and lexes as one literal copy.
//! 2. The parameter splitter tokenizes each command body, honoring
//!    double-quoted and parenthesized segments as single parameters.
//! 3. The classifier maps the leading keyword (case-insensitive, with
//!    aliases) to a [`CommandKind`]. A symbolic keyword written flush
//!    against its argument (`{{=@name}}`) is peeled apart first.
//! 4. The block matcher links block openers to their `else`/closer
//!    fragments by index, counting nesting of the same family.
//!
//! The only fatal condition is an unterminated command; a block opener
//! whose closer is missing stays unlinked and the executor skips it.

use tracing::trace;

use crate::ast::{Command, CommandKind, FormatSpec, Fragment, FragmentBody, ResultMode};
use crate::error::{TemplateError, TemplateResult};
use crate::xml;

/// Template source configuration.
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    /// Opens a command; doubled, it escapes to a single literal copy.
    pub delimiter_start: String,
    /// Closes a command.
    pub delimiter_end: String,
    /// Characters that separate command parameters.
    pub separators: Vec<char>,
    /// Prefix marking variable references inside query expressions.
    pub variable_prefix: String,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            delimiter_start: "{{".to_string(),
            delimiter_end: "}}".to_string(),
            separators: vec![' ', '\t', '\n'],
            variable_prefix: "$".to_string(),
        }
    }
}

/// A compiled template: the source text plus its fragment list.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    options: TemplateOptions,
    fragments: Vec<Fragment>,
}

impl Template {
    /// Compile with the default delimiters (`{{` ... `}}`).
    pub fn compile(source: &str) -> TemplateResult<Self> {
        Self::compile_with(source, TemplateOptions::default())
    }

    pub fn compile_with(source: &str, options: TemplateOptions) -> TemplateResult<Self> {
        let raw = lex(source, &options)?;
        let mut fragments = Vec::with_capacity(raw.len());
        for (index, piece) in raw.into_iter().enumerate() {
            let body = if piece.is_command {
                let unescaped = xml::unescape(&source[piece.start..piece.end]);
                let params =
                    split_joined_alias(split_parameters(&unescaped, &options.separators));
                let kind = classify(&params);
                FragmentBody::Command(Command { params, kind })
            } else {
                FragmentBody::Text
            };
            fragments.push(Fragment {
                index,
                start: piece.start,
                end: piece.end,
                body,
            });
        }
        match_blocks(&mut fragments);
        trace!(fragments = fragments.len(), "template compiled");
        Ok(Self {
            source: source.to_string(),
            options,
            fragments,
        })
    }

    /// Compile from an XML element: the element's inner markup is the
    /// template source, and the attributes `delim-start`, `delim-end`,
    /// `param-separators`, and `variable-prefix` override the defaults.
    pub fn from_element(element: sxd_document::dom::Element<'_>) -> TemplateResult<Self> {
        let mut options = TemplateOptions::default();
        if let Some(value) = element.attribute_value("delim-start") {
            if !value.is_empty() {
                options.delimiter_start = value.to_string();
            }
        }
        if let Some(value) = element.attribute_value("delim-end") {
            if !value.is_empty() {
                options.delimiter_end = value.to_string();
            }
        }
        if let Some(value) = element.attribute_value("param-separators") {
            if !value.is_empty() {
                options.separators = value.chars().collect();
            }
        }
        if let Some(value) = element.attribute_value("variable-prefix") {
            if !value.is_empty() {
                options.variable_prefix = value.to_string();
            }
        }
        let source = xml::inner_xml(&element);
        Self::compile_with(&source, options)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> &TemplateOptions {
        &self.options
    }

    pub(crate) fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// The source text a fragment spans.
    pub(crate) fn text_of(&self, fragment: &Fragment) -> &str {
        &self.source[fragment.start..fragment.end]
    }
}

struct RawFragment {
    start: usize,
    end: usize,
    is_command: bool,
}

fn lex(source: &str, options: &TemplateOptions) -> TemplateResult<Vec<RawFragment>> {
    let start_delim = &options.delimiter_start;
    let end_delim = &options.delimiter_end;
    let escaped = format!("{start_delim}{start_delim}");
    let mut fragments = Vec::new();
    let mut position = 0;

    let text = |start: usize, end: usize| RawFragment {
        start,
        end,
        is_command: false,
    };

    while position < source.len() {
        let Some(at) = source[position..]
            .find(start_delim.as_str())
            .map(|i| i + position)
        else {
            fragments.push(text(position, source.len()));
            break;
        };
        if source[at..].starts_with(&escaped) {
            // Doubled start delimiter: one literal copy.
            if at > position {
                fragments.push(text(position, at));
            }
            fragments.push(text(at, at + start_delim.len()));
            position = at + escaped.len();
            continue;
        }
        if at > position {
            fragments.push(text(position, at));
        }
        let body_start = at + start_delim.len();
        let Some(rel) = source[body_start..].find(end_delim.as_str()) else {
            return Err(TemplateError::UnterminatedCommand {
                delimiter: end_delim.clone(),
                offset: at,
            });
        };
        let body_end = body_start + rel;
        fragments.push(RawFragment {
            start: body_start,
            end: body_end,
            is_command: true,
        });
        position = body_end + end_delim.len();
    }
    Ok(fragments)
}

/// Tokenize a command body. Plain bodies split on the separator
/// characters with empty tokens dropped; a double-quoted segment is one
/// parameter ending at the next quote, and a parenthesized segment is
/// one parameter ending at its balancing close paren. An unclosed quote
/// or paren runs to end of input.
fn split_parameters(body: &str, separators: &[char]) -> Vec<String> {
    if !body.contains('"') && !body.contains('(') {
        return body
            .split(|c: char| separators.contains(&c))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
    }

    let mut params = Vec::new();
    let push_plain = |segment: &str, params: &mut Vec<String>| {
        for token in segment.split(|c: char| separators.contains(&c)) {
            let token = token.trim();
            if !token.is_empty() {
                params.push(token.to_string());
            }
        }
    };

    let mut cursor = 0;
    while cursor < body.len() {
        let quote = body[cursor..].find('"').map(|i| i + cursor);
        let paren = body[cursor..].find('(').map(|i| i + cursor);
        let opener = match (quote, paren) {
            (Some(q), Some(p)) => q.min(p),
            (Some(q), None) => q,
            (None, Some(p)) => p,
            (None, None) => {
                push_plain(&body[cursor..], &mut params);
                break;
            }
        };
        if opener > cursor {
            push_plain(&body[cursor..opener], &mut params);
        }
        if body[opener..].starts_with('"') {
            match body[opener + 1..].find('"').map(|i| i + opener + 1) {
                Some(close) => {
                    params.push(body[opener + 1..close].to_string());
                    cursor = close + 1;
                }
                None => {
                    params.push(body[opener + 1..].to_string());
                    break;
                }
            }
        } else {
            let mut depth = 1;
            let mut close = None;
            for (i, c) in body[opener + 1..].char_indices() {
                match c {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            close = Some(opener + 1 + i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            match close {
                Some(close) => {
                    params.push(body[opener + 1..close].to_string());
                    cursor = close + 1;
                }
                None => {
                    params.push(body[opener + 1..].to_string());
                    break;
                }
            }
        }
    }
    params
}

/// Symbolic keywords, longest first so `==` wins over `=` and `*=` over
/// `*`.
const SYMBOLIC_ALIASES: &[&str] = &[
    "/::=", "/%%", "::=", ":::", ":=", "==", "*=", "%%", "=", "*", "~", "?", "%",
];

/// A symbolic keyword may be written flush against its first argument
/// (`{{=@name}}`); peel the alias off into its own parameter.
fn split_joined_alias(mut params: Vec<String>) -> Vec<String> {
    let Some(first) = params.first().cloned() else {
        return params;
    };
    if SYMBOLIC_ALIASES.contains(&first.as_str()) {
        // The token is exactly the keyword.
        return params;
    }
    if let Some(alias) = SYMBOLIC_ALIASES.iter().find(|a| first.starts_with(*a)) {
        let rest = first[alias.len()..].to_string();
        params[0] = alias.to_string();
        params.insert(1, rest);
    }
    params
}

fn classify(params: &[String]) -> CommandKind {
    let Some(keyword) = params.first() else {
        return CommandKind::Unknown;
    };
    let arg = |i: usize| params.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
    let opt = |i: usize| {
        params
            .get(i)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let result = |mode: ResultMode| CommandKind::Result {
        expr: arg(1),
        mode,
    };

    match keyword.to_ascii_lowercase().as_str() {
        "if" => CommandKind::If {
            test: arg(1),
            else_index: None,
            end_index: None,
        },
        "else" => CommandKind::Else,
        "/if" | "endif" => CommandKind::EndIf,

        "each" => CommandKind::Each {
            pattern: arg(1),
            end_index: None,
        },
        "/each" | "endeach" => CommandKind::EndEach,

        "%" | "apply" => CommandKind::Apply {
            name: arg(1),
            context: opt(2),
        },
        "%%" | "paramapply" => CommandKind::ParamApply {
            name: arg(1),
            context: opt(2),
            end_index: None,
        },
        "/%%" | "/paramapply" | "endparamapply" => CommandKind::EndParamApply,

        "=" | "result" => result(ResultMode::Escaped),
        "==" | "raw" | "rawresult" => result(ResultMode::Raw),
        "xhtml" => result(ResultMode::Xhtml),
        "*" | "copy" => result(ResultMode::Copy),
        "*=" | "copyencoded" => result(ResultMode::CopyEscaped),
        "md5" => result(ResultMode::Md5),
        "sha1" => result(ResultMode::Sha1),

        "~" | "replace" => CommandKind::Replace {
            pattern: arg(1),
            replacement: arg(2),
            input: arg(3),
        },

        "?" | "format" => classify_format(params, true),
        "date" | "number" | "string" => classify_format(params, false),

        ":=" | "var" | "variable" => CommandKind::Var {
            name: arg(1),
            expr: arg(2),
        },
        "::=" | "mvar" | "multivar" => CommandKind::MultiVar {
            name: arg(1),
            end_index: None,
        },
        "/::=" | "/mvar" | "/multivar" | "endmvar" | "endmultivar" => {
            CommandKind::EndMultiVar { start_index: None }
        }

        ":::" | "load" => CommandKind::Load {
            name: arg(1),
            location: arg(2),
        },

        "ver" | "version" => CommandKind::Version,

        "do" | "until" | "while" | "/while" | "wend" | "break" => CommandKind::Unsupported,

        _ => CommandKind::Unknown,
    }
}

/// The generic form is `format <datatype> <fmt> <expr>...`; with only
/// three parameters the datatype defaults to `string`. The bare
/// `date`/`number`/`string` keywords name their datatype directly:
/// `date <fmt> <expr>`. The `string` datatype accepts any number of
/// trailing value expressions for positional substitution.
fn classify_format(params: &[String], generic: bool) -> CommandKind {
    let (datatype, format_at) = if generic {
        if params.len() > 3 {
            (params[1].trim().to_ascii_lowercase(), 2)
        } else if params.len() == 3 {
            ("string".to_string(), 1)
        } else {
            return CommandKind::Unknown;
        }
    } else {
        if params.len() < 3 {
            return CommandKind::Unknown;
        }
        (params[0].trim().to_ascii_lowercase(), 1)
    };
    let format = params[format_at].trim().to_string();
    let exprs: Vec<String> = params[format_at + 1..]
        .iter()
        .map(|s| s.trim().to_string())
        .collect();
    let spec = match datatype.as_str() {
        "date" => FormatSpec::Date {
            format,
            expr: exprs.into_iter().next().unwrap_or_default(),
        },
        "number" => FormatSpec::Number {
            format,
            expr: exprs.into_iter().next().unwrap_or_default(),
        },
        _ => FormatSpec::Str { format, exprs },
    };
    CommandKind::Format(spec)
}

/// Family of block commands, used to count nesting when searching for a
/// closer.
#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockFamily {
    If,
    Each,
    ParamApply,
    MultiVar,
}

fn match_blocks(fragments: &mut [Fragment]) {
    for i in 0..fragments.len() {
        let family = match &fragments[i].body {
            FragmentBody::Command(c) => match &c.kind {
                CommandKind::If { .. } => Some(BlockFamily::If),
                CommandKind::Each { .. } => Some(BlockFamily::Each),
                CommandKind::ParamApply { .. } => Some(BlockFamily::ParamApply),
                CommandKind::MultiVar { .. } => Some(BlockFamily::MultiVar),
                _ => None,
            },
            _ => None,
        };
        let Some(family) = family else {
            continue;
        };

        let mut depth = 1u32;
        let mut else_at = None;
        let mut end_at = None;
        for (j, fragment) in fragments.iter().enumerate().skip(i + 1) {
            let FragmentBody::Command(c) = &fragment.body else {
                continue;
            };
            match (family, &c.kind) {
                (BlockFamily::If, CommandKind::If { .. })
                | (BlockFamily::Each, CommandKind::Each { .. })
                | (BlockFamily::ParamApply, CommandKind::ParamApply { .. })
                | (BlockFamily::MultiVar, CommandKind::MultiVar { .. }) => depth += 1,
                (BlockFamily::If, CommandKind::Else) if depth == 1 => else_at = Some(j),
                (BlockFamily::If, CommandKind::EndIf)
                | (BlockFamily::Each, CommandKind::EndEach)
                | (BlockFamily::ParamApply, CommandKind::EndParamApply)
                | (BlockFamily::MultiVar, CommandKind::EndMultiVar { .. }) => {
                    depth -= 1;
                    if depth == 0 {
                        end_at = Some(j);
                        break;
                    }
                }
                _ => {}
            }
        }

        if let FragmentBody::Command(c) = &mut fragments[i].body {
            match &mut c.kind {
                CommandKind::If {
                    else_index,
                    end_index,
                    ..
                } => {
                    *else_index = else_at;
                    *end_index = end_at;
                }
                CommandKind::Each { end_index, .. }
                | CommandKind::ParamApply { end_index, .. } => *end_index = end_at,
                CommandKind::MultiVar { end_index, .. } => *end_index = end_at,
                _ => {}
            }
        }
        if family == BlockFamily::MultiVar {
            if let Some(j) = end_at {
                if let FragmentBody::Command(c) = &mut fragments[j].body {
                    if let CommandKind::EndMultiVar { start_index } = &mut c.kind {
                        *start_index = Some(i);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn params(body: &str) -> Vec<String> {
        split_parameters(body, &TemplateOptions::default().separators)
    }

    #[test]
    fn test_lex_text_and_commands() {
        let template = Template::compile("a {{ = b }} c").unwrap();
        let kinds: Vec<bool> = template
            .fragments()
            .iter()
            .map(|f| matches!(f.body, FragmentBody::Command(_)))
            .collect();
        assert_eq!(kinds, vec![false, true, false]);
        assert_eq!(template.text_of(&template.fragments()[0]), "a ");
        assert_eq!(template.text_of(&template.fragments()[2]), " c");
    }

    #[test]
    fn test_lex_escaped_delimiters() {
        // A run of 2N start delimiters lexes to N literal copies.
        let template = Template::compile("x {{{{ y {{{{{{{{ z").unwrap();
        let rendered: String = template
            .fragments()
            .iter()
            .map(|f| template.text_of(f))
            .collect();
        assert_eq!(rendered, "x {{ y {{{{ z");
        assert!(template
            .fragments()
            .iter()
            .all(|f| matches!(f.body, FragmentBody::Text)));
    }

    #[test]
    fn test_lex_unterminated_command_is_fatal() {
        let err = Template::compile("a {{ = b ").unwrap_err();
        match err {
            TemplateError::UnterminatedCommand { offset, .. } => assert_eq!(offset, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_split_plain_tokens() {
        assert_eq!(params("  =   name  "), vec!["=", "name"]);
        assert_eq!(params("each\titem/row\nx"), vec!["each", "item/row", "x"]);
    }

    #[test]
    fn test_split_quoted_segment_is_one_parameter() {
        assert_eq!(
            params("string \"{0} and {1}\" a b"),
            vec!["string", "{0} and {1}", "a", "b"]
        );
    }

    #[test]
    fn test_split_parenthesized_segment_keeps_nesting() {
        assert_eq!(
            params("~ ((\\d+)-(\\d+)) ($2-$1) phone"),
            vec!["~", "(\\d+)-(\\d+)", "$2-$1", "phone"]
        );
    }

    #[test]
    fn test_split_unclosed_quote_runs_to_end() {
        assert_eq!(params("string \"tail a b"), vec!["string", "tail a b"]);
    }

    #[test]
    fn test_split_unescapes_entities_first() {
        let template = Template::compile("{{ if price &gt; 10 }}x{{ endif }}").unwrap();
        let FragmentBody::Command(c) = &template.fragments()[0].body else {
            panic!("expected command");
        };
        assert_eq!(c.params, vec!["if", "price", ">", "10"]);
    }

    #[test]
    fn test_joined_symbolic_keyword_is_peeled() {
        let template = Template::compile("{{=@name}}").unwrap();
        let FragmentBody::Command(c) = &template.fragments()[0].body else {
            panic!("expected command");
        };
        assert_eq!(c.params, vec!["=", "@name"]);
        assert!(matches!(
            c.kind,
            CommandKind::Result {
                mode: ResultMode::Escaped,
                ..
            }
        ));

        let peel = |body: &str| split_joined_alias(params(body));
        assert_eq!(peel("==@url"), vec!["==", "@url"]);
        assert_eq!(peel("*=node"), vec!["*=", "node"]);
        assert_eq!(peel("~pat rep in"), vec!["~", "pat", "rep", "in"]);
        assert_eq!(peel(":=name expr"), vec![":=", "name", "expr"]);
        assert_eq!(peel("%%Build ."), vec!["%%", "Build", "."]);
        // An exact symbolic keyword stays whole, and word keywords are
        // never split.
        assert_eq!(peel("== @url"), vec!["==", "@url"]);
        assert_eq!(peel("each row"), vec!["each", "row"]);
    }

    #[test]
    fn test_classify_aliases_and_case() {
        assert!(matches!(
            classify(&params("RESULT name")),
            CommandKind::Result {
                mode: ResultMode::Escaped,
                ..
            }
        ));
        assert!(matches!(
            classify(&params("== name")),
            CommandKind::Result {
                mode: ResultMode::Raw,
                ..
            }
        ));
        assert!(matches!(classify(&params("Ver")), CommandKind::Version));
        assert!(matches!(classify(&params("while x")), CommandKind::Unsupported));
        assert!(matches!(classify(&params("bogus x")), CommandKind::Unknown));
        assert!(matches!(classify(&[]), CommandKind::Unknown));
    }

    #[test]
    fn test_classify_format_defaults_to_string() {
        // Three parameters: the datatype is implicitly `string`.
        match classify(&params("? \"{0}!\" name")) {
            CommandKind::Format(FormatSpec::Str { format, exprs }) => {
                assert_eq!(format, "{0}!");
                assert_eq!(exprs, vec!["name"]);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
        match classify(&params("? date \"%Y\" when")) {
            CommandKind::Format(FormatSpec::Date { format, expr }) => {
                assert_eq!(format, "%Y");
                assert_eq!(expr, "when");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_classify_string_collects_all_values() {
        match classify(&params("string \"{0}-{1}\" a b")) {
            CommandKind::Format(FormatSpec::Str { exprs, .. }) => {
                assert_eq!(exprs, vec!["a", "b"]);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_match_blocks_links_if_else_endif() {
        let template =
            Template::compile("{{ if t }}a{{ else }}b{{ endif }}").unwrap();
        let FragmentBody::Command(c) = &template.fragments()[0].body else {
            panic!("expected command");
        };
        match &c.kind {
            CommandKind::If {
                else_index,
                end_index,
                ..
            } => {
                assert_eq!(*else_index, Some(2));
                assert_eq!(*end_index, Some(4));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_match_blocks_nested_each() {
        let template = Template::compile(
            "{{ each a }}{{ each b }}x{{ endeach }}{{ endeach }}",
        )
        .unwrap();
        let ends: Vec<Option<usize>> = template
            .fragments()
            .iter()
            .filter_map(|f| match &f.body {
                FragmentBody::Command(Command {
                    kind: CommandKind::Each { end_index, .. },
                    ..
                }) => Some(*end_index),
                _ => None,
            })
            .collect();
        assert_eq!(ends, vec![Some(4), Some(3)]);
    }

    #[test]
    fn test_match_blocks_inner_else_stays_with_inner_if() {
        let template = Template::compile(
            "{{ if a }}{{ if b }}x{{ else }}y{{ endif }}{{ else }}z{{ endif }}",
        )
        .unwrap();
        let FragmentBody::Command(c) = &template.fragments()[0].body else {
            panic!("expected command");
        };
        match &c.kind {
            CommandKind::If {
                else_index,
                end_index,
                ..
            } => {
                assert_eq!(*else_index, Some(6));
                assert_eq!(*end_index, Some(8));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_match_blocks_unclosed_opener_stays_unlinked() {
        let template = Template::compile("{{ each a }}x").unwrap();
        let FragmentBody::Command(c) = &template.fragments()[0].body else {
            panic!("expected command");
        };
        assert!(matches!(
            c.kind,
            CommandKind::Each {
                end_index: None,
                ..
            }
        ));
    }

    #[test]
    fn test_custom_delimiters() {
        let options = TemplateOptions {
            delimiter_start: "[%".to_string(),
            delimiter_end: "%]".to_string(),
            ..TemplateOptions::default()
        };
        let template = Template::compile_with("a [% = b %] c", options).unwrap();
        assert!(matches!(
            template.fragments()[1].body,
            FragmentBody::Command(_)
        ));
    }
}
