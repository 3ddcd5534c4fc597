/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiled template representation.
//!
//! A compiled template is a flat list of [`Fragment`]s in source order.
//! Block commands (`if`, `each`, `paramapply`, `mvar`) cross-reference
//! their closers by fragment index rather than by owning a subtree; the
//! executor walks index ranges over the flat list.

/// One piece of a compiled template: either literal text or a command.
///
/// The span `[start, end)` is in byte offsets into the template source.
/// For text fragments it covers the literal text; for command fragments
/// it covers the command body between the delimiters.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Position of this fragment in the owning template's fragment list.
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub body: FragmentBody,
}

#[derive(Debug, Clone)]
pub enum FragmentBody {
    /// Literal text, emitted verbatim.
    Text,
    /// A classified command.
    Command(Command),
}

/// A classified command with its raw parameter list.
///
/// `params[0]` is the keyword; the classifier has already folded the
/// parameters it understands into `kind`, but the raw list is kept for
/// diagnostics.
#[derive(Debug, Clone)]
pub struct Command {
    pub params: Vec<String>,
    pub kind: CommandKind,
}

/// Every command the language knows, with exactly the supporting data
/// that command needs. Block openers carry the fragment indices of their
/// matched closers; `None` means the closer was never found and the
/// executor treats the opener as a no-op.
#[derive(Debug, Clone)]
pub enum CommandKind {
    /// `{{ if <test> }}` ... `{{ else }}` ... `{{ endif }}`
    If {
        test: String,
        else_index: Option<usize>,
        end_index: Option<usize>,
    },
    Else,
    EndIf,

    /// `{{ each <pattern> }}` ... `{{ endeach }}`
    Each {
        pattern: String,
        end_index: Option<usize>,
    },
    EndEach,

    /// `{{ apply <name> [<context>] }}`
    Apply {
        name: String,
        context: Option<String>,
    },
    /// `{{ paramapply <name> [<context>] }}` ... `{{ endparamapply }}`
    ParamApply {
        name: String,
        context: Option<String>,
        end_index: Option<usize>,
    },
    EndParamApply,

    /// The result family: resolve an expression and emit it through
    /// one of several renderings.
    Result { expr: String, mode: ResultMode },

    /// `{{ format ... }}` and the bare `date`/`number`/`string` forms.
    Format(FormatSpec),

    /// `{{ replace (pattern) (replacement) (input) }}`
    Replace {
        pattern: String,
        replacement: String,
        input: String,
    },

    /// `{{ var <name> <expr> }}`
    Var { name: String, expr: String },
    /// `{{ mvar <name> }}` ... `{{ endmvar }}`
    MultiVar {
        name: String,
        end_index: Option<usize>,
    },
    EndMultiVar { start_index: Option<usize> },

    /// `{{ load <name> <location> }}` — bind an external document.
    Load { name: String, location: String },

    /// `{{ version }}` — engine identification string.
    Version,

    /// Recognized keyword with no implementation (`while`, `break`, ...).
    Unsupported,
    /// Unrecognized keyword; executes as a no-op.
    Unknown,
}

/// Rendering applied to a resolved result value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMode {
    /// Text value, XML-escaped.
    Escaped,
    /// Text value, emitted verbatim.
    Raw,
    /// Text value coerced from HTML to XHTML.
    Xhtml,
    /// Serialized node markup, verbatim.
    Copy,
    /// Serialized node markup, XML-escaped.
    CopyEscaped,
    /// Lowercase hex MD5 of the text value.
    Md5,
    /// Lowercase hex SHA-1 of the text value.
    Sha1,
}

/// Supporting data for the formatted-result command.
#[derive(Debug, Clone)]
pub enum FormatSpec {
    /// strftime rendering of a parsed date/time value.
    Date { format: String, expr: String },
    /// Picture-pattern rendering of a numeric value.
    Number { format: String, expr: String },
    /// `{N}` positional composite over one or more resolved values.
    Str { format: String, exprs: Vec<String> },
}
