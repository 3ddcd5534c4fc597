/*
 * battery.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The fixed conformance battery: named source/template/expected triples
//! exercising every command family end to end.

use anyhow::{Context, Result};
use serde::Serialize;
use sxd_document::parser;
use xstencil::Engine;

pub struct Case {
    pub name: &'static str,
    pub description: &'static str,
    pub source: &'static str,
    pub template: &'static str,
    pub supporting: Option<&'static str>,
    /// Expected output, or `None` when the template must fail to parse.
    pub expected: Option<&'static str>,
}

/// One battery case's outcome, serializable for `--json` output.
#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    pub name: String,
    pub passed: bool,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub error: Option<String>,
}

pub fn run_case(case: &Case) -> Result<CaseOutcome> {
    let source_package = parser::parse(case.source)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("{}: source xml", case.name))?;
    let template_package = parser::parse(case.template)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("{}: template xml", case.name))?;
    let supporting_package = match case.supporting {
        Some(xml) => Some(
            parser::parse(xml)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("{}: supporting xml", case.name))?,
        ),
        None => None,
    };

    let source_doc = source_package.as_document();
    let template_doc = template_package.as_document();
    let source_root = source_doc.root().children()[0]
        .element()
        .context("source document has no root element")?;
    let template_root = template_doc.root().children()[0]
        .element()
        .context("template document has no root element")?;
    let supporting_doc = supporting_package.as_ref().map(|p| p.as_document());
    let supporting_root = match supporting_doc {
        Some(doc) => Some(
            doc.root().children()[0]
                .element()
                .context("supporting document has no root element")?,
        ),
        None => None,
    };

    let outcome = match Engine::transform_node(source_root, template_root, supporting_root) {
        Ok(actual) => {
            let passed = case.expected == Some(actual.as_str());
            CaseOutcome {
                name: case.name.to_string(),
                passed,
                expected: case.expected.map(str::to_string),
                actual: Some(actual),
                error: None,
            }
        }
        Err(e) => CaseOutcome {
            name: case.name.to_string(),
            // A parse-error case passes exactly when it has no expected output.
            passed: case.expected.is_none(),
            expected: case.expected.map(str::to_string),
            actual: None,
            error: Some(e.to_string()),
        },
    };
    Ok(outcome)
}

pub fn cases() -> Vec<Case> {
    vec![
        Case {
            name: "simple-parse",
            description: "literal text and result commands interleave in source order",
            source: r##"<Patient account="DH:H3770" patientNo="11111111"><row patientNo="1234" lastName="Howard" firstName="Moe"/><message>Please come in to review your recent results.</message></Patient>"##,
            template: r##"<template><div patientNo="{{ = @patientNo }}">{{= (row/@lastName)}}, {{ = (row/@firstName) }} - <span>{{ = /Patient/@account }}</span><h1>{{ result message }}</h1></div></template>"##,
            supporting: None,
            expected: Some(
                r##"<div patientNo="11111111">Howard, Moe - <span>DH:H3770</span><h1>Please come in to review your recent results.</h1></div>"##,
            ),
        },
        Case {
            name: "escaped-delimiters",
            description: "a doubled start delimiter emits one literal copy",
            source: "<dontCare/>",
            template: r##"<template><span>{{{{ = @patientNo }} and {{{{{{{{ more }}}}</span></template>"##,
            supporting: None,
            expected: Some(r##"<span>{{ = @patientNo }} and {{{{ more }}}}</span>"##),
        },
        Case {
            name: "results-encode-raw-does-not",
            description: "= escapes markup characters, == emits verbatim",
            source: r##"<data url="http://example.com/x?a=1&amp;b=2" apos="'"/>"##,
            template: r##"<template><span>{{ = @url }}|{{ == @url }}|{{ = @apos }}{{ == @apos }}</span></template>"##,
            supporting: None,
            expected: Some(
                r##"<span>http://example.com/x?a=1&amp;b=2|http://example.com/x?a=1&b=2|&#39;'</span>"##,
            ),
        },
        Case {
            name: "each",
            description: "each iterates the selected node-set in document order",
            source: r##"<Patient><Allergies><row allergyNo="1001" description="PEANUTS"/><row allergyNo="1002" description="CODIENE"/></Allergies></Patient>"##,
            template: r##"<template>{{ Each Allergies/row }}<div allergyNo="{{= @allergyNo}}">{{= @description}}</div>{{ /Each }}</template>"##,
            supporting: None,
            expected: Some(
                r##"<div allergyNo="1001">PEANUTS</div><div allergyNo="1002">CODIENE</div>"##,
            ),
        },
        Case {
            name: "each-nested-attributes",
            description: "nested each over the attribute axis",
            source: r##"<SomeNode><row data1="abc" data2="def"/><row data1="123" data2="456"/></SomeNode>"##,
            template: r##"<template><table>{{ EACH row }}<tr>{{ each (@*) }}<td>{{= (.)}}</td>{{ /each }}</tr>{{/EACH}}</table></template>"##,
            supporting: None,
            expected: Some(
                r##"<table><tr><td>abc</td><td>def</td></tr><tr><td>123</td><td>456</td></tr></table>"##,
            ),
        },
        Case {
            name: "if-else",
            description: "an empty node-set test takes the else branch",
            source: r##"<Patient><Allergies/></Patient>"##,
            template: r##"<template><span>{{ IF Demographics }}{{= Demographics/row/@lastName}}{{ ELSE }}N/A{{ ENDIF }}</span></template>"##,
            supporting: None,
            expected: Some(r##"<span>N/A</span>"##),
        },
        Case {
            name: "apply-with-context",
            description: "named sub-templates applied per context node",
            source: r##"<Patient account="DH:SHULTZ"><Allergies><row allergyNo="1001" description="PEANUTS"/><row allergyNo="1002" description="CODIENE"/></Allergies></Patient>"##,
            template: r##"<template>{{ IF (count(Allergies/row)!=0) }}<table>{{ % AllergyRow Allergies/row }}</table>{{ else }}<div>No allergy information provided</div>{{ /if }}</template>"##,
            supporting: Some(
                r##"<templates><template name="AllergyRow"><tr><td allergyNo="{{= @allergyNo}}">{{= @description}}</td></tr></template></templates>"##,
            ),
            expected: Some(
                r##"<table><tr><td allergyNo="1001">PEANUTS</td></tr><tr><td allergyNo="1002">CODIENE</td></tr></table>"##,
            ),
        },
        Case {
            name: "format-date",
            description: "date formatting with strftime patterns",
            source: r##"<SystemTime utc="8/26/2010 5:44:47 PM" local24="08/26/2010 13:44:47"/>"##,
            template: r##"<template><span>UTC: {{ Format Date "%m/%d/%Y" @utc }} - English: {{ date "%B %-d, %Y" @utc }} - Time: {{ date "%-I:%M %p" @local24 }}</span></template>"##,
            supporting: None,
            expected: Some(
                r##"<span>UTC: 08/26/2010 - English: August 26, 2010 - Time: 1:44 PM</span>"##,
            ),
        },
        Case {
            name: "format-number",
            description: "number formatting with picture patterns",
            source: r##"<node><data n0="0" n1="123" n2="1234567890" n3="-765.4321"/></node>"##,
            template: r###"<template><span>{{ format Number 000000 data/@n1 }}|{{ ? Number "#,#" data/@n2 }}|{{ Number "$#,#.##" data/@n3 }}|{{ number "##.#;(##.#);**Zero**" data/@n0 }}|{{ ? number X data/@n1 }}</span></template>"###,
            supporting: None,
            expected: Some(r##"<span>000123|1,234,567,890|-$765.43|**Zero**|7B</span>"##),
        },
        Case {
            name: "format-string",
            description: "positional string formatting over several expressions",
            source: r##"<node><data user="HFINE" first="Howard" last="Fine"/></node>"##,
            template: r##"<template><span>{{ format string "Name: {0}, {1} ({2})" data/@last data/@first data/@user }}</span></template>"##,
            supporting: None,
            expected: Some(r##"<span>Name: Fine, Howard (HFINE)</span>"##),
        },
        Case {
            name: "copy-and-copy-encoded",
            description: "copy emits node markup, copyencoded escapes it",
            source: r##"<User userNo="1001"><Check-In status="CHECKED-IN" availability="Busy"/></User>"##,
            template: r##"<template><xml id="User_{{ = @userNo }}">{{ copy Check-In }}|{{ *= Check-In }}</xml></template>"##,
            supporting: None,
            expected: Some(
                r##"<xml id="User_1001"><Check-In status="CHECKED-IN" availability="Busy"/>|&lt;Check-In status=&quot;CHECKED-IN&quot; availability=&quot;Busy&quot;/&gt;</xml>"##,
            ),
        },
        Case {
            name: "replace",
            description: "regex replacement with named capture groups",
            source: r##"<node><data d1="08/26/2010"/></node>"##,
            template: r##"<template><span>{{ ~ "\b(?&lt;month&gt;\d{1,2})/(?&lt;day&gt;\d{1,2})/(?&lt;year&gt;\d{2,4})\b" "${day}-${month}-${year}" data/@d1 }}</span></template>"##,
            supporting: None,
            expected: Some(r##"<span>26-08-2010</span>"##),
        },
        Case {
            name: "variables",
            description: "variables bound in the caller are visible to applied templates",
            source: r##"<node><data attBase="stuff" att1="some" att2="more"/></node>"##,
            template: r##"<template>{{ var base data/@attBase }}{{ := adjective data/@att1 }}{{ % expand }}{{ := adjective data/@att2 }}{{ % expand }}</template>"##,
            supporting: Some(
                r##"<templates><template name="expand"><span>{{ string "{0} {1}" $adjective $base }}</span></template></templates>"##,
            ),
            expected: Some(r##"<span>some stuff</span><span>more stuff</span>"##),
        },
        Case {
            name: "multipart-variables",
            description: "mvar captures rendered output into a variable without emitting it",
            source: r##"<node><data att1="some" att2="more">stuff</data></node>"##,
            template: r##"<template>Multipart: {{ mvar total }}{{ each data/@* }}{{ = . }} {{ /each }}{{ = data }}{{ /mvar }}<span>{{ = $total }}</span></template>"##,
            supporting: None,
            expected: Some(r##"Multipart: <span>some more stuff</span>"##),
        },
        Case {
            name: "paramapply",
            description: "paramapply binds block-scoped parameters for the applied template",
            source: r##"<Root><input click="this.focus();" desc="text field"/></Root>"##,
            template: r##"<template>{{ EACH * }}{{ %% BuildElement . }}{{ := element "name(.)" }}{{ := onclick @click }}{{ := description @desc }}{{ /%% }}{{ /EACH }}</template>"##,
            supporting: Some(
                r##"<templates><t name="BuildElement"><span onclick="{{ = $onclick }}" sourceEl="{{ = $element }}">{{ = $description }}</span></t></templates>"##,
            ),
            expected: Some(
                r##"<span onclick="this.focus();" sourceEl="input">text field</span>"##,
            ),
        },
        Case {
            name: "malformed-block-recovers",
            description: "a block opener without a closer is skipped, not fatal",
            source: r##"<context><User UserNo="10006"/></context>"##,
            template: r##"<template><div>{{ IF true }}<input value="{{= User/@UserNo}}"/></div></template>"##,
            supporting: None,
            expected: Some(r##"<div><input value="10006"/></div>"##),
        },
        Case {
            name: "unterminated-command-is-fatal",
            description: "a start delimiter with no end delimiter fails the parse",
            source: "<node/>",
            template: r##"<template><div>{{ </div></template>"##,
            supporting: None,
            expected: None,
        },
    ]
}
