/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sxd_document::parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use xstencil::Engine;

mod battery;

use battery::{CaseOutcome, run_case};

#[derive(Parser)]
#[command(name = "xstencil")]
#[command(about = "XPath-driven stencil templates over XML documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the conformance battery
    Battery {
        /// Show expected/actual output for every case
        #[arg(short, long)]
        verbose: bool,

        /// Output results as JSONL
        #[arg(long)]
        json: bool,
    },

    /// Transform a source document with a template
    Render {
        /// Source XML document
        source: PathBuf,

        /// Template XML document (template text is the root element's inner markup)
        template: PathBuf,

        /// Supporting-templates XML document
        #[arg(short, long)]
        supporting: Option<PathBuf>,

        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xstencil=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        // The bare invocation runs the battery.
        None => run_battery(false, false),
        Some(Commands::Battery { verbose, json }) => run_battery(verbose, json),
        Some(Commands::Render {
            source,
            template,
            supporting,
            output,
        }) => render(&source, &template, supporting.as_deref(), output.as_deref()),
    }
}

fn run_battery(verbose: bool, json: bool) -> Result<()> {
    let cases = battery::cases();
    let mut outcomes = Vec::with_capacity(cases.len());

    for case in &cases {
        let outcome = run_case(case)?;
        if !json {
            print_outcome(case.description, &outcome, verbose);
        }
        outcomes.push(outcome);
    }

    if json {
        for outcome in &outcomes {
            println!("{}", serde_json::to_string(outcome)?);
        }
    } else {
        print_summary(&outcomes);
    }

    if outcomes.iter().all(|o| o.passed) {
        Ok(())
    } else {
        anyhow::bail!("battery failed")
    }
}

fn print_outcome(description: &str, outcome: &CaseOutcome, verbose: bool) {
    if outcome.passed {
        println!("{} {}", "✓".green(), outcome.name.cyan());
    } else {
        println!("{} {}", "✗".red(), outcome.name.cyan());
    }
    if verbose || !outcome.passed {
        println!("    {description}");
        if let Some(expected) = &outcome.expected {
            println!("    expected: {expected}");
        }
        if let Some(actual) = &outcome.actual {
            println!("    actual:   {actual}");
        }
        if let Some(error) = &outcome.error {
            println!("    error:    {error}");
        }
    }
}

fn print_summary(outcomes: &[CaseOutcome]) {
    let total = outcomes.len();
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let failed = total - passed;

    println!("\n{}", "=== Summary ===".bold());
    println!("Total cases:  {total}");
    println!(
        "Passed:       {} {}",
        passed,
        if failed == 0 { "✓".green() } else { "✓".normal() }
    );
    println!(
        "Failed:       {} {}",
        failed,
        if failed > 0 { "✗".red() } else { "✓".green() }
    );
}

fn render(
    source: &Path,
    template: &Path,
    supporting: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let source_xml = std::fs::read_to_string(source)
        .with_context(|| format!("reading {}", source.display()))?;
    let template_xml = std::fs::read_to_string(template)
        .with_context(|| format!("reading {}", template.display()))?;
    let supporting_xml = match supporting {
        Some(path) => Some(
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        ),
        None => None,
    };

    let source_package = parser::parse(&source_xml)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("parsing {}", source.display()))?;
    let template_package = parser::parse(&template_xml)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("parsing {}", template.display()))?;
    let supporting_package = match (&supporting_xml, supporting) {
        (Some(xml), Some(path)) => Some(
            parser::parse(xml)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("parsing {}", path.display()))?,
        ),
        _ => None,
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

    let rendered = Engine::transform_node(source_root, template_root, supporting_root)?;

    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}
