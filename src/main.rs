use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use xta_callgraph::{CallGraphReport, ClassHierarchy, Variant, load_program, resolve_method_name};

/// CLI arguments for call graph construction.
#[derive(Parser, Debug)]
#[command(
    name = "xta-callgraph",
    about = "Build a call graph for a JSON program description with CHA, RTA or the XTA family.",
    version
)]
struct Cli {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_enum, default_value_t = Variant::Xta)]
    variant: Variant,
    /// Entry method as `Class.name(params)`; defaults to the program's entry.
    #[arg(long, value_name = "METHOD")]
    entry: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
    #[arg(long)]
    verbose: bool,
}

/// Report encoding written to the output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);
    run(cli)
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }

    let started_at = Instant::now();
    let program = load_program(&cli.input)?;
    let entry = match cli.entry.as_deref() {
        Some(name) => resolve_method_name(&program, name)?,
        None => program
            .entry()
            .with_context(|| format!("{} declares no entry method; pass --entry", cli.input.display()))?,
    };
    let hierarchy = ClassHierarchy::new(&program);
    let output = cli
        .variant
        .build(&hierarchy, entry)
        .with_context(|| format!("failed to build {} call graph", cli.variant))?;
    let report = CallGraphReport::new(&program, cli.variant, &output);

    let mut writer = output_writer(cli.output.as_deref())?;
    write_report(&mut writer, &report, cli.format)?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} variant={} reachable={} edges={}",
            started_at.elapsed().as_millis(),
            cli.variant,
            report.reachable_methods.len(),
            report.edges.len()
        );
    }

    Ok(())
}

fn write_report(writer: &mut dyn Write, report: &CallGraphReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, report)
                .context("failed to serialize call graph")?;
            writer
                .write_all(b"\n")
                .context("failed to write call graph")?;
        }
        OutputFormat::Text => writer
            .write_all(report.to_text().as_bytes())
            .context("failed to write call graph")?,
    }
    Ok(())
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xta_callgraph::parse_program;

    const PROGRAM: &str = r#"{
        "entry": "Main.main()",
        "classes": [
            { "name": "Main", "methods": [
                { "name": "main", "static": true, "body": [
                    { "op": "invoke", "kind": "static", "class": "Main", "method": "helper()" } ] },
                { "name": "helper", "static": true } ] }
        ]
    }"#;

    fn report(variant: Variant) -> CallGraphReport {
        let program = parse_program(PROGRAM).expect("parse program");
        let hierarchy = ClassHierarchy::new(&program);
        let entry = program.entry().expect("entry");
        let output = variant.build(&hierarchy, entry).expect("build");
        CallGraphReport::new(&program, variant, &output)
    }

    #[test]
    fn cli_parses_variant_and_format() {
        let cli = Cli::try_parse_from([
            "xta-callgraph",
            "--input",
            "program.json",
            "--variant",
            "cta",
            "--format",
            "text",
        ])
        .expect("parse arguments");
        assert_eq!(Variant::Cta, cli.variant);
        assert_eq!(OutputFormat::Text, cli.format);

        let defaults = Cli::try_parse_from(["xta-callgraph", "--input", "program.json"])
            .expect("parse arguments");
        assert_eq!(Variant::Xta, defaults.variant);
        assert_eq!(OutputFormat::Json, defaults.format);
        assert!(Cli::try_parse_from(["xta-callgraph", "--input", "p.json", "--variant", "pta"]).is_err());
    }

    #[test]
    fn json_report_has_expected_shape() {
        let mut buffer = Vec::new();
        write_report(&mut buffer, &report(Variant::Xta), OutputFormat::Json).expect("write report");
        let value: serde_json::Value = serde_json::from_slice(&buffer).expect("parse report");

        assert_eq!(value["variant"], "xta");
        assert_eq!(value["entry"], "Main.main()");
        assert_eq!(value["edges"][0]["callee"], "Main.helper()");
        assert_eq!(value["reachable_methods"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn text_report_lists_edges() {
        let mut buffer = Vec::new();
        write_report(&mut buffer, &report(Variant::Cha), OutputFormat::Text).expect("write report");
        assert_eq!(
            "Main.main()#0 -[static]-> Main.helper()\n",
            String::from_utf8(buffer).expect("utf8")
        );
    }
}
