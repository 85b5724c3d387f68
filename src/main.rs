mod ast;
mod ast_walk;
mod diagnostics;
mod parser;
mod tokenizer;

use std::env;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, trace};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

fn main() -> anyhow::Result<()> {
    initialize_logging();

    let begc = Begc::parse();

    match begc.subcmd {
        BegcSubcommand::Parse(opts) => {
            let current_dir = std::env::current_dir()?;
            run_parse(&current_dir, opts)?;
        }
        BegcSubcommand::Check(opts) => {
            run_check(opts)?;
        }
    }

    Ok(())
}

/// Parse a source file and write the stage artifacts (`tokens.json`,
/// `ast.json`) under `target/begc/`.
fn run_parse(current_dir: &Path, opts: ParseOpts) -> anyhow::Result<()> {
    let target_dir = current_dir.join("target").join("begc");
    std::fs::create_dir_all(&target_dir)?;

    let source_path = Path::new(&opts.source);
    let source = read_source(source_path)?;

    // The parse below owns its own scan (a lexer is single-use), so the
    // token dump comes from a separate pass over the same text.
    let tokens: Vec<tokenizer::Token> = tokenizer::tokenize(&source).collect();
    let tokens_path = target_dir.join("tokens.json");
    std::fs::write(&tokens_path, serde_json::to_string_pretty(&tokens)?)?;
    trace!(tokens_path = %tokens_path.display(), count = tokens.len(), "tokenized source file");

    let parse = run_front_end(&source, source_path)?;
    let ast_path = target_dir.join("ast.json");
    std::fs::write(&ast_path, serde_json::to_string_pretty(&parse)?)?;
    debug!(ast_path = %ast_path.display(), nodes = parse.tree.len(), "parsed source file");

    Ok(())
}

/// Parse a source file and print the recovered tree as an outline.
fn run_check(opts: CheckOpts) -> anyhow::Result<()> {
    let source_path = Path::new(&opts.source);
    let source = read_source(source_path)?;
    let parse = run_front_end(&source, source_path)?;
    print!("{}", ast_walk::render_outline(&parse.tree, parse.root));
    if let Some(&statements) = parse.tree.children(parse.root).first() {
        info!(
            statements = parse.tree.children(statements).len(),
            nodes = parse.tree.len(),
            "check finished"
        );
    }
    Ok(())
}

fn read_source(source_path: &Path) -> anyhow::Result<String> {
    let source = std::fs::read_to_string(source_path)
        .with_context(|| format!("failed to read source {}", source_path.display()))?;
    trace!(source_len = source.len(), "read input file");
    Ok(source)
}

/// Run the front-end over `source`, rendering recovery warnings to stderr.
/// Fatal parse errors render as an error report and abort.
fn run_front_end(source: &str, source_path: &Path) -> anyhow::Result<parser::Parse> {
    match parser::parse(source) {
        Ok(parse) => {
            let bundle = diagnostics::recovery_bundle(source, Some(source_path), &parse);
            if !bundle.is_empty() {
                eprintln!("{}", bundle.render_terminal_auto());
            }
            Ok(parse)
        }
        Err(error) => {
            let report = diagnostics::fatal_diagnostic(source, Some(source_path), &error);
            eprintln!("{}", report.render_terminal_auto());
            Err(error.into())
        }
    }
}

fn initialize_logging() {
    let env_filter = env::var("RUST_LOG").unwrap_or_default();

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(EnvFilter::from_str(&env_filter).unwrap_or_default()))
        .init();
}

#[derive(clap::Parser)]
#[clap(about = "Front-end for the Begonia toy language")]
struct Begc {
    #[clap(subcommand)]
    subcmd: BegcSubcommand,
}

#[derive(clap::Subcommand)]
enum BegcSubcommand {
    /// Parse a source file and write tokens.json / ast.json stage artifacts.
    Parse(ParseOpts),
    /// Parse a source file and print the recovered tree outline.
    Check(CheckOpts),
}

#[derive(clap::Parser)]
struct ParseOpts {
    /// Path to the Begonia source file
    source: String,
}

#[derive(clap::Parser)]
struct CheckOpts {
    /// Path to the Begonia source file
    source: String,
}
