#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use capreplay_cli::{decode_fields, load_dump, parse_fields, parse_u64, presets, resolve_layout};

#[derive(Debug, Clone, Args)]
struct LayoutArgs {
    /// Named layout preset (x86_64, x86, armv7a, arm64). Defaults to the host layout.
    #[arg(long, conflicts_with = "layout_file")]
    layout: Option<String>,

    /// JSON file describing a custom memory layout.
    #[arg(long)]
    layout_file: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(name = "capreplay")]
#[command(about = "Inspect captured memory with the replay memory model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode a sequence of typed fields from a raw memory dump.
    Decode {
        /// Raw dump file.
        #[arg(long)]
        dump: PathBuf,

        /// Address the first byte of the dump was captured at.
        #[arg(long, default_value = "0", value_parser = parse_address)]
        base: u64,

        /// Address to start decoding at (default: --base).
        #[arg(long, value_parser = parse_address)]
        at: Option<u64>,

        #[command(flatten)]
        layout: LayoutArgs,

        /// Comma separated fields, e.g. `u32,ptr,skip:4,string,bytes:16`.
        #[arg(long)]
        fields: String,
    },
    /// Print the built-in layout presets as JSON.
    Layouts,
}

fn parse_address(s: &str) -> Result<u64, String> {
    parse_u64(s).map_err(|e| format!("{e:#}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            dump,
            base,
            at,
            layout,
            fields,
        } => {
            let fields = parse_fields(&fields)?;
            let layout = resolve_layout(layout.layout.as_deref(), layout.layout_file.as_deref())?;
            let pool = load_dump(&dump, base)?;
            let at = at.unwrap_or(base);
            tracing::debug!(dump = %dump.display(), base, at, "decoding");

            let report = decode_fields(&pool, at, layout, &fields)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize report")?
            );
            if let Some(err) = report.error {
                bail!("decoding stopped after {} field(s): {err}", report.fields.len());
            }
            Ok(())
        }
        Commands::Layouts => {
            let presets: serde_json::Map<String, serde_json::Value> = presets()
                .into_iter()
                .map(|(name, layout)| {
                    serde_json::to_value(layout).map(|value| (name.to_owned(), value))
                })
                .collect::<Result<_, serde_json::Error>>()
                .context("failed to serialize layouts")?;
            println!("{}", serde_json::to_string_pretty(&presets)?);
            Ok(())
        }
    }
}
