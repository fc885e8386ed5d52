//! Command-line front end for the accessor generator.
//!
//! Flags override whatever the config file sets.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use netabase_codegen::GeneratorConfig;
use netabase_codegen::config::{FormatterKind, NamingConvention, OutputMode};

#[derive(Parser, Debug)]
#[command(name = "netabase-codegen", version, about)]
struct Args {
    /// Source roots: crate directories, plain directories or `.rs` files
    patterns: Vec<String>,

    /// TOML config file (defaults to ./netabase-codegen.toml if present)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Enabled cfg tags, comma separated
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Also load test modules and tests/ files
    #[arg(long, default_value_t = false)]
    include_tests: bool,

    /// Only generate these types
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,

    /// Never generate these types
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Field name casing: snake_case, camelCase, PascalCase or kebab-case
    #[arg(long)]
    naming: Option<NamingConvention>,

    /// Output root directory
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// single-file or per-entity
    #[arg(long)]
    mode: Option<OutputMode>,

    /// rustfmt or none
    #[arg(long)]
    formatter: Option<FormatterKind>,

    /// Crate path of the model contract
    #[arg(long)]
    contract: Option<String>,

    /// Increase log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

const DEFAULT_CONFIG: &str = "netabase-codegen.toml";

impl Args {
    fn into_config(self) -> Result<GeneratorConfig> {
        let path = self
            .config
            .clone()
            .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.is_file()));
        let mut config = match &path {
            Some(path) => GeneratorConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => GeneratorConfig::default(),
        };

        if !self.patterns.is_empty() {
            config.patterns = self.patterns;
        }
        config.build_tags.extend(self.tags);
        config.include_tests |= self.include_tests;
        config.include.extend(self.include);
        config.exclude.extend(self.exclude);
        if let Some(naming) = self.naming {
            config.naming = naming;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(mode) = self.mode {
            config.output_mode = mode;
        }
        if let Some(formatter) = self.formatter {
            config.formatter = formatter;
        }
        if let Some(contract) = self.contract {
            config.contract_path = contract;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .parse_default_env()
        .init();

    let config = args.into_config()?;
    let report = netabase_codegen::generate(&config).context("code generation failed")?;

    for path in &report.files {
        info!("wrote {}", path.display());
    }
    for field in &report.skipped_string_fields {
        info!("no string codec: {field}");
    }
    Ok(())
}
