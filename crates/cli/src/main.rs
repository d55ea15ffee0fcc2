use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use appset_core::{combine_string_maps, sanitize_name, ApplicationSet, Params};
use appset_render::{Render, Renderer};
use appset_validate::{check_invalid_generators, invalid_generators};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "appsetctl", version, about = "ApplicationSet render/validate CLI")]
struct Cli {
    /// Output format
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        global = true,
        default_value_t = Output::Human
    )]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render the ApplicationSet template once per parameter set
    Render {
        /// ApplicationSet manifest (YAML or JSON)
        appset: PathBuf,
        /// List of string maps, one per generated Application
        #[arg(long = "params")]
        params: PathBuf,
        /// Extra parameter merged into every set, e.g. `--set env=prod`
        #[arg(long = "set", value_parser = parse_kv)]
        set: Vec<(String, String)>,
        /// Coerce rendered Application names into DNS-1123 form
        #[arg(long = "sanitize-names")]
        sanitize_names: bool,
    },
    /// Report generator entries with no recognized generator type
    Check {
        /// ApplicationSet manifest (YAML or JSON), ideally with its last-applied annotation
        appset: PathBuf,
    },
}

fn init_tracing() {
    let env = std::env::var("APPSET_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_kv(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn max_yaml_bytes() -> usize {
    std::env::var("APPSET_MAX_YAML_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MiB default
}

fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if raw.len() > max_yaml_bytes() {
        bail!("{} too large (>{} bytes)", path.display(), max_yaml_bytes());
    }
    // YAML is a superset of JSON, one parser covers both
    serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { appset, params, set: extra, sanitize_names } => {
            let set: ApplicationSet = read_doc(&appset)?;
            let param_sets: Vec<Params> = read_doc(&params)?;
            info!(appset = %set.name(), params = param_sets.len(), "render invoked");
            let tmpl = set.template_application();
            let policy = set.spec.sync_policy.as_ref();
            let extra: Params = extra.into_iter().collect();
            let mut apps = Vec::with_capacity(param_sets.len());
            for (i, p) in param_sets.iter().enumerate() {
                let p = combine_string_maps(p, &extra)
                    .with_context(|| format!("merging --set into parameter set #{}", i))?;
                let mut app = Render
                    .render_template_params(&tmpl, policy, &p)
                    .with_context(|| format!("rendering parameter set #{}", i))?;
                if sanitize_names {
                    app.metadata.name = app.metadata.name.as_deref().map(sanitize_name);
                }
                apps.push(app);
            }
            match cli.output {
                Output::Human => {
                    for app in apps.iter() {
                        println!("---");
                        print!("{}", serde_yaml::to_string(app)?);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&apps)?),
            }
        }
        Commands::Check { appset } => {
            let set: ApplicationSet = read_doc(&appset)?;
            info!(appset = %set.name(), generators = set.spec.generators.len(), "check invoked");
            check_invalid_generators(&set);
            let (has_invalid, names) = invalid_generators(&set);
            match cli.output {
                Output::Human => {
                    if !has_invalid {
                        println!("all {} generators recognized", set.spec.generators.len());
                    } else if names.is_empty() {
                        println!("unrecognized generators present (no last-applied annotation)");
                    } else {
                        let listed: Vec<&str> = names.iter().map(String::as_str).collect();
                        println!("unrecognized generators: {}", listed.join(", "));
                    }
                }
                Output::Json => {
                    let out = serde_json::json!({ "invalid": has_invalid, "names": names });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
            }
            if has_invalid {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
