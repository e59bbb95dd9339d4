//! `replyforge template` — Manage versioned prompt templates.

use clap::{ArgGroup, Subcommand};
use replyforge_core::template::{PromptTemplate, TemplateUpsert};
use replyforge_pipeline::TemplateRegistry;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum TemplateAction {
    /// Store a new version of a template
    #[command(group(ArgGroup::new("source").required(true).args(["body", "body_file"])))]
    Set {
        id: String,

        /// Template body with {placeholders}
        #[arg(long)]
        body: Option<String>,

        /// Read the body from a file
        #[arg(long)]
        body_file: Option<PathBuf>,

        /// Store without activating
        #[arg(long)]
        inactive: bool,

        /// Explicit version (default: next)
        #[arg(long)]
        version: Option<u32>,

        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Show the active version of a template
    Show { id: String },

    /// List every stored version, newest first
    Versions { id: String },

    /// Render the active version with variables
    Render {
        id: String,

        /// Variable as key=value; values that parse as JSON are used as JSON (repeatable)
        #[arg(long = "var")]
        vars: Vec<String>,
    },
}

pub async fn run(explicit: Option<&Path>, action: TemplateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(explicit)?;
    let store = super::open_store(&config).await?;
    let registry =
        TemplateRegistry::new(store, &config.templates.default_id, &config.templates.default_body)
            .await?;

    match action {
        TemplateAction::Set {
            id,
            body,
            body_file,
            inactive,
            version,
            metadata,
        } => {
            let body = match (body, body_file) {
                (Some(body), _) => body,
                (None, Some(path)) => std::fs::read_to_string(path)?,
                (None, None) => return Err("either --body or --body-file is required".into()),
            };

            let mut upsert = TemplateUpsert::new(id, body);
            if inactive {
                upsert = upsert.inactive();
            }
            if let Some(v) = version {
                upsert = upsert.with_version(v);
            }
            if let Some(raw) = metadata {
                upsert = upsert.with_metadata(parse_metadata(&raw)?);
            }

            let stored = registry.upsert_template(upsert).await?;
            println!(
                "✅ Stored {} v{}{}",
                stored.id,
                stored.version,
                if stored.active { " (active)" } else { "" }
            );
        }
        TemplateAction::Show { id } => match registry.get_template(&id).await? {
            Some(t) => print_template(&t),
            None => println!("No active version of '{id}'"),
        },
        TemplateAction::Versions { id } => {
            let versions = registry.versions(&id).await?;
            if versions.is_empty() {
                println!("No versions of '{id}'");
            }
            for t in &versions {
                println!(
                    "v{:<4} {} {}",
                    t.version,
                    if t.active { "active  " } else { "inactive" },
                    t.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        TemplateAction::Render { id, vars } => {
            let variables = parse_vars(&vars)?;
            println!("{}", registry.render(&id, &variables).await?);
        }
    }

    Ok(())
}

fn print_template(t: &PromptTemplate) {
    println!("{} v{} ({})", t.id, t.version, if t.active { "active" } else { "inactive" });
    if !t.metadata.is_empty() {
        println!("metadata: {}", Value::Object(t.metadata.clone()));
    }
    println!("---\n{}", t.body);
}

fn parse_metadata(raw: &str) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err("--metadata must be a JSON object".into()),
    }
}

/// Parse `key=value` pairs. A value that is valid JSON keeps its type,
/// anything else is taken as a plain string.
fn parse_vars(pairs: &[String]) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}
