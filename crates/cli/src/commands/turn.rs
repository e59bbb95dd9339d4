//! `replyforge turn` — Run one JSON reply intent through the pipeline.

use replyforge_core::intent::ReplyIntent;
use std::io::Read;
use std::path::{Path, PathBuf};

pub async fn run(
    explicit: Option<&Path>,
    input: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let intent: ReplyIntent = serde_json::from_str(&raw)?;

    let (orchestrator, _store) = super::orchestrator(explicit).await?;
    let result = orchestrator.process(intent).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
