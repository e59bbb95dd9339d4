//! `replyforge generate` — One reply from the command line.

use replyforge_core::intent::ReplyIntent;
use std::path::Path;

pub struct GenerateArgs {
    pub message: String,
    pub history: Vec<String>,
    pub template: Option<String>,
    pub constraints: Vec<String>,
    pub conversation: String,
}

impl GenerateArgs {
    fn into_intent(self) -> ReplyIntent {
        ReplyIntent {
            conversation_id: self.conversation,
            needs_generation: true,
            user_text: self.message,
            history: self.history,
            template_id: self.template,
            constraints: self.constraints,
            ..Default::default()
        }
    }
}

pub async fn run(explicit: Option<&Path>, args: GenerateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (orchestrator, _store) = super::orchestrator(explicit).await?;
    let result = orchestrator.process(args.into_intent()).await;

    println!("{}", result.text);
    if let Some(generation) = &result.generation {
        eprintln!(
            "[{}] provider={} model={} decision={} fallback={}{}",
            result.request_id.as_deref().unwrap_or("-"),
            generation.provider,
            generation.model,
            generation.decision,
            generation.fallback_used,
            generation
                .error
                .as_deref()
                .map(|e| format!(" error=\"{e}\""))
                .unwrap_or_default(),
        );
    }
    Ok(())
}
