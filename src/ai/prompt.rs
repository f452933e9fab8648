//! Reusable prompts using Handlebars for templating. Handlebars adds
//! additional security controls since it can't do much out of the box
//! without registering your own helpers. This is ideal since document
//! text and model output should be considered untrusted and
//! Handlebars forces you to add only what you need.

use std::fmt;

use anyhow::Result;
use handlebars::Handlebars;
use serde_json::json;

#[derive(Debug)]
pub enum Prompt {
    StudyAssistant,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<Prompt> for String {
    fn from(item: Prompt) -> String {
        format!("{:?}", item)
    }
}

const STUDY_ASSISTANT_PROMPT: &str = r"You are a study assistant helping a student understand their course material. Ground your answers in the document context below when it is relevant and mention which document an answer comes from. If the context does not cover the question, say so before answering from general knowledge. Keep explanations clear and suited to a student revising for an exam.
{{#if context}}

DOCUMENT CONTEXT:
{{{context}}}
{{/if}}";

pub fn templates<'a>() -> Handlebars<'a> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    // Prompts are plain text, HTML escaping would mangle documents
    registry.register_escape_fn(handlebars::no_escape);
    registry
        .register_template_string(&Prompt::StudyAssistant.to_string(), STUDY_ASSISTANT_PROMPT)
        .expect("Failed to register template");
    registry
}

/// Renders the system instruction, with the aggregated document
/// context appended as a trailing block when there is one.
pub fn system_prompt(context: Option<&str>) -> Result<String> {
    let rendered = templates().render(
        &Prompt::StudyAssistant.to_string(),
        &json!({ "context": context }),
    )?;
    Ok(rendered.trim_end().to_string())
}
