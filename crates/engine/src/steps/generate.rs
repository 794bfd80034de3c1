use super::StepError;
use crate::collaborators::TextGenerator;
use crate::model::{Contact, GenerateConfig, StepOutputs};
use crate::template::TemplateRenderer;

/// Instruction sent with every generation request
pub const SYSTEM_PROMPT: &str = "You are an assistant embedded in a marketing automation \
workflow. Follow the instructions using the contact details and the outputs of earlier \
workflow steps. Respond with a single JSON object.";

/// Rendered prompt followed by the serialized context
pub fn user_prompt(
    renderer: &TemplateRenderer,
    config: &GenerateConfig,
    contact: &Contact,
    context: &StepOutputs,
) -> Result<String, StepError> {
    let prompt = renderer.render(&config.prompt, contact);
    let context = serde_json::to_string_pretty(context)?;
    Ok(format!("{}\n\nWorkflow context:\n{}", prompt, context))
}

pub(super) async fn execute(
    generator: &dyn TextGenerator,
    renderer: &TemplateRenderer,
    config: &GenerateConfig,
    contact: &Contact,
    context: &StepOutputs,
) -> Result<serde_json::Value, StepError> {
    let prompt = user_prompt(renderer, config, contact, context)?;
    Ok(generator.generate(SYSTEM_PROMPT, &prompt).await?)
}
