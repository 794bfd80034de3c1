use serde_json::json;

use super::StepError;
use crate::collaborators::MessageSender;
use crate::model::{Contact, SendMessageConfig};
use crate::template::TemplateRenderer;

pub(super) async fn execute(
    sender: &dyn MessageSender,
    renderer: &TemplateRenderer,
    config: &SendMessageConfig,
    contact: &Contact,
) -> Result<serde_json::Value, StepError> {
    let body = renderer.render(&config.body, contact);
    let subject = config
        .subject
        .as_deref()
        .map(|subject| renderer.render(subject, contact));

    let sent = sender
        .send(contact.id, &config.channel, &body, subject.as_deref())
        .await?;

    Ok(json!({ "messageId": sent.id, "status": sent.status }))
}
