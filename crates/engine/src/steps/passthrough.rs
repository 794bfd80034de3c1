//! Steps that forward their configuration to a collaborator untouched

use super::StepError;
use crate::collaborators::{ActorInvoker, ExternalSync};
use crate::model::Contact;

pub(super) async fn invoke_actor(
    actors: &dyn ActorInvoker,
    config: &serde_json::Value,
    contact: &Contact,
) -> Result<serde_json::Value, StepError> {
    Ok(actors.invoke(config, contact).await?)
}

pub(super) async fn external_sync(
    sync: &dyn ExternalSync,
    config: &serde_json::Value,
    contact: &Contact,
) -> Result<serde_json::Value, StepError> {
    Ok(sync.sync(config, contact).await?)
}
