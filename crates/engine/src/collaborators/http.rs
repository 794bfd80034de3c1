// Webhook-backed collaborators
//
// Each outbound collaborator is a single JSON POST endpoint. Unset endpoints
// fail with `CollaboratorError::NotConfigured` at call time, so a worker can
// run workflows that never touch them.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::{
    ActorInvoker, CollaboratorError, ExternalSync, MessageSender, SentMessage, TextGenerator,
};
use crate::model::Contact;

/// Endpoint URLs for the outbound collaborators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpEndpoints {
    pub messaging: Option<String>,
    pub generation: Option<String>,
    pub actor: Option<String>,
    pub sync: Option<String>,
}

/// Implements the outbound collaborator contracts over JSON webhooks
pub struct HttpCollaborator {
    http: reqwest::Client,
    endpoints: HttpEndpoints,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    contact_id: Uuid,
    channel: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(alias = "messageId")]
    id: String,
    #[serde(default = "default_send_status")]
    status: String,
}

fn default_send_status() -> String {
    "sent".to_string()
}

impl HttpCollaborator {
    pub fn new(endpoints: HttpEndpoints) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints)
    }

    pub fn with_client(http: reqwest::Client, endpoints: HttpEndpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn endpoints(&self) -> &HttpEndpoints {
        &self.endpoints
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        name: &'static str,
        url: Option<&String>,
        body: &B,
    ) -> Result<T, CollaboratorError> {
        let url = url.ok_or(CollaboratorError::NotConfigured(name))?;
        debug!(collaborator = name, %url, "posting to collaborator");

        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // Treat an empty acknowledgement as JSON null
        if status == StatusCode::NO_CONTENT {
            return serde_json::from_value(serde_json::Value::Null)
                .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()));
        }

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl MessageSender for HttpCollaborator {
    async fn send(
        &self,
        contact_id: Uuid,
        channel: &str,
        content: &str,
        subject: Option<&str>,
    ) -> Result<SentMessage, CollaboratorError> {
        let request = SendRequest {
            contact_id,
            channel,
            content,
            subject,
        };
        let response: SendResponse = self
            .post("messaging", self.endpoints.messaging.as_ref(), &request)
            .await?;

        Ok(SentMessage {
            id: response.id,
            status: response.status,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpCollaborator {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<serde_json::Value, CollaboratorError> {
        let body = json!({ "system": system_prompt, "prompt": user_prompt });
        self.post("generation", self.endpoints.generation.as_ref(), &body)
            .await
    }
}

#[async_trait]
impl ActorInvoker for HttpCollaborator {
    async fn invoke(
        &self,
        config: &serde_json::Value,
        contact: &Contact,
    ) -> Result<serde_json::Value, CollaboratorError> {
        let body = json!({ "config": config, "contact": contact });
        self.post("actor", self.endpoints.actor.as_ref(), &body).await
    }
}

#[async_trait]
impl ExternalSync for HttpCollaborator {
    async fn sync(
        &self,
        config: &serde_json::Value,
        contact: &Contact,
    ) -> Result<serde_json::Value, CollaboratorError> {
        let body = json!({ "config": config, "contact": contact });
        self.post("sync", self.endpoints.sync.as_ref(), &body).await
    }
}
