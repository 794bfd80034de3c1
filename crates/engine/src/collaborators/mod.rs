//! External collaborator contracts
//!
//! The engine only depends on the call contracts of the systems it drives.
//! Delivery mechanics, generation and CRM storage live behind these traits:
//! - [`MessageSender`] for email/SMS delivery
//! - [`TextGenerator`] for generative steps
//! - [`ContactDirectory`] for contact snapshots
//! - [`ActorInvoker`] and [`ExternalSync`] for pass-through steps
//!
//! [`HttpCollaborator`] implements the outbound contracts over JSON webhooks.

mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Contact;

pub use http::{HttpCollaborator, HttpEndpoints};

/// Error returned by a collaborator call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollaboratorError {
    /// The collaborator could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    /// The collaborator answered with a non-success status
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The collaborator answered with something we could not read
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// No endpoint configured for this collaborator
    #[error("{0} collaborator is not configured")]
    NotConfigured(&'static str),

    #[error("{0}")]
    Other(String),
}

impl CollaboratorError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Receipt for a sent message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
    pub status: String,
}

/// Delivers messages to contacts
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        contact_id: Uuid,
        channel: &str,
        content: &str,
        subject: Option<&str>,
    ) -> Result<SentMessage, CollaboratorError>;
}

/// Generates structured text from a prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<serde_json::Value, CollaboratorError>;
}

/// Looks up contacts
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// `Ok(None)` when the contact does not exist
    async fn get(&self, contact_id: Uuid) -> Result<Option<Contact>, CollaboratorError>;
}

/// Runs a third-party actor with an opaque configuration
#[async_trait]
pub trait ActorInvoker: Send + Sync {
    async fn invoke(
        &self,
        config: &serde_json::Value,
        contact: &Contact,
    ) -> Result<serde_json::Value, CollaboratorError>;
}

/// Pushes contact data to an external system
#[async_trait]
pub trait ExternalSync: Send + Sync {
    async fn sync(
        &self,
        config: &serde_json::Value,
        contact: &Contact,
    ) -> Result<serde_json::Value, CollaboratorError>;
}

/// The full set of collaborators a runner needs
#[derive(Clone)]
pub struct Collaborators {
    pub messages: Arc<dyn MessageSender>,
    pub generator: Arc<dyn TextGenerator>,
    pub contacts: Arc<dyn ContactDirectory>,
    pub actors: Arc<dyn ActorInvoker>,
    pub sync: Arc<dyn ExternalSync>,
}

impl Collaborators {
    /// Use one HTTP client for every outbound collaborator
    pub fn http(http: Arc<HttpCollaborator>, contacts: Arc<dyn ContactDirectory>) -> Self {
        Self {
            messages: http.clone(),
            generator: http.clone(),
            contacts,
            actors: http.clone(),
            sync: http,
        }
    }
}
