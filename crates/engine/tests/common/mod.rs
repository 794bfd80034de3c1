//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use cadence_engine::collaborators::{
    ActorInvoker, CollaboratorError, Collaborators, ContactDirectory, ExternalSync,
    MessageSender, SentMessage, TextGenerator,
};
use cadence_engine::{
    Contact, EngineConfig, EventBroadcaster, ExecutionRunner, InMemoryExecutionStore,
    StepEvent, StepEventStatus,
};

/// A message handed to the fake sender
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub contact_id: Uuid,
    pub channel: String,
    pub content: String,
}

/// Fake collaborators that record every call
#[derive(Default)]
pub struct Fakes {
    pub sent: Mutex<Vec<Sent>>,
    pub prompts: Mutex<Vec<String>>,

    /// Sends to these contacts fail
    pub undeliverable: Mutex<HashSet<Uuid>>,

    /// Lookups of these contacts fail
    pub unreachable: Mutex<HashSet<Uuid>>,

    /// Sends to these contacts never return
    pub hanging: Mutex<HashSet<Uuid>>,

    contacts: Mutex<Option<Arc<InMemoryExecutionStore>>>,
}

impl Fakes {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn contents(&self) -> Vec<String> {
        self.sent.lock().iter().map(|s| s.content.clone()).collect()
    }
}

#[async_trait]
impl MessageSender for Fakes {
    async fn send(
        &self,
        contact_id: Uuid,
        channel: &str,
        content: &str,
        _subject: Option<&str>,
    ) -> Result<SentMessage, CollaboratorError> {
        let hangs = self.hanging.lock().contains(&contact_id);
        if hangs {
            return std::future::pending().await;
        }
        if self.undeliverable.lock().contains(&contact_id) {
            return Err(CollaboratorError::Rejected {
                status: 422,
                body: "undeliverable".to_string(),
            });
        }

        let mut sent = self.sent.lock();
        sent.push(Sent {
            contact_id,
            channel: channel.to_string(),
            content: content.to_string(),
        });
        Ok(SentMessage {
            id: format!("msg-{}", sent.len()),
            status: "sent".to_string(),
        })
    }
}

#[async_trait]
impl TextGenerator for Fakes {
    async fn generate(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
    ) -> Result<serde_json::Value, CollaboratorError> {
        self.prompts.lock().push(user_prompt.to_string());
        Ok(json!({ "subject": "Checking in", "body": "Hope all is well" }))
    }
}

#[async_trait]
impl ContactDirectory for Fakes {
    async fn get(&self, contact_id: Uuid) -> Result<Option<Contact>, CollaboratorError> {
        if self.unreachable.lock().contains(&contact_id) {
            return Err(CollaboratorError::Transport("connection reset".to_string()));
        }
        let store = self.contacts.lock().clone();
        match store {
            Some(store) => store.get(contact_id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ActorInvoker for Fakes {
    async fn invoke(
        &self,
        config: &serde_json::Value,
        contact: &Contact,
    ) -> Result<serde_json::Value, CollaboratorError> {
        Ok(json!({ "actor": config, "contact": contact.name }))
    }
}

#[async_trait]
impl ExternalSync for Fakes {
    async fn sync(
        &self,
        config: &serde_json::Value,
        _contact: &Contact,
    ) -> Result<serde_json::Value, CollaboratorError> {
        Ok(json!({ "synced": config }))
    }
}

pub struct Harness {
    pub store: Arc<InMemoryExecutionStore>,
    pub fakes: Arc<Fakes>,
    pub events: Arc<EventBroadcaster>,
    pub runner: Arc<ExecutionRunner>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryExecutionStore::new());
        let fakes = Arc::new(Fakes::default());
        *fakes.contacts.lock() = Some(store.clone());
        let events = Arc::new(EventBroadcaster::default());

        let collaborators = Collaborators {
            messages: fakes.clone(),
            generator: fakes.clone(),
            contacts: fakes.clone(),
            actors: fakes.clone(),
            sync: fakes.clone(),
        };
        let runner = Arc::new(ExecutionRunner::new(
            store.clone(),
            collaborators,
            events.clone(),
            config,
        ));

        Self {
            store,
            fakes,
            events,
            runner,
        }
    }

    /// Insert a contact and return its id
    pub fn contact(&self, contact: Contact) -> Uuid {
        let id = contact.id;
        self.store.insert_contact(contact);
        id
    }
}

/// Receive events until `RunCompleted` or `Failed` for the execution
pub async fn wait_for_end(
    receiver: &mut broadcast::Receiver<StepEvent>,
    execution_id: Uuid,
) -> Vec<StepEvent> {
    let mut seen = Vec::new();
    let collect = async {
        loop {
            match receiver.recv().await {
                Ok(event) if event.execution_id == execution_id => {
                    let done = matches!(
                        event.status,
                        StepEventStatus::RunCompleted | StepEventStatus::Failed
                    );
                    seen.push(event);
                    if done {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("execution did not finish in time");
    seen
}
