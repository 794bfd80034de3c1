//! Contact snapshot

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contact as seen by the engine
///
/// Loaded once when an execution starts and again when the scheduler resumes
/// it. The engine never observes changes made between those two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,

    /// Pipeline status (e.g. "lead", "customer")
    pub status: String,

    pub lead_score: i64,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub custom_fields: serde_json::Map<String, serde_json::Value>,
}

impl Contact {
    /// Create a contact with a fresh id and empty optional fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            email: None,
            phone: None,
            status: "lead".to_string(),
            lead_score: 0,
            tags: vec![],
            custom_fields: serde_json::Map::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_lead_score(mut self, score: i64) -> Self {
        self.lead_score = score;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_custom_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom_fields.insert(key.into(), value);
        self
    }

    /// Look up a field by name as a string
    ///
    /// Built-in fields accept both camelCase and snake_case names. Anything
    /// else is looked up in the custom fields. Tags are joined with commas.
    /// Returns `None` when the field is absent.
    pub fn field_value(&self, field: &str) -> Option<String> {
        match field {
            "id" => Some(self.id.to_string()),
            "name" => Some(self.name.clone()),
            "email" => self.email.clone(),
            "phone" => self.phone.clone(),
            "status" => Some(self.status.clone()),
            "leadScore" | "lead_score" => Some(self.lead_score.to_string()),
            "tags" => Some(self.tags.join(",")),
            other => self.custom_fields.get(other).map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_fields() {
        let contact = Contact::new("Ada")
            .with_email("ada@example.com")
            .with_lead_score(75)
            .with_tag("vip")
            .with_tag("beta");

        assert_eq!(contact.field_value("name").as_deref(), Some("Ada"));
        assert_eq!(contact.field_value("email").as_deref(), Some("ada@example.com"));
        assert_eq!(contact.field_value("leadScore").as_deref(), Some("75"));
        assert_eq!(contact.field_value("lead_score").as_deref(), Some("75"));
        assert_eq!(contact.field_value("tags").as_deref(), Some("vip,beta"));
        assert_eq!(contact.field_value("phone"), None);
    }

    #[test]
    fn test_custom_fields() {
        let contact = Contact::new("Ada")
            .with_custom_field("company", json!("Analytical Engines"))
            .with_custom_field("seats", json!(12));

        assert_eq!(
            contact.field_value("company").as_deref(),
            Some("Analytical Engines")
        );
        assert_eq!(contact.field_value("seats").as_deref(), Some("12"));
        assert_eq!(contact.field_value("missing"), None);
    }

    #[test]
    fn test_serialization_uses_camel_case() {
        let contact = Contact::new("Ada").with_lead_score(10);
        let json = serde_json::to_value(&contact).unwrap();

        assert_eq!(json["leadScore"], 10);
        assert!(json["customFields"].is_object());
    }
}
