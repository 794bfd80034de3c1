//! Workflow and step definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A workflow definition
///
/// Workflows are edited only between runs; an execution reads the workflow
/// once and treats it as immutable while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,

    /// Label matched by upstream triggers (e.g. "form_submitted")
    pub trigger: String,

    pub active: bool,

    /// Steps in execution order
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Create an active workflow with no steps
    pub fn new(name: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            trigger: trigger.into(),
            active: true,
            steps: vec![],
        }
    }

    /// Append a step, assigning the next sort order
    pub fn with_step(mut self, config: StepConfig) -> Self {
        let sort_order = self
            .steps
            .last()
            .map(|s| s.sort_order + 1)
            .unwrap_or(0);
        self.steps.push(WorkflowStep {
            id: Uuid::now_v7(),
            workflow_id: self.id,
            sort_order,
            config,
        });
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Sort steps by their sort key
    ///
    /// Stores call this after loading so that gaps and insertion order in
    /// the backing table never leak into execution order.
    pub fn sort_steps(&mut self) {
        self.steps.sort_by_key(|s| s.sort_order);
    }
}

/// Step kinds understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    SendMessage,
    Delay,
    Branch,
    Generate,
    InvokeActor,
    ExternalSync,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendMessage => "send_message",
            Self::Delay => "delay",
            Self::Branch => "branch",
            Self::Generate => "generate",
            Self::InvokeActor => "invoke_actor",
            Self::ExternalSync => "external_sync",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    /// Accepts snake_case, kebab-case and any letter case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "send_message" => Ok(Self::SendMessage),
            "delay" => Ok(Self::Delay),
            "branch" => Ok(Self::Branch),
            "generate" => Ok(Self::Generate),
            "invoke_actor" => Ok(Self::InvokeActor),
            "external_sync" => Ok(Self::ExternalSync),
            _ => Err(format!("unrecognized step type: {}", s)),
        }
    }
}

/// A single step of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub sort_order: i32,
    pub config: StepConfig,
}

impl WorkflowStep {
    /// Build a step from its stored form, validating the configuration
    pub fn from_stored(
        id: Uuid,
        workflow_id: Uuid,
        step_type: &str,
        config: serde_json::Value,
        sort_order: i32,
    ) -> Self {
        Self {
            id,
            workflow_id,
            sort_order,
            config: StepConfig::parse(step_type, config),
        }
    }

    /// The raw step type, including unrecognized ones
    pub fn step_type(&self) -> &str {
        self.config.step_type()
    }

    /// Human-readable label used in log rows
    pub fn label(&self, index: usize) -> String {
        format!("Step {}: {}", index + 1, self.step_type())
    }
}

/// Configuration of a `send_message` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageConfig {
    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default)]
    pub subject: Option<String>,

    #[serde(alias = "message", alias = "content")]
    pub body: String,
}

fn default_channel() -> String {
    "email".to_string()
}

/// Configuration of a `delay` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Free-text wait such as "2 Hours" or "1 Week"
    #[serde(default, alias = "wait", alias = "delay")]
    pub duration: String,
}

/// Comparison used by a `branch` step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchOperator {
    #[serde(alias = "eq", alias = "equal", alias = "==")]
    Equals,

    #[serde(alias = "gt", alias = ">")]
    GreaterThan,

    #[serde(alias = "lt", alias = "<")]
    LessThan,

    #[serde(alias = "includes")]
    Contains,
}

/// Configuration of a `branch` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchConfig {
    pub field: String,
    pub operator: BranchOperator,

    #[serde(deserialize_with = "string_or_scalar")]
    pub value: String,
}

/// Configuration of a `generate` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateConfig {
    pub prompt: String,
}

/// Validated configuration for each step kind
///
/// Produced once when a step is loaded. Configurations that do not match
/// their declared type, and types the engine does not know, become
/// [`StepConfig::Invalid`] and are skipped at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum StepConfig {
    SendMessage(SendMessageConfig),
    Delay(DelayConfig),
    Branch(BranchConfig),
    Generate(GenerateConfig),
    InvokeActor(serde_json::Value),
    ExternalSync(serde_json::Value),
    Invalid { step_type: String, reason: String },
}

impl StepConfig {
    /// Validate a stored `(type, config)` pair
    pub fn parse(step_type: &str, config: serde_json::Value) -> Self {
        let kind = match step_type.parse::<StepKind>() {
            Ok(kind) => kind,
            Err(reason) => {
                return Self::Invalid {
                    step_type: step_type.to_string(),
                    reason,
                }
            }
        };

        let parsed = match kind {
            StepKind::SendMessage => serde_json::from_value(config).map(Self::SendMessage),
            StepKind::Delay => serde_json::from_value(config).map(Self::Delay),
            StepKind::Branch => serde_json::from_value(config).map(Self::Branch),
            StepKind::Generate => serde_json::from_value(config).map(Self::Generate),
            StepKind::InvokeActor => Ok(Self::InvokeActor(config)),
            StepKind::ExternalSync => Ok(Self::ExternalSync(config)),
        };

        parsed.unwrap_or_else(|e| Self::Invalid {
            step_type: step_type.to_string(),
            reason: format!("invalid {} configuration: {}", kind, e),
        })
    }

    /// The step kind, or `None` for invalid steps
    pub fn kind(&self) -> Option<StepKind> {
        match self {
            Self::SendMessage(_) => Some(StepKind::SendMessage),
            Self::Delay(_) => Some(StepKind::Delay),
            Self::Branch(_) => Some(StepKind::Branch),
            Self::Generate(_) => Some(StepKind::Generate),
            Self::InvokeActor(_) => Some(StepKind::InvokeActor),
            Self::ExternalSync(_) => Some(StepKind::ExternalSync),
            Self::Invalid { .. } => None,
        }
    }

    pub fn step_type(&self) -> &str {
        match self {
            Self::Invalid { step_type, .. } => step_type,
            other => other.kind().map(|k| k.as_str()).unwrap_or_default(),
        }
    }

    /// Split into the `(type, config)` pair written to storage
    pub fn to_stored(&self) -> (String, serde_json::Value) {
        let config = match self {
            Self::SendMessage(c) => serde_json::to_value(c),
            Self::Delay(c) => serde_json::to_value(c),
            Self::Branch(c) => serde_json::to_value(c),
            Self::Generate(c) => serde_json::to_value(c),
            Self::InvokeActor(v) | Self::ExternalSync(v) => Ok(v.clone()),
            Self::Invalid { .. } => Ok(serde_json::Value::Object(Default::default())),
        };
        (
            self.step_type().to_string(),
            config.unwrap_or(serde_json::Value::Null),
        )
    }

    pub fn send_message(body: impl Into<String>) -> Self {
        Self::SendMessage(SendMessageConfig {
            channel: default_channel(),
            subject: None,
            body: body.into(),
        })
    }

    pub fn delay(duration: impl Into<String>) -> Self {
        Self::Delay(DelayConfig {
            duration: duration.into(),
        })
    }

    pub fn branch(
        field: impl Into<String>,
        operator: BranchOperator,
        value: impl Into<String>,
    ) -> Self {
        Self::Branch(BranchConfig {
            field: field.into(),
            operator,
            value: value.into(),
        })
    }

    pub fn generate(prompt: impl Into<String>) -> Self {
        Self::Generate(GenerateConfig {
            prompt: prompt.into(),
        })
    }
}

/// Branch values are compared as strings; numbers and booleans in stored
/// configurations are accepted and stringified.
fn string_or_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_kind_parsing() {
        assert_eq!("send_message".parse::<StepKind>(), Ok(StepKind::SendMessage));
        assert_eq!("send-message".parse::<StepKind>(), Ok(StepKind::SendMessage));
        assert_eq!("DELAY".parse::<StepKind>(), Ok(StepKind::Delay));
        assert_eq!("external-sync".parse::<StepKind>(), Ok(StepKind::ExternalSync));
        assert!("teleport".parse::<StepKind>().is_err());
    }

    #[test]
    fn test_parse_send_message() {
        let config = StepConfig::parse(
            "send_message",
            json!({ "channel": "sms", "message": "Hi {{contact.name}}" }),
        );

        match config {
            StepConfig::SendMessage(c) => {
                assert_eq!(c.channel, "sms");
                assert_eq!(c.body, "Hi {{contact.name}}");
                assert!(c.subject.is_none());
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_parse_branch_accepts_numeric_value_and_alias() {
        let config = StepConfig::parse(
            "branch",
            json!({ "field": "leadScore", "operator": "gt", "value": 50 }),
        );

        assert_eq!(
            config,
            StepConfig::branch("leadScore", BranchOperator::GreaterThan, "50")
        );
    }

    #[test]
    fn test_parse_delay_without_duration() {
        let config = StepConfig::parse("delay", json!({}));
        assert_eq!(config, StepConfig::delay(""));
    }

    #[test]
    fn test_unrecognized_type_is_invalid() {
        let config = StepConfig::parse("teleport", json!({}));

        assert!(config.kind().is_none());
        assert_eq!(config.step_type(), "teleport");
        assert!(matches!(config, StepConfig::Invalid { .. }));
    }

    #[test]
    fn test_malformed_config_is_invalid() {
        let config = StepConfig::parse("branch", json!({ "field": "leadScore" }));

        match config {
            StepConfig::Invalid { step_type, reason } => {
                assert_eq!(step_type, "branch");
                assert!(reason.contains("invalid branch configuration"));
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_stored_form_reparses() {
        let original = StepConfig::branch("status", BranchOperator::Contains, "cust");
        let (step_type, config) = original.to_stored();

        assert_eq!(step_type, "branch");
        assert_eq!(StepConfig::parse(&step_type, config), original);
    }

    #[test]
    fn test_with_step_assigns_sort_order() {
        let workflow = Workflow::new("Welcome", "form_submitted")
            .with_step(StepConfig::send_message("hello"))
            .with_step(StepConfig::delay("1 Day"));

        assert_eq!(workflow.steps[0].sort_order, 0);
        assert_eq!(workflow.steps[1].sort_order, 1);
        assert!(workflow.steps.iter().all(|s| s.workflow_id == workflow.id));
        assert_eq!(workflow.steps[1].label(1), "Step 2: delay");
    }

    #[test]
    fn test_sort_steps_tolerates_gaps() {
        let mut workflow = Workflow::new("Gaps", "manual");
        let id = workflow.id;
        workflow.steps = vec![
            WorkflowStep::from_stored(Uuid::now_v7(), id, "delay", json!({}), 30),
            WorkflowStep::from_stored(Uuid::now_v7(), id, "generate", json!({"prompt": "p"}), 5),
        ];

        workflow.sort_steps();

        assert_eq!(workflow.steps[0].step_type(), "generate");
        assert_eq!(workflow.steps[1].step_type(), "delay");
    }
}
