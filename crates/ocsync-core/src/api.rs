//! Request and response records for the server's REST endpoints.
//!
//! These are plain wire shapes. Issuing the requests is left to the caller's
//! HTTP layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Server health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Primary,
    Subagent,
    All,
}

/// An agent configured on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAgent {
    pub name: String,
    pub mode: AgentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<bool>,
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

impl ServerAgent {
    /// Whether users can pick this agent directly.
    pub fn is_primary(&self) -> bool {
        matches!(self.mode, AgentMode::Primary | AgentMode::All)
    }
}

/// Body of the create-session call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "parentID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl CreateSessionRequest {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Provider/model pair selecting the model for a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    #[serde(rename = "providerID")]
    pub provider_id: String,
    #[serde(rename = "modelID")]
    pub model_id: String,
}

/// Body of the send-prompt call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub parts: Vec<PromptPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelSelection>,
    #[serde(rename = "noReply", default, skip_serializing_if = "Option::is_none")]
    pub no_reply: Option<bool>,
}

impl PromptRequest {
    /// A prompt consisting of a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_parts(vec![PromptPart::Text { text: text.into() }])
    }

    pub fn from_parts(parts: Vec<PromptPart>) -> Self {
        Self {
            parts,
            agent: None,
            model: None,
            no_reply: None,
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_model(mut self, provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        self.model = Some(ModelSelection {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        });
        self
    }
}

/// Input part of a prompt. Images travel as `file` parts with a data URL.
///
/// Unlike message parts, an unrecognised `type` here is a decode error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptPart {
    Text {
        text: String,
    },
    File {
        url: String,
        mime: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

impl PromptPart {
    /// Build an image part from base64 data without the data-URL prefix.
    pub fn image(
        base64_data: &str,
        media_type: impl Into<String>,
        filename: Option<String>,
    ) -> Self {
        let mime = media_type.into();
        PromptPart::File {
            url: format!("data:{};base64,{}", mime, base64_data),
            mime,
            filename,
        }
    }
}

/// `GET /path`: the server's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

/// Server-side configuration relevant to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "defaultAgent", default, skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
}

/// `GET /provider`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderListResponse {
    pub all: Vec<Provider>,
    /// Default model id per provider id
    #[serde(default)]
    pub default: HashMap<String, String>,
    #[serde(default)]
    pub connected: Vec<String>,
}

impl ProviderListResponse {
    /// Every model of every connected provider, sorted by provider then model name.
    pub fn connected_models(&self) -> Vec<ModelRef> {
        let mut models: Vec<ModelRef> = self
            .all
            .iter()
            .filter(|p| self.connected.contains(&p.id))
            .flat_map(|p| p.models.values().map(move |m| ModelRef::new(p, m)))
            .collect();
        models.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        models
    }

    /// The server's default model for a provider.
    pub fn default_model(&self, provider_id: &str) -> Option<&str> {
        self.default.get(provider_id).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    /// Models keyed by model id
    #[serde(default)]
    pub models: HashMap<String, ProviderModel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderModel {
    pub id: String,
    pub name: String,
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<ModelLimit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<u64>,
}

/// A selectable model, identified as `provider/model`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef {
    pub provider_id: String,
    pub model_id: String,
    pub display_name: String,
}

impl ModelRef {
    pub fn new(provider: &Provider, model: &ProviderModel) -> Self {
        Self {
            provider_id: provider.id.clone(),
            model_id: model.id.clone(),
            display_name: format!("{} - {}", provider.name, model.name),
        }
    }

    pub fn id(&self) -> String {
        format!("{}/{}", self.provider_id, self.model_id)
    }

    /// Selection record for a [`PromptRequest`].
    pub fn selection(&self) -> ModelSelection {
        ModelSelection {
            provider_id: self.provider_id.clone(),
            model_id: self.model_id.clone(),
        }
    }
}
