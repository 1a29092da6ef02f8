//! Background request workers.
//!
//! Each dispatch spawns a thread that owns a local tokio runtime,
//! `block_on`s the backend call, and reports exactly one outcome over an
//! mpsc channel. The UI thread polls the channel every frame and remains
//! the only mutator of application state.

use backend::{BackendClient, BackendError, ChatTransport};
use shared::api::{AppConfig, ChatMessage, ChatRequest, ImageRequest, ModelCatalog, Role, Usage};
use shared::settings::{AppSettings, ChatSettings};
use std::sync::mpsc::Sender;

use crate::sessions::Agent;

/// Sampling parameters the client always sends with chat requests.
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 2000;

/// Result of one chat dispatch.
#[derive(Debug, PartialEq)]
pub enum ChatOutcome {
    /// Assistant reply to append to the session.
    Reply(String),
    /// HTTP 429: nothing is appended; the detail is surfaced in an alert
    /// and the settings panel opens so the user can add a key.
    QuotaExceeded(String),
    /// Shown inline as an assistant-role message.
    Error(String),
}

/// Map a transport result onto the outcome the UI applies.
pub fn chat_outcome(result: Result<String, BackendError>) -> ChatOutcome {
    match result {
        Ok(content) => ChatOutcome::Reply(content),
        Err(BackendError::QuotaExceeded { detail }) => ChatOutcome::QuotaExceeded(detail),
        Err(BackendError::Api { detail, .. }) => {
            let detail = if detail.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                detail
            };
            ChatOutcome::Error(format!("Error: {detail}"))
        }
        Err(BackendError::Transport(err)) => ChatOutcome::Error(format!("Error: {err}")),
    }
}

/// Issue exactly one request for the session, routed by agent.
pub async fn dispatch_chat(
    transport: &impl ChatTransport,
    agent: Agent,
    messages: &[ChatMessage],
    overrides: &ChatSettings,
) -> ChatOutcome {
    let result = match agent {
        Agent::Counselor => {
            // The persona route only takes the newest prompt; the agent
            // configured on the backend holds its own context.
            let prompt = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            transport.agent_completion(&prompt).await
        }
        Agent::Default => {
            let req = ChatRequest {
                messages: messages.to_vec(),
                model: overrides.model.clone(),
                temperature: TEMPERATURE,
                max_tokens: MAX_TOKENS,
                endpoint_url: overrides.endpoint_url.clone(),
                api_key: overrides.api_key.clone(),
            };
            transport.chat(&req).await
        }
    };
    chat_outcome(result)
}

pub fn run_chat_request(
    client: BackendClient,
    agent: Agent,
    messages: Vec<ChatMessage>,
    overrides: ChatSettings,
    tx: Sender<ChatOutcome>,
) {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = tx.send(ChatOutcome::Error(format!(
                "Error: failed to start async runtime: {e}"
            )));
            return;
        }
    };
    let outcome = rt.block_on(dispatch_chat(&client, agent, &messages, &overrides));
    let _ = tx.send(outcome);
}

/// Result of one image generation dispatch.
#[derive(Debug)]
pub enum ImageOutcome {
    Images(Vec<FetchedImage>),
    /// Surfaced as an alert; the gallery is left as it was.
    Error(String),
}

/// A generated image reference, with its bytes when the download worked.
/// Texture decoding happens on the UI thread.
#[derive(Debug)]
pub struct FetchedImage {
    pub url: String,
    pub bytes: Option<Vec<u8>>,
}

/// Effective image request, resolved image-specific setting first, then
/// the chat setting, then the hard-coded default.
pub fn resolve_image_request(prompt: &str, settings: &AppSettings) -> ImageRequest {
    let endpoint_url = if settings.image.endpoint_url.trim().is_empty() {
        settings.chat.endpoint_url.clone()
    } else {
        settings.image.endpoint_url.clone()
    };
    let api_key = if settings.image.api_key.trim().is_empty() {
        settings.chat.api_key.clone()
    } else {
        settings.image.api_key.clone()
    };
    let model = if settings.image.model.trim().is_empty() {
        "qwen-image-plus".to_string()
    } else {
        settings.image.model.clone()
    };
    let size = if settings.image.size.trim().is_empty() {
        "1024*1024".to_string()
    } else {
        settings.image.size.clone()
    };
    let api_type = if endpoint_url.contains("dashscope") {
        "aliyun_multimodal"
    } else {
        "openai"
    };

    ImageRequest {
        prompt: prompt.to_string(),
        model,
        size,
        n: 1,
        api_key,
        endpoint_url,
        api_type: api_type.to_string(),
    }
}

pub fn run_image_request(client: BackendClient, req: ImageRequest, tx: Sender<ImageOutcome>) {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = tx.send(ImageOutcome::Error(format!(
                "Error: failed to start async runtime: {e}"
            )));
            return;
        }
    };

    let outcome = rt.block_on(async {
        match client.generate_image(&req).await {
            Ok(refs) => {
                let mut fetched = Vec::with_capacity(refs.len());
                for image in refs {
                    let bytes = client.download(&image.url).await.ok();
                    fetched.push(FetchedImage {
                        url: image.url,
                        bytes,
                    });
                }
                ImageOutcome::Images(fetched)
            }
            Err(err) => ImageOutcome::Error(image_error_text(err)),
        }
    });
    let _ = tx.send(outcome);
}

fn image_error_text(err: BackendError) -> String {
    match err {
        BackendError::QuotaExceeded { detail } | BackendError::Api { detail, .. } => {
            if detail.trim().is_empty() {
                "Error: Failed to generate image".to_string()
            } else {
                format!("Error: {detail}")
            }
        }
        BackendError::Transport(e) => format!("Error: {e}"),
    }
}

/// Fetch app config; on failure the sender is simply dropped and the
/// defaults stay in place.
pub fn run_config_fetch(client: BackendClient, tx: Sender<AppConfig>) {
    let Ok(rt) = tokio::runtime::Runtime::new() else {
        return;
    };
    match rt.block_on(client.fetch_config()) {
        Ok(config) => {
            let _ = tx.send(config);
        }
        Err(err) => tracing::warn!(%err, "failed to load app config"),
    }
}

/// Fetch quota usage; a dropped sender hides the quota display.
pub fn run_usage_fetch(client: BackendClient, tx: Sender<Usage>) {
    let Ok(rt) = tokio::runtime::Runtime::new() else {
        return;
    };
    match rt.block_on(client.fetch_usage()) {
        Ok(usage) => {
            let _ = tx.send(usage);
        }
        Err(err) => tracing::debug!(%err, "failed to fetch usage"),
    }
}

/// Fetch the model catalog for the settings panel.
pub fn run_models_fetch(client: BackendClient, tx: Sender<ModelCatalog>) {
    let Ok(rt) = tokio::runtime::Runtime::new() else {
        return;
    };
    match rt.block_on(client.fetch_models()) {
        Ok(catalog) => {
            let _ = tx.send(catalog);
        }
        Err(err) => tracing::debug!(%err, "failed to fetch model catalog"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn replies_map_to_reply() {
        assert_eq!(
            chat_outcome(Ok("hi".to_string())),
            ChatOutcome::Reply("hi".to_string())
        );
    }

    #[test]
    fn quota_errors_keep_the_server_detail() {
        let err = BackendError::QuotaExceeded {
            detail: "limit reached".to_string(),
        };
        assert_eq!(
            chat_outcome(Err(err)),
            ChatOutcome::QuotaExceeded("limit reached".to_string())
        );
    }

    #[test]
    fn api_errors_become_inline_error_text() {
        let err = BackendError::Api {
            status: 500,
            detail: "boom".to_string(),
        };
        assert_eq!(
            chat_outcome(Err(err)),
            ChatOutcome::Error("Error: boom".to_string())
        );

        let blank = BackendError::Api {
            status: 500,
            detail: "  ".to_string(),
        };
        assert_eq!(
            chat_outcome(Err(blank)),
            ChatOutcome::Error("Error: Unknown error".to_string())
        );
    }

    #[derive(Default)]
    struct RecordingTransport {
        chats: Mutex<Vec<ChatRequest>>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn chat(&self, req: &ChatRequest) -> Result<String, BackendError> {
            self.chats.lock().unwrap().push(req.clone());
            Ok("chat reply".to_string())
        }

        async fn agent_completion(&self, prompt: &str) -> Result<String, BackendError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("agent reply".to_string())
        }
    }

    #[tokio::test]
    async fn default_agent_sends_the_whole_conversation() {
        let transport = RecordingTransport::default();
        let messages = vec![
            ChatMessage::new(Role::User, "Hello"),
            ChatMessage::new(Role::Assistant, "Hi"),
            ChatMessage::new(Role::User, "More"),
        ];
        let overrides = ChatSettings {
            model: "qwen-max".to_string(),
            api_key: "k".to_string(),
            endpoint_url: "https://e".to_string(),
        };

        let outcome = dispatch_chat(&transport, Agent::Default, &messages, &overrides).await;

        assert_eq!(outcome, ChatOutcome::Reply("chat reply".to_string()));
        let chats = transport.chats.lock().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].messages.len(), 3);
        assert_eq!(chats[0].model, "qwen-max");
        assert_eq!(chats[0].max_tokens, 2000);
        assert!(transport.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn counselor_sends_only_the_newest_prompt() {
        let transport = RecordingTransport::default();
        let messages = vec![
            ChatMessage::new(Role::User, "first"),
            ChatMessage::new(Role::Assistant, "reply"),
            ChatMessage::new(Role::User, "latest worry"),
        ];

        let outcome = dispatch_chat(
            &transport,
            Agent::Counselor,
            &messages,
            &ChatSettings::default(),
        )
        .await;

        assert_eq!(outcome, ChatOutcome::Reply("agent reply".to_string()));
        assert!(transport.chats.lock().unwrap().is_empty());
        assert_eq!(
            *transport.prompts.lock().unwrap(),
            vec!["latest worry".to_string()]
        );
    }

    #[test]
    fn image_config_falls_back_to_chat_settings() {
        let mut settings = AppSettings::default();
        settings.chat.api_key = "chat-key".to_string();
        settings.chat.endpoint_url = "https://chat.example".to_string();
        settings.image.endpoint_url = String::new();
        settings.image.api_key = String::new();

        let req = resolve_image_request("a cat", &settings);
        assert_eq!(req.endpoint_url, "https://chat.example");
        assert_eq!(req.api_key, "chat-key");
        assert_eq!(req.model, "qwen-image-plus");
        assert_eq!(req.size, "1024*1024");
        assert_eq!(req.api_type, "openai");
        assert_eq!(req.n, 1);
    }

    #[test]
    fn dashscope_endpoints_select_the_multimodal_api_type() {
        let mut settings = AppSettings::default();
        settings.image.endpoint_url =
            "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation"
                .to_string();
        let req = resolve_image_request("a cat", &settings);
        assert_eq!(req.api_type, "aliyun_multimodal");
    }
}
