pub mod api {
    //! Wire contract consumed from the backend proxy.

    use serde::{Deserialize, Serialize};

    /// Author of a chat message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
    }

    impl Role {
        pub fn as_str(&self) -> &'static str {
            match self {
                Role::User => "user",
                Role::Assistant => "assistant",
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: Role,
        pub content: String,
    }

    impl ChatMessage {
        pub fn new(role: Role, content: impl Into<String>) -> Self {
            Self {
                role,
                content: content.into(),
            }
        }
    }

    /// Body for `POST /api/chat`. Empty strings for model/key/endpoint
    /// mean "use the backend's defaults".
    #[derive(Debug, Clone, Serialize)]
    pub struct ChatRequest {
        pub messages: Vec<ChatMessage>,
        pub model: String,
        pub temperature: f32,
        pub max_tokens: u32,
        pub endpoint_url: String,
        pub api_key: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct ChatResponse {
        pub message: ReplyMessage,
    }

    /// The assistant message inside a chat or agent-completion reply.
    #[derive(Debug, Deserialize)]
    pub struct ReplyMessage {
        pub content: String,
    }

    /// Body for `POST /api/agent-completion`.
    #[derive(Debug, Clone, Serialize)]
    pub struct AgentRequest {
        pub input: AgentInput,
        pub parameters: serde_json::Value,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct AgentInput {
        pub prompt: String,
    }

    /// Body for `POST /api/generate-image`.
    #[derive(Debug, Clone, Serialize)]
    pub struct ImageRequest {
        pub prompt: String,
        pub model: String,
        pub size: String,
        pub n: u32,
        pub api_key: String,
        pub endpoint_url: String,
        pub api_type: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct ImageResponse {
        #[serde(default)]
        pub images: Vec<ImageRef>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ImageRef {
        pub url: String,
    }

    fn default_daily_limit() -> u32 {
        10
    }

    /// Payload of `GET /api/config`.
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AppConfig {
        pub app_name: String,
        pub app_name_en: String,
        #[serde(default = "default_daily_limit")]
        pub daily_free_limit: u32,
    }

    /// Payload of `GET /api/usage`.
    #[derive(Debug, Clone, Copy, Deserialize)]
    pub struct Usage {
        pub used: u32,
        pub limit: u32,
        pub remaining: u32,
    }

    /// Model catalog from `GET /api/models`, keyed by provider.
    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct ModelCatalog {
        #[serde(default)]
        pub aliyun: Vec<ModelInfo>,
        #[serde(default)]
        pub openai: Vec<ModelInfo>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ModelInfo {
        pub id: String,
        pub name: String,
    }

    /// Error payload the backend attaches to non-success statuses.
    #[derive(Debug, Deserialize)]
    pub struct ErrorDetail {
        pub detail: String,
    }
}

pub mod settings {
    use serde::{Deserialize, Serialize};

    fn default_server_url() -> String {
        "http://127.0.0.1:8000".to_string()
    }

    fn default_theme() -> String {
        "dark".to_string()
    }

    fn default_language() -> String {
        "zh".to_string()
    }

    fn default_image_model() -> String {
        "qwen-image-plus".to_string()
    }

    fn default_image_size() -> String {
        "1024*1024".to_string()
    }

    /// Chat overrides forwarded with every request. Empty strings fall
    /// through to the backend's configured defaults.
    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct ChatSettings {
        #[serde(default)]
        pub model: String,
        #[serde(default)]
        pub api_key: String,
        #[serde(default)]
        pub endpoint_url: String,
    }

    /// Image generation configuration, independent of chat.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ImageSettings {
        #[serde(default)]
        pub endpoint_url: String,
        #[serde(default)]
        pub api_key: String,
        #[serde(default = "default_image_model")]
        pub model: String,
        #[serde(default = "default_image_size")]
        pub size: String,
    }

    impl Default for ImageSettings {
        fn default() -> Self {
            Self {
                endpoint_url: String::new(),
                api_key: String::new(),
                model: default_image_model(),
                size: default_image_size(),
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        #[serde(default = "default_server_url")]
        pub server_url: String,
        #[serde(default = "default_theme")]
        pub theme: String,
        #[serde(default = "default_language")]
        pub language: String,
        #[serde(default)]
        pub chat: ChatSettings,
        #[serde(default)]
        pub image: ImageSettings,
    }

    impl AppSettings {
        pub fn dark_mode(&self) -> bool {
            self.theme != "light"
        }
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                server_url: default_server_url(),
                theme: default_theme(),
                language: default_language(),
                chat: ChatSettings::default(),
                image: ImageSettings::default(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::api::*;
    use super::settings::AppSettings;

    #[test]
    fn config_parses_backend_casing() {
        let json = r#"{"appName":"多云聊天平台","appNameEn":"Multi-Cloud Chat","dailyFreeLimit":10}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.app_name_en, "Multi-Cloud Chat");
        assert_eq!(config.daily_free_limit, 10);
    }

    #[test]
    fn config_defaults_missing_limit() {
        let json = r#"{"appName":"a","appNameEn":"b"}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.daily_free_limit, 10);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::new(Role::User, "hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn settings_tolerate_unknown_and_missing_fields() {
        // Older settings files carry fewer keys; parsing must not fail.
        let parsed: AppSettings = serde_json::from_str(r#"{"theme":"light"}"#).unwrap();
        assert_eq!(parsed.theme, "light");
        assert_eq!(parsed.language, "zh");
        assert_eq!(parsed.image.size, "1024*1024");
        assert!(!parsed.dark_mode());
    }
}
