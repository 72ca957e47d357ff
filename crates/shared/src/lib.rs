pub mod files;
pub mod ids;

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;
    use std::time::Duration;

    /// Per-user config directory holding `settings.json` and the chat history.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com.local", "Chat Widget", "ChatWidget")
            .map(|p| p.config_dir().to_path_buf())
    }

    fn default_base_url() -> String {
        "http://127.0.0.1:8000".into()
    }

    fn default_user_id() -> String {
        "user-default".into()
    }

    fn default_timeout_secs() -> u64 {
        120
    }

    fn default_preview_dimension() -> u32 {
        256
    }

    /// Settings for the chat widget, stored as `settings.json` in the config dir.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatSettings {
        /// Base URL of the chat API; the query endpoint is `{base}/chat/query`
        #[serde(default = "default_base_url")]
        pub api_base_url: String,
        /// Sent with every query as `userId`
        #[serde(default = "default_user_id")]
        pub user_id: String,
        /// Maximum number of staged attachments (None = unlimited)
        #[serde(default)]
        pub max_files: Option<usize>,
        /// Maximum size of a single attachment in MB (None = unlimited)
        #[serde(default)]
        pub max_file_size_mb: Option<u64>,
        /// Accepted MIME types or extensions (".pdf" or "pdf"); empty accepts everything
        #[serde(default)]
        pub allowed_types: Vec<String>,
        #[serde(default = "default_timeout_secs")]
        pub request_timeout_secs: u64,
        /// Longest edge of generated image previews, in pixels
        #[serde(default = "default_preview_dimension")]
        pub preview_max_dimension: u32,
    }

    impl ChatSettings {
        pub fn request_timeout(&self) -> Duration {
            Duration::from_secs(self.request_timeout_secs.max(1))
        }
    }

    impl Default for ChatSettings {
        fn default() -> Self {
            Self {
                api_base_url: default_base_url(),
                user_id: default_user_id(),
                max_files: None,
                max_file_size_mb: None,
                allowed_types: vec![],
                request_timeout_secs: default_timeout_secs(),
                preview_max_dimension: default_preview_dimension(),
            }
        }
    }
}

pub mod chat_api {
    use serde::{Deserialize, Serialize};

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

    /// One entry of the conversation history. Never edited after creation.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub id: String,
        pub role: Role,
        pub content: String,
        /// Creation time, milliseconds since the Unix epoch
        pub timestamp: i64,
    }
}
