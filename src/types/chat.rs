use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 聊天端点请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// 其余参数原样透传给提供商
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// 验证请求参数范围
    pub fn validate(&self) -> Result<(), String> {
        if let Some(temp) = self.temperature {
            if !(0.0..=2.0).contains(&temp) {
                return Err(format!(
                    "temperature must be between 0.0 and 2.0, got {}",
                    temp
                ));
            }
        }

        if let Some(top_p) = self.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(format!("top_p must be between 0.0 and 1.0, got {}", top_p));
            }
        }

        if self.messages.is_empty() {
            return Err("messages must not be empty".to_string());
        }

        Ok(())
    }
}

/// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
impl Message {
    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub(crate) fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// 聊天响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

/// Token 使用统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// 流式响应数据块
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatStreamChunk {
    pub fn delta(
        id: impl Into<String>,
        model: impl Into<String>,
        content: Option<String>,
        finish_reason: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            object: "chat.completion.chunk".to_string(),
            created: super::unix_now(),
            model: model.into(),
            choices: vec![StreamChoice {
                index: 0,
                delta: Delta {
                    role: None,
                    content,
                },
                finish_reason,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            messages,
            temperature: None,
            max_tokens: None,
            stream: false,
            top_p: None,
            stop: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_chat_request_deserialization() {
        let json = r#"{
            "messages": [{"role": "user", "content": "Hello"}],
            "temperature": 0.8,
            "stream": true,
            "n": 2
        }"#;

        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.temperature, Some(0.8));
        assert!(req.stream);
        assert_eq!(req.extra["n"], 2);
    }

    #[test]
    fn test_stream_defaults_to_false() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"messages": [{"role": "user", "content": "hi"}]}"#).unwrap();
        assert!(!req.stream);
    }

    #[test]
    fn test_validate() {
        assert!(request(vec![Message::user("test")]).validate().is_ok());
        assert!(request(vec![]).validate().is_err());

        let mut req = request(vec![Message::user("test")]);
        req.temperature = Some(3.0);
        assert!(req.validate().is_err());

        let mut req = request(vec![Message::user("test")]);
        req.top_p = Some(1.5);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_stream_chunk_skips_empty_delta_fields() {
        let chunk = ChatStreamChunk::delta("c-1", "gpt-4", Some("Hi".into()), None);
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("\"delta\":{\"content\":\"Hi\"}"));
        assert!(json.contains("\"object\":\"chat.completion.chunk\""));
    }
}
