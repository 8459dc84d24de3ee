use super::chat::Usage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 文本补全端点请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionsRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionsResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub text: String,
    pub finish_reason: Option<String>,
}

/// 流式补全数据块，`text` 为增量文本
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionsStreamChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<CompletionStreamChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionStreamChoice {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub finish_reason: Option<String>,
}

impl CompletionsStreamChunk {
    pub fn delta(
        id: impl Into<String>,
        model: impl Into<String>,
        text: Option<String>,
        finish_reason: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            object: "text_completion_chunk".to_string(),
            created: super::unix_now(),
            model: model.into(),
            choices: vec![CompletionStreamChoice {
                index: 0,
                text,
                finish_reason,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_request_deserialization() {
        let req: CompletionsRequest =
            serde_json::from_str(r#"{"prompt": "Once upon", "max_tokens": 16}"#).unwrap();
        assert_eq!(req.prompt, "Once upon");
        assert_eq!(req.max_tokens, Some(16));
        assert!(!req.stream);
    }

    #[test]
    fn test_completions_request_requires_prompt() {
        let result = serde_json::from_str::<CompletionsRequest>(r#"{"max_tokens": 16}"#);
        assert!(result.is_err());
    }
}
