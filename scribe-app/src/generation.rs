use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;

const EDIT_SYSTEM_PROMPT: &str = "You are an expert programming assistant. Always respond with only the modified code, no explanations. If you need to show changes, use code comments.";
const EXPLAIN_SYSTEM_PROMPT: &str =
    "You are an expert programming teacher. Explain the code clearly and concisely.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// What the command loop needs from a language model.
pub trait Assistant {
    fn code_edit(&self, prompt: &str, code: &str) -> Result<String>;

    fn explain(&self, code: &str, language: &str) -> Result<String>;
}

pub fn code_edit_messages(prompt: &str, code: &str) -> Vec<Message> {
    vec![
        Message::system(EDIT_SYSTEM_PROMPT),
        Message::user(format!(
            "Current code:\n```\n{code}\n```\n\nTask: {prompt}\n\nReturn only the modified code:"
        )),
    ]
}

pub fn explain_messages(code: &str, language: &str) -> Vec<Message> {
    vec![
        Message::system(EXPLAIN_SYSTEM_PROMPT),
        Message::user(format!(
            "Explain this {language} code:\n```{language}\n{code}\n```"
        )),
    ]
}

/// Unwrap a reply that is one fenced code block, e.g. "```rust\n...\n```".
/// Anything else is returned untouched.
pub fn strip_code_fence(text: &str) -> String {
    let fenced = text
        .trim()
        .strip_prefix("```")
        .and_then(|rest| rest.split_once('\n'))
        .and_then(|(_info, body)| body.trim_end().strip_suffix("```"))
        .filter(|body| !body.contains("```"));
    match fenced {
        Some(body) => body.to_string(),
        None => text.to_string(),
    }
}

/// Blocking client for an OpenAI compatible chat completion endpoint.
pub struct GenerationClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl GenerationClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout);
        if !config.proxy.is_empty() {
            let proxy = reqwest::Proxy::all(&config.proxy)?;
            client = client.proxy(proxy);
        }
        let client = client.build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One blocking request, returning the first choice's text.
    pub fn chat(&self, messages: &[Message]) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        debug!(model = %self.model, messages = messages.len(), "requesting completion");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .context("failed to send request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            bail!("API error: {status} - {body}");
        }

        let response: ChatCompletionResponse =
            resp.json().context("failed to decode response")?;
        first_choice(response)
    }
}

impl Assistant for GenerationClient {
    fn code_edit(&self, prompt: &str, code: &str) -> Result<String> {
        self.chat(&code_edit_messages(prompt, code))
    }

    fn explain(&self, code: &str, language: &str) -> Result<String> {
        self.chat(&explain_messages(code, language))
    }
}

fn first_choice(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("no choices in response"))
}
