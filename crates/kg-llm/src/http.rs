use crate::client::LlmClient;
use crate::error::Error;

/// Talks to an OpenAI-compatible chat-completions endpoint over HTTP. This
/// is the one concrete [`LlmClient`] implementation; workers are generic
/// over the trait so tests can substitute a stub, but production wiring
/// always wraps one of these in a [`crate::RetryingClient`].
pub struct HttpClient {
    http: reqwest::Client,
    endpoint: url::Url,
    api_key: String,
    model: String,
}

impl HttpClient {
    pub fn new(http: reqwest::Client, endpoint: url::Url, api_key: String, model: String) -> Self {
        Self {
            http,
            endpoint,
            api_key,
            model,
        }
    }
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait::async_trait]
impl LlmClient for HttpClient {
    #[tracing::instrument(skip_all, fields(prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, Error> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };

        let resp = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::Endpoint(err.into()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Endpoint(anyhow::anyhow!(
                "LLM endpoint returned {status}: {text}"
            )));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|err| Error::Endpoint(err.into()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Endpoint(anyhow::anyhow!("LLM response had no choices")))?;

        Ok(content)
    }
}
