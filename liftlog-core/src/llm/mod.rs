mod ollama_chat;
mod openai_chat;

use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::config::{Config, LlmProvider};
use crate::session::Message;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const STREAM_BUFFER: usize = 64;

pub(crate) fn strip_code_fences(s: &str) -> &str {
    let mut trimmed = s.trim();
    if let Some(stripped) = trimmed.strip_prefix("```json") {
        trimmed = stripped;
    } else if let Some(stripped) = trimmed.strip_prefix("```") {
        trimmed = stripped;
    }
    if let Some(stripped) = trimmed.strip_suffix("```") {
        trimmed = stripped;
    }
    trimmed.trim()
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// The model's request to run a tool. `arguments` is raw JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    ToolCall(ToolInvocation),
    Finished,
}

/// Events of one model response. Every wait is bounded by the client timeout.
pub struct ModelStream {
    rx: mpsc::Receiver<Result<ModelEvent>>,
    timeout: Duration,
}

impl ModelStream {
    fn new(rx: mpsc::Receiver<Result<ModelEvent>>, timeout: Duration) -> Self {
        Self { rx, timeout }
    }

    /// `Ok(None)` once the backend has nothing more to send.
    pub async fn next(&mut self) -> Result<Option<ModelEvent>> {
        match timeout(self.timeout, self.rx.recv()).await {
            Err(_) => Err(anyhow!(
                "Language model did not respond within {}s",
                self.timeout.as_secs_f32()
            )),
            Ok(None) => Ok(None),
            Ok(Some(event)) => event.map(Some),
        }
    }
}

/// What the mock backend answers with.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    Tool {
        name: String,
        arguments: serde_json::Value,
    },
    Fail(String),
    /// Never answers; for exercising timeouts.
    Stall,
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        MockReply::Text(s.into())
    }

    pub fn tool(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        MockReply::Tool {
            name: name.into(),
            arguments,
        }
    }
}

type MockFn = Arc<dyn Fn(&[Message]) -> MockReply + Send + Sync>;

enum LlmBackend {
    OpenAi {
        model: String,
        credentials: ::openai::Credentials,
    },
    Ollama {
        model: String,
        client: Arc<ollama_rs::Ollama>,
    },
    Mock {
        responder: MockFn,
    },
}

pub struct LlmInterface {
    backend: LlmBackend,
    timeout: Duration,
}

impl LlmInterface {
    pub fn new_openai(api_key: &str, model: &str) -> Self {
        info!("LlmInterface::new_openai selected model={}", model);
        Self {
            backend: LlmBackend::OpenAi {
                model: model.to_string(),
                credentials: ::openai::Credentials::new(api_key, ""),
            },
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn new_ollama(host: &str, port: u16, model: &str) -> Self {
        info!(
            "LlmInterface::new_ollama selected model={} host={}:{}",
            model, host, port
        );
        Self {
            backend: LlmBackend::Ollama {
                model: model.to_string(),
                client: Arc::new(ollama_rs::Ollama::new(host.to_string(), port)),
            },
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn new_mock_fn(f: impl Fn(&[Message]) -> MockReply + Send + Sync + 'static) -> Self {
        debug!("LlmInterface::new_mock_fn creating mock backend");
        Self {
            backend: LlmBackend::Mock {
                responder: Arc::new(f),
            },
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let llm = match &config.llm {
            LlmProvider::OpenAi { api_key } => Self::new_openai(api_key, &config.model),
            LlmProvider::Ollama { host, port } => Self::new_ollama(host, *port, &config.model),
        };
        llm.with_timeout(config.request_timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn describe(&self) -> String {
        match &self.backend {
            LlmBackend::OpenAi { model, .. } => format!("openai({})", model),
            LlmBackend::Ollama { model, .. } => format!("ollama({})", model),
            LlmBackend::Mock { .. } => "mock".to_string(),
        }
    }

    /// Sends the conversation and streams back the model's answer.
    pub async fn generate(
        &self,
        history: &[Message],
        system_prompt: &str,
        tools: &[ToolSpec],
    ) -> Result<ModelStream> {
        debug!(
            "LlmInterface::generate invoked backend={} history_len={} tools={}",
            self.describe(),
            history.len(),
            tools.len()
        );
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        match &self.backend {
            LlmBackend::OpenAi { model, credentials } => {
                let deltas = timeout(
                    self.timeout,
                    openai_chat::open_stream(model, credentials.clone(), history, system_prompt, tools),
                )
                .await
                .map_err(|_| {
                    error!("Model connection timed out backend={}", self.describe());
                    anyhow!(
                        "Language model did not respond within {}s",
                        self.timeout.as_secs_f32()
                    )
                })??;
                tokio::spawn(openai_chat::pump(deltas, tx));
            }
            LlmBackend::Ollama { model, client } => {
                let event = timeout(
                    self.timeout,
                    ollama_chat::complete(client, model, history, system_prompt, tools),
                )
                .await
                .map_err(|_| {
                    error!("Ollama call timed out backend={}", self.describe());
                    anyhow!(
                        "Language model did not respond within {}s",
                        self.timeout.as_secs_f32()
                    )
                })??;
                // The receiver is still held here and the buffer fits both events.
                let _ = tx.send(Ok(event)).await;
                let _ = tx.send(Ok(ModelEvent::Finished)).await;
            }
            LlmBackend::Mock { responder } => {
                let reply = responder(history);
                debug!("Mock LLM responder invoked reply={:?}", reply);
                match reply {
                    MockReply::Fail(msg) => return Err(anyhow!(msg)),
                    reply => {
                        tokio::spawn(play_mock(reply, tx));
                    }
                }
            }
        }

        Ok(ModelStream::new(rx, self.timeout))
    }

    pub async fn generate_with_retry(
        &self,
        history: &[Message],
        system_prompt: &str,
        tools: &[ToolSpec],
        max_attempts: usize,
        base_delay: Duration,
    ) -> Result<ModelStream> {
        if max_attempts == 0 {
            return Err(anyhow!("max_attempts must be >= 1"));
        }
        let mut attempt: usize = 0;
        loop {
            attempt += 1;
            debug!(
                "generate_with_retry attempt={} max_attempts={}",
                attempt, max_attempts
            );
            match self.generate(history, system_prompt, tools).await {
                Ok(stream) => {
                    debug!("generate_with_retry succeeded on attempt={}", attempt);
                    return Ok(stream);
                }
                Err(e) => {
                    warn!("generate failed on attempt {}: {}", attempt, e);
                    if attempt >= max_attempts {
                        error!("generate_with_retry exhausted attempts={}", attempt);
                        return Err(e);
                    }
                    let cap_shift = ((attempt - 1) as u32).min(20);
                    let exp = 1u128 << cap_shift;
                    let base_ms = base_delay.as_millis();
                    let delay_ms = base_ms.saturating_mul(exp);
                    let jitter = ((attempt as u64).wrapping_mul(37) % 100) as u128;
                    let total_ms = delay_ms.saturating_add(jitter);
                    let sleep_ms = u64::try_from(total_ms).unwrap_or(u64::MAX);
                    debug!(
                        "generate_with_retry sleeping ms={} before next attempt",
                        sleep_ms
                    );
                    sleep(Duration::from_millis(sleep_ms)).await;
                }
            }
        }
    }
}

async fn play_mock(reply: MockReply, tx: mpsc::Sender<Result<ModelEvent>>) {
    match reply {
        MockReply::Text(text) => {
            for chunk in text.split_inclusive(' ') {
                if tx.send(Ok(ModelEvent::TextDelta(chunk.to_string()))).await.is_err() {
                    return;
                }
            }
        }
        MockReply::Tool { name, arguments } => {
            let invocation = ToolInvocation {
                name,
                arguments: arguments.to_string(),
            };
            if tx.send(Ok(ModelEvent::ToolCall(invocation))).await.is_err() {
                return;
            }
        }
        MockReply::Stall => {
            sleep(Duration::from_secs(3600)).await;
            return;
        }
        MockReply::Fail(msg) => {
            let _ = tx.send(Err(anyhow!(msg))).await;
            return;
        }
    }
    let _ = tx.send(Ok(ModelEvent::Finished)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn drain(stream: &mut ModelStream) -> Result<Vec<ModelEvent>> {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await? {
            events.push(event);
        }
        Ok(events)
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[tokio::test]
    async fn mock_text_is_streamed_in_chunks() {
        let llm = LlmInterface::new_mock_fn(|_| MockReply::text("You got this"));
        let mut stream = llm.generate(&[], "system", &[]).await.unwrap();
        let events = drain(&mut stream).await.unwrap();
        assert_eq!(
            events,
            vec![
                ModelEvent::TextDelta("You ".into()),
                ModelEvent::TextDelta("got ".into()),
                ModelEvent::TextDelta("this".into()),
                ModelEvent::Finished,
            ]
        );
    }

    #[tokio::test]
    async fn mock_sees_the_history() {
        let llm = LlmInterface::new_mock_fn(|history| match history.last() {
            Some(m) if m.content.contains("workouts") => {
                MockReply::tool("view_all_workouts", serde_json::json!({}))
            }
            _ => MockReply::text("?"),
        });
        let history = vec![Message::user("Show me all of my workouts")];
        let mut stream = llm.generate(&history, "system", &[]).await.unwrap();
        match stream.next().await.unwrap() {
            Some(ModelEvent::ToolCall(call)) => {
                assert_eq!(call.name, "view_all_workouts");
                assert_eq!(call.arguments, "{}");
            }
            other => panic!("expected a tool call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stalled_streams_time_out() {
        let llm = LlmInterface::new_mock_fn(|_| MockReply::Stall)
            .with_timeout(Duration::from_millis(20));
        let mut stream = llm.generate(&[], "system", &[]).await.unwrap();
        assert!(stream.next().await.is_err());
    }

    #[tokio::test]
    async fn retry_stops_after_the_first_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let llm = LlmInterface::new_mock_fn(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                MockReply::Fail("connection reset".into())
            } else {
                MockReply::text("ok")
            }
        });
        let mut stream = llm
            .generate_with_retry(&[], "system", &[], 3, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(drain(&mut stream).await.unwrap().len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_gives_up() {
        let llm = LlmInterface::new_mock_fn(|_| MockReply::Fail("down".into()));
        let err = llm
            .generate_with_retry(&[], "system", &[], 2, Duration::from_millis(1))
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "down");
    }
}
