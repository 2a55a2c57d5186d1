pub mod models;
pub mod sse;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::ClientConfig;
use crate::error::{ChatError, Result};
use models::{Content, GenerateContentRequest, GenerateContentResponse, Part};
use sse::SseDecoder;

/// Lazy sequence of non-empty text deltas making up one reply.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Something that can open persistent chat sessions.
pub trait ChatService {
    fn start_chat(&self) -> Box<dyn ChatSession>;
}

/// A stateful conversation handle. Every successful send is remembered, so
/// later sends carry the earlier turns as context.
#[async_trait]
pub trait ChatSession: Send {
    async fn send_message_stream(&mut self, message: &str) -> Result<FragmentStream>;
}

pub struct GeminiClient {
    config: Arc<ClientConfig>,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

impl ChatService for GeminiClient {
    fn start_chat(&self) -> Box<dyn ChatSession> {
        debug!(model = %self.config.model, "Starting Gemini chat session");
        Box::new(GeminiChat {
            config: Arc::clone(&self.config),
            client: self.client.clone(),
            history: Arc::default(),
        })
    }
}

pub struct GeminiChat {
    config: Arc<ClientConfig>,
    client: reqwest::Client,
    history: Arc<Mutex<Vec<Content>>>,
}

impl GeminiChat {
    /// Turns committed so far, oldest first.
    pub fn history(&self) -> Vec<Content> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn build_request(&self, message: &str) -> GenerateContentRequest {
        let mut contents = self.history();
        contents.push(Content::user(message));

        let system_instruction = self.config.system_instruction.as_ref().map(|text| Content {
            role: None,
            parts: vec![Part {
                text: Some(text.clone()),
            }],
        });

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: (&self.config.generation).into(),
        }
    }
}

#[async_trait]
impl ChatSession for GeminiChat {
    async fn send_message_stream(&mut self, message: &str) -> Result<FragmentStream> {
        let endpoint = self.config.stream_endpoint()?;
        let request = self.build_request(message);

        debug!(
            %endpoint,
            turns = request.contents.len(),
            "Opening Gemini stream"
        );

        let response = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            error!("Gemini API request failed with status {}: {}", status, body);
            return Err(ChatError::Api {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        let commit = HistoryCommit {
            history: Arc::clone(&self.history),
            user_turn: Content::user(message),
        };
        Ok(fragment_stream(response.bytes_stream(), commit))
    }
}

/// Pending history update, applied only when the reply streams to the end.
struct HistoryCommit {
    history: Arc<Mutex<Vec<Content>>>,
    user_turn: Content,
}

impl HistoryCommit {
    fn apply(self, reply: String) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(self.user_turn);
        history.push(Content::model(reply));
    }
}

struct StreamState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    reply: String,
    commit: Option<HistoryCommit>,
    finished: bool,
}

impl<S> StreamState<S> {
    /// Queue the fragment carried by one event. Returns false once the stream has failed.
    fn accept(&mut self, payload: &str) -> bool {
        match parse_event(payload) {
            Ok(Some(fragment)) => {
                self.reply.push_str(&fragment);
                self.pending.push_back(Ok(fragment));
                true
            }
            Ok(None) => true,
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    fn fail(&mut self, err: ChatError) {
        self.pending.push_back(Err(err));
        self.commit = None;
        self.finished = true;
    }

    fn complete(&mut self) {
        self.finished = true;
        let Some(commit) = self.commit.take() else {
            return;
        };
        // Gemini rejects later requests that carry a model turn with empty text.
        if self.reply.is_empty() {
            debug!("Gemini stream completed without text; turn left out of history");
            return;
        }
        debug!(chars = self.reply.chars().count(), "Gemini stream completed");
        commit.apply(std::mem::take(&mut self.reply));
    }
}

fn fragment_stream<S, B, E>(bytes: S, commit: HistoryCommit) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    let state = StreamState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        reply: String::new(),
        commit: Some(commit),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => match state.decoder.push(chunk.as_ref()) {
                    Ok(events) => {
                        for event in events {
                            if !state.accept(&event) {
                                break;
                            }
                        }
                    }
                    Err(e) => state.fail(e),
                },
                Some(Err(e)) => state.fail(e.into()),
                None => {
                    match state.decoder.finish() {
                        Ok(Some(event)) => {
                            state.accept(&event);
                        }
                        Ok(None) => {}
                        Err(e) => state.fail(e),
                    }
                    if !state.finished {
                        state.complete();
                    }
                }
            }
        }
    })
    .boxed()
}

/// Decode one event payload into the text delta it carries, if any.
fn parse_event(payload: &str) -> Result<Option<String>> {
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(payload)?;
    if let Some(err) = value.get("error") {
        let status = err
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(500);
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(ChatError::Api { status, message });
    }

    let response: GenerateContentResponse = serde_json::from_value(value)?;
    if let Some(reason) = response.block_reason() {
        return Err(ChatError::Blocked(reason));
    }

    let text = response.text();
    Ok((!text.is_empty()).then_some(text))
}

fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| trimmed.to_string())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
