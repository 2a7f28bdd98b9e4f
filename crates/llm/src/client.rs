use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::provider::{
    DialogueKey, LlmProvider, ProviderConfig, ProviderMessage, ProviderStreamHandle,
    ProviderWorker, StreamEventPayload, StreamRequest,
};
use super::rig_adapter::DEFAULT_GEMINI_MODEL;
use super::session::{SessionPolicy, SessionRegistry};

pub const SYSTEM_INSTRUCTION: &str = "You are meChat AI, a helpful, witty, and friendly assistant inside a modern messaging app called meChat. Keep your responses concise and conversational, like a text message. Use emojis occasionally.";
pub const OFFLINE_REPLY: &str =
    "I'm currently offline (No API Key provided). Please configure the environment variable.";
pub const APOLOGY_REPLY: &str = "Sorry, I'm having trouble connecting right now.";

/// Lazy, single-pass sequence of reply fragments.
///
/// The producing task is spawned on first poll and aborted when the stream is
/// dropped. At most one fragment is buffered between producer and consumer.
pub struct FragmentStream {
    fragments: mpsc::Receiver<String>,
    worker: Option<ProviderWorker>,
    task: Option<JoinHandle<()>>,
}

impl FragmentStream {
    fn from_worker(fragments: mpsc::Receiver<String>, worker: ProviderWorker) -> Self {
        Self {
            fragments,
            worker: Some(worker),
            task: None,
        }
    }

    /// A stream that yields exactly `text` and ends.
    pub fn single(text: impl Into<String>) -> Self {
        let (fragment_tx, fragments) = mpsc::channel(1);
        let _ = fragment_tx.try_send(text.into());
        Self {
            fragments,
            worker: None,
            task: None,
        }
    }
}

impl Stream for FragmentStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        if let Some(worker) = self.worker.take() {
            self.task = Some(tokio::spawn(worker));
        }

        self.fragments.poll_recv(cx)
    }
}

impl Drop for FragmentStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum ReplyOutcome {
    Completed,
    Failed(String),
    Abandoned,
}

struct ReplyJob {
    provider: Arc<dyn LlmProvider>,
    sessions: Arc<SessionRegistry>,
    model_id: String,
    key: DialogueKey,
    prompt: String,
    seed: Vec<ProviderMessage>,
}

impl ReplyJob {
    async fn run(self, fragment_tx: mpsc::Sender<String>) {
        let Self {
            provider,
            sessions,
            model_id,
            key,
            prompt,
            seed,
        } = self;

        let checkout = sessions.checkout(&key, move || seed).await;
        let request = StreamRequest::new(model_id, prompt.clone())
            .with_preamble(sessions.preamble())
            .with_history(checkout.history);

        let handle = provider.stream_chat(request).map_err(|error| {
            tracing::warn!(
                dialogue_key = %key,
                provider_id = %provider.id(),
                error = %error,
                "assistant request failed; replying with apology"
            );
        });
        let Ok(ProviderStreamHandle { mut stream, worker }) = handle else {
            let _ = fragment_tx.send(APOLOGY_REPLY.to_string()).await;
            return;
        };
        tokio::spawn(worker);

        let mut reply = String::new();
        let outcome = loop {
            match stream.recv().await {
                Some(StreamEventPayload::Delta(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    reply.push_str(&text);
                    if fragment_tx.send(text).await.is_err() {
                        stream.cancel();
                        break ReplyOutcome::Abandoned;
                    }
                }
                Some(StreamEventPayload::Done) => break ReplyOutcome::Completed,
                Some(StreamEventPayload::Error(message)) => break ReplyOutcome::Failed(message),
                None => {
                    break ReplyOutcome::Failed(
                        "provider stream ended before a terminal event".to_string(),
                    );
                }
            }
        };

        match outcome {
            ReplyOutcome::Completed => {
                tracing::debug!(
                    dialogue_key = %key,
                    reply_len = reply.len(),
                    "assistant reply completed"
                );
                sessions.record_turn(&key, prompt, reply).await;
            }
            ReplyOutcome::Failed(message) => {
                tracing::warn!(
                    dialogue_key = %key,
                    error = %message,
                    partial_len = reply.len(),
                    "assistant stream failed"
                );
                if reply.is_empty() {
                    let _ = fragment_tx.send(APOLOGY_REPLY.to_string()).await;
                }
            }
            ReplyOutcome::Abandoned => {
                tracing::debug!(dialogue_key = %key, "assistant reply consumer went away");
            }
        }
    }
}

/// Entry point for assistant replies; failures never escape as errors.
pub struct AssistantClient {
    provider: Option<Arc<dyn LlmProvider>>,
    model_id: String,
    sessions: Arc<SessionRegistry>,
}

impl AssistantClient {
    pub fn new(
        provider: Option<Arc<dyn LlmProvider>>,
        model_id: impl Into<String>,
        policy: SessionPolicy,
    ) -> Self {
        let mut model_id = model_id.into().trim().to_string();
        if model_id.is_empty() {
            model_id = provider
                .as_ref()
                .map_or(DEFAULT_GEMINI_MODEL, |provider| provider.default_model())
                .to_string();
        }

        Self {
            provider,
            model_id,
            sessions: Arc::new(SessionRegistry::new(SYSTEM_INSTRUCTION, policy)),
        }
    }

    /// Client without a credential; every reply is the offline notice.
    pub fn offline() -> Self {
        Self::new(None, DEFAULT_GEMINI_MODEL, SessionPolicy::default())
    }

    /// Builds the provider from configuration, degrading to offline mode when
    /// there is no credential or the provider cannot be created.
    pub fn from_config(
        config: Option<ProviderConfig>,
        model_id: impl Into<String>,
        policy: SessionPolicy,
    ) -> Self {
        let provider = match config {
            None => {
                tracing::info!("no assistant credential configured; running in offline mode");
                None
            }
            Some(config) => match super::create_provider(config) {
                Ok(provider) => Some(provider),
                Err(error) => {
                    tracing::error!(error = %error, "failed to initialize assistant provider");
                    None
                }
            },
        };

        Self::new(provider, model_id, policy)
    }

    pub fn is_online(&self) -> bool {
        self.provider.is_some()
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|provider| provider.name())
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Streams the assistant's reply to `text` in the dialogue identified by `key`.
    ///
    /// `history` seeds the dialogue context only when it is created; later calls
    /// rely on the context's own memory.
    pub fn send_message(
        &self,
        key: DialogueKey,
        text: &str,
        history: &[ProviderMessage],
    ) -> FragmentStream {
        let Some(provider) = self.provider.clone() else {
            return FragmentStream::single(OFFLINE_REPLY);
        };

        let job = ReplyJob {
            provider,
            sessions: Arc::clone(&self.sessions),
            model_id: self.model_id.clone(),
            key,
            prompt: text.to_string(),
            seed: history.to_vec(),
        };

        let (fragment_tx, fragments) = mpsc::channel(1);
        FragmentStream::from_worker(fragments, Box::pin(job.run(fragment_tx)))
    }
}
