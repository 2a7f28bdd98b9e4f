use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::gemini;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::provider::{
    CompletionsFailedSnafu, EmptyPromptSnafu, HttpClientSnafu, LlmProvider, MissingApiKeySnafu,
    ProviderConfig, ProviderError, ProviderMessage, ProviderResult, ProviderStreamHandle,
    ProviderWorker, Role, StreamEventPayload, StreamRequest, make_event_stream,
};

pub const RIG_GEMINI_PROVIDER_ID: &str = "gemini";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

pub struct RigProviderAdapter {
    config: ProviderConfig,
}

impl RigProviderAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<gemini::Client> {
        let mut builder = gemini::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    fn to_rig_message(message: &ProviderMessage) -> RigMessage {
        match message.role {
            Role::User => RigMessage::user(message.content.clone()),
            Role::Assistant => RigMessage::assistant(message.content.clone()),
        }
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEventPayload>,
        error: ProviderError,
    ) {
        let _ = event_tx.send(StreamEventPayload::Error(error.to_string()));
    }

    fn map_stream_item<R>(item: StreamedAssistantContent<R>) -> Option<StreamEventPayload>
    where
        R: Clone + Unpin,
    {
        match item {
            StreamedAssistantContent::Text(text) if !text.text.is_empty() => {
                Some(StreamEventPayload::Delta(text.text))
            }
            // Reasoning, tool calls and the final usage record are not part of the visible reply.
            _ => None,
        }
    }

    async fn run_stream_worker(
        config: ProviderConfig,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEventPayload>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let client = match Self::build_client(&config) {
            Ok(client) => client,
            Err(error) => {
                tracing::error!(
                    provider_id = %config.provider_id,
                    error = %error,
                    "failed to build provider client"
                );
                Self::emit_error_event(&event_tx, error);
                return;
            }
        };

        let model = client.completion_model(request.model_id.clone());
        let history = request
            .history
            .iter()
            .map(Self::to_rig_message)
            .collect::<Vec<_>>();

        let mut builder = model
            .completion_request(RigMessage::user(request.prompt.clone()))
            .messages(history);

        if let Some(preamble) = &request.preamble
            && !preamble.trim().is_empty()
        {
            builder = builder.preamble(preamble.clone());
        }

        let mut stream = match builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        }) {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    provider_id = %config.provider_id,
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                Self::emit_error_event(&event_tx, error);
                return;
            }
        };

        let mut cancelled = false;
        let mut stream_failed = false;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    // Cancel the upstream Rig stream so provider IO stops promptly.
                    tracing::debug!(model_id = %request.model_id, "provider stream cancelled");
                    stream.cancel();
                    break;
                }
                next_item = stream.next() => {
                    match next_item {
                        Some(Ok(item)) => {
                            if let Some(payload) = Self::map_stream_item(item)
                                && event_tx.send(payload).is_err()
                            {
                                return;
                            }
                        }
                        Some(Err(source)) => {
                            stream_failed = true;
                            tracing::warn!(
                                model_id = %request.model_id,
                                error = %source,
                                "provider stream emitted an error chunk"
                            );
                            let error = ProviderError::CompletionsFailed {
                                stage: "stream-chunk",
                                source,
                            };
                            Self::emit_error_event(&event_tx, error);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if !cancelled && !stream_failed {
            let _ = event_tx.send(StreamEventPayload::Done);
        }
    }
}

impl LlmProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "Rig Gemini"
    }

    fn default_model(&self) -> &str {
        DEFAULT_GEMINI_MODEL
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.prompt.trim().is_empty(),
            EmptyPromptSnafu {
                stage: "stream-chat",
                model_id: request.model_id.clone(),
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream();
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.config.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_requires_api_key() {
        let result = RigProviderAdapter::new(ProviderConfig::new("gemini", "   ", ""));
        assert!(matches!(result, Err(ProviderError::MissingApiKey { .. })));
    }

    #[test]
    fn blank_prompt_is_rejected_before_any_io() {
        let adapter =
            RigProviderAdapter::new(ProviderConfig::new("gemini", "test-key", "")).unwrap();
        let result = adapter.stream_chat(StreamRequest::new(DEFAULT_GEMINI_MODEL, "  "));
        assert!(matches!(result, Err(ProviderError::EmptyPrompt { .. })));
    }

    #[test]
    fn history_roles_map_onto_rig_messages() {
        let user = RigProviderAdapter::to_rig_message(&ProviderMessage::user("hi"));
        let assistant = RigProviderAdapter::to_rig_message(&ProviderMessage::assistant("hello"));
        assert!(matches!(user, RigMessage::User { .. }));
        assert!(matches!(assistant, RigMessage::Assistant { .. }));
    }
}
