use std::sync::Arc;

mod client;
mod provider;
mod rig_adapter;
mod session;

pub use client::{APOLOGY_REPLY, AssistantClient, FragmentStream, OFFLINE_REPLY, SYSTEM_INSTRUCTION};
pub use provider::{
    DialogueKey, LlmProvider, ProviderConfig, ProviderError, ProviderEventStream, ProviderMessage,
    ProviderResult, ProviderStreamHandle, ProviderWorker, Role, StreamEventPayload, StreamRequest,
    make_event_stream,
};
pub use rig_adapter::{DEFAULT_GEMINI_MODEL, RIG_GEMINI_PROVIDER_ID, RigProviderAdapter};
pub use session::{
    DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE_TTL, SessionCheckout, SessionPolicy,
    SessionRegistry,
};

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    if config.provider_id.is_empty() {
        config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "gemini" | "google" | "rig-gemini" => {
            config.provider_id = RIG_GEMINI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigProviderAdapter::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_provider_id_defaults_to_gemini() {
        let provider = create_provider(ProviderConfig::new("", "key", "")).unwrap();
        assert_eq!(provider.id(), RIG_GEMINI_PROVIDER_ID);
        assert_eq!(provider.default_model(), DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let result = create_provider(ProviderConfig::new("openai", "key", ""));
        assert!(matches!(
            result,
            Err(ProviderError::UnsupportedProvider { ref provider_id, .. })
                if provider_id == "openai"
        ));
    }
}
