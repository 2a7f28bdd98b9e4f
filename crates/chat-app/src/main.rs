use mechat::app::{AppOptions, ChatApp};
use mechat::settings::SettingsStore;
use mechat::shell::Shell;
use mechat_llm::AssistantClient;
use mechat_storage::{mock_storage, unix_now_seconds};
use tokio::io::BufReader;
use tracing::level_filters::LevelFilter;

/// Application entry point.
///
/// Loads settings, installs logging on stderr so it never interleaves with the
/// transcript, reports any settings problem, then hands stdin/stdout to the shell.
#[tokio::main]
async fn main() {
    let settings_store = SettingsStore::load();
    let settings = settings_store.settings().clone();

    let (max_level, level_error) = match settings.log_filter() {
        Ok(filter) => (filter, None),
        Err(err) => (LevelFilter::INFO, Some(err)),
    };
    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();
    if let Some(err) = settings_store.load_error() {
        tracing::warn!(
            path = %settings_store.config_path().display(),
            error = %err,
            "failed to load settings; using defaults"
        );
    } else if !settings_store.file_exists() {
        tracing::info!(
            path = %settings_store.config_path().display(),
            "settings file not found; using defaults"
        );
    }
    if let Some(err) = level_error {
        tracing::warn!(error = %err, "falling back to info logging");
    }
    tracing::info!(
        config_path = %settings_store.config_path().display(),
        provider_id = %settings.provider_id,
        "settings loaded"
    );

    let assistant = AssistantClient::from_config(
        settings.to_provider_config(),
        settings.model.clone(),
        settings.session_policy(),
    );

    let (app, events) = ChatApp::new(
        Box::new(mock_storage(unix_now_seconds())),
        assistant,
        AppOptions::from(&settings),
    );

    let mut shell = Shell::new(app, settings);
    if let Err(err) = shell
        .run(events, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
    {
        tracing::error!(error = %err, "shell exited with an error");
        std::process::exit(1);
    }
}
