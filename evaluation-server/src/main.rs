// Evaluation server entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config (copying defaults on first run)
// 3. Open the evaluation store (validates the default-values fixture)
// 4. Set up the LLM provider config store
// 5. Serve the HTTP API until the process is stopped

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use evaluation_server::config;
use evaluation_server::http::{self, AppContext};
use evaluation_server::llm::config::LlmConfigStore;
use evaluation_server::store::EvaluationStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("evaluation server starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "config loaded: port={}, data_file={}",
        config.port, config.storage.data_file
    );

    let store =
        EvaluationStore::open(&config.storage).context("failed to open evaluation store")?;

    let llm_config = LlmConfigStore::new(&config.llm_config_file);
    if llm_config.load().is_configured() {
        info!("LLM provider configured: {}", llm_config.load().provider.name());
    } else {
        info!("no LLM provider configured; generation requests will be rejected");
    }

    // One HTTP client for the process; generation calls share its pool.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.llm_request_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let ctx = Arc::new(AppContext {
        store,
        llm_config,
        http,
    });

    http::run_server(ctx, config.port).await
}

fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("evaluation_server=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    // Failure here means a subscriber is already set (tests); keep going.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
