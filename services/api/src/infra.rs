use loan_officer::config::AppConfig;
use loan_officer::error::AppError;
use loan_officer::workflows::mortgage::{
    DocumentRetriever, EmptyRetriever, EngineSettings, HttpRetriever, OpenAiCompletionService,
    RateTable, RetrievedDocument, RetryPolicy, ServiceError, TurnEngine,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Retrieval backend chosen at startup.
pub(crate) enum ConfiguredRetriever {
    Http(HttpRetriever),
    Disabled(EmptyRetriever),
}

impl DocumentRetriever for ConfiguredRetriever {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, ServiceError> {
        match self {
            ConfiguredRetriever::Http(retriever) => retriever.retrieve(query, k),
            ConfiguredRetriever::Disabled(retriever) => retriever.retrieve(query, k),
        }
    }
}

pub(crate) type LiveEngine = TurnEngine<OpenAiCompletionService, ConfiguredRetriever>;

/// Loads the rate matrix and wires the HTTP clients. Blocks, so async callers must run it
/// on a blocking thread.
pub(crate) fn build_engine(config: &AppConfig) -> Result<LiveEngine, AppError> {
    let rates = RateTable::from_path(&config.rates.path)?;
    let completion = OpenAiCompletionService::from_config(&config.llm)?;
    if config.llm.api_key.is_none() {
        warn!("OPENAI_API_KEY not set; turns needing the model will apologize");
    }

    let retriever = match HttpRetriever::from_config(&config.retrieval, config.llm.timeout)? {
        Some(retriever) => ConfiguredRetriever::Http(retriever),
        None => {
            info!("RETRIEVAL_URL not set; questions use general knowledge only");
            ConfiguredRetriever::Disabled(EmptyRetriever)
        }
    };

    Ok(TurnEngine::with_settings(
        Arc::new(completion),
        Arc::new(retriever),
        Arc::new(rates),
        EngineSettings {
            retry: RetryPolicy::new(config.llm.max_attempts),
            top_k: config.retrieval.top_k,
        },
    ))
}

/// Runs blocking setup off the async executor.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?
}
