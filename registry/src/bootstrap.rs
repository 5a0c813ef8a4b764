//! Assembling a registry from configuration.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use eligibility::{
    AttributionEngine, CategoryMapping, ClassifierError, EligibilityClassifier, EncodeError,
    FeatureEncoder, ForestClassifier, ShapleyExplainer,
};
use narrator::{
    GeminiBackend, LlmBackend, LlmError, MockBackend, NarrativeGenerator, OpenAiBackend,
};

use crate::audit::AuditLog;
use crate::config::{
    ConfigError, LedgerConfig, ModelConfig, NarrativeBackendConfig, NarrativeConfig,
    RegistryConfig, StoreConfig, TimeoutConfig,
};
use crate::content_id::ContentId;
use crate::document::DatabaseSnapshot;
use crate::ledger::{InMemoryLedger, JsonRpcLedger, LedgerClient, LedgerError};
use crate::pipeline::{DecisionPipeline, PipelineParts};
use crate::pointer::CurrentPointer;
use crate::queries::RegistryQueries;
use crate::store::{
    publish_document, ContentStore, InMemoryContentStore, LocalContentStore, PinningGatewayStore,
    StoreError,
};

const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";

/// Start-up failures.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Content store: {0}")]
    Store(#[from] StoreError),

    #[error("Ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Narrative backend: {0}")]
    Narrator(#[from] LlmError),

    #[error("Category mapping: {0}")]
    Mapping(#[from] EncodeError),

    #[error("Classifier: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Pointer journal {path}: {source}")]
    Journal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub async fn build_store(
    config: &StoreConfig,
    timeouts: &TimeoutConfig,
) -> Result<Arc<dyn ContentStore>, BootstrapError> {
    let store: Arc<dyn ContentStore> = match config {
        StoreConfig::Memory => Arc::new(InMemoryContentStore::new()),
        StoreConfig::Local { root } => Arc::new(LocalContentStore::new(root).await?),
        StoreConfig::Pinning(pinning) => Arc::new(PinningGatewayStore::new(
            pinning.clone(),
            timeouts.store_publish(),
        )?),
    };
    Ok(store)
}

pub fn build_ledger(
    config: &LedgerConfig,
    timeouts: &TimeoutConfig,
) -> Result<Arc<dyn LedgerClient>, BootstrapError> {
    let ledger: Arc<dyn LedgerClient> = match config {
        LedgerConfig::Memory => Arc::new(InMemoryLedger::new()),
        LedgerConfig::JsonRpc(rpc) => {
            Arc::new(JsonRpcLedger::new(rpc.clone(), timeouts.ledger())?)
        }
    };
    Ok(ledger)
}

/// Build the narrative generator. API keys missing from the config are read
/// from the environment.
pub fn build_narrator(
    config: &NarrativeConfig,
    timeouts: &TimeoutConfig,
) -> Result<NarrativeGenerator, BootstrapError> {
    let timeout = timeouts.narrative();
    let backend: Option<Arc<dyn LlmBackend>> = match &config.backend {
        NarrativeBackendConfig::Disabled => None,
        NarrativeBackendConfig::Mock { response } => {
            Some(Arc::new(MockBackend::new("mock").with_response(response.clone())))
        }
        NarrativeBackendConfig::OpenAi {
            base_url,
            model,
            api_key,
        } => {
            let key = api_key.clone().or_else(|| std::env::var(OPENAI_KEY_VAR).ok());
            Some(Arc::new(OpenAiBackend::new(base_url.as_str(), model.as_str(), key, timeout)?))
        }
        NarrativeBackendConfig::Gemini {
            base_url,
            model,
            api_key,
        } => {
            let key = api_key
                .clone()
                .or_else(|| std::env::var(GEMINI_KEY_VAR).ok())
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "narrative.backend.api_key or {} is required for gemini",
                        GEMINI_KEY_VAR
                    ))
                })?;
            Some(Arc::new(GeminiBackend::new(base_url.as_str(), model.as_str(), key, timeout)?))
        }
    };

    Ok(NarrativeGenerator::new(backend, timeout)
        .with_max_tokens(config.max_tokens)
        .with_temperature(config.temperature)
        .with_scheme(config.scheme.clone()))
}

pub fn load_encoder(config: &ModelConfig) -> Result<FeatureEncoder, BootstrapError> {
    let Some(path) = &config.mapping_path else {
        return Ok(FeatureEncoder::default());
    };
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(FeatureEncoder::new(CategoryMapping::from_json(&json)?)?)
}

pub fn load_classifier(
    config: &ModelConfig,
) -> Result<Arc<dyn EligibilityClassifier>, BootstrapError> {
    let path = config
        .forest_path
        .as_ref()
        .ok_or_else(|| ConfigError::Invalid("model.forest_path is required".to_string()))?;
    Ok(Arc::new(ForestClassifier::load(path)?))
}

/// Publish an empty snapshot for a fresh deployment.
pub async fn bootstrap_genesis(
    store: &dyn ContentStore,
    timeout: Duration,
) -> Result<ContentId, StoreError> {
    let genesis =
        DatabaseSnapshot::empty(Utc::now()).with_description("Eligibility registry genesis");
    let cid = publish_document(store, &genesis, timeout).await?;
    info!(store = store.name(), cid = %cid, "Published genesis snapshot");
    Ok(cid)
}

/// Everything a running deployment needs.
pub struct Registry {
    pub pipeline: Arc<DecisionPipeline>,
    pub queries: RegistryQueries,
    pub pointer: Arc<CurrentPointer>,
    pub audit: Arc<AuditLog>,
}

impl Registry {
    /// Build every collaborator named by `config`.
    pub async fn from_config(config: &RegistryConfig) -> Result<Self, BootstrapError> {
        config.validate()?;

        let store = build_store(&config.store, &config.timeouts).await?;
        let ledger = build_ledger(&config.ledger, &config.timeouts)?;
        let narrator = build_narrator(&config.narrative, &config.timeouts)?;
        let encoder = load_encoder(&config.model)?;
        let classifier = load_classifier(&config.model)?;

        let genesis = match &config.pointer.genesis_cid {
            Some(cid) => ContentId::new(cid.as_str()),
            None => bootstrap_genesis(store.as_ref(), config.timeouts.store_publish()).await?,
        };
        let pointer = match &config.pointer.journal_path {
            Some(path) => CurrentPointer::restore(genesis, path).map_err(|source| {
                BootstrapError::Journal {
                    path: path.clone(),
                    source,
                }
            })?,
            None => CurrentPointer::new(genesis),
        };

        let parts = PipelineParts {
            encoder,
            classifier,
            attribution: AttributionEngine::new(Arc::new(ShapleyExplainer::new())),
            narrator,
            store,
            ledger,
            pointer: Arc::new(pointer),
        };
        Ok(Self::assemble(parts, config))
    }

    /// Wire prepared collaborators together with `config`'s timeouts and limits.
    pub fn assemble(parts: PipelineParts, config: &RegistryConfig) -> Self {
        let audit = Arc::new(AuditLog::new());
        let queries = RegistryQueries::new(
            Arc::clone(&parts.store),
            Arc::clone(&parts.pointer),
            config.timeouts.store_fetch(),
        );
        let pointer = Arc::clone(&parts.pointer);
        let pipeline = DecisionPipeline::new(parts)
            .with_timeouts(config.timeouts.clone())
            .with_max_commit_attempts(config.pointer.max_commit_attempts)
            .with_audit(Arc::clone(&audit));

        info!(database_cid = %pointer.get(), "Registry ready");
        Self {
            pipeline: Arc::new(pipeline),
            queries,
            pointer,
            audit,
        }
    }
}
