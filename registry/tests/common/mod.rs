//! Shared fixtures for registry integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eligibility::{
    Applicant, AttributionEngine, ClassProbabilities, ClassifierError, DecisionTree,
    EligibilityClassifier, EncodedFeatures, FeatureEncoder, ForestArtifact, ForestClassifier,
    ShapleyExplainer, FEATURE_NAMES,
};
use narrator::NarrativeGenerator;
use registry::{
    bootstrap_genesis, ContentId, ContentStore, CurrentPointer, DecisionPipeline,
    InMemoryContentStore, InMemoryLedger, PipelineParts, TimeoutConfig,
};

pub const INCOME: usize = 2;
pub const LAND: usize = 3;
pub const HOUSING: usize = 4;

/// Three stumps: low income, no land and kutcha housing each vote eligible.
pub fn stump_forest() -> ForestClassifier {
    ForestClassifier::from_artifact(ForestArtifact {
        feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        trees: vec![
            DecisionTree::stump(INCOME, 50_000.0, [0.2, 0.8], [0.9, 0.1]),
            DecisionTree::stump(LAND, 0.5, [0.2, 0.8], [0.9, 0.1]),
            DecisionTree::stump(HOUSING, 0.5, [0.2, 0.8], [0.9, 0.1]),
        ],
        background: vec![
            EncodedFeatures::from_values([35.0, 3.0, 120_000.0, 1.0, 2.0]),
            EncodedFeatures::from_values([50.0, 0.0, 30_000.0, 0.0, 0.0]),
        ],
    })
    .expect("valid forest")
}

/// How a [`FaultyClassifier`] misbehaves.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Calls after the first `n` return an inference error.
    FailAfter(usize),
    /// Every call blocks its thread this long before answering.
    Stall(Duration),
    /// Every call panics.
    Panic,
}

/// Stump forest wrapped with an injected fault.
pub struct FaultyClassifier {
    inner: ForestClassifier,
    fault: Fault,
    calls: AtomicUsize,
}

impl FaultyClassifier {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: stump_forest(),
            fault,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EligibilityClassifier for FaultyClassifier {
    fn id(&self) -> &str {
        "faulty"
    }

    fn predict_proba(
        &self,
        features: &EncodedFeatures,
    ) -> Result<ClassProbabilities, ClassifierError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            Fault::FailAfter(n) if call >= n => {
                Err(ClassifierError::Inference("injected failure".to_string()))
            }
            Fault::FailAfter(_) => self.inner.predict_proba(features),
            Fault::Stall(delay) => {
                std::thread::sleep(delay);
                self.inner.predict_proba(features)
            }
            Fault::Panic => panic!("classifier crashed"),
        }
    }

    fn expected_baseline(&self) -> f64 {
        self.inner.expected_baseline()
    }

    fn background(&self) -> &[EncodedFeatures] {
        self.inner.background()
    }
}

/// Low-income OBC farmer without land, in kutcha housing.
pub fn ravi() -> Applicant {
    Applicant {
        national_id: 123_456_789_012,
        name: "Ravi Kumar".to_string(),
        age: 45,
        group: "OBC".to_string(),
        income: 45_000.0,
        land_ownership: false,
        housing: "kutcha".to_string(),
    }
}

/// High-income landowner in pucca housing.
pub fn meena() -> Applicant {
    Applicant {
        national_id: 111_122_223_333,
        name: "Meena Iyer".to_string(),
        age: 52,
        group: "General".to_string(),
        income: 320_000.0,
        land_ownership: true,
        housing: "pucca".to_string(),
    }
}

pub fn applicant(n: u64) -> Applicant {
    Applicant {
        national_id: 900_000_000_000 + n,
        name: format!("Applicant {}", n),
        age: 30 + (n % 40) as u32,
        group: "SC".to_string(),
        income: 20_000.0 + 1_000.0 * n as f64,
        land_ownership: n % 2 == 0,
        housing: "semi-pucca".to_string(),
    }
}

pub fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        classifier_ms: 1_000,
        attribution_ms: 1_000,
        narrative_ms: 1_000,
        store_fetch_ms: 1_000,
        store_publish_ms: 1_000,
        ledger_ms: 1_000,
    }
}

pub struct Harness {
    pub store: Arc<InMemoryContentStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub pointer: Arc<CurrentPointer>,
    pub pipeline: Arc<DecisionPipeline>,
    pub genesis: ContentId,
}

pub struct HarnessBuilder {
    store: InMemoryContentStore,
    ledger: InMemoryLedger,
    classifier: Arc<dyn EligibilityClassifier>,
    narrator: NarrativeGenerator,
    timeouts: TimeoutConfig,
    max_commit_attempts: u32,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            store: InMemoryContentStore::new(),
            ledger: InMemoryLedger::new(),
            classifier: Arc::new(stump_forest()),
            narrator: NarrativeGenerator::disabled(),
            timeouts: fast_timeouts(),
            max_commit_attempts: 8,
        }
    }

    pub fn store(mut self, store: InMemoryContentStore) -> Self {
        self.store = store;
        self
    }

    pub fn ledger(mut self, ledger: InMemoryLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn EligibilityClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn narrator(mut self, narrator: NarrativeGenerator) -> Self {
        self.narrator = narrator;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts;
        self
    }

    pub async fn build(self) -> Harness {
        let store = Arc::new(self.store);
        let ledger = Arc::new(self.ledger);
        let genesis = bootstrap_genesis(store.as_ref(), Duration::from_secs(1))
            .await
            .expect("genesis published");
        let pointer = Arc::new(CurrentPointer::new(genesis.clone()));

        let pipeline = DecisionPipeline::new(PipelineParts {
            encoder: FeatureEncoder::default(),
            classifier: self.classifier,
            attribution: AttributionEngine::new(Arc::new(ShapleyExplainer::new())),
            narrator: self.narrator,
            store: store.clone() as Arc<dyn ContentStore>,
            ledger: ledger.clone(),
            pointer: pointer.clone(),
        })
        .with_timeouts(self.timeouts)
        .with_max_commit_attempts(self.max_commit_attempts);

        Harness {
            store,
            ledger,
            pointer,
            pipeline: Arc::new(pipeline),
            genesis,
        }
    }
}

pub async fn harness() -> Harness {
    HarnessBuilder::new().build().await
}
