use crate::detector_trait::Detector;
use crate::linear_detector::LinearDetector;
use crate::rule_detector::RuleDetector;
use knowthis_core::{AnalysisConfig, ConfigError, FingerprintLayout};
use std::collections::HashMap;
use std::sync::Arc;

pub type DetectorFactory =
    fn(&AnalysisConfig, Arc<FingerprintLayout>) -> Result<Box<dyn Detector>, ConfigError>;

pub struct DetectorRegistry {
    factories: HashMap<String, DetectorFactory>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("rule", |config, layout| {
            Ok(Box::new(RuleDetector::new(config, layout)?))
        });
        registry.register("linear", |config, layout| {
            Ok(Box::new(LinearDetector::new(config, layout)?))
        });
        registry
    }

    pub fn register(&mut self, name: &str, factory: DetectorFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn create(
        &self,
        name: &str,
        config: &AnalysisConfig,
        layout: Arc<FingerprintLayout>,
    ) -> Result<Box<dyn Detector>, ConfigError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDetector(name.to_string()))?;
        factory(config, layout)
    }

    /// Build the detector named by `config.detector.engine`.
    pub fn create_configured(
        &self,
        config: &AnalysisConfig,
        layout: Arc<FingerprintLayout>,
    ) -> Result<Box<dyn Detector>, ConfigError> {
        self.create(&config.detector.engine, config, layout)
    }

    pub fn list_detectors(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
