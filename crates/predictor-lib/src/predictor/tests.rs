//! Pipeline tests for the orchestrator and batch scheduler
//!
//! The model layer is replaced by in-memory loaders so the graduated
//! fallback can be exercised stage by stage against a real directory.

#[cfg(test)]
mod orchestrator_tests {
    use crate::models::{
        FallbackReason, PredictionRequest, PredictionResult, Provenance, SensorReading,
    };
    use crate::predictor::fixtures::{self, Batch, BIAS};
    use crate::predictor::{
        ArtifactPattern, FeatureSchema, FeatureVector, LoadError, Model, ModelLoader,
        ModelResolver, OnnxModelLoader, PredictionError, PredictionOrchestrator, PredictorConfig,
        ResolvedArtifact, MAX_FALLBACK_HOURS, MIN_FALLBACK_HOURS,
    };
    use chrono::{TimeZone, Utc};
    use std::fs::File;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum Output {
        Value(f64),
        Fail,
        Panic,
    }

    struct MockModel {
        version: String,
        schema: FeatureSchema,
        output: Output,
        seen_widths: Arc<Mutex<Vec<usize>>>,
    }

    impl Model for MockModel {
        fn predict(&self, features: &FeatureVector) -> Result<f64, PredictionError> {
            self.seen_widths.lock().unwrap().push(features.len());
            match self.output {
                Output::Value(v) => Ok(v),
                Output::Fail => Err(PredictionError::Inference(anyhow::anyhow!("graph exploded"))),
                Output::Panic => panic!("tract invariant violated"),
            }
        }

        fn version(&self) -> &str {
            &self.version
        }

        fn schema(&self) -> &FeatureSchema {
            &self.schema
        }
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Load(Output),
        FailDecode,
    }

    struct MockLoader {
        behavior: Behavior,
        schema: FeatureSchema,
        calls: AtomicUsize,
        seen_widths: Arc<Mutex<Vec<usize>>>,
    }

    impl MockLoader {
        fn new(behavior: Behavior) -> Arc<Self> {
            Self::with_schema(behavior, FeatureSchema::current())
        }

        fn with_schema(behavior: Behavior, schema: FeatureSchema) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                schema,
                calls: AtomicUsize::new(0),
                seen_widths: Arc::new(Mutex::new(Vec::new())),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ModelLoader for MockLoader {
        fn load(&self, artifact: &ResolvedArtifact) -> Result<Arc<dyn Model>, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::FailDecode => Err(LoadError::Decode(anyhow::anyhow!("truncated protobuf"))),
                Behavior::Load(output) => Ok(Arc::new(MockModel {
                    version: artifact.identifier.clone(),
                    schema: self.schema.clone(),
                    output,
                    seen_widths: Arc::clone(&self.seen_widths),
                })),
            }
        }
    }

    fn touch(dir: &Path, name: &str, age_secs: u64) {
        let file = File::create(dir.join(name)).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    fn orchestrator(dir: &Path, loader: Arc<MockLoader>) -> PredictionOrchestrator {
        let resolver = ModelResolver::new(dir, ArtifactPattern::default());
        PredictionOrchestrator::new(resolver, loader)
    }

    fn request(stage: &str, hours: f64, readings: &[(&str, f64)]) -> PredictionRequest {
        PredictionRequest {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap(),
            plant_growth_stage: stage.to_string(),
            time_since_last_watering_hours: hours,
            readings: readings
                .iter()
                .map(|(name, value)| SensorReading::new(*name, "", *value))
                .collect(),
        }
    }

    fn assert_in_range(result: &PredictionResult) {
        assert!(
            (MIN_FALLBACK_HOURS..=MAX_FALLBACK_HOURS).contains(&result.hours_until_next_watering),
            "out of range: {}",
            result.hours_until_next_watering
        );
    }

    #[test]
    fn test_no_model_found_uses_extended_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let loader = MockLoader::new(Behavior::Load(Output::Value(10.0)));
        let orch = orchestrator(&temp_dir.path().join("missing"), Arc::clone(&loader));

        let req = request(
            "Vegetative",
            0.0,
            &[("Soil Humidity", 15.0), ("Temperature", 25.0)],
        );
        let result = orch.predict(&req);

        assert_eq!(result.provenance.to_string(), "fallback:no_model_found");
        assert_eq!(result.hours_until_next_watering, 4.0);
        assert_eq!(result.prediction_time, req.timestamp);
        assert_eq!(loader.calls(), 0);
    }

    #[test]
    fn test_no_model_extended_rules_change_the_estimate() {
        let temp_dir = TempDir::new().unwrap();
        let orch = orchestrator(temp_dir.path(), MockLoader::new(Behavior::FailDecode));

        let req = request("Seedling", 60.0, &[("Soil Humidity", 55.0), ("Temperature", 35.0)]);
        let result = orch.predict(&req);

        // 36 * 0.8 (hot) * 0.8 (seedling) * 0.8 (long gap)
        assert!((result.hours_until_next_watering - 36.0 * 0.8 * 0.8 * 0.8).abs() < 1e-9);
        assert_in_range(&result);
    }

    #[test]
    fn test_load_error_uses_baseline_only() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "reg_model_a.onnx", 60);
        let orch = orchestrator(temp_dir.path(), MockLoader::new(Behavior::FailDecode));

        let req = request("Seedling", 60.0, &[("Soil Humidity", 55.0), ("Temperature", 35.0)]);
        let result = orch.predict(&req);

        assert_eq!(result.provenance.to_string(), "fallback:model_load_error:decode");
        assert_eq!(result.hours_until_next_watering, 36.0);
    }

    #[test]
    fn test_prediction_error_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "reg_model_a.onnx", 60);
        let req = request("Flowering", 3.0, &[("Soil Humidity", 25.0)]);

        let cases = [
            (Output::Fail, "fallback:prediction_error:inference"),
            (Output::Value(f64::NAN), "fallback:prediction_error:non_finite_output"),
            (Output::Value(-4.0), "fallback:prediction_error:non_positive_output"),
            (Output::Value(0.0), "fallback:prediction_error:non_positive_output"),
        ];
        for (output, expected) in cases {
            let orch = orchestrator(temp_dir.path(), MockLoader::new(Behavior::Load(output)));
            let result = orch.predict(&req);
            assert_eq!(result.provenance.to_string(), expected);
            // baseline only: 20 <= 25 < 30
            assert_eq!(result.hours_until_next_watering, 12.0);
        }
    }

    #[test]
    fn test_panicking_model_is_unexpected_error() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "reg_model_a.onnx", 60);
        let orch = orchestrator(temp_dir.path(), MockLoader::new(Behavior::Load(Output::Panic)));

        let result = orch.predict(&request("Vegetative", 1.0, &[]));
        assert_eq!(
            result.provenance,
            Provenance::Fallback(FallbackReason::UnexpectedError("panic".to_string()))
        );
        assert_in_range(&result);
    }

    #[test]
    fn test_unreadable_model_dir_is_unexpected_io() {
        let temp_dir = TempDir::new().unwrap();
        let not_a_dir = temp_dir.path().join("trained_models");
        File::create(&not_a_dir).unwrap();
        let orch = orchestrator(&not_a_dir, MockLoader::new(Behavior::Load(Output::Value(5.0))));

        let result = orch.predict(&request("Vegetative", 1.0, &[]));
        assert_eq!(result.provenance.to_string(), "fallback:unexpected_error:io");
        // default soil humidity 40% -> 36h, baseline only
        assert_eq!(result.hours_until_next_watering, 36.0);
    }

    #[test]
    fn test_model_backed_prediction_uses_latest_artifact() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "reg_model_a.onnx", 3600);
        touch(temp_dir.path(), "reg_model_b.onnx", 60);
        let loader = MockLoader::new(Behavior::Load(Output::Value(17.25)));
        let orch = orchestrator(temp_dir.path(), Arc::clone(&loader));

        let result = orch.predict(&request("Vegetative", 5.0, &[("Soil Humidity", 45.0)]));

        assert_eq!(
            result.provenance,
            Provenance::Model {
                version: "reg_model_b".to_string()
            }
        );
        assert_eq!(result.hours_until_next_watering, 17.25);
        assert_eq!(orch.active_version().as_deref(), Some("reg_model_b"));
        assert_eq!(*loader.seen_widths.lock().unwrap(), vec![16]);
    }

    #[test]
    fn test_features_follow_artifact_schema() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "reg_model_legacy.onnx", 60);
        let loader = MockLoader::with_schema(Behavior::Load(Output::Value(8.0)), FeatureSchema::legacy());
        let orch = orchestrator(temp_dir.path(), Arc::clone(&loader));

        orch.predict(&request("Vegetative", 5.0, &[]));
        assert_eq!(*loader.seen_widths.lock().unwrap(), vec![6]);
    }

    #[test]
    fn test_identical_requests_give_identical_results() {
        let temp_dir = TempDir::new().unwrap();
        let orch = orchestrator(temp_dir.path(), MockLoader::new(Behavior::FailDecode));
        let req = request("Flowering", 50.0, &[("Light", 900.0), ("Air Humidity", 20.0)]);

        let first = orch.predict(&req);
        let second = orch.predict(&req);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_without_cache_every_request_loads() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "reg_model_a.onnx", 60);
        let loader = MockLoader::new(Behavior::Load(Output::Value(9.0)));
        let orch = orchestrator(temp_dir.path(), Arc::clone(&loader));

        orch.predict(&request("Vegetative", 1.0, &[]));
        orch.predict(&request("Vegetative", 1.0, &[]));
        assert_eq!(loader.calls(), 2);
    }

    #[test]
    fn test_cache_invalidated_by_newer_artifact() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "reg_model_a.onnx", 3600);
        let loader = MockLoader::new(Behavior::Load(Output::Value(9.0)));
        let orch = orchestrator(temp_dir.path(), Arc::clone(&loader)).with_cache(true);

        orch.predict(&request("Vegetative", 1.0, &[]));
        orch.predict(&request("Vegetative", 1.0, &[]));
        assert_eq!(loader.calls(), 1);

        touch(temp_dir.path(), "reg_model_b.onnx", 10);
        let result = orch.predict(&request("Vegetative", 1.0, &[]));
        assert_eq!(loader.calls(), 2);
        assert_eq!(result.provenance.to_string(), "reg_model_b");
    }

    #[test]
    fn test_exported_artifact_answers_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let weights = fixtures::elapsed_time_weights(&FeatureSchema::current());
        let bytes = fixtures::linear_model(&weights, BIAS, Batch::Fixed);
        fixtures::write_artifact(
            temp_dir.path(),
            "reg_model_2024-06-10_12-00-00.onnx",
            &bytes,
            r#", "schema_version": 2"#,
        );
        let resolver = ModelResolver::new(temp_dir.path(), ArtifactPattern::default());
        let orch = PredictionOrchestrator::new(resolver, Arc::new(OnnxModelLoader::new()));

        let result = orch.predict(&request("Vegetative", 5.0, &[("Soil Humidity", 45.0)]));

        assert_eq!(
            result.provenance,
            Provenance::Model {
                version: "reg_model_2024-06-10_12-00-00".to_string()
            }
        );
        assert!((result.hours_until_next_watering - 7.0).abs() < 1e-5);
        assert_eq!(
            orch.active_version().as_deref(),
            Some("reg_model_2024-06-10_12-00-00")
        );
    }

    #[test]
    fn test_exported_artifact_with_drifted_schema_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let weights = fixtures::elapsed_time_weights(&FeatureSchema::current());
        let bytes = fixtures::linear_model(&weights, BIAS, Batch::Fixed);
        fixtures::write_artifact(
            temp_dir.path(),
            "reg_model_2024-06-10_12-00-00.onnx",
            &bytes,
            r#", "schema_version": 1"#,
        );
        let resolver = ModelResolver::new(temp_dir.path(), ArtifactPattern::default());
        let orch = PredictionOrchestrator::new(resolver, Arc::new(OnnxModelLoader::new()));

        let result = orch.predict(&request("Vegetative", 5.0, &[]));
        assert_eq!(
            result.provenance,
            Provenance::Fallback(FallbackReason::ModelLoadError("schema_mismatch".to_string()))
        );
        assert_in_range(&result);
        assert_eq!(orch.active_version(), None);
    }

    #[test]
    fn test_from_config_rejects_bad_pattern() {
        let config = PredictorConfig {
            model_pattern: "reg_model.onnx".to_string(),
            ..PredictorConfig::default()
        };
        assert!(PredictionOrchestrator::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_with_empty_dir_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let config = PredictorConfig {
            model_dir: temp_dir.path().to_path_buf(),
            ..PredictorConfig::default()
        };
        let orch = PredictionOrchestrator::from_config(&config).unwrap();
        let result = orch.predict(&request("Vegetative", 1.0, &[]));
        assert!(result.is_fallback());
        assert_in_range(&result);
    }
}

#[cfg(test)]
mod scheduler_tests {
    use crate::health::{components, ComponentStatus, HealthRegistry};
    use crate::history::{PredictionLogRecord, PredictionSink};
    use crate::models::PredictionRequest;
    use crate::predictor::{
        ArtifactPattern, BatchScheduler, BatchSource, BatchSummary, ModelResolver,
        OnnxModelLoader, PredictionOrchestrator,
    };
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    struct VecSource(Vec<PredictionRequest>);

    #[async_trait]
    impl BatchSource for VecSource {
        async fn fetch_batch(&self) -> Result<Vec<PredictionRequest>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl BatchSource for BrokenSource {
        async fn fetch_batch(&self) -> Result<Vec<PredictionRequest>> {
            bail!("backend unreachable")
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        records: Mutex<Vec<PredictionLogRecord>>,
        reject_every_other: bool,
    }

    #[async_trait]
    impl PredictionSink for CollectingSink {
        async fn record(&self, record: &PredictionLogRecord) -> Result<()> {
            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            if self.reject_every_other && records.len() % 2 == 0 {
                bail!("history endpoint returned 503");
            }
            Ok(())
        }
    }

    fn empty_orchestrator(dir: &TempDir) -> Arc<PredictionOrchestrator> {
        let resolver = ModelResolver::new(dir.path(), ArtifactPattern::default());
        Arc::new(PredictionOrchestrator::new(resolver, Arc::new(OnnxModelLoader::new())))
    }

    fn requests(n: usize) -> Vec<PredictionRequest> {
        (0..n)
            .map(|i| PredictionRequest {
                timestamp: Utc::now(),
                plant_growth_stage: "Vegetative".to_string(),
                time_since_last_watering_hours: i as f64,
                readings: vec![],
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batch_answers_every_entry() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(CollectingSink::default());
        let scheduler = BatchScheduler::new(
            empty_orchestrator(&temp_dir),
            Arc::new(VecSource(requests(3))),
            sink.clone(),
            Duration::from_secs(300),
        );

        let summary = scheduler.run_batch().await;
        assert_eq!(
            summary,
            BatchSummary {
                total: 3,
                model_backed: 0,
                fallback: 3,
                sink_errors: 0,
            }
        );

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.result.is_fallback()));
        assert_eq!(records[2].request.time_since_last_watering_hours, 2.0);
    }

    #[tokio::test]
    async fn test_sink_errors_do_not_abort_batch() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(CollectingSink {
            reject_every_other: true,
            ..Default::default()
        });
        let scheduler = BatchScheduler::new(
            empty_orchestrator(&temp_dir),
            Arc::new(VecSource(requests(4))),
            sink.clone(),
            Duration::from_secs(300),
        );

        let summary = scheduler.run_batch().await;
        assert_eq!(summary.total, 4);
        assert_eq!(summary.sink_errors, 2);
        assert_eq!(sink.records.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_empty_batch() {
        let temp_dir = TempDir::new().unwrap();
        let scheduler = BatchScheduler::new(
            empty_orchestrator(&temp_dir),
            Arc::new(BrokenSource),
            Arc::new(CollectingSink::default()),
            Duration::from_secs(300),
        );

        let summary = scheduler.run_batch().await;
        assert_eq!(summary, BatchSummary::default());

        let stats = scheduler.stats().await;
        assert_eq!(stats.batches_run, 1);
        assert_eq!(stats.fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_fetch_outcome_drives_scheduler_health() {
        let temp_dir = TempDir::new().unwrap();
        let registry = HealthRegistry::new();
        registry.register(components::SCHEDULER).await;

        let broken = BatchScheduler::new(
            empty_orchestrator(&temp_dir),
            Arc::new(BrokenSource),
            Arc::new(CollectingSink::default()),
            Duration::from_secs(300),
        )
        .with_health(registry.clone());
        broken.run_batch().await;

        let health = registry.health().await;
        let scheduler = &health.components[components::SCHEDULER];
        assert_eq!(scheduler.status, ComponentStatus::Degraded);
        assert!(scheduler
            .message
            .as_deref()
            .unwrap()
            .contains("backend unreachable"));
        assert_eq!(health.status, ComponentStatus::Degraded);

        let recovered = BatchScheduler::new(
            empty_orchestrator(&temp_dir),
            Arc::new(VecSource(requests(1))),
            Arc::new(CollectingSink::default()),
            Duration::from_secs(300),
        )
        .with_health(registry.clone());
        recovered.run_batch().await;

        let health = registry.health().await;
        assert_eq!(health.components[components::SCHEDULER].status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let scheduler = Arc::new(BatchScheduler::new(
            empty_orchestrator(&temp_dir),
            Arc::new(VecSource(requests(1))),
            Arc::new(CollectingSink::default()),
            Duration::from_secs(3600),
        ));

        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
        let handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));

        // first tick fires immediately
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        let stats = scheduler.stats().await;
        assert_eq!(stats.batches_run, 1);
        assert_eq!(stats.total_predictions, 1);
        assert_eq!(stats.fallback_predictions, 1);
    }
}
