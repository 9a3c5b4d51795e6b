use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::{
    ImageAsset,
    analysis::ela::ElaAnalyzer,
    classifier::Classifier,
    config::Config,
    error::{DetectorError, Result},
    image_utils::encode_jpeg,
    judge::{InlineImage, Judge, JudgeRequest, prompt},
    resource::{LoadState, ResourceManager},
    verdict::{ThresholdPolicy, Verdict, normalize_judgment, parse_judgment},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Pretrained binary classifier with a confidence threshold.
    Classifier,
    /// Original image plus its ELA map, interpreted by the external judge.
    Forensic,
    /// A single re-compressed copy, interpreted by the external judge.
    CompressionAudit,
}

pub type ClassifierManager = ResourceManager<Classifier>;
pub type JudgeManager = ResourceManager<Box<dyn Judge>>;

pub struct Decider {
    classifier: Arc<ClassifierManager>,
    judge: Arc<JudgeManager>,
    policy: ThresholdPolicy,
    ela: ElaAnalyzer,
}

impl Decider {
    pub fn new(classifier: Arc<ClassifierManager>, judge: Arc<JudgeManager>) -> Self {
        Self {
            classifier,
            judge,
            policy: ThresholdPolicy::default(),
            ela: ElaAnalyzer::default(),
        }
    }

    pub fn from_config(
        config: &Config,
        classifier: Arc<ClassifierManager>,
        judge: Arc<JudgeManager>,
    ) -> Result<Self> {
        Ok(Self::new(classifier, judge)
            .with_policy(ThresholdPolicy::new(config.confidence_threshold)?)
            .with_ela(ElaAnalyzer::new(config.ela_quality)))
    }

    pub fn with_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_ela(mut self, ela: ElaAnalyzer) -> Self {
        self.ela = ela;
        self
    }

    pub fn classifier(&self) -> &ClassifierManager {
        &self.classifier
    }

    pub fn judge(&self) -> &JudgeManager {
        &self.judge
    }

    pub fn classifier_state(&self) -> LoadState {
        self.classifier.state()
    }

    pub fn judge_state(&self) -> LoadState {
        self.judge.state()
    }

    pub async fn decide(&self, bytes: Vec<u8>, strategy: Strategy) -> Result<Verdict> {
        let verdict = match strategy {
            Strategy::Classifier => self.classify(bytes).await?,
            Strategy::Forensic => self.judge_with_ela(bytes).await?,
            Strategy::CompressionAudit => self.judge_recompressed(bytes).await?,
        };

        info!(
            "{:?} verdict: {} ({:.2}%)",
            strategy,
            verdict.label.short_name(),
            verdict.confidence_percent()
        );
        Ok(verdict)
    }

    async fn classify(&self, bytes: Vec<u8>) -> Result<Verdict> {
        let manager = Arc::clone(&self.classifier);
        let policy = self.policy;

        blocking(move || {
            // Undecodable input must not trigger a cold-start load.
            let asset = ImageAsset::decode(bytes)?;
            let classifier = manager.ensure_loaded()?;
            let probabilities = classifier.classify(&asset.image)?;
            Ok(policy.decide(probabilities))
        })
        .await
    }

    async fn judge_with_ela(&self, bytes: Vec<u8>) -> Result<Verdict> {
        let ela = self.ela;
        let (asset, error_map) = blocking(move || {
            let asset = ImageAsset::decode(bytes)?;
            let result = ela.analyze(&asset.image)?;
            Ok((asset, result.encoded))
        })
        .await?;

        let request = JudgeRequest {
            prompt: prompt::ELA_PROMPT.to_string(),
            images: vec![
                InlineImage::new(asset.mime_type, asset.bytes),
                InlineImage::new("image/jpeg", error_map),
            ],
        };
        self.ask_judge(request).await
    }

    async fn judge_recompressed(&self, bytes: Vec<u8>) -> Result<Verdict> {
        let quality = self.ela.quality();
        let stressed = blocking(move || {
            let asset = ImageAsset::decode(bytes)?;
            encode_jpeg(&asset.image, quality)
        })
        .await?;

        let request = JudgeRequest {
            prompt: prompt::COMPRESSION_AUDIT_PROMPT.to_string(),
            images: vec![InlineImage::new("image/jpeg", stressed)],
        };
        self.ask_judge(request).await
    }

    async fn ask_judge(&self, request: JudgeRequest) -> Result<Verdict> {
        let manager = Arc::clone(&self.judge);
        let judge = blocking(move || manager.ensure_loaded()).await?;

        let text = judge.judge(request).await?;
        debug!("{} answered: {}", judge.judge_name(), text.trim());

        Ok(normalize_judgment(&parse_judgment(&text)))
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| DetectorError::Inference(format!("worker task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use ndarray::{Array1, Array2};

    use super::*;
    use crate::{
        classifier::{head::ClassifierHead, preprocess::{ImagePreprocessor, ImageSize, PreprocessorConfig}},
        image_utils::encode_png,
        verdict::{Label, VerdictSource},
    };

    struct ScriptedJudge {
        answer: String,
        seen: Arc<Mutex<Vec<JudgeRequest>>>,
    }

    #[async_trait]
    impl Judge for ScriptedJudge {
        async fn judge(&self, request: JudgeRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request);
            Ok(self.answer.clone())
        }

        fn judge_name(&self) -> &str {
            "scripted"
        }
    }

    fn test_classifier(bias_real: f32) -> Classifier {
        let preprocessor = ImagePreprocessor::new(PreprocessorConfig {
            size: ImageSize::Square(8),
            ..Default::default()
        })
        .unwrap();
        let head = ClassifierHead::new(
            ["real".into(), "artificial".into()],
            1,
            Array2::zeros((2, 3)),
            Array1::from(vec![bias_real, 0.0]),
        )
        .unwrap();
        Classifier::new(preprocessor, head).unwrap()
    }

    fn decider(
        bias_real: f32,
        answer: &str,
        loads: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<JudgeRequest>>>,
    ) -> Decider {
        let classifier = ResourceManager::new("classifier", move || -> Result<Classifier> {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(test_classifier(bias_real))
        });
        let answer = answer.to_string();
        let judge = ResourceManager::new("judge", move || -> Result<Box<dyn Judge>> {
            Ok(Box::new(ScriptedJudge {
                answer: answer.clone(),
                seen: Arc::clone(&seen),
            }))
        });
        Decider::new(Arc::new(classifier), Arc::new(judge))
    }

    fn white_png() -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(24, 24, Rgb([255, 255, 255]))).unwrap()
    }

    #[tokio::test]
    async fn test_classifier_path() {
        let loads = Arc::new(AtomicUsize::new(0));
        // logits (3, 0): p_real ~ 0.953
        let decider = decider(3.0, "", Arc::clone(&loads), Default::default());

        let verdict = decider.decide(white_png(), Strategy::Classifier).await.unwrap();
        assert_eq!(verdict.label, Label::Authentic);
        assert_eq!(verdict.source, VerdictSource::Classifier);
        assert!(verdict.confidence > 0.95);

        let again = decider.decide(white_png(), Strategy::Classifier).await.unwrap();
        assert_eq!(verdict, again);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_classifier_below_threshold() {
        // logits (1, 0): p_real ~ 0.731
        let decider = decider(1.0, "", Default::default(), Default::default());

        let verdict = decider.decide(white_png(), Strategy::Classifier).await.unwrap();
        assert_eq!(verdict.label, Label::Artificial);
        assert!((verdict.confidence - 1.0 / (1.0 + 1f64.exp())).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_bad_bytes_do_not_load_the_model() {
        let loads = Arc::new(AtomicUsize::new(0));
        let decider = decider(3.0, "", Arc::clone(&loads), Default::default());

        let err = decider
            .decide(b"GIF89a-but-not-really".to_vec(), Strategy::Classifier)
            .await
            .unwrap_err();

        assert!(matches!(err, DetectorError::InvalidImage(_)));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(decider.classifier_state(), LoadState::Unloaded);
    }

    #[tokio::test]
    async fn test_forensic_path_sends_original_and_map() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let decider = decider(
            0.0,
            "```json\n{\"final_verdict\": \"REAL\"}\n```",
            Default::default(),
            Arc::clone(&seen),
        );

        let verdict = decider.decide(white_png(), Strategy::Forensic).await.unwrap();
        assert_eq!(verdict.label, Label::Authentic);
        assert_eq!(verdict.confidence_percent(), 100.0);

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, prompt::ELA_PROMPT);
        assert_eq!(requests[0].images.len(), 2);
        assert_eq!(requests[0].images[0].mime_type, "image/png");
        assert_eq!(requests[0].images[1].mime_type, "image/jpeg");
        assert_eq!(decider.classifier_state(), LoadState::Unloaded);
    }

    #[tokio::test]
    async fn test_compression_audit_sends_one_image() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let decider = decider(0.0, "{\"final_verdict\": \"FAKE\"}", Default::default(), Arc::clone(&seen));

        let verdict = decider
            .decide(white_png(), Strategy::CompressionAudit)
            .await
            .unwrap();
        assert_eq!(verdict.label, Label::Artificial);
        assert!(!verdict.is_fallback());

        let requests = seen.lock().unwrap();
        assert_eq!(requests[0].prompt, prompt::COMPRESSION_AUDIT_PROMPT);
        assert_eq!(requests[0].images.len(), 1);
    }

    #[tokio::test]
    async fn test_unusable_judge_answer_falls_back() {
        let decider = decider(0.0, "Sorry, I cannot help with that.", Default::default(), Default::default());

        let verdict = decider.decide(white_png(), Strategy::Forensic).await.unwrap();
        assert_eq!(verdict.label, Label::Artificial);
        assert!(verdict.is_fallback());
    }
}
