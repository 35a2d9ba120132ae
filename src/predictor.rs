use std::path::PathBuf;

use log::{debug, warn};
use serde::Serialize;

use crate::dataset::{ReferenceDataset, SurveySchema};
use crate::encoder::{encode_stacked, EncodedRow, FeatureEncoder};
use crate::error::{HeartRiskError, Result};
use crate::model::Classifier;
use crate::survey::SurveyRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingMode {
    /// Categories and scaler statistics fixed at load time.
    Frozen,
    /// Refit on the user row stacked over the reference rows, per request.
    Stacked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Healthy,
    AtRisk,
}

impl Verdict {
    pub fn from_label(label: u8) -> Self {
        if label == 0 {
            Verdict::Healthy
        } else {
            Verdict::AtRisk
        }
    }

    pub fn image(&self) -> &'static str {
        match self {
            Verdict::Healthy => "heart-okay.jpg",
            Verdict::AtRisk => "heart-bad.jpg",
        }
    }

    pub fn caption(&self) -> &'static str {
        match self {
            Verdict::Healthy => "Your heart seems to be okay! - Dr. RandomForest Classifier",
            Verdict::AtRisk => {
                "I'm not satisfied with the condition of your heart! - Dr. RandomForest Classifier"
            }
        }
    }
}

/// Percentage rounded to two decimals, printed with at least one decimal
/// (`12.5`, `40.0`).
pub fn format_percent(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub label: u8,
    pub probabilities: [f64; 2],
    pub risk_percent: f64,
    pub verdict: Verdict,
    pub message: String,
    pub image: String,
    pub caption: String,
}

impl Assessment {
    /// The class-1 probability is reported as the risk in both verdicts.
    pub fn new(label: u8, probabilities: [f64; 2]) -> Self {
        let risk_percent = (probabilities[1] * 100.0 * 100.0).round() / 100.0;
        let verdict = Verdict::from_label(label);
        let percent = format_percent(risk_percent);
        let message = match verdict {
            Verdict::Healthy => format!(
                "The probability that you'll have heart disease is {percent}%. You are healthy!"
            ),
            Verdict::AtRisk => format!(
                "The probability that you will have heart disease is {percent}%. \
                 It sounds like you are not healthy."
            ),
        };
        Self {
            label,
            probabilities,
            risk_percent,
            verdict,
            message,
            image: verdict.image().to_string(),
            caption: verdict.caption().to_string(),
        }
    }
}

/// Everything one request needs, loaded once and shared read-only.
pub struct RiskPredictor {
    schema: SurveySchema,
    dataset: ReferenceDataset,
    encoder: FeatureEncoder,
    model: Box<dyn Classifier + Send + Sync>,
    mode: EncodingMode,
    snapshot: Option<PathBuf>,
}

impl RiskPredictor {
    pub fn new(
        dataset: ReferenceDataset,
        model: Box<dyn Classifier + Send + Sync>,
        mode: EncodingMode,
    ) -> Self {
        let schema = SurveySchema::from_dataset(&dataset);
        let encoder = FeatureEncoder::fit(&dataset);
        if encoder.layout().width() != model.n_features() {
            warn!(
                "reference dataset encodes to {} columns but the model expects {}",
                encoder.layout().width(),
                model.n_features()
            );
        }
        Self {
            schema,
            dataset,
            encoder,
            model,
            mode,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot = path;
        self
    }

    pub fn schema(&self) -> &SurveySchema {
        &self.schema
    }

    pub fn encode(&self, record: &SurveyRecord) -> Result<EncodedRow> {
        let row = match self.mode {
            EncodingMode::Frozen => self.encoder.transform(record)?,
            EncodingMode::Stacked => encode_stacked(&self.dataset, record),
        };
        self.check_features(&row)?;
        Ok(row)
    }

    fn check_features(&self, row: &EncodedRow) -> Result<()> {
        let expected = self.model.feature_names();
        if row.values.len() != expected.len() {
            return Err(HeartRiskError::DimensionMismatch {
                expected: expected.len(),
                actual: row.values.len(),
            });
        }
        if let Some((position, (actual, expected))) = row
            .names
            .iter()
            .zip(expected.iter())
            .enumerate()
            .find(|(_, (actual, expected))| actual != expected)
        {
            return Err(HeartRiskError::FeatureMismatch {
                position,
                expected: expected.clone(),
                actual: actual.clone(),
            });
        }
        Ok(())
    }

    /// Encode the record, run the model and build the verdict.
    pub fn assess(&self, record: &SurveyRecord) -> Result<Assessment> {
        if let Some(path) = &self.snapshot {
            if let Err(e) = record.write_snapshot(path) {
                warn!("could not write input snapshot {:?}: {}", path, e);
            }
        }

        let row = self.encode(record)?;
        let label = self.model.predict(&row.values)?;
        let probabilities = self.model.predict_proba(&row.values)?;
        debug!("label {} probabilities {:?}", label, probabilities);

        Ok(Assessment::new(label, probabilities))
    }
}
