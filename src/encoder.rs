use std::collections::BTreeSet;

use log::debug;
use serde::Serialize;

use crate::dataset::{ColumnData, ReferenceDataset};
use crate::error::{HeartRiskError, Result};
use crate::records::{FieldValue, SURVEY_FIELDS};
use crate::survey::SurveyRecord;

#[derive(Debug, Clone, PartialEq)]
enum ColumnSource {
    Numeric { field: usize },
    Indicator { field: usize, category: String },
}

/// Encoded column order: numeric fields first, then one indicator per
/// category after the first (sorted) one for every categorical field.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    names: Vec<String>,
    sources: Vec<ColumnSource>,
    categories: Vec<Option<BTreeSet<String>>>,
}

impl ColumnLayout {
    fn from_categories(categories: Vec<Option<BTreeSet<String>>>) -> Self {
        let mut names = Vec::new();
        let mut sources = Vec::new();

        for (field, def) in SURVEY_FIELDS.iter().enumerate() {
            if categories[field].is_none() {
                names.push(def.name.to_string());
                sources.push(ColumnSource::Numeric { field });
            }
        }
        for (field, def) in SURVEY_FIELDS.iter().enumerate() {
            if let Some(values) = &categories[field] {
                // the first category is the dropped reference level
                for category in values.iter().skip(1) {
                    names.push(format!("{}_{}", def.name, category));
                    sources.push(ColumnSource::Indicator {
                        field,
                        category: category.clone(),
                    });
                }
            }
        }

        Self {
            names,
            sources,
            categories,
        }
    }

    fn observed_categories(dataset: &ReferenceDataset) -> Vec<Option<BTreeSet<String>>> {
        (0..SURVEY_FIELDS.len())
            .map(|field| match dataset.column(field) {
                ColumnData::Numeric(_) => None,
                ColumnData::Categorical(values) => Some(values.iter().cloned().collect()),
            })
            .collect()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    fn check_known(&self, record: &SurveyRecord) -> Result<()> {
        for (field, known) in self.categories.iter().enumerate() {
            if let (Some(known), FieldValue::Category(value)) = (known, record.value(field)) {
                if !known.contains(value) {
                    return Err(HeartRiskError::UncoveredCategory {
                        field: SURVEY_FIELDS[field].name.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Unscaled encoding of a row given a per-field accessor.
    fn raw_row<'a, F>(&self, value_of: F) -> Vec<f64>
    where
        F: Fn(usize) -> FieldValue<'a>,
    {
        self.sources
            .iter()
            .map(|source| match source {
                ColumnSource::Numeric { field } => match value_of(*field) {
                    FieldValue::Number(n) => n,
                    FieldValue::Category(_) => f64::NAN,
                },
                ColumnSource::Indicator { field, category } => match value_of(*field) {
                    FieldValue::Category(c) if c == category.as_str() => 1.0,
                    _ => 0.0,
                },
            })
            .collect()
    }
}

/// Column means and population standard deviations.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit over rows with a running mean/variance update, so the rows never
    /// have to be materialised as a matrix.
    pub fn fit<I>(width: usize, rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<f64>>,
    {
        let mut count = 0usize;
        let mut means = vec![0.0; width];
        let mut m2 = vec![0.0; width];

        for row in rows {
            count += 1;
            let n = count as f64;
            for (j, x) in row.into_iter().enumerate() {
                let delta = x - means[j];
                means[j] += delta / n;
                m2[j] += delta * (x - means[j]);
            }
        }

        let scales = m2
            .into_iter()
            .map(|m| {
                let std = if count > 0 { (m / count as f64).sqrt() } else { 0.0 };
                // constant columns keep their centred value
                if std == 0.0 {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Self { means, scales }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.scales.iter()))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}

/// The user's encoded features with their column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedRow {
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

/// One-hot plus standard scaling with categories and statistics frozen over
/// the reference dataset.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    layout: ColumnLayout,
    scaler: StandardScaler,
}

impl FeatureEncoder {
    pub fn fit(dataset: &ReferenceDataset) -> Self {
        let layout = ColumnLayout::from_categories(ColumnLayout::observed_categories(dataset));
        let scaler = StandardScaler::fit(
            layout.width(),
            (0..dataset.len()).map(|row| layout.raw_row(|field| dataset.value(field, row))),
        );
        debug!("fitted encoder over {} rows, {} columns", dataset.len(), layout.width());
        Self { layout, scaler }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// One-hot encoding of the record before scaling.
    pub fn raw(&self, record: &SurveyRecord) -> Result<Vec<f64>> {
        self.layout.check_known(record)?;
        Ok(self.layout.raw_row(|field| record.value(field)))
    }

    pub fn transform(&self, record: &SurveyRecord) -> Result<EncodedRow> {
        let raw = self.raw(record)?;
        Ok(EncodedRow {
            names: self.layout.names.clone(),
            values: self.scaler.transform(&raw),
        })
    }

    /// Encoded and scaled reference rows, in dataset order.
    pub fn transform_dataset(&self, dataset: &ReferenceDataset) -> Vec<Vec<f64>> {
        (0..dataset.len())
            .map(|row| {
                let raw = self.layout.raw_row(|field| dataset.value(field, row));
                self.scaler.transform(&raw)
            })
            .collect()
    }
}

/// Stack the user row on top of the reference rows, fit the categories and
/// the scaler on the stacked data and return the user's row.
///
/// The statistics move slightly with every new row. Categories the reference
/// data never saw add columns instead of failing here.
pub fn encode_stacked(dataset: &ReferenceDataset, record: &SurveyRecord) -> EncodedRow {
    let (layout, scaler, user) = fit_stacked(dataset, record);
    EncodedRow {
        values: scaler.transform(&user),
        names: layout.names,
    }
}

/// Layout and scaler fitted over the user row plus every reference row,
/// together with the user's unscaled row.
fn fit_stacked(
    dataset: &ReferenceDataset,
    record: &SurveyRecord,
) -> (ColumnLayout, StandardScaler, Vec<f64>) {
    let mut categories = ColumnLayout::observed_categories(dataset);
    for (field, known) in categories.iter_mut().enumerate() {
        if let (Some(known), FieldValue::Category(value)) = (known, record.value(field)) {
            known.insert(value.to_string());
        }
    }
    let layout = ColumnLayout::from_categories(categories);

    let user = layout.raw_row(|field| record.value(field));
    let reference = (0..dataset.len()).map(|row| layout.raw_row(|field| dataset.value(field, row)));
    let scaler = StandardScaler::fit(layout.width(), std::iter::once(user.clone()).chain(reference));

    (layout, scaler, user)
}
