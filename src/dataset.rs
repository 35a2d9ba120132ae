use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use polars::frame::DataFrame;
use polars::prelude::*;

use crate::error::{HeartRiskError, Result};
use crate::records::{
    FieldKind, FieldValue, SurveyField, SurveyRecordSchema, LABEL_COLUMN, SURVEY_FIELDS, YES_NO,
};

/// One survey column of the reference dataset, typed by its field kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

/// Immutable in-memory copy of the reference dataset, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ReferenceDataset {
    columns: Vec<ColumnData>,
    labels: Vec<i32>,
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => HeartRiskError::DatasetNotFound {
            path: path.to_path_buf(),
        },
        _ => e.into(),
    })
}

/// Compare the CSV header against the survey fields plus the label.
fn check_header(path: &Path) -> Result<()> {
    let header = CsvReader::new(open(path)?)
        .has_header(true)
        .with_n_rows(Some(0))
        .finish()?;
    let found = header.get_column_names();
    let expected = SurveyRecordSchema::expected_columns();

    let missing: Vec<String> = expected
        .iter()
        .filter(|name| !found.contains(name))
        .map(|name| name.to_string())
        .collect();
    let unexpected: Vec<String> = found
        .iter()
        .filter(|name| !expected.iter().any(|e| e == *name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        Ok(())
    } else {
        Err(HeartRiskError::SchemaMismatch { missing, unexpected })
    }
}

pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let path = path.as_ref();
    check_header(path)?;

    let df = CsvReader::new(open(path)?)
        .has_header(true)
        .with_dtypes(Option::from(Arc::new(SurveyRecordSchema::raw_schema())))
        .finish()?;
    Ok(df)
}

fn parse_label(value: Option<&str>, row: usize) -> Result<i32> {
    match value {
        Some("Yes") => Ok(1),
        Some("No") => Ok(0),
        Some(other) => Err(HeartRiskError::InvalidLabel {
            value: other.to_string(),
            row,
        }),
        None => Err(HeartRiskError::MissingValue {
            column: LABEL_COLUMN.to_string(),
            row,
        }),
    }
}

impl ReferenceDataset {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let df = read_csv(path)?;
        let dataset = Self::from_frame(&df)?;
        info!(
            "loaded reference dataset {:?}: {} rows, {} positive",
            path,
            dataset.len(),
            dataset.labels.iter().filter(|l| **l == 1).count()
        );
        Ok(dataset)
    }

    /// Pull the label and survey columns out of a frame typed by `raw_schema`.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        if df.height() == 0 {
            return Err(HeartRiskError::EmptyDataset);
        }

        let labels = df
            .column(LABEL_COLUMN)?
            .utf8()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| parse_label(value, row))
            .collect::<Result<Vec<i32>>>()?;

        let mut columns = Vec::with_capacity(SURVEY_FIELDS.len());
        for field in SURVEY_FIELDS.iter() {
            let missing = |row: usize| HeartRiskError::MissingValue {
                column: field.name.to_string(),
                row,
            };
            let series = df.column(field.name)?;
            let column = if field.kind.is_numeric() {
                let values = series.cast(&DataType::Float64)?;
                let values = values
                    .f64()?
                    .into_iter()
                    .enumerate()
                    .map(|(row, value)| value.ok_or_else(|| missing(row)))
                    .collect::<Result<Vec<f64>>>()?;
                ColumnData::Numeric(values)
            } else {
                let values = series
                    .utf8()?
                    .into_iter()
                    .enumerate()
                    .map(|(row, value)| value.map(str::to_string).ok_or_else(|| missing(row)))
                    .collect::<Result<Vec<String>>>()?;
                ColumnData::Categorical(values)
            };
            columns.push(column);
        }
        debug!("converted {} survey columns", columns.len());

        Ok(Self { columns, labels })
    }

    #[cfg(test)]
    pub(crate) fn from_columns(columns: Vec<ColumnData>, labels: Vec<i32>) -> Self {
        Self { columns, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn column(&self, field: usize) -> &ColumnData {
        &self.columns[field]
    }

    pub fn value(&self, field: usize, row: usize) -> FieldValue<'_> {
        match &self.columns[field] {
            ColumnData::Numeric(values) => FieldValue::Number(values[row]),
            ColumnData::Categorical(values) => FieldValue::Category(&values[row]),
        }
    }
}

/// Allowed answers for one survey field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDomain {
    Range { min: f64, max: f64, default: f64 },
    Choices(Vec<String>),
}

/// Field name to allowed values, computed once from the reference dataset and
/// shared by the form, the assembler and the encoder.
#[derive(Debug, Clone)]
pub struct SurveySchema {
    domains: Vec<FieldDomain>,
}

impl SurveySchema {
    pub fn from_dataset(dataset: &ReferenceDataset) -> Self {
        let domains = SURVEY_FIELDS
            .iter()
            .enumerate()
            .map(|(idx, field)| match field.kind {
                FieldKind::Numeric { min, max, default } => FieldDomain::Range { min, max, default },
                FieldKind::YesNo => FieldDomain::Choices(YES_NO.iter().map(|s| s.to_string()).collect()),
                FieldKind::Observed => {
                    // first-appearance order, as the selection lists show them
                    let mut seen: Vec<String> = Vec::new();
                    if let ColumnData::Categorical(values) = dataset.column(idx) {
                        for value in values {
                            if !seen.contains(value) {
                                seen.push(value.clone());
                            }
                        }
                    }
                    FieldDomain::Choices(seen)
                }
            })
            .collect();
        Self { domains }
    }

    pub fn domain(&self, field: usize) -> &FieldDomain {
        &self.domains[field]
    }

    pub fn domains(&self) -> impl Iterator<Item = (&'static SurveyField, &FieldDomain)> {
        SURVEY_FIELDS.iter().zip(self.domains.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{reference_rows, write_csv, write_reference_csv, HEADER};

    #[test]
    fn loads_fixture_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = ReferenceDataset::load(write_reference_csv(dir.path())).unwrap();

        assert_eq!(dataset.len(), 60);
        assert_eq!(dataset.labels().iter().filter(|l| **l == 1).count(), 24);
        let bmi = SurveyRecordSchema::field_index("BMI").unwrap();
        assert_eq!(dataset.value(bmi, 0), FieldValue::Number(18.5));
        let diabetic = SurveyRecordSchema::field_index("Diabetic").unwrap();
        assert_eq!(
            dataset.value(diabetic, 2),
            FieldValue::Category("No, borderline diabetes")
        );
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReferenceDataset::load(dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, HeartRiskError::DatasetNotFound { .. }));
    }

    #[test]
    fn header_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let header = HEADER.replace("SkinCancer", "Height");
        write_csv(&path, &header, &reference_rows(3));

        match ReferenceDataset::load(&path).unwrap_err() {
            HeartRiskError::SchemaMismatch { missing, unexpected } => {
                assert_eq!(missing, vec!["SkinCancer".to_string()]);
                assert_eq!(unexpected, vec!["Height".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn quoted_header_names_are_compared_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let header = HEADER.replace("SkinCancer", "\"Skin,Cancer\"");
        write_csv(&path, &header, &reference_rows(3));

        match ReferenceDataset::load(&path).unwrap_err() {
            HeartRiskError::SchemaMismatch { missing, unexpected } => {
                assert_eq!(missing, vec!["SkinCancer".to_string()]);
                assert_eq!(unexpected, vec!["Skin,Cancer".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn invalid_label_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut rows = reference_rows(3);
        rows[1] = rows[1].replacen("No", "Maybe", 1);
        write_csv(&path, HEADER, &rows);

        let err = ReferenceDataset::load(&path).unwrap_err();
        assert!(matches!(err, HeartRiskError::InvalidLabel { row: 1, .. }));
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        write_csv(&path, HEADER, &[]);
        assert!(ReferenceDataset::load(&path).is_err());
    }

    #[test]
    fn schema_keeps_first_appearance_order() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = ReferenceDataset::load(write_reference_csv(dir.path())).unwrap();
        let schema = SurveySchema::from_dataset(&dataset);

        let race = SurveyRecordSchema::field_index("Race").unwrap();
        assert_eq!(
            schema.domain(race),
            &FieldDomain::Choices(vec![
                "White".to_string(),
                "Black".to_string(),
                "Hispanic".to_string(),
                "Asian".to_string()
            ])
        );
        let smoking = SurveyRecordSchema::field_index("Smoking").unwrap();
        assert_eq!(
            schema.domain(smoking),
            &FieldDomain::Choices(vec!["No".to_string(), "Yes".to_string()])
        );
        let sleep = SurveyRecordSchema::field_index("SleepTime").unwrap();
        assert_eq!(
            schema.domain(sleep),
            &FieldDomain::Range {
                min: 0.0,
                max: 24.0,
                default: 7.0
            }
        );
    }
}
