use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use polars::frame::DataFrame;
use polars::prelude::*;
use serde::Serialize;

use crate::dataset::{FieldDomain, SurveySchema};
use crate::error::{HeartRiskError, Result};
use crate::records::{FieldValue, SurveyRecordSchema, SURVEY_FIELDS};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Answer {
    Number(f64),
    Category(String),
}

/// A single user row, one answer per survey field in field order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyRecord {
    answers: Vec<Answer>,
}

fn parse_answer(name: &str, raw: &str, domain: &FieldDomain) -> Result<Answer> {
    match domain {
        FieldDomain::Range { min, max, .. } => {
            let value: f64 = raw
                .trim()
                .parse()
                .map_err(|_| HeartRiskError::InvalidNumber {
                    field: name.to_string(),
                    value: raw.to_string(),
                })?;
            if !(value >= *min && value <= *max) {
                return Err(HeartRiskError::OutOfRange {
                    field: name.to_string(),
                    value,
                    min: *min,
                    max: *max,
                });
            }
            Ok(Answer::Number(value))
        }
        FieldDomain::Choices(choices) => {
            if choices.iter().any(|c| c == raw) {
                Ok(Answer::Category(raw.to_string()))
            } else {
                Err(HeartRiskError::UnknownCategory {
                    field: name.to_string(),
                    value: raw.to_string(),
                })
            }
        }
    }
}

fn default_answer(name: &str, domain: &FieldDomain) -> Result<Answer> {
    match domain {
        FieldDomain::Range { default, .. } => Ok(Answer::Number(*default)),
        // a selection list starts on its first option
        FieldDomain::Choices(choices) => choices
            .first()
            .map(|c| Answer::Category(c.clone()))
            .ok_or_else(|| HeartRiskError::UnknownCategory {
                field: name.to_string(),
                value: String::new(),
            }),
    }
}

impl SurveyRecord {
    /// Build the user row from raw form answers keyed by field name.
    ///
    /// Unanswered fields take the form's initial value. Answers outside the
    /// schema's ranges or choices are rejected.
    pub fn assemble(schema: &SurveySchema, answers: &HashMap<String, String>) -> Result<Self> {
        if let Some(name) = answers
            .keys()
            .find(|name| SurveyRecordSchema::field_index(name).is_none())
        {
            return Err(HeartRiskError::UnknownField { name: name.clone() });
        }

        let answers = schema
            .domains()
            .map(|(field, domain)| match answers.get(field.name) {
                Some(raw) => parse_answer(field.name, raw, domain),
                None => default_answer(field.name, domain),
            })
            .collect::<Result<Vec<Answer>>>()?;

        Ok(Self { answers })
    }

    pub fn answer(&self, field: usize) -> &Answer {
        &self.answers[field]
    }

    pub fn value(&self, field: usize) -> FieldValue<'_> {
        match &self.answers[field] {
            Answer::Number(n) => FieldValue::Number(*n),
            Answer::Category(c) => FieldValue::Category(c),
        }
    }

    /// Replace one answer without consulting a schema.
    #[cfg(test)]
    pub(crate) fn with_answer(mut self, field: usize, answer: Answer) -> Self {
        self.answers[field] = answer;
        self
    }

    /// One-row frame named like the reference dataset, label excluded.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let columns: Vec<Series> = SURVEY_FIELDS
            .iter()
            .zip(self.answers.iter())
            .map(|(field, answer)| match answer {
                Answer::Number(n) => Series::new(field.name, &[*n]),
                Answer::Category(c) => Series::new(field.name, &[c.as_str()]),
            })
            .collect();
        Ok(DataFrame::new(columns)?)
    }

    /// Write the row as a one-line CSV snapshot. Nothing downstream reads it.
    pub fn write_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut df = self.to_frame()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).finish(&mut df)?;
        Ok(())
    }
}
