use polars::prelude::{DataType, Field, Schema};

/// Name of the label column in the reference dataset.
pub const LABEL_COLUMN: &str = "HeartDisease";

/// Options offered for every yes/no question.
pub const YES_NO: [&str; 2] = ["No", "Yes"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Bounded numeric input.
    Numeric { min: f64, max: f64, default: f64 },
    /// Selection limited to ("No", "Yes").
    YesNo,
    /// Selection limited to the values observed in the reference dataset.
    Observed,
}

impl FieldKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Numeric { .. })
    }
}

/// A single cell of a survey row, borrowed from a record or the dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Number(f64),
    Category(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurveyField {
    pub name: &'static str,
    pub prompt: &'static str,
    pub kind: FieldKind,
}

const fn numeric(name: &'static str, prompt: &'static str, min: f64, max: f64, default: f64) -> SurveyField {
    SurveyField {
        name,
        prompt,
        kind: FieldKind::Numeric { min, max, default },
    }
}

const fn yes_no(name: &'static str, prompt: &'static str) -> SurveyField {
    SurveyField {
        name,
        prompt,
        kind: FieldKind::YesNo,
    }
}

const fn observed(name: &'static str, prompt: &'static str) -> SurveyField {
    SurveyField {
        name,
        prompt,
        kind: FieldKind::Observed,
    }
}

/// Survey fields in the order the user row is assembled. The encoded feature
/// layout follows this order, numeric fields first.
pub static SURVEY_FIELDS: [SurveyField; 17] = [
    numeric(
        "PhysicalHealth",
        "For how many days during the past 30 days was your physical health not good?",
        0.0,
        30.0,
        0.0,
    ),
    numeric(
        "MentalHealth",
        "For how many days during the past 30 days was your mental health not good?",
        0.0,
        30.0,
        0.0,
    ),
    numeric("SleepTime", "How many hours on average do you sleep?", 0.0, 24.0, 7.0),
    numeric("BMI", "BMI", 0.0, 50.0, 21.0),
    yes_no(
        "Smoking",
        "Have you smoked at least 100 cigarettes in your entire life (approx. 5 packs)?",
    ),
    yes_no(
        "AlcoholDrinking",
        "Do you have more than 14 drinks of alcohol (men) or more than 7 (women) in a week?",
    ),
    yes_no("Stroke", "Did you have a stroke?"),
    yes_no("DiffWalking", "Do you have serious difficulty walking or climbing stairs?"),
    observed("Sex", "Sex"),
    observed("AgeCategory", "Age category"),
    observed("Race", "Race"),
    observed("Diabetic", "Have you ever had diabetes?"),
    yes_no(
        "PhysicalActivity",
        "Have you played any sports (running, biking, etc.) in the past month?",
    ),
    observed("GenHealth", "How can you define your general health?"),
    yes_no("Asthma", "Do you have asthma?"),
    yes_no("KidneyDisease", "Do you have kidney disease?"),
    yes_no("SkinCancer", "Do you have skin cancer?"),
];

pub struct SurveyRecordSchema {}

impl SurveyRecordSchema {
    /// Column types used when reading the reference CSV.
    pub fn raw_schema() -> Schema {
        let mut fields = vec![Field::new(LABEL_COLUMN, DataType::Utf8)];
        fields.extend(SURVEY_FIELDS.iter().map(|field| {
            let dtype = if field.kind.is_numeric() {
                DataType::Float64
            } else {
                DataType::Utf8
            };
            Field::new(field.name, dtype)
        }));
        Schema::from_iter(fields)
    }

    pub fn field_index(name: &str) -> Option<usize> {
        SURVEY_FIELDS.iter().position(|field| field.name == name)
    }

    /// Every column the reference dataset must carry, label included.
    pub fn expected_columns() -> Vec<&'static str> {
        std::iter::once(LABEL_COLUMN)
            .chain(SURVEY_FIELDS.iter().map(|field| field.name))
            .collect()
    }
}
