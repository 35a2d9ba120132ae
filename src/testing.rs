//! Reference dataset fixtures shared by the unit tests.

use std::fs;
use std::path::{Path, PathBuf};

pub const HEADER: &str = "HeartDisease,BMI,Smoking,AlcoholDrinking,Stroke,PhysicalHealth,\
MentalHealth,DiffWalking,Sex,AgeCategory,Race,Diabetic,PhysicalActivity,GenHealth,SleepTime,\
Asthma,KidneyDisease,SkinCancer";

const AGES: [&str; 4] = ["55-59", "80 or older", "25-29", "18-24"];
const RACES: [&str; 4] = ["White", "Black", "Hispanic", "Asian"];
const GEN_HEALTH: [&str; 5] = ["Very good", "Excellent", "Good", "Fair", "Poor"];
const DIABETIC: [&str; 3] = ["No", "Yes", "No, borderline diabetes"];

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Deterministic rows in the Kaggle column order. Encoded width is 25.
pub fn reference_rows(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let gen_health = GEN_HEALTH[i % 5];
            let sick = gen_health == "Fair" || gen_health == "Poor";
            format!(
                "{},{:.1},{},{},{},{:.1},{:.1},{},{},{},{},\"{}\",{},{},{:.1},{},{},{}",
                yes_no(sick),
                18.5 + ((i * 7) % 25) as f64,
                yes_no(i % 2 == 0),
                yes_no(i % 7 == 0),
                yes_no(i % 9 == 0),
                (i % 31) as f64,
                ((i * 3) % 31) as f64,
                yes_no(i % 4 == 1),
                if i % 2 == 0 { "Female" } else { "Male" },
                AGES[i % 4],
                RACES[(i / 2) % 4],
                DIABETIC[i % 3],
                yes_no(i % 3 != 0),
                gen_health,
                (4 + i % 6) as f64,
                yes_no(i % 6 == 0),
                yes_no(i % 11 == 0),
                yes_no(i % 8 == 3),
            )
        })
        .collect()
}

pub fn write_csv(path: &Path, header: &str, rows: &[String]) {
    let mut text = String::from(header);
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    fs::write(path, text).unwrap();
}

pub fn write_reference_csv(dir: &Path) -> PathBuf {
    let path = dir.join("data.csv");
    write_csv(&path, HEADER, &reference_rows(60));
    path
}
