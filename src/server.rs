use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Form, Json, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{debug, info};
use serde_json::json;
use tower_http::services::ServeDir;

use crate::dataset::{FieldDomain, SurveySchema};
use crate::error::{HeartRiskError, Result};
use crate::predictor::{Assessment, RiskPredictor};
use crate::survey::SurveyRecord;

pub type SharedPredictor = Arc<RiskPredictor>;

pub fn router(predictor: SharedPredictor, images: Option<PathBuf>) -> Router {
    let app = Router::new()
        .route("/", get(index))
        .route("/predict", post(predict_form))
        .route("/api/predict", post(predict_json))
        .route("/health", get(health));
    let app = match images {
        Some(dir) => app.nest_service("/images", ServeDir::new(dir)),
        None => app,
    };
    app.with_state(predictor)
}

pub async fn serve(predictor: SharedPredictor, addr: SocketAddr, images: Option<PathBuf>) -> Result<()> {
    let app = router(predictor, images);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("heart-risk listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn status_of(err: &HeartRiskError) -> StatusCode {
    if err.is_input_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Assemble and assess on the blocking pool; the encode step walks the
/// whole reference dataset in stacked mode.
async fn run_assessment(
    predictor: SharedPredictor,
    answers: HashMap<String, String>,
) -> Result<Assessment> {
    tokio::task::spawn_blocking(move || {
        let record = SurveyRecord::assemble(predictor.schema(), &answers)?;
        predictor.assess(&record)
    })
    .await
    .map_err(|e| HeartRiskError::Task(e.to_string()))?
}

async fn health() -> &'static str {
    "ok"
}

async fn index(State(predictor): State<SharedPredictor>) -> Html<String> {
    Html(render_page(predictor.schema(), &HashMap::new(), None))
}

async fn predict_form(
    State(predictor): State<SharedPredictor>,
    Form(answers): Form<HashMap<String, String>>,
) -> Response {
    debug!("form submission {:?}", answers);
    let outcome = run_assessment(predictor.clone(), answers.clone()).await;
    let status = match &outcome {
        Ok(_) => StatusCode::OK,
        Err(e) => status_of(e),
    };
    let page = render_page(predictor.schema(), &answers, Some(&outcome));
    (status, Html(page)).into_response()
}

async fn predict_json(
    State(predictor): State<SharedPredictor>,
    Json(body): Json<HashMap<String, serde_json::Value>>,
) -> Response {
    let answers = body
        .into_iter()
        .map(|(name, value)| {
            let raw = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (name, raw)
        })
        .collect();

    match run_assessment(predictor, answers).await {
        Ok(assessment) => Json(assessment).into_response(),
        Err(e) => (status_of(&e), Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_field(out: &mut String, name: &str, prompt: &str, domain: &FieldDomain, current: Option<&String>) {
    out.push_str(&format!("<label for=\"{name}\">{}</label>\n", escape(prompt)));
    match domain {
        FieldDomain::Range { min, max, default } => {
            let value = current.cloned().unwrap_or_else(|| default.to_string());
            out.push_str(&format!(
                "<input type=\"number\" id=\"{name}\" name=\"{name}\" min=\"{min}\" max=\"{max}\" \
                 step=\"1\" value=\"{}\">\n",
                escape(&value)
            ));
        }
        FieldDomain::Choices(choices) => {
            out.push_str(&format!("<select id=\"{name}\" name=\"{name}\">\n"));
            for choice in choices {
                let selected = if current == Some(choice) { " selected" } else { "" };
                let choice = escape(choice);
                out.push_str(&format!("<option value=\"{choice}\"{selected}>{choice}</option>\n"));
            }
            out.push_str("</select>\n");
        }
    }
}

/// The whole single-page form, with the verdict underneath when there is one.
pub fn render_page(
    schema: &SurveySchema,
    answers: &HashMap<String, String>,
    outcome: Option<&Result<Assessment>>,
) -> String {
    let mut out = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\">\
         <title>Heart Disease Prediction App</title></head>\n<body>\n\
         <h1>Heart Disease Prediction</h1>\n\
         <h3>Are you wondering about the condition of your heart? \
         This app will help you to diagnose it!</h3>\n\
         <img src=\"/images/doctor.png\" width=\"150\" \
         alt=\"I'll help you diagnose your heart health! - Dr. Random Forest Classifier\">\n\
         <form method=\"post\" action=\"/predict\">\n",
    );
    for (field, domain) in schema.domains() {
        render_field(&mut out, field.name, field.prompt, domain, answers.get(field.name));
    }
    out.push_str("<button type=\"submit\">Predict</button>\n</form>\n");

    match outcome {
        Some(Ok(assessment)) => {
            out.push_str(&format!(
                "<p><strong>{}</strong></p>\n<figure><img src=\"/images/{}\" alt=\"\">\
                 <figcaption>{}</figcaption></figure>\n",
                escape(&assessment.message),
                assessment.image,
                escape(&assessment.caption)
            ));
        }
        Some(Err(e)) => {
            out.push_str(&format!("<p class=\"error\">{}</p>\n", escape(&e.to_string())));
        }
        None => {}
    }
    out.push_str("</body>\n</html>\n");
    out
}
