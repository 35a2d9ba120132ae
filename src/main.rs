use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::{Builder, Env};
use log::{debug, info, LevelFilter};

use heart_risk::dataset::{FieldDomain, ReferenceDataset, SurveySchema};
use heart_risk::encoder::FeatureEncoder;
use heart_risk::error::HeartRiskError;
use heart_risk::model::{ForestModel, ForestParameters};
use heart_risk::predictor::{EncodingMode, RiskPredictor};
use heart_risk::server;
use heart_risk::survey::SurveyRecord;

#[derive(Parser, Debug)]
#[command(author, version, about = "Heart disease risk from a health survey", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the survey form over HTTP
    Serve(ServeArgs),
    /// Assess a single set of answers
    Predict(PredictArgs),
    /// Fit a model artifact on the reference dataset
    Train(TrainArgs),
    /// Print the survey fields and their allowed values
    Schema(DatasetArgs),
}

#[derive(Args, Debug)]
struct DatasetArgs {
    /// Reference dataset (CSV)
    #[arg(long, env = "HEART_DATASET", default_value = "data/data.csv")]
    dataset: PathBuf,
}

#[derive(Args, Debug)]
struct ModelArgs {
    #[command(flatten)]
    data: DatasetArgs,
    /// Model artifact (JSON)
    #[arg(long, env = "HEART_MODEL", default_value = "model/rf_model.json")]
    model: PathBuf,
    /// Refit the encoding on the user row stacked over the reference rows
    #[arg(long)]
    refit_per_request: bool,
    /// Write every submitted row to this CSV file
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    model: ModelArgs,
    #[arg(long, default_value = "127.0.0.1:8501")]
    addr: SocketAddr,
    /// Directory holding the page and verdict images
    #[arg(long, default_value = "images")]
    images: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
struct PredictArgs {
    #[command(flatten)]
    model: ModelArgs,
    /// Survey answer as Field=Value, repeatable
    #[arg(short, long = "answer", value_parser = parse_answer)]
    answers: Vec<(String, String)>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[command(flatten)]
    data: DatasetArgs,
    /// Where to write the model artifact
    #[arg(short, long, default_value = "model/rf_model.json")]
    output: PathBuf,
    #[arg(long, default_value_t = 50)]
    trees: usize,
    #[arg(long, default_value_t = 10)]
    max_depth: u16,
    #[arg(long, default_value_t = 1)]
    min_samples_leaf: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn parse_answer(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected Field=Value, got {raw:?}"))
}

fn load_predictor(args: &ModelArgs) -> Result<RiskPredictor, HeartRiskError> {
    let dataset = ReferenceDataset::load(&args.data.dataset)?;
    let model = ForestModel::load(&args.model)?;
    let mode = if args.refit_per_request {
        EncodingMode::Stacked
    } else {
        EncodingMode::Frozen
    };
    Ok(RiskPredictor::new(dataset, Box::new(model), mode).with_snapshot(args.snapshot.clone()))
}

async fn run_serve(args: ServeArgs) -> Result<(), HeartRiskError> {
    let predictor = Arc::new(load_predictor(&args.model)?);
    let images = args.images.is_dir().then_some(args.images);
    server::serve(predictor, args.addr, images).await
}

fn run_predict(args: PredictArgs) -> Result<(), HeartRiskError> {
    let predictor = load_predictor(&args.model)?;
    let answers: HashMap<String, String> = args.answers.into_iter().collect();
    let record = SurveyRecord::assemble(predictor.schema(), &answers)?;
    let assessment = predictor.assess(&record)?;

    match args.format {
        OutputFormat::Text => {
            println!("{}", assessment.message);
            println!("{}", assessment.caption);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&assessment)?),
    }
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<(), HeartRiskError> {
    let dataset = ReferenceDataset::load(&args.data.dataset)?;
    let encoder = FeatureEncoder::fit(&dataset);
    let x = encoder.transform_dataset(&dataset);
    let params = ForestParameters {
        n_trees: args.trees,
        max_depth: args.max_depth,
        min_samples_leaf: args.min_samples_leaf,
        seed: args.seed,
    };
    debug!("training with {:?}", params);

    let model = ForestModel::fit(encoder.layout().names().to_vec(), &x, dataset.labels(), params)?;
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    model.save(&args.output)?;
    info!("wrote model artifact {:?}", args.output);
    Ok(())
}

fn run_schema(args: DatasetArgs) -> Result<(), HeartRiskError> {
    let dataset = ReferenceDataset::load(&args.dataset)?;
    let schema = SurveySchema::from_dataset(&dataset);
    for (field, domain) in schema.domains() {
        match domain {
            FieldDomain::Range { min, max, default } => {
                println!("{}: number in [{min}, {max}], default {default}", field.name)
            }
            FieldDomain::Choices(choices) => println!("{}: one of {:?}", field.name, choices),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let env = Env::new().filter("HEART_LOG");
    Builder::new()
        .filter(Some("heart_risk"), log_level)
        .parse_env(env)
        .init();

    debug!("Arguments {:#?}", cli);
    let start_time = Instant::now();

    match cli.command {
        Command::Serve(args) => run_serve(args).await?,
        Command::Predict(args) => run_predict(args)?,
        Command::Train(args) => run_train(args)?,
        Command::Schema(args) => run_schema(args)?,
    }

    debug!("finished in {:?}", start_time.elapsed());
    Ok(())
}
