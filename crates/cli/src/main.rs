//! LandslideML CLI - landslide susceptibility mapping

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use landslideml_colormap::{auto_params, write_rgba_tiff, ColorScheme, ColormapParams};
use landslideml_core::io::{read_geotiff, write_geotiff};
use landslideml_core::{Dataset, FeatureStack, Raster};
use landslideml_models::{
    load_model, MlModel, ModelConfig, ModelKind, Params, Prediction, PredictionInput,
    SusceptibilityLevels,
};

#[derive(Parser)]
#[command(name = "landslideml")]
#[command(author, version, about = "Landslide susceptibility mapping with machine learning", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a CSV table or a raster file
    Info {
        /// Input .csv or GeoTIFF file
        input: PathBuf,
    },
    /// Train a model on a CSV table, print its report and save it
    Train {
        /// TOML training configuration; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Training table (CSV with header)
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Model type: RandomForest, SVM, GBM
        #[arg(short, long)]
        model: Option<String>,
        /// Comma-separated feature columns
        #[arg(short, long, value_delimiter = ',')]
        features: Vec<String>,
        /// Target column with integer classes
        #[arg(short, long)]
        target: Option<String>,
        /// Fraction of rows held out for evaluation
        #[arg(long)]
        test_size: Option<f64>,
        /// Seed of the train/test shuffle
        #[arg(long)]
        seed: Option<u64>,
        /// Hyper-parameter as name=value (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,
        /// Output model file (JSON)
        #[arg(short, long)]
        output: PathBuf,
        /// Also write the classification report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the evaluation report stored in a model file
    Evaluate {
        /// Model file written by `train`
        model: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Predict susceptibility over a table, GeoTIFF layers or a NetCDF file
    Predict {
        /// Model file written by `train`
        model: PathBuf,
        /// CSV table containing the model features
        #[arg(long, conflicts_with_all = ["raster", "netcdf"])]
        table: Option<PathBuf>,
        /// Feature layer as name=path.tif (repeatable)
        #[arg(long, conflicts_with = "netcdf")]
        raster: Vec<String>,
        /// NetCDF file with one variable per feature
        #[arg(long)]
        netcdf: Option<PathBuf>,
        /// Output: CSV for tables, class GeoTIFF for maps
        #[arg(short, long)]
        output: PathBuf,
        /// Write the positive-class probability raster here
        #[arg(long)]
        probability: Option<PathBuf>,
        /// Write the susceptibility level raster here
        #[arg(long)]
        levels: Option<PathBuf>,
        /// Ascending probability breaks between levels
        #[arg(long, value_delimiter = ',', default_value = "0.2,0.4,0.6,0.8")]
        breaks: Vec<f64>,
    },
    /// Render a raster as an RGBA GeoTIFF quicklook
    Render {
        /// Input raster
        input: PathBuf,
        /// Output RGBA GeoTIFF
        output: PathBuf,
        /// Color scheme: susceptibility, levels, classes, grayscale
        #[arg(short, long, default_value = "susceptibility")]
        scheme: String,
        /// Stretch colors over the data range instead of the scheme's range
        #[arg(long)]
        stretch: bool,
    },
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path).with_context(|| format!("Failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

/// Level breaks, checked before any prediction work when a level raster is requested
fn level_scheme(wanted: bool, breaks: Vec<f64>) -> Result<Option<SusceptibilityLevels>> {
    if !wanted {
        return Ok(None);
    }
    let scheme = SusceptibilityLevels::new(breaks).context("Invalid --breaks")?;
    Ok(Some(scheme))
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

/// Parse `name=path` layer arguments
fn parse_layers(args: &[String]) -> Result<Vec<(String, PathBuf)>> {
    args.iter()
        .map(|arg| {
            let (name, path) = arg
                .split_once('=')
                .with_context(|| format!("Layer must be name=path, got '{}'", arg))?;
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        })
        .collect()
}

fn info_table(input: &Path) -> Result<()> {
    let dataset = Dataset::read_csv(input).context("Failed to read table")?;
    println!("File: {}", input.display());
    println!("Rows: {}  Columns: {}", dataset.n_rows(), dataset.n_columns());
    println!(
        "\n{:<24} {:>12} {:>12} {:>12} {:>8}",
        "column", "min", "max", "mean", "missing"
    );
    for name in dataset.columns() {
        let column = dataset.column(name)?;
        let valid: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
        let missing = column.len() - valid.len();
        if valid.is_empty() {
            println!("{:<24} {:>12} {:>12} {:>12} {:>8}", name, "-", "-", "-", missing);
            continue;
        }
        let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
        let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = valid.iter().sum::<f64>() / valid.len() as f64;
        println!(
            "{:<24} {:>12.4} {:>12.4} {:>12.4} {:>8}",
            name, min, max, mean, missing
        );
    }
    Ok(())
}

fn info_raster(input: &Path) -> Result<()> {
    let raster = read_raster(input)?;
    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn train_config(
    config: Option<PathBuf>,
    data: Option<PathBuf>,
    model: Option<String>,
    features: Vec<String>,
    target: Option<String>,
    test_size: Option<f64>,
    seed: Option<u64>,
    params: &[String],
) -> Result<ModelConfig> {
    let mut cfg = match config {
        Some(path) => ModelConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => {
            let data = data
                .clone()
                .context("Either --config or --data is required")?;
            ModelConfig::new(data, ModelKind::RandomForest, &features, "label", 0.2)
        }
    };

    if let Some(data) = data {
        cfg.data_path = data;
    }
    if let Some(model) = model {
        cfg.model_type = model.parse::<ModelKind>()?;
    }
    if !features.is_empty() {
        cfg.features = features;
    }
    if let Some(target) = target {
        cfg.target = target;
    }
    if let Some(test_size) = test_size {
        cfg.test_size = test_size;
    }
    if let Some(seed) = seed {
        cfg.random_state = seed;
    }
    let overrides = Params::from_assignments(params).context("Invalid --param")?;
    cfg.params.merge(&overrides);
    Ok(cfg)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            if is_csv(&input) {
                info_table(&input)?;
            } else {
                info_raster(&input)?;
            }
        }

        Commands::Train {
            config,
            data,
            model,
            features,
            target,
            test_size,
            seed,
            params,
            output,
            report,
        } => {
            let cfg = train_config(config, data, model, features, target, test_size, seed, &params)?;
            let start = Instant::now();

            let pb = spinner("Loading training data...");
            let mut ml = MlModel::new(cfg).context("Failed to prepare model")?;
            pb.finish_and_clear();

            let pb = spinner(&format!("Fitting {}...", ml.model_type()));
            let params = ml.params().clone();
            ml.setup(&params).context("Failed to fit model")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();

            let summary = ml.evaluate_model(true).context("Failed to evaluate model")?;
            if let Some(path) = report {
                let json = serde_json::to_string_pretty(summary)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            ml.save_model(&output).context("Failed to save model")?;
            done("Model", &output, elapsed);
        }

        Commands::Evaluate { model, json } => {
            let ml = load_model(&model).context("Failed to load model")?;
            println!(
                "{} on {} ({} features, target '{}')",
                ml.model_type(),
                ml.config().data_path.display(),
                ml.features().len(),
                ml.target()
            );
            let report = ml
                .report()
                .context("Model file holds no evaluation report")?;
            if json {
                println!("{}", serde_json::to_string_pretty(report)?);
            } else {
                println!("\n{}", report);
            }
        }

        Commands::Predict {
            model,
            table,
            raster,
            netcdf,
            output,
            probability,
            levels,
            breaks,
        } => {
            let scheme = level_scheme(levels.is_some(), breaks)?;
            let mut ml = load_model(&model).context("Failed to load model")?;
            let input = if let Some(path) = table {
                PredictionInput::Table(path)
            } else if let Some(path) = netcdf {
                PredictionInput::NetCdf(path)
            } else if !raster.is_empty() {
                let pb = spinner("Reading feature layers...");
                let stack = FeatureStack::from_geotiffs(&parse_layers(&raster)?)
                    .context("Failed to read feature layers")?;
                pb.finish_and_clear();
                PredictionInput::Rasters(stack)
            } else {
                anyhow::bail!("One of --table, --raster or --netcdf is required");
            };

            let pb = spinner("Predicting...");
            let start = Instant::now();
            let prediction = ml.predict(input).context("Prediction failed")?.clone();
            let elapsed = start.elapsed();
            pb.finish_and_clear();

            match prediction {
                Prediction::Table(table) => {
                    table
                        .write_csv(&output)
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    info!("Predicted {} rows", table.len());
                    done("Predictions", &output, elapsed);
                }
                Prediction::Map(mut map) => {
                    info!("Predicted {} valid cells", map.valid_cells());
                    write_result(&map.classes, &output)?;
                    done("Class map", &output, elapsed);
                    if let Some(path) = probability {
                        write_result(&map.probability, &path)?;
                        done("Susceptibility", &path, elapsed);
                    }
                    if let (Some(path), Some(scheme)) = (levels, scheme) {
                        let level_raster = map.classify_levels(&scheme)?;
                        write_result(level_raster, &path)?;
                        done("Susceptibility levels", &path, elapsed);
                    }
                }
            }
        }

        Commands::Render {
            input,
            output,
            scheme,
            stretch,
        } => {
            let scheme: ColorScheme = scheme.parse().map_err(anyhow::Error::msg)?;
            let raster = read_raster(&input)?;
            let start = Instant::now();
            let params = if stretch {
                auto_params(&raster, scheme)
            } else {
                ColormapParams::new(scheme)
            };
            write_rgba_tiff(&raster, &params, &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            done("Quicklook", &output, start.elapsed());
        }
    }

    Ok(())
}
