//! Train on a CSV table, predict over GeoTIFF layers, save and reload.

use landslideml_core::io::{read_geotiff, write_geotiff};
use landslideml_core::{FeatureStack, GeoTransform, Raster};
use landslideml_models::prelude::*;
use landslideml_models::SusceptibilityLevels;
use std::io::Write;
use std::path::Path;

const FEATURES: [&str; 3] = ["alti", "slope", "clay"];

/// Landslides (label 1) on steep slopes; `clay` is noise
fn write_training_csv(path: &Path, n: usize) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "id,alti,slope,clay,label").unwrap();
    let mut state: u64 = 7;
    for i in 0..n {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let r = (state >> 33) as f64 / (1u64 << 31) as f64;
        let slope = (i % 50) as f64;
        let alti = 200.0 + slope * 10.0 + r * 5.0;
        let label = i32::from(slope >= 25.0);
        writeln!(file, "{},{:.3},{},{:.3},{}", i, alti, slope, r * 40.0, label).unwrap();
    }
    // A row with a missing value is dropped on load
    writeln!(file, "{},,10,3.0,0", n).unwrap();
}

fn write_layers(dir: &Path) -> Vec<(String, std::path::PathBuf)> {
    let transform = GeoTransform::new(350_000.0, 4_650_000.0, 25.0, -25.0);
    let (rows, cols) = (4, 5);
    let layer = |f: &dyn Fn(usize, usize) -> f64| {
        let data = (0..rows * cols).map(|i| f(i / cols, i % cols)).collect();
        let mut raster: Raster<f64> = Raster::from_vec(data, rows, cols).unwrap();
        raster.set_transform(transform);
        raster.set_nodata(Some(-9999.0));
        raster
    };

    let slope = layer(&|_, c| c as f64 * 12.0);
    let mut alti = layer(&|_, c| 200.0 + c as f64 * 120.0 + 2.0);
    alti.set(3, 4, -9999.0).unwrap();
    let clay = layer(&|r, _| r as f64 * 10.0);

    let mut paths = Vec::new();
    for (name, raster) in [("slope", slope), ("alti", alti), ("clay", clay)] {
        let path = dir.join(format!("{}.tif", name));
        write_geotiff(&raster, &path).unwrap();
        paths.push((name.to_string(), path));
    }
    paths
}

#[test]
fn test_train_evaluate_predict_save_load() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("training.csv");
    write_training_csv(&csv, 200);

    let mut model = generate_model(&csv, ModelKind::RandomForest, &FEATURES, "label", 0.25).unwrap();
    assert_eq!(model.split().unwrap().n_test(), 50);

    model
        .setup(&Params::new().with("n_estimators", 30).with("random_state", 3))
        .unwrap();
    let report = model.evaluate_model(false).unwrap().clone();
    assert!(report.accuracy >= 0.9, "accuracy {}", report.accuracy);

    let stack = FeatureStack::from_geotiffs(&write_layers(dir.path())).unwrap();
    model.predict(PredictionInput::Rasters(stack)).unwrap();
    let map = model.prediction_map().unwrap().clone();

    assert_eq!(map.classes.shape(), (4, 5));
    assert_eq!(map.probability.transform().pixel_width, 25.0);
    assert!(map.classes.get(3, 4).unwrap().is_nan());
    assert_eq!(map.valid_cells(), 19);
    // Columns 0-1 are gentle (slope 0, 12), columns 3-4 steep (36, 48)
    assert_eq!(map.classes.get(0, 0).unwrap(), 0.0);
    assert_eq!(map.classes.get(0, 4).unwrap(), 1.0);
    assert!(map.probability.get(1, 4).unwrap() > map.probability.get(1, 0).unwrap());

    // Map layers survive a GeoTIFF round trip
    let out = dir.path().join("susceptibility.tif");
    write_geotiff(&map.probability, &out).unwrap();
    let back: Raster<f64> = read_geotiff(&out).unwrap();
    assert_eq!(back.shape(), (4, 5));
    assert_eq!(back.transform().origin_x, 350_000.0);
    assert!(back.get(3, 4).unwrap().is_nan());

    let model_path = dir.path().join("rf_model.json");
    model.save_model(&model_path).unwrap();
    let mut loaded = load_model(&model_path).unwrap();
    assert_eq!(loaded.features(), &FEATURES);
    assert_eq!(loaded.report(), Some(&report));

    // The last map is stored with the model
    let stored = loaded.prediction_map().unwrap();
    assert_eq!(stored.classes.shape(), (4, 5));
    assert_eq!(stored.probability.transform(), map.probability.transform());
    assert!(stored.probability.get(3, 4).unwrap().is_nan());
    assert_eq!(stored.valid_cells(), 19);
    assert_eq!(stored.classes.get(0, 4).unwrap(), 1.0);

    let stack = FeatureStack::from_geotiffs(&write_layers(dir.path())).unwrap();
    loaded.predict(PredictionInput::Rasters(stack)).unwrap();
    let reloaded = loaded.prediction_map().unwrap();
    for (a, b) in reloaded
        .probability
        .data()
        .iter()
        .zip(map.probability.data().iter())
    {
        assert!((a.is_nan() && b.is_nan()) || a == b);
    }

    // No training data after loading
    assert!(loaded.setup(&Params::new()).is_err());
}

#[test]
fn test_every_model_kind_trains() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("training.csv");
    write_training_csv(&csv, 120);

    for (kind, params) in [
        (ModelKind::RandomForest, Params::new().with("n_estimators", 20)),
        (ModelKind::Svm, Params::new().with("C", 100.0)),
        (
            ModelKind::Gbm,
            Params::new().with("n_estimators", 30).with("max_depth", 2),
        ),
    ] {
        let mut model = generate_model(&csv, kind, &FEATURES, "label", 0.25).unwrap();
        model.setup(&params).unwrap();
        let accuracy = model.evaluate_model(false).unwrap().accuracy;
        assert!(accuracy >= 0.85, "{} accuracy {}", kind, accuracy);
    }
}

#[test]
fn test_susceptibility_levels_from_prediction() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("training.csv");
    write_training_csv(&csv, 150);

    let mut model = generate_model(&csv, ModelKind::Gbm, &FEATURES, "label", 0.2).unwrap();
    model.setup(&Params::new().with("n_estimators", 40)).unwrap();

    let stack = FeatureStack::from_geotiffs(&write_layers(dir.path())).unwrap();
    let prediction = model.predict(PredictionInput::Rasters(stack)).unwrap().clone();
    let mut map = match prediction {
        Prediction::Map(map) => map,
        Prediction::Table(_) => panic!("expected a map"),
    };
    let levels = map.classify_levels(&SusceptibilityLevels::default()).unwrap();
    assert_eq!(levels.get(0, 0).unwrap(), 1.0);
    assert_eq!(levels.get(0, 4).unwrap(), 5.0);
    assert!(levels.get(3, 4).unwrap().is_nan());
}

#[test]
fn test_config_file_workflow() {
    let dir = tempfile::tempdir().unwrap();
    write_training_csv(&dir.path().join("training.csv"), 100);
    let config_path = dir.path().join("train.toml");
    std::fs::write(
        &config_path,
        r#"
data_path = "training.csv"
model_type = "GBM"
features = ["alti", "slope", "clay"]
test_size = 0.25

[params]
n_estimators = 25
learning_rate = 0.2
"#,
    )
    .unwrap();

    let config = ModelConfig::from_file(&config_path).unwrap();
    let params = config.params.clone();
    let mut model = MlModel::new(config).unwrap();
    model.setup(&params).unwrap();
    assert_eq!(model.split().unwrap().n_test(), 25);
    assert!(model.evaluate_model(false).unwrap().accuracy > 0.85);
}
