//! Tests for quantile levels and the ensemble contract

use super::*;
use crate::features::Feature;
use crate::gbm::GbmParams;
use crate::testing::{at_hour, quick_config, synthetic_series};
use crate::trainer::QuantileEnsembleTrainer;

fn selection() -> ModelSelection {
    let best = HyperParams {
        num_leaves: 4,
        learning_rate: 0.1,
        min_data_in_leaf: 2,
    };
    ModelSelection {
        best,
        validation_mae: 0.0,
        candidates: vec![],
        fit_rows: 8,
        validation_rows: 2,
        training_rows: 10,
    }
}

fn tiny_model(level: f64) -> QuantileModel {
    let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 1.0]).collect();
    let y: Vec<f64> = (0..10).map(|i| i as f64 * 2.0).collect();
    let params = GbmParams {
        num_leaves: 4,
        learning_rate: 0.5,
        min_data_in_leaf: 2,
        n_rounds: 5,
        max_bins: 16,
    };
    let booster = QuantileGbm::fit(&x, &y, level, &params).unwrap();
    QuantileModel::new(QuantileLevel::new(level).unwrap(), booster, selection())
}

fn tiny_ensemble() -> QuantileEnsemble {
    QuantileEnsemble::new(
        "load",
        vec!["a".to_string(), "b".to_string()],
        vec![tiny_model(0.9), tiny_model(0.1), tiny_model(0.5)],
        QuantileLevel::new(0.5).unwrap(),
        at_hour(0),
    )
    .unwrap()
}

fn row(values: &[(&str, Option<f64>)]) -> FeatureRow {
    FeatureRow {
        timestamp: at_hour(10),
        features: values
            .iter()
            .map(|(name, value)| Feature {
                name: name.to_string(),
                value: *value,
            })
            .collect(),
        target: None,
    }
}

#[test]
fn test_quantile_level_bounds() {
    assert!(QuantileLevel::new(0.5).is_ok());
    assert!(matches!(QuantileLevel::new(0.0), Err(ForecastError::InvalidQuantile(_))));
    assert!(QuantileLevel::new(1.0).is_err());
    assert!(QuantileLevel::new(f64::NAN).is_err());
}

#[test]
fn test_quantile_level_labels_and_order() {
    assert_eq!(QuantileLevel::new(0.1).unwrap().label(), "p10");
    assert_eq!(QuantileLevel::new(0.05).unwrap().label(), "p05");
    assert_eq!(QuantileLevel::new(0.025).unwrap().label(), "p2.5");

    let mut levels = vec![
        QuantileLevel::new(0.9).unwrap(),
        QuantileLevel::new(0.1).unwrap(),
        QuantileLevel::new(0.5).unwrap(),
    ];
    levels.sort();
    let values: Vec<f64> = levels.iter().map(|l| l.value()).collect();
    assert_eq!(values, vec![0.1, 0.5, 0.9]);
}

#[test]
fn test_quantile_level_serde() {
    let level: QuantileLevel = serde_json::from_str("0.25").unwrap();
    assert_eq!(level.value(), 0.25);
    assert_eq!(serde_json::to_string(&level).unwrap(), "0.25");
    assert!(serde_json::from_str::<QuantileLevel>("1.5").is_err());
}

#[test]
fn test_ensemble_orders_levels() {
    let ensemble = tiny_ensemble();
    let levels: Vec<f64> = ensemble.levels().iter().map(|l| l.value()).collect();
    assert_eq!(levels, vec![0.1, 0.5, 0.9]);
    assert_eq!(ensemble.reference_level().value(), 0.5);
    assert_eq!(ensemble.schema(), &["a".to_string(), "b".to_string()]);
}

#[test]
fn test_ensemble_rejects_unknown_reference_and_duplicates() {
    let schema = vec!["a".to_string(), "b".to_string()];
    let err = QuantileEnsemble::new(
        "load",
        schema.clone(),
        vec![tiny_model(0.1)],
        QuantileLevel::new(0.5).unwrap(),
        at_hour(0),
    )
    .unwrap_err();
    assert!(matches!(err, ForecastError::UnknownQuantile(_)));

    let dup = QuantileEnsemble::new(
        "load",
        schema,
        vec![tiny_model(0.5), tiny_model(0.5)],
        QuantileLevel::new(0.5).unwrap(),
        at_hour(0),
    );
    assert!(dup.is_err());
}

#[test]
fn test_ensemble_rejects_schema_width_mismatch() {
    let err = QuantileEnsemble::new(
        "load",
        vec!["a".to_string()],
        vec![tiny_model(0.5)],
        QuantileLevel::new(0.5).unwrap(),
        at_hour(0),
    )
    .unwrap_err();
    assert!(matches!(err, ForecastError::Training(_)));
}

#[test]
fn test_unknown_level_is_rejected() {
    let ensemble = tiny_ensemble();
    let r = row(&[("a", Some(1.0)), ("b", Some(1.0))]);
    assert!(matches!(ensemble.model(0.75), Err(ForecastError::UnknownQuantile(_))));
    assert!(matches!(
        ensemble.predict_level(0.75, &r),
        Err(ForecastError::UnknownQuantile(_))
    ));
    assert!(ensemble.predict_level(0.1, &r).unwrap().is_some());
}

#[test]
fn test_missing_schema_column_is_hard_failure() {
    let ensemble = tiny_ensemble();
    let r = row(&[("a", Some(1.0)), ("c", Some(1.0))]);
    match ensemble.predict_row(&r) {
        Err(ForecastError::MissingFeature { column, .. }) => assert_eq!(column, "b"),
        other => panic!("expected MissingFeature, got {other:?}"),
    }
}

#[test]
fn test_model_rejects_short_feature_slice() {
    let model = tiny_model(0.5);
    assert!(model.predict(&[1.0, 1.0]).is_ok());
    assert!(matches!(
        model.predict(&[1.0]),
        Err(ForecastError::FeatureCount { expected: 2, actual: 1 })
    ));
}

#[test]
fn test_unresolved_row_has_no_prediction() {
    let ensemble = tiny_ensemble();
    let r = row(&[("a", Some(1.0)), ("b", None)]);
    assert_eq!(ensemble.feature_vector(&r).unwrap(), None);
    assert!(ensemble.predict_row(&r).unwrap().is_none());
}

#[test]
fn test_feature_vector_follows_schema_order() {
    let ensemble = tiny_ensemble();
    // Row columns in a different order plus an extra column
    let r = row(&[("extra", Some(9.0)), ("b", Some(2.0)), ("a", Some(1.0))]);
    assert_eq!(ensemble.feature_vector(&r).unwrap(), Some(vec![1.0, 2.0]));
}

#[test]
fn test_predict_table_marks_early_rows() {
    let config = quick_config(vec![1, 24]);
    let trainer = QuantileEnsembleTrainer::from_config(&config).unwrap();
    let series = synthetic_series(200);
    let ensemble = trainer.train(&series, at_hour(150)).unwrap();

    let table = trainer.feature_builder().build(&series);
    let points = ensemble.predict_table(&table).unwrap();
    assert_eq!(points.len(), 200);
    assert!(!points[23].is_resolved());
    assert!(points[24].is_resolved());
    assert_eq!(points[24].values().len(), 3);
}
