//! End-to-end tests: observations in, quantile forecast out

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::forecast::RecursiveForecaster;
    use crate::impute::{impute, ImputeMethod};
    use crate::series::{pivot_observations, Observation};
    use crate::testing::{at_hour, quick_config, synthetic_series};
    use crate::trainer::QuantileEnsembleTrainer;

    #[test]
    fn test_thirty_days_forecast_two_days() {
        let config = quick_config(vec![1, 24, 168]);
        let series = synthetic_series(720);
        let cutoff = at_hour(25 * 24);

        let trainer = QuantileEnsembleTrainer::from_config(&config).unwrap();
        let ensemble = trainer.train(&series, cutoff).unwrap();
        assert_eq!(
            ensemble.schema(),
            &[
                "hour", "dayofweek", "month", "is_weekend", "lag_1", "lag_24", "lag_168",
                "rolling_mean_24", "rolling_std_24"
            ]
        );

        let forecaster = RecursiveForecaster::new(&ensemble, trainer.feature_builder().clone());
        let end = at_hour(25 * 24 + 47);
        let forecast = forecaster.forecast(&series, cutoff, end).unwrap();

        assert_eq!(forecast.len(), 48);
        assert_eq!(forecast.unresolved_count(), 0);
        assert_eq!(forecast.points[0].timestamp, cutoff);
        assert_eq!(forecast.points[47].timestamp, end);

        let first = &forecast.features.rows[0];
        assert_eq!(
            first.value("lag_168"),
            series.get(&at_hour(25 * 24 - 168))
        );

        // Predictions stay in the neighbourhood of the series level
        for point in &forecast.points {
            for (_, value) in point.values() {
                assert!(*value > 50.0 && *value < 150.0, "implausible prediction {value}");
            }
        }
    }

    #[test]
    fn test_observations_through_imputation_to_forecast() {
        let source = synthetic_series(400);
        let mut observations: Vec<Observation> = source
            .iter()
            .map(|(time, value)| Observation {
                time,
                code: "load".to_string(),
                value: Some(value),
            })
            .collect();
        // A second code with sparser coverage widens the union of timestamps
        observations.push(Observation {
            time: at_hour(400),
            code: "temperature".to_string(),
            value: Some(4.0),
        });
        observations[150].value = None;
        observations[151].value = None;

        let mut pivoted = pivot_observations(&observations, None).unwrap();
        let raw = pivoted.remove("load").unwrap();
        assert_eq!(raw.len(), 401);
        assert_eq!(raw.missing_count(), 3);

        let method: ImputeMethod = "forward-fill".parse().unwrap();
        let filled = impute(&raw, method);
        assert_eq!(filled.missing_count(), 0);
        assert_eq!(filled.get(&at_hour(151)), raw.get(&at_hour(149)));

        let config: Config = quick_config(vec![1, 24]);
        let trainer = QuantileEnsembleTrainer::from_config(&config).unwrap();
        let ensemble = trainer.train(&filled, at_hour(360)).unwrap();
        let forecaster = RecursiveForecaster::new(&ensemble, trainer.feature_builder().clone());
        let forecast = forecaster.forecast(&filled, at_hour(360), at_hour(383)).unwrap();
        assert_eq!(forecast.resolved_count(), 24);
    }
}
