/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn population_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0) around a precomputed mean.
pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Mean squared error between two equal-length slices.
pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

/// Mean absolute error between two equal-length slices.
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_mean() {
        assert_eq!(population_mean(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(population_mean(&[]), 0.0);
    }

    #[test]
    fn test_population_std_dev() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mean = population_mean(&values);
        // Population variance = 2.0
        assert!((population_std_dev(&values, mean) - 2.0f64.sqrt()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_population_std_dev_constant() {
        let values = [5.0, 5.0, 5.0];
        assert_eq!(population_std_dev(&values, 5.0), 0.0);
    }

    #[test]
    fn test_errors() {
        let actual = [1.0, 2.0, 3.0];
        let predicted = [1.0, 3.0, 5.0];
        assert!((mean_squared_error(&actual, &predicted) - 5.0 / 3.0).abs() < 1e-12);
        assert!((mean_absolute_error(&actual, &predicted) - 1.0).abs() < 1e-12);
    }
}
