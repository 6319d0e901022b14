use std::collections::BTreeMap;

use comms::{Metrics, Parameters, Scalar};
use rayon::prelude::*;

use crate::error::{Result, ServerErr};

const CHUNK_SIZE: usize = 4096;

/// Averages `results` element-wise, each scaled by its weight.
///
/// # Arguments
/// * `results` - The parameters to average along with their weights.
///
/// # Returns
/// The weighted average, shaped like every input.
///
/// # Errors
/// `ServerErr::Aggregation` if `results` is empty, the shapes differ or the weights add
/// up to zero.
pub fn weighted_average(results: &[(&Parameters, f64)]) -> Result<Parameters> {
    let Some(((first, _), rest)) = results.split_first() else {
        return Err(ServerErr::Aggregation("nothing to aggregate".to_string()));
    };

    if let Some((params, _)) = rest.iter().find(|(p, _)| p.shapes() != first.shapes()) {
        return Err(ServerErr::Aggregation(format!(
            "mismatched shapes {:?} and {:?}",
            first.shapes(),
            params.shapes()
        )));
    }

    let total: f64 = results.iter().map(|(_, w)| w).sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(ServerErr::Aggregation(format!("invalid total weight {total}")));
    }

    let scales: Vec<_> = results
        .iter()
        .map(|(params, w)| (params.values(), (w / total) as f32))
        .collect();

    let mut values = vec![0.0; first.len()];
    values
        .par_chunks_mut(CHUNK_SIZE)
        .enumerate()
        .for_each(|(i, chunk)| {
            let start = i * CHUNK_SIZE;

            for (src, scale) in &scales {
                let src = &src[start..start + chunk.len()];
                for (acc, v) in chunk.iter_mut().zip(src) {
                    *acc += v * scale;
                }
            }
        });

    Parameters::new(first.shapes().to_vec(), values)
        .map_err(|e| ServerErr::Aggregation(e.to_string()))
}

/// The average of `losses`, weighted by their example counts.
///
/// # Returns
/// `None` if there are no losses or no examples behind them.
pub fn weighted_loss_avg(losses: &[(u64, f64)]) -> Option<f64> {
    let examples: u64 = losses.iter().map(|(n, _)| n).sum();
    if examples == 0 {
        return None;
    }

    let weighted: f64 = losses.iter().map(|(n, loss)| *n as f64 * loss).sum();
    Some(weighted / examples as f64)
}

/// Averages every numeric metric reported by the clients, weighted by their example
/// counts. Non numeric metrics are left out.
pub fn weighted_metrics_avg<'a, I>(metrics: I) -> Metrics
where
    I: IntoIterator<Item = (u64, &'a Metrics)>,
{
    let mut sums: BTreeMap<&str, (f64, u64)> = BTreeMap::new();

    for (examples, client_metrics) in metrics {
        for (name, value) in client_metrics {
            let Some(value) = value.as_f64() else {
                continue;
            };

            let (sum, total) = sums.entry(name).or_default();
            *sum += examples as f64 * value;
            *total += examples;
        }
    }

    sums.into_iter()
        .filter(|(_, (_, total))| *total > 0)
        .map(|(name, (sum, total))| (name.to_string(), Scalar::Float(sum / total as f64)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(values: Vec<f32>) -> Parameters {
        Parameters::new(vec![vec![values.len()]], values).unwrap()
    }

    #[test]
    fn averages_by_weight() {
        let a = params(vec![1.0, 2.0]);
        let b = params(vec![5.0, 6.0]);

        let avg = weighted_average(&[(&a, 1.0), (&b, 3.0)]).unwrap();

        assert_eq!(avg.values(), &[4.0f32, 5.0]);
        assert_eq!(avg.shapes(), a.shapes());
    }

    #[test]
    fn equal_weights_give_the_plain_mean() {
        let a = params(vec![0.0, 10.0, -2.0]);
        let b = params(vec![2.0, 20.0, 2.0]);

        let avg = weighted_average(&[(&a, 1.0), (&b, 1.0)]).unwrap();

        assert_eq!(avg.values(), &[1.0f32, 15.0, 0.0]);
    }

    #[test]
    fn averages_across_chunks() {
        let n = CHUNK_SIZE * 2 + 7;
        let a = params(vec![1.0; n]);
        let b = params(vec![3.0; n]);

        let avg = weighted_average(&[(&a, 1.0), (&b, 1.0)]).unwrap();

        assert!(avg.values().iter().all(|v| *v == 2.0));
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let a = params(vec![1.0, 2.0]);
        let b = Parameters::new(vec![vec![1, 2]], vec![1.0, 2.0]).unwrap();

        let err = weighted_average(&[(&a, 1.0), (&b, 1.0)]).unwrap_err();
        assert!(matches!(err, ServerErr::Aggregation(_)));
    }

    #[test]
    fn rejects_zero_total_weight() {
        let a = params(vec![1.0]);
        assert!(weighted_average(&[(&a, 0.0)]).is_err());
        assert!(weighted_average(&[]).is_err());
    }

    #[test]
    fn loss_is_weighted_by_examples() {
        assert_eq!(weighted_loss_avg(&[(10, 1.0), (30, 3.0)]), Some(2.5));
        assert_eq!(weighted_loss_avg(&[]), None);
        assert_eq!(weighted_loss_avg(&[(0, 1.0)]), None);
    }

    #[test]
    fn numeric_metrics_are_weighted_by_examples() {
        let a = Metrics::from([
            ("accuracy".to_string(), Scalar::Float(0.5)),
            ("note".to_string(), Scalar::Str("hi".to_string())),
        ]);
        let b = Metrics::from([("accuracy".to_string(), Scalar::Float(1.0))]);

        let avg = weighted_metrics_avg([(1, &a), (3, &b)]);

        assert_eq!(avg.len(), 1);
        assert_eq!(avg["accuracy"].as_f64(), Some(0.875));
    }
}
