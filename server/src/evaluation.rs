use std::{fs::File, io, path::PathBuf};

use comms::{Metrics, Parameters, Scalar};
use learning::{Dataset, LogisticRegression, metrics};
use log::info;
use ndarray::{ArrayView1, ArrayView2};
use parking_lot::Mutex;

use crate::{error::Result, strategy::EvaluateFn};

/// Evaluates the global model on the server's held out data.
pub struct CentralizedEvaluator {
    model: Mutex<LogisticRegression>,
    test: Dataset,
    classes: Vec<String>,
    output: Option<PathBuf>,
}

impl CentralizedEvaluator {
    /// Creates a new `CentralizedEvaluator`.
    ///
    /// # Arguments
    /// * `model` - The model to load the global parameters into.
    /// * `test` - The data to evaluate on.
    /// * `classes` - The name of every encoded label.
    pub fn new(model: LogisticRegression, test: Dataset, classes: Vec<String>) -> Self {
        Self {
            model: Mutex::new(model),
            test,
            classes,
            output: None,
        }
    }

    /// Writes the predictions of every evaluation to `path`, overwriting the previous one.
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }
}

impl EvaluateFn for CentralizedEvaluator {
    fn evaluate(&self, round: u64, parameters: &Parameters) -> Result<(f64, Metrics)> {
        let (proba, y_pred) = {
            let mut model = self.model.lock();
            model.set_parameters(parameters)?;
            let proba = model.predict_proba(self.test.x())?;
            let y_pred = model.predict(self.test.x())?;
            (proba, y_pred)
        };

        let loss = metrics::log_loss(self.test.y(), proba.view())?;
        let accuracy = metrics::accuracy(self.test.y(), y_pred.view())?;

        if let Some(path) = &self.output {
            let file = File::create(path)?;
            write_predictions(file, proba.view(), y_pred.view(), self.test.y(), &self.classes)?;
            info!(round = round; "predictions written to {}", path.display());
        }

        info!(round = round, loss = loss, accuracy = accuracy; "server side evaluation");
        let metrics = Metrics::from([("accuracy".to_string(), Scalar::Float(accuracy))]);
        Ok((loss, metrics))
    }
}

/// Writes one CSV row per sample: its index, the probability of every class, the
/// predicted class and the real one.
///
/// # Arguments
/// * `writer` - Where to write the CSV to.
/// * `proba` - The class probabilities, `(samples, classes)`.
/// * `y_pred` - The predicted label of every sample.
/// * `y_true` - The real label of every sample.
/// * `classes` - The name of every label.
pub fn write_predictions<W: io::Write>(
    writer: W,
    proba: ArrayView2<'_, f32>,
    y_pred: ArrayView1<'_, usize>,
    y_true: ArrayView1<'_, usize>,
    classes: &[String],
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["index".to_string()];
    header.extend(classes.iter().map(|class| format!("prob_{class}")));
    header.extend(["prediction".to_string(), "real".to_string()]);
    wtr.write_record(&header)?;

    let name = |label: usize| classes.get(label).map_or("", String::as_str);

    for (i, ((row, pred), real)) in proba
        .rows()
        .into_iter()
        .zip(y_pred)
        .zip(y_true)
        .enumerate()
    {
        let mut record = vec![i.to_string()];
        record.extend(row.iter().map(f32::to_string));
        record.push(name(*pred).to_string());
        record.push(name(*real).to_string());
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use learning::LogisticConfig;
    use ndarray::array;

    use super::*;

    fn evaluator() -> CentralizedEvaluator {
        let test = Dataset::new(array![[-1.0f32], [1.0]], array![0usize, 1]).unwrap();
        let model = LogisticRegression::new(LogisticConfig::default());
        CentralizedEvaluator::new(model, test, vec!["low".to_string(), "high".to_string()])
    }

    #[test]
    fn evaluates_the_given_parameters() {
        // Class 1 gets the feature, class 0 its negation.
        let params =
            Parameters::new(vec![vec![2, 1], vec![2]], vec![-5.0, 5.0, 0.0, 0.0]).unwrap();

        let (loss, metrics) = evaluator().evaluate(1, &params).unwrap();

        assert_eq!(metrics["accuracy"], Scalar::Float(1.0));
        assert!(loss < 0.01, "loss {loss}");
    }

    #[test]
    fn uniform_parameters_give_chance_loss() {
        let params = Parameters::zeros(vec![vec![2, 1], vec![2]]).unwrap();

        let (loss, _) = evaluator().evaluate(0, &params).unwrap();

        assert!((loss - 2f64.ln()).abs() < 1e-6);
    }

    #[test]
    fn mismatched_parameters_are_rejected() {
        let params = Parameters::zeros(vec![vec![3, 4], vec![3]]).unwrap();
        assert!(evaluator().evaluate(0, &params).is_err());
    }

    #[test]
    fn predictions_csv_names_classes() {
        let proba = array![[0.75f32, 0.25], [0.5, 0.5]];
        let y_pred = array![0usize, 1];
        let y_true = array![0usize, 0];
        let classes = ["low".to_string(), "high".to_string()];

        let mut out = Vec::new();
        write_predictions(&mut out, proba.view(), y_pred.view(), y_true.view(), &classes)
            .unwrap();

        let csv = String::from_utf8(out).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(
            lines,
            [
                "index,prob_low,prob_high,prediction,real",
                "0,0.75,0.25,low,low",
                "1,0.5,0.5,high,low",
            ]
        );
    }
}
