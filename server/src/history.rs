use std::fmt;

use comms::Metrics;

/// What happened to the global model through the rounds of a `Server::fit` call.
///
/// Every entry is keyed by its round, round 0 being the initial parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    pub losses_distributed: Vec<(u64, f64)>,
    pub losses_centralized: Vec<(u64, f64)>,
    pub metrics_distributed: Vec<(u64, Metrics)>,
    pub metrics_centralized: Vec<(u64, Metrics)>,
}

impl History {
    pub fn add_loss_distributed(&mut self, round: u64, loss: f64) {
        self.losses_distributed.push((round, loss));
    }

    pub fn add_loss_centralized(&mut self, round: u64, loss: f64) {
        self.losses_centralized.push((round, loss));
    }

    pub fn add_metrics_distributed(&mut self, round: u64, metrics: Metrics) {
        if !metrics.is_empty() {
            self.metrics_distributed.push((round, metrics));
        }
    }

    pub fn add_metrics_centralized(&mut self, round: u64, metrics: Metrics) {
        if !metrics.is_empty() {
            self.metrics_centralized.push((round, metrics));
        }
    }
}

fn write_metrics(f: &mut fmt::Formatter<'_>, entries: &[(u64, Metrics)]) -> fmt::Result {
    for (round, metrics) in entries {
        write!(f, "\n\tround {round}:")?;
        for (name, value) in metrics {
            write!(f, " {name}={value}")?;
        }
    }

    Ok(())
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "History")?;

        if !self.losses_distributed.is_empty() {
            write!(f, "\nloss, distributed:")?;
            for (round, loss) in &self.losses_distributed {
                write!(f, "\n\tround {round}: {loss}")?;
            }
        }

        if !self.losses_centralized.is_empty() {
            write!(f, "\nloss, centralized:")?;
            for (round, loss) in &self.losses_centralized {
                write!(f, "\n\tround {round}: {loss}")?;
            }
        }

        if !self.metrics_distributed.is_empty() {
            write!(f, "\nmetrics, distributed:")?;
            write_metrics(f, &self.metrics_distributed)?;
        }

        if !self.metrics_centralized.is_empty() {
            write!(f, "\nmetrics, centralized:")?;
            write_metrics(f, &self.metrics_centralized)?;
        }

        Ok(())
    }
}
