use ndarray::{ArrayView1, ArrayViewMut1};

use super::Optimizer;

/// Fixed step size descent, `w <- w - lr * g`.
#[derive(Debug, Clone, Copy)]
pub struct GradientDescent {
    learning_rate: f32,
    steps: usize,
}

impl GradientDescent {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            steps: 0,
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Amount of updates applied so far.
    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        debug_assert_eq!(params.len(), grad.len());

        ArrayViewMut1::from(params).scaled_add(-self.learning_rate, &ArrayView1::from(grad));
        self.steps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_against_the_gradient() {
        let mut optimizer = GradientDescent::new(0.5);
        let mut params = [1.0, -1.0];

        optimizer.update_params(&mut params, &[2.0, -4.0]);
        assert_eq!(params, [0.0, 1.0]);

        optimizer.update_params(&mut params, &[0.0, 2.0]);
        assert_eq!(params, [0.0, 0.0]);
        assert_eq!(optimizer.steps(), 2);
    }

    #[test]
    fn zero_learning_rate_keeps_the_parameters() {
        let mut optimizer = GradientDescent::new(0.0);
        let mut params = [3.0, 4.0];

        optimizer.update_params(&mut params, &[10.0, -10.0]);
        assert_eq!(params, [3.0, 4.0]);
        assert_eq!(optimizer.learning_rate(), 0.0);
    }
}
