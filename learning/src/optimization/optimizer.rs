/// A learning rule that moves parameters given their gradient.
pub trait Optimizer {
    /// Updates `params` in place using `grad`, both must have the same length.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]);
}
