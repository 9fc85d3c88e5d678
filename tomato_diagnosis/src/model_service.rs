use crate::classifier::ClassifierError;
use ndarray::{Array, Ix4};

/// A loaded image classifier taking a single-image batch tensor.
///
/// Implementations must be callable from several threads at once.
pub trait ModelService: Send + Sync + 'static {
    fn predict(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError>;
}
