//! Grey-level morphology on plane batches.

use burn::tensor::backend::Backend;
use burn::tensor::module::max_pool2d;
use burn::tensor::Tensor;

/// Grey-level opening with a square structuring element.
///
/// Erosion followed by dilation; removes bright specks smaller than the
/// element while keeping larger structures. Out-of-plane neighbours are
/// ignored at the borders.
pub struct Opening<B: Backend> {
    radius: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> Opening<B> {
    /// Structuring element of `2 * radius + 1` pixels per side.
    pub fn new(radius: usize) -> Self {
        Self {
            radius,
            _b: std::marker::PhantomData,
        }
    }

    pub fn apply(&self, planes: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.radius == 0 {
            return planes;
        }
        self.dilate(self.erode(planes))
    }

    pub fn dilate(&self, planes: Tensor<B, 4>) -> Tensor<B, 4> {
        let k = 2 * self.radius + 1;
        max_pool2d(planes, [k, k], [1, 1], [self.radius, self.radius], [1, 1])
    }

    pub fn erode(&self, planes: Tensor<B, 4>) -> Tensor<B, 4> {
        self.dilate(planes.neg()).neg()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn plane(values: Vec<f32>, h: usize, w: usize) -> Tensor<B, 4> {
        let device = Default::default();
        Tensor::<B, 4>::from_data(TensorData::new(values, [1, 1, h, w]), &device)
    }

    fn values(t: Tensor<B, 4>) -> Vec<f32> {
        t.into_data().into_vec::<f32>().unwrap()
    }

    #[test]
    fn test_opening_removes_single_speck() {
        let mut data = vec![1.0; 25];
        data[12] = 100.0;
        let out = Opening::<B>::new(1).apply(plane(data, 5, 5));
        assert!(values(out).iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_opening_keeps_large_block() {
        // A 3x3 bright block survives an opening with a 3x3 element.
        let mut data = vec![0.0; 25];
        for r in 1..4 {
            for c in 1..4 {
                data[r * 5 + c] = 10.0;
            }
        }
        let out = values(Opening::<B>::new(1).apply(plane(data.clone(), 5, 5)));
        assert_eq!(out, data);
    }

    #[test]
    fn test_shape_preserved() {
        let out = Opening::<B>::new(2).apply(plane(vec![3.0; 12], 3, 4));
        assert_eq!(out.dims(), [1, 1, 3, 4]);
    }
}
