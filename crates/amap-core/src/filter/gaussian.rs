use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Int, Tensor, TensorData};

/// In-plane Gaussian smoothing.
///
/// Applies a separable Gaussian to every plane of a `[planes, 1, rows, cols]`
/// batch using two 1D convolutions. Sigma is in pixels. Borders are
/// extended by mirroring (`d c b a | a b c d | d c b a`), so a constant
/// plane stays constant.
pub struct GaussianFilter<B: Backend> {
    sigma: f64,
    max_kernel_width: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    /// Create a new Gaussian filter with the given standard deviation in pixels.
    pub fn new(sigma: f64) -> Self {
        Self {
            sigma,
            max_kernel_width: 63,
            _b: std::marker::PhantomData,
        }
    }

    /// Set the maximum kernel width (radius * 2 + 1).
    pub fn with_max_kernel_width(mut self, width: usize) -> Self {
        self.max_kernel_width = width.max(1);
        self
    }

    /// Smooth every plane of the batch.
    pub fn apply(&self, planes: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.sigma <= 1e-6 || planes.dims().contains(&0) {
            return planes;
        }
        let device = planes.device();
        let radius = (3.0 * self.sigma).ceil() as usize;
        let width = (2 * radius + 1).min(self.max_kernel_width | 1);
        let kernel = Self::kernel(self.sigma, (width - 1) / 2);
        let kernel = Tensor::<B, 1>::from_floats(kernel.as_slice(), &device);

        // Columns first, then rows by swapping the two spatial dimensions.
        let smoothed = Self::convolve_last_dim(planes, kernel.clone());
        let smoothed = Self::convolve_last_dim(smoothed.swap_dims(2, 3), kernel);
        smoothed.swap_dims(2, 3)
    }

    fn kernel(sigma: f64, radius: usize) -> Vec<f32> {
        let two_sigma2 = 2.0 * sigma * sigma;
        let values: Vec<f64> = (0..=(2 * radius))
            .map(|i| {
                let x = i as f64 - radius as f64;
                (-x * x / two_sigma2).exp()
            })
            .collect();
        let sum: f64 = values.iter().sum();
        values.into_iter().map(|v| (v / sum) as f32).collect()
    }

    fn convolve_last_dim(input: Tensor<B, 4>, kernel: Tensor<B, 1>) -> Tensor<B, 4> {
        let [n, c, h, w] = input.dims();
        let kernel_size = kernel.dims()[0];
        let radius = kernel_size / 2;
        let device = input.device();

        let columns: Vec<i64> = (0..w + 2 * radius)
            .map(|i| reflect_index(i as i64 - radius as i64, w) as i64)
            .collect();
        let columns = TensorData::new(columns, [w + 2 * radius]);
        let columns = Tensor::<B, 1, Int>::from_data(columns, &device);
        let padded = input.select(3, columns);

        // Every row becomes one batch entry of a single-channel signal.
        let signal = padded.reshape([n * c * h, 1, w + 2 * radius]);
        let weight = kernel.reshape([1, 1, kernel_size]);
        let options = ConvOptions::new([1], [0], [1], 1);
        let output = burn::tensor::module::conv1d(signal, weight, None, options);

        output.reshape([n, c, h, w])
    }
}

/// Map an out-of-range position onto `0..len` by half-sample mirroring.
///
/// Positions further than `len` from the edge keep bouncing between both
/// ends.
fn reflect_index(position: i64, len: usize) -> usize {
    let len = len as i64;
    let period = 2 * len;
    let folded = position.rem_euclid(period);
    if folded < len {
        folded as usize
    } else {
        (period - 1 - folded) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_kernel_is_normalized() {
        let kernel = GaussianFilter::<B>::kernel(2.0, 6);
        assert_eq!(kernel.len(), 13);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(kernel[6] > kernel[5]);
    }

    #[test]
    fn test_preserves_shape_and_interior_of_constant_plane() {
        let device = Default::default();
        let planes = Tensor::<B, 4>::ones([2, 1, 9, 9], &device);
        let out = GaussianFilter::<B>::new(1.0).apply(planes);
        assert_eq!(out.dims(), [2, 1, 9, 9]);
        let centre = out.slice([0..1, 0..1, 4..5, 4..5]).into_scalar();
        assert!((centre - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        let device = Default::default();
        let planes = Tensor::<B, 4>::ones([1, 1, 3, 3], &device);
        let out = GaussianFilter::<B>::new(0.0).apply(planes.clone());
        assert_eq!(
            out.into_data().into_vec::<f32>().unwrap(),
            planes.into_data().into_vec::<f32>().unwrap()
        );
    }

    #[test]
    fn test_reflect_index_mirrors_both_edges() {
        let mapped: Vec<usize> = (-4..8).map(|i| reflect_index(i, 4)).collect();
        assert_eq!(mapped, vec![3, 2, 1, 0, 0, 1, 2, 3, 3, 2, 1, 0]);
        assert_eq!(reflect_index(-9, 2), 0);
    }

    #[test]
    fn test_constant_plane_stays_constant_up_to_the_border() {
        let device = Default::default();
        let planes = Tensor::<B, 4>::full([1, 1, 9, 9], 1000.0, &device);
        let out = GaussianFilter::<B>::new(2.0).apply(planes);
        let values = out.into_data().into_vec::<f32>().unwrap();
        assert_eq!(values.len(), 81);
        assert!(values.iter().all(|v| (v - 1000.0).abs() < 1e-2), "{values:?}");
    }

    #[test]
    fn test_kernel_wider_than_plane_keeps_constant() {
        let device = Default::default();
        let planes = Tensor::<B, 4>::full([2, 1, 3, 3], 7.0, &device);
        let out = GaussianFilter::<B>::new(5.0).apply(planes);
        assert_eq!(out.dims(), [2, 1, 3, 3]);
        let values = out.into_data().into_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 7.0).abs() < 1e-3), "{values:?}");
    }

    #[test]
    fn test_ramp_is_not_pulled_down_at_the_edges() {
        let device = Default::default();
        let ramp: Vec<f32> = (0..25).map(|i| (i % 5) as f32 + 10.0).collect();
        let planes = Tensor::<B, 4>::from_data(TensorData::new(ramp, [1, 1, 5, 5]), &device);
        let out = GaussianFilter::<B>::new(1.0).apply(planes);
        let values = out.into_data().into_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (10.0..=14.0).contains(v)), "{values:?}");
    }
}
