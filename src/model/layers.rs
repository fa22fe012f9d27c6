use crate::common::*;

pub const NORM_EPSILON: f64 = 1e-8;

/// Feature normalization strategy shared between a network and all of its
/// scale blocks. Held behind an `Arc` so a single instance serves every
/// block of the owning network.
pub trait FeatureNorm: fmt::Debug + Send + Sync {
    fn normalize(&self, xs: &Tensor) -> Tensor;
}

/// Pixelwise vector normalization. Rescales the channel vector at each
/// spatial location to unit root-mean-square magnitude. No parameters.
#[derive(Debug, Clone, Copy)]
pub struct PixelNorm {
    epsilon: f64,
}

impl PixelNorm {
    pub fn new() -> Self {
        Self {
            epsilon: NORM_EPSILON,
        }
    }
}

impl Default for PixelNorm {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureNorm for PixelNorm {
    fn normalize(&self, xs: &Tensor) -> Tensor {
        // channel axis is dim 1 for both (b, c) and (b, c, h, w) inputs
        let mean_sq = xs.square().mean_dim(&[1], true, Kind::Float);
        xs / (mean_sq + self.epsilon).sqrt()
    }
}

pub fn leaky_relu(xs: &Tensor, slope: f64) -> Tensor {
    xs.maximum(&(xs * slope))
}

/// Nearest-neighbor upsampling by a factor of 2.
pub fn upscale2d(xs: &Tensor) -> Tensor {
    let (_b, _c, height, width) = xs.size4().unwrap();
    xs.upsample_nearest2d(&[height * 2, width * 2], None, None)
}

/// Average-pool downsampling by a factor of 2.
pub fn downscale2d(xs: &Tensor) -> Tensor {
    xs.avg_pool2d(&[2, 2], &[2, 2], &[0, 0], false, true, None)
}

fn he_scale(fan_in: i64) -> f64 {
    (2.0 / fan_in as f64).sqrt()
}

fn build_weight<'p>(path: &nn::Path<'p>, dims: &[i64], equalized: bool) -> Tensor {
    let init = if equalized {
        // raw N(0, 1) weights; He's constant is applied at forward time
        nn::Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        }
    } else {
        nn::Init::KaimingUniform
    };
    path.var("weight", dims, init)
}

fn build_bias<'p>(
    path: &nn::Path<'p>,
    out_dim: i64,
    fan_in: i64,
    init_bias_to_zero: bool,
) -> Tensor {
    if init_bias_to_zero {
        path.zeros("bias", &[out_dim])
    } else {
        let bound = 1.0 / (fan_in as f64).sqrt();
        path.var(
            "bias",
            &[out_dim],
            nn::Init::Uniform {
                lo: -bound,
                up: bound,
            },
        )
    }
}

/// Linear layer with optional equalized learning rate. In equalized mode
/// the stored weights stay standard-normal and the activations are scaled
/// by `sqrt(2 / fan_in)` on every evaluation; otherwise it behaves as a
/// plain linear layer with default initialization.
#[derive(Debug, Clone)]
pub struct EqualizedLinearInit {
    pub equalized: bool,
    pub init_bias_to_zero: bool,
}

impl Default for EqualizedLinearInit {
    fn default() -> Self {
        Self {
            equalized: true,
            init_bias_to_zero: true,
        }
    }
}

impl EqualizedLinearInit {
    pub fn build<'p, P>(self, path: P, in_dim: i64, out_dim: i64) -> EqualizedLinear
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            equalized,
            init_bias_to_zero,
        } = self;

        let weight = build_weight(path, &[out_dim, in_dim], equalized);
        let bias = build_bias(path, out_dim, in_dim, init_bias_to_zero);
        let scale = equalized.then(|| he_scale(in_dim));

        EqualizedLinear {
            weight,
            bias,
            scale,
        }
    }
}

#[derive(Debug)]
pub struct EqualizedLinear {
    pub(crate) weight: Tensor,
    pub(crate) bias: Tensor,
    scale: Option<f64>,
}

impl EqualizedLinear {
    pub fn forward(&self, xs: &Tensor) -> Tensor {
        match self.scale {
            Some(scale) => xs.linear(&(&self.weight * scale), Some(&self.bias)),
            None => xs.linear(&self.weight, Some(&self.bias)),
        }
    }
}

/// 2D convolution with optional equalized learning rate. Same weight
/// discipline as [`EqualizedLinear`], with `fan_in = in_c * k * k`.
#[derive(Debug, Clone)]
pub struct EqualizedConv2DInit {
    pub ksize: i64,
    pub stride: i64,
    pub padding: i64,
    pub equalized: bool,
    pub init_bias_to_zero: bool,
}

impl Default for EqualizedConv2DInit {
    fn default() -> Self {
        Self {
            ksize: 3,
            stride: 1,
            padding: 1,
            equalized: true,
            init_bias_to_zero: true,
        }
    }
}

impl EqualizedConv2DInit {
    pub fn build<'p, P>(self, path: P, in_c: i64, out_c: i64) -> EqualizedConv2D
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            ksize,
            stride,
            padding,
            equalized,
            init_bias_to_zero,
        } = self;

        let fan_in = in_c * ksize * ksize;
        let weight = build_weight(path, &[out_c, in_c, ksize, ksize], equalized);
        let bias = build_bias(path, out_c, fan_in, init_bias_to_zero);
        let scale = equalized.then(|| he_scale(fan_in));

        EqualizedConv2D {
            weight,
            bias,
            scale,
            stride,
            padding,
        }
    }
}

#[derive(Debug)]
pub struct EqualizedConv2D {
    pub(crate) weight: Tensor,
    pub(crate) bias: Tensor,
    scale: Option<f64>,
    stride: i64,
    padding: i64,
}

impl EqualizedConv2D {
    pub fn forward(&self, xs: &Tensor) -> Tensor {
        let weight = match self.scale {
            Some(scale) => &self.weight * scale,
            None => self.weight.shallow_clone(),
        };
        xs.conv2d(
            &weight,
            Some(&self.bias),
            &[self.stride, self.stride],
            &[self.padding, self.padding],
            &[1, 1],
            1,
        )
    }
}
