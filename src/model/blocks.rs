use super::layers::{
    downscale2d, leaky_relu, upscale2d, EqualizedConv2D, EqualizedConv2DInit, FeatureNorm,
    NORM_EPSILON,
};
use crate::common::*;

/// One generator scale. Doubles the spatial size (except for the first
/// block, which operates on the initial 4x4 grid) and moves the feature
/// depth from `prev_depth` to `new_depth`.
#[derive(Debug, Clone)]
pub struct GeneratorBlockInit {
    pub lrelu_slope: f64,
    pub equalized: bool,
    pub init_bias_to_zero: bool,
    pub is_first: bool,
}

impl Default for GeneratorBlockInit {
    fn default() -> Self {
        Self {
            lrelu_slope: 0.2,
            equalized: true,
            init_bias_to_zero: true,
            is_first: false,
        }
    }
}

impl GeneratorBlockInit {
    pub fn build<'p, P>(
        self,
        path: P,
        prev_depth: i64,
        new_depth: i64,
        norm: Option<Arc<dyn FeatureNorm>>,
    ) -> GeneratorBlock
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            lrelu_slope,
            equalized,
            init_bias_to_zero,
            is_first,
        } = self;

        let conv_init = EqualizedConv2DInit {
            equalized,
            init_bias_to_zero,
            ..Default::default()
        };
        let conv1 = conv_init.clone().build(path / "conv1", prev_depth, new_depth);
        let conv2 = conv_init.build(path / "conv2", new_depth, new_depth);

        GeneratorBlock {
            conv1,
            conv2,
            lrelu_slope,
            upsample: !is_first,
            norm,
        }
    }
}

#[derive(Debug)]
pub struct GeneratorBlock {
    conv1: EqualizedConv2D,
    conv2: EqualizedConv2D,
    lrelu_slope: f64,
    upsample: bool,
    norm: Option<Arc<dyn FeatureNorm>>,
}

impl GeneratorBlock {
    pub fn forward(&self, xs: &Tensor) -> Tensor {
        let mut xs = if self.upsample {
            upscale2d(xs)
        } else {
            xs.shallow_clone()
        };

        xs = leaky_relu(&self.conv1.forward(&xs), self.lrelu_slope);
        if let Some(norm) = &self.norm {
            xs = norm.normalize(&xs);
        }
        xs = leaky_relu(&self.conv2.forward(&xs), self.lrelu_slope);
        if let Some(norm) = &self.norm {
            xs = norm.normalize(&xs);
        }
        xs
    }
}

/// One discriminator scale. Halves the spatial size and moves the feature
/// depth from `new_depth` down to `prev_depth`.
#[derive(Debug, Clone)]
pub struct DiscriminatorBlockInit {
    pub lrelu_slope: f64,
    pub equalized: bool,
    pub init_bias_to_zero: bool,
}

impl Default for DiscriminatorBlockInit {
    fn default() -> Self {
        Self {
            lrelu_slope: 0.2,
            equalized: true,
            init_bias_to_zero: true,
        }
    }
}

impl DiscriminatorBlockInit {
    pub fn build<'p, P>(self, path: P, new_depth: i64, prev_depth: i64) -> DiscriminatorBlock
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            lrelu_slope,
            equalized,
            init_bias_to_zero,
        } = self;

        let conv_init = EqualizedConv2DInit {
            equalized,
            init_bias_to_zero,
            ..Default::default()
        };
        let conv1 = conv_init.clone().build(path / "conv1", new_depth, new_depth);
        let conv2 = conv_init.build(path / "conv2", new_depth, prev_depth);

        DiscriminatorBlock {
            conv1,
            conv2,
            lrelu_slope,
        }
    }
}

#[derive(Debug)]
pub struct DiscriminatorBlock {
    conv1: EqualizedConv2D,
    conv2: EqualizedConv2D,
    lrelu_slope: f64,
}

impl DiscriminatorBlock {
    pub fn forward(&self, xs: &Tensor) -> Tensor {
        let xs = leaky_relu(&self.conv1.forward(xs), self.lrelu_slope);
        let xs = leaky_relu(&self.conv2.forward(&xs), self.lrelu_slope);
        downscale2d(&xs)
    }
}

/// Appends one channel holding the batch-wide standard deviation of the
/// features, broadcast spatially.
pub fn minibatch_std_dev(xs: &Tensor) -> Tensor {
    let (batch_size, _channels, height, width) = xs.size4().unwrap();

    let mean = xs.mean_dim(&[0], true, Kind::Float);
    let var = (xs - mean).square().mean_dim(&[0], true, Kind::Float);
    let std = (var + NORM_EPSILON).sqrt().mean(Kind::Float);

    let channel = std
        .view([1, 1, 1, 1])
        .expand(&[batch_size, 1, height, width], true);
    Tensor::cat(&[xs, &channel], 1)
}

/// Terminal discriminator block. Optionally injects the minibatch
/// statistic channel, then collapses the 4x4 grid to a single feature
/// vector per sample, ready for the decision layer.
#[derive(Debug, Clone)]
pub struct LastDiscriminatorBlockInit {
    pub lrelu_slope: f64,
    pub equalized: bool,
    pub init_bias_to_zero: bool,
    pub apply_minibatch_norm: bool,
}

impl Default for LastDiscriminatorBlockInit {
    fn default() -> Self {
        Self {
            lrelu_slope: 0.2,
            equalized: true,
            init_bias_to_zero: true,
            apply_minibatch_norm: false,
        }
    }
}

impl LastDiscriminatorBlockInit {
    pub fn build<'p, P>(self, path: P, depth: i64) -> LastDiscriminatorBlock
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            lrelu_slope,
            equalized,
            init_bias_to_zero,
            apply_minibatch_norm,
        } = self;

        let in_c = if apply_minibatch_norm {
            depth + 1
        } else {
            depth
        };
        let conv1 = EqualizedConv2DInit {
            equalized,
            init_bias_to_zero,
            ..Default::default()
        }
        .build(path / "conv1", in_c, depth);
        // valid 4x4 conv collapses the last grid to 1x1
        let conv2 = EqualizedConv2DInit {
            ksize: 4,
            padding: 0,
            equalized,
            init_bias_to_zero,
            ..Default::default()
        }
        .build(path / "conv2", depth, depth);

        LastDiscriminatorBlock {
            conv1,
            conv2,
            lrelu_slope,
            apply_minibatch_norm,
        }
    }
}

#[derive(Debug)]
pub struct LastDiscriminatorBlock {
    conv1: EqualizedConv2D,
    conv2: EqualizedConv2D,
    lrelu_slope: f64,
    apply_minibatch_norm: bool,
}

impl LastDiscriminatorBlock {
    pub fn forward(&self, xs: &Tensor) -> Tensor {
        let xs = if self.apply_minibatch_norm {
            minibatch_std_dev(xs)
        } else {
            xs.shallow_clone()
        };

        let xs = leaky_relu(&self.conv1.forward(&xs), self.lrelu_slope);
        let xs = leaky_relu(&self.conv2.forward(&xs), self.lrelu_slope);

        let (batch_size, _c, _h, _w) = xs.size4().unwrap();
        xs.view([batch_size, -1])
    }
}

/// 1x1 projections between feature space and color space, one pair per
/// scale.
#[derive(Debug, Clone)]
pub struct RgbAdapterInit {
    pub equalized: bool,
    pub init_bias_to_zero: bool,
}

impl Default for RgbAdapterInit {
    fn default() -> Self {
        Self {
            equalized: true,
            init_bias_to_zero: true,
        }
    }
}

impl RgbAdapterInit {
    fn conv_init(self) -> EqualizedConv2DInit {
        EqualizedConv2DInit {
            ksize: 1,
            padding: 0,
            equalized: self.equalized,
            init_bias_to_zero: self.init_bias_to_zero,
            ..Default::default()
        }
    }

    pub fn to_rgb<'p, P>(self, path: P, depth: i64, output_dim: i64) -> ToRgb
    where
        P: Borrow<nn::Path<'p>>,
    {
        ToRgb {
            conv: self.conv_init().build(path, depth, output_dim),
        }
    }

    pub fn from_rgb<'p, P>(self, path: P, input_dim: i64, depth: i64) -> FromRgb
    where
        P: Borrow<nn::Path<'p>>,
    {
        FromRgb {
            conv: self.conv_init().build(path, input_dim, depth),
        }
    }
}

#[derive(Debug)]
pub struct ToRgb {
    conv: EqualizedConv2D,
}

impl ToRgb {
    pub fn forward(&self, xs: &Tensor, apply_upscale: bool) -> Tensor {
        let xs = self.conv.forward(xs);
        if apply_upscale {
            upscale2d(&xs)
        } else {
            xs
        }
    }
}

#[derive(Debug)]
pub struct FromRgb {
    conv: EqualizedConv2D,
}

impl FromRgb {
    pub fn forward(&self, xs: &Tensor, apply_downscale: bool) -> Tensor {
        // the input is aligned to the lower resolution before projecting
        let xs = if apply_downscale {
            downscale2d(xs)
        } else {
            xs.shallow_clone()
        };
        self.conv.forward(&xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::layers::PixelNorm;

    #[test]
    fn generator_block_doubles_spatial_size() {
        let vs = VarStore::new(Device::Cpu);
        let norm: Arc<dyn FeatureNorm> = Arc::new(PixelNorm::new());
        let block =
            GeneratorBlockInit::default().build(&vs.root() / "block", 8, 16, Some(norm));

        let xs = Tensor::randn(&[2, 8, 4, 4], (Kind::Float, Device::Cpu));
        assert_eq!(block.forward(&xs).size(), vec![2, 16, 8, 8]);
    }

    #[test]
    fn first_generator_block_keeps_spatial_size() {
        let vs = VarStore::new(Device::Cpu);
        let block = GeneratorBlockInit {
            is_first: true,
            ..Default::default()
        }
        .build(&vs.root() / "block", 8, 8, None);

        let xs = Tensor::randn(&[2, 8, 4, 4], (Kind::Float, Device::Cpu));
        assert_eq!(block.forward(&xs).size(), vec![2, 8, 4, 4]);
    }

    #[test]
    fn discriminator_block_halves_spatial_size() {
        let vs = VarStore::new(Device::Cpu);
        let block = DiscriminatorBlockInit::default().build(&vs.root() / "block", 16, 8);

        let xs = Tensor::randn(&[2, 16, 8, 8], (Kind::Float, Device::Cpu));
        assert_eq!(block.forward(&xs).size(), vec![2, 8, 4, 4]);
    }

    #[test]
    fn minibatch_std_dev_appends_one_channel() {
        let xs = Tensor::randn(&[4, 8, 4, 4], (Kind::Float, Device::Cpu));
        let ys = minibatch_std_dev(&xs);
        assert_eq!(ys.size(), vec![4, 9, 4, 4]);

        // a constant batch carries no diversity signal
        let xs = Tensor::ones(&[4, 8, 4, 4], (Kind::Float, Device::Cpu));
        let channel = minibatch_std_dev(&xs).narrow(1, 8, 1);
        let zeros = Tensor::zeros(&[4, 1, 4, 4], (Kind::Float, Device::Cpu));
        assert!(channel.allclose(&zeros, 1e-3, 1e-3, false));
    }

    #[test]
    fn last_block_collapses_to_feature_vector() {
        let vs = VarStore::new(Device::Cpu);
        let block = LastDiscriminatorBlockInit {
            apply_minibatch_norm: true,
            ..Default::default()
        }
        .build(&vs.root() / "last", 16);

        let xs = Tensor::randn(&[3, 16, 4, 4], (Kind::Float, Device::Cpu));
        assert_eq!(block.forward(&xs).size(), vec![3, 16]);
    }

    #[test]
    fn rgb_adapters_project_and_resample() {
        let vs = VarStore::new(Device::Cpu);
        let root = vs.root();
        let to_rgb = RgbAdapterInit::default().to_rgb(&root / "to_rgb", 16, 3);
        let from_rgb = RgbAdapterInit::default().from_rgb(&root / "from_rgb", 3, 16);

        let features = Tensor::randn(&[2, 16, 8, 8], (Kind::Float, Device::Cpu));
        assert_eq!(to_rgb.forward(&features, false).size(), vec![2, 3, 8, 8]);
        assert_eq!(to_rgb.forward(&features, true).size(), vec![2, 3, 16, 16]);

        let image = Tensor::randn(&[2, 3, 8, 8], (Kind::Float, Device::Cpu));
        assert_eq!(from_rgb.forward(&image, false).size(), vec![2, 16, 8, 8]);
        assert_eq!(from_rgb.forward(&image, true).size(), vec![2, 16, 4, 4]);
    }
}
