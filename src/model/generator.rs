use super::{
    blocks::{GeneratorBlock, GeneratorBlockInit, RgbAdapterInit, ToRgb},
    layers::{leaky_relu, EqualizedLinear, EqualizedLinearInit, FeatureNorm, PixelNorm},
};
use crate::common::*;

/// Activation applied to the generated image, identity when absent.
pub type GenerationActivation = Box<dyn Fn(&Tensor) -> Tensor + Send>;

pub struct GeneratorInit {
    pub latent_dim: i64,
    pub first_depth: i64,
    pub init_bias_to_zero: bool,
    pub lrelu_slope: f64,
    pub apply_pixel_norm: bool,
    pub generation_activation: Option<GenerationActivation>,
    pub output_dim: i64,
    pub equalized_lr: bool,
}

impl Default for GeneratorInit {
    fn default() -> Self {
        Self {
            latent_dim: 512,
            first_depth: 512,
            init_bias_to_zero: true,
            lrelu_slope: 0.2,
            apply_pixel_norm: true,
            generation_activation: None,
            output_dim: 3,
            equalized_lr: true,
        }
    }
}

impl GeneratorInit {
    pub fn build(self, device: Device) -> Generator {
        let Self {
            latent_dim,
            first_depth,
            init_bias_to_zero,
            lrelu_slope,
            apply_pixel_norm,
            generation_activation,
            output_dim,
            equalized_lr,
        } = self;

        let vs = VarStore::new(device);
        let pixel_norm: Option<Arc<dyn FeatureNorm>> =
            apply_pixel_norm.then(|| Arc::new(PixelNorm::new()) as Arc<dyn FeatureNorm>);

        let (format_layer, first_block, to_rgb) = {
            let root = vs.root();

            // the format layer expands the latent vector into a 4x4 grid
            let format_layer = EqualizedLinearInit {
                equalized: equalized_lr,
                init_bias_to_zero,
            }
            .build(&root / "format", latent_dim, 16 * first_depth);

            let first_block = GeneratorBlockInit {
                lrelu_slope,
                equalized: equalized_lr,
                init_bias_to_zero,
                is_first: true,
            }
            .build(
                &root / "block_0",
                first_depth,
                first_depth,
                pixel_norm.clone(),
            );

            let to_rgb = vec![RgbAdapterInit {
                equalized: equalized_lr,
                init_bias_to_zero,
            }
            .to_rgb(&root / "to_rgb_0", first_depth, output_dim)];

            (format_layer, first_block, to_rgb)
        };

        Generator {
            vs,
            latent_dim,
            first_depth,
            output_dim,
            init_bias_to_zero,
            lrelu_slope,
            equalized_lr,
            pixel_norm,
            generation_activation,
            format_layer,
            first_block,
            blocks: vec![],
            to_rgb,
            depths: vec![first_depth],
            alpha: 0.0,
        }
    }
}

/// Progressive-growing generator. Starts at a 4x4 output and doubles the
/// resolution with every [`add_block`](Generator::add_block) call.
pub struct Generator {
    vs: VarStore,
    latent_dim: i64,
    first_depth: i64,
    output_dim: i64,
    init_bias_to_zero: bool,
    lrelu_slope: f64,
    equalized_lr: bool,
    pixel_norm: Option<Arc<dyn FeatureNorm>>,
    generation_activation: Option<GenerationActivation>,
    format_layer: EqualizedLinear,
    first_block: GeneratorBlock,
    blocks: Vec<GeneratorBlock>,
    to_rgb: Vec<ToRgb>,
    depths: Vec<i64>,
    alpha: f64,
}

impl Generator {
    /// Appends one scale, doubling the output resolution.
    pub fn add_block(&mut self, new_depth: i64) -> Result<()> {
        ensure!(
            new_depth > 0,
            "scale depth must be positive, got {}",
            new_depth
        );

        let prev_depth = *self.depths.last().unwrap();
        let scale = self.depths.len();

        let (block, to_rgb) = {
            let root = self.vs.root();
            let block = GeneratorBlockInit {
                lrelu_slope: self.lrelu_slope,
                equalized: self.equalized_lr,
                init_bias_to_zero: self.init_bias_to_zero,
                is_first: false,
            }
            .build(
                &root / format!("block_{}", scale),
                prev_depth,
                new_depth,
                self.pixel_norm.clone(),
            );
            let to_rgb = RgbAdapterInit {
                equalized: self.equalized_lr,
                init_bias_to_zero: self.init_bias_to_zero,
            }
            .to_rgb(&root / format!("to_rgb_{}", scale), new_depth, self.output_dim);
            (block, to_rgb)
        };

        self.depths.push(new_depth);
        self.blocks.push(block);
        self.to_rgb.push(to_rgb);

        let (side, _) = self.output_size();
        debug!(
            "generator grew to scale {} (depth {}, side {})",
            scale, new_depth, side
        );
        Ok(())
    }

    /// Updates the blend coefficient between the newest scale and the
    /// upsampled previous scale.
    pub fn set_alpha(&mut self, alpha: f64) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&alpha),
            "alpha must be in [0, 1], got {}",
            alpha
        );
        ensure!(
            !self.blocks.is_empty(),
            "cannot blend scales while only scale 0 is defined"
        );

        self.alpha = alpha;
        Ok(())
    }

    pub fn forward(&self, latent: &Tensor) -> Tensor {
        let batch_size = latent.size()[0];

        let mut xs = match &self.pixel_norm {
            Some(norm) => norm.normalize(latent),
            None => latent.shallow_clone(),
        };
        xs = xs.view([batch_size, -1]);

        // format layer: latent vector to 4x4 grid
        xs = leaky_relu(&self.format_layer.forward(&xs), self.lrelu_slope);
        xs = xs.view([batch_size, self.first_depth, 4, 4]);
        if let Some(norm) = &self.pixel_norm {
            xs = norm.normalize(&xs);
        }

        xs = self.first_block.forward(&xs);

        // The blend source is the input of the newest block, projected
        // through the second-to-last adapter and upsampled to match the
        // final resolution.
        let blend = self.alpha > 0.0 && !self.blocks.is_empty();
        let mut low_res = None;
        for (index, block) in self.blocks.iter().enumerate() {
            if blend && index + 1 == self.blocks.len() {
                let adapter = &self.to_rgb[self.to_rgb.len() - 2];
                low_res = Some(adapter.forward(&xs, true));
            }
            xs = block.forward(&xs);
        }

        let mut out = self.to_rgb.last().unwrap().forward(&xs, false);
        if let Some(low_res) = low_res {
            out = low_res * self.alpha + out * (1.0 - self.alpha);
        }

        match &self.generation_activation {
            Some(activation) => activation(&out),
            None => out,
        }
    }

    /// Side lengths of the generated image at the current scale.
    pub fn output_size(&self) -> (i64, i64) {
        let side = 4 * (2_i64.pow((self.to_rgb.len() - 1) as u32));
        (side, side)
    }

    pub fn latent_dim(&self) -> i64 {
        self.latent_dim
    }

    pub fn depths(&self) -> &[i64] {
        &self.depths
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_rgb_adapters(&self) -> usize {
        self.to_rgb.len()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn var_store(&self) -> &VarStore {
        &self.vs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logger() {
        let _ = pretty_env_logger::try_init();
    }

    fn small_generator() -> Generator {
        init_logger();
        GeneratorInit {
            latent_dim: 16,
            first_depth: 16,
            ..Default::default()
        }
        .build(Device::Cpu)
    }

    #[test]
    fn output_side_grows_with_scales() {
        let mut generator = small_generator();
        assert_eq!(generator.output_size(), (4, 4));

        for _ in 0..3 {
            generator.add_block(16).unwrap();
        }
        assert_eq!(generator.output_size(), (32, 32));

        let latent = Tensor::randn(&[2, 16], (Kind::Float, Device::Cpu));
        assert_eq!(generator.forward(&latent).size(), vec![2, 3, 32, 32]);
    }

    #[test]
    fn add_block_appends_depth_and_adapter() {
        let mut generator = small_generator();
        assert_eq!(generator.depths(), &[16]);
        assert_eq!(generator.num_rgb_adapters(), 1);

        generator.add_block(8).unwrap();
        assert_eq!(generator.depths(), &[16, 8]);
        assert_eq!(generator.num_rgb_adapters(), 2);
        assert_eq!(generator.num_blocks(), 1);
    }

    #[test]
    fn add_block_rejects_non_positive_depth() {
        let mut generator = small_generator();
        assert!(generator.add_block(0).is_err());
        assert!(generator.add_block(-8).is_err());
        assert_eq!(generator.depths(), &[16]);
    }

    #[test]
    fn set_alpha_bounds() {
        let mut generator = small_generator();
        generator.add_block(16).unwrap();

        assert!(generator.set_alpha(-0.1).is_err());
        assert!(generator.set_alpha(1.1).is_err());
        generator.set_alpha(0.0).unwrap();
        generator.set_alpha(1.0).unwrap();
        assert_eq!(generator.alpha(), 1.0);
    }

    #[test]
    fn set_alpha_requires_a_grown_scale() {
        let mut generator = small_generator();
        assert!(generator.set_alpha(0.5).is_err());
        assert_eq!(generator.alpha(), 0.0);
    }

    #[test]
    fn zero_alpha_output_is_unblended() {
        let mut generator = small_generator();
        generator.add_block(16).unwrap();

        let latent = Tensor::randn(&[2, 16], (Kind::Float, Device::Cpu));
        let before = generator.forward(&latent);
        generator.set_alpha(0.0).unwrap();
        let after = generator.forward(&latent);
        assert!(before.allclose(&after, 1e-6, 1e-6, false));
    }

    #[test]
    fn blended_output_keeps_full_resolution() {
        let mut generator = small_generator();
        generator.add_block(16).unwrap();
        generator.add_block(8).unwrap();
        generator.set_alpha(0.7).unwrap();

        let latent = Tensor::randn(&[2, 16], (Kind::Float, Device::Cpu));
        assert_eq!(generator.forward(&latent).size(), vec![2, 3, 16, 16]);
    }

    #[test]
    fn final_activation_is_applied() {
        let mut init = GeneratorInit {
            latent_dim: 16,
            first_depth: 16,
            ..Default::default()
        };
        init.generation_activation = Some(Box::new(|xs| xs.tanh()));
        let generator = init.build(Device::Cpu);

        let latent = Tensor::randn(&[2, 16], (Kind::Float, Device::Cpu));
        let out = generator.forward(&latent);
        let max = out.abs().max().double_value(&[]);
        assert!(max <= 1.0);
    }

    #[test]
    fn default_generator_end_to_end() {
        let generator = GeneratorInit::default().build(Device::Cpu);
        let latent = Tensor::zeros(&[2, 512], (Kind::Float, Device::Cpu));
        let out = generator.forward(&latent);

        assert_eq!(out.size(), vec![2, 3, 4, 4]);
        assert_eq!(out.isfinite().all().int64_value(&[]), 1);
    }
}
