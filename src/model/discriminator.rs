use super::{
    blocks::{
        DiscriminatorBlock, DiscriminatorBlockInit, FromRgb, LastDiscriminatorBlock,
        LastDiscriminatorBlockInit, RgbAdapterInit,
    },
    layers::{EqualizedLinear, EqualizedLinearInit},
};
use crate::common::*;

#[derive(Debug, Clone)]
pub struct DiscriminatorInit {
    pub last_depth: i64,
    pub init_bias_to_zero: bool,
    pub lrelu_slope: f64,
    pub decision_layer_size: i64,
    pub apply_minibatch_norm: bool,
    pub input_dim: i64,
    pub equalized_lr: bool,
}

impl Default for DiscriminatorInit {
    fn default() -> Self {
        Self {
            last_depth: 512,
            init_bias_to_zero: true,
            lrelu_slope: 0.2,
            decision_layer_size: 1,
            apply_minibatch_norm: false,
            input_dim: 3,
            equalized_lr: true,
        }
    }
}

impl DiscriminatorInit {
    pub fn build(self, device: Device) -> Discriminator {
        let Self {
            last_depth,
            init_bias_to_zero,
            lrelu_slope,
            decision_layer_size,
            apply_minibatch_norm,
            input_dim,
            equalized_lr,
        } = self;

        let vs = VarStore::new(device);
        let (last_block, from_rgb, decision_layer) = {
            let root = vs.root();

            let last_block = LastDiscriminatorBlockInit {
                lrelu_slope,
                equalized: equalized_lr,
                init_bias_to_zero,
                apply_minibatch_norm,
            }
            .build(&root / "block_0", last_depth);

            let from_rgb = vec![RgbAdapterInit {
                equalized: equalized_lr,
                init_bias_to_zero,
            }
            .from_rgb(&root / "from_rgb_0", input_dim, last_depth)];

            let decision_layer = EqualizedLinearInit {
                equalized: equalized_lr,
                init_bias_to_zero,
            }
            .build(&root / "decision", last_depth, decision_layer_size);

            (last_block, from_rgb, decision_layer)
        };

        Discriminator {
            vs,
            input_dim,
            init_bias_to_zero,
            lrelu_slope,
            equalized_lr,
            last_block,
            decision_layer,
            blocks: vec![],
            from_rgb,
            depths: vec![last_depth],
            alpha: 0.0,
        }
    }
}

/// Progressive-growing discriminator. Scale blocks are traversed from the
/// highest resolution down to the terminal 4x4 block.
#[derive(Debug)]
pub struct Discriminator {
    vs: VarStore,
    input_dim: i64,
    init_bias_to_zero: bool,
    lrelu_slope: f64,
    equalized_lr: bool,
    last_block: LastDiscriminatorBlock,
    decision_layer: EqualizedLinear,
    blocks: Vec<DiscriminatorBlock>,
    from_rgb: Vec<FromRgb>,
    depths: Vec<i64>,
    alpha: f64,
}

impl Discriminator {
    /// Appends one scale, doubling the expected input resolution.
    pub fn add_block(&mut self, new_depth: i64) -> Result<()> {
        ensure!(
            new_depth > 0,
            "scale depth must be positive, got {}",
            new_depth
        );

        let prev_depth = *self.depths.last().unwrap();
        let scale = self.depths.len();

        let (block, from_rgb) = {
            let root = self.vs.root();
            let block = DiscriminatorBlockInit {
                lrelu_slope: self.lrelu_slope,
                equalized: self.equalized_lr,
                init_bias_to_zero: self.init_bias_to_zero,
            }
            .build(&root / format!("block_{}", scale), new_depth, prev_depth);
            let from_rgb = RgbAdapterInit {
                equalized: self.equalized_lr,
                init_bias_to_zero: self.init_bias_to_zero,
            }
            .from_rgb(
                &root / format!("from_rgb_{}", scale),
                self.input_dim,
                new_depth,
            );
            (block, from_rgb)
        };

        self.depths.push(new_depth);
        self.blocks.push(block);
        self.from_rgb.push(from_rgb);

        debug!("discriminator grew to scale {} (depth {})", scale, new_depth);
        Ok(())
    }

    /// Updates the blend coefficient between the newest scale and the
    /// downsampled previous scale.
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

    /// Realism score for a batch of images, shaped
    /// `(batch, decision_layer_size)`.
    pub fn forward(&self, input: &Tensor) -> Tensor {
        let (score, _feature) = self.forward_impl(input);
        score
    }

    /// Score paired with the pre-decision feature map.
    pub fn forward_with_feature(&self, input: &Tensor) -> (Tensor, Tensor) {
        self.forward_impl(input)
    }

    fn forward_impl(&self, input: &Tensor) -> (Tensor, Tensor) {
        let blend = self.alpha > 0.0 && self.from_rgb.len() > 1;
        let mut low_res = blend.then(|| {
            let adapter = &self.from_rgb[self.from_rgb.len() - 2];
            adapter.forward(input, true)
        });

        let mut xs = self.from_rgb.last().unwrap().forward(input, false);

        // highest resolution first; the blend applies exactly once, right
        // after the newest scale's block
        for block in self.blocks.iter().rev() {
            xs = block.forward(&xs);
            if let Some(low_res) = low_res.take() {
                xs = low_res * self.alpha + xs * (1.0 - self.alpha);
            }
        }

        let feature = self.last_block.forward(&xs);
        let score = self.decision_layer.forward(&feature);
        (score, feature)
    }

    pub fn depths(&self) -> &[i64] {
        &self.depths
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_rgb_adapters(&self) -> usize {
        self.from_rgb.len()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn var_store(&self) -> &VarStore {
        &self.vs
    }
}
