use crate::common::*;

/// Training-side configuration: model construction parameters plus the
/// per-scale growth schedule. The crate only defines and validates these
/// types; the training driver consuming them is external.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let config: Self = json5::from_str(&text)?;
        config.validate()?;
        info!(
            "loaded config: {} scales, final side {}",
            config.schedule.depths.len(),
            config.schedule.output_side()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.schedule.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_latent_dim")]
    pub latent_dim: i64,
    #[serde(default = "default_image_dim")]
    pub input_dim: i64,
    #[serde(default = "default_image_dim")]
    pub output_dim: i64,
    #[serde(default = "default_true")]
    pub init_bias_to_zero: bool,
    #[serde(default = "default_lrelu_slope")]
    pub lrelu_slope: f64,
    #[serde(default = "default_true")]
    pub apply_pixel_norm: bool,
    #[serde(default = "default_true")]
    pub apply_minibatch_norm: bool,
    #[serde(default = "default_true")]
    pub equalized_lr: bool,
    #[serde(default = "default_decision_layer_size")]
    pub decision_layer_size: i64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            latent_dim: default_latent_dim(),
            input_dim: default_image_dim(),
            output_dim: default_image_dim(),
            init_bias_to_zero: true,
            lrelu_slope: default_lrelu_slope(),
            apply_pixel_norm: true,
            apply_minibatch_norm: true,
            equalized_lr: true,
            decision_layer_size: default_decision_layer_size(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.latent_dim > 0, "latent_dim must be positive");
        ensure!(
            self.input_dim > 0 && self.output_dim > 0,
            "image channel counts must be positive"
        );
        ensure!(
            self.lrelu_slope > 0.0 && self.lrelu_slope < 1.0,
            "lrelu_slope must lie in (0, 1)"
        );
        ensure!(
            self.decision_layer_size > 0,
            "decision_layer_size must be positive"
        );
        Ok(())
    }
}

/// Per-scale schedule. Index 0 is the 4x4 scale; each later entry covers
/// one doubling of the resolution. The alpha ramp for a scale starts at
/// `alpha_jump_start` steps after the scale is added and decays from 1
/// towards 0 in `alpha_jump_ntimes` jumps, one every
/// `alpha_jump_interval` steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_depths")]
    pub depths: Vec<i64>,
    #[serde(default = "default_max_step_at_scale")]
    pub max_step_at_scale: Vec<i64>,
    #[serde(default = "default_alpha_jump_start")]
    pub alpha_jump_start: Vec<i64>,
    #[serde(default = "default_alpha_jump_interval")]
    pub alpha_jump_interval: Vec<i64>,
    #[serde(default = "default_alpha_jump_ntimes")]
    pub alpha_jump_ntimes: Vec<i64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            depths: default_depths(),
            max_step_at_scale: default_max_step_at_scale(),
            alpha_jump_start: default_alpha_jump_start(),
            alpha_jump_interval: default_alpha_jump_interval(),
            alpha_jump_ntimes: default_alpha_jump_ntimes(),
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.depths.is_empty(), "at least one scale is required");
        ensure!(
            self.depths.iter().all(|&depth| depth > 0),
            "scale depths must be positive"
        );
        ensure!(
            self.max_step_at_scale.len() >= self.depths.len(),
            "max_step_at_scale must cover every scale"
        );
        ensure!(
            self.max_step_at_scale.iter().all(|&steps| steps > 0),
            "per-scale step counts must be positive"
        );

        let ramp_len = self.alpha_jump_start.len();
        ensure!(
            self.alpha_jump_interval.len() == ramp_len
                && self.alpha_jump_ntimes.len() == ramp_len,
            "alpha ramp lists must have equal lengths"
        );
        ensure!(
            ramp_len >= self.depths.len(),
            "alpha ramp lists must cover every scale"
        );

        for (scale, (&start, &interval, &ntimes)) in izip!(
            &self.alpha_jump_start,
            &self.alpha_jump_interval,
            &self.alpha_jump_ntimes
        )
        .enumerate()
        {
            ensure!(
                start >= 0 && interval >= 0 && ntimes >= 0,
                "alpha ramp entries for scale {} must be non-negative",
                scale
            );
            // scale 0 has nothing to blend with and keeps an empty ramp
            if scale > 0 {
                ensure!(
                    interval > 0 && ntimes > 0,
                    "alpha ramp for scale {} never reaches zero",
                    scale
                );
            }
        }

        Ok(())
    }

    /// Side length of the image at the final scale. An empty depth list
    /// (rejected by [`validate`](Self::validate)) counts as the base
    /// 4x4 scale.
    pub fn output_side(&self) -> i64 {
        let scales = self.depths.len().max(1);
        4 * (2_i64.pow((scales - 1) as u32))
    }
}

fn default_latent_dim() -> i64 {
    512
}

fn default_image_dim() -> i64 {
    3
}

fn default_lrelu_slope() -> f64 {
    0.2
}

fn default_decision_layer_size() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_depths() -> Vec<i64> {
    vec![512, 512, 512, 512, 256, 128, 64]
}

fn default_max_step_at_scale() -> Vec<i64> {
    vec![
        48_000, 96_000, 96_000, 96_000, 96_000, 96_000, 150_000, 200_000, 200_000,
    ]
}

fn default_alpha_jump_start() -> Vec<i64> {
    vec![0, 500, 500, 500, 500, 500, 500, 500, 500]
}

fn default_alpha_jump_interval() -> Vec<i64> {
    vec![0, 32, 32, 32, 32, 32, 32, 32, 32]
}

fn default_alpha_jump_ntimes() -> Vec<i64> {
    vec![0, 600, 600, 600, 600, 600, 600, 600, 600]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config {
            model: ModelConfig::default(),
            schedule: ScheduleConfig::default(),
        };
        config.validate().unwrap();
        assert_eq!(config.schedule.output_side(), 256);
    }

    #[test]
    fn parses_json5_with_defaults() {
        let config: Config = json5::from_str(
            r#"{
                model: { latent_dim: 256 },
                schedule: { depths: [256, 256, 128] },
            }"#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.model.latent_dim, 256);
        assert_eq!(config.model.output_dim, 3);
        assert_eq!(config.schedule.depths, vec![256, 256, 128]);
        assert_eq!(config.schedule.output_side(), 16);
    }

    #[test]
    fn output_side_tolerates_empty_depths() {
        let mut schedule = ScheduleConfig::default();
        schedule.depths.clear();
        assert_eq!(schedule.output_side(), 4);
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn rejects_bad_schedules() {
        let mut schedule = ScheduleConfig::default();
        schedule.depths[0] = -512;
        assert!(schedule.validate().is_err());

        let mut schedule = ScheduleConfig::default();
        schedule.alpha_jump_interval.pop();
        assert!(schedule.validate().is_err());

        let mut schedule = ScheduleConfig::default();
        schedule.max_step_at_scale.truncate(2);
        assert!(schedule.validate().is_err());
    }
}
