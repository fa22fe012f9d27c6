//! Progressive-growing GAN building blocks on top of tch.
//!
//! The generator and discriminator start at a 4x4 resolution and grow by
//! appending scale blocks, doubling the resolution each time. During the
//! transition into a freshly added scale, the outputs of the newest and
//! the previous scale are blended by a coefficient alpha driven by an
//! external training schedule.

pub mod common;
pub mod config;
pub mod model;

pub use config::{Config, ModelConfig, ScheduleConfig};
pub use model::{
    Discriminator, DiscriminatorInit, FeatureNorm, GenerationActivation, Generator, GeneratorInit,
    PixelNorm,
};
