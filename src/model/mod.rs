mod blocks;
mod discriminator;
mod generator;
pub mod layers;

pub use blocks::{
    minibatch_std_dev, DiscriminatorBlock, DiscriminatorBlockInit, FromRgb, GeneratorBlock,
    GeneratorBlockInit, LastDiscriminatorBlock, LastDiscriminatorBlockInit, RgbAdapterInit, ToRgb,
};
pub use discriminator::{Discriminator, DiscriminatorInit};
pub use generator::{GenerationActivation, Generator, GeneratorInit};
pub use layers::{FeatureNorm, PixelNorm};
