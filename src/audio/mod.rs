pub mod graph;
pub mod mixer;

pub use graph::{AudioGraph, AudioGraphFactory, MixerConfig, PcmGraphFactory, PcmMixGraph};
pub use mixer::{mix_audio, MixRequest, MixResult};
