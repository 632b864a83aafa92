//! Composable optical-flow training datasets for Burn.
//!
//! Scanners in [`sources`] turn the on-disk layout of Sintel, FlyingChairs,
//! FlyingThings3D, KITTI and HD1K into [`FlowDataset`]s of path lists. Those
//! compose through [`FlowDataset::concatenate`] and [`FlowDataset::repeat`],
//! decode and augment samples lazily on access, and batch through
//! [`FlowBatcher`]. [`stage`] assembles the standard training mixes.

pub mod augmentation;
pub mod batch;
pub mod dataset;
pub mod error;
pub mod frame;
pub mod sample;
pub mod sources;
pub mod stage;

// Re-export commonly used types
pub use augmentation::{AugmentationConfig, Augmentor, FlowAugmentor, SparseFlowAugmentor};
pub use batch::{crop_or_pad, FlowBatch, FlowBatcher};
pub use dataset::FlowDataset;
pub use error::{DatasetError, DatasetResult};
pub use sample::{
    FlowField, FlowItem, ImagePair, SampleInfo, TestSample, TrainSample, ValidMask,
    MAX_FLOW_MAGNITUDE,
};
pub use stage::{
    build_dataloader, build_train_dataset, DatasetRoots, StageConfig, TrainStage,
    TrainingSources,
};
