//! Sample references and the raw per-sample data returned by a dataset.
//!
//! Following Burn's convention, datasets return raw buffers and the batcher
//! handles tensor creation and device placement.

use std::{fmt, path::PathBuf};

use image::RgbImage;

/// Flow components at or above this magnitude mark a pixel as invalid.
pub const MAX_FLOW_MAGNITUDE: f32 = 1000.0;

/// An ordered pair of frames, `image1` rendered before `image2` in the
/// direction the flow is expressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImagePair {
    pub image1: PathBuf,
    pub image2: PathBuf,
}

impl ImagePair {
    pub fn new(image1: impl Into<PathBuf>, image2: impl Into<PathBuf>) -> Self {
        Self {
            image1: image1.into(),
            image2: image2.into(),
        }
    }
}

/// Per-sample metadata attached by the scanners.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SampleInfo {
    /// Scene name and index of the first frame within the scene.
    Scene { scene: String, frame: usize },
    /// File name of the first frame.
    Frame { frame_id: String },
}

impl fmt::Display for SampleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scene { scene, frame } => write!(f, "{scene}/{frame}"),
            Self::Frame { frame_id } => f.write_str(frame_id),
        }
    }
}

/// Dense `H×W×2` flow field stored row-major with interleaved `(u, v)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub data: Vec<f32>,
    pub height: usize,
    pub width: usize,
}

impl FlowField {
    /// Wraps an interleaved buffer. The buffer length must be `height * width * 2`.
    pub fn new(data: Vec<f32>, height: usize, width: usize) -> Self {
        debug_assert_eq!(data.len(), height * width * 2);
        Self {
            data,
            height,
            width,
        }
    }

    pub fn zeros(height: usize, width: usize) -> Self {
        Self::new(vec![0.0; height * width * 2], height, width)
    }

    /// Flow vector at column `x`, row `y`.
    pub fn at(&self, x: usize, y: usize) -> [f32; 2] {
        let offset = (y * self.width + x) * 2;
        [self.data[offset], self.data[offset + 1]]
    }

    pub fn set(&mut self, x: usize, y: usize, value: [f32; 2]) {
        let offset = (y * self.width + x) * 2;
        self.data[offset] = value[0];
        self.data[offset + 1] = value[1];
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, 2]
    }

    /// Validity derived from the sentinel convention: both components must be
    /// strictly below [`MAX_FLOW_MAGNITUDE`] in absolute value.
    pub fn derive_validity(&self) -> ValidMask {
        let data = self
            .data
            .chunks_exact(2)
            .map(|uv| uv[0].abs() < MAX_FLOW_MAGNITUDE && uv[1].abs() < MAX_FLOW_MAGNITUDE)
            .collect();
        ValidMask::new(data, self.height, self.width)
    }
}

/// Per-pixel `H×W` flag telling whether the flow at that pixel is meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidMask {
    pub data: Vec<bool>,
    pub height: usize,
    pub width: usize,
}

impl ValidMask {
    pub fn new(data: Vec<bool>, height: usize, width: usize) -> Self {
        debug_assert_eq!(data.len(), height * width);
        Self {
            data,
            height,
            width,
        }
    }

    pub fn at(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

/// A supervised sample: two frames, their flow and its validity.
#[derive(Debug, Clone)]
pub struct TrainSample {
    pub image1: RgbImage,
    pub image2: RgbImage,
    pub flow: FlowField,
    pub valid: ValidMask,
}

/// A sample without ground truth, tagged with its metadata.
#[derive(Debug, Clone)]
pub struct TestSample {
    pub image1: RgbImage,
    pub image2: RgbImage,
    pub info: SampleInfo,
}

/// The item a [`FlowDataset`](crate::FlowDataset) yields.
#[derive(Debug, Clone)]
pub enum FlowItem {
    Train(TrainSample),
    Test(TestSample),
}

impl FlowItem {
    /// `(height, width)` of the first frame.
    pub fn size(&self) -> (usize, usize) {
        let image = match self {
            Self::Train(sample) => &sample.image1,
            Self::Test(sample) => &sample.image1,
        };
        (image.height() as usize, image.width() as usize)
    }

    pub fn as_train(&self) -> Option<&TrainSample> {
        match self {
            Self::Train(sample) => Some(sample),
            Self::Test(_) => None,
        }
    }

    pub fn into_train(self) -> Option<TrainSample> {
        match self {
            Self::Train(sample) => Some(sample),
            Self::Test(_) => None,
        }
    }
}
