//! FlyingThings3D (left camera).
//!
//! ```text
//! root/<pass>/TRAIN/<letter>/<seq>/left/0006.png ...
//! root/optical_flow/TRAIN/<letter>/<seq>/into_future/left/OpticalFlowIntoFuture_0006_L.pfm ...
//! root/optical_flow/TRAIN/<letter>/<seq>/into_past/left/OpticalFlowIntoPast_0006_L.pfm ...
//! ```

use std::path::{Path, PathBuf};

use crate::{
    augmentation::AugmentationConfig,
    dataset::FlowDataset,
    error::DatasetResult,
    sample::ImagePair,
    sources::scan,
};

const CAMERA: &str = "left";

/// FlyingThings3D render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThingsPass {
    Clean,
    Final,
}

impl ThingsPass {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Clean => "frames_cleanpass",
            Self::Final => "frames_finalpass",
        }
    }
}

/// Temporal direction of the stored flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    /// Flow from frame `i` to frame `i + 1`.
    IntoFuture,
    /// Flow from frame `i + 1` to frame `i`.
    IntoPast,
}

impl FlowDirection {
    pub const ALL: [Self; 2] = [Self::IntoFuture, Self::IntoPast];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::IntoFuture => "into_future",
            Self::IntoPast => "into_past",
        }
    }
}

/// Pair the frames of one sequence with its flows.
///
/// Forward: `(f[i], f[i+1]) -> g[i]`. Backward: `(f[i+1], f[i]) -> g[i+1]`,
/// since backward flow is stored under the later frame. The last flow of a
/// sequence is never used.
pub fn pair_frames(
    images: &[PathBuf],
    flows: &[PathBuf],
    direction: FlowDirection,
) -> Vec<(ImagePair, PathBuf)> {
    let count = flows.len().saturating_sub(1).min(images.len().saturating_sub(1));
    (0..count)
        .map(|i| match direction {
            FlowDirection::IntoFuture => {
                (ImagePair::new(&images[i], &images[i + 1]), flows[i].clone())
            }
            FlowDirection::IntoPast => (
                ImagePair::new(&images[i + 1], &images[i]),
                flows[i + 1].clone(),
            ),
        })
        .collect()
}

/// Scan the FlyingThings3D training set in both flow directions.
pub fn flying_things3d(
    aug_params: Option<AugmentationConfig>,
    root: &Path,
    pass: ThingsPass,
) -> DatasetResult<FlowDataset> {
    let mut dataset = FlowDataset::new(aug_params, false);

    let image_dirs: Vec<PathBuf> =
        scan::directories_at_depth(&root.join(pass.dir_name()).join("TRAIN"), 2)?
            .into_iter()
            .map(|dir| dir.join(CAMERA))
            .collect();
    let sequence_dirs = scan::directories_at_depth(&root.join("optical_flow").join("TRAIN"), 2)?;

    for direction in FlowDirection::ALL {
        let flow_dirs = sequence_dirs
            .iter()
            .map(|dir| dir.join(direction.dir_name()).join(CAMERA));

        for (image_dir, flow_dir) in image_dirs.iter().zip(flow_dirs) {
            let images = scan::files_with_suffix(image_dir, ".png")?;
            let flows = scan::files_with_suffix(&flow_dir, ".pfm")?;
            for (pair, flow) in pair_frames(&images, &flows, direction) {
                dataset.push_sample(pair, flow);
            }
        }
    }

    log::info!(
        "FlyingThings3D {}: {} image pairs in {}",
        pass.dir_name(),
        dataset.len(),
        root.display()
    );
    Ok(dataset)
}
