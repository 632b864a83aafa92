//! MPI Sintel: <http://sintel.is.tue.mpg.de/>
//!
//! ```text
//! root/<split>/<pass>/<scene>/frame_0001.png ...
//! root/<split>/flow/<scene>/frame_0001.flo ...
//! ```

use std::path::Path;

use crate::{
    augmentation::AugmentationConfig,
    dataset::FlowDataset,
    error::DatasetResult,
    sample::{ImagePair, SampleInfo},
    sources::scan,
};

/// Sintel split directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SintelSplit {
    Training,
    /// No ground truth; the dataset is built in test mode.
    Test,
}

impl SintelSplit {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Test => "test",
        }
    }
}

/// Sintel render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SintelPass {
    Clean,
    Final,
}

impl SintelPass {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Final => "final",
        }
    }
}

/// Scan a Sintel split. Consecutive frames of each scene form a pair tagged
/// with `(scene, frame index)`; scenes are visited in name order.
pub fn mpi_sintel(
    aug_params: Option<AugmentationConfig>,
    split: SintelSplit,
    root: &Path,
    pass: SintelPass,
) -> DatasetResult<FlowDataset> {
    let mut dataset = FlowDataset::new(aug_params, false);
    let flow_root = root.join(split.dir_name()).join("flow");
    let image_root = root.join(split.dir_name()).join(pass.dir_name());

    if split == SintelSplit::Test {
        dataset.set_test(true);
    }

    scan::require_dir(&image_root)?;
    for scene_dir in scan::directories_at_depth(&image_root, 1)? {
        let scene = scan::file_name(&scene_dir);
        let images = scan::files_with_suffix(&scene_dir, ".png")?;
        for (frame, window) in images.windows(2).enumerate() {
            dataset.push_pair(
                ImagePair::new(&window[0], &window[1]),
                Some(SampleInfo::Scene {
                    scene: scene.clone(),
                    frame,
                }),
            );
        }

        if split != SintelSplit::Test {
            for flow in scan::files_with_suffix(&flow_root.join(&scene), ".flo")? {
                dataset.push_flow(flow);
            }
        }
    }

    log::info!(
        "Sintel {}/{}: {} image pairs in {}",
        split.dir_name(),
        pass.dir_name(),
        dataset.len(),
        image_root.display()
    );
    Ok(dataset)
}
