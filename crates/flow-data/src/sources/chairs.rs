//! FlyingChairs:
//! <https://lmb.informatik.uni-freiburg.de/resources/datasets/FlyingChairs.en.html>
//!
//! ```text
//! root/00001_img1.ppm root/00001_img2.ppm root/00001_flow.flo ...
//! ```
//!
//! A split file assigns each sample to a partition: one integer per sample,
//! `1` for training and `2` for validation.

use std::{fs, path::Path};

use crate::{
    augmentation::AugmentationConfig,
    dataset::FlowDataset,
    error::{DatasetError, DatasetResult},
    sample::ImagePair,
    sources::scan,
};

/// FlyingChairs partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChairsSplit {
    Training,
    Validation,
}

impl ChairsSplit {
    /// Partition id used in the split file.
    pub fn id(self) -> i32 {
        match self {
            Self::Training => 1,
            Self::Validation => 2,
        }
    }
}

/// Parse a split file into one partition id per sample.
pub fn read_split_file(path: &Path) -> DatasetResult<Vec<i32>> {
    let text = fs::read_to_string(path).map_err(|source| DatasetError::FileReadFailed {
        path: path.to_path_buf(),
        source,
    })?;

    text.split_whitespace()
        .map(|token| {
            token
                .parse::<i32>()
                .map_err(|_| DatasetError::InvalidSplitEntry {
                    path: path.to_path_buf(),
                    value: token.to_string(),
                })
        })
        .collect()
}

/// Scan FlyingChairs and keep the samples assigned to `split`.
///
/// Fails before any sample is accessed unless there are exactly two images
/// per flow, or if the split file is shorter than the flow list.
pub fn flying_chairs(
    aug_params: Option<AugmentationConfig>,
    split: ChairsSplit,
    split_file: &Path,
    root: &Path,
) -> DatasetResult<FlowDataset> {
    let mut dataset = FlowDataset::new(aug_params, false);

    let images = scan::files_with_suffix(root, ".ppm")?;
    let flows = scan::files_with_suffix(root, ".flo")?;
    if images.len() != 2 * flows.len() {
        return Err(DatasetError::FrameCountMismatch {
            path: root.to_path_buf(),
            images: images.len(),
            flows: flows.len(),
        });
    }

    let split_list = read_split_file(split_file)?;
    if split_list.len() < flows.len() {
        return Err(DatasetError::SplitFileTooShort {
            path: split_file.to_path_buf(),
            entries: split_list.len(),
            required: flows.len(),
        });
    }

    for (i, flow) in flows.iter().enumerate() {
        if split_list[i] == split.id() {
            dataset.push_sample(ImagePair::new(&images[2 * i], &images[2 * i + 1]), flow);
        }
    }

    log::info!(
        "FlyingChairs {split:?}: {} of {} samples in {}",
        dataset.len(),
        flows.len(),
        root.display()
    );
    Ok(dataset)
}
