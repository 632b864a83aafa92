//! HD1K benchmark: <http://hci-benchmark.iwr.uni-heidelberg.de/>
//!
//! ```text
//! root/hd1k_input/image_2/000000_0000.png ...
//! root/hd1k_flow_gt/flow_occ/000000_0000.png ...
//! ```

use std::path::Path;

use crate::{
    augmentation::AugmentationConfig,
    dataset::FlowDataset,
    error::{DatasetError, DatasetResult},
    sample::ImagePair,
    sources::scan,
};

/// Scan HD1K as a sparse dataset.
///
/// Sequences are numbered from zero and scanning stops at the first sequence
/// with no flow files, so a gap in the numbering hides every later sequence.
pub fn hd1k(aug_params: Option<AugmentationConfig>, root: &Path) -> DatasetResult<FlowDataset> {
    let mut dataset = FlowDataset::new(aug_params, true);
    let flow_dir = root.join("hd1k_flow_gt").join("flow_occ");
    let image_dir = root.join("hd1k_input").join("image_2");

    let mut sequences = 0;
    loop {
        let prefix = format!("{sequences:06}_");
        let in_sequence = |name: &str| name.starts_with(&prefix) && name.ends_with(".png");
        let flows = scan::files_matching(&flow_dir, in_sequence)?;
        let images = scan::files_matching(&image_dir, in_sequence)?;

        if flows.is_empty() {
            break;
        }
        if images.len() < flows.len() {
            return Err(DatasetError::FrameCountMismatch {
                path: image_dir,
                images: images.len(),
                flows: flows.len(),
            });
        }

        for i in 0..flows.len() - 1 {
            dataset.push_sample(ImagePair::new(&images[i], &images[i + 1]), &flows[i]);
        }
        sequences += 1;
    }

    log::info!(
        "HD1K: {} image pairs from {sequences} sequences in {}",
        dataset.len(),
        root.display()
    );
    Ok(dataset)
}
