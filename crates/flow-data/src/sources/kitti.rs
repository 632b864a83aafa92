//! KITTI 2015 scene flow benchmark, optical flow subset.
//!
//! ```text
//! root/<split>/image_2/000000_10.png root/<split>/image_2/000000_11.png ...
//! root/training/flow_occ/000000_10.png ...
//! ```

use std::path::Path;

use crate::{
    augmentation::AugmentationConfig,
    dataset::FlowDataset,
    error::DatasetResult,
    sample::{ImagePair, SampleInfo},
    sources::scan,
};

/// KITTI split directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KittiSplit {
    Training,
    /// No ground truth; the dataset is built in test mode.
    Testing,
}

impl KittiSplit {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Testing => "testing",
        }
    }
}

/// Scan a KITTI split as a sparse dataset. Each `*_10.png` frame is paired
/// with the `*_11.png` frame at the same sorted position and tagged with its
/// file name.
pub fn kitti(
    aug_params: Option<AugmentationConfig>,
    split: KittiSplit,
    root: &Path,
) -> DatasetResult<FlowDataset> {
    let mut dataset = FlowDataset::new(aug_params, true);
    let root = root.join(split.dir_name());

    if split == KittiSplit::Testing {
        dataset.set_test(true);
    }

    let image_dir = root.join("image_2");
    let images1 = scan::files_with_suffix(&image_dir, "_10.png")?;
    let images2 = scan::files_with_suffix(&image_dir, "_11.png")?;

    for (image1, image2) in images1.iter().zip(&images2) {
        let frame_id = scan::file_name(image1);
        dataset.push_pair(
            ImagePair::new(image1, image2),
            Some(SampleInfo::Frame { frame_id }),
        );
    }

    if split == KittiSplit::Training {
        for flow in scan::files_with_suffix(&root.join("flow_occ"), "_10.png")? {
            dataset.push_flow(flow);
        }
    }

    log::info!(
        "KITTI {}: {} image pairs in {}",
        split.dir_name(),
        dataset.len(),
        root.display()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{Rgb, RgbImage};
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::sample::FlowItem;

    fn write_pairs(root: &Path, split: KittiSplit, count: usize) {
        let image_dir = root.join(split.dir_name()).join("image_2");
        fs::create_dir_all(&image_dir).unwrap();
        for i in 0..count {
            for frame in [10, 11] {
                RgbImage::from_pixel(5, 3, Rgb([i as u8, frame, 0]))
                    .save(image_dir.join(format!("{i:06}_{frame}.png")))
                    .unwrap();
            }
        }
    }

    #[test]
    fn training_pairs_first_and_second_frames() {
        let dir = tempfile::tempdir().unwrap();
        write_pairs(dir.path(), KittiSplit::Training, 2);
        let flow_dir = dir.path().join("training/flow_occ");
        fs::create_dir_all(&flow_dir).unwrap();
        for i in 0..2 {
            fs::write(flow_dir.join(format!("{i:06}_10.png")), b"").unwrap();
        }

        let dataset = kitti(None, KittiSplit::Training, dir.path()).unwrap();

        assert!(dataset.is_sparse());
        assert!(!dataset.is_test());
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.flow_list().len(), 2);
        let pair = &dataset.image_list()[1];
        assert_eq!(scan::file_name(&pair.image1), "000001_10.png");
        assert_eq!(scan::file_name(&pair.image2), "000001_11.png");
    }

    #[test]
    fn testing_split_yields_frame_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_pairs(dir.path(), KittiSplit::Testing, 2);

        let dataset = kitti(None, KittiSplit::Testing, dir.path()).unwrap();
        assert!(dataset.is_test());
        assert!(dataset.flow_list().is_empty());

        match dataset.get_item(1).unwrap() {
            FlowItem::Test(sample) => {
                assert_eq!(
                    sample.info,
                    SampleInfo::Frame {
                        frame_id: "000001_10.png".to_string(),
                    }
                );
                assert_eq!(sample.image2.get_pixel(0, 0), &Rgb([1, 11, 0]));
            }
            FlowItem::Train(_) => panic!("testing split must yield test items"),
        }
    }

    #[test]
    fn shuffled_testing_split_keeps_frame_ids_with_pairs() {
        let dir = tempfile::tempdir().unwrap();
        write_pairs(dir.path(), KittiSplit::Testing, 6);
        let mut dataset = kitti(None, KittiSplit::Testing, dir.path()).unwrap();

        dataset.shuffle(&mut StdRng::seed_from_u64(3));

        assert!(dataset.flow_list().is_empty());
        for (pair, info) in dataset.image_list().iter().zip(dataset.extra_info()) {
            assert_eq!(
                info.as_ref().unwrap().to_string(),
                scan::file_name(&pair.image1)
            );
        }
        for (index, item) in dataset.iter_items().enumerate() {
            let FlowItem::Test(sample) = item.unwrap() else {
                panic!("testing split must yield test items");
            };
            assert_eq!(
                sample.info.to_string(),
                scan::file_name(&dataset.image_list()[index].image1)
            );
        }
    }
}
