//! Composable optical-flow dataset.
//!
//! A [`FlowDataset`] is a list of frame pairs, a parallel list of flow files
//! and a parallel list of optional per-sample metadata. The format scanners in
//! [`sources`](crate::sources) populate it once at construction; afterwards
//! it changes only through [`FlowDataset::shuffle`] or by building new
//! datasets with [`FlowDataset::concatenate`] and [`FlowDataset::repeat`].
//!
//! Samples are decoded lazily, one blocking read per access, and returned as
//! raw buffers following Burn's convention; [`FlowBatcher`](crate::FlowBatcher)
//! turns them into tensors.

use std::path::PathBuf;

use burn::data::dataset::Dataset;
use rand::{seq::SliceRandom, Rng};

use crate::{
    augmentation::{AugmentationConfig, Augmentor},
    error::{DatasetError, DatasetResult},
    frame,
    sample::{FlowItem, ImagePair, SampleInfo, TestSample, TrainSample},
    sources::scan,
};

/// Optical-flow dataset with lazy per-item decoding.
#[derive(Debug, Clone, Default)]
pub struct FlowDataset {
    image_list: Vec<ImagePair>,
    flow_list: Vec<PathBuf>,
    extra_info: Vec<Option<SampleInfo>>,
    sparse: bool,
    is_test: bool,
    augmentor: Option<Augmentor>,
}

impl FlowDataset {
    /// Create an empty dataset.
    ///
    /// When `aug_params` is given, the augmentor variant is picked from
    /// `sparse`: [`Augmentor::Sparse`] for sparse ground truth,
    /// [`Augmentor::Dense`] otherwise.
    pub fn new(aug_params: Option<AugmentationConfig>, sparse: bool) -> Self {
        Self {
            sparse,
            augmentor: aug_params.map(|config| Augmentor::new(config, sparse)),
            ..Self::default()
        }
    }

    /// Create an empty dataset with an explicit augmentor.
    pub fn with_augmentor(augmentor: Option<Augmentor>, sparse: bool) -> Self {
        Self {
            sparse,
            augmentor,
            ..Self::default()
        }
    }

    /// Append a supervised sample without metadata.
    pub fn push_sample(&mut self, pair: ImagePair, flow: impl Into<PathBuf>) {
        self.image_list.push(pair);
        self.extra_info.push(None);
        self.flow_list.push(flow.into());
    }

    /// Append a frame pair and its metadata without touching the flow list.
    /// Scanners use it when flow files are listed separately.
    pub fn push_pair(&mut self, pair: ImagePair, info: Option<SampleInfo>) {
        self.image_list.push(pair);
        self.extra_info.push(info);
    }

    /// Append a flow file without touching the pair list.
    pub fn push_flow(&mut self, flow: impl Into<PathBuf>) {
        self.flow_list.push(flow.into());
    }

    /// Switch the dataset to test mode: samples carry no ground truth and
    /// [`FlowItem::Test`] items are returned.
    pub fn set_test(&mut self, is_test: bool) {
        self.is_test = is_test;
    }

    pub fn len(&self) -> usize {
        self.image_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_list.is_empty()
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    pub fn is_test(&self) -> bool {
        self.is_test
    }

    pub fn augmentor(&self) -> Option<&Augmentor> {
        self.augmentor.as_ref()
    }

    pub fn image_list(&self) -> &[ImagePair] {
        &self.image_list
    }

    pub fn flow_list(&self) -> &[PathBuf] {
        &self.flow_list
    }

    pub fn extra_info(&self) -> &[Option<SampleInfo>] {
        &self.extra_info
    }

    /// Decode the sample at `index`, failing if it is out of bounds.
    pub fn get_item(&self, index: usize) -> DatasetResult<FlowItem> {
        if index >= self.len() {
            return Err(DatasetError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        self.load(index)
    }

    /// Decode the sample at `index mod len()`, so iteration counts larger
    /// than the dataset cycle through it.
    pub fn get_wrapping(&self, index: usize) -> DatasetResult<FlowItem> {
        if self.is_empty() {
            return Err(DatasetError::EmptyDataset);
        }
        self.load(index % self.len())
    }

    /// Lazily decode every sample in order.
    pub fn iter_items(&self) -> impl Iterator<Item = DatasetResult<FlowItem>> + '_ {
        (0..self.len()).map(move |index| self.load(index))
    }

    fn load(&self, index: usize) -> DatasetResult<FlowItem> {
        let pair = &self.image_list[index];

        if self.is_test {
            let image1 = frame::read_image(&pair.image1)?;
            let image2 = frame::read_image(&pair.image2)?;
            let info = self
                .extra_info
                .get(index)
                .cloned()
                .flatten()
                .unwrap_or_else(|| SampleInfo::Frame {
                    frame_id: scan::file_name(&pair.image1),
                });
            return Ok(FlowItem::Test(TestSample {
                image1,
                image2,
                info,
            }));
        }

        let flow_path = self
            .flow_list
            .get(index)
            .ok_or(DatasetError::IndexOutOfBounds {
                index,
                len: self.flow_list.len(),
            })?;
        let (flow, valid) = frame::read_flow(flow_path, self.sparse)?;
        let image1 = frame::read_image(&pair.image1)?;
        let image2 = frame::read_image(&pair.image2)?;

        let (image1, image2, flow, valid) = match &self.augmentor {
            Some(augmentor) => augmentor.apply(image1, image2, flow, valid),
            None => (image1, image2, flow, valid),
        };
        let valid = valid.unwrap_or_else(|| flow.derive_validity());

        Ok(FlowItem::Train(TrainSample {
            image1,
            image2,
            flow,
            valid,
        }))
    }

    /// Apply one random permutation to the pair list, the flow list and the
    /// metadata, keeping them aligned. The flow list is left alone in test
    /// mode, where it is empty.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut permutation: Vec<usize> = (0..self.len()).collect();
        permutation.shuffle(rng);

        self.image_list = permutation
            .iter()
            .map(|&i| self.image_list[i].clone())
            .collect();
        if self.flow_list.len() == permutation.len() {
            self.flow_list = permutation
                .iter()
                .map(|&i| self.flow_list[i].clone())
                .collect();
        }
        self.extra_info = permutation
            .iter()
            .map(|&i| self.extra_info[i].clone())
            .collect();
    }

    /// New dataset holding `self`'s samples followed by `other`'s.
    ///
    /// The result keeps `self`'s sparse flag, test flag and augmentor; `other`
    /// is not checked for a matching mode.
    pub fn concatenate(&self, other: &FlowDataset) -> FlowDataset {
        let mut combined = self.clone();
        combined.image_list.extend_from_slice(&other.image_list);
        combined.flow_list.extend_from_slice(&other.flow_list);
        combined.extra_info.extend_from_slice(&other.extra_info);
        combined
    }

    /// New dataset with the sample lists replicated `times` times
    /// contiguously.
    pub fn repeat(&self, times: usize) -> FlowDataset {
        FlowDataset {
            image_list: repeated(&self.image_list, times),
            flow_list: repeated(&self.flow_list, times),
            extra_info: repeated(&self.extra_info, times),
            ..self.clone()
        }
    }
}

fn repeated<T: Clone>(items: &[T], times: usize) -> Vec<T> {
    (0..times).flat_map(|_| items.iter().cloned()).collect()
}

impl Dataset<FlowItem> for FlowDataset {
    fn get(&self, index: usize) -> Option<FlowItem> {
        if index >= self.len() {
            return None;
        }

        match self.load(index) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("Failed to load sample {index}: {e}");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.image_list.len()
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn synthetic(prefix: &str, count: usize) -> FlowDataset {
        let mut dataset = FlowDataset::new(None, false);
        for i in 0..count {
            dataset.push_sample(
                ImagePair::new(format!("{prefix}/{i}_a.png"), format!("{prefix}/{i}_b.png")),
                format!("{prefix}/{i}.flo"),
            );
        }
        dataset
    }

    #[test]
    fn concatenation_lengths_add_up() {
        let a = synthetic("a", 3);
        let b = synthetic("b", 5);
        let combined = a.concatenate(&b);
        assert_eq!(combined.len(), 8);
        assert_eq!(combined.flow_list().len(), 8);
        assert_eq!(combined.image_list()[..3], a.image_list()[..]);
        assert_eq!(combined.image_list()[3..], b.image_list()[..]);
        assert_eq!(combined.flow_list()[3..], b.flow_list()[..]);
    }

    #[test]
    fn concatenation_leaves_operands_untouched() {
        let a = synthetic("a", 2);
        let b = synthetic("b", 2);
        let _ = a.concatenate(&b);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn repeat_is_contiguous() {
        let a = synthetic("a", 2);
        let repeated = a.repeat(3);
        assert_eq!(repeated.len(), 6);
        let flows: Vec<_> = repeated
            .flow_list()
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            flows,
            vec!["a/0.flo", "a/1.flo", "a/0.flo", "a/1.flo", "a/0.flo", "a/1.flo"]
        );
        assert_eq!(a.repeat(0).len(), 0);
    }

    #[test]
    fn shuffle_preserves_pair_flow_alignment() {
        let mut dataset = synthetic("s", 32);
        let mut before: Vec<_> = dataset
            .image_list()
            .iter()
            .cloned()
            .zip(dataset.flow_list().iter().cloned())
            .collect();

        dataset.shuffle(&mut StdRng::seed_from_u64(5));

        let mut after: Vec<_> = dataset
            .image_list()
            .iter()
            .cloned()
            .zip(dataset.flow_list().iter().cloned())
            .collect();
        assert_ne!(before, after);

        for (pair, flow) in &after {
            let stem = flow.file_stem().unwrap().to_string_lossy().into_owned();
            assert!(pair.image1.to_string_lossy().contains(&format!("/{stem}_a")));
        }

        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn shuffle_keeps_metadata_aligned() {
        let mut dataset = FlowDataset::new(None, false);
        dataset.set_test(true);
        for i in 0..16 {
            dataset.push_pair(
                ImagePair::new(format!("{i}_a.png"), format!("{i}_b.png")),
                Some(SampleInfo::Frame {
                    frame_id: format!("{i}_a.png"),
                }),
            );
        }

        dataset.shuffle(&mut StdRng::seed_from_u64(9));

        for (pair, info) in dataset.image_list().iter().zip(dataset.extra_info()) {
            let info = info.as_ref().unwrap();
            assert_eq!(pair.image1.to_string_lossy(), info.to_string());
        }
    }

    #[test]
    fn strict_access_rejects_out_of_bounds() {
        let dataset = synthetic("a", 2);
        assert!(matches!(
            dataset.get_item(2),
            Err(DatasetError::IndexOutOfBounds { index: 2, len: 2 })
        ));
        assert!(Dataset::get(&dataset, 2).is_none());
    }

    #[test]
    fn wrapping_access_on_empty_dataset_fails() {
        let dataset = FlowDataset::new(None, false);
        assert!(matches!(
            dataset.get_wrapping(3),
            Err(DatasetError::EmptyDataset)
        ));
    }

    #[test]
    fn augmentor_follows_sparse_flag() {
        let config = AugmentationConfig::new((8, 8));
        assert!(FlowDataset::new(Some(config.clone()), true)
            .augmentor()
            .unwrap()
            .is_sparse());
        assert!(!FlowDataset::new(Some(config), false)
            .augmentor()
            .unwrap()
            .is_sparse());
        assert!(FlowDataset::new(None, false).augmentor().is_none());
    }

    #[test]
    fn explicit_augmentor_is_kept() {
        let augmentor = Augmentor::with_seed(AugmentationConfig::new((8, 16)), true, 42);
        let dataset = FlowDataset::with_augmentor(Some(augmentor), true);
        assert!(dataset.is_sparse());
        assert!(dataset.is_empty());
        let augmentor = dataset.augmentor().unwrap();
        assert!(augmentor.is_sparse());
        assert_eq!(augmentor.config().crop_size, (8, 16));
    }

    #[test]
    fn repeat_carries_metadata_and_mode() {
        let mut dataset = FlowDataset::new(None, true);
        dataset.set_test(true);
        dataset.push_pair(
            ImagePair::new("0_10.png", "0_11.png"),
            Some(SampleInfo::Frame {
                frame_id: "0_10.png".to_string(),
            }),
        );

        let repeated = dataset.repeat(3);
        assert_eq!(repeated.len(), 3);
        assert_eq!(repeated.extra_info().len(), 3);
        assert!(repeated.flow_list().is_empty());
        assert!(repeated.is_test());
        assert!(repeated.is_sparse());
    }
}
