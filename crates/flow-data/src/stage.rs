//! Training stage selection: which sources are mixed, with which weights and
//! augmentation bounds.

use std::{path::PathBuf, sync::Arc};

use burn::{
    config::Config,
    data::dataloader::{DataLoader, DataLoaderBuilder},
    tensor::backend::Backend,
};

use crate::{
    augmentation::AugmentationConfig,
    batch::{FlowBatch, FlowBatcher},
    dataset::FlowDataset,
    error::DatasetResult,
    sources::{
        flying_chairs, flying_things3d, hd1k, kitti, mpi_sintel, ChairsSplit, KittiSplit,
        SintelPass, SintelSplit, ThingsPass,
    },
};

/// Curriculum stage.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum TrainStage {
    /// FlyingChairs training split.
    Chairs,
    /// FlyingThings3D, clean and final passes.
    Things,
    /// Sintel fine-tuning mix.
    Sintel,
    /// KITTI fine-tuning.
    Kitti,
}

/// Source mix of the Sintel stage.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum TrainingSources {
    /// Sintel, FlyingThings3D, KITTI and HD1K.
    Full,
    /// Sintel and FlyingThings3D only.
    SintelThings,
}

/// Dataset root directories.
#[derive(Config, Debug)]
pub struct DatasetRoots {
    #[config(default = "PathBuf::from(\"datasets/MPI-Sintel-complete\")")]
    pub sintel: PathBuf,
    #[config(default = "PathBuf::from(\"datasets/FlyingChairs_release/data\")")]
    pub chairs: PathBuf,
    /// FlyingChairs split file.
    #[config(default = "PathBuf::from(\"FlyingChairs_train_val.txt\")")]
    pub chairs_split: PathBuf,
    #[config(default = "PathBuf::from(\"datasets/FlyingThings3D\")")]
    pub things: PathBuf,
    #[config(default = "PathBuf::from(\"datasets/KITTI\")")]
    pub kitti: PathBuf,
    #[config(default = "PathBuf::from(\"datasets/HD1k\")")]
    pub hd1k: PathBuf,
}

/// Everything needed to build the training data of one stage.
///
/// Loaded from a JSON file via [`StageConfig::load`].
#[derive(Config, Debug)]
pub struct StageConfig {
    pub stage: TrainStage,
    #[config(default = "TrainingSources::Full")]
    pub sources: TrainingSources,
    /// Crop size as `(height, width)`.
    pub image_size: (usize, usize),
    #[config(default = 6)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    /// Shuffle seed of the data loader.
    #[config(default = 1234)]
    pub seed: u64,
    #[config(default = "DatasetRoots::new()")]
    pub roots: DatasetRoots,
}

impl StageConfig {
    fn augmentation(&self, min_scale: f32, max_scale: f32, do_flip: bool) -> AugmentationConfig {
        AugmentationConfig::new(self.image_size)
            .with_min_scale(min_scale)
            .with_max_scale(max_scale)
            .with_do_flip(do_flip)
    }
}

/// Build the composite training dataset of a stage.
pub fn build_train_dataset(config: &StageConfig) -> DatasetResult<FlowDataset> {
    let roots = &config.roots;

    let dataset = match config.stage {
        TrainStage::Chairs => {
            let aug = config.augmentation(-0.1, 1.0, true);
            flying_chairs(
                Some(aug),
                ChairsSplit::Training,
                &roots.chairs_split,
                &roots.chairs,
            )?
        }
        TrainStage::Things => {
            let aug = config.augmentation(-0.4, 0.8, true);
            let clean = flying_things3d(Some(aug.clone()), &roots.things, ThingsPass::Clean)?;
            let final_pass = flying_things3d(Some(aug), &roots.things, ThingsPass::Final)?;
            clean.concatenate(&final_pass)
        }
        TrainStage::Sintel => {
            let aug = config.augmentation(-0.2, 0.6, true);
            let things = flying_things3d(Some(aug.clone()), &roots.things, ThingsPass::Clean)?;
            let sintel_clean = mpi_sintel(
                Some(aug.clone()),
                SintelSplit::Training,
                &roots.sintel,
                SintelPass::Clean,
            )?;
            let sintel_final = mpi_sintel(
                Some(aug),
                SintelSplit::Training,
                &roots.sintel,
                SintelPass::Final,
            )?;

            let sintel = sintel_clean.repeat(100).concatenate(&sintel_final.repeat(100));
            match config.sources {
                TrainingSources::Full => {
                    let kitti = kitti(
                        Some(config.augmentation(-0.3, 0.5, true)),
                        KittiSplit::Training,
                        &roots.kitti,
                    )?;
                    let hd1k = hd1k(Some(config.augmentation(-0.5, 0.2, true)), &roots.hd1k)?;
                    sintel
                        .concatenate(&kitti.repeat(200))
                        .concatenate(&hd1k.repeat(5))
                        .concatenate(&things)
                }
                TrainingSources::SintelThings => sintel.concatenate(&things),
            }
        }
        TrainStage::Kitti => {
            let aug = config.augmentation(-0.2, 0.4, false);
            kitti(Some(aug), KittiSplit::Training, &roots.kitti)?
        }
    };

    log::info!("Training with {} image pairs", dataset.len());
    Ok(dataset)
}

/// Wrap a dataset in a shuffling burn data loader sized by `config`.
pub fn build_dataloader<B: Backend>(
    config: &StageConfig,
    dataset: FlowDataset,
) -> Arc<dyn DataLoader<B, FlowBatch<B>>> {
    DataLoaderBuilder::new(FlowBatcher::<B>::with_target_size(
        config.image_size.0,
        config.image_size.1,
    ))
    .batch_size(config.batch_size)
    .shuffle(config.seed)
    .num_workers(config.num_workers)
    .build(dataset)
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    /// Sintel: one scene of 3 frames per pass. KITTI: one pair. HD1K: one
    /// sequence of 3 frames. Chairs: two samples, the first for training.
    fn fixture(root: &Path) -> DatasetRoots {
        for pass in ["clean", "final"] {
            for frame in 1..=3 {
                touch(&root.join(format!("sintel/training/{pass}/alley_1/frame_{frame:04}.png")));
            }
        }
        for frame in 1..=2 {
            touch(&root.join(format!("sintel/training/flow/alley_1/frame_{frame:04}.flo")));
        }
        for name in ["000000_10.png", "000000_11.png"] {
            touch(&root.join("kitti/training/image_2").join(name));
        }
        touch(&root.join("kitti/training/flow_occ/000000_10.png"));
        for frame in 0..3 {
            let name = format!("000000_{frame:04}.png");
            touch(&root.join("hd1k/hd1k_input/image_2").join(&name));
            touch(&root.join("hd1k/hd1k_flow_gt/flow_occ").join(&name));
        }
        for name in [
            "00001_img1.ppm",
            "00001_img2.ppm",
            "00002_img1.ppm",
            "00002_img2.ppm",
            "00001_flow.flo",
            "00002_flow.flo",
        ] {
            touch(&root.join("chairs").join(name));
        }
        fs::write(root.join("split.txt"), "1\n2\n").unwrap();

        DatasetRoots::new()
            .with_sintel(root.join("sintel"))
            .with_chairs(root.join("chairs"))
            .with_chairs_split(root.join("split.txt"))
            .with_things(root.join("things"))
            .with_kitti(root.join("kitti"))
            .with_hd1k(root.join("hd1k"))
    }

    #[test]
    fn sintel_full_mix_weights() {
        let dir = tempfile::tempdir().unwrap();
        let config = StageConfig::new(TrainStage::Sintel, (368, 768)).with_roots(fixture(dir.path()));

        let dataset = build_train_dataset(&config).unwrap();

        // 100×2 clean + 100×2 final + 200×1 kitti + 5×2 hd1k
        assert_eq!(dataset.len(), 610);
        assert_eq!(dataset.flow_list().len(), 610);
        assert!(!dataset.is_sparse());
    }

    #[test]
    fn sintel_things_mix_weights() {
        let dir = tempfile::tempdir().unwrap();
        let config = StageConfig::new(TrainStage::Sintel, (368, 768))
            .with_sources(TrainingSources::SintelThings)
            .with_roots(fixture(dir.path()));

        assert_eq!(build_train_dataset(&config).unwrap().len(), 400);
    }

    #[test]
    fn chairs_stage_keeps_training_split() {
        let dir = tempfile::tempdir().unwrap();
        let config = StageConfig::new(TrainStage::Chairs, (368, 496)).with_roots(fixture(dir.path()));

        let dataset = build_train_dataset(&config).unwrap();
        assert_eq!(dataset.len(), 1);
        let aug = dataset.augmentor().unwrap().config();
        assert_eq!(aug.crop_size, (368, 496));
        assert_eq!(aug.min_scale, -0.1);
        assert_eq!(aug.max_scale, 1.0);
    }

    #[test]
    fn kitti_stage_is_sparse_without_flip() {
        let dir = tempfile::tempdir().unwrap();
        let config = StageConfig::new(TrainStage::Kitti, (288, 960)).with_roots(fixture(dir.path()));

        let dataset = build_train_dataset(&config).unwrap();
        assert_eq!(dataset.len(), 1);
        assert!(dataset.is_sparse());
        assert!(!dataset.augmentor().unwrap().config().do_flip);
    }

    #[test]
    fn missing_sintel_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = StageConfig::new(TrainStage::Sintel, (368, 768))
            .with_roots(DatasetRoots::new().with_sintel(dir.path().join("missing")));

        assert!(build_train_dataset(&config).is_err());
    }
}
