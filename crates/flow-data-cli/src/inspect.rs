//! Stage summaries and smoke loading.

use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::{
    config::Config,
    data::dataloader::batcher::Batcher,
    tensor::backend::Backend,
};
use flow_data::{
    build_dataloader, build_train_dataset, FlowBatcher, FlowDataset, FlowItem, StageConfig,
};

/// Load a stage configuration from a JSON file.
pub fn load_stage_config(path: &Path) -> Result<StageConfig> {
    StageConfig::load(path)
        .with_context(|| format!("Failed to load stage config from {}", path.display()))
}

/// Write `config` as JSON.
pub fn save_stage_config(config: &StageConfig, path: &Path) -> Result<()> {
    config
        .save(path)
        .with_context(|| format!("Failed to write stage config to {}", path.display()))
}

/// Counts describing a built dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub pairs: usize,
    pub flows: usize,
    pub tagged: usize,
    pub sparse: bool,
    pub test: bool,
    pub augmented: bool,
}

impl DatasetSummary {
    pub fn of(dataset: &FlowDataset) -> Self {
        Self {
            pairs: dataset.len(),
            flows: dataset.flow_list().len(),
            tagged: dataset.extra_info().iter().flatten().count(),
            sparse: dataset.is_sparse(),
            test: dataset.is_test(),
            augmented: dataset.augmentor().is_some(),
        }
    }
}

impl std::fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "  image pairs: {}", self.pairs)?;
        writeln!(f, "  flows:       {}", self.flows)?;
        writeln!(f, "  tagged:      {}", self.tagged)?;
        writeln!(f, "  sparse:      {}", self.sparse)?;
        writeln!(f, "  test mode:   {}", self.test)?;
        write!(f, "  augmented:   {}", self.augmented)
    }
}

/// Build the stage dataset and summarize it.
pub fn summarize(config: &StageConfig) -> Result<DatasetSummary> {
    let dataset = build_train_dataset(config).context("Failed to build training dataset")?;
    Ok(DatasetSummary::of(&dataset))
}

/// Decode the first `samples` items, then one batch through the stage's
/// data loader. Fails on the first undecodable sample.
pub fn check<B: Backend>(config: &StageConfig, samples: usize, device: &B::Device) -> Result<()> {
    let dataset = build_train_dataset(config).context("Failed to build training dataset")?;
    if dataset.is_empty() {
        bail!("Stage {:?} produced an empty dataset", config.stage);
    }

    let count = samples.min(dataset.len());
    log::info!("Decoding {count} of {} samples", dataset.len());
    let mut items = Vec::with_capacity(count);
    for index in 0..count {
        let item = dataset
            .get_item(index)
            .with_context(|| format!("Failed to load sample {index}"))?;
        describe_item(index, &item);
        items.push(item);
    }

    let batch = FlowBatcher::<B>::with_target_size(config.image_size.0, config.image_size.1)
        .batch(items, device);
    println!("Direct batch: image1 {:?}", batch.image1.dims());

    let loader = build_dataloader::<B>(config, dataset);
    match loader.iter().next() {
        Some(batch) => {
            println!("Loader batch: image1 {:?}", batch.image1.dims());
            if let Some(flow) = &batch.flow {
                println!("Loader batch: flow {:?}", flow.dims());
            }
        }
        None => bail!("Data loader yielded no batch"),
    }
    Ok(())
}

fn describe_item(index: usize, item: &FlowItem) {
    let (height, width) = item.size();
    match item {
        FlowItem::Train(sample) => println!(
            "  #{index}: {height}x{width}, {} valid flow vectors",
            sample.valid.count_valid()
        ),
        FlowItem::Test(sample) => println!("  #{index}: {height}x{width}, {}", sample.info),
    }
}

#[cfg(test)]
mod tests {
    use flow_data::{DatasetRoots, TrainStage};

    use super::*;

    #[test]
    fn config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.json");
        let config = StageConfig::new(TrainStage::Kitti, (288, 960)).with_batch_size(2);

        save_stage_config(&config, &path).unwrap();
        let loaded = load_stage_config(&path).unwrap();

        assert_eq!(loaded.stage, TrainStage::Kitti);
        assert_eq!(loaded.image_size, (288, 960));
        assert_eq!(loaded.batch_size, 2);
        assert_eq!(loaded.roots.hd1k, DatasetRoots::new().hd1k);
    }

    #[test]
    fn summary_of_empty_kitti_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = StageConfig::new(TrainStage::Kitti, (288, 960))
            .with_roots(DatasetRoots::new().with_kitti(dir.path().to_path_buf()));

        let summary = summarize(&config).unwrap();
        assert_eq!(summary.pairs, 0);
        assert!(summary.sparse);
        assert!(summary.augmented);
    }

    #[test]
    fn missing_config_reports_path() {
        let err = load_stage_config(Path::new("does/not/exist.json")).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.json"));
    }
}
