//! Batching of [`FlowItem`]s into burn tensors.
//!
//! Items of one batch may come out of the augmentors at different sizes (the
//! crop shrinks on small frames), so every buffer is center cropped or zero
//! padded to a common size before stacking.

use std::marker::PhantomData;

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Tensor, TensorData},
};

use crate::sample::FlowItem;

/// A batch of frame pairs with optional supervision.
#[derive(Debug, Clone)]
pub struct FlowBatch<B: Backend> {
    /// First frames `[B, 3, H, W]`, values in `0..=255`.
    pub image1: Tensor<B, 4>,
    /// Second frames `[B, 3, H, W]`, values in `0..=255`.
    pub image2: Tensor<B, 4>,
    /// Flow `[B, 2, H, W]`, present when every item is a training item.
    pub flow: Option<Tensor<B, 4>>,
    /// Validity `[B, H, W]` as `0.0`/`1.0`; padded pixels are invalid.
    pub valid: Option<Tensor<B, 3>>,
}

/// Center crop or zero pad an `H×W×C` row-major buffer to
/// `target_height×target_width×C`, independently per axis.
///
/// An axis larger than its target is cropped starting at
/// `(dim - target) / 2`; a smaller one is padded with `T::default()` and
/// placed at `(target - dim) / 2`.
pub fn crop_or_pad<T: Copy + Default>(
    buffer: &[T],
    height: usize,
    width: usize,
    channels: usize,
    target_height: usize,
    target_width: usize,
) -> Vec<T> {
    debug_assert_eq!(buffer.len(), height * width * channels);

    let (src_y, dst_y, rows) = axis_window(height, target_height);
    let (src_x, dst_x, cols) = axis_window(width, target_width);

    let mut out = vec![T::default(); target_height * target_width * channels];
    for row in 0..rows {
        let src = ((src_y + row) * width + src_x) * channels;
        let dst = ((dst_y + row) * target_width + dst_x) * channels;
        let span = cols * channels;
        out[dst..dst + span].copy_from_slice(&buffer[src..src + span]);
    }
    out
}

/// `(source offset, destination offset, copied length)` along one axis.
fn axis_window(dim: usize, target: usize) -> (usize, usize, usize) {
    if dim >= target {
        ((dim - target) / 2, 0, target)
    } else {
        (0, (target - dim) / 2, dim)
    }
}

/// Stacks [`FlowItem`]s into a [`FlowBatch`].
///
/// With no target size, the batch takes the size of its first item.
#[derive(Clone, Debug, Default)]
pub struct FlowBatcher<B: Backend> {
    target_size: Option<(usize, usize)>,
    _phantom: PhantomData<B>,
}

impl<B: Backend> FlowBatcher<B> {
    pub const fn new() -> Self {
        Self {
            target_size: None,
            _phantom: PhantomData,
        }
    }

    /// Normalize every item to `(height, width)`.
    pub const fn with_target_size(height: usize, width: usize) -> Self {
        Self {
            target_size: Some((height, width)),
            _phantom: PhantomData,
        }
    }

    pub fn target_size(&self) -> Option<(usize, usize)> {
        self.target_size
    }
}

fn image_values(image: &image::RgbImage, height: usize, width: usize) -> Vec<f32> {
    crop_or_pad(
        image.as_raw(),
        image.height() as usize,
        image.width() as usize,
        3,
        height,
        width,
    )
    .into_iter()
    .map(f32::from)
    .collect()
}

impl<B: Backend> Batcher<B, FlowItem, FlowBatch<B>> for FlowBatcher<B> {
    fn batch(&self, items: Vec<FlowItem>, device: &B::Device) -> FlowBatch<B> {
        let batch_size = items.len();
        let (height, width) = self
            .target_size
            .or_else(|| items.first().map(FlowItem::size))
            .unwrap_or((0, 0));
        let supervised = items.iter().all(|item| item.as_train().is_some());

        let pixels = height * width;
        let mut image1 = Vec::with_capacity(batch_size * pixels * 3);
        let mut image2 = Vec::with_capacity(batch_size * pixels * 3);
        let mut flow = Vec::with_capacity(if supervised { batch_size * pixels * 2 } else { 0 });
        let mut valid = Vec::with_capacity(if supervised { batch_size * pixels } else { 0 });

        for item in items {
            match item {
                FlowItem::Train(sample) => {
                    image1.extend(image_values(&sample.image1, height, width));
                    image2.extend(image_values(&sample.image2, height, width));
                    if supervised {
                        let [flow_h, flow_w, _] = sample.flow.shape();
                        flow.extend(crop_or_pad(
                            &sample.flow.data,
                            flow_h,
                            flow_w,
                            2,
                            height,
                            width,
                        ));
                        let [valid_h, valid_w] = sample.valid.shape();
                        valid.extend(
                            crop_or_pad(&sample.valid.data, valid_h, valid_w, 1, height, width)
                                .into_iter()
                                .map(|v| if v { 1.0f32 } else { 0.0 }),
                        );
                    }
                }
                FlowItem::Test(sample) => {
                    image1.extend(image_values(&sample.image1, height, width));
                    image2.extend(image_values(&sample.image2, height, width));
                }
            }
        }

        // NHWC to NCHW
        let to_tensor = |data: Vec<f32>, channels: usize| {
            Tensor::<B, 4>::from_data(
                TensorData::new(data, [batch_size, height, width, channels]),
                device,
            )
            .permute([0, 3, 1, 2])
        };

        let image1 = to_tensor(image1, 3);
        let image2 = to_tensor(image2, 3);
        let (flow, valid) = if supervised {
            let valid = Tensor::<B, 3>::from_data(
                TensorData::new(valid, [batch_size, height, width]),
                device,
            );
            (Some(to_tensor(flow, 2)), Some(valid))
        } else {
            (None, None)
        };

        FlowBatch {
            image1,
            image2,
            flow,
            valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::sample::{FlowField, SampleInfo, TestSample, TrainSample};

    type TestBackend = NdArray;

    fn train_item(height: u32, width: u32, u: f32) -> FlowItem {
        let mut flow = FlowField::zeros(height as usize, width as usize);
        for y in 0..height as usize {
            for x in 0..width as usize {
                flow.set(x, y, [u, -u]);
            }
        }
        let valid = flow.derive_validity();
        FlowItem::Train(TrainSample {
            image1: RgbImage::from_pixel(width, height, Rgb([10, 20, 30])),
            image2: RgbImage::from_pixel(width, height, Rgb([40, 50, 60])),
            flow,
            valid,
        })
    }

    fn unsupervised_item(height: u32, width: u32) -> FlowItem {
        FlowItem::Test(TestSample {
            image1: RgbImage::new(width, height),
            image2: RgbImage::new(width, height),
            info: SampleInfo::Frame {
                frame_id: "000000_10.png".to_string(),
            },
        })
    }

    #[test]
    fn crop_or_pad_crops_centered() {
        let buffer: Vec<u8> = (0..16).collect();
        let out = crop_or_pad(&buffer, 4, 4, 1, 2, 2);
        assert_eq!(out, vec![5, 6, 9, 10]);
    }

    #[test]
    fn crop_or_pad_pads_centered() {
        let out = crop_or_pad(&[1u8, 2], 1, 2, 1, 3, 4);
        assert_eq!(out, vec![0, 0, 0, 0, 0, 1, 2, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn crop_or_pad_mixed_axes_keeps_channels() {
        // 1x3 two-channel row, cropped to width 1 and padded to height 3.
        let buffer = [1.0f32, 1.5, 2.0, 2.5, 3.0, 3.5];
        let out = crop_or_pad(&buffer, 1, 3, 2, 3, 1);
        assert_eq!(out, vec![0.0, 0.0, 2.0, 2.5, 0.0, 0.0]);
    }

    #[test]
    fn batcher_shapes_follow_first_item() {
        let device = NdArrayDevice::Cpu;
        let batcher = FlowBatcher::<TestBackend>::new();

        let batch = batcher.batch(vec![train_item(4, 6, 1.0), train_item(6, 4, 2.0)], &device);

        assert_eq!(batch.image1.dims(), [2, 3, 4, 6]);
        assert_eq!(batch.image2.dims(), [2, 3, 4, 6]);
        assert_eq!(batch.flow.as_ref().unwrap().dims(), [2, 2, 4, 6]);
        assert_eq!(batch.valid.as_ref().unwrap().dims(), [2, 4, 6]);
    }

    #[test]
    fn batcher_channel_layout() {
        let device = NdArrayDevice::Cpu;
        let batcher = FlowBatcher::<TestBackend>::with_target_size(2, 2);

        let batch = batcher.batch(vec![train_item(2, 2, 3.0)], &device);

        let image1 = batch.image1.into_data().to_vec::<f32>().unwrap();
        assert_eq!(&image1[0..4], &[10.0; 4]);
        assert_eq!(&image1[4..8], &[20.0; 4]);
        assert_eq!(&image1[8..12], &[30.0; 4]);

        let flow = batch.flow.unwrap().into_data().to_vec::<f32>().unwrap();
        assert_eq!(&flow[0..4], &[3.0; 4]);
        assert_eq!(&flow[4..8], &[-3.0; 4]);
    }

    #[test]
    fn batcher_padding_is_invalid() {
        let device = NdArrayDevice::Cpu;
        let batcher = FlowBatcher::<TestBackend>::with_target_size(3, 3);

        let batch = batcher.batch(vec![train_item(1, 1, 1.0)], &device);

        let valid = batch.valid.unwrap().into_data().to_vec::<f32>().unwrap();
        assert_eq!(valid.iter().sum::<f32>(), 1.0);
        assert_eq!(valid[4], 1.0);
    }

    #[test]
    fn batcher_mixed_items_drop_supervision() {
        let device = NdArrayDevice::Cpu;
        let batcher = FlowBatcher::<TestBackend>::with_target_size(4, 4);

        let batch = batcher.batch(vec![train_item(4, 4, 1.0), unsupervised_item(4, 4)], &device);

        assert_eq!(batch.image1.dims(), [2, 3, 4, 4]);
        assert!(batch.flow.is_none());
        assert!(batch.valid.is_none());
    }
}
