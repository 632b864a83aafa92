//! Flow-aware data augmentation.
//!
//! Every transform is applied consistently to both frames and to the flow
//! field, so the flow keeps describing the motion between the transformed
//! frames. Two variants exist:
//!
//! 1. [`FlowAugmentor`] for dense ground truth: color jitter (symmetric, or
//!    per-frame with 20% probability), occlusion eraser, random scale with
//!    stretch, horizontal/vertical flips and a random crop.
//! 2. [`SparseFlowAugmentor`] for sparse ground truth: the same photometric
//!    transforms, a scale that scatters valid flow vectors instead of
//!    interpolating them, horizontal flip and a margin-biased crop.
//!
//! [`Augmentor`] wraps both and is chosen once when a dataset is built.

use std::{
    f32::consts::PI,
    sync::atomic::{AtomicU64, Ordering},
};

use burn::config::Config;
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::sample::{FlowField, ValidMask};

/// Augmentation parameter bounds shared by the dense and sparse variants.
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Output crop as `(height, width)`.
    pub crop_size: (usize, usize),
    /// Lower bound of the random scale exponent (scale = 2^U(min, max)).
    #[config(default = "-0.2")]
    pub min_scale: f32,
    /// Upper bound of the random scale exponent.
    #[config(default = 0.5)]
    pub max_scale: f32,
    /// Whether random flips are enabled.
    #[config(default = true)]
    pub do_flip: bool,
}

/// Brightness/contrast/saturation/hue jitter ranges.
#[derive(Debug, Clone, Copy)]
struct ColorJitter {
    brightness: f32,
    contrast: f32,
    saturation: f32,
    /// Fraction of a full hue turn.
    hue: f32,
}

/// One draw of jitter factors.
#[derive(Debug, Clone, Copy)]
struct JitterParams {
    brightness: f32,
    contrast: f32,
    saturation: f32,
    hue_degrees: i32,
}

impl ColorJitter {
    fn sample(&self, rng: &mut StdRng) -> JitterParams {
        let factor = |rng: &mut StdRng, spread: f32| {
            if spread > 0.0 {
                rng.random_range((1.0 - spread).max(0.0)..=1.0 + spread)
            } else {
                1.0
            }
        };
        let hue: f32 = if self.hue > 0.0 {
            rng.random_range(-self.hue..=self.hue)
        } else {
            0.0
        };

        JitterParams {
            brightness: factor(&mut *rng, self.brightness),
            contrast: factor(&mut *rng, self.contrast),
            saturation: factor(&mut *rng, self.saturation),
            hue_degrees: (hue * 360.0).round() as i32,
        }
    }
}

fn luminance(pixel: &Rgb<u8>) -> f32 {
    let [r, g, b] = pixel.0;
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

fn apply_jitter(image: &RgbImage, params: JitterParams) -> RgbImage {
    let pixel_count = (image.width() * image.height()).max(1) as f32;
    let mean = image.pixels().map(luminance).sum::<f32>() * params.brightness / pixel_count;

    let mut result = image.clone();
    for pixel in result.pixels_mut() {
        let bright = pixel.0.map(|c| (f32::from(c) * params.brightness).clamp(0.0, 255.0));
        let contrasted = bright.map(|c| ((c - mean) * params.contrast + mean).clamp(0.0, 255.0));
        let grey = 0.299 * contrasted[0] + 0.587 * contrasted[1] + 0.114 * contrasted[2];
        pixel.0 =
            contrasted.map(|c| ((c - grey) * params.saturation + grey).clamp(0.0, 255.0) as u8);
    }

    if params.hue_degrees != 0 {
        result = imageops::huerotate(&result, params.hue_degrees);
    }
    result
}

/// Scale both components of the flow and resample it bilinearly to
/// `new_height × new_width`, pixel centers aligned.
///
/// Resampled by hand: `imageops` clamps `f32` subpixels to `[0, 1]`.
fn resize_flow(
    flow: &FlowField,
    new_height: usize,
    new_width: usize,
    scale: [f32; 2],
) -> FlowField {
    let mut resized = FlowField::zeros(new_height, new_width);
    if flow.height == 0 || flow.width == 0 {
        return resized;
    }

    let ratio_y = flow.height as f32 / new_height as f32;
    let ratio_x = flow.width as f32 / new_width as f32;
    let source = |dst: usize, ratio: f32, len: usize| {
        let pos = ((dst as f32 + 0.5) * ratio - 0.5).clamp(0.0, (len - 1) as f32);
        let lo = pos.floor() as usize;
        (lo, (lo + 1).min(len - 1), pos - lo as f32)
    };

    for y in 0..new_height {
        let (y0, y1, wy) = source(y, ratio_y, flow.height);
        for x in 0..new_width {
            let (x0, x1, wx) = source(x, ratio_x, flow.width);
            let mut value = [0.0; 2];
            for (c, v) in value.iter_mut().enumerate() {
                let top = flow.at(x0, y0)[c] * (1.0 - wx) + flow.at(x1, y0)[c] * wx;
                let bottom = flow.at(x0, y1)[c] * (1.0 - wx) + flow.at(x1, y1)[c] * wx;
                *v = (top * (1.0 - wy) + bottom * wy) * scale[c];
            }
            resized.set(x, y, value);
        }
    }
    resized
}

/// Rescale a sparse flow map by moving each valid vector to its rounded new
/// position. Vectors landing outside the new frame are dropped.
fn resize_sparse_flow(
    flow: &FlowField,
    valid: &ValidMask,
    scale_x: f32,
    scale_y: f32,
) -> (FlowField, ValidMask) {
    let new_height = (flow.height as f32 * scale_y).round() as usize;
    let new_width = (flow.width as f32 * scale_x).round() as usize;
    let mut resized = FlowField::zeros(new_height, new_width);
    let mut resized_valid =
        ValidMask::new(vec![false; new_height * new_width], new_height, new_width);

    for y in 0..flow.height {
        for x in 0..flow.width {
            if !valid.at(x, y) {
                continue;
            }
            let nx = (x as f32 * scale_x).round();
            let ny = (y as f32 * scale_y).round();
            if nx < 0.0 || ny < 0.0 || nx >= new_width as f32 || ny >= new_height as f32 {
                continue;
            }
            let (nx, ny) = (nx as usize, ny as usize);
            let [u, v] = flow.at(x, y);
            resized.set(nx, ny, [u * scale_x, v * scale_y]);
            resized_valid.data[ny * new_width + nx] = true;
        }
    }
    (resized, resized_valid)
}

fn flip_flow_horizontal(flow: &FlowField) -> FlowField {
    let mut flipped = FlowField::zeros(flow.height, flow.width);
    for y in 0..flow.height {
        for x in 0..flow.width {
            let [u, v] = flow.at(flow.width - 1 - x, y);
            flipped.set(x, y, [-u, v]);
        }
    }
    flipped
}

fn flip_flow_vertical(flow: &FlowField) -> FlowField {
    let mut flipped = FlowField::zeros(flow.height, flow.width);
    for y in 0..flow.height {
        for x in 0..flow.width {
            let [u, v] = flow.at(x, flow.height - 1 - y);
            flipped.set(x, y, [u, -v]);
        }
    }
    flipped
}

fn flip_valid_horizontal(valid: &ValidMask) -> ValidMask {
    let data = valid
        .data
        .chunks_exact(valid.width.max(1))
        .flat_map(|row| row.iter().rev().copied())
        .collect();
    ValidMask::new(data, valid.height, valid.width)
}

fn crop_flow(flow: &FlowField, x0: usize, y0: usize, height: usize, width: usize) -> FlowField {
    let mut cropped = FlowField::zeros(height, width);
    for y in 0..height {
        for x in 0..width {
            cropped.set(x, y, flow.at(x0 + x, y0 + y));
        }
    }
    cropped
}

fn crop_valid(valid: &ValidMask, x0: usize, y0: usize, height: usize, width: usize) -> ValidMask {
    let data = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| valid.at(x0 + x, y0 + y))
        .collect();
    ValidMask::new(data, height, width)
}

fn crop_image(image: &RgbImage, x0: usize, y0: usize, height: usize, width: usize) -> RgbImage {
    imageops::crop_imm(image, x0 as u32, y0 as u32, width as u32, height as u32).to_image()
}

fn resize_image(image: &RgbImage, height: usize, width: usize) -> RgbImage {
    imageops::resize(image, width as u32, height as u32, FilterType::Triangle)
}

/// Per-call RNG source. Each call draws a fresh `StdRng` from the seed and a
/// counter, so augmentors stay `Sync` and a fixed seed replays the same
/// sequence.
#[derive(Debug)]
struct RngSource {
    seed: u64,
    calls: AtomicU64,
}

impl RngSource {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            calls: AtomicU64::new(0),
        }
    }

    fn next_rng(&self) -> StdRng {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        StdRng::seed_from_u64(self.seed.wrapping_add(call.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
    }
}

impl Clone for RngSource {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            calls: AtomicU64::new(self.calls.load(Ordering::Relaxed)),
        }
    }
}

/// Paint 1-2 rectangles of the second frame's mean color over the second
/// frame, simulating occlusions.
fn erase_patches(image2: &mut RgbImage, rng: &mut StdRng, probability: f64) {
    if !rng.random_bool(probability) || image2.width() == 0 || image2.height() == 0 {
        return;
    }

    let count = (image2.width() * image2.height()) as f64;
    let mut sums = [0.0f64; 3];
    for pixel in image2.pixels() {
        for (sum, &c) in sums.iter_mut().zip(&pixel.0) {
            *sum += f64::from(c);
        }
    }
    let mean = Rgb(sums.map(|s| (s / count) as u8));

    for _ in 0..rng.random_range(1..3) {
        let x0 = rng.random_range(0..image2.width());
        let y0 = rng.random_range(0..image2.height());
        let dx = rng.random_range(50..100);
        let dy = rng.random_range(50..100);
        for y in y0..(y0 + dy).min(image2.height()) {
            for x in x0..(x0 + dx).min(image2.width()) {
                image2.put_pixel(x, y, mean);
            }
        }
    }
}

/// Random crop offsets for a frame of `height × width`. The crop shrinks to
/// the frame when the frame is smaller than `crop`.
fn crop_window(
    height: usize,
    width: usize,
    crop: (usize, usize),
    rng: &mut StdRng,
) -> (usize, usize, usize, usize) {
    let crop_h = crop.0.min(height);
    let crop_w = crop.1.min(width);
    let y0 = rng.random_range(0..=height - crop_h);
    let x0 = rng.random_range(0..=width - crop_w);
    (x0, y0, crop_h, crop_w)
}

/// Augmentor for dense flow ground truth.
#[derive(Debug, Clone)]
pub struct FlowAugmentor {
    config: AugmentationConfig,
    jitter: ColorJitter,
    rng: RngSource,
}

impl FlowAugmentor {
    const SPATIAL_AUG_PROB: f64 = 0.8;
    const STRETCH_PROB: f64 = 0.8;
    const MAX_STRETCH: f32 = 0.2;
    const H_FLIP_PROB: f64 = 0.5;
    const V_FLIP_PROB: f64 = 0.1;
    const ASYMMETRIC_COLOR_PROB: f64 = 0.2;
    const ERASER_PROB: f64 = 0.5;

    /// Create an augmentor with a random seed.
    pub fn new(config: AugmentationConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    /// Create an augmentor whose random draws are reproducible.
    pub fn with_seed(config: AugmentationConfig, seed: u64) -> Self {
        Self {
            config,
            jitter: ColorJitter {
                brightness: 0.4,
                contrast: 0.4,
                saturation: 0.4,
                hue: 0.5 / PI,
            },
            rng: RngSource::new(seed),
        }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply photometric and spatial augmentation to a frame pair and its flow.
    pub fn augment(
        &self,
        image1: RgbImage,
        image2: RgbImage,
        flow: FlowField,
    ) -> (RgbImage, RgbImage, FlowField) {
        let mut rng = self.rng.next_rng();
        let (image1, mut image2) = self.color_transform(image1, image2, &mut rng);
        erase_patches(&mut image2, &mut rng, Self::ERASER_PROB);
        self.spatial_transform(image1, image2, flow, &mut rng)
    }

    fn color_transform(
        &self,
        image1: RgbImage,
        image2: RgbImage,
        rng: &mut StdRng,
    ) -> (RgbImage, RgbImage) {
        if rng.random_bool(Self::ASYMMETRIC_COLOR_PROB) {
            let params1 = self.jitter.sample(rng);
            let params2 = self.jitter.sample(rng);
            (apply_jitter(&image1, params1), apply_jitter(&image2, params2))
        } else {
            let params = self.jitter.sample(rng);
            (apply_jitter(&image1, params), apply_jitter(&image2, params))
        }
    }

    fn spatial_transform(
        &self,
        mut image1: RgbImage,
        mut image2: RgbImage,
        mut flow: FlowField,
        rng: &mut StdRng,
    ) -> (RgbImage, RgbImage, FlowField) {
        let (height, width) = (flow.height.max(1) as f32, flow.width.max(1) as f32);
        let (crop_h, crop_w) = self.config.crop_size;

        // Smallest scale that still leaves an 8 pixel margin around the crop.
        let min_scale = ((crop_h as f32 + 8.0) / height).max((crop_w as f32 + 8.0) / width);

        let scale = 2f32.powf(rng.random_range(self.config.min_scale..=self.config.max_scale));
        let mut scale_x = scale;
        let mut scale_y = scale;
        if rng.random_bool(Self::STRETCH_PROB) {
            scale_x *= 2f32.powf(rng.random_range(-Self::MAX_STRETCH..=Self::MAX_STRETCH));
            scale_y *= 2f32.powf(rng.random_range(-Self::MAX_STRETCH..=Self::MAX_STRETCH));
        }
        let scale_x = scale_x.max(min_scale);
        let scale_y = scale_y.max(min_scale);

        if rng.random_bool(Self::SPATIAL_AUG_PROB) {
            let new_h = (height * scale_y).round() as usize;
            let new_w = (width * scale_x).round() as usize;
            image1 = resize_image(&image1, new_h, new_w);
            image2 = resize_image(&image2, new_h, new_w);
            flow = resize_flow(&flow, new_h, new_w, [scale_x, scale_y]);
        }

        if self.config.do_flip {
            if rng.random_bool(Self::H_FLIP_PROB) {
                image1 = imageops::flip_horizontal(&image1);
                image2 = imageops::flip_horizontal(&image2);
                flow = flip_flow_horizontal(&flow);
            }
            if rng.random_bool(Self::V_FLIP_PROB) {
                image1 = imageops::flip_vertical(&image1);
                image2 = imageops::flip_vertical(&image2);
                flow = flip_flow_vertical(&flow);
            }
        }

        let (x0, y0, h, w) = crop_window(flow.height, flow.width, self.config.crop_size, rng);
        (
            crop_image(&image1, x0, y0, h, w),
            crop_image(&image2, x0, y0, h, w),
            crop_flow(&flow, x0, y0, h, w),
        )
    }
}

/// Augmentor for sparse flow ground truth with an explicit validity mask.
#[derive(Debug, Clone)]
pub struct SparseFlowAugmentor {
    config: AugmentationConfig,
    jitter: ColorJitter,
    rng: RngSource,
}

impl SparseFlowAugmentor {
    const SPATIAL_AUG_PROB: f64 = 0.8;
    const H_FLIP_PROB: f64 = 0.5;
    const ERASER_PROB: f64 = 0.5;
    const MARGIN_Y: i64 = 20;
    const MARGIN_X: i64 = 50;

    /// Create an augmentor with a random seed.
    pub fn new(config: AugmentationConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    /// Create an augmentor whose random draws are reproducible.
    pub fn with_seed(config: AugmentationConfig, seed: u64) -> Self {
        Self {
            config,
            jitter: ColorJitter {
                brightness: 0.3,
                contrast: 0.3,
                saturation: 0.3,
                hue: 0.3 / PI,
            },
            rng: RngSource::new(seed),
        }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply photometric and spatial augmentation to a frame pair, its sparse
    /// flow and the flow's validity.
    pub fn augment(
        &self,
        image1: RgbImage,
        image2: RgbImage,
        flow: FlowField,
        valid: ValidMask,
    ) -> (RgbImage, RgbImage, FlowField, ValidMask) {
        let mut rng = self.rng.next_rng();
        let params = self.jitter.sample(&mut rng);
        let image1 = apply_jitter(&image1, params);
        let mut image2 = apply_jitter(&image2, params);
        erase_patches(&mut image2, &mut rng, Self::ERASER_PROB);
        self.spatial_transform(image1, image2, flow, valid, &mut rng)
    }

    fn spatial_transform(
        &self,
        mut image1: RgbImage,
        mut image2: RgbImage,
        mut flow: FlowField,
        mut valid: ValidMask,
        rng: &mut StdRng,
    ) -> (RgbImage, RgbImage, FlowField, ValidMask) {
        let (height, width) = (flow.height.max(1) as f32, flow.width.max(1) as f32);
        let (crop_h, crop_w) = self.config.crop_size;

        let min_scale = ((crop_h as f32 + 1.0) / height).max((crop_w as f32 + 1.0) / width);
        let scale = 2f32.powf(rng.random_range(self.config.min_scale..=self.config.max_scale));
        let scale_x = scale.max(min_scale);
        let scale_y = scale.max(min_scale);

        if rng.random_bool(Self::SPATIAL_AUG_PROB) {
            (flow, valid) = resize_sparse_flow(&flow, &valid, scale_x, scale_y);
            image1 = resize_image(&image1, flow.height, flow.width);
            image2 = resize_image(&image2, flow.height, flow.width);
        }

        if self.config.do_flip && rng.random_bool(Self::H_FLIP_PROB) {
            image1 = imageops::flip_horizontal(&image1);
            image2 = imageops::flip_horizontal(&image2);
            flow = flip_flow_horizontal(&flow);
            valid = flip_valid_horizontal(&valid);
        }

        let h = crop_h.min(flow.height);
        let w = crop_w.min(flow.width);
        let max_y = (flow.height - h) as i64;
        let max_x = (flow.width - w) as i64;
        let y0 = rng.random_range(0..=max_y + Self::MARGIN_Y).clamp(0, max_y) as usize;
        let x0 = rng
            .random_range(-Self::MARGIN_X..=max_x + Self::MARGIN_X)
            .clamp(0, max_x) as usize;

        (
            crop_image(&image1, x0, y0, h, w),
            crop_image(&image2, x0, y0, h, w),
            crop_flow(&flow, x0, y0, h, w),
            crop_valid(&valid, x0, y0, h, w),
        )
    }
}

/// Augmentation collaborator owned by a dataset, chosen once from its
/// sparse/dense mode.
#[derive(Debug, Clone)]
pub enum Augmentor {
    Dense(FlowAugmentor),
    Sparse(SparseFlowAugmentor),
}

impl Augmentor {
    /// Pick the variant matching `sparse`.
    pub fn new(config: AugmentationConfig, sparse: bool) -> Self {
        if sparse {
            Self::Sparse(SparseFlowAugmentor::new(config))
        } else {
            Self::Dense(FlowAugmentor::new(config))
        }
    }

    /// Pick the variant matching `sparse` with a reproducible seed.
    pub fn with_seed(config: AugmentationConfig, sparse: bool, seed: u64) -> Self {
        if sparse {
            Self::Sparse(SparseFlowAugmentor::with_seed(config, seed))
        } else {
            Self::Dense(FlowAugmentor::with_seed(config, seed))
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    pub fn config(&self) -> &AugmentationConfig {
        match self {
            Self::Dense(augmentor) => augmentor.config(),
            Self::Sparse(augmentor) => augmentor.config(),
        }
    }

    /// Augment a sample.
    ///
    /// The dense variant discards any incoming validity, which the caller
    /// re-derives from the transformed flow. The sparse variant derives a
    /// validity mask from the flow when none is given.
    pub fn apply(
        &self,
        image1: RgbImage,
        image2: RgbImage,
        flow: FlowField,
        valid: Option<ValidMask>,
    ) -> (RgbImage, RgbImage, FlowField, Option<ValidMask>) {
        match self {
            Self::Dense(augmentor) => {
                let (image1, image2, flow) = augmentor.augment(image1, image2, flow);
                (image1, image2, flow, None)
            }
            Self::Sparse(augmentor) => {
                let valid = valid.unwrap_or_else(|| flow.derive_validity());
                let (image1, image2, flow, valid) = augmentor.augment(image1, image2, flow, valid);
                (image1, image2, flow, Some(valid))
            }
        }
    }
}
