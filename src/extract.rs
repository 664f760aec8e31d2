//! Dominant color extraction
//!
//! Two strategies behind [`ColorStrategy`]: a quantized color histogram over the whole
//! frame ([`HistogramDominant`]) and a deterministic mean over a centered square
//! ([`CenterMean`]). [`ColorExtractor`] tries the first and falls back to the second;
//! both report faults as values, and a fault in both means "no sample this cycle".

use crate::config::DetectionConfig;
use crate::errors::ExtractFault;
use crate::types::{ColorSample, VideoFrame};
use image::{ImageBuffer, Rgb};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Anything the extractor can pull a frame from
pub trait FrameSource {
    /// Current frame size, `(0, 0)` when unknown
    fn dimensions(&self) -> (u32, u32);
    /// True once frames are flowing and one can be read
    fn is_playing(&self) -> bool;
    fn current_frame(&self) -> Option<Arc<VideoFrame>>;
}

impl FrameSource for VideoFrame {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_playing(&self) -> bool {
        true
    }

    fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        Some(Arc::new(self.clone()))
    }
}

/// One way of reducing a frame to a single color
pub trait ColorStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, frame: &VideoFrame) -> Result<ColorSample, ExtractFault>;
}

fn check_frame(frame: &VideoFrame) -> Result<(), ExtractFault> {
    if frame.is_empty() {
        return Err(ExtractFault::EmptyFrame {
            width: frame.width,
            height: frame.height,
        });
    }
    if frame.data.len() != frame.expected_len() {
        return Err(ExtractFault::MalformedBuffer {
            expected: frame.expected_len(),
            actual: frame.data.len(),
        });
    }
    Ok(())
}

/// Channel sums with round-half-up division
#[derive(Debug, Default, Clone, Copy)]
struct ChannelSums {
    count: u64,
    red: u64,
    green: u64,
    blue: u64,
}

impl ChannelSums {
    fn add(&mut self, [r, g, b]: [u8; 3]) {
        self.count += 1;
        self.red += r as u64;
        self.green += g as u64;
        self.blue += b as u64;
    }

    fn mean(&self) -> Option<ColorSample> {
        if self.count == 0 {
            return None;
        }
        let round = |sum: u64| ((2 * sum + self.count) / (2 * self.count)).min(255) as u8;
        Some(ColorSample::new(
            round(self.red),
            round(self.green),
            round(self.blue),
        ))
    }
}

/// Most populated bucket of a quantized RGB histogram, reported as that bucket's mean.
///
/// Near-white pixels are ignored, so an all-white frame faults with
/// [`ExtractFault::NoSamples`] and is left to the fallback.
#[derive(Debug, Clone)]
pub struct HistogramDominant {
    bits: u8,
    stride: usize,
}

impl HistogramDominant {
    const WHITE_CUTOFF: u8 = 250;

    pub fn new(bits: u8, stride: u32) -> Self {
        Self {
            bits: bits.clamp(1, 8),
            stride: stride.max(1) as usize,
        }
    }

    fn bucket(&self, [r, g, b]: [u8; 3]) -> u32 {
        let shift = 8 - self.bits;
        let bits = self.bits as u32;
        ((r >> shift) as u32) << (2 * bits) | ((g >> shift) as u32) << bits | (b >> shift) as u32
    }
}

impl Default for HistogramDominant {
    fn default() -> Self {
        Self::new(5, 10)
    }
}

impl ColorStrategy for HistogramDominant {
    fn name(&self) -> &'static str {
        "histogram"
    }

    fn extract(&self, frame: &VideoFrame) -> Result<ColorSample, ExtractFault> {
        check_frame(frame)?;
        let image: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.data.as_slice()).ok_or(
                ExtractFault::MalformedBuffer {
                    expected: frame.expected_len(),
                    actual: frame.data.len(),
                },
            )?;

        let mut histogram: HashMap<u32, ChannelSums> = HashMap::new();
        for pixel in image.pixels().step_by(self.stride) {
            let rgb = pixel.0;
            if rgb.iter().all(|&c| c > Self::WHITE_CUTOFF) {
                continue;
            }
            histogram.entry(self.bucket(rgb)).or_default().add(rgb);
        }

        histogram
            .iter()
            .max_by(|(ka, a), (kb, b)| a.count.cmp(&b.count).then(kb.cmp(ka)))
            .and_then(|(_, sums)| sums.mean())
            .ok_or(ExtractFault::NoSamples)
    }
}

/// Mean color of a centered square, clamped to the frame
#[derive(Debug, Clone)]
pub struct CenterMean {
    region: u32,
}

impl CenterMean {
    pub fn new(region: u32) -> Self {
        Self {
            region: region.max(1),
        }
    }

    /// Half-open pixel bounds `(x0, y0, x1, y1)` sampled for a frame of this size
    pub fn bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let half = self.region / 2;
        let rest = self.region - half;
        let (cx, cy) = (width / 2, height / 2);
        (
            cx.saturating_sub(half),
            cy.saturating_sub(half),
            cx.saturating_add(rest).min(width),
            cy.saturating_add(rest).min(height),
        )
    }
}

impl Default for CenterMean {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ColorStrategy for CenterMean {
    fn name(&self) -> &'static str {
        "center-mean"
    }

    fn extract(&self, frame: &VideoFrame) -> Result<ColorSample, ExtractFault> {
        check_frame(frame)?;
        let (x0, y0, x1, y1) = self.bounds(frame.width, frame.height);
        let row_len = frame.width as usize * 3;

        let mut sums = ChannelSums::default();
        for y in y0..y1 {
            let start = y as usize * row_len + x0 as usize * 3;
            let end = y as usize * row_len + x1 as usize * 3;
            let row = frame
                .data
                .get(start..end)
                .ok_or(ExtractFault::MalformedBuffer {
                    expected: frame.expected_len(),
                    actual: frame.data.len(),
                })?;
            for px in row.chunks_exact(3) {
                sums.add([px[0], px[1], px[2]]);
            }
        }

        sums.mean().ok_or(ExtractFault::NoSamples)
    }
}

/// Primary strategy with a deterministic fallback
pub struct ColorExtractor {
    primary: Box<dyn ColorStrategy>,
    fallback: Box<dyn ColorStrategy>,
}

impl ColorExtractor {
    pub fn new(config: &DetectionConfig) -> Self {
        Self::with_strategies(
            Box::new(HistogramDominant::new(
                config.histogram_bits,
                config.sample_stride,
            )),
            Box::new(CenterMean::new(config.fallback_region)),
        )
    }

    pub fn with_strategies(
        primary: Box<dyn ColorStrategy>,
        fallback: Box<dyn ColorStrategy>,
    ) -> Self {
        Self { primary, fallback }
    }

    /// Sample the source's current frame, or `None` when it is not ready or both
    /// strategies fault.
    pub fn extract(&self, source: &dyn FrameSource) -> Option<ColorSample> {
        let result = ready_frame(source).and_then(|frame| self.extract_frame(&frame));
        match result {
            Ok(color) => Some(color),
            Err(fault) => {
                log::debug!("No color this cycle: {}", fault);
                None
            }
        }
    }

    /// Run primary, then fallback on fault. A panicking strategy counts as a fault.
    pub fn extract_frame(&self, frame: &VideoFrame) -> Result<ColorSample, ExtractFault> {
        match run_guarded(self.primary.as_ref(), frame) {
            Ok(color) => Ok(color),
            Err(fault) => {
                log::debug!(
                    "{} failed ({}), using {}",
                    self.primary.name(),
                    fault,
                    self.fallback.name()
                );
                run_guarded(self.fallback.as_ref(), frame)
            }
        }
    }
}

/// Current frame of a source that has dimensions and is playing
fn ready_frame(source: &dyn FrameSource) -> Result<Arc<VideoFrame>, ExtractFault> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(ExtractFault::EmptyFrame { width, height });
    }
    if !source.is_playing() {
        return Err(ExtractFault::NotReady);
    }
    source.current_frame().ok_or(ExtractFault::NotReady)
}

fn run_guarded(strategy: &dyn ColorStrategy, frame: &VideoFrame) -> Result<ColorSample, ExtractFault> {
    catch_unwind(AssertUnwindSafe(|| strategy.extract(frame))).unwrap_or_else(|panic| {
        Err(ExtractFault::Panicked {
            strategy: strategy.name(),
            message: panic_message(panic.as_ref()).to_string(),
        })
    })
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl Default for ColorExtractor {
    fn default() -> Self {
        Self::new(&DetectionConfig::default())
    }
}
