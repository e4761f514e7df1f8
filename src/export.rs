//! Snapshot and animation export of a normalized distribution sequence.
//!
//! A snapshot encodes the frame currently shown as PNG. An animation renders
//! every frame of the set into an offscreen surface, hands each owned pixel
//! buffer to an encoder thread and collects a looping GIF. The first frame that
//! fails to draw or encode aborts the export and nothing is written.
//!
//! Raw series data is exported as CSV through [`write_series_csv`].

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, ImageFormat, RgbaImage};
use thiserror::Error;

use crate::data::normalize::NormalizedSet;
use crate::render::{
    HistogramPainter, HistogramStyle, PixmapSurface, RasterSurface, RenderError,
};

pub use crate::data::export::{save_series_csv, write_series_csv};
#[cfg(feature = "parquet")]
pub use crate::data::export::save_series_parquet;

pub const DEFAULT_FRAME_DELAY_MS: u32 = 100;
/// NeuQuant sampling factor; 1 is slowest, 30 fastest.
const GIF_SPEED: i32 = 10;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export")]
    Empty,
    #[error("frame index {index} out of range ({len} frames)")]
    FrameOutOfRange { index: usize, len: usize },
    #[error("failed to render frame {frame}: {source}")]
    Render {
        frame: usize,
        #[source]
        source: RenderError,
    },
    #[error("failed to encode: {0}")]
    Encode(#[from] image::ImageError),
    #[error("export cancelled")]
    Cancelled,
    #[error("encoder thread stopped unexpectedly")]
    WorkerLost,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub width: u32,
    pub height: u32,
    pub frame_delay_ms: u32,
    pub style: HistogramStyle,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 400,
            frame_delay_ms: DEFAULT_FRAME_DELAY_MS,
            style: HistogramStyle::default(),
        }
    }
}

/// Shared flag to stop an animation export between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `{prefix}_{millis}.{ext}` in local time.
pub fn default_file_name(prefix: &str, ext: &str) -> String {
    format!("{}_{:.0}.{}", prefix, chrono::Local::now().timestamp_millis(), ext)
}

pub fn encode_png(image: &RgbaImage) -> ExportResult<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Render frame `index` of `set` onto `surface` and encode it as PNG.
pub fn snapshot_with<S: RasterSurface + ?Sized>(
    surface: &mut S,
    painter: &HistogramPainter,
    set: &NormalizedSet,
    index: usize,
) -> ExportResult<Vec<u8>> {
    let frame = set.frame(index).ok_or(ExportError::FrameOutOfRange {
        index,
        len: set.len(),
    })?;
    painter
        .paint(surface, frame, set.global_max_freq)
        .and_then(|_| surface.snapshot())
        .map_err(|source| ExportError::Render { frame: index, source })
        .and_then(|img| encode_png(&img))
}

pub fn snapshot_png(
    set: &NormalizedSet,
    index: usize,
    options: &ExportOptions,
) -> ExportResult<Vec<u8>> {
    let mut surface = PixmapSurface::new(options.width, options.height)
        .map_err(|source| ExportError::Render { frame: index, source })?;
    snapshot_with(&mut surface, &HistogramPainter::new(options.style.clone()), set, index)
}

pub fn save_snapshot(
    path: &Path,
    set: &NormalizedSet,
    index: usize,
    options: &ExportOptions,
) -> ExportResult<()> {
    let bytes = snapshot_png(set, index, options)?;
    std::fs::write(path, bytes)?;
    log::info!("saved snapshot of frame {index} to {}", path.display());
    Ok(())
}

enum EncodeJob {
    Frame(RgbaImage),
    Finish,
}

// Returns Ok(None) when the sender went away without asking to finish.
fn run_encoder(
    rx: mpsc::Receiver<EncodeJob>,
    delay_ms: u32,
) -> ExportResult<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut buf, GIF_SPEED);
        encoder.set_repeat(Repeat::Infinite)?;
        loop {
            match rx.recv() {
                Ok(EncodeJob::Frame(img)) => {
                    let delay = Delay::from_numer_denom_ms(delay_ms, 1);
                    encoder.encode_frame(Frame::from_parts(img, 0, 0, delay))?;
                }
                Ok(EncodeJob::Finish) => break,
                Err(_) => return Ok(None),
            }
        }
    }
    Ok(Some(buf))
}

/// Render every frame of `set` onto `surface` and encode a looping GIF.
///
/// `progress` receives a fraction below `1.0` after each frame is handed to the
/// encoder, and `1.0` only once the finished file is in hand. Any render or encode failure, or
/// cancellation through `cancel`, returns an error and drops all partial output.
pub fn animation_with<S, P>(
    surface: &mut S,
    painter: &HistogramPainter,
    set: &NormalizedSet,
    frame_delay_ms: u32,
    cancel: Option<&CancelToken>,
    mut progress: P,
) -> ExportResult<Vec<u8>>
where
    S: RasterSurface + ?Sized,
    P: FnMut(f32),
{
    if set.is_empty() {
        return Err(ExportError::Empty);
    }
    let total = set.len();
    log::info!("exporting {total} frames as GIF");

    let (tx, rx) = mpsc::channel::<EncodeJob>();
    let worker = thread::spawn(move || run_encoder(rx, frame_delay_ms));

    let mut failure = None;
    for (i, frame) in set.frames.iter().enumerate() {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            failure = Some(ExportError::Cancelled);
            break;
        }
        let rendered = painter
            .paint(surface, frame, set.global_max_freq)
            .and_then(|_| surface.snapshot());
        match rendered {
            Ok(img) => {
                if tx.send(EncodeJob::Frame(img)).is_err() {
                    // worker exited early; its result carries the cause
                    break;
                }
            }
            Err(source) => {
                failure = Some(ExportError::Render { frame: i, source });
                break;
            }
        }
        // the last share is kept for the final encode
        progress((i + 1) as f32 / (total + 1) as f32);
    }

    if failure.is_none() {
        let _ = tx.send(EncodeJob::Finish);
    }
    drop(tx);
    let encoded = worker.join().map_err(|_| ExportError::WorkerLost)?;

    let result = match (failure, encoded) {
        (Some(err), _) => Err(err),
        (None, Err(err)) => Err(err),
        (None, Ok(Some(bytes))) => Ok(bytes),
        (None, Ok(None)) => Err(ExportError::WorkerLost),
    };
    match &result {
        Ok(bytes) => {
            progress(1.0);
            log::info!("GIF export finished: {total} frames, {} bytes", bytes.len());
        }
        Err(err) => log::warn!("GIF export aborted: {err}"),
    }
    result
}

pub fn animation_gif<P: FnMut(f32)>(
    set: &NormalizedSet,
    options: &ExportOptions,
    cancel: Option<&CancelToken>,
    progress: P,
) -> ExportResult<Vec<u8>> {
    let mut surface = PixmapSurface::new(options.width, options.height)
        .map_err(|source| ExportError::Render { frame: 0, source })?;
    animation_with(
        &mut surface,
        &HistogramPainter::new(options.style.clone()),
        set,
        options.frame_delay_ms,
        cancel,
        progress,
    )
}

/// Encode the animation and write it to `path`. The file is only created once
/// every frame has been encoded.
pub fn save_animation<P: FnMut(f32)>(
    path: &Path,
    set: &NormalizedSet,
    options: &ExportOptions,
    cancel: Option<&CancelToken>,
    progress: P,
) -> ExportResult<()> {
    let bytes = animation_gif(set, options, cancel, progress)?;
    std::fs::write(path, bytes)?;
    log::info!("saved animation to {}", path.display());
    Ok(())
}
