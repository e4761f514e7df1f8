use image::RgbaImage;
use runscope::clock::ManualClock;
use runscope::data::histogram::{BinSpec, HistogramFrame};
use runscope::data::normalize::{normalize, NormalizeOptions, NormalizedSet};
use runscope::export::{
    animation_gif, animation_with, save_animation, save_snapshot, snapshot_png, CancelToken,
    ExportError, ExportOptions,
};
use runscope::playback::{PlaybackController, PlaybackState, TickOutcome};
use runscope::render::{
    HistogramPainter, PixmapSurface, RasterSurface, RenderError, RenderResult, Rgba,
};

fn set(frames: usize) -> NormalizedSet {
    let frames: Vec<HistogramFrame> = (0..frames)
        .map(|i| {
            let freq = vec![1.0 + i as f64, 2.0, 0.5];
            HistogramFrame::try_new(i as i64 * 10, BinSpec::new(0.0, 3.0, 3), freq).unwrap()
        })
        .collect();
    normalize(&frames, &NormalizeOptions::default())
}

fn small() -> ExportOptions {
    ExportOptions {
        width: 48,
        height: 32,
        ..ExportOptions::default()
    }
}

#[test]
fn single_pass_stops_at_last_frame_and_rewinds() {
    let mut p = PlaybackController::with_clock(5, ManualClock::new());
    assert_eq!(p.max_index(), 4);
    p.set_speed(100);
    p.play();
    for expected in 1..=4 {
        p.clock().advance_ms(100);
        assert_eq!(p.tick(), TickOutcome::Advanced(expected));
    }
    assert_eq!(p.current_index(), 4);
    assert!(p.is_playing());

    p.clock().advance_ms(100);
    assert_eq!(p.tick(), TickOutcome::Finished);
    assert_eq!(p.state(), PlaybackState::Stopped);
    assert_eq!(p.current_index(), 0);

    p.clock().advance_ms(100);
    assert_eq!(p.tick(), TickOutcome::Idle);
    assert_eq!(p.current_index(), 0);
}

#[test]
fn stop_cancels_and_resume_continues_from_index() {
    let mut p = PlaybackController::with_clock(5, ManualClock::new());
    p.play();
    p.clock().advance_ms(100);
    p.tick();
    p.stop();
    assert!(!p.is_scheduled());
    p.clock().advance_ms(1_000);
    assert_eq!(p.tick(), TickOutcome::Idle);
    assert_eq!(p.current_index(), 1);

    p.play();
    p.clock().advance_ms(100);
    assert_eq!(p.tick(), TickOutcome::Advanced(2));
}

#[test]
fn scrub_while_playing_wins_over_index() {
    let mut p = PlaybackController::with_clock(10, ManualClock::new());
    p.play();
    p.clock().advance_ms(60);
    p.seek(7);
    p.clock().advance_ms(40);
    assert_eq!(p.tick(), TickOutcome::Advanced(8));
}

#[test]
fn snapshot_is_png_of_current_frame() {
    let set = set(3);
    let mut p = PlaybackController::new(set.len());
    p.seek(2);
    let bytes = snapshot_png(&set, p.current_index(), &small()).unwrap();
    let img = image::load_from_memory(&bytes).unwrap();
    assert_eq!((img.width(), img.height()), (48, 32));

    assert!(matches!(
        snapshot_png(&set, 3, &small()),
        Err(ExportError::FrameOutOfRange { index: 3, len: 3 })
    ));
}

#[test]
fn animation_reports_progress_and_encodes_every_frame() {
    let set = set(4);
    let mut seen = Vec::new();
    let bytes = animation_gif(&set, &small(), None, |p| seen.push(p)).unwrap();
    assert_eq!(seen, vec![0.2, 0.4, 0.6, 0.8, 1.0]);
    assert_eq!(seen.iter().filter(|&&p| p >= 1.0).count(), 1);
    assert_eq!(&bytes[..3], b"GIF");

    use image::AnimationDecoder;
    let decoder = image::codecs::gif::GifDecoder::new(std::io::Cursor::new(bytes)).unwrap();
    let frames = decoder.into_frames().collect_frames().unwrap();
    assert_eq!(frames.len(), 4);
    let (num, den) = frames[0].delay().numer_denom_ms();
    assert_eq!(num / den, 100);
}

/// Fails while drawing the n-th frame.
struct FailingSurface {
    inner: PixmapSurface,
    clears: usize,
    fail_on: usize,
}

impl RasterSurface for FailingSurface {
    fn width(&self) -> u32 {
        self.inner.width()
    }
    fn height(&self) -> u32 {
        self.inner.height()
    }
    fn clear(&mut self, color: Rgba) -> RenderResult<()> {
        self.clears += 1;
        if self.clears == self.fail_on {
            return Err(RenderError::Geometry("device lost".into()));
        }
        self.inner.clear(color)
    }
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba) -> RenderResult<()> {
        self.inner.fill_rect(x, y, w, h, color)
    }
    fn fill_rect_gradient(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        top: Rgba,
        bottom: Rgba,
    ) -> RenderResult<()> {
        self.inner.fill_rect_gradient(x, y, w, h, top, bottom)
    }
    fn line(
        &mut self,
        from: (f32, f32),
        to: (f32, f32),
        width: f32,
        color: Rgba,
    ) -> RenderResult<()> {
        self.inner.line(from, to, width, color)
    }
    fn snapshot(&self) -> RenderResult<RgbaImage> {
        self.inner.snapshot()
    }
}

#[test]
fn failing_frame_aborts_whole_export() {
    let set = set(5);
    let mut surface = FailingSurface {
        inner: PixmapSurface::new(48, 32).unwrap(),
        clears: 0,
        fail_on: 3,
    };
    let mut last = 0.0;
    let err = animation_with(
        &mut surface,
        &HistogramPainter::new(small().style),
        &set,
        100,
        None,
        |p| last = p,
    )
    .unwrap_err();
    assert!(matches!(err, ExportError::Render { frame: 2, .. }));
    assert!(last < 1.0);
}

#[test]
fn failed_or_cancelled_export_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("anim.gif");
    let token = CancelToken::new();
    token.cancel();
    let err = save_animation(&path, &set(3), &small(), Some(&token), |_| {}).unwrap_err();
    assert!(matches!(err, ExportError::Cancelled));
    assert!(!path.exists());

    save_animation(&path, &set(2), &small(), None, |_| {}).unwrap();
    assert!(path.exists());

    let png = dir.path().join("frame.png");
    save_snapshot(&png, &set(2), 1, &small()).unwrap();
    assert!(image::open(&png).is_ok());
}
