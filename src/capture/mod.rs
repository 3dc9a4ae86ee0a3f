use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures_util::future::join_all;
use image::{ImageEncoder, RgbaImage};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::data::EncodedBitmap;

mod widget;

pub use widget::{
    CaptureRequest, MapWidget, MapWidgetFactory, RasterFuture, ResourceLoadFuture, SurfaceSpec,
    WidgetKind, SURFACE_HEIGHT_PX, SURFACE_WIDTH_PX,
};

/// Identifier of the single off-screen capture anchor, used in log messages.
pub const ANCHOR_ID: &str = "report-map-capture";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Mounting,
    WaitingSettle,
    Locating,
    VerifyingAssets,
    Rasterizing,
    Done,
    Failed,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Mounting => "mounting",
            CaptureState::WaitingSettle => "waiting-settle",
            CaptureState::Locating => "locating",
            CaptureState::VerifyingAssets => "verifying-assets",
            CaptureState::Rasterizing => "rasterizing",
            CaptureState::Done => "done",
            CaptureState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Initial wait for the widget's network-driven rendering.
    pub settle: Duration,
    /// Second, shorter wait after the layout invalidation.
    pub resettle: Duration,
    /// Interval between content-fingerprint polls.
    pub poll_interval: Duration,
    /// Hard upper bound for one whole capture.
    pub timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(1200),
            resettle: Duration::from_millis(400),
            poll_interval: Duration::from_millis(150),
            timeout: Duration::from_secs(30),
        }
    }
}

struct AnchorSlot {
    mounted: bool,
    state: CaptureState,
}

/// Owns the singleton off-screen capture anchor. The mutex spans a whole
/// capture, so two widgets can never occupy the anchor at the same time.
pub struct CaptureBridge {
    config: CaptureConfig,
    anchor: Mutex<AnchorSlot>,
}

impl Default for CaptureBridge {
    fn default() -> Self {
        Self::new(CaptureConfig::default())
    }
}

impl CaptureBridge {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            anchor: Mutex::new(AnchorSlot {
                mounted: false,
                state: CaptureState::Idle,
            }),
        }
    }

    /// Mounts the widget into the off-screen anchor, waits for it to settle,
    /// rasterizes it and tears it down. `None` means the capture failed or
    /// timed out; map capture is best-effort and the caller omits the section.
    pub async fn capture(
        &self,
        request: &CaptureRequest,
        mut widget: Box<dyn MapWidget>,
    ) -> Option<EncodedBitmap> {
        let mut slot = self.anchor.lock().await;
        let result = timeout(
            self.config.timeout,
            run_capture(&self.config, request, &mut slot, widget.as_mut()),
        )
        .await;

        // Teardown runs on every exit path, success or not.
        widget.unmount();
        slot.mounted = false;

        match result {
            Ok(Ok(bitmap)) => {
                slot.state = CaptureState::Done;
                debug!(kind = request.kind.as_str(), "map capture complete");
                Some(bitmap)
            }
            Ok(Err(err)) => {
                slot.state = CaptureState::Failed;
                warn!(kind = request.kind.as_str(), "map capture failed: {err:#}");
                None
            }
            Err(_) => {
                slot.state = CaptureState::Failed;
                warn!(
                    kind = request.kind.as_str(),
                    "map capture timed out after {:?}", self.config.timeout
                );
                None
            }
        }
    }

    pub async fn last_state(&self) -> CaptureState {
        self.anchor.lock().await.state
    }

    pub async fn is_torn_down(&self) -> bool {
        !self.anchor.lock().await.mounted
    }
}

async fn run_capture(
    config: &CaptureConfig,
    request: &CaptureRequest,
    slot: &mut AnchorSlot,
    widget: &mut dyn MapWidget,
) -> Result<EncodedBitmap> {
    transition(slot, request.kind, CaptureState::Mounting);
    widget
        .mount(&request.surface)
        .with_context(|| format!("failed to mount {} map widget", request.kind.as_str()))?;
    slot.mounted = true;

    transition(slot, request.kind, CaptureState::WaitingSettle);
    sleep(config.settle).await;
    // The widget's internal library may have measured its container lazily;
    // force a relayout and give it a second, shorter settle window.
    widget.invalidate_layout();
    sleep(config.resettle).await;
    let mut previous = widget.content_fingerprint();
    loop {
        sleep(config.poll_interval).await;
        let current = widget.content_fingerprint();
        if current == previous {
            break;
        }
        previous = current;
    }

    transition(slot, request.kind, CaptureState::Locating);
    if !widget.is_mounted() {
        return Err(anyhow!(
            "capture anchor '{}' is empty after the settle window",
            ANCHOR_ID
        ));
    }

    transition(slot, request.kind, CaptureState::VerifyingAssets);
    let pending = widget.pending_images();
    if !pending.is_empty() {
        debug!(
            kind = request.kind.as_str(),
            pending = pending.len(),
            "awaiting unsettled image resources"
        );
        join_all(pending).await;
    }

    transition(slot, request.kind, CaptureState::Rasterizing);
    let frame = widget
        .rasterize()
        .await
        .with_context(|| "widget rasterization failed")?;
    if frame.width() != request.surface.width_px || frame.height() != request.surface.height_px {
        return Err(anyhow!(
            "rasterized frame is {}x{}, expected {}x{}",
            frame.width(),
            frame.height(),
            request.surface.width_px,
            request.surface.height_px
        ));
    }
    encode_png(&frame)
}

fn transition(slot: &mut AnchorSlot, kind: WidgetKind, state: CaptureState) {
    slot.state = state;
    debug!(kind = kind.as_str(), state = state.as_str(), "capture state");
}

fn encode_png(frame: &RgbaImage) -> Result<EncodedBitmap> {
    let mut bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut bytes)
        .write_image(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgba8,
        )
        .with_context(|| "failed to encode captured frame")?;
    Ok(EncodedBitmap {
        bytes,
        width_px: frame.width(),
        height_px: frame.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GeoPoint;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct StubBehavior {
        fail_mount: bool,
        never_stable: bool,
        never_rasterizes: bool,
        broken_images: usize,
    }

    struct StubWidget {
        behavior: StubBehavior,
        mounted: bool,
        fingerprint: AtomicU64,
        unmount_count: Arc<AtomicUsize>,
        invalidated: Arc<AtomicBool>,
        frame: RgbaImage,
    }

    impl StubWidget {
        fn new(behavior: StubBehavior, unmount_count: Arc<AtomicUsize>) -> Self {
            Self {
                behavior,
                mounted: false,
                fingerprint: AtomicU64::new(0),
                unmount_count,
                invalidated: Arc::new(AtomicBool::new(false)),
                frame: RgbaImage::from_pixel(
                    SURFACE_WIDTH_PX,
                    SURFACE_HEIGHT_PX,
                    image::Rgba([40, 80, 200, 255]),
                ),
            }
        }
    }

    impl MapWidget for StubWidget {
        fn mount(&mut self, surface: &SurfaceSpec) -> Result<()> {
            if self.behavior.fail_mount {
                return Err(anyhow!("container not found"));
            }
            assert!(surface.static_mode);
            self.mounted = true;
            Ok(())
        }

        fn is_mounted(&self) -> bool {
            self.mounted
        }

        fn invalidate_layout(&mut self) {
            self.invalidated.store(true, Ordering::SeqCst);
        }

        fn content_fingerprint(&self) -> u64 {
            if self.behavior.never_stable {
                self.fingerprint.fetch_add(1, Ordering::SeqCst)
            } else {
                7
            }
        }

        fn pending_images(&mut self) -> Vec<ResourceLoadFuture> {
            // Broken images resolve through their error event, same as loads.
            (0..self.behavior.broken_images)
                .map(|_| Box::pin(async {}) as ResourceLoadFuture)
                .collect()
        }

        fn rasterize(&self) -> RasterFuture {
            if self.behavior.never_rasterizes {
                return Box::pin(std::future::pending());
            }
            let frame = self.frame.clone();
            Box::pin(async move { Ok(frame) })
        }

        fn unmount(&mut self) {
            self.mounted = false;
            self.unmount_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            settle: Duration::from_millis(10),
            resettle: Duration::from_millis(5),
            poll_interval: Duration::from_millis(2),
            timeout: Duration::from_secs(30),
        }
    }

    fn request() -> CaptureRequest {
        CaptureRequest::new(WidgetKind::Local, GeoPoint { lat: 8.46, lon: -11.77 })
    }

    #[tokio::test(start_paused = true)]
    async fn settled_widget_is_captured() {
        let bridge = CaptureBridge::new(fast_config());
        let unmounts = Arc::new(AtomicUsize::new(0));
        let widget = StubWidget::new(
            StubBehavior {
                broken_images: 2,
                ..StubBehavior::default()
            },
            unmounts.clone(),
        );
        let invalidated = widget.invalidated.clone();

        let bitmap = bridge.capture(&request(), Box::new(widget)).await.unwrap();
        assert_eq!(bitmap.width_px, SURFACE_WIDTH_PX);
        assert_eq!(bitmap.height_px, SURFACE_HEIGHT_PX);
        assert!(invalidated.load(Ordering::SeqCst));
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.last_state().await, CaptureState::Done);
        assert!(bridge.is_torn_down().await);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_rasterization_times_out_and_tears_down() {
        let bridge = CaptureBridge::new(fast_config());
        let unmounts = Arc::new(AtomicUsize::new(0));
        let widget = StubWidget::new(
            StubBehavior {
                never_rasterizes: true,
                ..StubBehavior::default()
            },
            unmounts.clone(),
        );

        let started = tokio::time::Instant::now();
        let result = bridge.capture(&request(), Box::new(widget)).await;
        let elapsed = started.elapsed();

        assert!(result.is_none());
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(31));
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.last_state().await, CaptureState::Failed);
        assert!(bridge.is_torn_down().await);
    }

    #[tokio::test(start_paused = true)]
    async fn widget_that_never_settles_times_out() {
        let bridge = CaptureBridge::new(fast_config());
        let unmounts = Arc::new(AtomicUsize::new(0));
        let widget = StubWidget::new(
            StubBehavior {
                never_stable: true,
                ..StubBehavior::default()
            },
            unmounts.clone(),
        );

        let result = bridge.capture(&request(), Box::new(widget)).await;
        assert!(result.is_none());
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mount_failure_is_not_fatal() {
        let bridge = CaptureBridge::new(fast_config());
        let unmounts = Arc::new(AtomicUsize::new(0));
        let widget = StubWidget::new(
            StubBehavior {
                fail_mount: true,
                ..StubBehavior::default()
            },
            unmounts.clone(),
        );

        let result = bridge.capture(&request(), Box::new(widget)).await;
        assert!(result.is_none());
        assert_eq!(bridge.last_state().await, CaptureState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_after_timeout_succeeds_independently() {
        let bridge = CaptureBridge::new(fast_config());
        let unmounts = Arc::new(AtomicUsize::new(0));

        let hung = StubWidget::new(
            StubBehavior {
                never_rasterizes: true,
                ..StubBehavior::default()
            },
            unmounts.clone(),
        );
        assert!(bridge.capture(&request(), Box::new(hung)).await.is_none());
        assert!(bridge.is_torn_down().await);

        let healthy = StubWidget::new(StubBehavior::default(), unmounts.clone());
        let bitmap = bridge.capture(&request(), Box::new(healthy)).await;
        assert!(bitmap.is_some());
        assert_eq!(bridge.last_state().await, CaptureState::Done);
        assert_eq!(unmounts.load(Ordering::SeqCst), 2);
    }

    struct OccupancyWidget {
        inner: StubWidget,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl MapWidget for OccupancyWidget {
        fn mount(&mut self, surface: &SurfaceSpec) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.inner.mount(surface)
        }
        fn is_mounted(&self) -> bool {
            self.inner.is_mounted()
        }
        fn invalidate_layout(&mut self) {
            self.inner.invalidate_layout()
        }
        fn content_fingerprint(&self) -> u64 {
            self.inner.content_fingerprint()
        }
        fn pending_images(&mut self) -> Vec<ResourceLoadFuture> {
            self.inner.pending_images()
        }
        fn rasterize(&self) -> RasterFuture {
            self.inner.rasterize()
        }
        fn unmount(&mut self) {
            if self.inner.is_mounted() {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            self.inner.unmount()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_captures_serialize_on_the_anchor() {
        let bridge = CaptureBridge::new(fast_config());
        let unmounts = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let local_widget = OccupancyWidget {
            inner: StubWidget::new(StubBehavior::default(), unmounts.clone()),
            in_flight: in_flight.clone(),
            max_in_flight: max_in_flight.clone(),
        };
        let global_widget = OccupancyWidget {
            inner: StubWidget::new(StubBehavior::default(), unmounts.clone()),
            in_flight: in_flight.clone(),
            max_in_flight: max_in_flight.clone(),
        };

        let local = request();
        let global = CaptureRequest::new(
            WidgetKind::Global,
            GeoPoint { lat: 8.46, lon: -11.77 },
        );
        let (first, second) = tokio::join!(
            bridge.capture(&local, Box::new(local_widget)),
            bridge.capture(&global, Box::new(global_widget)),
        );

        assert!(first.is_some());
        assert!(second.is_some());
        // The anchor is a single slot; two widgets must never occupy it at
        // the same time.
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(unmounts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_frame_size_is_rejected() {
        struct WrongSize {
            inner: StubWidget,
        }
        impl MapWidget for WrongSize {
            fn mount(&mut self, surface: &SurfaceSpec) -> Result<()> {
                self.inner.mount(surface)
            }
            fn is_mounted(&self) -> bool {
                self.inner.is_mounted()
            }
            fn invalidate_layout(&mut self) {
                self.inner.invalidate_layout()
            }
            fn content_fingerprint(&self) -> u64 {
                self.inner.content_fingerprint()
            }
            fn pending_images(&mut self) -> Vec<ResourceLoadFuture> {
                self.inner.pending_images()
            }
            fn rasterize(&self) -> RasterFuture {
                Box::pin(async {
                    Ok(RgbaImage::from_pixel(10, 10, image::Rgba([0, 0, 0, 255])))
                })
            }
            fn unmount(&mut self) {
                self.inner.unmount()
            }
        }

        let bridge = CaptureBridge::new(fast_config());
        let unmounts = Arc::new(AtomicUsize::new(0));
        let widget = WrongSize {
            inner: StubWidget::new(StubBehavior::default(), unmounts.clone()),
        };
        assert!(bridge.capture(&request(), Box::new(widget)).await.is_none());
        assert_eq!(unmounts.load(Ordering::SeqCst), 1);
    }
}
