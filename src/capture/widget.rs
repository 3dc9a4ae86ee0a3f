use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use image::RgbaImage;

use crate::data::GeoPoint;

pub const SURFACE_WIDTH_PX: u32 = 1024;
pub const SURFACE_HEIGHT_PX: u32 = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Local,
    Global,
}

impl WidgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Local => "local",
            WidgetKind::Global => "global",
        }
    }
}

/// The ephemeral off-screen rendering surface a widget is mounted into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSpec {
    pub width_px: u32,
    pub height_px: u32,
    /// Disables interactive chrome (zoom controls, attribution popups) so the
    /// captured frame is a clean static render.
    pub static_mode: bool,
}

impl SurfaceSpec {
    pub fn capture_default() -> Self {
        Self {
            width_px: SURFACE_WIDTH_PX,
            height_px: SURFACE_HEIGHT_PX,
            static_mode: true,
        }
    }
}

/// Transient per-capture value: built, used for one capture, discarded.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub kind: WidgetKind,
    pub surface: SurfaceSpec,
    pub center: GeoPoint,
}

impl CaptureRequest {
    pub fn new(kind: WidgetKind, center: GeoPoint) -> Self {
        Self {
            kind,
            surface: SurfaceSpec::capture_default(),
            center,
        }
    }
}

pub type RasterFuture = Pin<Box<dyn Future<Output = Result<RgbaImage>> + Send>>;

/// Resolves when the underlying image resource has either loaded or errored;
/// a broken tile must never hang the capture pipeline.
pub type ResourceLoadFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Contract the capture bridge requires from the map widget components.
///
/// Widgets must be mountable into an arbitrary off-screen surface at a
/// caller-specified fixed size, honor the static rendering flag, and expose
/// their asynchronous resource loading in an observable way.
pub trait MapWidget: Send {
    fn mount(&mut self, surface: &SurfaceSpec) -> Result<()>;

    fn is_mounted(&self) -> bool;

    /// Resize/relayout notification; widgets whose internal library measures
    /// its container lazily recompute here.
    fn invalidate_layout(&mut self);

    /// Hash of the currently rendered content. The bridge polls this until
    /// two consecutive reads agree before rasterizing.
    fn content_fingerprint(&self) -> u64;

    /// Image resources (tiles, pins) not yet settled.
    fn pending_images(&mut self) -> Vec<ResourceLoadFuture>;

    /// Rasterizes the mounted surface at 1:1 scale with transitions frozen.
    fn rasterize(&self) -> RasterFuture;

    fn unmount(&mut self);
}

/// Creates one widget per capture request; supplied by the (out-of-scope)
/// map-widget components.
pub trait MapWidgetFactory: Send + Sync {
    fn create(&self, request: &CaptureRequest) -> Box<dyn MapWidget>;
}
