pub mod capture;
pub mod compose;
pub mod data;
pub mod logging;
pub mod normalize;
pub mod theme;

mod export;

pub use capture::{
    CaptureBridge, CaptureConfig, CaptureRequest, CaptureState, MapWidget, MapWidgetFactory,
    RasterFuture, ResourceLoadFuture, SurfaceSpec, WidgetKind,
};
pub use data::{
    DocumentAsset, DocumentKind, EncodedBitmap, ExportOptions, GeoPoint, ImageAsset, ProgressSet,
    ProjectSnapshot, ProjectStatus,
};
pub use export::{Artifact, ExportInputs, NullStatus, StatusSink, run, run_with_config};
pub use normalize::{HttpLoader, ImageLoader};
