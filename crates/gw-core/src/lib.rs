/// Shared types, configuration and color math for glyphweave.
///
/// Every other crate of the workspace builds on the buffers, the control
/// record and the cancellation/progress seams defined here.

pub mod cancel;
pub mod color;
pub mod config;
pub mod error;
pub mod frame;
pub mod gradient;
pub mod traits;

pub use cancel::CancellationToken;
pub use config::{AppConfig, ControlState, DitheringMethod, ExportSettings, Theme, WorkerSettings};
pub use error::CoreError;
pub use frame::{AnimationSequence, AsciiFrame, Frame, PixelBuffer};
pub use gradient::Gradient;
pub use traits::{Progress, ProgressSink};
