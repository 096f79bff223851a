pub mod assets;
pub mod events;
pub mod layout;
pub mod runs;
pub mod stream;

pub use assets::{AnalysisResult, AnalysisStatus, ImageAsset, ERROR_MARKER};
pub use layout::RowLayout;
