//! Output pipeline: per-situation artifacts serialized on background
//! worker threads, overlapped with the next situation's computation.

pub mod artifacts;
pub mod pipeline;

pub use artifacts::{ConcentrationArtifact, ReceptorArtifact, ReceptorRecord};
pub use pipeline::{ArtifactKind, OutputPipeline};

use std::path::PathBuf;
use thiserror::Error;

/// Output pipeline failures. Unlike situation-level faults these are
/// fatal: a run whose results cannot be written has nothing to show for
/// its compute time.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("writing {} failed: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serializing {} failed: {detail}", path.display())]
    Serialize { path: PathBuf, detail: String },
    #[error("background {kind} writer panicked")]
    WriterPanicked { kind: ArtifactKind },
}
