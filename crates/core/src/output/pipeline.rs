//! Background writers, one per artifact kind.
//!
//! Each of the three artifact kinds (flow field, concentration grid,
//! receptor series) owns a dedicated writer thread. Submitting a new
//! snapshot first joins the previous writer of the same kind (a bounded
//! poll with progress logging, then an unbounded join), which guarantees
//! at most one in-flight writer per kind and bounds the memory held by
//! queued snapshots. Artifacts carry their situation index in the file
//! name and are never reordered on disk.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::output::artifacts::{ConcentrationArtifact, ReceptorArtifact};
use crate::output::OutputError;
use crate::wind::FieldSnapshot;

/// The three independent artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    FlowField,
    Concentration,
    Receptors,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FlowField => write!(f, "flow field"),
            Self::Concentration => write!(f, "concentration"),
            Self::Receptors => write!(f, "receptor series"),
        }
    }
}

/// How long to wait quietly before telling the user a writer is still
/// busy.
const BOUNDED_WAIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

struct Worker {
    kind: ArtifactKind,
    handle: Option<JoinHandle<Result<(), OutputError>>>,
}

impl Worker {
    fn new(kind: ArtifactKind) -> Self {
        Self { kind, handle: None }
    }

    /// Wait for the previous writer of this kind, if any. Bounded quiet
    /// wait, then progress messages, then an unbounded join. Writers are
    /// joined, never killed, so files are never left half-written.
    fn join_previous(&mut self) -> Result<(), OutputError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        let start = Instant::now();
        let mut announced = false;
        let mut last_progress = start;
        while !handle.is_finished() {
            if start.elapsed() > BOUNDED_WAIT {
                if !announced {
                    info!(kind = %self.kind, "waiting for previous artifact writer");
                    announced = true;
                    last_progress = Instant::now();
                } else if last_progress.elapsed() > PROGRESS_INTERVAL {
                    info!(kind = %self.kind, "still writing previous artifact");
                    last_progress = Instant::now();
                }
            }
            thread::sleep(POLL_INTERVAL);
        }

        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(OutputError::WriterPanicked { kind: self.kind }),
        }
    }

    fn dispatch<F>(&mut self, job: F)
    where
        F: FnOnce() -> Result<(), OutputError> + Send + 'static,
    {
        self.handle = Some(thread::spawn(job));
    }
}

/// The run's output pipeline: directory plus one worker per artifact
/// kind.
pub struct OutputPipeline {
    directory: PathBuf,
    flow: Worker,
    concentration: Worker,
    receptors: Worker,
}

impl OutputPipeline {
    /// Create the output directory and an idle pipeline.
    ///
    /// # Errors
    /// `OutputError::Io` when the directory cannot be created; the run
    /// aborts before any physics.
    pub fn new(directory: PathBuf) -> Result<Self, OutputError> {
        fs::create_dir_all(&directory).map_err(|source| OutputError::Io {
            path: directory.clone(),
            source,
        })?;
        Ok(Self {
            directory,
            flow: Worker::new(ArtifactKind::FlowField),
            concentration: Worker::new(ArtifactKind::Concentration),
            receptors: Worker::new(ArtifactKind::Receptors),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Hand a freshly computed wind field to its writer.
    ///
    /// # Errors
    /// Surfaces the previous flow-field writer's failure, which the
    /// control loop treats as fatal.
    pub fn submit_flow_field(&mut self, snapshot: FieldSnapshot) -> Result<(), OutputError> {
        self.flow.join_previous()?;
        let path = self
            .directory
            .join(format!("{}.json", snapshot.key.file_stem()));
        debug!(situation = snapshot.situation_index, "dispatching flow-field writer");
        self.flow.dispatch(move || write_json(&path, &snapshot));
        Ok(())
    }

    /// Hand a situation's concentration snapshot to its writer.
    ///
    /// # Errors
    /// Surfaces the previous concentration writer's failure.
    pub fn submit_concentration(
        &mut self,
        artifact: ConcentrationArtifact,
    ) -> Result<(), OutputError> {
        self.concentration.join_previous()?;
        let path = self
            .directory
            .join(ConcentrationArtifact::file_name(artifact.situation_index));
        debug!(
            situation = artifact.situation_index,
            skipped = artifact.skipped,
            "dispatching concentration writer"
        );
        self.concentration
            .dispatch(move || write_json(&path, &artifact));
        Ok(())
    }

    /// Hand the current receptor series to its writer.
    ///
    /// # Errors
    /// Surfaces the previous receptor writer's failure.
    pub fn submit_receptors(&mut self, artifact: ReceptorArtifact) -> Result<(), OutputError> {
        self.receptors.join_previous()?;
        let path = self.directory.join(ReceptorArtifact::FILE_NAME);
        self.receptors
            .dispatch(move || write_json(&path, &artifact));
        Ok(())
    }

    /// Join every in-flight writer. Called on completion and on
    /// cancellation. Background writers finish, they are never killed.
    ///
    /// # Errors
    /// The first writer failure encountered.
    pub fn join_all(&mut self) -> Result<(), OutputError> {
        self.flow.join_previous()?;
        self.concentration.join_previous()?;
        self.receptors.join_previous()?;
        Ok(())
    }
}

/// Serialize to a temporary file, then rename into place so readers never
/// observe a partially written artifact.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let tmp = path.with_extension("json.tmp");
    let io_err = |source: std::io::Error| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(&tmp).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|e| OutputError::Serialize {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    writer.flush().map_err(io_err)?;
    drop(writer);
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulate::ConcentrationGrid;
    use crate::domain::GridGeometry;

    fn geometry() -> GridGeometry {
        GridGeometry::new(4, 4, 3, 10.0, 10.0, 2.0, 1.0, 0.0, 0.0, vec![1.0]).unwrap()
    }

    fn artifact(situation_index: u32) -> ConcentrationArtifact {
        let g = geometry();
        let mut grid = ConcentrationGrid::new(&g, 1);
        grid.reset_for(situation_index);
        ConcentrationArtifact {
            situation_index,
            skipped: false,
            timestamp: None,
            dispersion_time: 3600.0,
            slice_heights: vec![1.0],
            grid,
        }
    }

    #[test]
    fn artifacts_land_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = OutputPipeline::new(dir.path().to_path_buf()).unwrap();
        for situation in 1..=3 {
            pipeline.submit_concentration(artifact(situation)).unwrap();
        }
        pipeline.join_all().unwrap();

        for situation in 1..=3_u32 {
            let path = dir.path().join(ConcentrationArtifact::file_name(situation));
            assert!(path.exists(), "missing artifact for situation {situation}");
            let text = fs::read_to_string(path).unwrap();
            let parsed: ConcentrationArtifact = serde_json::from_str(&text).unwrap();
            assert_eq!(parsed.situation_index, situation);
        }
        // No temporary files are left behind.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn submit_joins_previous_writer_of_same_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = OutputPipeline::new(dir.path().to_path_buf()).unwrap();
        // Rapid-fire submissions: each join_previous must complete the
        // prior write before the next dispatch, so all files exist at the
        // end without an explicit join between submissions.
        for situation in 1..=5 {
            pipeline.submit_concentration(artifact(situation)).unwrap();
        }
        pipeline.join_all().unwrap();
        let count = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 5);
    }
}
