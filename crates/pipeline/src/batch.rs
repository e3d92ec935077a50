//! The batch runner.
//!
//! Items are driven strictly one at a time through
//! `Stage -> Decode -> Locate -> Commit`, followed by an unconditional
//! cleanup of scratch space. The decoder therefore never sees overlapping
//! invocations, and the locator never sees two items' outputs at once.
//! Running items in parallel would need a separate scratch directory per
//! item.

use crate::commit::commit;
use crate::error::Result;
use crate::item::{ErrorKind, Outcome, Phase, Result as ItemResult};
use crate::locate::locate;
use crate::name::BaseName;
use crate::plan::{Plan, plan};
use crate::progress::{BatchEvent, Progress, ProgressSink};
use crate::scan::SourceItem;
use crate::stage::{Scratch, stage};
use crate::BatchReport;
use decant_decoder::Decoder;
use decant_storage::BackendHandle;
use exn::ResultExt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub const DEFAULT_EXTENSION: &str = "ncm";

/// Converts every not-yet-converted container in a source tree into the
/// destination tree.
///
/// The runner holds no state about the trees themselves: both are passed
/// into each [`run()`](Self::run), already chosen and validated by the
/// caller.
pub struct BatchRunner {
    decoder: Arc<dyn Decoder>,
    scratch: Scratch,
    extension: String,
}
impl BatchRunner {
    pub fn new(decoder: impl Decoder + 'static, scratch: Scratch) -> Self {
        Self::from_arc(Arc::new(decoder), scratch)
    }

    pub fn from_arc(decoder: Arc<dyn Decoder>, scratch: Scratch) -> Self {
        Self { decoder, scratch, extension: DEFAULT_EXTENSION.to_string() }
    }

    /// Extension (without the dot) of the encrypted containers to convert.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// Work out what [`run()`](Self::run) would do, without staging or
    /// decoding anything.
    pub async fn plan(&self, source: &BackendHandle, destination: &BackendHandle) -> Result<Plan> {
        plan(source, destination, &self.extension).await
    }

    /// Run one batch.
    ///
    /// Cancellation is checked before each item; an item already in flight
    /// always runs to its own end. Item failures are counted, never
    /// returned.
    ///
    /// # Errors
    /// [`InvalidSource`](crate::error::ErrorKind::InvalidSource) or
    /// [`InvalidDestination`](crate::error::ErrorKind::InvalidDestination)
    /// before any item is processed. A [`Complete`](BatchEvent::Complete)
    /// event with an all-zero report is still emitted.
    #[instrument(skip_all, fields(source = source.name(), destination = destination.name()))]
    pub async fn run(
        &self,
        source: &BackendHandle,
        destination: &BackendHandle,
        cancel: &CancellationToken,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport> {
        sink.emit(BatchEvent::Started);
        let plan = match self.plan(source, destination).await {
            Ok(plan) => plan,
            Err(err) => {
                tracing::error!(error = ?err, "Batch aborted before processing any item");
                sink.emit(BatchEvent::Complete(BatchReport::default()));
                return Err(err);
            },
        };
        let total = plan.to_convert.len();
        sink.emit(BatchEvent::Planned { found: plan.found(), to_convert: total, skipped: plan.skipped.len() });

        let mut report = BatchReport::planned(plan.found(), plan.skipped.len());
        for (position, item) in plan.to_convert.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(remaining = total - position, "Batch cancelled; not starting further items");
                report.cancel(total - position);
                break;
            }
            let index = position + 1;
            sink.emit(BatchEvent::ItemStarted { index, total, name: item.name().to_string() });
            let outcome = self.convert(source, destination, &item).await;
            report.record(&outcome);
            sink.emit(BatchEvent::ItemFinished(Progress { index, total, name: item.name().to_string(), outcome }));
        }

        tracing::info!(%report, cancelled = report.cancelled, "Batch complete");
        sink.emit(BatchEvent::Complete(report));
        Ok(report)
    }

    /// Resolve one item completely, cleanup included.
    #[instrument(skip_all, fields(item = item.name()))]
    async fn convert(&self, source: &BackendHandle, destination: &BackendHandle, item: &SourceItem) -> Outcome {
        let mut leftovers = Leftovers::default();
        let result = self.process(source, destination, item, &mut leftovers).await;
        leftovers.clean(self.scratch.path(), item.identity()).await;
        match result {
            Ok(name) => {
                tracing::info!(committed = %name, "Converted");
                Outcome::Committed { name }
            },
            Err(err) => {
                let reason = *err;
                tracing::warn!(phase = %reason.phase(), error = ?err, "Conversion failed");
                Outcome::Failed(reason)
            },
        }
    }

    async fn process(
        &self,
        source: &BackendHandle,
        destination: &BackendHandle,
        item: &SourceItem,
        leftovers: &mut Leftovers,
    ) -> ItemResult<String> {
        let slot = stage(source, item, &self.scratch).await?;
        leftovers.staged = Some(slot.path().to_path_buf());

        let decoder = Arc::clone(&self.decoder);
        let input = slot.path().to_path_buf();
        let output_dir = self.scratch.path().to_path_buf();
        let status = tokio::task::spawn_blocking(move || decoder.decode(&input, &output_dir))
            .await
            .or_raise(|| ErrorKind::Decode(-1))?;
        if status != 0 {
            exn::bail!(ErrorKind::Decode(status));
        }

        let dir = self.scratch.path().to_path_buf();
        let basename = item.basename().to_string();
        let extension = self.extension.clone();
        let artifact = tokio::task::spawn_blocking(move || locate(&dir, &basename, &extension))
            .await
            .or_raise(|| ErrorKind::ArtifactNotFound)??;
        leftovers.artifact = Some(artifact.path().to_path_buf());

        let committed = commit(destination, &artifact, item.basename()).await?;
        Ok(committed.name)
    }
}

/// Scratch files an item may have left behind.
#[derive(Debug, Default)]
struct Leftovers {
    staged: Option<PathBuf>,
    artifact: Option<PathBuf>,
}
impl Leftovers {
    /// Delete the staged input and the artifact, then sweep anything else in
    /// scratch sharing the item's basename. Failures are logged only.
    async fn clean(self, scratch: &Path, identity: BaseName) {
        let scratch = scratch.to_path_buf();
        let cleaned = tokio::task::spawn_blocking(move || {
            for path in [self.staged, self.artifact].into_iter().flatten() {
                remove(&path);
            }
            sweep(&scratch, &identity);
        })
        .await;
        if let Err(err) = cleaned {
            tracing::warn!(phase = %Phase::Cleanup, error = %err, "Scratch cleanup did not finish");
        }
    }
}

fn remove(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::trace!(path = %path.display(), "Removed scratch file"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {},
        Err(err) => {
            tracing::warn!(phase = %Phase::Cleanup, path = %path.display(), error = %err, "Could not remove scratch file")
        },
    }
}

fn sweep(scratch: &Path, identity: &BaseName) {
    let entries = match fs::read_dir(scratch) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return,
        Err(err) => {
            tracing::warn!(phase = %Phase::Cleanup, error = %err, "Could not list scratch space");
            return;
        },
    };
    for entry in entries.flatten() {
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        let matches = entry.file_name().to_str().is_some_and(|name| identity.matches(name));
        if is_file && matches {
            remove(&entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind as BatchErrorKind;
    use crate::report::Summary;
    use decant_storage::backend::{LocalBackend, MockBackend, ReadOnlyBackend};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    /// Writes `<basename>.<extension>` holding the input's bytes, or fails
    /// for the basenames listed in `failing`.
    struct FakeDecoder {
        extension: &'static str,
        failing: &'static [&'static str],
    }
    impl FakeDecoder {
        fn mp3() -> Self {
            Self { extension: "mp3", failing: &[] }
        }
    }
    impl Decoder for FakeDecoder {
        fn decode(&self, input: &Path, output_dir: &Path) -> i32 {
            let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if self.failing.iter().any(|failing| *failing == stem) {
                // Decoders may leave debris behind when they fail.
                fs::write(output_dir.join(format!("{stem}.part")), b"junk").unwrap();
                return 2;
            }
            let data = fs::read(input).unwrap();
            fs::write(output_dir.join(format!("{stem}.{}", self.extension)), data).unwrap();
            0
        }
    }

    /// Cancels the batch while its item is being decoded.
    struct CancellingDecoder {
        inner: FakeDecoder,
        cancel: CancellationToken,
    }
    impl Decoder for CancellingDecoder {
        fn decode(&self, input: &Path, output_dir: &Path) -> i32 {
            self.cancel.cancel();
            self.inner.decode(input, output_dir)
        }
    }

    /// Decodes, then leaves a directory where the staged input was, which
    /// scratch cleanup cannot remove as a file.
    struct LitteringDecoder(FakeDecoder);
    impl Decoder for LitteringDecoder {
        fn decode(&self, input: &Path, output_dir: &Path) -> i32 {
            let status = self.0.decode(input, output_dir);
            fs::remove_file(input).unwrap();
            fs::create_dir(input).unwrap();
            fs::write(input.join("debris"), b"x").unwrap();
            status
        }
    }

    /// Succeeds without writing anything.
    struct SilentDecoder;
    impl Decoder for SilentDecoder {
        fn decode(&self, _input: &Path, _output_dir: &Path) -> i32 {
            0
        }
    }

    struct Fixture {
        _scratch_root: TempDir,
        runner: BatchRunner,
    }
    impl Fixture {
        fn new(decoder: impl Decoder + 'static) -> Self {
            let scratch_root = TempDir::new().unwrap();
            let runner = BatchRunner::new(decoder, Scratch::at(scratch_root.path().join("scratch")).unwrap())
                .with_extension("enc");
            Self { _scratch_root: scratch_root, runner }
        }

        fn scratch_files(&self) -> Vec<String> {
            match fs::read_dir(self.runner.scratch().path()) {
                Ok(entries) => entries.map(|e| e.unwrap().file_name().to_string_lossy().into_owned()).collect(),
                Err(_) => Vec::new(),
            }
        }

        async fn run(&self, source: &BackendHandle, destination: &BackendHandle) -> (Result<BatchReport>, Vec<BatchEvent>) {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let result = self.runner.run(source, destination, &CancellationToken::new(), &tx).await;
            drop(tx);
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            (result, events)
        }
    }

    fn report(found: usize, attempted: usize, success: usize, failed: usize, skipped: usize) -> BatchReport {
        BatchReport { found, attempted, success, failed, skipped, cancelled: false }
    }

    #[tokio::test]
    async fn test_converts_everything_into_empty_destination() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle = Arc::new(MockBackend::with_files([("a.enc", b"aaa"), ("b.enc", b"bbb")]));
        let mock = Arc::new(MockBackend::default());
        let destination: BackendHandle = mock.clone();

        let (result, _) = fixture.run(&source, &destination).await;
        assert_eq!(result.unwrap(), report(2, 2, 2, 0, 0));
        assert_eq!(mock.names(), ["a.mp3", "b.mp3"]);
        assert_eq!(destination.read(Path::new("a.mp3")).await.unwrap(), b"aaa");
        assert!(fixture.scratch_files().is_empty());
    }

    #[tokio::test]
    async fn test_existing_output_is_skipped() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle = Arc::new(MockBackend::with_files([("a.enc", b"aaa")]));
        let mock = Arc::new(MockBackend::with_files([("a.flac", b"flac")]));
        let destination: BackendHandle = mock.clone();

        let (result, _) = fixture.run(&source, &destination).await;
        let result = result.unwrap();
        assert_eq!(result, report(1, 0, 0, 0, 1));
        assert_eq!(result.summary(), Summary::AllConverted);
        assert_eq!(mock.names(), ["a.flac"]);
        assert_eq!(destination.read(Path::new("a.flac")).await.unwrap(), b"flac");
    }

    #[tokio::test]
    async fn test_decode_failure_is_isolated() {
        let fixture = Fixture::new(FakeDecoder { extension: "mp3", failing: &["b"] });
        let source: BackendHandle = Arc::new(MockBackend::with_files([("a.enc", b"aaa"), ("b.enc", b"bbb")]));
        let mock = Arc::new(MockBackend::default());
        let destination: BackendHandle = mock.clone();

        let (result, events) = fixture.run(&source, &destination).await;
        assert_eq!(result.unwrap(), report(2, 2, 1, 1, 0));
        assert_eq!(mock.names(), ["a.mp3"]);
        assert!(fixture.scratch_files().is_empty());
        let failed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::ItemFinished(Progress { name, outcome: Outcome::Failed(reason), .. }) => Some((name.as_str(), *reason)),
                _ => None,
            })
            .collect();
        assert_eq!(failed, [("b.enc", ErrorKind::Decode(2))]);
    }

    #[tokio::test]
    async fn test_commit_failure_is_isolated() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle =
            Arc::new(MockBackend::with_files([("a.enc", b"aaa"), ("b.enc", b"bbb"), ("c.enc", b"ccc")]));
        let mock = Arc::new(MockBackend::default().failing_writes("b.mp3"));
        let destination: BackendHandle = mock.clone();

        let (result, _) = fixture.run(&source, &destination).await;
        assert_eq!(result.unwrap(), report(3, 3, 2, 1, 0));
        assert_eq!(mock.names(), ["a.mp3", "c.mp3"]);
        assert!(fixture.scratch_files().is_empty());
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let fixture = Fixture::new(SilentDecoder);
        let source: BackendHandle = Arc::new(MockBackend::with_files([("a.enc", b"aaa")]));
        let destination: BackendHandle = Arc::new(MockBackend::default());

        let (result, events) = fixture.run(&source, &destination).await;
        assert_eq!(result.unwrap(), report(1, 1, 0, 1, 0));
        assert!(events.iter().any(|e| matches!(
            e,
            BatchEvent::ItemFinished(Progress { outcome: Outcome::Failed(ErrorKind::ArtifactNotFound), .. })
        )));
        assert!(fixture.scratch_files().is_empty());
    }

    #[tokio::test]
    async fn test_staging_failure_is_isolated() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle =
            Arc::new(MockBackend::with_files([("a.enc", b"aaa"), ("b.enc", b"bbb")]).failing_reads("a.enc"));
        let mock = Arc::new(MockBackend::default());
        let destination: BackendHandle = mock.clone();

        let (result, _) = fixture.run(&source, &destination).await;
        assert_eq!(result.unwrap(), report(2, 2, 1, 1, 0));
        assert_eq!(mock.names(), ["b.mp3"]);
    }

    #[tokio::test]
    async fn test_second_run_converts_nothing() {
        let fixture = Fixture::new(FakeDecoder { extension: "flac", failing: &[] });
        let source: BackendHandle = Arc::new(MockBackend::with_files([("Song.ENC", b"s"), ("Other.enc", b"o")]));
        let destination: BackendHandle = Arc::new(MockBackend::default());

        let (first, _) = fixture.run(&source, &destination).await;
        assert_eq!(first.unwrap().success, 2);
        let (second, events) = fixture.run(&source, &destination).await;
        let second = second.unwrap();
        assert_eq!(second, report(2, 0, 0, 0, 2));
        assert!(!events.iter().any(|e| matches!(e, BatchEvent::ItemStarted { .. })));
    }

    #[tokio::test]
    async fn test_uppercase_source_matches_lowercase_destination() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle = Arc::new(MockBackend::with_files([("Song.ENC", b"s")]));
        let destination: BackendHandle = Arc::new(MockBackend::with_files([("song.mp3", b"m")]));

        let (result, _) = fixture.run(&source, &destination).await;
        assert_eq!(result.unwrap(), report(1, 0, 0, 0, 1));
    }

    #[tokio::test]
    async fn test_events_are_ordered() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle = Arc::new(MockBackend::with_files([("a.enc", b"a")]));
        let destination: BackendHandle = Arc::new(MockBackend::default());

        let (result, events) = fixture.run(&source, &destination).await;
        let report = result.unwrap();
        assert_eq!(
            events,
            [
                BatchEvent::Started,
                BatchEvent::Planned { found: 1, to_convert: 1, skipped: 0 },
                BatchEvent::ItemStarted { index: 1, total: 1, name: "a.enc".into() },
                BatchEvent::ItemFinished(Progress {
                    index: 1,
                    total: 1,
                    name: "a.enc".into(),
                    outcome: Outcome::Committed { name: "a.mp3".into() },
                }),
                BatchEvent::Complete(report),
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle = Arc::new(MockBackend::with_files([("readme.txt", b"hi")]));
        let destination: BackendHandle = Arc::new(MockBackend::default());

        let (result, _) = fixture.run(&source, &destination).await;
        let result = result.unwrap();
        assert_eq!(result, BatchReport::default());
        assert_eq!(result.summary(), Summary::NothingFound);
    }

    #[tokio::test]
    async fn test_invalid_source_aborts_batch() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle = Arc::new(MockBackend::default().unavailable());
        let destination: BackendHandle = Arc::new(MockBackend::default());

        let (result, events) = fixture.run(&source, &destination).await;
        assert!(matches!(&*result.unwrap_err(), BatchErrorKind::InvalidSource));
        assert_eq!(events, [BatchEvent::Started, BatchEvent::Complete(BatchReport::default())]);
    }

    #[tokio::test]
    async fn test_invalid_destination_aborts_batch() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle = Arc::new(MockBackend::with_files([("a.enc", b"a")]));
        let destination: BackendHandle = Arc::new(MockBackend::default().unavailable());

        let (result, _) = fixture.run(&source, &destination).await;
        assert!(matches!(&*result.unwrap_err(), BatchErrorKind::InvalidDestination));
        assert!(fixture.scratch_files().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_item() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle =
            Arc::new(MockBackend::with_files([("a.enc", b"a"), ("b.enc", b"b"), ("c.enc", b"c")]));
        let mock = Arc::new(MockBackend::default());
        let destination: BackendHandle = mock.clone();

        // Cancel as soon as the first item has finished; it is never interrupted.
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let sink = move |event: BatchEvent| {
            if matches!(event, BatchEvent::ItemFinished(_)) {
                trigger.cancel();
            }
        };
        let result = fixture.runner.run(&source, &destination, &cancel, &sink).await.unwrap();
        assert_eq!(result, BatchReport { cancelled: true, ..report(3, 1, 1, 0, 2) });
        assert!(result.is_consistent());
        assert_eq!(mock.names().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let source: BackendHandle = Arc::new(MockBackend::with_files([("a.enc", b"a")]));
        let destination: BackendHandle = Arc::new(MockBackend::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = fixture.runner.run(&source, &destination, &cancel, &|_event: BatchEvent| {}).await.unwrap();
        assert_eq!(result, BatchReport { cancelled: true, ..report(1, 0, 0, 0, 1) });
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_matches_only() {
        let fixture = Fixture::new(FakeDecoder::mp3());
        let scratch = fixture.runner.scratch().path();
        // Extensionless, so it can never outrank the real artifact.
        fs::write(scratch.join("A"), b"stale").unwrap();
        fs::write(scratch.join("unrelated.mp3"), b"keep").unwrap();
        let source: BackendHandle = Arc::new(MockBackend::with_files([("a.enc", b"a")]));
        let destination: BackendHandle = Arc::new(MockBackend::default());

        let (result, _) = fixture.run(&source, &destination).await;
        assert_eq!(result.unwrap().success, 1);
        assert_eq!(fixture.scratch_files(), ["unrelated.mp3"]);
    }

    #[tokio::test]
    async fn test_item_in_flight_finishes_after_cancellation() {
        let cancel = CancellationToken::new();
        let fixture = Fixture::new(CancellingDecoder { inner: FakeDecoder::mp3(), cancel: cancel.clone() });
        let source: BackendHandle =
            Arc::new(MockBackend::with_files([("a.enc", b"a"), ("b.enc", b"b"), ("c.enc", b"c")]));
        let mock = Arc::new(MockBackend::default());
        let destination: BackendHandle = mock.clone();

        let result = fixture.runner.run(&source, &destination, &cancel, &|_event: BatchEvent| {}).await.unwrap();
        assert_eq!(result, BatchReport { cancelled: true, ..report(3, 1, 1, 0, 2) });
        assert_eq!(mock.names().len(), 1);
        assert!(fixture.scratch_files().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_outcome() {
        let fixture = Fixture::new(LitteringDecoder(FakeDecoder::mp3()));
        let source: BackendHandle = Arc::new(MockBackend::with_files([("a.enc", b"aaa")]));
        let mock = Arc::new(MockBackend::default());
        let destination: BackendHandle = mock.clone();

        let (result, events) = fixture.run(&source, &destination).await;
        assert_eq!(result.unwrap(), report(1, 1, 1, 0, 0));
        assert!(events.iter().any(|e| matches!(
            e,
            BatchEvent::ItemFinished(Progress { outcome: Outcome::Committed { .. }, .. })
        )));
        assert_eq!(mock.names(), ["a.mp3"]);
        // The artifact is still cleaned up; only the directory stays behind.
        assert_eq!(fixture.scratch_files(), ["a.enc"]);
    }

    #[tokio::test]
    async fn test_scratch_inside_source_leaves_source_intact() {
        let source_dir = TempDir::new().unwrap();
        let destination_dir = TempDir::new().unwrap();
        fs::write(source_dir.path().join("a.enc"), b"container").unwrap();
        let local: BackendHandle = Arc::new(LocalBackend::new("source", source_dir.path()).unwrap());
        let source: BackendHandle = Arc::new(ReadOnlyBackend::new(local));
        let destination: BackendHandle = Arc::new(LocalBackend::new("destination", destination_dir.path()).unwrap());
        let runner =
            BatchRunner::new(FakeDecoder::mp3(), Scratch::at(source_dir.path()).unwrap()).with_extension("enc");

        let result = runner.run(&source, &destination, &CancellationToken::new(), &|_event: BatchEvent| {}).await;
        assert_eq!(result.unwrap(), report(1, 1, 1, 0, 0));
        assert_eq!(fs::read(source_dir.path().join("a.enc")).unwrap(), b"container");
        assert_eq!(fs::read(destination_dir.path().join("a.mp3")).unwrap(), b"container");
    }
}
