//! In-memory fakes for collaborator traits (testing only)
//!
//! Every fake is scriptable up front and records what the pipeline asked of
//! it, so tests can assert both outcomes and call sequences without touching
//! processes, networks or git.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::collaborators::*;
use crate::credentials::{CredentialProvider, Credentials};
use crate::domain::*;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// StaticSourceControl
// ---------------------------------------------------------------------------

/// Always resolves to the same revision string.
#[derive(Debug)]
pub struct StaticSourceControl {
    revision: String,
    calls: AtomicUsize,
}

impl StaticSourceControl {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceControl for StaticSourceControl {
    async fn resolve_revision(&self) -> Result<Revision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Revision::parse(&self.revision)
    }
}

// ---------------------------------------------------------------------------
// FakeBuildTool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum BuildOutcome {
    Pass,
    BuildFails(String),
    TestsFail(String),
}

#[derive(Debug)]
pub struct FakeBuildTool {
    outcome: BuildOutcome,
    calls: AtomicUsize,
}

impl FakeBuildTool {
    pub fn passing() -> Self {
        Self::with(BuildOutcome::Pass)
    }

    pub fn failing_build(reason: impl Into<String>) -> Self {
        Self::with(BuildOutcome::BuildFails(reason.into()))
    }

    pub fn failing_tests(reason: impl Into<String>) -> Self {
        Self::with(BuildOutcome::TestsFail(reason.into()))
    }

    fn with(outcome: BuildOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildTool for FakeBuildTool {
    async fn build_and_test(&self) -> Result<BuildReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            BuildOutcome::Pass => Ok(BuildReport::default()),
            BuildOutcome::BuildFails(r) => Err(PipelineError::BuildFailure(r.clone())),
            BuildOutcome::TestsFail(r) => Err(PipelineError::TestFailure(r.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedAnalysisService
// ---------------------------------------------------------------------------

/// Answers polls from a script; once the script runs out, the last scripted
/// verdict repeats (or `Pending` if nothing was scripted).
#[derive(Debug)]
pub struct ScriptedAnalysisService {
    script: Mutex<VecDeque<QualityVerdict>>,
    last: Mutex<QualityVerdict>,
    submissions: Mutex<Vec<(String, String)>>,
    polls: AtomicUsize,
}

impl ScriptedAnalysisService {
    pub fn new(script: Vec<QualityVerdict>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(QualityVerdict::pending()),
            submissions: Mutex::new(Vec::new()),
            polls: AtomicUsize::new(0),
        }
    }

    /// `Pending` on every poll.
    pub fn never_decides() -> Self {
        Self::new(Vec::new())
    }

    /// `Pending` for `pending_polls` polls, then `verdict`.
    pub fn decides_after(pending_polls: usize, verdict: QualityVerdict) -> Self {
        let mut script = vec![QualityVerdict::pending(); pending_polls];
        script.push(verdict);
        Self::new(script)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// `(project_key, version)` pairs submitted so far.
    pub fn submissions(&self) -> Vec<(String, String)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisService for ScriptedAnalysisService {
    async fn submit_analysis(&self, project_key: &str, version: &str) -> Result<String> {
        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((project_key.to_string(), version.to_string()));
        Ok(format!("check-{}", submissions.len()))
    }

    async fn get_verdict(&self, _check_id: &str) -> Result<QualityVerdict> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(verdict) = next {
            *last = verdict;
        }
        Ok(last.clone())
    }
}

// ---------------------------------------------------------------------------
// FakeImageBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeImageBuilder {
    built: Mutex<Vec<ImageRef>>,
    retag: Option<String>,
}

impl FakeImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a different repository than requested (a misbehaving builder).
    pub fn retagging(repository: impl Into<String>) -> Self {
        Self {
            built: Mutex::new(Vec::new()),
            retag: Some(repository.into()),
        }
    }

    pub fn built(&self) -> Vec<ImageRef> {
        self.built.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageBuilder for FakeImageBuilder {
    async fn build_image(&self, image: &ImageRef) -> Result<ImageRef> {
        self.built.lock().unwrap().push(image.clone());
        Ok(match &self.retag {
            Some(repository) => ImageRef::new(repository.clone(), image.tag.clone()),
            None => image.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeScanner
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeScanner {
    findings: Vec<Finding>,
    scanned: Mutex<Vec<ImageRef>>,
}

impl FakeScanner {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn with_findings(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            scanned: Mutex::new(Vec::new()),
        }
    }

    pub fn scanned(&self) -> Vec<ImageRef> {
        self.scanned.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scanner for FakeScanner {
    async fn scan(&self, image: &ImageRef, threshold: Severity) -> Result<ScanReport> {
        self.scanned.lock().unwrap().push(image.clone());
        Ok(ScanReport::filtered(threshold, self.findings.clone()))
    }
}

// ---------------------------------------------------------------------------
// FakeRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeRegistry {
    pushed: Mutex<Vec<(ImageRef, String)>>,
    reject: Option<String>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            pushed: Mutex::new(Vec::new()),
            reject: Some(reason.into()),
        }
    }

    /// Pushed images with the username they were pushed as.
    pub fn pushed(&self) -> Vec<(ImageRef, String)> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn push(&self, image: &ImageRef, credentials: &Credentials) -> Result<()> {
        if let Some(reason) = &self.reject {
            return Err(PipelineError::PushFailure(reason.clone()));
        }
        self.pushed
            .lock()
            .unwrap()
            .push((image.clone(), credentials.username.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryConfigStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    files: HashMap<String, String>,
    head: u64,
    messages: Vec<String>,
    /// Concurrent writes that land right after the next read of a path.
    races: HashMap<String, String>,
    /// When set, reads and commits must present this username.
    required_user: Option<String>,
}

/// In-memory config store with a monotonically increasing head revision.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    state: Mutex<StoreState>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(path: &str, content: &str) -> Self {
        let store = Self::new();
        store
            .state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
        store
    }

    /// Reject reads and commits that do not carry credentials for `username`,
    /// like a private remote.
    pub fn requiring_credentials(self, username: &str) -> Self {
        self.state.lock().unwrap().required_user = Some(username.to_string());
        self
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn head(&self) -> StoreRevision {
        revision_name(self.state.lock().unwrap().head)
    }

    /// Commit messages in order.
    pub fn messages(&self) -> Vec<String> {
        self.state.lock().unwrap().messages.clone()
    }

    /// Simulate a concurrent writer landing a change on the remote.
    pub fn advance_remote(&self, path: &str, content: &str) {
        Self::land_concurrent(&mut self.state.lock().unwrap(), path, content);
    }

    /// Land a concurrent change right after the next `read_config(path)`,
    /// so the reader's base is already stale when it commits.
    pub fn advance_after_next_read(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .races
            .insert(path.to_string(), content.to_string());
    }

    fn authorize(state: &StoreState, credentials: Option<&Credentials>) -> Result<()> {
        match (&state.required_user, credentials) {
            (None, _) => Ok(()),
            (Some(user), Some(creds)) if &creds.username == user => Ok(()),
            (Some(user), _) => Err(PipelineError::Collaborator(format!(
                "authentication required for {user}"
            ))),
        }
    }

    fn land_concurrent(state: &mut StoreState, path: &str, content: &str) {
        state.files.insert(path.to_string(), content.to_string());
        state.head += 1;
        state.messages.push(format!("concurrent change to {path}"));
    }
}

fn revision_name(head: u64) -> StoreRevision {
    StoreRevision(format!("rev-{head}"))
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn read_config(
        &self,
        path: &str,
        credentials: Option<&Credentials>,
    ) -> Result<ConfigDocument> {
        let mut state = self.state.lock().unwrap();
        Self::authorize(&state, credentials)?;
        let content = state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::ConfigField(format!("{path} not found in store")))?;
        let doc = ConfigDocument {
            path: path.to_string(),
            content,
            base: revision_name(state.head),
        };
        if let Some(concurrent) = state.races.remove(path) {
            Self::land_concurrent(&mut state, path, &concurrent);
        }
        Ok(doc)
    }

    async fn commit(
        &self,
        path: &str,
        base: &StoreRevision,
        content: &str,
        message: &str,
        credentials: Option<&Credentials>,
    ) -> Result<StoreRevision> {
        let mut state = self.state.lock().unwrap();
        Self::authorize(&state, credentials)?;
        let head = revision_name(state.head);
        if &head != base {
            return Err(PipelineError::Conflict {
                path: path.to_string(),
                expected: base.to_string(),
                actual: head.to_string(),
            });
        }
        state.files.insert(path.to_string(), content.to_string());
        state.head += 1;
        state.messages.push(message.to_string());
        Ok(revision_name(state.head))
    }
}

// ---------------------------------------------------------------------------
// StaticCredentialProvider
// ---------------------------------------------------------------------------

/// Hands out fixed credentials and counts acquire/release pairs.
#[derive(Debug)]
pub struct StaticCredentialProvider {
    credentials: Option<Credentials>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl StaticCredentialProvider {
    pub fn new(username: &str, secret: &str) -> Self {
        Self {
            credentials: Some(Credentials::new(username, secret)),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            credentials: None,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn fetch(&self, scope: &str) -> Result<Credentials> {
        let credentials = self
            .credentials
            .clone()
            .ok_or_else(|| PipelineError::Credentials(format!("no credentials for {scope}")))?;
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(credentials)
    }

    fn release(&self, _scope: &str) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Records every notification; optionally fails each one after recording it.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    successes: Mutex<Vec<PipelineRun>>,
    failures: Mutex<Vec<PipelineRun>>,
    broken: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn successes(&self) -> Vec<PipelineRun> {
        self.successes.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<PipelineRun> {
        self.failures.lock().unwrap().clone()
    }

    fn outcome(&self) -> Result<()> {
        if self.broken {
            Err(PipelineError::Collaborator("notification channel down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RunNotifier for RecordingNotifier {
    async fn on_success(&self, run: &PipelineRun) -> Result<()> {
        self.successes.lock().unwrap().push(run.clone());
        self.outcome()
    }

    async fn on_failure(&self, run: &PipelineRun) -> Result<()> {
        self.failures.lock().unwrap().push(run.clone());
        self.outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_service_repeats_last_verdict() {
        let service = ScriptedAnalysisService::decides_after(1, QualityVerdict::passed());
        assert_eq!(service.get_verdict("c").await.unwrap().status, VerdictStatus::Pending);
        assert_eq!(service.get_verdict("c").await.unwrap().status, VerdictStatus::Passed);
        assert_eq!(service.get_verdict("c").await.unwrap().status, VerdictStatus::Passed);
        assert_eq!(service.polls(), 3);
    }

    #[tokio::test]
    async fn test_memory_store_detects_advanced_remote() {
        let store = MemoryConfigStore::with_file("values.yaml", "a: 1\n");
        let doc = store.read_config("values.yaml", None).await.unwrap();
        store.advance_remote("values.yaml", "a: 2\n");

        let err = store
            .commit("values.yaml", &doc.base, "a: 3\n", "msg", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conflict { .. }));
        assert_eq!(store.content("values.yaml").unwrap(), "a: 2\n");
    }

    #[tokio::test]
    async fn test_memory_store_commit_advances_head() {
        let store = MemoryConfigStore::with_file("values.yaml", "a: 1\n");
        let doc = store.read_config("values.yaml", None).await.unwrap();
        let rev = store
            .commit("values.yaml", &doc.base, "a: 2\n", "bump", None)
            .await
            .unwrap();
        assert_eq!(rev, store.head());
        assert_ne!(rev, doc.base);
        assert_eq!(store.messages(), vec!["bump".to_string()]);
    }

    #[tokio::test]
    async fn test_private_store_rejects_anonymous_reads() {
        let store = MemoryConfigStore::with_file("values.yaml", "a: 1\n").requiring_credentials("ci-bot");
        let creds = Credentials::new("ci-bot", "token");

        assert!(store.read_config("values.yaml", None).await.is_err());
        let doc = store.read_config("values.yaml", Some(&creds)).await.unwrap();
        assert_eq!(doc.content, "a: 1\n");
    }
}
