//! Lading Pipeline - fail-fast stage sequencing
//!
//! Provides:
//! - `StageRunner`: runs one stage, turning errors, panics, timeouts and
//!   cancellation into a `StageResult`
//! - `GatePoller`: bounded, cancellable quality-gate polling
//! - `PipelineSequencer` / `run_pipeline`: strict-order execution with
//!   skip-on-failure and a single notification per run
//! - `StateMutator`: single-field image-tag commits to the config store
//! - `standard_stages`: build, quality-gate, scan, push, deploy

pub mod mutator;
pub mod poller;
pub mod runner;
pub mod sequencer;
pub mod stage;
pub mod stages;
pub mod yaml;

pub use mutator::{StateMutator, DEFAULT_TAG_FIELD};
pub use poller::GatePoller;
pub use runner::StageRunner;
pub use sequencer::{run_pipeline, PipelineSequencer};
pub use stage::{Stage, StageAction};
pub use stages::{
    standard_stages, Collaborators, GateSettings, PipelineSettings, BUILD_STAGE,
    CONFIG_STORE_SCOPE, DEPLOY_STAGE, PUSH_STAGE, QUALITY_GATE_STAGE, REGISTRY_SCOPE, SCAN_STAGE,
};
