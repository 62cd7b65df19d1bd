//! Session state shared by the web and terminal shells
//!
//! [`SessionContext`] owns the transcript together with the index and
//! generator handles. The terminal shell splits that ownership: a
//! [`worker`] task holds the generator while the interaction loop keeps the
//! [`Transcript`] and applies one mutation per [`WorkerEvent`].

mod context;
mod transcript;
pub mod worker;

pub use context::{setup_pipeline, Exchange, SessionContext, SetupReport, SetupStage};
pub use transcript::Transcript;
pub use worker::{spawn_worker, WorkerCommand, WorkerEvent, WorkerHandle};
