//! Background worker for the terminal shell
//!
//! The worker runs setup once and then answers questions one at a time.
//! Results travel back as [`WorkerEvent`]s; the receiver owns the
//! transcript and applies each `Answered` event with
//! [`WorkerEvent::apply_to`].

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::context::{setup_pipeline, SetupReport, SetupStage};
use super::transcript::Transcript;
use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::types::Answer;

/// Requests sent to the worker
#[derive(Debug)]
pub enum WorkerCommand {
    /// Answer a question
    Ask(String),
    /// Stop after the current task
    Shutdown,
}

/// Notifications sent back by the worker
#[derive(Debug)]
pub enum WorkerEvent {
    /// A setup stage started
    Progress { stage: SetupStage, message: String },
    /// Setup finished; questions can be asked
    Ready(SetupReport),
    /// Setup failed; every question will be answered with `NotReady`
    SetupFailed(String),
    /// A question finished
    Answered { question: String, outcome: Result<Answer> },
}

impl WorkerEvent {
    /// Apply the event's transcript mutation, if it has one
    pub fn apply_to(&self, transcript: &mut Transcript) -> bool {
        match self {
            WorkerEvent::Answered { question, outcome } => {
                transcript.record(question, outcome);
                true
            }
            _ => false,
        }
    }
}

/// Channels to a running worker
pub struct WorkerHandle {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Queue a question
    pub fn ask(&self, question: impl Into<String>) -> Result<()> {
        self.commands
            .send(WorkerCommand::Ask(question.into()))
            .map_err(|_| Error::internal("worker has stopped"))
    }

    /// Wait for the next event; `None` once the worker has exited
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Stop the worker and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::warn!("Worker exited abnormally: {}", e);
        }
    }
}

/// Spawn a worker that sets up the pipeline from `config`
pub fn spawn_worker(config: RagConfig) -> WorkerHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(run_worker(config, commands_rx, events_tx));

    WorkerHandle {
        commands: commands_tx,
        events: events_rx,
        task,
    }
}

async fn run_worker(
    config: RagConfig,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let progress_tx = events.clone();
    let progress = move |stage: SetupStage, message: &str| {
        let _ = progress_tx.send(WorkerEvent::Progress {
            stage,
            message: message.to_string(),
        });
    };

    let generator = match setup_pipeline(&config, &progress).await {
        Ok((generator, report)) => {
            let _ = events.send(WorkerEvent::Ready(report));
            Some(generator)
        }
        Err(e) => {
            tracing::error!("Setup failed: {}", e);
            let _ = events.send(WorkerEvent::SetupFailed(e.to_string()));
            None
        }
    };

    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Ask(question) => {
                let outcome = match &generator {
                    Some(generator) => generator.answer(&question).await,
                    None => Err(Error::NotReady),
                };
                if events.send(WorkerEvent::Answered { question, outcome }).is_err() {
                    break;
                }
            }
            WorkerCommand::Shutdown => break,
        }
    }

    tracing::debug!("Worker stopped");
}
