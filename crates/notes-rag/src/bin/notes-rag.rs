//! Terminal chat over a folder of PDF study notes
//!
//! Run with: cargo run -p notes-rag --bin notes-rag -- --notes ./notes

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notes_rag::session::{spawn_worker, SetupReport, Transcript, WorkerEvent};
use notes_rag::types::ChatEntry;
use notes_rag::RagConfig;

#[derive(Debug, Parser)]
#[command(name = "notes-rag", version, about = "Chat with your PDF study notes")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "NOTES_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the PDF notes
    #[arg(short, long)]
    notes: Option<PathBuf>,

    /// Directory for the persisted index
    #[arg(short, long)]
    index: Option<PathBuf>,

    /// Number of chunks retrieved per question
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Show raw notes only, without Gemini
    #[arg(long)]
    no_llm: bool,
}

/// Setup state as seen by the interaction loop
enum Status {
    SettingUp,
    Ready,
    Failed(String),
}

enum Input {
    Line(Option<String>),
    Event(Option<WorkerEvent>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notes_rag=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let mut config = RagConfig::load(args.config.as_deref())?;
    if let Some(notes) = args.notes {
        config.notes.directory = notes;
    }
    if let Some(index) = args.index {
        config.vector_db.persist_dir = index;
    }
    if let Some(top_k) = args.top_k {
        config.retrieval.top_k = top_k;
    }
    if args.no_llm {
        config.llm.enabled = false;
    }
    config.validate()?;

    println!("{}", style("🎓 Study Notes Assistant").bold().cyan());
    println!("{}", style("Ask questions about your TSA study notes").dim());
    println!("{}", style("Commands: /clear  /sources  /quit").dim());
    println!();

    let mut spinner = new_spinner("Setting up...");
    let mut worker = spawn_worker(config);
    let mut lines = spawn_stdin_reader();
    let mut transcript = Transcript::new();
    let mut status = Status::SettingUp;
    let mut pending = 0usize;

    loop {
        let input = tokio::select! {
            line = lines.recv() => Input::Line(line),
            event = worker.next_event() => Input::Event(event),
        };

        match input {
            Input::Line(None) => break,
            Input::Line(Some(line)) => {
                let line = line.trim();
                match line {
                    "" => continue,
                    "/quit" | "/exit" => break,
                    "/clear" => {
                        transcript.clear();
                        println!("{}", style("Chat cleared.").dim());
                    }
                    "/sources" => match transcript.last_sources() {
                        Some(sources) if !sources.is_empty() => {
                            for (i, source) in sources.iter().enumerate() {
                                println!("  {}", style(source.format_numbered(i + 1)).dim());
                            }
                        }
                        _ => println!("{}", style("No sources yet.").dim()),
                    },
                    question => match &status {
                        Status::Ready => {
                            worker.ask(question)?;
                            pending += 1;
                            if pending == 1 {
                                spinner = new_spinner("Thinking...");
                            }
                        }
                        Status::SettingUp => {
                            spinner.suspend(|| {
                                println!(
                                    "{}",
                                    style("System not ready yet. Please wait for setup to finish.")
                                        .yellow()
                                )
                            });
                        }
                        Status::Failed(e) => {
                            println!("{}", style(format!("System not ready. Setup failed: {}", e)).red());
                        }
                    },
                }
            }
            Input::Event(None) => {
                spinner.finish_and_clear();
                println!("{}", style("Worker stopped.").red());
                break;
            }
            Input::Event(Some(event)) => {
                event.apply_to(&mut transcript);
                match event {
                    WorkerEvent::Progress { message, .. } => spinner.set_message(message),
                    WorkerEvent::Ready(report) => {
                        spinner.finish_and_clear();
                        print_report(&report);
                        println!("{}", style("System ready! Start chatting below.").green());
                        status = Status::Ready;
                    }
                    WorkerEvent::SetupFailed(e) => {
                        spinner.finish_and_clear();
                        println!("{}", style(format!("Setup failed: {}", e)).red().bold());
                        status = Status::Failed(e);
                    }
                    WorkerEvent::Answered { .. } => {
                        pending = pending.saturating_sub(1);
                        if pending == 0 {
                            spinner.finish_and_clear();
                        }
                        if let Some(reply) = transcript.entries().last() {
                            spinner.suspend(|| print_reply(reply));
                        }
                    }
                }
            }
        }
    }

    spinner.finish_and_clear();
    worker.shutdown().await;
    Ok(())
}

fn new_spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message);
    spinner
}

/// Forward stdin lines from a blocking thread
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

fn print_report(report: &SetupReport) {
    println!(
        "{} Loaded {} files ({} pages), {} chunks indexed in {}ms",
        style("✓").green(),
        report.files.len(),
        report.pages,
        report.indexed,
        report.elapsed_ms
    );
    for failure in &report.failures {
        println!("  {} {}: {}", style("skipped").yellow(), failure.filename, failure.error);
    }
    match (&report.llm_model, &report.llm_error) {
        (Some(model), _) => println!("  AI answers: {}", model),
        (None, Some(e)) => println!("  {} AI answers unavailable: {}", style("!").yellow(), e),
        (None, None) => println!("  AI answers disabled, showing raw notes"),
    }
}

fn print_reply(entry: &ChatEntry) {
    let content = if entry.is_error {
        style(entry.content.clone()).red()
    } else {
        style(entry.content.clone())
    };
    println!("\n{} {}", style("AI:").bold().blue(), content);
    if !entry.sources.is_empty() {
        println!("{}", style("Sources:").dim());
        for (i, source) in entry.sources.iter().enumerate() {
            println!("  {}", style(source.format_numbered(i + 1)).dim());
        }
    }
    println!();
}
