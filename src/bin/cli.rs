//! CLI binary for tire-assist.

use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tire_assist::assistant::{ConsoleSynthesizer, FaqBook, IntentResponder, ResponseDispatcher};
use tire_assist::audio::CpalCapture;
use tire_assist::pipeline::messages::{ResponseMessage, Utterance};
use tire_assist::replay::{Scenario, run_scenario};
use tire_assist::{AssistConfig, ProcedureEvent, preflight_check};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Upper bound on speaking the queued answers before `ask` exits.
const ANSWER_TIMEOUT: Duration = Duration::from_secs(30);

/// Tire Assist: guided tire change with voice Q&A.
#[derive(Parser)]
#[command(name = "tire-assist", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "TIRE_ASSIST_CONFIG")]
    config: Option<PathBuf>,

    /// Write daily-rotated logs to this directory instead of stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify configuration, model files, and the FAQ.
    Check,

    /// Drive the procedure from a scripted observation sequence.
    Replay {
        /// Scenario JSON file.
        #[arg(required_unless_present = "happy_path")]
        scenario: Option<PathBuf>,

        /// Replay the shortest successful run for the current config.
        #[arg(long, conflicts_with = "scenario")]
        happy_path: bool,

        /// Tick interval for `--happy-path`, in milliseconds.
        #[arg(long, default_value_t = 100)]
        tick_ms: u64,

        /// Print every status line, not just events.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Ask the FAQ a question. Reads questions from stdin when none is given.
    Ask {
        question: Vec<String>,
    },

    /// List available audio input devices.
    Devices,

    /// Capture from the configured microphone and print block levels.
    Listen {
        /// How long to listen, in seconds.
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..=3600))]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());

    let config = match cli.config {
        Some(ref path) => AssistConfig::from_file(path)?,
        None => {
            let path = AssistConfig::default_config_path();
            if path.exists() {
                AssistConfig::from_file(&path)?
            } else {
                AssistConfig::default()
            }
        }
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    match cli.command {
        Command::Check => run_check(&config),
        Command::Replay {
            scenario,
            happy_path,
            tick_ms,
            verbose,
        } => {
            let scenario = match scenario {
                Some(path) if !happy_path => Scenario::from_file(&path)?,
                _ => Scenario::happy_path(&config, tick_ms),
            };
            run_replay(&config, &scenario, verbose)
        }
        Command::Ask { question } => run_ask(&config, question, cancel).await,
        Command::Devices => list_devices(),
        Command::Listen { seconds } => listen(&config, Duration::from_secs(seconds), &cancel),
    }
}

/// Log to stderr, or to a daily file when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tire_assist=info,cpal=warn"));
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tire-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

fn run_check(config: &AssistConfig) -> anyhow::Result<()> {
    let report = preflight_check(config)?;
    println!(
        "Action model: {} ({} classes, {}px)",
        report.action_model.model_id, report.action_model.num_classes, report.action_model.resolution
    );
    println!("Steps: {}", config.action.steps.len());
    for step in &report.unknown_steps {
        println!("  ! '{step}' is not a model class");
    }
    match report.faq {
        Some(faq) => println!("FAQ entries: {}", faq.len()),
        None => println!("Voice assistant disabled"),
    }
    println!("OK");
    Ok(())
}

fn run_replay(config: &AssistConfig, scenario: &Scenario, verbose: bool) -> anyhow::Result<()> {
    config.validate()?;
    println!(
        "Replaying {} ticks at {} ms",
        scenario.len(),
        scenario.tick_ms
    );

    let report = run_scenario(config, scenario, |tick, outcome| {
        if verbose {
            for line in &outcome.status_lines {
                println!("[{tick:>5}] {line}");
            }
        }
        for event in &outcome.events {
            println!("[{tick:>5}] {}", describe(event));
        }
    })?;

    println!(
        "\nFinished after {} ticks in {} ({} transitions){}",
        report.ticks,
        report.final_state,
        report.transitions(),
        if report.completed { ": procedure complete" } else { "" }
    );
    Ok(())
}

fn describe(event: &ProcedureEvent) -> String {
    match event {
        ProcedureEvent::StateChanged { from, to } => format!("{from} -> {to}"),
        ProcedureEvent::TargetConfirmed { label } => format!("target confirmed: {label}"),
        ProcedureEvent::ItemConfirmed { label } => format!("item confirmed: {label}"),
        ProcedureEvent::StepCompleted { index, label } => {
            format!("step {} complete: {label}", index + 1)
        }
        ProcedureEvent::ProcedureCompleted => "all steps complete".to_owned(),
        ProcedureEvent::ClassifierResetRequested { reason } => {
            format!("classifier reset ({reason:?})")
        }
    }
}

async fn run_ask(
    config: &AssistConfig,
    question: Vec<String>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let faq = FaqBook::from_file(&config.assistant.faq_path)?;
    let mut responder = IntentResponder::keyword(faq, config.assistant.fallback_answer.clone());
    let dispatcher = ResponseDispatcher::spawn(
        Arc::new(ConsoleSynthesizer),
        config.assistant.dispatch_poll_timeout(),
    )?;

    if question.is_empty() {
        dispatcher.say(ResponseMessage::greeting(config.assistant.greeting.clone()))?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                () = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(text) = line else { break };
            if text.trim().is_empty() {
                continue;
            }
            let reply = responder.respond(Utterance {
                text,
                recognized_at: Instant::now(),
            })?;
            dispatcher.say(ResponseMessage::answer(reply.answer))?;
        }
    } else {
        let reply = responder.respond(Utterance {
            text: question.join(" "),
            recognized_at: Instant::now(),
        })?;
        dispatcher.say(ResponseMessage::answer(reply.answer))?;
    }

    if !dispatcher.finish(ANSWER_TIMEOUT) {
        anyhow::bail!("speech output did not finish within {ANSWER_TIMEOUT:?}");
    }
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in CpalCapture::list_input_devices()? {
        println!("  - {name}");
    }
    Ok(())
}

fn listen(
    config: &AssistConfig,
    duration: Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let _capture = CpalCapture::new(&config.audio)?.start(tx)?;
    println!("Listening for {}s...", duration.as_secs());

    let deadline = Instant::now() + duration;
    let mut blocks = 0_u64;
    while !cancel.is_cancelled() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match rx.recv_timeout(remaining.min(config.audio.poll_timeout())) {
            Ok(chunk) => {
                blocks += 1;
                println!(
                    "{blocks:>5}  {} samples  level {:.4}",
                    chunk.samples.len(),
                    rms(&chunk.samples)
                );
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => anyhow::bail!("audio capture ended"),
        }
    }
    println!("{blocks} blocks captured");
    Ok(())
}

/// Root mean square of 16-bit samples, scaled to 0..1.
fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let v = f64::from(s) / f64::from(i16::MAX);
            v * v
        })
        .sum();
    (sum / samples.len() as f64).sqrt()
}
