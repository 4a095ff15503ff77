//! Watch command
//!
//! The wait loop runs on a blocking thread; Ctrl-C closes the watch from the
//! async side, which cancels the pending wait.

use crate::settings;
use anyhow::{Context, Result};
use filewatch::resync::Baseline;
use filewatch::{Backend, Event, EventKind, FileEvents, FileWatch, PollBackend};
use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
enum Output {
    Text,
    Json,
}

pub async fn run(
    path: PathBuf,
    config_path: Option<PathBuf>,
    json: bool,
    count: Option<usize>,
    poll: bool,
) -> Result<()> {
    let (config, _) = settings::load(config_path)?;
    let output = if json { Output::Json } else { Output::Text };

    if poll {
        watch_with(FileEvents::with_backend(PollBackend::new(config)), &path, output, count).await
    } else {
        watch_with(FileEvents::new(config), &path, output, count).await
    }
}

async fn watch_with<B: Backend>(
    events: FileEvents<B>,
    path: &Path,
    output: Output,
    count: Option<usize>,
) -> Result<()> {
    let watch = Arc::new(events.start_watch(path)?);

    eprintln!(
        "{} {} {}",
        "Watching".green().bold(),
        watch.path().display(),
        format!("({})", events.backend().name()).dimmed()
    );

    let mut pump = {
        let watch = Arc::clone(&watch);
        tokio::task::spawn_blocking(move || pump(&watch, output, count))
    };

    let joined = tokio::select! {
        joined = &mut pump => joined,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, closing {}", watch.handle());
            if let Err(e) = watch.close() {
                debug!("Close after interrupt: {}", e);
            }
            pump.await
        }
    };

    let seen = joined.context("Watch loop panicked")??;
    debug!("Delivered {} events", seen);
    Ok(())
}

/// Print events until the watch ends or `count` is reached
fn pump<B: Backend>(watch: &FileWatch<B>, output: Output, count: Option<usize>) -> Result<usize> {
    let mut baseline = Baseline::new(watch.path());
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut seen = 0;

    for change in watch.events() {
        let event = change?;
        print_event(&mut out, &event, output)?;

        if event.is_overflow() {
            resync(&mut out, &mut baseline, output)?;
        }

        seen += 1;
        if count.is_some_and(|n| seen >= n) {
            break;
        }
    }

    Ok(seen)
}

fn print_event(out: &mut impl Write, event: &Event, output: Output) -> Result<()> {
    match output {
        Output::Json => writeln!(out, "{}", serde_json::to_string(event)?)?,
        Output::Text => {
            let kind = match event.kind {
                EventKind::Created => "created".green().to_string(),
                EventKind::Modified => "modified".yellow().to_string(),
                EventKind::Deleted => "deleted".red().to_string(),
                EventKind::Renamed => "renamed".cyan().to_string(),
                EventKind::Overflow => "overflow".magenta().bold().to_string(),
            };
            match &event.previous_path {
                Some(from) => writeln!(
                    out,
                    "{:>6} {} {} -> {}",
                    event.sequence.dimmed(),
                    kind,
                    from.display(),
                    event.path.display()
                )?,
                None => writeln!(
                    out,
                    "{:>6} {} {}",
                    event.sequence.dimmed(),
                    kind,
                    event.path.display()
                )?,
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Report files changed while events were being lost
fn resync(out: &mut impl Write, baseline: &mut Baseline, output: Output) -> Result<()> {
    let changed = baseline.scan()?;

    for path in &changed {
        match output {
            Output::Json => writeln!(
                out,
                "{}",
                serde_json::json!({ "kind": "resync", "path": path })
            )?,
            Output::Text => writeln!(out, "{:>6} {} {}", "", "resync".blue(), path.display())?,
        }
    }

    if let Output::Text = output {
        eprintln!("{} {} files changed since last sync", "Resynced".blue().bold(), changed.len());
    }
    out.flush()?;
    Ok(())
}
