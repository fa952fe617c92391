//! Per-stage progress with CI fallback

use super::context::UiContext;
use crate::pipeline::{Stage, StageObserver, StageStatus};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Shows one spinner per running stage.
///
/// Stages may run concurrently, so interactive mode stacks indicatif bars in
/// a [`MultiProgress`]. In CI every transition is a plain line.
pub struct StageProgress {
    multi: Option<MultiProgress>,
    bars: Mutex<HashMap<Stage, ProgressBar>>,
}

impl StageProgress {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            multi: ctx.use_fancy_output().then(MultiProgress::new),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("  {spinner:.red} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
    }

    fn done_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl StageObserver for StageProgress {
    fn stage_started(&self, stage: Stage) {
        let Some(ref multi) = self.multi else {
            println!("{} {}", style("...").dim(), stage.activity());
            return;
        };
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(Self::spinner_style());
        bar.set_message(stage.activity());
        bar.enable_steady_tick(Duration::from_millis(120));
        self.bars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(stage, bar);
    }

    fn stage_finished(&self, stage: Stage, status: StageStatus) {
        let Some(ref multi) = self.multi else {
            println!("{}", plain_line(stage, status));
            return;
        };
        let line = fancy_line(stage, status);
        let bar = self
            .bars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&stage);
        match bar {
            Some(bar) => {
                bar.set_style(Self::done_style());
                bar.finish_with_message(line);
            }
            // Skipped without starting
            None => {
                multi.println(format!("  {}", line)).ok();
            }
        }
    }

    fn stage_cancelled(&self, stage: Stage) {
        if self.multi.is_none() {
            println!("{} {} (cancelled)", style("[STOP]").dim(), stage);
            return;
        }
        let bar = self
            .bars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&stage);
        if let Some(bar) = bar {
            bar.set_style(Self::done_style());
            bar.abandon_with_message(format!(
                "{} {} {}",
                style("-").dim(),
                stage.activity(),
                style("(cancelled)").dim()
            ));
        }
    }
}

fn fancy_line(stage: Stage, status: StageStatus) -> String {
    match status {
        StageStatus::Executed => format!("{} {}", style("✓").green(), stage.activity()),
        StageStatus::SkippedCached => format!(
            "{} {} {}",
            style("↷").dim(),
            stage.activity(),
            style("(cached)").dim()
        ),
        StageStatus::Failed => format!("{} {}", style("✗").red(), stage.activity()),
    }
}

fn plain_line(stage: Stage, status: StageStatus) -> String {
    match status {
        StageStatus::Executed => format!("{} {}", style("[OK]").green(), stage),
        StageStatus::SkippedCached => format!("{} {} (cached)", style("[SKIP]").dim(), stage),
        StageStatus::Failed => format!("{} {}", style("[FAIL]").red(), stage),
    }
}
