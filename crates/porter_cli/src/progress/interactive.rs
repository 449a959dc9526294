use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use porter::{EntityKind, MigrationEvent};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Running counters shown next to a stage spinner.
#[derive(Default)]
struct StageCounts {
    created: usize,
    located: usize,
    skipped: usize,
    failed: usize,
}

impl StageCounts {
    fn summary(&self) -> String {
        format!(
            "{} created, {} found, {} skipped, {} failed",
            self.created, self.located, self.skipped, self.failed
        )
    }
}

struct StageBar {
    bar: ProgressBar,
    counts: StageCounts,
    fetched: usize,
}

/// Consolidated progress state to avoid multiple mutex locks.
#[derive(Default)]
struct ProgressState {
    stages: HashMap<EntityKind, StageBar>,
    /// Stage currently receiving events; page events carry no kind.
    current: Option<EntityKind>,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn add_stage_bar(&self, kind: EntityKind) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.set_prefix(format!("{:12}", kind.as_str()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn handle(&self, event: MigrationEvent) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            MigrationEvent::StageStarted { kind, existing } => {
                let bar = self.add_stage_bar(kind);
                bar.set_message(format!("{existing} already mapped, fetching..."));
                state.stages.insert(
                    kind,
                    StageBar {
                        bar,
                        counts: StageCounts::default(),
                        fetched: 0,
                    },
                );
                state.current = Some(kind);
            }

            MigrationEvent::StageSkipped { kind, reason } => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(Self::done_style());
                bar.set_prefix(format!("{:12}", kind.as_str()));
                bar.finish_with_message(format!("skipped ({reason})"));
            }

            MigrationEvent::FetchedPage {
                scope,
                page,
                total_so_far,
                ..
            } => {
                if let Some(kind) = state.current
                    && let Some(stage) = state.stages.get_mut(&kind)
                {
                    stage.fetched = total_so_far;
                    stage.bar.set_message(format!(
                        "{scope} page {page} ({total_so_far} fetched) | {}",
                        stage.counts.summary()
                    ));
                }
            }

            MigrationEvent::FetchFailed { scope, page, error } => {
                let _ = self
                    .multi
                    .println(format!("  ! {scope} page {page} failed: {error}"));
            }

            MigrationEvent::RecordSkipped { kind, .. } => {
                self.bump(&mut state, kind, |c| c.skipped += 1);
            }

            MigrationEvent::RecordCreated { kind, .. } => {
                self.bump(&mut state, kind, |c| c.created += 1);
            }

            MigrationEvent::RecordLocated { kind, .. } => {
                self.bump(&mut state, kind, |c| c.located += 1);
            }

            MigrationEvent::RecordFailed {
                kind,
                source_id,
                error,
            } => {
                self.bump(&mut state, kind, |c| c.failed += 1);
                let _ = self
                    .multi
                    .println(format!("  x {kind} {source_id}: {error}"));
            }

            MigrationEvent::RetryBackoff {
                kind,
                source_id,
                retry_after_ms,
                attempt,
                ..
            } => {
                if let Some(stage) = state.stages.get(&kind) {
                    stage.bar.set_message(format!(
                        "{source_id}: retry {attempt} in {retry_after_ms}ms | {}",
                        stage.counts.summary()
                    ));
                }
            }

            MigrationEvent::Warning { message, .. } => {
                let _ = self.multi.println(format!("  ~ {message}"));
            }

            MigrationEvent::Interrupted { kind } => {
                if let Some(stage) = state.stages.get(&kind) {
                    stage.bar.set_style(Self::done_style());
                    stage
                        .bar
                        .abandon_with_message(format!("interrupted | {}", stage.counts.summary()));
                }
            }

            MigrationEvent::StageFinished { kind, .. } => {
                if let Some(stage) = state.stages.get(&kind)
                    && !stage.bar.is_finished()
                {
                    stage.bar.set_style(Self::done_style());
                    stage.bar.finish_with_message(stage.counts.summary());
                }
                if state.current == Some(kind) {
                    state.current = None;
                }
            }

            _ => {}
        }
    }

    fn bump(&self, state: &mut ProgressState, kind: EntityKind, update: impl FnOnce(&mut StageCounts)) {
        if let Some(stage) = state.stages.get_mut(&kind) {
            update(&mut stage.counts);
            stage.bar.set_message(format!(
                "{} fetched | {}",
                stage.fetched,
                stage.counts.summary()
            ));
        }
    }

    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for stage in state.stages.values() {
            if !stage.bar.is_finished() {
                stage.bar.finish();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn done_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
