//! The polling loop behind `wallpoll run`.

use std::time::Duration;

use tracing::{error, info};

use crate::cycle::{CycleContext, CycleOutcome, run_cycle};
use crate::io::desktop::WallpaperSetter;
use crate::io::http::Fetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOptions {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Stop after this many cycles. `None` polls forever.
    pub max_cycles: Option<u32>,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopOutcome {
    pub cycles: u32,
    /// Cycles that applied a new wallpaper.
    pub updated: u32,
    /// Cycles that ended in an error.
    pub failed: u32,
}

/// Run cycles until `max_cycles` is reached.
///
/// A failed cycle is logged and the loop carries on at the next tick; there is
/// no backoff. `sleep` is called between cycles but not after the last one.
pub fn run_loop<S, F>(
    ctx: &CycleContext,
    fetcher: &dyn Fetcher,
    setter: &dyn WallpaperSetter,
    options: &LoopOptions,
    mut sleep: S,
    mut on_cycle: F,
) -> LoopOutcome
where
    S: FnMut(Duration),
    F: FnMut(&anyhow::Result<CycleOutcome>),
{
    info!(
        interval_secs = options.interval.as_secs(),
        max_cycles = ?options.max_cycles,
        "service started"
    );
    let mut outcome = LoopOutcome::default();
    let limit_reached = |cycles: u32| options.max_cycles.is_some_and(|max| cycles >= max);
    if limit_reached(0) {
        info!("cycle limit is zero, nothing to do");
        return outcome;
    }
    loop {
        let result = run_cycle(ctx, fetcher, setter);
        outcome.cycles += 1;
        match &result {
            Ok(CycleOutcome::Updated { .. }) => outcome.updated += 1,
            Ok(_) => {}
            Err(err) => {
                outcome.failed += 1;
                error!(err = %format!("{err:#}"), "error checking for updates");
            }
        }
        on_cycle(&result);

        if limit_reached(outcome.cycles) {
            info!(
                cycles = outcome.cycles,
                updated = outcome.updated,
                failed = outcome.failed,
                "cycle limit reached"
            );
            return outcome;
        }
        sleep(options.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CompareMode;
    use crate::io::config::SourceConfig;
    use crate::test_support::{RecordingSetter, ScriptedFetcher};

    const META_URL: &str = "https://walls.test/metadata.txt";

    fn context(root: &std::path::Path) -> CycleContext {
        CycleContext {
            source: SourceConfig::Raw {
                base_url: "https://walls.test".to_string(),
                metadata_file: "metadata.txt".to_string(),
            },
            compare: CompareMode::Hash,
            cache_dir: root.to_path_buf(),
            state_path: root.join("state.json"),
        }
    }

    #[test]
    fn loop_sleeps_between_cycles_and_stops_at_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fetcher = ScriptedFetcher::new()
            .with_text(META_URL, "wallpaper: a.jpg\n")
            .with_file("https://walls.test/a.jpg", b"aaa");
        let setter = RecordingSetter::new();
        let mut sleeps = Vec::new();
        let mut labels = Vec::new();

        let outcome = run_loop(
            &context(temp.path()),
            &fetcher,
            &setter,
            &LoopOptions {
                interval: Duration::from_secs(30),
                max_cycles: Some(3),
            },
            |d| sleeps.push(d),
            |result| labels.push(result.as_ref().map(|o| o.label()).unwrap_or("error")),
        );

        assert_eq!(
            outcome,
            LoopOutcome {
                cycles: 3,
                updated: 1,
                failed: 0
            }
        );
        assert_eq!(sleeps, vec![Duration::from_secs(30); 2]);
        assert_eq!(labels, vec!["updated", "unchanged", "unchanged"]);
        assert_eq!(fetcher.downloads().len(), 1);
    }

    #[test]
    fn zero_cycle_limit_runs_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fetcher = ScriptedFetcher::new()
            .with_text(META_URL, "wallpaper: a.jpg\n")
            .with_file("https://walls.test/a.jpg", b"aaa");
        let setter = RecordingSetter::new();
        let mut slept = false;

        let outcome = run_loop(
            &context(temp.path()),
            &fetcher,
            &setter,
            &LoopOptions {
                interval: Duration::from_secs(30),
                max_cycles: Some(0),
            },
            |_| slept = true,
            |_| {},
        );

        assert_eq!(outcome, LoopOutcome::default());
        assert!(!slept);
        assert!(fetcher.text_requests().is_empty());
        assert!(setter.applied().is_empty());
    }

    #[test]
    fn loop_keeps_going_after_failed_cycle() {
        let temp = tempfile::tempdir().expect("tempdir");
        let fetcher = ScriptedFetcher::new()
            .with_text(META_URL, "wallpaper: a.jpg\n")
            .with_file("https://walls.test/a.jpg", b"aaa");
        let setter = RecordingSetter::new();
        setter.set_failing(true);

        let outcome = run_loop(
            &context(temp.path()),
            &fetcher,
            &setter,
            &LoopOptions {
                interval: Duration::ZERO,
                max_cycles: Some(2),
            },
            |_| setter.set_failing(false),
            |_| {},
        );

        assert_eq!(
            outcome,
            LoopOutcome {
                cycles: 2,
                updated: 1,
                failed: 1
            }
        );
        assert_eq!(setter.applied().len(), 1);
    }
}
