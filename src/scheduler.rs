//! Fixed-period driver for the aggregation cycle.
//!
//! Runs one cycle immediately, then one per period, until the cancellation
//! token fires. Cycles run inline on the loop, so a slow cycle delays the
//! next tick instead of overlapping it; ticks missed meanwhile are skipped.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub failures: u64,
}

/// Drive `cycle` every `period` until `cancel` fires.
///
/// A failed cycle is logged and the loop carries on. Cancellation is
/// observed between cycles; an in-flight cycle sees it through its own
/// clone of the token.
///
/// # Panics
///
/// Panics if `period` is zero (as [`tokio::time::interval`] does). The CLI
/// rejects a zero period before getting here.
pub async fn run<F, Fut, T, E>(
    period: Duration,
    cancel: CancellationToken,
    mut cycle: F,
) -> SchedulerStats
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stats = SchedulerStats::default();

    tracing::info!(period = ?period, "Collecting feeds");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::info!(
                    cycles = stats.cycles,
                    failures = stats.failures,
                    "Scheduler stopped"
                );
                break;
            }

            _ = ticker.tick() => {
                stats.cycles += 1;
                if let Err(e) = cycle().await {
                    stats.failures += 1;
                    tracing::error!(error = %e, cycle = stats.cycles, "Encountered an error scraping feeds");
                }
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_period() {
        let cancel = CancellationToken::new();
        let count = Cell::new(0u32);

        let stopper = {
            let cancel = cancel.clone();
            async move {
                // Cycles at t=0, 60, 120
                tokio::time::sleep(Duration::from_secs(150)).await;
                cancel.cancel();
            }
        };

        let (stats, ()) = tokio::join!(
            run(Duration::from_secs(60), cancel.clone(), || {
                count.set(count.get() + 1);
                async { Ok::<_, String>(()) }
            }),
            stopper
        );

        assert_eq!(count.get(), 3);
        assert_eq!(stats, SchedulerStats { cycles: 3, failures: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let cancel = CancellationToken::new();
        let count = Cell::new(0u32);

        let stopper = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(45)).await;
                cancel.cancel();
            }
        };

        // Cycles at t=0, 10, 20, 30, 40; every odd-numbered one fails
        let (stats, ()) = tokio::join!(
            run(Duration::from_secs(10), cancel.clone(), || {
                let n = count.get() + 1;
                count.set(n);
                async move {
                    if n % 2 == 1 {
                        Err(format!("cycle {} failed", n))
                    } else {
                        Ok(())
                    }
                }
            }),
            stopper
        );

        assert_eq!(stats, SchedulerStats { cycles: 5, failures: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = run(Duration::from_secs(1), cancel, || async {
            Ok::<_, String>(())
        })
        .await;

        assert_eq!(stats, SchedulerStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_never_overlaps() {
        let cancel = CancellationToken::new();
        let running = Cell::new(false);
        let overlapped = Cell::new(false);
        let count = Cell::new(0u32);

        let stopper = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(100)).await;
                cancel.cancel();
            }
        };

        let (stats, ()) = tokio::join!(
            run(Duration::from_secs(10), cancel.clone(), || {
                let running = &running;
                let overlapped = &overlapped;
                count.set(count.get() + 1);
                async move {
                    if running.replace(true) {
                        overlapped.set(true);
                    }
                    // Three periods long
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    running.set(false);
                    Ok::<_, String>(())
                }
            }),
            stopper
        );

        assert!(!overlapped.get());
        // Each cycle takes 30s and missed ticks are skipped
        assert!(stats.cycles >= 3 && stats.cycles <= 4, "cycles = {}", stats.cycles);
    }
}
