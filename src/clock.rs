use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use tracing::info;

use crate::constants::CLOCK_TICK_MS;
use crate::types::{EndReason, SessionEvent};

/// Shared time budget of the running hall. Only the countdown loop
/// decrements it; pickups and hall transitions adjust it atomically with
/// respect to the decrement step.
#[derive(Debug)]
pub struct Countdown {
    remaining: AtomicI64,
    total: AtomicI64,
}

impl Countdown {
    pub fn new(total_secs: i64) -> Self {
        Self {
            remaining: AtomicI64::new(total_secs),
            total: AtomicI64::new(total_secs),
        }
    }

    pub fn remaining_secs(&self) -> i64 {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn total_secs(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn percent_remaining(&self) -> f64 {
        let total = self.total_secs();
        if total <= 0 {
            return 0.0;
        }
        self.remaining_secs() as f64 / total as f64 * 100.0
    }

    pub fn add_secs(&self, delta: i64) {
        self.remaining.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set_remaining(&self, secs: i64) {
        self.remaining.store(secs, Ordering::SeqCst);
    }

    /// New budget for the next hall; the running loop picks it up on its
    /// next iteration.
    pub fn reset(&self, total_secs: i64) {
        self.total.store(total_secs, Ordering::SeqCst);
        self.remaining.store(total_secs, Ordering::SeqCst);
    }

    fn decrement(&self) {
        self.remaining.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The ticking loop. Parks while the session is frozen, emits one
/// `ClockTick` per second of play, and fires the terminal notification
/// exactly once when the budget reaches zero.
pub(crate) async fn run_countdown(
    clock: Arc<Countdown>,
    mut paused: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
    events: broadcast::Sender<SessionEvent>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        while *paused.borrow_and_update() {
            tokio::select! {
                changed = paused.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = shutdown.changed() => return,
            }
        }

        let remaining = clock.remaining_secs();
        if remaining <= 0 {
            info!("time is up");
            let _ = events.send(SessionEvent::GameOver {
                reason: EndReason::TimeExpired,
            });
            return;
        }
        let _ = events.send(SessionEvent::ClockTick { remaining });

        tokio::select! {
            _ = sleep(Duration::from_millis(CLOCK_TICK_MS)) => {}
            _ = shutdown.changed() => return,
        }
        clock.decrement();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> (
        watch::Sender<bool>,
        watch::Receiver<bool>,
        watch::Sender<bool>,
        watch::Receiver<bool>,
        broadcast::Sender<SessionEvent>,
        broadcast::Receiver<SessionEvent>,
    ) {
        let (paused_tx, paused_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = broadcast::channel(256);
        (
            paused_tx,
            paused_rx,
            shutdown_tx,
            shutdown_rx,
            events_tx,
            events_rx,
        )
    }

    #[test]
    fn adjustments_apply_relative_to_the_budget() {
        let clock = Countdown::new(10);
        clock.add_secs(5);
        assert_eq!(clock.remaining_secs(), 15);
        clock.set_remaining(3);
        assert_eq!(clock.remaining_secs(), 3);
        assert_eq!(clock.total_secs(), 10);
        clock.reset(45);
        assert_eq!(clock.remaining_secs(), 45);
        assert_eq!(clock.total_secs(), 45);
    }

    #[test]
    fn percent_remaining_tracks_the_fraction() {
        let clock = Countdown::new(50);
        clock.set_remaining(5);
        assert!((clock.percent_remaining() - 10.0).abs() < f64::EPSILON);
        clock.set_remaining(40);
        assert!((clock.percent_remaining() - 80.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_and_fires_the_terminal_notification_once() {
        let (_paused_tx, paused_rx, _shutdown_tx, shutdown_rx, events_tx, mut events_rx) =
            channels();
        let clock = Arc::new(Countdown::new(3));
        let task = tokio::spawn(run_countdown(
            Arc::clone(&clock),
            paused_rx,
            shutdown_rx,
            events_tx,
        ));

        let mut ticks = Vec::new();
        let mut game_overs = 0;
        loop {
            match events_rx.recv().await.unwrap() {
                SessionEvent::ClockTick { remaining } => ticks.push(remaining),
                SessionEvent::GameOver { reason } => {
                    assert_eq!(reason, EndReason::TimeExpired);
                    game_overs += 1;
                    break;
                }
                _ => {}
            }
        }
        task.await.unwrap();
        assert_eq!(ticks, vec![3, 2, 1]);
        assert_eq!(game_overs, 1);
        assert_eq!(clock.remaining_secs(), 0);
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn frozen_clock_does_not_decrement() {
        let (paused_tx, paused_rx, _shutdown_tx, shutdown_rx, events_tx, mut events_rx) =
            channels();
        paused_tx.send(true).unwrap();
        let clock = Arc::new(Countdown::new(30));
        tokio::spawn(run_countdown(
            Arc::clone(&clock),
            paused_rx,
            shutdown_rx,
            events_tx,
        ));

        sleep(Duration::from_secs(10)).await;
        assert_eq!(clock.remaining_secs(), 30);
        assert!(events_rx.try_recv().is_err());

        paused_tx.send(false).unwrap();
        let event = events_rx.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::ClockTick { remaining: 30 }));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_loop_without_a_terminal_event() {
        let (_paused_tx, paused_rx, shutdown_tx, shutdown_rx, events_tx, mut events_rx) =
            channels();
        let clock = Arc::new(Countdown::new(100));
        let task = tokio::spawn(run_countdown(
            Arc::clone(&clock),
            paused_rx,
            shutdown_rx,
            events_tx,
        ));

        sleep(Duration::from_secs(2)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let saw_game_over = std::iter::from_fn(|| events_rx.try_recv().ok())
            .any(|event| matches!(event, SessionEvent::GameOver { .. }));
        assert!(!saw_game_over);
    }
}
