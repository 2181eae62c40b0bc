//! Thread-backed reconnect timers.

use super::engine::{Input, Scheduler, TimerId};
use super::service::LoopMessage;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct PendingTimer {
    // Dropping the sender wakes the sleeper early.
    cancel: Sender<()>,
    thread: JoinHandle<()>,
}

pub struct ThreadScheduler {
    sink: Sender<LoopMessage>,
    timers: HashMap<TimerId, PendingTimer>,
}

impl ThreadScheduler {
    pub(crate) fn new(sink: Sender<LoopMessage>) -> Self {
        Self {
            sink,
            timers: HashMap::new(),
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&mut self, timer: TimerId, delay: Duration) {
        self.timers.retain(|_, pending| !pending.thread.is_finished());

        let (cancel, cancelled) = mpsc::channel::<()>();
        let sink = self.sink.clone();
        let spawned = thread::Builder::new()
            .name(format!("gambit-timer-{}", timer))
            .spawn(move || match cancelled.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {
                    let _ = sink.send(LoopMessage::Input(Input::TimerFired { timer }));
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            });

        match spawned {
            Ok(thread) => {
                self.timers.insert(timer, PendingTimer { cancel, thread });
            }
            Err(err) => {
                tracing::error!(timer, error = %err, "Failed to spawn reconnect timer");
            }
        }
    }

    fn cancel(&mut self, timer: TimerId) {
        if let Some(pending) = self.timers.remove(&timer) {
            drop(pending.cancel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_delay() {
        let (tx, rx) = mpsc::channel();
        let mut scheduler = ThreadScheduler::new(tx);
        scheduler.schedule(4, Duration::from_millis(20));

        match rx.recv_timeout(Duration::from_secs(2)) {
            Ok(LoopMessage::Input(Input::TimerFired { timer })) => assert_eq!(timer, 4),
            _ => panic!("timer did not fire"),
        }
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let (tx, rx) = mpsc::channel();
        let mut scheduler = ThreadScheduler::new(tx);
        scheduler.schedule(1, Duration::from_millis(100));
        scheduler.cancel(1);

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
