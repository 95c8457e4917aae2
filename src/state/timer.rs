//! Per-room countdown service.
//!
//! A countdown emits its progress over the room's event hub and reports
//! completion as a command into the room mailbox, so the resulting phase
//! transition runs on the room's own serialization point instead of the
//! timer task. Each start carries an epoch; a completion whose epoch is
//! stale by the time it is processed is discarded by the engine.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::dto::ws::ServerEvent;
use crate::state::engine::Countdown;
use crate::state::room::RoomCommand;

/// Single cancellable countdown handle owned by one room task.
pub struct RoomCountdown {
    events: broadcast::Sender<ServerEvent>,
    mailbox: mpsc::UnboundedSender<RoomCommand>,
    handle: Option<JoinHandle<()>>,
}

impl RoomCountdown {
    /// Create an idle countdown bound to a room's hub and mailbox.
    pub fn new(
        events: broadcast::Sender<ServerEvent>,
        mailbox: mpsc::UnboundedSender<RoomCommand>,
    ) -> Self {
        Self {
            events,
            mailbox,
            handle: None,
        }
    }
}

impl Countdown for RoomCountdown {
    fn start(&mut self, seconds: u32, message: &str, epoch: u64) {
        self.cancel();

        let events = self.events.clone();
        let mailbox = self.mailbox.clone();
        let message = message.to_string();

        self.handle = Some(tokio::spawn(async move {
            let _ = events.send(ServerEvent::StartedTimer {
                seconds,
                show_dialog: true,
                message,
            });

            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately.
            interval.tick().await;

            let mut remaining = seconds;
            while remaining > 0 {
                interval.tick().await;
                remaining -= 1;
                let _ = events.send(ServerEvent::TimerUpdated { seconds: remaining });
            }

            let _ = events.send(ServerEvent::TimerFinished);
            let _ = mailbox.send(RoomCommand::CountdownElapsed { epoch });
        }));
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RoomCountdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_down_and_reports_completion() {
        let (events, mut events_rx) = broadcast::channel(16);
        let (mailbox, mut mailbox_rx) = mpsc::unbounded_channel();
        let mut countdown = RoomCountdown::new(events, mailbox);

        countdown.start(2, "Place your tokens!", 42);

        assert!(matches!(
            events_rx.recv().await,
            Ok(ServerEvent::StartedTimer { seconds: 2, .. })
        ));
        assert!(matches!(
            events_rx.recv().await,
            Ok(ServerEvent::TimerUpdated { seconds: 1 })
        ));
        assert!(matches!(
            events_rx.recv().await,
            Ok(ServerEvent::TimerUpdated { seconds: 0 })
        ));
        assert!(matches!(
            events_rx.recv().await,
            Ok(ServerEvent::TimerFinished)
        ));
        assert!(matches!(
            mailbox_rx.recv().await,
            Some(RoomCommand::CountdownElapsed { epoch: 42 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_never_completes() {
        let (events, mut events_rx) = broadcast::channel(16);
        let (mailbox, mut mailbox_rx) = mpsc::unbounded_channel();
        let mut countdown = RoomCountdown::new(events, mailbox);

        countdown.start(3, "Place your tokens!", 1);
        assert!(matches!(
            events_rx.recv().await,
            Ok(ServerEvent::StartedTimer { .. })
        ));
        countdown.cancel();

        // Give any stray task time to run; nothing must arrive.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(mailbox_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_the_previous_countdown() {
        let (events, _events_rx) = broadcast::channel(16);
        let (mailbox, mut mailbox_rx) = mpsc::unbounded_channel();
        let mut countdown = RoomCountdown::new(events, mailbox);

        countdown.start(30, "first", 1);
        countdown.start(1, "second", 2);

        let completion = mailbox_rx.recv().await;
        assert!(matches!(
            completion,
            Some(RoomCommand::CountdownElapsed { epoch: 2 })
        ));
        // The first countdown was aborted; no second completion follows.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(mailbox_rx.try_recv().is_err());
    }
}
