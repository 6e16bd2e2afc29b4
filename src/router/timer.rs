use super::RouterInput;
use std::time::Duration;
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;
use tracing::trace;

/// Which debounce slot a firing belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotId {
    CaptureDelay,
    TextClear,
}

struct Armed<A> {
    generation: u64,
    action: A,
    handle: JoinHandle<()>,
}

/// Holds at most one scheduled action.
///
/// Scheduling replaces whatever was armed. The sleeping task only posts
/// `TimerFired { slot, generation }` to the router inbox; the action itself
/// stays here and is handed out by [`TimerSlot::take_fired`] only when the
/// generation still matches, so a cancelled or superseded timer can never
/// run its action.
pub(crate) struct TimerSlot<A> {
    id: SlotId,
    generation: u64,
    armed: Option<Armed<A>>,
}

impl<A> TimerSlot<A> {
    pub(crate) fn new(id: SlotId) -> Self {
        Self {
            id,
            generation: 0,
            armed: None,
        }
    }

    pub(crate) fn schedule(
        &mut self,
        delay: Duration,
        action: A,
        inbox: &WeakUnboundedSender<RouterInput>,
    ) {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let slot = self.id;
        let inbox = inbox.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(RouterInput::TimerFired { slot, generation });
            }
        });
        trace!("{:?} timer armed for {:?} (generation {})", slot, delay, generation);

        self.armed = Some(Armed {
            generation,
            action,
            handle,
        });
    }

    /// Disarm. Returns true if something was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                armed.handle.abort();
                trace!("{:?} timer cancelled (generation {})", self.id, armed.generation);
                true
            }
            None => false,
        }
    }

    /// Claim the action for a firing; `None` for stale generations.
    pub(crate) fn take_fired(&mut self, generation: u64) -> Option<A> {
        match &self.armed {
            Some(armed) if armed.generation == generation => {
                self.armed.take().map(|armed| armed.action)
            }
            _ => None,
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl<A> Drop for TimerSlot<A> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fired(input: Option<RouterInput>) -> Option<(SlotId, u64)> {
        match input {
            Some(RouterInput::TimerFired { slot, generation }) => Some((slot, generation)),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_with_action() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(SlotId::CaptureDelay);

        slot.schedule(Duration::from_millis(100), "capture", &tx.downgrade());
        let (id, generation) = fired(rx.recv().await).unwrap();

        assert_eq!(id, SlotId::CaptureDelay);
        assert_eq!(slot.take_fired(generation), Some("capture"));
        assert_eq!(slot.take_fired(generation), None);
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_supersedes_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(SlotId::TextClear);

        slot.schedule(Duration::from_millis(100), 1, &tx.downgrade());
        slot.schedule(Duration::from_millis(300), 2, &tx.downgrade());

        let (_, generation) = fired(rx.recv().await).unwrap();
        assert_eq!(slot.take_fired(generation), Some(2));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(SlotId::CaptureDelay);

        slot.schedule(Duration::from_millis(100), (), &tx.downgrade());
        assert!(slot.cancel());
        assert!(!slot.cancel());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_is_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(SlotId::CaptureDelay);

        slot.schedule(Duration::from_millis(100), "first", &tx.downgrade());
        let (_, first_generation) = fired(rx.recv().await).unwrap();

        // Firing already queued when the slot was re-armed
        slot.schedule(Duration::from_millis(100), "second", &tx.downgrade());
        assert_eq!(slot.take_fired(first_generation), None);
        assert!(slot.is_armed());
    }
}
