use crate::automation::parameter::ParameterId;
use crate::foundation::core::FrameSpan;
use crate::timeline::clip::ClipId;
use crate::timeline::track::TrackId;

/// Object whose automation produced a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AutomationTarget {
    Track(TrackId),
    Clip { track: TrackId, clip: ClipId },
}

impl AutomationTarget {
    pub fn track(self) -> TrackId {
        match self {
            Self::Track(t) | Self::Clip { track: t, .. } => t,
        }
    }
}

/// Synchronous change notifications raised by [`crate::Timeline`].
#[derive(Clone, Debug, PartialEq)]
pub enum TimelineEvent {
    /// A parameter's effective value changed.
    ParameterChanged {
        target: AutomationTarget,
        parameter: ParameterId,
    },
    TrackAdded {
        track: TrackId,
        index: usize,
    },
    TrackRemoved {
        track: TrackId,
        index: usize,
    },
    TrackMoved {
        track: TrackId,
        from: usize,
        to: usize,
    },
    ClipAdded {
        track: TrackId,
        clip: ClipId,
        index: usize,
    },
    ClipRemoved {
        track: TrackId,
        clip: ClipId,
        index: usize,
    },
    ClipMoved {
        clip: ClipId,
        from_track: TrackId,
        to_track: TrackId,
    },
    ClipSpanChanged {
        track: TrackId,
        clip: ClipId,
        old: FrameSpan,
        new: FrameSpan,
    },
    PlayheadChanged {
        old: i64,
        new: i64,
    },
    StopheadChanged {
        old: i64,
        new: i64,
    },
    MaxDurationChanged {
        old: i64,
        new: i64,
    },
    /// Track or clip selection changed.
    SelectionChanged,
    /// Something visible changed; the current frame should be re-rendered.
    RenderInvalidated,
}

/// Handle returned by [`EventBus::subscribe`]; pass it back to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn FnMut(&E) + Send>;

/// Ordered list of synchronous subscribers.
///
/// Handlers run on the emitting thread, in subscription order, and must not block.
pub struct EventBus<E> {
    next: u64,
    handlers: Vec<(SubscriptionId, Handler<E>)>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next: 1,
            handlers: Vec::new(),
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.handlers.len())
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&E) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next);
        self.next += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn emit(&mut self, event: &E) {
        for (_, handler) in &mut self.handlers {
            handler(event);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/events.rs"]
mod tests;
