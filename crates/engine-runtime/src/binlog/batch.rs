use model::events::{ChangeEvent, ChangeKind};

/// Coalesces contiguous same-kind row events into runs that can be
/// applied as one statement (inserts, deletes) or one tight sequence
/// (updates). A run is emitted when the kind changes or the buffer
/// reaches capacity; the caller also drains it on quiet periods and at
/// shutdown.
pub struct EventBuffer {
    kind: Option<ChangeKind>,
    events: Vec<ChangeEvent>,
    capacity: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            kind: None,
            events: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Buffer an event. When it cannot join the current run (different
    /// kind, or the run is full) the finished run is returned and must
    /// be applied before anything else.
    pub fn push(&mut self, event: ChangeEvent) -> Option<(ChangeKind, Vec<ChangeEvent>)> {
        let kind = event.change.kind();
        let flushed = if self.kind != Some(kind) || self.events.len() >= self.capacity {
            self.take()
        } else {
            None
        };

        self.kind = Some(kind);
        self.events.push(event);
        flushed
    }

    /// Drain the current run, if any.
    pub fn take(&mut self) -> Option<(ChangeKind, Vec<ChangeEvent>)> {
        if self.events.is_empty() {
            return None;
        }
        let kind = self.kind?;
        Some((kind, std::mem::take(&mut self.events)))
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
