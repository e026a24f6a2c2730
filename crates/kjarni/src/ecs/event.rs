//! # Events — typed, double-buffered messages between systems
//!
//! An [`Events<T>`] resource holds the events sent during the current frame
//! and the ones sent during the previous frame. [`World::begin_tick`] swaps the
//! buffers for every registered event type, so an event stays readable for the
//! rest of the frame it was sent in and the whole of the next one, whatever
//! the stage order of sender and reader.
//!
//! ```ignore
//! world.add_event::<Collision>();
//!
//! // sender
//! ctx.world.send_event(Collision { a, b });
//!
//! // reader, keeps its place between frames
//! struct Sfx { collisions: EventCursor<Collision> }
//! for hit in self.collisions.read(ctx.world.resource::<Events<Collision>>()) {
//!     play(hit);
//! }
//! ```
//!
//! [`Events::iter`] shows both buffers every time it is called. An
//! [`EventCursor`] remembers how far it has read, so a system that runs each
//! frame sees each event once.

use std::marker::PhantomData;

use super::world::World;

/// Anything that can be sent as an event.
pub trait Event: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Event for T {}

/// Double-buffered event queue for one event type.
#[derive(Debug)]
pub struct Events<T> {
    previous: Vec<T>,
    current: Vec<T>,
    /// Sequence number of `previous[0]`.
    previous_start: u64,
    /// Sequence number of `current[0]`.
    current_start: u64,
}

impl<T> Default for Events<T> {
    fn default() -> Self {
        Self {
            previous: Vec::new(),
            current: Vec::new(),
            previous_start: 0,
            current_start: 0,
        }
    }
}

impl<T: Event> Events<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, event: T) {
        self.current.push(event);
    }

    pub fn send_batch(&mut self, events: impl IntoIterator<Item = T>) {
        self.current.extend(events);
    }

    /// Previous frame's events, then this frame's, in send order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.previous.iter().chain(self.current.iter())
    }

    pub fn len(&self) -> usize {
        self.previous.len() + self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty() && self.current.is_empty()
    }

    /// Events sent since creation, including dropped ones.
    pub fn sent_count(&self) -> u64 {
        self.current_start + self.current.len() as u64
    }

    /// Drop the previous frame's events and start a new current buffer.
    pub fn update(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.current);
        self.current.clear();
        self.previous_start = self.current_start;
        self.current_start = self.previous_start + self.previous.len() as u64;
    }

    /// Drop everything without touching sequence numbers.
    pub fn clear(&mut self) {
        self.previous_start = self.sent_count();
        self.current_start = self.previous_start;
        self.previous.clear();
        self.current.clear();
    }
}

/// Read position in one [`Events<T>`] stream.
///
/// Events that were dropped before the cursor got to them are skipped.
#[derive(Debug)]
pub struct EventCursor<T> {
    next: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for EventCursor<T> {
    fn default() -> Self {
        Self {
            next: 0,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for EventCursor<T> {
    fn clone(&self) -> Self {
        Self {
            next: self.next,
            _marker: PhantomData,
        }
    }
}

impl<T: Event> EventCursor<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events not yet seen by this cursor, oldest first. The cursor moves
    /// past all of them, whether or not the iterator is consumed.
    pub fn read<'e>(&mut self, events: &'e Events<T>) -> impl Iterator<Item = &'e T> + use<'e, T> {
        let skip_previous = skip_count(self.next, events.previous_start, events.previous.len());
        let skip_current = skip_count(self.next, events.current_start, events.current.len());
        self.next = events.sent_count();
        events.previous[skip_previous..]
            .iter()
            .chain(events.current[skip_current..].iter())
    }

    /// Number of unseen events still held by `events`.
    pub fn len(&self, events: &Events<T>) -> usize {
        let previous = events.previous.len() - skip_count(self.next, events.previous_start, events.previous.len());
        let current = events.current.len() - skip_count(self.next, events.current_start, events.current.len());
        previous + current
    }

    pub fn is_empty(&self, events: &Events<T>) -> bool {
        self.len(events) == 0
    }
}

fn skip_count(next: u64, start: u64, len: usize) -> usize {
    (next.saturating_sub(start) as usize).min(len)
}

/// Swap the buffers of `Events<T>` in `world`, if present. Registered per
/// event type by [`World::add_event`] and run by [`World::begin_tick`].
pub(crate) fn update_events<T: Event>(world: &mut World) {
    if let Some(events) = world.get_resource_mut::<Events<T>>() {
        events.update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Hit(u32);

    #[test]
    fn events_live_for_two_frames() {
        let mut events = Events::new();
        events.send(Hit(1));
        assert_eq!(events.iter().cloned().collect::<Vec<_>>(), vec![Hit(1)]);

        events.update();
        events.send(Hit(2));
        assert_eq!(events.iter().cloned().collect::<Vec<_>>(), vec![Hit(1), Hit(2)]);

        events.update();
        assert_eq!(events.iter().cloned().collect::<Vec<_>>(), vec![Hit(2)]);

        events.update();
        assert!(events.is_empty());
        assert_eq!(events.sent_count(), 2);
    }

    #[test]
    fn cursor_sees_each_event_once() {
        let mut events = Events::new();
        let mut cursor = EventCursor::new();

        events.send_batch([Hit(1), Hit(2)]);
        assert_eq!(cursor.len(&events), 2);
        assert_eq!(cursor.read(&events).cloned().collect::<Vec<_>>(), vec![Hit(1), Hit(2)]);
        assert!(cursor.is_empty(&events));

        events.update();
        events.send(Hit(3));
        assert_eq!(cursor.read(&events).cloned().collect::<Vec<_>>(), vec![Hit(3)]);
        assert_eq!(cursor.read(&events).count(), 0);
    }

    #[test]
    fn late_cursor_skips_dropped_events() {
        let mut events = Events::new();
        events.send(Hit(1));
        events.update();
        events.update();
        events.send(Hit(2));

        let mut cursor = EventCursor::new();
        assert_eq!(cursor.read(&events).cloned().collect::<Vec<_>>(), vec![Hit(2)]);
    }

    #[test]
    fn clear_keeps_cursors_consistent() {
        let mut events = Events::new();
        let mut cursor = EventCursor::new();
        events.send(Hit(1));
        events.clear();
        events.send(Hit(2));
        assert_eq!(cursor.read(&events).cloned().collect::<Vec<_>>(), vec![Hit(2)]);
    }
}
