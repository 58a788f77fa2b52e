//! Session / System Event Fan-Out
//!
//! A `Session` is one application's queued, mutex-protected event sink;
//! a `System` owns the dynamic list of live sessions (by weak reference —
//! sessions are caller-owned) and broadcasts events to each of them. A
//! `System` also brokers access to the platform's native compositor, if
//! the platform has one. Modeled on `u_session.c`/`u_system.c`.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::errors::{CompositorError, Result};

/// The tagged union of events a session can receive. `None` is the
/// sentinel `poll_events` returns when the queue is empty — it is never
/// pushed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    None,
    StateChange { visible: bool, focused: bool },
    OverlayChange { is_overlay: bool },
    LossPending,
    Lost,
    DisplayRefreshRateChange { from_hz: f32, to_hz: f32 },
    ReferenceSpaceChangePending { pose_valid: bool },
    PerformanceChange { sub_domain: PerformanceSubDomain, from_level: i32, to_level: i32 },
    PassthroughStateChange { enabled: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceSubDomain {
    Cpu,
    Gpu,
}

/// One application's FIFO of pending events, protected by its own mutex
/// so application and compositor threads never contend on a shared lock.
/// Holds a weak back-pointer to whichever `System` it is currently
/// registered with, established by [`System::add_session`] and cleared by
/// [`System::remove_session`].
#[derive(Default)]
pub struct Session {
    events: Mutex<VecDeque<SessionEvent>>,
    system: Mutex<Weak<System>>,
}

impl Session {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends an event to the tail of this session's queue.
    pub fn push_event(&self, event: SessionEvent) {
        self.events.lock().push_back(event);
    }

    /// Pops and returns the oldest queued event, or
    /// [`SessionEvent::None`] if the queue is empty.
    pub fn poll_events(&self) -> SessionEvent {
        self.events.lock().pop_front().unwrap_or(SessionEvent::None)
    }

    /// The system this session is currently registered with, or `None` if
    /// it was never added or has since been removed.
    #[must_use]
    pub fn owning_system(&self) -> Option<Arc<System>> {
        self.system.lock().upgrade()
    }
}

/// An opaque handle to the platform's native compositor service. A
/// `System` brokers creation of one; this crate never interprets its
/// contents.
pub trait NativeCompositor: Send + Sync {}

/// Owns the dynamic array of live sessions (held weakly — sessions are
/// caller-owned, per [`Arc`] returned by [`Session::new`]) and broadcasts
/// events to all of them. Also brokers creation of the platform's native
/// compositor, if one was supplied at construction. Modeled on `u_system`.
#[derive(Default)]
pub struct System {
    sessions: Mutex<Vec<Weak<Session>>>,
    native_compositor: Option<Arc<dyn NativeCompositor>>,
}

impl System {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a system backed by a platform native compositor, so that
    /// [`System::create_native_compositor`] succeeds.
    #[must_use]
    pub fn with_native_compositor(native_compositor: Arc<dyn NativeCompositor>) -> Arc<Self> {
        Arc::new(Self { sessions: Mutex::new(Vec::new()), native_compositor: Some(native_compositor) })
    }

    /// Registers `session` and points its back-pointer at this system. A
    /// session may be added more than once; each registration is removed
    /// independently.
    pub fn add_session(self: &Arc<Self>, session: Arc<Session>) {
        *session.system.lock() = Arc::downgrade(self);
        self.sessions.lock().push(Arc::downgrade(&session));
    }

    /// Removes the first registration matching `session` by pointer
    /// identity, shifting later entries down and clearing the session's
    /// back-pointer to this system. Logs (via `log::warn!`) and is a
    /// no-op if the session isn't found, matching the source's "could not
    /// find session to remove" diagnostic.
    pub fn remove_session(&self, session: &Arc<Session>) {
        let mut sessions = self.sessions.lock();
        let Some(index) = sessions.iter().position(|s| s.upgrade().is_some_and(|s| Arc::ptr_eq(&s, session))) else {
            log::warn!("could not find session to remove");
            return;
        };
        sessions.remove(index);
        *session.system.lock() = Weak::new();
    }

    /// Pushes a copy of `event` to every registered session still alive,
    /// dropping any whose `Arc` has since been dropped by its owner. A
    /// session whose sink rejects the push (modeled here as a push that
    /// panics internally being caught) is warned about and skipped rather
    /// than aborting the broadcast.
    pub fn broadcast_event(&self, event: &SessionEvent) {
        let mut sessions = self.sessions.lock();
        sessions.retain(|weak| {
            let Some(session) = weak.upgrade() else { return false };
            let event = event.clone();
            if catch_unwind(AssertUnwindSafe(|| session.push_event(event))).is_err() {
                log::warn!("session event push panicked, skipping");
            }
            true
        });
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().iter().filter(|s| s.strong_count() > 0).count()
    }

    /// Returns the platform's native compositor handle, or
    /// [`CompositorError::CompositorNotSupported`] if this system was
    /// constructed without one via [`System::with_native_compositor`].
    pub fn create_native_compositor(&self) -> Result<Arc<dyn NativeCompositor>> {
        self.native_compositor.clone().ok_or(CompositorError::CompositorNotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_on_empty_queue_returns_none_sentinel() {
        let session = Session::new();
        assert_eq!(session.poll_events(), SessionEvent::None);
    }

    #[test]
    fn events_are_returned_in_fifo_order() {
        let session = Session::new();
        session.push_event(SessionEvent::LossPending);
        session.push_event(SessionEvent::Lost);
        assert_eq!(session.poll_events(), SessionEvent::LossPending);
        assert_eq!(session.poll_events(), SessionEvent::Lost);
        assert_eq!(session.poll_events(), SessionEvent::None);
    }

    #[test]
    fn add_and_remove_session_shifts_tail_down() {
        let system = System::new();
        let a = Session::new();
        let b = Session::new();
        let c = Session::new();
        system.add_session(a.clone());
        system.add_session(b.clone());
        system.add_session(c.clone());
        assert_eq!(system.session_count(), 3);

        system.remove_session(&a);
        assert_eq!(system.session_count(), 2);

        system.broadcast_event(&SessionEvent::Lost);
        assert_eq!(b.poll_events(), SessionEvent::Lost);
        assert_eq!(c.poll_events(), SessionEvent::Lost);
        assert_eq!(a.poll_events(), SessionEvent::None);
    }

    #[test]
    fn broadcast_reaches_every_registered_session() {
        let system = System::new();
        let a = Session::new();
        let b = Session::new();
        system.add_session(a.clone());
        system.add_session(b.clone());

        system.broadcast_event(&SessionEvent::PassthroughStateChange { enabled: true });

        assert_eq!(a.poll_events(), SessionEvent::PassthroughStateChange { enabled: true });
        assert_eq!(b.poll_events(), SessionEvent::PassthroughStateChange { enabled: true });
    }

    #[test]
    fn removing_unregistered_session_is_a_warned_no_op() {
        let system = System::new();
        let a = Session::new();
        let stray = Session::new();
        system.add_session(a);
        system.remove_session(&stray);
        assert_eq!(system.session_count(), 1);
    }

    #[test]
    fn add_session_sets_back_pointer_and_remove_clears_it() {
        let system = System::new();
        let a = Session::new();
        assert!(a.owning_system().is_none());

        system.add_session(a.clone());
        assert!(Arc::ptr_eq(&a.owning_system().unwrap(), &system));

        system.remove_session(&a);
        assert!(a.owning_system().is_none());
    }

    #[test]
    fn broadcast_drops_dead_sessions_from_the_list() {
        let system = System::new();
        let a = Session::new();
        system.add_session(a.clone());
        system.add_session(Session::new());
        assert_eq!(system.session_count(), 2);

        system.broadcast_event(&SessionEvent::Lost);
        assert_eq!(a.poll_events(), SessionEvent::Lost);
        assert_eq!(system.session_count(), 1);
    }

    #[test]
    fn create_native_compositor_fails_without_one_configured() {
        let system = System::new();
        assert!(matches!(system.create_native_compositor(), Err(CompositorError::CompositorNotSupported)));
    }

    #[test]
    fn create_native_compositor_succeeds_when_configured() {
        struct Dummy;
        impl NativeCompositor for Dummy {}

        let system = System::with_native_compositor(Arc::new(Dummy));
        assert!(system.create_native_compositor().is_ok());
    }
}
