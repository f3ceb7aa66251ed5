//! Modal event dispatch: mode registry, activation, and subscriber tables.
//!
//! A mode is a slot of subscriber lists; at most one mode is active at a
//! time. Deferred activations park in `next` and become visible only at
//! [`EventManager::advance_mode`], so the active mode cannot change
//! underneath a dispatch tick. The mode stack records nesting history on
//! top; unwinding past the last entry asks the host loop to stop.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Event tags a mode can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Tick,
    Resize,
    FocusIn,
    FocusOut,
}

impl EventKind {
    /// Number of tags; sizes each mode's event table.
    pub const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            EventKind::Tick => 0,
            EventKind::Resize => 1,
            EventKind::FocusIn => 2,
            EventKind::FocusOut => 3,
        }
    }
}

/// How a mode activation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Park in `next`; visible after [`EventManager::advance_mode`].
    Deferred,
    /// Replace the active mode immediately.
    Force,
}

/// Outcome of a stack unwind step.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignal {
    Continue,
    /// Mode nesting is exhausted; the host's input loop should stop.
    RequestStop,
}

type EventFn = Box<dyn FnMut()>;
type InputFn = Box<dyn FnMut(&str)>;

struct ModeSlot {
    live: bool,
    input: Vec<InputFn>,
    events: [Vec<EventFn>; EventKind::COUNT],
}

impl ModeSlot {
    fn new() -> Self {
        Self {
            live: true,
            input: Vec::new(),
            events: std::array::from_fn(|_| Vec::new()),
        }
    }
}

/// Append-only mode storage shared between the manager and its handles.
///
/// Slots are never removed; releasing a mode flips its liveness flag and
/// the subscriber tables persist for the process lifetime.
#[derive(Default)]
struct ModeStore {
    slots: Vec<ModeSlot>,
}

impl ModeStore {
    fn release(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.live = false;
        }
    }
}

/// Move-only capability for one registered mode.
///
/// At most one live handle exists per slot: handles are minted only by
/// [`EventManager::new_mode`] and cannot be cloned, and moving one
/// statically invalidates the source. Dropping a live handle releases its
/// slot.
pub struct ModeHandle {
    index: usize,
    released: bool,
    store: Weak<RefCell<ModeStore>>,
}

impl ModeHandle {
    fn invalid() -> Self {
        Self {
            index: 0,
            released: true,
            store: Weak::new(),
        }
    }

    /// Slot index this handle is bound to. Stable for the handle's lifetime.
    pub fn index(&self) -> usize {
        self.index
    }

    /// False once the mode has been removed, or when registration failed.
    pub fn is_valid(&self) -> bool {
        !self.released && self.store.strong_count() > 0
    }

    /// Subscribe a zero-argument callable to `kind`, in registration order.
    /// No-op on an invalid handle.
    pub fn subscribe_event<F>(&self, kind: EventKind, subscriber: F)
    where
        F: FnMut() + 'static,
    {
        if self.released {
            return;
        }
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let mut store = store.borrow_mut();
        if let Some(slot) = store.slots.get_mut(self.index) {
            slot.events[kind.index()].push(Box::new(subscriber));
        }
    }

    /// Subscribe an input callable, in registration order. No-op on an
    /// invalid handle.
    pub fn subscribe_input<F>(&self, subscriber: F)
    where
        F: FnMut(&str) + 'static,
    {
        if self.released {
            return;
        }
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let mut store = store.borrow_mut();
        if let Some(slot) = store.slots.get_mut(self.index) {
            slot.input.push(Box::new(subscriber));
        }
    }

    /// Release the slot now instead of at drop. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(store) = self.store.upgrade() {
            store.borrow_mut().release(self.index);
        }
    }
}

impl Drop for ModeHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ModeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeHandle")
            .field("index", &self.index)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Owner of the mode registry and the dispatch state machine.
///
/// `current`/`next` form a single-slot pending-commit register; `stack`
/// layers nesting history on top of it. Single-threaded by contract:
/// dispatch invokes subscribers inline on the caller's thread.
pub struct EventManager {
    store: Rc<RefCell<ModeStore>>,
    current: Option<usize>,
    next: Option<usize>,
    stack: Vec<usize>,
}

impl EventManager {
    pub fn new() -> Self {
        Self {
            store: Rc::new(RefCell::new(ModeStore::default())),
            current: None,
            next: None,
            stack: Vec::new(),
        }
    }

    /// Register a new mode with empty subscriber tables.
    ///
    /// On slot-storage growth failure the returned handle is already
    /// invalid and every operation through it is a no-op.
    pub fn new_mode(&mut self) -> ModeHandle {
        let mut store = self.store.borrow_mut();
        if store.slots.try_reserve(1).is_err() {
            return ModeHandle::invalid();
        }
        store.slots.push(ModeSlot::new());
        ModeHandle {
            index: store.slots.len() - 1,
            released: false,
            store: Rc::downgrade(&self.store),
        }
    }

    /// Release the handle's slot. Idempotent. Stale indices left in
    /// `current`/`next`/`stack` are skipped at dispatch rather than
    /// scrubbed here.
    pub fn remove_mode(&mut self, handle: &mut ModeHandle) {
        handle.release();
    }

    /// Activate the handle's mode: `Force` takes effect now, `Deferred` at
    /// the next [`advance_mode`](Self::advance_mode). No-op on an invalid
    /// or foreign handle.
    pub fn set_mode(&mut self, handle: &ModeHandle, activation: Activation) {
        if !self.owns_live(handle) {
            return;
        }
        self.apply(handle.index, activation);
    }

    /// Commit a pending deferred activation, if any.
    ///
    /// The single point where a deferred mode switch becomes observable.
    pub fn advance_mode(&mut self) {
        if let Some(next) = self.next.take() {
            self.current = Some(next);
        }
    }

    /// Whether any mode is active.
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Whether `handle`'s mode is the active one.
    pub fn is_mode_active(&self, handle: &ModeHandle) -> bool {
        self.owns_live(handle) && self.current == Some(handle.index)
    }

    /// Remember the active mode on the stack, if there is one.
    pub fn stack_current(&mut self) {
        if let Some(current) = self.current {
            self.stack.push(current);
        }
    }

    /// Push the handle's mode onto the stack, then activate it exactly as
    /// [`set_mode`](Self::set_mode) would. No-op on an invalid handle.
    pub fn stack_mode(&mut self, handle: &ModeHandle, activation: Activation) {
        if !self.owns_live(handle) {
            return;
        }
        self.stack.push(handle.index);
        self.apply(handle.index, activation);
    }

    /// Unwind one level of mode nesting.
    ///
    /// Pops the departing entry and deferred-activates the entry revealed
    /// beneath it (commit with [`advance_mode`](Self::advance_mode)).
    /// Returns [`LoopSignal::RequestStop`] when there is nothing left to
    /// return to: the stack was already empty, or the pop emptied it. An
    /// empty stack at the call leaves `current` and `next` untouched.
    pub fn unstack_mode(&mut self) -> LoopSignal {
        if self.stack.pop().is_none() {
            return LoopSignal::RequestStop;
        }
        match self.stack.last() {
            Some(&index) => {
                self.next = Some(index);
                LoopSignal::Continue
            }
            None => LoopSignal::RequestStop,
        }
    }

    /// Invoke the active mode's subscribers for `kind`, in registration
    /// order, synchronously on the caller's thread. No-op when no mode is
    /// active or the active slot is no longer live.
    pub fn dispatch_event(&mut self, kind: EventKind) {
        let Some(index) = self.current else {
            return;
        };
        let Some(mut table) = self.detach_events(index, kind) else {
            return;
        };
        for subscriber in table.iter_mut() {
            subscriber();
        }
        self.reattach_events(index, kind, table);
    }

    /// Invoke the active mode's input subscribers with `input`, in
    /// registration order. Subscribers borrow the input; they never own it.
    pub fn dispatch_input(&mut self, input: &str) {
        let Some(index) = self.current else {
            return;
        };
        let Some(mut table) = self.detach_input(index) else {
            return;
        };
        for subscriber in table.iter_mut() {
            subscriber(input);
        }
        self.reattach_input(index, table);
    }

    fn apply(&mut self, index: usize, activation: Activation) {
        match activation {
            Activation::Force => self.current = Some(index),
            Activation::Deferred => self.next = Some(index),
        }
    }

    fn owns_live(&self, handle: &ModeHandle) -> bool {
        handle.is_valid() && handle.store.ptr_eq(&Rc::downgrade(&self.store))
    }

    // Subscriber tables are detached while their callables run, so a
    // subscriber may register further subscribers without invalidating the
    // iteration. Late registrations land after the detached originals and
    // fire from the next dispatch on.

    fn detach_events(&self, index: usize, kind: EventKind) -> Option<Vec<EventFn>> {
        let mut store = self.store.borrow_mut();
        let slot = store.slots.get_mut(index)?;
        if !slot.live {
            return None;
        }
        Some(std::mem::take(&mut slot.events[kind.index()]))
    }

    fn reattach_events(&self, index: usize, kind: EventKind, mut table: Vec<EventFn>) {
        let mut store = self.store.borrow_mut();
        let Some(slot) = store.slots.get_mut(index) else {
            return;
        };
        let added = std::mem::take(&mut slot.events[kind.index()]);
        table.extend(added);
        slot.events[kind.index()] = table;
    }

    fn detach_input(&self, index: usize) -> Option<Vec<InputFn>> {
        let mut store = self.store.borrow_mut();
        let slot = store.slots.get_mut(index)?;
        if !slot.live {
            return None;
        }
        Some(std::mem::take(&mut slot.input))
    }

    fn reattach_input(&self, index: usize, mut table: Vec<InputFn>) {
        let mut store = self.store.borrow_mut();
        let Some(slot) = store.slots.get_mut(index) else {
            return;
        };
        let added = std::mem::take(&mut slot.input);
        table.extend(added);
        slot.input = table;
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}
