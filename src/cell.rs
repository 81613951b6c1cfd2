//! Push-based value cells: the reactive source consumed by list bindings.
//!
//! Delivery is synchronous and runs to completion on the calling thread. A
//! `set` issued from inside a subscriber is deferred until the current round
//! finishes, so subscribers never observe nested triggers; every update is
//! still delivered, in order, exactly once.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

type Callback<T> = Box<dyn FnMut(&T)>;

struct SubEntry<T> {
    id: usize,
    callback: Rc<RefCell<Callback<T>>>,
}

struct CellInner<T> {
    value: Option<T>,
    subs: Vec<SubEntry<T>>,
    next_sub: usize,
    notifying: bool,
    pending: VecDeque<T>,
    /// Keeps the registration on a parent cell alive for derived views.
    upstream: Option<Subscription>,
}

/// A cell holding a current value, readable synchronously, with push
/// notification to registered subscribers.
pub struct ValueCell<T> {
    inner: Rc<RefCell<CellInner<T>>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        ValueCell {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Default for ValueCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> ValueCell<T> {
    /// An empty cell; subscribers get nothing until the first `set`.
    pub fn new() -> Self {
        ValueCell {
            inner: Rc::new(RefCell::new(CellInner {
                value: None,
                subs: Vec::new(),
                next_sub: 0,
                notifying: false,
                pending: VecDeque::new(),
                upstream: None,
            })),
        }
    }

    pub fn with(value: T) -> Self {
        let cell = Self::new();
        cell.inner.borrow_mut().value = Some(value);
        cell
    }

    /// Current value, if any.
    pub fn get(&self) -> Option<T> {
        self.inner.borrow().value.clone()
    }

    /// Store a new value and deliver it to every subscriber. Nested calls
    /// issued from inside a subscriber queue up and drain in order once the
    /// current round completes.
    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.notifying {
                inner.pending.push_back(value);
                return;
            }
            inner.notifying = true;
            inner.value = Some(value);
        }
        Self::deliver(&self.inner);
    }

    fn deliver(inner: &Rc<RefCell<CellInner<T>>>) {
        loop {
            let (value, snapshot) = {
                let cell = inner.borrow();
                let Some(value) = cell.value.clone() else { break };
                let snapshot: Vec<(usize, Rc<RefCell<Callback<T>>>)> = cell
                    .subs
                    .iter()
                    .map(|sub| (sub.id, Rc::clone(&sub.callback)))
                    .collect();
                (value, snapshot)
            };
            for (id, callback) in snapshot {
                // Subscribers cancelled mid-round are skipped.
                let live = inner.borrow().subs.iter().any(|sub| sub.id == id);
                if live {
                    (&mut *callback.borrow_mut())(&value);
                }
            }
            let mut cell = inner.borrow_mut();
            match cell.pending.pop_front() {
                Some(next) => cell.value = Some(next),
                None => {
                    cell.notifying = false;
                    break;
                }
            }
        }
    }

    /// Register a callback for every value this cell holds from now on. If a
    /// value is already present the callback fires immediately with it.
    ///
    /// Dropping the returned [`Subscription`] cancels the registration.
    pub fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> Subscription {
        let callback: Rc<RefCell<Callback<T>>> = Rc::new(RefCell::new(Box::new(callback)));
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_sub;
            inner.next_sub += 1;
            inner.subs.push(SubEntry {
                id,
                callback: Rc::clone(&callback),
            });
            id
        };
        if let Some(value) = self.get() {
            (&mut *callback.borrow_mut())(&value);
        }
        let weak = Rc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().subs.retain(|sub| sub.id != id);
                }
            })),
        }
    }

    /// Derived view: a cell holding `f` applied to every value of this one.
    /// The view stays registered on its source for as long as it is alive.
    pub fn map<U: Clone + 'static>(&self, mut f: impl FnMut(&T) -> U + 'static) -> ValueCell<U> {
        let out = ValueCell::new();
        let sink = out.clone();
        let sub = self.subscribe(move |value| sink.set(f(value)));
        out.inner.borrow_mut().upstream = Some(sub);
        out
    }

    /// Batched view: deliveries within one scheduler tick collapse, and only
    /// the last value observed before the tick fires is passed on.
    /// Intermediate states are dropped entirely.
    pub fn batched(&self, scheduler: &Scheduler) -> ValueCell<T> {
        let out = ValueCell::new();
        let sink = out.clone();
        let slot: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let scheduler = scheduler.clone();
        let sub = self.subscribe(move |value| {
            let scheduled = slot.borrow().is_some();
            *slot.borrow_mut() = Some(value.clone());
            if !scheduled {
                let slot = Rc::clone(&slot);
                let sink = sink.clone();
                scheduler.schedule(Box::new(move || {
                    if let Some(value) = slot.borrow_mut().take() {
                        sink.set(value);
                    }
                }));
            }
        });
        out.inner.borrow_mut().upstream = Some(sub);
        out
    }
}

/// Handle for one registration on a [`ValueCell`]. Cancellation is
/// idempotent; dropping the handle cancels too.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subscription({})",
            if self.cancel.is_some() { "live" } else { "cancelled" }
        )
    }
}

/// Cooperative single-threaded tick scheduler used by [`ValueCell::batched`].
/// Tasks scheduled during a tick run on the next one.
#[derive(Clone, Default)]
pub struct Scheduler {
    tasks: Rc<RefCell<Vec<Box<dyn FnOnce()>>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn schedule(&self, task: Box<dyn FnOnce()>) {
        self.tasks.borrow_mut().push(task);
    }

    /// Run every task scheduled since the previous tick.
    pub fn tick(&self) {
        let tasks: Vec<_> = self.tasks.borrow_mut().drain(..).collect();
        for task in tasks {
            task();
        }
    }
}
