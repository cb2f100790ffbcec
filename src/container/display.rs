//! Three-lane display container
//!
//! Items arrive on one of three lanes (live, future, historic) and end up in
//! a single display buffer. Each lane can be paused on its own, and a global
//! master switch pauses them all at once. While a lane is held back, its
//! writes collect in the lane buffer and are flushed into the display when
//! it runs again. Future items share the historic buffer and status.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::buffer::{Buffer, ContainerElement};
use crate::subscribable::{
    lock, ExtendedSubscription, Lifecycle, Subscribable, SubscribableEvent,
};

use super::config::ContainerConfig;
use super::stateful::Status;
use super::upstream::{Activation, Resolver, UpstreamHandler};

/// Source lane of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Live,
    Future,
    Historic,
}

impl Lane {
    /// The lane whose buffer and status this lane uses
    fn storage(self) -> Lane {
        match self {
            Lane::Future => Lane::Historic,
            lane => lane,
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Live => write!(f, "live"),
            Lane::Future => write!(f, "future"),
            Lane::Historic => write!(f, "historic"),
        }
    }
}

/// Master switch plus the per-lane statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayStatus {
    pub all: Status,
    pub live: Status,
    pub historic: Status,
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self {
            all: Status::Running,
            live: Status::Running,
            historic: Status::Running,
        }
    }
}

impl DisplayStatus {
    fn lane(&self, lane: Lane) -> Status {
        match lane.storage() {
            Lane::Live => self.live,
            _ => self.historic,
        }
    }

    fn set_lane(&mut self, lane: Lane, status: Status) {
        match lane.storage() {
            Lane::Live => self.live = status,
            _ => self.historic = status,
        }
    }

    /// Whether writes on `lane` go straight to the display
    pub fn flows(&self, lane: Lane) -> bool {
        self.all.is_running() && self.lane(lane).is_running()
    }
}

/// Events dispatched by a [`DisplayContainer`]
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent<T> {
    /// All three buffers were wiped; `remove` lists the former display items
    Clear(ContainerElement<T>),
    /// A write was held back in the lane buffer
    Queued(Lane, ContainerElement<T>),
    /// The display buffer changed
    Update(Lane, ContainerElement<T>),
    /// The master switch or a lane status changed
    Status(DisplayStatus),
}

impl<T: Clone + Send + Sync + 'static> SubscribableEvent for DisplayEvent<T> {
    fn event_type(&self) -> &'static str {
        match self {
            DisplayEvent::Clear(_) => "clear",
            DisplayEvent::Queued(Lane::Live, _) => "live_queued",
            DisplayEvent::Queued(Lane::Future, _) => "future_queued",
            DisplayEvent::Queued(Lane::Historic, _) => "historic_queued",
            DisplayEvent::Update(Lane::Live, _) => "live_update",
            DisplayEvent::Update(Lane::Future, _) => "future_update",
            DisplayEvent::Update(Lane::Historic, _) => "historic_update",
            DisplayEvent::Status(_) => "status",
        }
    }
}

struct Lanes<B> {
    display: B,
    live: B,
    historic: B,
    status: DisplayStatus,
}

impl<B> Lanes<B> {
    fn queue_mut(&mut self, lane: Lane) -> &mut B {
        match lane.storage() {
            Lane::Live => &mut self.live,
            _ => &mut self.historic,
        }
    }
}

struct Inner<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    subscribable: Subscribable<DisplayEvent<T>>,
    lanes: Mutex<Lanes<B>>,
    max_queue_size: usize,
    activation: Mutex<Option<Arc<Activation<DisplayContainer<T, B>>>>>,
}

/// Display buffer fed by a live and a historic lane
///
/// Cheap handle; clones share state. An optional upstream is attached with
/// [`with_upstream`](Self::with_upstream) and held only while the container
/// has subscribers.
pub struct DisplayContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    inner: Arc<Inner<T, B>>,
}

impl<T, B> Clone for DisplayContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Drop the oldest items beyond `max`
fn evict<T, B: Buffer<T>>(buffer: &mut B, max: usize) -> Vec<T> {
    let overflow = buffer.size().saturating_sub(max);
    buffer.dequeue_size(overflow)
}

impl<T, B> DisplayContainer<T, B>
where
    T: Clone + Send + Sync + 'static,
    B: Buffer<T>,
{
    /// Display, live and historic buffers all start as empty clones of `buffer`
    pub fn new(buffer: B, config: &ContainerConfig) -> Self {
        let mut empty = buffer;
        empty.clear();
        Self::with_buffers(empty.clone(), empty.clone(), empty, config)
    }

    pub fn with_buffers(display: B, live: B, historic: B, config: &ContainerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribable: Subscribable::new("DisplayContainer"),
                lanes: Mutex::new(Lanes {
                    display,
                    live,
                    historic,
                    status: DisplayStatus::default(),
                }),
                max_queue_size: config.max_queue_size,
                activation: Mutex::new(None),
            }),
        }
    }

    /// Feed this container from `upstream` while it has subscribers
    pub fn with_upstream<U, H>(self, upstream: Subscribable<U>, handler: H) -> Self
    where
        U: SubscribableEvent,
        H: UpstreamHandler<U, Self>,
    {
        let weak: Weak<Inner<T, B>> = Arc::downgrade(&self.inner);
        let resolve: Resolver<Self> = Arc::new(move || weak.upgrade().map(|inner| Self { inner }));
        let activation = Arc::new(Activation::new(upstream, handler, resolve));

        let hooks: Weak<dyn Lifecycle> = Arc::downgrade(&activation) as Weak<dyn Lifecycle>;
        self.inner.subscribable.set_lifecycle(hooks);
        let previous = lock(&self.inner.activation).replace(Arc::clone(&activation));
        drop(previous);

        if self.inner.subscribable.has_subscribers() {
            activation.on_first_subscription(None);
        }
        self
    }

    /// Subscribe to every event; the extension is a handle to this container
    pub fn subscribe<F>(&self, callback: F) -> ExtendedSubscription<DisplayEvent<T>, Self>
    where
        F: Fn(&DisplayEvent<T>) + Send + Sync + 'static,
    {
        self.inner
            .subscribable
            .subscribe_extended(callback, None, None, |_| self.clone())
    }

    pub fn subscribe_filtered<F>(
        &self,
        callback: F,
        types: &[&'static str],
    ) -> ExtendedSubscription<DisplayEvent<T>, Self>
    where
        F: Fn(&DisplayEvent<T>) + Send + Sync + 'static,
    {
        self.inner
            .subscribable
            .subscribe_extended(callback, None, Some(types), |_| self.clone())
    }

    pub fn subscribable(&self) -> &Subscribable<DisplayEvent<T>> {
        &self.inner.subscribable
    }

    pub fn status(&self) -> DisplayStatus {
        lock(&self.inner.lanes).status
    }

    pub fn display_items(&self) -> Vec<T> {
        lock(&self.inner.lanes).display.to_array()
    }

    pub fn display_items_len(&self) -> usize {
        lock(&self.inner.lanes).display.size()
    }

    pub fn live_items(&self) -> Vec<T> {
        lock(&self.inner.lanes).live.to_array()
    }

    pub fn live_items_len(&self) -> usize {
        lock(&self.inner.lanes).live.size()
    }

    pub fn historic_items(&self) -> Vec<T> {
        lock(&self.inner.lanes).historic.to_array()
    }

    pub fn historic_items_len(&self) -> usize {
        lock(&self.inner.lanes).historic.size()
    }

    fn dispatch_status(&self, status: DisplayStatus) {
        self.inner.subscribable.dispatch(DisplayEvent::Status(status));
    }

    /// Pause the master switch
    pub fn pause(&self) {
        let status = {
            let mut lanes = lock(&self.inner.lanes);
            lanes.status.all = Status::Paused;
            lanes.status
        };
        self.dispatch_status(status);
    }

    /// Resume the master switch, flushing every lane that is not paused itself
    pub fn resume(&self) {
        let (flushed, status) = {
            let mut lanes = lock(&self.inner.lanes);
            lanes.status.all = Status::Running;
            let mut flushed = Vec::new();
            for lane in [Lane::Historic, Lane::Live] {
                if lanes.status.lane(lane).is_running() {
                    flushed.extend(self.flush(&mut lanes, lane));
                }
            }
            (flushed, lanes.status)
        };
        for event in flushed {
            self.inner.subscribable.dispatch(event);
        }
        self.dispatch_status(status);
    }

    pub fn pause_live(&self) {
        self.pause_lane(Lane::Live);
    }

    pub fn pause_historic(&self) {
        self.pause_lane(Lane::Historic);
    }

    pub fn resume_live(&self) {
        self.resume_lane(Lane::Live);
    }

    pub fn resume_historic(&self) {
        self.resume_lane(Lane::Historic);
    }

    fn pause_lane(&self, lane: Lane) {
        let status = {
            let mut lanes = lock(&self.inner.lanes);
            lanes.status.set_lane(lane, Status::Paused);
            lanes.status
        };
        self.dispatch_status(status);
    }

    /// Mark the lane running; its queue is flushed only if the master switch runs
    fn resume_lane(&self, lane: Lane) {
        let (flushed, status) = {
            let mut lanes = lock(&self.inner.lanes);
            lanes.status.set_lane(lane, Status::Running);
            let flushed = if lanes.status.all.is_running() {
                self.flush(&mut lanes, lane)
            } else {
                None
            };
            (flushed, lanes.status)
        };
        if let Some(event) = flushed {
            self.inner.subscribable.dispatch(event);
        }
        self.dispatch_status(status);
    }

    /// Move a lane queue into the display buffer
    fn flush(&self, lanes: &mut Lanes<B>, lane: Lane) -> Option<DisplayEvent<T>> {
        let max = self.inner.max_queue_size;
        let queue = lanes.queue_mut(lane);
        let add = queue.dequeue_size(max);
        queue.clear();

        for item in &add {
            lanes.display.push(item.clone());
        }
        let remove = evict(&mut lanes.display, max);

        if add.is_empty() && remove.is_empty() {
            return None;
        }
        Some(DisplayEvent::Update(
            lane,
            ContainerElement {
                add: Some(add),
                remove: Some(remove),
                ..ContainerElement::default()
            },
        ))
    }

    /// Wipe all three buffers
    pub fn clear(&self) {
        let removed = {
            let mut lanes = lock(&self.inner.lanes);
            let removed = if lanes.display.is_empty() {
                None
            } else {
                Some(lanes.display.to_array())
            };
            lanes.display.clear();
            lanes.live.clear();
            lanes.historic.clear();
            removed
        };

        let activation = lock(&self.inner.activation).clone();
        if let Some(activation) = activation {
            activation.cleared(self);
        }
        self.inner.subscribable.dispatch(DisplayEvent::Clear(ContainerElement {
            remove: removed,
            ..ContainerElement::default()
        }));
    }

    pub fn push_live_items(&self, items: Vec<T>) {
        self.push_items(Lane::Live, items);
    }

    pub fn push_future_items(&self, items: Vec<T>) {
        self.push_items(Lane::Future, items);
    }

    pub fn push_historic_items(&self, items: Vec<T>) {
        self.push_items(Lane::Historic, items);
    }

    pub fn push_live_item(&self, item: T) {
        self.push_items(Lane::Live, vec![item]);
    }

    pub fn push_future_item(&self, item: T) {
        self.push_items(Lane::Future, vec![item]);
    }

    pub fn push_historic_item(&self, item: T) {
        self.push_items(Lane::Historic, vec![item]);
    }

    /// Write to the display if the lane flows, else hold the items in the lane
    pub fn push_items(&self, lane: Lane, items: Vec<T>) {
        let max = self.inner.max_queue_size;
        let event = {
            let mut lanes = lock(&self.inner.lanes);
            if lanes.status.flows(lane) {
                for item in &items {
                    lanes.display.push(item.clone());
                }
                let remove = evict(&mut lanes.display, max);
                DisplayEvent::Update(
                    lane,
                    ContainerElement {
                        add: Some(items),
                        remove: if remove.is_empty() { None } else { Some(remove) },
                        ..ContainerElement::default()
                    },
                )
            } else {
                let queue = lanes.queue_mut(lane);
                for item in &items {
                    queue.push(item.clone());
                }
                evict(queue, max);
                DisplayEvent::Queued(lane, ContainerElement::added(items))
            }
        };
        self.inner.subscribable.dispatch(event);
    }
}
