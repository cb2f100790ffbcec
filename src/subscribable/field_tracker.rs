//! Reference counting of requested data fields across subscribers
//!
//! Upstream feeds often let a client choose which fields to stream. The
//! tracker keeps one counter per field and reports a field only when it
//! crosses the zero boundary: first interested subscriber (added) or last
//! one gone (removed).

use std::collections::{BTreeSet, HashMap};

use super::event::SubscriberId;

/// Receives zero-crossing field changes
pub trait FieldObserver: Send {
    /// Fields that went from zero to one interested subscriber
    fn fields_added(&mut self, _fields: &BTreeSet<String>) {}

    /// Fields that lost their last interested subscriber
    fn fields_removed(&mut self, _fields: &BTreeSet<String>) {}

    /// Called once per tracker operation; empty sides are skipped by default
    fn fields_changed(&mut self, added: &BTreeSet<String>, removed: &BTreeSet<String>) {
        if !added.is_empty() {
            self.fields_added(added);
        }
        if !removed.is_empty() {
            self.fields_removed(removed);
        }
    }
}

/// Observer made of an added and a removed closure
pub struct FieldCallbacks<FA, FR> {
    on_added: FA,
    on_removed: FR,
}

impl<FA, FR> FieldCallbacks<FA, FR>
where
    FA: FnMut(&BTreeSet<String>) + Send,
    FR: FnMut(&BTreeSet<String>) + Send,
{
    pub fn new(on_added: FA, on_removed: FR) -> Self {
        Self {
            on_added,
            on_removed,
        }
    }
}

impl<FA, FR> FieldObserver for FieldCallbacks<FA, FR>
where
    FA: FnMut(&BTreeSet<String>) + Send,
    FR: FnMut(&BTreeSet<String>) + Send,
{
    fn fields_added(&mut self, fields: &BTreeSet<String>) {
        (self.on_added)(fields)
    }

    fn fields_removed(&mut self, fields: &BTreeSet<String>) {
        (self.on_removed)(fields)
    }
}

/// Observer with a single `update_fields(added, removed)` closure
pub struct UpdateFields<F>(pub F);

impl<F> FieldObserver for UpdateFields<F>
where
    F: FnMut(&BTreeSet<String>, &BTreeSet<String>) + Send,
{
    fn fields_changed(&mut self, added: &BTreeSet<String>, removed: &BTreeSet<String>) {
        if !added.is_empty() || !removed.is_empty() {
            (self.0)(added, removed)
        }
    }
}

/// Per-field reference counter keyed by subscriber
pub struct SubscriptionFieldTracker<O> {
    subscriptions: HashMap<SubscriberId, BTreeSet<String>>,
    fields: HashMap<String, usize>,
    observer: O,
}

impl<O: FieldObserver> SubscriptionFieldTracker<O> {
    pub fn new(observer: O) -> Self {
        Self {
            subscriptions: HashMap::new(),
            fields: HashMap::new(),
            observer,
        }
    }

    /// Fields with at least one interested subscriber
    pub fn fields(&self) -> BTreeSet<String> {
        self.fields.keys().cloned().collect()
    }

    /// Interest count for one field
    pub fn count(&self, field: &str) -> usize {
        self.fields.get(field).copied().unwrap_or(0)
    }

    /// Record the fields a new subscriber wants
    ///
    /// A repeated call for a known id behaves like [`on_update`](Self::on_update).
    pub fn on_subscribe(&mut self, id: SubscriberId, fields: BTreeSet<String>) {
        if self.subscriptions.contains_key(&id) {
            self.on_update(id, fields);
            return;
        }
        let added = self.increment(&fields);
        self.subscriptions.insert(id, fields);
        self.observer.fields_changed(&added, &BTreeSet::new());
    }

    /// Diff a subscriber's new field set against its previous one
    pub fn on_update(&mut self, id: SubscriberId, fields: BTreeSet<String>) {
        let previous = self.subscriptions.remove(&id).unwrap_or_default();
        let gained: BTreeSet<String> = fields.difference(&previous).cloned().collect();
        let lost: BTreeSet<String> = previous.difference(&fields).cloned().collect();

        let added = self.increment(&gained);
        let removed = self.decrement(&lost);
        self.subscriptions.insert(id, fields);
        self.observer.fields_changed(&added, &removed);
    }

    /// Release every field held by a subscriber
    pub fn on_unsubscribe(&mut self, id: SubscriberId) {
        let previous = self.subscriptions.remove(&id).unwrap_or_default();
        let removed = self.decrement(&previous);
        self.observer.fields_changed(&BTreeSet::new(), &removed);
    }

    fn increment(&mut self, fields: &BTreeSet<String>) -> BTreeSet<String> {
        let mut added = BTreeSet::new();
        for field in fields {
            let count = self.fields.entry(field.clone()).or_insert(0);
            if *count == 0 {
                added.insert(field.clone());
            }
            *count += 1;
        }
        added
    }

    fn decrement(&mut self, fields: &BTreeSet<String>) -> BTreeSet<String> {
        let mut removed = BTreeSet::new();
        for field in fields {
            match self.fields.get_mut(field) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    self.fields.remove(field);
                    removed.insert(field.clone());
                }
                None => {}
            }
        }
        removed
    }
}

/// Tracker that ignores requests for fields outside a fixed allowed set
pub struct LimitedSubscriptionFieldTracker<O> {
    tracker: SubscriptionFieldTracker<O>,
    allowed: BTreeSet<String>,
}

impl<O: FieldObserver> LimitedSubscriptionFieldTracker<O> {
    pub fn new(observer: O, allowed: BTreeSet<String>) -> Self {
        Self {
            tracker: SubscriptionFieldTracker::new(observer),
            allowed,
        }
    }

    fn clamp(&self, fields: BTreeSet<String>) -> BTreeSet<String> {
        fields
            .into_iter()
            .filter(|field| self.allowed.contains(field))
            .collect()
    }

    pub fn fields(&self) -> BTreeSet<String> {
        self.tracker.fields()
    }

    pub fn count(&self, field: &str) -> usize {
        self.tracker.count(field)
    }

    pub fn on_subscribe(&mut self, id: SubscriberId, fields: BTreeSet<String>) {
        let fields = self.clamp(fields);
        self.tracker.on_subscribe(id, fields);
    }

    pub fn on_update(&mut self, id: SubscriberId, fields: BTreeSet<String>) {
        let fields = self.clamp(fields);
        self.tracker.on_update(id, fields);
    }

    pub fn on_unsubscribe(&mut self, id: SubscriberId) {
        self.tracker.on_unsubscribe(id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn set(fields: &[&str]) -> BTreeSet<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    type Log = Arc<Mutex<Vec<(Vec<String>, Vec<String>)>>>;

    fn tracker() -> (SubscriptionFieldTracker<impl FieldObserver>, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let log2 = Arc::clone(&log);
        let observer = UpdateFields(move |added: &BTreeSet<String>, removed: &BTreeSet<String>| {
            log2.lock().unwrap().push((
                added.iter().cloned().collect(),
                removed.iter().cloned().collect(),
            ));
        });
        (SubscriptionFieldTracker::new(observer), log)
    }

    #[test]
    fn test_only_zero_crossings_reported() {
        let (mut tracker, log) = tracker();

        tracker.on_subscribe(SubscriberId(1), set(&["bid", "ask"]));
        tracker.on_subscribe(SubscriberId(2), set(&["bid", "last"]));
        assert_eq!(tracker.count("bid"), 2);

        tracker.on_unsubscribe(SubscriberId(1));
        tracker.on_unsubscribe(SubscriberId(2));

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].0, vec!["ask", "bid"]);
        assert_eq!(log[1].0, vec!["last"]);
        assert_eq!(log[2].1, vec!["ask"]);
        assert_eq!(log[3].1, vec!["bid", "last"]);
    }

    #[test]
    fn test_update_diffs_previous_set() {
        let (mut tracker, log) = tracker();

        tracker.on_subscribe(SubscriberId(1), set(&["bid", "ask"]));
        tracker.on_update(SubscriberId(1), set(&["ask", "volume"]));

        assert_eq!(tracker.fields(), set(&["ask", "volume"]));
        let log = log.lock().unwrap();
        assert_eq!(log[1], (vec!["volume".to_string()], vec!["bid".to_string()]));
    }

    #[test]
    fn test_update_without_change_is_silent() {
        let (mut tracker, log) = tracker();
        tracker.on_subscribe(SubscriberId(1), set(&["bid"]));
        tracker.on_update(SubscriberId(1), set(&["bid"]));
        tracker.on_unsubscribe(SubscriberId(9));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_separate_callbacks() {
        let added = Arc::new(Mutex::new(BTreeSet::new()));
        let removed = Arc::new(Mutex::new(BTreeSet::new()));
        let (a, r) = (Arc::clone(&added), Arc::clone(&removed));
        let mut tracker = SubscriptionFieldTracker::new(FieldCallbacks::new(
            move |f: &BTreeSet<String>| a.lock().unwrap().extend(f.iter().cloned()),
            move |f: &BTreeSet<String>| r.lock().unwrap().extend(f.iter().cloned()),
        ));

        tracker.on_subscribe(SubscriberId(1), set(&["bid"]));
        tracker.on_unsubscribe(SubscriberId(1));

        assert_eq!(*added.lock().unwrap(), set(&["bid"]));
        assert_eq!(*removed.lock().unwrap(), set(&["bid"]));
    }

    #[test]
    fn test_limited_tracker_clamps_requests() {
        let added = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::clone(&added);
        let mut tracker = LimitedSubscriptionFieldTracker::new(
            FieldCallbacks::new(
                move |f: &BTreeSet<String>| a.lock().unwrap().push(f.clone()),
                |_: &BTreeSet<String>| {},
            ),
            set(&["bid", "ask"]),
        );

        tracker.on_subscribe(SubscriberId(1), set(&["bid", "secret"]));
        tracker.on_update(SubscriberId(1), set(&["ask", "secret"]));

        assert_eq!(tracker.fields(), set(&["ask"]));
        assert_eq!(tracker.count("secret"), 0);
        assert_eq!(*added.lock().unwrap(), vec![set(&["bid"]), set(&["ask"])]);
    }
}
