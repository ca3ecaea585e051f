use super::*;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Default)]
struct Counters {
    clicks: u32,
    label: Arc<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CounterField {
    Clicks,
    Label,
}

enum CounterUpdate {
    Clicks(u32),
    Label(Vec<String>),
}

impl StoreState for Counters {
    type Field = CounterField;
    type Update = CounterUpdate;

    fn apply(&mut self, update: CounterUpdate) {
        match update {
            CounterUpdate::Clicks(clicks) => self.clicks = clicks,
            CounterUpdate::Label(label) => self.label = Arc::new(label),
        }
    }

    fn field_changed(&self, previous: &Self, field: CounterField) -> bool {
        match field {
            CounterField::Clicks => self.clicks != previous.clicks,
            CounterField::Label => self.label != previous.label,
        }
    }
}

fn recorder() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(log: &Arc<Mutex<Vec<String>>>, entry: &str) {
    log.lock().expect("log").push(entry.to_string());
}

#[test]
fn callback_runs_only_when_its_field_changes() {
    let log = recorder();
    let mut store = Store::new(Counters::default());
    let seen = Arc::clone(&log);
    store.subscribe(CounterField::Clicks, move |state: &Counters, _| {
        record(&seen, &format!("clicks={}", state.clicks));
    });

    store.update([CounterUpdate::Clicks(0)]).expect("update");
    store.update([CounterUpdate::Label(vec!["a".into()])]).expect("update");
    assert!(log.lock().expect("log").is_empty());

    let notified = store.update([CounterUpdate::Clicks(2)]).expect("update");
    assert_eq!(notified, 1);
    assert_eq!(*log.lock().expect("log"), vec!["clicks=2"]);
}

#[test]
fn equal_replacement_is_not_a_change() {
    let log = recorder();
    let mut store = Store::new(Counters::default());
    let seen = Arc::clone(&log);
    store.subscribe(CounterField::Label, move |_, _| record(&seen, "label"));

    store
        .update([CounterUpdate::Label(vec!["x".into()])])
        .expect("update");
    store
        .update([CounterUpdate::Label(vec!["x".into()])])
        .expect("update");
    store
        .update([CounterUpdate::Label(vec!["y".into()])])
        .expect("update");

    assert_eq!(log.lock().expect("log").len(), 2);
}

#[test]
fn subscribers_on_same_field_fire_once_each_in_registration_order() {
    let log = recorder();
    let mut store = Store::new(Counters::default());
    for name in ["first", "second"] {
        let seen = Arc::clone(&log);
        store.subscribe(CounterField::Clicks, move |_, _| record(&seen, name));
    }

    store.update([CounterUpdate::Clicks(1)]).expect("update");
    assert_eq!(*log.lock().expect("log"), vec!["first", "second"]);
}

#[test]
fn same_callback_registered_twice_runs_twice() {
    let log = recorder();
    let mut store = Store::new(Counters::default());
    for _ in 0..2 {
        let seen = Arc::clone(&log);
        store.subscribe(CounterField::Clicks, move |_, _| record(&seen, "hit"));
    }
    store.update([CounterUpdate::Clicks(3)]).expect("update");
    assert_eq!(log.lock().expect("log").len(), 2);
}

#[test]
fn callbacks_observe_fully_merged_state() {
    let log = recorder();
    let mut store = Store::new(Counters::default());
    let seen = Arc::clone(&log);
    store.subscribe(CounterField::Clicks, move |state: &Counters, _| {
        record(&seen, &format!("{}:{}", state.clicks, state.label.join(",")));
    });

    store
        .update([
            CounterUpdate::Clicks(4),
            CounterUpdate::Label(vec!["late".into()]),
        ])
        .expect("update");
    assert_eq!(*log.lock().expect("log"), vec!["4:late"]);
}

#[test]
fn last_write_in_a_batch_wins() {
    let mut store = Store::new(Counters::default());
    store
        .update([CounterUpdate::Clicks(1), CounterUpdate::Clicks(7)])
        .expect("update");
    assert_eq!(store.values().clicks, 7);
}

#[test]
fn unsubscribed_callback_no_longer_runs() {
    let log = recorder();
    let mut store = Store::new(Counters::default());
    let seen = Arc::clone(&log);
    let id = store.subscribe(CounterField::Clicks, move |_, _| record(&seen, "hit"));

    assert!(store.unsubscribe(id));
    assert!(!store.unsubscribe(id));
    assert_eq!(store.subscriber_count(), 0);

    store.update([CounterUpdate::Clicks(9)]).expect("update");
    assert!(log.lock().expect("log").is_empty());
}

#[test]
fn deferred_updates_run_after_the_current_round() {
    let log = recorder();
    let mut store = Store::new(Counters::default());

    let seen = Arc::clone(&log);
    store.subscribe(
        CounterField::Clicks,
        move |state: &Counters, deferred: &mut Deferred<Counters>| {
            record(&seen, &format!("clicks={}", state.clicks));
            if state.clicks == 1 {
                deferred.update([CounterUpdate::Label(vec!["one".into()])]);
            }
        },
    );
    let seen = Arc::clone(&log);
    store.subscribe(CounterField::Clicks, move |_, _| record(&seen, "second"));
    let seen = Arc::clone(&log);
    store.subscribe(CounterField::Label, move |state: &Counters, _| {
        record(&seen, &format!("label={}", state.label.join(",")));
    });

    let notified = store.update([CounterUpdate::Clicks(1)]).expect("update");
    assert_eq!(notified, 3);
    assert_eq!(
        *log.lock().expect("log"),
        vec!["clicks=1", "second", "label=one"]
    );
}

#[test]
fn self_feeding_callback_is_cut_off() {
    let mut store = Store::new(Counters::default());
    store.subscribe(
        CounterField::Clicks,
        |state: &Counters, deferred: &mut Deferred<Counters>| {
            deferred.update([CounterUpdate::Clicks(state.clicks + 1)]);
        },
    );

    let err = store
        .update([CounterUpdate::Clicks(1)])
        .expect_err("cycle");
    assert_eq!(
        err,
        StoreError::UpdateCycle {
            rounds: MAX_UPDATE_ROUNDS
        }
    );
    assert_eq!(store.values().clicks, MAX_UPDATE_ROUNDS as u32);
}
