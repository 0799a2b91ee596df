//! Integration Tests for the Reactive System
//!
//! These tests exercise the public surface the way an embedding would:
//! stores, refs, computeds, watchers and the job queue working together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use filament_core::reactive::{
    computed, create_effect, flush_jobs, has_pending_jobs, is_reactive, make_reactive, queue_job,
    reactive, ref_value, to_ref, watch, Job, ReactiveEffect, WatchOptions,
};
use filament_core::{Obj, Value};

/// Serializes tests that drive the process-wide job queue.
fn flush_lock() -> parking_lot::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock()
}

/// Wrap `f` in an effect whose re-runs go through the job queue, the way a
/// render effect would.
fn queued_effect<F>(f: F) -> ReactiveEffect
where
    F: Fn() + Send + Sync + 'static,
{
    let slot: Arc<Mutex<Option<ReactiveEffect>>> = Arc::new(Mutex::new(None));

    let job: Job = {
        let slot = slot.clone();
        Arc::new(move || {
            let effect = slot.lock().clone();
            if let Some(effect) = effect {
                effect.run();
            }
        })
    };

    let effect = ReactiveEffect::new(f, Some(Box::new(move || queue_job(&job))));
    *slot.lock() = Some(effect.clone());
    effect.run();
    effect
}

#[test]
fn wrapping_is_idempotent_and_identity_preserving() {
    let source = Obj::new();
    source.insert("x", 1);

    let once = make_reactive(Value::Object(source.clone()));
    let twice = make_reactive(once.clone());

    // Same wrapper both times, and wrapping the wrapper changes nothing.
    assert_eq!(once, twice);
    assert_eq!(once, make_reactive(Value::Object(source)));
    assert!(is_reactive(&once));
}

#[test]
fn equal_writes_do_not_notify() {
    let state = reactive([("name", "dante")]);
    let runs = Arc::new(AtomicUsize::new(0));

    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let _effect = create_effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let _ = state_clone.get("name");
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("name", "dante");
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("name", "vergil");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn branch_switch_retracks_dependencies() {
    let state = reactive([
        ("flag", Value::Bool(true)),
        ("a", Value::Int(0)),
        ("b", Value::Int(0)),
    ]);
    let runs = Arc::new(AtomicUsize::new(0));

    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let _effect = create_effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        if state_clone.get("flag").as_bool().unwrap_or(false) {
            let _ = state_clone.get("a");
        } else {
            let _ = state_clone.get("b");
        }
    });

    state.set("flag", false);
    let after_flip = runs.load(Ordering::SeqCst);

    // The branch no longer read must stay silent.
    state.set("a", 1);
    assert_eq!(runs.load(Ordering::SeqCst), after_flip);

    // The branch now read must notify.
    state.set("b", 1);
    assert_eq!(runs.load(Ordering::SeqCst), after_flip + 1);
}

#[test]
fn computed_getter_runs_exactly_once_per_change() {
    let state = reactive([("n", 10)]);
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_clone = calls.clone();
    let state_clone = state.clone();
    let squared = computed(move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        let n = state_clone.get("n").as_int().unwrap_or(0);
        Value::Int(n * n)
    });

    for _ in 0..5 {
        assert_eq!(squared.get(), Value::Int(100));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    state.set("n", 3);
    for _ in 0..5 {
        assert_eq!(squared.get(), Value::Int(9));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn computed_chain_propagates_through_effects() {
    let state = reactive([("n", 1)]);

    let state_clone = state.clone();
    let doubled = computed(move |_| {
        Value::Int(state_clone.get("n").as_int().unwrap_or(0) * 2)
    });

    let doubled_clone = doubled.clone();
    let plus_ten = computed(move |_| {
        Value::Int(doubled_clone.get().as_int().unwrap_or(0) + 10)
    });

    let observed: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let observed_clone = observed.clone();
    let plus_ten_reader = plus_ten.clone();
    let _effect = create_effect(move || {
        observed_clone.lock().push(plus_ten_reader.get());
    });

    state.set("n", 5);

    let observed = observed.lock();
    assert_eq!(*observed, vec![Value::Int(12), Value::Int(20)]);
}

#[test]
fn batched_mutations_collapse_to_one_job_execution() {
    let _serial = flush_lock();

    let state = reactive([("a", 0), ("b", 0), ("c", 0)]);
    let runs = Arc::new(AtomicUsize::new(0));

    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let _effect = queued_effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let _ = state_clone.get("a");
        let _ = state_clone.get("b");
        let _ = state_clone.get("c");
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Three writes the effect depends on, inside one synchronous unit.
    state.set("a", 1);
    state.set("b", 2);
    state.set("c", 3);
    assert_eq!(runs.load(Ordering::SeqCst), 1, "deferred past the writes");
    assert!(has_pending_jobs());

    flush_jobs();
    assert_eq!(runs.load(Ordering::SeqCst), 2, "exactly one batched re-run");
}

#[test]
fn effect_log_scenario() {
    let _serial = flush_lock();

    let state = reactive([("count", 0)]);
    let log: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));

    let log_clone = log.clone();
    let state_clone = state.clone();
    let _effect = queued_effect(move || {
        if let Some(count) = state_clone.get("count").as_int() {
            log_clone.lock().push(count);
        }
    });
    assert_eq!(*log.lock(), vec![0]);

    state.set("count", 1);
    flush_jobs();
    assert_eq!(*log.lock(), vec![0, 1]);

    // Same value again: suppressed before it ever reaches the queue.
    state.set("count", 1);
    flush_jobs();
    assert_eq!(*log.lock(), vec![0, 1]);
}

#[test]
fn stopped_effect_neither_tracks_nor_notifies() {
    let state = reactive([("n", 0)]);
    let runs = Arc::new(AtomicUsize::new(0));

    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let effect = create_effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let _ = state_clone.get("n");
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    effect.stop();

    // No notification ever again.
    state.set("n", 1);
    state.set("n", 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Direct runs still execute the function, without re-subscribing.
    effect.run();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    state.set("n", 3);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn watch_sees_writes_made_through_object_refs() {
    let state = reactive([("title", "draft")]);
    let title = to_ref(&state, "title");

    let seen: Arc<Mutex<Vec<(Option<Value>, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let _handle = watch(
        &state,
        move |old, new, _| {
            seen_clone.lock().push((old, new));
        },
        WatchOptions::default(),
    );

    title.set("published");

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    // Object sources report the object itself; the field carries the change.
    assert_eq!(state.get_untracked("title"), Value::from("published"));
}

#[test]
fn watch_cleanup_runs_before_the_next_invocation_only() {
    let version = ref_value(0);
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let log_clone = log.clone();
    let _handle = watch(
        &version,
        move |_, new, on_cleanup| {
            let tag = new.to_text();
            log_clone.lock().push(format!("start {tag}"));
            let log_cleanup = log_clone.clone();
            on_cleanup.register(move || {
                log_cleanup.lock().push(format!("cancel {tag}"));
            });
        },
        WatchOptions::default(),
    );

    version.set(1);
    version.set(2);

    let log = log.lock();
    assert_eq!(*log, vec!["start 1", "cancel 1", "start 2"]);
}

#[test]
fn nested_state_loaded_from_json_is_fully_reactive() {
    let json: serde_json::Value =
        serde_json::from_str(r#"{"user":{"name":"dante","stats":{"hp":100}}}"#).unwrap();
    let root = make_reactive(Value::from(json));
    let state = root.as_object().unwrap().clone();

    let runs = Arc::new(AtomicUsize::new(0));
    let runs_clone = runs.clone();
    let state_clone = state.clone();
    let _effect = create_effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let user = state_clone.get("user");
        if let Some(user) = user.as_object() {
            let stats = user.get("stats");
            if let Some(stats) = stats.as_object() {
                let _ = stats.get("hp");
            }
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // A deep write reaches the effect because wrapping propagated on read.
    let stats = state
        .get_untracked("user")
        .as_object()
        .unwrap()
        .get_untracked("stats")
        .as_object()
        .unwrap()
        .clone();
    stats.set("hp", 50);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}
