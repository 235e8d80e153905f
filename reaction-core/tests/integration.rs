//! Integration Tests for Reactive System
//!
//! These tests verify that vars, calcs, actions and fields work together
//! correctly, including the close cascade and routine replacement.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use reaction_core::prelude::*;
use reaction_core::{InvalidationAction, InvalidationEvent, NodeKind, NodeState};

fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let runs = Rc::new(Cell::new(0));
    (Rc::clone(&runs), runs)
}

/// Test the profit scenario: every write settles before `set` returns.
#[test]
fn profit_follows_price_changes() {
    let buy_price = var(100);
    let current_price = var(105);
    let profit = calc(move || current_price.get() - buy_price.get());
    assert_eq!(profit.get(), 5);

    current_price.set(110);
    assert_eq!(profit.get(), 10);

    current_price.set(95);
    assert_eq!(profit.get(), -5);

    buy_price.set(90);
    assert_eq!(profit.get(), 5);
}

/// Test the same scenario built with an expression operand.
#[test]
fn profit_as_expression() {
    let buy_price = var(100.0_f64);
    let current_price = var(105.0_f64);
    let profit = current_price - buy_price;

    current_price.set(110.0);
    current_price.set(95.0);
    buy_price.set(90.0);
    assert_eq!(profit.get(), 5.0);
}

/// Test reset: a new routine, a wrong result type and a self-reference.
#[test]
fn reset_scenario() {
    let a = var(1);
    let label = calc(move || a.get().to_string());
    assert_eq!(label.get(), "1");

    let b = var(String::from("2"));
    assert_eq!(label.reset(move || b.get() + "set"), Ok(()));
    assert_eq!(label.get(), "2set");

    let err = label.reset(move || a.get()).unwrap_err();
    assert!(matches!(err, ReactionError::ReturnType { .. }));
    assert_eq!(label.get(), "2set");

    let err = label.reset(move || label.get()).unwrap_err();
    assert!(matches!(err, ReactionError::CycleDependency { .. }));
    assert!(err.is_configuration());
    assert_eq!(label.get(), "2set");

    // The committed routine still reacts; the old one is gone.
    b.set(String::from("3"));
    assert_eq!(label.get(), "3set");
    a.set(9);
    assert_eq!(label.get(), "3set");
}

/// Test that a failed reset leaves routine and edges untouched.
#[test]
fn failed_reset_keeps_edges() {
    let a = var(1);
    let first = calc(move || a.get() + 1);
    let second = calc(move || first.get() + 1);
    let before = Runtime::snapshot();

    assert!(first.reset(move || second.get()).is_err());

    let after = Runtime::snapshot();
    assert_eq!(
        before.node(first.node_id()).unwrap().dependencies,
        after.node(first.node_id()).unwrap().dependencies
    );
    assert!(after.is_acyclic());
}

#[derive(Clone, PartialEq)]
struct Person {
    name: Field<String>,
    age: Field<u32>,
}

/// Test that each field write notifies dependents of the owning var.
#[test]
fn field_aggregate_notifies_owner_dependents() {
    let person = Var::aggregate(|owner| Person {
        name: owner.field(String::from("Ada")),
        age: owner.field(36),
    });

    let (runs, count) = counter();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let _watch = action(move || {
        let Person { name, age } = person.get();
        let line = format!("{} {}", name.get_untracked(), age.get_untracked());
        sink.borrow_mut().push(line);
        count.set(count.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    let Person { name, age } = person.get_untracked();
    name.set(String::from("Grace"));
    assert_eq!(runs.get(), 2);

    age.set(37);
    assert_eq!(runs.get(), 3);

    assert_eq!(*seen.borrow(), vec!["Ada 36", "Grace 36", "Grace 37"]);
}

/// Test that a calc reading only one field ignores the other.
#[test]
fn field_dependents_are_independent() {
    let person = Var::aggregate(|owner| Person {
        name: owner.field(String::from("Ada")),
        age: owner.field(36),
    });
    let Person { name, age } = person.get_untracked();

    let (runs, count) = counter();
    let next_year = calc(move || {
        count.set(count.get() + 1);
        age.get() + 1
    });

    name.set(String::from("Grace"));
    assert_eq!(runs.get(), 1);

    age.set(40);
    assert_eq!(next_year.get(), 41);
    assert_eq!(runs.get(), 2);
}

/// Test that DirectClose cascades through the whole chain.
#[test]
fn direct_close_cascades_transitively() {
    let before = Runtime::node_count();
    let a = var(1);
    let b = calc(move || a.get() + 1);
    let c = calc(move || b.get() + 1);
    let d = calc(move || c.get() + 1);
    let unrelated = var(0);

    a.close();

    assert!(!b.is_valid());
    assert!(!c.is_valid());
    assert!(!d.is_valid());
    assert!(unrelated.is_valid());
    assert_eq!(Runtime::node_count(), before + 1);
    assert_eq!(d.try_get(), Err(ReactionError::Closed(d.node_id())));
}

/// Test that closing an already-closed node does nothing.
#[test]
fn double_close_is_noop() {
    let a = var(1);
    a.close();
    a.close();
    assert_eq!(Runtime::state(a.node_id()), NodeState::Closed);
}

/// Test that `get` panics with the error message on a closed node.
#[test]
#[should_panic(expected = "is closed")]
fn get_on_closed_node_panics() {
    let a = var(1);
    a.close();
    a.get();
}

/// Test that KeepCalc keeps a node alive and reacting to what is left.
#[test]
fn keep_calc_survives_closed_dependency() {
    let a = var(1);
    let b = var(10);
    let sum = Calc::with_options(
        move || a.try_get().unwrap_or(0) + b.get(),
        NodeOptions::new().invalidation(KeepCalc),
    );
    let doubled = calc(move || sum.get() * 2);
    assert_eq!(sum.get(), 11);

    a.close();
    assert!(sum.is_valid());
    assert!(doubled.is_valid());
    assert_eq!(sum.get(), 11);

    b.set(20);
    assert_eq!(sum.get(), 20);
    assert_eq!(doubled.get(), 40);

    let snapshot = Runtime::snapshot();
    assert_eq!(snapshot.node(sum.node_id()).unwrap().dependencies, vec![b.node_id()]);
}

/// Test that LastVal freezes the closed dependency's last value.
#[test]
fn last_val_freezes_closed_dependency() {
    let rate = var(5);
    let amount = var(1);
    let total = Calc::with_options(
        move || rate.get() * amount.get(),
        NodeOptions::new().invalidation(LastVal),
    );

    rate.set(7);
    rate.close();
    assert!(total.is_valid());
    assert!(rate.try_get().is_err());

    amount.set(3);
    assert_eq!(total.get(), 21);

    let snapshot = Runtime::snapshot();
    let node = snapshot.node(total.node_id()).unwrap();
    assert_eq!(node.dependencies, vec![amount.node_id()]);
    assert_eq!(node.frozen, vec![rate.node_id()]);
}

/// Test that LastVal keeps the value its node last received, not one the
/// dependency's policy held back.
#[test]
fn last_val_freezes_the_value_last_received() {
    let rate = Var::with_options(1, NodeOptions::new().trigger(Threshold::new()));
    let amount = var(10);
    let total = Calc::with_options(
        move || rate.get() * amount.get(),
        NodeOptions::new().invalidation(LastVal),
    );
    assert_eq!(total.get(), 10);

    rate.set(5);
    assert_eq!(total.get(), 10);

    rate.close();
    amount.set(11);
    assert_eq!(total.get(), 11);
}

/// Test that a reset which stops reading a frozen dependency drops it.
#[test]
fn reset_drops_frozen_values_no_longer_read() {
    let rate = var(2);
    let amount = var(3);
    let total = Calc::with_options(
        move || rate.get() * amount.get(),
        NodeOptions::new().invalidation(LastVal),
    );

    rate.close();
    amount.set(4);
    assert_eq!(total.get(), 8);
    let frozen = Runtime::snapshot().node(total.node_id()).unwrap().frozen.clone();
    assert_eq!(frozen, vec![rate.node_id()]);

    total.reset(move || amount.get() + 1).unwrap();
    assert_eq!(total.get(), 5);
    assert!(Runtime::snapshot().node(total.node_id()).unwrap().frozen.is_empty());
}

/// Test that strategies only govern their own node.
#[test]
fn mixed_strategies_along_a_chain() {
    let a = var(2);
    let kept = Calc::with_options(
        move || a.try_get().unwrap_or(-1),
        NodeOptions::new().invalidation(KeepCalc),
    );
    let closed = calc(move || a.get() * 100);
    let downstream = calc(move || kept.get() + 1);

    a.close();
    assert!(kept.is_valid());
    assert!(!closed.is_valid());
    assert!(downstream.is_valid());
}

/// Test a custom invalidation strategy.
#[test]
fn custom_invalidation_strategy() {
    let primary = var(1);
    let fallback = var(2);
    let watched = primary.node_id();
    let closed_deps = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&closed_deps);

    let choice = Calc::with_options(
        move || primary.try_get().unwrap_or(0) + fallback.try_get().unwrap_or(0),
        NodeOptions::new().invalidation(move |event: &InvalidationEvent| {
            log.borrow_mut().push(event.closed());
            if event.closed() == watched {
                InvalidationAction::Keep
            } else {
                InvalidationAction::Close
            }
        }),
    );

    primary.close();
    assert!(choice.is_valid());

    fallback.close();
    assert!(!choice.is_valid());
    assert_eq!(*closed_deps.borrow(), vec![primary.node_id(), fallback.node_id()]);
}

/// Test Changed: one evaluation per differing write, none otherwise.
#[test]
fn changed_trigger_counts_evaluations() {
    let (runs, count) = counter();
    let source = var(0);
    let _derived = calc(move || {
        count.set(count.get() + 1);
        source.get()
    });

    for value in [0, 1, 1, 2, 2, 2, 0] {
        source.set(value);
    }
    assert_eq!(runs.get(), 4);
}

/// Test Always: an action runs once per upstream evaluation, equal or not.
#[test]
fn always_trigger_runs_action_per_evaluation() {
    let (runs, count) = counter();
    let source = var(0);
    let echo = Calc::with_options(move || source.get() / 10, NodeOptions::new().trigger(Always));
    let _effect = action(move || {
        echo.get();
        count.set(count.get() + 1);
    });

    // Each write changes `source`, but `echo` stays 0.
    for value in 1..=5 {
        source.set(value);
    }
    assert_eq!(echo.get(), 0);
    assert_eq!(runs.get(), 6);
}

/// Test Threshold: propagate only while the predicate holds, never before
/// it is configured.
#[test]
fn threshold_trigger_gates_propagation() {
    let price = var(10);
    let limit = var(15);
    let alert = Calc::with_options(
        move || price.get(),
        NodeOptions::new().trigger(Threshold::new()),
    );
    let (runs, count) = counter();
    let _notify = action(move || {
        alert.get();
        count.set(count.get() + 1);
    });

    price.set(20);
    assert_eq!(runs.get(), 1);

    alert
        .configure_threshold(move || price.get() > limit.get())
        .unwrap();

    price.set(30);
    assert_eq!(runs.get(), 2);

    price.set(12);
    assert_eq!(runs.get(), 2);

    // The predicate's reads are not dependencies.
    limit.set(5);
    assert_eq!(runs.get(), 2);
    assert_eq!(
        Runtime::snapshot().node(alert.node_id()).unwrap().dependencies,
        vec![price.node_id()]
    );

    price.set(13);
    assert_eq!(runs.get(), 3);
}

/// Test that only threshold nodes accept a predicate.
#[test]
fn configure_threshold_requires_threshold_trigger() {
    let plain = var(1);
    assert_eq!(
        plain.configure_threshold(|| true),
        Err(ReactionError::NotThreshold(plain.node_id()))
    );

    plain.close();
    assert_eq!(
        plain.configure_threshold(|| true),
        Err(ReactionError::Closed(plain.node_id()))
    );
}

/// Test a closure used as a trigger policy.
#[test]
fn custom_trigger_policy() {
    let (runs, count) = counter();
    let level = Var::with_options(
        0,
        NodeOptions::new().trigger(|change: &reaction_core::Change<'_>| {
            matches!(
                (change.old_value::<i32>(), change.new_value::<i32>()),
                (Some(old), Some(new)) if (new - old).abs() >= 10
            )
        }),
    );
    let _effect = action(move || {
        level.get();
        count.set(count.get() + 1);
    });

    level.set(5);
    level.set(9);
    assert_eq!(runs.get(), 1);

    level.set(19);
    assert_eq!(runs.get(), 2);
}

/// Test that a panicking trigger policy reaches the caller, and that the
/// nodes its sweep never reached are settled by the next write.
#[test]
fn panicking_trigger_policy_reaches_the_caller() {
    let input = var(0);
    let doubled = Calc::with_options(
        move || input.get() * 2,
        NodeOptions::new().trigger(|change: &reaction_core::Change<'_>| {
            if change.new_value::<i32>() == Some(&4) {
                panic!("policy rejected 4");
            }
            change.value_changed()
        }),
    );
    let seen = Rc::new(Cell::new(0));
    let sink = Rc::clone(&seen);
    let _record = action(move || sink.set(doubled.get()));

    let result = panic::catch_unwind(AssertUnwindSafe(|| input.set(2)));
    assert!(result.is_err());
    assert_eq!(seen.get(), 0);

    input.set(3);
    assert_eq!(doubled.get(), 6);
    assert_eq!(seen.get(), 6);
    assert!(Runtime::snapshot().is_consistent());
}

/// Test that a routine panicking mid-sweep does not starve the actions
/// below the nodes the sweep skipped.
#[test]
fn panicking_routine_does_not_starve_actions() {
    let a = var(0);
    let failed = Rc::new(Cell::new(false));
    let flag = Rc::clone(&failed);
    let _mid = calc(move || {
        let value = a.get();
        if value == 1 && !flag.replace(true) {
            panic!("routine failed");
        }
        value
    });
    let b = calc(move || a.get() * 10);
    let seen = Rc::new(Cell::new(0));
    let sink = Rc::clone(&seen);
    let _record = action(move || sink.set(b.get()));

    let result = panic::catch_unwind(AssertUnwindSafe(|| a.set(1)));
    assert!(result.is_err());
    assert!(failed.get());

    assert_eq!(b.get(), 10);
    assert_eq!(seen.get(), 10);

    a.set(2);
    assert_eq!(seen.get(), 20);
}

/// Test an action writing another var: the second sweep finishes first.
#[test]
fn action_writes_cascade_synchronously() {
    let celsius = var(0.0_f64);
    let fahrenheit = var(32.0_f64);
    let _sync = action(move || fahrenheit.set(celsius.get() * 9.0 / 5.0 + 32.0));
    let label = calc(move || format!("{}F", fahrenheit.get()));

    celsius.set(100.0);
    assert_eq!(fahrenheit.get(), 212.0);
    assert_eq!(label.get(), "212F");
}

/// Test `untrack` inside a calc.
#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = var(1);
    let ignored = var(100);
    let sum = calc(move || tracked.get() + untrack(|| ignored.get()));

    ignored.set(200);
    assert_eq!(sum.get(), 101);

    tracked.set(2);
    assert_eq!(sum.get(), 202);
}

/// Test snapshots: kinds, names, symmetry, serialization.
#[test]
fn snapshot_describes_the_graph() {
    let a = Var::with_options(1, NodeOptions::new().name("a"));
    let b = calc(move || a.get() + 1);
    let effect = action(move || {
        b.get();
    });

    let snapshot = Runtime::snapshot();
    assert!(snapshot.is_consistent());
    assert!(snapshot.is_acyclic());

    let node_a = snapshot.node(a.node_id()).unwrap();
    assert_eq!(node_a.kind, NodeKind::Source);
    assert_eq!(node_a.name.as_deref(), Some("a"));
    assert_eq!(node_a.dependents, vec![b.node_id()]);
    assert_eq!(snapshot.node(effect.node_id()).unwrap().kind, NodeKind::Effect);
    assert_eq!(snapshot.node(b.node_id()).unwrap().value_type, "i32");

    let json = serde_json::to_value(&snapshot).unwrap();
    let nodes = json["nodes"].as_array().unwrap();
    let first = nodes
        .iter()
        .find(|node| node["id"] == a.node_id().raw())
        .unwrap();
    assert_eq!(first["kind"], "source");
    assert_eq!(first["state"], "active");
    assert_eq!(first["name"], "a");
    assert!(first.get("owner").is_none());
}

/// Test that teardown invalidates every handle on the thread.
#[test]
fn teardown_clears_the_registry() {
    let a = var(1);
    let b = calc(move || a.get());

    Runtime::teardown();

    assert_eq!(Runtime::node_count(), 0);
    assert!(!a.is_valid());
    assert!(b.try_get().is_err());

    // The thread keeps working afterwards.
    let c = var(3);
    assert_eq!(c.get(), 3);
}

/// Test that handles do not resolve on another thread.
#[test]
fn registry_is_per_thread() {
    let a = var(1);
    let id = a.node_id();

    let seen = std::thread::spawn(move || Runtime::is_valid(id)).join().unwrap();
    assert!(!seen);
    assert!(a.is_valid());
}
