use spark_weave::{
    cleanup_scope, cloned, computation, flush, list, object, scheduled_computation, wrap,
    Callable, Observable, Value,
};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn showcase_basics() {
    let state = wrap(&object! { "count" => 1, "multiplier" => 10 });
    let result = Rc::new(Cell::new(0.0));

    // Captures 'state' and 'result' without manual clones
    let _c = computation(cloned!(state, result => move || {
        let count = state.get("count").as_f64().unwrap_or_default();
        let multiplier = state.get("multiplier").as_f64().unwrap_or_default();
        result.set(count * multiplier);
    }));
    assert_eq!(result.get(), 10.0);

    state.set("count", 3);
    assert_eq!(result.get(), 30.0);
}

#[test]
fn showcase_computation_macro() {
    let todos = wrap(&list!["write", "test"]);
    let open = Rc::new(Cell::new(0));

    let _c = computation!(todos, open => open.set(todos.len()));
    assert_eq!(open.get(), 2);

    todos.push(["ship"]);
    assert_eq!(open.get(), 3);
}

#[test]
fn showcase_nested_state() {
    let state = wrap(&object! {
        "user" => object! { "name" => "ada", "tags" => list!["admin"] },
    });

    let user: Observable = state.get("user").as_observable().unwrap();
    assert_eq!(user.get("name"), Value::from("ada"));

    // Same wrapper every time
    assert!(user.ptr_eq(&state.get("user").as_observable().unwrap()));
}

#[test]
fn showcase_callable_with_context() {
    let counter = wrap(&object! { "count" => 0 });
    counter.set(
        "increment",
        Callable::new(|this| {
            let n = this.get("count").as_f64().unwrap_or_default();
            this.set("count", n + 1.0);
            Ok(Value::Undefined)
        }),
    );

    let increment = counter.get("increment");
    let increment = increment.as_callable().unwrap();
    increment.call(&counter).unwrap();
    increment.call(&counter).unwrap();
    assert_eq!(counter.get("count"), Value::from(2));
}

#[test]
fn showcase_scoped_batching() {
    let state = wrap(&object! { "a" => 0, "b" => 0 });
    let runs = Rc::new(Cell::new(0));

    let scope = cleanup_scope();
    scope.run(cloned!(state, runs => move || {
        scheduled_computation(move || {
            let _ = (state.get("a"), state.get("b"));
            runs.set(runs.get() + 1);
        });
    }));

    state.set("a", 1);
    state.set("b", 1);
    flush();
    assert_eq!(runs.get(), 2);

    scope.dispose();
    state.set("a", 2);
    flush();
    assert_eq!(runs.get(), 2);
}
