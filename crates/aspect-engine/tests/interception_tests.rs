use aspect_engine::{
    AspectError, Callback, Class, Engine, Object, Runtime, RuntimeResult, Selector, Target, Timing, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

type Log = Arc<Mutex<Vec<String>>>;

const TRANSFER: &str = "transfer:to:fee:urgent:";

struct Fixture {
    runtime: Arc<Runtime>,
    engine: Engine,
    log: Log,
    account: Class,
}

fn fixture() -> Fixture {
    let runtime = Arc::new(Runtime::new());
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let account = runtime.define_class("Account", None).unwrap();

    let l = log.clone();
    account
        .define_method(TRANSFER, "v@:q@dB", move |inv| {
            let amount = inv.argument(0)?.as_i64().unwrap_or_default();
            l.lock().push(format!("original {}", amount));
            Ok(Value::Void)
        })
        .unwrap();
    let l = log.clone();
    account
        .define_method("ping", "v@:", move |_| {
            l.lock().push("ping".to_string());
            Ok(Value::Void)
        })
        .unwrap();

    Fixture {
        engine: Engine::new(runtime.clone()),
        runtime,
        log,
        account,
    }
}

fn note(log: &Log, tag: &'static str) -> Callback {
    let log = log.clone();
    Callback::context(move |_| log.lock().push(tag.to_string()))
}

fn transfer(obj: &Object, amount: i64, to: &Object) -> RuntimeResult<Value> {
    obj.send(
        &Selector::new(TRANSFER),
        &[
            Value::from(amount),
            Value::from(to.clone()),
            Value::from(0.5f64),
            Value::from(true),
        ],
    )
}

fn ping(obj: &Object) {
    obj.send(&Selector::new("ping"), &[]).unwrap();
}

fn take(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock())
}

// ============================================================================
// Argument Capture Tests
// ============================================================================

#[test]
fn test_before_receives_decoded_arguments() {
    let f = fixture();
    let obj = Object::new(&f.account);
    let payee = Object::new(&f.account);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = seen.clone();
    let l = f.log.clone();
    f.engine
        .hook_object(
            &obj,
            TRANSFER,
            Timing::Before,
            Callback::from_encoding("v@?@q@dB", move |_, args| {
                s.lock().extend_from_slice(args);
                l.lock().push("before".to_string());
                Ok(())
            }),
        )
        .unwrap();

    transfer(&obj, 250, &payee).unwrap();

    assert_eq!(take(&f.log), vec!["before", "original 250"]);
    assert_eq!(
        *seen.lock(),
        vec![
            Value::from(250i64),
            Value::from(payee),
            Value::from(0.5f64),
            Value::from(true),
        ]
    );
}

#[test]
fn test_typed_callback_receives_prefix() {
    let f = fixture();
    let obj = Object::new(&f.account);
    let payee = Object::new(&f.account);
    let seen = Arc::new(Mutex::new(None));

    let s = seen.clone();
    f.engine
        .hook_object(
            &obj,
            TRANSFER,
            Timing::After,
            Callback::args2(move |_, amount: i64, to: Object| {
                *s.lock() = Some((amount, to));
            }),
        )
        .unwrap();

    transfer(&obj, 17, &payee).unwrap();
    assert_eq!(*seen.lock(), Some((17, payee)));
}

// ============================================================================
// Ordering Tests
// ============================================================================

#[test]
fn test_instead_suppresses_original() {
    let f = fixture();
    let obj = Object::new(&f.account);
    let payee = Object::new(&f.account);

    f.engine.hook_object(&obj, TRANSFER, Timing::Before, note(&f.log, "before")).unwrap();
    f.engine.hook_object(&obj, TRANSFER, Timing::Instead, note(&f.log, "instead 1")).unwrap();
    f.engine.hook_object(&obj, TRANSFER, Timing::Instead, note(&f.log, "instead 2")).unwrap();
    f.engine.hook_object(&obj, TRANSFER, Timing::After, note(&f.log, "after")).unwrap();

    transfer(&obj, 5, &payee).unwrap();
    assert_eq!(take(&f.log), vec!["before", "instead 1", "instead 2", "after"]);
}

#[test]
fn test_before_original_after_order() {
    let f = fixture();
    let obj = Object::new(&f.account);
    let payee = Object::new(&f.account);

    // Registration order interleaves timings on purpose
    f.engine.hook_object(&obj, TRANSFER, Timing::After, note(&f.log, "after 1")).unwrap();
    f.engine.hook_object(&obj, TRANSFER, Timing::Before, note(&f.log, "before 1")).unwrap();
    f.engine.hook_object(&obj, TRANSFER, Timing::After, note(&f.log, "after 2")).unwrap();
    f.engine.hook_object(&obj, TRANSFER, Timing::Before, note(&f.log, "before 2")).unwrap();

    transfer(&obj, 9, &payee).unwrap();
    assert_eq!(
        take(&f.log),
        vec!["before 1", "before 2", "original 9", "after 1", "after 2"]
    );

    // Every call runs the interceptors again
    transfer(&obj, 10, &payee).unwrap();
    assert_eq!(take(&f.log).len(), 5);
}

// ============================================================================
// Scope Tests
// ============================================================================

#[test]
fn test_type_hook_applies_to_all_instances() {
    let f = fixture();
    let existing = Object::new(&f.account);
    f.engine.hook_type(&f.account, "ping", Timing::Before, note(&f.log, "hook")).unwrap();
    let later = Object::new(&f.account);

    ping(&existing);
    ping(&later);
    assert_eq!(take(&f.log), vec!["hook", "ping", "hook", "ping"]);

    // Type-level hooks never move objects onto shadow classes
    assert_eq!(existing.isa(), f.account);
    assert_eq!(f.engine.shadow_count(), 0);
}

#[test]
fn test_instance_hook_does_not_affect_siblings() {
    let f = fixture();
    let hooked = Object::new(&f.account);
    let sibling = Object::new(&f.account);

    f.engine.hook_object(&hooked, "ping", Timing::Before, note(&f.log, "hook")).unwrap();

    ping(&hooked);
    ping(&sibling);
    assert_eq!(take(&f.log), vec!["hook", "ping", "ping"]);
}

#[test]
fn test_sibling_on_shared_shadow_stays_unhooked() {
    let f = fixture();
    let a = Object::new(&f.account);
    let b = Object::new(&f.account);
    let payee = Object::new(&f.account);

    // Both objects end up on the same shadow, with different methods hooked
    f.engine.hook_object(&a, "ping", Timing::Before, note(&f.log, "a ping")).unwrap();
    f.engine.hook_object(&b, TRANSFER, Timing::Before, note(&f.log, "b transfer")).unwrap();
    assert_eq!(a.isa(), b.isa());

    ping(&b);
    transfer(&a, 1, &payee).unwrap();
    assert_eq!(take(&f.log), vec!["ping", "original 1"]);
}

#[test]
fn test_subclasses_do_not_leak() {
    let f = fixture();
    let left = f.runtime.define_class("Left", Some(&f.account)).unwrap();
    let right = f.runtime.define_class("Right", Some(&f.account)).unwrap();

    f.engine.hook_type(&left, "ping", Timing::Before, note(&f.log, "left")).unwrap();
    f.engine.hook_type(&right, "ping", Timing::Before, note(&f.log, "right")).unwrap();

    ping(&Object::new(&left));
    assert_eq!(take(&f.log), vec!["left", "ping"]);
    ping(&Object::new(&right));
    assert_eq!(take(&f.log), vec!["right", "ping"]);
    ping(&Object::new(&f.account));
    assert_eq!(take(&f.log), vec!["ping"]);
}

#[test]
fn test_subclass_instances_do_not_leak() {
    let f = fixture();
    let left = f.runtime.define_class("Left", Some(&f.account)).unwrap();
    let right = f.runtime.define_class("Right", Some(&f.account)).unwrap();
    let l = Object::new(&left);
    let r = Object::new(&right);

    f.engine.hook_object(&l, "ping", Timing::After, note(&f.log, "left")).unwrap();
    f.engine.hook_object(&r, "ping", Timing::After, note(&f.log, "right")).unwrap();
    assert_ne!(l.isa(), r.isa());
    assert_eq!(f.engine.shadow_count(), 2);

    ping(&l);
    assert_eq!(take(&f.log), vec!["ping", "left"]);
    ping(&r);
    assert_eq!(take(&f.log), vec!["ping", "right"]);
}

// ============================================================================
// Failure Tests
// ============================================================================

#[test]
fn test_signature_mismatch_leaves_dispatch_untouched() {
    let f = fixture();
    let obj = Object::new(&f.account);
    let payee = Object::new(&f.account);

    // First method argument is numeric, not a reference
    let wrong = Callback::args1(|_, _: Object| {});
    let result = f.engine.hook_object(&obj, TRANSFER, Timing::Before, wrong);
    assert!(matches!(result, Err(AspectError::SignatureMismatch { .. })));

    assert_eq!(obj.isa(), f.account);
    assert_eq!(f.engine.shadow_count(), 0);
    assert_eq!(f.engine.registry().entry_count(), 0);
    assert!(!f.engine.is_redirected(&f.account, &Selector::new(TRANSFER)));
    transfer(&obj, 3, &payee).unwrap();
    assert_eq!(take(&f.log), vec!["original 3"]);

    let l = f.log.clone();
    let right = Callback::args1(move |_, amount: i64| l.lock().push(format!("before {}", amount)));
    f.engine.hook_object(&obj, TRANSFER, Timing::Before, right).unwrap();
    transfer(&obj, 4, &payee).unwrap();
    assert_eq!(take(&f.log), vec!["before 4", "original 4"]);
}

#[test]
fn test_too_many_callback_arguments() {
    let f = fixture();
    let result = f.engine.register(
        Target::Type(&f.account),
        &Selector::new("ping"),
        Timing::Before,
        Callback::args1(|_, _: i32| {}),
    );
    assert!(matches!(result, Err(AspectError::SignatureMismatch { .. })));
}

#[test]
#[cfg(target_pointer_width = "64")]
fn test_oversized_callback_encoding_is_rejected() {
    let f = fixture();
    let obj = Object::new(&f.account);
    let huge = Callback::from_encoding(
        "v@?@{S=[9223372036854775807c][9223372036854775807c][2c]}",
        |_, _| Ok(()),
    );
    let result = f.engine.hook_object(&obj, TRANSFER, Timing::Before, huge);
    assert!(matches!(result, Err(AspectError::SignatureMismatch { .. })));
    assert_eq!(obj.isa(), f.account);
}

// ============================================================================
// Shadow Class Tests
// ============================================================================

#[test]
fn test_single_shadow_per_object() {
    let f = fixture();
    let obj = Object::new(&f.account);

    f.engine.hook_object(&obj, "ping", Timing::Before, note(&f.log, "a")).unwrap();
    let shadow = obj.isa();
    f.engine.hook_object(&obj, TRANSFER, Timing::Before, note(&f.log, "b")).unwrap();
    f.engine.hook_object(&obj, "ping", Timing::After, note(&f.log, "c")).unwrap();

    assert_eq!(obj.isa(), shadow);
    assert_eq!(shadow.name(), "_Aspect_Account");
    assert_eq!(f.engine.shadow_count(), 1);
    assert_eq!(obj.class(), f.account);

    // Another object of the same type reuses the shadow
    let other = Object::new(&f.account);
    f.engine.hook_object(&other, "ping", Timing::Before, note(&f.log, "d")).unwrap();
    assert_eq!(other.isa(), shadow);
    assert_eq!(f.engine.shadow_count(), 1);
    assert_eq!(f.runtime.class_named("_Aspect_Account"), Some(shadow));
}

#[test]
fn test_original_preserved_once() {
    let f = fixture();
    let obj = Object::new(&f.account);
    for _ in 0..3 {
        f.engine.hook_object(&obj, "ping", Timing::Before, note(&f.log, "hook")).unwrap();
    }

    let shadow = obj.isa();
    let alias = Selector::new("aspect_ping");
    assert!(shadow.has_own_method(&alias));
    assert!(shadow.own_method(&Selector::new("ping")).unwrap().imp().is_forward());
    // The apparent type keeps its original table
    assert!(!f.account.has_own_method(&alias));

    ping(&obj);
    assert_eq!(take(&f.log), vec!["hook", "hook", "hook", "ping"]);
}
