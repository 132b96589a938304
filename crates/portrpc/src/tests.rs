use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use serde_json::Value;
use serde_json::json;

use crate::*;
use crate::bag::MAX_ARGS;
use crate::correlator::ID_DIGITS;
use crate::correlator::outcome;

// ============================================================================
//  ARGUMENT BAGS
// ============================================================================

#[test]
fn test_bag_roundtrip_preserves_order() {
    let lists = [
        vec![],
        vec![json!("topic")],
        vec![json!("topic"), json!("payload")],
        vec![json!(null), json!(false)],
        vec![json!("topic"), json!({"qos": 1}), json!(null), json!(42)],
        vec![json!([1, 2]), json!(null), json!(null), json!(""), json!({"nested": {"a": null}})],
        (0..MAX_ARGS).map(|n| json!(n)).collect(),
    ];
    for list in lists {
        assert_eq!(to_list(&to_bag(list.clone())), list);

        let wire: ArgBag = serde_json::from_str(&serde_json::to_string(&to_bag(list.clone())).unwrap()).unwrap();
        assert_eq!(to_list(&wire), list);
    }
}

#[test]
fn test_bag_keys_are_stringified_indices() {
    let bag = to_bag(vec![json!("a"), json!("b")]);
    let encoded = serde_json::to_value(&bag).unwrap();
    assert_eq!(encoded, json!({"0": "a", "1": "b"}));
}

#[test]
fn test_bag_holes_become_null() {
    let bag: ArgBag = serde_json::from_value(json!({"0": "a", "3": "d"})).unwrap();
    assert_eq!(bag.len(), 4);
    assert_eq!(to_list(&bag), vec![json!("a"), Value::Null, Value::Null, json!("d")]);
}

#[test]
fn test_bag_key_order_is_irrelevant() {
    let bag: ArgBag = serde_json::from_str(r#"{"2": "c", "0": "a", "1": "b"}"#).unwrap();
    assert_eq!(to_list(&bag), vec![json!("a"), json!("b"), json!("c")]);
}

#[test]
fn test_bag_empty() {
    let bag: ArgBag = serde_json::from_value(json!({})).unwrap();
    assert!(bag.is_empty());
    assert_eq!(bag.len(), 0);
    assert!(to_list(&bag).is_empty());
}

#[test]
fn test_bag_accepts_array_form() {
    let bag: ArgBag = serde_json::from_value(json!(["CAFEBABE", null])).unwrap();
    assert_eq!(to_list(&bag), vec![json!("CAFEBABE"), Value::Null]);
}

#[test]
fn test_bag_rejects_non_index_keys() {
    for key in ["topic", "-1", "+1", "01", ""] {
        let raw = format!(r#"{{"{key}": 1}}"#);
        assert!(serde_json::from_str::<ArgBag>(&raw).is_err(), "accepted key {key:?}");
    }
    assert_eq!(bag::parse_index("x"), Err(Error::InvalidIndex("x".into())));
}

#[test]
fn test_bag_rejects_huge_indices() {
    let raw = format!(r#"{{"{}": 1}}"#, MAX_ARGS);
    assert!(serde_json::from_str::<ArgBag>(&raw).is_err());

    let mut bag = ArgBag::new();
    assert_eq!(
        bag.insert(MAX_ARGS, json!(1)),
        Err(Error::IndexOutOfRange { index: MAX_ARGS, max: MAX_ARGS })
    );
    assert!(bag.insert(MAX_ARGS - 1, json!(1)).is_ok());
    assert_eq!(bag.len(), MAX_ARGS);
}

// ============================================================================
//  MESSAGES
// ============================================================================

#[test]
fn test_message_decode_publish() -> anyhow::Result<()> {
    let msg = Message::decode(
        r#"{"type":"publish","args":{"0":"t","1":"m","2":{"qos":1},"3":"CAFEBABE"}}"#,
    )?;
    assert_eq!(msg.kind, "publish");
    assert_eq!(msg.callback, None);
    assert_eq!(msg.arg_list(), vec![json!("t"), json!("m"), json!({"qos": 1}), json!("CAFEBABE")]);
    Ok(())
}

#[test]
fn test_message_without_args_has_no_field() -> anyhow::Result<()> {
    let msg = Message::bare("close");
    assert_eq!(serde_json::to_value(&msg)?, json!({"type": "close"}));
    assert!(Message::decode(r#"{"type":"close"}"#)?.arg_list().is_empty());
    Ok(())
}

#[test]
fn test_message_options_reply_shape() -> anyhow::Result<()> {
    let msg = Message::options(json!({"host": "broker"}));
    assert_eq!(
        serde_json::to_value(&msg)?,
        json!({"type": "options", "args": {"0": {"host": "broker"}}})
    );
    Ok(())
}

#[test]
fn test_message_callback_reply_shape() -> anyhow::Result<()> {
    let msg = Message::callback(json!("CAFEBABE"), Value::Null, vec![json!([{"topic": "t", "qos": 0}])]);
    assert_eq!(
        serde_json::to_value(&msg)?,
        json!({"type": "callback", "args": {"0": "CAFEBABE", "1": null, "2": [{"topic": "t", "qos": 0}]}})
    );
    Ok(())
}

#[test]
fn test_message_unsupported_reply_names_type() {
    let msg = Message::unsupported("doSomethingUnknown");
    assert_eq!(msg.kind, message::ERROR);
    assert_eq!(msg.arg_list(), vec![json!("Method doSomethingUnknown not supported.")]);
}

#[test]
fn test_message_explicit_callback_field() -> anyhow::Result<()> {
    let msg = Message::call(Command::Unsubscribe, vec![json!("t")]).with_callback("00000000000AB");
    let text = msg.encode()?;
    let back = Message::decode(&text)?;
    assert_eq!(back.callback, Some(json!("00000000000AB")));
    assert_eq!(back, msg);
    Ok(())
}

#[test]
fn test_message_rejects_malformed_args() {
    assert!(Message::decode(r#"{"type":"publish","args":{"zero":"t"}}"#).is_err());
    assert!(Message::decode(r#"{"args":{"0":"t"}}"#).is_err());
}

#[test]
fn test_command_vocabulary() {
    for command in Command::ALL {
        assert_eq!(Command::parse(command.as_str()), Some(command));
    }
    assert_eq!(Command::parse("setMaxListeners"), Some(Command::SetMaxListeners));
    assert_eq!(Command::parse("callback"), None);
    assert_eq!(Command::Publish.callback_arity(), Some(4));
    assert_eq!(Command::Subscribe.callback_arity(), Some(3));
    assert_eq!(Command::End.callback_arity(), None);
    assert!(!Command::SetMaxListeners.takes_completion());
}

#[test]
fn test_event_vocabulary() {
    let names: Vec<&str> = ClientEvent::ALL.iter().map(|e| e.as_str()).collect();
    assert_eq!(names, ["close", "connect", "error", "message", "offline", "reconnect"]);
    assert_eq!(ClientEvent::parse("message"), Some(ClientEvent::Message));
    assert_eq!(ClientEvent::parse("options"), None);
}

// ============================================================================
//  CORRELATOR
// ============================================================================

fn counting_resolver(hits: &Arc<AtomicUsize>) -> Resolver {
    let hits = hits.clone();
    Box::new(move |_, _| {
        hits.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_correlator_ids_are_uppercase_hex() {
    let correlator = Correlator::new();
    let id = correlator.register(Box::new(|_, _| {}));
    assert_eq!(id.len(), ID_DIGITS);
    assert!(id.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)), "bad id {id}");
}

#[test]
fn test_correlator_ids_are_distinct() {
    let correlator = Correlator::new();
    let a = correlator.register(Box::new(|_, _| {}));
    let b = correlator.register(Box::new(|_, _| {}));
    assert_ne!(a, b);
    assert_eq!(correlator.pending(), 2);
}

#[test]
fn test_correlator_counter_wraps_within_digits() {
    let correlator = Correlator::with_seed(u64::MAX);
    assert_eq!(correlator.register(Box::new(|_, _| {})), "FFFFFFFFFFFFF");
    assert_eq!(correlator.register(Box::new(|_, _| {})), "0000000000000");
}

#[test]
fn test_correlator_fires_exactly_once() {
    let correlator = Correlator::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = correlator.register(counting_resolver(&hits));

    assert!(correlator.fire(&id, Value::Null, vec![]));
    assert!(!correlator.fire(&id, Value::Null, vec![]));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(correlator.pending(), 0);
}

#[test]
fn test_correlator_passes_err_and_result() {
    let correlator = Correlator::new();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let id = correlator.register(Box::new(move |err: Value, result: Vec<Value>| {
        *sink.lock().unwrap() = Some((err, result));
    }));

    correlator.fire(&id, json!("denied"), vec![json!(1), json!(2)]);
    assert_eq!(
        seen.lock().unwrap().take(),
        Some((json!("denied"), vec![json!(1), json!(2)]))
    );
}

#[test]
fn test_correlator_unknown_id_is_noop() {
    let correlator = Correlator::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = correlator.register(counting_resolver(&hits));

    assert!(!correlator.fire("NOT-AN-ID", Value::Null, vec![]));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(correlator.contains(&id));
}

#[test]
fn test_correlator_forget_turns_reply_into_miss() {
    let correlator = Correlator::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = correlator.register(counting_resolver(&hits));

    assert!(correlator.forget(&id));
    assert!(!correlator.fire(&id, Value::Null, vec![]));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_correlator_clear_drops_without_firing() {
    let correlator = Correlator::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let ids: Vec<String> = (0..3).map(|_| correlator.register(counting_resolver(&hits))).collect();

    assert_eq!(correlator.clear(), 3);
    assert_eq!(correlator.pending(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(ids.iter().all(|id| !correlator.fire(id, Value::Null, vec![])));
}

#[test]
fn test_outcome_null_error_is_success() {
    assert_eq!(outcome(Value::Null, vec![json!(1)]), Ok(vec![json!(1)]));
    assert_eq!(outcome(json!("boom"), vec![]), Err(json!("boom")));
}
