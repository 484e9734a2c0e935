// SPDX-License-Identifier: MIT

//! Value serde shape tests.

use super::*;

#[test]
fn scalar_values_roundtrip_through_json() {
    for value in [
        Value::bool(true),
        Value::number(3.25),
        Value::str("alpha"),
        Value::ExternalPointer { handle: 0xdead_beef },
        Value::Error { message: "object not found".into() },
    ] {
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}

#[test]
fn arrays_may_mix_element_kinds() {
    let mixed = Value::array(vec![
        Value::number(1.0),
        Value::str("two"),
        Value::array(vec![Value::bool(false)]),
    ]);
    let json = serde_json::to_string(&mixed).unwrap();
    let back: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(back, mixed);
}

#[test]
fn accessors_return_none_on_kind_mismatch() {
    assert_eq!(Value::str("x").as_str(), Some("x"));
    assert_eq!(Value::bool(true).as_str(), None);
    assert_eq!(Value::bool(false).as_bool(), Some(false));
    assert_eq!(Value::number(0.0).as_bool(), None);
}
