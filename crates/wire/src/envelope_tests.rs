// SPDX-License-Identifier: MIT

//! Envelope serde and helper tests.

use super::*;

#[test]
fn wait_defaults_to_false_when_absent() {
    let json = r#"{"id":5,"op":{"type":"UserCommand","line":"ls"}}"#;
    let envelope: Envelope = serde_json::from_str(json).unwrap();
    assert!(!envelope.wait);
    assert_eq!(envelope.id, 5);
}

#[test]
fn response_to_echoes_the_request_id() {
    let request = Envelope {
        id: 42,
        wait: true,
        op: Operation::FunctionCall(FunctionCall::system("get-language")),
    };
    let response = Envelope::response_to(&request);
    assert_eq!(response.id, 42);
    assert!(!response.wait);
}

#[test]
fn error_results_are_data_not_failures() {
    let envelope = Envelope::error(9, "evaluation failed");
    match envelope.op {
        Operation::Result(CallResult::Error(message)) => {
            assert_eq!(message, "evaluation failed");
        }
        other => panic!("expected error result, got {:?}", other),
    }
}

#[test]
fn console_streams_are_distinguished_on_the_wire() {
    let out = serde_json::to_string(&ConsoleMessage::Stdout("hi".into())).unwrap();
    let err = serde_json::to_string(&ConsoleMessage::Stderr("hi".into())).unwrap();
    assert!(out.contains("stdout"));
    assert!(err.contains("stderr"));
    assert_ne!(out, err);
}

#[test]
fn function_call_arguments_default_to_empty() {
    let json = r#"{"target":"system","function":"console"}"#;
    let call: FunctionCall = serde_json::from_str(json).unwrap();
    assert!(call.arguments.is_empty());
    assert_eq!(call.target, CallTarget::System);
}
