// Tests for the wire types of the streaming transcription backend.

use voxstream::link::{build_listen_url, parse_transcript_event, ControlMessage, LinkConfig};

#[test]
fn test_parse_final_results_message() {
    let raw = r#"{
        "type": "Results",
        "channel_index": [0, 1],
        "duration": 1.98,
        "start": 0.0,
        "is_final": true,
        "speech_final": true,
        "channel": {
            "alternatives": [
                {"transcript": "hello world", "confidence": 0.9842, "words": []}
            ]
        }
    }"#;

    let update = parse_transcript_event(raw).expect("should parse");
    assert_eq!(update.text, "hello world");
    assert!(update.is_final);
    assert!(update.confidence.unwrap() > 0.9);
}

#[test]
fn test_parse_interim_results_message() {
    let raw = r#"{
        "type": "Results",
        "is_final": false,
        "channel": {
            "alternatives": [{"transcript": "hello wor", "confidence": 0.71}]
        }
    }"#;

    let update = parse_transcript_event(raw).expect("should parse");
    assert_eq!(update.text, "hello wor");
    assert!(!update.is_final);
}

#[test]
fn test_empty_transcript_is_dropped() {
    // The backend emits empty Results during silence
    let raw = r#"{
        "type": "Results",
        "is_final": true,
        "channel": {"alternatives": [{"transcript": "", "confidence": 0.0}]}
    }"#;
    assert_eq!(parse_transcript_event(raw), None);

    let raw = r#"{
        "type": "Results",
        "is_final": false,
        "channel": {"alternatives": [{"transcript": "   "}]}
    }"#;
    assert_eq!(parse_transcript_event(raw), None);
}

#[test]
fn test_non_results_messages_are_ignored() {
    let metadata = r#"{"type": "Metadata", "request_id": "abc-123", "duration": 12.0}"#;
    assert_eq!(parse_transcript_event(metadata), None);

    let utterance_end = r#"{"type": "UtteranceEnd", "last_word_end": 3.1}"#;
    assert_eq!(parse_transcript_event(utterance_end), None);
}

#[test]
fn test_malformed_payloads_are_ignored() {
    assert_eq!(parse_transcript_event("not json"), None);
    assert_eq!(parse_transcript_event("{}"), None);
    assert_eq!(parse_transcript_event(r#"{"type": "Results"}"#), None);
    assert_eq!(
        parse_transcript_event(r#"{"type": "Results", "channel": {"alternatives": []}}"#),
        None
    );
}

#[test]
fn test_missing_is_final_defaults_to_interim() {
    let raw = r#"{
        "type": "Results",
        "channel": {"alternatives": [{"transcript": "hello"}]}
    }"#;

    let update = parse_transcript_event(raw).expect("should parse");
    assert!(!update.is_final);
    assert_eq!(update.confidence, None);
}

#[test]
fn test_control_messages_serialize_with_type_tag() {
    assert_eq!(
        ControlMessage::CloseStream.to_json(),
        r#"{"type":"CloseStream"}"#
    );
    assert_eq!(ControlMessage::KeepAlive.to_json(), r#"{"type":"KeepAlive"}"#);
}

#[test]
fn test_listen_url_carries_audio_format_parameters() {
    let config = LinkConfig {
        api_key: "secret-key".to_string(),
        ..LinkConfig::default()
    };

    let url = build_listen_url(&config).expect("default endpoint should parse");
    let query = url.query().expect("query string expected");

    assert!(url.as_str().starts_with("wss://api.deepgram.com/v1/listen?"));
    assert!(query.contains("model=nova-2"));
    assert!(query.contains("encoding=linear16"));
    assert!(query.contains("sample_rate=16000"));
    assert!(query.contains("channels=1"));
    assert!(query.contains("interim_results=true"));
    assert!(query.contains("punctuate=true"));
    assert!(query.contains("smart_format=false"));
}

#[test]
fn test_api_key_never_appears_in_the_url() {
    let config = LinkConfig {
        api_key: "secret-key".to_string(),
        ..LinkConfig::default()
    };

    let url = build_listen_url(&config).expect("default endpoint should parse");
    assert!(!url.as_str().contains("secret-key"));
}
