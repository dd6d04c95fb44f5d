//! Decoding of Pengines replies (`format=json`) into job events.

use super::JobError;
use crate::model::{Answer, JobEvent, SourceLocation};
use crate::term;
use serde_json::Value;

/// What the session must do after delivering a decoded reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Wait for the next user control.
    Idle,
    /// Output was sent; pull the rest of the response.
    PullResponse,
    /// The remote job no longer exists.
    Gone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub events: Vec<JobEvent>,
    pub follow_up: FollowUp,
}

pub fn decode(reply: &Value) -> Result<Decoded, JobError> {
    let mut events = Vec::new();
    let follow_up = decode_into(reply, &mut events)?;
    Ok(Decoded { events, follow_up })
}

/// Decode the reply to `abort`. The server acknowledges with a bare `true`;
/// the `aborted` event itself arrives on the job's ordinary reply channel.
pub fn decode_abort(reply: &Value) -> Result<Decoded, JobError> {
    match reply {
        Value::Bool(true) => Ok(Decoded {
            events: Vec::new(),
            follow_up: FollowUp::PullResponse,
        }),
        other => decode(other),
    }
}

fn decode_into(reply: &Value, events: &mut Vec<JobEvent>) -> Result<FollowUp, JobError> {
    let kind = reply
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| JobError::Protocol(format!("reply without event: {reply}")))?;

    let follow_up = match kind {
        "create" => {
            let id = reply
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| JobError::Protocol("create reply without id".into()))?;
            events.push(JobEvent::Created { id: id.to_string() });
            match reply.get("answer") {
                Some(answer) => decode_into(answer, events)?,
                None => FollowUp::Idle,
            }
        }
        "success" => {
            let more = reply.get("more").and_then(Value::as_bool).unwrap_or(false);
            events.push(JobEvent::Success {
                answers: decode_answers(reply),
                more,
            });
            FollowUp::Idle
        }
        "failure" => {
            events.push(JobEvent::Failure);
            FollowUp::Idle
        }
        "stop" => {
            events.push(JobEvent::Stop);
            FollowUp::Idle
        }
        "prompt" => {
            let prompt = reply.get("data").map(text_of).filter(|s| !s.is_empty());
            events.push(JobEvent::Prompt(prompt));
            FollowUp::Idle
        }
        "output" => {
            let text = reply.get("data").map(text_of).unwrap_or_default();
            let location = match reply.get("location") {
                Some(loc) if loc.is_object() => {
                    Some(serde_json::from_value::<SourceLocation>(loc.clone())?)
                }
                _ => None,
            };
            events.push(JobEvent::Output { text, location });
            FollowUp::PullResponse
        }
        "error" => {
            events.push(JobEvent::Error {
                code: reply.get("code").and_then(Value::as_str).map(str::to_string),
                message: reply.get("data").map(text_of).unwrap_or_default(),
            });
            FollowUp::Idle
        }
        "aborted" => {
            events.push(JobEvent::Abort);
            FollowUp::Idle
        }
        "destroy" => {
            if let Some(inner) = reply.get("data").filter(|d| d.is_object()) {
                decode_into(inner, events)?;
            }
            FollowUp::Gone
        }
        "died" => {
            events.push(JobEvent::Error {
                code: Some("died".into()),
                message: "Pengine died".into(),
            });
            FollowUp::Gone
        }
        other => return Err(JobError::Protocol(format!("unknown event `{other}`"))),
    };
    Ok(follow_up)
}

fn decode_answers(reply: &Value) -> Vec<Answer> {
    let projection: Vec<&str> = reply
        .get("projection")
        .and_then(Value::as_array)
        .map(|p| p.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(data) = reply.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    data.iter()
        .filter_map(Value::as_object)
        .map(|bindings| {
            let mut ordered: Vec<(String, String)> = projection
                .iter()
                .filter_map(|name| {
                    bindings
                        .get(*name)
                        .map(|v| (name.to_string(), term::render(v)))
                })
                .collect();
            for (name, value) in bindings {
                if !projection.contains(&name.as_str()) {
                    ordered.push((name.clone(), term::render(value)));
                }
            }
            Answer { bindings: ordered }
        })
        .collect()
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => term::render(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_with_embedded_answer_yields_both_events() {
        let reply = json!({
            "event": "create",
            "id": "9f1c",
            "slave_limit": 3,
            "answer": {
                "event": "success",
                "id": "9f1c",
                "data": [{"X": 1}],
                "more": true,
                "projection": ["X"]
            }
        });
        let d = decode(&reply).unwrap();
        assert_eq!(d.follow_up, FollowUp::Idle);
        assert_eq!(
            d.events,
            vec![
                JobEvent::Created { id: "9f1c".into() },
                JobEvent::Success {
                    answers: vec![Answer {
                        bindings: vec![("X".into(), "1".into())]
                    }],
                    more: true
                }
            ]
        );
    }

    #[test]
    fn bindings_follow_projection_order() {
        let reply = json!({
            "event": "success",
            "data": [{"A": "a", "Z": "z"}],
            "projection": ["Z", "A"],
            "more": false
        });
        let d = decode(&reply).unwrap();
        let JobEvent::Success { answers, more } = &d.events[0] else {
            panic!("expected success");
        };
        assert!(!more);
        assert_eq!(answers[0].bindings[0].0, "Z");
        assert_eq!(answers[0].bindings[1].0, "A");
    }

    #[test]
    fn output_requests_pull_and_keeps_location() {
        let reply = json!({
            "event": "output",
            "data": "Warning: pengine://ab-12/src:3: singleton",
            "location": {"file": "pengine://ab-12/src", "line": 3, "ch": 7}
        });
        let d = decode(&reply).unwrap();
        assert_eq!(d.follow_up, FollowUp::PullResponse);
        let JobEvent::Output { location, .. } = &d.events[0] else {
            panic!("expected output");
        };
        let loc = location.as_ref().unwrap();
        assert_eq!(loc.line, Some(3));
        assert_eq!(loc.character, Some(7));
    }

    #[test]
    fn error_carries_code() {
        let reply = json!({"event": "error", "code": "too_many_pengines", "data": "limit"});
        let d = decode(&reply).unwrap();
        assert_eq!(
            d.events,
            vec![JobEvent::Error {
                code: Some("too_many_pengines".into()),
                message: "limit".into()
            }]
        );
    }

    #[test]
    fn destroy_unwraps_final_event() {
        let reply = json!({"event": "destroy", "data": {"event": "failure"}});
        let d = decode(&reply).unwrap();
        assert_eq!(d.follow_up, FollowUp::Gone);
        assert_eq!(d.events, vec![JobEvent::Failure]);
    }

    #[test]
    fn prompt_without_data_has_no_text() {
        let d = decode(&json!({"event": "prompt"})).unwrap();
        assert_eq!(d.events, vec![JobEvent::Prompt(None)]);
    }

    #[test]
    fn abort_acknowledgement_has_no_events() {
        let d = decode_abort(&json!(true)).unwrap();
        assert!(d.events.is_empty());
        assert_eq!(d.follow_up, FollowUp::PullResponse);

        let d = decode_abort(&json!({"event": "aborted"})).unwrap();
        assert_eq!(d.events, vec![JobEvent::Abort]);
        assert_eq!(d.follow_up, FollowUp::Idle);

        assert!(decode(&json!(true)).is_err());
    }

    #[test]
    fn unknown_event_is_protocol_error() {
        assert!(matches!(
            decode(&json!({"event": "ping"})),
            Err(JobError::Protocol(_))
        ));
        assert!(decode(&json!({"id": "x"})).is_err());
    }
}
