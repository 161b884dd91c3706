//! Line protocol parsing.
//!
//! One command per newline-terminated line. Tokens are whitespace-
//! delimited with runs collapsed; a PUBLISH command's content is the
//! entire remainder after the third token and may contain spaces.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Publish {
        topic: String,
        producer_id: String,
        content: String,
    },
    Consume {
        topic: String,
    },
}

/// Malformed command. The `Display` form is exactly the line sent back to
/// the client; the connection stays open afterwards.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("ERROR: Usage: PUBLISH <TOPIC> <PRODUCER_ID> <CONTENT>")]
    PublishUsage,
    #[error("ERROR: Usage: CONSUME <TOPIC>")]
    ConsumeUsage,
    #[error("ERROR: Unknown command")]
    UnknownCommand,
}

/// Parse one raw line. Blank lines are ignored and return `None`.
pub fn parse_line(line: &str) -> Result<Option<Request>, ProtocolError> {
    let parts = split_command(line.trim());
    let Some(verb) = parts.first() else {
        return Ok(None);
    };

    match verb.to_ascii_uppercase().as_str() {
        "PUBLISH" => {
            if parts.len() == 4 {
                Ok(Some(Request::Publish {
                    topic: parts[1].to_string(),
                    producer_id: parts[2].to_string(),
                    content: parts[3].to_string(),
                }))
            } else {
                Err(ProtocolError::PublishUsage)
            }
        }
        "CONSUME" => {
            if parts.len() >= 2 {
                Ok(Some(Request::Consume {
                    topic: parts[1].to_string(),
                }))
            } else {
                Err(ProtocolError::ConsumeUsage)
            }
        }
        _ => Err(ProtocolError::UnknownCommand),
    }
}

/// Split into at most four parts. The first three are single tokens; the
/// fourth is the untouched remainder (minus its leading whitespace).
fn split_command(line: &str) -> Vec<&str> {
    let mut parts = Vec::with_capacity(4);
    let mut rest = line;
    for _ in 0..3 {
        rest = rest.trim_start();
        if rest.is_empty() {
            return parts;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(&rest[..end]);
                rest = &rest[end..];
            }
            None => {
                parts.push(rest);
                return parts;
            }
        }
    }
    rest = rest.trim_start();
    if !rest.is_empty() {
        parts.push(rest);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_with_spaced_content() {
        let request = parse_line("PUBLISH orders p1 order created with spaces")
            .unwrap()
            .unwrap();
        assert_eq!(
            request,
            Request::Publish {
                topic: "orders".into(),
                producer_id: "p1".into(),
                content: "order created with spaces".into(),
            }
        );
    }

    #[test]
    fn verb_is_case_insensitive() {
        let request = parse_line("publish orders p1 x").unwrap().unwrap();
        assert!(matches!(request, Request::Publish { .. }));
        let request = parse_line("Consume orders").unwrap().unwrap();
        assert_eq!(request, Request::Consume { topic: "orders".into() });
    }

    #[test]
    fn whitespace_runs_collapse_between_tokens() {
        let request = parse_line("PUBLISH   orders\tp1   payload  kept").unwrap().unwrap();
        assert_eq!(
            request,
            Request::Publish {
                topic: "orders".into(),
                producer_id: "p1".into(),
                content: "payload  kept".into(),
            }
        );
    }

    #[test]
    fn publish_arity_error_has_exact_usage_line() {
        let err = parse_line("PUBLISH orders p1").unwrap_err();
        assert_eq!(err, ProtocolError::PublishUsage);
        assert_eq!(
            err.to_string(),
            "ERROR: Usage: PUBLISH <TOPIC> <PRODUCER_ID> <CONTENT>"
        );
    }

    #[test]
    fn consume_arity_error() {
        let err = parse_line("CONSUME").unwrap_err();
        assert_eq!(err.to_string(), "ERROR: Usage: CONSUME <TOPIC>");
    }

    #[test]
    fn consume_ignores_trailing_tokens() {
        let request = parse_line("CONSUME orders trailing junk").unwrap().unwrap();
        assert_eq!(request, Request::Consume { topic: "orders".into() });
    }

    #[test]
    fn unknown_command() {
        let err = parse_line("SUBSCRIBE orders").unwrap_err();
        assert_eq!(err.to_string(), "ERROR: Unknown command");
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   \t ").unwrap(), None);
    }
}
