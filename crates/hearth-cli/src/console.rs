//! Console input: commands for scripts, events to fire, and shutdown

use hearth_runtime::Value;

/// One line typed at the console
#[derive(Debug, PartialEq)]
pub enum ConsoleInput {
    Empty,
    Quit,
    /// `fire <Event> [json payload]`
    Event { name: String, payload: Value },
    /// Anything else, optionally prefixed with `/`
    Command(String),
    Invalid(String),
}

pub fn parse_line(line: &str) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Empty;
    }

    match line {
        "quit" | "exit" | "stop" => return ConsoleInput::Quit,
        _ => {}
    }

    if let Some(rest) = line.strip_prefix("fire") {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return parse_event(rest.trim());
        }
    }

    let command = line.strip_prefix('/').unwrap_or(line).trim();
    if command.is_empty() {
        return ConsoleInput::Empty;
    }
    ConsoleInput::Command(command.to_string())
}

fn parse_event(rest: &str) -> ConsoleInput {
    let (name, payload) = match rest.split_once(char::is_whitespace) {
        Some((name, payload)) => (name, payload.trim()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return ConsoleInput::Invalid("usage: fire <event> [json payload]".to_string());
    }

    let payload = if payload.is_empty() {
        Value::Null
    } else {
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(json) => Value::from_json(&json),
            Err(e) => return ConsoleInput::Invalid(format!("invalid event payload: {}", e)),
        }
    };

    ConsoleInput::Event {
        name: name.to_string(),
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_and_empty() {
        assert_eq!(parse_line("  "), ConsoleInput::Empty);
        assert_eq!(parse_line("/"), ConsoleInput::Empty);
        assert_eq!(parse_line("quit"), ConsoleInput::Quit);
        assert_eq!(parse_line(" stop "), ConsoleInput::Quit);
    }

    #[test]
    fn test_commands() {
        assert_eq!(
            parse_line("/greet bob"),
            ConsoleInput::Command("greet bob".to_string())
        );
        assert_eq!(
            parse_line("greet"),
            ConsoleInput::Command("greet".to_string())
        );
        // Only the `fire` word starts an event
        assert_eq!(
            parse_line("fireworks now"),
            ConsoleInput::Command("fireworks now".to_string())
        );
    }

    #[test]
    fn test_events() {
        assert_eq!(
            parse_line("fire PlayerJoinEvent"),
            ConsoleInput::Event {
                name: "PlayerJoinEvent".to_string(),
                payload: Value::Null
            }
        );

        match parse_line("fire Quit {\"player\": \"bob\"}") {
            ConsoleInput::Event { name, payload } => {
                assert_eq!(name, "Quit");
                assert_eq!(payload.get("player"), Some(Value::str("bob")));
            }
            other => panic!("expected event, got {:?}", other),
        }

        assert!(matches!(parse_line("fire"), ConsoleInput::Invalid(_)));
        assert!(matches!(parse_line("fire Quit {oops"), ConsoleInput::Invalid(_)));
    }
}
