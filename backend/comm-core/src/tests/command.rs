// Unit tests for client input parsing

use crate::client::ClientCommand;
use crate::error::client::CommandError;

#[test]
fn given_send_line_when_parsed_then_payload_is_verbatim() {
    // GIVEN: A SEND line
    let line = "SEND:hello";

    // WHEN: Parsing
    let command = ClientCommand::parse(line);

    // THEN: The payload carries no added delimiter
    assert_eq!(command, Ok(ClientCommand::Send(String::from("hello"))));
}

#[test]
fn given_stop_line_when_parsed_then_returns_stop() {
    assert_eq!(ClientCommand::parse("STOP:"), Ok(ClientCommand::Stop));
    assert_eq!(
        ClientCommand::parse("STOP:ignored"),
        Ok(ClientCommand::Stop)
    );
}

/// **VALUE**: Verifies that only the first colon separates command from payload.
///
/// **BUG THIS CATCHES**: Would catch splitting on every colon, which silently drops
/// or rejects payloads such as URLs and timestamps.
#[test]
fn given_payload_with_colons_when_parsed_then_keeps_whole_payload() {
    assert_eq!(
        ClientCommand::parse("SEND:http://localhost:3333"),
        Ok(ClientCommand::Send(String::from("http://localhost:3333")))
    );
}

#[test]
fn given_payload_with_spaces_when_parsed_then_spaces_are_kept() {
    assert_eq!(
        ClientCommand::parse("SEND: two words "),
        Ok(ClientCommand::Send(String::from(" two words ")))
    );
}

#[test]
fn given_line_without_colon_when_parsed_then_syntax_error() {
    let result = ClientCommand::parse("SEND hello");

    assert!(
        matches!(result, Err(CommandError::Syntax { ref input, .. }) if input == "SEND hello"),
        "Expected syntax error, got {result:?}"
    );
}

#[test]
fn given_unknown_command_when_parsed_then_unknown_command_error() {
    let result = ClientCommand::parse("FOO:bar");

    assert!(
        matches!(result, Err(CommandError::UnknownCommand { ref command, .. }) if command == "FOO"),
        "Expected unknown command error, got {result:?}"
    );
}

/// **VALUE**: Commands are matched exactly.
///
/// **BUG THIS CATCHES**: Would catch case-insensitive matching creeping in, which
/// would turn a payload line like `send:x` into a send.
#[test]
fn given_lowercase_command_when_parsed_then_rejected() {
    assert!(matches!(
        ClientCommand::parse("send:hello"),
        Err(CommandError::UnknownCommand { .. })
    ));
}

#[test]
fn given_from_str_when_used_then_matches_parse() {
    let command: ClientCommand = "SEND:ping-1".parse().unwrap();
    assert_eq!(command, ClientCommand::Send(String::from("ping-1")));
}
