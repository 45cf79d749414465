//! # STOMP
//!
//! Text frames carried over the realtime socket, one frame per socket message.
//!
//! ```text
//! COMMAND
//! header:value
//!
//! body^@
//! ```
//!
//! Header names and values are escaped (`\\`, `\n`, `\r`, `\c`) in every frame
//! except `CONNECT` and `CONNECTED`. A bare end-of-line is a heart-beat and
//! decodes to nothing.
use std::{fmt, str::FromStr};

use thiserror::Error;

pub const ACCEPT_VERSION: &str = "1.2";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame ended early")]
    Truncated,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Malformed header line: {0}")]
    Header(String),

    #[error("Invalid escape sequence in: {0}")]
    Escape(String),

    #[error("Invalid content-length: {0}")]
    ContentLength(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        };

        Ok(command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First occurrence wins, as the protocol requires for repeated headers.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(host: &str, token: Option<&str>) -> Self {
        let frame = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", "0,0");

        match token {
            Some(token) => frame.header("Authorization", format!("Bearer {token}")),
            None => frame,
        }
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    pub fn message(destination: &str, subscription: &str, message_id: &str, body: &str) -> Self {
        Frame::new(Command::Message)
            .header("destination", destination)
            .header("subscription", subscription)
            .header("message-id", message_id)
            .header("content-type", "application/json")
            .body(body)
    }

    pub fn error(message: &str) -> Self {
        Frame::new(Command::Error).header("message", message)
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    pub fn parse(raw: &str) -> Result<Option<Self>, FrameError> {
        let raw = raw.trim_start_matches(['\r', '\n']);
        if raw.is_empty() {
            return Ok(None);
        }

        let (command_line, mut rest) = split_line(raw).ok_or(FrameError::Truncated)?;
        let command: Command = command_line.parse()?;

        let mut headers = Vec::new();
        loop {
            let (line, after) = split_line(rest).ok_or(FrameError::Truncated)?;
            rest = after;

            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::Header(line.to_string()))?;

            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .map(|(_, value)| value.as_str());

        let body = match content_length {
            Some(length) => {
                let length: usize = length
                    .trim()
                    .parse()
                    .map_err(|_| FrameError::ContentLength(length.to_string()))?;

                rest.get(..length).ok_or(FrameError::Truncated)?.to_string()
            }
            None => rest
                .split_once('\0')
                .map(|(body, _)| body.to_string())
                .ok_or(FrameError::Truncated)?,
        };

        let frame = Frame {
            command,
            headers,
            body,
        };

        Ok(Some(frame))
    }
}

fn split_line(input: &str) -> Option<(&str, &str)> {
    let (line, rest) = input.split_once('\n')?;

    Some((line.strip_suffix('\r').unwrap_or(line), rest))
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());

    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }

    out
}

fn unescape(input: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::Escape(input.to_string())),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_carries_bearer_unescaped() {
        let encoded = Frame::connect("localhost", Some("tok:en")).encode();

        assert!(encoded.starts_with("CONNECT\n"));
        assert!(encoded.contains("Authorization:Bearer tok:en\n"));
        assert!(encoded.ends_with("\n\n\0"));
    }

    #[test]
    fn test_parse_message_with_content_length() {
        let raw = "MESSAGE\ndestination:/topic/alerts\nsubscription:sub-1\nmessage-id:9\ncontent-length:8\n\n{\"id\":1}\0";
        let frame = Frame::parse(raw).unwrap().unwrap();

        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-1"));
        assert_eq!(frame.body, "{\"id\":1}");
    }

    #[test]
    fn test_parse_body_until_nul() {
        let raw = "MESSAGE\r\ndestination:/topic/alerts/deleted\r\n\r\n42\0\n";
        let frame = Frame::parse(raw).unwrap().unwrap();

        assert_eq!(frame.get("destination"), Some("/topic/alerts/deleted"));
        assert_eq!(frame.body, "42");
    }

    #[test]
    fn test_heartbeat_is_nothing() {
        assert_eq!(Frame::parse("\n"), Ok(None));
        assert_eq!(Frame::parse(""), Ok(None));
    }

    #[test]
    fn test_header_escaping() {
        let frame = Frame::error("bad: token\nretry");
        let encoded = frame.encode();

        assert!(encoded.contains("message:bad\\c token\\nretry\n"));
        assert_eq!(Frame::parse(&encoded).unwrap().unwrap(), frame);
    }

    #[test]
    fn test_encoded_body_survives() {
        let frame = Frame::message("/topic/grievances", "sub-0", "1", "{\"title\":\"a\\u0000b\"}");
        let parsed = Frame::parse(&frame.encode()).unwrap().unwrap();

        assert_eq!(parsed.body, frame.body);
        assert_eq!(parsed.get("content-length"), Some("20"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(
            Frame::parse("HELLO\n\n\0"),
            Err(FrameError::UnknownCommand("HELLO".to_string()))
        );
        assert_eq!(Frame::parse("MESSAGE\nno-colon\n\n\0"), Err(FrameError::Header("no-colon".to_string())));
        assert_eq!(Frame::parse("MESSAGE\ndestination:x\n"), Err(FrameError::Truncated));
        assert_eq!(
            Frame::parse("ERROR\nmessage:bad\\x\n\n\0"),
            Err(FrameError::Escape("bad\\x".to_string()))
        );
    }
}
