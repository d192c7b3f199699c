//! Host command channel wire format.
//!
//! Requests arrive as newline-terminated text:
//!
//! ```text
//! NAME:param1,param2,...[;CK]\n
//! ```
//!
//! where `CK` is an optional integrity token: the XOR of every byte of
//! the payload before the `;`, rendered as two uppercase hex digits.
//! Replies are `OK:MESSAGE` or `ERROR:MESSAGE`, one per request.
//!
//! Parsing is structural only; parameter arity and value validation
//! belong to the command bridge, which owns the rejection order.

use std::fmt;

use thiserror::Error;

/// Maximum parameters a single command may carry.
pub const MAX_PARAMS: usize = 8;

/// Wire-level parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Line does not have the `NAME:params` shape.
    #[error("malformed command line")]
    Malformed,

    /// More than [`MAX_PARAMS`] parameters.
    #[error("too many parameters")]
    TooManyParams,

    /// Integrity token present but does not match the payload.
    #[error("checksum mismatch: expected {expected}, got {received}")]
    ChecksumMismatch {
        /// Token computed from the payload.
        expected: String,
        /// Token carried on the wire.
        received: String,
    },
}

/// A parsed request: name plus ordered string parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Upper-case command name.
    pub name: String,
    /// Ordered parameters, possibly empty.
    pub params: heapless::Vec<String, MAX_PARAMS>,
    /// True when the line carried a (verified) integrity token.
    pub checksummed: bool,
}

impl Command {
    /// Parse one line from the host channel.
    ///
    /// The checksum, when present, is verified here so that a corrupted
    /// command is rejected before any interpretation of its content.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        if line.is_empty() {
            return Err(ProtocolError::Malformed);
        }

        // Split off the optional integrity token.
        let (payload, token) = match line.rsplit_once(';') {
            Some((payload, token)) => (payload, Some(token)),
            None => (line, None),
        };

        if let Some(token) = token {
            let expected = checksum(payload);
            if !token.eq_ignore_ascii_case(&expected) {
                return Err(ProtocolError::ChecksumMismatch {
                    expected,
                    received: token.to_string(),
                });
            }
        }

        let (name, param_str) = match payload.split_once(':') {
            Some((name, rest)) => (name, Some(rest)),
            None => (payload, None),
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ProtocolError::Malformed);
        }

        let mut params = heapless::Vec::new();
        if let Some(param_str) = param_str {
            for param in param_str.split(',') {
                params
                    .push(param.trim().to_string())
                    .map_err(|_| ProtocolError::TooManyParams)?;
            }
        }

        Ok(Self {
            name: name.to_ascii_uppercase(),
            params,
            checksummed: token.is_some(),
        })
    }

    /// Render this command back to its wire form, appending a checksum.
    pub fn to_wire(&self) -> String {
        let payload = if self.params.is_empty() {
            self.name.clone()
        } else {
            let mut s = String::with_capacity(self.name.len() + 16);
            s.push_str(&self.name);
            s.push(':');
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    s.push(',');
                }
                s.push_str(param);
            }
            s
        };
        let ck = checksum(&payload);
        format!("{payload};{ck}")
    }
}

/// XOR checksum over the payload bytes, as two uppercase hex digits.
pub fn checksum(payload: &str) -> String {
    let ck = payload.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("{ck:02X}")
}

/// One reply per request: `OK:MESSAGE` or `ERROR:MESSAGE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(String),
    Error(String),
}

impl Response {
    /// Convenience constructor for `OK` replies.
    pub fn ok(msg: impl Into<String>) -> Self {
        Self::Ok(msg.into())
    }

    /// Convenience constructor for `ERROR` replies.
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error(msg.into())
    }

    /// True for `OK` replies.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(msg) => write!(f, "OK:{msg}"),
            Self::Error(msg) => write!(f, "ERROR:{msg}"),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_command() {
        let cmd = Command::parse("PING\n").unwrap();
        assert_eq!(cmd.name, "PING");
        assert!(cmd.params.is_empty());
        assert!(!cmd.checksummed);
    }

    #[test]
    fn parse_with_params() {
        let cmd = Command::parse("MOVE:100.5,200.3,50.0\n").unwrap();
        assert_eq!(cmd.name, "MOVE");
        assert_eq!(cmd.params.len(), 3);
        assert_eq!(cmd.params[0], "100.5");
        assert_eq!(cmd.params[2], "50.0");
    }

    #[test]
    fn parse_lowercase_name_normalized() {
        let cmd = Command::parse("ping").unwrap();
        assert_eq!(cmd.name, "PING");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Command::parse(""), Err(ProtocolError::Malformed));
        assert_eq!(Command::parse("   \r\n"), Err(ProtocolError::Malformed));
        assert_eq!(Command::parse(":x,y"), Err(ProtocolError::Malformed));
        assert_eq!(Command::parse("MO VE:1"), Err(ProtocolError::Malformed));
    }

    #[test]
    fn parse_rejects_param_overflow() {
        let line = format!("MOVE:{}", vec!["1"; MAX_PARAMS + 1].join(","));
        assert_eq!(Command::parse(&line), Err(ProtocolError::TooManyParams));
    }

    #[test]
    fn checksum_verified() {
        let ck = checksum("TILT:12.5");
        let line = format!("TILT:12.5;{ck}");
        let cmd = Command::parse(&line).unwrap();
        assert!(cmd.checksummed);
        assert_eq!(cmd.params[0], "12.5");
    }

    #[test]
    fn checksum_mismatch_rejected() {
        let result = Command::parse("TILT:12.5;00");
        assert!(matches!(
            result,
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn checksum_case_insensitive() {
        let ck = checksum("PAN:90").to_ascii_lowercase();
        let cmd = Command::parse(&format!("PAN:90;{ck}")).unwrap();
        assert!(cmd.checksummed);
    }

    #[test]
    fn wire_roundtrip() {
        let cmd = Command::parse("MOVE:1.0,2.0,3.0").unwrap();
        let wire = cmd.to_wire();
        let reparsed = Command::parse(&wire).unwrap();
        assert_eq!(reparsed.name, cmd.name);
        assert_eq!(reparsed.params, cmd.params);
        assert!(reparsed.checksummed);
    }

    #[test]
    fn response_display() {
        assert_eq!(Response::ok("PONG").to_string(), "OK:PONG");
        assert_eq!(
            Response::error("ESTOP_ACTIVE").to_string(),
            "ERROR:ESTOP_ACTIVE"
        );
    }
}
