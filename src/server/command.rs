// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line-oriented request protocol served by the `gatekeeper` binary.
//!
//! One request per line, fields separated by whitespace:
//!
//! ```text
//! check <ip> <login> <credential>
//! reset <ip> <login>
//! allow add|del <cidr>
//! deny add|del <cidr>
//! stats
//! ```
//!
//! Each request gets exactly one reply line: `ok`, `denied <reason>`,
//! `invalid <message>`, or for `stats` a `stats key=value ...` line.

use std::fmt;

use thiserror::Error;

use crate::engine::{AdmissionEngine, Decision, DenyReason, EngineStats};

/// Which prefix list a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Allow,
    Deny,
}

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Check {
        ip: String,
        login: String,
        credential: String,
    },
    Reset {
        ip: String,
        login: String,
    },
    MutateList {
        list: ListKind,
        is_add: bool,
        cidr: String,
    },
    Stats,
}

/// A request line that could not be understood.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("empty request")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Parse one request line.
    pub fn parse(line: &str) -> Result<Self, ParseCommandError> {
        let mut fields = line.split_whitespace();
        let Some(name) = fields.next() else {
            return Err(ParseCommandError::Empty);
        };
        let args: Vec<&str> = fields.collect();

        match name {
            "check" => match args[..] {
                [ip, login, credential] => Ok(Command::Check {
                    ip: ip.to_string(),
                    login: login.to_string(),
                    credential: credential.to_string(),
                }),
                _ => Err(ParseCommandError::Usage("check <ip> <login> <credential>")),
            },
            "reset" => match args[..] {
                [ip, login] => Ok(Command::Reset {
                    ip: ip.to_string(),
                    login: login.to_string(),
                }),
                _ => Err(ParseCommandError::Usage("reset <ip> <login>")),
            },
            "allow" => parse_mutation(ListKind::Allow, &args, "allow add|del <cidr>"),
            "deny" => parse_mutation(ListKind::Deny, &args, "deny add|del <cidr>"),
            "stats" if args.is_empty() => Ok(Command::Stats),
            "stats" => Err(ParseCommandError::Usage("stats")),
            other => Err(ParseCommandError::UnknownCommand(other.to_string())),
        }
    }

    /// Run the request against `engine`.
    pub fn execute(&self, engine: &AdmissionEngine) -> Reply {
        let result = match self {
            Command::Check {
                ip,
                login,
                credential,
            } => engine.check(ip, login, credential).map(Reply::from),
            Command::Reset { ip, login } => engine.reset(ip, login).map(|()| Reply::Ok),
            Command::MutateList {
                list: ListKind::Allow,
                is_add,
                cidr,
            } => engine.mutate_allow_list(cidr, *is_add).map(|()| Reply::Ok),
            Command::MutateList {
                list: ListKind::Deny,
                is_add,
                cidr,
            } => engine.mutate_deny_list(cidr, *is_add).map(|()| Reply::Ok),
            Command::Stats => Ok(Reply::Stats(engine.stats())),
        };

        result.unwrap_or_else(|e| Reply::Invalid(e.to_string()))
    }
}

fn parse_mutation(
    list: ListKind,
    args: &[&str],
    usage: &'static str,
) -> Result<Command, ParseCommandError> {
    let is_add = match args.first() {
        Some(&"add") => true,
        Some(&"del") => false,
        _ => return Err(ParseCommandError::Usage(usage)),
    };
    match args {
        [_, cidr] => Ok(Command::MutateList {
            list,
            is_add,
            cidr: cidr.to_string(),
        }),
        _ => Err(ParseCommandError::Usage(usage)),
    }
}

/// One reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Denied(DenyReason),
    Invalid(String),
    Stats(EngineStats),
}

impl From<Decision> for Reply {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Allow => Reply::Ok,
            Decision::Deny(reason) => Reply::Denied(reason),
        }
    }
}

impl From<ParseCommandError> for Reply {
    fn from(err: ParseCommandError) -> Self {
        Reply::Invalid(err.to_string())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => f.write_str("ok"),
            Reply::Denied(reason) => write!(f, "denied {reason}"),
            Reply::Invalid(message) => write!(f, "invalid {message}"),
            Reply::Stats(stats) => write!(
                f,
                "stats ips={} logins={} credentials={} allow={} deny={}",
                stats.tracked_ips,
                stats.tracked_logins,
                stats.tracked_credentials,
                stats.allow_list_len,
                stats.deny_list_len
            ),
        }
    }
}

/// Parse and execute one request line.
///
/// Returns `None` for blank lines and `#` comments.
pub fn handle_line(engine: &AdmissionEngine, line: &str) -> Option<Reply> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let reply = match Command::parse(line) {
        Ok(command) => command.execute(engine),
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting malformed request");
            Reply::from(e)
        }
    };
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    fn engine() -> AdmissionEngine {
        AdmissionEngine::new(EngineConfig::with_thresholds(10, 5, 3))
    }

    fn reply(engine: &AdmissionEngine, line: &str) -> String {
        handle_line(engine, line).unwrap().to_string()
    }

    #[test]
    fn test_parse_check() {
        assert_eq!(
            Command::parse("check 1.2.3.4 alice pw").unwrap(),
            Command::Check {
                ip: "1.2.3.4".into(),
                login: "alice".into(),
                credential: "pw".into()
            }
        );
        assert_eq!(
            Command::parse("check 1.2.3.4 alice"),
            Err(ParseCommandError::Usage("check <ip> <login> <credential>"))
        );
    }

    #[test]
    fn test_parse_mutations() {
        assert_eq!(
            Command::parse("deny add 10.0.0.0/8").unwrap(),
            Command::MutateList {
                list: ListKind::Deny,
                is_add: true,
                cidr: "10.0.0.0/8".into()
            }
        );
        assert_eq!(
            Command::parse("allow del 10.0.0.0/8").unwrap(),
            Command::MutateList {
                list: ListKind::Allow,
                is_add: false,
                cidr: "10.0.0.0/8".into()
            }
        );
        assert!(Command::parse("allow put 10.0.0.0/8").is_err());
        assert!(Command::parse("deny add").is_err());
        assert!(Command::parse("deny add a b").is_err());
    }

    #[test]
    fn test_parse_unknown_and_empty() {
        assert_eq!(
            Command::parse("login x"),
            Err(ParseCommandError::UnknownCommand("login".into()))
        );
        assert_eq!(Command::parse("   "), Err(ParseCommandError::Empty));
        assert_eq!(
            Command::parse("stats now"),
            Err(ParseCommandError::Usage("stats"))
        );
    }

    #[test]
    fn test_check_replies() {
        let engine = engine();
        for _ in 0..3 {
            assert_eq!(reply(&engine, "check 1.2.3.4 alice pw1"), "ok");
        }
        assert_eq!(
            reply(&engine, "check 1.2.3.4 alice pw1"),
            "denied credential_threshold_exceeded"
        );
        assert_eq!(
            reply(&engine, "check 1.2.3 alice pw1"),
            "invalid malformed IP address '1.2.3'"
        );
    }

    #[test]
    fn test_list_and_reset_replies() {
        let engine = engine();
        assert_eq!(reply(&engine, "deny add 192.168.1.0/24"), "ok");
        assert_eq!(
            reply(&engine, "check 192.168.1.1 bob pw2"),
            "denied denylisted"
        );
        assert_eq!(reply(&engine, "deny del 192.168.1.0/24"), "ok");
        assert_eq!(reply(&engine, "check 192.168.1.1 bob pw2"), "ok");

        assert!(reply(&engine, "allow add 10.0.0.0").starts_with("invalid malformed CIDR"));
        assert_eq!(reply(&engine, "reset 192.168.1.1 bob"), "ok");
        assert!(reply(&engine, "reset bogus bob").starts_with("invalid"));
    }

    #[test]
    fn test_stats_reply() {
        let engine = engine();
        reply(&engine, "allow add 10.0.0.0/8");
        reply(&engine, "check 1.2.3.4 alice pw");
        assert_eq!(
            reply(&engine, "stats"),
            "stats ips=1 logins=1 credentials=1 allow=1 deny=0"
        );
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        let engine = engine();
        assert!(handle_line(&engine, "").is_none());
        assert!(handle_line(&engine, "   # note").is_none());
        assert_eq!(reply(&engine, "frobnicate"), "invalid unknown command 'frobnicate'");
    }
}
