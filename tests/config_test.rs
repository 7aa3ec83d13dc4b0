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

use gatekeeper::server::config::{load_config, GateFileConfig};
use gatekeeper::server::{build_engine, handle_line};
use gatekeeper::{Decision, DenyReason};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
#[serial_test::serial]
fn test_engine_from_config_file() {
    std::env::remove_var("GATEKEEPER_DENY_LIST");
    std::env::remove_var("GATEKEEPER_LOGIN_THRESHOLD");

    let file = write_config(
        r#"
limits:
  login:
    threshold: 2
lists:
  deny:
    - "203.0.113.0/24"
  allow:
    - "10.0.0.0/8"
"#,
    );

    let config = load_config(Some(file.path())).unwrap();
    let engine = build_engine(&config).unwrap();

    assert_eq!(
        engine.check("203.0.113.9", "a", "b").unwrap(),
        Decision::Deny(DenyReason::Denylisted)
    );
    engine.check("1.1.1.1", "erin", "p1").unwrap();
    engine.check("1.1.1.2", "erin", "p2").unwrap();
    assert_eq!(
        engine.check("1.1.1.3", "erin", "p3").unwrap(),
        Decision::Deny(DenyReason::LoginThresholdExceeded)
    );
    assert!(engine.check("10.9.9.9", "erin", "p4").unwrap().is_allowed());
}

#[test]
#[serial_test::serial]
fn test_env_overrides_file() {
    std::env::set_var("GATEKEEPER_DENY_LIST", "198.51.100.0/24");
    std::env::set_var("GATEKEEPER_LOGIN_THRESHOLD", "1");

    let file = write_config("lists:\n  deny:\n    - \"203.0.113.0/24\"\n");
    let result = load_config(Some(file.path()));

    std::env::remove_var("GATEKEEPER_DENY_LIST");
    std::env::remove_var("GATEKEEPER_LOGIN_THRESHOLD");

    let config = result.unwrap();
    assert_eq!(config.lists.deny, vec!["198.51.100.0/24".to_string()]);
    assert_eq!(config.to_engine_config().login.threshold, 1);
}

#[test]
#[serial_test::serial]
fn test_invalid_config_is_rejected() {
    std::env::remove_var("GATEKEEPER_DENY_LIST");

    let file = write_config(
        r#"
limits:
  ip:
    lifetime: 300
    housekeeping_interval: 60
"#,
    );
    let err = load_config(Some(file.path())).unwrap_err();
    assert!(format!("{err:#}").contains("housekeeping_interval"));

    let file = write_config("lists:\n  deny:\n    - \"not-a-cidr\"\n");
    assert!(load_config(Some(file.path())).is_err());
}

#[test]
fn test_line_protocol_session() {
    let engine = build_engine(&GateFileConfig::default()).unwrap();

    let replies: Vec<String> = [
        "allow add 10.0.0.0/8",
        "check 10.0.0.5 carol pw",
        "deny add 10.0.0.0/24",
        "check 10.0.0.5 carol pw",
        "check ::1 carol pw",
        "reset ::1 carol",
        "stats",
    ]
    .iter()
    .filter_map(|line| handle_line(&engine, line))
    .map(|reply| reply.to_string())
    .collect();

    assert_eq!(
        replies,
        vec![
            "ok",
            "ok",
            "ok",
            "denied denylisted",
            "ok",
            "ok",
            "stats ips=0 logins=0 credentials=1 allow=1 deny=1",
        ]
    );
}
