// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::sync::Arc;

use clusterdag::agent::ShellAgent;
use clusterdag::config::{load_and_validate, load_from_str, ConfigFile};
use clusterdag::errors::ClusterdagError;
use clusterdag::service::Orchestrator;
use clusterdag::store::MemoryStore;
use clusterdag::types::{Command, CommandLevel, ComponentCategory};
use clusterdag::{load_commands, parse_commands};

type TestResult = Result<(), Box<dyn Error>>;

const FULL: &str = r#"
[config]
rpc_timeout_secs = 30
max_concurrent_jobs = 2

[agent]
command = "ssh {host} /opt/agent/run {service} {component} {command} --task {task_id}"

[stack]
name = "bigtop"
version = "3.3.0"

[stack.service.zookeeper]
user = "zookeeper"
display_name = "ZooKeeper"

[stack.service.zookeeper.component.zookeeper_server]
category = "master"
script = "zookeeper/server.py"

[stack.service.zookeeper.component.zookeeper_client]
category = "client"

[stack.service.kafka]
user = "kafka"
required_services = ["zookeeper"]

[stack.service.kafka.component.kafka_broker]
custom_commands = ["rebalance"]

[[stack.dependency]]
command = "KAFKA_BROKER-START"
blocked_by = ["ZOOKEEPER_SERVER-START"]
"#;

const MINIMAL_STACK: &str = r#"
[stack]
name = "mini"
version = "1"

[stack.service.svc]
user = "svc"

[stack.service.svc.component.a]
"#;

fn validate(text: &str) -> clusterdag::errors::Result<ConfigFile> {
    ConfigFile::try_from(load_from_str(text)?)
}

#[test]
fn full_file_loads_from_disk() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Clusterdag.toml");
    fs::write(&path, FULL)?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.config.rpc_timeout_secs, 30);
    assert_eq!(cfg.config.max_concurrent_jobs, 2);
    assert_eq!(cfg.config.log_buffer_lines, 2000);
    assert_eq!(cfg.stack.user_group, "hadoop");
    assert_eq!(cfg.stack.root_dir, "/opt");
    assert_eq!(cfg.stack.dependency.len(), 1);

    let orch = Orchestrator::from_config(
        &cfg,
        Arc::new(MemoryStore::new()),
        Arc::new(ShellAgent::from_config(&cfg.agent)),
    )?;
    let stack = orch.stack();
    assert_eq!(stack.service("zookeeper").map(|s| s.display_name.as_str()), Some("ZooKeeper"));
    assert_eq!(stack.service("kafka").map(|s| s.display_name.as_str()), Some("Kafka"));

    let broker = stack.component("KAFKA_BROKER").ok_or("broker missing")?;
    assert_eq!(broker.category, ComponentCategory::Master);
    assert_eq!(broker.display_name, "Kafka Broker");
    assert_eq!(broker.custom_commands, vec!["rebalance"]);
    assert!(stack.is_client("zookeeper_client"));
    assert_eq!(
        stack.component("zookeeper_server").and_then(|c| c.script.as_deref()),
        Some("zookeeper/server.py")
    );
    assert_eq!(stack.service_of("kafka_broker").map(|s| s.name.as_str()), Some("kafka"));
    Ok(())
}

#[test]
fn sections_other_than_stack_are_optional() -> TestResult {
    let cfg = validate(MINIMAL_STACK)?;
    assert_eq!(cfg.config.rpc_timeout_secs, 600);
    assert_eq!(cfg.config.max_concurrent_jobs, 8);
    assert_eq!(cfg.agent.shell, "sh");
    assert!(cfg.agent.command.contains("{component}"));
    Ok(())
}

#[test]
fn missing_stack_is_a_parse_error() {
    let err = load_from_str("[config]\nmax_concurrent_jobs = 1\n").unwrap_err();
    assert!(matches!(err, ClusterdagError::TomlError(_)), "got {err:?}");
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let err = load_and_validate(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ClusterdagError::IoError(_)), "got {err:?}");
    Ok(())
}

#[test]
fn invalid_values_are_config_errors() {
    let cases = [
        format!("[config]\nmax_concurrent_jobs = 0\n{MINIMAL_STACK}"),
        format!("[config]\nrpc_timeout_secs = 0\n{MINIMAL_STACK}"),
        format!("[agent]\ncommand = \"run {{hostname}}\"\n{MINIMAL_STACK}"),
        format!("[agent]\ncommand = \"  \"\n{MINIMAL_STACK}"),
        MINIMAL_STACK.replace("user = \"svc\"", "user = \"\""),
        MINIMAL_STACK.replace("name = \"mini\"", "name = \"\""),
        format!("{MINIMAL_STACK}\n[stack.service.other]\nuser = \"o\"\n[stack.service.other.component.a]\n"),
        format!("{MINIMAL_STACK}\n[stack.service.other]\nuser = \"o\"\nrequired_services = [\"ghost\"]\n"),
        format!("{MINIMAL_STACK}\n[stack.service.SVC]\nuser = \"s\"\n"),
        format!("{MINIMAL_STACK}\n[[stack.dependency]]\ncommand = \"a_start\"\n"),
        format!("{MINIMAL_STACK}\n[[stack.dependency]]\ncommand = \"A-LAUNCH\"\n"),
        "[stack]\nname = \"empty\"\nversion = \"1\"\n".to_string(),
    ];

    for text in cases {
        match validate(&text) {
            Err(ClusterdagError::ConfigError(_)) => {}
            other => panic!("expected ConfigError for:\n{text}\ngot {other:?}"),
        }
    }
}

#[test]
fn commands_file_accepts_object_or_array() -> TestResult {
    let single = parse_commands(
        r#"{"command_level": "CLUSTER", "command": "ADD",
            "cluster_command": {"name": "prod", "hosts": [{"hostname": "n1"}]}}"#,
    )?;
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].command_level, CommandLevel::Cluster);
    assert_eq!(single[0].cluster_command.as_ref().map(|c| c.hosts.len()), Some(1));

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("commands.json");
    fs::write(
        &path,
        r#"[
            {"command_level": "SERVICE", "command": "START", "cluster_id": 3,
             "service_commands": [{"service_name": "zookeeper"}]},
            {"command_level": "COMPONENT", "command": "CUSTOM", "custom_command": "rebalance",
             "component_commands": [{"component_name": "kafka_broker", "hostnames": ["n1"]}]}
        ]"#,
    )?;
    let many = load_commands(&path)?;
    assert_eq!(many.len(), 2);
    assert_eq!(many[0].cluster_id, Some(3));
    assert_eq!(many[1].command, Command::Custom);
    assert_eq!(many[1].custom_command.as_deref(), Some("rebalance"));

    assert!(parse_commands(r#"{"command_level": "GALAXY", "command": "ADD"}"#).is_err());
    Ok(())
}
