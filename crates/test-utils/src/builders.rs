#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use clusterdag::config::{
    AgentSection, ComponentConfig, ConfigFile, ConfigSection, DependencyConfig, RawConfigFile,
    ServiceConfig, StackSection,
};
use clusterdag::model::{
    ClusterCommand, ClusterId, ClusterRecord, CommandContext, ComponentHosts, ComponentRecord,
    HostCommand, HostRecord, ServiceCommand, ServiceRecord,
};
use clusterdag::stack::StackMetadata;
use clusterdag::store::Store;
use clusterdag::types::{Command, CommandLevel, ComponentCategory, HealthStatus};

/// Builder for a `[stack]` section (and the config/metadata around it).
pub struct StackBuilder {
    stack: StackSection,
}

impl StackBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            stack: StackSection {
                name: name.to_string(),
                version: "1.0.0".to_string(),
                user_group: "hadoop".to_string(),
                root_dir: "/opt".to_string(),
                service: BTreeMap::new(),
                dependency: Vec::new(),
            },
        }
    }

    pub fn service(mut self, name: &str, user: &str) -> Self {
        self.stack.service.insert(
            name.to_string(),
            ServiceConfig {
                user: user.to_string(),
                display_name: None,
                required_services: Vec::new(),
                component: BTreeMap::new(),
            },
        );
        self
    }

    pub fn requires(mut self, service: &str, required: &str) -> Self {
        if let Some(svc) = self.stack.service.get_mut(service) {
            svc.required_services.push(required.to_string());
        }
        self
    }

    pub fn component(mut self, service: &str, name: &str, category: ComponentCategory) -> Self {
        if let Some(svc) = self.stack.service.get_mut(service) {
            svc.component.insert(
                name.to_string(),
                ComponentConfig {
                    category,
                    ..ComponentConfig::default()
                },
            );
        }
        self
    }

    pub fn custom_command(mut self, service: &str, component: &str, action: &str) -> Self {
        if let Some(comp) = self
            .stack
            .service
            .get_mut(service)
            .and_then(|s| s.component.get_mut(component))
        {
            comp.custom_commands.push(action.to_string());
        }
        self
    }

    /// `command` waits for every entry of `blocked_by`.
    pub fn dependency(mut self, command: &str, blocked_by: &[&str]) -> Self {
        self.stack.dependency.push(DependencyConfig {
            command: command.to_string(),
            blocked_by: blocked_by.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn section(self) -> StackSection {
        self.stack
    }

    pub fn raw_config(self) -> RawConfigFile {
        RawConfigFile {
            config: ConfigSection::default(),
            agent: AgentSection::default(),
            stack: self.stack,
        }
    }

    pub fn config(self) -> ConfigFile {
        ConfigFile::try_from(self.raw_config()).expect("Failed to build valid config from builder")
    }

    pub fn build(self) -> StackMetadata {
        StackMetadata::from_config(&self.stack).expect("Failed to build stack metadata from builder")
    }
}

/// The stack most tests run against.
///
/// - zookeeper: `zookeeper_server` (master), `zookeeper_client` (client)
/// - hdfs: `namenode` (master, custom `rebalance`), `datanode` (slave),
///   `hdfs_client` (client)
/// - kafka: `kafka_broker` (master), requires zookeeper
///
/// Start order: zookeeper_server before namenode and kafka_broker,
/// namenode before datanode.
pub fn sample_stack() -> StackBuilder {
    StackBuilder::new("bigtop")
        .service("zookeeper", "zookeeper")
        .component("zookeeper", "zookeeper_server", ComponentCategory::Master)
        .component("zookeeper", "zookeeper_client", ComponentCategory::Client)
        .service("hdfs", "hdfs")
        .component("hdfs", "namenode", ComponentCategory::Master)
        .component("hdfs", "datanode", ComponentCategory::Slave)
        .component("hdfs", "hdfs_client", ComponentCategory::Client)
        .custom_command("hdfs", "namenode", "rebalance")
        .service("kafka", "kafka")
        .component("kafka", "kafka_broker", ComponentCategory::Master)
        .requires("kafka", "zookeeper")
        .dependency("KAFKA_BROKER-START", &["ZOOKEEPER_SERVER-START"])
        .dependency("DATANODE-START", &["NAMENODE-START"])
        .dependency("NAMENODE-START", &["ZOOKEEPER_SERVER-START"])
}

pub fn sample_metadata() -> Arc<StackMetadata> {
    Arc::new(sample_stack().build())
}

/// Builder for `CommandContext`.
pub struct CommandBuilder {
    command: CommandContext,
}

impl CommandBuilder {
    pub fn new(level: CommandLevel, command: Command) -> Self {
        Self {
            command: CommandContext::new(level, command),
        }
    }

    pub fn cluster_add(name: &str, hosts: &[&str]) -> Self {
        let mut b = Self::new(CommandLevel::Cluster, Command::Add);
        b.command.cluster_command = Some(ClusterCommand {
            name: name.to_string(),
            display_name: None,
            user_group: None,
            root_dir: None,
            hosts: hosts
                .iter()
                .map(|h| HostCommand {
                    hostname: h.to_string(),
                })
                .collect(),
        });
        b
    }

    pub fn cluster(mut self, id: ClusterId) -> Self {
        self.command.cluster_id = Some(id);
        self
    }

    pub fn custom(mut self, action: &str) -> Self {
        self.command.custom_command = Some(action.to_string());
        self
    }

    pub fn host(mut self, hostname: &str) -> Self {
        self.command.host_commands.push(HostCommand {
            hostname: hostname.to_string(),
        });
        self
    }

    /// A service target; `components` pairs a component with its hosts.
    pub fn service(mut self, name: &str, components: &[(&str, &[&str])]) -> Self {
        self.command.service_commands.push(ServiceCommand {
            service_name: name.to_string(),
            component_hosts: component_hosts(components),
            configs: BTreeMap::new(),
            installed: false,
        });
        self
    }

    /// Marks the most recently added service as already installed.
    pub fn installed(mut self) -> Self {
        if let Some(last) = self.command.service_commands.last_mut() {
            last.installed = true;
        }
        self
    }

    pub fn config(mut self, key: &str, value: serde_json::Value) -> Self {
        if let Some(last) = self.command.service_commands.last_mut() {
            last.configs.insert(key.to_string(), value);
        }
        self
    }

    pub fn component(mut self, name: &str, hosts: &[&str]) -> Self {
        self.command.component_commands.push(ComponentHosts {
            component_name: name.to_string(),
            hostnames: hosts.iter().map(|h| h.to_string()).collect(),
        });
        self
    }

    pub fn build(self) -> CommandContext {
        self.command
    }
}

fn component_hosts(components: &[(&str, &[&str])]) -> Vec<ComponentHosts> {
    components
        .iter()
        .map(|(name, hosts)| ComponentHosts {
            component_name: name.to_string(),
            hostnames: hosts.iter().map(|h| h.to_string()).collect(),
        })
        .collect()
}

/// Insert a cluster with its hosts directly, bypassing any job.
pub fn seed_cluster(store: &dyn Store, stack: &StackMetadata, name: &str, hosts: &[&str]) -> ClusterId {
    let cluster_id = store
        .insert_cluster(ClusterRecord {
            id: 0,
            name: name.to_string(),
            display_name: name.to_string(),
            user_group: stack.user_group.clone(),
            root_dir: stack.root_dir.clone(),
            stack_name: stack.name.clone(),
            stack_version: stack.version.clone(),
        })
        .expect("insert cluster");
    for host in hosts {
        store
            .upsert_host(HostRecord {
                id: 0,
                cluster_id,
                hostname: host.to_string(),
            })
            .expect("insert host");
    }
    cluster_id
}

/// Record `service` as installed with `components` placed on their hosts.
pub fn seed_installed(
    store: &dyn Store,
    stack: &StackMetadata,
    cluster_id: ClusterId,
    service: &str,
    components: &[(&str, &[&str])],
) {
    let def = stack.service(service).expect("service declared in stack");
    store
        .upsert_service(ServiceRecord {
            id: 0,
            cluster_id,
            name: def.name.clone(),
            display_name: def.display_name.clone(),
            user: def.user.clone(),
            status: HealthStatus::Healthy,
            restart_required: false,
        })
        .expect("insert service");
    for (component, hosts) in components {
        for host in hosts.iter() {
            store
                .upsert_component(ComponentRecord {
                    id: 0,
                    cluster_id,
                    service_name: def.name.clone(),
                    name: component.to_string(),
                    hostname: host.to_string(),
                    installed: true,
                    status: HealthStatus::Healthy,
                })
                .expect("insert component");
        }
    }
}
