// tests/job_factory.rs

use std::error::Error;

use clusterdag::errors::ClusterdagError;
use clusterdag::model::{ClusterId, PageRequest};
use clusterdag::plan::{persist_plan, CommandIdentifier, JobFactories, JobKind, JobPlan};
use clusterdag::stack::StackMetadata;
use clusterdag::store::{MemoryStore, Store};
use clusterdag::types::{Command, CommandLevel, ComponentCategory, JobState};
use clusterdag_test_utils::builders::{
    sample_stack, seed_cluster, seed_installed, CommandBuilder, StackBuilder,
};
use clusterdag_test_utils::flaky_store::FlakyStore;
use clusterdag_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

struct Fixture {
    stack: StackMetadata,
    store: MemoryStore,
    cluster_id: ClusterId,
    factories: JobFactories,
}

fn fixture() -> Fixture {
    init_tracing();
    let stack = sample_stack().build();
    let store = MemoryStore::new();
    let cluster_id = seed_cluster(&store, &stack, "c1", &["h1", "h2", "h3"]);
    Fixture {
        stack,
        store,
        cluster_id,
        factories: JobFactories::new(),
    }
}

impl Fixture {
    fn plan(&self, builder: CommandBuilder) -> clusterdag::errors::Result<JobPlan> {
        self.factories
            .create_job(&self.stack, &self.store, &builder.build())
    }
}

fn stage_names(plan: &JobPlan) -> Vec<&str> {
    plan.stages.iter().map(|s| s.name.as_str()).collect()
}

fn stage_hosts<'a>(plan: &'a JobPlan, name: &str) -> Vec<&'a str> {
    plan.stages
        .iter()
        .find(|s| s.name == name)
        .map(|s| s.tasks.iter().map(|t| t.context.hostname.as_str()).collect())
        .unwrap_or_default()
}

#[test]
fn registry_knows_every_kind_once() {
    let mut factories = JobFactories::new();
    assert_eq!(factories.identifiers().count(), JobKind::ALL.len());

    let id = CommandIdentifier::new(CommandLevel::Service, Command::Start);
    assert_eq!(factories.lookup(id).ok(), Some(JobKind::ServiceStart));

    // First registration wins.
    assert!(!factories.register(id, JobKind::ServiceStop));
    assert_eq!(factories.lookup(id).ok(), Some(JobKind::ServiceStart));
}

#[test]
fn unsupported_pair_is_rejected_without_persisting() -> TestResult {
    let f = fixture();
    let err = f
        .plan(CommandBuilder::new(CommandLevel::Host, Command::Check).cluster(f.cluster_id).host("h1"))
        .unwrap_err();

    assert!(matches!(
        err,
        ClusterdagError::UnsupportedCommand {
            level: CommandLevel::Host,
            command: Command::Check
        }
    ));
    assert_eq!(f.store.list_jobs(Some(f.cluster_id), PageRequest::default())?.total, 0);
    Ok(())
}

#[test]
fn cluster_add_checks_hosts_then_refreshes_cache() -> TestResult {
    let f = fixture();
    let plan = f.plan(CommandBuilder::cluster_add("c2", &["n1", "n2"]))?;

    assert_eq!(plan.kind, JobKind::ClusterAdd);
    assert_eq!(plan.name, "Add cluster");
    assert_eq!(plan.cluster_id, None);
    assert_eq!(stage_names(&plan), vec!["Check hosts", "Update cache files"]);

    let tasks: Vec<&str> = plan.stages[0].tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tasks, vec!["Check host on n1", "Check host on n2"]);
    assert_eq!(
        plan.stages[1].tasks[0].context.custom_command.as_deref(),
        Some("update_cache_files")
    );
    Ok(())
}

#[test]
fn cluster_add_rejects_taken_name_and_empty_hosts() {
    let f = fixture();

    let taken = f.plan(CommandBuilder::cluster_add("c1", &["n1"])).unwrap_err();
    assert!(matches!(taken, ClusterdagError::InvalidCommand(_)), "got {taken:?}");

    let no_hosts = f.plan(CommandBuilder::cluster_add("c9", &[])).unwrap_err();
    assert!(matches!(no_hosts, ClusterdagError::InvalidCommand(_)), "got {no_hosts:?}");
}

#[test]
fn hostnames_must_be_plain_host_names() -> TestResult {
    let f = fixture();

    for bad in ["h1; touch /tmp/owned", "$(id)", "-dash", "a..b", "tail-", "white space", " "] {
        let err = f.plan(CommandBuilder::cluster_add("c7", &["n1", bad])).unwrap_err();
        assert!(matches!(err, ClusterdagError::InvalidCommand(_)), "{bad:?}: got {err:?}");

        let err = f
            .plan(CommandBuilder::new(CommandLevel::Host, Command::Add).cluster(f.cluster_id).host(bad))
            .unwrap_err();
        assert!(matches!(err, ClusterdagError::InvalidCommand(_)), "{bad:?}: got {err:?}");
    }

    let long = format!("{}.example", "a".repeat(64));
    assert!(f.plan(CommandBuilder::cluster_add("c7", &[long.as_str()])).is_err());

    let plan = f.plan(CommandBuilder::cluster_add("c7", &["node-1.example.com", "10.0.0.5", "N2"]))?;
    assert_eq!(stage_hosts(&plan, "Check hosts"), vec!["node-1.example.com", "10.0.0.5", "N2"]);
    Ok(())
}

#[test]
fn commands_need_an_existing_cluster() {
    let f = fixture();

    let missing = f
        .plan(CommandBuilder::new(CommandLevel::Cluster, Command::Start))
        .unwrap_err();
    assert!(matches!(missing, ClusterdagError::InvalidCommand(_)));

    let unknown = f
        .plan(CommandBuilder::new(CommandLevel::Cluster, Command::Start).cluster(999))
        .unwrap_err();
    assert!(matches!(unknown, ClusterdagError::InvalidCommand(_)));
}

#[test]
fn host_add_checks_new_hosts_and_refreshes_all() -> TestResult {
    let f = fixture();
    let plan = f.plan(
        CommandBuilder::new(CommandLevel::Host, Command::Add)
            .cluster(f.cluster_id)
            .host("h4"),
    )?;

    assert_eq!(stage_hosts(&plan, "Check hosts"), vec!["h4"]);
    assert_eq!(
        stage_hosts(&plan, "Update cache files"),
        vec!["h1", "h2", "h3", "h4"]
    );

    let dup = f
        .plan(
            CommandBuilder::new(CommandLevel::Host, Command::Add)
                .cluster(f.cluster_id)
                .host("h1"),
        )
        .unwrap_err();
    assert!(matches!(dup, ClusterdagError::InvalidCommand(_)));
    Ok(())
}

#[test]
fn service_add_builds_full_install_sequence() -> TestResult {
    let f = fixture();
    let plan = f.plan(
        CommandBuilder::new(CommandLevel::Service, Command::Add)
            .cluster(f.cluster_id)
            .service(
                "zookeeper",
                &[("zookeeper_server", &["h1"]), ("zookeeper_client", &["h1", "h2"])],
            )
            .service(
                "hdfs",
                &[
                    ("namenode", &["h1"]),
                    ("datanode", &["h1", "h2"]),
                    ("hdfs_client", &["h2"]),
                ],
            ),
    )?;

    assert_eq!(
        stage_names(&plan),
        vec![
            "Add Zookeeper Server",
            "Add Zookeeper Client",
            "Add Namenode",
            "Add Datanode",
            "Add Hdfs Client",
            "Update cache files",
            "Configure Zookeeper Server",
            "Configure Zookeeper Client",
            "Configure Namenode",
            "Configure Datanode",
            "Configure Hdfs Client",
            "Init Zookeeper Server",
            "Start Zookeeper Server",
            "Init Zookeeper Client",
            "Init Namenode",
            "Start Namenode",
            "Init Datanode",
            "Start Datanode",
            "Init Hdfs Client",
            "Prepare Zookeeper Server",
            "Prepare Namenode",
            "Prepare Datanode",
            "Check Zookeeper Server",
            "Check Namenode",
            "Check Datanode",
        ]
    );

    // Clients are installed everywhere, started nowhere.
    assert_eq!(stage_hosts(&plan, "Add Zookeeper Client"), vec!["h1", "h2"]);
    // Init and check run on the first host only.
    assert_eq!(stage_hosts(&plan, "Init Datanode"), vec!["h1"]);
    assert_eq!(stage_hosts(&plan, "Check Datanode"), vec!["h1"]);
    assert_eq!(stage_hosts(&plan, "Start Datanode"), vec!["h1", "h2"]);
    assert_eq!(stage_hosts(&plan, "Update cache files"), vec!["h1", "h2", "h3"]);

    let task = &plan.stages[0].tasks[0];
    assert_eq!(task.name, "Add Zookeeper Server on h1");
    assert_eq!(task.context.service_user, "zookeeper");
    assert_eq!(task.context.stack_name, "bigtop");
    Ok(())
}

#[test]
fn service_add_skips_services_marked_installed() -> TestResult {
    let f = fixture();
    seed_installed(&f.store, &f.stack, f.cluster_id, "zookeeper", &[("zookeeper_server", &["h1"])]);

    let plan = f.plan(
        CommandBuilder::new(CommandLevel::Service, Command::Add)
            .cluster(f.cluster_id)
            .service("zookeeper", &[("zookeeper_server", &["h1"])])
            .installed()
            .service("kafka", &[("kafka_broker", &["h2"])]),
    )?;

    assert!(plan.stages.iter().all(|s| s.component_name.as_deref() != Some("zookeeper_server")));
    assert_eq!(stage_hosts(&plan, "Start Kafka Broker"), vec!["h2"]);
    Ok(())
}

#[test]
fn service_add_requires_dependencies() -> TestResult {
    let f = fixture();

    let err = f
        .plan(
            CommandBuilder::new(CommandLevel::Service, Command::Add)
                .cluster(f.cluster_id)
                .service("kafka", &[("kafka_broker", &["h1"])]),
        )
        .unwrap_err();
    assert!(matches!(err, ClusterdagError::InvalidCommand(_)), "got {err:?}");

    // Adding the required service in the same command is fine.
    let plan = f.plan(
        CommandBuilder::new(CommandLevel::Service, Command::Add)
            .cluster(f.cluster_id)
            .service("kafka", &[("kafka_broker", &["h1"])])
            .service("zookeeper", &[("zookeeper_server", &["h1"])]),
    )?;
    let starts: Vec<&str> = stage_names(&plan)
        .into_iter()
        .filter(|n| n.starts_with("Start"))
        .collect();
    assert_eq!(starts, vec!["Start Zookeeper Server", "Start Kafka Broker"]);
    Ok(())
}

#[test]
fn service_targets_are_validated() {
    let f = fixture();

    let wrong_service = f
        .plan(
            CommandBuilder::new(CommandLevel::Service, Command::Add)
                .cluster(f.cluster_id)
                .service("zookeeper", &[("namenode", &["h1"])]),
        )
        .unwrap_err();
    assert!(matches!(wrong_service, ClusterdagError::InvalidCommand(_)));

    let foreign_host = f
        .plan(
            CommandBuilder::new(CommandLevel::Service, Command::Add)
                .cluster(f.cluster_id)
                .service("zookeeper", &[("zookeeper_server", &["elsewhere"])]),
        )
        .unwrap_err();
    assert!(matches!(foreign_host, ClusterdagError::InvalidCommand(_)));

    let unknown = f
        .plan(
            CommandBuilder::new(CommandLevel::Service, Command::Start)
                .cluster(f.cluster_id)
                .service("spark", &[]),
        )
        .unwrap_err();
    assert!(matches!(unknown, ClusterdagError::InvalidCommand(_)));
}

#[test]
fn service_stop_tears_down_in_reverse_and_restart_chains() -> TestResult {
    let f = fixture();
    seed_installed(
        &f.store,
        &f.stack,
        f.cluster_id,
        "zookeeper",
        &[("zookeeper_server", &["h1"]), ("zookeeper_client", &["h1", "h2"])],
    );
    seed_installed(&f.store, &f.stack, f.cluster_id, "kafka", &[("kafka_broker", &["h2"])]);

    let stop = f.plan(
        CommandBuilder::new(CommandLevel::Service, Command::Stop)
            .cluster(f.cluster_id)
            .service("zookeeper", &[])
            .service("kafka", &[]),
    )?;
    assert_eq!(stage_names(&stop), vec!["Stop Kafka Broker", "Stop Zookeeper Server"]);

    let restart = f.plan(
        CommandBuilder::new(CommandLevel::Service, Command::Restart)
            .cluster(f.cluster_id)
            .service("zookeeper", &[])
            .service("kafka", &[]),
    )?;
    assert_eq!(
        stage_names(&restart),
        vec![
            "Stop Kafka Broker",
            "Stop Zookeeper Server",
            "Start Zookeeper Server",
            "Start Kafka Broker"
        ]
    );
    Ok(())
}

#[test]
fn service_names_match_regardless_of_case() -> TestResult {
    let stack = StackBuilder::new("mixed")
        .service("ZooKeeper", "zookeeper")
        .component("ZooKeeper", "ZooKeeper_Server", ComponentCategory::Master)
        .service("Kafka", "kafka")
        .component("Kafka", "Kafka_Broker", ComponentCategory::Master)
        .requires("Kafka", "ZOOKEEPER")
        .build();

    for name in ["zookeeper", "ZooKeeper", "ZOOKEEPER"] {
        let service = stack.service(name).ok_or("service not found")?;
        assert_eq!(service.name, "zookeeper");
        assert_eq!(service.display_name, "Zookeeper");
    }
    assert_eq!(stack.service_of("zookeeper_server").map(|s| s.name.as_str()), Some("zookeeper"));
    assert_eq!(stack.service("kafka").map(|s| s.required_services.clone()), Some(vec!["zookeeper".to_string()]));

    let f = fixture();
    seed_installed(&f.store, &f.stack, f.cluster_id, "zookeeper", &[("zookeeper_server", &["h1"])]);
    let restart = f.plan(
        CommandBuilder::new(CommandLevel::Service, Command::Restart)
            .cluster(f.cluster_id)
            .service("ZooKeeper", &[]),
    )?;
    assert_eq!(stage_names(&restart), vec!["Stop Zookeeper Server", "Start Zookeeper Server"]);
    assert_eq!(restart.command.service_commands[0].service_name, "zookeeper");
    Ok(())
}

#[test]
fn host_start_only_touches_components_on_those_hosts() -> TestResult {
    let f = fixture();
    seed_installed(
        &f.store,
        &f.stack,
        f.cluster_id,
        "hdfs",
        &[("namenode", &["h1"]), ("datanode", &["h1", "h2", "h3"])],
    );

    let plan = f.plan(
        CommandBuilder::new(CommandLevel::Host, Command::Start)
            .cluster(f.cluster_id)
            .host("h2")
            .host("h3"),
    )?;

    assert_eq!(stage_names(&plan), vec!["Start Datanode"]);
    assert_eq!(stage_hosts(&plan, "Start Datanode"), vec!["h2", "h3"]);
    Ok(())
}

#[test]
fn cluster_start_with_nothing_installed_has_no_stages() -> TestResult {
    let f = fixture();
    let plan = f.plan(CommandBuilder::new(CommandLevel::Cluster, Command::Start).cluster(f.cluster_id))?;
    assert!(plan.stages.is_empty());
    Ok(())
}

#[test]
fn component_add_skips_hosts_already_installed() -> TestResult {
    let f = fixture();
    seed_installed(&f.store, &f.stack, f.cluster_id, "zookeeper", &[("zookeeper_server", &["h1"])]);

    let plan = f.plan(
        CommandBuilder::new(CommandLevel::Component, Command::Add)
            .cluster(f.cluster_id)
            .component("zookeeper_server", &["h1", "h2"]),
    )?;

    assert_eq!(stage_hosts(&plan, "Add Zookeeper Server"), vec!["h2"]);
    assert!(!stage_names(&plan).iter().any(|n| n.starts_with("Check")));
    Ok(())
}

#[test]
fn custom_command_must_be_declared_by_component() -> TestResult {
    let f = fixture();

    let plan = f.plan(
        CommandBuilder::new(CommandLevel::Component, Command::Custom)
            .cluster(f.cluster_id)
            .custom("rebalance")
            .component("namenode", &["h1"]),
    )?;
    assert_eq!(stage_names(&plan), vec!["Rebalance Namenode"]);
    let task = &plan.stages[0].tasks[0];
    assert_eq!(task.name, "Rebalance Namenode on h1");
    assert_eq!(task.context.custom_command.as_deref(), Some("rebalance"));

    let undeclared = f
        .plan(
            CommandBuilder::new(CommandLevel::Component, Command::Custom)
                .cluster(f.cluster_id)
                .custom("format")
                .component("namenode", &["h1"]),
        )
        .unwrap_err();
    assert!(matches!(undeclared, ClusterdagError::InvalidCommand(_)));

    let missing = f
        .plan(
            CommandBuilder::new(CommandLevel::Component, Command::Custom)
                .cluster(f.cluster_id)
                .component("namenode", &["h1"]),
        )
        .unwrap_err();
    assert!(matches!(missing, ClusterdagError::InvalidCommand(_)));
    Ok(())
}

#[test]
fn configure_carries_service_configs_to_tasks() -> TestResult {
    let f = fixture();
    seed_installed(&f.store, &f.stack, f.cluster_id, "zookeeper", &[("zookeeper_server", &["h1", "h2"])]);

    let plan = f.plan(
        CommandBuilder::new(CommandLevel::Service, Command::Configure)
            .cluster(f.cluster_id)
            .service("zookeeper", &[])
            .config("tickTime", serde_json::json!(2000)),
    )?;

    assert_eq!(
        stage_names(&plan),
        vec![
            "Update cache files",
            "Configure Zookeeper Server",
            "Stop Zookeeper Server",
            "Start Zookeeper Server"
        ]
    );
    assert_eq!(stage_hosts(&plan, "Stop Zookeeper Server"), vec!["h1", "h2"]);
    assert_eq!(stage_hosts(&plan, "Start Zookeeper Server"), vec!["h1", "h2"]);
    for task in &plan.stages[1].tasks {
        assert_eq!(task.context.configs.get("tickTime"), Some(&serde_json::json!(2000)));
    }
    Ok(())
}

#[test]
fn persisted_plan_is_pending_and_ordered() -> TestResult {
    let f = fixture();
    let plan = f.plan(
        CommandBuilder::new(CommandLevel::Component, Command::Add)
            .cluster(f.cluster_id)
            .component("datanode", &["h1", "h2"]),
    )?;

    let job_id = persist_plan(&f.store, &plan)?;
    let job = f.store.job(job_id)?.ok_or("job missing")?;
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.cluster_id, Some(f.cluster_id));
    assert_eq!(job.retry_count, 0);

    let stages = f.store.stages_of_job(job_id)?;
    assert_eq!(stages.len(), plan.stages.len());
    for (i, stage) in stages.iter().enumerate() {
        assert_eq!(stage.order as usize, i + 1);
        assert_eq!(stage.name, plan.stages[i].name);
        assert_eq!(stage.state, JobState::Pending);
    }

    let tasks = f.store.tasks_of_job(job_id)?;
    let planned: usize = plan.stages.iter().map(|s| s.tasks.len()).sum();
    assert_eq!(tasks.len(), planned);
    assert!(tasks.iter().all(|t| t.state == JobState::Pending));
    Ok(())
}

#[test]
fn failed_persist_leaves_nothing_behind() -> TestResult {
    let f = fixture();
    let plan = f.plan(
        CommandBuilder::new(CommandLevel::Component, Command::Add)
            .cluster(f.cluster_id)
            .component("datanode", &["h1", "h2"]),
    )?;
    let planned: usize = plan.stages.iter().map(|s| s.tasks.len()).sum();
    assert!(planned > 2);

    let store = FlakyStore::new();
    store.fail_task_inserts_after(2);
    let err = persist_plan(&store, &plan).unwrap_err();
    assert!(matches!(err, ClusterdagError::Persistence(_)), "got {err:?}");

    assert_eq!(store.list_jobs(plan.cluster_id, PageRequest::default())?.total, 0);
    for id in 1..=64 {
        assert!(store.job(id)?.is_none(), "job {id} left behind");
        assert!(store.stage(id)?.is_none(), "stage {id} left behind");
        assert!(store.task(id)?.is_none(), "task {id} left behind");
    }

    store.heal();
    let job_id = persist_plan(&store, &plan)?;
    assert_eq!(store.tasks_of_job(job_id)?.len(), planned);
    Ok(())
}
