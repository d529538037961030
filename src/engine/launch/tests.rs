//! Unit tests for launch planning and execution.

use mockall::Sequence;
use rstest::{fixture, rstest};

use super::*;
use crate::engine::naming::decode;
use crate::engine::runtime::mock::{MockRuntime, engine_error, ready};

/// Configuration with port ranges away from well-known service ports.
#[fixture]
fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.port_start = 41_000;
    config.database.port_end = 41_999;
    config.metabase.port_start = 42_000;
    config.metabase.port_end = 42_999;
    config
}

fn env_value<'p>(plan: &'p LaunchPlan, key: &str) -> Option<&'p str> {
    plan.env
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

fn postgres_container(port: u16) -> ContainerName {
    ContainerName::new(ContainerKind::Database, "postgres", port).expect("valid name")
}

#[rstest]
#[case(DatabaseEngine::Postgres, "postgres:16", 5432)]
#[case(DatabaseEngine::MariaDb, "mariadb:10.11", 3306)]
#[case(DatabaseEngine::MySql, "mysql:8.0", 3306)]
#[case(DatabaseEngine::ClickHouse, "clickhouse/clickhouse-server:latest", 8123)]
fn database_plans_use_engine_image_and_port(
    config: AppConfig,
    #[case] engine: DatabaseEngine,
    #[case] image: &str,
    #[case] container_port: u16,
) {
    let runtime = MockRuntime::new();
    let launcher = Launcher::new(&runtime, &config);

    let plan = launcher
        .plan(&ServiceRequest::Database(engine))
        .expect("plan should succeed");

    assert_eq!(plan.image, image);
    assert_eq!(plan.container_port, container_port);
    assert!(config.database.port_range().contains(&plan.host_port));
    let decoded = decode(&plan.name).expect("planned name should decode");
    assert_eq!(decoded.kind(), ContainerKind::Database);
    assert_eq!(decoded.name(), engine.as_str());
    assert_eq!(decoded.port(), plan.host_port);
}

#[rstest]
fn postgres_plan_sets_credentials_and_logging(config: AppConfig) {
    let runtime = MockRuntime::new();
    let launcher = Launcher::new(&runtime, &config);

    let plan = launcher
        .plan(&ServiceRequest::Database(DatabaseEngine::Postgres))
        .expect("plan should succeed");

    assert_eq!(env_value(&plan, "POSTGRES_USER"), Some("db"));
    assert_eq!(env_value(&plan, "POSTGRES_PASSWORD"), Some("db"));
    assert_eq!(
        plan.cmd,
        ["-c", "log_statement=all", "-c", "max_locks_per_transaction=1000"]
    );
}

#[rstest]
fn mariadb_plan_creates_database_and_root_password(config: AppConfig) {
    let runtime = MockRuntime::new();
    let launcher = Launcher::new(&runtime, &config);

    let plan = launcher
        .plan(&ServiceRequest::Database(DatabaseEngine::MariaDb))
        .expect("plan should succeed");

    assert_eq!(env_value(&plan, "MARIADB_DATABASE"), Some("db"));
    assert_eq!(env_value(&plan, "MARIADB_ROOT_PASSWORD"), Some("db"));
    assert!(plan.cmd.is_empty());
}

#[rstest]
fn dry_run_renders_docker_run_command(config: AppConfig) {
    let runtime = MockRuntime::new();
    let launcher = Launcher::new(&runtime, &config);

    let command = launcher
        .dry_run(&ServiceRequest::Database(DatabaseEngine::Postgres))
        .expect("dry run should succeed");

    assert!(command.starts_with("docker run -d -p 41"), "{command}");
    assert!(command.contains(":5432 --name metaship-db-postgres-41"), "{command}");
    assert!(command.contains("-e POSTGRES_USER=db -e POSTGRES_PASSWORD=db"), "{command}");
    assert!(
        command.ends_with("postgres:16 -c log_statement=all -c max_locks_per_transaction=1000"),
        "{command}"
    );
}

#[rstest]
#[case("oracle")]
#[case("Postgres")]
#[case("")]
fn unknown_engines_are_unsupported(#[case] identifier: &str) {
    let error = identifier
        .parse::<DatabaseEngine>()
        .expect_err("engine should be rejected");
    assert!(matches!(error, ContainerError::UnsupportedKind { kind } if kind == identifier));
}

#[rstest]
#[case("v1.50.1", MetabaseEdition::Enterprise)]
#[case("v0.50.1", MetabaseEdition::Community)]
fn edition_is_read_back_from_tag(#[case] tag: &str, #[case] edition: MetabaseEdition) {
    assert_eq!(MetabaseEdition::of_tag(tag), edition);
    assert_eq!(MetabaseEdition::of_tag(&edition.image_tag("v0.50.1")), edition);
}

#[rstest]
#[case(MetabaseEdition::Enterprise, "v0.50.1", "metabase/metabase-enterprise:v1.50.1")]
#[case(MetabaseEdition::Community, "v0.50.1", "metabase/metabase:v0.50.1")]
fn metabase_image_follows_edition(
    mut config: AppConfig,
    #[case] edition: MetabaseEdition,
    #[case] tag: &str,
    #[case] image: &str,
) {
    config.metabase.enterprise_token = Some(String::from("mb_token"));
    let runtime = MockRuntime::new();
    let launcher = Launcher::new(&runtime, &config);
    let request = ServiceRequest::Metabase(MetabaseRequest {
        tag: String::from(tag),
        edition,
        app_database: None,
    });

    let plan = launcher.plan(&request).expect("plan should succeed");

    assert_eq!(plan.image, image);
    assert_eq!(plan.container_port, METABASE_CONTAINER_PORT);
    let decoded = decode(&plan.name).expect("planned name should decode");
    assert_eq!(decoded.kind(), ContainerKind::Metabase);
    assert_eq!(Some(decoded.name()), image.rsplit(':').next());
    assert_eq!(
        env_value(&plan, "MB_PREMIUM_EMBEDDING_TOKEN").is_some(),
        edition == MetabaseEdition::Enterprise
    );
    assert_eq!(plan.extra_hosts, ["host.docker.internal:host-gateway"]);
}

#[rstest]
fn metabase_without_app_database_uses_embedded_storage(config: AppConfig) {
    let runtime = MockRuntime::new();
    let launcher = Launcher::new(&runtime, &config);
    let request = ServiceRequest::Metabase(MetabaseRequest {
        tag: String::from("v0.49.2"),
        edition: MetabaseEdition::Enterprise,
        app_database: None,
    });

    let plan = launcher.plan(&request).expect("plan should succeed");

    assert!(plan.env.is_empty(), "unexpected env: {:?}", plan.env);
}

#[rstest]
fn metabase_app_database_is_wired_through_host_alias(config: AppConfig) {
    let runtime = MockRuntime::new();
    let launcher = Launcher::new(&runtime, &config);
    let request = ServiceRequest::Metabase(MetabaseRequest {
        tag: String::from("v0.50.1"),
        edition: MetabaseEdition::Community,
        app_database: Some(postgres_container(5433)),
    });

    let plan = launcher.plan(&request).expect("plan should succeed");

    assert_eq!(env_value(&plan, "MB_DB_TYPE"), Some("postgres"));
    assert_eq!(
        env_value(&plan, "MB_DB_CONNECTION_URI"),
        Some("postgres://host.docker.internal:5433/db?user=db&password=db")
    );
}

#[rstest]
fn clickhouse_cannot_hold_metabase_state(config: AppConfig) {
    let runtime = MockRuntime::new();
    let launcher = Launcher::new(&runtime, &config);
    let clickhouse =
        ContainerName::new(ContainerKind::Database, "clickhouse", 8124).expect("valid name");
    let request = ServiceRequest::Metabase(MetabaseRequest {
        tag: String::from("v0.50.1"),
        edition: MetabaseEdition::Community,
        app_database: Some(clickhouse),
    });

    let error = launcher.plan(&request).expect_err("plan should fail");

    assert!(matches!(error, ContainerError::UnsupportedKind { .. }));
}

#[rstest]
fn cloudbeaver_uses_fixed_name_and_port(config: AppConfig) {
    let runtime = MockRuntime::new();
    let launcher = Launcher::new(&runtime, &config);

    let plan = launcher
        .plan(&ServiceRequest::CloudBeaver)
        .expect("plan should succeed");

    assert_eq!(plan.name, "metaship-cloudbeaver");
    assert_eq!(plan.host_port, 8978);
    assert_eq!(plan.image, "dbeaver/cloudbeaver:latest");
}

#[rstest]
fn create_body_publishes_port_and_host_alias() {
    let plan = LaunchPlan {
        name: String::from("metaship-metabase-v1.50.1-3001"),
        image: String::from("metabase/metabase-enterprise:v1.50.1"),
        host_port: 3001,
        container_port: 3000,
        env: vec![(String::from("MB_DB_TYPE"), String::from("postgres"))],
        cmd: Vec::new(),
        extra_hosts: vec![String::from("host.docker.internal:host-gateway")],
    };

    let body = plan.create_body();

    assert_eq!(body.env, Some(vec![String::from("MB_DB_TYPE=postgres")]));
    assert_eq!(body.cmd, None);
    let host_config = body.host_config.expect("host config should be set");
    let bindings = host_config
        .port_bindings
        .and_then(|mut bindings| bindings.remove("3000/tcp"))
        .flatten()
        .expect("port 3000 should be bound");
    assert_eq!(
        bindings.first().and_then(|binding| binding.host_port.as_deref()),
        Some("3001")
    );
    assert_eq!(
        host_config.extra_hosts,
        Some(vec![String::from("host.docker.internal:host-gateway")])
    );
}

fn sample_plan() -> LaunchPlan {
    LaunchPlan {
        name: String::from("metaship-db-postgres-5432"),
        image: String::from("postgres:16"),
        host_port: 5432,
        container_port: 5432,
        env: Vec::new(),
        cmd: Vec::new(),
        extra_hosts: Vec::new(),
    }
}

#[rstest]
#[tokio::test]
async fn execute_creates_then_starts(config: AppConfig) {
    let mut runtime = MockRuntime::new();
    runtime
        .expect_create_container()
        .times(1)
        .returning(|_, _| ready(String::from("abc123")));
    runtime
        .expect_start_container()
        .withf(|id| id == "abc123")
        .times(1)
        .returning(|_| ready(()));
    runtime.expect_pull_image().never();
    let launcher = Launcher::new(&runtime, &config);

    let handle = launcher
        .execute(&sample_plan())
        .await
        .expect("launch should succeed");

    assert_eq!(handle.id, "abc123");
    assert_eq!(handle.port, 5432);
    assert_eq!(handle.identifier, Some(postgres_container(5432)));
    assert!(handle.command.starts_with("docker run -d -p 5432:5432"));
}

#[rstest]
#[tokio::test]
async fn missing_image_is_pulled_and_create_retried(config: AppConfig) {
    let mut runtime = MockRuntime::new();
    let mut sequence = Sequence::new();
    runtime
        .expect_create_container()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, _| engine_error(404, "No such image: postgres:16"));
    runtime
        .expect_pull_image()
        .withf(|image| image == "postgres:16")
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| ready(()));
    runtime
        .expect_create_container()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, _| ready(String::from("fresh")));
    runtime
        .expect_start_container()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| ready(()));
    let launcher = Launcher::new(&runtime, &config);

    let handle = launcher
        .execute(&sample_plan())
        .await
        .expect("launch should succeed");

    assert_eq!(handle.id, "fresh");
}

#[rstest]
#[tokio::test]
async fn failed_pull_is_reported(config: AppConfig) {
    let mut runtime = MockRuntime::new();
    runtime
        .expect_create_container()
        .times(1)
        .returning(|_, _| engine_error(404, "No such image"));
    runtime
        .expect_pull_image()
        .times(1)
        .returning(|_| engine_error(500, "registry unreachable"));
    runtime.expect_start_container().never();
    let launcher = Launcher::new(&runtime, &config);

    let error = launcher
        .execute(&sample_plan())
        .await
        .expect_err("launch should fail");

    assert!(matches!(error, ContainerError::ImagePullFailed { image, .. } if image == "postgres:16"));
}

#[rstest]
#[tokio::test]
async fn name_conflict_is_a_create_failure(config: AppConfig) {
    let mut runtime = MockRuntime::new();
    runtime
        .expect_create_container()
        .times(1)
        .returning(|_, _| engine_error(409, "Conflict. The container name is already in use"));
    runtime.expect_pull_image().never();
    let launcher = Launcher::new(&runtime, &config);

    let error = launcher
        .execute(&sample_plan())
        .await
        .expect_err("launch should fail");

    assert!(matches!(
        error,
        ContainerError::CreateFailed { name, .. } if name == "metaship-db-postgres-5432"
    ));
}

#[rstest]
#[tokio::test]
async fn start_failure_names_the_container_id(config: AppConfig) {
    let mut runtime = MockRuntime::new();
    runtime
        .expect_create_container()
        .returning(|_, _| ready(String::from("abc123")));
    runtime
        .expect_start_container()
        .returning(|_| engine_error(500, "port is already allocated"));
    let launcher = Launcher::new(&runtime, &config);

    let error = launcher
        .execute(&sample_plan())
        .await
        .expect_err("launch should fail");

    assert!(matches!(
        error,
        ContainerError::StartFailed { container_id, .. } if container_id == "abc123"
    ));
}
