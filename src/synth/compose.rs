//! Environment descriptor synthesis.

use std::collections::BTreeMap;

use crate::credentials::ResolvedCredentials;
use crate::models::{BuildSpec, Contracts, EnvironmentDescriptor, ProjectDescriptor, ServiceSpec};
use crate::paths::{Paths, GENERATED_DIR};

use super::SynthError;

pub const SERVER: &str = "server";
pub const POSTGRES: &str = "postgres";
pub const REDIS: &str = "redis";
pub const POSTGRES_ADMIN: &str = "adminer";
pub const REDIS_ADMIN: &str = "redis-commander";

pub const SERVER_PORT: u16 = 8080;
const POSTGRES_PORT: u16 = 5432;
const REDIS_PORT: u16 = 6379;
const POSTGRES_ADMIN_PORT: u16 = 8081;
const REDIS_ADMIN_PORT: u16 = 8082;

const POSTGRES_IMAGE: &str = "postgres:16-alpine";
const REDIS_IMAGE: &str = "redis:7-alpine";
const POSTGRES_ADMIN_IMAGE: &str = "adminer:4";
const REDIS_ADMIN_IMAGE: &str = "rediscommander/redis-commander:latest";

const DB_USER: &str = "devstack";
const DB_PASSWORD: &str = "devstack";
const DB_NAME: &str = "devstack";

/// Mount point of compiled contract artifacts inside the server container.
pub const CONTAINER_ARTIFACTS_DIR: &str = "/app/artifacts";

/// Everything the descriptor is a function of.
pub struct EnvironmentInput<'a> {
    pub paths: &'a Paths,
    pub project: &'a ProjectDescriptor,
    pub credentials: &'a ResolvedCredentials,
    /// Already validated contracts subsystem, if enabled.
    pub contracts: Option<&'a Contracts>,
}

/// Build the service graph.
///
/// The server, both data stores and their admin UIs are only present when the
/// backend is requested. Secrets that did not resolve are left out of the
/// environment entirely.
pub fn synthesize_environment(input: &EnvironmentInput<'_>) -> Result<EnvironmentDescriptor, SynthError> {
    let mut descriptor = EnvironmentDescriptor {
        name: input.paths.namespace().to_string(),
        services: BTreeMap::new(),
    };

    if !input.project.runs_backend() {
        return Ok(descriptor);
    }

    descriptor.services.insert(SERVER.to_string(), server_service(input)?);
    descriptor.services.insert(POSTGRES.to_string(), postgres_service(input.paths));
    descriptor.services.insert(REDIS.to_string(), redis_service(input.paths));
    descriptor.services.insert(POSTGRES_ADMIN.to_string(), postgres_admin_service());
    descriptor.services.insert(REDIS_ADMIN.to_string(), redis_admin_service());

    Ok(descriptor)
}

fn server_service(input: &EnvironmentInput<'_>) -> Result<ServiceSpec, SynthError> {
    let project = input.project;
    let backend_dir = input.paths.backend_dir(&project.backend_dir);

    let mut environment = BTreeMap::new();
    environment.insert(
        "DATABASE_URL".to_string(),
        format!(
            "postgres://{}:{}@{}:{}/{}",
            DB_USER, DB_PASSWORD, POSTGRES, POSTGRES_PORT, DB_NAME
        ),
    );
    environment.insert("REDIS_URL".to_string(), format!("redis://{}:{}", REDIS, REDIS_PORT));
    environment.insert("NETWORK".to_string(), project.network.as_str().to_string());
    environment.insert("PORT".to_string(), SERVER_PORT.to_string());
    environment.insert(
        "SYNC_PROTOCOL".to_string(),
        if project.features.sync_protocol { "enabled" } else { "disabled" }.to_string(),
    );
    environment.insert(
        "LOG_LEVEL".to_string(),
        if project.features.verbose_logging { "debug" } else { "info" }.to_string(),
    );

    let secrets = [
        ("SERVER_KEY", &input.credentials.server_key),
        ("EXTERNAL_API_KEY", &input.credentials.api_key),
        ("ADMIN_TOKEN", &input.credentials.admin_token),
    ];
    for (key, value) in secrets {
        if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
            environment.insert(key.to_string(), value.clone());
        }
    }

    if project.features.advanced_engine {
        environment.insert(
            "ENGINE_PARAMS".to_string(),
            serde_json::to_string(&project.engine)?,
        );
    }

    let mut volumes = Vec::new();
    if let Some(contracts) = input.contracts {
        volumes.push(format!(
            "{}:{}:ro",
            contracts.artifacts_dir().display(),
            CONTAINER_ARTIFACTS_DIR
        ));
        environment.insert(
            "CONTRACTS_ARTIFACTS".to_string(),
            CONTAINER_ARTIFACTS_DIR.to_string(),
        );
        environment.insert(
            "CONTRACTS_LANGUAGE".to_string(),
            contracts.language.as_str().to_string(),
        );
    }

    Ok(ServiceSpec {
        build: Some(BuildSpec {
            context: backend_dir.display().to_string(),
            dockerfile: format!("{}/Dockerfile", GENERATED_DIR),
        }),
        ports: vec![format!("{}:{}", SERVER_PORT, SERVER_PORT)],
        environment,
        volumes,
        depends_on: vec![POSTGRES.to_string(), REDIS.to_string()],
        ..Default::default()
    })
}

fn postgres_service(paths: &Paths) -> ServiceSpec {
    let environment = [
        ("POSTGRES_USER", DB_USER),
        ("POSTGRES_PASSWORD", DB_PASSWORD),
        ("POSTGRES_DB", DB_NAME),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    ServiceSpec {
        image: Some(POSTGRES_IMAGE.to_string()),
        ports: vec![format!("{}:{}", POSTGRES_PORT, POSTGRES_PORT)],
        environment,
        volumes: vec![format!(
            "{}:/var/lib/postgresql/data",
            paths.volumes_dir().join(POSTGRES).display()
        )],
        ..Default::default()
    }
}

fn redis_service(paths: &Paths) -> ServiceSpec {
    ServiceSpec {
        image: Some(REDIS_IMAGE.to_string()),
        command: Some(vec![
            "redis-server".to_string(),
            "--appendonly".to_string(),
            "yes".to_string(),
        ]),
        ports: vec![format!("{}:{}", REDIS_PORT, REDIS_PORT)],
        volumes: vec![format!("{}:/data", paths.volumes_dir().join(REDIS).display())],
        ..Default::default()
    }
}

fn postgres_admin_service() -> ServiceSpec {
    let mut environment = BTreeMap::new();
    environment.insert("ADMINER_DEFAULT_SERVER".to_string(), POSTGRES.to_string());

    ServiceSpec {
        image: Some(POSTGRES_ADMIN_IMAGE.to_string()),
        ports: vec![format!("{}:8080", POSTGRES_ADMIN_PORT)],
        environment,
        depends_on: vec![POSTGRES.to_string()],
        ..Default::default()
    }
}

fn redis_admin_service() -> ServiceSpec {
    let mut environment = BTreeMap::new();
    environment.insert(
        "REDIS_HOSTS".to_string(),
        format!("local:{}:{}", REDIS, REDIS_PORT),
    );

    ServiceSpec {
        image: Some(REDIS_ADMIN_IMAGE.to_string()),
        ports: vec![format!("{}:8081", REDIS_ADMIN_PORT)],
        environment,
        depends_on: vec![REDIS.to_string()],
        ..Default::default()
    }
}
