//! dmart permission reload worker.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use dmart_application::{
    AccessControlService, AccessControlSettings, PermissionStore, QueryPolicyFormat,
};
use dmart_core::{AppError, AppResult};
use dmart_infrastructure::{
    PostgresEntryRepository, RedisSnapshotRepository, RedisUserPermissionCache,
};

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

static MIGRATOR: Migrator = sqlx::migrate!("../../crates/infrastructure/migrations");

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    redis_url: String,
    redis_key_prefix: String,
    reload_interval_seconds: u64,
    command: WorkerCommand,
    access_control: AccessControlSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerCommand {
    Watch,
    Once,
    Policies {
        user_shortname: String,
        space_name: String,
        subpath: Option<String>,
    },
}

impl WorkerCommand {
    fn parse(args: &[String]) -> AppResult<Self> {
        match args {
            [] => Ok(Self::Watch),
            [command] if command == "once" => Ok(Self::Once),
            [command, user_shortname, space_name, rest @ ..]
                if command == "policies" && rest.len() <= 1 =>
            {
                Ok(Self::Policies {
                    user_shortname: user_shortname.clone(),
                    space_name: space_name.clone(),
                    subpath: rest.first().cloned(),
                })
            }
            _ => Err(AppError::Validation(format!(
                "unknown command '{}', expected 'once' or 'policies <user> <space> [subpath]'",
                args.join(" ")
            ))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = WorkerConfig::load(&args)?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    MIGRATOR
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    let (store, access_control) = build_access_control(pool, &config)?;

    info!(
        management_space = %config.access_control.management_space,
        reload_interval_seconds = config.reload_interval_seconds,
        redis_key_prefix = %config.redis_key_prefix,
        "dmart-permission-worker started"
    );

    match &config.command {
        WorkerCommand::Once => reload(&store).await,
        WorkerCommand::Policies {
            user_shortname,
            space_name,
            subpath,
        } => {
            if !store.adopt_published_snapshot().await? {
                reload(&store).await?;
            }
            let policies = access_control
                .get_user_query_policies(
                    user_shortname.as_str(),
                    space_name.as_str(),
                    subpath.as_deref().unwrap_or_default(),
                    subpath.is_none(),
                )
                .await?;

            info!(
                user = %user_shortname,
                space = %space_name,
                count = policies.len(),
                "resolved query policies"
            );
            for policy in policies {
                info!(%policy, "query policy");
            }
            Ok(())
        }
        WorkerCommand::Watch => loop {
            if let Err(error) = reload(&store).await {
                warn!(error = %error, "permission reload failed; keeping previous snapshot");
            }
            tokio::time::sleep(Duration::from_secs(config.reload_interval_seconds)).await;
        },
    }
}

impl WorkerConfig {
    fn load(args: &[String]) -> AppResult<Self> {
        let command = WorkerCommand::parse(args)?;

        let defaults = AccessControlSettings::default();
        let default_role = match env::var("DEFAULT_ROLE") {
            Ok(role) if role.trim().is_empty() => None,
            Ok(role) => Some(role.trim().to_owned()),
            Err(_) => defaults.default_role,
        };
        let query_policy_format = match env::var("QUERY_POLICY_FORMAT") {
            Ok(value) => value.parse::<QueryPolicyFormat>()?,
            Err(_) => defaults.query_policy_format,
        };

        let reload_interval_seconds = parse_env_u64("PERMISSION_RELOAD_INTERVAL_SECONDS", 60)?;
        if reload_interval_seconds == 0 {
            return Err(AppError::Validation(
                "PERMISSION_RELOAD_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            redis_url: required_env("REDIS_URL")?,
            redis_key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "dmart".to_owned()),
            reload_interval_seconds,
            command,
            access_control: AccessControlSettings {
                management_space: env::var("MANAGEMENT_SPACE")
                    .unwrap_or(defaults.management_space),
                default_role,
                debug_denials: parse_env_bool("ACCESS_DEBUG", defaults.debug_denials)?,
                user_permissions_ttl_seconds: parse_env_u32(
                    "USER_PERMISSIONS_TTL_SECONDS",
                    defaults.user_permissions_ttl_seconds,
                )?,
                query_policy_format,
            },
        })
    }
}

async fn reload(store: &PermissionStore) -> AppResult<()> {
    let snapshot = store.load_permissions_and_roles().await?;
    let (groups, roles, permissions) = snapshot.counts();
    info!(
        generation = snapshot.generation(),
        revision = %snapshot.revision(),
        loaded_at = ?snapshot.loaded_at(),
        groups,
        roles,
        permissions,
        "permission snapshot published"
    );
    Ok(())
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to connect to database: {error}")))
}

fn build_access_control(
    pool: PgPool,
    config: &WorkerConfig,
) -> AppResult<(Arc<PermissionStore>, AccessControlService)> {
    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;

    let entries = Arc::new(PostgresEntryRepository::new(pool));
    let snapshots = Arc::new(RedisSnapshotRepository::new(
        redis_client.clone(),
        config.redis_key_prefix.as_str(),
    ));
    let cache = Arc::new(RedisUserPermissionCache::new(
        redis_client,
        config.redis_key_prefix.as_str(),
    ));

    let store = Arc::new(PermissionStore::new(
        config.access_control.management_space.as_str(),
        entries.clone(),
        snapshots,
        cache.clone(),
    ));
    let access_control = AccessControlService::new(
        store.clone(),
        entries,
        cache,
        config.access_control.clone(),
    );

    Ok((store, access_control))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_bool(name: &str, default: bool) -> AppResult<bool> {
    match env::var(name) {
        Ok(value) => parse_bool(name, value.as_str()),
        Err(_) => Ok(default),
    }
}

fn parse_bool(name: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "invalid {name} value '{value}': expected a boolean"
        ))),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
