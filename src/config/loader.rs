//! Configuration loading with layered precedence.
//!
//! Layers, lowest to highest: defaults, configuration file, `METASHIP_*`
//! environment variables, command-line flags.
//!
//! Layers are composed with `MergeComposer` by hand rather than through
//! `OrthoConfig::load()`: the `Cli` owns subcommand parsing and `--config`,
//! and typed environment variables must fail loudly instead of being
//! ignored when they do not parse.
//!
//! String variables (e.g. `METASHIP_ENGINE_SOCKET`) are always accepted.
//! Typed variables such as `METASHIP_TAGS_PERSIST_CACHE=maybe` or
//! `METASHIP_DATABASE_PORT_START=huge` abort loading with
//! `ConfigError::InvalidValue`.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    String,
    Bool,
    U16,
    U32,
    U64,
}

/// One `METASHIP_*` variable and where it lands in the configuration tree.
struct EnvVarSpec {
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
}

const fn spec(
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
) -> EnvVarSpec {
    EnvVarSpec {
        env_var,
        path,
        var_type,
    }
}

const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    spec("METASHIP_ENGINE_SOCKET", &["engine_socket"], EnvVarType::String),
    // [database]
    spec("METASHIP_DATABASE_USER", &["database", "user"], EnvVarType::String),
    spec("METASHIP_DATABASE_PASSWORD", &["database", "password"], EnvVarType::String),
    spec("METASHIP_DATABASE_NAME", &["database", "name"], EnvVarType::String),
    spec("METASHIP_DATABASE_PORT_START", &["database", "port_start"], EnvVarType::U16),
    spec("METASHIP_DATABASE_PORT_END", &["database", "port_end"], EnvVarType::U16),
    spec("METASHIP_DATABASE_HOST_ALIAS", &["database", "host_alias"], EnvVarType::String),
    // [metabase]
    spec("METASHIP_METABASE_PORT_START", &["metabase", "port_start"], EnvVarType::U16),
    spec("METASHIP_METABASE_PORT_END", &["metabase", "port_end"], EnvVarType::U16),
    spec("METASHIP_METABASE_ADMIN_EMAIL", &["metabase", "admin_email"], EnvVarType::String),
    spec(
        "METASHIP_METABASE_ADMIN_PASSWORD",
        &["metabase", "admin_password"],
        EnvVarType::String,
    ),
    spec(
        "METASHIP_METABASE_ENTERPRISE_TOKEN",
        &["metabase", "enterprise_token"],
        EnvVarType::String,
    ),
    spec(
        "METASHIP_METABASE_API_KEY_GROUP_ID",
        &["metabase", "api_key_group_id"],
        EnvVarType::U64,
    ),
    // [cloudbeaver]
    spec("METASHIP_CLOUDBEAVER_IMAGE", &["cloudbeaver", "image"], EnvVarType::String),
    spec("METASHIP_CLOUDBEAVER_PORT", &["cloudbeaver", "port"], EnvVarType::U16),
    // [readiness]
    spec(
        "METASHIP_READINESS_INTERVAL_MS",
        &["readiness", "interval_ms"],
        EnvVarType::U64,
    ),
    spec(
        "METASHIP_READINESS_MAX_INTERVAL_MS",
        &["readiness", "max_interval_ms"],
        EnvVarType::U64,
    ),
    spec(
        "METASHIP_READINESS_TIMEOUT_SECS",
        &["readiness", "timeout_secs"],
        EnvVarType::U64,
    ),
    // [tags]
    spec("METASHIP_TAGS_SOURCE", &["tags", "source"], EnvVarType::String),
    spec("METASHIP_TAGS_PAGES", &["tags", "pages"], EnvVarType::U32),
    spec("METASHIP_TAGS_CACHE_TTL_HOURS", &["tags", "cache_ttl_hours"], EnvVarType::U64),
    spec("METASHIP_TAGS_PERSIST_CACHE", &["tags", "persist_cache"], EnvVarType::Bool),
];

/// Names of every environment variable the loader reads.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|entry| entry.env_var).collect()
}

/// Load configuration from the process environment and discovered files.
///
/// # Errors
///
/// Returns `ConfigError` when a file cannot be read or parsed, a typed
/// environment variable does not parse, layers fail to merge, or the merged
/// values fail [`AppConfig::validate`].
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    load_config_with_env(cli, &mockable::DefaultEnv::new())
}

/// Load configuration reading environment variables through `env`.
///
/// # Errors
///
/// As [`load_config`].
pub fn load_config_with_env<E: mockable::Env>(cli: &Cli, env: &E) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(path) = config_file_path(cli, env)? {
        composer.push_file(read_config_file(&path)?, Some(path));
    }

    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;
    Ok(config)
}

/// The file layer's path: `--config` when given, otherwise discovery.
///
/// An explicit `--config` that does not exist is an error; a discovered
/// candidate that does not exist is skipped.
fn config_file_path<E: mockable::Env>(cli: &Cli, env: &E) -> Result<Option<Utf8PathBuf>> {
    if let Some(explicit) = cli.config.as_ref() {
        if !explicit.exists() {
            return Err(ConfigError::FileNotFound {
                path: explicit.clone(),
            }
            .into());
        }
        return Ok(Some(explicit.clone()));
    }

    if let Some(from_env) = env
        .string("METASHIP_CONFIG_PATH")
        .filter(|value| !value.is_empty())
        .map(Utf8PathBuf::from)
    {
        return Ok(from_env.exists().then_some(from_env));
    }

    let discovery = ConfigDiscovery::builder("metaship")
        .config_file_name("config.toml")
        .dotfile_name(".metaship.toml")
        .build();
    Ok(discovery
        .candidates()
        .into_iter()
        .filter(|candidate| candidate.exists())
        .find_map(|candidate| Utf8PathBuf::try_from(candidate).ok()))
}

/// Read and parse a TOML file through `cap_std`.
fn read_config_file(path: &Utf8Path) -> Result<Value> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;
    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    toml::from_str::<Value>(&content).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        }
        .into()
    })
}

/// Collect `METASHIP_*` variables into a JSON tree, failing on typed values
/// that do not parse.
fn collect_env_vars<E: mockable::Env>(env: &E) -> Result<Value> {
    let mut root = Map::new();

    for entry in ENV_VAR_SPECS {
        let Some(raw_value) = env.string(entry.env_var) else {
            continue;
        };
        let json_value = parse_env_value(entry, &raw_value)?;
        insert_at_path(&mut root, entry.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn parse_env_value(entry: &EnvVarSpec, raw_value: &str) -> Result<Value> {
    let invalid = |expected: &str| ConfigError::InvalidValue {
        field: entry.env_var.to_owned(),
        reason: format!("expected {expected}, got '{raw_value}'"),
    };

    let value = match entry.var_type {
        EnvVarType::String => Value::String(raw_value.to_owned()),
        EnvVarType::Bool => raw_value
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| invalid("bool (true/false)"))?,
        EnvVarType::U16 => raw_value
            .parse::<u16>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| invalid("port number (0-65535)"))?,
        EnvVarType::U32 => raw_value
            .parse::<u32>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| invalid("unsigned integer"))?,
        EnvVarType::U64 => raw_value
            .parse::<u64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| invalid("unsigned integer"))?,
    };
    Ok(value)
}

/// Insert `value` at a nested path, creating intermediate objects.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(socket) = cli.engine_socket.as_ref() {
        overrides.insert(String::from("engine_socket"), Value::String(socket.clone()));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn nested_paths_create_intermediate_objects() {
        let mut root = Map::new();
        insert_at_path(&mut root, &["tags", "pages"], Value::from(3));
        insert_at_path(&mut root, &["tags", "persist_cache"], Value::Bool(false));

        assert_eq!(
            Value::Object(root),
            serde_json::json!({ "tags": { "pages": 3, "persist_cache": false } })
        );
    }

    #[rstest]
    fn every_variable_uses_the_metaship_prefix() {
        assert!(env_var_names().iter().all(|name| name.starts_with("METASHIP_")));
    }

    #[rstest]
    #[case("METASHIP_DATABASE_PORT_START", "70000")]
    #[case("METASHIP_TAGS_PERSIST_CACHE", "maybe")]
    #[case("METASHIP_TAGS_PAGES", "-1")]
    fn typed_values_fail_fast(#[case] name: &str, #[case] raw: &str) {
        let entry = ENV_VAR_SPECS
            .iter()
            .find(|candidate| candidate.env_var == name)
            .expect("variable should be in the table");

        let error = parse_env_value(entry, raw).expect_err("value should be rejected");

        assert!(error.to_string().contains(name), "unexpected error: {error}");
    }
}
