//! Request bodies for Metabase's setup and database endpoints.

use serde_json::{Map, Value, json};

use crate::config::{DatabaseConfig, MetabaseConfig};
use crate::engine::ContainerName;

/// The connection settings shape Metabase expects for an engine family.
///
/// Chosen from the database container's logical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PayloadShape {
    Postgres,
    ClickHouse,
    /// `MySQL` and `MariaDB`; `MySQL` also trusts the server certificate.
    MySqlLike { trust_server_certificate: bool },
}

impl PayloadShape {
    pub(super) fn for_logical_name(name: &str) -> Self {
        if name.contains("postgres") {
            Self::Postgres
        } else if name.contains("clickhouse") {
            Self::ClickHouse
        } else {
            Self::MySqlLike {
                trust_server_certificate: name.contains("mysql"),
            }
        }
    }

    pub(super) const fn engine(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::ClickHouse => "clickhouse",
            Self::MySqlLike { .. } => "mysql",
        }
    }

    fn extend_details(self, details: &mut Map<String, Value>) {
        match self {
            Self::Postgres => {
                details.insert(String::from("schema-filters-type"), json!("all"));
            }
            Self::ClickHouse => {
                details.insert(String::from("scan-all-databases"), json!(false));
                details.insert(String::from("destination-database"), json!(false));
            }
            Self::MySqlLike {
                trust_server_certificate,
            } => {
                details.insert(String::from("role"), Value::Null);
                details.insert(String::from("destination-database"), json!(false));
                if trust_server_certificate {
                    details.insert(
                        String::from("additional-options"),
                        json!("trustServerCertificate=True"),
                    );
                }
            }
        }
    }
}

/// Name a database is registered under: `<engine>-<port>`.
pub(super) fn data_source_name(database: &ContainerName) -> String {
    format!("{}-{}", database.name(), database.port())
}

/// Body for `POST /api/database`.
pub(super) fn data_source(database: &ContainerName, credentials: &DatabaseConfig) -> Value {
    let shape = PayloadShape::for_logical_name(database.name());

    let mut details = Map::new();
    details.insert(String::from("host"), json!(credentials.host_alias));
    details.insert(String::from("port"), json!(database.port()));
    details.insert(String::from("dbname"), json!(credentials.name));
    details.insert(String::from("user"), json!(credentials.user));
    details.insert(String::from("password"), json!(credentials.password));
    details.insert(String::from("ssl"), json!(false));
    details.insert(String::from("tunnel-enabled"), json!(false));
    details.insert(String::from("advanced-options"), json!(false));
    shape.extend_details(&mut details);

    json!({
        "is_on_demand": false,
        "is_full_sync": true,
        "is_sample": false,
        "cache_ttl": null,
        "refingerprint": false,
        "auto_run_queries": true,
        "schedules": {},
        "name": data_source_name(database),
        "engine": shape.engine(),
        "details": details,
    })
}

/// Body for `POST /api/setup`.
pub(super) fn setup(token: &str, site_name: &str, admin: &MetabaseConfig) -> Value {
    json!({
        "token": token,
        "user": {
            "first_name": admin.admin_first_name,
            "last_name": admin.admin_last_name,
            "email": admin.admin_email,
            "site_name": site_name,
            "password": admin.admin_password,
            "password_confirm": admin.admin_password,
        },
        "prefs": {
            "site_name": site_name,
            "site_locale": admin.site_locale,
        },
    })
}
