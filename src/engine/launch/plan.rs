//! Launch plans: everything needed to create one container.

use std::collections::HashMap;

use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{CreateContainerOptions, CreateContainerOptionsBuilder};

/// A fully resolved container launch.
///
/// A plan is pure data. [`LaunchPlan::command_line`] renders the equivalent
/// `docker run` invocation for dry runs, while [`LaunchPlan::create_body`]
/// and [`LaunchPlan::create_options`] build the engine request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Container name.
    pub name: String,
    /// Image reference, including tag.
    pub image: String,
    /// Port published on the host.
    pub host_port: u16,
    /// Port the service listens on inside the container.
    pub container_port: u16,
    /// Environment variables in insertion order.
    pub env: Vec<(String, String)>,
    /// Arguments appended after the image.
    pub cmd: Vec<String>,
    /// Extra `/etc/hosts` entries in `host:address` form.
    pub extra_hosts: Vec<String>,
}

impl LaunchPlan {
    /// Render the equivalent `docker run` command.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut parts = vec![
            String::from("docker run -d"),
            format!("-p {}:{}", self.host_port, self.container_port),
            format!("--name {}", self.name),
        ];
        parts.extend(self.extra_hosts.iter().map(|host| format!("--add-host {host}")));
        parts.extend(self.env.iter().map(|(key, value)| format!("-e {key}={value}")));
        parts.push(self.image.clone());
        parts.extend(self.cmd.iter().cloned());
        parts.join(" ")
    }

    /// Query parameters for the create call.
    #[must_use]
    pub fn create_options(&self) -> CreateContainerOptions {
        CreateContainerOptionsBuilder::new().name(&self.name).build()
    }

    /// Request body for the create call.
    #[must_use]
    pub fn create_body(&self) -> ContainerCreateBody {
        let binding = PortBinding {
            host_ip: Some(String::from("0.0.0.0")),
            host_port: Some(self.host_port.to_string()),
        };
        let port_bindings = HashMap::from([(
            format!("{}/tcp", self.container_port),
            Some(vec![binding]),
        )]);

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            extra_hosts: non_empty(self.extra_hosts.clone()),
            ..HostConfig::default()
        };

        let env = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        ContainerCreateBody {
            image: Some(self.image.clone()),
            env: non_empty(env),
            cmd: non_empty(self.cmd.clone()),
            host_config: Some(host_config),
            ..ContainerCreateBody::default()
        }
    }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}
