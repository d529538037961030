//! Semantic error types for the metaship application.
//!
//! This module defines the error hierarchy for metaship, following the principle
//! of using semantic error enums (via `thiserror`) for conditions the caller
//! might inspect or retry, while reserving opaque errors (`eyre::Report`) for
//! the application boundary.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::bootstrap::BootstrapStage;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: Utf8PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error while merging layers.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while encoding or decoding container identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The identifier does not follow `<prefix>-<kind>-<name>-<port>`.
    #[error("malformed container identifier: '{identifier}'")]
    MalformedIdentifier {
        /// The identifier that failed to parse.
        identifier: String,
    },

    /// A segment handed to the encoder cannot be represented.
    #[error("invalid {segment} segment for container identifier: '{value}'")]
    InvalidSegment {
        /// Which segment was rejected.
        segment: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Errors that can occur during container operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The requested engine or tool is not one metaship knows how to launch.
    #[error("unsupported container kind: '{kind}'")]
    UnsupportedKind {
        /// The identifier that was requested.
        kind: String,
    },

    /// Every port in the requested range is already bound.
    #[error("no free TCP port between {start} and {end}")]
    NoFreePort {
        /// First port of the searched range.
        start: u16,
        /// Last port of the searched range.
        end: u16,
    },

    /// Failed to create a container.
    #[error("failed to create container '{name}': {message}")]
    CreateFailed {
        /// The name of the container being created.
        name: String,
        /// A description of the creation failure.
        message: String,
    },

    /// Failed to start a container.
    #[error("failed to start container '{container_id}': {message}")]
    StartFailed {
        /// The ID of the container that failed to start.
        container_id: String,
        /// A description of the start failure.
        message: String,
    },

    /// Failed to pull an image that was missing locally.
    #[error("failed to pull image '{image}': {message}")]
    ImagePullFailed {
        /// The image reference.
        image: String,
        /// A description of the pull failure.
        message: String,
    },

    /// Failed to remove a container.
    #[error("failed to remove container '{name}': {message}")]
    RemoveFailed {
        /// The name of the container.
        name: String,
        /// A description of the removal failure.
        message: String,
    },

    /// The named container is not among the running ones.
    #[error("container '{name}' is not running")]
    NotRunning {
        /// The container name.
        name: String,
    },

    /// The container exists but plays a different role.
    #[error("container '{name}' is not a {expected} container")]
    WrongKind {
        /// The container name.
        name: String,
        /// The role the command needs.
        expected: String,
    },

    /// Failed to list running containers.
    #[error("failed to list containers: {message}")]
    ListFailed {
        /// A description of the listing failure.
        message: String,
    },
}

/// Errors returned by readiness waits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    /// The target did not become ready before the deadline.
    #[error("'{target}' did not become ready within {elapsed:?} ({attempts} attempts)")]
    Timeout {
        /// The probed endpoint.
        target: String,
        /// Number of probe attempts issued.
        attempts: u32,
        /// Time spent waiting.
        elapsed: Duration,
    },

    /// The wait was cancelled before the target became ready.
    #[error("readiness wait for '{target}' was cancelled")]
    Cancelled {
        /// The probed endpoint.
        target: String,
    },
}

/// Errors raised by the tool setup clients.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The HTTP request could not be completed.
    #[error("request to {endpoint} failed: {message}")]
    Request {
        /// The endpoint being called.
        endpoint: String,
        /// A description of the transport failure.
        message: String,
    },

    /// The tool answered with a non-success status.
    #[error("{endpoint} answered {status}: {body}")]
    UnexpectedStatus {
        /// The endpoint being called.
        endpoint: String,
        /// The HTTP status code.
        status: u16,
        /// The response body, as returned by the tool.
        body: String,
    },

    /// The tool answered successfully but the body was not understood.
    #[error("unexpected response from {endpoint}: {message}")]
    UnexpectedResponse {
        /// The endpoint being called.
        endpoint: String,
        /// What was wrong with the response.
        message: String,
    },

    /// A data source with the derived name is already registered.
    #[error("data source '{name}' already exists")]
    DuplicateDataSource {
        /// The derived data source name.
        name: String,
    },

    /// The tool refused to register the data source.
    #[error("data source '{name}' was rejected: {body}")]
    RegistrationRejected {
        /// The derived data source name.
        name: String,
        /// The upstream error body.
        body: String,
    },

    /// A step of a bootstrap sequence failed.
    #[error("bootstrap halted after reaching stage {stage}: {source}")]
    Halted {
        /// The last stage that completed.
        stage: BootstrapStage,
        /// The failure of the following step.
        source: Box<BootstrapError>,
    },
}

/// Errors raised while listing release tags.
#[derive(Debug, Error)]
pub enum TagError {
    /// A page of tags could not be fetched.
    #[error("failed to fetch tags from {url}: {message}")]
    FetchFailed {
        /// The page URL.
        url: String,
        /// A description of the failure.
        message: String,
    },

    /// The persisted tag cache could not be read or written.
    #[error("tag cache at '{path}' is unusable: {message}")]
    CacheIo {
        /// The cache file path.
        path: Utf8PathBuf,
        /// A description of the failure.
        message: String,
    },
}

/// Top-level error type for the metaship application.
///
/// This enum aggregates all domain-specific errors into a single type. At the
/// application boundary (main.rs) these errors are converted to
/// `eyre::Report` for human-readable error reporting.
#[derive(Debug, Error)]
pub enum MetashipError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred while handling container identifiers.
    #[error(transparent)]
    Name(#[from] NameError),

    /// An error occurred during container operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// A readiness wait did not complete.
    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    /// A tool setup call failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    /// Release tags could not be listed.
    #[error(transparent)]
    Tag(#[from] TagError),
}

/// A specialised `Result` type for metaship operations.
pub type Result<T> = std::result::Result<T, MetashipError>;
