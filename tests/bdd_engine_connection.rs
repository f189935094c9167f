//! Behavioural tests for container engine endpoint resolution.
//!
//! These tests validate how the proxy picks the engine endpoint from
//! configuration and the environment using rstest-bdd.

mod bdd_engine_connection_helpers;

pub use bdd_engine_connection_helpers::{EngineConnectionState, engine_connection_state};
use rstest_bdd_macros::scenario;

// Scenario bindings - each binds a feature scenario to its step implementations

#[scenario(
    path = "tests/features/engine_connection.feature",
    name = "Config socket takes precedence over the environment"
)]
fn config_socket_takes_precedence(engine_connection_state: EngineConnectionState) {
    let _ = engine_connection_state;
}

#[scenario(
    path = "tests/features/engine_connection.feature",
    name = "Fallback to CONTAINER_HOST when no socket is configured"
)]
fn fallback_to_container_host(engine_connection_state: EngineConnectionState) {
    let _ = engine_connection_state;
}

#[scenario(
    path = "tests/features/engine_connection.feature",
    name = "CONTAINER_HOST takes priority over PODMAN_HOST"
)]
fn container_host_priority_over_podman_host(engine_connection_state: EngineConnectionState) {
    let _ = engine_connection_state;
}

#[scenario(
    path = "tests/features/engine_connection.feature",
    name = "Empty environment variable is skipped"
)]
fn empty_env_var_is_skipped(engine_connection_state: EngineConnectionState) {
    let _ = engine_connection_state;
}

#[scenario(
    path = "tests/features/engine_connection.feature",
    name = "DOCKER_HOST is not consulted"
)]
fn docker_host_is_not_consulted(engine_connection_state: EngineConnectionState) {
    let _ = engine_connection_state;
}

#[scenario(
    path = "tests/features/engine_connection.feature",
    name = "Resolved endpoint with an unsupported scheme is rejected"
)]
fn unsupported_scheme_is_rejected(engine_connection_state: EngineConnectionState) {
    let _ = engine_connection_state;
}
