//! Behavioural test helpers for container engine endpoint resolution.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bindmount_proxy::engine::{EngineConnector, SocketResolver};
use bindmount_proxy::error::{BindMountProxyError, UpstreamError};
use mockable::MockEnv;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, then, when};

/// Step result type for BDD tests, using a static string for errors.
type StepResult<T> = Result<T, &'static str>;

/// Thread-safe environment variable storage for BDD tests.
type EnvVars = Arc<Mutex<HashMap<String, String>>>;

/// State shared across engine connection test scenarios.
#[derive(Default, ScenarioState)]
pub struct EngineConnectionState {
    /// The environment variables to mock.
    env_vars: Slot<EnvVars>,
    /// The configured socket (CLI, config file, `BINDMOUNT_PROXY_ENGINE_SOCKET`).
    config_socket: Slot<Option<String>>,
    /// The resolved socket endpoint.
    resolved_socket: Slot<String>,
    /// Whether building a connector failed with `InvalidEndpoint`.
    invalid_endpoint: Slot<bool>,
}

/// Fixture providing a fresh engine connection state.
#[fixture]
pub fn engine_connection_state() -> EngineConnectionState {
    let state = EngineConnectionState::default();
    state.env_vars.set(Arc::new(Mutex::new(HashMap::new())));
    state
}

fn set_env_var(state: &EngineConnectionState, key: &str, value: &str) -> StepResult<()> {
    let env_vars = state.env_vars.get().ok_or("env_vars should be initialised")?;
    let mut vars = env_vars.lock().map_err(|_| "mutex poisoned")?;
    vars.insert(String::from(key), String::from(value));
    Ok(())
}

/// Creates a `MockEnv` from a snapshot of the scenario's variables.
///
/// All "Given" steps complete before the "When" step takes the snapshot.
fn create_mock_env(state: &EngineConnectionState) -> StepResult<MockEnv> {
    let env_vars = state.env_vars.get().ok_or("env_vars should be initialised")?;
    let vars = env_vars.lock().map_err(|_| "mutex poisoned")?.clone();

    let mut mock = MockEnv::new();
    mock.expect_string()
        .returning(move |key| vars.get(key).cloned());
    Ok(mock)
}

// Given step definitions

#[given("no engine socket is configured")]
fn no_engine_socket_configured(engine_connection_state: &EngineConnectionState) {
    engine_connection_state.config_socket.set(None);
}

#[given("engine socket is configured as {socket}")]
fn engine_socket_configured_as(engine_connection_state: &EngineConnectionState, socket: String) {
    engine_connection_state.config_socket.set(Some(socket));
}

#[given("CONTAINER_HOST is set to {value}")]
fn container_host_is_set_to(
    engine_connection_state: &EngineConnectionState,
    value: String,
) -> StepResult<()> {
    set_env_var(engine_connection_state, "CONTAINER_HOST", &value)
}

#[given("CONTAINER_HOST is empty")]
fn container_host_is_empty(engine_connection_state: &EngineConnectionState) -> StepResult<()> {
    set_env_var(engine_connection_state, "CONTAINER_HOST", "")
}

#[given("PODMAN_HOST is set to {value}")]
fn podman_host_is_set_to(
    engine_connection_state: &EngineConnectionState,
    value: String,
) -> StepResult<()> {
    set_env_var(engine_connection_state, "PODMAN_HOST", &value)
}

#[given("DOCKER_HOST is set to {value}")]
fn docker_host_is_set_to(
    engine_connection_state: &EngineConnectionState,
    value: String,
) -> StepResult<()> {
    set_env_var(engine_connection_state, "DOCKER_HOST", &value)
}

// When step definitions

#[when("the socket is resolved")]
fn the_socket_is_resolved(engine_connection_state: &EngineConnectionState) -> StepResult<()> {
    let env = create_mock_env(engine_connection_state)?;
    let resolver = SocketResolver::new(&env);
    let config_socket = engine_connection_state.config_socket.get().flatten();
    let socket = EngineConnector::resolve_socket(config_socket.as_deref(), &resolver);
    engine_connection_state.resolved_socket.set(socket);
    Ok(())
}

#[when("the connector is built")]
fn the_connector_is_built(engine_connection_state: &EngineConnectionState) -> StepResult<()> {
    let env = create_mock_env(engine_connection_state)?;
    let resolver = SocketResolver::new(&env);
    let config_socket = engine_connection_state.config_socket.get().flatten();
    let result = EngineConnector::from_config(config_socket.as_deref(), &resolver, 30);
    engine_connection_state.invalid_endpoint.set(matches!(
        result,
        Err(BindMountProxyError::Upstream(UpstreamError::InvalidEndpoint { .. }))
    ));
    Ok(())
}

// Then step definitions

#[then("the resolved socket is {expected}")]
fn the_resolved_socket_is(
    engine_connection_state: &EngineConnectionState,
    expected: String,
) -> StepResult<()> {
    let resolved = engine_connection_state
        .resolved_socket
        .get()
        .ok_or("resolved socket should be set")?;
    assert_eq!(
        resolved, expected,
        "Expected resolved socket to be '{expected}', but got '{resolved}'"
    );
    Ok(())
}

#[then("the socket resolves to the platform default")]
fn the_socket_resolves_to_platform_default(
    engine_connection_state: &EngineConnectionState,
) -> StepResult<()> {
    let resolved = engine_connection_state
        .resolved_socket
        .get()
        .ok_or("resolved socket should be set")?;
    assert_eq!(resolved, SocketResolver::<MockEnv>::default_socket());
    Ok(())
}

#[then("building the connector fails with an invalid endpoint")]
fn building_fails_with_invalid_endpoint(
    engine_connection_state: &EngineConnectionState,
) -> StepResult<()> {
    let invalid = engine_connection_state
        .invalid_endpoint
        .get()
        .ok_or("connector should have been built")?;
    assert!(invalid, "expected an InvalidEndpoint error");
    Ok(())
}
