use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

/// Consecutive model-service failures that open the circuit.
pub const ML_FAILURE_THRESHOLD: u32 = 3;

/// Circuit breaker guarding the model inference endpoint.
pub type MlCircuitBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates the circuit breaker wrapped around model inference calls.
///
/// # Configuration
///
/// - **Failure threshold**: 3 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 5s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, requests reach the model service.
/// - **OPEN**: Calls are rejected immediately and scoring falls back to rules.
/// - **HALF_OPEN**: A trial call checks whether the service recovered.
///
/// The concrete type is returned so callers can use both the blocking
/// `failsafe::CircuitBreaker` and the async `failsafe::futures::CircuitBreaker`
/// interfaces. Clones share state.
pub fn create_ml_circuit_breaker() -> MlCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(5),  // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy =
        failure_policy::consecutive_failures(ML_FAILURE_THRESHOLD, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
