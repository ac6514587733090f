//! # State Machine Driver
//!
//! Shared normalize → dispatch → persist loop for every reconciled resource.
//!
//! 1. An empty or unknown `state` is set to the initial state and persisted;
//!    the pass ends there and the work starts on the next pass.
//! 2. Terminal states do nothing.
//! 3. Otherwise the resource's own dispatch runs for the current state and the
//!    resulting status is persisted.
//!
//! Errors go through [`handle_error`]: fatal errors set the failure state,
//! persist it and are returned; requeue signals keep the state, record a
//! `Pending` condition, persist and return [`Outcome::Pending`].

use super::error::ReconcilerError;
use super::status::{set_condition, READY_CONDITION};
use crate::crd::{ResourceState, StatefulResource};
use crate::store::Session;
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Result of one successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The state changed and was persisted
    Transitioned,
    /// The state is unchanged; waiting on something outside this resource
    Unchanged,
    /// A dependency is not ready; retry later
    Pending,
}

/// A resource kind's transition logic
#[async_trait]
pub trait StateMachine: Send + Sync {
    type Resource: StatefulResource
        + Resource<DynamicType = ()>
        + Serialize
        + DeserializeOwned
        + Clone
        + fmt::Debug
        + Send
        + Sync;

    /// Do the work of `state`, updating the resource's status in place
    async fn dispatch(
        &self,
        session: &Session<'_>,
        resource: &mut Self::Resource,
        state: <Self::Resource as StatefulResource>::State,
    ) -> Result<(), ReconcilerError>;

    /// Write the resource's status back to the store
    async fn persist_status(
        &self,
        session: &Session<'_>,
        resource: &Self::Resource,
    ) -> Result<(), ReconcilerError> {
        session.update_status_typed(resource).await?;
        Ok(())
    }
}

fn record_ready<R: StatefulResource>(resource: &mut R, state: R::State) {
    let (_, conditions) = resource.status_fields();
    let message = if state.is_ready() {
        String::new()
    } else {
        format!("resource is {state}")
    };
    set_condition(
        conditions,
        READY_CONDITION,
        state.is_ready(),
        state.as_str(),
        message,
    );
}

/// Run one pass of `machine` over `resource`
pub async fn drive<M: StateMachine>(
    machine: &M,
    session: &Session<'_>,
    resource: &mut M::Resource,
) -> Result<Outcome, ReconcilerError> {
    let Some(state) = resource.observed_state() else {
        if let Some(raw) = resource.raw_state().filter(|s| !s.is_empty()) {
            warn!("Unknown state {:?} on {}, resetting", raw, resource.name_any());
        }
        let initial = <<M::Resource as StatefulResource>::State as ResourceState>::INITIAL;
        resource.set_state(initial);
        record_ready(resource, initial);
        machine.persist_status(session, resource).await?;
        info!("🔄 {} initialized to {}", resource.name_any(), initial);
        return Ok(Outcome::Transitioned);
    };

    if state.is_terminal() {
        debug!("{} is {}, nothing to do", resource.name_any(), state);
        return Ok(Outcome::Unchanged);
    }

    match machine.dispatch(session, resource, state).await {
        Ok(()) => {
            let after = resource.observed_state().unwrap_or(state);
            record_ready(resource, after);
            machine.persist_status(session, resource).await?;
            if after == state {
                Ok(Outcome::Unchanged)
            } else {
                info!("✅ {} transitioned {} -> {}", resource.name_any(), state, after);
                Ok(Outcome::Transitioned)
            }
        }
        Err(err) => handle_error(machine, session, resource, err).await,
    }
}

/// Classify a dispatch error and persist its effect on the status
///
/// Cancellation is returned untouched; the store would refuse the write anyway.
pub async fn handle_error<M: StateMachine>(
    machine: &M,
    session: &Session<'_>,
    resource: &mut M::Resource,
    err: ReconcilerError,
) -> Result<Outcome, ReconcilerError> {
    if matches!(err, ReconcilerError::Cancelled) {
        return Err(err);
    }

    if err.is_requeue() {
        debug!("{} not ready: {}", resource.name_any(), err);
        let (_, conditions) = resource.status_fields();
        set_condition(conditions, READY_CONDITION, false, err.reason(), err.to_string());
        machine.persist_status(session, resource).await?;
        return Ok(Outcome::Pending);
    }

    let failure = <<M::Resource as StatefulResource>::State as ResourceState>::FAILURE;
    error!("❌ {} failed: {}", resource.name_any(), err);
    resource.set_state(failure);
    let (_, conditions) = resource.status_fields();
    set_condition(conditions, READY_CONDITION, false, err.reason(), err.to_string());

    if let Err(persist_err) = machine.persist_status(session, resource).await {
        error!(
            "Failed to persist {} state for {}: {} (original error: {})",
            failure,
            resource.name_any(),
            persist_err,
            err
        );
        return Err(persist_err);
    }
    Err(err)
}
