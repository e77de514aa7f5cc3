//! Managed-resource lifecycle orchestration.
//!
//! Drives the external counterpart of a managed resource through
//! Absent → Creating → Converging → Deleting → Deleted. One [`reconcile`]
//! call is one synchronous pass; the orchestrator holds no state between
//! passes and is safe to invoke concurrently for different resource keys.
//!
//! Failure discipline: sub-operation errors are collected, never dropped,
//! and status is persisted with the best-known state before any error is
//! returned. An optimistic-concurrency conflict retries the entire pass.
//!
//! [`reconcile`]: LifecycleOrchestrator::reconcile

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use virtop_core::conditions::{self, ConditionSeverity, SummaryOptions};
use virtop_core::{CoreError, ResourceKey, Result};
use virtop_provider::{
    AuxiliaryAttach, ConfigArgs, ManagedResource, PowerState, Provider, ResourceLifecycle,
    ResourcePhase,
};

use crate::diff;
use crate::queue::Reconciler;
use crate::store::ObjectStore;

/// Condition recording prerequisite resolution (class, metadata, policies).
pub const CONDITION_PREREQUISITES_READY: &str = "PrerequisitesReady";
/// Condition recording the external create.
pub const CONDITION_CREATED: &str = "ResourceCreated";
/// Condition recording auxiliary attachment convergence.
pub const CONDITION_ATTACHMENTS_READY: &str = "AttachmentsReady";

/// Priority order for summarizing the orchestrator's conditions.
const CONDITION_ORDER: &[&str] = &[
    CONDITION_PREREQUISITES_READY,
    CONDITION_CREATED,
    CONDITION_ATTACHMENTS_READY,
];

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Finalizer marker guarding record removal.
    pub finalizer: String,
    /// How many times a conflicted pass is retried in full.
    pub max_conflict_retries: u32,
    /// Requeue hint used while a powered-on resource has no address yet.
    pub address_requeue: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            finalizer: "virtop.io/lifecycle".to_string(),
            max_conflict_retries: 2,
            address_requeue: Duration::from_secs(10),
        }
    }
}

/// Sequences create/update/delete of a managed resource against the provider.
pub struct LifecycleOrchestrator<S, P> {
    store: Arc<S>,
    provider: Arc<P>,
    config: OrchestratorConfig,
}

impl<S, P> LifecycleOrchestrator<S, P>
where
    S: ObjectStore,
    P: ResourceLifecycle + AuxiliaryAttach,
{
    /// Create an orchestrator with default configuration.
    pub fn new(store: Arc<S>, provider: Arc<P>) -> Self {
        Self::with_config(store, provider, OrchestratorConfig::default())
    }

    /// Create an orchestrator with custom configuration.
    pub fn with_config(store: Arc<S>, provider: Arc<P>, config: OrchestratorConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Run one reconcile pass for a resource key.
    ///
    /// Returns an explicit requeue hint when a known-eventually-available
    /// observable (the network address) is not yet populated but the
    /// resource is otherwise healthy.
    #[instrument(skip(self, cancel), fields(resource = %key))]
    pub async fn reconcile(
        &self,
        cancel: &CancellationToken,
        key: &ResourceKey,
    ) -> Result<Option<Duration>> {
        let mut attempt = 0;
        loop {
            match self.reconcile_once(cancel, key).await {
                Err(err) if err.is_conflict() && attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    debug!(attempt, "Write conflict, retrying full reconcile pass");
                }
                other => return other,
            }
        }
    }

    async fn reconcile_once(
        &self,
        cancel: &CancellationToken,
        key: &ResourceKey,
    ) -> Result<Option<Duration>> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        // A known-unhealthy provider fails fast instead of burning a pass on
        // operations that cannot succeed.
        if !self.provider.is_healthy() {
            return Err(CoreError::provider_unavailable(format!(
                "provider {} is unhealthy",
                self.provider.display_name()
            )));
        }

        let resource = match self.store.get_resource(key).await {
            Ok(resource) => resource,
            Err(err) if err.is_not_found() => {
                debug!("Resource record gone, nothing to reconcile");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        if resource.is_deleting() {
            self.reconcile_delete(cancel, resource).await?;
            return Ok(None);
        }
        self.reconcile_normal(cancel, resource).await
    }

    /// Tear down the external counterpart and release the finalizer.
    ///
    /// The finalizer is removed only after the provider confirms absence,
    /// either by a successful delete or by reporting the counterpart gone.
    async fn reconcile_delete(
        &self,
        cancel: &CancellationToken,
        mut resource: ManagedResource,
    ) -> Result<()> {
        info!("Reconciling resource deletion");

        if !resource.has_finalizer(&self.config.finalizer) {
            debug!("No finalizer held, deletion already handled");
            return Ok(());
        }

        resource.status.phase = ResourcePhase::Deleting;
        match self.provider.delete_resource(cancel, &resource).await {
            Ok(()) => info!("Deleted external counterpart"),
            Err(err) if err.is_not_found() => {
                info!("External counterpart already absent");
            }
            Err(err) => {
                warn!(error = %err, "Failed to delete external counterpart");
                let mut errors = vec![CoreError::from(err)];
                if let Err(status_err) = self.store.update_resource_status(&resource).await {
                    errors.push(status_err);
                }
                return CoreError::aggregate(errors);
            }
        }

        resource.status.phase = ResourcePhase::Deleted;
        let mut stored = self.store.update_resource_status(&resource).await?;
        stored.remove_finalizer(&self.config.finalizer);
        self.store.update_resource(&stored).await?;
        info!("Released finalizer");
        Ok(())
    }

    /// Level-triggered convergence: create the external counterpart if it
    /// does not exist, then re-apply the idempotent update and reconcile
    /// auxiliary attachments.
    async fn reconcile_normal(
        &self,
        cancel: &CancellationToken,
        mut resource: ManagedResource,
    ) -> Result<Option<Duration>> {
        info!(phase = %resource.status.phase, "Reconciling resource");

        let args = match self.resolve_config(cancel, &resource).await {
            Ok(args) => {
                conditions::set(
                    &mut resource.status.conditions,
                    conditions::true_condition(CONDITION_PREREQUISITES_READY),
                );
                args
            }
            Err(err) => {
                // Unresolved prerequisites are retryable and leave the phase
                // untouched; terminal validation failures surface as Error.
                let severity = if err.is_retryable() {
                    ConditionSeverity::Warning
                } else {
                    ConditionSeverity::Error
                };
                conditions::set(
                    &mut resource.status.conditions,
                    conditions::false_condition(
                        CONDITION_PREREQUISITES_READY,
                        "PrerequisitesNotResolved",
                        severity,
                        err.to_string(),
                    ),
                );
                self.summarize(&mut resource);
                let mut errors = vec![err];
                if let Err(status_err) = self.store.update_resource_status(&resource).await {
                    errors.push(status_err);
                }
                CoreError::aggregate(errors)?;
                return Ok(None);
            }
        };

        // The finalizer must be held before the external counterpart can
        // come into (or be adopted into) existence.
        if !resource.has_finalizer(&self.config.finalizer) {
            resource.add_finalizer(&self.config.finalizer);
            let status = resource.status.clone();
            resource = self.store.update_resource(&resource).await?;
            resource.status = status;
        }

        let exists = self
            .provider
            .resource_exists(cancel, &resource)
            .await
            .map_err(CoreError::from)?;

        if !exists {
            resource.status.phase = ResourcePhase::Creating;

            if let Err(err) = self
                .provider
                .create_resource(cancel, &mut resource, &args)
                .await
            {
                warn!(error = %err, "Provider failed to create resource");
                conditions::set(
                    &mut resource.status.conditions,
                    conditions::false_condition(
                        CONDITION_CREATED,
                        "CreateFailed",
                        ConditionSeverity::Error,
                        err.to_string(),
                    ),
                );
                self.summarize(&mut resource);
                let mut errors = vec![CoreError::from(err)];
                if let Err(status_err) = self.store.update_resource_status(&resource).await {
                    errors.push(status_err);
                }
                CoreError::aggregate(errors)?;
                return Ok(None);
            }
            info!("Created external counterpart");
        }

        conditions::set(
            &mut resource.status.conditions,
            conditions::true_condition(CONDITION_CREATED),
        );
        resource.status.phase = ResourcePhase::Converging;

        let mut errors: Vec<CoreError> = Vec::new();

        if let Err(err) = self
            .provider
            .update_resource(cancel, &mut resource, &args)
            .await
        {
            warn!(error = %err, "Provider failed to update resource");
            errors.push(err.into());
        }

        let attachment_errors = self.reconcile_attachments(cancel, &mut resource).await;
        if attachment_errors.is_empty() {
            conditions::set(
                &mut resource.status.conditions,
                conditions::true_condition(CONDITION_ATTACHMENTS_READY),
            );
        } else {
            let detail = attachment_errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            conditions::set(
                &mut resource.status.conditions,
                conditions::false_condition(
                    CONDITION_ATTACHMENTS_READY,
                    "AttachmentFailed",
                    ConditionSeverity::Warning,
                    detail,
                ),
            );
        }
        errors.extend(attachment_errors);

        self.summarize(&mut resource);

        // Status carries the best-known state of everything that succeeded;
        // it is persisted before any error is returned. A write conflict
        // rides the aggregate into the pass-level retry.
        match self.store.update_resource_status(&resource).await {
            Ok(stored) => resource = stored,
            Err(err) => errors.push(err),
        }

        CoreError::aggregate(errors)?;
        Ok(self.requeue_delay(&resource))
    }

    /// Resolve everything an external create/update needs. Any miss is a
    /// retryable error; the caller leaves the resource phase unchanged.
    async fn resolve_config(
        &self,
        cancel: &CancellationToken,
        resource: &ManagedResource,
    ) -> Result<ConfigArgs> {
        let class = self.store.get_class(&resource.spec.class_name).await?;

        let metadata = match &resource.spec.metadata_config_name {
            Some(name) => {
                self.store
                    .get_metadata_config(&resource.key.namespace, name)
                    .await?
            }
            None => BTreeMap::new(),
        };

        let policy = match &resource.spec.policy_name {
            Some(name) => {
                let policy = self.store.get_policy(&resource.key.namespace, name).await?;
                let ready = self
                    .provider
                    .policy_ready(cancel, &policy)
                    .await
                    .map_err(CoreError::from)?;
                if !ready {
                    return Err(CoreError::provider_unavailable(format!(
                        "placement policy {name} not actualized yet"
                    )));
                }
                Some(policy)
            }
            None => None,
        };

        let storage_policy_id = match &resource.spec.storage_class {
            Some(storage_class) => Some(self.store.get_storage_policy_id(storage_class).await?),
            None => None,
        };

        Ok(ConfigArgs {
            class,
            metadata,
            policy,
            storage_policy_id,
        })
    }

    /// Converge auxiliary attachments and refresh their observed status.
    ///
    /// Every sub-operation error is collected; a failed attach never stops
    /// the detach batch or the status refresh, so status reflects whatever
    /// portions succeeded.
    async fn reconcile_attachments(
        &self,
        cancel: &CancellationToken,
        resource: &mut ManagedResource,
    ) -> Vec<CoreError> {
        let desired = resource.desired_attachments();
        let observed = resource.observed_attachments();
        let delta = diff::diff(&observed, &desired);

        let mut errors = Vec::new();

        // Re-apply changed intents alongside new ones; attach is idempotent.
        let mut to_attach = delta.added;
        to_attach.extend(delta.updated);
        if !to_attach.is_empty() {
            if let Err(err) = self
                .provider
                .attach_auxiliary(cancel, resource, &to_attach)
                .await
            {
                warn!(error = %err, "Failed to attach auxiliary resources");
                errors.push(err.into());
            }
        }

        if !delta.removed.is_empty() {
            if let Err(err) = self
                .provider
                .detach_auxiliary(cancel, resource, &delta.removed)
                .await
            {
                warn!(error = %err, "Failed to detach auxiliary resources");
                errors.push(err.into());
            }
        }

        if let Err(err) = self
            .provider
            .refresh_auxiliary_status(cancel, resource)
            .await
        {
            warn!(error = %err, "Failed to refresh attachment status");
            errors.push(err.into());
        }

        errors
    }

    fn summarize(&self, resource: &mut ManagedResource) {
        let opts = SummaryOptions {
            order: CONDITION_ORDER,
            ..Default::default()
        };
        if let Some(ready) = conditions::summary(&resource.status.conditions, &opts) {
            conditions::set(&mut resource.status.conditions, ready);
        }
    }

    /// Bounded retry hint for eventually-available observables, distinct
    /// from error-triggered retry and the scheduler's periodic resync.
    fn requeue_delay(&self, resource: &ManagedResource) -> Option<Duration> {
        if resource.status.address.is_none()
            && resource.status.power_state == Some(PowerState::PoweredOn)
        {
            return Some(self.config.address_requeue);
        }
        None
    }
}

#[async_trait]
impl<S, P> Reconciler for LifecycleOrchestrator<S, P>
where
    S: ObjectStore + 'static,
    P: ResourceLifecycle + AuxiliaryAttach + 'static,
{
    async fn reconcile(
        &self,
        cancel: &CancellationToken,
        key: &ResourceKey,
    ) -> Result<Option<Duration>> {
        LifecycleOrchestrator::reconcile(self, cancel, key).await
    }
}
