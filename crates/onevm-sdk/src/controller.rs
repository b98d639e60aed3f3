// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! InstanceController: create/read/update/delete of virtual machines.

use onevm_protocol::{OneClient, RpcClient, RpcValue, TransportError};
use tracing::{debug, info, instrument};

use crate::attributes::{self, AttributeMap, ParseError};
use crate::config::SdkConfig;
use crate::convergence::{self, PollOutcome, WaitLabels, WaitPolicy};
use crate::error::{Result, SdkError};
use crate::permissions::Permissions;
use crate::reconcile;
use crate::types::{
    InstanceInfo, InstanceSpec, InstanceUpdate, ReadOptions, VM_ELEMENT_NAME, VmStatus,
};

/// Error code OpenNebula reports for an object that does not exist.
pub const NO_EXISTS_CODE: i64 = 0x0400;

/// Update type of `one.vm.update` that merges into the user template.
const UPDATE_MERGE: i32 = 1;

/// Lifecycle operations on OpenNebula virtual machines.
///
/// The controller owns its RPC collaborator and issues calls strictly one at a
/// time. Waits block the calling thread according to the configured
/// [`WaitPolicy`].
pub struct InstanceController<C> {
    client: C,
    wait: WaitPolicy,
}

impl InstanceController<OneClient> {
    /// Create a controller talking XML-RPC as described by `config`.
    pub fn from_config(config: SdkConfig) -> Self {
        Self::new(OneClient::new(config.rpc), config.wait)
    }

    /// Create a controller from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(SdkConfig::from_env()?))
    }
}

impl<C: RpcClient> InstanceController<C> {
    /// Create a controller over an existing collaborator.
    pub fn new(client: C, wait: WaitPolicy) -> Self {
        Self { client, wait }
    }

    /// Get the RPC collaborator.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Get the wait policy used by create and delete.
    pub fn wait_policy(&self) -> &WaitPolicy {
        &self.wait
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch `one.vm.info` for `id` and flatten the subtree below `root`.
    #[instrument(skip(self), fields(instance_id = id))]
    pub fn load_attributes(&self, id: i64, root: &str) -> Result<AttributeMap> {
        let document = self
            .client
            .call("one.vm.info", &[RpcValue::from(id)])
            .map_err(|e| not_found_or(id, e))?;

        attributes::flatten(document.as_bytes(), root).map_err(|e| match e {
            ParseError::RootElementNotFound(_) => SdkError::InstanceNotFound(id.to_string()),
            other => SdkError::Attributes(other),
        })
    }

    /// Fetch and flatten the info document of instance `id`.
    pub fn load_info(&self, id: i64) -> Result<AttributeMap> {
        self.load_attributes(id, VM_ELEMENT_NAME)
    }

    /// Read the typed view of instance `id`.
    #[instrument(skip(self, options), fields(instance_id = id))]
    pub fn read(&self, id: i64, options: &ReadOptions) -> Result<InstanceInfo> {
        let attributes = self.load_info(id)?;
        let info = InstanceInfo::from_attributes(&attributes, options)?;
        debug!(state = ?info.state, lcm_state = info.lcm_state, "Read instance");
        Ok(info)
    }

    /// Check whether instance `id` exists and has not been terminated.
    #[instrument(skip(self), fields(instance_id = id))]
    pub fn exists(&self, id: i64) -> Result<bool> {
        match self.load_info(id) {
            Ok(attributes) => Ok(!VmStatus::from_attributes(&attributes)?.is_done()),
            Err(SdkError::InstanceNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Instantiate a template and wait until the new instance is usable.
    ///
    /// The instance is considered usable once it is running and, if requested,
    /// reports `spec.wait_for_attribute`. Permissions are applied last.
    #[instrument(skip(self, spec), fields(template_id = spec.template_id))]
    pub fn create(&self, spec: &InstanceSpec) -> Result<InstanceInfo> {
        let permissions: Permissions = spec.permissions.parse()?;
        let template = reconcile::serialize(Some(&spec.attributes));

        let response = self.client.call(
            "one.template.instantiate",
            &[
                RpcValue::from(spec.template_id),
                RpcValue::from(spec.name.as_str()),
                RpcValue::from(false),
                RpcValue::from(template),
                RpcValue::from(false),
            ],
        )?;
        let id = parse_id(&response)?;
        info!(instance_id = id, "Instantiated template");

        self.wait_for_running(id)?;

        if let Some(attribute) = spec.wait_for_attribute.as_deref()
            && !attribute.is_empty()
        {
            self.wait_for_attribute(id, attribute)?;
        }

        self.chmod(id, &permissions)?;

        self.read(id, &spec.read_options())
    }

    /// Apply permission and attribute changes to instance `id`.
    #[instrument(skip(self, update), fields(instance_id = id))]
    pub fn update(&self, id: i64, update: &InstanceUpdate) -> Result<()> {
        if update.is_empty() {
            info!("Nothing to update");
            return Ok(());
        }

        if let Some(permissions) = update.permissions.as_deref() {
            self.chmod(id, &permissions.parse()?)?;
        }

        if let Some(attributes) = update.attributes.as_ref()
            && !attributes.is_empty()
        {
            self.client.call(
                "one.vm.update",
                &[
                    RpcValue::from(id),
                    RpcValue::from(reconcile::serialize(Some(attributes))),
                    RpcValue::from(UPDATE_MERGE),
                ],
            )?;
            info!(count = attributes.len(), "Merged user attributes");
        }

        Ok(())
    }

    /// Change the permissions of instance `id`.
    #[instrument(skip(self, permissions), fields(instance_id = id, permissions = %permissions))]
    pub fn chmod(&self, id: i64, permissions: &Permissions) -> Result<()> {
        self.client.call("one.vm.chmod", &permissions.chmod_params(id))?;
        info!("Changed permissions");
        Ok(())
    }

    /// Terminate instance `id` and wait until it is done.
    #[instrument(skip(self), fields(instance_id = id))]
    pub fn delete(&self, id: i64) -> Result<()> {
        self.read(id, &ReadOptions::default())?;

        self.client.call(
            "one.vm.action",
            &[RpcValue::from("terminate-hard"), RpcValue::from(id)],
        )?;
        debug!("Terminate requested");

        self.wait_for_done(id)?;
        info!("Terminated instance");
        Ok(())
    }

    // =========================================================================
    // Waits
    // =========================================================================

    /// Block until instance `id` is running.
    ///
    /// Fails with [`SdkError::UnexpectedState`] if the instance is terminated
    /// instead.
    #[instrument(skip(self), fields(instance_id = id))]
    pub fn wait_for_running(&self, id: i64) -> Result<VmStatus> {
        let status = convergence::wait_for(
            || self.probe_running(id),
            WaitLabels::new("booting", "running"),
            &self.wait,
        )?;

        if status.is_done() {
            return Err(SdkError::UnexpectedState {
                id,
                expected: "running".to_string(),
                actual: status.to_string(),
            });
        }
        Ok(status)
    }

    /// Block until instance `id` reports `path`, returning its value.
    #[instrument(skip(self), fields(instance_id = id))]
    pub fn wait_for_attribute(&self, id: i64, path: &str) -> Result<String> {
        let value = convergence::wait_for(
            || self.probe_attribute(id, path),
            WaitLabels::new("missing", path),
            &self.wait,
        )?;
        Ok(value)
    }

    /// Block until instance `id` is terminated.
    ///
    /// An instance that disappears altogether counts as terminated.
    #[instrument(skip(self), fields(instance_id = id))]
    pub fn wait_for_done(&self, id: i64) -> Result<()> {
        convergence::wait_for(
            || self.probe_done(id),
            WaitLabels::new("terminating", "done"),
            &self.wait,
        )?;
        Ok(())
    }

    fn probe_running(&self, id: i64) -> PollOutcome<VmStatus, SdkError> {
        match self.probe_status(id) {
            Ok(status) if status.is_running() || status.is_done() => PollOutcome::Reached(status),
            Ok(status) => PollOutcome::Pending(status.to_string()),
            Err(e) => PollOutcome::Error(e),
        }
    }

    fn probe_attribute(&self, id: i64, path: &str) -> PollOutcome<String, SdkError> {
        match self.load_info(id) {
            Ok(attributes) => match attributes.get(path) {
                Some(value) => PollOutcome::Reached(value.clone()),
                None => PollOutcome::Pending(format!("{} not reported", path)),
            },
            Err(e) => PollOutcome::Error(e),
        }
    }

    fn probe_done(&self, id: i64) -> PollOutcome<(), SdkError> {
        match self.probe_status(id) {
            Ok(status) if status.is_done() => PollOutcome::Reached(()),
            Ok(status) => PollOutcome::Pending(status.to_string()),
            Err(SdkError::InstanceNotFound(_)) => PollOutcome::Reached(()),
            Err(e) => PollOutcome::Error(e),
        }
    }

    fn probe_status(&self, id: i64) -> Result<VmStatus> {
        let attributes = self.load_info(id)?;
        let status = VmStatus::from_attributes(&attributes)?;
        debug!(instance_id = id, %status, "Refreshed instance state");
        Ok(status)
    }
}

fn not_found_or(id: i64, err: TransportError) -> SdkError {
    match err {
        TransportError::Remote { code, .. } if code == NO_EXISTS_CODE => {
            SdkError::InstanceNotFound(id.to_string())
        }
        other => SdkError::Transport(other),
    }
}

fn parse_id(response: &str) -> Result<i64> {
    response.trim().parse().map_err(|e| {
        SdkError::UnexpectedResponse(format!("invalid instance id {:?}: {}", response, e))
    })
}
