use logscope_observer::{ObserverRequest, PriorityTransport};
use logscope_tree::{NodeId, ScopeError, ScopeEvent, ScopeTree, ScopesModel};
use logscope_types::{DiscoveryEvent, InstanceId, PriorityMask, PriorityUpdate};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::FilterError;
use crate::rules::{build_live_update, priority_record};

/// Scope model of connected producers, pushing priority changes live
pub struct LiveScopeController<T> {
    model: ScopesModel,
    transport: T,
}

impl<T: PriorityTransport> LiveScopeController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            model: ScopesModel::new(),
            transport,
        }
    }

    pub fn model(&self) -> &ScopesModel {
        &self.model
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Subscribe to model change notifications
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ScopeEvent> {
        self.model.subscribe()
    }

    // ========================================================================
    // Discovery Feed
    // ========================================================================

    /// Apply one discovery event to the model.
    ///
    /// Newly connected instances are asked for their scope list.
    pub fn handle_event(&mut self, event: DiscoveryEvent) -> Result<(), FilterError> {
        match event {
            DiscoveryEvent::InstancesConnected { instances } => {
                let mut fresh: Vec<InstanceId> = Vec::new();
                for info in &instances {
                    let id = info.instance_id;
                    if self.model.position(id).is_none() && !fresh.contains(&id) {
                        fresh.push(id);
                    }
                }
                self.model.add_instances(&instances);

                // Keep asking the remaining instances after a failed delivery
                let mut first_error = None;
                for target in fresh {
                    let request = ObserverRequest::RequestScopes { target };
                    if let Err(e) = self.deliver(target, request) {
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }

            DiscoveryEvent::InstancesDisconnected { instances } => {
                self.model.remove_instances(&instances);
                Ok(())
            }

            DiscoveryEvent::ServiceDisconnected => {
                self.model.clear();
                Ok(())
            }

            DiscoveryEvent::ScopesRegistered { instance_id, scopes } => {
                let report = self.model.register_scopes(instance_id, &scopes)?;
                debug!(
                    instance = instance_id,
                    created = report.created,
                    rejected = report.rejected.len(),
                    "scopes registered"
                );
                Ok(())
            }

            DiscoveryEvent::ScopesUpdated { instance_id, scopes } => {
                self.model.update_scopes(instance_id, &scopes)?;
                Ok(())
            }
        }
    }

    // ========================================================================
    // User Requests
    // ========================================================================

    /// Replace the masks of a subtree and push the node's new mask.
    ///
    /// Returns `false` without sending when the node already has `mask`.
    pub fn set_log_priority(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        mask: PriorityMask,
    ) -> Result<bool, FilterError> {
        let mask = mask.normalized();
        let current = self
            .model
            .tree(instance_id)
            .and_then(|t| t.get(node))
            .map(|n| n.priority());
        if current == Some(mask) {
            return Ok(false);
        }

        self.model.set_priority(instance_id, node, mask)?;

        let update = self.update_for(instance_id, |tree| {
            PriorityUpdate::new(instance_id, vec![priority_record(tree, node, mask)])
        })?;
        self.deliver(instance_id, ObserverRequest::PriorityUpdate(update))?;
        Ok(true)
    }

    /// Enable severities for a subtree and push the resulting configuration
    pub fn add_log_priority(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        bits: PriorityMask,
    ) -> Result<bool, FilterError> {
        if !self.model.add_priority(instance_id, node, bits)? {
            return Ok(false);
        }
        self.push_subtree(instance_id, node)?;
        Ok(true)
    }

    /// Disable severities for a subtree and push the resulting configuration
    pub fn remove_log_priority(
        &mut self,
        instance_id: InstanceId,
        node: NodeId,
        bits: PriorityMask,
    ) -> Result<bool, FilterError> {
        if !self.model.remove_priority(instance_id, node, bits)? {
            return Ok(false);
        }
        self.push_subtree(instance_id, node)?;
        Ok(true)
    }

    /// Ask one producer, or all of them, to persist their scope priorities
    pub fn save_configuration(&self, target: Option<InstanceId>) -> Result<(), FilterError> {
        if let Some(instance_id) = target {
            if self.model.position(instance_id).is_none() {
                return Err(ScopeError::UnknownInstance(instance_id).into());
            }
        }

        self.transport
            .send(ObserverRequest::SaveConfig { target })
            .map_err(|source| FilterError::DeliveryFailed { target, source })
    }

    fn push_subtree(&self, instance_id: InstanceId, node: NodeId) -> Result<(), FilterError> {
        let update = self.update_for(instance_id, |tree| build_live_update(tree, node))?;
        self.deliver(instance_id, ObserverRequest::PriorityUpdate(update))
    }

    fn update_for<F>(
        &self,
        instance_id: InstanceId,
        build: F,
    ) -> Result<PriorityUpdate, FilterError>
    where
        F: FnOnce(&ScopeTree) -> PriorityUpdate,
    {
        let tree = self
            .model
            .tree(instance_id)
            .ok_or(ScopeError::UnknownInstance(instance_id))?;
        Ok(build(tree))
    }

    fn deliver(&self, target: InstanceId, request: ObserverRequest) -> Result<(), FilterError> {
        self.transport.send(request).map_err(|source| {
            warn!(instance = target, "delivery failed: {}", source);
            FilterError::DeliveryFailed {
                target: Some(target),
                source,
            }
        })
    }
}
