// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Discovery of the companion device by advertised capability.

use crate::models::{DeviceNode, DeviceType};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;

/// Platform capability registry.
#[async_trait]
pub trait CapabilityTransport: Send + Sync {
    /// Nodes currently advertising `capability`.
    async fn get_capability_nodes(&self, capability: &str) -> anyhow::Result<HashSet<DeviceNode>>;

    /// Node sets reported on every change to `capability`. Dropping the
    /// stream unregisters the listener.
    fn capability_changes(&self, capability: &str) -> BoxStream<'static, HashSet<DeviceNode>>;
}

/// Watches which counterpart devices are reachable.
#[derive(Clone)]
pub struct NodeDiscovery {
    transport: Arc<dyn CapabilityTransport>,
}

impl NodeDiscovery {
    pub fn new(transport: Arc<dyn CapabilityTransport>) -> Self {
        Self { transport }
    }

    /// Stream of reachable counterpart nodes for a device of type `local`.
    ///
    /// Yields the initial set first, then every change. If the initial query
    /// fails the stream ends immediately without yielding.
    pub fn observe_connected_devices(
        &self,
        local: DeviceType,
    ) -> BoxStream<'static, HashSet<DeviceNode>> {
        let transport = self.transport.clone();
        let capability = local.counterpart_capability();

        stream::once(async move {
            match transport.get_capability_nodes(capability).await {
                Ok(initial) => {
                    tracing::debug!(capability, nodes = initial.len(), "Initial capability nodes");
                    stream::iter([initial])
                        .chain(transport.capability_changes(capability))
                        .boxed()
                }
                Err(e) => {
                    tracing::warn!(capability, error = %e, "Capability query failed");
                    stream::empty().boxed()
                }
            }
        })
        .flatten()
        .boxed()
    }
}

/// Choose the node to connect to: nearby nodes first, then lowest ID.
pub fn preferred_node(nodes: &HashSet<DeviceNode>) -> Option<DeviceNode> {
    nodes
        .iter()
        .min_by(|a, b| b.is_nearby.cmp(&a.is_nearby).then_with(|| a.id.cmp(&b.id)))
        .cloned()
}
