//! Forwarding handlers for the relay.

use crate::runtime::{EndpointId, Outbox};
use crate::traffic::OperatorLog;
use bytes::Bytes;
use std::rc::Rc;
use tracing::trace;

/// Traffic label for bytes travelling from the agent to the extension.
pub const AGENT_TO_EXTENSION: &str = "[A --> E]";

/// Traffic label for bytes travelling from the extension to the agent.
pub const EXTENSION_TO_AGENT: &str = "[A <-- E]";

/// Data handler that logs each batch under `label` and queues it,
/// unmodified, on endpoint `to`.
pub fn forward(
    to: EndpointId,
    label: &'static str,
    log: Rc<dyn OperatorLog>,
) -> impl FnMut(&mut Outbox, Bytes) + 'static {
    move |out: &mut Outbox, data: Bytes| {
        log.traffic(label, &data);
        trace!(from = %out.source(), %to, len = data.len(), "Forwarding batch");
        out.send(to, data);
    }
}
