//! Notification delivery boundary.
//!
//! A [`NotificationSource`] is bound to one resource kind at registration
//! time and from then on pushes add/update/delete callbacks into a
//! [`ResourceEvents`] translator, which normalizes them into queue items.
//! Sources never call back into the resource store and never block.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::operator::item::{GroupVersionKind, Item, Operation, ResourceIdentity};
use crate::operator::queue::WorkQueue;

/// Capability required of any object delivered by a notification source.
/// Metadata may legitimately be missing on malformed deliveries, in which
/// case the notification is dropped.
pub trait Identified {
    fn resource_namespace(&self) -> Option<String>;
    fn resource_name(&self) -> Option<String>;
}

/// Per-kind event translator handed to a source at registration.
///
/// Converts raw object callbacks into [`Item`]s and enqueues them. Objects
/// without identity metadata are dropped without surfacing an error.
#[derive(Clone)]
pub struct ResourceEvents {
    queue: Arc<WorkQueue>,
    gvk: GroupVersionKind,
}

impl ResourceEvents {
    pub(crate) fn new(queue: Arc<WorkQueue>, gvk: GroupVersionKind) -> Self {
        Self { queue, gvk }
    }

    pub fn on_add(&self, obj: Option<&dyn Identified>) {
        self.push(Operation::Add, obj);
    }

    /// The new object's identity is used; the old object is irrelevant for
    /// queueing purposes.
    pub fn on_update(&self, _old: Option<&dyn Identified>, new: Option<&dyn Identified>) {
        self.push(Operation::Update, new);
    }

    pub fn on_delete(&self, obj: Option<&dyn Identified>) {
        self.push(Operation::Delete, obj);
    }

    fn push(&self, operation: Operation, obj: Option<&dyn Identified>) {
        // Guard against spurious empty deliveries from the transport.
        let Some(obj) = obj else {
            return;
        };
        let (Some(namespace), Some(name)) = (obj.resource_namespace(), obj.resource_name()) else {
            debug!(gvk = %self.gvk, %operation, "dropping notification without identity metadata");
            return;
        };
        let identity = ResourceIdentity::new(self.gvk.clone(), namespace, name);
        self.queue.add(Item::new(operation, identity));
    }
}

/// A watch subscription for one resource kind. Binding hands the source the
/// translator it must deliver into; delivery itself begins when the
/// source's [`Starter`] is started.
pub trait NotificationSource: Send + Sync {
    fn bind(&self, events: ResourceEvents) -> Result<()>;
}

/// Something that must begin delivering notifications when the operator
/// starts. Start failures abort operator startup.
#[async_trait]
pub trait Starter: Send + Sync {
    async fn start(&self, stop: CancellationToken) -> Result<()>;
}
