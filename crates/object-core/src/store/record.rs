use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::endpoint::{EndpointCell, EndpointState};
use crate::engine::PipelineHandle;
use crate::types::{MediaKind, MediaObjectRef, ObjectId, Token};

/// Immutable view of a media object returned by lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub token: Token,
    pub parent: Option<ObjectId>,
    pub kind: MediaKind,
    /// Idle seconds before automatic release; zero or less disables it
    pub garbage_period: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub pipeline: PipelineHandle,
}

impl ObjectInfo {
    pub fn as_ref(&self) -> MediaObjectRef {
        MediaObjectRef::new(self.id, self.token)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Everything needed to insert an object whose engine element already exists
#[derive(Debug)]
pub struct NewObject {
    pub id: ObjectId,
    pub kind: MediaKind,
    pub garbage_period: i64,
    pub pipeline: PipelineHandle,
    pub endpoint: Option<EndpointState>,
}

impl NewObject {
    pub fn new(id: ObjectId, kind: MediaKind, pipeline: PipelineHandle) -> Self {
        Self {
            id,
            kind,
            garbage_period: 0,
            pipeline,
            endpoint: None,
        }
    }

    pub fn with_garbage_period(mut self, seconds: i64) -> Self {
        self.garbage_period = seconds;
        self
    }

    pub fn with_endpoint(mut self, state: EndpointState) -> Self {
        self.endpoint = Some(state);
        self
    }
}

/// An object removed by a release, with the element left to tear down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedObject {
    pub id: ObjectId,
    pub kind: MediaKind,
    pub pipeline: PipelineHandle,
}

pub(crate) struct MediaObjectRecord {
    pub(crate) info: ObjectInfo,
    pub(crate) children: Vec<ObjectId>,
    /// Milliseconds since the store epoch
    pub(crate) last_used: AtomicU64,
    pub(crate) endpoint: Option<Arc<EndpointCell>>,
}

impl MediaObjectRecord {
    pub(crate) fn new(info: ObjectInfo, endpoint: Option<EndpointState>, now_ms: u64) -> Self {
        Self {
            info,
            children: Vec::new(),
            last_used: AtomicU64::new(now_ms),
            endpoint: endpoint.map(|state| Arc::new(EndpointCell::new(state))),
        }
    }

    pub(crate) fn touch(&self, now_ms: u64) {
        self.last_used.fetch_max(now_ms, Ordering::Relaxed);
    }

    pub(crate) fn is_expired(&self, now_ms: u64) -> bool {
        if self.info.garbage_period <= 0 {
            return false;
        }
        let idle = now_ms.saturating_sub(self.last_used.load(Ordering::Relaxed));
        idle > (self.info.garbage_period as u64).saturating_mul(1000)
    }
}

/// All records sharing one token
pub(crate) struct ObjectTree {
    pub(crate) root: ObjectId,
    /// Set once the root is gone; the tree is then unreachable
    pub(crate) released: bool,
    pub(crate) records: HashMap<ObjectId, MediaObjectRecord>,
}

impl ObjectTree {
    pub(crate) fn new(root: MediaObjectRecord) -> Self {
        let id = root.info.id;
        let mut records = HashMap::new();
        records.insert(id, root);
        Self {
            root: id,
            released: false,
            records,
        }
    }

    pub(crate) fn record(&self, id: ObjectId) -> Option<&MediaObjectRecord> {
        if self.released {
            return None;
        }
        self.records.get(&id)
    }

    /// Refresh `id` and every ancestor
    pub(crate) fn touch_chain(&self, id: ObjectId, now_ms: u64) {
        let mut current = Some(id);
        while let Some(id) = current {
            match self.records.get(&id) {
                Some(record) => {
                    record.touch(now_ms);
                    current = record.info.parent;
                }
                None => break,
            }
        }
    }

    /// `id` followed by all its descendants, parents before children
    pub(crate) fn subtree(&self, id: ObjectId) -> Vec<ObjectId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(record) = self.records.get(&next) {
                order.push(next);
                stack.extend(record.children.iter().rev().copied());
            }
        }
        order
    }

    /// Topmost expired objects; descendants of an expired object are skipped
    pub(crate) fn expired(&self, now_ms: u64) -> Vec<ObjectId> {
        let mut expired = Vec::new();
        let mut stack = vec![self.root];
        while let Some(next) = stack.pop() {
            let Some(record) = self.records.get(&next) else {
                continue;
            };
            if record.is_expired(now_ms) {
                expired.push(next);
            } else {
                stack.extend(record.children.iter().copied());
            }
        }
        expired
    }
}
