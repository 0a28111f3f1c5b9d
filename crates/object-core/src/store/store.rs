use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use super::ids::IdAllocator;
use super::record::{MediaObjectRecord, NewObject, ObjectInfo, ObjectTree, ReleasedObject};
use crate::endpoint::EndpointCell;
use crate::errors::{MediaError, MediaResult};
use crate::signals::{SignalCallback, SignalHandle, SignalHub, SignalKind};
use crate::types::{ObjectId, Token};

/// Registry owning every media object record.
///
/// Records are grouped into one tree per token, each behind its own lock:
/// mutations of a tree take its write lock, lookups share its read lock and
/// different trees never contend. `index` maps an id to its tree for
/// operations that arrive without a token.
///
/// A `DashMap` reference is always dropped before a tree lock is taken.
pub struct ObjectStore {
    ids: IdAllocator,
    epoch: Instant,
    trees: DashMap<Token, Arc<RwLock<ObjectTree>>>,
    index: DashMap<ObjectId, Token>,
    signals: Arc<SignalHub>,
}

impl ObjectStore {
    pub fn new(signals: Arc<SignalHub>) -> Self {
        Self {
            ids: IdAllocator::new(),
            epoch: Instant::now(),
            trees: DashMap::new(),
            index: DashMap::new(),
            signals,
        }
    }

    pub fn signals(&self) -> &Arc<SignalHub> {
        &self.signals
    }

    /// Reserve a fresh identifier for an object about to be inserted
    pub fn allocate_id(&self) -> ObjectId {
        self.ids.allocate()
    }

    fn millis_at(&self, instant: Instant) -> u64 {
        instant.saturating_duration_since(self.epoch).as_millis() as u64
    }

    fn now_ms(&self) -> u64 {
        self.millis_at(Instant::now())
    }

    fn tree(&self, token: Token) -> Option<Arc<RwLock<ObjectTree>>> {
        self.trees.get(&token).map(|tree| Arc::clone(tree.value()))
    }

    /// Insert a new tree root. Its token is its own identifier.
    pub fn insert_root(&self, object: NewObject) -> ObjectInfo {
        let token = Token::from(object.id);
        let info = ObjectInfo {
            id: object.id,
            token,
            parent: None,
            kind: object.kind,
            garbage_period: object.garbage_period,
            created_at: Utc::now(),
            pipeline: object.pipeline,
        };

        let record = MediaObjectRecord::new(info.clone(), object.endpoint, self.now_ms());
        self.trees
            .insert(token, Arc::new(RwLock::new(ObjectTree::new(record))));
        self.index.insert(info.id, token);

        info!("Inserted root {} ({})", info.id, info.kind);
        info
    }

    /// Insert `object` under `parent`, checked against `token` under the
    /// tree's write lock.
    pub fn insert_child(&self, parent: ObjectId, token: Token, object: NewObject) -> MediaResult<ObjectInfo> {
        let tree = self.tree(token).ok_or_else(|| MediaError::not_found(parent))?;
        let mut tree = tree.write();
        if tree.record(parent).is_none() {
            return Err(MediaError::not_found(parent));
        }

        let info = ObjectInfo {
            id: object.id,
            token,
            parent: Some(parent),
            kind: object.kind,
            garbage_period: object.garbage_period,
            created_at: Utc::now(),
            pipeline: object.pipeline,
        };
        let now = self.now_ms();
        let record = MediaObjectRecord::new(info.clone(), object.endpoint, now);

        if let Some(parent_record) = tree.records.get_mut(&parent) {
            parent_record.children.push(info.id);
        }
        tree.records.insert(info.id, record);
        tree.touch_chain(parent, now);
        self.index.insert(info.id, token);

        debug!("Inserted {} ({}) under {}", info.id, info.kind, parent);
        Ok(info)
    }

    /// Resolve `id` under `token`; refreshes the object and its ancestors
    pub fn get(&self, id: ObjectId, token: Token) -> MediaResult<ObjectInfo> {
        let tree = self.tree(token).ok_or_else(|| MediaError::not_found(id))?;
        let tree = tree.read();
        let record = tree.record(id).ok_or_else(|| MediaError::not_found(id))?;
        tree.touch_chain(id, self.now_ms());
        Ok(record.info.clone())
    }

    /// Resolve an object together with its endpoint state, if it has one
    pub fn endpoint(&self, id: ObjectId, token: Token) -> MediaResult<(ObjectInfo, Option<Arc<EndpointCell>>)> {
        let tree = self.tree(token).ok_or_else(|| MediaError::not_found(id))?;
        let tree = tree.read();
        let record = tree.record(id).ok_or_else(|| MediaError::not_found(id))?;
        tree.touch_chain(id, self.now_ms());
        Ok((record.info.clone(), record.endpoint.clone()))
    }

    /// The parent of `id`, failing `NoParent` for roots
    pub fn parent_of(&self, id: ObjectId, token: Token) -> MediaResult<ObjectInfo> {
        let tree = self.tree(token).ok_or_else(|| MediaError::not_found(id))?;
        let tree = tree.read();
        let record = tree.record(id).ok_or_else(|| MediaError::not_found(id))?;
        let parent = record.info.parent.ok_or_else(|| MediaError::no_parent(id))?;
        let parent = tree.record(parent).ok_or_else(|| MediaError::not_found(parent))?;
        tree.touch_chain(id, self.now_ms());
        Ok(parent.info.clone())
    }

    /// Remove `id` and all its descendants in one step.
    ///
    /// Every removed object's signal subscriptions are closed before the
    /// tree lock is released. A second release of the same id fails
    /// `NotFound`.
    pub fn release(&self, id: ObjectId) -> MediaResult<Vec<ReleasedObject>> {
        self.release_inner(id, None)
    }

    /// Release `id` only if it is still idle past its garbage period at
    /// `now`. Returns an empty set when the object was used in the meantime.
    pub fn release_expired(&self, id: ObjectId, now: Instant) -> MediaResult<Vec<ReleasedObject>> {
        self.release_inner(id, Some(self.millis_at(now)))
    }

    fn release_inner(&self, id: ObjectId, expired_at: Option<u64>) -> MediaResult<Vec<ReleasedObject>> {
        let token = self
            .index
            .get(&id)
            .map(|token| *token.value())
            .ok_or_else(|| MediaError::not_found(id))?;
        let tree_lock = self.tree(token).ok_or_else(|| MediaError::not_found(id))?;

        let mut tree = tree_lock.write();
        let record = tree.record(id).ok_or_else(|| MediaError::not_found(id))?;
        if let Some(now_ms) = expired_at {
            if !record.is_expired(now_ms) {
                debug!("Skipping release of {}, used since sweep started", id);
                return Ok(Vec::new());
            }
        }
        let parent = record.info.parent;

        if let Some(parent) = parent.and_then(|p| tree.records.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }

        let order = tree.subtree(id);
        let mut released = Vec::with_capacity(order.len());
        let mut closed = 0;
        // Leaves before their owners
        for object in order.into_iter().rev() {
            let Some(record) = tree.records.remove(&object) else {
                continue;
            };
            self.index.remove(&object);
            if let Some(cell) = &record.endpoint {
                cell.mark_released();
            }
            closed += self.signals.close_object(object);
            released.push(ReleasedObject {
                id: object,
                kind: record.info.kind,
                pipeline: record.info.pipeline,
            });
        }

        let root_released = tree.root == id;
        if root_released {
            tree.released = true;
        }
        drop(tree);
        if root_released {
            self.trees.remove(&token);
        }

        info!(
            "Released {} with {} object(s), {} subscription(s) closed",
            id,
            released.len(),
            closed
        );
        Ok(released)
    }

    /// Subscribe to `kind` signals of a live object
    pub fn subscribe(
        &self,
        id: ObjectId,
        token: Token,
        kind: SignalKind,
        callback: SignalCallback,
    ) -> MediaResult<SignalHandle> {
        let tree = self.tree(token).ok_or_else(|| MediaError::not_found(id))?;
        let tree = tree.read();
        if tree.record(id).is_none() {
            return Err(MediaError::not_found(id));
        }
        Ok(self.signals.subscribe(id, kind, callback))
    }

    /// Topmost objects idle for longer than their garbage period as of `now`
    pub fn expired(&self, now: Instant) -> Vec<ObjectId> {
        let now_ms = self.millis_at(now);
        let trees: Vec<_> = self
            .trees
            .iter()
            .map(|tree| Arc::clone(tree.value()))
            .collect();

        trees
            .into_iter()
            .flat_map(|tree| tree.read().expired(now_ms))
            .collect()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.index.contains_key(&id)
    }

    /// Number of live ownership trees
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}
