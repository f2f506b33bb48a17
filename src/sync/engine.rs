//! The reconciliation engine: local-first reads with remote-authoritative
//! sync.
//!
//! Reads always start from the persistent store. When connectivity allows,
//! the remote snapshot is fetched and reconciled in a single transaction;
//! a remote failure is logged and absorbed, never fatal to the caller, as
//! long as a local snapshot exists. Storage failures always surface.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ApiClient, ApiError, Connectivity};
use crate::models::{Group, GroupDto, GroupMember, Photo, PhotoDto};
use crate::store::{Store, StoreError};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] ApiError),
}

pub struct SyncEngine {
    store: Arc<Store>,
    api: ApiClient,
    connectivity: Connectivity,
}

impl SyncEngine {
    pub fn new(store: Arc<Store>, api: ApiClient, connectivity: Connectivity) -> Self {
        Self {
            store,
            api,
            connectivity,
        }
    }

    // ===== Groups =====

    /// Fetch groups, local snapshot first.
    ///
    /// If connectivity is available the remote set is fetched and
    /// reconciled; on success the freshly reconciled local read is
    /// returned. Any remote failure (network, decode, server) is absorbed
    /// and the pre-reconciliation snapshot is returned instead.
    pub async fn fetch_groups(&self) -> Result<Vec<Group>, SyncError> {
        let local = self.store.all_groups()?;

        if !self.connectivity.is_online() {
            debug!(groups = local.len(), "Offline, serving local snapshot");
            return Ok(local);
        }

        match self.api.fetch_groups().await {
            Ok(remote) => {
                self.sync_groups(&remote)?;
                Ok(self.store.all_groups()?)
            }
            Err(e) => {
                warn!(error = %e, "Group refresh failed, serving local snapshot");
                Ok(local)
            }
        }
    }

    /// Reconcile the remote group set into the store in one transaction.
    ///
    /// Remote is authoritative: matching groups get their mutable fields
    /// updated and their member set fully replaced; unseen groups are
    /// materialized; local groups absent from the payload are deleted.
    pub fn sync_groups(&self, remote: &[GroupDto]) -> Result<(), StoreError> {
        self.store.with_tx(|tx| {
            let local_ids: HashSet<Uuid> = tx.group_ids()?.into_iter().collect();
            let mut remote_ids: HashSet<Uuid> = HashSet::with_capacity(remote.len());
            let now = Utc::now();

            for dto in remote {
                remote_ids.insert(dto.id);
                let last_photo_date = dto.last_photo.as_ref().map(|p| p.timestamp);

                if local_ids.contains(&dto.id) {
                    tx.update_group(dto.id, &dto.name, dto.has_sent_today, last_photo_date)?;
                } else {
                    tx.insert_group(&Group {
                        id: dto.id,
                        name: dto.name.clone(),
                        created_at: now,
                        last_photo_date,
                        has_sent_today: dto.has_sent_today,
                        members: Vec::new(),
                    })?;
                }

                // Full replace keeps member order/attribution matching the
                // server exactly. joined_at is reset to the sync time.
                let members: Vec<GroupMember> = dto
                    .members
                    .iter()
                    .map(|m| GroupMember {
                        user_id: m.id,
                        first_name: m.first_name.clone(),
                        joined_at: now,
                    })
                    .collect();
                tx.replace_members(dto.id, &members)?;
            }

            for id in local_ids.difference(&remote_ids) {
                tx.delete_group(*id)?;
            }

            info!(
                remote = remote.len(),
                deleted = local_ids.difference(&remote_ids).count(),
                "Groups reconciled"
            );
            Ok(())
        })
    }

    /// Create a group locally. The local store is the immediate source of
    /// truth for user-initiated mutations.
    // TODO: post the new group to POST /api/groups once the outbox exists;
    // until then server-side creation happens through the invite flow.
    pub fn create_group(&self, name: &str) -> Result<Group, StoreError> {
        let group = Group::new(name);
        self.store.insert_group(&group)?;
        Ok(group)
    }

    /// Rename a group locally.
    pub fn update_group(&self, id: Uuid, name: &str) -> Result<(), StoreError> {
        self.store.update_group_name(id, name)
    }

    /// Delete a group locally. The next reconciliation will resurrect it if
    /// the server still knows about it.
    pub fn delete_group(&self, id: Uuid) -> Result<(), StoreError> {
        self.store.delete_group(id)
    }

    /// Point lookup, no network fallback.
    pub fn get_group(&self, id: Uuid) -> Result<Option<Group>, StoreError> {
        self.store.get_group(id)
    }

    // ===== Photos =====

    /// Fetch the non-expired photos for a group, local snapshot first, with
    /// the same absorb-remote-failure semantics as `fetch_groups`.
    pub async fn fetch_photos(&self, group_id: Uuid) -> Result<Vec<Photo>, SyncError> {
        let local = self.live_photos(group_id)?;

        if !self.connectivity.is_online() {
            debug!(group = %group_id, photos = local.len(), "Offline, serving local photos");
            return Ok(local);
        }

        match self.api.fetch_today_photos(group_id).await {
            Ok(remote) => {
                self.sync_photos(group_id, &remote)?;
                Ok(self.live_photos(group_id)?)
            }
            Err(e) => {
                warn!(group = %group_id, error = %e, "Photo refresh failed, serving local photos");
                Ok(local)
            }
        }
    }

    /// Upsert the remote "today" photo set for a group in one transaction.
    ///
    /// Deletion is TTL-driven rather than diff-driven here: pending local
    /// sends have no remote counterpart and must survive reconciliation.
    pub fn sync_photos(&self, group_id: Uuid, remote: &[PhotoDto]) -> Result<(), StoreError> {
        self.store.with_tx(|tx| {
            for dto in remote {
                tx.upsert_photo(&Photo::from_remote(group_id, dto))?;
            }
            Ok(())
        })
    }

    /// Record a locally-sent photo ahead of server confirmation and mark
    /// the group as sent-today.
    pub fn record_pending_photo(
        &self,
        group_id: Uuid,
        sender_id: Uuid,
        local_path: &str,
    ) -> Result<Photo, StoreError> {
        let photo = Photo::pending_send(group_id, sender_id, local_path);
        self.store.save_photo(&photo)?;
        self.store.mark_group_sent(group_id, photo.created_at)?;
        Ok(photo)
    }

    /// Drop expired photo rows. Returns the number removed.
    pub fn sweep_expired_photos(&self) -> Result<usize, StoreError> {
        self.store.delete_expired_photos(Utc::now())
    }

    fn live_photos(&self, group_id: Uuid) -> Result<Vec<Photo>, StoreError> {
        Ok(self
            .store
            .photos_for_group(group_id)?
            .into_iter()
            .filter(|p| !p.is_expired())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LastPhotoDto, MemberDto};
    use chrono::Duration;

    fn engine_with(connectivity: Connectivity) -> SyncEngine {
        let store = Arc::new(Store::open_in_memory().expect("open store"));
        // Port 9 (discard) is never listening; only reached in online tests
        // that expect the failure to be absorbed.
        let api = ApiClient::new("http://127.0.0.1:9").expect("client");
        SyncEngine::new(store, api, connectivity)
    }

    fn offline_engine() -> SyncEngine {
        engine_with(Connectivity::new(false))
    }

    fn group_dto(id: Uuid, name: &str, member_ids: &[Uuid]) -> GroupDto {
        GroupDto {
            id,
            name: name.to_string(),
            member_count: Some(member_ids.len() as i64),
            members: member_ids
                .iter()
                .map(|&id| MemberDto {
                    id,
                    first_name: None,
                })
                .collect(),
            last_photo: None,
            has_sent_today: false,
        }
    }

    #[test]
    fn test_sync_groups_is_idempotent() {
        let engine = offline_engine();
        let id = Uuid::new_v4();
        let members = vec![Uuid::new_v4(), Uuid::new_v4()];
        let payload = vec![group_dto(id, "Family", &members)];

        engine.sync_groups(&payload).expect("first sync");
        engine.sync_groups(&payload).expect("second sync");

        let groups = engine.store.all_groups().expect("all");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 2, "no duplicate members");
    }

    #[test]
    fn test_sync_groups_deletes_absent_groups() {
        let engine = offline_engine();
        let keep = Uuid::new_v4();
        let drop = Uuid::new_v4();

        engine
            .sync_groups(&[group_dto(keep, "Keep", &[]), group_dto(drop, "Drop", &[])])
            .expect("seed");
        engine.sync_groups(&[group_dto(keep, "Keep", &[])]).expect("resync");

        let groups = engine.store.all_groups().expect("all");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, keep);
    }

    #[test]
    fn test_membership_full_replace() {
        let engine = offline_engine();
        let id = Uuid::new_v4();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        engine.sync_groups(&[group_dto(id, "Family", &[a, b])]).expect("seed");
        engine.sync_groups(&[group_dto(id, "Family", &[b, c])]).expect("resync");

        let group = engine.get_group(id).expect("get").expect("present");
        let ids: HashSet<Uuid> = group.members.iter().map(|m| m.user_id).collect();
        assert_eq!(ids, HashSet::from([b, c]), "A removed, C added, B kept");
    }

    #[test]
    fn test_sync_groups_updates_mutable_fields() {
        let engine = offline_engine();
        let id = Uuid::new_v4();
        engine.sync_groups(&[group_dto(id, "Old Name", &[])]).expect("seed");

        let mut dto = group_dto(id, "New Name", &[]);
        dto.has_sent_today = true;
        dto.last_photo = Some(LastPhotoDto {
            timestamp: Utc::now(),
            sender_id: Uuid::new_v4(),
            sender_name: Some("Maya".to_string()),
        });
        engine.sync_groups(&[dto]).expect("resync");

        let group = engine.get_group(id).expect("get").expect("present");
        assert_eq!(group.name, "New Name");
        assert!(group.has_sent_today);
        assert!(group.last_photo_date.is_some());
    }

    #[tokio::test]
    async fn test_offline_fetch_returns_local_snapshot() {
        let engine = offline_engine();
        engine.create_group("Family").expect("create");

        let groups = engine.fetch_groups().await.expect("fetch must not fail offline");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Family");
    }

    #[tokio::test]
    async fn test_online_fetch_absorbs_remote_failure() {
        // Online flag set, but the API endpoint is unreachable: the error
        // must be swallowed and the local snapshot returned.
        let engine = engine_with(Connectivity::new(true));
        engine.create_group("Family").expect("create");

        let groups = engine.fetch_groups().await.expect("remote failure is not fatal");
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_local_mutations_are_local_first() {
        let engine = offline_engine();
        let group = engine.create_group("Road Trip").expect("create");

        engine.update_group(group.id, "Road Trip 2026").expect("update");
        let loaded = engine.get_group(group.id).expect("get").expect("present");
        assert_eq!(loaded.name, "Road Trip 2026");

        engine.delete_group(group.id).expect("delete");
        assert!(engine.get_group(group.id).expect("get").is_none());
    }

    #[test]
    fn test_sync_photos_preserves_pending_sends() {
        let engine = offline_engine();
        let group = engine.create_group("Family").expect("create");
        let sender = Uuid::new_v4();

        let pending = engine
            .record_pending_photo(group.id, sender, "/tmp/pending.jpg")
            .expect("record");

        let remote = vec![PhotoDto {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_name: Some("Maya".to_string()),
            url: "https://cdn.example.com/p/1.jpg".to_string(),
            created_at: Utc::now(),
            expires_at: None,
        }];
        engine.sync_photos(group.id, &remote).expect("sync");

        let photos = engine.live_photos(group.id).expect("photos");
        assert_eq!(photos.len(), 2);
        assert!(photos.iter().any(|p| p.id == pending.id));
    }

    #[test]
    fn test_record_pending_photo_marks_group_sent() {
        let engine = offline_engine();
        let group = engine.create_group("Family").expect("create");
        engine
            .record_pending_photo(group.id, Uuid::new_v4(), "/tmp/p.jpg")
            .expect("record");

        let loaded = engine.get_group(group.id).expect("get").expect("present");
        assert!(loaded.has_sent_today);
        assert!(loaded.sent_today());
    }

    #[test]
    fn test_expired_photos_filtered_and_swept() {
        let engine = offline_engine();
        let group = engine.create_group("Family").expect("create");

        let mut stale = Photo::pending_send(group.id, Uuid::new_v4(), "/tmp/old.jpg");
        stale.expires_at = Utc::now() - Duration::hours(1);
        engine.store.save_photo(&stale).expect("save");

        assert!(engine.live_photos(group.id).expect("live").is_empty());
        assert_eq!(engine.sweep_expired_photos().expect("sweep"), 1);
    }
}
