use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Photos live for 48 hours after creation unless the server says otherwise.
pub const PHOTO_TTL_HOURS: i64 = 48;

/// A photo shared in a group.
///
/// At least one of `local_path` / `remote_url` is always set: a photo is
/// either something we took (pending or confirmed upload) or something the
/// server told us about. The constructors maintain this; the store backs it
/// with a CHECK constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: Option<String>,
    pub local_path: Option<String>,
    pub remote_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Photo {
    /// Build a photo from a remote payload. Missing `expires_at` falls back
    /// to the standard 48-hour window after `created_at`.
    pub fn from_remote(group_id: Uuid, dto: &PhotoDto) -> Self {
        Self {
            id: dto.id,
            group_id,
            sender_id: dto.sender_id,
            sender_name: dto.sender_name.clone(),
            local_path: None,
            remote_url: Some(dto.url.clone()),
            created_at: dto.created_at,
            expires_at: dto
                .expires_at
                .unwrap_or(dto.created_at + Duration::hours(PHOTO_TTL_HOURS)),
        }
    }

    /// Build a speculative local photo for a pending send, before the
    /// server has confirmed it.
    pub fn pending_send(group_id: Uuid, sender_id: Uuid, local_path: impl Into<String>) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            group_id,
            sender_id,
            sender_name: None,
            local_path: Some(local_path.into()),
            remote_url: None,
            created_at,
            expires_at: created_at + Duration::hours(PHOTO_TTL_HOURS),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Pending local sends have no remote counterpart yet and must never be
    /// deleted by reconciliation, only by the TTL sweep.
    pub fn is_pending_send(&self) -> bool {
        self.remote_url.is_none()
    }
}

/// Photo payload as returned by `GET /api/photos/{group_id}/today`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoDto {
    pub id: Uuid,
    pub sender_id: Uuid,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(expires_at: Option<DateTime<Utc>>) -> PhotoDto {
        PhotoDto {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_name: Some("Maya".to_string()),
            url: "https://cdn.example.com/p/abc.jpg".to_string(),
            created_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn test_default_expiry_is_48_hours() {
        let dto = dto(None);
        let photo = Photo::from_remote(Uuid::new_v4(), &dto);
        assert_eq!(photo.expires_at, dto.created_at + Duration::hours(48));
    }

    #[test]
    fn test_server_expiry_overrides_default() {
        let explicit = Utc::now() + Duration::hours(6);
        let photo = Photo::from_remote(Uuid::new_v4(), &dto(Some(explicit)));
        assert_eq!(photo.expires_at, explicit);
    }

    #[test]
    fn test_is_expired_boundary() {
        let photo = Photo::from_remote(Uuid::new_v4(), &dto(None));
        assert!(!photo.is_expired_at(photo.created_at + Duration::hours(47)));
        assert!(photo.is_expired_at(photo.created_at + Duration::hours(49)));
    }

    #[test]
    fn test_pending_send_has_local_path_only() {
        let photo = Photo::pending_send(Uuid::new_v4(), Uuid::new_v4(), "/tmp/out.jpg");
        assert!(photo.is_pending_send());
        assert!(photo.local_path.is_some());
        assert!(photo.remote_url.is_none());
    }
}
