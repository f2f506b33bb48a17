use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A group the user shares daily photos with.
///
/// Groups are created by the reconciliation engine from remote payloads,
/// or locally by the user ahead of server confirmation. The member set is
/// exclusively owned: reconciliation replaces it wholesale rather than
/// diffing member-by-member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_photo_date: Option<DateTime<Utc>>,
    pub has_sent_today: bool,
    pub members: Vec<GroupMember>,
}

impl Group {
    /// Create a new locally-originated group with no members yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            last_photo_date: None,
            has_sent_today: false,
            members: Vec::new(),
        }
    }

    /// Whether the user has already sent a photo to this group today.
    ///
    /// The stored flag comes from the server, but "today" resets at local
    /// midnight: a stale flag from yesterday no longer counts even before
    /// the next sync clears it.
    pub fn sent_today(&self) -> bool {
        self.sent_today_at(Utc::now())
    }

    fn sent_today_at(&self, now: DateTime<Utc>) -> bool {
        if !self.has_sent_today {
            return false;
        }
        match self.last_photo_date {
            Some(last) => {
                last.with_timezone(&Local).date_naive() == now.with_timezone(&Local).date_naive()
            }
            // Flag without a timestamp: trust the server until the next sync.
            None => true,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// A member of a group. No independent lifecycle: recreated whenever the
/// owning group is reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: Uuid,
    pub first_name: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl GroupMember {
    pub fn display_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or("Someone")
    }
}

// ============================================================================
// Wire DTOs
// ============================================================================

/// Group payload as returned by `GET /api/groups`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDto {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub member_count: Option<i64>,
    #[serde(default)]
    pub members: Vec<MemberDto>,
    #[serde(default)]
    pub last_photo: Option<LastPhotoDto>,
    #[serde(default)]
    pub has_sent_today: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDto {
    pub id: Uuid,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastPhotoDto {
    pub timestamp: DateTime<Utc>,
    pub sender_id: Uuid,
    #[serde(default)]
    pub sender_name: Option<String>,
}
