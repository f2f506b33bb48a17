//! Data models for Dayly entities.
//!
//! This module contains the data structures used to represent
//! Dayly data:
//!
//! - `Group`, `GroupMember`: groups a user shares photos with
//! - `Photo`: a shared photo with its 48-hour expiry window
//! - Wire DTOs (`GroupDto`, `MemberDto`, `LastPhotoDto`, `PhotoDto`)
//!   matching the backend JSON payloads

pub mod group;
pub mod photo;

pub use group::{Group, GroupDto, GroupMember, LastPhotoDto, MemberDto};
pub use photo::{Photo, PhotoDto, PHOTO_TTL_HOURS};
