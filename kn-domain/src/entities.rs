//! Domain entities for the storage core (§3 DATA MODEL).
//!
//! Pure data, no I/O. Every first-class entity carries an always-present
//! local id (`User` alone uses a numeric id instead, per spec) and an
//! optional remote guid. Value types are plain data and may be freely
//! cloned — the storage engine (`kn-storage`) is the exclusive owner of
//! persisted state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{Guid, LocalId, UserId};

// ===========================================================================
// User
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivilegeLevel {
    Normal,
    Premium,
    Vip,
    Manager,
    Support,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub name: String,
    pub timezone: Option<String>,
    pub privilege: PrivilegeLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub attributes: Option<UserAttributes>,
    pub accounting: Option<Accounting>,
    pub premium_info: Option<PremiumInfo>,
    pub business_user_info: Option<BusinessUserInfo>,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.into(),
            email: email.into(),
            name: String::new(),
            timezone: None,
            privilege: PrivilegeLevel::Normal,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            active: true,
            attributes: None,
            accounting: None,
            premium_info: None,
            business_user_info: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Optional nested application-data map, shared verbatim by the three
/// attribute blobs that carry it (§4.8): a key-only set plus a full
/// key-value map, written as two independently-sized components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationData {
    pub keys_only: Vec<String>,
    pub full_map: BTreeMap<String, String>,
}

/// Optional sub-record attached to `User`. 21 individually optional fields
/// (including `application_data`), serialized via the deterministic codec
/// (§4.8, `kn_domain::codec`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAttributes {
    pub default_location_name: Option<String>,
    pub default_latitude: Option<f64>,
    pub default_longitude: Option<f64>,
    pub preactivation: Option<bool>,
    pub incoming_email_address: Option<String>,
    pub comments: Option<String>,
    pub date_agreed_to_terms_of_service: Option<i64>,
    pub max_referrals: Option<i32>,
    pub referral_count: Option<i32>,
    pub referrer_code: Option<String>,
    pub sent_email_date: Option<i64>,
    pub daily_email_limit: Option<i32>,
    pub email_opt_out_date: Option<i64>,
    pub partner_email_opt_in_date: Option<i64>,
    pub preferred_country: Option<String>,
    pub preferred_language: Option<String>,
    pub clip_full_page: Option<bool>,
    pub twitter_user_name: Option<String>,
    pub group_name: Option<String>,
    pub recognition_language: Option<String>,
    pub application_data: Option<ApplicationData>,
}

/// Billing/quota sub-record. Not part of the bit-exact codec contract
/// (§4.8 names only UserAttributes/NoteAttributes/ResourceAttributes); it is
/// persisted as an opaque JSON blob instead (see DESIGN.md).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Accounting {
    pub upload_limit: Option<i64>,
    pub upload_limit_end: Option<DateTime<Utc>>,
    pub premium_service_status: Option<String>,
    pub premium_order_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PremiumInfo {
    pub premium_expiration_date: Option<DateTime<Utc>>,
    pub can_purchase_uploads: bool,
    pub sponsored_group_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessUserInfo {
    pub business_id: Option<i64>,
    pub business_name: Option<String>,
    pub business_email: Option<String>,
}

// ===========================================================================
// Notebook
// ===========================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookRestrictions {
    pub no_update_notebook: bool,
    pub no_rename_notebook: bool,
    pub no_expunge_notebook: bool,
    pub no_create_notes: bool,
    pub no_update_notes: bool,
    pub no_expunge_notes: bool,
    pub no_share_notes: bool,
    pub no_email_notes: bool,
    pub no_create_tags: bool,
    pub no_update_tags: bool,
    pub no_expunge_tags: bool,
    pub no_set_parent_tag: bool,
    pub no_create_shared_notebooks: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookPublishing {
    pub uri: Option<String>,
    pub public_description: Option<String>,
    pub is_public: bool,
    pub order: Option<i32>,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotebookBusinessInfo {
    pub notebook_description: Option<String>,
    pub is_recommended: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedNotebook {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub notebook_guid: Guid,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub share_key: Option<String>,
    pub username: Option<String>,
    pub privilege: PrivilegeLevel,
    pub allow_preview: bool,
    pub recipient_reminder_notify_email: bool,
    pub recipient_reminder_notify_in_app: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<i32>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_default: bool,
    pub is_last_used: bool,
    pub stack: Option<String>,
    pub publishing: Option<NotebookPublishing>,
    pub business_info: Option<NotebookBusinessInfo>,
    pub restrictions: Option<NotebookRestrictions>,
    pub shared_notebooks: Vec<SharedNotebook>,
    pub linked_notebook_guid: Option<Guid>,
    pub is_dirty: bool,
    pub is_local: bool,
    pub is_favorited: bool,
}

impl Notebook {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            local_id: LocalId::new(),
            guid: None,
            update_sequence_number: None,
            name: name.into(),
            created_at: now,
            updated_at: now,
            is_default: false,
            is_last_used: false,
            stack: None,
            publishing: None,
            business_info: None,
            restrictions: None,
            shared_notebooks: Vec::new(),
            linked_notebook_guid: None,
            is_dirty: true,
            is_local: true,
            is_favorited: false,
        }
    }

    /// True if this notebook belongs to a linked notebook rather than the
    /// user's own account.
    pub fn is_from_linked_notebook(&self) -> bool {
        self.linked_notebook_guid.is_some()
    }
}

// ===========================================================================
// Tag
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<i32>,
    pub name: String,
    pub parent_local_id: Option<LocalId>,
    pub linked_notebook_guid: Option<Guid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub is_dirty: bool,
    pub is_local: bool,
    pub is_favorited: bool,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::new(),
            guid: None,
            update_sequence_number: None,
            name: name.into(),
            parent_local_id: None,
            linked_notebook_guid: None,
            deleted_at: None,
            active: true,
            is_dirty: true,
            is_local: true,
            is_favorited: false,
        }
    }

    pub fn is_from_linked_notebook(&self) -> bool {
        self.linked_notebook_guid.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// ===========================================================================
// Note / Resource
// ===========================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteAttributes {
    pub subject_date: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub author: Option<String>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub source_application: Option<String>,
    pub share_date: Option<i64>,
    pub reminder_order: Option<i64>,
    pub reminder_done_time: Option<i64>,
    pub reminder_time: Option<i64>,
    pub place_name: Option<String>,
    pub content_class: Option<String>,
    pub application_data: Option<ApplicationData>,
    pub last_edited_by: Option<String>,
    pub classifications: Option<BTreeMap<String, String>>,
    pub creator_id: Option<i64>,
    pub last_editor_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceAttributes {
    pub source_url: Option<String>,
    pub timestamp: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub client_will_index: Option<bool>,
    pub recognition_type: Option<String>,
    pub file_name: Option<String>,
    pub attachment: Option<bool>,
    pub application_data: Option<ApplicationData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBody {
    pub data: Vec<u8>,
    pub size: i32,
    pub hash: Vec<u8>,
}

impl ResourceBody {
    pub fn new(data: Vec<u8>, hash: Vec<u8>) -> Self {
        let size = data.len() as i32;
        Self { data, size, hash }
    }

    /// Invariant (§3): size matches body length.
    pub fn size_matches_body(&self) -> bool {
        self.size as usize == self.data.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<i32>,
    pub note_local_id: LocalId,
    pub mime: String,
    pub width: Option<i16>,
    pub height: Option<i16>,
    pub data: ResourceBody,
    pub recognition: Option<ResourceBody>,
    pub alternate_data: Option<ResourceBody>,
    pub attributes: Option<ResourceAttributes>,
}

impl Resource {
    pub fn new(note_local_id: LocalId, mime: impl Into<String>, data: ResourceBody) -> Self {
        Self {
            local_id: LocalId::new(),
            guid: None,
            update_sequence_number: None,
            note_local_id,
            mime: mime.into(),
            width: None,
            height: None,
            data,
            recognition: None,
            alternate_data: None,
            attributes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<i32>,
    pub title: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub notebook_local_id: LocalId,
    pub tag_local_ids: Vec<LocalId>,
    pub resources: Vec<Resource>,
    pub attributes: Option<NoteAttributes>,
    pub thumbnail: Option<Vec<u8>>,
    pub is_dirty: bool,
    pub is_local: bool,
    pub is_favorited: bool,
}

impl Note {
    pub fn new(notebook_local_id: LocalId, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        let title = title.into();
        Self {
            local_id: LocalId::new(),
            guid: None,
            update_sequence_number: None,
            title: if title.trim().is_empty() { None } else { Some(title) },
            content: content.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            active: true,
            notebook_local_id,
            tag_local_ids: Vec::new(),
            resources: Vec::new(),
            attributes: None,
            thumbnail: None,
            is_dirty: true,
            is_local: true,
            is_favorited: false,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Plain-text projection of `content`, derived by stripping XML-like
    /// markup. Used for `LIKE`-based search (§1 Non-goals: no full indexing
    /// beyond this).
    pub fn plain_text(&self) -> String {
        let mut out = String::with_capacity(self.content.len());
        let mut in_tag = false;
        for ch in self.content.chars() {
            match ch {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => out.push(ch),
                _ => {}
            }
        }
        out
    }

    /// Lowercased word list of the plain-text projection, used for
    /// tokenized `LIKE`/`MATCH` search columns.
    pub fn list_of_words(&self) -> Vec<String> {
        self.plain_text()
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect()
    }
}

// ===========================================================================
// SavedSearch
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryFormat {
    UserQuery,
    Sexp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub local_id: LocalId,
    pub guid: Option<Guid>,
    pub update_sequence_number: Option<i32>,
    pub name: String,
    pub query: String,
    pub query_format: QueryFormat,
    pub include_account: bool,
    pub include_business_linked_notebooks: bool,
    pub include_personal_linked_notebooks: bool,
    pub is_dirty: bool,
    pub is_local: bool,
    pub is_favorited: bool,
}

impl SavedSearch {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::new(),
            guid: None,
            update_sequence_number: None,
            name: name.into(),
            query: query.into(),
            query_format: QueryFormat::UserQuery,
            include_account: true,
            include_business_linked_notebooks: false,
            include_personal_linked_notebooks: false,
            is_dirty: true,
            is_local: true,
            is_favorited: false,
        }
    }
}

// ===========================================================================
// LinkedNotebook
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedNotebook {
    pub guid: Guid,
    pub update_sequence_number: Option<i32>,
    pub share_name: Option<String>,
    pub username: Option<String>,
    pub shard_id: Option<String>,
    pub share_key: Option<String>,
    pub uri: Option<String>,
    pub note_store_url: Option<String>,
    pub web_api_url_prefix: Option<String>,
    pub stack: Option<String>,
    pub business_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_new_titleizes_empty_string_as_none() {
        let note = Note::new(LocalId::new(), "   ", "body");
        assert_eq!(note.title, None);
    }

    #[test]
    fn note_new_sets_dirty_and_local() {
        let note = Note::new(LocalId::new(), "Title", "body");
        assert!(note.is_dirty);
        assert!(note.is_local);
        assert!(note.active);
    }

    #[test]
    fn resource_body_size_matches_body_detects_mismatch() {
        let mut body = ResourceBody::new(b"hello".to_vec(), b"hash".to_vec());
        assert!(body.size_matches_body());
        body.size = 999;
        assert!(!body.size_matches_body());
    }

    #[test]
    fn note_plain_text_strips_markup() {
        let note = Note::new(LocalId::new(), "t", "<en-note>Hello <b>World</b></en-note>");
        assert_eq!(note.plain_text(), "Hello World");
    }

    #[test]
    fn note_list_of_words_lowercases_and_splits() {
        let note = Note::new(LocalId::new(), "t", "Hello  World");
        assert_eq!(note.list_of_words(), vec!["hello", "world"]);
    }

    #[test]
    fn notebook_is_from_linked_notebook() {
        let mut notebook = Notebook::new("Personal");
        assert!(!notebook.is_from_linked_notebook());
        notebook.linked_notebook_guid = Some(Guid::from_uuid(uuid::Uuid::new_v4()));
        assert!(notebook.is_from_linked_notebook());
    }
}
