//! User model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Identity proven by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable opaque user ID (the Google `sub` claim)
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

/// User profile stored in Firestore.
///
/// Created the first time an identity is proven; never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identity ID (also used as document ID)
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Profile picture URL
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    /// When the user was first seen (RFC 3339)
    pub first_seen: String,
}

impl User {
    /// Build the record stored on first sign-in.
    pub fn first_seen(identity: &Identity, first_seen: String) -> Self {
        Self {
            id: identity.id.clone(),
            display_name: identity.display_name.clone(),
            email: identity.email.clone(),
            photo_url: identity.photo_url.clone(),
            first_seen,
        }
    }
}
