/*
 * Responsibility
 * - Users request/response DTOs (camelCase on the wire, same as the backend)
 * - field presence is checked by deserialization; everything else is the backend's call
 */
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub auth0_user_id: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    #[serde(default)]
    pub bio: Option<String>,
}

/// User record as returned by the backend.
///
/// Successful backend bodies are relayed byte-for-byte; this type only
/// checks they have the expected shape. Only `id` is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    #[serde(default)]
    pub auth0_user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub creation_date: Option<CreationDate>,
    #[serde(default)]
    pub role: Option<String>,
}

/// The backend serializes dates either as epoch milliseconds or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreationDate {
    EpochMillis(i64),
    Text(String),
}
