use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Display name for defaulting `patient_name` on bookings made for self.
    /// Falls back to the email local part when no name is present in metadata.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.metadata.as_ref()
            .and_then(|m| m.get("full_name"))
            .and_then(|v| v.as_str())
        {
            return name.to_string();
        }

        self.email.as_deref()
            .and_then(|e| e.split('@').next())
            .unwrap_or("Patient")
            .to_string()
    }
}
