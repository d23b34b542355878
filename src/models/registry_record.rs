use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry cache entry (spec §3), modeled on the Czech ARES economic
/// subjects registry (`original_source/backend/ares_client.py`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub registration_id: String,
    pub name: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub active: bool,
    pub tax_registered: bool,
    pub fetched_at: DateTime<Utc>,
}

impl RegistryRecord {
    pub fn is_expired(&self, ttl: chrono::Duration) -> bool {
        Utc::now() - self.fetched_at > ttl
    }
}
