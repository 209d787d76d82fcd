use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::backend::{DataService, Filter, Query};
use crate::constants::{profile_columns, tables};
use crate::models::Profile;

/// Look up one profile. A missing row or a failed lookup yields a placeholder
/// so the inbox can still render the conversation.
pub async fn fetch_profile(service: &dyn DataService, user_id: &str) -> Profile {
    let query = Query::table(tables::PROFILES)
        .filter(Filter::eq(profile_columns::ID, user_id))
        .limit(1);

    let row = match service.query(&query).await {
        Ok(rows) => rows.into_iter().next(),
        Err(e) => {
            warn!(user_id, error = %e, "Profile lookup failed");
            None
        }
    };

    row.and_then(|row| match serde_json::from_value(Value::Object(row)) {
        Ok(profile) => Some(profile),
        Err(e) => {
            warn!(user_id, error = %e, "Malformed profile row");
            None
        }
    })
    .unwrap_or_else(|| Profile::unknown(user_id))
}

/// Profiles resolved during one aggregation pass; each id is fetched once.
#[derive(Debug, Default)]
pub struct ProfileCache {
    profiles: HashMap<String, Profile>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&mut self, service: &dyn DataService, user_id: &str) -> &Profile {
        if !self.profiles.contains_key(user_id) {
            let profile = fetch_profile(service, user_id).await;
            self.profiles.insert(user_id.to_string(), profile);
        }
        &self.profiles[user_id]
    }

    pub fn as_map(&self) -> &HashMap<String, Profile> {
        &self.profiles
    }
}
