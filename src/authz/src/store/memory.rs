//! In-memory profile store

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use super::{ProfileStore, ProfileUpdate, UncheckedProfileReader};
use crate::error::{AuthzError, Result};
use crate::resolver::TrustBoundary;
use crate::types::{ActorId, Profile, Role, RoleGrant};

/// Thread-safe in-memory profile table
#[derive(Clone, Default)]
pub struct InMemoryProfileStore {
    profiles: Arc<DashMap<ActorId, Profile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table with existing rows
    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let store = Self::new();
        for profile in profiles {
            store.profiles.insert(profile.actor_id.clone(), profile);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    fn update<F>(&self, actor: &ActorId, mutate: F) -> Result<Profile>
    where
        F: FnOnce(&mut Profile),
    {
        let mut row = self
            .profiles
            .get_mut(actor)
            .ok_or_else(|| AuthzError::ProfileNotFound(actor.to_string()))?;
        mutate(row.value_mut());
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, actor: &ActorId) -> Result<Option<Profile>> {
        Ok(self.profiles.get(actor).map(|row| row.clone()))
    }

    async fn provision(&self, profile: Profile) -> Result<bool> {
        match self.profiles.entry(profile.actor_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(profile);
                Ok(true)
            }
        }
    }

    async fn set_role(&self, actor: &ActorId, role: Role) -> Result<Profile> {
        self.update(actor, |row| row.role = role)
    }

    async fn set_enabled(&self, actor: &ActorId, enabled: bool) -> Result<Profile> {
        self.update(actor, |row| row.enabled = enabled)
    }

    async fn update_if_at_most(&self, actor: &ActorId, ceiling: Role, update: ProfileUpdate) -> Result<Profile> {
        // The shard stays write-locked from the check through the write.
        let mut row = self
            .profiles
            .get_mut(actor)
            .ok_or_else(|| AuthzError::ProfileNotFound(actor.to_string()))?;
        if row.role > ceiling {
            return Err(AuthzError::Forbidden(format!(
                "{} cannot modify a {} profile",
                ceiling, row.role
            )));
        }

        match update {
            ProfileUpdate::Role(role) => row.role = role,
            ProfileUpdate::Enabled(enabled) => row.enabled = enabled,
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[async_trait]
impl UncheckedProfileReader for InMemoryProfileStore {
    async fn read_grant_unchecked(
        &self,
        _boundary: &TrustBoundary,
        actor: &ActorId,
    ) -> Result<Option<RoleGrant>> {
        Ok(self.profiles.get(actor).map(|row| row.grant()))
    }
}
