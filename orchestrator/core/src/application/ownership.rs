// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! Ownership guard for user-facing operations.

use crate::domain::error::OrchestratorError;
use crate::domain::guild::{Guild, GuildId, UserId};
use crate::domain::repository::GuildRepository;

/// Load the guild and verify the caller owns it.
///
/// Side-effect free; every user-facing operational command passes
/// through this first.
pub async fn verify_ownership(
    guilds: &dyn GuildRepository,
    user_id: &UserId,
    guild_id: &GuildId,
) -> Result<Guild, OrchestratorError> {
    let guild = guilds
        .find_by_id(guild_id)
        .await?
        .ok_or_else(|| OrchestratorError::NotFound(format!("guild {} not found", guild_id)))?;

    if &guild.owner_user_id != user_id {
        return Err(OrchestratorError::PermissionDenied(format!(
            "user {} does not own guild {}",
            user_id, guild_id
        )));
    }

    Ok(guild)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::guild::Tier;
    use crate::infrastructure::repositories::memory::InMemoryGuildRepository;
    use chrono::Utc;

    #[tokio::test]
    async fn rejects_unknown_guild() {
        let repo = InMemoryGuildRepository::default();
        let err = verify_ownership(&repo, &UserId::new("u1"), &GuildId::new("g1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_non_owner() {
        let repo = InMemoryGuildRepository::default();
        let guild = Guild::new(
            GuildId::new("g1"),
            UserId::new("owner"),
            Tier::Free,
            Utc::now(),
        );
        repo.save(&guild).await.unwrap();

        let err = verify_ownership(&repo, &UserId::new("intruder"), &GuildId::new("g1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn passes_owner_through() {
        let repo = InMemoryGuildRepository::default();
        let guild = Guild::new(
            GuildId::new("g1"),
            UserId::new("owner"),
            Tier::Free,
            Utc::now(),
        );
        repo.save(&guild).await.unwrap();

        let loaded = verify_ownership(&repo, &UserId::new("owner"), &GuildId::new("g1"))
            .await
            .expect("owner allowed");
        assert_eq!(loaded.id, guild.id);
    }
}
