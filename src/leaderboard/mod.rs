//! Leaderboard operations over a single named sorted set.
//!
//! Scores only ever move by relative adjustment. Every operation is one call
//! against the store, so atomicity is whatever a single store call provides.

use clap::ValueEnum;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::db::models::{IncrMode, IncrOutcome, ScoredMember};
use crate::db::SortedSet;

/// Number of entries served by the top list route.
pub const TOP_LIST_LEN: usize = 10;

/// What `remove_score` does when the player has never scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MissingPlayerPolicy {
    /// Leave the board untouched and report the player as unknown
    Reject,
    /// Create the player at the negated amount
    Create,
}

/// Policy used when none is configured.
pub const DEFAULT_MISSING_PLAYER_POLICY: MissingPlayerPolicy = MissingPlayerPolicy::Reject;

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("player name must not be empty")]
    EmptyPlayer,
    #[error("score must be a finite number, got {0}")]
    NonFiniteScore(f64),
    #[error("points to remove must not be negative, got {0}")]
    NegativeRemoval(f64),
    #[error("position must be 1 or greater, got {0}")]
    InvalidPosition(i64),
    #[error("player {0} does not exist")]
    UnknownPlayer(String),
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// A score change that was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub player: String,
    pub delta: f64,
    /// Score after the change
    pub score: f64,
    /// True when this call created the player
    pub created: bool,
}

/// Result of looking up a 1-based rank.
#[derive(Debug, Clone, PartialEq)]
pub enum RankLookup {
    Found {
        player: String,
        position: i64,
        score: f64,
    },
    NotFound {
        position: i64,
    },
}

#[derive(Clone)]
pub struct Leaderboard {
    store: Arc<dyn SortedSet>,
    name: String,
    missing_player_policy: MissingPlayerPolicy,
}

impl Leaderboard {
    pub fn new(
        store: Arc<dyn SortedSet>,
        name: impl Into<String>,
        missing_player_policy: MissingPlayerPolicy,
    ) -> Self {
        Self {
            store,
            name: name.into(),
            missing_player_policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add `delta` points to `player`, creating the player if needed.
    ///
    /// Negative deltas are accepted here as well.
    pub async fn add_score(
        &self,
        player: &str,
        delta: f64,
    ) -> Result<ScoreUpdate, LeaderboardError> {
        validate_player(player)?;
        validate_delta(delta)?;

        let outcome = self
            .store
            .incr(&self.name, player, delta, IncrMode::Upsert)
            .await?;
        debug!(player, delta, ?outcome, "add_score");
        into_update(player, delta, outcome)
    }

    /// Take `amount` points away from `player`.
    ///
    /// An unknown player is handled according to the configured
    /// [`MissingPlayerPolicy`].
    pub async fn remove_score(
        &self,
        player: &str,
        amount: f64,
    ) -> Result<ScoreUpdate, LeaderboardError> {
        validate_player(player)?;
        validate_delta(amount)?;
        if amount < 0.0 {
            return Err(LeaderboardError::NegativeRemoval(amount));
        }

        let mode = match self.missing_player_policy {
            MissingPlayerPolicy::Reject => IncrMode::ExistingOnly,
            MissingPlayerPolicy::Create => IncrMode::Upsert,
        };
        let outcome = self.store.incr(&self.name, player, -amount, mode).await?;
        debug!(player, amount, ?outcome, "remove_score");
        into_update(player, amount, outcome)
    }

    /// Highest `n` players, best first. Fewer than `n` players returns them all.
    pub async fn top(&self, n: usize) -> Result<Vec<ScoredMember>, LeaderboardError> {
        Ok(self.store.rev_range(&self.name, 0, n).await?)
    }

    /// Player holding the 1-based `position` in descending score order.
    pub async fn player_at(&self, position: i64) -> Result<RankLookup, LeaderboardError> {
        if position < 1 {
            return Err(LeaderboardError::InvalidPosition(position));
        }
        let rank = usize::try_from(position - 1)
            .map_err(|_| LeaderboardError::InvalidPosition(position))?;

        let found = self.store.rev_range(&self.name, rank, 1).await?;
        Ok(match found.into_iter().next() {
            Some(entry) => RankLookup::Found {
                player: entry.member,
                position,
                score: entry.score,
            },
            None => RankLookup::NotFound { position },
        })
    }
}

fn validate_player(player: &str) -> Result<(), LeaderboardError> {
    if player.is_empty() {
        return Err(LeaderboardError::EmptyPlayer);
    }
    Ok(())
}

fn validate_delta(delta: f64) -> Result<(), LeaderboardError> {
    if !delta.is_finite() {
        return Err(LeaderboardError::NonFiniteScore(delta));
    }
    Ok(())
}

fn into_update(
    player: &str,
    delta: f64,
    outcome: IncrOutcome,
) -> Result<ScoreUpdate, LeaderboardError> {
    let (score, created) = match outcome {
        IncrOutcome::Created { score } => (score, true),
        IncrOutcome::Updated { score } => (score, false),
        IncrOutcome::Missing => return Err(LeaderboardError::UnknownPlayer(player.to_string())),
    };
    Ok(ScoreUpdate {
        player: player.to_string(),
        delta,
        score,
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use anyhow::anyhow;
    use approx::assert_relative_eq;
    use async_trait::async_trait;

    fn board(policy: MissingPlayerPolicy) -> Leaderboard {
        let db = Database::open(":memory:").expect("in-memory sqlite");
        Leaderboard::new(Arc::new(db), "scorezset", policy)
    }

    /// Store whose every call fails, as if the engine went away.
    struct BrokenStore;

    #[async_trait]
    impl SortedSet for BrokenStore {
        async fn incr(
            &self,
            _key: &str,
            _member: &str,
            _delta: f64,
            _mode: IncrMode,
        ) -> anyhow::Result<IncrOutcome> {
            Err(anyhow!("connection refused"))
        }

        async fn rev_range(
            &self,
            _key: &str,
            _offset: usize,
            _limit: usize,
        ) -> anyhow::Result<Vec<ScoredMember>> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_add_twice_accumulates() {
        let lb = board(MissingPlayerPolicy::Reject);
        let first = lb.add_score("alice", 50.0).await.unwrap();
        assert!(first.created);
        let second = lb.add_score("alice", 25.0).await.unwrap();
        assert!(!second.created);
        assert_relative_eq!(second.score, 75.0);

        let top = lb.top(1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].member, "alice");
        assert_relative_eq!(top[0].score, 75.0);
    }

    #[tokio::test]
    async fn test_add_then_remove_restores_score() {
        let lb = board(MissingPlayerPolicy::Reject);
        lb.add_score("carol", 12.5).await.unwrap();
        lb.add_score("carol", 40.25).await.unwrap();
        let updated = lb.remove_score("carol", 40.25).await.unwrap();
        assert_relative_eq!(updated.score, 12.5, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_remove_to_zero_keeps_player_listed() {
        let lb = board(MissingPlayerPolicy::Reject);
        lb.add_score("bob", 10.0).await.unwrap();
        lb.remove_score("bob", 10.0).await.unwrap();

        let top = lb.top(TOP_LIST_LEN).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].member, "bob");
        assert_relative_eq!(top[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_add_zero_is_idempotent() {
        let lb = board(MissingPlayerPolicy::Reject);
        lb.add_score("dave", 7.0).await.unwrap();
        for _ in 0..3 {
            lb.add_score("dave", 0.0).await.unwrap();
        }
        let top = lb.top(TOP_LIST_LEN).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_relative_eq!(top[0].score, 7.0);
    }

    #[tokio::test]
    async fn test_negative_add_is_allowed() {
        let lb = board(MissingPlayerPolicy::Reject);
        let update = lb.add_score("erin", -3.0).await.unwrap();
        assert!(update.created);
        assert_relative_eq!(update.score, -3.0);
    }

    #[tokio::test]
    async fn test_remove_unknown_player_rejected() {
        let lb = board(MissingPlayerPolicy::Reject);
        let err = lb.remove_score("ghost", 5.0).await.unwrap_err();
        assert!(matches!(err, LeaderboardError::UnknownPlayer(ref p) if p == "ghost"));
        assert!(lb.top(TOP_LIST_LEN).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_player_created_when_allowed() {
        let lb = board(MissingPlayerPolicy::Create);
        let update = lb.remove_score("ghost", 5.0).await.unwrap();
        assert!(update.created);
        assert_relative_eq!(update.score, -5.0);
    }

    #[tokio::test]
    async fn test_invalid_inputs_rejected() {
        let lb = board(MissingPlayerPolicy::Reject);
        assert!(matches!(
            lb.add_score("", 1.0).await,
            Err(LeaderboardError::EmptyPlayer)
        ));
        assert!(matches!(
            lb.add_score("a", f64::NAN).await,
            Err(LeaderboardError::NonFiniteScore(_))
        ));
        assert!(matches!(
            lb.remove_score("a", -1.0).await,
            Err(LeaderboardError::NegativeRemoval(_))
        ));
        assert!(matches!(
            lb.player_at(0).await,
            Err(LeaderboardError::InvalidPosition(0))
        ));
        assert!(matches!(
            lb.player_at(-4).await,
            Err(LeaderboardError::InvalidPosition(-4))
        ));
    }

    #[tokio::test]
    async fn test_top_is_non_increasing() {
        let lb = board(MissingPlayerPolicy::Reject);
        for (i, name) in ["p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8", "p9", "p10", "p11", "p12"]
            .iter()
            .enumerate()
        {
            let delta = ((i * 37) % 11) as f64 - 4.0;
            lb.add_score(name, delta).await.unwrap();
        }
        let top = lb.top(TOP_LIST_LEN).await.unwrap();
        assert_eq!(top.len(), TOP_LIST_LEN);
        assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_empty_board() {
        let lb = board(MissingPlayerPolicy::Reject);
        assert!(lb.top(TOP_LIST_LEN).await.unwrap().is_empty());
        assert_eq!(
            lb.player_at(1).await.unwrap(),
            RankLookup::NotFound { position: 1 }
        );
    }

    #[tokio::test]
    async fn test_player_at_position() {
        let lb = board(MissingPlayerPolicy::Reject);
        lb.add_score("a", 100.0).await.unwrap();
        lb.add_score("b", 90.0).await.unwrap();
        lb.add_score("c", 80.0).await.unwrap();

        match lb.player_at(2).await.unwrap() {
            RankLookup::Found { player, position, .. } => {
                assert_eq!(player, "b");
                assert_eq!(position, 2);
            }
            other => panic!("Expected Found, got {:?}", other),
        }

        assert_eq!(
            lb.player_at(4).await.unwrap(),
            RankLookup::NotFound { position: 4 }
        );
    }

    #[tokio::test]
    async fn test_first_position_matches_top_entry() {
        let lb = board(MissingPlayerPolicy::Reject);
        lb.add_score("x", 3.0).await.unwrap();
        lb.add_score("y", 9.0).await.unwrap();
        lb.add_score("z", 9.0).await.unwrap();

        let top = lb.top(1).await.unwrap();
        match lb.player_at(1).await.unwrap() {
            RankLookup::Found { player, .. } => assert_eq!(player, top[0].member),
            other => panic!("Expected Found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_typed_and_never_overwrites() {
        let lb = Leaderboard::new(Arc::new(BrokenStore), "scorezset", MissingPlayerPolicy::Reject);
        assert!(matches!(
            lb.add_score("alice", 1.0).await,
            Err(LeaderboardError::Store(_))
        ));
        assert!(matches!(
            lb.remove_score("alice", 1.0).await,
            Err(LeaderboardError::Store(_))
        ));
        assert!(matches!(lb.top(10).await, Err(LeaderboardError::Store(_))));
        assert!(matches!(lb.player_at(1).await, Err(LeaderboardError::Store(_))));
    }
}
