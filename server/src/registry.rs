//! Concurrency-safe store of every live match.
//!
//! The outer map lock is held only long enough to find or insert an entry.
//! Each match sits behind its own lock, so mutating one match never blocks
//! another. `mutate` is the only way to change a match: the closure runs on
//! a draft copy that is committed only when it returns `Ok`, so a failed
//! mutation leaves the stored match exactly as it was.

use crate::config::GameConfig;
use crate::error::GameError;
use crate::game::Match;
use crate::grid::Grid;
use log::info;
use rand::Rng;
use shared::{MatchStatus, MatchSummary};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

type SharedMatch = Arc<RwLock<Match>>;

/// Every match the server knows about, keyed by match id
///
/// Matches are never discarded: a finished match stays so that late actions
/// against it are answered with `WrongTurn` rather than `MatchNotFound`.
pub struct SessionRegistry {
    matches: RwLock<HashMap<String, SharedMatch>>,
    next_sequence: AtomicU64,
    grid: Grid,
}

impl SessionRegistry {
    /// Creates an empty registry whose matches are laid out on the grid
    /// described by `config`.
    pub fn new(config: &GameConfig) -> Self {
        Self {
            matches: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(1),
            grid: Grid::new(config.grid_width, config.grid_height),
        }
    }

    /// Inserts an empty match and returns its freshly generated id.
    pub async fn create(&self) -> String {
        let mut matches = self.matches.write().await;

        let mut match_id = generate_match_id();
        while matches.contains_key(&match_id) {
            match_id = generate_match_id();
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let game = Match::new(match_id.clone(), sequence, self.grid);
        matches.insert(match_id.clone(), Arc::new(RwLock::new(game)));

        info!("Created match {}", match_id);
        match_id
    }

    async fn entry(&self, match_id: &str) -> Result<SharedMatch, GameError> {
        let matches = self.matches.read().await;
        matches
            .get(match_id)
            .cloned()
            .ok_or_else(|| GameError::MatchNotFound(match_id.to_string()))
    }

    /// Returns a consistent copy of the match.
    pub async fn get(&self, match_id: &str) -> Result<Match, GameError> {
        let entry = self.entry(match_id).await?;
        let game = entry.read().await;
        Ok(game.clone())
    }

    /// Applies `mutation` under the match's exclusive lock.
    ///
    /// The closure works on a draft; the stored match is replaced only when
    /// it returns `Ok`. Errors from the closure are passed through unchanged.
    pub async fn mutate<F, R>(&self, match_id: &str, mutation: F) -> Result<R, GameError>
    where
        F: FnOnce(&mut Match) -> Result<R, GameError>,
    {
        let entry = self.entry(match_id).await?;
        let mut game = entry.write().await;

        let mut draft = game.clone();
        let result = mutation(&mut draft)?;
        *game = draft;

        Ok(result)
    }

    /// Summaries of all matches, optionally filtered by status. Order is unspecified.
    pub async fn list(&self, status: Option<MatchStatus>) -> Vec<MatchSummary> {
        let mut summaries = Vec::new();
        for entry in self.entries().await {
            let game = entry.read().await;
            if status.map_or(true, |wanted| game.status() == wanted) {
                summaries.push(game.summary());
            }
        }
        summaries
    }

    /// Ids of matches with a free seat, oldest first.
    pub async fn waiting_matches(&self) -> Vec<String> {
        let mut waiting = Vec::new();
        for entry in self.entries().await {
            let game = entry.read().await;
            if game.status() == MatchStatus::WaitingForPlayers && !game.is_full() {
                waiting.push((game.sequence(), game.id().to_string()));
            }
        }
        waiting.sort();
        waiting.into_iter().map(|(_, id)| id).collect()
    }

    /// Ids of matches currently being played, in no particular order.
    pub async fn in_progress_matches(&self) -> Vec<String> {
        let mut active = Vec::new();
        for entry in self.entries().await {
            let game = entry.read().await;
            if game.status() == MatchStatus::InProgress {
                active.push(game.id().to_string());
            }
        }
        active
    }

    /// The newest unfinished match the player is seated in.
    ///
    /// Used for seating decisions: a player whose match is over is free to
    /// be matched again.
    pub async fn find_match_of(&self, player_id: &str) -> Option<String> {
        self.newest_match_of(player_id, false).await
    }

    /// The newest match the player is seated in, finished or not.
    ///
    /// Used to route actions, so that acting in a match that has ended is
    /// rejected by the match itself.
    pub async fn latest_match_of(&self, player_id: &str) -> Option<String> {
        self.newest_match_of(player_id, true).await
    }

    async fn newest_match_of(&self, player_id: &str, include_finished: bool) -> Option<String> {
        let mut found: Option<(u64, String)> = None;
        for entry in self.entries().await {
            let game = entry.read().await;
            let eligible = include_finished || game.status() != MatchStatus::Finished;
            if eligible && game.contains_player(player_id) {
                let newer = found
                    .as_ref()
                    .map_or(true, |(sequence, _)| game.sequence() > *sequence);
                if newer {
                    found = Some((game.sequence(), game.id().to_string()));
                }
            }
        }
        found.map(|(_, id)| id)
    }

    pub async fn len(&self) -> usize {
        self.matches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.matches.read().await.is_empty()
    }

    /// Clones the entry handles so the map lock is released before any
    /// per-match lock is taken.
    async fn entries(&self) -> Vec<SharedMatch> {
        self.matches.read().await.values().cloned().collect()
    }
}

/// Timestamp plus a random suffix, e.g. `match-1718000000000-3fa2`.
fn generate_match_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    let suffix: u16 = rand::thread_rng().gen();
    format!("match-{}-{:04x}", millis, suffix)
}
