//! Pairs players into matches.
//!
//! Joins are serialized through a single lock so two players arriving at the
//! same time cannot both open a fresh match while an older one has a free
//! seat. Waiting matches are filled oldest first.

use crate::config::GameConfig;
use crate::error::GameError;
use crate::game::Match;
use crate::registry::SessionRegistry;
use log::{debug, info};
use rand::Rng;
use shared::{MatchStatus, Slot};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub match_id: String,
    pub slot: Slot,
    /// True when this join filled the match and play began.
    pub started: bool,
    /// True when the player was already seated in the match.
    pub rejoined: bool,
    /// State right after the join, captured under the match lock.
    pub game: Match,
}

pub struct Matchmaker {
    registry: Arc<SessionRegistry>,
    config: GameConfig,
    join_lock: Mutex<()>,
}

impl Matchmaker {
    pub fn new(registry: Arc<SessionRegistry>, config: GameConfig) -> Self {
        Self {
            registry,
            config,
            join_lock: Mutex::new(()),
        }
    }

    /// Seats the player in the oldest waiting match, or in a new one.
    ///
    /// A player already seated in an unfinished match gets that match back.
    pub async fn join(&self, player_id: &str, name: &str) -> Result<JoinOutcome, GameError> {
        let _guard = self.join_lock.lock().await;

        if let Some(match_id) = self.registry.find_match_of(player_id).await {
            debug!("Player {} is already seated in match {}", player_id, match_id);
            return self.admit(&match_id, player_id, name).await;
        }

        for match_id in self.registry.waiting_matches().await {
            match self.admit(&match_id, player_id, name).await {
                Ok(outcome) => return Ok(outcome),
                // Filled or discarded since the scan; try the next one
                Err(GameError::MatchFull(_)) | Err(GameError::MatchNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let match_id = self.registry.create().await;
        info!("No open match for {}, opened {}", player_id, match_id);
        self.admit(&match_id, player_id, name).await
    }

    /// Seats the player in a specific match.
    pub async fn join_match(
        &self,
        match_id: &str,
        player_id: &str,
        name: &str,
    ) -> Result<JoinOutcome, GameError> {
        let _guard = self.join_lock.lock().await;
        self.admit(match_id, player_id, name).await
    }

    async fn admit(
        &self,
        match_id: &str,
        player_id: &str,
        name: &str,
    ) -> Result<JoinOutcome, GameError> {
        let opener = self.pick_opener();
        let action_points = self.config.action_points_per_turn;

        self.registry
            .mutate(match_id, |game| {
                let admission = game.admit_player(player_id, name)?;

                let started = admission.newly_admitted
                    && game.is_full()
                    && game.status() == MatchStatus::WaitingForPlayers;
                if started {
                    game.start(opener, action_points)?;
                }

                Ok(JoinOutcome {
                    match_id: match_id.to_string(),
                    slot: admission.slot,
                    started,
                    rejoined: !admission.newly_admitted,
                    game: game.clone(),
                })
            })
            .await
    }

    fn pick_opener(&self) -> usize {
        if self.config.random_turn_order {
            rand::thread_rng().gen_range(0..shared::MAX_PLAYERS)
        } else {
            0
        }
    }
}
