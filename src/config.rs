use clap::Parser;
use std::net::SocketAddr;

use crate::leaderboard::{MissingPlayerPolicy, DEFAULT_MISSING_PLAYER_POLICY};

/// Leaderboard HTTP service
#[derive(Parser, Debug, Clone)]
#[command(name = "scoreboard", version, about)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,

    /// SQLite database path (":memory:" keeps scores for the process lifetime only)
    #[arg(long, env = "DATABASE_PATH", default_value = "scoreboard.db")]
    pub database_path: String,

    /// Name of the sorted set holding the leaderboard
    #[arg(long, env = "LEADERBOARD_NAME", default_value = "scorezset")]
    pub leaderboard_name: String,

    /// What removing points from an unknown player does
    #[arg(
        long,
        env = "MISSING_PLAYER_POLICY",
        value_enum,
        default_value_t = DEFAULT_MISSING_PLAYER_POLICY
    )]
    pub missing_player_policy: MissingPlayerPolicy,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.leaderboard_name.trim().is_empty() {
            anyhow::bail!("leaderboard_name must not be empty");
        }
        if self.database_path.is_empty() {
            anyhow::bail!("database_path must not be empty");
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen_addr {:?}: {}", self.listen_addr, e))
    }
}
