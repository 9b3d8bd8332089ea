//! # Audio Module
//!
//! Per-guild playback: queue, state machine, inactivity timers and the
//! registry that owns them.
//!
//! ## Architecture
//!
//! Each guild with activity gets its own player task (see [`player`]). The
//! task owns the guild's [`queue::GuildQueue`], its driver state and its
//! [`idle`] timers, and processes one mailbox message at a time: user
//! commands, transport completions and timer firings all arrive the same
//! way. That makes "two advances at once" impossible rather than unlikely.
//!
//! ### [`registry`] - Guild Registry
//! - Lazily spawns a player per guild, routes commands to it
//! - Resolves play requests *outside* the player so slow lookups never block
//!   other commands
//!
//! ### [`queue`] - Queue Management
//! - FIFO of resolved [`queue::Track`]s plus the current slot
//! - Loop policy (off / track / queue) with fresh re-resolution on replay
//!
//! ### [`transport`] / [`voice`] - Collaborators
//! - Songbird-backed audio output and voice connection, behind traits so the
//!   player can be driven by fakes in tests
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let registry = GuildRegistry::new(deps);
//! let receipt = registry
//!     .enqueue(guild_id, user_id, Some(voice_channel), "lofi hip hop")
//!     .await?;
//! registry.pause(guild_id).await?;
//! registry.skip(guild_id).await?;
//! ```

pub mod idle;
pub mod player;
pub mod queue;
pub mod registry;
pub mod transport;
pub mod voice;


use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};

use crate::sources::ResolverAdapter;

pub use player::{PlaybackState, QueueSnapshot};
pub use registry::{EnqueueReceipt, GuildRegistry};

/// Fire-and-forget announcements (now playing, errors, farewells).
///
/// Failing to deliver a notice never affects playback.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, guild_id: GuildId, message: String);
}

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub default_volume: f32,
    pub idle_timeout: Duration,
    pub alone_timeout: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_volume: 0.5,
            idle_timeout: Duration::from_secs(180),
            alone_timeout: Duration::from_secs(60),
            max_consecutive_failures: 3,
        }
    }
}

/// Collaborators shared by every guild player.
pub struct PlayerDeps {
    pub resolver: Arc<ResolverAdapter>,
    pub transport: Arc<dyn transport::AudioTransport>,
    pub voice: Arc<dyn voice::VoiceConnection>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: PlayerSettings,
}
