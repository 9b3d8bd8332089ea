use serenity::model::id::GuildId;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::audio::player::GuildCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Nothing queued, nothing playing.
    Idle,
    /// No humans left in the bot's voice channel.
    Alone,
}

impl TimerKind {
    fn elapsed(self, token: u64) -> GuildCommand {
        match self {
            TimerKind::Idle => GuildCommand::IdleElapsed { token },
            TimerKind::Alone => GuildCommand::AloneElapsed { token },
        }
    }
}

struct ArmedTimer {
    token: u64,
    cancel: CancellationToken,
}

/// The two inactivity timers of a guild.
///
/// A fired timer only posts `IdleElapsed`/`AloneElapsed` with its token to
/// the guild mailbox. The player calls [`IdleTimers::take`] to check that the
/// token is still the armed one, then re-validates the condition itself.
/// Re-arming or disarming invalidates any firing already in flight.
pub(crate) struct IdleTimers {
    guild_id: GuildId,
    idle_after: Duration,
    alone_after: Duration,
    idle: Option<ArmedTimer>,
    alone: Option<ArmedTimer>,
    issued: u64,
}

impl IdleTimers {
    pub(crate) fn new(guild_id: GuildId, idle_after: Duration, alone_after: Duration) -> Self {
        Self {
            guild_id,
            idle_after,
            alone_after,
            idle: None,
            alone: None,
            issued: 0,
        }
    }

    pub(crate) fn arm(&mut self, kind: TimerKind, mailbox: &mpsc::UnboundedSender<GuildCommand>) {
        self.disarm(kind);
        self.issued += 1;

        let token = self.issued;
        let cancel = CancellationToken::new();
        let delay = match kind {
            TimerKind::Idle => self.idle_after,
            TimerKind::Alone => self.alone_after,
        };

        let cancelled = cancel.clone();
        let mailbox = mailbox.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = mailbox.send(kind.elapsed(token));
                }
            }
        });

        debug!("⏲️ Timer {:?} armado para guild {} ({:?})", kind, self.guild_id, delay);
        *self.slot(kind) = Some(ArmedTimer { token, cancel });
    }

    /// Cancela el timer; devuelve `true` si estaba armado.
    pub(crate) fn disarm(&mut self, kind: TimerKind) -> bool {
        match self.slot(kind).take() {
            Some(timer) => {
                timer.cancel.cancel();
                debug!("⏲️ Timer {:?} cancelado para guild {}", kind, self.guild_id);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Idle => self.idle.is_some(),
            TimerKind::Alone => self.alone.is_some(),
        }
    }

    /// Consumes a firing if `token` is the currently armed one.
    pub(crate) fn take(&mut self, kind: TimerKind, token: u64) -> bool {
        let slot = self.slot(kind);
        if slot.as_ref().is_some_and(|timer| timer.token == token) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        self.disarm(TimerKind::Idle);
        self.disarm(TimerKind::Alone);
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<ArmedTimer> {
        match kind {
            TimerKind::Idle => &mut self.idle,
            TimerKind::Alone => &mut self.alone,
        }
    }
}

impl Drop for IdleTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
