//! Everything users see: plain-text notices and Discord embeds.

pub mod embeds;
pub mod messages;
