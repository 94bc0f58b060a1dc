pub mod playback;
pub mod track;

use twilight_model::id::Id;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};

pub type GuildId = Id<GuildMarker>;
pub type ChannelId = Id<ChannelMarker>;
pub type UserId = Id<UserMarker>;

pub use playback::{CommandOutcome, PlaybackNotice, PlaybackState, QueueStatus};
pub use track::{ResolvedTrack, TrackRequest};
