//! Channel id allocation

use std::num::NonZeroU32;

use super::OutputError;

/// Opaque id of a bound output channel
///
/// Never zero; zero is reserved for "unbound" on the backend side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(NonZeroU32);

impl ChannelId {
    /// Raw value, always nonzero
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Rebuild an id from a raw value; zero yields `None`
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// Hands out channel ids for sensor outputs
///
/// Ids start at 1 and increase strictly; none is ever handed out twice.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    last: u32,
}

impl SensorRegistry {
    /// Create a registry that has handed out nothing yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next channel id
    pub fn next_channel_id(&mut self) -> Result<ChannelId, OutputError> {
        let next = self.last.checked_add(1).ok_or(OutputError::ChannelsExhausted)?;
        let id = ChannelId::from_raw(next).ok_or(OutputError::ChannelsExhausted)?;
        self.last = next;
        Ok(id)
    }

    /// Number of ids handed out so far
    pub const fn allocated(&self) -> u32 {
        self.last
    }
}
