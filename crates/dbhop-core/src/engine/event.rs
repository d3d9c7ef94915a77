use serde::Serialize;

/// The process whose countdown expires first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The electron at `source` leaves for another site or a channel.
    Hop { source: usize },
    /// The electrons at `sources` move together; `pair` indexes the cohop table.
    Cohop { pair: usize, sources: (usize, usize) },
    /// The channel at index `channel` injects an electron.
    ChannelPop { channel: usize },
}

/// The concrete charge movement produced by applying an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Transition {
    Hop { source: usize, target: usize },
    Exit { source: usize },
    Cohop {
        sources: (usize, usize),
        targets: (usize, usize),
    },
    Inject { channel: usize, target: usize },
}

impl Transition {
    /// Change in the number of electrons on the surface.
    pub fn population_change(&self) -> i32 {
        match self {
            Self::Exit { .. } => -1,
            Self::Inject { .. } => 1,
            Self::Hop { .. } | Self::Cohop { .. } => 0,
        }
    }
}
