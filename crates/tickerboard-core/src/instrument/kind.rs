use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Closed set of instrument classes tracked by the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Equity,
    Crypto,
    ForexPair,
}

impl InstrumentKind {
    pub const ALL: [Self; 3] = [Self::Equity, Self::Crypto, Self::ForexPair];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equity => "equity",
            Self::Crypto => "crypto",
            Self::ForexPair => "forex_pair",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Equity => "Stock",
            Self::Crypto => "Crypto",
            Self::ForexPair => "Forex",
        }
    }

    /// Whether prices are shown in the display currency. A forex pair is
    /// already a rate and is never converted.
    pub const fn converts_currency(self) -> bool {
        matches!(self, Self::Equity | Self::Crypto)
    }
}

impl Display for InstrumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
