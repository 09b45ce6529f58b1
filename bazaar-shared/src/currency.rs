use serde::{Deserialize, Serialize};

/// Settlement currency. Amounts are always kept in the smallest unit
/// (the rial has no subunit).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    Irr,
    Irt,
}

impl Default for Currency {
    fn default() -> Self {
        Currency::Irr
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Currency::Irr => write!(f, "IRR"),
            Currency::Irt => write!(f, "IRT"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IRR" => Ok(Currency::Irr),
            "IRT" => Ok(Currency::Irt),
            other => Err(format!("unknown currency: {other}")),
        }
    }
}
