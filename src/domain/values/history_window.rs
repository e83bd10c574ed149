use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Longest accepted `Since` window: one hundred years.
pub const MAX_WINDOW_SECS: u64 = 100 * 366 * 86_400;

/// How much history the grouping query feeds to the pricing engine.
///
/// Samples accumulate without bound, so the window is always chosen
/// explicitly by configuration rather than implied by the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistoryWindow {
    /// Every sample ever recorded.
    #[default]
    All,
    /// Only the newest sample of each retailer.
    LatestPerRetailer,
    /// Samples observed within the last `n` seconds.
    Since { seconds: u64 },
}

impl HistoryWindow {
    pub fn since_hours(hours: u64) -> Self {
        HistoryWindow::Since {
            seconds: hours.saturating_mul(3600).min(MAX_WINDOW_SECS),
        }
    }

    /// Oldest timestamp inside the window. A window reaching back past the
    /// representable range has no cutoff.
    pub fn cutoff(&self, now: chrono::DateTime<chrono::Utc>) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            HistoryWindow::Since { seconds } => i64::try_from(*seconds)
                .ok()
                .and_then(chrono::TimeDelta::try_seconds)
                .and_then(|span| now.checked_sub_signed(span)),
            _ => None,
        }
    }
}

impl fmt::Display for HistoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryWindow::All => write!(f, "all"),
            HistoryWindow::LatestPerRetailer => write!(f, "latest"),
            HistoryWindow::Since { seconds } if seconds % 86400 == 0 => {
                write!(f, "{}d", seconds / 86400)
            }
            HistoryWindow::Since { seconds } if seconds % 3600 == 0 => {
                write!(f, "{}h", seconds / 3600)
            }
            HistoryWindow::Since { seconds } => write!(f, "{seconds}s"),
        }
    }
}

impl FromStr for HistoryWindow {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "all" => return Ok(HistoryWindow::All),
            "latest" => return Ok(HistoryWindow::LatestPerRetailer),
            _ => {}
        }
        if !s.is_ascii() {
            return Err(format!("Invalid history window: {s}"));
        }
        let (num, unit) = s.split_at(s.len().saturating_sub(1));
        let n: u64 = num
            .parse()
            .map_err(|_| format!("Invalid history window: {s}. Use all, latest, <n>h or <n>d"))?;
        if n == 0 {
            return Err(format!("History window must be positive: {s}"));
        }
        let unit_secs: u64 = match unit {
            "h" => 3600,
            "d" => 86400,
            _ => {
                return Err(format!(
                    "Invalid history window unit: {s}. Use all, latest, <n>h or <n>d"
                ))
            }
        };
        match n.checked_mul(unit_secs) {
            Some(seconds) if seconds <= MAX_WINDOW_SECS => Ok(HistoryWindow::Since { seconds }),
            _ => Err(format!("History window too large: {s}")),
        }
    }
}
