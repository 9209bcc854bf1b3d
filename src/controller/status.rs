//! Human-readable controller status

use std::fmt;

/// Width of the volume bar in the status line
const BAR_WIDTH: usize = 30;

/// Whether the mixer has been heard from yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No feedback decoded so far (initial)
    AwaitingFeedback,
    /// At least one feedback message decoded; never reverts
    Confirmed,
}

/// Approximate dB reading for display
///
/// Not a calibrated audio taper: a linear approximation anchored at the
/// unity-gain constant, kept identical to what operators already know.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApproxDb {
    /// Fader fully down
    Silent,
    Db(f32),
}

impl ApproxDb {
    /// `20 * (level - unity) / unity * 3`, or `Silent` at zero
    pub fn from_level(level: f32, unity_gain: f32) -> Self {
        if level <= 0.0 {
            ApproxDb::Silent
        } else {
            ApproxDb::Db(20.0 * (level - unity_gain) / unity_gain * 3.0)
        }
    }
}

impl fmt::Display for ApproxDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApproxDb::Silent => f.write_str("-∞ dB"),
            ApproxDb::Db(db) => write!(f, "{:+.1} dB", db),
        }
    }
}

/// Snapshot rendered by the display sink
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub level: f32,
    pub db: ApproxDb,
    pub muted: bool,
    pub dimmed: bool,
    pub connection: ConnectionStatus,
}

impl StatusLine {
    /// Volume bar, `█` for the filled part
    pub fn bar(&self) -> String {
        let filled = ((self.level * BAR_WIDTH as f32) as usize).min(BAR_WIDTH);
        format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
    }

    /// Level as a percentage with one decimal
    pub fn percent(&self) -> String {
        format!("{:.1}%", self.level * 100.0)
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Volume: [{}] {} (~{})", self.bar(), self.percent(), self.db)?;
        if self.muted {
            f.write_str("  MUTED")?;
        }
        if self.dimmed {
            f.write_str("  DIM")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNITY: f32 = 0.7197;

    #[test]
    fn test_unity_reads_zero_db() {
        assert_eq!(ApproxDb::from_level(UNITY, UNITY).to_string(), "+0.0 dB");
    }

    #[test]
    fn test_zero_level_is_silent() {
        assert_eq!(ApproxDb::from_level(0.0, UNITY), ApproxDb::Silent);
        assert_eq!(ApproxDb::Silent.to_string(), "-∞ dB");
    }

    #[test]
    fn test_formula_is_kept_verbatim() {
        // 20 * (0.5 - 0.7197) / 0.7197 * 3 = -18.316
        match ApproxDb::from_level(0.5, UNITY) {
            ApproxDb::Db(db) => assert!((db - (-18.316)).abs() < 1e-3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ApproxDb::from_level(1.0, UNITY).to_string(), "+23.4 dB");
    }

    #[test]
    fn test_status_line_render() {
        let status = StatusLine {
            level: 0.5,
            db: ApproxDb::from_level(0.5, UNITY),
            muted: true,
            dimmed: false,
            connection: ConnectionStatus::AwaitingFeedback,
        };
        let line = status.to_string();
        assert!(line.starts_with("Volume: ["));
        assert!(line.contains("50.0%"));
        assert!(line.contains("(~-18.3 dB)"));
        assert!(line.ends_with("MUTED"));
        assert_eq!(status.bar().chars().filter(|&c| c == '█').count(), 15);
        assert_eq!(status.bar().chars().count(), BAR_WIDTH);
    }
}
