use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recurring scan trigger definition.
///
/// `next_run`, once set, is always at or after the instant it was
/// computed; the scheduler repairs a missing `next_run` on its next
/// tick instead of triggering blindly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledScan {
    pub id: Uuid,
    pub target_url: String,
    pub frequency: Frequency,
    /// Clock time "HH:MM" (24h) at which the scan should fire.
    pub time_of_day: String,
    /// 0 = Sunday .. 6 = Saturday; weekly only.
    pub day_of_week: Option<u32>,
    /// 1..=31; monthly, quarterly and annual schedules.
    pub day_of_month: Option<u32>,
    /// 1..=12; annual schedules only.
    pub month: Option<u32>,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledScan {
    /// Parse `time_of_day` into (hour, minute), falling back to 02:00
    /// on malformed input rather than refusing to schedule.
    pub fn clock_time(&self) -> (u32, u32) {
        let mut parts = self.time_of_day.splitn(2, ':');
        let hour = parts.next().and_then(|p| p.parse().ok()).unwrap_or(2);
        let minute = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        if hour > 23 || minute > 59 {
            (2, 0)
        } else {
            (hour, minute)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annually,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Annually => "annually",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            "quarterly" => Some(Frequency::Quarterly),
            "annually" => Some(Frequency::Annually),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(time_of_day: &str) -> ScheduledScan {
        ScheduledScan {
            id: Uuid::new_v4(),
            target_url: "https://example.com".into(),
            frequency: Frequency::Daily,
            time_of_day: time_of_day.into(),
            day_of_week: None,
            day_of_month: None,
            month: None,
            enabled: true,
            last_run: None,
            next_run: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn clock_time_parses_valid_input() {
        assert_eq!(schedule("14:30").clock_time(), (14, 30));
        assert_eq!(schedule("00:00").clock_time(), (0, 0));
    }

    #[test]
    fn clock_time_falls_back_on_garbage() {
        assert_eq!(schedule("not-a-time").clock_time(), (2, 0));
        assert_eq!(schedule("25:99").clock_time(), (2, 0));
    }
}
