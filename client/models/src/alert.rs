use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::Entity;

/// Administrator broadcast with an optional active window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub severity: String,
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub end_time: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
}

impl Alert {
    /// Open-ended on either side when the bound is missing.
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        self.start_time.map_or(true, |start| start <= now)
            && self.end_time.map_or(true, |end| now <= end)
    }
}

impl Entity for Alert {
    fn id(&self) -> i64 {
        self.id
    }

    fn created_at(&self) -> Option<NaiveDateTime> {
        self.created_at
    }
}

/// Body of an alert create or edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub severity: String,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

impl AlertDraft {
    pub const DEFAULT_CATEGORY: &'static str = "General";
    pub const DEFAULT_SEVERITY: &'static str = "Medium";

    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category: Self::DEFAULT_CATEGORY.to_string(),
            severity: Self::DEFAULT_SEVERITY.to_string(),
            start_time: None,
            end_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn alert(start_time: Option<NaiveDateTime>, end_time: Option<NaiveDateTime>) -> Alert {
        Alert {
            id: 1,
            title: "Water supply cut".to_string(),
            description: "Tank cleaning".to_string(),
            category: "General".to_string(),
            severity: "Medium".to_string(),
            start_time,
            end_time,
            created_at: Some(at(1, 8)),
        }
    }

    #[test]
    fn test_active_window() {
        let windowed = alert(Some(at(2, 9)), Some(at(2, 17)));

        assert!(!windowed.is_active(at(2, 8)));
        assert!(windowed.is_active(at(2, 9)));
        assert!(windowed.is_active(at(2, 17)));
        assert!(!windowed.is_active(at(3, 0)));
    }

    #[test]
    fn test_open_ended_window() {
        assert!(alert(None, None).is_active(at(10, 0)));
        assert!(alert(Some(at(2, 0)), None).is_active(at(20, 0)));
        assert!(!alert(None, Some(at(2, 0))).is_active(at(20, 0)));
    }

    #[test]
    fn test_draft_defaults() {
        let draft = AlertDraft::new("Camp", "Health camp on Sunday");
        let json = serde_json::to_value(&draft).unwrap();

        assert_eq!(json["category"], "General");
        assert_eq!(json["severity"], "Medium");
        assert!(json["startTime"].is_null());
    }
}
