use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Received,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Received => "Received",
            Status::InProgress => "In Progress",
            Status::Resolved => "Resolved",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown grievance status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    /// Accepts the wire spelling plus `InProgress`/`in-progress`/`in_progress`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "received" => Ok(Status::Received),
            "inprogress" => Ok(Status::InProgress),
            "resolved" => Ok(Status::Resolved),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        };

        f.write_str(name)
    }
}

/// Governance tier currently owning an unresolved grievance.
///
/// 0 is the Gram Panchayat, 1 the Block Panchayat, 2 the District/Zila Parishad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EscalationLevel(pub u8);

impl EscalationLevel {
    pub const GRAM_PANCHAYAT: Self = Self(0);
    pub const BLOCK_PANCHAYAT: Self = Self(1);
    pub const ZILA_PARISHAD: Self = Self(2);

    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "Gram Panchayat",
            1 => "Block Panchayat",
            2 => "District/Zila Parishad",
            _ => "Not Escalated",
        }
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grievance {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: Priority,
    pub category: String,
    pub created_at: Option<NaiveDateTime>,
    pub submitted_by: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub is_overdue: bool,
    #[serde(default)]
    pub report_count: u32,
    #[serde(default)]
    pub escalation_level: EscalationLevel,
}

impl Grievance {
    /// Both coordinates are required for a usable location.
    pub fn location(&self) -> Option<Location> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Location { lat, lng }),
            _ => None,
        }
    }
}

impl Entity for Grievance {
    fn id(&self) -> i64 {
        self.id
    }

    fn created_at(&self) -> Option<NaiveDateTime> {
        self.created_at
    }
}

/// Owner edit of an existing grievance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrievanceEdit {
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKEND_JSON: &str = r#"{
        "id": 7,
        "title": "Broken hand pump",
        "description": "The pump near the school has no handle",
        "status": "In Progress",
        "priority": "High",
        "category": "Water",
        "createdAt": "2025-03-01T09:30:00.123456",
        "submittedBy": "villager",
        "latitude": 12.97,
        "longitude": 77.59,
        "fileUrl": "/uploads/pump.jpg",
        "isOverdue": true,
        "reportCount": 1,
        "escalationLevel": 1
    }"#;

    #[test]
    fn test_backend_payload() {
        let grievance: Grievance = serde_json::from_str(BACKEND_JSON).unwrap();

        assert_eq!(grievance.id, 7);
        assert_eq!(grievance.status, Status::InProgress);
        assert_eq!(grievance.priority, Priority::High);
        assert!(grievance.is_overdue);
        assert_eq!(grievance.escalation_level, EscalationLevel::BLOCK_PANCHAYAT);
        assert_eq!(
            grievance.location(),
            Some(Location {
                lat: 12.97,
                lng: 77.59
            })
        );
        assert_eq!(
            grievance.created_at.unwrap().to_string(),
            "2025-03-01 09:30:00.123456"
        );
    }

    #[test]
    fn test_optional_fields_missing() {
        let grievance: Grievance = serde_json::from_str(
            r#"{"id":1,"title":"t","description":"d","status":"Received","priority":"Medium",
                "category":"Roads","createdAt":null,"submittedBy":"a","latitude":null}"#,
        )
        .unwrap();

        assert_eq!(grievance.created_at, None);
        assert_eq!(grievance.location(), None);
        assert_eq!(grievance.escalation_level, EscalationLevel::GRAM_PANCHAYAT);
        assert_eq!(grievance.report_count, 0);
    }

    #[test]
    fn test_status_wire_spelling() {
        let json = serde_json::to_string(&StatusChange {
            status: Status::InProgress,
        })
        .unwrap();

        assert_eq!(json, r#"{"status":"In Progress"}"#);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Resolved".parse(), Ok(Status::Resolved));
        assert_eq!("in-progress".parse(), Ok(Status::InProgress));
        assert_eq!("In Progress".parse(), Ok(Status::InProgress));
        assert_eq!("RECEIVED".parse(), Ok(Status::Received));
        assert_eq!(
            "closed".parse::<Status>(),
            Err(ParseStatusError("closed".to_string()))
        );
    }

    #[test]
    fn test_escalation_names() {
        assert_eq!(EscalationLevel(0).name(), "Gram Panchayat");
        assert_eq!(EscalationLevel(1).name(), "Block Panchayat");
        assert_eq!(EscalationLevel(2).name(), "District/Zila Parishad");
        assert_eq!(EscalationLevel(9).name(), "Not Escalated");
    }
}
