use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} `{value}`")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed set of lowercase wire values with `as_str`, `FromStr` and
/// `Display`, matching the serde representation.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ── Users ──

wire_enum!(UserRole, "user role" {
    User => "user",
    Admin => "admin",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
    pub last_login_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRole {
    pub role: UserRole,
}

// ── Reports ──

wire_enum!(
    /// Kind of infrastructure problem being reported.
    ReportType, "report type" {
        Road => "road",
        Electricity => "electricity",
        Waste => "waste",
        Other => "other",
    }
);

wire_enum!(
    /// Where a report sits in its handling lifecycle.
    ///
    /// `Pending` is the initial state; `Resolved` and `Rejected` are terminal.
    ReportStatus, "report status" {
        Pending => "pending",
        InProgress => "in_progress",
        Resolved => "resolved",
        Rejected => "rejected",
    }
);

impl ReportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::Rejected)
    }

    /// Whether an authority may move a report from `self` to `next`.
    ///
    /// Status only moves forward: a pending report is taken up first, and
    /// work in progress ends resolved or rejected.
    pub fn can_transition_to(self, next: ReportStatus) -> bool {
        use ReportStatus::*;

        matches!(
            (self, next),
            (Pending, InProgress) | (InProgress, Resolved) | (InProgress, Rejected)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub description: String,
    pub location: Location,
    pub photo_url: Option<String>,
    pub status: ReportStatus,
    pub user_id: String,
    pub votes: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReport {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub description: String,
    pub location: Location,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Partial edit of a report by its owner. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReport {
    #[serde(rename = "type", default)]
    pub report_type: Option<ReportType>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStatus {
    pub status: ReportStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportStats {
    pub total: i64,
    pub by_status: BTreeMap<ReportStatus, i64>,
    pub by_type: BTreeMap<ReportType, i64>,
}

// ── Votes ──

wire_enum!(VoteType, "vote type" {
    Up => "up",
    Down => "down",
});

impl VoteType {
    /// Contribution of a single vote to a report's count.
    pub fn weight(self) -> i64 {
        match self {
            VoteType::Up => 1,
            VoteType::Down => -1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub report_id: i64,
    pub user_id: String,
    pub vote_type: VoteType,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVote {
    pub vote_type: VoteType,
}

// ── Pagination ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}
