//! The enriched stargazer row persisted to snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::github::ProfileDetail;

/// Timestamp layout used in snapshot files and by the list endpoint.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Column holding the ordering timestamp.
pub const STARRED_AT_COLUMN: &str = "Starred at";

/// Spelling of [`STARRED_AT_COLUMN`] accepted when reading older files.
pub const STARRED_AT_ALIAS: &str = "Starred-at";

/// Snapshot header, in column order.
pub const CSV_HEADER: [&str; 9] = [
    "Username",
    "Name",
    "Location",
    "Company",
    "Email",
    "Twitter",
    "Followers",
    STARRED_AT_COLUMN,
    "Bio",
];

/// A stargazer's profile plus the time they starred.
///
/// Field order is the column order of [`CSV_HEADER`]. Unset profile fields
/// are written as empty cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Location")]
    pub location: Option<String>,
    #[serde(rename = "Company")]
    pub company: Option<String>,
    #[serde(rename = "Email")]
    pub email: Option<String>,
    #[serde(rename = "Twitter")]
    pub twitter: Option<String>,
    #[serde(rename = "Followers")]
    pub followers: Option<u64>,
    #[serde(rename = "Starred at", alias = "Starred-at", with = "timestamp")]
    pub starred_at: DateTime<Utc>,
    #[serde(rename = "Bio")]
    pub bio: Option<String>,
}

impl EnrichedRecord {
    /// Attach the list entry's `starred_at` to a fetched profile.
    pub fn from_profile(profile: ProfileDetail, starred_at: DateTime<Utc>) -> Self {
        Self {
            username: profile.login,
            name: profile.name,
            location: profile.location,
            company: profile.company,
            email: profile.email,
            twitter: profile.twitter_username,
            followers: profile.followers,
            starred_at,
            bio: profile.bio,
        }
    }
}

/// Format a timestamp the way snapshot files store it.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp.
///
/// Accepts any RFC 3339 value, which covers the `Z`-suffixed form written
/// by this crate and offsets written by other tools.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        at: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> DateTime<Utc> {
        parse_timestamp(value).expect("valid timestamp")
    }

    #[test]
    fn from_profile_carries_starred_at() {
        let profile = ProfileDetail {
            login: "ann".to_string(),
            twitter_username: Some("ann_tw".to_string()),
            followers: Some(3),
            ..ProfileDetail::default()
        };

        let record = EnrichedRecord::from_profile(profile, at("2023-01-02T00:00:00Z"));
        assert_eq!(record.username, "ann");
        assert_eq!(record.twitter.as_deref(), Some("ann_tw"));
        assert_eq!(record.followers, Some(3));
        assert_eq!(record.name, None);
        assert_eq!(format_timestamp(&record.starred_at), "2023-01-02T00:00:00Z");
    }

    #[test]
    fn parse_timestamp_normalizes_offsets() {
        assert_eq!(at("2023-01-01T02:00:00+02:00"), at("2023-01-01T00:00:00Z"));
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn writes_header_and_empty_cells() {
        let record = EnrichedRecord {
            username: "bob".to_string(),
            name: Some("Bob, Jr.".to_string()),
            location: None,
            company: None,
            email: None,
            twitter: None,
            followers: None,
            starred_at: at("2023-01-01T00:00:00Z"),
            bio: Some("line one\nline two".to_string()),
        };

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(&record).expect("serialize");
        let text = String::from_utf8(writer.into_inner().expect("flush")).expect("utf8");

        assert_eq!(
            text,
            "Username,Name,Location,Company,Email,Twitter,Followers,Starred at,Bio\n\
             bob,\"Bob, Jr.\",,,,,,2023-01-01T00:00:00Z,\"line one\nline two\"\n"
        );
    }

    #[test]
    fn reads_alias_header_and_empty_cells_as_none() {
        let text = "Username,Name,Location,Company,Email,Twitter,Followers,Starred-at,Bio\n\
                    carol,,Berlin,,,,12,2022-05-06T07:08:09Z,\n";
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let rows: Vec<EnrichedRecord> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .expect("rows");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].username, "carol");
        assert_eq!(rows[0].name, None);
        assert_eq!(rows[0].location.as_deref(), Some("Berlin"));
        assert_eq!(rows[0].followers, Some(12));
        assert_eq!(rows[0].starred_at, at("2022-05-06T07:08:09Z"));
        assert_eq!(rows[0].bio, None);
    }
}
