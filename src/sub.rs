/*!
Subscription requests.

A `Subscription` is a student's request to join one of a teacher's classes.
It starts `pending` and is reviewed exactly once: approval or rejection is
terminal, and approval is what creates the teacher/student enrollment (in
the same transaction; see `store::subs`).
*/
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for SubStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            SubStatus::Pending  => "pending",
            SubStatus::Approved => "approved",
            SubStatus::Rejected => "rejected",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for SubStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"  => Ok(SubStatus::Pending),
            "approved" => Ok(SubStatus::Approved),
            "rejected" => Ok(SubStatus::Rejected),
            _ => Err(format!("{:?} is not a valid SubStatus.", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    /// `uid` of the requesting student.
    pub student: String,
    /// `uid` of the teacher whose class is requested.
    pub teacher: String,
    pub class_name: String,
    pub status: SubStatus,
    /// Whether the identity provider had verified the student's email
    /// address at request time.
    pub email_verified: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub requested_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub reviewed_at: Option<OffsetDateTime>,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tokens_round_trip() {
        for status in [SubStatus::Pending, SubStatus::Approved, SubStatus::Rejected] {
            let token = status.to_string();
            let parsed: SubStatus = token.parse().unwrap();
            assert_eq!(status, parsed);
        }
        assert!("reopened".parse::<SubStatus>().is_err());
    }
}
