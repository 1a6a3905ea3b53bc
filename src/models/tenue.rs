use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::membership::check_degree;
use super::null_as_default;
use crate::error::BackendError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenueStatus {
    #[default]
    Scheduled,
    Completed,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaItem {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Who holds which office for one tenue; either a member or a free-text name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficerAssignment {
    pub office: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlancheRef {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planche_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
}

/// Row of `tenues`. The agenda, officers and planches columns are JSONB.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenue {
    pub id: Uuid,
    pub lodge_id: Uuid,
    pub title: String,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub location: Option<String>,
    #[serde(default = "first_degree")]
    pub degree: i32,
    #[serde(default)]
    pub status: TenueStatus,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agenda: Vec<AgendaItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub officers: Vec<OfficerAssignment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub planches: Vec<PlancheRef>,
    pub created_by: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
}

fn first_degree() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTenue {
    pub lodge_id: Uuid,
    pub title: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub degree: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub agenda: Vec<AgendaItem>,
    #[serde(default)]
    pub officers: Vec<OfficerAssignment>,
    #[serde(default)]
    pub planches: Vec<PlancheRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
}

impl NewTenue {
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.title.trim().is_empty() {
            return Err(BackendError::validation("tenue title is required"));
        }
        check_degree(self.degree)?;
        validate_agenda(&self.agenda)?;
        validate_officers(&self.officers)?;
        validate_planches(&self.planches)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TenueUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TenueStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agenda: Option<Vec<AgendaItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub officers: Option<Vec<OfficerAssignment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planches: Option<Vec<PlancheRef>>,
}

impl TenueUpdate {
    pub fn validate(&self) -> Result<(), BackendError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(BackendError::validation("tenue title is required"));
            }
        }
        if let Some(degree) = self.degree {
            check_degree(degree)?;
        }
        if let Some(agenda) = &self.agenda {
            validate_agenda(agenda)?;
        }
        if let Some(officers) = &self.officers {
            validate_officers(officers)?;
        }
        if let Some(planches) = &self.planches {
            validate_planches(planches)?;
        }
        Ok(())
    }
}

fn validate_agenda(agenda: &[AgendaItem]) -> Result<(), BackendError> {
    for (i, item) in agenda.iter().enumerate() {
        if item.title.trim().is_empty() {
            return Err(BackendError::validation(format!("agenda item {} has no title", i + 1)));
        }
        if item.duration_minutes == Some(0) {
            return Err(BackendError::validation(format!(
                "agenda item {} has a zero duration",
                i + 1
            )));
        }
    }
    Ok(())
}

fn validate_officers(officers: &[OfficerAssignment]) -> Result<(), BackendError> {
    for officer in officers {
        if officer.office.trim().is_empty() {
            return Err(BackendError::validation("officer assignment without an office"));
        }
        let named = officer.name.as_deref().is_some_and(|n| !n.trim().is_empty());
        if officer.user_id.is_none() && !named {
            return Err(BackendError::validation(format!(
                "office {} is assigned to nobody",
                officer.office
            )));
        }
    }
    let mut offices: Vec<&str> = officers.iter().map(|o| o.office.as_str()).collect();
    offices.sort_unstable();
    if offices.windows(2).any(|w| w[0] == w[1]) {
        return Err(BackendError::validation("an office is assigned twice"));
    }
    Ok(())
}

fn validate_planches(planches: &[PlancheRef]) -> Result<(), BackendError> {
    if planches.iter().any(|p| p.title.trim().is_empty()) {
        return Err(BackendError::validation("planche reference without a title"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Excused,
}

/// Row of `attendance`, unique per (tenue_id, user_id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attendance {
    pub id: Uuid,
    pub tenue_id: Uuid,
    pub user_id: Uuid,
    pub status: AttendanceStatus,
    pub excuse: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_tenue() -> NewTenue {
        NewTenue {
            lodge_id: Uuid::new_v4(),
            title: "Tenue solsticiale".into(),
            date: NaiveDate::from_ymd_opt(2026, 6, 21).unwrap(),
            start_time: None,
            location: None,
            degree: 1,
            description: None,
            agenda: vec![],
            officers: vec![],
            planches: vec![],
            created_by: None,
        }
    }

    #[test]
    fn null_bags_decode_as_empty() {
        let tenue: Tenue = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "lodge_id": Uuid::new_v4(),
            "title": "t",
            "date": "2026-01-10",
            "start_time": null,
            "location": null,
            "description": null,
            "agenda": null,
            "officers": [{"office": "secretary", "name": "J. D."}],
            "created_by": null,
            "created_at": null
        }))
        .unwrap();
        assert!(tenue.agenda.is_empty());
        assert!(tenue.planches.is_empty());
        assert_eq!(tenue.officers[0].office, "secretary");
        assert_eq!(tenue.status, TenueStatus::Scheduled);
    }

    #[test]
    fn malformed_bag_is_rejected_on_decode() {
        let res = serde_json::from_value::<Tenue>(json!({
            "id": Uuid::new_v4(),
            "lodge_id": Uuid::new_v4(),
            "title": "t",
            "date": "2026-01-10",
            "agenda": [{"speaker": "no title"}]
        }));
        assert!(res.is_err());
    }

    #[test]
    fn officers_need_an_assignee_and_unique_offices() {
        let mut tenue = new_tenue();
        tenue.officers = vec![OfficerAssignment {
            office: "orator".into(),
            user_id: None,
            name: Some("  ".into()),
        }];
        assert!(tenue.validate().is_err());

        tenue.officers = vec![
            OfficerAssignment {
                office: "orator".into(),
                user_id: Some(Uuid::new_v4()),
                name: None,
            },
            OfficerAssignment {
                office: "orator".into(),
                user_id: None,
                name: Some("B".into()),
            },
        ];
        assert!(tenue.validate().is_err());

        tenue.officers.pop();
        assert!(tenue.validate().is_ok());
    }

    #[test]
    fn degree_and_title_checked() {
        let mut tenue = new_tenue();
        tenue.degree = 0;
        assert!(tenue.validate().is_err());
        tenue.degree = 3;
        tenue.title = " ".into();
        assert!(tenue.validate().is_err());
    }
}
