use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::base::{ServiceResult, decode_all, first, first_opt, page, row, run};
use crate::backend::{Filter, Range, Select, TableClient, query::contains_pattern};
use crate::error::BackendError;
use crate::models::{
    Attendance, AttendanceStatus, NewTenue, Page, SortDirection, Tenue, TenueStatus, TenueUpdate,
};

pub(crate) const TENUES: &str = "tenues";
pub(crate) const ATTENDANCE: &str = "attendance";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TenueQuery {
    pub page: u32,
    pub page_size: u32,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<TenueStatus>,
    /// Only tenues open to this degree or below.
    pub max_degree: Option<i32>,
    pub search: Option<String>,
    pub order_direction: SortDirection,
}

impl Default for TenueQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            from: None,
            to: None,
            status: None,
            max_degree: None,
            search: None,
            order_direction: SortDirection::Desc,
        }
    }
}

#[derive(Clone)]
pub struct TenueService {
    db: Arc<dyn TableClient>,
}

fn by_id(id: Uuid) -> Vec<Filter> {
    vec![Filter::Eq("id".into(), id.to_string().into())]
}

impl TenueService {
    pub fn new(db: Arc<dyn TableClient>) -> Self {
        Self { db }
    }

    pub async fn list_tenues(&self, lodge_id: Uuid, query: &TenueQuery) -> ServiceResult<Page<Tenue>> {
        run("tenues.list_tenues", async {
            let mut select = Select::from(TENUES).eq("lodge_id", lodge_id);
            if let Some(from) = query.from {
                select = select.gte("date", from);
            }
            if let Some(to) = query.to {
                select = select.lte("date", to);
            }
            if let Some(status) = query.status {
                select = select.eq("status", status);
            }
            if let Some(degree) = query.max_degree {
                select = select.lte("degree", degree);
            }
            if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                let pattern = contains_pattern(term);
                select = select.filter(Filter::Or(vec![
                    Filter::ILike("title".into(), pattern.clone()),
                    Filter::ILike("location".into(), pattern),
                ]));
            }
            let ascending = query.order_direction.ascending();
            let rows = self
                .db
                .select(
                    select
                        .order("date", ascending)
                        .order("start_time", ascending)
                        .range(Range::page(query.page, query.page_size))
                        .with_count(),
                )
                .await?;
            page(rows, query.page, query.page_size)
        })
        .await
    }

    pub async fn get_tenue(&self, tenue_id: Uuid) -> ServiceResult<Tenue> {
        run("tenues.get_tenue", async {
            let rows = self.db.select(Select::from(TENUES).eq("id", tenue_id)).await?;
            first(rows.rows, "tenue")
        })
        .await
    }

    /// Scheduled tenues from `today` on, soonest first.
    pub async fn get_upcoming_tenues(
        &self,
        lodge_id: Uuid,
        today: NaiveDate,
        limit: u64,
    ) -> ServiceResult<Vec<Tenue>> {
        run("tenues.get_upcoming_tenues", async {
            let rows = self
                .db
                .select(
                    Select::from(TENUES)
                        .eq("lodge_id", lodge_id)
                        .eq("status", TenueStatus::Scheduled)
                        .gte("date", today)
                        .order("date", true)
                        .order("start_time", true)
                        .limit(limit),
                )
                .await?;
            decode_all(rows.rows)
        })
        .await
    }

    pub async fn create_tenue(&self, tenue: &NewTenue) -> ServiceResult<Tenue> {
        run("tenues.create_tenue", async {
            tenue.validate()?;
            let mut fresh = row(tenue)?;
            fresh["status"] = json!(TenueStatus::Scheduled);
            let written = self.db.insert(TENUES, vec![fresh]).await?;
            first(written, "tenue")
        })
        .await
    }

    pub async fn update_tenue(&self, tenue_id: Uuid, update: &TenueUpdate) -> ServiceResult<Tenue> {
        run("tenues.update_tenue", async {
            update.validate()?;
            let patch = row(update)?;
            if patch.as_object().is_some_and(|p| p.is_empty()) {
                return Err(BackendError::validation("nothing to update"));
            }
            let written = self.db.update(TENUES, by_id(tenue_id), patch).await?;
            first(written, "tenue")
        })
        .await
    }

    pub async fn cancel_tenue(&self, tenue_id: Uuid) -> ServiceResult<Tenue> {
        run("tenues.cancel_tenue", async {
            let written = self
                .db
                .update(TENUES, by_id(tenue_id), json!({ "status": TenueStatus::Canceled }))
                .await?;
            first(written, "tenue")
        })
        .await
    }

    pub async fn delete_tenue(&self, tenue_id: Uuid) -> ServiceResult<()> {
        run("tenues.delete_tenue", async {
            let deleted = self.db.delete(TENUES, by_id(tenue_id)).await?;
            if deleted.is_empty() {
                return Err(BackendError::not_found("tenue not found"));
            }
            Ok(())
        })
        .await
    }

    /// Upsert keyed on (tenue_id, user_id): repeated calls converge on one row.
    pub async fn set_attendance(
        &self,
        tenue_id: Uuid,
        user_id: Uuid,
        status: AttendanceStatus,
        excuse: Option<&str>,
    ) -> ServiceResult<Attendance> {
        run("tenues.set_attendance", async {
            let excuse = match status {
                AttendanceStatus::Excused => excuse.map(str::trim).filter(|e| !e.is_empty()),
                _ => None,
            };
            let written = self
                .db
                .upsert(
                    ATTENDANCE,
                    vec![json!({
                        "tenue_id": tenue_id,
                        "user_id": user_id,
                        "status": status,
                        "excuse": excuse,
                        "updated_at": Utc::now(),
                    })],
                    &["tenue_id", "user_id"],
                )
                .await?;
            first(written, "attendance")
        })
        .await
    }

    pub async fn get_attendance(&self, tenue_id: Uuid) -> ServiceResult<Vec<Attendance>> {
        run("tenues.get_attendance", async {
            let rows = self
                .db
                .select(Select::from(ATTENDANCE).eq("tenue_id", tenue_id).order("updated_at", true))
                .await?;
            decode_all(rows.rows)
        })
        .await
    }

    pub async fn get_user_attendance(
        &self,
        tenue_id: Uuid,
        user_id: Uuid,
    ) -> ServiceResult<Option<Attendance>> {
        run("tenues.get_user_attendance", async {
            let rows = self
                .db
                .select(
                    Select::from(ATTENDANCE)
                        .eq("tenue_id", tenue_id)
                        .eq("user_id", user_id),
                )
                .await?;
            first_opt(rows.rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryTables;
    use crate::error::ErrorKind;
    use crate::models::AgendaItem;

    fn new_tenue(lodge_id: Uuid, title: &str, date: NaiveDate) -> NewTenue {
        NewTenue {
            lodge_id,
            title: title.into(),
            date,
            start_time: None,
            location: Some("Temple Voltaire".into()),
            degree: 1,
            description: None,
            agenda: vec![AgendaItem {
                title: "Ouverture".into(),
                duration_minutes: Some(10),
                speaker: None,
                notes: None,
            }],
            officers: vec![],
            planches: vec![],
            created_by: None,
        }
    }

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    #[tokio::test]
    async fn tenue_above_third_degree_is_rejected() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let tenues = TenueService::new(db.clone());
        let mut tenue = new_tenue(Uuid::new_v4(), "Chapitre", day(3, 2));
        tenue.degree = 4;

        let err = tenues.create_tenue(&tenue).await.error.unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(db.rows(TENUES).is_empty());
    }

    #[tokio::test]
    async fn attendance_upsert_converges() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let tenues = TenueService::new(db.clone());
        let (tenue, user) = (Uuid::new_v4(), Uuid::new_v4());

        tenues
            .set_attendance(tenue, user, AttendanceStatus::Present, None)
            .await
            .into_result()
            .unwrap();
        let second = tenues
            .set_attendance(tenue, user, AttendanceStatus::Excused, Some("travelling"))
            .await
            .into_result()
            .unwrap();

        assert_eq!(db.rows(ATTENDANCE).len(), 1);
        assert_eq!(second.status, AttendanceStatus::Excused);
        assert_eq!(second.excuse.as_deref(), Some("travelling"));

        let all = tenues.get_attendance(tenue).await.into_result().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, AttendanceStatus::Excused);
    }

    #[tokio::test]
    async fn excuse_dropped_unless_excused() {
        let tenues = TenueService::new(Arc::new(MemoryTables::with_portal_schema()));
        let row = tenues
            .set_attendance(Uuid::new_v4(), Uuid::new_v4(), AttendanceStatus::Present, Some("x"))
            .await
            .into_result()
            .unwrap();
        assert!(row.excuse.is_none());
    }

    #[tokio::test]
    async fn upcoming_skips_past_and_canceled() {
        let tenues = TenueService::new(Arc::new(MemoryTables::with_portal_schema()));
        let lodge = Uuid::new_v4();
        tenues.create_tenue(&new_tenue(lodge, "past", day(1, 5))).await;
        let later = tenues
            .create_tenue(&new_tenue(lodge, "later", day(5, 2)))
            .await
            .into_result()
            .unwrap();
        tenues.create_tenue(&new_tenue(lodge, "sooner", day(3, 2))).await;
        tenues.cancel_tenue(later.id).await.into_result().unwrap();

        let upcoming = tenues
            .get_upcoming_tenues(lodge, day(2, 1), 10)
            .await
            .into_result()
            .unwrap();
        let titles: Vec<_> = upcoming.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["sooner"]);
        assert_eq!(upcoming[0].agenda[0].title, "Ouverture");
    }

    #[tokio::test]
    async fn list_filters_by_window() {
        let tenues = TenueService::new(Arc::new(MemoryTables::with_portal_schema()));
        let lodge = Uuid::new_v4();
        for (title, date) in [("a", day(1, 1)), ("b", day(2, 1)), ("c", day(3, 1))] {
            tenues.create_tenue(&new_tenue(lodge, title, date)).await;
        }
        let query = TenueQuery {
            from: Some(day(1, 15)),
            ..Default::default()
        };
        let page = tenues.list_tenues(lodge, &query).await.into_result().unwrap();
        let titles: Vec<_> = page.items.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "b"]);
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn invalid_bags_never_reach_the_table() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let tenues = TenueService::new(db.clone());
        let mut tenue = new_tenue(Uuid::new_v4(), "t", day(1, 1));
        tenue.agenda[0].title = String::new();
        let result = tenues.create_tenue(&tenue).await;
        assert_eq!(result.error.unwrap().kind, ErrorKind::Validation);
        assert!(db.rows(TENUES).is_empty());
    }
}
