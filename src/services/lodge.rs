use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::base::{ServiceResult, decode_all, first, page, row, run};
use super::member::{LODGES, MEMBERSHIPS};
use crate::backend::{Filter, Range, Select, TableClient, query::contains_pattern};
use crate::error::BackendError;
use crate::models::membership::{MAX_DEGREE, check_degree};
use crate::models::{
    Lodge, LodgeCounts, LodgeMembership, LodgeUpdate, MemberRole, NewLodge, NewMembership, Page,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LodgeQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
    pub include_inactive: bool,
}

impl Default for LodgeQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            search: None,
            include_inactive: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoundedLodge {
    pub lodge: Lodge,
    pub membership: LodgeMembership,
}

#[derive(Clone)]
pub struct LodgeService {
    db: Arc<dyn TableClient>,
}

fn by_id(id: Uuid) -> Vec<Filter> {
    vec![Filter::Eq("id".into(), id.to_string().into())]
}

impl LodgeService {
    pub fn new(db: Arc<dyn TableClient>) -> Self {
        Self { db }
    }

    pub async fn get_lodge(&self, lodge_id: Uuid) -> ServiceResult<Lodge> {
        run("lodges.get_lodge", async {
            let rows = self.db.select(Select::from(LODGES).eq("id", lodge_id)).await?;
            first(rows.rows, "lodge")
        })
        .await
    }

    pub async fn list_lodges(&self, query: &LodgeQuery) -> ServiceResult<Page<Lodge>> {
        run("lodges.list_lodges", async {
            let mut select = Select::from(LODGES);
            if !query.include_inactive {
                select = select.eq("is_active", true);
            }
            if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                let pattern = contains_pattern(term);
                select = select.filter(Filter::Or(vec![
                    Filter::ILike("name".into(), pattern.clone()),
                    Filter::ILike("city".into(), pattern.clone()),
                    Filter::ILike("obedience".into(), pattern),
                ]));
            }
            let rows = self
                .db
                .select(
                    select
                        .order("name", true)
                        .range(Range::page(query.page, query.page_size))
                        .with_count(),
                )
                .await?;
            page(rows, query.page, query.page_size)
        })
        .await
    }

    pub async fn create_lodge(&self, lodge: &NewLodge) -> ServiceResult<Lodge> {
        run("lodges.create_lodge", self.insert_lodge(lodge)).await
    }

    async fn insert_lodge(&self, lodge: &NewLodge) -> Result<Lodge, BackendError> {
        if lodge.name.trim().is_empty() {
            return Err(BackendError::validation("lodge name is required"));
        }
        let mut fresh = row(lodge)?;
        fresh["is_active"] = json!(true);
        let written = self.db.insert(LODGES, vec![fresh]).await?;
        first(written, "lodge")
    }

    pub async fn update_lodge(&self, lodge_id: Uuid, update: &LodgeUpdate) -> ServiceResult<Lodge> {
        run("lodges.update_lodge", async {
            if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                return Err(BackendError::validation("lodge name cannot be blank"));
            }
            let patch = row(update)?;
            if patch.as_object().is_some_and(|p| p.is_empty()) {
                return Err(BackendError::validation("nothing to update"));
            }
            let written = self.db.update(LODGES, by_id(lodge_id), patch).await?;
            first(written, "lodge")
        })
        .await
    }

    /// Soft disable; rows that reference the lodge stay.
    pub async fn deactivate_lodge(&self, lodge_id: Uuid) -> ServiceResult<Lodge> {
        run("lodges.deactivate_lodge", async {
            let written = self
                .db
                .update(LODGES, by_id(lodge_id), json!({ "is_active": false }))
                .await?;
            first(written, "lodge")
        })
        .await
    }

    pub async fn delete_lodge(&self, lodge_id: Uuid) -> ServiceResult<()> {
        run("lodges.delete_lodge", async {
            let deleted = self.db.delete(LODGES, by_id(lodge_id)).await?;
            if deleted.is_empty() {
                return Err(BackendError::not_found("lodge not found"));
            }
            Ok(())
        })
        .await
    }

    /// Creates the lodge, then the founder's admin membership. The two writes are
    /// not atomic: when the second fails the lodge stays and the error names it.
    pub async fn create_lodge_with_founder(
        &self,
        lodge: &NewLodge,
        founder: Uuid,
    ) -> ServiceResult<FoundedLodge> {
        run("lodges.create_lodge_with_founder", async {
            let lodge = self.insert_lodge(lodge).await?;
            let founding = NewMembership::new(founder, lodge.id, MemberRole::Admin, MAX_DEGREE);
            match self.insert_membership(&founding).await {
                Ok(membership) => Ok(FoundedLodge { lodge, membership }),
                Err(e) => {
                    tracing::error!(
                        "Lodge {} created but founder membership failed: {}",
                        lodge.id,
                        e
                    );
                    Err(BackendError::new(
                        e.kind,
                        format!("lodge {} created without its founder: {}", lodge.id, e.message),
                    ))
                }
            }
        })
        .await
    }

    pub async fn list_memberships(
        &self,
        lodge_id: Uuid,
        include_inactive: bool,
    ) -> ServiceResult<Vec<LodgeMembership>> {
        run("lodges.list_memberships", async {
            let mut select = Select::from(MEMBERSHIPS).eq("lodge_id", lodge_id);
            if !include_inactive {
                select = select.eq("is_active", true);
            }
            let rows = self.db.select(select.order("joined_at", true)).await?;
            decode_all(rows.rows)
        })
        .await
    }

    pub async fn add_membership(&self, membership: &NewMembership) -> ServiceResult<LodgeMembership> {
        run("lodges.add_membership", self.insert_membership(membership)).await
    }

    async fn insert_membership(
        &self,
        membership: &NewMembership,
    ) -> Result<LodgeMembership, BackendError> {
        check_degree(membership.degree)?;
        let written = self.db.insert(MEMBERSHIPS, vec![row(membership)?]).await?;
        first(written, "membership")
    }

    /// Memberships are deactivated, never deleted.
    pub async fn deactivate_membership(&self, membership_id: Uuid) -> ServiceResult<LodgeMembership> {
        run("lodges.deactivate_membership", async {
            let written = self
                .db
                .update(MEMBERSHIPS, by_id(membership_id), json!({ "is_active": false }))
                .await?;
            first(written, "membership")
        })
        .await
    }

    /// Dashboard counters, one count query each.
    pub async fn get_lodge_counts(&self, lodge_id: Uuid, today: NaiveDate) -> ServiceResult<LodgeCounts> {
        run("lodges.get_lodge_counts", async {
            let count = |select: Select| async move {
                let rows = self.db.select(select.count_only()).await?;
                Ok::<_, BackendError>(rows.count.unwrap_or(0))
            };
            let members = count(
                Select::from(MEMBERSHIPS)
                    .eq("lodge_id", lodge_id)
                    .eq("is_active", true),
            )
            .await?;
            let upcoming_tenues = count(
                Select::from("tenues")
                    .eq("lodge_id", lodge_id)
                    .eq("status", "scheduled")
                    .gte("date", today),
            )
            .await?;
            let documents = count(Select::from("documents").eq("lodge_id", lodge_id)).await?;
            let pending_invitations = count(
                Select::from("invitations")
                    .eq("lodge_id", lodge_id)
                    .eq("used", false)
                    .gt("expires_at", Utc::now()),
            )
            .await?;
            Ok(LodgeCounts {
                members,
                upcoming_tenues,
                documents,
                pending_invitations,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryTables;
    use crate::error::ErrorKind;
    use crate::services::Status;

    fn new_lodge(name: &str) -> NewLodge {
        NewLodge {
            name: name.into(),
            number: None,
            obedience: Some("GODF".into()),
            rite: Some("REAA".into()),
            colors: None,
            city: Some("Lyon".into()),
            country: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn create_and_deactivate() {
        let lodges = LodgeService::new(Arc::new(MemoryTables::with_portal_schema()));
        let lodge = lodges.create_lodge(&new_lodge("Aurore")).await.into_result().unwrap();
        assert!(lodge.is_active);

        let lodge = lodges.deactivate_lodge(lodge.id).await.into_result().unwrap();
        assert!(!lodge.is_active);

        let listed = lodges.list_lodges(&LodgeQuery::default()).await.into_result().unwrap();
        assert_eq!(listed.total, 0);
        let all = LodgeQuery {
            include_inactive: true,
            ..Default::default()
        };
        assert_eq!(lodges.list_lodges(&all).await.into_result().unwrap().total, 1);
    }

    #[tokio::test]
    async fn delete_is_not_found_the_second_time() {
        let lodges = LodgeService::new(Arc::new(MemoryTables::with_portal_schema()));
        let lodge = lodges.create_lodge(&new_lodge("Orient")).await.into_result().unwrap();

        assert_eq!(lodges.delete_lodge(lodge.id).await.status, Status::Success);
        let again = lodges.delete_lodge(lodge.id).await;
        assert_eq!(again.error.map(|e| e.kind), Some(ErrorKind::NotFound));
        assert!(lodges.get_lodge(lodge.id).await.error.is_some());
    }

    #[tokio::test]
    async fn blank_name_fails_without_a_write() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let lodges = LodgeService::new(db.clone());
        let result = lodges.create_lodge(&new_lodge("  ")).await;
        assert_eq!(result.status, Status::Error);
        assert!(db.rows(LODGES).is_empty());
    }

    #[tokio::test]
    async fn membership_degree_stops_at_master() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let lodges = LodgeService::new(db.clone());
        let lodge = Uuid::new_v4();

        let result = lodges
            .add_membership(&NewMembership::new(Uuid::new_v4(), lodge, MemberRole::Member, 4))
            .await;
        assert_eq!(result.error.map(|e| e.kind), Some(ErrorKind::Validation));
        assert!(db.rows(MEMBERSHIPS).is_empty());

        let master = lodges
            .add_membership(&NewMembership::new(Uuid::new_v4(), lodge, MemberRole::Member, 3))
            .await;
        assert_eq!(master.status, Status::Success);
    }

    #[tokio::test]
    async fn founder_becomes_admin() {
        let lodges = LodgeService::new(Arc::new(MemoryTables::with_portal_schema()));
        let founder = Uuid::new_v4();
        let founded = lodges
            .create_lodge_with_founder(&new_lodge("Aurore"), founder)
            .await
            .into_result()
            .unwrap();
        assert_eq!(founded.membership.user_id, founder);
        assert_eq!(founded.membership.role, MemberRole::Admin);
        assert!(founded.membership.is_active);
    }

    #[tokio::test]
    async fn founder_failure_leaves_the_lodge() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let lodges = LodgeService::new(db.clone());
        db.fail_next(
            MEMBERSHIPS,
            BackendError::new(ErrorKind::Constraint, "profile missing"),
        );
        let result = lodges
            .create_lodge_with_founder(&new_lodge("Aurore"), Uuid::new_v4())
            .await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().kind, ErrorKind::Constraint);
        assert_eq!(db.rows(LODGES).len(), 1);
    }

    #[tokio::test]
    async fn counts() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let lodges = LodgeService::new(db.clone());
        let founded = lodges
            .create_lodge_with_founder(&new_lodge("Aurore"), Uuid::new_v4())
            .await
            .into_result()
            .unwrap();
        let id = founded.lodge.id;
        db.insert(
            "tenues",
            vec![
                json!({"lodge_id": id, "title": "a", "date": "2026-03-01", "status": "scheduled"}),
                json!({"lodge_id": id, "title": "b", "date": "2025-03-01", "status": "scheduled"}),
                json!({"lodge_id": id, "title": "c", "date": "2026-04-01", "status": "canceled"}),
            ],
        )
        .await
        .unwrap();
        db.insert("documents", vec![json!({"lodge_id": id, "title": "statuts"})])
            .await
            .unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let counts = lodges.get_lodge_counts(id, today).await.into_result().unwrap();
        assert_eq!(
            counts,
            LodgeCounts {
                members: 1,
                upcoming_tenues: 1,
                documents: 1,
                pending_invitations: 0,
            }
        );
    }
}
