use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::base::{ServiceResult, decode_all, first, first_opt, page, row, run};
use crate::auth::AuthUser;
use crate::backend::{Filter, Range, Select, TableClient, query::contains_pattern};
use crate::error::BackendError;
use crate::models::membership::check_degree;
use crate::models::{
    Lodge, LodgeMembership, MemberEntry, MemberRole, MembershipUpdate, MembershipWithLodge, Page,
    Profile, ProfileUpdate, ProfileView, SortDirection,
};

pub(crate) const PROFILES: &str = "profiles";
pub(crate) const MEMBERSHIPS: &str = "lodge_memberships";
pub(crate) const LODGES: &str = "lodges";

const MEMBER_ORDER_COLUMNS: &[&str] = &["joined_at", "created_at", "role", "degree", "office"];

/// Directory listing parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemberQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
    pub role: Option<MemberRole>,
    pub order_by: Option<String>,
    pub order_direction: SortDirection,
    pub include_inactive: bool,
}

impl Default for MemberQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            search: None,
            role: None,
            order_by: None,
            order_direction: SortDirection::Desc,
            include_inactive: false,
        }
    }
}

#[derive(Clone)]
pub struct MemberService {
    db: Arc<dyn TableClient>,
}

/// Pairs memberships with the lodges they point at.
async fn attach_lodges(
    db: &dyn TableClient,
    memberships: Vec<LodgeMembership>,
) -> Result<Vec<MembershipWithLodge>, BackendError> {
    if memberships.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = memberships.iter().map(|m| m.lodge_id).collect();
    let rows = db.select(Select::from(LODGES).in_list("id", ids)).await?;
    let lodges: HashMap<Uuid, Lodge> = decode_all::<Lodge>(rows.rows)?
        .into_iter()
        .map(|l| (l.id, l))
        .collect();
    Ok(memberships
        .into_iter()
        .map(|membership| MembershipWithLodge {
            lodge: lodges.get(&membership.lodge_id).cloned(),
            membership,
        })
        .collect())
}

impl MemberService {
    pub fn new(db: Arc<dyn TableClient>) -> Self {
        Self { db }
    }

    pub async fn get_profile(&self, user_id: Uuid) -> ServiceResult<Profile> {
        run("members.get_profile", async {
            let rows = self.db.select(Select::from(PROFILES).eq("id", user_id)).await?;
            first(rows.rows, "profile")
        })
        .await
    }

    /// Creates the profile row for a fresh identity; an existing row is returned untouched.
    pub async fn ensure_profile(&self, user: &AuthUser) -> ServiceResult<Profile> {
        run("members.ensure_profile", async {
            let rows = self.db.select(Select::from(PROFILES).eq("id", user.id)).await?;
            if let Some(profile) = first_opt(rows.rows)? {
                return Ok(profile);
            }
            let mut fresh = serde_json::Map::new();
            fresh.insert("id".into(), Value::String(user.id.to_string()));
            if let Some(email) = &user.email {
                fresh.insert("email".into(), Value::String(email.clone()));
            }
            if let Some(name) = user.display_name() {
                fresh.insert("display_name".into(), Value::String(name.to_string()));
            }
            let written = self
                .db
                .upsert(PROFILES, vec![Value::Object(fresh)], &["id"])
                .await?;
            first(written, "profile")
        })
        .await
    }

    pub async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> ServiceResult<Profile> {
        run("members.update_profile", async {
            if update.is_empty() {
                return Err(BackendError::validation("nothing to update"));
            }
            if update
                .display_name
                .as_deref()
                .is_some_and(|n| n.trim().is_empty())
            {
                return Err(BackendError::validation("display name cannot be blank"));
            }
            let mut patch = row(update)?;
            patch["updated_at"] = serde_json::to_value(Utc::now())?;
            let written = self
                .db
                .update(PROFILES, vec![Filter::Eq("id".into(), user_id.to_string().into())], patch)
                .await?;
            first(written, "profile")
        })
        .await
    }

    /// Profile, every membership and each membership's lodge. Sequential reads.
    pub async fn get_profile_view(&self, user_id: Uuid) -> ServiceResult<ProfileView> {
        run("members.get_profile_view", async {
            let rows = self.db.select(Select::from(PROFILES).eq("id", user_id)).await?;
            let profile: Profile = first(rows.rows, "profile")?;
            let rows = self
                .db
                .select(
                    Select::from(MEMBERSHIPS)
                        .eq("user_id", user_id)
                        .order("joined_at", true),
                )
                .await?;
            let memberships = attach_lodges(self.db.as_ref(), decode_all(rows.rows)?).await?;
            Ok(ProfileView {
                profile,
                memberships,
            })
        })
        .await
    }

    /// Active memberships with their lodges.
    pub async fn get_user_lodges(&self, user_id: Uuid) -> ServiceResult<Vec<MembershipWithLodge>> {
        run("members.get_user_lodges", async {
            let rows = self
                .db
                .select(
                    Select::from(MEMBERSHIPS)
                        .eq("user_id", user_id)
                        .eq("is_active", true)
                        .order("joined_at", true),
                )
                .await?;
            attach_lodges(self.db.as_ref(), decode_all(rows.rows)?).await
        })
        .await
    }

    pub async fn get_membership(
        &self,
        user_id: Uuid,
        lodge_id: Uuid,
    ) -> ServiceResult<Option<LodgeMembership>> {
        run("members.get_membership", async {
            let rows = self
                .db
                .select(
                    Select::from(MEMBERSHIPS)
                        .eq("user_id", user_id)
                        .eq("lodge_id", lodge_id),
                )
                .await?;
            first_opt(rows.rows)
        })
        .await
    }

    pub async fn update_membership(
        &self,
        membership_id: Uuid,
        update: &MembershipUpdate,
    ) -> ServiceResult<LodgeMembership> {
        run("members.update_membership", async {
            if let Some(degree) = update.degree {
                check_degree(degree)?;
            }
            let patch = row(update)?;
            if patch.as_object().is_some_and(|p| p.is_empty()) {
                return Err(BackendError::validation("nothing to update"));
            }
            let written = self
                .db
                .update(
                    MEMBERSHIPS,
                    vec![Filter::Eq("id".into(), membership_id.to_string().into())],
                    patch,
                )
                .await?;
            first(written, "membership")
        })
        .await
    }

    /// One page of a lodge's directory: filtered, counted and range-limited.
    /// A search term matches names and email on the profile.
    pub async fn get_lodge_members(
        &self,
        lodge_id: Uuid,
        query: &MemberQuery,
    ) -> ServiceResult<Page<MemberEntry>> {
        run("members.get_lodge_members", async {
            let order_by = query.order_by.as_deref().unwrap_or("joined_at");
            if !MEMBER_ORDER_COLUMNS.contains(&order_by) {
                return Err(BackendError::validation(format!(
                    "cannot order members by {}",
                    order_by
                )));
            }

            let mut select = Select::from(MEMBERSHIPS).eq("lodge_id", lodge_id);
            if !query.include_inactive {
                select = select.eq("is_active", true);
            }
            if let Some(role) = query.role {
                select = select.eq("role", role.as_str());
            }
            if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                let pattern = contains_pattern(term);
                let matches = self
                    .db
                    .select(Select::from(PROFILES).filter(Filter::Or(
                        ["display_name", "first_name", "last_name", "email"]
                            .iter()
                            .map(|c| Filter::ILike(c.to_string(), pattern.clone()))
                            .collect(),
                    )))
                    .await?;
                let ids: Vec<Value> = matches
                    .rows
                    .iter()
                    .filter_map(|r| r.get("id").cloned())
                    .collect();
                select = select.filter(Filter::In("user_id".into(), ids));
            }

            let rows = self
                .db
                .select(
                    select
                        .order(order_by, query.order_direction.ascending())
                        .range(Range::page(query.page, query.page_size))
                        .with_count(),
                )
                .await?;
            let memberships: Page<LodgeMembership> = page(rows, query.page, query.page_size)?;

            let user_ids: Vec<Uuid> = memberships.items.iter().map(|m| m.user_id).collect();
            let profiles: HashMap<Uuid, Profile> = if user_ids.is_empty() {
                HashMap::new()
            } else {
                let rows = self.db.select(Select::from(PROFILES).in_list("id", user_ids)).await?;
                decode_all::<Profile>(rows.rows)?
                    .into_iter()
                    .map(|p| (p.id, p))
                    .collect()
            };
            Ok(memberships.map(|membership| MemberEntry {
                profile: profiles.get(&membership.user_id).cloned(),
                membership,
            }))
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
    use serde_json::json;

    async fn seeded() -> (Arc<MemoryTables>, MemberService, Uuid, Uuid) {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let user = Uuid::new_v4();
        let lodge = Uuid::new_v4();
        db.insert(LODGES, vec![json!({"id": lodge, "name": "Les Amis Réunis"})])
            .await
            .unwrap();
        db.insert(PROFILES, vec![json!({"id": user, "display_name": "Old Name"})])
            .await
            .unwrap();
        db.insert(
            MEMBERSHIPS,
            vec![json!({"user_id": user, "lodge_id": lodge, "role": "officer", "degree": 3,
                        "is_active": true, "joined_at": "2020-01-01T00:00:00Z"})],
        )
        .await
        .unwrap();
        (db.clone(), MemberService::new(db), user, lodge)
    }

    #[tokio::test]
    async fn update_profile_returns_new_row() {
        let (_, members, user, _) = seeded().await;
        let update = ProfileUpdate {
            display_name: Some("New Name".into()),
            ..Default::default()
        };
        let result = members.update_profile(user, &update).await;
        assert_eq!(result.status, Status::Success);
        assert!(result.error.is_none());
        assert_eq!(result.data.unwrap().display_name.as_deref(), Some("New Name"));
    }

    #[tokio::test]
    async fn rejected_update_has_no_data() {
        let (db, members, user, _) = seeded().await;
        db.fail_next(
            PROFILES,
            BackendError::new(ErrorKind::Constraint, "violates check constraint"),
        );
        let update = ProfileUpdate {
            display_name: Some("New Name".into()),
            ..Default::default()
        };
        let result = members.update_profile(user, &update).await;
        assert_eq!(result.status, Status::Error);
        assert!(result.data.is_none());
        assert_eq!(result.error.unwrap().kind, ErrorKind::Constraint);
    }

    #[tokio::test]
    async fn profile_view_joins_lodges() {
        let (_, members, user, lodge) = seeded().await;
        let view = members.get_profile_view(user).await.into_result().unwrap();
        assert_eq!(view.memberships.len(), 1);
        assert_eq!(view.memberships[0].lodge.as_ref().unwrap().id, lodge);
        assert!(view.is_active_member_of(lodge));
    }

    #[tokio::test]
    async fn ensure_profile_is_idempotent() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let members = MemberService::new(db.clone());
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some("a@b.org".into()),
            phone: None,
            user_metadata: json!({"display_name": "Anna"}),
            email_confirmed_at: None,
            created_at: None,
            updated_at: None,
        };
        let first = members.ensure_profile(&user).await.into_result().unwrap();
        assert_eq!(first.display_name.as_deref(), Some("Anna"));
        members.ensure_profile(&user).await.into_result().unwrap();
        assert_eq!(db.rows(PROFILES).len(), 1);
    }

    #[tokio::test]
    async fn directory_search_and_paging() {
        let (db, members, _, lodge) = seeded().await;
        for (i, name) in ["Albert", "Bernard", "Bertrand"].iter().enumerate() {
            let id = Uuid::new_v4();
            db.insert(PROFILES, vec![json!({"id": id, "display_name": name})])
                .await
                .unwrap();
            db.insert(
                MEMBERSHIPS,
                vec![json!({"user_id": id, "lodge_id": lodge, "role": "member",
                            "is_active": i != 0, "joined_at": format!("202{}-01-01T00:00:00Z", i + 1)})],
            )
            .await
            .unwrap();
        }

        let query = MemberQuery {
            search: Some("ber".into()),
            ..Default::default()
        };
        let found = members.get_lodge_members(lodge, &query).await.into_result().unwrap();
        let names: Vec<_> = found
            .items
            .iter()
            .map(|m| m.profile.as_ref().unwrap().display_name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["Bertrand", "Bernard"]);
        assert_eq!(found.total, 2);

        let query = MemberQuery {
            page: 2,
            page_size: 2,
            include_inactive: true,
            order_direction: SortDirection::Asc,
            ..Default::default()
        };
        let second = members.get_lodge_members(lodge, &query).await.into_result().unwrap();
        assert_eq!(second.total, 4);
        assert_eq!(second.items.len(), 2);
        assert_eq!(second.total_pages(), 2);

        let query = MemberQuery {
            role: Some(MemberRole::Officer),
            ..Default::default()
        };
        let officers = members.get_lodge_members(lodge, &query).await.into_result().unwrap();
        assert_eq!(officers.total, 1);
    }

    #[tokio::test]
    async fn unknown_order_column_is_rejected() {
        let (_, members, _, lodge) = seeded().await;
        let query = MemberQuery {
            order_by: Some("password".into()),
            ..Default::default()
        };
        let err = members.get_lodge_members(lodge, &query).await.error.unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn membership_update_checks_degree() {
        let (_, members, user, lodge) = seeded().await;
        let membership = members
            .get_membership(user, lodge)
            .await
            .into_result()
            .unwrap()
            .unwrap();
        let bad = MembershipUpdate {
            degree: Some(40),
            ..Default::default()
        };
        assert!(!members.update_membership(membership.id, &bad).await.is_success());

        let good = MembershipUpdate {
            office: Some("secretary".into()),
            ..Default::default()
        };
        let updated = members
            .update_membership(membership.id, &good)
            .await
            .into_result()
            .unwrap();
        assert_eq!(updated.office.as_deref(), Some("secretary"));
    }
}
