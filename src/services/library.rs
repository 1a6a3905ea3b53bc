use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::base::{ServiceResult, first, page, row, run};
use crate::backend::{Filter, Range, Select, TableClient, query::contains_pattern};
use crate::error::BackendError;
use crate::models::membership::check_degree;
use crate::models::{LibraryEntry, LibraryEntryUpdate, LibraryKind, NewLibraryEntry, Page};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibraryQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    /// Only entries open to this degree or below.
    pub max_degree: Option<i32>,
}

impl Default for LibraryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            search: None,
            category: None,
            tag: None,
            max_degree: None,
        }
    }
}

/// Documents, planches and news: one row shape, three tables.
#[derive(Clone)]
pub struct LibraryService {
    db: Arc<dyn TableClient>,
}

fn by_id(id: Uuid) -> Vec<Filter> {
    vec![Filter::Eq("id".into(), id.to_string().into())]
}

impl LibraryService {
    pub fn new(db: Arc<dyn TableClient>) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        kind: LibraryKind,
        lodge_id: Uuid,
        query: &LibraryQuery,
    ) -> ServiceResult<Page<LibraryEntry>> {
        run("library.list", async {
            let mut select = Select::from(kind.table()).eq("lodge_id", lodge_id);
            if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
                select = select.eq("category", category);
            }
            if let Some(tag) = query.tag.as_deref().filter(|t| !t.is_empty()) {
                select = select.contains("tags", [tag]);
            }
            if let Some(degree) = query.max_degree {
                select = select.filter(Filter::Or(vec![
                    Filter::IsNull("degree".into()),
                    Filter::Lte("degree".into(), degree.into()),
                ]));
            }
            if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                let pattern = contains_pattern(term);
                select = select.filter(Filter::Or(vec![
                    Filter::ILike("title".into(), pattern.clone()),
                    Filter::ILike("content".into(), pattern),
                ]));
            }
            let rows = self
                .db
                .select(
                    select
                        .order("created_at", false)
                        .range(Range::page(query.page, query.page_size))
                        .with_count(),
                )
                .await?;
            page(rows, query.page, query.page_size)
        })
        .await
    }

    pub async fn get(&self, kind: LibraryKind, id: Uuid) -> ServiceResult<LibraryEntry> {
        run("library.get", async {
            let rows = self.db.select(Select::from(kind.table()).eq("id", id)).await?;
            first(rows.rows, kind.table())
        })
        .await
    }

    pub async fn create(&self, kind: LibraryKind, entry: &NewLibraryEntry) -> ServiceResult<LibraryEntry> {
        run("library.create", async {
            if entry.title.trim().is_empty() {
                return Err(BackendError::validation("title is required"));
            }
            if let Some(degree) = entry.degree {
                check_degree(degree)?;
            }
            let written = self.db.insert(kind.table(), vec![row(entry)?]).await?;
            first(written, kind.table())
        })
        .await
    }

    pub async fn update(
        &self,
        kind: LibraryKind,
        id: Uuid,
        update: &LibraryEntryUpdate,
    ) -> ServiceResult<LibraryEntry> {
        run("library.update", async {
            if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
                return Err(BackendError::validation("title cannot be blank"));
            }
            if let Some(degree) = update.degree {
                check_degree(degree)?;
            }
            let mut patch = row(update)?;
            if patch.as_object().is_some_and(|p| p.is_empty()) {
                return Err(BackendError::validation("nothing to update"));
            }
            patch["updated_at"] = serde_json::to_value(Utc::now())?;
            let written = self.db.update(kind.table(), by_id(id), patch).await?;
            first(written, kind.table())
        })
        .await
    }

    pub async fn delete(&self, kind: LibraryKind, id: Uuid) -> ServiceResult<()> {
        run("library.delete", async {
            let deleted = self.db.delete(kind.table(), by_id(id)).await?;
            if deleted.is_empty() {
                return Err(BackendError::not_found(format!("{} not found", kind.table())));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryTables;
    use crate::error::ErrorKind;

    fn entry(lodge_id: Uuid, title: &str, tags: &[&str], degree: Option<i32>) -> NewLibraryEntry {
        NewLibraryEntry {
            lodge_id,
            title: title.into(),
            content: Some(format!("Texte de {}", title)),
            author_id: None,
            category: Some("symbolisme".into()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            file_url: None,
            degree,
        }
    }

    #[tokio::test]
    async fn kinds_live_in_separate_tables() {
        let db = Arc::new(MemoryTables::with_portal_schema());
        let library = LibraryService::new(db.clone());
        let lodge = Uuid::new_v4();
        library
            .create(LibraryKind::Planche, &entry(lodge, "La pierre brute", &[], Some(1)))
            .await
            .into_result()
            .unwrap();
        library
            .create(LibraryKind::News, &entry(lodge, "Agenda", &[], None))
            .await
            .into_result()
            .unwrap();
        assert_eq!(db.rows("planches").len(), 1);
        assert_eq!(db.rows("news").len(), 1);
        assert!(db.rows("documents").is_empty());
    }

    #[tokio::test]
    async fn filters_by_tag_degree_and_search() {
        let library = LibraryService::new(Arc::new(MemoryTables::with_portal_schema()));
        let lodge = Uuid::new_v4();
        for (title, tags, degree) in [
            ("Le delta lumineux", vec!["symboles"], Some(1)),
            ("La chambre du milieu", vec!["symboles", "grade"], Some(3)),
            ("Histoire de la loge", vec![], None),
        ] {
            library
                .create(LibraryKind::Planche, &entry(lodge, title, &tags, degree))
                .await
                .into_result()
                .unwrap();
        }

        let apprentice = LibraryQuery {
            max_degree: Some(1),
            ..Default::default()
        };
        let page = library.list(LibraryKind::Planche, lodge, &apprentice).await.into_result().unwrap();
        assert_eq!(page.total, 2);

        let tagged = LibraryQuery {
            tag: Some("grade".into()),
            ..Default::default()
        };
        let page = library.list(LibraryKind::Planche, lodge, &tagged).await.into_result().unwrap();
        assert_eq!(page.items[0].title, "La chambre du milieu");

        let search = LibraryQuery {
            search: Some("DELTA".into()),
            ..Default::default()
        };
        let page = library.list(LibraryKind::Planche, lodge, &search).await.into_result().unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let library = LibraryService::new(Arc::new(MemoryTables::with_portal_schema()));
        let created = library
            .create(LibraryKind::Document, &entry(Uuid::new_v4(), "Statuts", &[], None))
            .await
            .into_result()
            .unwrap();
        let update = LibraryEntryUpdate {
            title: Some("Statuts 2026".into()),
            ..Default::default()
        };
        let updated = library
            .update(LibraryKind::Document, created.id, &update)
            .await
            .into_result()
            .unwrap();
        assert_eq!(updated.title, "Statuts 2026");
        assert!(updated.updated_at.is_some());

        library.delete(LibraryKind::Document, created.id).await.into_result().unwrap();
        let err = library.get(LibraryKind::Document, created.id).await.error.unwrap();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
