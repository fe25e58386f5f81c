use crate::entities::{file_tags, prelude::*, processed_files};
use crate::models::{FileRecord, ProcessedFile, Statistics, Tag, TagCount, TagMatch, TagSource};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

/// Number of labels reported by `statistics`
const TOP_TAGS: usize = 10;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("file {0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Durable store for file metadata and tags. Every write is a single transaction.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Insert a file row and all of its tag rows atomically.
    async fn save(&self, file: &ProcessedFile, tags: &[Tag]) -> Result<(), PersistenceError>;

    async fn get(&self, id: &str) -> Result<FileRecord, PersistenceError>;

    /// Replace the file's manual tags with `tags`. Tags from other sources are untouched,
    /// so a manual label may coexist with an analyzer label of the same name.
    async fn update_tags(&self, id: &str, tags: &[Tag]) -> Result<FileRecord, PersistenceError>;

    /// Remove a file and its tags, returning the removed file.
    async fn delete(&self, id: &str) -> Result<ProcessedFile, PersistenceError>;

    /// Files having at least one tag in `labels` with confidence >= `min_confidence`,
    /// each with only its matching tags.
    async fn list_by_tags(
        &self,
        labels: &[String],
        min_confidence: f32,
    ) -> Result<Vec<TagMatch>, PersistenceError>;

    /// All files, newest first, optionally restricted to one category.
    async fn list(&self, category: Option<&str>) -> Result<Vec<FileRecord>, PersistenceError>;

    async fn statistics(&self) -> Result<Statistics, PersistenceError>;

    async fn ping(&self) -> bool;
}

pub struct SeaOrmMetadataRepository {
    db: DatabaseConnection,
}

impl SeaOrmMetadataRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn file_to_domain(model: processed_files::Model) -> ProcessedFile {
    ProcessedFile {
        id: model.id,
        filename: model.filename,
        storage_path: model.storage_path,
        file_type: model.file_type,
        category: model.category,
        file_size: model.file_size,
        checksum: model.checksum,
        project_ref: model.project_ref,
        vision_enabled: model.vision_enabled,
        processed_at: model.processed_at,
    }
}

fn tag_to_domain(model: file_tags::Model) -> Result<Tag, PersistenceError> {
    let source = model
        .source
        .parse::<TagSource>()
        .map_err(PersistenceError::Corrupt)?;
    Ok(Tag {
        file_id: model.file_id,
        label: model.label,
        confidence: model.confidence,
        source,
        created_at: model.created_at,
    })
}

/// Tags in stored rank order: confidence descending, then position.
fn sorted_tags(mut models: Vec<file_tags::Model>) -> Result<Vec<Tag>, PersistenceError> {
    models.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| a.source.cmp(&b.source))
    });
    models.into_iter().map(tag_to_domain).collect()
}

async fn insert_tags<C: ConnectionTrait>(
    conn: &C,
    file_id: &str,
    tags: &[Tag],
) -> Result<(), DbErr> {
    if tags.is_empty() {
        return Ok(());
    }

    let rows = tags.iter().enumerate().map(|(position, tag)| {
        file_tags::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            file_id: Set(file_id.to_string()),
            label: Set(tag.label.clone()),
            confidence: Set(tag.confidence),
            source: Set(tag.source.as_str().to_string()),
            position: Set(position as i32),
            created_at: Set(tag.created_at),
        }
    });

    FileTags::insert_many(rows).exec_without_returning(conn).await?;
    Ok(())
}

#[async_trait]
impl MetadataRepository for SeaOrmMetadataRepository {
    async fn save(&self, file: &ProcessedFile, tags: &[Tag]) -> Result<(), PersistenceError> {
        let txn = self.db.begin().await?;

        processed_files::ActiveModel {
            id: Set(file.id.clone()),
            filename: Set(file.filename.clone()),
            storage_path: Set(file.storage_path.clone()),
            file_type: Set(file.file_type.clone()),
            category: Set(file.category.clone()),
            file_size: Set(file.file_size),
            checksum: Set(file.checksum.clone()),
            project_ref: Set(file.project_ref.clone()),
            vision_enabled: Set(file.vision_enabled),
            processed_at: Set(file.processed_at),
        }
        .insert(&txn)
        .await?;

        insert_tags(&txn, &file.id, tags).await?;

        txn.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<FileRecord, PersistenceError> {
        let file = ProcessedFiles::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;

        let tags = FileTags::find()
            .filter(file_tags::Column::FileId.eq(id))
            .all(&self.db)
            .await?;

        Ok(FileRecord {
            file: file_to_domain(file),
            tags: sorted_tags(tags)?,
        })
    }

    async fn update_tags(&self, id: &str, tags: &[Tag]) -> Result<FileRecord, PersistenceError> {
        let manual: Vec<Tag> = tags
            .iter()
            .filter(|t| t.source == TagSource::Manual)
            .cloned()
            .collect();

        let txn = self.db.begin().await?;

        ProcessedFiles::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;

        FileTags::delete_many()
            .filter(file_tags::Column::FileId.eq(id))
            .filter(file_tags::Column::Source.eq(TagSource::Manual.as_str()))
            .exec(&txn)
            .await?;

        insert_tags(&txn, id, &manual).await?;

        txn.commit().await?;

        self.get(id).await
    }

    async fn delete(&self, id: &str) -> Result<ProcessedFile, PersistenceError> {
        let txn = self.db.begin().await?;

        let file = ProcessedFiles::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;

        // Explicit so the cascade holds on backends without foreign key enforcement.
        FileTags::delete_many()
            .filter(file_tags::Column::FileId.eq(id))
            .exec(&txn)
            .await?;

        ProcessedFiles::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(file_to_domain(file))
    }

    async fn list_by_tags(
        &self,
        labels: &[String],
        min_confidence: f32,
    ) -> Result<Vec<TagMatch>, PersistenceError> {
        if labels.is_empty() {
            return Ok(Vec::new());
        }

        let rows = FileTags::find()
            .filter(file_tags::Column::Label.is_in(labels.iter().cloned()))
            .filter(file_tags::Column::Confidence.gte(min_confidence))
            .find_also_related(ProcessedFiles)
            .order_by_asc(file_tags::Column::FileId)
            .all(&self.db)
            .await?;

        let mut grouped: BTreeMap<String, (processed_files::Model, Vec<file_tags::Model>)> =
            BTreeMap::new();
        for (tag, file) in rows {
            // Orphan rows cannot be ranked; skip them.
            let Some(file) = file else { continue };
            if tag.confidence < min_confidence {
                continue;
            }
            grouped
                .entry(file.id.clone())
                .or_insert_with(|| (file, Vec::new()))
                .1
                .push(tag);
        }

        grouped
            .into_values()
            .map(|(file, tags)| {
                Ok(TagMatch {
                    file_id: file.id,
                    processed_at: file.processed_at,
                    matching_tags: sorted_tags(tags)?,
                })
            })
            .collect()
    }

    async fn list(&self, category: Option<&str>) -> Result<Vec<FileRecord>, PersistenceError> {
        let mut query = ProcessedFiles::find();
        if let Some(category) = category {
            query = query.filter(processed_files::Column::Category.eq(category));
        }

        let rows = query
            .order_by_desc(processed_files::Column::ProcessedAt)
            .order_by_asc(processed_files::Column::Id)
            .find_with_related(FileTags)
            .all(&self.db)
            .await?;

        rows.into_iter()
            .map(|(file, tags)| {
                Ok(FileRecord {
                    file: file_to_domain(file),
                    tags: sorted_tags(tags)?,
                })
            })
            .collect()
    }

    async fn statistics(&self) -> Result<Statistics, PersistenceError> {
        let total_files = ProcessedFiles::find().count(&self.db).await?;

        let categories_raw: Vec<String> = ProcessedFiles::find()
            .select_only()
            .column(processed_files::Column::Category)
            .into_tuple()
            .all(&self.db)
            .await?;
        let mut categories = BTreeMap::new();
        for category in categories_raw {
            *categories.entry(category).or_insert(0u64) += 1;
        }

        // A label carried by the same file from two sources counts once.
        let pairs: Vec<(String, String)> = FileTags::find()
            .select_only()
            .column(file_tags::Column::Label)
            .column(file_tags::Column::FileId)
            .into_tuple()
            .all(&self.db)
            .await?;
        let mut files_per_label: HashMap<String, HashSet<String>> = HashMap::new();
        for (label, file_id) in pairs {
            files_per_label.entry(label).or_default().insert(file_id);
        }

        let mut top_tags: Vec<TagCount> = files_per_label
            .into_iter()
            .map(|(label, files)| TagCount {
                label,
                files: files.len() as u64,
            })
            .collect();
        top_tags.sort_by(|a, b| b.files.cmp(&a.files).then_with(|| a.label.cmp(&b.label)));
        top_tags.truncate(TOP_TAGS);

        Ok(Statistics {
            total_files,
            categories,
            top_tags,
        })
    }

    async fn ping(&self) -> bool {
        self.db.ping().await.is_ok()
    }
}

/// Build a tag row for `file_id` stamped now; used for manual tags.
pub fn manual_tag(file_id: &str, label: String, confidence: f32) -> Tag {
    Tag {
        file_id: file_id.to_string(),
        label,
        confidence,
        source: TagSource::Manual,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database;
    use chrono::{Duration, TimeZone};
    use sea_orm::Database;

    async fn setup_repo() -> SeaOrmMetadataRepository {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        database::run_migrations(&db).await.unwrap();
        SeaOrmMetadataRepository::new(db)
    }

    fn file(id: &str, category: &str, minutes: i64) -> ProcessedFile {
        ProcessedFile {
            id: id.to_string(),
            filename: format!("{}.jpg", id),
            storage_path: format!("aa/bb/{}.bin", id),
            file_type: "image/jpeg".to_string(),
            category: category.to_string(),
            file_size: 42,
            checksum: "00".repeat(32),
            project_ref: "proj-1".to_string(),
            vision_enabled: true,
            processed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    fn tag(file_id: &str, label: &str, confidence: f32, source: TagSource) -> Tag {
        Tag {
            file_id: file_id.to_string(),
            label: label.to_string(),
            confidence,
            source,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let repo = setup_repo().await;
        let f = file("f1", "image", 0);
        let tags = vec![
            tag("f1", "cat", 0.98, TagSource::RemoteAnalysis),
            tag("f1", "sofa", 0.92, TagSource::RemoteAnalysis),
        ];
        repo.save(&f, &tags).await.unwrap();

        let record = repo.get("f1").await.unwrap();
        assert_eq!(record.file, f);
        let labels: Vec<_> = record.tags.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["cat", "sofa"]);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let repo = setup_repo().await;
        assert!(matches!(
            repo.get("missing").await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_is_atomic() {
        let repo = setup_repo().await;
        let f = file("f1", "image", 0);
        // Same label twice from the same source violates the unique index.
        let tags = vec![
            tag("f1", "cat", 0.9, TagSource::RemoteAnalysis),
            tag("f1", "cat", 0.8, TagSource::RemoteAnalysis),
        ];
        assert!(repo.save(&f, &tags).await.is_err());
        assert!(matches!(
            repo.get("f1").await,
            Err(PersistenceError::NotFound(_))
        ));
        assert_eq!(repo.statistics().await.unwrap().top_tags.len(), 0);
    }

    #[tokio::test]
    async fn test_update_tags_replaces_manual_only() {
        let repo = setup_repo().await;
        repo.save(
            &file("f1", "image", 0),
            &[tag("f1", "cat", 0.9, TagSource::RemoteAnalysis)],
        )
        .await
        .unwrap();

        repo.update_tags("f1", &[tag("f1", "cat", 1.0, TagSource::Manual)])
            .await
            .unwrap();
        let record = repo
            .update_tags("f1", &[tag("f1", "favourite", 1.0, TagSource::Manual)])
            .await
            .unwrap();

        let mut entries: Vec<_> = record
            .tags
            .iter()
            .map(|t| (t.label.as_str(), t.source))
            .collect();
        entries.sort_by_key(|(l, _)| *l);
        assert_eq!(
            entries,
            vec![
                ("cat", TagSource::RemoteAnalysis),
                ("favourite", TagSource::Manual)
            ]
        );

        assert!(matches!(
            repo.update_tags("missing", &[]).await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let repo = setup_repo().await;
        repo.save(
            &file("f1", "image", 0),
            &[tag("f1", "cat", 0.9, TagSource::RemoteAnalysis)],
        )
        .await
        .unwrap();

        let removed = repo.delete("f1").await.unwrap();
        assert_eq!(removed.storage_path, "aa/bb/f1.bin");
        assert!(matches!(
            repo.get("f1").await,
            Err(PersistenceError::NotFound(_))
        ));
        assert!(repo
            .list_by_tags(&["cat".to_string()], 0.0)
            .await
            .unwrap()
            .is_empty());
        let orphans = FileTags::find().all(&repo.db).await.unwrap();
        assert!(orphans.is_empty());

        assert!(matches!(
            repo.delete("f1").await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_tags_filters_confidence() {
        let repo = setup_repo().await;
        repo.save(
            &file("f1", "image", 0),
            &[
                tag("f1", "landscape", 0.95, TagSource::RemoteAnalysis),
                tag("f1", "nature", 0.88, TagSource::RemoteAnalysis),
                tag("f1", "sky", 0.99, TagSource::RemoteAnalysis),
            ],
        )
        .await
        .unwrap();
        repo.save(
            &file("f2", "image", 1),
            &[tag("f2", "nature", 0.75, TagSource::LocalHeuristic)],
        )
        .await
        .unwrap();

        let matches = repo
            .list_by_tags(&["landscape".to_string(), "nature".to_string()], 0.8)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].file_id, "f1");
        let labels: Vec<_> = matches[0]
            .matching_tags
            .iter()
            .map(|t| t.label.as_str())
            .collect();
        assert_eq!(labels, vec!["landscape", "nature"]);
    }

    #[tokio::test]
    async fn test_list_and_statistics() {
        let repo = setup_repo().await;
        repo.save(
            &file("f1", "image", 0),
            &[
                tag("f1", "cat", 0.9, TagSource::RemoteAnalysis),
                tag("f1", "pet", 0.8, TagSource::RemoteAnalysis),
            ],
        )
        .await
        .unwrap();
        repo.save(
            &file("f2", "image", 5),
            &[tag("f2", "cat", 0.7, TagSource::LocalHeuristic)],
        )
        .await
        .unwrap();
        repo.save(
            &file("f3", "document", 10),
            &[tag("f3", "pdf", 0.8, TagSource::LocalHeuristic)],
        )
        .await
        .unwrap();
        repo.update_tags("f2", &[tag("f2", "cat", 1.0, TagSource::Manual)])
            .await
            .unwrap();

        let all = repo.list(None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.file.id.as_str()).collect();
        assert_eq!(ids, vec!["f3", "f2", "f1"]);

        let images = repo.list(Some("image")).await.unwrap();
        assert_eq!(images.len(), 2);

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.categories.get("image"), Some(&2));
        assert_eq!(stats.categories.get("document"), Some(&1));
        assert_eq!(
            stats.top_tags[0],
            TagCount {
                label: "cat".into(),
                files: 2
            }
        );
        assert_eq!(stats.top_tags.len(), 3);
    }

    #[tokio::test]
    async fn test_ping() {
        let repo = setup_repo().await;
        assert!(repo.ping().await);
    }
}
