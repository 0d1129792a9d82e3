use async_trait::async_trait;
use sqlx::{Postgres, Transaction, postgres::PgArguments, query::QueryAs};
use uuid::Uuid;

use crate::{
    application::repos::{CollectionsRepo, RepoError},
    domain::collections::{
        CollectionDraft, CollectionId, CollectionKey, CollectionRecord, CollectionType, Locale,
        UserId,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const FIND_BY_KEY_SQL: &str = r#"
    SELECT c.id, c.collection_key, c.collection_type, c.parent_id, m.title
    FROM collections c
    LEFT JOIN collection_meta m
        ON m.collection_id = c.id
        AND m.locale = $2
    WHERE c.collection_key = $1
"#;

#[derive(sqlx::FromRow)]
struct CollectionRow {
    id: Uuid,
    collection_key: Option<String>,
    collection_type: String,
    parent_id: Option<Uuid>,
    title: Option<String>,
}

impl CollectionRow {
    fn into_record(self, locale: &Locale) -> Result<CollectionRecord, RepoError> {
        let key = self
            .collection_key
            .as_deref()
            .map(CollectionKey::parse)
            .transpose()
            .map_err(|err| RepoError::Integrity {
                message: err.to_string(),
            })?;
        let collection_type =
            self.collection_type
                .parse::<CollectionType>()
                .map_err(|err| RepoError::Integrity {
                    message: err.to_string(),
                })?;

        Ok(CollectionRecord {
            id: CollectionId::from_uuid(self.id),
            key,
            collection_type,
            parent_id: self.parent_id.map(CollectionId::from_uuid),
            locale: locale.clone(),
            title: self.title,
        })
    }
}

fn find_by_key_query<'q>(
    key: &'q CollectionKey,
    locale: &'q Locale,
) -> QueryAs<'q, Postgres, CollectionRow, PgArguments> {
    sqlx::query_as::<_, CollectionRow>(FIND_BY_KEY_SQL)
        .bind(key.as_str())
        .bind(locale.as_str())
}

#[async_trait]
impl CollectionsRepo for PostgresRepositories {
    async fn find_by_key(
        &self,
        key: &CollectionKey,
        locale: &Locale,
    ) -> Result<Option<CollectionRecord>, RepoError> {
        let mut pending = self.pending().await;
        let result = match pending.as_mut() {
            Some(tx) => find_by_key_query(key, locale).fetch_optional(&mut **tx).await,
            None => find_by_key_query(key, locale).fetch_optional(self.pool()).await,
        };
        if result.is_err() {
            // A failed statement aborts the transaction and every later one
            // would be rejected; drop it so the next write starts over.
            pending.take();
        }
        let row = result.map_err(map_sqlx_error)?;

        row.map(|row| row.into_record(locale)).transpose()
    }

    async fn save(
        &self,
        draft: CollectionDraft,
        actor: Option<UserId>,
    ) -> Result<CollectionRecord, RepoError> {
        let mut pending = self.pending().await;
        self.ensure_transaction(&mut pending).await?;
        let Some(tx) = pending.as_mut() else {
            return Err(RepoError::from_persistence("write transaction unavailable"));
        };

        let result = save_in_transaction(tx, draft, actor).await;
        if result.is_err() {
            pending.take();
        }
        result
    }

    async fn flush(&self) -> Result<(), RepoError> {
        let mut pending = self.pending().await;
        if let Some(tx) = pending.take() {
            tx.commit().await.map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn discard(&self) -> Result<(), RepoError> {
        let mut pending = self.pending().await;
        if let Some(tx) = pending.take() {
            tx.rollback().await.map_err(map_sqlx_error)?;
        }
        Ok(())
    }
}

async fn save_in_transaction(
    tx: &mut Transaction<'static, Postgres>,
    draft: CollectionDraft,
    actor: Option<UserId>,
) -> Result<CollectionRecord, RepoError> {
    let actor = actor.map(|user| user.get());
    let parent_id = draft.parent_id.map(|id| id.as_uuid());

    let id = match draft.id {
        Some(id) => {
            let updated = sqlx::query(
                r#"
                UPDATE collections
                SET parent_id = $2, updated_by = $3, updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(id.as_uuid())
            .bind(parent_id)
            .bind(actor)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
            if updated.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            id
        }
        None => {
            let id = CollectionId::new_v4();
            sqlx::query(
                r#"
                INSERT INTO collections (
                    id, collection_key, collection_type, parent_id, created_by, updated_by
                )
                VALUES ($1, $2, $3, $4, $5, $5)
                "#,
            )
            .bind(id.as_uuid())
            .bind(draft.key.as_str())
            .bind(draft.collection_type.as_str())
            .bind(parent_id)
            .bind(actor)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
            id
        }
    };

    sqlx::query(
        r#"
        INSERT INTO collection_meta (collection_id, locale, title)
        VALUES ($1, $2, $3)
        ON CONFLICT (collection_id, locale) DO UPDATE SET title = EXCLUDED.title
        "#,
    )
    .bind(id.as_uuid())
    .bind(draft.locale.as_str())
    .bind(draft.title.as_str())
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    Ok(CollectionRecord {
        id,
        key: Some(draft.key),
        collection_type: draft.collection_type,
        parent_id: draft.parent_id,
        locale: draft.locale,
        title: Some(draft.title),
    })
}
