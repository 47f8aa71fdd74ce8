#![forbid(unsafe_code)]

//! Document persistence layer.
//!
//! Each collection is a libSQL table holding one JSON document per row. Queries
//! are expressed with [`Filter`] / [`Query`] and compiled to `json_extract`
//! expressions, so handlers never write SQL. Every public operation opens its
//! own short-lived connection; read-modify-write operations run inside a
//! `BEGIN IMMEDIATE` transaction so concurrent writers serialize on the
//! database lock instead of racing.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use libsql::{Builder, Connection, Database, TransactionBehavior, Value};
use serde::{Serialize, de::DeserializeOwned};

use crate::object_id::ObjectId;

/// A record type stored in its own collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Table name. Must be a plain identifier.
    const COLLECTION: &'static str;
    /// Field groups that must be unique together. Missing fields count as an
    /// empty value, so optional targets still participate in the constraint.
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[];
    /// Fields that get a lookup index.
    const INDEXED_FIELDS: &'static [&'static str] = &[];

    fn id(&self) -> ObjectId;

    /// Refreshes the modification timestamp before a write.
    fn touch(&mut self);
}

/// Predicate over documents of one collection. Field names are code
/// constants, values are always bound as parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(&'static str, serde_json::Value),
    /// Case-insensitive substring match on a string field.
    Contains(&'static str, String),
    Exists(&'static str),
    In(&'static str, Vec<serde_json::Value>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Into<serde_json::Value>) -> Self {
        Self::Eq(field, value.into())
    }

    pub fn contains(field: &'static str, needle: impl Into<String>) -> Self {
        Self::Contains(field, needle.into())
    }

    pub fn exists(field: &'static str) -> Self {
        Self::Exists(field)
    }

    pub fn any_of<I, V>(field: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        Self::In(field, values.into_iter().map(Into::into).collect())
    }

    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, other) => other,
            (this, Self::All) => this,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (this, other) => Self::And(vec![this, other]),
        }
    }

    fn compile(&self, params: &mut Vec<Value>) -> Result<String> {
        let clause = match self {
            Self::All => "1".to_string(),
            Self::Eq(field, serde_json::Value::Null) => {
                format!("{} IS NULL", field_expr(field)?)
            }
            Self::Eq(field, value) => {
                params.push(to_sql_value(value));
                format!("{} = ?", field_expr(field)?)
            }
            Self::Contains(field, needle) => {
                params.push(Value::Text(needle.clone()));
                format!("instr(lower({}), lower(?)) > 0", field_expr(field)?)
            }
            Self::Exists(field) => format!("{} IS NOT NULL", field_expr(field)?),
            Self::In(_, values) if values.is_empty() => "0".to_string(),
            // One bound JSON array, so long id lists stay clear of the
            // host parameter limit.
            Self::In(field, values) => {
                let list = serde_json::to_string(values).context("encoding value list")?;
                params.push(Value::Text(list));
                format!(
                    "{} IN (SELECT value FROM json_each(?))",
                    field_expr(field)?
                )
            }
            Self::And(filters) if filters.is_empty() => "1".to_string(),
            Self::And(filters) => {
                let mut parts = Vec::with_capacity(filters.len());
                for filter in filters {
                    parts.push(format!("({})", filter.compile(params)?));
                }
                parts.join(" AND ")
            }
        };
        Ok(clause)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: &'static str,
    pub direction: Direction,
}

/// Filter plus ordering and paging. Without an explicit sort, documents come
/// back in insertion order. Ties are always broken by insertion order in the
/// sort direction, which keeps pagination stable.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Option<Sort>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort: None,
            skip: 0,
            limit: None,
        }
    }

    pub fn sort(mut self, field: &'static str, direction: Direction) -> Self {
        self.sort = Some(Sort { field, direction });
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Applies 1-based page numbering.
    pub fn page(self, page: u64, limit: u64) -> Self {
        self.skip(page.saturating_sub(1).saturating_mul(limit))
            .limit(limit)
    }
}

/// Outcome of [`DocumentStore::toggle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Toggle<T> {
    Inserted(T),
    Removed(T),
}

impl<T> Toggle<T> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Handle to the document database. Cheap to clone.
#[derive(Clone)]
pub struct DocumentStore {
    db: Arc<Database>,
}

impl DocumentStore {
    /// Opens (and if necessary creates) the database file.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening document store {}", path.display()))?;

        let store = Self { db: Arc::new(db) };
        let conn = store.connect().await?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .await
            .context("enabling WAL mode")?;
        Ok(store)
    }

    async fn connect(&self) -> Result<Connection> {
        let conn = self.db.connect().context("connecting to document store")?;
        conn.execute_batch(
            r#"
            PRAGMA busy_timeout=5000;
            PRAGMA synchronous=NORMAL;
            "#,
        )
        .await?;
        Ok(conn)
    }

    /// Creates the collection table and its indexes if missing.
    pub async fn ensure_collection<T: Document>(&self) -> Result<()> {
        let collection = collection_name::<T>()?;
        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {collection} (\n    id TEXT PRIMARY KEY,\n    doc TEXT NOT NULL\n);\n"
        );
        for field in T::INDEXED_FIELDS {
            ddl.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{collection}_{field} ON {collection}({});\n",
                field_expr(field)?
            ));
        }
        for (position, key) in T::UNIQUE_KEYS.iter().enumerate() {
            let mut columns = Vec::with_capacity(key.len());
            for field in key.iter() {
                columns.push(format!("ifnull({}, '')", field_expr(field)?));
            }
            ddl.push_str(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS uniq_{collection}_{position} ON {collection}({});\n",
                columns.join(", ")
            ));
        }

        let conn = self.connect().await?;
        conn.execute_batch(&ddl)
            .await
            .with_context(|| format!("creating collection {collection}"))?;
        Ok(())
    }

    pub async fn insert<T: Document>(&self, doc: &T) -> Result<()> {
        let collection = collection_name::<T>()?;
        let raw = serde_json::to_string(doc).context("serializing document")?;
        let conn = self.connect().await?;
        conn.execute(
            &format!("INSERT INTO {collection} (id, doc) VALUES (?1, ?2)"),
            vec![Value::Text(doc.id().to_hex()), Value::Text(raw)],
        )
        .await
        .with_context(|| format!("inserting into {collection}"))?;
        Ok(())
    }

    pub async fn find_by_id<T: Document>(&self, id: ObjectId) -> Result<Option<T>> {
        let collection = collection_name::<T>()?;
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT doc FROM {collection} WHERE id = ?1"),
                vec![Value::Text(id.to_hex())],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(decode(&row.get::<String>(0)?)?)),
            None => Ok(None),
        }
    }

    pub async fn find<T: Document>(&self, query: &Query) -> Result<Vec<T>> {
        let collection = collection_name::<T>()?;
        let mut params = Vec::new();
        let clause = query.filter.compile(&mut params)?;
        let order = match query.sort {
            Some(Sort { field, direction }) => format!(
                "{} {dir}, rowid {dir}",
                field_expr(field)?,
                dir = direction.as_sql()
            ),
            None => "rowid ASC".to_string(),
        };
        let limit = query
            .limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        params.push(Value::Integer(limit));
        params.push(Value::Integer(
            i64::try_from(query.skip).unwrap_or(i64::MAX),
        ));

        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT doc FROM {collection} WHERE {clause} ORDER BY {order} LIMIT ? OFFSET ?"
                ),
                params,
            )
            .await
            .with_context(|| format!("querying {collection}"))?;

        let mut docs = Vec::new();
        while let Some(row) = rows.next().await? {
            docs.push(decode(&row.get::<String>(0)?)?);
        }
        Ok(docs)
    }

    pub async fn find_one<T: Document>(&self, filter: Filter) -> Result<Option<T>> {
        let mut found = self.find(&Query::new(filter).limit(1)).await?;
        Ok(found.pop())
    }

    /// Loads, mutates and writes back a single document inside one
    /// transaction. Returns the stored result, or `None` when the id is unknown.
    pub async fn update_by_id<T, F>(&self, id: ObjectId, apply: F) -> Result<Option<T>>
    where
        T: Document,
        F: FnOnce(&mut T) + Send,
    {
        let collection = collection_name::<T>()?;
        let conn = self.connect().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;

        let mut rows = tx
            .query(
                &format!("SELECT doc FROM {collection} WHERE id = ?1"),
                vec![Value::Text(id.to_hex())],
            )
            .await?;
        let current = match rows.next().await? {
            Some(row) => row.get::<String>(0)?,
            None => {
                drop(rows);
                tx.rollback().await?;
                return Ok(None);
            }
        };
        drop(rows);

        let mut doc: T = decode(&current)?;
        apply(&mut doc);
        doc.touch();
        let raw = serde_json::to_string(&doc).context("serializing document")?;
        tx.execute(
            &format!("UPDATE {collection} SET doc = ?2 WHERE id = ?1"),
            vec![Value::Text(id.to_hex()), Value::Text(raw)],
        )
        .await
        .with_context(|| format!("updating {collection}"))?;
        tx.commit().await?;
        Ok(Some(doc))
    }

    /// Removes a document and returns what was stored.
    pub async fn delete_by_id<T: Document>(&self, id: ObjectId) -> Result<Option<T>> {
        let collection = collection_name::<T>()?;
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("DELETE FROM {collection} WHERE id = ?1 RETURNING doc"),
                vec![Value::Text(id.to_hex())],
            )
            .await
            .with_context(|| format!("deleting from {collection}"))?;
        let mut removed = None;
        while let Some(row) = rows.next().await? {
            removed = Some(decode(&row.get::<String>(0)?)?);
        }
        Ok(removed)
    }

    pub async fn count<T: Document>(&self, filter: &Filter) -> Result<u64> {
        let collection = collection_name::<T>()?;
        let mut params = Vec::new();
        let clause = filter.compile(&mut params)?;
        let count: i64 = self
            .scalar(
                &format!("SELECT COUNT(*) FROM {collection} WHERE {clause}"),
                params,
            )
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Sums a numeric field over the matching documents. Missing fields count
    /// as zero.
    pub async fn sum<T: Document>(&self, field: &'static str, filter: &Filter) -> Result<i64> {
        let collection = collection_name::<T>()?;
        let mut params = Vec::new();
        let clause = filter.compile(&mut params)?;
        self.scalar(
            &format!(
                "SELECT CAST(COALESCE(SUM({}), 0) AS INTEGER) FROM {collection} WHERE {clause}",
                field_expr(field)?
            ),
            params,
        )
        .await
    }

    /// Distinct non-null values of `field`, in order of first appearance.
    pub async fn distinct<T, V>(&self, field: &'static str, filter: &Filter) -> Result<Vec<V>>
    where
        T: Document,
        V: DeserializeOwned,
    {
        let collection = collection_name::<T>()?;
        let expr = field_expr(field)?;
        let mut params = Vec::new();
        let clause = filter.compile(&mut params)?;
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {expr} AS value FROM {collection} \
                     WHERE ({clause}) AND {expr} IS NOT NULL \
                     GROUP BY value ORDER BY MIN(rowid)"
                ),
                params,
            )
            .await
            .with_context(|| format!("collecting distinct {field} from {collection}"))?;

        let mut values = Vec::new();
        while let Some(row) = rows.next().await? {
            let value = from_sql_value(row.get_value(0)?);
            values.push(
                serde_json::from_value(value)
                    .with_context(|| format!("decoding distinct {field} value"))?,
            );
        }
        Ok(values)
    }

    /// Removes every document matching `key`; if none matched, inserts `doc`
    /// instead. Both branches run in one transaction, so two concurrent
    /// toggles on the same key always alternate.
    pub async fn toggle<T: Document>(&self, doc: T, key: &Filter) -> Result<Toggle<T>> {
        let collection = collection_name::<T>()?;
        let mut params = Vec::new();
        let clause = key.compile(&mut params)?;
        let conn = self.connect().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;

        let mut rows = tx
            .query(
                &format!("DELETE FROM {collection} WHERE {clause} RETURNING doc"),
                params,
            )
            .await
            .with_context(|| format!("toggling in {collection}"))?;
        let mut removed = None;
        while let Some(row) = rows.next().await? {
            removed = Some(row.get::<String>(0)?);
        }
        drop(rows);

        if let Some(raw) = removed {
            tx.commit().await?;
            return Ok(Toggle::Removed(decode(&raw)?));
        }

        let raw = serde_json::to_string(&doc).context("serializing document")?;
        tx.execute(
            &format!("INSERT INTO {collection} (id, doc) VALUES (?1, ?2)"),
            vec![Value::Text(doc.id().to_hex()), Value::Text(raw)],
        )
        .await
        .with_context(|| format!("inserting into {collection}"))?;
        tx.commit().await?;
        Ok(Toggle::Inserted(doc))
    }

    async fn scalar(&self, sql: &str, params: Vec<Value>) -> Result<i64> {
        let conn = self.connect().await?;
        let mut rows = conn.query(sql, params).await?;
        let row = rows.next().await?.context("aggregate returned no row")?;
        Ok(row.get::<i64>(0)?)
    }
}

fn collection_name<T: Document>() -> Result<&'static str> {
    if !is_identifier(T::COLLECTION) {
        bail!("invalid collection name {:?}", T::COLLECTION);
    }
    Ok(T::COLLECTION)
}

/// Field names are interpolated into SQL, so only plain identifiers pass.
fn field_expr(field: &str) -> Result<String> {
    if field == "_id" || is_identifier(field) {
        Ok(format!("json_extract(doc, '$.{field}')"))
    } else {
        bail!("invalid field name {field:?}")
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).context("decoding stored document")
}

/// JSON scalars map onto what `json_extract` yields for the same value.
fn to_sql_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(flag) => Value::Integer(i64::from(*flag)),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(integer) => Value::Integer(integer),
            None => Value::Real(number.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(text) => Value::Text(text.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn from_sql_value(value: Value) -> serde_json::Value {
    match value {
        Value::Null | Value::Blob(_) => serde_json::Value::Null,
        Value::Integer(integer) => serde_json::Value::from(integer),
        Value::Real(real) => serde_json::Number::from_f64(real)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(text) => serde_json::Value::String(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        #[serde(rename = "_id")]
        id: ObjectId,
        title: String,
        rank: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        pinned: bool,
        revision: u32,
    }

    impl Document for Note {
        const COLLECTION: &'static str = "notes";
        const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[&["title", "topic"]];
        const INDEXED_FIELDS: &'static [&'static str] = &["rank"];

        fn id(&self) -> ObjectId {
            self.id
        }

        fn touch(&mut self) {
            self.revision += 1;
        }
    }

    fn note(title: &str, rank: i64) -> Note {
        Note {
            id: ObjectId::new(),
            title: title.into(),
            rank,
            topic: None,
            pinned: false,
            revision: 0,
        }
    }

    async fn create_store() -> Result<(tempfile::TempDir, DocumentStore)> {
        let dir = tempdir()?;
        let store = DocumentStore::open(&dir.path().join("data/test.db")).await?;
        store.ensure_collection::<Note>().await?;
        Ok((dir, store))
    }

    #[tokio::test]
    async fn insert_then_find_by_id_roundtrips() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let mut stored = note("first", 3);
        stored.topic = Some("rust".into());
        store.insert(&stored).await?;

        let fetched: Note = store.find_by_id(stored.id).await?.expect("note stored");
        assert_eq!(fetched, stored);
        assert!(store.find_by_id::<Note>(ObjectId::new()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() -> Result<()> {
        let (_dir, store) = create_store().await?;
        store.ensure_collection::<Note>().await?;
        store.insert(&note("still works", 1)).await?;
        assert_eq!(store.count::<Note>(&Filter::All).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn filters_combine() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let mut pinned = note("Rust Ownership", 1);
        pinned.pinned = true;
        store.insert(&pinned).await?;
        store.insert(&note("rusty nails", 2)).await?;
        let mut tagged = note("gardening", 3);
        tagged.topic = Some("home".into());
        store.insert(&tagged).await?;

        let rust: Vec<Note> = store
            .find(&Query::new(Filter::contains("title", "RUST")))
            .await?;
        assert_eq!(rust.len(), 2);

        let pinned_rust: Vec<Note> = store
            .find(&Query::new(
                Filter::contains("title", "rust").and(Filter::eq("pinned", true)),
            ))
            .await?;
        assert_eq!(pinned_rust, vec![pinned.clone()]);

        let with_topic: Vec<Note> = store.find(&Query::new(Filter::exists("topic"))).await?;
        assert_eq!(with_topic, vec![tagged.clone()]);

        let by_id: Vec<Note> = store
            .find(&Query::new(Filter::any_of("_id", [pinned.id, tagged.id])))
            .await?;
        assert_eq!(by_id.len(), 2);

        let none: Vec<Note> = store
            .find(&Query::new(Filter::any_of("_id", Vec::<ObjectId>::new())))
            .await?;
        assert!(none.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn any_of_accepts_more_values_than_bind_slots() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let wanted = note("wanted", 1);
        store.insert(&wanted).await?;
        store.insert(&note("other", 2)).await?;

        let mut ids: Vec<ObjectId> = (0..40_000).map(|_| ObjectId::new()).collect();
        ids.push(wanted.id);
        let filter = Filter::any_of("_id", ids);
        assert_eq!(store.count::<Note>(&filter).await?, 1);

        let ranks = Filter::any_of("rank", [2, 3]);
        let found: Vec<Note> = store.find(&Query::new(ranks)).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "other");
        Ok(())
    }

    #[tokio::test]
    async fn sorting_and_paging_are_stable() -> Result<()> {
        let (_dir, store) = create_store().await?;
        for (index, rank) in [5, 1, 3, 1, 4, 2, 5].into_iter().enumerate() {
            store.insert(&note(&format!("n{index}"), rank)).await?;
        }

        let ascending: Vec<Note> = store
            .find(&Query::new(Filter::All).sort("rank", Direction::Asc))
            .await?;
        let ranks: Vec<i64> = ascending.iter().map(|n| n.rank).collect();
        assert_eq!(ranks, vec![1, 1, 2, 3, 4, 5, 5]);
        assert_eq!(ascending[0].title, "n1");
        assert_eq!(ascending[1].title, "n3");

        let mut seen = Vec::new();
        for page in 1..=4 {
            let items: Vec<Note> = store
                .find(
                    &Query::new(Filter::All)
                        .sort("rank", Direction::Desc)
                        .page(page, 2),
                )
                .await?;
            assert!(items.len() <= 2);
            for item in items {
                assert!(!seen.contains(&item.id), "pages overlap");
                seen.push(item.id);
            }
        }
        assert_eq!(seen.len(), 7);
        Ok(())
    }

    #[tokio::test]
    async fn update_by_id_applies_changes_and_touches() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let stored = note("draft", 1);
        store.insert(&stored).await?;

        let updated: Note = store
            .update_by_id(stored.id, |note: &mut Note| note.title = "final".into())
            .await?
            .expect("note exists");
        assert_eq!(updated.title, "final");
        assert_eq!(updated.revision, 1);

        let fetched: Note = store.find_by_id(stored.id).await?.expect("note exists");
        assert_eq!(fetched, updated);

        let missing: Option<Note> = store
            .update_by_id(ObjectId::new(), |note: &mut Note| note.rank = 9)
            .await?;
        assert!(missing.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn delete_by_id_returns_removed_document() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let stored = note("doomed", 1);
        store.insert(&stored).await?;

        let removed: Option<Note> = store.delete_by_id(stored.id).await?;
        assert_eq!(removed, Some(stored.clone()));
        assert!(store.delete_by_id::<Note>(stored.id).await?.is_none());
        assert_eq!(store.count::<Note>(&Filter::All).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn aggregates_count_sum_and_distinct() -> Result<()> {
        let (_dir, store) = create_store().await?;
        for (title, rank, topic) in [
            ("a", 5, Some("x")),
            ("b", 7, Some("y")),
            ("c", 11, Some("x")),
            ("d", 100, None),
        ] {
            let mut doc = note(title, rank);
            doc.topic = topic.map(str::to_string);
            store.insert(&doc).await?;
        }

        let with_topic = Filter::exists("topic");
        assert_eq!(store.count::<Note>(&with_topic).await?, 3);
        assert_eq!(store.sum::<Note>("rank", &with_topic).await?, 23);
        assert_eq!(
            store
                .sum::<Note>("rank", &Filter::eq("title", "missing"))
                .await?,
            0
        );

        let topics: Vec<String> = store.distinct::<Note, String>("topic", &Filter::All).await?;
        assert_eq!(topics, vec!["x".to_string(), "y".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn unique_keys_reject_duplicates() -> Result<()> {
        let (_dir, store) = create_store().await?;
        store.insert(&note("same", 1)).await?;
        assert!(store.insert(&note("same", 2)).await.is_err());

        let mut topical = note("same", 3);
        topical.topic = Some("other".into());
        store.insert(&topical).await?;
        Ok(())
    }

    #[tokio::test]
    async fn toggle_alternates_between_insert_and_remove() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let key = Filter::eq("title", "switch");

        let first = store.toggle(note("switch", 1), &key).await?;
        assert!(first.is_inserted());
        assert_eq!(store.count::<Note>(&key).await?, 1);

        let second = store.toggle(note("switch", 1), &key).await?;
        assert!(!second.is_inserted());
        assert_eq!(store.count::<Note>(&key).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_toggles_never_duplicate() -> Result<()> {
        let (_dir, store) = create_store().await?;
        let key = Filter::eq("title", "race");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store.toggle(note("race", 1), &key).await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        // An even number of alternating toggles ends where it started.
        assert_eq!(store.count::<Note>(&key).await?, 0);
        Ok(())
    }

    #[test]
    fn field_names_are_restricted_to_identifiers() {
        assert!(field_expr("owner").is_ok());
        assert!(field_expr("_id").is_ok());
        assert!(field_expr("createdAt").is_ok());
        assert!(field_expr("x') OR 1=1 --").is_err());
        assert!(field_expr("").is_err());
    }

    #[test]
    fn and_flattens_nested_conjunctions() {
        let filter = Filter::All
            .and(Filter::eq("a", 1))
            .and(Filter::eq("b", 2))
            .and(Filter::All);
        assert_eq!(
            filter,
            Filter::And(vec![Filter::eq("a", 1), Filter::eq("b", 2)])
        );
    }
}
