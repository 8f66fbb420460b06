use async_trait::async_trait;
use dmart_application::{EntryLocator, EntryRepository, ManagementEntry, ManagementEntryRepository};
use dmart_core::{AppError, AppResult};
use dmart_domain::{EntryMeta, ResourceType, User, normalize_subpath};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// PostgreSQL-backed entry store.
///
/// Entries live in one `entries` table keyed by space, subpath and
/// shortname; each row carries its meta document and the query policies
/// generated when it was written.
#[derive(Clone)]
pub struct PostgresEntryRepository {
    pool: PgPool,
}

impl PostgresEntryRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces an entry meta document and returns the query
    /// policies stamped on it.
    pub async fn save_entry(
        &self,
        space_name: &str,
        subpath: &str,
        document: &Value,
    ) -> AppResult<Vec<String>> {
        let meta: EntryMeta = serde_json::from_value(document.clone())
            .map_err(|error| AppError::Validation(format!("invalid entry meta: {error}")))?;
        let subpath = normalize_subpath(subpath);
        let query_policies = meta.query_policies(space_name, subpath.as_str());

        sqlx::query(
            r#"
            INSERT INTO entries (
                uuid,
                space_name,
                subpath,
                shortname,
                resource_type,
                is_active,
                owner_shortname,
                document,
                query_policies
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (space_name, subpath, shortname) DO UPDATE
            SET resource_type = EXCLUDED.resource_type,
                is_active = EXCLUDED.is_active,
                owner_shortname = EXCLUDED.owner_shortname,
                document = EXCLUDED.document,
                query_policies = EXCLUDED.query_policies,
                updated_at = now()
            "#,
        )
        .bind(meta.uuid.unwrap_or_else(Uuid::new_v4))
        .bind(space_name)
        .bind(subpath.as_str())
        .bind(meta.shortname.as_str())
        .bind(meta.resource_type.as_str())
        .bind(meta.is_active)
        .bind(meta.owner_shortname.as_str())
        .bind(document)
        .bind(&query_policies)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!(
                "failed to save entry @{space_name}/{subpath}/{}: {error}",
                meta.shortname
            ))
        })?;

        Ok(query_policies)
    }

    /// Lists the shortnames of entries in a space whose stored query policies
    /// match any of the filters.
    ///
    /// Filters use the projected form: exact tokens, trailing `*` wildcards
    /// and `a|b` alternations.
    pub async fn search(&self, space_name: &str, filters: &[String]) -> AppResult<Vec<EntryLocator>> {
        let patterns = filter_patterns(filters);
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, LocatorRow>(
            r#"
            SELECT space_name, subpath, shortname, resource_type
            FROM entries
            WHERE space_name = $1
                AND EXISTS (
                    SELECT 1
                    FROM unnest(query_policies) AS policy
                    WHERE policy LIKE ANY($2)
                )
            ORDER BY subpath, shortname
            "#,
        )
        .bind(space_name)
        .bind(&patterns)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to search entries: {error}")))?;

        rows.into_iter().map(LocatorRow::into_locator).collect()
    }

    async fn find_document<T: DeserializeOwned>(
        &self,
        locator: &EntryLocator,
    ) -> AppResult<Option<T>> {
        let subpath = normalize_subpath(locator.subpath.as_str());
        let document = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT document
            FROM entries
            WHERE space_name = $1
                AND subpath = $2
                AND shortname = $3
                AND resource_type = $4
            "#,
        )
        .bind(locator.space_name.as_str())
        .bind(subpath.as_str())
        .bind(locator.shortname.as_str())
        .bind(locator.resource_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to load entry: {error}")))?;

        document
            .map(|document| {
                serde_json::from_value(document).map_err(|error| {
                    AppError::Internal(format!(
                        "failed to decode @{}/{subpath}/{}: {error}",
                        locator.space_name, locator.shortname
                    ))
                })
            })
            .transpose()
    }
}

#[derive(Debug, FromRow)]
struct ManagementEntryRow {
    shortname: String,
    document: Value,
}

#[derive(Debug, FromRow)]
struct LocatorRow {
    space_name: String,
    subpath: String,
    shortname: String,
    resource_type: String,
}

impl LocatorRow {
    fn into_locator(self) -> AppResult<EntryLocator> {
        let resource_type = self.resource_type.parse::<ResourceType>().map_err(|error| {
            AppError::Internal(format!(
                "entry '{}' has an invalid resource type: {error}",
                self.shortname
            ))
        })?;

        Ok(EntryLocator::new(
            self.space_name,
            self.subpath,
            self.shortname,
            resource_type,
        ))
    }
}

#[async_trait]
impl ManagementEntryRepository for PostgresEntryRepository {
    async fn load_active_entries(
        &self,
        space_name: &str,
        subpath: &str,
        resource_type: ResourceType,
    ) -> AppResult<Vec<ManagementEntry>> {
        let rows = sqlx::query_as::<_, ManagementEntryRow>(
            r#"
            SELECT shortname, document
            FROM entries
            WHERE space_name = $1
                AND subpath = $2
                AND resource_type = $3
                AND is_active
            ORDER BY shortname
            "#,
        )
        .bind(space_name)
        .bind(normalize_subpath(subpath))
        .bind(resource_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!(
                "failed to load @{space_name}/{subpath} entries: {error}"
            ))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| ManagementEntry {
                shortname: row.shortname,
                document: row.document,
            })
            .collect())
    }
}

#[async_trait]
impl EntryRepository for PostgresEntryRepository {
    async fn find_user(&self, locator: &EntryLocator) -> AppResult<Option<User>> {
        self.find_document(locator).await
    }

    async fn find_entry(&self, locator: &EntryLocator) -> AppResult<Option<EntryMeta>> {
        self.find_document(locator).await
    }
}

/// Translates query-policy filters into `LIKE` patterns.
///
/// Alternations are split, `LIKE` metacharacters escaped and a trailing `*`
/// segment becomes `%`.
fn filter_patterns(filters: &[String]) -> Vec<String> {
    let mut patterns: Vec<String> = Vec::new();
    for alternative in filters.iter().flat_map(|filter| filter.split('|')) {
        let alternative = alternative.trim();
        if alternative.is_empty() {
            continue;
        }

        let (exact, wildcard) = match alternative.strip_suffix(":*") {
            Some(prefix) => (prefix, true),
            None => (alternative, false),
        };
        let mut pattern = escape_like(exact);
        if wildcard {
            pattern.push_str(":%");
        }

        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }

    patterns
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        if matches!(character, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}
