//! Contact (CRM) repository
//!
//! Listings are scoped by a [`ContactViewer`]: the creator, public contacts,
//! and department contacts of the viewer's departments.

use async_trait::async_trait;
use erp_core::Id;
use erp_models::contact::normalize_phone;
use erp_models::{Contact, ContactVisibility, NewContact};
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{
    contains_ci, like_pattern, paginate, Repository, RepositoryError, RepositoryResult,
};

const COLUMNS: &str = "id, name, phone, alternative_phone, email, company, position, address, \
                       notes, tags, reference, visibility, department, created_by, created_at, updated_at";

#[derive(Debug, Clone, Default)]
pub struct ContactViewer {
    pub user_id: Id,
    pub departments: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    /// `None` sees every contact
    pub viewer: Option<ContactViewer>,
    /// Name, email, phone or company substring
    pub search: Option<String>,
    pub visibility: Option<ContactVisibility>,
    pub tag: Option<String>,
}

impl ContactFilter {
    pub fn matches(&self, contact: &Contact) -> bool {
        if let Some(ref viewer) = self.viewer {
            if !contact.visible_to(viewer.user_id, &viewer.departments) {
                return false;
            }
        }
        if let Some(ref term) = self.search {
            let hit = contains_ci(&contact.name, term)
                || contains_ci(&contact.phone, term)
                || contact.email.as_deref().map_or(false, |e| contains_ci(e, term))
                || contact.company.as_deref().map_or(false, |c| contains_ci(c, term));
            if !hit {
                return false;
            }
        }
        if self.visibility.map_or(false, |v| v != contact.visibility) {
            return false;
        }
        match self.tag {
            Some(ref tag) => contact.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)),
            None => true,
        }
    }
}

#[async_trait]
pub trait ContactStore: Repository<Contact, NewContact, Contact> {
    async fn list(
        &self,
        filter: &ContactFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Contact>>;

    async fn count_matching(&self, filter: &ContactFilter) -> RepositoryResult<i64>;

    /// Contact whose phone has the same digits, ignoring `exclude`
    async fn find_by_phone_digits(
        &self,
        digits: &str,
        exclude: Option<Id>,
    ) -> RepositoryResult<Option<Contact>>;
}

/// Contact repository implementation
pub struct PgContactRepository {
    pool: PgPool,
}

impl PgContactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const FILTER: &str = r#"
    ($1::bigint IS NULL
     OR created_by = $1
     OR visibility = 'public'
     OR (visibility = 'department' AND department = ANY($2::text[])))
    AND ($3::text IS NULL OR name ILIKE $3 OR email ILIKE $3 OR phone ILIKE $3 OR company ILIKE $3)
    AND ($4::text IS NULL OR visibility = $4)
    AND ($5::text IS NULL OR EXISTS (SELECT 1 FROM unnest(tags) t WHERE LOWER(t) = LOWER($5)))
"#;

#[async_trait]
impl Repository<Contact, NewContact, Contact> for PgContactRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Contact>> {
        let sql = format!("SELECT {COLUMNS} FROM contacts WHERE id = $1");
        let row = sqlx::query_as::<_, Contact>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Contact>> {
        let sql = format!("SELECT {COLUMNS} FROM contacts ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, Contact>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM contacts")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewContact) -> RepositoryResult<Contact> {
        let sql = format!(
            r#"
            INSERT INTO contacts (
                name, phone, alternative_phone, email, company, position, address, notes,
                tags, reference, visibility, department, created_by, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW()
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Contact>(&sql)
            .bind(&dto.name)
            .bind(&dto.phone)
            .bind(&dto.alternative_phone)
            .bind(&dto.email)
            .bind(&dto.company)
            .bind(&dto.position)
            .bind(&dto.address)
            .bind(&dto.notes)
            .bind(&dto.tags)
            .bind(&dto.reference)
            .bind(dto.visibility.as_str())
            .bind(&dto.department)
            .bind(dto.created_by)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, contact: Contact) -> RepositoryResult<Contact> {
        let sql = format!(
            r#"
            UPDATE contacts SET
                name = $1,
                phone = $2,
                alternative_phone = $3,
                email = $4,
                company = $5,
                position = $6,
                address = $7,
                notes = $8,
                tags = $9,
                reference = $10,
                visibility = $11,
                department = $12,
                updated_at = NOW()
            WHERE id = $13
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Contact>(&sql)
            .bind(&contact.name)
            .bind(&contact.phone)
            .bind(&contact.alternative_phone)
            .bind(&contact.email)
            .bind(&contact.company)
            .bind(&contact.position)
            .bind(&contact.address)
            .bind(&contact.notes)
            .bind(&contact.tags)
            .bind(&contact.reference)
            .bind(contact.visibility.as_str())
            .bind(&contact.department)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Contact", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Contact", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM contacts WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

#[async_trait]
impl ContactStore for PgContactRepository {
    async fn list(
        &self,
        filter: &ContactFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Contact>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM contacts WHERE {FILTER} \
             ORDER BY created_at DESC, id DESC LIMIT $6 OFFSET $7"
        );
        let rows = sqlx::query_as::<_, Contact>(&sql)
            .bind(filter.viewer.as_ref().map(|v| v.user_id))
            .bind(filter.viewer.as_ref().map(|v| v.departments.clone()).unwrap_or_default())
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.visibility.map(|v| v.as_str()))
            .bind(filter.tag.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count_matching(&self, filter: &ContactFilter) -> RepositoryResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM contacts WHERE {FILTER}");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.viewer.as_ref().map(|v| v.user_id))
            .bind(filter.viewer.as_ref().map(|v| v.departments.clone()).unwrap_or_default())
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.visibility.map(|v| v.as_str()))
            .bind(filter.tag.as_deref())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn find_by_phone_digits(
        &self,
        digits: &str,
        exclude: Option<Id>,
    ) -> RepositoryResult<Option<Contact>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM contacts
            WHERE regexp_replace(phone, '[^0-9]', '', 'g') = $1
              AND ($2::bigint IS NULL OR id <> $2)
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, Contact>(&sql)
            .bind(digits)
            .bind(exclude)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }
}

#[async_trait]
impl ContactStore for MemoryTable<Contact> {
    async fn list(
        &self,
        filter: &ContactFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Contact>> {
        let mut rows = self.select(|c| filter.matches(c));
        rows.reverse();
        Ok(paginate(rows, limit, offset))
    }

    async fn count_matching(&self, filter: &ContactFilter) -> RepositoryResult<i64> {
        Ok(self.count_where(|c| filter.matches(c)) as i64)
    }

    async fn find_by_phone_digits(
        &self,
        digits: &str,
        exclude: Option<Id>,
    ) -> RepositoryResult<Option<Contact>> {
        Ok(self.find_first(|c| Some(c.id) != exclude && normalize_phone(&c.phone) == digits))
    }
}
