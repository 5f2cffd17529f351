//! Employee repository
//!
//! Department membership is the `departments` TEXT[] column holding department
//! names, so renaming a department rewrites that array in place.

use async_trait::async_trait;
use erp_core::Id;
use erp_models::{Employee, EmployeeStatus, NewEmployee};
use sqlx::PgPool;

use crate::memory::MemoryTable;
use crate::repository::{
    contains_ci, like_pattern, paginate, Repository, RepositoryError, RepositoryResult,
};

const COLUMNS: &str = "id, user_id, first_name, last_name, email, phone, position, departments, \
                       skills, status, hire_date, salary, created_at, updated_at";

#[derive(Debug, Clone, Default)]
pub struct EmployeeFilter {
    /// Name, email or position substring
    pub search: Option<String>,
    pub status: Option<EmployeeStatus>,
    pub department: Option<String>,
}

impl EmployeeFilter {
    pub fn in_department(name: impl Into<String>) -> Self {
        Self {
            department: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_status(status: EmployeeStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn matches(&self, employee: &Employee) -> bool {
        if let Some(ref term) = self.search {
            let hit = contains_ci(&employee.first_name, term)
                || contains_ci(&employee.last_name, term)
                || contains_ci(&employee.email, term)
                || contains_ci(&employee.position, term);
            if !hit {
                return false;
            }
        }
        if self.status.map_or(false, |s| s != employee.status) {
            return false;
        }
        if let Some(ref department) = self.department {
            if !employee.in_department(department) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait EmployeeStore: Repository<Employee, NewEmployee, Employee> {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<Employee>>;

    async fn find_by_user_id(&self, user_id: Id) -> RepositoryResult<Option<Employee>>;

    async fn list(
        &self,
        filter: &EmployeeFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Employee>>;

    async fn count_matching(&self, filter: &EmployeeFilter) -> RepositoryResult<i64>;

    /// Members of a department that are not terminated
    async fn count_in_department(&self, department: &str) -> RepositoryResult<i64>;

    /// Replace `from` with `to` in every employee's department list
    async fn rename_department(&self, from: &str, to: &str) -> RepositoryResult<u64>;
}

/// Employee repository implementation
pub struct PgEmployeeRepository {
    pool: PgPool,
}

impl PgEmployeeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const FILTER: &str = r#"
    ($1::text IS NULL OR first_name ILIKE $1 OR last_name ILIKE $1 OR email ILIKE $1 OR position ILIKE $1)
    AND ($2::text IS NULL OR status = $2)
    AND ($3::text IS NULL OR $3 = ANY(departments))
"#;

#[async_trait]
impl Repository<Employee, NewEmployee, Employee> for PgEmployeeRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Employee>> {
        let sql = format!("SELECT {COLUMNS} FROM employees WHERE id = $1");
        let row = sqlx::query_as::<_, Employee>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Employee>> {
        let sql = format!("SELECT {COLUMNS} FROM employees ORDER BY id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, Employee>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, dto: NewEmployee) -> RepositoryResult<Employee> {
        let sql = format!(
            r#"
            INSERT INTO employees (
                user_id, first_name, last_name, email, phone, position, departments,
                skills, status, hire_date, salary, created_at, updated_at
            ) VALUES (
                $1, $2, $3, LOWER($4), $5, $6, $7, $8, $9, $10, $11, NOW(), NOW()
            )
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Employee>(&sql)
            .bind(dto.user_id)
            .bind(&dto.first_name)
            .bind(&dto.last_name)
            .bind(&dto.email)
            .bind(&dto.phone)
            .bind(&dto.position)
            .bind(&dto.departments)
            .bind(&dto.skills)
            .bind(dto.status.as_str())
            .bind(dto.hire_date)
            .bind(dto.salary)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(&self, id: Id, employee: Employee) -> RepositoryResult<Employee> {
        let sql = format!(
            r#"
            UPDATE employees SET
                user_id = $1,
                first_name = $2,
                last_name = $3,
                email = LOWER($4),
                phone = $5,
                position = $6,
                departments = $7,
                skills = $8,
                status = $9,
                hire_date = $10,
                salary = $11,
                updated_at = NOW()
            WHERE id = $12
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Employee>(&sql)
            .bind(employee.user_id)
            .bind(&employee.first_name)
            .bind(&employee.last_name)
            .bind(&employee.email)
            .bind(&employee.phone)
            .bind(&employee.position)
            .bind(&employee.departments)
            .bind(&employee.skills)
            .bind(employee.status.as_str())
            .bind(employee.hire_date)
            .bind(employee.salary)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Employee", id))?;

        Ok(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM employees WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Employee", id));
        }

        Ok(())
    }

    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM employees WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

#[async_trait]
impl EmployeeStore for PgEmployeeRepository {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<Employee>> {
        let sql = format!("SELECT {COLUMNS} FROM employees WHERE email = LOWER($1)");
        let row = sqlx::query_as::<_, Employee>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_by_user_id(&self, user_id: Id) -> RepositoryResult<Option<Employee>> {
        let sql = format!("SELECT {COLUMNS} FROM employees WHERE user_id = $1 LIMIT 1");
        let row = sqlx::query_as::<_, Employee>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list(
        &self,
        filter: &EmployeeFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Employee>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM employees WHERE {FILTER} ORDER BY id LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query_as::<_, Employee>(&sql)
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.department.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count_matching(&self, filter: &EmployeeFilter) -> RepositoryResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM employees WHERE {FILTER}");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filter.search.as_deref().map(like_pattern))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.department.as_deref())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn count_in_department(&self, department: &str) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM employees
            WHERE $1 = ANY(departments) AND status <> 'terminated'
            "#,
        )
        .bind(department)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn rename_department(&self, from: &str, to: &str) -> RepositoryResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE employees SET
                departments = array_replace(departments, $1, $2),
                updated_at = NOW()
            WHERE $1 = ANY(departments)
            "#,
        )
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EmployeeStore for MemoryTable<Employee> {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<Employee>> {
        Ok(self.find_first(|e| e.email.eq_ignore_ascii_case(email)))
    }

    async fn find_by_user_id(&self, user_id: Id) -> RepositoryResult<Option<Employee>> {
        Ok(self.find_first(|e| e.user_id == Some(user_id)))
    }

    async fn list(
        &self,
        filter: &EmployeeFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Employee>> {
        Ok(paginate(self.select(|e| filter.matches(e)), limit, offset))
    }

    async fn count_matching(&self, filter: &EmployeeFilter) -> RepositoryResult<i64> {
        Ok(self.count_where(|e| filter.matches(e)) as i64)
    }

    async fn count_in_department(&self, department: &str) -> RepositoryResult<i64> {
        let count = self.count_where(|e| {
            e.in_department(department) && e.status != EmployeeStatus::Terminated
        });
        Ok(count as i64)
    }

    async fn rename_department(&self, from: &str, to: &str) -> RepositoryResult<u64> {
        let changed = self.modify_where(|e| {
            let mut hit = false;
            for name in e.departments.iter_mut().filter(|d| d.as_str() == from) {
                *name = to.to_string();
                hit = true;
            }
            hit
        });
        Ok(changed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_employee(first: &str, email: &str, departments: &[&str]) -> NewEmployee {
        NewEmployee {
            user_id: None,
            first_name: first.into(),
            last_name: "Test".into(),
            email: email.into(),
            phone: None,
            position: "Engineer".into(),
            departments: departments.iter().map(|d| d.to_string()).collect(),
            skills: vec![],
            status: EmployeeStatus::Active,
            hire_date: None,
            salary: None,
        }
    }

    #[tokio::test]
    async fn test_department_counts_and_rename() {
        let table = MemoryTable::<Employee>::new("Employee");
        let store: &dyn EmployeeStore = &table;
        store.create(new_employee("A", "a@x.io", &["Sales"])).await.unwrap();
        store.create(new_employee("B", "b@x.io", &["Sales", "Ops"])).await.unwrap();
        let c = store.create(new_employee("C", "c@x.io", &["Ops"])).await.unwrap();

        assert_eq!(store.count_in_department("Sales").await.unwrap(), 2);

        let mut c = c;
        c.status = EmployeeStatus::Terminated;
        store.update(c.id, c).await.unwrap();
        assert_eq!(store.count_in_department("Ops").await.unwrap(), 1);

        assert_eq!(store.rename_department("Sales", "Revenue").await.unwrap(), 2);
        assert_eq!(store.count_in_department("Sales").await.unwrap(), 0);
        assert_eq!(
            store
                .count_matching(&EmployeeFilter::in_department("Revenue"))
                .await
                .unwrap(),
            2
        );
    }
}
