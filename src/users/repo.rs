use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    pagination::Pagination,
    users::repo_types::{NewUser, User, UserChanges, UsersList},
};

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, role, about, \
     avatar, phone_number, address, city, country, gender, postcode, birthday, \
     created_at, updated_at, login_date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    CreatedAt,
    Id,
    FirstName,
    LastName,
    Email,
    UpdatedAt,
    LoginDate,
}

impl SortColumn {
    fn column(self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::FirstName => "first_name",
            SortColumn::LastName => "last_name",
            SortColumn::Email => "email",
            SortColumn::CreatedAt => "created_at",
            SortColumn::UpdatedAt => "updated_at",
            SortColumn::LoginDate => "login_date",
        }
    }
}

/// Sort order accepted by the listing endpoint: a column name, optionally
/// prefixed with `-` for descending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserOrder {
    pub column: SortColumn,
    pub descending: bool,
}

impl FromStr for UserOrder {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let column = match name {
            "id" => SortColumn::Id,
            "first_name" => SortColumn::FirstName,
            "last_name" => SortColumn::LastName,
            "email" => SortColumn::Email,
            "created_at" => SortColumn::CreatedAt,
            "updated_at" => SortColumn::UpdatedAt,
            "login_date" => SortColumn::LoginDate,
            other => {
                return Err(AppError::validation(format!(
                    "orderBy {other:?} is not a sortable column"
                )))
            }
        };
        Ok(Self { column, descending })
    }
}

impl UserOrder {
    /// ORDER BY clause built only from the fixed column set. `id` breaks ties
    /// so pages never overlap.
    pub fn sql(&self) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        let nulls = if self.descending { "NULLS LAST" } else { "NULLS FIRST" };
        match self.column {
            SortColumn::Id => format!("id {dir}"),
            col => format!("{} {dir} {nulls}, id ASC", col.column()),
        }
    }
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, user: NewUser) -> AppResult<User>;
    async fn get_by_id(&self, id: Uuid) -> AppResult<User>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn update(&self, id: Uuid, changes: UserChanges) -> AppResult<User>;
    async fn update_avatar(&self, id: Uuid, avatar: &str) -> AppResult<User>;
    async fn touch_login(&self, id: Uuid) -> AppResult<()>;
    async fn delete(&self, id: Uuid) -> AppResult<()>;
    /// Case-insensitive substring match on first name, last name or full name.
    async fn find_by_name(&self, name: &str, page: &Pagination) -> AppResult<UsersList>;
    async fn list(&self, page: &Pagination, order: UserOrder) -> AppResult<UsersList>;
}

fn not_found(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::RowNotFound => AppError::NotFound("user"),
        other => other.into(),
    }
}

/// Escapes LIKE wildcards so user input only ever matches literally.
pub(crate) fn like_pattern(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('%');
    for c in name.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Matches the `lower(email)` unique index so lookups never scan the table.
fn find_by_email_sql() -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)")
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn create(&self, user: NewUser) -> AppResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (first_name, last_name, email, password_hash, role, about,
                               phone_number, address, city, country, gender, postcode, birthday)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {USER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.role)
            .bind(user.about)
            .bind(user.phone_number)
            .bind(user.address)
            .bind(user.city)
            .bind(user.country)
            .bind(user.gender)
            .bind(user.postcode)
            .bind(user.birthday)
            .fetch_one(&self.db)
            .await?;
        Ok(created)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_one(&self.db)
            .await
            .map_err(not_found)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql = find_by_email_sql();
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn update(&self, id: Uuid, c: UserChanges) -> AppResult<User> {
        let sql = format!(
            r#"
            UPDATE users SET
                first_name    = COALESCE($2, first_name),
                last_name     = COALESCE($3, last_name),
                email         = COALESCE($4, email),
                password_hash = COALESCE($5, password_hash),
                role          = COALESCE($6, role),
                about         = COALESCE($7, about),
                phone_number  = COALESCE($8, phone_number),
                address       = COALESCE($9, address),
                city          = COALESCE($10, city),
                country       = COALESCE($11, country),
                gender        = COALESCE($12, gender),
                postcode      = COALESCE($13, postcode),
                birthday      = COALESCE($14, birthday),
                updated_at    = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(c.first_name)
            .bind(c.last_name)
            .bind(c.email)
            .bind(c.password_hash)
            .bind(c.role)
            .bind(c.about)
            .bind(c.phone_number)
            .bind(c.address)
            .bind(c.city)
            .bind(c.country)
            .bind(c.gender)
            .bind(c.postcode)
            .bind(c.birthday)
            .fetch_one(&self.db)
            .await
            .map_err(not_found)
    }

    async fn update_avatar(&self, id: Uuid, avatar: &str) -> AppResult<User> {
        let sql = format!(
            "UPDATE users SET avatar = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(avatar)
            .fetch_one(&self.db)
            .await
            .map_err(not_found)
    }

    async fn touch_login(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET login_date = now() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound("user"));
        }
        Ok(())
    }

    async fn find_by_name(&self, name: &str, page: &Pagination) -> AppResult<UsersList> {
        const MATCH: &str = r#"
            first_name ILIKE $1
            OR last_name ILIKE $1
            OR (first_name || ' ' || last_name) ILIKE $1
        "#;
        let pattern = like_pattern(name.trim());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users WHERE {MATCH}"))
            .bind(&pattern)
            .fetch_one(&self.db)
            .await?;

        let users = if total == 0 {
            Vec::new()
        } else {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE {MATCH} \
                 ORDER BY created_at ASC, id ASC LIMIT $2 OFFSET $3"
            );
            sqlx::query_as::<_, User>(&sql)
                .bind(&pattern)
                .bind(page.limit())
                .bind(page.offset())
                .fetch_all(&self.db)
                .await?
        };

        Ok(UsersList::new(page, total, users))
    }

    async fn list(&self, page: &Pagination, order: UserOrder) -> AppResult<UsersList> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users ORDER BY "));
        qb.push(order.sql());
        qb.push(" LIMIT ").push_bind(page.limit());
        qb.push(" OFFSET ").push_bind(page.offset());
        let users = qb.build_query_as::<User>().fetch_all(&self.db).await?;

        Ok(UsersList::new(page, total, users))
    }
}
