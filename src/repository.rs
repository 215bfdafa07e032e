use crate::error::DbError;
use crate::models::{Group, Image, NewImage, User};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Repository Trait
///
/// The persistence contract behind every roster handler. Uniqueness of the natural keys is
/// the implementation's job, so handlers never check before inserting.
///
/// `Send + Sync` lets the trait object live in the shared `AppState`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn list_users(&self) -> Result<Vec<User>, DbError>;
    async fn get_user(&self, username: &str) -> Result<Option<User>, DbError>;
    // Fails with `DbError::UniqueViolation` when the username is taken.
    async fn create_user(&self, user: User) -> Result<User, DbError>;
    // Returns false when nothing matched.
    async fn delete_user(&self, username: &str) -> Result<bool, DbError>;

    // --- Groups ---
    async fn list_groups(&self) -> Result<Vec<Group>, DbError>;
    async fn get_group(&self, groupname: &str) -> Result<Option<Group>, DbError>;
    async fn create_group(&self, group: Group) -> Result<Group, DbError>;
    async fn delete_group(&self, groupname: &str) -> Result<bool, DbError>;

    // --- Images ---
    async fn list_images(&self) -> Result<Vec<Image>, DbError>;
    async fn get_image(&self, id: i32) -> Result<Option<Image>, DbError>;
    async fn create_image(&self, image: NewImage) -> Result<Image, DbError>;
    async fn delete_image(&self, id: i32) -> Result<bool, DbError>;
}

/// RepositoryState
///
/// The shared handle to whichever repository the application was started with.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Unique constraints on the key columns make concurrent
/// creates of the same key resolve to one insert and one `UniqueViolation`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_users(&self) -> Result<Vec<User>, DbError> {
        sqlx::query_as::<_, User>(
            "SELECT username, nprocs, memory, runtime, gpu FROM users ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::classify)
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, DbError> {
        sqlx::query_as::<_, User>(
            "SELECT username, nprocs, memory, runtime, gpu FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::classify)
    }

    async fn create_user(&self, user: User) -> Result<User, DbError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, nprocs, memory, runtime, gpu)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING username, nprocs, memory, runtime, gpu
            "#,
        )
        .bind(user.username)
        .bind(user.nprocs)
        .bind(user.memory)
        .bind(user.runtime)
        .bind(user.gpu)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::classify)
    }

    async fn delete_user(&self, username: &str) -> Result<bool, DbError> {
        let res = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await
            .map_err(DbError::classify)?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, DbError> {
        sqlx::query_as::<_, Group>(
            "SELECT groupname, nprocs, memory, runtime, gpu FROM groups ORDER BY groupname",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::classify)
    }

    async fn get_group(&self, groupname: &str) -> Result<Option<Group>, DbError> {
        sqlx::query_as::<_, Group>(
            "SELECT groupname, nprocs, memory, runtime, gpu FROM groups WHERE groupname = $1",
        )
        .bind(groupname)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::classify)
    }

    async fn create_group(&self, group: Group) -> Result<Group, DbError> {
        sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (groupname, nprocs, memory, runtime, gpu)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING groupname, nprocs, memory, runtime, gpu
            "#,
        )
        .bind(group.groupname)
        .bind(group.nprocs)
        .bind(group.memory)
        .bind(group.runtime)
        .bind(group.gpu)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::classify)
    }

    async fn delete_group(&self, groupname: &str) -> Result<bool, DbError> {
        let res = sqlx::query("DELETE FROM groups WHERE groupname = $1")
            .bind(groupname)
            .execute(&self.pool)
            .await
            .map_err(DbError::classify)?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_images(&self) -> Result<Vec<Image>, DbError> {
        sqlx::query_as::<_, Image>("SELECT id, nprocs, memory, runtime, gpu FROM images ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::classify)
    }

    async fn get_image(&self, id: i32) -> Result<Option<Image>, DbError> {
        sqlx::query_as::<_, Image>("SELECT id, nprocs, memory, runtime, gpu FROM images WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::classify)
    }

    /// create_image
    ///
    /// Lets the `SERIAL` column pick the id unless the caller supplied one.
    async fn create_image(&self, image: NewImage) -> Result<Image, DbError> {
        let query = match image.id {
            Some(id) => sqlx::query_as::<_, Image>(
                r#"
                INSERT INTO images (id, nprocs, memory, runtime, gpu)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, nprocs, memory, runtime, gpu
                "#,
            )
            .bind(id),
            None => sqlx::query_as::<_, Image>(
                r#"
                INSERT INTO images (nprocs, memory, runtime, gpu)
                VALUES ($1, $2, $3, $4)
                RETURNING id, nprocs, memory, runtime, gpu
                "#,
            ),
        };

        query
            .bind(image.nprocs)
            .bind(image.memory)
            .bind(image.runtime)
            .bind(image.gpu)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::classify)
    }

    async fn delete_image(&self, id: i32) -> Result<bool, DbError> {
        let res = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::classify)?;
        Ok(res.rows_affected() > 0)
    }
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, User>,
    groups: BTreeMap<String, Group>,
    images: BTreeMap<i32, Image>,
    last_image_id: i32,
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory, used by the test suites and for running
/// the service without a database. Writes take the table lock for their whole check-and-insert,
/// which gives the same one-winner guarantee as the Postgres unique constraints.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn duplicate_key(constraint: &str) -> DbError {
    DbError::UniqueViolation {
        message: format!("duplicate key value violates unique constraint \"{constraint}\""),
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_users(&self) -> Result<Vec<User>, DbError> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, DbError> {
        Ok(self.tables.read().await.users.get(username).cloned())
    }

    async fn create_user(&self, user: User) -> Result<User, DbError> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.username) {
            return Err(duplicate_key("users_pkey"));
        }
        tables.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn delete_user(&self, username: &str) -> Result<bool, DbError> {
        Ok(self.tables.write().await.users.remove(username).is_some())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, DbError> {
        Ok(self.tables.read().await.groups.values().cloned().collect())
    }

    async fn get_group(&self, groupname: &str) -> Result<Option<Group>, DbError> {
        Ok(self.tables.read().await.groups.get(groupname).cloned())
    }

    async fn create_group(&self, group: Group) -> Result<Group, DbError> {
        let mut tables = self.tables.write().await;
        if tables.groups.contains_key(&group.groupname) {
            return Err(duplicate_key("groups_pkey"));
        }
        tables.groups.insert(group.groupname.clone(), group.clone());
        Ok(group)
    }

    async fn delete_group(&self, groupname: &str) -> Result<bool, DbError> {
        Ok(self.tables.write().await.groups.remove(groupname).is_some())
    }

    async fn list_images(&self) -> Result<Vec<Image>, DbError> {
        Ok(self.tables.read().await.images.values().cloned().collect())
    }

    async fn get_image(&self, id: i32) -> Result<Option<Image>, DbError> {
        Ok(self.tables.read().await.images.get(&id).cloned())
    }

    async fn create_image(&self, image: NewImage) -> Result<Image, DbError> {
        let mut tables = self.tables.write().await;
        let id = match image.id {
            Some(id) => id,
            None => {
                // Mirrors a sequence: never hands out an id twice, even after deletes.
                tables.last_image_id += 1;
                while tables.images.contains_key(&tables.last_image_id) {
                    tables.last_image_id += 1;
                }
                tables.last_image_id
            }
        };
        if tables.images.contains_key(&id) {
            return Err(duplicate_key("images_pkey"));
        }

        let stored = Image {
            id,
            nprocs: image.nprocs,
            memory: image.memory,
            runtime: image.runtime,
            gpu: image.gpu,
        };
        tables.images.insert(id, stored.clone());
        Ok(stored)
    }

    async fn delete_image(&self, id: i32) -> Result<bool, DbError> {
        Ok(self.tables.write().await.images.remove(&id).is_some())
    }
}
