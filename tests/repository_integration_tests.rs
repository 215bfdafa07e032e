use hub_roster::{
    DbError,
    models::{Group, NewImage, User},
    repository::{InMemoryRepository, PostgresRepository, Repository},
};
use serial_test::serial;
use sqlx::PgPool;
use std::sync::atomic::{AtomicU32, Ordering};

// --- Test Context and Setup ---

/// Holds the pool for the Postgres-backed tests.
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    /// Connects and migrates, or returns `None` when no database is configured so the suite
    /// still passes on machines without Postgres.
    async fn setup() -> Option<Self> {
        dotenv::dotenv().ok();

        let Ok(db_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping Postgres repository test");
            return None;
        };

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        Some(DbTestContext { pool })
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Unique per process and call, so reruns against the same database never collide.
fn unique(label: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    format!(
        "{label}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

fn user(username: &str) -> User {
    User {
        username: username.to_string(),
        nprocs: 2,
        memory: 4,
        runtime: 8,
        gpu: true,
    }
}

fn group(groupname: &str) -> Group {
    Group {
        groupname: groupname.to_string(),
        nprocs: 1,
        memory: 1,
        runtime: 1,
        gpu: false,
    }
}

fn new_image(id: Option<i32>) -> NewImage {
    NewImage {
        id,
        nprocs: 3,
        memory: 1,
        runtime: 1,
        gpu: false,
    }
}

// --- Postgres ---

#[tokio::test]
#[serial]
async fn test_postgres_user_lifecycle() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let name = unique("pg-user");

    let created = repo.create_user(user(&name)).await.unwrap();
    assert_eq!(created, user(&name));

    assert_eq!(repo.get_user(&name).await.unwrap(), Some(user(&name)));
    assert!(repo.list_users().await.unwrap().contains(&user(&name)));

    assert!(repo.delete_user(&name).await.unwrap());
    assert!(!repo.delete_user(&name).await.unwrap());
    assert_eq!(repo.get_user(&name).await.unwrap(), None);
}

#[tokio::test]
#[serial]
async fn test_postgres_duplicate_key_is_unique_violation() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let name = unique("pg-group");

    repo.create_group(group(&name)).await.unwrap();
    let err = repo.create_group(group(&name)).await.unwrap_err();
    match err {
        DbError::UniqueViolation { message } => {
            assert!(message.contains("duplicate key"), "{message}")
        }
        other => panic!("expected a unique violation, got {other:?}"),
    }

    repo.delete_group(&name).await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_postgres_concurrent_creates_have_one_winner() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let name = unique("pg-race");

    let (a, b) = tokio::join!(repo.create_user(user(&name)), repo.create_user(user(&name)));
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

    repo.delete_user(&name).await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_postgres_images_get_assigned_ids() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();

    let first = repo.create_image(new_image(None)).await.unwrap();
    let second = repo.create_image(new_image(None)).await.unwrap();
    assert!(second.id > first.id);
    assert_eq!(first.nprocs, 3);

    // Negative ids never come out of the sequence, so they are safe to claim explicitly.
    let explicit_id = -(std::process::id() as i32 % 1_000_000) - 1;
    let explicit = repo.create_image(new_image(Some(explicit_id))).await.unwrap();
    assert_eq!(explicit.id, explicit_id);
    assert!(matches!(
        repo.create_image(new_image(Some(explicit_id))).await,
        Err(DbError::UniqueViolation { .. })
    ));

    for id in [first.id, second.id, explicit_id] {
        assert!(repo.delete_image(id).await.unwrap());
    }
    assert_eq!(repo.get_image(first.id).await.unwrap(), None);
}

// --- In-memory ---

#[tokio::test]
async fn test_in_memory_matches_postgres_semantics() {
    let repo = InMemoryRepository::new();

    repo.create_user(user("ada")).await.unwrap();
    assert!(matches!(
        repo.create_user(user("ada")).await,
        Err(DbError::UniqueViolation { .. })
    ));
    assert!(repo.delete_user("ada").await.unwrap());
    assert!(!repo.delete_user("ada").await.unwrap());

    repo.create_group(group("staff")).await.unwrap();
    repo.create_group(group("admins")).await.unwrap();
    let names: Vec<String> = repo
        .list_groups()
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.groupname)
        .collect();
    assert_eq!(names, ["admins", "staff"]);
}

#[tokio::test]
async fn test_in_memory_image_ids_are_never_reused() {
    let repo = InMemoryRepository::new();

    let first = repo.create_image(new_image(None)).await.unwrap();
    assert_eq!(first.id, 1);
    assert!(repo.delete_image(first.id).await.unwrap());

    let second = repo.create_image(new_image(None)).await.unwrap();
    assert_eq!(second.id, 2);

    // An explicit id in the sequence's path is skipped over.
    repo.create_image(new_image(Some(3))).await.unwrap();
    let fourth = repo.create_image(new_image(None)).await.unwrap();
    assert_eq!(fourth.id, 4);

    assert!(matches!(
        repo.create_image(new_image(Some(2))).await,
        Err(DbError::UniqueViolation { .. })
    ));
}
