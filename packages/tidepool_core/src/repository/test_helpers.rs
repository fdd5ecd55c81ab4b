use sqlx::sqlite::SqlitePoolOptions;

/// Create a fresh ChatRepository backed by an in-memory SQLite database.
/// Each call returns an isolated database with all migrations applied.
pub async fn test_repository() -> super::ChatRepository {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    crate::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("Failed to enable foreign keys");

    super::ChatRepository::new(pool)
}

/// Insert a user and return its id. Most chat fixtures need an owner row to
/// satisfy the chats.user_id foreign key.
pub async fn seed_user(repo: &super::ChatRepository, name: &str, email: &str) -> i64 {
    repo.create_user(&crate::models::NewUser {
        display_name: name.to_string(),
        email: email.to_string(),
        profile_image: None,
    })
    .await
    .expect("Failed to seed user")
}
