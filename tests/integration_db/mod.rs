use dotenv::dotenv;
use ideabox_server::db;
use lazy_static::lazy_static;
use sqlx::{postgres::PgConnectOptions, PgPool};
use tokio::sync::Mutex;
use tracing::{debug, span};

const MAX_CONNECTIONS: u32 = 5;

lazy_static! {
    static ref CREATE_DB_MUTEX: Mutex<()> = Mutex::new(());
}

async fn create_test_db(pool: PgPool, test_db: &str) {
    let _lock = CREATE_DB_MUTEX.lock().await;
    debug!("Creating new test db");

    sqlx::query(&format!("DROP DATABASE IF EXISTS {}", test_db))
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(&format!("CREATE DATABASE {}", test_db))
        .execute(&pool)
        .await
        .unwrap();
}

async fn drop_test_db(pool: PgPool, test_db: &str) {
    let _lock = CREATE_DB_MUTEX.lock().await;
    debug!("Dropping test db");
    // FORCE terminates the connections still held by the test's pool
    sqlx::query(&format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", test_db))
        .execute(&pool)
        .await
        .unwrap();
}

/// Throw-away database created next to the one named by `DATABASE_URL`, with
/// all migrations applied.
pub struct IntegrationTestDb {
    db_name: String,
    pool: PgPool,
    template_connect_options: PgConnectOptions,
}

impl IntegrationTestDb {
    /// `None` when `DATABASE_URL` is not set, so database tests can be skipped.
    pub async fn new() -> Option<Self> {
        dotenv().ok();
        let template_connect_options: PgConnectOptions = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => url.parse().unwrap(),
            _ => {
                eprintln!("DATABASE_URL not set, skipping database test");
                return None;
            }
        };

        // Creating test database with random name
        let db_name = format!("integration_{}", uuid::Uuid::new_v4().simple());
        let span = span!(tracing::Level::DEBUG, "test_db", test_db = db_name.as_str());
        let _enter = span.enter();
        let template_pool = db::new_pool_with(template_connect_options.clone(), 1)
            .await
            .unwrap();
        create_test_db(template_pool, &db_name).await;

        let integration_options = template_connect_options.clone().database(&db_name);
        let pool = db::new_pool_with(integration_options, MAX_CONNECTIONS)
            .await
            .unwrap();
        db::migrate(&pool).await.unwrap();

        Some(Self {
            db_name,
            pool,
            template_connect_options,
        })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

impl Drop for IntegrationTestDb {
    fn drop(&mut self) {
        // Cleanup test db after test is finished
        let db_name = self.db_name.clone();
        let template_connect_options = self.template_connect_options.clone();
        let cleanup = std::thread::spawn(move || {
            let span = span!(tracing::Level::DEBUG, "test_db", test_db = db_name.as_str());
            let _enter = span.enter();
            actix_rt::System::new().block_on(async move {
                let template_pool = db::new_pool_with(template_connect_options, 1)
                    .await
                    .unwrap();
                drop_test_db(template_pool, &db_name).await;
                debug!("Dropped test db");
            });
        });
        let _ = cleanup.join();
    }
}
