use std::process::ExitCode;

use dotenv::dotenv;
use simple_posts::config::Config;
use simple_posts::database::{connect_to_database, MySqlDatabase};
use simple_posts::health::check_database;
use simple_posts::schema::ensure_schema;
use simple_posts::{Blog, BlogError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn run() -> Result<bool, BlogError> {
    let config = Config::from_env()?;
    let pool = connect_to_database(&config)?;
    ensure_schema(&pool)?;

    let report = check_database(&pool);
    println!("{}", report.to_json());

    let blog = Blog::new(MySqlDatabase::new(pool));
    let (_, pager) = blog.list_posts(1, 10, false, true, "published_at DESC")?;
    tracing::info!("{} published posts", pager.total);
    Ok(report.is_ok())
}

fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("startup failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
