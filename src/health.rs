use mysql::prelude::Queryable;
use mysql::Pool;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
}

impl HealthReport {
    fn ok(message: impl Into<String>) -> Self {
        HealthReport {
            status: HealthStatus::Ok,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        HealthReport {
            status: HealthStatus::Fail,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }

    pub fn to_json(&self) -> Value {
        json!({
            "status": self.status,
            "message": self.message,
        })
    }
}

/// Interprets the result of the `SELECT 1` probe.
fn report_probe(result: Result<Vec<u8>, mysql::Error>) -> HealthReport {
    match result {
        Ok(rows) if rows.first() == Some(&1) => HealthReport::ok("database connection is healthy"),
        Ok(_) => HealthReport::fail("probe query returned an unexpected result"),
        Err(err) => HealthReport::fail(format!("probe query failed: {err}")),
    }
}

pub fn check_database(pool: &Pool) -> HealthReport {
    tracing::info!("health_check started");

    let mut conn = match pool.get_conn() {
        Ok(conn) => conn,
        Err(err) => {
            tracing::error!("health_check could not get a connection: {:?}", err);
            return HealthReport::fail(format!("could not get a connection from the pool: {err}"));
        }
    };

    let report = report_probe(conn.query::<u8, _>("SELECT 1"));
    if !report.is_ok() {
        tracing::error!("health_check failed: {}", report.message);
    }
    report
}
