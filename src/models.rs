use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::env;

/// Status of a fixture at the time it was published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub long: String,
    pub short: String,
    pub elapsed: Option<i64>,
}

/// One real-world match occurrence, keyed by its external id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: i64,
    pub referee: Option<String>,
    pub timezone: String,
    pub date: DateTime<FixedOffset>,
    pub timestamp: i64,
    pub status: Status,
}

/// League a fixture belongs to. Shared across aggregates, keyed by its
/// external id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub logo: String,
    pub flag: Option<String>,
    pub season: i64,
    pub round: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub logo: String,
    pub winner: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teams {
    pub home: Team,
    pub away: Team,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goals {
    pub home: Option<i64>,
    pub away: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddValue {
    pub value: String,
    pub odd: f64,
}

/// One betting market for a fixture. Odd ids are only unique within the
/// owning fixture's aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odd {
    pub id: i64,
    pub name: String,
    pub values: Vec<OddValue>,
}

/// The full detail graph of one fixture, treated as a single consistency
/// unit. `last_updated` is absent on ingestion input and stamped by the
/// store on every successful replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureDetails {
    pub fixture: Fixture,
    pub league: League,
    pub teams: Teams,
    pub goals: Goals,
    pub odds: Vec<Odd>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// API process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub post_token: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        // Tolerate container-style sqlite:// URLs; the store wants a path.
        let database_path = database_url
            .strip_prefix("sqlite://")
            .unwrap_or(&database_url)
            .to_string();
        if database_path.trim().is_empty() {
            bail!("DATABASE_URL is empty");
        }

        let post_token = env::var("POST_TOKEN").context("POST_TOKEN not set")?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .unwrap_or(8000);

        Ok(Self {
            database_path,
            post_token,
            port,
        })
    }
}

/// Feed process configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub broker_user: Option<String>,
    pub broker_pass: Option<String>,
    pub post_token: String,
    pub ingest_url: String,
}

impl FeedConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let broker_host = env::var("HOST").context("HOST environment variable not set")?;

        let broker_port = env::var("PORT")
            .context("PORT environment variable not set")?
            .parse()
            .context("PORT environment variable is not an integer")?;

        let broker_user = env::var("USER").ok().filter(|v| !v.is_empty());
        let broker_pass = env::var("PASSWORD").ok().filter(|v| !v.is_empty());

        let post_token = env::var("POST_TOKEN").context("POST_TOKEN not set")?;

        let ingest_url = env::var("INGEST_URL")
            .unwrap_or_else(|_| "http://localhost:8000/fixtures".to_string());

        Ok(Self {
            broker_host,
            broker_port,
            broker_user,
            broker_pass,
            post_token,
            ingest_url,
        })
    }
}
