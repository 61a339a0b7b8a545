use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::Role;

/// How a list view keeps up with its remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncMode {
    /// Live feed; the collection pushes a fresh snapshot on every change.
    Subscribe,
    /// Re-list after every mutation and on mount.
    Pull,
}

impl std::str::FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subscribe" | "live" => Ok(SyncMode::Subscribe),
            "pull" => Ok(SyncMode::Pull),
            other => anyhow::bail!("Unknown sync mode {:?} (expected subscribe or pull)", other),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "school-lms", about = "School learning management system client")]
pub struct Args {
    /// Run against an in-memory backend with demo accounts
    #[arg(long)]
    pub offline: bool,

    /// Override LMS_SYNC_MODE
    #[arg(long, value_enum)]
    pub sync_mode: Option<SyncMode>,

    /// Override LMS_LOG_FILE
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    pub storage_bucket: String,
}

/// Static email-to-role mapping. Anyone not listed is a student.
#[derive(Debug, Clone)]
pub struct RoleMap {
    pub admin_email: String,
    pub teacher_email: String,
}

impl RoleMap {
    pub fn role_for(&self, email: &str) -> Role {
        let email = email.trim();
        if email.eq_ignore_ascii_case(&self.admin_email) {
            Role::Admin
        } else if email.eq_ignore_ascii_case(&self.teacher_email) {
            Role::Teacher
        } else {
            Role::Student
        }
    }
}

impl Default for RoleMap {
    fn default() -> Self {
        Self {
            admin_email: "admin@gmail.com".to_string(),
            teacher_email: "teacher@gmail.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` when running offline.
    pub firebase: Option<FirebaseConfig>,
    pub sync_mode: SyncMode,
    pub poll_interval: Duration,
    pub notice_timeout: Duration,
    pub roles: RoleMap,
    pub log_file: PathBuf,
}

impl Config {
    pub fn load(args: &Args) -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let firebase = if args.offline {
            None
        } else {
            Some(FirebaseConfig {
                api_key: required("FIREBASE_API_KEY")?,
                project_id: required("FIREBASE_PROJECT_ID")?,
                storage_bucket: required("FIREBASE_STORAGE_BUCKET")?,
            })
        };

        let sync_mode = match args.sync_mode {
            Some(mode) => mode,
            None => match env::var("LMS_SYNC_MODE") {
                Ok(value) => value.parse().context("Invalid LMS_SYNC_MODE")?,
                Err(_) => SyncMode::Subscribe,
            },
        };

        let defaults = RoleMap::default();
        let roles = RoleMap {
            admin_email: env::var("LMS_ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            teacher_email: env::var("LMS_TEACHER_EMAIL").unwrap_or(defaults.teacher_email),
        };

        let log_file = match &args.log_file {
            Some(path) => path.clone(),
            None => env::var("LMS_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("school-lms.log")),
        };

        Ok(Config {
            firebase,
            sync_mode,
            poll_interval: millis("LMS_POLL_INTERVAL_MS", 2000)?,
            notice_timeout: millis("LMS_NOTICE_TIMEOUT_MS", 3000)?,
            roles,
            log_file,
        })
    }
}

fn required(key: &str) -> Result<String> {
    let value = env::var(key).with_context(|| {
        format!(
            "{} not found. Please set it in .env file or environment, or run with --offline",
            key
        )
    })?;

    if value.trim().is_empty() {
        anyhow::bail!("{} is empty", key);
    }

    Ok(value)
}

fn millis(key: &str, default: u64) -> Result<Duration> {
    match env::var(key) {
        Ok(value) => {
            let ms: u64 = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds, got {:?}", key, value))?;
            Ok(Duration::from_millis(ms))
        }
        Err(_) => Ok(Duration::from_millis(default)),
    }
}
