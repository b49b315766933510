//! Shared setup for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use stashbox::db::Database;
use stashbox::db::performers::PerformerRepository;
use stashbox::models::{self, Performer, PerformerCreateInput};
use stashbox::user::Mailer;

/// Fresh single-connection in-memory database with every table created
pub async fn test_db() -> Database {
    let db = Database::in_memory(models::registry()).await.unwrap();
    db.sync_schema().await.unwrap();
    db
}

pub async fn create_performer(db: &Database, name: &str, aliases: &[&str]) -> Performer {
    let mut tx = db.begin().await.unwrap();
    let performer = PerformerRepository::new(&mut *tx, db.registry())
        .create(&PerformerCreateInput {
            name: name.to_string(),
            aliases: Some(aliases.iter().map(|a| a.to_string()).collect()),
            ..Default::default()
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();
    performer
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl SentMail {
    /// The activation key embedded in the emailed link
    pub fn key(&self) -> Uuid {
        let raw = self.body.rsplit("key=").next().unwrap();
        Uuid::parse_str(raw.trim()).unwrap()
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.sent.lock().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
