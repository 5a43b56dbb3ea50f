//! Read access to the message corpus.
//!
//! The build pipeline never touches the loader's tables directly; it reads
//! through [`CorpusReader`]. `mailnet-ingest` implements it over SQLite and
//! [`MemoryCorpus`] implements it over plain vectors for tests and small
//! fixtures.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::schema::{
    AddressPairTally, Exchange, MessageBody, ParticipantRole, Participation, RawEntity,
};

#[async_trait]
pub trait CorpusReader: Send + Sync {
    /// Raw per-address tally, one row per literal address or label.
    async fn raw_entities(&self) -> Result<Vec<RawEntity>>;

    /// Every sender and every recipient entry of every message.
    async fn participations(&self) -> Result<Vec<Participation>>;

    /// Messages that carry a non-empty body.
    async fn message_bodies(&self) -> Result<Vec<MessageBody>>;

    /// Raw directed sender -> recipient counts.
    async fn address_pair_tally(&self) -> Result<Vec<AddressPairTally>>;

    /// Messages sent by an address in one set to an address in the other,
    /// in either direction. One entry per message.
    async fn exchanges_between(&self, left: &[String], right: &[String]) -> Result<Vec<Exchange>>;
}

/// A message held by [`MemoryCorpus`].
#[derive(Debug, Clone)]
pub struct MemoryMessage {
    pub id: String,
    pub doc_id: String,
    pub sender: String,
    pub sent_at: Option<String>,
    pub body: Option<String>,
    pub recipients: Vec<(String, ParticipantRole)>,
}

impl MemoryMessage {
    pub fn new(id: &str, doc_id: &str, sender: &str, sent_at: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            doc_id: doc_id.to_string(),
            sender: sender.to_string(),
            sent_at: sent_at.map(str::to_string),
            body: None,
            recipients: Vec::new(),
        }
    }

    pub fn to(mut self, address: &str) -> Self {
        self.recipients.push((address.to_string(), ParticipantRole::To));
        self
    }

    pub fn cc(mut self, address: &str) -> Self {
        self.recipients.push((address.to_string(), ParticipantRole::Cc));
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }
}

/// In-memory corpus.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    pub messages: Vec<MemoryMessage>,
    pub entities: Vec<RawEntity>,
    pub tally: Vec<AddressPairTally>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: MemoryMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_entity(mut self, address: &str, name: &str, message_count: i64, principal: bool) -> Self {
        self.entities.push(RawEntity {
            address: address.to_string(),
            name: name.to_string(),
            message_count,
            principal,
        });
        self
    }

    pub fn with_tally(mut self, source: &str, target: &str, weight: i64) -> Self {
        self.tally.push(AddressPairTally {
            source: source.to_string(),
            target: target.to_string(),
            weight,
        });
        self
    }
}

#[async_trait]
impl CorpusReader for MemoryCorpus {
    async fn raw_entities(&self) -> Result<Vec<RawEntity>> {
        Ok(self.entities.clone())
    }

    async fn participations(&self) -> Result<Vec<Participation>> {
        let mut records = Vec::new();
        for message in &self.messages {
            let sent_at = message.sent_at.as_deref();
            if !message.sender.is_empty() {
                records.push(Participation::new(
                    &message.doc_id,
                    &message.sender,
                    ParticipantRole::Sender,
                    sent_at,
                ));
            }
            for (address, role) in &message.recipients {
                if !address.is_empty() {
                    records.push(Participation::new(&message.doc_id, address, *role, sent_at));
                }
            }
        }
        Ok(records)
    }

    async fn message_bodies(&self) -> Result<Vec<MessageBody>> {
        Ok(self
            .messages
            .iter()
            .filter(|m| m.body.as_deref().is_some_and(|b| !b.is_empty()))
            .map(|m| MessageBody {
                id: m.id.clone(),
                doc_id: m.doc_id.clone(),
                sender_address: m.sender.clone(),
                sent_at: m.sent_at.clone(),
                body: m.body.clone(),
            })
            .collect())
    }

    async fn address_pair_tally(&self) -> Result<Vec<AddressPairTally>> {
        Ok(self.tally.clone())
    }

    async fn exchanges_between(&self, left: &[String], right: &[String]) -> Result<Vec<Exchange>> {
        let left: HashSet<&str> = left.iter().map(String::as_str).collect();
        let right: HashSet<&str> = right.iter().map(String::as_str).collect();

        Ok(self
            .messages
            .iter()
            .filter(|m| {
                let sender = m.sender.as_str();
                m.recipients.iter().any(|(r, _)| {
                    (left.contains(sender) && right.contains(r.as_str()))
                        || (right.contains(sender) && left.contains(r.as_str()))
                })
            })
            .map(|m| Exchange {
                doc_id: m.doc_id.clone(),
                sent_at: m.sent_at.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_corpus_participations() {
        let corpus = MemoryCorpus::new().with_message(
            MemoryMessage::new("m1", "t1", "a@x.com", Some("2024-01-01"))
                .to("b@x.com")
                .cc(""),
        );
        let records = corpus.participations().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, ParticipantRole::Sender);
        assert_eq!(records[1].address, "b@x.com");
    }

    #[tokio::test]
    async fn test_exchanges_either_direction() {
        let corpus = MemoryCorpus::new()
            .with_message(MemoryMessage::new("m1", "t1", "a@x.com", Some("2024-01-01")).to("b@x.com"))
            .with_message(MemoryMessage::new("m2", "t2", "b@x.com", None).cc("a2@x.com"))
            .with_message(MemoryMessage::new("m3", "t3", "c@x.com", None).to("b@x.com"));

        let left = vec!["a@x.com".to_string(), "a2@x.com".to_string()];
        let right = vec!["b@x.com".to_string()];
        let exchanges = corpus.exchanges_between(&left, &right).await.unwrap();
        let docs: Vec<&str> = exchanges.iter().map(|e| e.doc_id.as_str()).collect();
        assert_eq!(docs, vec!["t1", "t2"]);
    }
}
