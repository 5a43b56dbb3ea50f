//! Graph schema definitions for Mailnet.
//!
//! This module defines the core types for the correspondent graph:
//! - Inputs read from the message store (`Participation`, `MessageBody`,
//!   `RawEntity`, `AddressPairTally`, `Exchange`)
//! - `RelationshipType`: the evidentiary channel behind an edge
//! - `RelationshipEdge`, `Mention`, `AliasRecord`, `EntityProfile`: what a
//!   build writes
//! - `GraphNode`, `GraphLink`, `GraphView`: what graph queries return

use serde::{Deserialize, Serialize};

/// The source an edge was derived from. Edges of different types between
/// the same pair are stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    /// Both identities took part in the same thread.
    #[serde(rename = "co-participant")]
    CoParticipant,
    /// Found inside a forwarded or quoted header block.
    #[serde(rename = "forwarded")]
    Forwarded,
    /// Collapsed from the raw sender -> recipient tally.
    #[serde(rename = "direct_email")]
    DirectEmail,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 3] = [
        RelationshipType::CoParticipant,
        RelationshipType::Forwarded,
        RelationshipType::DirectEmail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::CoParticipant => "co-participant",
            RelationshipType::Forwarded => "forwarded",
            RelationshipType::DirectEmail => "direct_email",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "co-participant" => Some(RelationshipType::CoParticipant),
            "forwarded" => Some(RelationshipType::Forwarded),
            "direct_email" => Some(RelationshipType::DirectEmail),
            _ => None,
        }
    }

    /// Parse a query filter. Empty or unknown filters mean "no filter".
    pub fn parse_filter(filter: Option<&str>) -> Option<Self> {
        filter.and_then(|f| Self::parse(f.trim()))
    }
}

/// How an address took part in a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Sender,
    To,
    Cc,
    Bcc,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Sender => "sender",
            ParticipantRole::To => "to",
            ParticipantRole::Cc => "cc",
            ParticipantRole::Bcc => "bcc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sender" => Some(ParticipantRole::Sender),
            "to" => Some(ParticipantRole::To),
            "cc" => Some(ParticipantRole::Cc),
            "bcc" => Some(ParticipantRole::Bcc),
            _ => None,
        }
    }
}

/// One address appearing on one message, as sender or recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    pub doc_id: String,
    pub address: String,
    pub role: ParticipantRole,
    pub sent_at: Option<String>,
}

impl Participation {
    pub fn new(
        doc_id: impl Into<String>,
        address: impl Into<String>,
        role: ParticipantRole,
        sent_at: Option<&str>,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            address: address.into(),
            role,
            sent_at: sent_at.map(str::to_string),
        }
    }
}

/// A message whose free-text body may carry forwarded headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub id: String,
    pub doc_id: String,
    pub sender_address: String,
    pub sent_at: Option<String>,
    pub body: Option<String>,
}

/// Raw per-address tally produced by the loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntity {
    pub address: String,
    pub name: String,
    pub message_count: i64,
    pub principal: bool,
}

/// Raw directed sender -> recipient count, built without alias awareness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressPairTally {
    pub source: String,
    pub target: String,
    pub weight: i64,
}

/// A message exchanged between two address sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub doc_id: String,
    pub sent_at: Option<String>,
}

/// An undirected, typed, weighted edge between two canonical identities.
///
/// `entity_a < entity_b` always holds for stored edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub entity_a: String,
    pub entity_b: String,
    pub relationship_type: RelationshipType,
    pub weight: i64,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
    pub sample_doc_id: Option<String>,
    pub context: Option<String>,
}

impl RelationshipEdge {
    /// The endpoint opposite `address`, if `address` is an endpoint.
    pub fn partner_of(&self, address: &str) -> Option<&str> {
        if self.entity_a == address {
            Some(&self.entity_b)
        } else if self.entity_b == address {
            Some(&self.entity_a)
        } else {
            None
        }
    }

    pub fn touches(&self, address: &str) -> bool {
        self.entity_a == address || self.entity_b == address
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionType {
    ForwardedHeader,
}

impl MentionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MentionType::ForwardedHeader => "forwarded_header",
        }
    }
}

/// A canonical identity named inside a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub entity_address: String,
    pub message_id: String,
    pub mention_type: MentionType,
    pub context: String,
}

/// A persisted alias resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    pub alias_address: String,
    pub canonical_address: String,
    pub alias_name: String,
    pub canonical_name: String,
}

/// Aggregated record for one canonical identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub address: String,
    pub canonical_name: String,
    pub names: Vec<String>,
    pub emails: Vec<String>,
    pub role: String,
    pub first_active: Option<String>,
    pub last_active: Option<String>,
    pub total_messages: i64,
    pub total_threads: i64,
    pub total_connections: i64,
    pub principal: bool,
}

/// A node in a graph query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub message_count: i64,
    pub connection_count: i64,
    pub principal: bool,
    pub role: String,
}

impl From<&EntityProfile> for GraphNode {
    fn from(profile: &EntityProfile) -> Self {
        Self {
            id: profile.address.clone(),
            name: profile.canonical_name.clone(),
            message_count: profile.total_messages,
            connection_count: profile.total_connections,
            principal: profile.principal,
            role: profile.role.clone(),
        }
    }
}

/// An edge in a graph query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub weight: i64,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

impl GraphView {
    pub fn node_ids(&self) -> std::collections::BTreeSet<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_type_names() {
        assert_eq!(RelationshipType::CoParticipant.as_str(), "co-participant");
        assert_eq!(
            serde_json::to_string(&RelationshipType::DirectEmail).unwrap(),
            "\"direct_email\""
        );
        for ty in RelationshipType::ALL {
            assert_eq!(RelationshipType::parse(ty.as_str()), Some(ty));
        }
    }

    #[test]
    fn test_unknown_filter_is_no_filter() {
        assert_eq!(RelationshipType::parse_filter(Some("friendship")), None);
        assert_eq!(RelationshipType::parse_filter(Some("")), None);
        assert_eq!(RelationshipType::parse_filter(None), None);
        assert_eq!(
            RelationshipType::parse_filter(Some("forwarded")),
            Some(RelationshipType::Forwarded)
        );
    }

    #[test]
    fn test_edge_partner() {
        let edge = RelationshipEdge {
            entity_a: "a@x.com".to_string(),
            entity_b: "b@x.com".to_string(),
            relationship_type: RelationshipType::CoParticipant,
            weight: 1,
            first_seen: None,
            last_seen: None,
            sample_doc_id: None,
            context: None,
        };
        assert_eq!(edge.partner_of("a@x.com"), Some("b@x.com"));
        assert_eq!(edge.partner_of("b@x.com"), Some("a@x.com"));
        assert_eq!(edge.partner_of("c@x.com"), None);
    }

    #[test]
    fn test_link_serializes_type_field() {
        let link = GraphLink {
            source: "a".to_string(),
            target: "b".to_string(),
            weight: 4,
            relationship_type: RelationshipType::Forwarded,
        };
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["type"], "forwarded");
    }
}
