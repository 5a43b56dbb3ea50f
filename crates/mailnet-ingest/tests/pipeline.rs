use std::collections::BTreeSet;

use mailnet_graph::{
    CuratedTables, GraphBuilder, GraphError, GraphQueryEngine, ParticipantRole, RawEntity,
    RelationshipType,
};
use mailnet_ingest::{CorpusStore, MessageRecord, RecipientRecord, ThreadRecord};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    store: CorpusStore,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = CorpusStore::create(&dir.path().join("corpus.db")).await.unwrap();
    Fixture { _dir: dir, store }
}

async fn send(
    store: &CorpusStore,
    id: &str,
    doc: &str,
    sent_at: &str,
    sender: &str,
    to: &[&str],
    cc: &[&str],
    body: Option<&str>,
) {
    store
        .insert_thread(&ThreadRecord {
            doc_id: doc.to_string(),
            subject: Some(format!("Thread {}", doc)),
            message_count: 1,
            latest_date: Some(sent_at.to_string()),
        })
        .await
        .unwrap();
    store
        .insert_message(&MessageRecord {
            id: id.to_string(),
            doc_id: doc.to_string(),
            message_index: 0,
            sender_address: sender.to_string(),
            sender_name: None,
            subject: None,
            sent_at: Some(sent_at.to_string()),
            body_text: body.map(str::to_string),
            body_html: None,
        })
        .await
        .unwrap();
    let recipients = to
        .iter()
        .map(|a| (a, ParticipantRole::To))
        .chain(cc.iter().map(|a| (a, ParticipantRole::Cc)));
    for (address, role) in recipients {
        store
            .insert_recipient(&RecipientRecord {
                message_id: id.to_string(),
                address: address.to_string(),
                name: None,
                role,
            })
            .await
            .unwrap();
        store.add_tally(sender, address, 1).await.unwrap();
    }
}

async fn entity(store: &CorpusStore, address: &str, name: &str, count: i64, principal: bool) {
    store
        .upsert_entity(&RawEntity {
            address: address.to_string(),
            name: name.to_string(),
            message_count: count,
            principal,
        })
        .await
        .unwrap();
}

/// alice, bob and carol share T1; alice and bob share T2. The principal
/// writes from two of its addresses, and bob forwards a header block.
async fn seed(store: &CorpusStore) {
    send(store, "m1", "T1", "2024-01-01", "alice@a.com", &["bob@b.com"], &["carol@c.com"], None).await;
    send(store, "m2", "T2", "2024-02-01", "bob@b.com", &["alice@a.com"], &[], None).await;
    send(store, "m3", "T3", "2024-03-05", "jeevacation@gmail.com", &["alice@a.com"], &[], None).await;
    send(store, "m4", "T4", "2024-04-01", "jeeproject@yahoo.com", &["bob@b.com"], &[], None).await;
    send(
        store,
        "m5",
        "T5",
        "2024-05-01",
        "bob@b.com",
        &["dave@d.com"],
        &[],
        Some("see below\n\n---------- Forwarded message ---------\nFrom: Erin Example <erin@e.com>\nTo: frank@f.com\n"),
    )
    .await;

    entity(store, "alice@a.com", "Alice Anders", 3, false).await;
    entity(store, "bob@b.com", "Bob", 4, false).await;
    entity(store, "carol@c.com", "", 1, false).await;
    entity(store, "dave@d.com", "Dave", 1, false).await;
    entity(store, "jeevacation@gmail.com", "jeevacation", 1, true).await;
    entity(store, "jeeproject@yahoo.com", "", 1, false).await;
    entity(store, "jeffrey epstein", "", 0, false).await;
}

#[tokio::test]
async fn test_build_from_sqlite_corpus() {
    let fx = fixture().await;
    seed(&fx.store).await;
    let tables = CuratedTables::builtin().unwrap();
    let graph = fx.store.graph_store();

    let report = GraphBuilder::new(&tables).build(&fx.store, &graph).await.unwrap();
    assert_eq!(report.threads_seen, 5);
    assert_eq!(report.threads_processed, 5);
    assert_eq!(report.messages_with_forwarded_headers, 1);
    assert_eq!(report.mentions_extracted, 2);

    let edges = graph.edges_touching(&["alice@a.com".to_string()]).await.unwrap();
    let alice_bob = edges
        .iter()
        .find(|e| {
            e.entity_a == "alice@a.com"
                && e.entity_b == "bob@b.com"
                && e.relationship_type == RelationshipType::CoParticipant
        })
        .unwrap();
    assert_eq!(alice_bob.weight, 2);
    assert_eq!(alice_bob.first_seen.as_deref(), Some("2024-01-01"));
    assert_eq!(alice_bob.last_seen.as_deref(), Some("2024-02-01"));

    let alice_carol = edges
        .iter()
        .find(|e| e.entity_b == "carol@c.com" && e.relationship_type == RelationshipType::CoParticipant)
        .unwrap();
    assert_eq!(alice_carol.weight, 1);

    let direct = edges
        .iter()
        .find(|e| e.entity_b == "bob@b.com" && e.relationship_type == RelationshipType::DirectEmail)
        .unwrap();
    assert_eq!(direct.weight, 2);
    assert_eq!(direct.sample_doc_id.as_deref(), Some("T1"));
    assert_eq!(direct.first_seen.as_deref(), Some("2024-01-01"));
    assert_eq!(direct.last_seen.as_deref(), Some("2024-02-01"));
}

#[tokio::test]
async fn test_stored_edges_are_ordered_and_dated() {
    let fx = fixture().await;
    seed(&fx.store).await;
    let tables = CuratedTables::builtin().unwrap();
    let graph = fx.store.graph_store();
    GraphBuilder::new(&tables).build(&fx.store, &graph).await.unwrap();

    let edges = graph.edges_min_weight(1, None).await.unwrap();
    assert!(!edges.is_empty());
    for edge in &edges {
        assert!(edge.entity_a < edge.entity_b, "unordered {:?}", edge);
        assert!(edge.weight >= 1);
        if let (Some(first), Some(last)) = (&edge.first_seen, &edge.last_seen) {
            assert!(first <= last);
        }
    }
}

#[tokio::test]
async fn test_principal_addresses_fold_into_one_profile() {
    let fx = fixture().await;
    seed(&fx.store).await;
    let tables = CuratedTables::builtin().unwrap();
    let graph = fx.store.graph_store();
    GraphBuilder::new(&tables).build(&fx.store, &graph).await.unwrap();

    let engine = GraphQueryEngine::new(graph.clone());
    let profile = engine.profile("jeffrey epstein").await.unwrap().unwrap();
    assert_eq!(profile.address, "jeevacation@gmail.com");
    assert_eq!(profile.canonical_name, "Jeffrey Epstein");
    assert!(profile.principal);
    assert!(profile.names.contains(&"jeffrey epstein".to_string()));
    assert!(profile.names.contains(&"jeevacation".to_string()));
    assert!(profile.emails.contains(&"jeeproject@yahoo.com".to_string()));
    assert_eq!(profile.total_threads, 2);
    assert_eq!(profile.first_active.as_deref(), Some("2024-03-05"));
    assert_eq!(profile.last_active.as_deref(), Some("2024-04-01"));

    // The folded address never appears as an endpoint
    let folded = graph.edges_touching(&["jeeproject@yahoo.com".to_string()]).await.unwrap();
    assert!(folded.is_empty());
    let bob = graph.edges_between("bob@b.com", "jeevacation@gmail.com").await.unwrap();
    assert!(!bob.is_empty());
}

#[tokio::test]
async fn test_forwarded_header_edges() {
    let fx = fixture().await;
    seed(&fx.store).await;
    let tables = CuratedTables::builtin().unwrap();
    let graph = fx.store.graph_store();
    GraphBuilder::new(&tables).build(&fx.store, &graph).await.unwrap();

    let forwarded = graph
        .edges_min_weight(1, Some(RelationshipType::Forwarded))
        .await
        .unwrap();
    let pairs: BTreeSet<(&str, &str)> = forwarded
        .iter()
        .map(|e| (e.entity_a.as_str(), e.entity_b.as_str()))
        .collect();
    assert_eq!(
        pairs,
        BTreeSet::from([
            ("bob@b.com", "erin@e.com"),
            ("bob@b.com", "frank@f.com"),
            ("erin@e.com", "frank@f.com"),
        ])
    );
    assert!(forwarded.iter().all(|e| e.sample_doc_id.as_deref() == Some("T5")));
    assert_eq!(graph.mention_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_principal_pairs_are_never_stored() {
    let fx = fixture().await;
    send(&fx.store, "m1", "T1", "2024-01-01", "p1@x.com", &["p2@x.com", "z@x.com"], &[], None).await;
    entity(&fx.store, "p1@x.com", "", 1, true).await;
    entity(&fx.store, "p2@x.com", "", 1, true).await;
    entity(&fx.store, "z@x.com", "", 1, false).await;

    let tables = CuratedTables::from_toml("principals = [\"p1@x.com\", \"p2@x.com\"]\n").unwrap();
    let graph = fx.store.graph_store();
    GraphBuilder::new(&tables).build(&fx.store, &graph).await.unwrap();

    assert!(graph.edges_between("p1@x.com", "p2@x.com").await.unwrap().is_empty());
    assert!(!graph.edges_between("p1@x.com", "z@x.com").await.unwrap().is_empty());
    assert!(!graph.edges_between("p2@x.com", "z@x.com").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ego_network_grows_with_depth() {
    let fx = fixture().await;
    seed(&fx.store).await;
    let tables = CuratedTables::builtin().unwrap();
    let graph = fx.store.graph_store();
    GraphBuilder::new(&tables).build(&fx.store, &graph).await.unwrap();

    let engine = GraphQueryEngine::new(graph);
    let one = engine.ego_network("carol@c.com", 1).await.unwrap();
    let two = engine.ego_network("carol@c.com", 2).await.unwrap();
    assert!(one.node_ids().is_subset(&two.node_ids()));
    assert!(two.node_ids().contains("dave@d.com"));
    assert!(!one.node_ids().contains("dave@d.com"));

    let zero = engine.ego_network("carol@c.com", 0).await.unwrap();
    assert_eq!(zero.node_ids(), BTreeSet::from(["carol@c.com"]));
    assert!(zero.links.is_empty());
}

#[tokio::test]
async fn test_edge_listing_truncation_is_deterministic() {
    let fx = fixture().await;
    seed(&fx.store).await;
    let tables = CuratedTables::builtin().unwrap();
    let graph = fx.store.graph_store();
    GraphBuilder::new(&tables).build(&fx.store, &graph).await.unwrap();

    let engine = GraphQueryEngine::new(graph);
    let first = engine.edge_listing(Some(1), Some(3), None).await.unwrap();
    let second = engine.edge_listing(Some(1), Some(3), None).await.unwrap();
    assert_eq!(first, second);
    assert!(first.nodes.len() <= 3);
    let ids = first.node_ids();
    assert!(first
        .links
        .iter()
        .all(|l| ids.contains(l.source.as_str()) && ids.contains(l.target.as_str())));
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let fx = fixture().await;
    seed(&fx.store).await;
    let tables = CuratedTables::builtin().unwrap();
    let graph = fx.store.graph_store();
    let builder = GraphBuilder::new(&tables);

    builder.build(&fx.store, &graph).await.unwrap();
    let before = graph.edges_min_weight(1, None).await.unwrap();
    let profiles = graph.profile_count().await.unwrap();

    builder.build(&fx.store, &graph).await.unwrap();
    assert_eq!(graph.edges_min_weight(1, None).await.unwrap(), before);
    assert_eq!(graph.profile_count().await.unwrap(), profiles);
}

#[tokio::test]
async fn test_open_missing_store_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let err = match CorpusStore::open(&dir.path().join("absent.db")).await {
        Ok(_) => panic!("opening a missing store should fail"),
        Err(err) => err,
    };
    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::StoreUnavailable { .. })
    ));
}
