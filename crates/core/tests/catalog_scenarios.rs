use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use aspectgraph::{
    AspectTarget, Catalog, CatalogConfig, EdgeDirection, ErrorKind, Schema,
    TimeSeriesAspectWriter, VersionedAspectWriter,
};
use serde_json::{json, Value};
use tempfile::NamedTempFile;

const ORDERS: &str = "urn:li:dataset:(mysql,shop.orders,PROD)";

fn fixture_path() -> String {
    format!("{}/tests/fixtures/catalog.yaml", env!("CARGO_MANIFEST_DIR"))
}

fn open_catalog() -> Catalog {
    let schema = Schema::from_path(fixture_path()).unwrap();
    Catalog::open_in_memory(schema).unwrap()
}

fn edges_of(catalog: &Catalog, urn: &str, direction: EdgeDirection) -> Vec<(String, String, String)> {
    let mut edges: Vec<_> = catalog
        .writer()
        .relationships(urn, direction)
        .unwrap()
        .into_iter()
        .map(|e| (e.from, e.rel_type, e.to))
        .collect();
    edges.sort();
    edges
}

#[test]
fn fixture_generates_three_operations_per_type() {
    let catalog = open_catalog();
    let names: Vec<_> = catalog.operations().names().collect();
    // 4 entity types + 7 aspects.
    assert_eq!(names.len(), 33);
    assert!(names.contains(&"upsertFineGrainedLineage"));
    assert!(names.contains(&"deleteSchemaField"));
}

#[test]
fn ownership_ingestion_creates_owner_and_single_edge() {
    let catalog = open_catalog();
    let payload = json!({"owners": [{"owner": "alice", "type": "INDIVIDUAL"}]});

    let out = catalog
        .invoke("upsertOwnership", json!({"urn": ORDERS, "payload": payload}))
        .unwrap();
    assert_eq!(out["version"], 0);
    assert_eq!(out["entity_type"], "Dataset");

    let latest = catalog
        .invoke("getOwnership", json!({"urn": ORDERS}))
        .unwrap();
    assert_eq!(latest["version"], 0);
    assert_eq!(latest["payload"], payload);

    let alice = catalog
        .invoke("getCorpUser", json!({"urn": "urn:li:corpuser:alice"}))
        .unwrap();
    assert_eq!(alice["username"], "alice");

    let owns = vec![(
        "urn:li:corpuser:alice".to_string(),
        "OWNS".to_string(),
        ORDERS.to_string(),
    )];
    assert_eq!(edges_of(&catalog, ORDERS, EdgeDirection::Incoming), owns);

    // Re-ingesting the identical payload is re-entrant.
    catalog
        .invoke("upsertOwnership", json!({"urn": ORDERS, "payload": payload}))
        .unwrap();
    assert_eq!(edges_of(&catalog, ORDERS, EdgeDirection::Incoming), owns);
    let incoming = catalog
        .writer()
        .relationships(ORDERS, EdgeDirection::Incoming)
        .unwrap();
    assert_eq!(incoming[0].props["type"], "INDIVIDUAL");
}

#[test]
fn successive_upserts_keep_exactly_one_latest() {
    let catalog = open_catalog();
    let ownership = catalog.operations().versioned("ownership").unwrap();
    let target = AspectTarget::Urn {
        urn: ORDERS.to_string(),
        entity_type: Some("Dataset".to_string()),
    };

    for n in 0..5u64 {
        let written = ownership
            .upsert(&target, json!({"owners": [], "lastModified": n}), None)
            .unwrap();
        assert_eq!(written.stamp, n);

        let history = catalog
            .writer()
            .aspect_history("Dataset", ORDERS, "ownership")
            .unwrap();
        assert_eq!(history.len() as u64, n + 1);
        let latest: Vec<_> = history.iter().filter(|v| v.latest).collect();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].version, n);
        assert!(history.windows(2).all(|w| w[0].version < w[1].version));
    }

    let latest = ownership.get(&target, None).unwrap();
    assert_eq!(latest.payload["lastModified"], 4);
}

#[test]
fn unknown_aspect_is_rejected_before_any_write() {
    let catalog = open_catalog();
    let err = catalog
        .writer()
        .upsert_versioned_aspect("Dataset", ORDERS, "schemaMetadata", json!({}), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);

    let err = catalog
        .invoke("upsertSchemaMetadata", json!({"urn": ORDERS, "payload": {}}))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);

    assert!(catalog.writer().store().node(ORDERS).unwrap().is_none());
}

#[test]
fn wrong_kind_and_undeclared_pairings_are_validation_errors() {
    let catalog = open_catalog();
    let writer = catalog.writer();
    let err = writer
        .append_timeseries_aspect("Dataset", ORDERS, "ownership", json!({}), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = writer
        .upsert_versioned_aspect("CorpUser", "urn:li:corpuser:x", "ownership", json!({}), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("urn:li:corpuser:x"), "{err}");
    assert!(writer.store().node(ORDERS).unwrap().is_none());
}

#[test]
fn time_series_points_are_append_only_and_newest_first() {
    let catalog = open_catalog();
    let profile = catalog.operations().timeseries("datasetProfile").unwrap();
    let target = AspectTarget::Urn {
        urn: ORDERS.to_string(),
        entity_type: None,
    };
    for (ts, rows) in [(1_000, 10), (3_000, 30), (2_000, 20), (4_000, 40)] {
        let written = profile
            .append(&target, json!({"rowCount": rows}), Some(ts))
            .unwrap();
        assert_eq!(written.stamp, ts);
    }

    let top = profile.get(&target, 3).unwrap();
    let rows: Vec<_> = top.iter().map(|p| p.payload["rowCount"].clone()).collect();
    assert_eq!(rows, vec![json!(40), json!(30), json!(20)]);

    let all = profile.get(&target, 100).unwrap();
    assert_eq!(all.len(), 4);

    // Default limit through the JSON boundary.
    let points = catalog
        .invoke("getDatasetProfile", json!({"urn": ORDERS}))
        .unwrap();
    assert_eq!(points.as_array().unwrap().len(), 4);
}

#[test]
fn column_lineage_lifts_to_dataset_lineage() {
    let catalog = open_catalog();
    let clean = "urn:li:dataset:(hive,clean.users,PROD)";
    let raw = "urn:li:dataset:(hive,raw.users,PROD)";

    let column = catalog
        .schema()
        .generate_urn(
            "column",
            json!({"platform": "Hive", "name": "clean.users", "field_path": "id"})
                .as_object()
                .unwrap(),
        )
        .unwrap();
    assert_eq!(column, format!("{clean}#id"));

    let payload = json!({"upstreams": [
        {"field_urn": format!("{raw}#user_id"), "transformation": "IDENTITY"},
        {"field_urn": format!("{raw}#legacy_id"), "transformation": "CAST"},
        {"field_urn": format!("{clean}#tmp_id"), "transformation": "COPY"}
    ]});
    for _ in 0..2 {
        catalog
            .invoke(
                "upsertFineGrainedLineage",
                json!({"urn": column, "entity_type": "SchemaField", "payload": payload}),
            )
            .unwrap();
    }

    let field_edges = edges_of(&catalog, &column, EdgeDirection::Outgoing);
    assert_eq!(
        field_edges,
        vec![
            (column.clone(), "DERIVED_FROM".to_string(), format!("{clean}#tmp_id")),
            (column.clone(), "DERIVED_FROM".to_string(), format!("{raw}#legacy_id")),
            (column.clone(), "DERIVED_FROM".to_string(), format!("{raw}#user_id")),
        ]
    );
    let derived = catalog
        .writer()
        .relationships(&column, EdgeDirection::Outgoing)
        .unwrap();
    assert!(derived
        .iter()
        .any(|e| e.to.ends_with("#user_id") && e.props["transformation"] == "IDENTITY"));

    // Two column edges collapse into one dataset edge; the same-dataset
    // upstream lifts to a self-loop and is skipped.
    assert_eq!(
        edges_of(&catalog, clean, EdgeDirection::Outgoing),
        vec![(clean.to_string(), "DOWNSTREAM_OF".to_string(), raw.to_string())]
    );
    assert!(catalog
        .invoke("getDataset", json!({"urn": raw}))
        .is_ok());
    assert!(catalog
        .invoke("getSchemaField", json!({"urn": format!("{raw}#user_id")}))
        .is_ok());
}

#[test]
fn additional_rules_chain_from_the_same_payload() {
    let catalog = open_catalog();
    let job = catalog
        .schema()
        .entity_urn(
            "DataJob",
            json!({"orchestrator": "Airflow", "job": "load_orders"})
                .as_object()
                .unwrap(),
        )
        .unwrap();
    assert_eq!(job, "urn:li:dataJob:(airflow,default_dag,load_orders)");

    catalog
        .invoke(
            "upsertDataJobInputOutput",
            json!({
                "urn": job,
                "payload": {
                    "inputDatasets": ["urn:li:dataset:(mysql,shop.orders,PROD)"],
                    "outputDatasets": ["urn:li:dataset:(hive,dw.orders,PROD)", null]
                }
            }),
        )
        .unwrap();

    assert_eq!(
        edges_of(&catalog, &job, EdgeDirection::Outgoing),
        vec![
            (job.clone(), "CONSUMES".to_string(), ORDERS.to_string()),
            (
                job.clone(),
                "PRODUCES".to_string(),
                "urn:li:dataset:(hive,dw.orders,PROD)".to_string()
            ),
        ]
    );
}

#[test]
fn independent_ingestion_creates_the_entity() {
    let catalog = open_catalog();
    let out = catalog
        .invoke(
            "upsertCorpUserInfo",
            json!({
                "params": {"username": "bob@example.com", "email": "bob@example.com"},
                "payload": {"displayName": "Bob", "title": "Engineer"}
            }),
        )
        .unwrap();
    assert_eq!(out["urn"], "urn:li:corpuser:bob");
    assert_eq!(out["version"], 0);

    let bob = catalog
        .invoke("getCorpUser", json!({"urn": "urn:li:corpuser:bob"}))
        .unwrap();
    assert_eq!(bob["email"], "bob@example.com");

    let err = catalog
        .invoke(
            "upsertCorpUserInfo",
            json!({"params": {"email": "x@example.com"}, "payload": {}}),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("missing required parameter(s): username"), "{err}");
}

#[test]
fn secrets_are_masked_before_storage() {
    let catalog = open_catalog();
    catalog
        .invoke(
            "upsertDatasetProperties",
            json!({
                "urn": ORDERS,
                "payload": {
                    "description": "Orders",
                    "customProperties": {"owner_team": "sales", "db_password": "hunter2",
                                         "conn": {"api_token": "abc"}},
                    "internal": "dropped"
                }
            }),
        )
        .unwrap();
    let latest: Value = catalog
        .invoke("getDatasetProperties", json!({"urn": ORDERS}))
        .unwrap();
    let payload = &latest["payload"];
    assert_eq!(payload["customProperties"]["owner_team"], "sales");
    assert_eq!(payload["customProperties"]["db_password"], "********");
    assert_eq!(payload["customProperties"]["conn"]["api_token"], "********");
    assert!(payload.get("internal").is_none());
    assert!(payload["created"].as_i64().unwrap() > 0);
}

#[test]
fn deleting_an_entity_detaches_its_edges() {
    let catalog = open_catalog();
    catalog
        .invoke(
            "upsertOwnership",
            json!({"urn": ORDERS, "payload": {"owners": [{"owner": "carol"}]}}),
        )
        .unwrap();
    assert_eq!(
        edges_of(&catalog, "urn:li:corpuser:carol", EdgeDirection::Outgoing).len(),
        1
    );

    catalog
        .invoke("deleteDataset", json!({"urn": ORDERS}))
        .unwrap();
    assert!(edges_of(&catalog, "urn:li:corpuser:carol", EdgeDirection::Both).is_empty());
    assert_eq!(
        catalog
            .invoke("getOwnership", json!({"urn": ORDERS, "entity_type": "Dataset"}))
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
    // The owner itself survives.
    assert!(catalog
        .invoke("getCorpUser", json!({"urn": "urn:li:corpuser:carol"}))
        .is_ok());
}

#[test]
fn concurrent_writers_never_share_a_version() {
    let catalog = open_catalog();
    let writer = catalog.shared_writer();
    let threads = 8;
    let per_thread = 10;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                (0..per_thread)
                    .map(|i| {
                        writer
                            .upsert_versioned_aspect(
                                "Dataset",
                                ORDERS,
                                "ownership",
                                json!({"owners": [], "lastModified": t * 100 + i}),
                                None,
                            )
                            .unwrap()
                    })
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut versions = BTreeSet::new();
    for handle in handles {
        for v in handle.join().unwrap() {
            assert!(versions.insert(v), "version {v} written twice");
        }
    }
    let total = (threads * per_thread) as u64;
    assert_eq!(versions, (0..total).collect::<BTreeSet<_>>());

    let history = writer.aspect_history("Dataset", ORDERS, "ownership").unwrap();
    assert_eq!(history.len() as u64, total);
    let latest: Vec<_> = history.iter().filter(|v| v.latest).collect();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].version, total - 1);
}

#[test]
fn open_paths_wires_schema_and_store() {
    let db = NamedTempFile::new().unwrap();
    let catalog = Catalog::open_paths(fixture_path(), db.path()).unwrap();
    assert_eq!(catalog.schema().urn_prefix(), "urn:li");
    catalog
        .invoke("upsertDataset", json!({"urn": ORDERS, "properties": {"name": "shop.orders"}}))
        .unwrap();
    assert_eq!(
        catalog.invoke("getDataset", json!({"urn": ORDERS})).unwrap()["name"],
        "shop.orders"
    );

    let err = Catalog::open_paths("/nonexistent/catalog.yaml", db.path()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(err.to_string().contains("/nonexistent/catalog.yaml"), "{err}");
}

#[test]
fn file_backed_catalog_survives_reopen() {
    let db = NamedTempFile::new().unwrap();
    let config = CatalogConfig::new(fixture_path()).with_db_path(db.path());
    {
        let catalog = Catalog::open(config.clone()).unwrap();
        catalog
            .invoke(
                "upsertOwnership",
                json!({"urn": ORDERS, "payload": {"owners": [{"owner": "dana"}]}}),
            )
            .unwrap();
    }

    let catalog = Catalog::open(config).unwrap();
    let latest = catalog
        .invoke("getOwnership", json!({"urn": ORDERS}))
        .unwrap();
    assert_eq!(latest["version"], 0);
    assert_eq!(latest["payload"]["owners"][0]["owner"], "dana");
    assert_eq!(
        edges_of(&catalog, ORDERS, EdgeDirection::Incoming).len(),
        1
    );
}
