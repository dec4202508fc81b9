//! Integration tests for the portal-sqlite crate.

use portal_core::{
    Action, Filter, FilterOp, Order, QueryDescriptor, QueryError, SchemaRegistry, Values,
};
use portal_sqlite::{Migration, QueryExecutor};
use rusqlite::Connection;
use serde_json::{Value, json};
use std::io::Write;

/// Helper to set up a migrated in-memory database.
fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    let mut migration = Migration::new(conn, SchemaRegistry::portal()).unwrap();
    migration.up().unwrap();
    migration.into_connection()
}

fn run(conn: &Connection, desc: &QueryDescriptor) -> Result<Value, QueryError> {
    QueryExecutor::new(conn, SchemaRegistry::portal()).execute(desc)
}

fn values(value: Value) -> Option<Values> {
    Some(serde_json::from_value(value).unwrap())
}

fn insert(conn: &Connection, table: &str, rows: Value) -> Value {
    let mut desc = QueryDescriptor::new(table, Action::Insert);
    desc.values = values(rows);
    run(conn, &desc).unwrap()
}

/// Three residential and two enterprise plans, inserted out of order.
fn seed_plans(conn: &Connection) {
    insert(
        conn,
        "plans",
        json!([
            {"name": "Fibra 600", "slug": "fibra-600", "type": "residencial", "sort_order": 3, "price": 129.9},
            {"name": "Empresa 1G", "slug": "empresa-1g", "type": "empresarial", "sort_order": 1, "price": 499.0},
            {"name": "Fibra 100", "slug": "fibra-100", "type": "residencial", "sort_order": 1, "price": 69.9},
            {"name": "Empresa 500", "slug": "empresa-500", "type": "empresarial", "sort_order": 2, "price": 299.0},
            {"name": "Fibra 300", "slug": "fibra-300", "type": "residencial", "sort_order": 2, "price": 99.9}
        ]),
    );
}

fn names(data: &Value) -> Vec<&str> {
    data.as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect()
}

#[test]
fn test_select_residential_plans_sorted() {
    let conn = setup();
    seed_plans(&conn);

    let desc: QueryDescriptor = serde_json::from_value(json!({
        "table": "plans",
        "action": "select",
        "filters": [{"op": "eq", "column": "type", "value": "residencial"}],
        "order": [{"column": "sort_order", "ascending": true}]
    }))
    .unwrap();

    let data = run(&conn, &desc).unwrap();
    assert_eq!(names(&data), vec!["Fibra 100", "Fibra 300", "Fibra 600"]);
    assert!(data.as_array().unwrap().iter().all(|r| r["type"] == "residencial"));
}

#[test]
fn test_multi_key_order_breaks_ties() {
    let conn = setup();
    seed_plans(&conn);

    // sort_order has duplicates across types; price breaks the ties.
    let mut desc = QueryDescriptor::new("plans", Action::Select);
    desc.order = vec![Order::new("sort_order", true), Order::new("price", false)];
    let data = run(&conn, &desc).unwrap();
    assert_eq!(
        names(&data),
        vec![
            "Empresa 1G",
            "Fibra 100",
            "Empresa 500",
            "Fibra 300",
            "Fibra 600"
        ]
    );

    desc.order = vec![Order::new("sort_order", true), Order::new("price", true)];
    let data = run(&conn, &desc).unwrap();
    assert_eq!(
        names(&data),
        vec![
            "Fibra 100",
            "Empresa 1G",
            "Fibra 300",
            "Empresa 500",
            "Fibra 600"
        ]
    );
}

#[test]
fn test_projection_and_limit() {
    let conn = setup();
    seed_plans(&conn);

    let mut desc = QueryDescriptor::new("plans", Action::Select);
    desc.columns = Some(vec!["slug".into()]);
    desc.order = vec![Order::new("price", false)];
    desc.limit = Some(2);
    let data = run(&conn, &desc).unwrap();
    assert_eq!(data, json!([{"slug": "empresa-1g"}, {"slug": "empresa-500"}]));
}

#[test]
fn test_range_and_in_filters() {
    let conn = setup();
    seed_plans(&conn);

    let mut desc = QueryDescriptor::new("plans", Action::Select);
    desc.columns = Some(vec!["slug".into()]);
    desc.filters = vec![
        Filter::new(FilterOp::Gte, "price", 99.9),
        Filter::new(FilterOp::Lt, "price", 300),
        Filter::new(FilterOp::In, "type", json!(["residencial", "empresarial"])),
    ];
    desc.order = vec![Order::new("price", true)];
    let data = run(&conn, &desc).unwrap();
    assert_eq!(
        data,
        json!([{"slug": "fibra-300"}, {"slug": "fibra-600"}, {"slug": "empresa-500"}])
    );
}

#[test]
fn test_single_and_maybe_single_on_no_match() {
    let conn = setup();
    seed_plans(&conn);

    let mut desc = QueryDescriptor::new("plans", Action::Select);
    desc.filters = vec![Filter::new(FilterOp::Eq, "slug", "does-not-exist")];

    desc.single = true;
    let envelope = QueryExecutor::new(&conn, SchemaRegistry::portal()).envelope(&desc);
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({"data": null, "error": {"message": "No rows returned"}})
    );

    desc.single = false;
    desc.maybe_single = true;
    let envelope = QueryExecutor::new(&conn, SchemaRegistry::portal()).envelope(&desc);
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({"data": null, "error": null})
    );
}

#[test]
fn test_single_returns_object() {
    let conn = setup();
    seed_plans(&conn);

    let mut desc = QueryDescriptor::new("plans", Action::Select);
    desc.columns = Some(vec!["name".into()]);
    desc.filters = vec![Filter::new(FilterOp::Eq, "slug", "fibra-300")];
    desc.single = true;
    assert_eq!(run(&conn, &desc).unwrap(), json!({"name": "Fibra 300"}));
}

#[test]
fn test_unknown_fields_never_persist() {
    let conn = setup();
    let mut desc = QueryDescriptor::new("clients", Action::Insert);
    desc.values = values(json!({
        "full_name": "Ana Souza",
        "document_id": "123.456.789-00",
        "credit_limit": 99999,
        "role": "admin"
    }));
    let data = run(&conn, &desc).unwrap();
    let row = data[0].as_object().unwrap();
    assert!(!row.contains_key("credit_limit"));
    assert!(!row.contains_key("role"));
    assert_eq!(row["full_name"], "Ana Souza");

    let id = row["id"].as_i64().unwrap();
    let mut update = QueryDescriptor::new("clients", Action::Update);
    update.values = values(json!({"status": "suspended", "is_admin": true}));
    update.filters = vec![Filter::new(FilterOp::Eq, "id", id)];
    let data = run(&conn, &update).unwrap();
    assert_eq!(data[0]["status"], "suspended");
    assert!(data[0].get("is_admin").is_none());

    let mut upsert = QueryDescriptor::new("clients", Action::Upsert);
    upsert.values = values(json!({
        "id": id,
        "full_name": "Ana Souza",
        "phone": "+55 11 99999-0000",
        "balance": 10
    }));
    let data = run(&conn, &upsert).unwrap();
    assert_eq!(data[0]["phone"], "+55 11 99999-0000");
    assert!(data[0].get("balance").is_none());
}

#[test]
fn test_returning_projection_on_mutations() {
    let conn = setup();
    let mut desc = QueryDescriptor::new("blog_posts", Action::Insert);
    desc.values = values(json!({"slug": "wifi-6", "title": "Wi-Fi 6 explained"}));
    desc.returning = Some(vec!["id".into(), "slug".into(), "nonsense".into()]);
    let data = run(&conn, &desc).unwrap();
    let row = data[0].as_object().unwrap();
    assert_eq!(row.len(), 2);
    assert_eq!(row["slug"], "wifi-6");
}

#[test]
fn test_upsert_is_partial_overwrite() {
    let conn = setup();
    insert(
        &conn,
        "plans",
        json!({
            "name": "Fibra 300",
            "slug": "fibra-300",
            "price": 99.9,
            "speed_mbps": 300,
            "description": "Ideal for streaming",
            "is_featured": true,
            "sort_order": 2
        }),
    );

    // NOT NULL columns are checked before the conflict is resolved, so the
    // payload carries `name` unchanged.
    let mut desc = QueryDescriptor::new("plans", Action::Upsert);
    desc.on_conflict = Some("slug".into());
    desc.values = values(json!({
        "slug": "fibra-300",
        "name": "Fibra 300",
        "price": 89.9,
        "speed_mbps": 400
    }));
    desc.single = true;
    let row = run(&conn, &desc).unwrap();

    assert_eq!(row["price"], json!(89.9));
    assert_eq!(row["speed_mbps"], json!(400));
    assert_eq!(row["name"], "Fibra 300");
    assert_eq!(row["description"], "Ideal for streaming");
    assert_eq!(row["is_featured"], json!(true));
    assert_eq!(row["sort_order"], json!(2));

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM plans", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_upsert_inserts_when_no_conflict() {
    let conn = setup();
    let mut desc = QueryDescriptor::new("site_settings", Action::Upsert);
    desc.values = values(json!({"key": "hero", "value": {"title": "Internet de verdade"}}));
    let data = run(&conn, &desc).unwrap();
    assert_eq!(data[0]["value"], json!({"title": "Internet de verdade"}));

    desc.values = values(json!({"key": "hero", "value": {"title": "Fibra 1G"}}));
    let data = run(&conn, &desc).unwrap();
    assert_eq!(data[0]["value"], json!({"title": "Fibra 1G"}));

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM site_settings", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_upsert_with_composite_target_and_missing_target() {
    let conn = setup();

    let mut desc = QueryDescriptor::new("plan_features", Action::Upsert);
    desc.values = values(json!({"plan_id": 1, "feature": "Wi-Fi 6", "icon": "wifi"}));
    assert_eq!(
        run(&conn, &desc),
        Err(QueryError::MissingConflictTarget("plan_features".into()))
    );
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM plan_features", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);

    desc.on_conflict = Some("plan_id,feature".into());
    run(&conn, &desc).unwrap();
    desc.values = values(json!({"plan_id": 1, "feature": "Wi-Fi 6", "icon": "router"}));
    let data = run(&conn, &desc).unwrap();
    assert_eq!(data[0]["icon"], "router");
}

#[test]
fn test_unknown_conflict_target_leaves_rows_untouched() {
    let conn = setup();
    seed_plans(&conn);
    let target: i64 = conn
        .query_row("SELECT id FROM plans WHERE slug = 'fibra-600'", [], |r| r.get(0))
        .unwrap();

    let mut desc = QueryDescriptor::new("plans", Action::Upsert);
    desc.values = values(json!({"id": target, "name": "Overwritten", "slug": "brand-new"}));
    for on_conflict in ["slugg", "slug,ghost"] {
        desc.on_conflict = Some(on_conflict.into());
        assert_eq!(
            run(&conn, &desc),
            Err(QueryError::MissingConflictTarget("plans".into()))
        );
    }

    let (name, slug): (String, String) = conn
        .query_row("SELECT name, slug FROM plans WHERE id = ?1", [target], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!((name.as_str(), slug.as_str()), ("Fibra 600", "fibra-600"));
}

#[test]
fn test_update_without_filters_touches_every_row() {
    let conn = setup();
    seed_plans(&conn);

    let mut desc = QueryDescriptor::new("plans", Action::Update);
    desc.values = values(json!({"is_featured": true}));
    let data = run(&conn, &desc).unwrap();
    assert_eq!(data.as_array().unwrap().len(), 5);

    let featured: i64 = conn
        .query_row("SELECT COUNT(*) FROM plans WHERE is_featured = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(featured, 5);
}

#[test]
fn test_delete_without_filters_removes_every_row() {
    let conn = setup();
    seed_plans(&conn);

    let desc = QueryDescriptor::new("plans", Action::Delete);
    let data = run(&conn, &desc).unwrap();
    assert_eq!(data.as_array().unwrap().len(), 5);

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM plans", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_delete_with_filter_only_removes_matches() {
    let conn = setup();
    seed_plans(&conn);

    let mut desc = QueryDescriptor::new("plans", Action::Delete);
    desc.filters = vec![Filter::new(FilterOp::Eq, "type", "empresarial")];
    desc.returning = Some(vec!["slug".into()]);
    let data = run(&conn, &desc).unwrap();
    assert_eq!(data.as_array().unwrap().len(), 2);

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM plans", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn test_filter_on_unknown_column_is_dropped() {
    let conn = setup();
    seed_plans(&conn);

    let mut desc = QueryDescriptor::new("plans", Action::Select);
    desc.filters = vec![Filter::new(FilterOp::Eq, "tier", "gold")];
    let data = run(&conn, &desc).unwrap();
    assert_eq!(data.as_array().unwrap().len(), 5);
}

#[test]
fn test_boolean_filters() {
    let conn = setup();
    insert(
        &conn,
        "blog_posts",
        json!([
            {"slug": "a", "title": "A", "published": true},
            {"slug": "b", "title": "B", "published": false}
        ]),
    );
    let mut desc = QueryDescriptor::new("blog_posts", Action::Select);
    desc.columns = Some(vec!["slug".into(), "published".into()]);
    desc.filters = vec![Filter::new(FilterOp::Eq, "published", true)];
    assert_eq!(
        run(&conn, &desc).unwrap(),
        json!([{"slug": "a", "published": true}])
    );
}

#[test]
fn test_seed_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut plans = std::fs::File::create(dir.path().join("plans.json")).unwrap();
    write!(
        plans,
        r#"[{{"name": "Fibra 100", "slug": "fibra-100", "legacy_code": "X1"}},
            {{"name": "Fibra 300", "slug": "fibra-300"}}]"#
    )
    .unwrap();
    std::fs::write(
        dir.path().join("site_settings.json"),
        r#"{"key": "phone", "value": "0800 000 0000"}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("ghosts.json"), "[]").unwrap();
    std::fs::write(dir.path().join("README.md"), "not a seed").unwrap();

    let conn = Connection::open_in_memory().unwrap();
    let mut migration = Migration::new(conn, SchemaRegistry::portal()).unwrap();
    migration.up().unwrap();
    let report = migration.seed(dir.path()).unwrap();

    assert_eq!(report.rows_inserted.get("plans"), Some(&2));
    assert_eq!(report.rows_inserted.get("site_settings"), Some(&1));
    assert_eq!(report.total_rows(), 3);
    assert_eq!(report.skipped_files.len(), 1);

    let status = migration.status().unwrap();
    assert_eq!(status.row_count("plans"), 2);
    assert_eq!(status.row_count("site_settings"), 1);
}

#[test]
fn test_seed_failure_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("plans.json"),
        r#"[{"name": "A", "slug": "a"}]"#,
    )
    .unwrap();
    // Missing the required `title` column.
    std::fs::write(dir.path().join("blog_posts.json"), r#"[{"slug": "x"}]"#).unwrap();

    let conn = Connection::open_in_memory().unwrap();
    let mut migration = Migration::new(conn, SchemaRegistry::portal()).unwrap();
    migration.up().unwrap();
    assert!(migration.seed(dir.path()).is_err());
    assert_eq!(migration.status().unwrap().row_count("plans"), 0);
}

#[test]
fn test_refresh_resets_data() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("popups.json"),
        r#"[{"title": "Promo"}]"#,
    )
    .unwrap();

    let conn = Connection::open_in_memory().unwrap();
    let mut migration = Migration::new(conn, SchemaRegistry::portal()).unwrap();
    migration.up().unwrap();
    migration.seed(dir.path()).unwrap();
    migration.refresh(dir.path()).unwrap();
    assert_eq!(migration.status().unwrap().row_count("popups"), 1);
}
