//! 站点内容 API 集成测试

use axum::http::StatusCode;
use serde_json::json;
use union_portal::models::{audit::AuditAction, principal::Role};

mod common;
use common::{json_request, TestApp};

#[tokio::test]
async fn test_content_lifecycle() {
    let app = TestApp::new();
    let moderator = app.seed("mod@union.org", Role::Moderator).await;
    let token = app.access_token("mod@union.org").await;

    let created = app
        .send(json_request(
            "POST",
            "/api/v1/content/leaders",
            Some(&token),
            Some(json!({
                "title": "Jane Doe",
                "body": "Chairs the union since 2019.",
                "attributes": { "position": "Chairperson", "photo": "https://img.example/jane.jpg" },
                "displayOrder": 1
            })),
        ))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["kind"], "leader");
    assert_eq!(created.body["isActive"], true);
    let id = created.body["id"].as_str().unwrap().to_string();

    let record = &app.audit_records_for(AuditAction::Create).await[0];
    assert_eq!(record.resource, "leaders");
    assert_eq!(record.actor_id, Some(moderator.id));
    assert_eq!(record.resource_id.as_deref(), Some(id.as_str()));

    // 属性浅合并
    let updated = app
        .send(json_request(
            "PUT",
            &format!("/api/v1/content/leaders/{}", id),
            Some(&token),
            Some(json!({ "attributes": { "position": "Secretary" }, "isActive": false })),
        ))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["attributes"]["position"], "Secretary");
    assert_eq!(updated.body["attributes"]["photo"], "https://img.example/jane.jpg");

    let update_record = &app.audit_records_for(AuditAction::Update).await[0];
    let changes = update_record.changes.as_ref().unwrap();
    assert_eq!(changes.before["attributes"]["position"], "Chairperson");
    assert_eq!(changes.after["isActive"], false);

    // 停用后公开接口不可见，管理端仍可见
    let public = app.send(json_request("GET", "/api/v1/content/leaders", None, None)).await;
    assert_eq!(public.status, StatusCode::OK);
    assert_eq!(public.body["count"], 0);

    let hidden = app
        .send(json_request("GET", &format!("/api/v1/content/leaders/{}", id), None, None))
        .await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);

    let admin_list = app
        .send(json_request("GET", "/api/v1/admin/content/leaders", Some(&token), None))
        .await;
    assert_eq!(admin_list.status, StatusCode::OK);
    assert_eq!(admin_list.body["count"], 1);

    // 删除需要 admin
    let denied = app
        .send(json_request("DELETE", &format!("/api/v1/content/leaders/{}", id), Some(&token), None))
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(app.audit_records_for(AuditAction::UnauthorizedAccess).await.len(), 1);

    app.seed("admin@union.org", Role::Admin).await;
    let admin_token = app.access_token("admin@union.org").await;
    let deleted = app
        .send(json_request(
            "DELETE",
            &format!("/api/v1/content/leaders/{}", id),
            Some(&admin_token),
            None,
        ))
        .await;
    assert_eq!(deleted.status, StatusCode::OK);

    let gone = app
        .send(json_request(
            "DELETE",
            &format!("/api/v1/content/leaders/{}", id),
            Some(&admin_token),
            None,
        ))
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);

    let deletes = app.audit_records_for(AuditAction::Delete).await;
    assert_eq!(deletes.len(), 2);
    assert_eq!(deletes.iter().filter(|r| r.success).count(), 1);
}

#[tokio::test]
async fn test_public_listing_order() {
    let app = TestApp::new();
    app.seed("mod@union.org", Role::Moderator).await;
    let token = app.access_token("mod@union.org").await;

    for (title, order) in [("Second", 2), ("First", 1), ("Third", 3)] {
        let response = app
            .send(json_request(
                "POST",
                "/api/v1/content/services",
                Some(&token),
                Some(json!({ "title": title, "displayOrder": order })),
            ))
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let listed = app.send(json_request("GET", "/api/v1/content/services", None, None)).await;
    let titles: Vec<&str> = listed.body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["First", "Second", "Third"]);
}

#[tokio::test]
async fn test_kind_specific_attributes() {
    let app = TestApp::new();
    app.seed("mod@union.org", Role::Moderator).await;
    let token = app.access_token("mod@union.org").await;

    let missing_position = app
        .send(json_request(
            "POST",
            "/api/v1/content/leaders",
            Some(&token),
            Some(json!({ "title": "No Position" })),
        ))
        .await;
    assert_eq!(missing_position.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing_position.body["error"]["fields"][0]["field"], "attributes.position");

    let bad_date = app
        .send(json_request(
            "POST",
            "/api/v1/content/achievements",
            Some(&token),
            Some(json!({ "title": "Award", "attributes": { "date": "last spring" } })),
        ))
        .await;
    assert_eq!(bad_date.status, StatusCode::BAD_REQUEST);

    let update = app
        .send(json_request(
            "POST",
            "/api/v1/content/updates",
            Some(&token),
            Some(json!({ "title": "Annual meeting" })),
        ))
        .await;
    assert_eq!(update.status, StatusCode::CREATED);
    assert_eq!(update.body["attributes"]["type"], "news");

    let bad_type = app
        .send(json_request(
            "POST",
            "/api/v1/content/updates",
            Some(&token),
            Some(json!({ "title": "Gossip", "attributes": { "type": "rumour" } })),
        ))
        .await;
    assert_eq!(bad_type.status, StatusCode::BAD_REQUEST);

    // 校验失败不写审计记录
    assert_eq!(app.audit_records_for(AuditAction::Create).await.len(), 1);
}

#[tokio::test]
async fn test_unknown_kind_and_anonymous_writes() {
    let app = TestApp::new();

    let unknown = app.send(json_request("GET", "/api/v1/content/recipes", None, None)).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let anonymous = app
        .send(json_request(
            "POST",
            "/api/v1/content/sections",
            None,
            Some(json!({ "title": "Hero", "attributes": { "key": "hero" } })),
        ))
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let records = app.audit_records_for(AuditAction::Create).await;
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].resource, "sections");
    assert_eq!(records[0].details["body"]["title"], "Hero");
}

#[tokio::test]
async fn test_section_key_must_be_unique() {
    let app = TestApp::new();
    app.seed("admin@union.org", Role::Admin).await;
    let token = app.access_token("admin@union.org").await;

    let hero = app
        .send(json_request(
            "POST",
            "/api/v1/content/sections",
            Some(&token),
            Some(json!({ "title": "Hero", "attributes": { "key": "hero" } })),
        ))
        .await;
    assert_eq!(hero.status, StatusCode::CREATED);

    let duplicate = app
        .send(json_request(
            "POST",
            "/api/v1/content/sections",
            Some(&token),
            Some(json!({ "title": "Another hero", "attributes": { "key": " hero " } })),
        ))
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.body["error"]["message"], "Section key already exists");

    let footer = app
        .send(json_request(
            "POST",
            "/api/v1/content/sections",
            Some(&token),
            Some(json!({ "title": "Footer", "attributes": { "key": "footer" } })),
        ))
        .await;
    let footer_id = footer.body["id"].as_str().unwrap().to_string();

    let renamed = app
        .send(json_request(
            "PUT",
            &format!("/api/v1/content/sections/{}", footer_id),
            Some(&token),
            Some(json!({ "attributes": { "key": "hero" } })),
        ))
        .await;
    assert_eq!(renamed.status, StatusCode::CONFLICT);

    // 冲突是一次失败的变更，照常记录
    let failed: Vec<_> = app
        .audit_records_for(AuditAction::Create)
        .await
        .into_iter()
        .filter(|r| !r.success)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_message.as_deref(), Some("Section key already exists"));

    let listed = app
        .send(json_request("GET", "/api/v1/content/sections", None, None))
        .await;
    assert_eq!(listed.body["items"].as_array().unwrap().len(), 2);
}
