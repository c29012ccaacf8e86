use provision_core::{
    Environment, NotificationTarget, OutputConfig, ProvisionConfig, ProvisionError, SentryConfig,
};
use provision_sentry::Provisioner;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> ProvisionConfig {
    ProvisionConfig {
        sentry: SentryConfig {
            auth_token: Some("test-token".into()),
            organization: Some("acme".into()),
            owner: Some("team:7".into()),
            base_url: format!("{}/api/0", server.uri()),
            ..SentryConfig::default()
        },
        notification: NotificationTarget::Slack {
            workspace: "4021".into(),
            channel: "#alerts".into(),
        },
        ..ProvisionConfig::default()
    }
}

fn project(slug: &str) -> Value {
    json!({"id": "1", "slug": slug, "name": slug, "platform": "php"})
}

fn key(slug: &str) -> Value {
    json!({
        "id": format!("{slug}-key"),
        "name": "Default",
        "isActive": true,
        "dsn": {
            "public": format!("https://{slug}@o1.ingest.sentry.io/1"),
            "secret": format!("https://{slug}:s@o1.ingest.sentry.io/1"),
            "csp": null
        }
    })
}

fn link(cursor: &str, results: bool) -> String {
    format!(
        r#"<https://sentry.io/api/0/projects/?&cursor={cursor}>; rel="next"; results="{results}"; cursor="{cursor}""#
    )
}

#[tokio::test]
async fn pagination_concatenates_pages_in_cursor_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .and(query_param("cursor", "0:200:0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([project("e")]))
                .insert_header("Link", link("0:300:0", false).as_str()),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .and(query_param("cursor", "0:100:0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([project("c"), project("d")]))
                .insert_header("Link", link("0:200:0", true).as_str()),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([project("a"), project("b")]))
                .insert_header("Link", link("0:100:0", true).as_str()),
        )
        .with_priority(5)
        .expect(1)
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    let slugs = provisioner.list_apps().await.unwrap();
    assert_eq!(slugs, vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn pagination_stops_on_cursor_cycle() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .and(query_param("cursor", "A"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([project("b")]))
                .insert_header("Link", link("B", true).as_str()),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .and(query_param("cursor", "B"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([project("c")]))
                .insert_header("Link", link("A", true).as_str()),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([project("a")]))
                .insert_header("Link", link("A", true).as_str()),
        )
        .with_priority(5)
        .expect(1)
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    let slugs = provisioner.list_apps().await.unwrap();
    assert_eq!(slugs, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn pagination_stops_when_cursor_points_to_itself() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .and(query_param("cursor", "A"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([project("b")]))
                .insert_header("Link", link("A", true).as_str()),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([project("a")]))
                .insert_header("Link", link("A", true).as_str()),
        )
        .with_priority(5)
        .expect(1)
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    assert_eq!(provisioner.list_apps().await.unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn requests_carry_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .and(header("Authorization", "Bearer test-token"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([project("only")])))
        .expect(1)
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    assert_eq!(provisioner.list_apps().await.unwrap(), vec!["only"]);
}

#[tokio::test]
async fn http_errors_propagate_with_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": "nope"})))
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    let err = provisioner.list_apps().await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert!(err.to_string().contains("nope"));
}

#[tokio::test]
async fn deleting_missing_rule_returns_false() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/0/projects/acme/shop-prod/rules/999/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/0/projects/acme/shop-prod/rules/5/"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    let client = provisioner.client();
    assert!(!client.delete_rule("shop-prod", "999").await.unwrap());
    assert!(client.delete_rule("shop-prod", "5").await.unwrap());
}

#[tokio::test]
async fn delete_rule_propagates_transport_errors() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ProvisionConfig {
        sentry: SentryConfig {
            auth_token: Some("test-token".into()),
            organization: Some("acme".into()),
            base_url: format!("http://127.0.0.1:{port}/api/0"),
            timeout_secs: 5,
            ..SentryConfig::default()
        },
        ..ProvisionConfig::default()
    };
    let provisioner = Provisioner::new(config).unwrap();

    let err = provisioner
        .client()
        .delete_rule("shop-prod", "5")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Request(_)));
}

#[tokio::test]
async fn fetch_rule_reads_single_rule() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/acme/shop-prod/rules/12/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "12",
            "name": "Sentry alert",
            "projects": ["shop-prod"],
            "actionMatch": "all",
            "frequency": 1440
        })))
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    let rule = provisioner
        .client()
        .fetch_rule("shop-prod", "12")
        .await
        .unwrap();
    assert_eq!(rule.projects, vec!["shop-prod"]);
    assert_eq!(rule.frequency, Some(1440));
}

#[tokio::test]
async fn create_rules_replaces_managed_rules() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/acme/shop-prod/rules/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "1", "name": "Sentry alert"},
            {"id": "2", "name": "Sentry alert"},
            {"id": "3", "name": "Hand made"}
        ])))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/0/projects/acme/shop-prod/rules/1/"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/0/projects/acme/shop-prod/rules/2/"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/0/projects/acme/shop-prod/rules/"))
        .and(body_partial_json(json!({
            "projects": ["shop-prod"],
            "owner": "team:7",
            "actionMatch": "all"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "40",
            "name": "Sentry alert",
            "projects": ["shop-prod"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    let report = provisioner.create_rules("shop-prod", true).await.unwrap();
    assert_eq!(report.created.id, "40");
    assert_eq!(report.deleted, vec!["1"]);
    assert_eq!(report.failed_deletes, vec!["2"]);
}

#[tokio::test]
async fn create_rules_without_replace_only_posts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/0/projects/acme/blog-prod/rules/"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": 8, "name": "Sentry alert"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    let report = provisioner.create_rules("blog-prod", false).await.unwrap();
    assert_eq!(report.created.id, "8");
    assert!(report.deleted.is_empty());
}

#[tokio::test]
async fn new_app_provisions_both_environments() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("sentry.tmpl");
    std::fs::write(&template, "test: '$TEST_DSN'\nlive: '${LIVE_DSN}'\n").unwrap();

    for env in ["test", "prod"] {
        let slug = format!("shop-{env}");
        Mock::given(method("POST"))
            .and(path("/api/0/teams/acme/acme/projects/"))
            .and(body_partial_json(json!({
                "name": &slug,
                "platform": "php",
                "default_rules": true
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(project(&slug)))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/api/0/projects/acme/shop-test/keys/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([key("shop-test")])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/acme/shop-prod/keys/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/0/projects/acme/shop-prod/keys/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(key("shop-prod")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/0/projects/acme/shop-prod/rules/"))
        .and(body_partial_json(json!({"projects": ["shop-prod"]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "99",
            "name": "Sentry alert",
            "projects": ["shop-prod"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.output = OutputConfig { template };
    let provisioner = Provisioner::new(config).unwrap();

    let app = provisioner.new_app("shop").await.unwrap();
    assert_eq!(app.projects.len(), 2);
    assert_eq!(app.projects[0].environment, Environment::Test);
    assert_eq!(app.projects[1].slug, "shop-prod");
    assert_eq!(app.rule.id, "99");

    assert!(app.bundle.is_complete());
    let vars = app.bundle.vars();
    assert_eq!(vars.len(), 2);
    assert_eq!(vars["TEST_DSN"], "https://shop-test@o1.ingest.sentry.io/1");
    assert_eq!(vars["LIVE_DSN"], "https://shop-prod@o1.ingest.sentry.io/1");

    let rendered = provisioner.render_bundle(&app.bundle).unwrap();
    assert_eq!(
        rendered,
        "test: 'https://shop-test@o1.ingest.sentry.io/1'\nlive: 'https://shop-prod@o1.ingest.sentry.io/1'\n"
    );
}

#[tokio::test]
async fn new_app_stops_on_project_creation_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/0/teams/acme/acme/projects/"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"detail": "already exists"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    let err = provisioner.new_app("shop").await.unwrap_err();
    assert!(matches!(err, ProvisionError::Http { status: 409, .. }));
}

#[tokio::test]
async fn collect_bundles_groups_by_base_name() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            project("shop-test"),
            project("shop-prod"),
            project("blog-prod"),
            project("internal-tools")
        ])))
        .mount(&server)
        .await;

    for slug in ["shop-test", "shop-prod", "blog-prod"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/0/projects/acme/{slug}/keys/")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([key(slug)])))
            .expect(1)
            .mount(&server)
            .await;
    }

    let provisioner = Provisioner::new(config(&server)).unwrap();
    let bundles = provisioner.collect_bundles().await.unwrap();

    assert_eq!(bundles.len(), 2);
    assert!(bundles["shop"].is_complete());
    assert!(!bundles["blog"].is_complete());
    assert_eq!(
        bundles["blog"].live_dsn.as_deref(),
        Some("https://blog-prod@o1.ingest.sentry.io/1")
    );
}

#[tokio::test]
async fn projects_of_other_organizations_are_skipped() {
    let server = MockServer::start().await;

    let in_org = |slug: &str, org: &str| {
        let mut project = project(slug);
        project["organization"] = json!({"id": "1", "slug": org, "name": org});
        project
    };

    Mock::given(method("GET"))
        .and(path("/api/0/projects/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            in_org("shop-test", "acme"),
            in_org("shop-prod", "acme"),
            in_org("blog-test", "other-org")
        ])))
        .mount(&server)
        .await;

    for slug in ["shop-test", "shop-prod"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/0/projects/acme/{slug}/keys/")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([key(slug)])))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/api/0/projects/acme/blog-test/keys/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found"})))
        .expect(0)
        .mount(&server)
        .await;

    let provisioner = Provisioner::new(config(&server)).unwrap();
    assert_eq!(
        provisioner.list_apps().await.unwrap(),
        vec!["shop-test", "shop-prod"]
    );

    let bundles = provisioner.collect_bundles().await.unwrap();
    assert_eq!(bundles.len(), 1);
    assert!(bundles["shop"].is_complete());
}

#[tokio::test]
async fn link_team_defaults_to_configured_team() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/0/projects/acme/shop-prod/teams/backend/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "1",
            "slug": "shop-prod",
            "name": "shop-prod",
            "teams": [{"slug": "backend", "name": "Backend"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.sentry.team = Some("backend".into());
    let provisioner = Provisioner::new(config).unwrap();

    let project = provisioner.link_team("shop-prod", None).await.unwrap();
    assert_eq!(project.teams[0].slug, "backend");
}
