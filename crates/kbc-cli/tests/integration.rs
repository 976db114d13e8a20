#![allow(deprecated)]
use assert_cmd::Command;
use mockito::Matcher;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

const ISOLATED_ENV: &[&str] = &[
    "KBC_REGION",
    "KBC_MANAGE_TOKEN",
    "KBC_STORAGE_TOKEN",
    "KBC_STACKID",
    "KBC_DESTINATION_TOKEN",
    "KBC_PORTAL_TOKEN",
    "KBC_PORTAL_EMAIL",
    "KBC_PORTAL_PASSWORD",
    "RUST_LOG",
];

fn kbc(config: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("kbc-admin").unwrap();
    for var in ISOLATED_ENV {
        cmd.env_remove(var);
    }
    cmd.env("KBC_ADMIN_CONFIG", config);
    cmd
}

fn write_config(dir: &TempDir, yaml: &str) -> PathBuf {
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

/// Config with one region, `mock`, whose services all live on `url`.
fn mock_config(dir: &TempDir, url: &str, extra: &str) -> PathBuf {
    write_config(
        dir,
        &format!(
            "default_region: mock\nregions:\n  - id: mock\n    suffix: localhost\n    endpoint: {url}\n{extra}"
        ),
    )
}

// ---------------------------------------------------------------------------
// regions / config
// ---------------------------------------------------------------------------

#[test]
fn regions_lists_builtin_stacks() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "{}\n");

    kbc(&config)
        .arg("regions")
        .assert()
        .success()
        .stdout(predicate::str::contains("eu-central-1"))
        .stdout(predicate::str::contains(
            "https://connection.north-europe.azure.keboola.com",
        ));
}

#[test]
fn regions_includes_current_stack() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "{}\n");

    kbc(&config)
        .env("KBC_STACKID", "connection.europe-west3.gcp.keboola.com")
        .args(["regions", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"CURRENT_STACK\""));
}

#[test]
fn set_token_is_persisted() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested").join("config.yaml");

    kbc(&config)
        .args(["config", "set-token", "EU", "--manage", "secret-token"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eu-central-1"));

    let saved = std::fs::read_to_string(&config).unwrap();
    assert!(saved.contains("eu-central-1: secret-token"));

    kbc(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("secr****"))
        .stdout(predicate::str::contains("secret-token").not());
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "default_region: mars\n");

    kbc(&config)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] default_region 'mars'"));
}

// ---------------------------------------------------------------------------
// region and credential checks
// ---------------------------------------------------------------------------

#[test]
fn unknown_region_fails_without_requests() {
    let mut server = mockito::Server::new();
    let any = server.mock("GET", Matcher::Any).expect(0).create();
    let dir = TempDir::new().unwrap();
    let config = mock_config(&dir, &server.url(), "manage_tokens:\n  mock: mt\n");

    kbc(&config)
        .args(["--region", "mars-1", "project", "show", "1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown region 'mars-1'"));
    any.assert();
}

#[test]
fn missing_manage_token_is_reported() {
    let server = mockito::Server::new();
    let dir = TempDir::new().unwrap();
    let config = mock_config(&dir, &server.url(), "");

    kbc(&config)
        .args(["project", "show", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("manage token"));
}

// ---------------------------------------------------------------------------
// management
// ---------------------------------------------------------------------------

#[test]
fn project_add_feature_uses_stored_token() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/manage/projects/42/features")
        .match_header("x-kbc-manageapitoken", "mt")
        .match_body(Matcher::Json(serde_json::json!({"feature": "queuev2"})))
        .with_status(201)
        .with_body(r#"{"id": 42, "features": ["queuev2"]}"#)
        .create();
    let dir = TempDir::new().unwrap();
    let config = mock_config(&dir, &server.url(), "manage_tokens:\n  mock: mt\n");

    kbc(&config)
        .args(["project", "add-feature", "42", "queuev2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Feature 'queuev2' added to project 42"));
    mock.assert();
}

#[test]
fn manage_token_flag_overrides_config() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/manage/projects/7")
        .match_header("x-kbc-manageapitoken", "from-flag")
        .with_status(200)
        .with_body(r#"{"id": 7, "name": "Sandbox"}"#)
        .create();
    let dir = TempDir::new().unwrap();
    let config = mock_config(&dir, &server.url(), "manage_tokens:\n  mock: stored\n");

    kbc(&config)
        .args(["--manage-token", "from-flag", "project", "show", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sandbox"));
    mock.assert();
}

#[test]
fn grant_reports_each_user_and_fails_on_any_error() {
    let mut server = mockito::Server::new();
    for email in ["a@x.io", "b@x.io"] {
        server
            .mock("GET", format!("/manage/users/{email}").as_str())
            .with_status(200)
            .with_body(format!(r#"{{"id": 1, "email": "{email}"}}"#))
            .create();
    }
    server
        .mock("POST", "/manage/users/a@x.io/features")
        .with_status(201)
        .with_body(r#"{"features": ["beta"]}"#)
        .create();
    server
        .mock("POST", "/manage/users/b@x.io/features")
        .with_status(400)
        .with_body(r#"{"error": "feature not assignable"}"#)
        .create();
    let dir = TempDir::new().unwrap();
    let config = mock_config(&dir, &server.url(), "manage_tokens:\n  mock: mt\n");

    kbc(&config)
        .args([
            "--json", "user", "grant", "beta", "--user", "a@x.io", "--user", "b@x.io",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": \"success\""))
        .stdout(predicate::str::contains("feature not assignable"))
        .stderr(predicate::str::contains("failed for: b@x.io"));
}

#[test]
fn deleted_list_renders_table() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/manage/deleted-projects")
        .match_query(Matcher::UrlEncoded("limit".into(), "1000".into()))
        .with_status(200)
        .with_body(r#"[{"id": 5, "name": "Old", "organization": {"id": 1, "name": "Acme"}}]"#)
        .create();
    let dir = TempDir::new().unwrap();
    let config = mock_config(&dir, &server.url(), "manage_tokens:\n  mock: mt\n");

    kbc(&config)
        .args(["deleted", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ID  NAME  ORGANIZATION"))
        .stdout(predicate::str::contains("Acme"));
}

// ---------------------------------------------------------------------------
// oauth fan-out
// ---------------------------------------------------------------------------

#[test]
fn oauth_list_runs_on_every_configured_stack() {
    let mut server = mockito::Server::new();
    let list = server
        .mock("GET", "/manage")
        .with_status(200)
        .with_body(r#"[{"id": "keboola.ex-gmail", "friendly_name": "Gmail", "app_key": "k"}]"#)
        .expect(2)
        .create();
    let dir = TempDir::new().unwrap();
    let url = server.url();
    let config = write_config(
        &dir,
        &format!(
            "regions:\n  - id: one\n    suffix: localhost\n    endpoint: {url}\n  - id: two\n    suffix: localhost\n    endpoint: {url}\nmanage_tokens:\n  one: a\n  two: b\n"
        ),
    );

    kbc(&config)
        .args(["--json", "oauth", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"one\""))
        .stdout(predicate::str::contains("\"two\""))
        .stdout(predicate::str::contains("\"component_id\": \"keboola.ex-gmail\""))
        .stdout(predicate::str::contains("app_key").not());
    list.assert();
}

#[test]
fn oauth_patch_without_secret_is_rejected_locally() {
    let mut server = mockito::Server::new();
    let any = server.mock("PATCH", Matcher::Any).expect(0).create();
    let dir = TempDir::new().unwrap();
    let config = mock_config(&dir, &server.url(), "manage_tokens:\n  mock: mt\n");

    kbc(&config)
        .args([
            "oauth",
            "patch",
            "keboola.ex-gmail",
            "--payload",
            r#"{"app_key": "new"}"#,
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("app_secret"));
    any.assert();
}

// ---------------------------------------------------------------------------
// migrate
// ---------------------------------------------------------------------------

/// Config with a `src` and a `dst` region on separate servers.
fn two_project_config(dir: &TempDir, src: &str, dst: &str, tokens: &str) -> PathBuf {
    write_config(
        dir,
        &format!(
            "default_region: src\nregions:\n  - id: src\n    suffix: src.localhost\n    endpoint: {src}\n  - id: dst\n    suffix: dst.localhost\n    endpoint: {dst}\n{tokens}"
        ),
    )
}

#[test]
fn migrate_bucket_copies_only_missing_tables() {
    let mut src = mockito::Server::new();
    let mut dst = mockito::Server::new();
    let src_url = src.url();

    src.mock("GET", "/v2/storage/buckets/in.c-main/tables")
        .match_header("x-storageapi-token", "source-token")
        .with_status(200)
        .with_body(
            r#"[{"id": "in.c-main.a", "name": "a", "primaryKey": ["id"]},
                {"id": "in.c-main.b", "name": "b", "primaryKey": ["region", "id"]}]"#,
        )
        .create();
    let skipped_export = src
        .mock("POST", "/v2/storage/tables/in.c-main.a/export-async")
        .expect(0)
        .create();
    src.mock("POST", "/v2/storage/tables/in.c-main.b/export-async")
        .with_status(202)
        .with_body(format!(r#"{{"status": "waiting", "url": "{src_url}/v2/storage/jobs/8"}}"#))
        .create();
    src.mock("GET", "/v2/storage/jobs/8")
        .with_status(200)
        .with_body(r#"{"status": "success", "results": {"file": {"id": 600}}}"#)
        .create();
    src.mock("GET", "/v2/storage/files/600")
        .with_status(200)
        .with_body(format!(r#"{{"id": 600, "isSliced": false, "url": "{src_url}/signed/600.csv"}}"#))
        .create();
    src.mock("GET", "/signed/600.csv")
        .with_status(200)
        .with_body("\"region\",\"id\"\n\"eu\",\"1\"\n")
        .create();

    dst.mock("GET", "/v2/storage/buckets")
        .match_header("x-storageapi-token", "destination-token")
        .with_status(200)
        .with_body(r#"[{"id": "in.c-main", "name": "c-main", "stage": "in"}]"#)
        .create();
    dst.mock("GET", "/v2/storage/buckets/in.c-main/tables")
        .with_status(200)
        .with_body(r#"[{"id": "in.c-main.a", "name": "a"}]"#)
        .create();
    let bucket_created = dst
        .mock("POST", "/v2/storage/buckets")
        .expect(0)
        .create();
    let import = dst
        .mock("POST", "/v2/storage/buckets/in.c-main/tables")
        .match_header("x-storageapi-token", "destination-token")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="name"\r\n\r\nb\r\n"#.into()),
            Matcher::Regex(r#"name="primaryKey"\r\n\r\nregion,id\r\n"#.into()),
            Matcher::Regex(r#""eu","1""#.into()),
        ]))
        .with_status(201)
        .with_body(r#"{"id": "in.c-main.b", "name": "b"}"#)
        .create();

    let dir = TempDir::new().unwrap();
    let config = two_project_config(
        &dir,
        &src_url,
        &dst.url(),
        "storage_tokens:\n  src: source-token\n  dst: destination-token\n",
    );

    kbc(&config)
        .args(["migrate", "bucket", "in.c-main", "--to-region", "dst"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Transferred 1 table(s), skipped 1 already present."))
        .stdout(predicate::str::contains("+ in.c-main.b"));
    import.assert();
    skipped_export.assert();
    bucket_created.assert();
}

#[test]
fn migrate_without_destination_token_fails_before_requests() {
    let mut src = mockito::Server::new();
    let mut dst = mockito::Server::new();
    let src_any = src.mock("GET", Matcher::Any).expect(0).create();
    let dst_any = dst.mock("GET", Matcher::Any).expect(0).create();
    let dir = TempDir::new().unwrap();
    let config = two_project_config(
        &dir,
        &src.url(),
        &dst.url(),
        "storage_tokens:\n  src: source-token\n",
    );

    kbc(&config)
        .args(["migrate", "bucket", "in.c-main", "--to-region", "dst"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--to-token"));
    src_any.assert();
    dst_any.assert();
}

#[test]
fn migrate_config_keeps_source_id_when_asked() {
    let mut src = mockito::Server::new();
    let mut dst = mockito::Server::new();
    src.mock("GET", "/v2/storage/components/keboola.ex-db-pgsql/configs/42")
        .with_status(200)
        .with_body(r#"{"id": "42", "name": "Main", "configuration": {"db": "x"}, "state": {}}"#)
        .create();
    src.mock("GET", "/v2/storage/components/keboola.ex-db-pgsql/configs/42/rows")
        .with_status(200)
        .with_body(r#"[{"id": "7", "name": "orders", "configuration": {"rowId": "7", "table": "orders"}}]"#)
        .create();
    let created = dst
        .mock("POST", "/v2/storage/components/keboola.ex-db-pgsql/configs")
        .match_header("x-storageapi-token", "destination-token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("configurationId".into(), "42".into()),
            Matcher::UrlEncoded("name".into(), "Main".into()),
        ]))
        .with_status(201)
        .with_body(r#"{"id": "42", "name": "Main"}"#)
        .create();
    let row = dst
        .mock("POST", "/v2/storage/components/keboola.ex-db-pgsql/configs/42/rows")
        .match_body(Matcher::UrlEncoded(
            "configuration".into(),
            r#"{"table":"orders"}"#.into(),
        ))
        .with_status(201)
        .with_body(r#"{"id": "900", "name": "orders"}"#)
        .create();
    let dir = TempDir::new().unwrap();
    let config = two_project_config(&dir, &src.url(), &dst.url(), "storage_tokens:\n  src: source-token\n");

    kbc(&config)
        .args([
            "migrate",
            "config",
            "keboola.ex-db-pgsql",
            "42",
            "--keep-id",
            "--to-region",
            "dst",
            "--to-token",
            "destination-token",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("as 42."));
    created.assert();
    row.assert();
}

// ---------------------------------------------------------------------------
// encryption / monitoring
// ---------------------------------------------------------------------------

#[test]
fn encrypt_prints_ciphertext() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/encrypt")
        .match_query(Matcher::UrlEncoded("componentId".into(), "keboola.app".into()))
        .match_body("hunter2")
        .with_status(200)
        .with_body("KBC::ComponentSecure::xyz")
        .create();
    let dir = TempDir::new().unwrap();
    let config = mock_config(&dir, &server.url(), "");

    kbc(&config)
        .args(["encrypt", "hunter2", "--component", "keboola.app"])
        .assert()
        .success()
        .stdout("KBC::ComponentSecure::xyz\n");
}

#[test]
fn monitor_builds_links_offline() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "{}\n");

    kbc(&config)
        .args([
            "monitor",
            "kds-team.ex-hubspot",
            "--job",
            "123",
            "--from",
            "2024-05-01T10:00:00Z",
            "--to",
            "2024-05-01T11:00:00Z",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("tpl_var_pod_name[0]=job-123"))
        .stdout(predicate::str::contains("container_name:123-123--0-kds-team-ex-hubspot"));
}
