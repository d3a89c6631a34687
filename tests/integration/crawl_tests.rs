//! Integration tests for archive runs
//!
//! These tests use wiremock to serve a small portal (catalog, semester
//! listings, course enrolment pages and user profiles with a Course ↔ User
//! cycle) and drive complete runs against a temporary output directory.

use lms_archive::config::{parse_config, Config};
use lms_archive::crawler::Coordinator;
use lms_archive::output::{MetadataSink, SqliteIndex};
use lms_archive::state::EntityKind;
use lms_archive::storage::{ArtifactStore, FsArtifactStore};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CATALOG: &str = r#"<html><body>
<select class="select custom-select urlselect" name="jump">
    <option value="">Course categories</option>
    <option value="/course/index.php?categoryid=1">Học kỳ (Semester) 2/2025-2026 / Khoa Khoa học và Kỹ thuật Máy tính / Khoa Học Máy Tính</option>
    <option value="/course/index.php?categoryid=2">Học kỳ (Semester) 2/2025-2026 / Khoa Khoa học và Kỹ thuật Máy tính / Kỹ Thuật Máy Tính</option>
    <option value="/course/index.php?categoryid=3">Miscellaneous / Archive</option>
</select>
</body></html>"#;

fn semester_page(course_ids: &[&str]) -> String {
    let links: String = course_ids
        .iter()
        .map(|id| format!(r#"<h3><a class="aalink" href="/course/view.php?id={}">Course {}</a></h3>"#, id, id))
        .collect();
    format!("<html><body><div class=\"courses\">{}</div></body></html>", links)
}

fn course_page(name: &str, teacher_ids: Option<&[&str]>) -> String {
    let teachers = match teacher_ids {
        Some(ids) => {
            let items: String = ids
                .iter()
                .map(|id| {
                    format!(
                        r#"<li>Teacher: <a href="/user/profile.php?id={}&amp;course=1">Teacher {}</a></li>"#,
                        id, id
                    )
                })
                .collect();
            format!(r#"<ul class="teachers">{}</ul>"#, items)
        }
        None => String::new(),
    };
    format!(
        r#"<html><body><h3 class="coursename">{}</h3>{}</body></html>"#,
        name, teachers
    )
}

fn profile_page(name: &str, course_ids: &[&str]) -> String {
    let courses: String = course_ids
        .iter()
        .map(|id| format!(r#"<li><a href="/user/view.php?id=1&amp;course={}">Course {}</a></li>"#, id, id))
        .collect();
    format!(
        r#"<html><body>
        <div class="page-header-headings"><h1>{}</h1></div>
        <div class="userprofile"><div class="description">Giảng viên</div></div>
        <div class="profile_tree">
            <section><dl><dt>Email address</dt><dd>{}@example.edu</dd><dt>Country</dt><dd>Vietnam</dd></dl></section>
            <section><ul>{}</ul></section>
        </div></body></html>"#,
        name, name, courses
    )
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body.into())
        .insert_header("content-type", "text/html; charset=utf-8")
}

async fn mount_page(server: &MockServer, page_path: &str, param: Option<(&str, &str)>, body: String) {
    let mut mock = Mock::given(method("GET")).and(path(page_path));
    if let Some((name, value)) = param {
        mock = mock.and(query_param(name, value));
    }
    mock.respond_with(html(body)).mount(server).await;
}

/// Mounts the reference portal
///
/// Reachable graph: semesters {1, 2}; courses {10, 11, 12, 13}; users
/// {501, 502}. Course 11 is listed by both semesters, course 12 has no
/// teacher list, and course 13 is reachable only from user 501's profile.
async fn mount_portal(server: &MockServer) {
    mount_page(server, "/course/", None, CATALOG.to_string()).await;

    mount_page(server, "/course/index.php", Some(("categoryid", "1")), semester_page(&["10", "11"])).await;
    mount_page(server, "/course/index.php", Some(("categoryid", "2")), semester_page(&["11", "12"])).await;

    mount_page(server, "/enrol/index.php", Some(("id", "10")), course_page("Hệ điều hành", Some(&["501"]))).await;
    mount_page(server, "/enrol/index.php", Some(("id", "11")), course_page("Mạng máy tính", Some(&["501", "502"]))).await;
    mount_page(server, "/enrol/index.php", Some(("id", "12")), course_page("Đồ án", None)).await;
    mount_page(server, "/enrol/index.php", Some(("id", "13")), course_page("Seminar", Some(&["501"]))).await;

    mount_page(server, "/user/profile.php", Some(("id", "501")), profile_page("Nguyen A", &["10", "11", "13"])).await;
    mount_page(server, "/user/profile.php", Some(("id", "502")), profile_page("Tran B", &["11"])).await;
}

fn test_config(base_url: &str, output: &Path, workers: u32, extra: &str) -> Config {
    parse_config(&format!(
        r#"
[portal]
root-url = "{}/course/"
credential = "MoodleSession=test"

[crawler]
workers = {}
max-attempts = 3
backoff-base-ms = 10
backoff-max-ms = 50
request-timeout-secs = 5

[output]
directory = "{}"
{}
"#,
        base_url,
        workers,
        output.display(),
        extra
    ))
    .expect("test config should be valid")
}

/// Lists every artifact as `namespace/id`
fn archived(output: &Path) -> BTreeSet<String> {
    let store = FsArtifactStore::open(output).unwrap();
    let mut keys = BTreeSet::new();
    for kind in EntityKind::all() {
        for id in store.list(kind).unwrap() {
            keys.insert(format!("{}/{}", kind.namespace(), id));
        }
    }
    keys
}

fn expected_archive() -> BTreeSet<String> {
    [
        "semesters/1",
        "semesters/2",
        "courses/10",
        "courses/11",
        "courses/12",
        "courses/13",
        "users/501",
        "users/502",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[tokio::test]
async fn test_full_run_archives_reachable_graph() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let output = TempDir::new().unwrap();

    let config = test_config(&server.uri(), output.path(), 1, "");
    let summary = lms_archive::run(config).await.expect("run should succeed");

    assert_eq!(archived(output.path()), expected_archive());
    assert_eq!(summary.artifacts_written, 8);
    assert_eq!(summary.artifacts_reused, 0);
    // catalog + 2 semesters + 4 courses + 2 users
    assert_eq!(summary.tasks_completed, 9);
    assert_eq!(summary.tasks_enqueued, 9);
    assert_eq!(summary.tasks_failed, 0);
    assert!((summary.success_rate() - 100.0).abs() < 0.01);
}

#[tokio::test]
async fn test_artifacts_hold_raw_bytes() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let output = TempDir::new().unwrap();

    let config = test_config(&server.uri(), output.path(), 2, "");
    lms_archive::run(config).await.unwrap();

    let stored = std::fs::read_to_string(output.path().join("courses").join("12.html")).unwrap();
    assert_eq!(stored, course_page("Đồ án", None));

    let namespace_files: Vec<_> = std::fs::read_dir(output.path().join("users"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(namespace_files.len(), 2, "no temporary files left behind");
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let output = TempDir::new().unwrap();

    let first = lms_archive::run(test_config(&server.uri(), output.path(), 3, ""))
        .await
        .unwrap();
    let files_after_first = archived(output.path());
    let requests_after_first = server.received_requests().await.unwrap().len();

    let second = lms_archive::run(test_config(&server.uri(), output.path(), 3, ""))
        .await
        .unwrap();

    assert_eq!(first.artifacts_written, 8);
    assert_eq!(second.artifacts_written, 0);
    // Course 13 is only linked from a profile, which skips archived courses
    assert_eq!(second.artifacts_reused, 7);
    assert_eq!(second.tasks_failed, 0);
    assert_eq!(archived(output.path()), files_after_first);

    // Only the catalog page, which is never archived, is fetched again
    let requests_after_second = server.received_requests().await.unwrap().len();
    assert_eq!(requests_after_second - requests_after_first, 1);
}

#[tokio::test]
async fn test_shared_course_fetched_once_with_many_workers() {
    let server = MockServer::start().await;

    // Mounted ahead of the portal so it takes precedence for course 11
    Mock::given(method("GET"))
        .and(path("/enrol/index.php"))
        .and(query_param("id", "11"))
        .respond_with(html(course_page("Mạng máy tính", Some(&["501", "502"]))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/profile.php"))
        .and(query_param("id", "501"))
        .respond_with(html(profile_page("Nguyen A", &["10", "11", "13"])))
        .expect(1)
        .mount(&server)
        .await;
    mount_portal(&server).await;

    let output = TempDir::new().unwrap();
    let summary = lms_archive::run(test_config(&server.uri(), output.path(), 8, ""))
        .await
        .unwrap();

    assert_eq!(archived(output.path()), expected_archive());
    assert_eq!(summary.artifacts_written, 8);
    server.verify().await;
}

#[tokio::test]
async fn test_existing_course_not_requeued_from_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/enrol/index.php"))
        .and(query_param("id", "13"))
        .respond_with(html(course_page("Seminar", Some(&["501"]))))
        .expect(0)
        .mount(&server)
        .await;
    mount_portal(&server).await;

    let output = TempDir::new().unwrap();
    let store = FsArtifactStore::open(output.path()).unwrap();
    store
        .save(EntityKind::Course, "13", b"<html>archived earlier</html>")
        .unwrap();

    let summary = lms_archive::run(test_config(&server.uri(), output.path(), 2, ""))
        .await
        .unwrap();

    // Course 13 is only reachable through the profile, which skips it
    assert_eq!(summary.artifacts_written, 7);
    assert_eq!(summary.artifacts_reused, 0);
    let stored = std::fs::read(output.path().join("courses").join("13.html")).unwrap();
    assert_eq!(stored, b"<html>archived earlier</html>");
    server.verify().await;
}

#[tokio::test]
async fn test_failures_are_counted_not_fatal() {
    let server = MockServer::start().await;

    // Course 10 is gone; course 12 bounces to the login page
    Mock::given(method("GET"))
        .and(path("/enrol/index.php"))
        .and(query_param("id", "10"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/enrol/index.php"))
        .and(query_param("id", "12"))
        .respond_with(ResponseTemplate::new(303).insert_header("location", "/login/index.php"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/login/index.php",
        None,
        "<html><body><form id=\"login\"></form></body></html>".to_string(),
    )
    .await;
    mount_portal(&server).await;

    let output = TempDir::new().unwrap();
    let summary = lms_archive::run(test_config(&server.uri(), output.path(), 4, ""))
        .await
        .unwrap();

    assert_eq!(summary.tasks_failed, 2);
    let files = archived(output.path());
    assert!(!files.contains("courses/12"));
    // Course 10 is still listed by user 501's profile, but already visited
    assert!(!files.contains("courses/10"));
    assert!(files.contains("courses/11"));
    assert!(files.contains("users/502"));
    server.verify().await;
}

#[tokio::test]
async fn test_transient_catalog_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/course/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_portal(&server).await;

    let output = TempDir::new().unwrap();
    let summary = lms_archive::run(test_config(&server.uri(), output.path(), 2, ""))
        .await
        .unwrap();

    assert_eq!(summary.tasks_failed, 0);
    assert_eq!(archived(output.path()), expected_archive());
}

#[tokio::test]
async fn test_label_filtering_skips_two_part_categories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/course/index.php"))
        .and(query_param("categoryid", "3"))
        .respond_with(html(semester_page(&["99"])))
        .expect(0)
        .mount(&server)
        .await;
    mount_portal(&server).await;

    let output = TempDir::new().unwrap();
    lms_archive::run(test_config(&server.uri(), output.path(), 2, ""))
        .await
        .unwrap();

    assert!(!archived(output.path()).contains("semesters/3"));
    server.verify().await;
}

#[tokio::test]
async fn test_user_sweep_seeds_without_catalog() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    Mock::given(method("GET"))
        .and(path("/user/profile.php"))
        .and(query_param("id", "503"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let output = TempDir::new().unwrap();
    let config = test_config(
        &server.uri(),
        output.path(),
        2,
        "\n[seeds]\ncatalog = false\nuser-id-min = 501\nuser-id-max = 503\n",
    );
    let summary = lms_archive::run(config).await.unwrap();

    let files = archived(output.path());
    assert!(!files.iter().any(|f| f.starts_with("semesters/")));
    // 501 leads to courses 10, 11, 13; 11 leads to 502; 12 is unreachable
    assert!(files.contains("courses/13"));
    assert!(files.contains("users/502"));
    assert!(!files.contains("courses/12"));
    assert_eq!(summary.tasks_failed, 1);
}

#[tokio::test]
async fn test_metadata_index_populated() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let output = TempDir::new().unwrap();
    let index_path = output.path().join("index.db");

    let config = test_config(
        &server.uri(),
        output.path(),
        3,
        &format!("index-path = \"{}\"", index_path.display()),
    );
    lms_archive::run(config.clone()).await.unwrap();
    lms_archive::run(config).await.unwrap();

    let index = SqliteIndex::open(&index_path).unwrap();
    let counts = index.table_counts().unwrap();
    assert_eq!(counts["semesters"], 2);
    assert_eq!(counts["courses"], 4);
    assert_eq!(counts["users"], 2);
    assert_eq!(index.courses_of("501").unwrap(), vec!["10", "11", "13"]);
    assert!(index.last_run().unwrap().is_some());

    // The sink trait is what workers see
    let _: &dyn MetadataSink = &index;
}

#[tokio::test]
async fn test_cancelled_run_stops_taking_tasks() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let output = TempDir::new().unwrap();

    let coordinator = Coordinator::new(test_config(&server.uri(), output.path(), 4, "")).unwrap();
    coordinator.cancellation_token().cancel();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.tasks_completed, 0);
    assert_eq!(summary.tasks_enqueued, 1);
    assert!(archived(output.path()).is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// Counts requests the server received for `page_path` with `name=value` in the query
async fn requests_for(server: &MockServer, page_path: &str, name: &str, value: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| {
            request.url.path() == page_path
                && request
                    .url
                    .query_pairs()
                    .any(|(key, val)| key == name && val == value)
        })
        .count()
}

#[tokio::test]
async fn test_cancel_lets_in_flight_task_finish() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/enrol/index.php"))
        .and(query_param("id", "10"))
        .respond_with(
            html(course_page("Hệ điều hành", Some(&["501"]))).set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;
    mount_portal(&server).await;

    // One worker: catalog, both semesters, then course 10 is the task in hand
    let output = TempDir::new().unwrap();
    let coordinator = Coordinator::new(test_config(&server.uri(), output.path(), 1, "")).unwrap();
    let cancel = coordinator.cancellation_token();
    let handle = tokio::spawn(coordinator.run());

    let mut waited = 0;
    while requests_for(&server, "/enrol/index.php", "id", "10").await == 0 {
        assert!(waited < 200, "course 10 was never requested");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    cancel.cancel();

    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("run should return after cancellation")
        .unwrap()
        .unwrap();

    let files = archived(output.path());
    assert!(files.contains("courses/10"), "in-flight course is stored");
    assert!(!files.contains("courses/11"));
    assert_eq!(summary.tasks_failed, 0);
    assert_eq!(summary.tasks_completed, 4);
    // The teacher found on course 10 is refused by the closed frontier
    assert_eq!(requests_for(&server, "/user/profile.php", "id", "501").await, 0);
}

#[tokio::test]
async fn test_store_failure_drops_task_and_its_children() {
    let server = MockServer::start().await;

    // User 502 lists a course whose id cannot name an artifact file
    Mock::given(method("GET"))
        .and(path("/user/profile.php"))
        .and(query_param("id", "502"))
        .respond_with(html(profile_page("Tran B", &["11", "a.b"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/enrol/index.php"))
        .and(query_param("id", "a.b"))
        .respond_with(html(course_page("Broken", Some(&["777"]))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/profile.php"))
        .and(query_param("id", "777"))
        .respond_with(html(profile_page("Nobody", &[])))
        .expect(0)
        .mount(&server)
        .await;
    mount_portal(&server).await;

    let output = TempDir::new().unwrap();
    let summary = lms_archive::run(test_config(&server.uri(), output.path(), 4, ""))
        .await
        .unwrap();

    assert_eq!(summary.tasks_failed, 1);
    assert_eq!(summary.artifacts_written, 8);
    // Siblings still finish
    assert_eq!(archived(output.path()), expected_archive());

    let course_files: Vec<_> = std::fs::read_dir(output.path().join("courses"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(course_files.len(), 4, "no partial or temporary file left: {:?}", course_files);
    server.verify().await;
}
