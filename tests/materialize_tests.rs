mod common;

use canvas_data::{CanvasDataError, ClientConfig, DumpRef, FileRef, FileSelector, SELF_ACCOUNT};
use common::{client_with, gzip, mock_json, test_client, test_config};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;

const MANIFEST_PATH: &str = "/api/account/self/file/byDump/dump-7";

fn file_ref(server: &ServerGuard, name: &str) -> serde_json::Value {
    json!({"filename": name, "url": format!("{}/files/{}", server.url(), name)})
}

fn fragment(server: &ServerGuard, name: &str) -> FileRef {
    FileRef {
        filename: name.to_string(),
        url: format!("{}/files/{}", server.url(), name),
    }
}

/// Unsigned GET of `/files/<name>`, expected exactly `hits` times.
async fn mock_fragment(
    server: &mut ServerGuard,
    name: &str,
    status: usize,
    body: impl AsRef<[u8]>,
    hits: usize,
) -> Mock {
    server
        .mock("GET", format!("/files/{}", name).as_str())
        .match_header("authorization", Matcher::Missing)
        .with_status(status)
        .with_body(body)
        .expect(hits)
        .create_async()
        .await
}

/// Manifest of dump 7: two `course_dim` fragments and one `requests` fragment.
async fn mock_manifest(server: &mut ServerGuard, hits: usize) -> Mock {
    let body = json!({
        "dumpId": "dump-7",
        "sequence": 7,
        "artifactsByTable": {
            "course_dim": {
                "files": [file_ref(server, "f1.gz"), file_ref(server, "f2.gz")],
                "partial": false
            },
            "requests": {"files": [file_ref(server, "r1.gz")], "partial": true}
        }
    });
    mock_json(server, MANIFEST_PATH, 200, body, hits).await
}

fn dump_7() -> DumpRef {
    DumpRef::Id("dump-7".into())
}

#[tokio::test]
async fn table_is_reassembled_in_fragment_order() {
    let mut server = Server::new_async().await;
    let manifest = mock_manifest(&mut server, 1).await;
    let f1 = mock_fragment(&mut server, "f1.gz", 200, gzip(b"a\nb\n"), 1).await;
    let f2 = mock_fragment(&mut server, "f2.gz", 200, gzip(b"c"), 1).await;
    let r1 = mock_fragment(&mut server, "r1.gz", 200, gzip(b"GET /\n"), 0).await;
    let client = test_client(&server);
    let data = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();

    let output = client
        .materialize_table(
            "course_dim",
            SELF_ACCOUNT,
            &dump_7(),
            data.path(),
            downloads.path(),
            false,
        )
        .await
        .unwrap();

    assert_eq!(output, data.path().join("course_dim.txt"));
    assert_eq!(std::fs::read(&output).unwrap(), b"a\nb\nc");
    assert!(downloads.path().join("f1.gz").exists());
    assert!(downloads.path().join("f2.gz").exists());
    for mock in [manifest, f1, f2, r1] {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn existing_table_output_is_only_rebuilt_when_forced() {
    let mut server = Server::new_async().await;
    let manifest = mock_manifest(&mut server, 2).await;
    let f1 = mock_fragment(&mut server, "f1.gz", 200, gzip(b"a\nb\n"), 2).await;
    let f2 = mock_fragment(&mut server, "f2.gz", 200, gzip(b"c"), 2).await;
    let client = test_client(&server);
    let data = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();

    for force in [false, false, true] {
        let output = client
            .materialize_table(
                "course_dim",
                SELF_ACCOUNT,
                &dump_7(),
                data.path(),
                downloads.path(),
                force,
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"a\nb\nc");
    }

    // One fetch for the first build, none for the cached call, one when forced
    for mock in [manifest, f1, f2] {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn table_key_alias_resolves_to_the_dump_table() {
    let mut server = Server::new_async().await;
    let _manifest = mock_manifest(&mut server, 1).await;
    let _f1 = mock_fragment(&mut server, "f1.gz", 200, gzip(b"a\nb\n"), 1).await;
    let _f2 = mock_fragment(&mut server, "f2.gz", 200, gzip(b"c"), 1).await;
    let client = test_client(&server);
    let data = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();

    let output = client
        .materialize_table(
            "course",
            SELF_ACCOUNT,
            &dump_7(),
            data.path(),
            downloads.path(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(output, data.path().join("course_dim.txt"));
}

#[tokio::test]
async fn dump_materialization_skips_requests_unless_asked() {
    let mut server = Server::new_async().await;
    let _manifest = mock_manifest(&mut server, 2).await;
    let _f1 = mock_fragment(&mut server, "f1.gz", 200, gzip(b"a\nb\n"), 1).await;
    let _f2 = mock_fragment(&mut server, "f2.gz", 200, gzip(b"c"), 1).await;
    let r1 = mock_fragment(&mut server, "r1.gz", 200, gzip(b"GET /\n"), 1).await;
    let client = test_client(&server);
    let downloads = tempfile::tempdir().unwrap();

    let without = tempfile::tempdir().unwrap();
    let outputs = client
        .materialize_dump(&dump_7(), SELF_ACCOUNT, without.path(), downloads.path(), false, false)
        .await
        .unwrap();
    assert_eq!(outputs, vec![without.path().join("course_dim.txt")]);
    assert!(!without.path().join("requests.txt").exists());

    let with = tempfile::tempdir().unwrap();
    let outputs = client
        .materialize_dump(&dump_7(), SELF_ACCOUNT, with.path(), downloads.path(), true, false)
        .await
        .unwrap();
    assert_eq!(
        outputs,
        vec![with.path().join("course_dim.txt"), with.path().join("requests.txt")]
    );
    assert_eq!(
        std::fs::read(with.path().join("requests.txt")).unwrap(),
        b"GET /\n"
    );
    r1.assert_async().await;
}

#[tokio::test]
async fn dump_files_follow_the_server_table_order() {
    let mut server = Server::new_async().await;
    let body = json!({
        "sequence": 8,
        "artifactsByTable": {
            "zeta_dim": {"files": [file_ref(&server, "z.gz")], "partial": false},
            "alpha_dim": {"files": [file_ref(&server, "a.gz")], "partial": false}
        }
    });
    let _manifest = mock_json(&mut server, "/api/account/self/file/latest", 200, body, 1).await;
    let _z = mock_fragment(&mut server, "z.gz", 200, gzip(b"z\n"), 1).await;
    let _a = mock_fragment(&mut server, "a.gz", 200, gzip(b"a\n"), 1).await;
    let client = test_client(&server);
    let downloads = tempfile::tempdir().unwrap();

    let paths = client
        .fetch_table_files(
            SELF_ACCOUNT,
            &FileSelector::ByDump(DumpRef::Latest),
            downloads.path(),
            false,
            false,
        )
        .await
        .unwrap();
    assert_eq!(
        paths,
        vec![downloads.path().join("z.gz"), downloads.path().join("a.gz")]
    );
}

#[tokio::test]
async fn fragments_are_fetched_without_signature_and_reused() {
    let mut server = Server::new_async().await;
    let mock = mock_fragment(&mut server, "f1.gz", 200, gzip(b"a\n"), 2).await;
    let client = test_client(&server);
    let downloads = tempfile::tempdir().unwrap();
    let file = fragment(&server, "f1.gz");

    let path = client.fetch_file(&file, downloads.path(), false).await.unwrap();
    assert_eq!(path, downloads.path().join("f1.gz"));
    assert_eq!(std::fs::read(&path).unwrap(), gzip(b"a\n"));
    assert!(!downloads.path().join("f1.gz.part").exists());

    client.fetch_file(&file, downloads.path(), false).await.unwrap();
    client.fetch_file(&file, downloads.path(), true).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn parallel_downloads_keep_manifest_order_and_share_duplicates() {
    let mut server = Server::new_async().await;
    let names = ["p0.gz", "p1.gz", "p2.gz", "p3.gz", "p4.gz", "p5.gz"];
    let mut mocks = Vec::new();
    for name in names {
        mocks.push(mock_fragment(&mut server, name, 200, gzip(name.as_bytes()), 1).await);
    }
    let client = client_with(ClientConfig {
        max_concurrent_downloads: 3,
        ..test_config(&server)
    });
    let downloads = tempfile::tempdir().unwrap();

    let mut files: Vec<FileRef> = names.iter().map(|name| fragment(&server, name)).collect();
    files.push(fragment(&server, "p1.gz"));

    let paths = client.fetch_files(&files, downloads.path(), false).await.unwrap();
    let expected: Vec<_> = files
        .iter()
        .map(|f| downloads.path().join(&f.filename))
        .collect();
    assert_eq!(paths, expected);
    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn failed_fragment_leaves_no_table_output() {
    let mut server = Server::new_async().await;
    let _manifest = mock_manifest(&mut server, 1).await;
    let _f1 = mock_fragment(&mut server, "f1.gz", 200, gzip(b"a\nb\n"), 1).await;
    let _f2 = mock_fragment(&mut server, "f2.gz", 404, "gone", 4).await;
    let client = test_client(&server);
    let data = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();

    let err = client
        .materialize_table(
            "course_dim",
            SELF_ACCOUNT,
            &dump_7(),
            data.path(),
            downloads.path(),
            false,
        )
        .await
        .unwrap_err();
    assert!(
        matches!(&err, CanvasDataError::ApiError { status: Some(404), .. }),
        "unexpected error: {}",
        err
    );
    assert!(!data.path().join("course_dim.txt").exists());
    assert!(!downloads.path().join("f2.gz").exists());
    assert!(!downloads.path().join("f2.gz.part").exists());
}

#[tokio::test]
async fn corrupt_fragment_leaves_no_table_output() {
    let mut server = Server::new_async().await;
    let _manifest = mock_manifest(&mut server, 1).await;
    let _f1 = mock_fragment(&mut server, "f1.gz", 200, gzip(b"a\nb\n"), 1).await;
    let _f2 = mock_fragment(&mut server, "f2.gz", 200, "not gzip at all", 1).await;
    let client = test_client(&server);
    let data = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();

    let err = client
        .materialize_table(
            "course_dim",
            SELF_ACCOUNT,
            &dump_7(),
            data.path(),
            downloads.path(),
            false,
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, CanvasDataError::IoFailure { .. }),
        "unexpected error: {}",
        err
    );
    assert_eq!(err.exit_code(), 6);
    assert!(!data.path().join("course_dim.txt").exists());
    assert!(!data.path().join("course_dim.txt.part").exists());
}

#[tokio::test]
async fn table_history_fragments_are_downloaded() {
    let mut server = Server::new_async().await;
    let body = json!({"table": "user_dim", "history": [
        {"dumpId": "dump-7", "sequence": 7, "files": [file_ref(&server, "u7.gz")]},
        {"dumpId": "dump-6", "sequence": 6, "partial": true, "files": [file_ref(&server, "u6.gz")]}
    ]});
    let path = "/api/account/self/file/byTable/user_dim";
    let _history = mock_json(&mut server, path, 200, body, 1).await;
    let _u7 = mock_fragment(&mut server, "u7.gz", 200, gzip(b"7\n"), 1).await;
    let _u6 = mock_fragment(&mut server, "u6.gz", 200, gzip(b"6\n"), 1).await;
    let client = test_client(&server);
    let downloads = tempfile::tempdir().unwrap();

    let paths = client
        .fetch_table_files(
            SELF_ACCOUNT,
            &FileSelector::ByTable("user".into()),
            downloads.path(),
            false,
            false,
        )
        .await
        .unwrap();
    assert_eq!(
        paths,
        vec![downloads.path().join("u7.gz"), downloads.path().join("u6.gz")]
    );
}
