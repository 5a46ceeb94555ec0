use super::*;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use buildnpm_core::{
    BuildDependency, Checksum, DependencyGraph, PreviousBuildIndex, Scope, TypeRestriction,
};

use crate::client::{aql_query, file_type_of};
use crate::npmrc::classify_restriction;

const REGISTRY: &str = "https://artifacts.example.test/api/npm/npm-virtual";

fn translate(config_list: &str) -> TranslatedConfig {
    translate_npm_config(config_list, REGISTRY, true, &["_auth = abc".to_string()])
}

#[test]
fn translate_drops_reserved_keys_and_appends_registry_directives() {
    let config_list = "\
; \"user\" config from /home/dev/.npmrc
registry = \"https://registry.npmjs.org/\"
metrics-registry = \"https://registry.npmjs.org/\"
json = false
//registry.npmjs.org/:_authToken = (protected)
cache = \"/home/dev/.npm\"
loglevel = \"warn\"
";
    let translated = translate(config_list);

    assert_eq!(
        translated.document.directives(),
        &[
            "cache = \"/home/dev/.npm\"".to_string(),
            "loglevel = \"warn\"".to_string(),
            "json = true".to_string(),
            format!("registry = {REGISTRY}"),
            "_auth = abc".to_string(),
        ]
    );
    assert_eq!(translated.restriction, TypeRestriction::Default);
}

#[test]
fn translate_rewrites_scoped_registries_to_target() {
    let translated = translate("@corp:registry = \"https://npm.corp.test/\"\n@other:registry\n");
    let directives = translated.document.directives();
    assert_eq!(directives[0], format!("@corp:registry = {REGISTRY}"));
    assert_eq!(directives[1], format!("@other:registry = {REGISTRY}"));
}

#[test]
fn translate_expands_array_values_and_drops_empty_arrays() {
    let translated = translate("ca = []\nglobalignorefile = [a,b, c]\n");
    let directives = translated.document.directives();
    assert_eq!(directives[0], "globalignorefile[] = a");
    assert_eq!(directives[1], "globalignorefile[] = b");
    assert_eq!(directives[2], "globalignorefile[] = c");
    assert_eq!(directives[3], "json = true");
    assert!(directives.iter().all(|directive| !directive.starts_with("ca")));
}

#[test]
fn translate_ignores_malformed_lines() {
    let translated = translate("garbage line\n\n   \n= orphan value\nfund = false\n");
    let directives = translated.document.directives();
    assert_eq!(directives[0], "= orphan value");
    assert_eq!(directives[1], "fund = false");
    assert_eq!(directives.len(), 5);
}

#[test]
fn rendered_document_ends_with_newline() {
    let translated = translate("fund = false\n");
    assert_eq!(
        translated.document.render(),
        format!("fund = false\njson = true\nregistry = {REGISTRY}\n_auth = abc\n")
    );
}

#[test]
fn omit_takes_precedence_over_only() {
    assert_eq!(
        translate("omit = dev\nonly = prod\n").restriction,
        TypeRestriction::ProdOnly
    );
    assert_eq!(
        translate("only = dev\nomit = [\"dev\"]\n").restriction,
        TypeRestriction::ProdOnly
    );
    assert_eq!(
        translate("only = dev\nomit = []\n").restriction,
        TypeRestriction::All
    );
}

#[test]
fn deprecated_restriction_keys_use_first_seen_value() {
    assert_eq!(
        translate("production = true\n").restriction,
        TypeRestriction::ProdOnly
    );
    assert_eq!(
        translate("only = dev\nproduction = true\n").restriction,
        TypeRestriction::DevOnly
    );
    assert_eq!(
        translate("only = production\nonly = dev\n").restriction,
        TypeRestriction::ProdOnly
    );
    assert_eq!(
        translate("production = false\nonly = dev\n").restriction,
        TypeRestriction::DevOnly
    );
}

#[test]
fn classify_leaves_unrelated_keys_alone() {
    assert_eq!(
        classify_restriction(TypeRestriction::Default, "fund", "true"),
        TypeRestriction::Default
    );
    assert_eq!(
        classify_restriction(TypeRestriction::DevOnly, "omit", "optional"),
        TypeRestriction::All
    );
}

#[test]
fn server_rejects_invalid_urls_and_repos() {
    let err = RegistryServer::new("ftp://example.test", "npm", NpmAuth::Anonymous)
        .expect_err("ftp must be rejected");
    assert!(err.to_string().contains("must start with http"));
    let err = RegistryServer::new("https://example.test", " / ", NpmAuth::Anonymous)
        .expect_err("empty repo must be rejected");
    assert!(err.to_string().contains("must not be empty"));

    let server = RegistryServer::new("https://example.test/artifactory/", "/npm/", NpmAuth::Anonymous)
        .expect("server must be valid");
    assert_eq!(
        server.npm_registry_url(),
        "https://example.test/artifactory/api/npm/npm"
    );
    assert_eq!(
        server.aql_url(),
        "https://example.test/artifactory/api/search/aql"
    );
}

#[test]
fn auth_directives_per_mode() {
    let token = RegistryServer::new(
        "https://example.test/artifactory",
        "npm",
        NpmAuth::AccessToken("tkn".to_string()),
    )
    .expect("server");
    assert_eq!(
        token.npm_auth_directives().expect("token auth"),
        vec![
            "//example.test/artifactory/api/npm/npm/:_authToken = tkn".to_string(),
            "always-auth = true".to_string(),
        ]
    );

    let basic = RegistryServer::new(
        "https://example.test",
        "npm",
        NpmAuth::Basic {
            user: "admin".to_string(),
            password: "secret".to_string(),
        },
    )
    .expect("server");
    assert_eq!(
        basic.npm_auth_directives().expect("basic auth")[0],
        "_auth = YWRtaW46c2VjcmV0"
    );

    let ssh = RegistryServer::new(
        "https://example.test",
        "npm",
        NpmAuth::SshKey("/home/dev/.ssh/id_rsa".into()),
    )
    .expect("server");
    let err = ssh.npm_auth_directives().expect_err("ssh must be rejected");
    assert!(err.to_string().contains("not supported"));
    assert!(RegistryClient::new(ssh).is_err());
}

#[test]
fn aql_query_quotes_package_coordinates() {
    let query = aql_query("@scope/pkg\"x", "1.0.0").expect("query");
    assert!(query.starts_with("items.find({\"@npm.name\":\"@scope/pkg\\\"x\",\"@npm.version\":\"1.0.0\"})"));
    assert!(query.contains(".include(\"name\""));
}

#[test]
fn file_type_comes_from_extension() {
    assert_eq!(file_type_of("left-pad-1.3.0.tgz").as_deref(), Some("tgz"));
    assert_eq!(file_type_of("README"), None);
    assert_eq!(file_type_of(".hidden"), None);
}

#[test]
fn registry_client_reads_checksums_from_search_results() {
    let body = r#"{"results":[{"repo":"npm-remote-cache","path":"left-pad/-","name":"left-pad-1.3.0.tgz","actual_sha1":"s1","actual_md5":"m5","sha256":"s256"}],"range":{"total":1}}"#;
    let (url, handle) = start_http_server(vec![http_response("200 OK", body)]);
    let client = test_client(&url);

    let found = client
        .lookup("left-pad", "1.3.0")
        .expect("lookup must succeed")
        .expect("package must be found");
    assert_eq!(found.file_type.as_deref(), Some("tgz"));
    assert_eq!(
        found.checksum,
        Checksum {
            sha1: Some("s1".to_string()),
            md5: Some("m5".to_string()),
            sha256: Some("s256".to_string()),
        }
    );

    let requests = handle.join().expect("server thread");
    assert!(requests[0].starts_with("POST /api/search/aql"));
    assert!(requests[0].contains("\"@npm.name\":\"left-pad\""));
    assert!(requests[0].to_ascii_lowercase().contains("authorization: bearer tkn"));
}

#[test]
fn registry_client_reports_not_found_for_empty_results() {
    let (url, handle) = start_http_server(vec![http_response("200 OK", r#"{"results":[]}"#)]);
    let client = test_client(&url);

    let found = client.lookup("ghost", "0.0.1").expect("lookup must succeed");
    assert!(found.is_none());
    handle.join().expect("server thread");
}

#[test]
fn registry_client_treats_result_without_checksums_as_not_found() {
    let (url, handle) = start_http_server(vec![http_response(
        "200 OK",
        r#"{"results":[{"name":"a-1.0.0.tgz"}]}"#,
    )]);
    let client = test_client(&url);

    let found = client.lookup("a", "1.0.0").expect("lookup must succeed");
    assert!(found.is_none());
    handle.join().expect("server thread");
}

#[test]
fn registry_client_retries_server_errors() {
    let (url, handle) = start_http_server(vec![
        http_response("500 Internal Server Error", ""),
        http_response("200 OK", r#"{"results":[{"name":"a-1.0.0.tgz","actual_sha1":"x"}]}"#),
    ]);
    let client = test_client(&url);

    let found = client
        .lookup("a", "1.0.0")
        .expect("retry must succeed")
        .expect("package must be found");
    assert_eq!(found.checksum.sha1.as_deref(), Some("x"));
    assert_eq!(handle.join().expect("server thread").len(), 2);
}

#[test]
fn registry_client_does_not_retry_auth_failures() {
    let (url, handle) = start_http_server(vec![http_response("401 Unauthorized", "bad token")]);
    let client = test_client(&url);

    let err = client.lookup("a", "1.0.0").expect_err("401 must fail");
    assert!(err.to_string().contains("HTTP 401"));
    assert_eq!(handle.join().expect("server thread").len(), 1);
}

#[derive(Default)]
struct FakeLookup {
    responses: HashMap<String, std::result::Result<Option<RemoteChecksum>, String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeLookup {
    fn found(mut self, id: &str, sha1: &str) -> Self {
        self.responses.insert(
            id.to_string(),
            Ok(Some(RemoteChecksum {
                checksum: Checksum {
                    sha1: Some(sha1.to_string()),
                    ..Checksum::default()
                },
                file_type: Some("tgz".to_string()),
            })),
        );
        self
    }

    fn failing(mut self, id: &str, message: &str) -> Self {
        self.responses.insert(id.to_string(), Err(message.to_string()));
        self
    }

    fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().expect("calls lock").clone();
        calls.sort();
        calls
    }
}

impl ChecksumLookup for FakeLookup {
    fn lookup(&self, name: &str, version: &str) -> anyhow::Result<Option<RemoteChecksum>> {
        let id = format!("{name}:{version}");
        self.calls.lock().expect("calls lock").push(id.clone());
        match self.responses.get(&id) {
            Some(Ok(found)) => Ok(found.clone()),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Ok(None),
        }
    }
}

fn graph_of(ids: &[(&str, &str)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for (name, version) in ids {
        graph.record(
            name,
            version,
            Scope::Prod,
            vec![format!("{name}:{version}"), "app:1.0.0".to_string()],
        );
    }
    graph
}

fn no_progress() -> impl Fn(&buildnpm_core::DependencyNode) + Sync {
    |_| {}
}

#[test]
fn enrich_marks_not_found_as_missing_without_error() {
    let mut graph = graph_of(&[("c", "3.0.0"), ("d", "4.0.0")]);
    let lookup = FakeLookup::default().found("d:4.0.0", "d-sha1");

    let summary = enrich_checksums(
        &mut graph,
        &PreviousBuildIndex::empty(),
        &lookup,
        &EnrichOptions::default(),
        &no_progress(),
    )
    .expect("not found is not an error");

    assert_eq!(summary.from_registry, 1);
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.failed, 0);
    assert!(graph.get("c:3.0.0").expect("c").checksum.is_none());
    let d = graph.get("d:4.0.0").expect("d");
    assert_eq!(
        d.checksum.as_ref().and_then(|checksum| checksum.sha1.as_deref()),
        Some("d-sha1")
    );
    assert_eq!(d.file_type.as_deref(), Some("tgz"));
}

#[test]
fn enrich_prefers_previous_build_over_registry() {
    let mut graph = graph_of(&[("a", "1.0.0"), ("b", "2.0.0")]);
    let recorded = BuildDependency {
        id: "a:1.0.0".to_string(),
        file_type: Some("tgz".to_string()),
        scopes: vec![Scope::Prod],
        checksum: Some(Checksum {
            sha1: Some("from-previous".to_string()),
            ..Checksum::default()
        }),
        requested_by: Vec::new(),
    };
    let previous = PreviousBuildIndex::from_dependencies([&recorded]);
    let lookup = FakeLookup::default()
        .found("a:1.0.0", "from-registry")
        .found("b:2.0.0", "b-sha1");

    let summary = enrich_checksums(
        &mut graph,
        &previous,
        &lookup,
        &EnrichOptions::default(),
        &no_progress(),
    )
    .expect("enrichment must succeed");

    assert_eq!(lookup.calls(), vec!["b:2.0.0".to_string()]);
    assert_eq!(summary.from_previous_build, 1);
    assert_eq!(
        graph
            .get("a:1.0.0")
            .and_then(|node| node.checksum.as_ref())
            .and_then(|checksum| checksum.sha1.as_deref()),
        Some("from-previous")
    );
}

#[test]
fn enrich_attempts_every_node_and_reports_first_failure() {
    let ids = [("a", "1.0.0"), ("b", "1.0.0"), ("c", "1.0.0"), ("d", "1.0.0"), ("e", "1.0.0")];
    let mut graph = graph_of(&ids);
    let lookup = FakeLookup::default()
        .failing("a:1.0.0", "registry unavailable")
        .failing("c:1.0.0", "registry unavailable")
        .found("b:1.0.0", "b")
        .found("d:1.0.0", "d")
        .found("e:1.0.0", "e");
    let done = AtomicUsize::new(0);

    let err = enrich_checksums(
        &mut graph,
        &PreviousBuildIndex::empty(),
        &lookup,
        &EnrichOptions {
            threads: 2,
            max_errors: 1,
        },
        &|_: &buildnpm_core::DependencyNode| {
            done.fetch_add(1, Ordering::SeqCst);
        },
    )
    .expect_err("failures must surface");

    assert_eq!(err.to_string(), "1 more dependency failed");
    let chain = format!("{err:#}");
    assert!(chain.contains("failed to collect checksum for"));
    assert!(chain.contains("registry unavailable"));
    assert_eq!(lookup.calls().len(), ids.len());
    assert_eq!(done.load(Ordering::SeqCst), ids.len());
    for id in ["b:1.0.0", "d:1.0.0", "e:1.0.0"] {
        assert!(graph.get(id).expect("node").checksum.is_some(), "{id} must be enriched");
    }
}

#[test]
fn enrich_runs_single_worker_for_non_positive_threads() {
    assert_eq!(EnrichOptions { threads: 0, max_errors: 1 }.worker_count(), 1);
    assert_eq!(EnrichOptions { threads: -4, max_errors: 1 }.worker_count(), 1);
    assert_eq!(EnrichOptions { threads: 8, max_errors: 1 }.worker_count(), 8);

    let mut graph = graph_of(&[("a", "1.0.0"), ("b", "1.0.0")]);
    let lookup = FakeLookup::default().found("a:1.0.0", "a").found("b:1.0.0", "b");
    enrich_checksums(
        &mut graph,
        &PreviousBuildIndex::empty(),
        &lookup,
        &EnrichOptions {
            threads: 0,
            max_errors: 1,
        },
        &no_progress(),
    )
    .expect("single worker must succeed");
    assert!(graph.nodes().all(|node| node.checksum.is_some()));
}

#[test]
fn enrich_is_idempotent() {
    let mut graph = graph_of(&[("a", "1.0.0"), ("b", "1.0.0"), ("c", "1.0.0")]);
    let lookup = FakeLookup::default().found("a:1.0.0", "a").found("b:1.0.0", "b");
    let options = EnrichOptions::default();

    enrich_checksums(&mut graph, &PreviousBuildIndex::empty(), &lookup, &options, &no_progress())
        .expect("first pass");
    let first = graph.clone();
    enrich_checksums(&mut graph, &PreviousBuildIndex::empty(), &lookup, &options, &no_progress())
        .expect("second pass");

    assert_eq!(first, graph);
}

#[test]
fn enrich_error_counts_every_later_failure() {
    let ids = [("a", "1.0.0"), ("b", "1.0.0"), ("c", "1.0.0")];
    let mut graph = graph_of(&ids);
    let lookup = FakeLookup::default()
        .failing("a:1.0.0", "connection reset")
        .failing("b:1.0.0", "connection reset")
        .failing("c:1.0.0", "connection reset");

    let err = enrich_checksums(
        &mut graph,
        &PreviousBuildIndex::empty(),
        &lookup,
        &EnrichOptions {
            threads: 3,
            max_errors: 1,
        },
        &|_: &buildnpm_core::DependencyNode| {},
    )
    .expect_err("failures must surface");

    assert_eq!(err.to_string(), "2 more dependencies failed");
    assert!(format!("{err:#}").contains("connection reset"));
}

#[test]
fn error_collector_keeps_only_capacity_but_counts_all() {
    let collector = ErrorCollector::new(2);
    collector.record(anyhow!("first"));
    collector.record(anyhow!("second"));
    collector.record(anyhow!("third"));

    assert_eq!(collector.total(), 3);
    let err = collector.into_result().expect_err("must fail");
    assert_eq!(err.to_string(), "2 more dependencies failed");
    assert_eq!(err.root_cause().to_string(), "first");

    let single = ErrorCollector::new(1);
    single.record(anyhow!("only"));
    assert_eq!(single.into_result().expect_err("must fail").to_string(), "only");
    assert!(ErrorCollector::new(0).into_result().is_ok());
}

fn test_client(url: &str) -> RegistryClient {
    let server = RegistryServer::new(url, "npm-virtual", NpmAuth::AccessToken("tkn".to_string()))
        .expect("test server must be valid");
    RegistryClient::new(server)
        .expect("client must build")
        .with_retry_policy(3, Duration::from_millis(0))
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serves one canned response per connection and returns the raw requests.
fn start_http_server(responses: Vec<String>) -> (String, std::thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind test server");
    let address = listener.local_addr().expect("must read test server address");
    let url = format!("http://{address}");
    let handle = std::thread::spawn(move || {
        let mut requests = Vec::new();
        for response in responses {
            let (mut stream, _) = listener.accept().expect("must accept test client");
            requests.push(read_request(&mut stream));
            stream
                .write_all(response.as_bytes())
                .expect("must write test response");
            stream.flush().expect("must flush test response");
        }
        requests
    });
    (url, handle)
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buffer = [0_u8; 1024];
    loop {
        let read = stream.read(&mut buffer).expect("must read test request");
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&buffer[..read]);
        let text = String::from_utf8_lossy(&raw);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).to_string()
}
