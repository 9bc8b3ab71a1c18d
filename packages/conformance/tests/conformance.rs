//! End-to-end conformance tests for the PsiCash bridge boundary contract.
//!
//! Each test drives a [`Bridge`] backed by a [`LedgerEngine`] through the
//! same entry-point methods the JNI binding calls, with a [`ScriptedHost`]
//! standing in for the JVM.
//!
//! # Coverage
//!
//! | Test | Property |
//! |------|----------|
//! | `well_formed_request_has_exactly_three_keys` | envelope shape |
//! | `missing_field_is_invalid_with_parser_id` | input validation |
//! | `null_host_result_yields_four_key_stub` | adapter stub shape |
//! | `wrapping_preserves_cause_text` | error chain |
//! | `static_binding_is_write_once` | static init idempotence |
//! | `success_scenario_relays_purchase` | 200 → Success + purchase |
//! | `null_result_scenario_is_invalid` | null → network error → Invalid |
//! | `literal_null_input_skips_engine` | `"null"` input |
//! | `null_input_skips_engine` | host passed null |
//! | `business_statuses_are_relayed` | engine status codes |
//! | `host_exception_is_cleared_and_boundary_reusable` | fault check-and-clear |
//! | `encoding_failure_reaches_engine_as_stub` | transfer failure |
//! | `unreadable_result_reaches_engine_as_stub` | read-back failure |
//! | `host_strings_are_released` | handle hygiene |
//! | `adapter_is_rebuilt_per_call` | per-call capability |
//! | `engine_receives_request_and_config` | request / user agent plumbing |
//! | `uninitialised_engine_error_is_wrapped` | engine error wrapping |
//! | `object_init_failure_is_wrapped` | init error wrapping |
//! | `non_ascii_purchase_is_escaped` | ASCII-safe output |
//! | `concurrent_calls_use_their_own_hosts` | per-call isolation |
//! | `hung_host_blocks_only_its_own_call` | no bridge-wide lock across a round trip |

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use psicash_bridge::{
    make_error, wrap_error, Binding, Bridge, BridgeConfig, Host, HostCallback, HostFault,
    HttpResult, LifecycleError, MakeHttpRequest,
};
use psicash_bridge_conformance::{HostString, LedgerEngine, Reply, ScriptedHost};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PARAMS: &str = r#"{"class":"subscription","distinguisher":"1month","expectedPrice":100}"#;

/// Route bridge logs through the test harness; `PSICASH_LOG` filters them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("PSICASH_LOG"))
        .with_test_writer()
        .try_init();
}

fn bridge() -> Bridge<LedgerEngine> {
    init_tracing();
    Bridge::new(LedgerEngine::initialised(), BridgeConfig::default())
}

fn success_reply() -> Reply {
    Reply::http(
        200,
        json!({
            "TransactionID": "txn-0001",
            "ServerTimeExpiry": "2024-06-01T12:00:00.000Z",
            "Authorization": {"ID": "auth-1", "AccessType": "subscription"},
        }),
    )
}

/// Decode an envelope and assert its fixed shape.
fn envelope(s: &str) -> Value {
    let v: Value = serde_json::from_str(s).expect("envelope must be JSON");
    let obj = v.as_object().expect("envelope must be an object");
    let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["error", "purchase", "status"], "{s}");
    if v["status"] != -1 {
        assert!(v["error"].is_null(), "error must be null unless Invalid: {s}");
    }
    v
}

fn purchase(host: &mut ScriptedHost, params: Option<&str>) -> (Value, Bridge<LedgerEngine>) {
    let b = bridge();
    let v = envelope(&b.new_expiring_purchase(host, params));
    (v, b)
}

// ---------------------------------------------------------------------------
// Envelope and input validation
// ---------------------------------------------------------------------------

#[test]
fn well_formed_request_has_exactly_three_keys() {
    let mut host = ScriptedHost::always(success_reply());
    let (v, _) = purchase(&mut host, Some(PARAMS));
    assert_eq!(v["status"], 0);
    assert!(v["error"].is_null());
}

#[test]
fn missing_field_is_invalid_with_parser_id() {
    for params in [
        r#"{"distinguisher":"1month","expectedPrice":100}"#,
        r#"{"class":"subscription","expectedPrice":100}"#,
        r#"{"class":"subscription","distinguisher":"1month"}"#,
    ] {
        let mut host = ScriptedHost::always(success_reply());
        let (v, b) = purchase(&mut host, Some(params));
        assert_eq!(v["status"], -1, "{params}");
        let err = v["error"].as_str().expect("error must be set");
        assert!(err.contains("id: data"), "{err}");
        assert!(v["purchase"].is_null());
        assert!(host.requests.is_empty());
        assert_eq!(b.engine().purchase_calls(), 0);
    }
}

#[test]
fn literal_null_input_skips_engine() {
    let mut host = ScriptedHost::always(success_reply());
    let b = bridge();
    let v = envelope(&b.new_expiring_purchase(&mut host, Some("null")));
    assert_eq!(v["status"], -1);
    assert!(v["error"].is_string());
    assert!(v["purchase"].is_null());
    assert!(host.requests.is_empty());
}

#[test]
fn null_input_skips_engine() {
    let mut host = ScriptedHost::always(success_reply());
    let (v, _) = purchase(&mut host, None);
    assert_eq!(v["status"], -1);
    assert!(v["error"].as_str().unwrap().contains("null"));
    assert!(host.requests.is_empty());
}

// ---------------------------------------------------------------------------
// Host callback adapter
// ---------------------------------------------------------------------------

#[test]
fn null_host_result_yields_four_key_stub() {
    let mut host = ScriptedHost::always(Reply::Null);
    let out = HostCallback::new(&mut host).make_http_request("{}");

    let v: Value = serde_json::from_str(&out).expect("stub must be JSON");
    let mut keys: Vec<_> = v.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["body", "date", "error", "status"]);
    assert_eq!(v["status"], -1);
    assert!(v["error"].as_str().unwrap().starts_with("NullResult"));
    assert!(v["body"].is_null());
    assert!(v["date"].is_null());

    let stub: HttpResult = serde_json::from_str(&out).unwrap();
    assert_eq!(stub.status, HttpResult::NO_STATUS);
}

#[test]
fn host_exception_is_cleared_and_boundary_reusable() {
    let mut host = ScriptedHost::sequence(
        vec![Reply::Throw("java.net.SocketTimeoutException".into())],
        success_reply(),
    );
    let b = bridge();

    let first = envelope(&b.new_expiring_purchase(&mut host, Some(PARAMS)));
    assert_eq!(first["status"], -1);
    assert!(first["error"].as_str().unwrap().contains("InvocationFailed"));
    assert!(!host.has_pending_fault());
    assert_eq!(host.cleared_faults, ["java.net.SocketTimeoutException"]);

    let second = envelope(&b.new_expiring_purchase(&mut host, Some(PARAMS)));
    assert_eq!(second["status"], 0);
    assert_eq!(host.requests.len(), 2);
}

#[test]
fn encoding_failure_reaches_engine_as_stub() {
    let mut host = ScriptedHost::always(success_reply());
    host.fail_transfer = true;
    let (v, _) = purchase(&mut host, Some(PARAMS));
    assert_eq!(v["status"], -1);
    assert!(v["error"].as_str().unwrap().contains("EncodingFailed"));
    assert!(host.requests.is_empty());
    assert!(!host.has_pending_fault());
}

#[test]
fn unreadable_result_reaches_engine_as_stub() {
    let mut host = ScriptedHost::always(Reply::Unreadable);
    let (v, _) = purchase(&mut host, Some(PARAMS));
    assert_eq!(v["status"], -1);
    assert!(v["error"].as_str().unwrap().contains("DecodingFailed"));
}

#[test]
fn host_strings_are_released() {
    for reply in [success_reply(), Reply::Null, Reply::Unreadable] {
        let mut host = ScriptedHost::always(reply);
        let _ = purchase(&mut host, Some(PARAMS));
        assert_eq!(host.live_strings(), 0);
    }
}

#[test]
fn adapter_is_rebuilt_per_call() {
    let b = bridge();
    let mut first = ScriptedHost::always(success_reply());
    let mut second = ScriptedHost::always(Reply::Null);

    assert_eq!(envelope(&b.new_expiring_purchase(&mut first, Some(PARAMS)))["status"], 0);
    assert_eq!(envelope(&b.new_expiring_purchase(&mut second, Some(PARAMS)))["status"], -1);

    // Each call reached only the host it was given.
    assert_eq!(first.requests.len(), 1);
    assert_eq!(second.requests.len(), 1);
}

// ---------------------------------------------------------------------------
// Error envelope and lifecycle
// ---------------------------------------------------------------------------

#[test]
fn wrapping_preserves_cause_text() {
    let cause = make_error!("token {} expired", "earner");
    let rendered_cause = cause.to_string();
    let wrapped = wrap_error!(wrap_error!(cause, "refresh failed"), "purchase failed");
    assert!(wrapped.to_string().contains(&rendered_cause));
    assert_eq!(wrapped.frames().count(), 3);
}

#[test]
fn static_binding_is_write_once() {
    static METHOD: Binding<&str> = Binding::new("makeHTTPRequest");
    assert_eq!(METHOD.get(), Err(LifecycleError::NotBound("makeHTTPRequest")));

    assert_eq!(METHOD.bind_with(|| Ok::<_, ()>("first")), Ok(&"first"));
    assert_eq!(METHOD.bind_with(|| Ok::<_, ()>("second")), Ok(&"first"));
    assert_eq!(METHOD.get(), Ok(&"first"));
}

#[test]
fn object_init_failure_is_wrapped() {
    let mut engine = LedgerEngine::new();
    engine.fail_init = true;
    let b = Bridge::new(engine, BridgeConfig::default());
    let err = b.object_init(Some("/data/psicash"), false).unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.starts_with("engine init failed"), "{rendered}");
    assert!(rendered.contains("failed to open datastore at /data/psicash"));
}

#[test]
fn uninitialised_engine_error_is_wrapped() {
    let b = Bridge::new(LedgerEngine::new(), BridgeConfig::default());
    let mut host = ScriptedHost::always(success_reply());
    let v = envelope(&b.new_expiring_purchase(&mut host, Some(PARAMS)));
    assert_eq!(v["status"], -1);
    let err = v["error"].as_str().unwrap();
    assert!(err.starts_with("engine new_expiring_purchase failed"), "{err}");
    assert!(err.contains("engine not initialised"), "{err}");
    assert!(host.requests.is_empty());
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn success_scenario_relays_purchase() {
    let mut host = ScriptedHost::always(success_reply());
    let (v, b) = purchase(&mut host, Some(PARAMS));
    assert_eq!(v["status"], 0);
    assert!(v["error"].is_null());
    assert_eq!(v["purchase"]["id"], "txn-0001");
    assert_eq!(v["purchase"]["transactionClass"], "subscription");
    assert_eq!(v["purchase"]["distinguisher"], "1month");
    assert_eq!(v["purchase"]["authorization"]["ID"], "auth-1");
    assert_eq!(b.engine().purchase_calls(), 1);
}

#[test]
fn null_result_scenario_is_invalid() {
    let mut host = ScriptedHost::always(Reply::Null);
    let (v, _) = purchase(&mut host, Some(PARAMS));
    assert_eq!(v["status"], -1);
    let err = v["error"].as_str().expect("error must be set");
    assert!(err.contains("request failed"), "{err}");
    assert!(err.contains("NullResult"), "{err}");
    assert!(v["purchase"].is_null());
}

#[test]
fn business_statuses_are_relayed() {
    for (http, status) in [(409, 1), (402, 2), (417, 3), (404, 4), (401, 5), (503, 6)] {
        let mut host = ScriptedHost::always(Reply::http(http, json!({})));
        let (v, _) = purchase(&mut host, Some(PARAMS));
        assert_eq!(v["status"], status, "http {http}");
        assert!(v["error"].is_null());
        assert!(v["purchase"].is_null());
    }
}

#[test]
fn engine_receives_request_and_config() {
    let config = BridgeConfig {
        user_agent: "Psiphon-PsiCash-Conformance".into(),
        ..BridgeConfig::default()
    };
    let b = Bridge::new(LedgerEngine::new(), config);
    b.object_init(Some("/data/psicash"), true).unwrap();

    let mut host = ScriptedHost::always(success_reply());
    envelope(&b.new_expiring_purchase(&mut host, Some(PARAMS)));

    let request: Value = serde_json::from_str(&host.requests[0]).unwrap();
    assert_eq!(request["method"], "POST");
    assert_eq!(request["path"], "/v1/transaction");
    assert_eq!(request["hostname"], "dev-api.psi.cash");
    assert_eq!(request["headers"]["User-Agent"], "Psiphon-PsiCash-Conformance");
    assert_eq!(request["query"][2], json!(["expectedAmount", "-100"]));
}

#[test]
fn non_ascii_purchase_is_escaped() {
    let mut host = ScriptedHost::always(success_reply());
    let params = r#"{"class":"speed-boost","distinguisher":"1hé","expectedPrice":1}"#;
    let b = bridge();
    let out = b.new_expiring_purchase(&mut host, Some(params));
    assert!(out.is_ascii(), "{out}");
    let v = envelope(&out);
    assert_eq!(v["purchase"]["distinguisher"], "1h\u{e9}");
}

#[test]
fn concurrent_calls_use_their_own_hosts() {
    let b = bridge();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let b = &b;
                s.spawn(move || {
                    let reply = if i % 2 == 0 { success_reply() } else { Reply::Null };
                    let mut host = ScriptedHost::always(reply);
                    let v = envelope(&b.new_expiring_purchase(&mut host, Some(PARAMS)));
                    (i, v["status"].as_i64(), host.requests.len())
                })
            })
            .collect();
        for h in handles {
            let (i, status, requests) = h.join().expect("worker panicked");
            let expected = if i % 2 == 0 { 0 } else { -1 };
            assert_eq!(status, Some(expected), "worker {i}");
            assert_eq!(requests, 1);
        }
    });
}

/// Host whose `makeHTTPRequest` reports that it was entered, then blocks
/// until released.
struct GatedHost {
    inner: ScriptedHost,
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

impl Host for GatedHost {
    type Str = HostString;

    fn transfer(&mut self, s: &str) -> Result<HostString, HostFault> {
        self.inner.transfer(s)
    }

    fn make_http_request(&mut self, params: &HostString) -> Result<Option<HostString>, HostFault> {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        self.inner.make_http_request(params)
    }

    fn read_back(&mut self, s: &HostString) -> Result<String, HostFault> {
        self.inner.read_back(s)
    }

    fn release(&mut self, s: HostString) {
        self.inner.release(s);
    }

    fn take_fault(&mut self) -> bool {
        self.inner.take_fault()
    }
}

#[test]
fn hung_host_blocks_only_its_own_call() {
    let b = bridge();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    thread::scope(|s| {
        let b = &b;
        let hung = s.spawn(move || {
            let mut host = GatedHost {
                inner: ScriptedHost::always(success_reply()),
                entered: entered_tx,
                release: release_rx,
            };
            envelope(&b.new_expiring_purchase(&mut host, Some(PARAMS)))["status"].as_i64()
        });
        entered_rx.recv().expect("first host never entered");

        s.spawn(move || {
            let mut host = ScriptedHost::always(Reply::Null);
            let v = envelope(&b.new_expiring_purchase(&mut host, Some(PARAMS)));
            let _ = done_tx.send(v["status"].as_i64());
        });

        let other = done_rx.recv_timeout(Duration::from_secs(5));
        release_tx.send(()).expect("first host gone");

        assert_eq!(other, Ok(Some(-1)), "second call blocked behind the hung host");
        assert_eq!(hung.join().expect("worker panicked"), Some(0));
    });
    assert_eq!(b.engine().purchase_calls(), 2);
}
