//! Shared helpers for the PsiCash bridge conformance suite.
//!
//! Provides two in-process stand-ins for the bridge's external collaborators:
//!
//! - [`ScriptedHost`]: a [`Host`] whose `makeHTTPRequest` replies are
//!   scripted per call, including host exceptions, null returns and
//!   unreadable strings.  It tracks live string handles and pending faults
//!   so tests can assert the adapter releases and clears them.
//! - [`LedgerEngine`]: an [`Engine`] that speaks a small slice of the
//!   PsiCash transaction API through the HTTP capability it is handed,
//!   mapping server responses onto [`Status`] the way the real engine does.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use psicash_bridge::{
    make_error, Engine, ErrorValue, Host, HostFault, HttpResult, MakeHttpRequest, PurchaseResult,
    Status,
};
use serde::Deserialize;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// ScriptedHost
// ---------------------------------------------------------------------------

/// What the host does when `makeHTTPRequest` is invoked.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Return this string.
    Body(String),
    /// Return null without raising.
    Null,
    /// Raise an exception (left pending until the bridge clears it).
    Throw(String),
    /// Return a string that cannot be read back.
    Unreadable,
}

impl Reply {
    /// A well-formed HTTP result with the given status and body.
    pub fn http(status: i32, body: Value) -> Self {
        let result = HttpResult {
            status,
            error: None,
            body: Some(body.to_string()),
            date: Some("2024-05-01T12:00:00.000Z".into()),
        };
        Reply::Body(serde_json::to_string(&result).unwrap_or_default())
    }
}

/// Handle to a string owned by a [`ScriptedHost`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct HostString(u64);

/// In-memory [`Host`] driven by a script of [`Reply`] values.
///
/// Once the script is exhausted, `fallback` answers every further call.
#[derive(Debug)]
pub struct ScriptedHost {
    script: VecDeque<Reply>,
    fallback: Reply,
    strings: HashMap<u64, Option<String>>,
    next_handle: u64,
    pending_fault: Option<String>,

    /// Refuse to accept request strings (allocation failure).
    pub fail_transfer: bool,
    /// Every request string the host received, in order.
    pub requests: Vec<String>,
    /// Exceptions the bridge observed and cleared.
    pub cleared_faults: Vec<String>,
}

impl ScriptedHost {
    /// Answer every call with `reply`.
    pub fn always(reply: Reply) -> Self {
        Self::sequence(Vec::new(), reply)
    }

    /// Answer calls with `script` in order, then with `fallback`.
    pub fn sequence(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: script.into(),
            fallback,
            strings: HashMap::new(),
            next_handle: 0,
            pending_fault: None,
            fail_transfer: false,
            requests: Vec::new(),
            cleared_faults: Vec::new(),
        }
    }

    /// Number of host strings not yet released.
    pub fn live_strings(&self) -> usize {
        self.strings.len()
    }

    /// Whether an exception is still pending.
    pub fn has_pending_fault(&self) -> bool {
        self.pending_fault.is_some()
    }

    fn alloc(&mut self, s: Option<String>) -> HostString {
        self.next_handle += 1;
        self.strings.insert(self.next_handle, s);
        HostString(self.next_handle)
    }
}

impl Host for ScriptedHost {
    type Str = HostString;

    fn transfer(&mut self, s: &str) -> Result<HostString, HostFault> {
        if self.fail_transfer {
            self.pending_fault = Some("java.lang.OutOfMemoryError".into());
            return Err(HostFault("NewStringUTF failed".into()));
        }
        Ok(self.alloc(Some(s.to_string())))
    }

    fn make_http_request(&mut self, params: &HostString) -> Result<Option<HostString>, HostFault> {
        let request = self
            .strings
            .get(&params.0)
            .cloned()
            .flatten()
            .ok_or_else(|| HostFault("stale request handle".into()))?;
        self.requests.push(request);

        match self.script.pop_front().unwrap_or_else(|| self.fallback.clone()) {
            Reply::Body(body) => Ok(Some(self.alloc(Some(body)))),
            Reply::Null => Ok(None),
            Reply::Throw(exception) => {
                self.pending_fault = Some(exception.clone());
                Err(HostFault(format!("JavaException: {exception}")))
            }
            Reply::Unreadable => Ok(Some(self.alloc(None))),
        }
    }

    fn read_back(&mut self, s: &HostString) -> Result<String, HostFault> {
        self.strings
            .get(&s.0)
            .cloned()
            .flatten()
            .ok_or_else(|| HostFault("GetStringUTFChars failed".into()))
    }

    fn release(&mut self, s: HostString) {
        self.strings.remove(&s.0);
    }

    fn take_fault(&mut self) -> bool {
        match self.pending_fault.take() {
            Some(exception) => {
                self.cleared_faults.push(exception);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// LedgerEngine
// ---------------------------------------------------------------------------

/// Arguments the engine was last initialised with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitArgs {
    pub user_agent: String,
    pub storage_root: String,
    pub test_mode: bool,
}

/// Success body of `POST /v1/transaction`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TransactionBody {
    #[serde(rename = "TransactionID")]
    transaction_id: String,
    server_time_expiry: Option<String>,
    authorization: Option<Value>,
}

/// Fake ledger engine speaking the transaction endpoint over the supplied
/// HTTP capability.
///
/// State sits behind its own locks, which are never held across a request.
#[derive(Debug, Default)]
pub struct LedgerEngine {
    init_args: RwLock<Option<InitArgs>>,
    pub fail_init: bool,
    purchase_calls: AtomicUsize,
}

impl LedgerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine already initialised with a throwaway storage root.
    pub fn initialised() -> Self {
        Self {
            init_args: RwLock::new(Some(InitArgs {
                user_agent: "conformance".into(),
                storage_root: "/tmp/psicash-conformance".into(),
                test_mode: true,
            })),
            ..Self::default()
        }
    }

    /// Arguments of the last successful init.
    pub fn init_args(&self) -> Option<InitArgs> {
        self.init_args
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Purchase calls that reached the engine.
    pub fn purchase_calls(&self) -> usize {
        self.purchase_calls.load(Ordering::SeqCst)
    }

    fn request_params(
        init: &InitArgs,
        class: &str,
        distinguisher: &str,
        expected_price: i64,
    ) -> Value {
        let hostname = if init.test_mode {
            "dev-api.psi.cash"
        } else {
            "api.psi.cash"
        };
        json!({
            "scheme": "https",
            "hostname": hostname,
            "port": 443,
            "method": "POST",
            "path": "/v1/transaction",
            "query": [
                ["class", class],
                ["distinguisher", distinguisher],
                ["expectedAmount", (-expected_price).to_string()],
            ],
            "headers": { "User-Agent": init.user_agent },
        })
    }
}

impl Engine for LedgerEngine {
    fn init(&self, user_agent: &str, storage_root: &str, test_mode: bool) -> Result<(), ErrorValue> {
        if self.fail_init {
            return Err(make_error!("failed to open datastore at {storage_root}"));
        }
        *self.init_args.write().unwrap_or_else(PoisonError::into_inner) = Some(InitArgs {
            user_agent: user_agent.into(),
            storage_root: storage_root.into(),
            test_mode,
        });
        Ok(())
    }

    fn new_expiring_purchase(
        &self,
        http: &mut dyn MakeHttpRequest,
        transaction_class: &str,
        distinguisher: &str,
        expected_price: i64,
    ) -> Result<PurchaseResult, ErrorValue> {
        let init = self
            .init_args()
            .ok_or_else(|| make_error!("engine not initialised"))?;
        self.purchase_calls.fetch_add(1, Ordering::SeqCst);

        let params = Self::request_params(&init, transaction_class, distinguisher, expected_price);
        let raw = http.make_http_request(&params.to_string());
        let result: HttpResult = serde_json::from_str(&raw)
            .map_err(|e| make_error!("http result parse failed: {e}"))?;

        if result.status == HttpResult::NO_STATUS {
            return Err(make_error!(
                "request failed: {}",
                result.error.unwrap_or_else(|| "no error given".into())
            ));
        }

        tracing::debug!(status = result.status, "transaction response");

        let status = match result.status {
            200 => Status::Success,
            409 => Status::ExistingTransaction,
            402 => Status::InsufficientBalance,
            417 => Status::TransactionAmountMismatch,
            404 => Status::TransactionTypeNotFound,
            401 => Status::InvalidTokens,
            500..=599 => Status::ServerError,
            other => return Err(make_error!("unexpected response status {other}")),
        };

        let purchase = if status == Status::Success {
            let body = result
                .body
                .as_deref()
                .ok_or_else(|| make_error!("success response has no body"))?;
            let body: TransactionBody = serde_json::from_str(body)
                .map_err(|e| make_error!("transaction body parse failed: {e}"))?;
            Some(json!({
                "id": body.transaction_id,
                "transactionClass": transaction_class,
                "distinguisher": distinguisher,
                "serverTimeExpiry": body.server_time_expiry,
                "authorization": body.authorization,
            }))
        } else {
            None
        };

        Ok(PurchaseResult { status, purchase })
    }
}
