//! JNI bindings for the PsiCash bridge.
//!
//! Exposes the entry points `ca.psiphon.psicashlib.PsiCashLib` declares as
//! `native`, and implements the bridge's [`Host`](psicash_bridge::Host)
//! seam over `JNIEnv` so the engine's HTTP requests are routed to the
//! instance method `makeHTTPRequest(String): String`.
//!
//! ## Java side
//!
//! ```java
//! public class PsiCashLib {
//!     static { System.loadLibrary("psicash_jni"); NativeStaticInit(); }
//!
//!     private static native boolean NativeStaticInit();
//!     private native String NativeObjectInit(String fileStoreRoot, boolean test);
//!     private native String NewExpiringPurchase(String paramsJson);
//!
//!     // Called from native code, on the calling thread, zero or more
//!     // times per NewExpiringPurchase call.
//!     private String makeHTTPRequest(String params) { ... }
//! }
//! ```
//!
//! ## Engine
//!
//! The ledger engine is linked in by the embedding library, which must call
//! [`install_engine`] once before `NativeObjectInit` runs.
//!
//! Every entry point converts failures (including panics) into its return
//! value; nothing unwinds into the JVM.

mod host;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use jni::objects::{GlobalRef, JClass, JMethodID, JObject, JString};
use jni::sys::{jboolean, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use psicash_bridge::{
    invalid_response, make_error, Binding, Bridge, BridgeConfig, Engine, ErrorValue,
    LifecycleError,
};

pub use host::JniHost;

const HTTP_REQUEST_FN_NAME: &str = "makeHTTPRequest";
const HTTP_REQUEST_FN_SIG: &str = "(Ljava/lang/String;)Ljava/lang/String;";

type DynEngine = Box<dyn Engine + Send + Sync>;

/// The resolved `makeHTTPRequest` method.  The class reference is held
/// globally so the method id stays valid.
struct HostMethod {
    _class: GlobalRef,
    make_http_request: JMethodID,
}

static HOST_METHOD: Binding<HostMethod> = Binding::new(HTTP_REQUEST_FN_NAME);
static BRIDGE: Binding<Bridge<DynEngine>> = Binding::new("engine");

/// Install the process-wide engine.
///
/// Returns `false` if an engine was already installed; the first one stays.
pub fn install_engine(engine: impl Engine + Send + Sync + 'static) -> bool {
    let mut installed = false;
    let _ = BRIDGE.bind_with(|| {
        installed = true;
        Ok::<_, LifecycleError>(Bridge::new(
            Box::new(engine) as DynEngine,
            BridgeConfig::from_env(),
        ))
    });
    installed
}

fn bridge() -> Result<&'static Bridge<DynEngine>, ErrorValue> {
    BRIDGE
        .get()
        .map_err(|_| make_error!("{}", LifecycleError::EngineMissing))
}

/// One-time initialisation called at the start of every exported function.
///
/// Installs a `tracing` fmt subscriber filtered by `PSICASH_LOG` when the
/// `fmt-logging` feature is enabled.
fn setup() {
    #[cfg(feature = "fmt-logging")]
    {
        static LOGGING: std::sync::Once = std::sync::Once::new();
        LOGGING.call_once(|| {
            use tracing_subscriber::EnvFilter;

            let filter = EnvFilter::try_new(BridgeConfig::from_env().log_filter)
                .unwrap_or_else(|_| EnvFilter::new(psicash_bridge::config::DEFAULT_LOG_FILTER));
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        });
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Resolve and cache `makeHTTPRequest` on the calling class.
///
/// Returns false if the class has no method of the expected shape; no other
/// entry point may be used in that case.  Calling it again after success
/// keeps the first binding.
#[no_mangle]
pub extern "system" fn Java_ca_psiphon_psicashlib_PsiCashLib_NativeStaticInit<'local>(
    mut env: JNIEnv<'local>,
    class: JClass<'local>,
) -> jboolean {
    setup();
    let bound = guarded(
        "NativeStaticInit",
        || {
            HOST_METHOD
                .bind_with(|| resolve_host_method(&mut env, &class))
                .inspect_err(|e| tracing::error!("static init failed: {e}"))
                .is_ok()
        },
        |_| false,
    );
    if bound {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

/// Configure the engine.  Returns null on success or an error message.
#[no_mangle]
pub extern "system" fn Java_ca_psiphon_psicashlib_PsiCashLib_NativeObjectInit<'local>(
    mut env: JNIEnv<'local>,
    _this: JObject<'local>,
    file_store_root: JString<'local>,
    test: jboolean,
) -> jstring {
    setup();
    let outcome = guarded(
        "NativeObjectInit",
        || object_init(&mut env, &file_store_root, test != JNI_FALSE),
        Err,
    );
    match outcome {
        Ok(()) => ptr::null_mut(),
        Err(err) => {
            tracing::error!("object init failed: {err}");
            new_jstring(&mut env, &err.to_string())
        }
    }
}

/// Create an expiring purchase.
///
/// Input `{"class", "distinguisher", "expectedPrice"}`; output
/// `{"status", "error", "purchase"}` (see `psicash_bridge::ResponseEnvelope`).
#[no_mangle]
pub extern "system" fn Java_ca_psiphon_psicashlib_PsiCashLib_NewExpiringPurchase<'local>(
    mut env: JNIEnv<'local>,
    this: JObject<'local>,
    params_json: JString<'local>,
) -> jstring {
    setup();
    let response = guarded(
        "NewExpiringPurchase",
        || new_expiring_purchase(&mut env, &this, &params_json),
        |err| invalid_response(&err),
    );
    new_jstring(&mut env, &response)
}

// ── Entry point bodies ────────────────────────────────────────────────────────

fn resolve_host_method(env: &mut JNIEnv, class: &JClass) -> Result<HostMethod, ErrorValue> {
    let make_http_request = env
        .get_method_id(class, HTTP_REQUEST_FN_NAME, HTTP_REQUEST_FN_SIG)
        .map_err(|e| {
            clear_pending_exception(env);
            make_error!("GetMethodID({HTTP_REQUEST_FN_NAME}) failed: {e}")
        })?;
    let class = env.new_global_ref(class).map_err(|e| {
        clear_pending_exception(env);
        make_error!("NewGlobalRef failed: {e}")
    })?;
    tracing::debug!("bound {HTTP_REQUEST_FN_NAME}{HTTP_REQUEST_FN_SIG}");
    Ok(HostMethod {
        _class: class,
        make_http_request,
    })
}

fn object_init(env: &mut JNIEnv, file_store_root: &JString, test: bool) -> Result<(), ErrorValue> {
    let bridge = bridge()?;
    let root = jstring_to_string(env, file_store_root)
        .map_err(|e| make_error!("reading file_store_root failed: {e}"))?;
    bridge.object_init(root.as_deref(), test)
}

fn new_expiring_purchase<'local>(
    env: &mut JNIEnv<'local>,
    this: &JObject<'local>,
    params_json: &JString<'local>,
) -> String {
    let params = match jstring_to_string(env, params_json) {
        Ok(params) => params,
        Err(e) => return invalid_response(&make_error!("reading params json failed: {e}")),
    };
    let method = match HOST_METHOD.get() {
        Ok(method) => method.make_http_request,
        Err(e) => return invalid_response(&make_error!("{e}")),
    };
    let bridge = match bridge() {
        Ok(bridge) => bridge,
        Err(e) => return invalid_response(&e),
    };

    let mut host = JniHost::new(env, this, method);
    bridge.new_expiring_purchase(&mut host, params.as_deref())
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Run an entry point body, turning a panic into `on_panic`'s value.
fn guarded<T>(
    entry: &str,
    body: impl FnOnce() -> T,
    on_panic: impl FnOnce(ErrorValue) -> T,
) -> T {
    catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| {
        let err = make_error!("panic in {entry}: {}", panic_message(payload.as_ref()));
        tracing::error!("{err}");
        on_panic(err)
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Describe (to logcat) and clear a pending Java exception.  Returns whether
/// there was one.
pub(crate) fn clear_pending_exception(env: &mut JNIEnv) -> bool {
    match env.exception_check() {
        Ok(false) => false,
        Ok(true) | Err(_) => {
            let _ = env.exception_describe();
            let _ = env.exception_clear();
            true
        }
    }
}

/// Copy a Java string.  A null reference is `None`, not an empty string.
fn jstring_to_string(env: &mut JNIEnv, s: &JString) -> Result<Option<String>, jni::errors::Error> {
    if s.is_null() {
        return Ok(None);
    }
    match env.get_string(s) {
        Ok(chars) => Ok(Some(chars.into())),
        Err(e) => {
            clear_pending_exception(env);
            Err(e)
        }
    }
}

/// Hand a Rust string to Java.  Yields null if the JVM cannot allocate it.
fn new_jstring(env: &mut JNIEnv, s: &str) -> jstring {
    match env.new_string(s) {
        Ok(js) => js.into_raw(),
        Err(e) => {
            clear_pending_exception(env);
            tracing::error!("NewStringUTF failed: {e}");
            ptr::null_mut()
        }
    }
}
