//! [`Host`] over a live `JNIEnv`.

use std::borrow::Cow;

use jni::objects::{JMethodID, JObject, JString};
use jni::signature::ReturnType;
use jni::sys::jvalue;
use jni::JNIEnv;
use psicash_bridge::{Host, HostFault};

/// The boundary primitives of one JNI entry-point call.
///
/// Borrows the call's `JNIEnv` and `this` reference, which are only valid
/// until the entry point returns.
pub struct JniHost<'a, 'local> {
    env: &'a mut JNIEnv<'local>,
    this: &'a JObject<'local>,
    make_http_request: JMethodID,
}

impl<'a, 'local> JniHost<'a, 'local> {
    pub fn new(
        env: &'a mut JNIEnv<'local>,
        this: &'a JObject<'local>,
        make_http_request: JMethodID,
    ) -> Self {
        Self {
            env,
            this,
            make_http_request,
        }
    }
}

fn fault(e: jni::errors::Error) -> HostFault {
    HostFault(e.to_string())
}

/// Strictly decode the JVM's modified UTF-8.  Malformed input is a fault,
/// not a string with replacement characters.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Result<String, HostFault> {
    cesu8::from_java_cesu8(bytes)
        .map(Cow::into_owned)
        .map_err(|e| HostFault(format!("GetStringUTFChars returned {e}")))
}

impl<'local> Host for JniHost<'_, 'local> {
    type Str = JString<'local>;

    fn transfer(&mut self, s: &str) -> Result<JString<'local>, HostFault> {
        self.env.new_string(s).map_err(fault)
    }

    fn make_http_request(
        &mut self,
        params: &JString<'local>,
    ) -> Result<Option<JString<'local>>, HostFault> {
        let args = [jvalue { l: params.as_raw() }];
        // SAFETY: the method id was resolved against the receiver's class
        // with signature (Ljava/lang/String;)Ljava/lang/String;, and the
        // single argument is a live String reference.
        let value = unsafe {
            self.env
                .call_method_unchecked(self.this, self.make_http_request, ReturnType::Object, &args)
        }
        .map_err(fault)?;

        let obj = value.l().map_err(fault)?;
        if obj.is_null() {
            return Ok(None);
        }
        Ok(Some(JString::from(obj)))
    }

    fn read_back(&mut self, s: &JString<'local>) -> Result<String, HostFault> {
        // Dropping the JavaStr releases the UTF chars.
        let chars = self.env.get_string(s).map_err(fault)?;
        decode_modified_utf8(chars.to_bytes())
    }

    fn release(&mut self, s: JString<'local>) {
        if let Err(e) = self.env.delete_local_ref(s) {
            tracing::debug!("delete_local_ref failed: {e}");
        }
    }

    fn take_fault(&mut self) -> bool {
        crate::clear_pending_exception(self.env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_and_modified_utf8() {
        assert_eq!(decode_modified_utf8(b"{\"status\":200}").unwrap(), r#"{"status":200}"#);
        assert_eq!(decode_modified_utf8("caf\u{e9}".as_bytes()).unwrap(), "caf\u{e9}");
        // U+1F600 as a surrogate pair, and an encoded NUL.
        let bytes = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80, 0xC0, 0x80];
        assert_eq!(decode_modified_utf8(&bytes).unwrap(), "\u{1F600}\0");
    }

    #[test]
    fn malformed_bytes_are_a_fault() {
        let err = decode_modified_utf8(&[b'{', 0xFF, b'}']).unwrap_err();
        assert!(err.0.starts_with("GetStringUTFChars returned"), "{err}");
    }
}
