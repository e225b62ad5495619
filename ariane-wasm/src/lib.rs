//! WebAssembly bindings for the Ariane cookie signer.
//!
//! `sign` and `verify` match the JS signer's signatures, so the edge runtime
//! can swap this module in without touching callers. Tokens are identical
//! byte for byte.

use wasm_bindgen::prelude::*;

use ariane_core::read_session_at;

/// Initialize panic hook for better error messages in the console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Sign `value` as `base64url(value).base64url(hmac)`.
#[wasm_bindgen]
pub fn sign(value: &str, secret: &str) -> Result<String, JsError> {
    ariane_core::sign(value.as_bytes(), secret.as_bytes())
        .map(|token| token.encode())
        .map_err(|e| JsError::new(&e.to_string()))
}

/// The signed value, or `undefined` for any bad, tampered or foreign token.
#[wasm_bindgen]
pub fn verify(signed: &str, secret: &str) -> Option<String> {
    let payload = ariane_core::verify(signed, secret.as_bytes()).ok()?;
    String::from_utf8(payload).ok()
}

/// Session claims as JSON when `token` is a valid session at `now_ms`.
///
/// The clock comes from the caller (`Date.now()`); there is no system time
/// in the browser sandbox.
#[wasm_bindgen(js_name = verifySession)]
pub fn verify_session(token: &str, secret: &str, now_ms: f64) -> Option<String> {
    if !now_ms.is_finite() || now_ms < 0.0 {
        return None;
    }
    let session = read_session_at(token, secret.as_bytes(), now_ms as u64).ok()?;
    serde_json::to_string(&session).ok()
}

/// Get the library version.
#[wasm_bindgen(js_name = getVersion)]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
