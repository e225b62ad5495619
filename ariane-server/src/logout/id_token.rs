//! The IdP ID token kept in `cipher_id_token`, used only as a logout hint.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

/// Claims of an ID token issued by `issuer` to `client_id` that has not
/// expired. The signature is not checked: the IdP re-validates the token when
/// it is presented back as `id_token_hint`.
pub fn hint_claims(token: &str, issuer: &str, client_id: &str) -> Option<Map<String, Value>> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = true;
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[client_id]);

    match decode::<Map<String, Value>>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!(error = %e, "ID token hint rejected");
            None
        }
    }
}

pub fn email(claims: &Map<String, Value>) -> Option<String> {
    claims
        .get("email")
        .and_then(Value::as_str)
        .map(str::to_string)
}
