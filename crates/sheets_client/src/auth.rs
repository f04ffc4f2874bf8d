//! Service-account authentication for the Sheets API.
//!
//! Assertion format: RS256 JWT (`header.claims.signature`, base64url) built
//! from the account's credential blob and exchanged at the token endpoint
//! for a bearer token. Credentials are loaded once at construction and never
//! refreshed at runtime.

use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::Deserialize;
use serde_json::json;

use common::Error;

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Parsed service-account credential blob.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// Holds the account identity and the parsed RSA signing key.
#[derive(Clone)]
pub struct SheetsAuth {
    client_email: String,
    token_uri: String,
    signing_key: SigningKey<Sha256>,
}

impl std::fmt::Debug for SheetsAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsAuth")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

fn b64url(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

impl SheetsAuth {
    /// Create from a parsed credential key.
    ///
    /// The PEM string may contain literal `\n` (two chars) instead of real
    /// newlines — both forms are normalised.
    pub fn new(key: ServiceAccountKey) -> Result<Self, Error> {
        let pem = key.private_key.replace("\\n", "\n");
        let pem = pem.trim();

        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| Error::Unauthorized(format!("Failed to parse RSA private key: {e}")))?;

        Ok(Self {
            client_email: key.client_email,
            token_uri: key.token_uri,
            signing_key: SigningKey::<Sha256>::new(private_key),
        })
    }

    /// Create from the raw credential JSON blob.
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let key: ServiceAccountKey = serde_json::from_str(raw)
            .map_err(|e| Error::Unauthorized(format!("Invalid credential JSON: {e}")))?;
        Self::new(key)
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Build the signed OAuth JWT assertion for the spreadsheets scope.
    pub fn signed_assertion(&self) -> String {
        let now = chrono::Utc::now().timestamp();

        let header = json!({ "alg": "RS256", "typ": "JWT" });
        let claims = json!({
            "iss": self.client_email,
            "scope": SHEETS_SCOPE,
            "aud": self.token_uri,
            "iat": now,
            "exp": now + ASSERTION_LIFETIME_SECS,
        });

        let signing_input = format!(
            "{}.{}",
            b64url(header.to_string().as_bytes()),
            b64url(claims.to_string().as_bytes()),
        );

        let signature = self.signing_key.sign(signing_input.as_bytes());

        format!("{}.{}", signing_input, b64url(&signature.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> ServiceAccountKey {
        // Small test key — structure test only, not for production.
        let private_key =
            RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("keygen failed");
        let pem = rsa::pkcs8::EncodePrivateKey::to_pkcs8_pem(&private_key, rsa::pkcs8::LineEnding::LF)
            .expect("pem encode failed");

        ServiceAccountKey {
            client_email: "svc@test-project.iam.gserviceaccount.com".into(),
            private_key: pem.to_string(),
            token_uri: default_token_uri(),
        }
    }

    #[test]
    fn test_assertion_has_three_segments() {
        let auth = SheetsAuth::new(test_key()).expect("auth init failed");
        let assertion = auth.signed_assertion();

        let segments: Vec<&str> = assertion.split('.').collect();
        assert_eq!(segments.len(), 3, "JWT must be header.claims.signature");

        // RSA-2048 PKCS#1 v1.5 signature is 256 bytes.
        let sig = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(segments[2])
            .expect("signature should be base64url");
        assert_eq!(sig.len(), 256);
    }

    #[test]
    fn test_assertion_claims_carry_scope_and_issuer() {
        let auth = SheetsAuth::new(test_key()).expect("auth init failed");
        let assertion = auth.signed_assertion();

        let claims_raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(assertion.split('.').nth(1).unwrap())
            .expect("claims should be base64url");
        let claims: serde_json::Value = serde_json::from_slice(&claims_raw).unwrap();

        assert_eq!(claims["iss"], "svc@test-project.iam.gserviceaccount.com");
        assert_eq!(claims["scope"], SHEETS_SCOPE);
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
    }

    #[test]
    fn test_escaped_newlines_are_normalised() {
        let key = test_key();
        let escaped = ServiceAccountKey {
            private_key: key.private_key.replace('\n', "\\n"),
            ..key
        };
        assert!(SheetsAuth::new(escaped).is_ok());
    }

    #[test]
    fn test_bad_credential_is_unauthorized() {
        let err = SheetsAuth::from_json("{\"client_email\":\"x\",\"private_key\":\"garbage\"}")
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }
}
