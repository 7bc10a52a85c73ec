//! Integration tests for the YSS storefront.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the Firebase emulators
//! firebase emulators:start --only auth,firestore
//!
//! # Start the storefront against them
//! FIRESTORE_EMULATOR_HOST=127.0.0.1:8080 \
//! FIREBASE_AUTH_EMULATOR_HOST=127.0.0.1:9099 \
//! cargo run -p yss-storefront
//!
//! # Run the ignored tests
//! cargo test -p yss-integration-tests -- --ignored
//! ```
//!
//! Each test signs up a fresh emulator account, so tests never share a cart.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use yss_core::Cart;
use yss_storefront::firebase::value::to_fields;

/// Emulator admin token; bypasses security rules on the Firestore emulator.
const EMULATOR_OWNER_TOKEN: &str = "owner";

const PASSWORD: &str = "integration-pass-1";

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Endpoints of the running storefront and emulators.
#[derive(Debug, Clone)]
pub struct TestContext {
    pub storefront_url: String,
    pub auth_host: String,
    pub firestore_host: String,
    pub project_id: String,
    admin: Client,
}

/// An emulator account created for one test.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub uid: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
}

impl TestContext {
    /// Read endpoints from the environment, defaulting to the emulator
    /// suite's standard ports.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            storefront_url: env_or("STOREFRONT_BASE_URL", "http://localhost:3000"),
            auth_host: env_or("FIREBASE_AUTH_EMULATOR_HOST", "127.0.0.1:9099"),
            firestore_host: env_or("FIRESTORE_EMULATOR_HOST", "127.0.0.1:8080"),
            project_id: env_or("FIREBASE_PROJECT_ID", "demo-yss"),
            admin: Client::new(),
        }
    }

    /// A browser-like client: keeps cookies, does not follow redirects.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn browser(&self) -> Client {
        Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client")
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.storefront_url)
    }

    /// Create a fresh email/password account on the auth emulator.
    ///
    /// # Panics
    ///
    /// Panics if the emulator rejects the sign-up.
    pub async fn create_user(&self) -> TestUser {
        let email = format!("shopper-{}@example.com", Uuid::new_v4().simple());
        let response = self
            .admin
            .post(format!(
                "http://{}/identitytoolkit.googleapis.com/v1/accounts:signUp?key=fake-api-key",
                self.auth_host
            ))
            .json(&json!({
                "email": email,
                "password": PASSWORD,
                "returnSecureToken": true,
            }))
            .send()
            .await
            .expect("Failed to reach auth emulator");
        assert!(response.status().is_success(), "sign-up failed");

        let body: SignUpResponse = response.json().await.expect("Invalid sign-up response");
        TestUser {
            uid: body.local_id,
            email,
            password: PASSWORD.to_string(),
        }
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "http://{}/v1/projects/{}/databases/(default)/documents/{collection}/{id}",
            self.firestore_host, self.project_id
        )
    }

    /// Write a document directly, bypassing security rules.
    ///
    /// # Panics
    ///
    /// Panics if the emulator rejects the write.
    pub async fn put_document(&self, collection: &str, id: &str, data: &Value) {
        let fields = to_fields(data).expect("Failed to encode document");
        let response = self
            .admin
            .patch(self.document_url(collection, id))
            .bearer_auth(EMULATOR_OWNER_TOKEN)
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .expect("Failed to reach Firestore emulator");
        assert!(response.status().is_success(), "document write failed");
    }

    /// Seed the user's cart document.
    ///
    /// # Panics
    ///
    /// Panics if the cart cannot be encoded or written.
    pub async fn seed_cart(&self, uid: &str, cart: &Cart) {
        let data = serde_json::to_value(cart).expect("Failed to serialize cart");
        self.put_document("carts", uid, &data).await;
    }

    /// Read a document's raw fields, bypassing security rules.
    ///
    /// # Panics
    ///
    /// Panics if the emulator cannot be reached.
    pub async fn get_document(&self, collection: &str, id: &str) -> Value {
        self.admin
            .get(self.document_url(collection, id))
            .bearer_auth(EMULATOR_OWNER_TOKEN)
            .send()
            .await
            .expect("Failed to reach Firestore emulator")
            .json()
            .await
            .expect("Invalid document response")
    }

    /// Sign in through the storefront's login form.
    ///
    /// # Panics
    ///
    /// Panics if the storefront cannot be reached.
    pub async fn sign_in(&self, browser: &Client, user: &TestUser) -> reqwest::Response {
        browser
            .post(self.url("/login"))
            .form(&[("email", user.email.as_str()), ("password", user.password.as_str())])
            .send()
            .await
            .expect("Failed to reach storefront")
    }
}
