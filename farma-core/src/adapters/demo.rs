//! Demo backend for offline runs
//!
//! Seeds an [`InMemoryGateway`] with one shopper who is already signed in:
//! - a confirmed account (`demo@farma.local` / `demo1234`)
//! - a profile row with the current column names
//! - one saved delivery address

use serde_json::{json, Map, Value as JsonValue};

use super::InMemoryGateway;

pub const DEMO_USER_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const DEMO_EMAIL: &str = "demo@farma.local";
pub const DEMO_PASSWORD: &str = "demo1234";

/// In-memory backend holding the demo shopper, signed in
pub fn demo_gateway() -> InMemoryGateway {
    let gateway = InMemoryGateway::new();

    let mut metadata = Map::new();
    metadata.insert("name".into(), JsonValue::String("Demo Shopper".into()));
    metadata.insert("full_name".into(), JsonValue::String("Demo Shopper".into()));
    gateway.register_with_id(DEMO_USER_ID, DEMO_EMAIL, DEMO_PASSWORD, metadata);

    gateway.insert_profile_row(json!({
        "id": DEMO_USER_ID,
        "name": "Demo Shopper",
        "phone": "+91 98765 43210",
        "interests": "ayurveda, herbal teas",
        "subscribed_to_newsletters": true,
    }));
    gateway.insert_address(
        DEMO_USER_ID,
        json!({
            "id": 1,
            "user_id": DEMO_USER_ID,
            "line1": "12 MG Road",
            "city": "Pune",
            "postal_code": "411001",
            "is_default": true,
        }),
    );
    gateway.start_session(DEMO_EMAIL);
    gateway
}
