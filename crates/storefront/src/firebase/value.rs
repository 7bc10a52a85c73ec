//! Conversion between plain JSON and Firestore's typed `Value` JSON.
//!
//! The REST API wraps every field in a single-key object naming its type:
//!
//! ```text
//! {"stringValue": "Tee"}                  <->  "Tee"
//! {"integerValue": "2"}                   <->  2
//! {"doubleValue": 799.5}                  <->  799.5
//! {"arrayValue": {"values": [...]}}       <->  [...]
//! {"mapValue": {"fields": {...}}}         <->  {...}
//! ```
//!
//! Decoded documents are fed through `serde_json::from_value` into domain
//! types, and domain types go through `serde_json::to_value` before encoding.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value, json};

use super::FirebaseError;

/// Decode a Firestore `fields` map into a JSON object.
///
/// # Errors
///
/// Returns [`FirebaseError::Codec`] if any value is malformed.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Value, FirebaseError> {
    let mut out = Map::with_capacity(fields.len());
    for (key, value) in fields {
        out.insert(key.clone(), decode_value(value)?);
    }
    Ok(Value::Object(out))
}

/// Decode a Firestore `fields` map straight into `T`.
///
/// # Errors
///
/// Returns a codec error for malformed values, or a parse error if the
/// decoded JSON does not match `T`.
pub fn from_fields<T: DeserializeOwned>(fields: &Map<String, Value>) -> Result<T, FirebaseError> {
    Ok(serde_json::from_value(decode_fields(fields)?)?)
}

/// Decode a single Firestore value.
///
/// # Errors
///
/// Returns [`FirebaseError::Codec`] if the value is not a single-key typed
/// object or the payload does not match the type.
pub fn decode_value(value: &Value) -> Result<Value, FirebaseError> {
    let Value::Object(obj) = value else {
        return Err(codec_error("expected a typed value object", value));
    };
    let Some((kind, inner)) = obj.iter().next() else {
        return Err(codec_error("empty value object", value));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| codec_error("booleanValue is not a bool", inner)),
        "integerValue" => decode_integer(inner),
        "doubleValue" => Ok(decode_double(inner)),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| codec_error("expected a string payload", inner)),
        "geoPointValue" => Ok(json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        })),
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>, _>>()?,
                Some(other) => return Err(codec_error("arrayValue.values is not a list", other)),
                None => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => decode_fields(fields),
            Some(other) => Err(codec_error("mapValue.fields is not an object", other)),
            None => Ok(Value::Object(Map::new())),
        },
        other => Err(FirebaseError::Codec(format!("unknown value type `{other}`"))),
    }
}

/// Integers travel as decimal strings (int64 does not fit a JSON double).
fn decode_integer(inner: &Value) -> Result<Value, FirebaseError> {
    match inner {
        Value::String(s) => s
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| codec_error("integerValue is not an int64", inner)),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::Number(n.clone())),
        _ => Err(codec_error("integerValue is not an int64", inner)),
    }
}

/// Doubles are numbers, except the non-finite ones which arrive as strings.
fn decode_double(inner: &Value) -> Value {
    match inner {
        Value::Number(n) => Value::Number(n.clone()),
        Value::String(s) => s
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        _ => Value::Null,
    }
}

fn codec_error(what: &str, value: &Value) -> FirebaseError {
    FirebaseError::Codec(format!("{what}: {}", super::preview(&value.to_string())))
}

/// Encode a JSON value as a Firestore value.
#[must_use]
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                // Above i64::MAX: Firestore cannot store it as an integer.
                #[allow(clippy::cast_precision_loss)]
                let f = u as f64;
                json!({ "doubleValue": f })
            } else {
                json!({ "doubleValue": n })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_map(map) } }),
    }
}

fn encode_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Serialize `T` and encode it as a Firestore `fields` map.
///
/// # Errors
///
/// Returns an error if `T` does not serialize to a JSON object.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>, FirebaseError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(encode_map(&map)),
        other => Err(codec_error("document body must be an object", &other)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use yss_core::Cart;

    fn cart_document_fields() -> Map<String, Value> {
        let doc = json!({
            "items": {"arrayValue": {"values": [
                {"mapValue": {"fields": {
                    "id": {"stringValue": "tee"},
                    "name": {"stringValue": "Oversized Tee"},
                    "image": {"stringValue": "https://img/tee.png"},
                    "price": {"doubleValue": 799.5},
                    "size": {"stringValue": "M"},
                    "quantity": {"integerValue": "2"}
                }}},
                {"mapValue": {"fields": {
                    "id": {"stringValue": "cap"},
                    "name": {"stringValue": "Cap"},
                    "price": {"integerValue": "450"},
                    "quantity": {"integerValue": "1"}
                }}}
            ]}}
        });
        doc.as_object().unwrap().clone()
    }

    #[test]
    fn test_decode_cart_document() {
        let cart: Cart = from_fields(&cart_document_fields()).unwrap();

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.items[0].price, Decimal::new(7995, 1));
        assert_eq!(cart.items[1].price, Decimal::from(450));
        assert_eq!(cart.subtotal(), Decimal::from(2049));
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_value(&json!({"nullValue": null})).unwrap(), Value::Null);
        assert_eq!(decode_value(&json!({"booleanValue": true})).unwrap(), json!(true));
        assert_eq!(
            decode_value(&json!({"integerValue": "-42"})).unwrap(),
            json!(-42)
        );
        assert_eq!(
            decode_value(&json!({"timestampValue": "2024-12-20T10:00:00Z"})).unwrap(),
            json!("2024-12-20T10:00:00Z")
        );
        assert_eq!(
            decode_value(&json!({"geoPointValue": {"latitude": 14.6, "longitude": 121.0}}))
                .unwrap(),
            json!({"latitude": 14.6, "longitude": 121.0})
        );
    }

    #[test]
    fn test_decode_non_finite_double_is_null() {
        assert_eq!(decode_value(&json!({"doubleValue": "NaN"})).unwrap(), Value::Null);
        assert_eq!(
            decode_value(&json!({"doubleValue": "Infinity"})).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_decode_empty_containers() {
        assert_eq!(decode_value(&json!({"arrayValue": {}})).unwrap(), json!([]));
        assert_eq!(decode_value(&json!({"mapValue": {}})).unwrap(), json!({}));
    }

    #[test]
    fn test_decode_rejects_malformed_values() {
        assert!(decode_value(&json!("bare string")).is_err());
        assert!(decode_value(&json!({})).is_err());
        assert!(decode_value(&json!({"integerValue": "12.5"})).is_err());
        assert!(decode_value(&json!({"mysteryValue": 1})).is_err());
    }

    #[test]
    fn test_encode_distinguishes_integers_from_doubles() {
        assert_eq!(encode_value(&json!(2)), json!({"integerValue": "2"}));
        assert_eq!(encode_value(&json!(799.5)), json!({"doubleValue": 799.5}));
        assert_eq!(
            encode_value(&json!(["a", null])),
            json!({"arrayValue": {"values": [
                {"stringValue": "a"},
                {"nullValue": null}
            ]}})
        );
    }

    #[test]
    fn test_encoded_cart_decodes_to_same_cart() {
        let cart: Cart = from_fields(&cart_document_fields()).unwrap();
        let fields = to_fields(&cart).unwrap();

        // Fractional prices stay doubles, whole ones stay integers.
        let second_price = &fields["items"]["arrayValue"]["values"][1]["mapValue"]["fields"]["price"];
        assert_eq!(second_price, &json!({"integerValue": "450"}));
        let first_price = &fields["items"]["arrayValue"]["values"][0]["mapValue"]["fields"]["price"];
        assert!(first_price.get("doubleValue").is_some());

        let again: Cart = from_fields(&fields).unwrap();
        assert_eq!(again, cart);
    }

    #[test]
    fn test_rewritten_items_keep_stored_fields() {
        let kept = json!({"mapValue": {"fields": {
            "id": {"stringValue": "tee"},
            "name": {"stringValue": "Oversized Tee"},
            "imageUrl": {"stringValue": "https://img/tee.png"},
            "price": {"integerValue": "799"},
            "size": {"stringValue": "M"},
            "quantity": {"integerValue": "2"},
            "color": {"stringValue": "black"},
            "giftWrap": {"booleanValue": true},
            "variant": {"mapValue": {"fields": {
                "sku": {"stringValue": "TEE-M-BLK"},
                "weight": {"doubleValue": 0.25}
            }}}
        }}});
        let removed = json!({"mapValue": {"fields": {
            "id": {"stringValue": "cap"},
            "name": {"stringValue": "Cap"},
            "price": {"integerValue": "450"},
            "quantity": {"integerValue": "1"}
        }}});
        let stored = json!({"items": {"arrayValue": {"values": [kept.clone(), removed]}}});

        let cart: Cart = from_fields(stored.as_object().unwrap()).unwrap();
        let written = to_fields(&cart.without_item(&yss_core::CartItemId::new("cap"))).unwrap();

        assert_eq!(written["items"], json!({"arrayValue": {"values": [kept]}}));
    }

    #[test]
    fn test_to_fields_requires_object() {
        assert!(to_fields(&vec![1, 2, 3]).is_err());
    }
}
