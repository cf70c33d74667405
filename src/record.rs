//! Tracking records and the derivation of a request identifier from the
//! different shapes a caller may hand to [`crate::context::start_tracking`].

use std::{collections::BTreeMap, fmt, ops::RangeInclusive};

use md5::{Digest, Md5};
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{error::TrackingError, request::RequestLike};

/// Key under which the request identifier is stored.
pub const REQ_ID_KEY: &str = "reqId";

/// Key of a nested request inside a field map. Never copied into a record.
pub const REQ_KEY: &str = "req";

const RANDOM_REQ_IDS: RangeInclusive<i64> = 1..=10_000;

/// Identity of a tracked request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ReqId {
    Number(i64),
    Text(String),
    /// Hex encoded MD5 of a request dump, see [`fingerprint`].
    Digest(String),
}

impl fmt::Display for ReqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReqId::Number(id) => write!(f, "{id}"),
            ReqId::Text(id) | ReqId::Digest(id) => f.write_str(id),
        }
    }
}

impl From<i64> for ReqId {
    fn from(id: i64) -> Self {
        ReqId::Number(id)
    }
}

impl From<&str> for ReqId {
    fn from(id: &str) -> Self {
        ReqId::Text(id.to_owned())
    }
}

impl From<String> for ReqId {
    fn from(id: String) -> Self {
        ReqId::Text(id)
    }
}

impl TryFrom<&Value> for ReqId {
    type Error = TrackingError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(id) => Ok(ReqId::Text(id.clone())),
            Value::Number(id) => id.as_i64().map(ReqId::Number).ok_or_else(|| {
                TrackingError::InvalidInput(format!("'{REQ_ID_KEY}' {id} is not an integer"))
            }),
            other => Err(TrackingError::InvalidInput(format!(
                "'{REQ_ID_KEY}' must be an integer or a string, got {other}"
            ))),
        }
    }
}

/// Per-request key/value context attached to every log line.
///
/// The `reqId` cannot change once the record exists. Its canonical string form
/// (the [`fmt::Display`] impl) is compact JSON with `reqId` first, e.g.
/// `{"reqId":42,"user":"bob"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingRecord {
    #[serde(rename = "reqId")]
    req_id: ReqId,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl TrackingRecord {
    pub fn new(req_id: impl Into<ReqId>) -> Self {
        TrackingRecord {
            req_id: req_id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builds the record of a request-like object, keyed by its
    /// [`fingerprint`].
    pub fn from_request<R: RequestLike + ?Sized>(request: &R) -> Self {
        TrackingRecord::new(ReqId::Digest(fingerprint(request)))
    }

    /// Adds an auxiliary field. The reserved `reqId` and `req` keys are
    /// ignored.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key == REQ_ID_KEY || key == REQ_KEY {
            tracing::debug!(%key, "ignoring reserved tracking field");
            return self;
        }
        self.fields.insert(key, value.into());
        self
    }

    pub fn req_id(&self) -> &ReqId {
        &self.req_id
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Auxiliary fields, sorted by key.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl fmt::Display for TrackingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// What a caller knows about the request it wants to track.
pub enum TrackingInput<'a> {
    /// Nothing: a random id in `[1, 10000]` is drawn.
    Absent,
    /// A caller-assigned numeric id, used verbatim.
    Number(i64),
    /// A caller-assigned textual id, used verbatim.
    Text(String),
    /// An inbound request, identified by its [`fingerprint`].
    Request(&'a dyn RequestLike),
    /// An ad-hoc field map carrying either a `reqId` or a nested request.
    Fields {
        fields: Map<String, Value>,
        req: Option<&'a dyn RequestLike>,
    },
}

impl<'a> TrackingInput<'a> {
    pub fn request(request: &'a dyn RequestLike) -> Self {
        TrackingInput::Request(request)
    }

    pub fn fields(fields: Map<String, Value>) -> Self {
        TrackingInput::Fields { fields, req: None }
    }

    /// Field map with a nested request whose fingerprint becomes the `reqId`.
    pub fn fields_with_request(fields: Map<String, Value>, request: &'a dyn RequestLike) -> Self {
        TrackingInput::Fields {
            fields,
            req: Some(request),
        }
    }

    /// The request carried by this input, if any.
    pub fn request_like(&self) -> Option<&'a dyn RequestLike> {
        match self {
            TrackingInput::Request(request) => Some(*request),
            TrackingInput::Fields { req, .. } => *req,
            _ => None,
        }
    }
}

impl fmt::Debug for TrackingInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingInput::Absent => f.write_str("Absent"),
            TrackingInput::Number(id) => f.debug_tuple("Number").field(id).finish(),
            TrackingInput::Text(id) => f.debug_tuple("Text").field(id).finish(),
            TrackingInput::Request(_) => f.write_str("Request(..)"),
            TrackingInput::Fields { fields, req } => f
                .debug_struct("Fields")
                .field("fields", fields)
                .field("req", &req.map(|_| ".."))
                .finish(),
        }
    }
}

impl From<i64> for TrackingInput<'_> {
    fn from(id: i64) -> Self {
        TrackingInput::Number(id)
    }
}

impl From<&str> for TrackingInput<'_> {
    fn from(id: &str) -> Self {
        TrackingInput::Text(id.to_owned())
    }
}

impl From<String> for TrackingInput<'_> {
    fn from(id: String) -> Self {
        TrackingInput::Text(id)
    }
}

impl From<Map<String, Value>> for TrackingInput<'_> {
    fn from(fields: Map<String, Value>) -> Self {
        TrackingInput::fields(fields)
    }
}

impl<'a, T: Into<TrackingInput<'a>>> From<Option<T>> for TrackingInput<'a> {
    fn from(input: Option<T>) -> Self {
        input.map_or(TrackingInput::Absent, Into::into)
    }
}

/// Computes the tracking record for `input`.
///
/// A nested request always wins over a caller-supplied `reqId`.
pub fn derive_tracking_record(input: &TrackingInput<'_>) -> Result<TrackingRecord, TrackingError> {
    match input {
        TrackingInput::Absent => Ok(TrackingRecord::new(ReqId::Number(
            rand::rng().random_range(RANDOM_REQ_IDS),
        ))),
        TrackingInput::Number(id) => Ok(TrackingRecord::new(*id)),
        TrackingInput::Text(id) => Ok(TrackingRecord::new(id.as_str())),
        TrackingInput::Request(request) => Ok(TrackingRecord::from_request(*request)),
        TrackingInput::Fields { fields, req } => from_fields(fields, *req),
    }
}

fn from_fields(
    fields: &Map<String, Value>,
    req: Option<&dyn RequestLike>,
) -> Result<TrackingRecord, TrackingError> {
    let req_id = match (req, fields.get(REQ_ID_KEY)) {
        (Some(request), _) => ReqId::Digest(fingerprint(request)),
        (None, None | Some(Value::Null)) => {
            return Err(TrackingError::InvalidInput(format!(
                "expected a '{REQ_ID_KEY}' field or a nested request"
            )))
        }
        (None, Some(id)) => ReqId::try_from(id)?,
    };

    let fields = fields
        .iter()
        .filter(|(key, _)| key.as_str() != REQ_ID_KEY && key.as_str() != REQ_KEY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(TrackingRecord { req_id, fields })
}

/// Hex encoded MD5 of the request's textual dump.
pub fn fingerprint<R: RequestLike + ?Sized>(request: &R) -> String {
    hex::encode(Md5::digest(request.describe().as_bytes()))
}

#[cfg(test)]
mod tests {
    use http::Request;
    use serde_json::json;

    use super::*;

    fn request(path: &str) -> Request<()> {
        Request::builder()
            .uri(path)
            .header("user-agent", "logtrack-test")
            .body(())
            .unwrap()
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn number_is_used_verbatim() {
        let record = derive_tracking_record(&42_i64.into()).unwrap();
        assert_eq!(record.req_id(), &ReqId::Number(42));
        assert_eq!(record.to_string(), r#"{"reqId":42}"#);
    }

    #[test]
    fn text_is_used_verbatim() {
        let record = derive_tracking_record(&"abc".into()).unwrap();
        assert_eq!(record.req_id(), &ReqId::Text("abc".into()));
    }

    #[test]
    fn absent_input_draws_a_random_id() {
        for _ in 0..200 {
            let record = derive_tracking_record(&TrackingInput::Absent).unwrap();
            match record.req_id() {
                ReqId::Number(id) => assert!((1..=10_000).contains(id)),
                other => panic!("unexpected id {other:?}"),
            }
        }
        let none: Option<i64> = None;
        assert!(matches!(TrackingInput::from(none), TrackingInput::Absent));
    }

    #[test]
    fn fields_with_req_id_are_copied() {
        let input = TrackingInput::fields(object(json!({"reqId": "x", "user": "bob"})));
        let record = derive_tracking_record(&input).unwrap();

        assert_eq!(record.req_id(), &ReqId::Text("x".into()));
        assert_eq!(record.get("user"), Some(&json!("bob")));
        assert_eq!(record.to_string(), r#"{"reqId":"x","user":"bob"}"#);
    }

    #[test]
    fn request_is_hashed() {
        let req = request("/a");
        let record = derive_tracking_record(&TrackingInput::request(&req)).unwrap();

        let expected = hex::encode(Md5::digest(req.describe().as_bytes()));
        assert_eq!(record.req_id(), &ReqId::Digest(expected));
        assert_eq!(fingerprint(&req).len(), 32);
    }

    #[test]
    fn nested_request_overrides_req_id_and_is_dropped() {
        let req = request("/a");
        let input = TrackingInput::fields_with_request(
            object(json!({"reqId": 7, "user": "bob", "req": "stale"})),
            &req,
        );
        let record = derive_tracking_record(&input).unwrap();

        assert_eq!(record.req_id(), &ReqId::Digest(fingerprint(&req)));
        assert_eq!(record.get("user"), Some(&json!("bob")));
        assert_eq!(record.get(REQ_KEY), None);
        assert_eq!(record.fields().count(), 1);
    }

    #[test]
    fn distinct_requests_get_distinct_ids() {
        assert_ne!(fingerprint(&request("/a")), fingerprint(&request("/b")));
        assert_eq!(fingerprint(&request("/a")), fingerprint(&request("/a")));
    }

    #[test]
    fn unidentifiable_fields_are_rejected() {
        let input = TrackingInput::fields(object(json!({"foo": 1})));
        assert!(matches!(
            derive_tracking_record(&input),
            Err(TrackingError::InvalidInput(_))
        ));

        let input = TrackingInput::fields(object(json!({"reqId": null})));
        assert!(derive_tracking_record(&input).is_err());

        let input = TrackingInput::fields(object(json!({"reqId": [1, 2]})));
        assert!(derive_tracking_record(&input).is_err());
    }

    #[test]
    fn reserved_fields_cannot_be_overwritten() {
        let record = TrackingRecord::new(1_i64)
            .with_field(REQ_ID_KEY, 2)
            .with_field("user", "bob");
        assert_eq!(record.req_id(), &ReqId::Number(1));
        assert_eq!(record.to_string(), r#"{"reqId":1,"user":"bob"}"#);
    }
}
