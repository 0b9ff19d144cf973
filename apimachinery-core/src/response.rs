//! The `Status` reply and its details.
use crate::{
    gvk::GroupVersionKind,
    metadata::{ListMeta, TypeMeta},
    Reflect,
};

pub mod reason;
pub use reason::StatusReason;

/// A status reply, returned for operations that produce no other object
#[derive(Reflect, Debug, Default, Clone, PartialEq)]
#[reflect(object, crates(core = "crate"))]
pub struct Status {
    #[reflect(inline)]
    pub types: TypeMeta,

    #[reflect(omitempty)]
    pub metadata: ListMeta,

    /// `Success` or `Failure`; unset for replies that are neither
    #[reflect(omitempty)]
    pub status: Option<StatusSummary>,

    /// HTTP status code, 0 when unset
    #[reflect(omitempty)]
    pub code: i32,

    /// Human readable explanation
    #[reflect(omitempty)]
    pub message: String,

    /// Machine readable cause of a failure; refines `code` without replacing it
    #[reflect(omitempty)]
    pub reason: StatusReason,

    /// Reason specific detail
    #[reflect(omitempty)]
    pub details: Option<StatusDetails>,
}

impl Status {
    /// The kind a status reply is registered under
    pub fn kind() -> GroupVersionKind {
        GroupVersionKind::gvk("", "v1", "Status")
    }

    /// A `Success` reply
    pub fn success() -> Self {
        Status {
            types: TypeMeta::new(&Self::kind()),
            status: Some(StatusSummary::Success),
            ..Status::default()
        }
    }

    /// A `Failure` reply whose code follows the reason
    pub fn failure(message: &str, reason: StatusReason) -> Self {
        Status {
            types: TypeMeta::new(&Self::kind()),
            status: Some(StatusSummary::Failure),
            code: i32::from(reason.http_code()),
            message: message.to_string(),
            reason,
            ..Status::default()
        }
    }

    /// Override the code implied by the reason
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    /// Attach reason specific detail
    pub fn with_details(mut self, details: StatusDetails) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether the reply reports success; a reply may be neither success nor failure
    pub fn is_success(&self) -> bool {
        self.status == Some(StatusSummary::Success)
    }

    /// Whether the reply reports failure
    pub fn is_failure(&self) -> bool {
        self.status == Some(StatusSummary::Failure)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

/// Outcome carried in [`Status::status`]
#[derive(Reflect, Debug, Default, PartialEq, Eq, Clone, Copy)]
#[reflect(crates(core = "crate"))]
pub enum StatusSummary {
    /// The request was carried out
    #[default]
    Success,
    /// The request was refused or failed
    Failure,
}

/// Which object a [`Status`] is about, and why it failed
#[derive(Reflect, Debug, Default, PartialEq, Eq, Clone)]
#[reflect(crates(core = "crate"))]
pub struct StatusDetails {
    /// Name of the object, when there is exactly one
    #[reflect(omitempty)]
    pub name: String,

    /// API group of the object
    #[reflect(omitempty)]
    pub group: String,

    /// Kind of the object, which may differ from the kind in the request
    #[reflect(omitempty)]
    pub kind: String,

    /// UID of the object, when there is exactly one
    #[reflect(omitempty)]
    pub uid: String,

    /// Individual causes, often one per invalid field
    #[reflect(omitempty)]
    pub causes: Vec<StatusCause>,

    /// Seconds to wait before retrying, 0 when unset
    #[reflect(omitempty)]
    pub retry_after_seconds: i32,
}

/// One entry of [`StatusDetails::causes`]
#[derive(Reflect, Debug, Default, PartialEq, Eq, Clone)]
#[reflect(crates(core = "crate"))]
pub struct StatusCause {
    /// Machine readable cause, such as `FieldValueInvalid`
    #[reflect(omitempty)]
    pub reason: String,

    /// Human readable explanation
    #[reflect(omitempty)]
    pub message: String,

    /// Path of the offending field in its serialized form, e.g. `spec.ports[0].name`
    #[reflect(omitempty)]
    pub field: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{reflect::from_value, value::Value};

    #[test]
    fn reads_delete_replies() {
        let reply = r#"{"kind":"Status","apiVersion":"v1","metadata":{},"status":"Success","details":{"name":"web","group":"apps","kind":"deployments","uid":"42"}}"#;
        let tree: Value = serde_json::from_str(reply).unwrap();
        let status: Status = from_value(&tree).unwrap();
        assert!(status.is_success());
        assert_eq!(status.details.unwrap().name, "web");

        let unnamed = r#"{"kind":"Status","apiVersion":"v1","status":"Failure","code":409,"reason":"Conflict","details":{"causes":[{"field":"metadata.resourceVersion"}]}}"#;
        let tree: Value = serde_json::from_str(unnamed).unwrap();
        let status: Status = from_value(&tree).unwrap();
        assert!(status.is_failure());
        assert_eq!(status.reason, StatusReason::Conflict);
        let details = status.details.unwrap();
        assert_eq!(details.name, "");
        assert_eq!(details.causes[0].field, "metadata.resourceVersion");
    }

    #[test]
    fn failure_carries_reason_code() {
        let status = Status::failure("nope", StatusReason::Forbidden);
        assert!(status.is_failure());
        assert_eq!(status.code, 403);
        let tree = crate::reflect::to_value(&status).unwrap();
        assert_eq!(tree.get("reason"), Some(&Value::from("Forbidden")));
        assert_eq!(tree.get("status"), Some(&Value::from("Failure")));
        assert_eq!(tree.get("kind"), Some(&Value::from("Status")));
        assert!(tree.get("details").is_none());
    }
}
