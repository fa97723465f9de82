//! Mutation outcome classification
//!
//! The CMDB's write calls do not report success the usual way. A committed
//! write is answered with a redirect to the object page, an attempt to
//! create something that is already there comes back as an error, and an
//! edit may answer with an HTML page instead of JSON. [`classify`] turns each
//! raw reply into one of four outcomes based on what kind of mutation was
//! attempted, so callers never have to interpret transport errors.

use crate::error::ConnectorError;
use serde::Serialize;
use std::fmt;

/// Kind of write issued against the CMDB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationKind {
    CreateObject,
    EditObject,
    DeleteObject,
    AddAddress,
    RemoveAddress,
    LinkEntities,
    UnlinkEntities,
    UpdateTags,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::CreateObject => write!(f, "create_object"),
            MutationKind::EditObject => write!(f, "edit_object"),
            MutationKind::DeleteObject => write!(f, "delete_object"),
            MutationKind::AddAddress => write!(f, "add_ipv4"),
            MutationKind::RemoveAddress => write!(f, "remove_ipv4"),
            MutationKind::LinkEntities => write!(f, "link_entities"),
            MutationKind::UnlinkEntities => write!(f, "unlink_entities"),
            MutationKind::UpdateTags => write!(f, "update_tags"),
        }
    }
}

/// Classified result of a CMDB write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MutationOutcome {
    /// The write was applied
    Success,
    /// The desired entity or binding was already present
    AlreadyExists,
    /// The entity or binding to remove was already gone
    AlreadyAbsent,
    /// The write genuinely failed
    Failure(String),
}

impl MutationOutcome {
    /// Desired end state reached, whether or not this call changed anything.
    pub fn is_benign(&self) -> bool {
        !self.is_failure()
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MutationOutcome::Failure(_))
    }
}

impl fmt::Display for MutationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOutcome::Success => write!(f, "success"),
            MutationOutcome::AlreadyExists => write!(f, "already exists"),
            MutationOutcome::AlreadyAbsent => write!(f, "already absent"),
            MutationOutcome::Failure(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Raw reply of a CMDB call before interpretation
#[derive(Debug, Clone, PartialEq)]
pub enum RawReply {
    /// JSON payload (envelope already unwrapped)
    Json(serde_json::Value),
    /// 2xx with an empty body
    Empty,
    /// 3xx; the backend redirects after a committed write
    Redirect { location: Option<String> },
}

/// Classify the raw result of a write.
pub fn classify(kind: MutationKind, reply: Result<RawReply, ConnectorError>) -> MutationOutcome {
    match reply {
        Ok(RawReply::Redirect { .. }) => MutationOutcome::Success,
        Ok(RawReply::Empty) => classify_empty(kind),
        Ok(RawReply::Json(value)) => classify_json(kind, &value),
        Err(err) => classify_error(kind, &err),
    }
}

fn classify_empty(kind: MutationKind) -> MutationOutcome {
    match kind {
        // Linking answers "" when the objects were already linked
        MutationKind::LinkEntities => MutationOutcome::AlreadyExists,
        MutationKind::EditObject => {
            MutationOutcome::Failure("backend returned an empty reply".to_string())
        }
        _ => MutationOutcome::Success,
    }
}

fn classify_json(kind: MutationKind, value: &serde_json::Value) -> MutationOutcome {
    match value {
        serde_json::Value::String(s) if s.is_empty() => classify_empty(kind),
        serde_json::Value::Object(map) => match map.get("error") {
            Some(message) => {
                let message = message
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| message.to_string());
                classify_message(kind, None, &message)
            }
            None => MutationOutcome::Success,
        },
        _ => MutationOutcome::Success,
    }
}

fn classify_error(kind: MutationKind, err: &ConnectorError) -> MutationOutcome {
    match err {
        // Edits sometimes answer with a page that is not JSON; the write
        // itself has been committed by then.
        ConnectorError::InvalidResponse(_) | ConnectorError::Json(_)
            if kind == MutationKind::EditObject =>
        {
            MutationOutcome::Success
        }
        ConnectorError::Api { status, message } => classify_message(kind, Some(*status), message),
        ConnectorError::NotFound(message) => classify_message(kind, Some(404), message),
        other => MutationOutcome::Failure(other.to_string()),
    }
}

fn classify_message(kind: MutationKind, status: Option<u16>, message: &str) -> MutationOutcome {
    let lower = message.to_ascii_lowercase();
    let duplicate = status == Some(409)
        || lower.contains("already exists")
        || lower.contains("duplicate");
    let missing = status == Some(404)
        || lower.contains("not found")
        || lower.contains("does not exist");

    match kind {
        MutationKind::CreateObject | MutationKind::AddAddress | MutationKind::LinkEntities
            if duplicate =>
        {
            MutationOutcome::AlreadyExists
        }
        MutationKind::DeleteObject | MutationKind::RemoveAddress | MutationKind::UnlinkEntities
            if missing =>
        {
            MutationOutcome::AlreadyAbsent
        }
        _ => match status {
            Some(status) => MutationOutcome::Failure(format!("{} - {}", status, message)),
            None => MutationOutcome::Failure(message.to_string()),
        },
    }
}
