//! RackTables CMDB client
//!
//! [`RackTablesClient`] is the raw HTTP client for `api.php`: every call is a
//! GET with a `method` parameter, authenticated with basic auth, answered
//! with a `{"response": ...}` envelope. Redirects are not followed because a
//! redirect is how the API acknowledges a committed write.
//!
//! [`RackTablesCmdb`] wraps the raw client and implements [`Cmdb`], turning
//! write replies into [`MutationOutcome`]s.

use crate::error::{ConnectorError, ConnectorResult};
use crate::outcome::{classify, MutationKind, MutationOutcome, RawReply};
use crate::traits::{AttributeValue, Cmdb, Ipv4Binding, ObjectDetail, ObjectSummary};
use async_trait::async_trait;
use reqwest::{redirect, Client, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;
use vmsync_types::ObjectId;

/// Raw HTTP client for the RackTables API
pub struct RackTablesClient {
    client: Client,
    api_url: Url,
    username: String,
    password: String,
}

impl RackTablesClient {
    /// Create a new client for `api_url` (the full `.../api.php` URL)
    pub fn new(
        api_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> ConnectorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            api_url: Url::parse(api_url)?,
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Issue one API call and return the raw reply.
    pub async fn call(&self, method: &str, params: &[(String, String)]) -> ConnectorResult<RawReply> {
        let mut query: Vec<(&str, &str)> = Vec::with_capacity(params.len() + 1);
        query.push(("method", method));
        query.extend(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        tracing::trace!(method = method, "RackTables API call");

        let response = self
            .client
            .get(self.api_url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .query(&query)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Issue a read call and return the unwrapped JSON payload.
    pub async fn query(&self, method: &str, params: &[(String, String)]) -> ConnectorResult<Value> {
        match self.call(method, params).await? {
            RawReply::Json(value) => Ok(value),
            RawReply::Empty => Err(ConnectorError::InvalidResponse(format!(
                "{} returned an empty body",
                method
            ))),
            RawReply::Redirect { location } => Err(ConnectorError::InvalidResponse(format!(
                "{} redirected to {}",
                method,
                location.unwrap_or_default()
            ))),
        }
    }

    async fn handle_response(&self, response: reqwest::Response) -> ConnectorResult<RawReply> {
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Ok(RawReply::Redirect { location });
        }

        if status.is_success() {
            let body = response.text().await?;
            if body.trim().is_empty() {
                return Ok(RawReply::Empty);
            }
            let value: Value = serde_json::from_str(&body)
                .map_err(|_| ConnectorError::InvalidResponse(snippet(&body)))?;
            return Ok(RawReply::Json(unwrap_envelope(value)));
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ConnectorError::AuthenticationFailed {
                    backend: self.api_url.to_string(),
                })
            }
            StatusCode::NOT_FOUND => Err(ConnectorError::NotFound(error_message(&message))),
            _ => Err(ConnectorError::Api {
                status: status.as_u16(),
                message: error_message(&message),
            }),
        }
    }
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("response") => {
            map.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    }
}

// Error bodies are usually `{"error": "..."}`, sometimes plain text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| snippet(body))
}

fn snippet(body: &str) -> String {
    body.trim().chars().take(200).collect()
}

/// Text value of a field that PHP may have encoded as a string or a number.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Entries of a PHP associative array; empty arrays arrive as `[]`.
fn entries(value: &Value) -> Vec<(Option<&str>, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
        Value::Array(items) => items.iter().map(|v| (None, v)).collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn parse_objects(value: &Value) -> ConnectorResult<Vec<ObjectSummary>> {
    let mut objects = Vec::new();
    for (key, object) in entries(value) {
        let id = text(object.get("id"))
            .or_else(|| key.map(str::to_string))
            .ok_or_else(|| ConnectorError::InvalidResponse("object without id".to_string()))?;
        let id: ObjectId = id
            .parse()
            .map_err(|_| ConnectorError::InvalidResponse(format!("bad object id '{}'", id)))?;

        objects.push(ObjectSummary {
            id,
            name: text(object.get("name")),
            label: text(object.get("label")),
            container_name: text(object.get("container_name")),
        });
    }
    Ok(objects)
}

pub(crate) fn parse_object_detail(value: &Value) -> ObjectDetail {
    let mut detail = ObjectDetail::default();

    if let Some(attrs) = value.get("attrs") {
        for (key, attr) in entries(attrs) {
            let name = text(attr.get("name")).or_else(|| key.map(str::to_string));
            if let Some(name) = name {
                detail.attrs.insert(
                    name,
                    AttributeValue {
                        value: text(attr.get("value")),
                        a_value: text(attr.get("a_value")),
                    },
                );
            }
        }
    }

    if let Some(ipv4) = value.get("ipv4") {
        for (_, binding) in entries(ipv4) {
            let ip = binding
                .get("addrinfo")
                .and_then(|info| text(info.get("ip")))
                .or_else(|| text(binding.get("ip")));
            if let Some(ip) = ip {
                detail.ipv4.push(Ipv4Binding {
                    ip,
                    osif: text(binding.get("osif")).unwrap_or_default(),
                });
            }
        }
    }

    detail
}

pub(crate) fn parse_chapter(value: &Value) -> ConnectorResult<BTreeMap<u64, String>> {
    let mut chapter = BTreeMap::new();
    for (key, entry) in entries(value) {
        let (id, name) = match (key, entry) {
            (Some(key), Value::String(name)) => (key.to_string(), name.clone()),
            (_, Value::Object(_)) => (
                text(entry.get("dict_key")).or_else(|| key.map(str::to_string)).unwrap_or_default(),
                text(entry.get("dict_value")).unwrap_or_default(),
            ),
            _ => continue,
        };
        let id: u64 = id
            .trim()
            .parse()
            .map_err(|_| ConnectorError::InvalidResponse(format!("bad chapter key '{}'", id)))?;
        chapter.insert(id, name);
    }
    Ok(chapter)
}

/// [`Cmdb`] implementation backed by a [`RackTablesClient`]
pub struct RackTablesCmdb {
    client: RackTablesClient,
}

impl RackTablesCmdb {
    pub fn new(client: RackTablesClient) -> Self {
        Self { client }
    }

    async fn mutate(
        &self,
        kind: MutationKind,
        method: &str,
        params: Vec<(String, String)>,
    ) -> MutationOutcome {
        let outcome = classify(kind, self.client.call(method, &params).await);
        tracing::debug!(kind = %kind, outcome = %outcome, "CMDB mutation");
        outcome
    }
}

fn param(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[async_trait]
impl Cmdb for RackTablesCmdb {
    async fn list_objects(&self, type_id: u32) -> ConnectorResult<Vec<ObjectSummary>> {
        let value = self
            .client
            .query("get_objects", &[param("type_filter", type_id)])
            .await?;
        parse_objects(&value)
    }

    async fn get_object(&self, id: ObjectId) -> ConnectorResult<ObjectDetail> {
        let value = self
            .client
            .query(
                "get_object",
                &[param("object_id", id), param("include_attrs", 1)],
            )
            .await?;
        Ok(parse_object_detail(&value))
    }

    async fn get_chapter(&self, chapter_id: u32) -> ConnectorResult<BTreeMap<u64, String>> {
        let value = self
            .client
            .query(
                "get_chapter",
                &[param("chapter_no", chapter_id), param("style", "o")],
            )
            .await?;
        parse_chapter(&value)
    }

    async fn create_object(&self, name: &str, type_id: u32) -> MutationOutcome {
        self.mutate(
            MutationKind::CreateObject,
            "add_object",
            vec![param("object_name", name), param("object_type_id", type_id)],
        )
        .await
    }

    async fn edit_object(
        &self,
        id: ObjectId,
        name: &str,
        type_id: u32,
        attrs: &BTreeMap<u32, String>,
    ) -> MutationOutcome {
        let mut params = vec![
            param("object_id", id),
            param("object_name", name),
            param("object_type_id", type_id),
        ];
        params.extend(
            attrs
                .iter()
                .map(|(attr_id, value)| (format!("attr_{}", attr_id), value.clone())),
        );
        self.mutate(MutationKind::EditObject, "edit_object", params)
            .await
    }

    async fn delete_object(&self, id: ObjectId) -> MutationOutcome {
        self.mutate(
            MutationKind::DeleteObject,
            "delete_object",
            vec![param("object_id", id)],
        )
        .await
    }

    async fn add_ipv4(&self, id: ObjectId, ip: &str, osif: &str) -> MutationOutcome {
        self.mutate(
            MutationKind::AddAddress,
            "add_object_ipv4_address",
            vec![
                param("object_id", id),
                param("ip", ip),
                param("bond_name", osif),
            ],
        )
        .await
    }

    async fn remove_ipv4(&self, id: ObjectId, ip: &str) -> MutationOutcome {
        self.mutate(
            MutationKind::RemoveAddress,
            "delete_object_ipv4_address",
            vec![param("object_id", id), param("ip", ip)],
        )
        .await
    }

    async fn link_entities(&self, child: ObjectId, parent: ObjectId) -> MutationOutcome {
        self.mutate(
            MutationKind::LinkEntities,
            "link_entities",
            vec![
                param("child_entity_type", "object"),
                param("child_entity_id", child),
                param("parent_entity_type", "object"),
                param("parent_entity_id", parent),
            ],
        )
        .await
    }

    async fn unlink_entities(&self, child: ObjectId, parent: ObjectId) -> MutationOutcome {
        self.mutate(
            MutationKind::UnlinkEntities,
            "unlink_entities",
            vec![
                param("child_entity_type", "object"),
                param("child_entity_id", child),
                param("parent_entity_type", "object"),
                param("parent_entity_id", parent),
            ],
        )
        .await
    }

    async fn update_tags(&self, id: ObjectId, tags: &[String]) -> MutationOutcome {
        let mut params = vec![param("object_id", id)];
        params.extend(tags.iter().map(|tag| param("taglist[]", tag)));
        self.mutate(MutationKind::UpdateTags, "update_object_tags", params)
            .await
    }
}
