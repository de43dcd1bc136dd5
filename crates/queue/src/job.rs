//! Job model: submission record, identity, and fairness priority.
//!
//! Jobs are stored as flat string hashes so that any key/value backend can
//! hold them. [`Job::to_fields`] and [`Job::from_fields`] are the only places
//! that know the field layout.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{SchedulerError, StorageError};

const OWNER: &str = "owner";
const PROJECT: &str = "project";
const COMMAND: &str = "command";
const BUILD: &str = "build";
const CHANNEL: &str = "channel";
const TIMEOUT: &str = "timeout";
const PRIORITY: &str = "priority";
const DISPATCHED_AT: &str = "dispatched_at";
const ID: &str = "id";

/// Fields a client may not set: they are either injected by the transport
/// or computed by the scheduler.
const RESERVED: &[&str] = &["action", CHANNEL, PRIORITY, DISPATCHED_AT, ID];

/// Fairness score for a new submission.
///
/// Owners and projects with fewer running jobs score higher. The result is
/// in `(0, 2]`; `2.0` means neither the owner nor the project has anything
/// running.
pub fn fairness_priority(owner_running: usize, project_running: usize) -> f64 {
    1.0 / (owner_running as f64 + 1.0) + 1.0 / (project_running as f64 + 1.0)
}

// ── Identity ────────────────────────────────────────────────────────

/// Deterministic job identifier derived from `(channel, project, build, command)`.
///
/// Resubmitting the same tuple targets the same job. Components are escaped
/// so that distinct tuples never collide on the `/` separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn from_parts(channel: &str, project: &str, build: &str, command: &str) -> Self {
        Self(format!(
            "{}/{}/{}/{}",
            escape(channel),
            escape(project),
            escape(build),
            escape(command)
        ))
    }

    /// Wrap an id read back from storage.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the attribute hash in the job store.
    pub fn storage_key(&self) -> String {
        format!("item:{}", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape(part: &str) -> String {
    part.replace('%', "%25").replace('/', "%2F")
}

/// The fields a completion notice carries to locate its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKey {
    pub channel: String,
    pub project: String,
    pub build: String,
    pub command: String,
}

impl JobKey {
    pub fn id(&self) -> JobId {
        JobId::from_parts(&self.channel, &self.project, &self.build, &self.command)
    }

    /// Build a key from a client message body. `channel` comes from the
    /// connection, never from the body.
    pub fn from_json(channel: &str, body: &Map<String, Value>) -> Result<Self, SchedulerError> {
        Ok(Self {
            channel: channel.to_string(),
            project: required(body, PROJECT)?,
            build: required(body, BUILD)?,
            command: required(body, COMMAND)?,
        })
    }
}

// ── Submission ──────────────────────────────────────────────────────

/// A validated submission: the required fields plus whatever else the
/// client sent.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub owner: String,
    pub project: String,
    pub command: String,
    pub build: String,
    pub channel: String,
    /// Client-declared run timeout in seconds. Informational only.
    pub timeout: Option<u64>,
    pub extra: BTreeMap<String, String>,
}

impl JobSpec {
    pub fn new(
        channel: impl Into<String>,
        owner: impl Into<String>,
        project: impl Into<String>,
        build: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            project: project.into(),
            command: command.into(),
            build: build.into(),
            channel: channel.into(),
            timeout: None,
            extra: BTreeMap::new(),
        }
    }

    /// Parse an `add` message body. Required fields may be strings or
    /// numbers; every other field lands in `extra` as text.
    pub fn from_json(channel: &str, body: &Map<String, Value>) -> Result<Self, SchedulerError> {
        let mut extra = BTreeMap::new();
        for (key, value) in body {
            if RESERVED.contains(&key.as_str())
                || matches!(key.as_str(), OWNER | PROJECT | COMMAND | BUILD | TIMEOUT)
            {
                continue;
            }
            extra.insert(key.clone(), value_text(value));
        }

        // The timeout is advisory: an unreadable one travels on as text.
        let timeout = match body.get(TIMEOUT) {
            None | Some(Value::Null) => None,
            Some(value) => {
                let parsed = parse_timeout(value);
                if parsed.is_none() {
                    warn!(timeout = %value, "timeout is not a non-negative number, keeping it as text");
                    extra.insert(TIMEOUT.to_string(), value_text(value));
                }
                parsed
            }
        };

        let spec = Self {
            owner: required(body, OWNER)?,
            project: required(body, PROJECT)?,
            command: required(body, COMMAND)?,
            build: required(body, BUILD)?,
            channel: channel.to_string(),
            timeout,
            extra,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check that every required field is present and non-empty.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        for (name, value) in [
            (OWNER, &self.owner),
            (PROJECT, &self.project),
            (COMMAND, &self.command),
            (BUILD, &self.build),
            (CHANNEL, &self.channel),
        ] {
            if value.trim().is_empty() {
                return Err(SchedulerError::InvalidJob(format!("missing field '{name}'")));
            }
        }
        Ok(())
    }

    pub fn id(&self) -> JobId {
        JobId::from_parts(&self.channel, &self.project, &self.build, &self.command)
    }
}

fn required(body: &Map<String, Value>, field: &str) -> Result<String, SchedulerError> {
    match body.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            Err(SchedulerError::InvalidJob(format!("missing field '{field}'")))
        }
        Some(other) => Err(SchedulerError::InvalidJob(format!(
            "field '{field}' must be a string, got {other}"
        ))),
    }
}

fn parse_timeout(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Stored job ──────────────────────────────────────────────────────

/// A job as held by the job store.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub spec: JobSpec,
    pub priority: f64,
    /// Set when the job moves from pending to running.
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(spec: JobSpec, priority: f64) -> Self {
        Self {
            id: spec.id(),
            spec,
            priority,
            dispatched_at: None,
        }
    }

    /// Flatten into the stored field layout.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let spec = &self.spec;
        let mut fields: Vec<(String, String)> = spec
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields.push((OWNER.into(), spec.owner.clone()));
        fields.push((PROJECT.into(), spec.project.clone()));
        fields.push((COMMAND.into(), spec.command.clone()));
        fields.push((BUILD.into(), spec.build.clone()));
        fields.push((CHANNEL.into(), spec.channel.clone()));
        if let Some(timeout) = spec.timeout {
            fields.push((TIMEOUT.into(), timeout.to_string()));
        }
        fields.push((PRIORITY.into(), self.priority.to_string()));
        if let Some(at) = self.dispatched_at {
            fields.push((DISPATCHED_AT.into(), at.to_rfc3339()));
        }
        fields
    }

    /// Rebuild a job from its stored hash.
    pub fn from_fields(id: JobId, mut fields: HashMap<String, String>) -> Result<Self, StorageError> {
        let key = id.storage_key();
        let corrupt = |reason: String| StorageError::Corrupt {
            key: key.clone(),
            reason,
        };
        let mut take = |name: &str| {
            fields
                .remove(name)
                .ok_or_else(|| corrupt(format!("missing field '{name}'")))
        };

        let owner = take(OWNER)?;
        let project = take(PROJECT)?;
        let command = take(COMMAND)?;
        let build = take(BUILD)?;
        let channel = take(CHANNEL)?;
        let priority_raw = take(PRIORITY)?;

        let priority = priority_raw
            .parse::<f64>()
            .map_err(|e| corrupt(format!("bad priority '{priority_raw}': {e}")))?;
        let timeout = match fields.remove(TIMEOUT) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    fields.insert(TIMEOUT.to_string(), raw);
                    None
                }
            },
            None => None,
        };
        let dispatched_at = match fields.remove(DISPATCHED_AT) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| corrupt(format!("bad dispatched_at '{raw}': {e}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Self {
            id,
            spec: JobSpec {
                owner,
                project,
                command,
                build,
                channel,
                timeout,
                extra: fields.into_iter().collect(),
            },
            priority,
            dispatched_at,
        })
    }

    /// The record sent to subscribers of the job's channel: every stored
    /// attribute plus `id`.
    pub fn payload(&self) -> BTreeMap<String, String> {
        let mut payload: BTreeMap<String, String> = self.to_fields().into_iter().collect();
        payload.insert(ID.into(), self.id.to_string());
        payload
    }

    pub fn channel(&self) -> &str {
        &self.spec.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn priority_favours_idle_owners_and_projects() {
        assert_eq!(fairness_priority(0, 0), 2.0);
        assert_eq!(fairness_priority(1, 0), 1.5);
        assert_eq!(fairness_priority(1, 1), 1.0);
        assert!(fairness_priority(3, 2) < fairness_priority(2, 2));
    }

    #[test]
    fn id_is_deterministic_per_tuple() {
        let a = JobId::from_parts("temp", "p1", "b1", "make");
        let b = JobId::from_parts("temp", "p1", "b1", "make");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "temp/p1/b1/make");
        assert_eq!(a.storage_key(), "item:temp/p1/b1/make");
    }

    #[test]
    fn id_escapes_separator() {
        let a = JobId::from_parts("a/b", "c", "d", "e");
        let b = JobId::from_parts("a", "b/c", "d", "e");
        assert_ne!(a, b);
    }

    #[test]
    fn spec_from_add_message() {
        let msg = body(json!({
            "action": "add",
            "owner": "alice",
            "project": "p1",
            "command": "make test",
            "build": 42,
            "timeout": 10,
            "priority": 99,
            "env": {"CI": "1"}
        }));
        let spec = JobSpec::from_json("temp", &msg).unwrap();
        assert_eq!(spec.owner, "alice");
        assert_eq!(spec.build, "42");
        assert_eq!(spec.channel, "temp");
        assert_eq!(spec.timeout, Some(10));
        assert_eq!(spec.extra.get("env").unwrap(), r#"{"CI":"1"}"#);
        assert!(!spec.extra.contains_key("priority"));
        assert!(!spec.extra.contains_key("action"));
    }

    #[test]
    fn spec_missing_owner_is_invalid() {
        let msg = body(json!({"project": "p", "command": "c", "build": "b"}));
        let err = JobSpec::from_json("temp", &msg).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidJob(ref m) if m.contains("owner")));
    }

    #[test]
    fn spec_blank_field_is_invalid() {
        let msg = body(json!({"owner": " ", "project": "p", "command": "c", "build": "b"}));
        assert!(JobSpec::from_json("temp", &msg).is_err());
    }

    #[test]
    fn unreadable_timeout_is_kept_as_text() {
        for raw in ["", "soon"] {
            let msg = body(json!({
                "owner": "o", "project": "p", "command": "c", "build": "b", "timeout": raw
            }));
            let spec = JobSpec::from_json("temp", &msg).unwrap();
            assert_eq!(spec.timeout, None);
            assert_eq!(spec.extra.get("timeout").map(String::as_str), Some(raw));

            let job = Job::new(spec.clone(), 2.0);
            let fields: HashMap<String, String> = job.to_fields().into_iter().collect();
            let rebuilt = Job::from_fields(job.id.clone(), fields).unwrap();
            assert_eq!(rebuilt.spec, spec);
        }
    }

    #[test]
    fn string_timeout_is_parsed() {
        let msg = body(json!({
            "owner": "o", "project": "p", "command": "c", "build": "b", "timeout": " 90 "
        }));
        assert_eq!(JobSpec::from_json("temp", &msg).unwrap().timeout, Some(90));
    }

    #[test]
    fn stored_fields_rebuild_the_job() {
        let mut spec = JobSpec::new("temp", "o", "p", "b", "c");
        spec.timeout = Some(30);
        spec.extra.insert("note".into(), "nightly".into());
        let mut job = Job::new(spec, 1.5);
        job.dispatched_at = Some(Utc::now());

        let fields: HashMap<String, String> = job.to_fields().into_iter().collect();
        let rebuilt = Job::from_fields(job.id.clone(), fields).unwrap();
        assert_eq!(rebuilt.spec, job.spec);
        assert_eq!(rebuilt.priority, 1.5);
        assert_eq!(
            rebuilt.dispatched_at.map(|t| t.timestamp()),
            job.dispatched_at.map(|t| t.timestamp())
        );
    }

    #[test]
    fn missing_stored_field_is_corrupt() {
        let mut fields = HashMap::new();
        fields.insert("owner".to_string(), "o".to_string());
        let err = Job::from_fields(JobId::from_stored("x"), fields).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn payload_carries_id_and_channel() {
        let job = Job::new(JobSpec::new("temp", "o", "p", "b", "c"), 2.0);
        let payload = job.payload();
        assert_eq!(payload["id"], "temp/p/b/c");
        assert_eq!(payload["channel"], "temp");
        assert_eq!(payload["priority"], "2");
    }

    #[test]
    fn key_from_complete_message() {
        let msg = body(json!({"action": "complete", "project": "p", "command": "c", "build": "b"}));
        let key = JobKey::from_json("temp", &msg).unwrap();
        assert_eq!(key.id(), JobId::from_parts("temp", "p", "b", "c"));
    }
}
