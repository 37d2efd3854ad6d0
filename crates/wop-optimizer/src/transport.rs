//! Transport abstraction over the remote optimization resource, plus the
//! payloads it exchanges.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use wop_types::{History, OptimizationConfig, Status, WopResult};

/// Opaque identifier the service assigns to an optimization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RemoteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Number(number) => Self(number.to_string()),
        })
    }
}

/// What a finished (or still running) round reports.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteOutputs {
    #[serde(default, deserialize_with = "point")]
    pub x_suggested: Option<Vec<f64>>,
    pub status: Status,
    #[serde(default, deserialize_with = "rows")]
    pub x_best: Option<Vec<Vec<f64>>>,
    #[serde(default, deserialize_with = "rows")]
    pub y_best: Option<Vec<Vec<f64>>>,
}

impl RemoteOutputs {
    pub fn new(status: Status) -> Self {
        Self {
            x_suggested: None,
            status,
            x_best: None,
            y_best: None,
        }
    }

    pub fn with_suggestion(mut self, x: Vec<f64>) -> Self {
        self.x_suggested = Some(x);
        self
    }

    pub fn with_best(mut self, x: Vec<Vec<f64>>, y: Vec<Vec<f64>>) -> Self {
        self.x_best = Some(x);
        self.y_best = Some(y);
        self
    }
}

/// Numeric payload that may arrive as a scalar, one row, or several rows.
#[derive(Deserialize)]
#[serde(untagged)]
enum Shape {
    Scalar(f64),
    Row(Vec<f64>),
    Rows(Vec<Vec<f64>>),
}

impl Shape {
    fn into_rows(self) -> Vec<Vec<f64>> {
        match self {
            Self::Scalar(value) => vec![vec![value]],
            Self::Row(row) if row.is_empty() => Vec::new(),
            Self::Row(row) => vec![row],
            Self::Rows(rows) => rows,
        }
    }
}

fn rows<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<Vec<f64>>>, D::Error> {
    Ok(Option::<Shape>::deserialize(deserializer)?.map(Shape::into_rows))
}

fn point<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<f64>>, D::Error> {
    Ok(Option::<Shape>::deserialize(deserializer)?
        .and_then(|shape| shape.into_rows().into_iter().next()))
}

/// `{"optimization": ...}` wrapper used by every request body.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub optimization: T,
}

/// Body of the history upload.
#[derive(Debug, Serialize)]
pub struct HistoryUpload<'a> {
    #[serde(flatten)]
    pub history: &'a History,
    pub with_best: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedResponse {
    pub id: RemoteId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadResponse {
    pub outputs: RemoteOutputs,
}

/// Create/update/read access to remote optimizations.
///
/// Every failure is reported as [`wop_types::WopError::Optimization`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create the remote optimization and return its id.
    async fn create(&self, config: &OptimizationConfig) -> WopResult<RemoteId>;

    /// Upload the full history; results are fetched with [`Transport::read`].
    async fn update(&self, id: &RemoteId, history: &History, with_best: bool) -> WopResult<()>;

    /// Fetch the current outputs of the optimization.
    async fn read(&self, id: &RemoteId) -> WopResult<RemoteOutputs>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory transport.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use wop_types::WopError;

    #[derive(Debug, Default)]
    pub(crate) struct Calls {
        pub creates: Vec<serde_json::Value>,
        pub updates: Vec<(History, bool)>,
        pub reads: usize,
    }

    /// Replays queued read results, then repeats `fallback`.
    pub(crate) struct StubTransport {
        fail_create: bool,
        fail_update: bool,
        replies: Mutex<VecDeque<WopResult<RemoteOutputs>>>,
        fallback: RemoteOutputs,
        pub calls: Mutex<Calls>,
    }

    impl StubTransport {
        pub fn new(fallback: RemoteOutputs) -> Self {
            Self {
                fail_create: false,
                fail_update: false,
                replies: Mutex::new(VecDeque::new()),
                fallback,
                calls: Mutex::new(Calls::default()),
            }
        }

        /// Always answers a valid point at `x`.
        pub fn echo(x: Vec<f64>) -> Self {
            Self::new(RemoteOutputs::new(Status::ValidPoint).with_suggestion(x))
        }

        pub fn failing_create() -> Self {
            let mut stub = Self::echo(vec![0.0]);
            stub.fail_create = true;
            stub
        }

        pub fn failing_update() -> Self {
            let mut stub = Self::echo(vec![0.0]);
            stub.fail_update = true;
            stub
        }

        pub fn then(self, reply: WopResult<RemoteOutputs>) -> Self {
            self.replies.lock().push_back(reply);
            self
        }

        pub fn reads(&self) -> usize {
            self.calls.lock().reads
        }

        pub fn updates(&self) -> usize {
            self.calls.lock().updates.len()
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn create(&self, config: &OptimizationConfig) -> WopResult<RemoteId> {
            if self.fail_create {
                return Err(WopError::Optimization("Connection failed".into()));
            }
            self.calls.lock().creates.push(serde_json::to_value(config)?);
            Ok(RemoteId::new("42"))
        }

        async fn update(
            &self,
            _id: &RemoteId,
            history: &History,
            with_best: bool,
        ) -> WopResult<()> {
            if self.fail_update {
                return Err(WopError::Optimization("Connection failed".into()));
            }
            self.calls.lock().updates.push((history.clone(), with_best));
            Ok(())
        }

        async fn read(&self, _id: &RemoteId) -> WopResult<RemoteOutputs> {
            self.calls.lock().reads += 1;
            match self.replies.lock().pop_front() {
                Some(reply) => reply,
                None => Ok(self.fallback.clone()),
            }
        }
    }
}
