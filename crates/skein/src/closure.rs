//! The closure resolver seam.
//!
//! A [`Closure`] is a reference to a statically known symbol plus a
//! serialized environment - the only way to describe a computation to a
//! remote node. How labels map to values is outside this crate's
//! business: the node consults an opaque [`Resolver`].
//!
//! [`StaticTable`] is the provided resolver for single-binary
//! deployments and tests: every node in the cluster registers the same
//! labels at startup.

use crate::context::Context;
use crate::error::{Failure, ProcessResult};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use skein_core::{Fingerprint, Message, Term};
use std::future::Future;

/// A label into the static symbol table plus the serialized environment
/// the resolved value closes over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Closure {
    label: String,
    env: Vec<u8>,
}

impl Closure {
    /// Creates a closure from a label and raw environment bytes.
    pub fn new(label: impl Into<String>, env: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            env,
        }
    }

    /// Creates a closure whose environment is the encoding of `value`.
    pub fn of_value<T: Term>(label: impl Into<String>, value: &T) -> Self {
        Self::new(
            label,
            postcard::to_allocvec(value).expect("closure environment serialization failed"),
        )
    }

    /// The symbol label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The serialized environment.
    pub fn env(&self) -> &[u8] {
        &self.env
    }
}

/// A spawnable process body: consumes the new process's context.
pub type ProcessBody = Box<dyn FnOnce(Context) -> BoxFuture<'static, ProcessResult> + Send>;

/// What a label resolves to.
pub enum Resolved {
    /// A process body, for spawn requests.
    Process(ProcessBody),
    /// A plain value, handed back as a fingerprinted envelope for
    /// [`Context::un_closure`] to decode.
    Value(Message),
}

/// Maps a closure label plus environment bytes to a typed value.
/// A missing label resolves to `None`.
pub trait Resolver: Send + Sync + 'static {
    /// Resolves `label` against `env`.
    fn resolve(&self, label: &str, env: &[u8]) -> Option<Resolved>;
}

type Factory = Box<dyn Fn(&[u8]) -> Resolved + Send + Sync>;

/// A static symbol table: labels registered up front, identically on
/// every node of the trust domain.
#[derive(Default)]
pub struct StaticTable {
    entries: DashMap<String, Factory>,
}

impl StaticTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a process factory under `label`. The factory receives
    /// the decoded environment and the spawned process's context.
    pub fn register_process<A, F, Fut>(&self, label: &str, f: F)
    where
        A: Term,
        F: Fn(A, Context) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ProcessResult> + Send + 'static,
    {
        self.entries.insert(
            label.to_string(),
            Box::new(move |env: &[u8]| {
                let parsed: Result<A, postcard::Error> = postcard::from_bytes(env);
                let f = f.clone();
                Resolved::Process(Box::new(move |ctx| {
                    let fut: BoxFuture<'static, ProcessResult> = match parsed {
                        Ok(arg) => Box::pin(f(arg, ctx)),
                        Err(err) => Box::pin(async move {
                            Err(Failure::error(format!(
                                "closure environment decode failed: {err}"
                            )))
                        }),
                    };
                    fut
                }))
            }),
        );
    }

    /// Registers `label` as resolving to a plain value of type `T`: the
    /// environment bytes are the value's encoding.
    pub fn register_value<T: Term>(&self, label: &str) {
        self.entries.insert(
            label.to_string(),
            Box::new(|env: &[u8]| {
                Resolved::Value(Message::from_parts(Fingerprint::of::<T>(), env.to_vec()))
            }),
        );
    }
}

impl Resolver for StaticTable {
    fn resolve(&self, label: &str, env: &[u8]) -> Option<Resolved> {
        self.entries.get(label).map(|factory| factory(env))
    }
}
