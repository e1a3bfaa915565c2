//! Execution Context: state carried by one executing command
//!
//! Identity is fixed at construction. The only mutable parts are the random
//! stream, the listener registry, the warning list and the reuse counter,
//! each synchronized on its own so a context can be shared by the threads
//! working on one command.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use vdbx_policy::{check_access, DataPolicy, PermissionType, Verdict};

use crate::config::{EngineConfig, ServerTimeZone};
use crate::error::ContextError;
use crate::identity::{Session, Subject, VdbDescriptor, VdbResolver};
use crate::listener::{CommandEvent, CommandListener, ListenerRegistry};
use crate::random::RandomSource;
use crate::warning::{CommandWarning, WarningAccumulator};

/// What user functions and stages may see of the running command
pub trait CommandContext: Send + Sync {
    fn user_name(&self) -> &str;
    fn vdb_name(&self) -> &str;
    fn vdb_version(&self) -> u32;
    fn vdb(&self) -> &VdbDescriptor;
    fn connection_id(&self) -> &str;

    #[deprecated(note = "use `connection_id`")]
    fn legacy_connection_id(&self) -> &str {
        self.connection_id()
    }

    fn request_id(&self) -> &str;
    fn session(&self) -> &Arc<Session>;
    fn subject(&self) -> &Arc<Subject>;
    fn command_payload(&self) -> Option<&Value>;
    fn processor_batch_size(&self) -> usize;
    fn server_time_zone(&self) -> &ServerTimeZone;

    /// Never absent; empty when the user has no grants
    fn allowed_data_policies(&self) -> &HashMap<String, DataPolicy>;

    fn next_random(&self) -> f64;
    fn next_random_seeded(&self, seed: i64) -> f64;

    fn add_listener(&self, listener: Arc<dyn CommandListener>) -> bool;
    fn remove_listener(&self, listener: &Arc<dyn CommandListener>) -> bool;

    fn reuse_count(&self) -> u64;
    fn vdb_resolver(&self) -> Option<Arc<dyn VdbResolver>>;
    fn add_warning(&self, error: anyhow::Error);
}

pub struct ExecutionContext {
    user_name: String,
    connection_id: String,
    request_id: String,
    vdb: VdbDescriptor,
    session: Arc<Session>,
    subject: Arc<Subject>,
    allowed_data_policies: HashMap<String, DataPolicy>,
    command_payload: Option<Value>,
    processor_batch_size: usize,
    server_time_zone: ServerTimeZone,
    vdb_resolver: Option<Weak<dyn VdbResolver>>,
    reuse_count: AtomicU64,
    random: Mutex<RandomSource>,
    listeners: ListenerRegistry,
    warnings: WarningAccumulator,
}

impl ExecutionContext {
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn vdb_name(&self) -> &str {
        &self.vdb.name
    }

    pub fn vdb_version(&self) -> u32 {
        self.vdb.version
    }

    pub fn vdb(&self) -> &VdbDescriptor {
        &self.vdb
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    #[deprecated(note = "use `connection_id`")]
    pub fn legacy_connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn subject(&self) -> &Arc<Subject> {
        &self.subject
    }

    /// Client-supplied payload; `None` if the client did not set one
    pub fn command_payload(&self) -> Option<&Value> {
        self.command_payload.as_ref()
    }

    /// Nominal target; actual batches may differ with column types
    pub fn processor_batch_size(&self) -> usize {
        self.processor_batch_size
    }

    pub fn server_time_zone(&self) -> &ServerTimeZone {
        &self.server_time_zone
    }

    pub fn allowed_data_policies(&self) -> &HashMap<String, DataPolicy> {
        &self.allowed_data_policies
    }

    pub fn allowed_data_policy(&self, name: &str) -> Option<&DataPolicy> {
        self.allowed_data_policies.get(name)
    }

    /// Evaluate `action` on `resource` against the allowed policies
    pub fn check_access(&self, resource: &str, action: PermissionType) -> Verdict {
        check_access(self.allowed_data_policies.values(), resource, action)
    }

    /// Next value of the command's random stream, in `[0, 1)`
    pub fn next_random(&self) -> f64 {
        self.random.lock().next()
    }

    /// Reseed the stream and return its first value.
    /// Later `next_random` calls continue from the new seed.
    pub fn next_random_seeded(&self, seed: i64) -> f64 {
        tracing::debug!(request_id = %self.request_id, seed, "reseeding random stream");
        self.random.lock().reseed(seed)
    }

    /// Identifies the current random stream; changes on every reseed
    pub fn random_generation(&self) -> u64 {
        self.random.lock().generation()
    }

    /// Returns `false` if the listener was already registered
    pub fn add_listener(&self, listener: Arc<dyn CommandListener>) -> bool {
        let added = self.listeners.add(listener);
        tracing::debug!(request_id = %self.request_id, added, "add listener");
        added
    }

    /// Returns `false` if the listener was not registered
    pub fn remove_listener(&self, listener: &Arc<dyn CommandListener>) -> bool {
        let removed = self.listeners.remove(listener);
        tracing::debug!(request_id = %self.request_id, removed, "remove listener");
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Notify every listener registered at this moment, once each.
    ///
    /// Listeners may add or remove listeners while being notified; the change
    /// applies to the next dispatch.
    pub fn dispatch(&self, event: &CommandEvent) {
        let listeners = self.listeners.snapshot();
        tracing::debug!(
            request_id = %self.request_id,
            %event,
            listeners = listeners.len(),
            "dispatch command event"
        );
        for listener in listeners {
            listener.on_event(event, self);
        }
    }

    /// Times this context was handed to a new execution of its command
    pub fn reuse_count(&self) -> u64 {
        self.reuse_count.load(Ordering::Acquire)
    }

    /// Record one more execution on this context, returning the new count
    pub fn mark_reused(&self) -> u64 {
        let count = self.reuse_count.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(request_id = %self.request_id, count, "context reused");
        count
    }

    /// `None` once the VDB owning the resolver is gone
    pub fn vdb_resolver(&self) -> Option<Arc<dyn VdbResolver>> {
        self.vdb_resolver.as_ref().and_then(Weak::upgrade)
    }

    /// Record a non-fatal failure for the client. Never fails.
    pub fn add_warning(&self, error: impl Into<anyhow::Error>) {
        let error = error.into();
        tracing::warn!(
            request_id = %self.request_id,
            connection_id = %self.connection_id,
            warning = %format!("{:#}", error),
            "command warning"
        );
        self.warnings.push(&self.request_id, error);
    }

    /// Drain recorded warnings in recording order (diagnostic sink side)
    pub fn take_warnings(&self) -> Vec<CommandWarning> {
        self.warnings.drain()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl CommandContext for ExecutionContext {
    fn user_name(&self) -> &str {
        ExecutionContext::user_name(self)
    }

    fn vdb_name(&self) -> &str {
        ExecutionContext::vdb_name(self)
    }

    fn vdb_version(&self) -> u32 {
        ExecutionContext::vdb_version(self)
    }

    fn vdb(&self) -> &VdbDescriptor {
        ExecutionContext::vdb(self)
    }

    fn connection_id(&self) -> &str {
        ExecutionContext::connection_id(self)
    }

    fn request_id(&self) -> &str {
        ExecutionContext::request_id(self)
    }

    fn session(&self) -> &Arc<Session> {
        ExecutionContext::session(self)
    }

    fn subject(&self) -> &Arc<Subject> {
        ExecutionContext::subject(self)
    }

    fn command_payload(&self) -> Option<&Value> {
        ExecutionContext::command_payload(self)
    }

    fn processor_batch_size(&self) -> usize {
        ExecutionContext::processor_batch_size(self)
    }

    fn server_time_zone(&self) -> &ServerTimeZone {
        ExecutionContext::server_time_zone(self)
    }

    fn allowed_data_policies(&self) -> &HashMap<String, DataPolicy> {
        ExecutionContext::allowed_data_policies(self)
    }

    fn next_random(&self) -> f64 {
        ExecutionContext::next_random(self)
    }

    fn next_random_seeded(&self, seed: i64) -> f64 {
        ExecutionContext::next_random_seeded(self, seed)
    }

    fn add_listener(&self, listener: Arc<dyn CommandListener>) -> bool {
        ExecutionContext::add_listener(self, listener)
    }

    fn remove_listener(&self, listener: &Arc<dyn CommandListener>) -> bool {
        ExecutionContext::remove_listener(self, listener)
    }

    fn reuse_count(&self) -> u64 {
        ExecutionContext::reuse_count(self)
    }

    fn vdb_resolver(&self) -> Option<Arc<dyn VdbResolver>> {
        ExecutionContext::vdb_resolver(self)
    }

    fn add_warning(&self, error: anyhow::Error) {
        ExecutionContext::add_warning(self, error)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("user_name", &self.user_name)
            .field("connection_id", &self.connection_id)
            .field("request_id", &self.request_id)
            .field("vdb", &self.vdb.to_string())
            .field("policies", &self.allowed_data_policies.len())
            .field("processor_batch_size", &self.processor_batch_size)
            .field("server_time_zone", &self.server_time_zone.id())
            .field("reuse_count", &self.reuse_count())
            .field("listeners", &self.listeners.len())
            .field("warnings", &self.warnings.len())
            .finish()
    }
}

/// Collects construction inputs; `build` fails fast on missing identity
#[derive(Default)]
pub struct ExecutionContextBuilder {
    user_name: Option<String>,
    connection_id: Option<String>,
    request_id: Option<String>,
    vdb: Option<VdbDescriptor>,
    session: Option<Arc<Session>>,
    subject: Option<Arc<Subject>>,
    allowed_data_policies: HashMap<String, DataPolicy>,
    command_payload: Option<Value>,
    processor_batch_size: Option<usize>,
    server_time_zone: Option<ServerTimeZone>,
    vdb_resolver: Option<Weak<dyn VdbResolver>>,
}

impl ExecutionContextBuilder {
    pub fn user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn vdb(mut self, vdb: VdbDescriptor) -> Self {
        self.vdb = Some(vdb);
        self
    }

    pub fn session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn subject(mut self, subject: Arc<Subject>) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn allowed_data_policies(mut self, policies: HashMap<String, DataPolicy>) -> Self {
        self.allowed_data_policies = policies;
        self
    }

    pub fn allow_policy(mut self, policy: DataPolicy) -> Self {
        self.allowed_data_policies.insert(policy.name.clone(), policy);
        self
    }

    pub fn command_payload(mut self, payload: Value) -> Self {
        self.command_payload = Some(payload);
        self
    }

    pub fn processor_batch_size(mut self, size: usize) -> Self {
        self.processor_batch_size = Some(size);
        self
    }

    pub fn server_time_zone(mut self, tz: ServerTimeZone) -> Self {
        self.server_time_zone = Some(tz);
        self
    }

    /// Keep a weak handle; the caller stays the owner
    pub fn vdb_resolver(mut self, resolver: &Arc<dyn VdbResolver>) -> Self {
        self.vdb_resolver = Some(Arc::downgrade(resolver));
        self
    }

    /// Take batch size and time zone from `config` unless already set
    /// explicitly
    pub fn config(mut self, config: &EngineConfig) -> Result<Self, ContextError> {
        if self.processor_batch_size.is_none() {
            self.processor_batch_size = Some(config.processor_batch_size);
        }
        if self.server_time_zone.is_none() {
            self.server_time_zone = Some(config.time_zone()?);
        }
        Ok(self)
    }

    /// Mint a request id unique to the connection
    pub fn generate_request_id(mut self) -> Self {
        let connection = self.connection_id.as_deref().unwrap_or("local");
        self.request_id = Some(format!("{}.{}", connection, uuid::Uuid::new_v4().simple()));
        self
    }

    pub fn build(self) -> Result<ExecutionContext, ContextError> {
        let user_name = required(self.user_name, "user_name")?;
        let connection_id = required(self.connection_id, "connection_id")?;
        let request_id = required(self.request_id, "request_id")?;
        let vdb = self.vdb.ok_or(ContextError::MissingField("vdb"))?;
        if vdb.name.trim().is_empty() {
            return Err(ContextError::MissingField("vdb.name"));
        }

        let processor_batch_size = self
            .processor_batch_size
            .unwrap_or(crate::config::DEFAULT_BATCH_SIZE);
        if processor_batch_size == 0 {
            return Err(ContextError::InvalidBatchSize(0));
        }

        let session = self
            .session
            .unwrap_or_else(|| Arc::new(Session::new(connection_id.clone(), user_name.clone())));
        let subject = self
            .subject
            .unwrap_or_else(|| Arc::new(Subject::new(user_name.clone())));

        tracing::debug!(
            %user_name,
            %connection_id,
            %request_id,
            vdb = %vdb,
            policies = self.allowed_data_policies.len(),
            "execution context created"
        );

        Ok(ExecutionContext {
            user_name,
            connection_id,
            request_id,
            vdb,
            session,
            subject,
            allowed_data_policies: self.allowed_data_policies,
            command_payload: self.command_payload,
            processor_batch_size,
            server_time_zone: self.server_time_zone.unwrap_or_default(),
            vdb_resolver: self.vdb_resolver,
            reuse_count: AtomicU64::new(0),
            random: Mutex::new(RandomSource::new()),
            listeners: ListenerRegistry::new(),
            warnings: WarningAccumulator::new(),
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ContextError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ContextError::MissingField(field)),
    }
}
