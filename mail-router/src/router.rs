//! `Router`: pattern matching on the recipient address combined with
//! per-`(module, sender)` FSM state, grounded directly on
//! `original_source/salmon/routing.py`'s `RoutingBase`.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mail_core::MailRequest;
use mail_queue::Queue;
use parking_lot::RwLock;
use regex::Regex;

use crate::error::{RouterError, SmtpError};
use crate::route::{HandlerId, Route};
use crate::state::{MemoryStorage, StateStorage, ERROR_STATE, ROUTE_FIRST_STATE};

/// A user handler: takes the inbound request and its named captures,
/// returns where the conversation goes next or an `SmtpError` to reply
/// with. Stateless handlers' `Transition` is accepted for signature
/// symmetry with stateful ones but discarded by the dispatcher.
pub type HandlerFn = dyn Fn(&MailRequest, &HashMap<String, String>) -> Result<crate::route::Transition, SmtpError> + Send + Sync;

/// A state-key generator: given a module name and the message, returns the
/// key under which that module's FSM state is tracked. Defaults to the
/// module name itself (`DEFAULT_STATE_KEY`).
pub type StateKeyFn = dyn Fn(&str, &MailRequest) -> String + Send + Sync;

/// A caller-supplied "re-register every route" closure, invoked by
/// `reload()`. There is no dynamic module reloading in a compiled binary;
/// this documents that a real code change still requires a process
/// restart, per the base spec's "hot reload" guidance.
pub type ReloadHook = dyn Fn(&Router) + Send + Sync;

struct RegisteredRoute {
    regex: Regex,
    handlers: Vec<HandlerId>,
}

/// Registration-time bookkeeping kept per handler, stored in the router's
/// `HANDLERS` registry -- everything `salmon_setting` would have looked up
/// off the function object, carried here as an owned value instead.
struct HandlerRecord {
    route: Route,
    func: Arc<HandlerFn>,
}

enum CallOutcome {
    Smtp(SmtpError),
    Panicked(String),
}

/// The pattern-and-state dispatch engine. One instance per process is the
/// normal deployment shape (mirroring `salmon.routing.Router`'s module-
/// level singleton), but nothing here requires it to be a singleton --
/// tests construct one freely.
pub struct Router {
    order: RwLock<Vec<String>>,
    registered: RwLock<HashMap<String, RegisteredRoute>>,
    handlers: RwLock<HashMap<HandlerId, HandlerRecord>>,
    default_captures: RwLock<HashMap<String, String>>,
    state_key_generators: RwLock<HashMap<String, Arc<StateKeyFn>>>,
    state_store: RwLock<Arc<dyn StateStorage>>,
    undeliverable_queue: RwLock<Option<Arc<Queue>>>,
    reload_hook: RwLock<Option<Arc<ReloadHook>>>,
    call_lock: Mutex<()>,
    reload: AtomicBool,
    log_exceptions: AtomicBool,
}

impl Default for Router {
    fn default() -> Self {
        Router::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Router {
            order: RwLock::new(Vec::new()),
            registered: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            default_captures: RwLock::new(HashMap::new()),
            state_key_generators: RwLock::new(HashMap::new()),
            state_store: RwLock::new(Arc::new(MemoryStorage::new())),
            undeliverable_queue: RwLock::new(None),
            reload_hook: RwLock::new(None),
            call_lock: Mutex::new(()),
            reload: AtomicBool::new(false),
            log_exceptions: AtomicBool::new(true),
        }
    }

    pub fn set_state_store(&self, store: Arc<dyn StateStorage>) {
        *self.state_store.write() = store;
    }

    pub fn set_undeliverable_queue(&self, queue: Option<Arc<Queue>>) {
        *self.undeliverable_queue.write() = queue;
    }

    pub fn set_reload_hook(&self, hook: Arc<ReloadHook>) {
        *self.reload_hook.write() = Some(hook);
    }

    pub fn set_reload(&self, enabled: bool) {
        self.reload.store(enabled, Ordering::SeqCst);
    }

    pub fn set_log_exceptions(&self, enabled: bool) {
        self.log_exceptions.store(enabled, Ordering::SeqCst);
    }

    /// Updates the named-capture defaults applied to every route that
    /// omits that capture's own regex fragment.
    pub fn defaults(&self, captures: HashMap<String, String>) {
        self.default_captures.write().extend(captures);
    }

    pub fn register_state_key_generator(&self, module: impl Into<String>, generator: Arc<StateKeyFn>) {
        self.state_key_generators.write().insert(module.into(), generator);
    }

    /// Compiles `route`'s format (substituting named captures, falling
    /// back to the router's defaults, then anchoring and compiling
    /// case-insensitively) and registers `handler` under it.
    pub fn register(&self, route: Route, handler: Arc<HandlerFn>) -> Result<(), RouterError> {
        let defaults = self.default_captures.read().clone();
        let mut merged = defaults;
        merged.extend(route.captures.clone());

        let mut pattern = route.format.clone();
        for (name, fragment) in &merged {
            pattern = pattern.replace(&format!("({name})"), &format!("(?P<{name}>{fragment})"));
        }
        let anchored = format!("^{pattern}$");
        let regex = Regex::new(&format!("(?i){anchored}")).map_err(|e| RouterError::Internal(e.to_string()))?;

        let id = route.id.clone();
        let mut order = self.order.write();
        let mut registered = self.registered.write();
        match registered.get_mut(&anchored) {
            Some(existing) => existing.handlers.push(id.clone()),
            None => {
                order.push(anchored.clone());
                registered.insert(
                    anchored,
                    RegisteredRoute {
                        regex,
                        handlers: vec![id.clone()],
                    },
                );
            }
        }
        drop(order);
        drop(registered);

        self.handlers.write().insert(id, HandlerRecord { route, func: handler });
        Ok(())
    }

    fn matches(&self, address: &str) -> Vec<(Vec<HandlerId>, HashMap<String, String>)> {
        let order = self.order.read();
        let registered = self.registered.read();
        let mut out = Vec::new();
        for format in order.iter() {
            let Some(entry) = registered.get(format) else { continue };
            if let Some(caps) = entry.regex.captures(address) {
                let mut named = HashMap::new();
                for name in entry.regex.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        named.insert(name.to_owned(), m.as_str().to_owned());
                    }
                }
                out.push((entry.handlers.clone(), named));
            }
        }
        out
    }

    fn state_key(&self, module: &str, message: &MailRequest) -> String {
        match self.state_key_generators.read().get(module) {
            Some(generator) => generator(module, message),
            None => module.to_owned(),
        }
    }

    pub fn get_state(&self, module: &str, message: &MailRequest) -> Result<String, RouterError> {
        let key = self.state_key(module, message);
        self.state_store.read().get(&key, &message.from)
    }

    pub fn set_state(&self, module: &str, message: &MailRequest, state: &str) -> Result<(), RouterError> {
        let key = self.state_key(module, message);
        self.state_store.read().set(&key, &message.from, state)
    }

    fn in_state(&self, id: &HandlerId, message: &MailRequest) -> Result<bool, RouterError> {
        let state = self.get_state(&id.module, message)?;
        Ok(state == id.name)
    }

    fn collect_matches(&self, recipient: &str, message: &MailRequest) -> Result<Vec<HandlerId>, RouterError> {
        let mut selected = Vec::new();
        let mut in_state_found = false;
        for (handler_ids, _captures) in self.matches(recipient) {
            for id in handler_ids {
                let Some(record) = self.handlers.read().get(&id).map(|h| h.route.stateless) else {
                    continue;
                };
                if record {
                    selected.push(id);
                } else if !in_state_found && self.in_state(&id, message)? {
                    in_state_found = true;
                    selected.push(id);
                }
            }
        }
        Ok(selected)
    }

    fn captures_for(&self, recipient: &str, id: &HandlerId) -> HashMap<String, String> {
        for (handler_ids, captures) in self.matches(recipient) {
            if handler_ids.contains(id) {
                return captures;
            }
        }
        HashMap::new()
    }

    fn call_safely(&self, func: &Arc<HandlerFn>, message: &MailRequest, captures: &HashMap<String, String>) -> Result<crate::route::Transition, CallOutcome> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| func(message, captures)));
        match result {
            Ok(Ok(transition)) => Ok(transition),
            Ok(Err(smtp_err)) => Err(CallOutcome::Smtp(smtp_err)),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_owned());
                Err(CallOutcome::Panicked(message))
            }
        }
    }

    fn enqueue_undeliverable(&self, message: &MailRequest) {
        match self.undeliverable_queue.read().as_ref() {
            Some(queue) => {
                tracing::debug!(to = ?message.to, from = %message.from, "message undeliverable, pushing to undeliverable queue");
                if let Err(e) = queue.push(&message.data) {
                    tracing::warn!(error = %e, "failed to push undeliverable message to queue");
                }
            }
            None => {
                tracing::debug!(to = ?message.to, from = %message.from, "message didn't match any handlers, dropping");
            }
        }
    }

    /// Delivers `message` to its handlers, once per recipient in
    /// `message.to` -- the single-recipient SMTP receiver always produces
    /// a one-element `to`, while an LMTP receiver's many recipients each
    /// get their own independent match/dispatch/reply pass, matching "LMTP
    /// returns one reply per recipient."
    pub fn deliver(&self, message: &MailRequest) -> Vec<Result<(), RouterError>> {
        if self.reload.load(Ordering::SeqCst) {
            self.reload();
        }

        message
            .to
            .iter()
            .map(|recipient| self.deliver_to(recipient, message))
            .collect()
    }

    fn deliver_to(&self, recipient: &str, message: &MailRequest) -> Result<(), RouterError> {
        let matched = self.collect_matches(recipient, message)?;
        let mut called_count = 0usize;

        for id in matched {
            let (func, locking) = {
                let handlers = self.handlers.read();
                let Some(record) = handlers.get(&id) else { continue };
                (record.func.clone(), record.route.locking)
            };
            let captures = self.captures_for(recipient, &id);

            tracing::debug!(to = recipient, handler = %id.name, module = %id.module, "matched handler");

            let outcome = if locking {
                let _guard = self.call_lock.lock().unwrap_or_else(|e| e.into_inner());
                self.call_safely(&func, message, &captures)
            } else {
                self.call_safely(&func, message, &captures)
            };

            called_count += 1;

            match outcome {
                Ok(transition) => {
                    if !self.handlers.read().get(&id).map(|h| h.route.stateless).unwrap_or(false) {
                        self.apply_transition(&id, message, transition)?;
                    }
                }
                Err(CallOutcome::Smtp(e)) => return Err(RouterError::Smtp(e)),
                Err(CallOutcome::Panicked(reason)) => {
                    self.set_state(&id.module, message, ERROR_STATE)?;
                    self.enqueue_undeliverable(message);
                    if self.log_exceptions.load(Ordering::SeqCst) {
                        tracing::error!(handler = %id.name, module = %id.module, %reason, "handler panicked");
                    } else {
                        return Err(RouterError::Internal(reason));
                    }
                }
            }
        }

        if called_count == 0 {
            self.enqueue_undeliverable(message);
        }
        Ok(())
    }

    fn apply_transition(&self, id: &HandlerId, message: &MailRequest, transition: crate::route::Transition) -> Result<(), RouterError> {
        match transition {
            crate::route::Transition::Stay | crate::route::Transition::Unchanged => Ok(()),
            crate::route::Transition::GoTo(target) => {
                let _ = id;
                self.set_state(&target.module, message, &target.name)
            }
        }
    }

    /// Clears registration tables, then re-runs the caller-supplied reload
    /// hook if one was installed. Does not touch FSM state.
    pub fn reload(&self) {
        self.clear_routes();
        let hook = self.reload_hook.read().clone();
        if let Some(hook) = hook {
            hook(self);
        }
    }

    pub fn clear_routes(&self) {
        self.order.write().clear();
        self.registered.write().clear();
        self.handlers.write().clear();
    }

    pub fn clear_states(&self) -> Result<(), RouterError> {
        self.state_store.read().clear()
    }
}

/// `START` is re-exported here since it is the public-facing constant
/// callers compare against when asserting FSM state in tests.
pub const START: &str = ROUTE_FIRST_STATE;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Transition;
    use std::sync::atomic::AtomicUsize;

    fn request(from: &str, to: &str) -> MailRequest {
        let data = format!("From: {from}\r\nTo: {to}\r\nSubject: hi\r\n\r\nbody\r\n");
        MailRequest::new(None, from.to_owned(), vec![to.to_owned()], data.into_bytes()).unwrap()
    }

    #[test]
    fn subscribe_fsm_transitions_through_states() {
        let router = Router::new();
        router
            .register(
                Route::new("users", "START", "users-(action)@(host)")
                    .capture("action", "[a-z]+")
                    .capture("host", ".+"),
                Arc::new(|_msg, _caps| Ok(Transition::GoTo(HandlerId::new("users", "CONFIRM")))),
            )
            .unwrap();
        let confirm_route = Route::new("users", "CONFIRM", "users-(action)@(host)")
            .capture("action", "[a-z]+")
            .capture("host", ".+");
        router
            .register(
                confirm_route,
                Arc::new(|_msg, caps| {
                    if caps.get("action").map(String::as_str) == Some("confirm") {
                        Ok(Transition::GoTo(HandlerId::new("users", "POSTING")))
                    } else {
                        Ok(Transition::Stay)
                    }
                }),
            )
            .unwrap();

        let subscribe = request("zed@localhost", "users-subscribe@localhost");
        for result in router.deliver(&subscribe) {
            result.unwrap();
        }
        assert_eq!(router.get_state("users", &subscribe).unwrap(), "CONFIRM");

        let confirm = request("zed@localhost", "users-confirm@localhost");
        for result in router.deliver(&confirm) {
            result.unwrap();
        }
        assert_eq!(router.get_state("users", &confirm).unwrap(), "POSTING");
    }

    #[test]
    fn stateless_handler_always_fires_and_does_not_consume_state_slot() {
        let router = Router::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        router
            .register(
                Route::new("logger", "LOG", "(user)@(host)")
                    .capture("user", ".+")
                    .capture("host", ".+")
                    .stateless(),
                Arc::new(move |_msg, _caps| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                    Ok(Transition::Stay)
                }),
            )
            .unwrap();

        let msg = request("a@x", "b@y");
        for result in router.deliver(&msg) {
            result.unwrap();
        }
        for result in router.deliver(&msg) {
            result.unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unmatched_message_is_pushed_to_undeliverable_queue() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(Queue::new(dir.path(), false, 0, None).unwrap());
        let router = Router::new();
        router.set_undeliverable_queue(Some(queue.clone()));

        let msg = request("a@x", "nobody@nowhere");
        for result in router.deliver(&msg) {
            result.unwrap();
        }
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn handler_smtp_error_propagates_out_of_deliver() {
        let router = Router::new();
        router
            .register(
                Route::new("m", "START", "(user)@(host)").capture("user", ".+").capture("host", ".+"),
                Arc::new(|_msg, _caps| Err(SmtpError::new(550, "no such user"))),
            )
            .unwrap();

        let msg = request("a@x", "b@y");
        let results = router.deliver(&msg);
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(RouterError::Smtp(e)) => assert_eq!(e.code, 550),
            other => panic!("expected SmtpError, got {other:?}"),
        }
    }

    #[test]
    fn panicking_handler_sets_error_state_and_is_swallowed() {
        let router = Router::new();
        router
            .register(
                Route::new("m", "START", "(user)@(host)").capture("user", ".+").capture("host", ".+"),
                Arc::new(|_msg, _caps| panic!("boom")),
            )
            .unwrap();

        let msg = request("a@x", "b@y");
        for result in router.deliver(&msg) {
            result.unwrap();
        }
        assert_eq!(router.get_state("m", &msg).unwrap(), ERROR_STATE);
    }
}
