//! `Route` and the registration-time metadata the router needs per handler.
//!
//! Grounded on `original_source/salmon/routing.py`'s `route`/`route_like`/
//! `stateless`/`locking` decorators. Rust has no function-attached side
//! channel, so what the decorators stashed on the function object is
//! carried here as an explicit, owned `Route` built at registration time.

use std::collections::HashMap;

/// The stable identity of a registered handler: its declaring module and
/// its own name. Used in place of Python's "return the function, the
/// router reads its `__name__`" trick for recording the next FSM state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId {
    pub module: String,
    pub name: String,
}

impl HandlerId {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        HandlerId {
            module: module.into(),
            name: name.into(),
        }
    }
}

/// What a stateful handler returns to tell the router where the
/// conversation goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Stay in the current state.
    Stay,
    /// Move to the named handler's state.
    GoTo(HandlerId),
    /// Alias of `Stay`, for readability at call sites that want to be
    /// explicit that nothing changed.
    Unchanged,
}

/// A pattern plus its named-capture regex fragments, ready to be compiled
/// and registered. Mirrors `route.format`/`route.captures` from
/// `salmon/routing.py`, built explicitly instead of attached to a function.
#[derive(Debug, Clone)]
pub struct Route {
    pub(crate) id: HandlerId,
    pub(crate) format: String,
    pub(crate) captures: HashMap<String, String>,
    pub(crate) stateless: bool,
    pub(crate) locking: bool,
}

impl Route {
    pub fn new(module: impl Into<String>, name: impl Into<String>, format: impl Into<String>) -> Self {
        Route {
            id: HandlerId::new(module, name),
            format: format.into(),
            captures: HashMap::new(),
            stateless: false,
            locking: false,
        }
    }

    /// `route_like`: copy another route's format and captures onto a new
    /// handler identity. `Route` always carries a format once constructed,
    /// so unlike the decorator this is infallible by construction.
    pub fn like(module: impl Into<String>, name: impl Into<String>, other: &Route) -> Self {
        Route {
            id: HandlerId::new(module, name),
            format: other.format.clone(),
            captures: other.captures.clone(),
            stateless: false,
            locking: false,
        }
    }

    pub fn capture(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.captures.insert(name.into(), pattern.into());
        self
    }

    pub fn captures(mut self, captures: HashMap<String, String>) -> Self {
        self.captures.extend(captures);
        self
    }

    pub fn stateless(mut self) -> Self {
        self.stateless = true;
        self
    }

    pub fn locking(mut self) -> Self {
        self.locking = true;
        self
    }

    pub fn id(&self) -> &HandlerId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_copies_format_and_captures_onto_a_new_identity() {
        let base = Route::new("users", "START", "users-(action)@(host)").capture("action", "[a-z]+").capture("host", ".+");
        let copy = Route::like("users", "CONFIRM", &base);
        assert_eq!(copy.format, base.format);
        assert_eq!(copy.captures, base.captures);
        assert_eq!(copy.id().name, "CONFIRM");
        assert!(!copy.stateless);
    }

    #[test]
    fn stateless_and_locking_are_opt_in() {
        let route = Route::new("m", "START", "(x)@(y)");
        assert!(!route.stateless);
        assert!(!route.locking);
        let route = route.stateless().locking();
        assert!(route.stateless);
        assert!(route.locking);
    }
}
