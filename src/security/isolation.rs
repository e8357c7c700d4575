//! Isolation view: the global scope a sandboxed script runs against
//!
//! Resolution order for a free identifier:
//!
//! 1. the sandbox container's entry, if any
//! 2. the ambient realm's value, if the name is allow-listed
//! 3. absent (reads as `undefined`)
//!
//! Writes always land in the container, so container entries shadow ambient
//! values even for allow-listed names, and nothing a script assigns ever
//! reaches the realm.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use tracing::trace;

use crate::container::SandboxContainer;
use crate::engine::{GlobalScope, Realm, Value};
use crate::security::allowlist::{AllowList, Profile};

pub struct IsolationView {
    container: RefCell<SandboxContainer>,
    allow_list: Arc<AllowList>,
    realm: Rc<Realm>,
}

impl IsolationView {
    /// View over an empty container
    pub fn new(allow_list: Arc<AllowList>, realm: Rc<Realm>) -> Self {
        Self::with_container(SandboxContainer::new(), allow_list, realm)
    }

    pub fn with_container(container: SandboxContainer, allow_list: Arc<AllowList>, realm: Rc<Realm>) -> Self {
        Self {
            container: RefCell::new(container),
            allow_list,
            realm,
        }
    }

    pub fn profile(&self) -> Profile {
        self.allow_list.profile()
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn realm(&self) -> &Rc<Realm> {
        &self.realm
    }

    /// Read access to the container; do not hold across script execution
    pub fn container(&self) -> Ref<'_, SandboxContainer> {
        self.container.borrow()
    }
}

impl GlobalScope for IsolationView {
    fn resolve(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.container.borrow().get(name) {
            return Some(value.clone());
        }
        if self.allow_list.is_allowed(name) {
            // Allow-listed names the realm lacks still read as undefined
            return Some(self.realm.resolve(name).unwrap_or_default());
        }
        trace!(target: "scriptit::isolation", name, "unresolved identifier");
        None
    }

    fn has(&self, name: &str) -> bool {
        self.container.borrow().contains(name) || self.allow_list.is_allowed(name)
    }

    fn write(&self, name: &str, value: Value) {
        trace!(
            target: "scriptit::isolation",
            name,
            shadows_ambient = self.allow_list.is_allowed(name),
            "container write"
        );
        self.container.borrow_mut().insert(name, value);
    }
}
