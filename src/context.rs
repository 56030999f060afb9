//! Request Context
//!
//! Every engine operation executes on behalf of exactly one tenant. The
//! context is built by whatever sits in front of the engine (middleware,
//! tests, the CLI) and threaded through; the engine itself never resolves
//! tenants.

/// Per-request tenant scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Opaque tenant key; all reads and writes are scoped to it
    pub tenant_id: String,

    /// Acting user, stamped into audit fields when present
    pub user: Option<String>,
}

impl RequestContext {
    /// Context for a tenant with no acting user
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user: None,
        }
    }

    /// Context for a tenant with an acting user
    pub fn for_user(tenant_id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user: Some(user.into()),
        }
    }

    /// The value stamped into `createdBy`/`updatedBy`
    pub fn actor(&self) -> &str {
        self.user.as_deref().unwrap_or("system")
    }
}
