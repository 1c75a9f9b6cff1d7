//! Batata ACL - token, policy and role management with batch authorization
//!
//! This crate provides:
//! - Entity CRUD for tokens, policies, roles, binding rules and auth methods
//! - Token resolution into authorizers, local-first with remote fallback
//! - Batch authorization of up to 64 permission questions per call
//! - Login/logout through auth methods, bootstrap and replication status

pub mod authorize;
pub mod authorizer;
pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod remote;
pub mod resolver;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

pub use authorizer::{Access, Authorizer, AuthorizerContext, Decision, Resource, RuleAuthorizer};
pub use config::{AclConfig, DefaultPolicy};
pub use error::{AclError, AclResult, StoreError, StoreResult};
pub use memory::MemoryAclStore;
pub use model::*;
pub use remote::AclRemote;
pub use resolver::{ResolvedToken, TokenResolver};
pub use service::{
    AclService, BindingRuleEvaluator, Bindings, Identity, IdentityValidator, STATIC_METHOD_TYPE,
    SelectorBindingEvaluator, StaticIdentityValidator,
};
pub use store::AclStore;
