//! Strata - secret-resolving configuration renderer
//!
//! This crate renders declarative configuration modules through an external,
//! sandboxed evaluation engine, resolving encrypted secrets on demand via a
//! small custom resource protocol. Plain configuration and decrypted secrets
//! live in layered stores with strict-conflict merging.

pub mod bridge;
pub mod config;
pub mod effects;
pub mod engine;
pub mod ghasset;
pub mod keygen;
pub mod mock;
pub mod render;
pub mod scope;
pub mod secrets;

pub use effects::{invoke, Effect, EffectError};
pub use render::{render, render_in, RenderError, RenderRequest};
pub use scope::{resolve, resolve_in, ScopeError};
pub use secrets::{ContentHint, Decryptor, SopsCli};
