//! Container engine API proxy that injects bind mounts into new containers.
//!
//! `bindmount-proxy` sits between container clients and the engine's HTTP
//! API. Every request is forwarded unchanged except container-creation
//! requests, whose JSON body gains the binds and environment entries of every
//! rule whose image pattern matches the requested image. Attach and exec
//! style requests that upgrade the connection are bridged as raw byte streams
//! with half-close support.
//!
//! # Modules
//!
//! - [`config`]: Layered settings (CLI > env > file > defaults) and image rules
//! - [`engine`]: Engine endpoint resolution and dialing
//! - [`error`]: Semantic error types for the application
//! - [`policy`]: Compiled image rules applied to container-creation payloads
//! - [`proxy`]: Request dispatch, rewriting, upgrade bridging, and the listener

pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod proxy;
