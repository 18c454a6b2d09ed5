//! # exprwatch
//!
//! Dependency tracking for compiled expressions by bytecode instrumentation.
//!
//! exprwatch rewrites an expression's instruction stream so that every
//! attribute read and every `getattr(obj, name)` call reports the accessed
//! object to a monitor, without changing what the expression computes. The
//! stock monitors attach change listeners to observable attributes and feed
//! them into a resettable notifier channel, so an expression knows exactly
//! which attributes its latest evaluation depended on.
//!
//! ## Core Systems
//!
//! - **[`vm`]**: Code objects, stack analysis, splicing and the evaluator
//! - **[`object`]**: The object model, observable attributes, change subscriptions
//! - **[`notify`]**: Notifier proxy and disconnectors with generation-based reset
//! - **[`monitor`]**: Attribute and call monitors, and the instrumentation pass
//! - **[`binding`]**: Binders and the listener policy (one listener per object and attribute)
//! - **[`expression`]**: Expression bindings that re-evaluate on change
//! - **[`config`]**: Which monitors an expression binding installs
//! - **[`testing`]**: Event recorders and stack depth traces

// Foundation
pub mod vm;
pub mod object;

// Instrumentation
pub mod notify;
pub mod monitor;
pub mod binding;

// Expressions
pub mod config;
pub mod expression;

// Test support
pub mod testing;

pub use config::BindingConfig;
pub use expression::ExpressionBinding;
pub use monitor::{instrument, InstrumentError, Monitor};
pub use notify::{NotificationEvent, NotifierProxy};
pub use object::{Object, ObjectRef};
pub use vm::{Code, Scope, Value};

// Proc macros (feature-gated)
#[cfg(feature = "macros")]
pub use exprwatch_macros::code;
