//! Core systems for axmirror.
//!
//! This crate provides the foundational components shared by the axmirror
//! snapshot-tree crates:
//!
//! - **Thread Roles**: registration and verification of the owner/reader
//!   thread split that the whole snapshot design rests on
//! - **Blocking Invocation**: the explicit request/response channel a
//!   reader-thread query uses to re-enter the owner thread synchronously
//! - **Logging**: `tracing` targets and wrapper macros
//! - **Errors**: the shared infrastructure error taxonomy
//!
//! # Invocation Example
//!
//! ```
//! use axmirror_core::invocation::owner_channel;
//!
//! let (proxy, owner_loop) = owner_channel();
//!
//! // Owner thread services its mailbox as part of normal turn-taking.
//! let owner = std::thread::spawn(move || {
//!     while owner_loop.service_one().is_ok() {}
//! });
//!
//! // Any other thread can run work on the owner thread and block on it.
//! let value = proxy.call(|| 40 + 2).unwrap();
//! assert_eq!(value, 42);
//!
//! drop(proxy);
//! owner.join().unwrap();
//! ```

pub mod error;
pub mod invocation;
pub mod logging;
pub mod thread_role;

pub use error::{CoreError, CoreResult};
pub use invocation::{OwnerInvocation, OwnerLoop, OwnerProxy, completion_pair, owner_channel};
pub use logging::PerfSpan;
pub use thread_role::{
    ThreadAffinity, is_owner_thread, is_reader_thread, owner_thread_id, reader_thread_id,
    set_owner_thread, set_reader_thread,
};
