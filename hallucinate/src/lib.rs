//! Request handler that lets a reasoning agent write the code answering each
//! request.
//!
//! Every request gets a fresh scripting [`repl::Session`]. The agent is asked,
//! turn by turn, for a fragment; the fragment runs with all of its output
//! captured, and the capture is fed back into the next turn until a fragment
//! calls `respond`. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (transcript, response parsing, error
//!   classification). No I/O.
//! - **[`repl`]**: The scripting session, its namespace and output capture.
//! - **[`io`]**: Side-effecting collaborators (completion client, config,
//!   templates, terminal). Isolated behind traits for tests.
//!
//! [`looping`] and [`turn`] coordinate them for one request.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod repl;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod turn;
